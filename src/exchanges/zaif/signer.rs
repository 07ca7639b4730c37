use crate::core::config::Credential;
use crate::core::kernel::{HmacAlgorithm, HmacSigner, NonceGenerator, SignatureResult, Signer};
use std::collections::HashMap;
use url::form_urlencoded;

/// Signs `/tapi` bodies with HMAC-SHA512, rotating API keys per request.
///
/// Every body carries `method` and a fresh `nonce`, followed by the call's own
/// parameters in key order.
pub struct ZaifSigner {
    hmac: HmacSigner,
    nonce: NonceGenerator,
}

impl ZaifSigner {
    pub fn new(credentials: Vec<Credential>) -> Self {
        Self {
            hmac: HmacSigner::new(credentials, HmacAlgorithm::Sha512, "Key", "Sign"),
            nonce: NonceGenerator::new(),
        }
    }

    pub fn credential_count(&self) -> usize {
        self.hmac.credential_count()
    }

    /// Form-encoded body for one attempt of a private call
    pub fn build_body(&self, method: &str, params: &[(&str, String)]) -> String {
        let mut body = form_urlencoded::Serializer::new(String::new())
            .append_pair("method", method)
            .append_pair("nonce", &self.nonce.next_nonce())
            .finish();

        if !params.is_empty() {
            let mut sorted: Vec<&(&str, String)> = params.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            let encoded = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(sorted.iter().map(|(key, value)| (*key, value.as_str())))
                .finish();
            body.push('&');
            body.push_str(&encoded);
        }
        body
    }

    /// Build a body with a fresh nonce and sign it
    pub fn signed_body(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<(String, HashMap<String, String>), crate::core::errors::ExchangeError> {
        let body = self.build_body(method, params);
        let headers = self.sign_request(body.as_bytes())?;
        Ok((body, headers))
    }
}

impl Signer for ZaifSigner {
    fn sign_request(&self, body: &[u8]) -> SignatureResult {
        self.hmac.sign_request(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::kernel::signer::hmac_sha512_hex;

    #[test]
    fn test_body_layout() {
        let signer = ZaifSigner::new(vec![Credential::new("k", "s")]);
        let body = signer.build_body(
            "trade",
            &[
                ("price", "105".to_string()),
                ("currency_pair", "btc_jpy".to_string()),
                ("amount", "0.01".to_string()),
                ("action", "bid".to_string()),
            ],
        );
        let (head, tail) = body.split_once("&nonce=").unwrap();
        assert_eq!(head, "method=trade");
        let (nonce, params) = tail.split_once('&').unwrap();
        assert!(nonce.contains('.'));
        assert_eq!(params, "action=bid&amount=0.01&currency_pair=btc_jpy&price=105");
    }

    #[test]
    fn test_signature_covers_exact_body() {
        let signer = ZaifSigner::new(vec![Credential::new("k1", "s1"), Credential::new("k2", "s2")]);
        let (body, headers) = signer.signed_body("get_info2", &[]).unwrap();
        assert_eq!(headers["Key"], "k1");
        assert_eq!(headers["Sign"], hmac_sha512_hex("s1", body.as_bytes()).unwrap());

        let (second, headers) = signer.signed_body("get_info2", &[]).unwrap();
        assert_ne!(body, second);
        assert_eq!(headers["Key"], "k2");
    }
}
