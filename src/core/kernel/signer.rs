use crate::core::config::Credential;
use crate::core::errors::ExchangeError;
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Result type for signing operations: the headers to attach
pub type SignatureResult = Result<HashMap<String, String>, ExchangeError>;

/// Signer trait for request authentication
///
/// Implementations sign the exact body bytes that will be sent and return the
/// authentication headers for that request.
pub trait Signer: Send + Sync {
    fn sign_request(&self, body: &[u8]) -> SignatureResult;
}

/// Round-robin selection over a fixed set of credentials.
///
/// Every call advances the index, so a retried request is signed with a
/// different credential than the attempt before it.
#[derive(Debug)]
pub struct CredentialPool {
    credentials: Vec<Credential>,
    index: Mutex<usize>,
}

impl CredentialPool {
    pub fn new(credentials: Vec<Credential>) -> Self {
        Self {
            credentials,
            index: Mutex::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    pub fn next(&self) -> Result<&Credential, ExchangeError> {
        if self.credentials.is_empty() {
            return Err(ExchangeError::AuthError(
                "No credentials configured".to_string(),
            ));
        }
        let mut index = self.index.lock().unwrap_or_else(PoisonError::into_inner);
        let credential = &self.credentials[*index % self.credentials.len()];
        *index = (*index + 1) % self.credentials.len();
        Ok(credential)
    }
}

/// Digest used for the HMAC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HmacAlgorithm {
    Sha256,
    Sha512,
}

/// HMAC signer with rotating credentials, hex-encoding the digest
#[derive(Debug)]
pub struct HmacSigner {
    pool: CredentialPool,
    algorithm: HmacAlgorithm,
    key_header: String,
    sign_header: String,
}

impl HmacSigner {
    /// # Arguments
    /// * `credentials` - Key/secret pairs used in turn
    /// * `algorithm` - Which digest to use
    /// * `key_header` - Header carrying the API key
    /// * `sign_header` - Header carrying the hex signature
    pub fn new(
        credentials: Vec<Credential>,
        algorithm: HmacAlgorithm,
        key_header: impl Into<String>,
        sign_header: impl Into<String>,
    ) -> Self {
        Self {
            pool: CredentialPool::new(credentials),
            algorithm,
            key_header: key_header.into(),
            sign_header: sign_header.into(),
        }
    }

    pub fn credential_count(&self) -> usize {
        self.pool.len()
    }
}

impl Signer for HmacSigner {
    fn sign_request(&self, body: &[u8]) -> SignatureResult {
        let credential = self.pool.next()?;
        let signature = match self.algorithm {
            HmacAlgorithm::Sha256 => hmac_sha256_hex(credential.secret(), body)?,
            HmacAlgorithm::Sha512 => hmac_sha512_hex(credential.secret(), body)?,
        };

        let mut headers = HashMap::new();
        headers.insert(self.key_header.clone(), credential.key.clone());
        headers.insert(self.sign_header.clone(), signature);
        Ok(headers)
    }
}

pub fn hmac_sha512_hex(secret: &str, payload: &[u8]) -> Result<String, ExchangeError> {
    let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes())
        .map_err(|e| ExchangeError::AuthError(format!("Invalid secret key: {}", e)))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub fn hmac_sha256_hex(secret: &str, payload: &[u8]) -> Result<String, ExchangeError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| ExchangeError::AuthError(format!("Invalid secret key: {}", e)))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hmac_sha256_known_vector() {
        // RFC 4231 test case 2
        let signature = hmac_sha256_hex("Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(
            signature,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_hmac_sha512_known_vector() {
        let signature = hmac_sha512_hex("Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(
            signature,
            "164b7a7bfcf819e2e395fbe73b56e0a387bd64222e831fd610270cd7ea2505549758bf75c05a994a6d034f65f8f0e6fdcaeab1a34d4a6b4b636e070a38bce737"
        );
    }

    #[test]
    fn test_credentials_rotate_round_robin() {
        let signer = HmacSigner::new(
            vec![Credential::new("k1", "s1"), Credential::new("k2", "s2")],
            HmacAlgorithm::Sha512,
            "Key",
            "Sign",
        );
        let keys: Vec<String> = (0..5)
            .map(|_| signer.sign_request(b"body").unwrap()["Key"].clone())
            .collect();
        assert_eq!(keys, vec!["k1", "k2", "k1", "k2", "k1"]);
    }

    #[test]
    fn test_signature_matches_selected_secret() {
        let signer = HmacSigner::new(
            vec![Credential::new("k1", "s1")],
            HmacAlgorithm::Sha512,
            "Key",
            "Sign",
        );
        let headers = signer.sign_request(b"method=get_info2&nonce=1.0").unwrap();
        assert_eq!(
            headers["Sign"],
            hmac_sha512_hex("s1", b"method=get_info2&nonce=1.0").unwrap()
        );
    }

    #[test]
    fn test_empty_pool_is_an_auth_error() {
        let signer = HmacSigner::new(Vec::new(), HmacAlgorithm::Sha512, "Key", "Sign");
        assert!(matches!(
            signer.sign_request(b"x"),
            Err(ExchangeError::AuthError(_))
        ));
    }
}
