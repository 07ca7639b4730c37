pub mod codec;
pub mod conversions;
pub mod instruments;
pub mod signer;
pub mod types;

pub mod builder;
pub mod connector;
pub mod rest;

// Re-export main components
pub use builder::{build_connector, ZaifBuilder};
pub use codec::{ZaifCodec, ZaifFeed, ZaifMessage};
pub use connector::{Account, MarketData, StreamSettings, Trading, ZaifConnector};
pub use rest::{RawDepth, TradeHistoryQuery, ZaifRest};
pub use signer::ZaifSigner;
pub use types::{
    ZaifActiveOrder, ZaifActiveOrdersBoth, ZaifDepth, ZaifHistoryRecord, ZaifInfo2,
    ZaifStreamFrame, ZaifTicker, ZaifTrade, ZaifTradeResult,
};
