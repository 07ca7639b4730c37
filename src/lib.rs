pub mod core;
pub mod exchanges;
pub mod proxy;
pub mod utils;

pub use core::{
    errors::ExchangeError,
    traits::{AccountInfo, Exchange, MarketDataSource, OrderPlacer, StreamingCallback},
    types::*,
};
pub use exchanges::zaif::ZaifConnector;
pub use utils::ExchangeRegistry;
