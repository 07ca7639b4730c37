pub mod registry;

pub use registry::{ConfigExtractor, ExchangeConstructor, ExchangeRegistry};
