//! Upstream access: quote provider, page fetcher, transport and breaker.

pub mod circuit_breaker;
pub mod constituents;
pub mod http;
pub mod provider;
pub mod yahoo;

pub use circuit_breaker::CircuitBreaker;
pub use http::{HttpPageFetcher, HttpSettings};
pub use provider::{
    fetch_json, CompanyProfile, DataError, Interval, MarketDataProvider, PageFetcher, PriceBar,
    RawNewsItem,
};
pub use yahoo::YahooProvider;
