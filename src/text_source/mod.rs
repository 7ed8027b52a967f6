//! Resolution of body text.
//!
//! Bodies either carry their text inline or point at externally stored text
//! (e.g. a shared document link). A `TextFetcher` turns a body into its text.

mod http;

pub use http::HttpTextFetcher;

use crate::error::Result;
use crate::graph_store::Body;
use async_trait::async_trait;

/// Trait for body text resolution.
#[async_trait]
pub trait TextFetcher: Send + Sync {
    /// Resolve the full text of a body.
    async fn fetch(&self, body: &Body) -> Result<String>;
}
