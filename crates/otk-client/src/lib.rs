//! otk-client
//!
//! Transport adapters for the two channels that feed a tracking session.
//!
//! - [`OrderFetcher`]: full-state pull of one order (initial load and polling).
//! - [`PushTransport`]: inbound event stream for one order.
//!
//! Both traits are object-safe so the runtime holds `Arc<dyn ...>` and tests
//! substitute scripted implementations. This crate performs no merging and
//! keeps no session state.

pub mod fetch;
pub mod push;

pub use fetch::{FetchError, HttpOrderFetcher, OrderFetcher};
pub use push::{PushError, PushStream, PushTransport, WsPushTransport};

/// `{base}/orders/{order_id}` with the id as a single escaped path segment.
pub(crate) fn order_url(base: &str, order_id: &str) -> Result<reqwest::Url, String> {
    let mut url = reqwest::Url::parse(base).map_err(|e| format!("invalid base url '{base}': {e}"))?;
    url.path_segments_mut()
        .map_err(|_| format!("base url cannot carry a path: '{base}'"))?
        .pop_if_empty()
        .extend(["orders", order_id]);
    Ok(url)
}
