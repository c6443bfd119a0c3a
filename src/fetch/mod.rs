//! Document fetching.
//!
//! [`DocumentSource`] is the seam to whatever actually loads pages (an
//! HTTP client here, a headless browser elsewhere). [`BatchCoordinator`]
//! drives a source over a batch of URLs, one fetch at a time, and retries
//! transient failures in a bounded number of passes.

mod coordinator;
mod http;

pub use coordinator::{
    AttemptOutcome, BatchCoordinator, BatchJob, BatchReport, BatchTarget, FetchAttempt,
    RetryPolicy, SkipReason, SkippedUrl,
};
pub use http::{HttpDocumentSource, parse_search_feed};

use crate::error::FetchError;

/// A loaded page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// Where the source ended up after redirects.
    pub canonical_url: String,
    pub html: String,
}

/// Loads pages and expands search keywords into article URLs.
///
/// A source models one exclusive browsing session; the coordinator never
/// issues concurrent calls against the same source.
#[allow(async_fn_in_trait)]
pub trait DocumentSource {
    /// Load `url`.
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;

    /// Article URLs found by searching for `keyword`, in result order.
    async fn search(&self, keyword: &str) -> Result<Vec<String>, FetchError>;

    /// Re-establish the session after a [`FetchError::SessionInvalid`].
    async fn reset_session(&self) {}
}
