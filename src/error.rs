use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures raised while turning a review page into persisted rows.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Nothing was extracted from the page. Ends the current (item, bucket) only.
    #[error("no reviews extracted from {url}")]
    EmptyPage { url: String },

    /// The review-list marker did not show up in time.
    #[error("timed out after {:.1}s waiting for #{marker} on {url}", .timeout.as_secs_f64())]
    FetchTimeout {
        url: String,
        marker: String,
        timeout: Duration,
    },

    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    /// Two item names sanitize to the same store file.
    #[error("items {first:?} and {second:?} would share store {}", .path.display())]
    StoreCollision {
        path: PathBuf,
        first: String,
        second: String,
    },

    /// An append failed twice in a row.
    #[error("failed to write {}", .path.display())]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
