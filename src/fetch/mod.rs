//! Page fetching: transport seam, retry classification and backoff
//!
//! ```text
//! Pipeline ──fetch_page──▶ PageFetcher ──send──▶ dyn Transport (HttpTransport)
//!                              │
//!                              └─ classify(outcome) ─▶ Success | Retryable | Fatal
//! ```

pub mod classify;
pub mod fetcher;
pub mod transport;

pub use classify::{classify, Outcome, Verdict};
pub use fetcher::{FetchError, PageFetcher, RetryPolicy};
pub use transport::{HttpTransport, PageRequest, Transport, TransportError, TransportResponse};
