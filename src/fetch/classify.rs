//! Retry classification of request outcomes

/// What happened to one request attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The remote answered with this HTTP status
    Status(u16),
    /// No status was received: connection reset, DNS failure, timeout
    TransportFailure,
}

/// Decision for one outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Success,
    Retryable,
    Fatal,
}

/// Classify an outcome.
///
/// Pure: the same outcome always yields the same verdict.
pub fn classify(outcome: Outcome) -> Verdict {
    match outcome {
        Outcome::TransportFailure => Verdict::Retryable,
        Outcome::Status(429) => Verdict::Retryable,
        Outcome::Status(code) if code >= 500 => Verdict::Retryable,
        Outcome::Status(200..=299) => Verdict::Success,
        // 4xx besides 429, plus 1xx/3xx which a redirect-following client never surfaces
        Outcome::Status(_) => Verdict::Fatal,
    }
}
