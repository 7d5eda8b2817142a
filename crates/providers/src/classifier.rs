//! Substring-based provider error taxonomy.
//!
//! The keyword table below is part of the external contract: matching is a
//! case-insensitive substring search, first match wins, in the order listed.
//! Entries may be appended but not reordered.

use mg_domain::error::ProviderErrorKind;

/// Ordered keyword table. First matching row decides the class.
const KEYWORD_TABLE: &[(&[&str], ProviderErrorKind)] = &[
    (
        &["timeout", "deadline exceeded", "context deadline"],
        ProviderErrorKind::Timeout,
    ),
    (
        &["rate limit", "rate_limit", "too many requests", "429"],
        ProviderErrorKind::RateLimit,
    ),
    (
        &["unauthorized", "invalid api key", "authentication", "401", "403"],
        ProviderErrorKind::Auth,
    ),
    (
        &["billing", "payment", "quota", "402"],
        ProviderErrorKind::Billing,
    ),
    (
        &["model not found", "does not exist", "unavailable"],
        ProviderErrorKind::ModelUnavailable,
    ),
    (
        &["internal server", "server error", "500", "502", "503", "504"],
        ProviderErrorKind::ServerError,
    ),
    (
        &["invalid", "bad request", "400"],
        ProviderErrorKind::InvalidRequest,
    ),
];

/// Classify a provider error by its text.
pub fn classify_error(text: &str) -> ProviderErrorKind {
    let lower = text.to_lowercase();
    for (keywords, kind) in KEYWORD_TABLE {
        if keywords.iter().any(|kw| lower.contains(kw)) {
            return *kind;
        }
    }
    ProviderErrorKind::Unknown
}

/// Whether the dispatcher should retry the same provider in place.
pub fn is_retryable(kind: ProviderErrorKind) -> bool {
    matches!(
        kind,
        ProviderErrorKind::Timeout | ProviderErrorKind::RateLimit | ProviderErrorKind::ServerError
    )
}
