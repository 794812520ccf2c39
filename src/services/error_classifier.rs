//! Error Classifier: maps a free-form error message to `(error_kind, retryable)` (§4.7).

use serde::{Deserialize, Serialize};

/// The closed set of error kinds the classifier can produce, plus the two
/// terminal kinds (`download_failed`, `no_provider`) that are assigned
/// directly by the worker/router rather than by substring match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ContentPolicy,
    ValidationError,
    RateLimited,
    Timeout,
    QuotaExceeded,
    Unauthorized,
    Forbidden,
    DependencyError,
    ServerError,
    UnknownError,
    DownloadFailed,
    NoProvider,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ContentPolicy => "content_policy",
            Self::ValidationError => "validation_error",
            Self::RateLimited => "rate_limited",
            Self::Timeout => "timeout",
            Self::QuotaExceeded => "quota_exceeded",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::DependencyError => "dependency_error",
            Self::ServerError => "server_error",
            Self::UnknownError => "unknown_error",
            Self::DownloadFailed => "download_failed",
            Self::NoProvider => "no_provider",
        }
    }
}

/// The ordered, first-match-wins token table (§4.7). Built-in entries come
/// first; configuration-supplied extra tokens (`FAILOVER_NON_RETRYABLE_TOKENS`,
/// `FAILOVER_RETRYABLE_TOKENS`) are checked afterward.
const BUILTIN_TABLE: &[(ErrorKind, &[&str], bool)] = &[
    (ErrorKind::ContentPolicy, &["content", "policy", "violation", "safety", "nudity"], false),
    (ErrorKind::ValidationError, &["validation", "schema", "parameter", "bad request"], false),
    (ErrorKind::RateLimited, &["rate limit", "too many requests", "429"], true),
    (ErrorKind::Timeout, &["timeout", "timed out"], true),
    (ErrorKind::QuotaExceeded, &["quota", "insufficient", "balance"], true),
    (ErrorKind::Unauthorized, &["unauthorized", "invalid api key", "401"], true),
    (ErrorKind::Forbidden, &["forbidden", "403"], true),
    (ErrorKind::DependencyError, &["dependency", "overloaded"], true),
    (ErrorKind::ServerError, &["server error", "service unavailable", "502", "503", "504"], true),
];

/// `(error_kind, retryable)` produced by [`ErrorClassifier::classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub kind: ErrorKind,
    pub retryable: bool,
}

/// A pure function of `(message, classifier_config)` (§8-8): constructed once
/// from configuration and shared via `Arc` across all workers.
#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier {
    extra_non_retryable: Vec<String>,
    extra_retryable: Vec<String>,
}

impl ErrorClassifier {
    #[must_use]
    pub fn new(extra_non_retryable_csv: &str, extra_retryable_csv: &str) -> Self {
        Self {
            extra_non_retryable: parse_tokens(extra_non_retryable_csv),
            extra_retryable: parse_tokens(extra_retryable_csv),
        }
    }

    /// Classify a free-form message. Case-insensitive substring match,
    /// first match wins; unmatched messages are `unknown_error`,
    /// non-retryable.
    #[must_use]
    pub fn classify(&self, message: &str) -> Classification {
        let normalized = message.to_lowercase();

        for (kind, tokens, retryable) in BUILTIN_TABLE {
            if tokens.iter().any(|t| normalized.contains(t)) {
                return Classification { kind: *kind, retryable: *retryable };
            }
        }

        if self.extra_non_retryable.iter().any(|t| normalized.contains(t.as_str())) {
            return Classification { kind: ErrorKind::ValidationError, retryable: false };
        }

        if self.extra_retryable.iter().any(|t| normalized.contains(t.as_str())) {
            return Classification { kind: ErrorKind::DependencyError, retryable: true };
        }

        Classification { kind: ErrorKind::UnknownError, retryable: false }
    }
}

fn parse_tokens(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> ErrorClassifier {
        ErrorClassifier::default()
    }

    #[test]
    fn content_policy_is_non_retryable() {
        let c = classifier().classify("Content policy violation: nudity detected");
        assert_eq!(c.kind, ErrorKind::ContentPolicy);
        assert!(!c.retryable);
    }

    #[test]
    fn rate_limit_is_retryable() {
        let c = classifier().classify("rate limit exceeded (429)");
        assert_eq!(c.kind, ErrorKind::RateLimited);
        assert!(c.retryable);
    }

    #[test]
    fn unmatched_message_is_unknown_non_retryable() {
        let c = classifier().classify("the sky fell");
        assert_eq!(c.kind, ErrorKind::UnknownError);
        assert!(!c.retryable);
    }

    #[test]
    fn classification_is_case_insensitive() {
        let c = classifier().classify("RATE LIMIT EXCEEDED");
        assert_eq!(c.kind, ErrorKind::RateLimited);
    }

    #[test]
    fn first_match_wins_for_overlapping_tokens() {
        // "validation" appears before "rate limit" in the table; a message
        // containing both should classify as validation_error.
        let c = classifier().classify("validation error: rate limit field missing");
        assert_eq!(c.kind, ErrorKind::ValidationError);
    }

    #[test]
    fn extra_non_retryable_tokens_classify_as_validation_error() {
        let c = ErrorClassifier::new("banana", "").classify("server said banana");
        assert_eq!(c.kind, ErrorKind::ValidationError);
        assert!(!c.retryable);
    }

    #[test]
    fn extra_retryable_tokens_classify_as_dependency_error() {
        let c = ErrorClassifier::new("", "flaky-upstream").classify("flaky-upstream responded oddly");
        assert_eq!(c.kind, ErrorKind::DependencyError);
        assert!(c.retryable);
    }

    #[test]
    fn classify_is_deterministic() {
        let c = classifier();
        let a = c.classify("timeout while waiting");
        let b = c.classify("timeout while waiting");
        assert_eq!(a.kind, b.kind);
        assert_eq!(a.retryable, b.retryable);
    }
}
