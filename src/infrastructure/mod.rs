//! External service integrations
//!
//! Wraps the coverage uploader and the container registry CLI. Both talk
//! to hosted services over the network, so both share the same notion of
//! a transient failure worth retrying.

pub mod coverage;
pub mod registry;

/// Check stderr for markers of a transient service failure
///
/// Matches the HTTP 5xx family plus connection-level flake. Anything else
/// (auth errors, 4xx, malformed input) fails immediately; retrying those
/// only hides the real problem.
pub(crate) fn is_transient_error(stderr: &str) -> bool {
    stderr.contains("503")
        || stderr.contains("Service Unavailable")
        || stderr.contains("502")
        || stderr.contains("Bad Gateway")
        || stderr.contains("500")
        || stderr.contains("Internal Server Error")
        || stderr.contains("InternalServerError")
        || stderr.contains("Connection refused")
        || stderr.contains("Connection reset")
        || stderr.contains("timeout")
        || stderr.contains("TLS handshake")
}

/// Exponential backoff: 2s, 4s, 8s, 16s, 32s
pub(crate) fn backoff_secs(attempt: u32) -> u64 {
    2u64.pow(attempt.min(5)).min(32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_markers() {
        assert!(is_transient_error("HTTP 503 Service Unavailable"));
        assert!(is_transient_error("read tcp: Connection reset by peer"));
        assert!(is_transient_error("request timeout"));
    }

    #[test]
    fn test_permanent_errors_not_retried() {
        assert!(!is_transient_error("401 Unauthorized"));
        assert!(!is_transient_error(
            "denied: requested access to the resource is denied"
        ));
        assert!(!is_transient_error("invalid report format"));
    }

    #[test]
    fn test_backoff_caps_at_32() {
        assert_eq!(backoff_secs(1), 2);
        assert_eq!(backoff_secs(2), 4);
        assert_eq!(backoff_secs(5), 32);
        assert_eq!(backoff_secs(9), 32);
    }
}
