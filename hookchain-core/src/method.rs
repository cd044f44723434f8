//! Request method classification.

use http::Method;

/// Methods that may be re-sent without changing the outcome on the server.
///
/// This is the default set of methods a request may be retried with.
pub const IDEMPOTENT_METHODS: [Method; 6] = [
    Method::GET,
    Method::HEAD,
    Method::OPTIONS,
    Method::PUT,
    Method::DELETE,
    Method::TRACE,
];

/// Returns whether `method` is idempotent per RFC 9110.
///
/// ```
/// use hookchain_core::is_idempotent;
/// use http::Method;
///
/// assert!(is_idempotent(&Method::PUT));
/// assert!(!is_idempotent(&Method::POST));
/// ```
pub fn is_idempotent(method: &Method) -> bool {
    IDEMPOTENT_METHODS.contains(method)
}

/// Returns whether `method` is safe, i.e. read-only.
///
/// Unsafe methods are the ones that need anti-forgery protection.
pub fn is_safe(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}
