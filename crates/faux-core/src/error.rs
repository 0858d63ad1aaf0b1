use thiserror::Error;

/// Errors raised by [`crate::store::TypedStore`].
///
/// Malformed raw values are never an error: every codec degrades to its
/// default. The only failure left is asking for a cached field as a type other
/// than the one it was first read or written as.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("cached value for key '{key}' is a {cached}, not a {requested}")]
    TypeMismatch {
        key: String,
        cached: &'static str,
        requested: &'static str,
    },
}
