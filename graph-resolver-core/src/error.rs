use displaydoc::Display;
use thiserror::Error;

/// Opaque error type returned by [`DataSource`](crate::DataSource)
/// implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error types for response resolution.
///
/// `NonNullableFieldIsNull` and `TypeNameSkipped` drive control flow inside
/// the walker and only reach the caller when no enclosing node absorbs them.
#[derive(Error, Display, Debug)]
pub enum ResolveError {
    /// non nullable field value is null
    NonNullableFieldIsNull,

    /// skipped because of __typename condition
    TypeNameSkipped,

    /// writing to the response sink failed: {0}
    Write(#[from] std::io::Error),
}

/// Error types for fetch execution.
///
/// A failed fetch is never fatal to resolution: the failure is logged and
/// the response carries whatever the data source wrote into its errors
/// buffer before giving up.
#[derive(Error, Display, Debug, Clone, Eq, PartialEq)]
pub enum FetchError {
    /// data source failed: {reason}
    DataSource { reason: String },
}
