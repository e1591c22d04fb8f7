//! Errors reported by table operations.

/// Failures surfaced synchronously to the triggering call; none are retried.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableError {
    /// The hash function returned an index outside the bucket array.
    #[error("hash index {index} out of range for {capacity} buckets")]
    OutOfRange { index: usize, capacity: usize },
    /// A chain link or handle argument that is not a live entry of this table.
    #[error("wrong type: not a live handle of this table")]
    WrongType,
    /// Entry creation on a table with no buckets.
    #[error("cannot create an entry in a void table")]
    VoidTable,
    /// The associate function answered with a handle outside the searched chain.
    #[error("associate function returned a handle outside the searched chain")]
    WrongHandleShape,
}
