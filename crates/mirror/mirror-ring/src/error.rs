use mirror_vm::MapError;

/// Errors that can occur while constructing a [`MirroredRing`].
///
/// `write` and `read` are total and have no error channel; everything that
/// can fail happens at construction time.
///
/// [`MirroredRing`]: crate::MirroredRing
#[derive(Debug, thiserror::Error)]
pub enum RingError {
    /// The requested capacity is zero, or so large the byte size of the
    /// doubled region is not representable.
    #[error("capacity must be greater than zero and addressable")]
    InvalidCapacity,

    /// The element type's alignment exceeds the system page size, so the
    /// page-aligned mapping base cannot be guaranteed to align elements.
    #[error("element alignment {0} exceeds the page size")]
    UnsupportedAlignment(usize),

    /// An OS-level step of the mirrored-mapping construction failed. The
    /// source chain identifies the step and carries the OS error code.
    #[error("failed to construct the mirrored mapping")]
    Resource(#[from] MapError),
}
