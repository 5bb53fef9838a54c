//! Fixed-capacity ring buffer over a mirrored virtual-memory mapping.
//!
//! The backing region is mapped twice back to back (see `mirror-vm`), so the
//! logical window starting at `head % capacity` is always one contiguous
//! span of addresses — writes and reads are single linear copies with no
//! wrap-around split, and the occupied window can be borrowed as one slice.
//!
//! The buffer is single-threaded: all mutation goes through `&mut self`, and
//! there is no internal synchronization. Wrap a `Mutex` (or keep it on one
//! thread) if it must be shared.

mod buffer;
mod error;
mod ring;

pub use buffer::MirroredRing;
pub use error::RingError;
