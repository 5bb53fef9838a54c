//! Narrow seam over the OS virtual-memory subsystem, plus the mirrored
//! ("doubled") mapping built on top of it.
//!
//! The interesting object here is [`MirrorMap`]: one anonymous shared-memory
//! region mapped twice, back to back, into a single reserved address range.
//! Every byte in the first half aliases the byte at the same offset in the
//! second half, so a window that wraps past the end of the region is still
//! one contiguous span of addresses.
//!
//! All OS calls go through the [`VmProvider`] trait so construction-failure
//! paths can be driven from tests without real mapping failures.

mod map;
mod provider;

pub use map::{MapError, MirrorMap};
pub use provider::{SysVm, VmProvider};
