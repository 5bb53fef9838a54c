//! The doubled ("mirrored") mapping: one shared-memory object, two adjacent
//! fixed-address views inside a single reservation.

use crate::provider::{SysVm, VmProvider};
use std::io;
use std::os::fd::AsFd;
use std::ptr::NonNull;

/// Errors raised while building a [`MirrorMap`], tagged with the
/// construction step that failed and carrying the underlying OS error.
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    /// The requested length is zero, not a whole number of pages, or the
    /// doubled range is not representable.
    #[error("mapping length {len} is not a positive multiple of the page size")]
    BadLength { len: usize },

    #[error("failed to query the system page size")]
    PageSize(#[source] io::Error),

    #[error("failed to create the backing memory object")]
    CreateRegion(#[source] io::Error),

    #[error("failed to reserve the doubled address range")]
    Reserve(#[source] io::Error),

    #[error("failed to map the {half} half at its fixed address")]
    MapFixed {
        half: &'static str,
        #[source]
        source: io::Error,
    },
}

/// A region of `half_len` bytes of anonymous shared memory, mapped twice
/// back to back: byte `base + o` and byte `base + half_len + o` are the same
/// physical byte for every `o`.
///
/// The map is the single owner of its `2 * half_len` byte address range and
/// releases it in one unmap call on drop. Moving transfers ownership; there
/// is deliberately no `Clone` — duplicating the alias requires a new OS
/// object, not a bitwise copy.
pub struct MirrorMap<P: VmProvider = SysVm> {
    base: NonNull<u8>,
    half_len: usize,
    provider: P,
}

// SAFETY: the map is the exclusive owner of its address range; sending it to
// another thread moves that ownership wholesale.
unsafe impl<P: VmProvider + Send> Send for MirrorMap<P> {}

impl MirrorMap<SysVm> {
    /// Builds a mirrored mapping of `half_len` bytes using the real OS
    /// provider. `half_len` must be a positive multiple of the page size.
    pub fn new(half_len: usize) -> Result<Self, MapError> {
        Self::with_provider(SysVm, half_len)
    }
}

impl<P: VmProvider> MirrorMap<P> {
    /// Builds a mirrored mapping through an arbitrary provider.
    ///
    /// Construction is a chain of scoped acquisitions: create the shareable
    /// object, reserve `2 * half_len` bytes of address space, then map the
    /// object at the start of the reservation and again at
    /// `start + half_len`. If either fixed mapping fails, the entire
    /// reservation is released (both halves are one reservation) and the
    /// object descriptor is closed before the error propagates.
    pub fn with_provider(provider: P, half_len: usize) -> Result<Self, MapError> {
        let page = provider.page_size().map_err(MapError::PageSize)?;
        let full_len = match half_len.checked_mul(2) {
            Some(n) if half_len > 0 && half_len % page == 0 => n,
            _ => return Err(MapError::BadLength { len: half_len }),
        };

        let fd = provider.create_region(half_len).map_err(MapError::CreateRegion)?;
        let base = provider.reserve(full_len).map_err(MapError::Reserve)?;

        // Armed from here on: any early return unmaps the whole reservation.
        let mut guard = ReserveGuard {
            provider: &provider,
            base,
            len: full_len,
            armed: true,
        };

        unsafe {
            provider
                .map_fixed(base, half_len, fd.as_fd(), 0)
                .map_err(|source| MapError::MapFixed { half: "first", source })?;
            provider
                .map_fixed(base.add(half_len), half_len, fd.as_fd(), 0)
                .map_err(|source| MapError::MapFixed { half: "second", source })?;
        }

        guard.armed = false;
        drop(guard);
        // fd drops here; the shared mappings keep the physical pages alive.

        Ok(Self {
            base,
            half_len,
            provider,
        })
    }

    /// Base address of the mapping. The first `half_len` bytes and the next
    /// `half_len` bytes alias the same storage.
    #[inline(always)]
    pub fn as_ptr(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    /// Length in bytes of one half (the logical region size).
    #[inline(always)]
    pub fn half_len(&self) -> usize {
        self.half_len
    }
}

impl<P: VmProvider> Drop for MirrorMap<P> {
    fn drop(&mut self) {
        // One munmap covers both halves; drop must not fail, so the result
        // is discarded.
        let _ = unsafe { self.provider.unmap(self.base, self.half_len * 2) };
    }
}

impl<P: VmProvider> std::fmt::Debug for MirrorMap<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorMap")
            .field("base", &self.base)
            .field("half_len", &self.half_len)
            .finish()
    }
}

/// Unwinds the address-space reservation if construction bails out after
/// `reserve` but before both fixed mappings are in place.
struct ReserveGuard<'a, P: VmProvider> {
    provider: &'a P,
    base: NonNull<u8>,
    len: usize,
    armed: bool,
}

impl<P: VmProvider> Drop for ReserveGuard<'_, P> {
    fn drop(&mut self) {
        if self.armed {
            let _ = unsafe { self.provider.unmap(self.base, self.len) };
        }
    }
}
