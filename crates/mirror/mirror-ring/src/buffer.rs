//! The mirrored ring buffer.

use crate::error::RingError;
use crate::ring::{apply_overwrite_policy, rounded_layout, wrap_index};
use mirror_vm::{MirrorMap, SysVm, VmProvider};
use std::marker::PhantomData;
use std::mem::size_of;
use std::ptr;
use std::slice;
use tracing::debug;

/// A fixed-capacity, lossy-overwrite ring buffer whose storage is mapped
/// twice back to back, so every logical window of up to `capacity` elements
/// is one contiguous span — no split copies on write, read, or borrow.
///
/// # Element type
/// `T` must be `Copy`: elements move by bitwise copy through shared memory,
/// never by ownership transfer. Zero-sized types are rejected at compile
/// time; types whose alignment exceeds the system page size are rejected at
/// construction, since the page-aligned mapping base is the only alignment
/// guarantee available.
///
/// # Overwrite policy
/// `write` always succeeds. When a write pushes the occupied size past
/// `capacity`, the oldest unread elements are discarded so that at most the
/// `capacity` most-recent elements remain; [`MirroredRing::overwritten`]
/// counts the casualties. This is a lossy buffer, not a bounded queue.
///
/// # Threading
/// Single-threaded. All mutation takes `&mut self`; share it across threads
/// only behind external synchronization.
///
/// # Ownership
/// The buffer exclusively owns its doubled mapping. Moving the buffer moves
/// the mapping; there is no `Clone`, since duplicating the mirror requires a
/// fresh OS object rather than a bitwise copy.
pub struct MirroredRing<T: Copy, P: VmProvider = SysVm> {
    map: MirrorMap<P>,
    capacity: usize,
    head: u64,
    tail: u64,
    overwritten: u64,
    _pd: PhantomData<T>,
}

impl<T: Copy> MirroredRing<T> {
    /// Creates a ring of at least `requested` elements using the real OS
    /// provider.
    ///
    /// The byte size is rounded up so the region is a whole number of pages
    /// and a whole number of elements, so the effective [`capacity`] may
    /// exceed `requested`.
    ///
    /// # Errors
    /// [`RingError::InvalidCapacity`] if `requested` is zero or not
    /// addressable; [`RingError::Resource`] if any OS mapping step fails.
    ///
    /// [`capacity`]: MirroredRing::capacity
    pub fn with_capacity(requested: usize) -> Result<Self, RingError> {
        Self::with_capacity_in(SysVm, requested)
    }
}

impl<T: Copy, P: VmProvider> MirroredRing<T, P> {
    /// Creates a ring through an arbitrary virtual-memory provider.
    ///
    /// This is the seam used by fault-injection tests; production code goes
    /// through [`MirroredRing::with_capacity`].
    pub fn with_capacity_in(provider: P, requested: usize) -> Result<Self, RingError> {
        const {
            assert!(
                size_of::<T>() != 0,
                "MirroredRing does not support zero-sized element types"
            )
        };

        if requested == 0 {
            return Err(RingError::InvalidCapacity);
        }

        let page = provider
            .page_size()
            .map_err(mirror_vm::MapError::PageSize)?;
        // The mapping base is page-aligned; that only aligns elements when
        // T's alignment fits in a page.
        if align_of::<T>() > page {
            return Err(RingError::UnsupportedAlignment(align_of::<T>()));
        }
        let (bytes, capacity) = rounded_layout(requested, size_of::<T>(), page)
            .ok_or(RingError::InvalidCapacity)?;

        let map = MirrorMap::with_provider(provider, bytes)?;

        debug!(requested, capacity, bytes, "created mirrored ring");

        Ok(Self {
            map,
            capacity,
            head: 0,
            tail: 0,
            overwritten: 0,
            _pd: PhantomData,
        })
    }

    /// Appends `data`, overwriting the oldest unread elements once the
    /// buffer is full. Always succeeds.
    ///
    /// If `data` is longer than [`capacity`], only its newest `capacity`
    /// elements are kept — the clamped-off prefix could never survive the
    /// overwrite policy, and copying it unclamped would run past the
    /// mirrored window. Clamped and lapped elements both count into
    /// [`overwritten`].
    ///
    /// [`capacity`]: MirroredRing::capacity
    /// [`overwritten`]: MirroredRing::overwritten
    pub fn write(&mut self, data: &[T]) {
        let clamped = data.len().saturating_sub(self.capacity);
        let src = &data[clamped..];
        self.overwritten += clamped as u64;
        if src.is_empty() {
            return;
        }

        let idx = wrap_index(self.head, self.capacity as u64) as usize;
        // SAFETY: idx < capacity and src.len() <= capacity, so the linear
        // copy stays inside the doubled mapping; the continuation past the
        // first half lands in the alias of the front. `src` cannot overlap
        // the buffer because borrowing a view of it requires `&self` while
        // this method holds `&mut self`.
        unsafe {
            ptr::copy_nonoverlapping(src.as_ptr(), self.slot_ptr(idx), src.len());
        }

        self.head += src.len() as u64;
        self.overwritten +=
            apply_overwrite_policy(self.head, &mut self.tail, self.capacity as u64);
    }

    /// Copies up to `out.len()` of the oldest unread elements into `out`
    /// and consumes them. Returns the number copied; `0` simply means the
    /// buffer (or `out`) was empty.
    pub fn read(&mut self, out: &mut [T]) -> usize {
        let to_copy = self.len().min(out.len());
        if to_copy == 0 {
            return 0;
        }

        let idx = wrap_index(self.tail, self.capacity as u64) as usize;
        // SAFETY: idx < capacity and to_copy <= capacity keep the linear
        // copy inside the doubled mapping; `out` is caller memory, disjoint
        // from the mapping.
        unsafe {
            ptr::copy_nonoverlapping(self.slot_ptr(idx).cast_const(), out.as_mut_ptr(), to_copy);
        }

        self.tail += to_copy as u64;
        to_copy
    }

    /// Borrows the occupied window as one contiguous slice, oldest element
    /// first, without consuming anything.
    ///
    /// This is the capability the mirrored layout exists for: the window is
    /// contiguous even when it wraps past the end of the physical region.
    pub fn as_slice(&self) -> &[T] {
        let idx = wrap_index(self.tail, self.capacity as u64) as usize;
        // SAFETY: the occupied window is at most `capacity` elements
        // starting below `capacity`, so it lies inside the doubled mapping
        // and is initialized (only written slots are ever occupied).
        unsafe { slice::from_raw_parts(self.slot_ptr(idx).cast_const(), self.len()) }
    }

    /// Number of unread elements (`head - tail`); at most [`capacity`]
    /// after every write.
    ///
    /// [`capacity`]: MirroredRing::capacity
    #[inline(always)]
    pub fn len(&self) -> usize {
        (self.head - self.tail) as usize
    }

    /// Effective capacity in elements. May exceed the requested value
    /// because of page rounding.
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// Total elements discarded unread, whether lapped by later writes or
    /// clamped from an oversized write. Cumulative; survives [`clear`].
    ///
    /// [`clear`]: MirroredRing::clear
    #[inline(always)]
    pub fn overwritten(&self) -> u64 {
        self.overwritten
    }

    /// Resets both cursors to zero, emptying the buffer.
    ///
    /// The underlying memory is *not* zeroed: stale element bytes remain
    /// mapped until overwritten. Do not rely on `clear` to scrub secrets.
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
    }

    #[inline(always)]
    fn slot_ptr(&self, idx: usize) -> *mut T {
        // idx is always pre-wrapped to [0, capacity), which is within the
        // first half of the doubled mapping.
        unsafe { self.map.as_ptr().cast::<T>().add(idx) }
    }
}

impl<T: Copy, P: VmProvider> std::fmt::Debug for MirroredRing<T, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirroredRing")
            .field("capacity", &self.capacity)
            .field("head", &self.head)
            .field("tail", &self.tail)
            .field("overwritten", &self.overwritten)
            .finish()
    }
}
