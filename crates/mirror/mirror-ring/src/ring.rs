//! Cursor arithmetic for the mirrored ring.
//!
//! `head` and `tail` are monotonically increasing u64 counters of elements
//! ever written / consumed; they are never stored wrapped. Only the low part
//! (`cursor % capacity`) ever becomes a memory offset. At one element per
//! nanosecond a u64 cursor takes ~584 years to wrap, which is treated as out
//! of range for supported process lifetimes.

/// Maps a cursor to an in-buffer element index.
///
/// The capacity is page-rounded rather than a power of two, so this is a
/// real `%`, not a mask.
#[inline(always)]
pub fn wrap_index(cursor: u64, capacity: u64) -> u64 {
    cursor % capacity
}

/// Applies the lossy overwrite policy after a write.
///
/// If the occupied size `head - tail` exceeds `capacity`, the writer has
/// lapped the unread data: `tail` jumps forward to `head - capacity` so at
/// most the `capacity` most-recent elements remain. Returns how many unread
/// elements were discarded.
#[inline(always)]
pub fn apply_overwrite_policy(head: u64, tail: &mut u64, capacity: u64) -> u64 {
    // saturating_sub guards against a tail somehow ahead of head.
    let occupied = head.saturating_sub(*tail);
    if occupied > capacity {
        let lost = occupied - capacity;
        *tail = head - capacity;
        lost
    } else {
        0
    }
}

/// Rounds a requested element capacity to the mapping granule.
///
/// The byte size is rounded up to the next multiple of
/// `lcm(page_size, elem_size)`, the smallest granule that makes the region
/// simultaneously a whole number of pages (required for the mirror alias to
/// land on a page boundary) and a whole number of elements. Returns
/// `(bytes, capacity)` with `capacity >= requested`, or `None` if the
/// arithmetic overflows `usize` (including the doubled region).
pub fn rounded_layout(requested: usize, elem_size: usize, page_size: usize) -> Option<(usize, usize)> {
    debug_assert!(requested > 0 && elem_size > 0 && page_size > 0);

    let granule = page_size / gcd(page_size, elem_size);
    let granule = granule.checked_mul(elem_size)?;

    let min_bytes = requested.checked_mul(elem_size)?;
    let granules = min_bytes.checked_add(granule - 1)? / granule;
    let bytes = granules.checked_mul(granule)?;

    // The doubled range must fit in the address space too.
    bytes.checked_mul(2)?;

    Some((bytes, bytes / elem_size))
}

fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}
