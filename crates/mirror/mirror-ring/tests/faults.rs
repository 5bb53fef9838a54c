//! Fault-injected construction tests.
//!
//! A counting provider wraps the real one and can be told to fail at any
//! single step. This proves each step maps to the right error variant and,
//! more importantly, that partial construction unwinds fully: a failed fixed
//! mapping releases the whole doubled reservation, and nothing is unmapped
//! twice.

use std::cell::Cell;
use std::io;
use std::os::fd::{BorrowedFd, OwnedFd};
use std::ptr::NonNull;
use std::rc::Rc;

use mirror_ring::{MirroredRing, RingError};
use mirror_vm::{MapError, SysVm, VmProvider};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Step {
    CreateRegion,
    Reserve,
    MapFirst,
    MapSecond,
}

#[derive(Default)]
struct Counters {
    maps: Cell<u32>,
    unmaps: Cell<u32>,
}

/// Delegates to [`SysVm`] but fails at a chosen step and counts calls.
struct FaultyVm {
    inner: SysVm,
    fail_at: Option<Step>,
    counters: Rc<Counters>,
}

impl FaultyVm {
    fn new(fail_at: Option<Step>) -> (Self, Rc<Counters>) {
        let counters = Rc::new(Counters::default());
        (
            Self {
                inner: SysVm,
                fail_at,
                counters: Rc::clone(&counters),
            },
            counters,
        )
    }

    fn injected() -> io::Error {
        io::Error::from_raw_os_error(ENOMEM)
    }
}

const ENOMEM: i32 = 12;

impl VmProvider for FaultyVm {
    fn page_size(&self) -> io::Result<usize> {
        self.inner.page_size()
    }

    fn create_region(&self, len: usize) -> io::Result<OwnedFd> {
        if self.fail_at == Some(Step::CreateRegion) {
            return Err(Self::injected());
        }
        self.inner.create_region(len)
    }

    fn reserve(&self, len: usize) -> io::Result<NonNull<u8>> {
        if self.fail_at == Some(Step::Reserve) {
            return Err(Self::injected());
        }
        self.inner.reserve(len)
    }

    unsafe fn map_fixed(
        &self,
        addr: NonNull<u8>,
        len: usize,
        fd: BorrowedFd<'_>,
        offset: u64,
    ) -> io::Result<()> {
        let nth = self.counters.maps.get();
        self.counters.maps.set(nth + 1);
        let failing = match self.fail_at {
            Some(Step::MapFirst) => nth == 0,
            Some(Step::MapSecond) => nth == 1,
            _ => false,
        };
        if failing {
            return Err(Self::injected());
        }
        unsafe { self.inner.map_fixed(addr, len, fd, offset) }
    }

    unsafe fn unmap(&self, addr: NonNull<u8>, len: usize) -> io::Result<()> {
        self.counters.unmaps.set(self.counters.unmaps.get() + 1);
        unsafe { self.inner.unmap(addr, len) }
    }
}

fn construct(fail_at: Option<Step>) -> (Result<MirroredRing<u64, FaultyVm>, RingError>, Rc<Counters>) {
    let (vm, counters) = FaultyVm::new(fail_at);
    (MirroredRing::<u64, _>::with_capacity_in(vm, 1024), counters)
}

#[test]
fn create_failure_surfaces_as_resource_error_without_unmapping() {
    let (res, counters) = construct(Some(Step::CreateRegion));
    match res {
        Err(RingError::Resource(MapError::CreateRegion(_))) => {}
        other => panic!("expected CreateRegion failure, got {other:?}"),
    }
    // Nothing was reserved, so nothing may be unmapped.
    assert_eq!(counters.unmaps.get(), 0);
}

#[test]
fn reserve_failure_surfaces_as_resource_error() {
    let (res, counters) = construct(Some(Step::Reserve));
    assert!(matches!(
        res,
        Err(RingError::Resource(MapError::Reserve(_)))
    ));
    assert_eq!(counters.unmaps.get(), 0);
}

#[test]
fn first_mapping_failure_releases_the_whole_reservation() {
    let (res, counters) = construct(Some(Step::MapFirst));
    match res {
        Err(RingError::Resource(MapError::MapFixed { half: "first", .. })) => {}
        other => panic!("expected first-half failure, got {other:?}"),
    }
    // One unmap covering the doubled range, and only one.
    assert_eq!(counters.unmaps.get(), 1);
}

#[test]
fn second_mapping_failure_releases_the_whole_reservation() {
    let (res, counters) = construct(Some(Step::MapSecond));
    match res {
        Err(RingError::Resource(MapError::MapFixed { half: "second", .. })) => {}
        other => panic!("expected second-half failure, got {other:?}"),
    }
    assert_eq!(counters.maps.get(), 2);
    assert_eq!(counters.unmaps.get(), 1);
}

#[test]
fn successful_construction_unmaps_exactly_once_at_drop() {
    let (res, counters) = construct(None);
    let mut rb = res.expect("construction should succeed");

    assert_eq!(counters.maps.get(), 2);
    assert_eq!(counters.unmaps.get(), 0);

    // The injected provider is a real mapping underneath; prove it works.
    rb.write(&[1, 2, 3]);
    let mut out = [0u64; 3];
    assert_eq!(rb.read(&mut out), 3);
    assert_eq!(out, [1, 2, 3]);

    drop(rb);
    assert_eq!(counters.unmaps.get(), 1);
}

#[test]
fn injected_error_carries_the_os_code() {
    let (res, _) = construct(Some(Step::Reserve));
    let err = res.unwrap_err();
    let RingError::Resource(map_err) = err else {
        panic!("expected a resource error");
    };
    let source = std::error::Error::source(&map_err).expect("os error attached");
    let io_err = source.downcast_ref::<io::Error>().expect("io::Error source");
    assert_eq!(io_err.raw_os_error(), Some(ENOMEM));
}
