//! The virtual-memory provider trait and its syscall-backed implementation.

use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd};
use std::ptr::NonNull;
use std::sync::OnceLock;

/// The set of OS virtual-memory operations the mirrored mapping is built
/// from.
///
/// Implementations other than [`SysVm`] exist only for tests: a provider can
/// count calls or fail at a chosen step to exercise the construction
/// rollback paths without touching real OS limits.
pub trait VmProvider {
    /// Returns the system page size in bytes.
    fn page_size(&self) -> io::Result<usize>;

    /// Creates an anonymous shareable memory object of exactly `len` bytes.
    ///
    /// The object is backed by memory (not a visible filesystem path) and is
    /// released when the returned descriptor and every mapping of it are
    /// gone.
    fn create_region(&self, len: usize) -> io::Result<OwnedFd>;

    /// Reserves `len` bytes of contiguous address space with no access
    /// rights.
    ///
    /// This pins down an address layout without committing memory; the range
    /// is populated later with [`VmProvider::map_fixed`] calls.
    fn reserve(&self, len: usize) -> io::Result<NonNull<u8>>;

    /// Maps `len` bytes of the object at exactly `addr`, read/write, shared.
    ///
    /// The mapping must land at `addr` with no relocation.
    ///
    /// # Safety
    /// `addr..addr + len` must lie inside a range previously obtained from
    /// [`VmProvider::reserve`] and still owned by the caller; replacing an
    /// arbitrary mapping clobbers whatever lived there.
    unsafe fn map_fixed(
        &self,
        addr: NonNull<u8>,
        len: usize,
        fd: BorrowedFd<'_>,
        offset: u64,
    ) -> io::Result<()>;

    /// Releases a mapped or reserved address range.
    ///
    /// # Safety
    /// `addr..addr + len` must be a range the caller owns (from
    /// [`VmProvider::reserve`], possibly since populated); nothing may
    /// reference it afterwards.
    unsafe fn unmap(&self, addr: NonNull<u8>, len: usize) -> io::Result<()>;
}

/// The real provider: thin wrappers over `sysconf`, `memfd_create` /
/// `shm_open`, `mmap` and `munmap`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SysVm;

impl VmProvider for SysVm {
    fn page_size(&self) -> io::Result<usize> {
        static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
        if let Some(ps) = PAGE_SIZE.get() {
            return Ok(*ps);
        }
        let res = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if res <= 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(*PAGE_SIZE.get_or_init(|| res as usize))
    }

    #[cfg(target_os = "linux")]
    fn create_region(&self, len: usize) -> io::Result<OwnedFd> {
        use std::os::fd::FromRawFd;

        let raw = unsafe { libc::memfd_create(c"mirror-vm".as_ptr(), libc::MFD_CLOEXEC) };
        if raw == -1 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: raw is a freshly created, owned descriptor.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };
        resize_region(&fd, len)?;
        Ok(fd)
    }

    #[cfg(not(target_os = "linux"))]
    fn create_region(&self, len: usize) -> io::Result<OwnedFd> {
        use std::ffi::CString;
        use std::os::fd::FromRawFd;
        use std::sync::atomic::{AtomicU64, Ordering};

        // No memfd outside Linux; a shm object unlinked right after creation
        // is the closest anonymous equivalent.
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let name = format!(
            "/mirror-vm-{}-{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        let cname = CString::new(name).map_err(|_| io::ErrorKind::InvalidInput)?;

        let raw = unsafe {
            libc::shm_open(
                cname.as_ptr(),
                libc::O_RDWR | libc::O_CREAT | libc::O_EXCL,
                0o600 as libc::mode_t,
            )
        };
        if raw == -1 {
            return Err(io::Error::last_os_error());
        }
        unsafe { libc::shm_unlink(cname.as_ptr()) };
        // SAFETY: raw is a freshly created, owned descriptor.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };
        resize_region(&fd, len)?;
        Ok(fd)
    }

    fn reserve(&self, len: usize) -> io::Result<NonNull<u8>> {
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if std::ptr::eq(ptr, libc::MAP_FAILED) {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: mmap only ever returns MAP_FAILED or a valid non-null
        // address, and MAP_FAILED was handled above.
        Ok(unsafe { NonNull::new_unchecked(ptr.cast::<u8>()) })
    }

    unsafe fn map_fixed(
        &self,
        addr: NonNull<u8>,
        len: usize,
        fd: BorrowedFd<'_>,
        offset: u64,
    ) -> io::Result<()> {
        let ptr = unsafe {
            libc::mmap(
                addr.as_ptr().cast(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_FIXED,
                fd.as_raw_fd(),
                offset as libc::off_t,
            )
        };
        if std::ptr::eq(ptr, libc::MAP_FAILED) {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    unsafe fn unmap(&self, addr: NonNull<u8>, len: usize) -> io::Result<()> {
        if unsafe { libc::munmap(addr.as_ptr().cast(), len) } == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

/// Grows the freshly created object to `len` bytes.
fn resize_region(fd: &OwnedFd, len: usize) -> io::Result<()> {
    if unsafe { libc::ftruncate(fd.as_raw_fd(), len as libc::off_t) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
