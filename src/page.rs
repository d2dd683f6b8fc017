//! The page provider: acquires and releases zero-initialised,
//! page-aligned virtual-memory regions from the host kernel.
//!
//! This is deliberately the thinnest layer in the crate — a wrapper over
//! anonymous memory mapping, kept separate so the allocator core never
//! touches a raw syscall directly.

#[cfg(unix)]
mod imp {
    use libc::{
        c_void, mmap, munmap, sysconf, MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ,
        PROT_WRITE, _SC_PAGESIZE,
    };
    use std::ptr;

    /// # Safety
    /// `size` must be a positive multiple of the system page size.
    pub unsafe fn map_pages(size: usize) -> *mut u8 {
        let region = mmap(
            ptr::null_mut(),
            size,
            PROT_READ | PROT_WRITE,
            MAP_PRIVATE | MAP_ANONYMOUS,
            -1,
            0,
        );
        if region == MAP_FAILED {
            ptr::null_mut()
        } else {
            // mmap(MAP_ANONYMOUS) always returns zeroed pages.
            region as *mut u8
        }
    }

    /// # Safety
    /// `base`/`size` must match a prior successful [`map_pages`] call.
    pub unsafe fn unmap_pages(base: *mut u8, size: usize) -> bool {
        munmap(base as *mut c_void, size) == 0
    }

    pub fn query_page_size() -> usize {
        let size = unsafe { sysconf(_SC_PAGESIZE) };
        if size <= 0 {
            4096
        } else {
            size as usize
        }
    }
}

#[cfg(windows)]
mod imp {
    use std::ptr;
    use windows_sys::Win32::System::Memory::{
        VirtualAlloc, VirtualFree, MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_READWRITE,
    };
    use windows_sys::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};

    /// # Safety
    /// `size` must be a positive multiple of the system page size.
    pub unsafe fn map_pages(size: usize) -> *mut u8 {
        let region = VirtualAlloc(ptr::null_mut(), size, MEM_COMMIT | MEM_RESERVE, PAGE_READWRITE);
        if region.is_null() {
            ptr::null_mut()
        } else {
            // MEM_COMMIT always zero-fills newly committed pages.
            region as *mut u8
        }
    }

    /// # Safety
    /// `base` must have been returned by a prior [`map_pages`] call.
    pub unsafe fn unmap_pages(base: *mut u8, _size: usize) -> bool {
        // MEM_RELEASE frees the entire region reserved by VirtualAlloc; size must be 0.
        VirtualFree(base as *mut _, 0, MEM_RELEASE) != 0
    }

    pub fn query_page_size() -> usize {
        unsafe {
            let mut info: SYSTEM_INFO = core::mem::zeroed();
            GetSystemInfo(&mut info);
            info.dwPageSize as usize
        }
    }
}

/// Raw-page acquire/release pair. Out of scope of the core per the spec;
/// kept behind a trait so the allocator core can be exercised against a
/// fake provider in tests without touching the kernel.
pub trait PageProvider {
    /// Returns a zero-filled, page-aligned region of `size` bytes, or a
    /// null pointer on failure.
    fn acquire(&self, size: usize) -> *mut u8;

    /// Returns a region previously obtained from [`PageProvider::acquire`]
    /// back to the kernel.
    ///
    /// # Safety
    /// `base`/`size` must match a prior successful `acquire` call exactly.
    unsafe fn release(&self, base: *mut u8, size: usize);
}

/// The default provider: anonymous memory mapping (`mmap`/`VirtualAlloc`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SyscallPageProvider;

impl PageProvider for SyscallPageProvider {
    fn acquire(&self, size: usize) -> *mut u8 {
        let ptr = unsafe { imp::map_pages(size) };
        if ptr.is_null() {
            #[cfg(feature = "tracing")]
            tracing::error!(size, "page acquisition failed");
        } else {
            #[cfg(feature = "tracing")]
            tracing::debug!(size, ptr = ?ptr, "page acquired");
        }
        ptr
    }

    unsafe fn release(&self, base: *mut u8, size: usize) {
        let ok = imp::unmap_pages(base, size);
        #[cfg(feature = "tracing")]
        if ok {
            tracing::debug!(size, ptr = ?base, "page released");
        } else {
            tracing::warn!(size, ptr = ?base, "page release reported failure");
        }
        #[cfg(not(feature = "tracing"))]
        let _ = ok;
    }
}

/// Queries the host's system page size. Called once, from [`crate::init`].
pub fn system_page_size() -> usize {
    imp::query_page_size()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_then_release_roundtrips() {
        let provider = SyscallPageProvider;
        let size = system_page_size();
        let ptr = provider.acquire(size);
        assert!(!ptr.is_null());
        unsafe {
            // Freshly mapped pages must be zeroed.
            assert_eq!(*ptr, 0);
            assert_eq!(*ptr.add(size - 1), 0);
            provider.release(ptr, size);
        }
    }

    #[test]
    fn system_page_size_is_plausible() {
        let size = system_page_size();
        assert!(size >= 4096);
        assert!(size.is_power_of_two());
    }
}
