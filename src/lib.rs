//! A structure-aware slab allocator over raw virtual-memory pages.
//!
//! Callers register named **page families**, each with a fixed record
//! size, then `allocate`/`free` fixed-size records by family name. Pages
//! are acquired from the host (`mmap`/`VirtualAlloc`) one at a time and
//! returned as soon as they go empty. Within a page, a doubly-linked chain
//! of meta-blocks partitions the payload into allocated and free runs;
//! free runs are also indexed per family in strictly descending size order,
//! so allocation is worst-fit: the largest free block is always handed out
//! first, and split if there's enough left over to host another header.
//!
//! ```
//! vmslab::register_family("Employee", 64).unwrap();
//! let ptr = unsafe { vmslab::allocate("Employee", 1).unwrap() };
//! unsafe { vmslab::free(ptr) };
//! ```
//!
//! # Safety contract
//!
//! This crate keeps no internal lock or atomic: every public function
//! assumes the caller serializes their own access, whether that means one
//! thread only, or an external mutex around the whole facade. There is no
//! `Send`/`Sync` bound to lean on here — calling into this crate from two
//! threads at once, or reentrantly from a signal handler, is undefined
//! behaviour, not a data race the type system will catch for you.
//!
//! Beyond that, the usual raw-pointer rules apply: a pointer returned by
//! [`allocate`] may be freed at most once, only via [`free`], and must not
//! be touched afterwards. A successfully returned payload is always
//! zero-filled, whether it came from a fresh page or a reused block.

#![warn(missing_docs)]

mod core_alloc;
mod diagnostics;
mod error;
mod family;
mod free_index;
mod meta_block;
mod page;
mod page_header;
mod state;

pub use diagnostics::AuditRecord;
pub use error::AllocatorError;

/// Warms the cached system page size. Calling this is optional — every
/// other function calls it lazily on first use — but doing it once up
/// front avoids paying the `sysconf`/`GetSystemInfo` cost inside a latency
/// sensitive first allocation.
pub fn init() {
    let _ = state::page_size();
}

/// Registers a new page family: a name and a fixed per-record size.
///
/// Fails if `name` is already registered, or if `record_size` would not
/// fit in a single page's payload.
pub fn register_family(name: &str, record_size: u32) -> Result<(), AllocatorError> {
    let page_size = state::page_size();
    unsafe {
        let st = state::state();
        st.registry.register(name, record_size, page_size, &st.provider)?;
    }
    Ok(())
}

/// Fallible form of [`allocate`]: allocates `units * record_size` bytes
/// from the named family and returns the specific reason for failure
/// instead of collapsing it to `None`. Intended for callers (diagnostics,
/// tests) that want to distinguish an unknown family from an oversized
/// request from a page-provider failure.
///
/// # Safety
/// Same contract as [`allocate`].
pub unsafe fn try_allocate(family_name: &str, units: i32) -> Result<*mut u8, AllocatorError> {
    let page_size = state::page_size();
    let st = state::state();
    let family = st
        .registry
        .lookup(family_name)
        .ok_or(AllocatorError::UnknownFamily)?;

    if units <= 0 {
        return Err(AllocatorError::RequestTooLarge);
    }

    let record_size = family.as_ref().record_size;
    let units = u32::try_from(units).map_err(|_| AllocatorError::RequestTooLarge)?;
    let requested = units
        .checked_mul(record_size)
        .filter(|&bytes| bytes as usize <= page_header::family_payload_capacity(page_size))
        .ok_or(AllocatorError::RequestTooLarge)?;

    let ptr = core_alloc::allocate(family, requested, page_size, &st.provider)?;

    st.audit.push(diagnostics::AuditRecord {
        family_name: family_name.to_owned(),
        ptr: ptr as usize,
        size: requested,
    });

    Ok(ptr)
}

/// Allocates `units * record_size` bytes from the named family, returning
/// a pointer to its zero-filled payload, or `None` on any failure (unknown
/// family, oversized request, or page-provider failure — each logged via
/// `tracing` when that feature is enabled). Use [`try_allocate`] to
/// recover the specific reason instead.
///
/// # Safety
/// The returned pointer is valid for `units * record_size` bytes until
/// passed to [`free`]. Callers must uphold the crate's single-threaded-use
/// contract documented at the crate root.
pub unsafe fn allocate(family_name: &str, units: i32) -> Option<*mut u8> {
    match try_allocate(family_name, units) {
        Ok(ptr) => Some(ptr),
        Err(_err) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(family = family_name, units, error = %_err, "allocate failed");
            None
        }
    }
}

/// Returns a pointer previously obtained from [`allocate`] to its family.
///
/// # Safety
/// `ptr` must have been returned by [`allocate`] and not already freed.
/// Calling this with any other pointer, or with the same pointer twice,
/// is undefined behaviour (in debug builds, double-free is caught by an
/// assertion instead of silently corrupting state).
pub unsafe fn free(ptr: *mut u8) {
    let page_size = state::page_size();
    let st = state::state();

    core_alloc::free(ptr, page_size, &st.provider);

    let addr = ptr as usize;
    if let Some(pos) = st.audit.iter().position(|record| record.ptr == addr) {
        st.audit.swap_remove(pos);
    }
}

/// Prints a one-line summary of every registered family.
pub fn print_registered_families() {
    unsafe {
        let st = state::state();
        diagnostics::print_registered_families(&st.registry);
    }
}

/// Prints the meta-block chain of every page belonging to `family_name`.
pub fn print_block_usage(family_name: &str) -> Result<(), AllocatorError> {
    unsafe {
        let st = state::state();
        let family = st
            .registry
            .lookup(family_name)
            .ok_or(AllocatorError::UnknownFamily)?;
        diagnostics::print_block_usage(family.as_ref());
    }
    Ok(())
}

/// Prints page/byte usage totals. With `family_name`, reports just that
/// family; with `None`, reports totals across every registered family.
pub fn print_memory_usage(family_name: Option<&str>) -> Result<(), AllocatorError> {
    unsafe {
        let st = state::state();
        match family_name {
            Some(name) => {
                let family = st.registry.lookup(name).ok_or(AllocatorError::UnknownFamily)?;
                diagnostics::print_memory_usage_for_family(family.as_ref());
            }
            None => diagnostics::print_memory_usage(&st.registry, state::page_size()),
        }
    }
    Ok(())
}

/// Returns every allocation that has not yet been matched by a [`free`].
/// An empty `Vec` means no leaks.
pub fn check_for_leaks() -> Vec<AuditRecord> {
    unsafe {
        let st = state::state();
        diagnostics::check_for_leaks(&st.audit).to_vec()
    }
}
