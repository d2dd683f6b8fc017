//! Per-page bookkeeping: the header embedded at the foot of every data
//! page, and the page-manager operations (`new_page`/`delete_page`) that
//! create and reclaim pages within a family's page list.
//!
//! A fresh page always starts as exactly one free meta-block spanning the
//! whole usable payload (I5) — the "bootstrap" block, embedded directly in
//! [`PageHeader`] rather than separately allocated, mirroring the original
//! allocator's `vm_page_family_t` layout.

use core::mem;
use core::ptr::NonNull;

use crate::error::AllocatorError;
use crate::family::FamilyRecord;
use crate::meta_block::{MetaBlock, HEADER_SIZE};
use crate::page::PageProvider;

/// Header placed at the start of every page this crate manages.
#[repr(C)]
pub struct PageHeader {
    pub family: NonNull<FamilyRecord>,
    /// Intra-family page-list neighbours, in creation order (most recent
    /// page first — see [`new_page`]).
    pub prev: Option<NonNull<PageHeader>>,
    pub next: Option<NonNull<PageHeader>>,
    /// The page's first meta-block. Subsequent blocks, if any, live in the
    /// payload region that follows and are reached via `next`/`prev`.
    pub bootstrap: MetaBlock,
}

/// Byte offset of `PageHeader::bootstrap` within `PageHeader`, i.e. the
/// `offset` every bootstrap meta-block is initialised with.
pub const BOOTSTRAP_OFFSET: u32 = mem::offset_of!(PageHeader, bootstrap) as u32;

/// Usable payload bytes in a freshly acquired page of `page_size` bytes,
/// i.e. the `block_size` of a page's bootstrap meta-block.
#[inline]
pub fn family_payload_capacity(page_size: usize) -> usize {
    page_size - BOOTSTRAP_OFFSET as usize - HEADER_SIZE as usize
}

/// Recovers the enclosing page header from one of its meta-blocks, using
/// the block's stored byte offset (I7's inverse).
///
/// # Safety
/// `meta` must be a live meta-block belonging to a page this crate
/// allocated.
#[inline]
pub unsafe fn page_of(meta: NonNull<MetaBlock>) -> NonNull<PageHeader> {
    let base = (meta.as_ptr() as *mut u8).sub(meta.as_ref().offset as usize);
    NonNull::new_unchecked(base as *mut PageHeader)
}

/// A pointer to `page`'s bootstrap meta-block.
#[inline]
pub unsafe fn bootstrap_meta(page: NonNull<PageHeader>) -> NonNull<MetaBlock> {
    NonNull::new_unchecked(core::ptr::addr_of_mut!((*page.as_ptr()).bootstrap))
}

/// A page is empty (and thus eligible for page-boundary reclamation, I5)
/// when its meta-block chain has collapsed back to a single free block
/// spanning the entire payload.
///
/// # Safety
/// `page` must be a live page header.
pub unsafe fn is_empty(page: NonNull<PageHeader>, page_size: usize) -> bool {
    let boot = bootstrap_meta(page);
    let boot = boot.as_ref();
    boot.prev.is_none()
        && boot.next.is_none()
        && boot.is_free
        && boot.block_size as usize == family_payload_capacity(page_size)
}

/// Acquires a new page from `provider`, initialises its header and
/// bootstrap meta-block, and prepends it to `family`'s page list.
///
/// # Safety
/// Must be called under the crate's single-threaded-use contract; `family`
/// must be a live `FamilyRecord`.
pub unsafe fn new_page(
    mut family: NonNull<FamilyRecord>,
    page_size: usize,
    provider: &dyn PageProvider,
) -> Result<NonNull<PageHeader>, AllocatorError> {
    let base = provider.acquire(page_size);
    if base.is_null() {
        return Err(AllocatorError::PageAcquisitionFailed);
    }

    let page_ptr = base as *mut PageHeader;
    let old_head = family.as_ref().first_page;

    core::ptr::addr_of_mut!((*page_ptr).family).write(family);
    core::ptr::addr_of_mut!((*page_ptr).prev).write(None);
    core::ptr::addr_of_mut!((*page_ptr).next).write(old_head);

    let boot_ptr = core::ptr::addr_of_mut!((*page_ptr).bootstrap);
    MetaBlock::init(boot_ptr, BOOTSTRAP_OFFSET, family_payload_capacity(page_size) as u32);

    let page = NonNull::new_unchecked(page_ptr);

    if let Some(mut old) = old_head {
        old.as_mut().prev = Some(page);
    }
    family.as_mut().first_page = Some(page);

    #[cfg(feature = "tracing")]
    tracing::debug!(page = ?page, page_size, "page created");

    Ok(page)
}

/// Unlinks `page` from `family`'s page list and returns its memory to
/// `provider`. The caller must have already verified [`is_empty`].
///
/// # Safety
/// `page` must be empty and currently linked into `family`'s page list.
pub unsafe fn delete_page(
    mut page: NonNull<PageHeader>,
    mut family: NonNull<FamilyRecord>,
    page_size: usize,
    provider: &dyn PageProvider,
) {
    debug_assert!(is_empty(page, page_size));

    let prev = page.as_ref().prev;
    let next = page.as_ref().next;

    match prev {
        Some(mut p) => p.as_mut().next = next,
        None => family.as_mut().first_page = next,
    }
    if let Some(mut n) = next {
        n.as_mut().prev = prev;
    }

    #[cfg(feature = "tracing")]
    tracing::debug!(page = ?page, "page reclaimed");

    provider.release(page.as_ptr() as *mut u8, page_size);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{system_page_size, SyscallPageProvider};

    unsafe fn make_family(record_size: u32) -> NonNull<FamilyRecord> {
        let layout = std::alloc::Layout::new::<FamilyRecord>();
        let ptr = std::alloc::alloc(layout) as *mut FamilyRecord;
        ptr.write(FamilyRecord::for_test(record_size));
        NonNull::new_unchecked(ptr)
    }

    #[test]
    fn fresh_page_is_one_free_block_spanning_the_payload() {
        unsafe {
            let provider = SyscallPageProvider;
            let page_size = system_page_size();
            let family = make_family(32);

            let page = new_page(family, page_size, &provider).unwrap();
            assert!(is_empty(page, page_size));

            let boot = bootstrap_meta(page);
            assert!(boot.as_ref().is_free);
            assert_eq!(boot.as_ref().block_size as usize, family_payload_capacity(page_size));
            assert_eq!(page_of(boot), page);

            delete_page(page, family, page_size, &provider);
        }
    }

    #[test]
    fn new_page_prepends_to_family_list() {
        unsafe {
            let provider = SyscallPageProvider;
            let page_size = system_page_size();
            let family = make_family(32);

            let first = new_page(family, page_size, &provider).unwrap();
            let second = new_page(family, page_size, &provider).unwrap();

            assert_eq!(family.as_ref().first_page, Some(second));
            assert_eq!(second.as_ref().next, Some(first));
            assert_eq!(first.as_ref().prev, Some(second));

            delete_page(second, family, page_size, &provider);
            delete_page(first, family, page_size, &provider);
        }
    }
}
