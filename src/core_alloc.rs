//! The allocator core: worst-fit selection, in-page split, and the
//! coalesce-then-reclaim path run on every `free`.
//!
//! Everything here operates on an already-resolved [`FamilyRecord`] and an
//! already-computed byte count; name lookup, the `units * record_size`
//! multiplication, and the `Result`-to-`Option` facade all live in
//! `lib.rs`.

use core::ptr::NonNull;

use crate::error::AllocatorError;
use crate::family::FamilyRecord;
use crate::free_index;
use crate::meta_block::{self, MetaBlock, HEADER_SIZE};
use crate::page::PageProvider;
use crate::page_header;

/// Carves `requested` payload bytes out of `block`, which becomes the
/// allocated block, shrinking to exactly `requested` bytes.
///
/// - If `block.block_size - requested` is `0`, or too small to host
///   another meta-block header, the leftover bytes are simply absorbed:
///   `block.next` is left pointing at its original neighbour, so the gap
///   becomes hard internal fragmentation, recovered later by [`free`]'s
///   boundary-absorption step.
/// - Otherwise a new free block is created immediately after `block`,
///   linked into both the page's meta-block chain and the family's free
///   index.
///
/// # Safety
/// `block` must be free, unlinked from the free index, and large enough
/// for `requested` bytes.
unsafe fn split_for_allocation(
    family: &mut FamilyRecord,
    mut block: NonNull<MetaBlock>,
    requested: u32,
) {
    let remaining = block.as_ref().block_size - requested;
    block.as_mut().block_size = requested;

    if remaining > HEADER_SIZE {
        let new_offset = block.as_ref().offset + HEADER_SIZE + requested;
        let new_block_ptr = (block.as_ptr() as *mut u8)
            .add(HEADER_SIZE as usize + requested as usize) as *mut MetaBlock;
        MetaBlock::init(new_block_ptr, new_offset, remaining - HEADER_SIZE);
        let mut new_block = NonNull::new_unchecked(new_block_ptr);

        let old_next = block.as_ref().next;
        new_block.as_mut().prev = Some(block);
        new_block.as_mut().next = old_next;
        if let Some(mut next) = old_next {
            next.as_mut().prev = Some(new_block);
        }
        block.as_mut().next = Some(new_block);

        free_index::insert(&mut family.free_index_head, new_block);
    }
    // Otherwise `block.next` is left untouched: it still points at the
    // address the *original*, larger block_size would have reached, so
    // the bytes between `requested` and that address become unreachable
    // hard fragmentation until `free` absorbs them back.

    block.as_mut().is_free = false;
}

/// Hands out `requested` payload bytes from `family`: the largest free
/// block in the family's worst-fit index if one is big enough, otherwise a
/// freshly acquired page (whose single bootstrap block is guaranteed large
/// enough, since callers validate `requested` against a page's payload
/// capacity before reaching this point). The returned payload is
/// zero-filled.
///
/// # Safety
/// Must be called under the crate's single-threaded-use contract; `family`
/// must be a live, registered `FamilyRecord`.
pub unsafe fn allocate(
    mut family: NonNull<FamilyRecord>,
    requested: u32,
    page_size: usize,
    provider: &dyn PageProvider,
) -> Result<*mut u8, AllocatorError> {
    let chosen = match free_index::largest(family.as_ref().free_index_head) {
        Some(block) if block.as_ref().block_size >= requested => {
            free_index::remove(&mut family.as_mut().free_index_head, block);
            block
        }
        _ => {
            let page = page_header::new_page(family, page_size, provider)?;
            page_header::bootstrap_meta(page)
        }
    };

    split_for_allocation(family.as_mut(), chosen, requested);

    let payload = meta_block::payload_of(chosen);
    payload.write_bytes(0, requested as usize);

    #[cfg(feature = "tracing")]
    tracing::debug!(family = family.as_ref().name(), requested, "block allocated");

    Ok(payload)
}

/// Returns a previously allocated pointer to its family. Before coalescing,
/// the freed block first absorbs any hard internal fragmentation between
/// itself and its right neighbour (or the page boundary, if it has none);
/// it is then coalesced with a free left and/or right neighbour (I2), and
/// the enclosing page is reclaimed if the result leaves it empty (I5).
///
/// # Safety
/// `ptr` must be a pointer this crate's `allocate` returned and that has
/// not already been freed.
pub unsafe fn free(ptr: *mut u8, page_size: usize, provider: &dyn PageProvider) {
    let mut meta = meta_block::meta_of(ptr);
    assert!(!meta.as_ref().is_free, "double free detected");

    let page = page_header::page_of(meta);
    let mut family = page.as_ref().family;

    // Boundary absorption: reclaim the hard-fragmentation gap, if any,
    // between this block's stored size and where the next real thing
    // (a neighbour block, or the page's end) actually begins.
    let gap = match meta.as_ref().next {
        Some(next) => next.as_ptr() as usize - meta_block::next_by_size(meta) as usize,
        None => {
            let end_of_page = (page.as_ptr() as *mut u8).add(page_size);
            end_of_page as usize - meta_block::next_by_size(meta) as usize
        }
    };
    meta.as_mut().block_size += gap as u32;

    if let Some(next) = meta.as_ref().next {
        if next.as_ref().is_free {
            free_index::remove(&mut family.as_mut().free_index_head, next);
            let merged = meta.as_ref().block_size + HEADER_SIZE + next.as_ref().block_size;
            meta.as_mut().block_size = merged;
            let next_next = next.as_ref().next;
            meta.as_mut().next = next_next;
            if let Some(mut nn) = next_next {
                nn.as_mut().prev = Some(meta);
            }
        }
    }

    if let Some(prev) = meta.as_ref().prev {
        if prev.as_ref().is_free {
            free_index::remove(&mut family.as_mut().free_index_head, prev);
            let mut prev = prev;
            let merged = prev.as_ref().block_size + HEADER_SIZE + meta.as_ref().block_size;
            prev.as_mut().block_size = merged;
            let meta_next = meta.as_ref().next;
            prev.as_mut().next = meta_next;
            if let Some(mut nn) = meta_next {
                nn.as_mut().prev = Some(prev);
            }
            meta = prev;
        }
    }

    meta.as_mut().is_free = true;

    if page_header::is_empty(page, page_size) {
        #[cfg(feature = "tracing")]
        tracing::debug!(family = family.as_ref().name(), "page emptied on free, reclaiming");
        page_header::delete_page(page, family, page_size, provider);
        return;
    }

    free_index::insert(&mut family.as_mut().free_index_head, meta);

    #[cfg(feature = "tracing")]
    tracing::debug!(family = family.as_ref().name(), "block freed");
}
