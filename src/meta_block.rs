//! The meta-block chain: per-page doubly-linked descriptors that partition a
//! page's payload into contiguous allocated and free runs.
//!
//! A [`MetaBlock`] is embedded directly in page memory (it is never heap
//! allocated on its own); all navigation between blocks is raw pointer
//! arithmetic over that embedded layout, mirroring the offset-based chain
//! of the original C allocator this crate replaces.

use core::mem;
use core::ptr::NonNull;

/// Header describing one contiguous run of payload inside a page.
///
/// `#[repr(C)]` pins the field layout so that [`HEADER_SIZE`] and the
/// pointer arithmetic in [`next_by_size`] and [`meta_of`] are stable.
#[repr(C)]
pub struct MetaBlock {
    pub is_free: bool,
    /// Payload bytes governed by this header (excludes the header itself).
    pub block_size: u32,
    /// Byte distance from the enclosing page's base address to this header.
    pub offset: u32,
    /// Intra-page neighbours in address order.
    pub prev: Option<NonNull<MetaBlock>>,
    pub next: Option<NonNull<MetaBlock>>,
    /// Links into the family's worst-fit free index. Linked iff `is_free`.
    pub free_prev: Option<NonNull<MetaBlock>>,
    pub free_next: Option<NonNull<MetaBlock>>,
}

/// Size, in bytes, of a meta-block header. Every split/coalesce computation
/// is expressed relative to this constant.
pub const HEADER_SIZE: u32 = mem::size_of::<MetaBlock>() as u32;

impl MetaBlock {
    /// Writes a fresh, unlinked, free meta-block at `offset` bytes into the
    /// enclosing page, governing `block_size` payload bytes.
    ///
    /// # Safety
    /// `ptr` must point to writable memory at least [`HEADER_SIZE`] bytes
    /// long, suitably aligned for `MetaBlock`.
    pub unsafe fn init(ptr: *mut MetaBlock, offset: u32, block_size: u32) {
        ptr.write(MetaBlock {
            is_free: true,
            block_size,
            offset,
            prev: None,
            next: None,
            free_prev: None,
            free_next: None,
        });
    }

    /// Whether this block is currently linked into a free index.
    #[inline]
    pub fn in_free_index(&self) -> bool {
        self.free_prev.is_some() || self.free_next.is_some()
    }
}

/// The address a contiguous successor block *would* occupy, derived purely
/// from `meta`'s own size (as opposed to following `meta.next`, which may
/// differ by the amount of hard internal fragmentation between the two).
///
/// # Safety
/// `meta` must point to a valid, initialised `MetaBlock`.
#[inline]
pub unsafe fn next_by_size(meta: NonNull<MetaBlock>) -> *mut MetaBlock {
    let block_size = meta.as_ref().block_size;
    (meta.as_ptr() as *mut u8).add(HEADER_SIZE as usize + block_size as usize) as *mut MetaBlock
}

/// Recovers the meta-block governing a payload pointer previously returned
/// by `allocate`.
///
/// # Safety
/// `payload` must have been produced by this allocator's split logic
/// (i.e. it must be `addressof(meta) + HEADER_SIZE` for some live `meta`).
#[inline]
pub unsafe fn meta_of(payload: *mut u8) -> NonNull<MetaBlock> {
    let raw = payload.sub(HEADER_SIZE as usize) as *mut MetaBlock;
    NonNull::new_unchecked(raw)
}

/// The payload pointer callers receive for a given meta-block (I7).
///
/// # Safety
/// `meta` must point to a valid, initialised `MetaBlock`.
#[inline]
pub unsafe fn payload_of(meta: NonNull<MetaBlock>) -> *mut u8 {
    (meta.as_ptr() as *mut u8).add(HEADER_SIZE as usize)
}
