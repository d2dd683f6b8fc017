//! Process-wide allocator state: the family registry, the page provider,
//! and the allocation audit list, plus the cached system page size.
//!
//! The crate deliberately provides no internal synchronization (see the
//! crate's top-level safety contract) — callers serialize their own access
//! to the facade in `lib.rs`. [`StateCell`] exists only to give the single
//! `static` a legal `Sync` impl; it adds no actual thread safety.

use std::cell::UnsafeCell;
use std::sync::OnceLock;

use crate::diagnostics::AuditRecord;
use crate::family::FamilyRegistry;
use crate::page::{system_page_size, SyscallPageProvider};

pub(crate) struct GlobalState {
    pub(crate) registry: FamilyRegistry,
    pub(crate) provider: SyscallPageProvider,
    pub(crate) audit: Vec<AuditRecord>,
}

struct StateCell(UnsafeCell<GlobalState>);

// Safety: this crate provides no internal synchronization by design (see
// the crate root docs); callers must not call into the facade from more
// than one thread at a time. This impl only satisfies `static`'s bound.
unsafe impl Sync for StateCell {}

static STATE: StateCell = StateCell(UnsafeCell::new(GlobalState {
    registry: FamilyRegistry::new(),
    provider: SyscallPageProvider,
    audit: Vec::new(),
}));

static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

/// The host's system page size, queried once and cached for the life of
/// the process.
pub fn page_size() -> usize {
    *PAGE_SIZE.get_or_init(system_page_size)
}

/// Grants mutable access to the process-wide allocator state.
///
/// # Safety
/// The caller must uphold the crate's single-threaded-use contract: no two
/// calls into this crate's public facade may be in flight at the same
/// time, whether on one thread (reentrancy) or several.
pub(crate) unsafe fn state() -> &'static mut GlobalState {
    &mut *STATE.0.get()
}
