//! The family registry: an append-only, chained list of pages whose
//! payload is a densely packed array of [`FamilyRecord`]s, plus
//! name-to-family lookup.
//!
//! Registry pages are acquired from the same [`PageProvider`] as data
//! pages but are never freed — the registry lives for the process
//! lifetime (see the spec's global-state lifecycle note).

use core::mem;
use core::ptr::NonNull;

use crate::error::AllocatorError;
use crate::meta_block::MetaBlock;
use crate::page::PageProvider;
use crate::page_header::{family_payload_capacity, PageHeader};

/// Maximum length, in bytes, of a registered family name. Longer names are
/// truncated, matching the original's fixed-width `strncpy` behaviour.
pub const MAX_FAMILY_NAME: usize = 32;

/// A registered page family: a name, a fixed record size, and the heads of
/// its page list and worst-fit free index.
#[repr(C)]
pub struct FamilyRecord {
    name: [u8; MAX_FAMILY_NAME],
    /// Bytes per allocation unit. `0` marks an empty/sentinel slot.
    pub record_size: u32,
    pub first_page: Option<NonNull<PageHeader>>,
    pub free_index_head: Option<NonNull<MetaBlock>>,
}

impl FamilyRecord {
    fn is_sentinel(&self) -> bool {
        self.record_size == 0
    }

    /// The family's name, as stored (trailing zero bytes stripped).
    pub fn name(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        core::str::from_utf8(&self.name[..len]).unwrap_or("")
    }

    fn name_matches(&self, name: &str) -> bool {
        pack_name(name) == self.name
    }

    /// Builds a detached, unregistered record for use by other modules'
    /// unit tests.
    #[cfg(test)]
    pub(crate) fn for_test(record_size: u32) -> Self {
        FamilyRecord {
            name: pack_name("test"),
            record_size,
            first_page: None,
            free_index_head: None,
        }
    }
}

fn pack_name(name: &str) -> [u8; MAX_FAMILY_NAME] {
    let mut packed = [0u8; MAX_FAMILY_NAME];
    let bytes = name.as_bytes();
    let len = bytes.len().min(MAX_FAMILY_NAME);
    packed[..len].copy_from_slice(&bytes[..len]);
    packed
}

/// Header of a single family-registry page. The array of [`FamilyRecord`]s
/// follows this header directly in page memory.
#[repr(C)]
struct RegistryPageHeader {
    next: Option<NonNull<RegistryPageHeader>>,
}

fn families_per_page(page_size: usize) -> usize {
    (page_size - mem::size_of::<RegistryPageHeader>()) / mem::size_of::<FamilyRecord>()
}

unsafe fn families_ptr(page: NonNull<RegistryPageHeader>) -> *mut FamilyRecord {
    (page.as_ptr() as *mut u8).add(mem::size_of::<RegistryPageHeader>()) as *mut FamilyRecord
}

/// The family registry: a singly-linked chain of registry pages rooted at
/// one process-wide head pointer.
pub struct FamilyRegistry {
    head: Option<NonNull<RegistryPageHeader>>,
}

impl FamilyRegistry {
    pub const fn new() -> Self {
        Self { head: None }
    }

    /// Registers a new family. Rejects oversized records and duplicate
    /// names; see [`AllocatorError`].
    ///
    /// # Safety
    /// Must be called under the crate's single-threaded-use contract.
    pub unsafe fn register(
        &mut self,
        name: &str,
        record_size: u32,
        page_size: usize,
        provider: &dyn PageProvider,
    ) -> Result<NonNull<FamilyRecord>, AllocatorError> {
        if record_size == 0 {
            #[cfg(feature = "tracing")]
            tracing::warn!(name, "record_size of 0 collides with the sentinel slot encoding");
            return Err(AllocatorError::RecordTooLarge);
        }

        if record_size as usize > family_payload_capacity(page_size) {
            #[cfg(feature = "tracing")]
            tracing::warn!(name, record_size, "record_size exceeds page payload capacity");
            return Err(AllocatorError::RecordTooLarge);
        }

        if self.lookup(name).is_some() {
            #[cfg(feature = "tracing")]
            tracing::warn!(name, "duplicate family registration rejected");
            return Err(AllocatorError::DuplicateFamily);
        }

        let capacity = families_per_page(page_size);

        let slot = match self.head {
            None => {
                let page = self.new_registry_page(page_size, provider)?;
                self.head = Some(page);
                families_ptr(page)
            }
            Some(head) => {
                let base = families_ptr(head);
                let mut occupied = 0usize;
                let mut free_slot: Option<*mut FamilyRecord> = None;
                for i in 0..capacity {
                    let slot = base.add(i);
                    if (*slot).is_sentinel() {
                        free_slot = Some(slot);
                        break;
                    }
                    occupied += 1;
                }

                if let Some(slot) = free_slot {
                    slot
                } else if occupied >= capacity {
                    let page = self.new_registry_page(page_size, provider)?;
                    let mut new_page = page;
                    new_page.as_mut().next = self.head;
                    self.head = Some(page);
                    families_ptr(page)
                } else {
                    // occupied < capacity with no sentinel found is unreachable:
                    // the loop above would have found the first zero-sized slot.
                    unreachable!("family registry scan invariant violated")
                }
            }
        };

        slot.write(FamilyRecord {
            name: pack_name(name),
            record_size,
            first_page: None,
            free_index_head: None,
        });

        #[cfg(feature = "tracing")]
        tracing::debug!(name, record_size, "family registered");

        Ok(NonNull::new_unchecked(slot))
    }

    unsafe fn new_registry_page(
        &self,
        page_size: usize,
        provider: &dyn PageProvider,
    ) -> Result<NonNull<RegistryPageHeader>, AllocatorError> {
        let base = provider.acquire(page_size);
        if base.is_null() {
            return Err(AllocatorError::PageAcquisitionFailed);
        }
        let page = base as *mut RegistryPageHeader;
        page.write(RegistryPageHeader { next: None });
        Ok(NonNull::new_unchecked(page))
    }

    /// Linear scan across all registry pages for a family named `name`.
    ///
    /// # Safety
    /// Must be called under the crate's single-threaded-use contract.
    pub unsafe fn lookup(&self, name: &str) -> Option<NonNull<FamilyRecord>> {
        let mut cursor = self.head;
        while let Some(page) = cursor {
            let base = families_ptr(page);
            let mut i = 0;
            loop {
                let slot = &*base.add(i);
                if slot.is_sentinel() {
                    break;
                }
                if slot.name_matches(name) {
                    return Some(NonNull::new_unchecked(base.add(i)));
                }
                i += 1;
            }
            cursor = page.as_ref().next;
        }
        None
    }

    /// Iterates every registered family across every registry page, for
    /// diagnostics.
    ///
    /// # Safety
    /// Must be called under the crate's single-threaded-use contract.
    pub unsafe fn for_each(&self, mut f: impl FnMut(&FamilyRecord)) {
        let mut cursor = self.head;
        while let Some(page) = cursor {
            let base = families_ptr(page);
            let mut i = 0;
            loop {
                let slot = &*base.add(i);
                if slot.is_sentinel() {
                    break;
                }
                f(slot);
                i += 1;
            }
            cursor = page.as_ref().next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::SyscallPageProvider;

    #[test]
    fn register_then_lookup_roundtrips() {
        unsafe {
            let mut registry = FamilyRegistry::new();
            let provider = SyscallPageProvider;
            let page_size = crate::page::system_page_size();

            let handle = registry.register("Employee", 64, page_size, &provider).unwrap();
            assert_eq!(handle.as_ref().name(), "Employee");
            assert_eq!(handle.as_ref().record_size, 64);

            let found = registry.lookup("Employee").unwrap();
            assert_eq!(found, handle);
            assert!(registry.lookup("Nonexistent").is_none());
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        unsafe {
            let mut registry = FamilyRegistry::new();
            let provider = SyscallPageProvider;
            let page_size = crate::page::system_page_size();

            registry.register("Node", 16, page_size, &provider).unwrap();
            let err = registry.register("Node", 32, page_size, &provider).unwrap_err();
            assert!(matches!(err, AllocatorError::DuplicateFamily));
        }
    }

    #[test]
    fn oversized_record_is_rejected() {
        unsafe {
            let mut registry = FamilyRegistry::new();
            let provider = SyscallPageProvider;
            let page_size = crate::page::system_page_size();

            let err = registry
                .register("Huge", page_size as u32 * 2, page_size, &provider)
                .unwrap_err();
            assert!(matches!(err, AllocatorError::RecordTooLarge));
        }
    }

    #[test]
    fn zero_sized_record_is_rejected() {
        unsafe {
            let mut registry = FamilyRegistry::new();
            let provider = SyscallPageProvider;
            let page_size = crate::page::system_page_size();

            let err = registry.register("Empty", 0, page_size, &provider).unwrap_err();
            assert!(matches!(err, AllocatorError::RecordTooLarge));
            // The rejected name must not shadow the sentinel slot: a later
            // registration under the same name must succeed cleanly.
            registry.register("Empty", 8, page_size, &provider).unwrap();
            assert!(registry.lookup("Empty").is_some());
        }
    }

    #[test]
    fn long_names_are_truncated_not_rejected() {
        unsafe {
            let mut registry = FamilyRegistry::new();
            let provider = SyscallPageProvider;
            let page_size = crate::page::system_page_size();

            let long_name = "a".repeat(64);
            let handle = registry.register(&long_name, 8, page_size, &provider).unwrap();
            assert_eq!(handle.as_ref().name().len(), MAX_FAMILY_NAME);
        }
    }

    #[test]
    fn overflowing_one_registry_page_prepends_another() {
        unsafe {
            let mut registry = FamilyRegistry::new();
            let provider = SyscallPageProvider;
            let page_size = crate::page::system_page_size();
            let capacity = families_per_page(page_size);

            for i in 0..=capacity {
                let name = format!("F{i}");
                registry.register(&name, 8, page_size, &provider).unwrap();
            }

            // All of them, including the one that forced a new page, are
            // still reachable via lookup.
            for i in 0..=capacity {
                let name = format!("F{i}");
                assert!(registry.lookup(&name).is_some(), "missing {name}");
            }
        }
    }
}
