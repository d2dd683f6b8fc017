//! Human-readable introspection: per-family summaries, per-block usage
//! dumps, and a leak audit. These mirror the original allocator's
//! `mm_print_*`/`mm_get_state_usage` console tools; none of them are
//! needed by `allocate`/`free` themselves.

use crate::family::{FamilyRecord, FamilyRegistry};
use crate::page_header;

/// One live allocation, recorded at `allocate` time and removed at `free`
/// time so that whatever remains at any point names every outstanding
/// allocation.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub family_name: String,
    pub ptr: usize,
    /// Payload bytes handed to the caller — `units * record_size`, which
    /// is also exactly the allocated block's post-split `block_size`.
    pub size: u32,
}

/// Prints one line per registered family: name, record size, and page
/// count.
///
/// # Safety
/// Must be called under the crate's single-threaded-use contract.
pub unsafe fn print_registered_families(registry: &FamilyRegistry) {
    println!("{:<32} {:>10} {:>10}", "FAMILY", "REC_SIZE", "PAGES");
    registry.for_each(|family| {
        let mut pages = 0usize;
        let mut cursor = family.first_page;
        while let Some(page) = cursor {
            pages += 1;
            cursor = page.as_ref().next;
        }
        println!("{:<32} {:>10} {:>10}", family.name(), family.record_size, pages);
    });
}

/// Prints every meta-block in `family`'s page chain: offset, size, and
/// free/allocated state, plus a running total/free/occupied block count.
/// Useful for visualising fragmentation.
///
/// Debug builds additionally cross-check (I3) that every block this walk
/// marks free is also reachable from the family's free index, and vice
/// versa — the same inline consistency check the original performs while
/// dumping block usage.
///
/// # Safety
/// `family` must be a live, registered `FamilyRecord`.
pub unsafe fn print_block_usage(family: &FamilyRecord) {
    println!("family {}:", family.name());

    #[cfg(debug_assertions)]
    let mut indexed: std::collections::HashSet<usize> = std::collections::HashSet::new();
    #[cfg(debug_assertions)]
    {
        let mut cursor = family.free_index_head;
        while let Some(node) = cursor {
            indexed.insert(node.as_ptr() as usize);
            cursor = node.as_ref().free_next;
        }
    }

    let mut page_index = 0;
    let mut total = 0usize;
    let mut free = 0usize;
    let mut cursor = family.first_page;
    while let Some(page) = cursor {
        println!("  page {page_index}:");
        let mut block = Some(page_header::bootstrap_meta(page));
        while let Some(b) = block {
            total += 1;
            let is_free = b.as_ref().is_free;
            if is_free {
                free += 1;
            }
            #[cfg(debug_assertions)]
            debug_assert_eq!(
                is_free,
                indexed.contains(&(b.as_ptr() as usize)),
                "block free-state disagrees with free-index membership"
            );
            let state = if is_free { "free" } else { "used" };
            println!("    offset={:<8} size={:<8} {}", b.as_ref().offset, b.as_ref().block_size, state);
            block = b.as_ref().next;
        }
        page_index += 1;
        cursor = page.as_ref().next;
    }

    println!("  blocks: total={total} free={free} occupied={}", total - free);
}

struct UsageTotals {
    pages: usize,
    bytes_used: u64,
    bytes_free: u64,
}

unsafe fn usage_totals(family: &FamilyRecord) -> UsageTotals {
    let mut totals = UsageTotals { pages: 0, bytes_used: 0, bytes_free: 0 };
    let mut cursor = family.first_page;
    while let Some(page) = cursor {
        totals.pages += 1;
        let mut block = Some(page_header::bootstrap_meta(page));
        while let Some(b) = block {
            if b.as_ref().is_free {
                totals.bytes_free += b.as_ref().block_size as u64;
            } else {
                totals.bytes_used += b.as_ref().block_size as u64;
            }
            block = b.as_ref().next;
        }
        cursor = page.as_ref().next;
    }
    totals
}

/// Totals, across every registered family, of pages held, bytes in use,
/// and bytes free.
///
/// # Safety
/// Must be called under the crate's single-threaded-use contract.
pub unsafe fn print_memory_usage(registry: &FamilyRegistry, page_size: usize) {
    let mut grand_total = UsageTotals { pages: 0, bytes_used: 0, bytes_free: 0 };

    registry.for_each(|family| {
        let totals = usage_totals(family);
        grand_total.pages += totals.pages;
        grand_total.bytes_used += totals.bytes_used;
        grand_total.bytes_free += totals.bytes_free;
    });

    println!(
        "pages={} bytes_used={} bytes_free={} page_size={page_size}",
        grand_total.pages, grand_total.bytes_used, grand_total.bytes_free
    );
}

/// Page/byte usage totals for one family.
///
/// # Safety
/// `family` must be a live, registered `FamilyRecord`.
pub unsafe fn print_memory_usage_for_family(family: &FamilyRecord) {
    let totals = usage_totals(family);
    println!(
        "family={} pages={} bytes_used={} bytes_free={}",
        family.name(),
        totals.pages,
        totals.bytes_used,
        totals.bytes_free
    );
}

/// Returns every [`AuditRecord`] still outstanding — i.e. every allocation
/// that has not been matched by a `free`. An empty result means no leaks.
pub fn check_for_leaks(audit: &[AuditRecord]) -> &[AuditRecord] {
    audit
}
