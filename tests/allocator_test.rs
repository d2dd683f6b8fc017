//! End-to-end exercise of the public facade: register a family, drive it
//! through enough allocate/free traffic to force page growth and page
//! reclamation, and check the leak audit throughout.

use std::sync::Mutex;

// The crate's global state is process-wide; serialize the tests in this
// file so they don't interleave with each other.
static LOCK: Mutex<()> = Mutex::new(());

#[test]
fn register_then_allocate_and_free_many_records() {
    let _guard = LOCK.lock().unwrap();
    vmslab::init();
    vmslab::register_family("allocator_test_widget", 40).unwrap();

    let mut live = Vec::new();
    unsafe {
        for _ in 0..256 {
            let ptr = vmslab::allocate("allocator_test_widget", 1).unwrap();
            assert!(!ptr.is_null());
            live.push(ptr);
        }
    }

    assert_eq!(vmslab::check_for_leaks().len(), live.len());

    unsafe {
        for ptr in live.drain(..) {
            vmslab::free(ptr);
        }
    }

    assert!(vmslab::check_for_leaks().is_empty());
}

#[test]
fn pages_are_reclaimed_once_fully_freed() {
    let _guard = LOCK.lock().unwrap();
    vmslab::register_family("allocator_test_reclaim", 24).unwrap();

    let mut live = Vec::new();
    unsafe {
        // Enough allocations to guarantee at least a second page.
        for _ in 0..1024 {
            live.push(vmslab::allocate("allocator_test_reclaim", 1).unwrap());
        }
        for ptr in live.drain(..) {
            vmslab::free(ptr);
        }
    }

    // Every page should have collapsed back to empty and been returned to
    // the host; nothing left to leak-check.
    assert!(vmslab::check_for_leaks().is_empty());

    // The family is still usable afterwards — it must re-acquire a page.
    unsafe {
        let ptr = vmslab::allocate("allocator_test_reclaim", 1).unwrap();
        assert!(!ptr.is_null());
        vmslab::free(ptr);
    }
}

#[test]
fn multi_unit_allocation_spans_contiguous_records() {
    let _guard = LOCK.lock().unwrap();
    vmslab::register_family("allocator_test_multiunit", 20).unwrap();

    unsafe {
        let ptr = vmslab::allocate("allocator_test_multiunit", 5).unwrap();
        // The whole 100-byte span must be writable and distinct from any
        // other live allocation.
        std::ptr::write_bytes(ptr, 0x5a, 100);
        let bytes = std::slice::from_raw_parts(ptr, 100);
        assert!(bytes.iter().all(|&b| b == 0x5a));
        vmslab::free(ptr);
    }
}

#[test]
fn allocating_from_an_unregistered_family_returns_none() {
    let _guard = LOCK.lock().unwrap();
    let result = unsafe { vmslab::allocate("allocator_test_no_such_family", 1) };
    assert!(result.is_none());

    let err = unsafe { vmslab::try_allocate("allocator_test_no_such_family", 1) }.unwrap_err();
    assert_eq!(err, vmslab::AllocatorError::UnknownFamily);
}

#[test]
fn registering_the_same_family_twice_is_rejected() {
    let _guard = LOCK.lock().unwrap();
    vmslab::register_family("allocator_test_dup", 12).unwrap();
    let err = vmslab::register_family("allocator_test_dup", 12).unwrap_err();
    assert_eq!(err, vmslab::AllocatorError::DuplicateFamily);
}

#[test]
fn diagnostics_do_not_panic_on_populated_state() {
    let _guard = LOCK.lock().unwrap();
    vmslab::register_family("allocator_test_diag", 16).unwrap();
    let ptr = unsafe { vmslab::allocate("allocator_test_diag", 1).unwrap() };

    vmslab::print_registered_families();
    vmslab::print_block_usage("allocator_test_diag").unwrap();
    vmslab::print_memory_usage(None).unwrap();
    vmslab::print_memory_usage(Some("allocator_test_diag")).unwrap();

    unsafe { vmslab::free(ptr) };
}
