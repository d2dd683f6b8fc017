//! Recoverable error conditions. Contract violations (double-free, a
//! pointer that was never allocated by this crate) are programmer errors,
//! not recoverable conditions, and remain `assert!`/`panic!` rather than
//! variants here.

use core::fmt;

/// Recoverable failure modes surfaced by the allocator's public facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocatorError {
    /// `register_family` was called with a name already registered.
    DuplicateFamily,
    /// `record_size` exceeds a page's usable payload capacity.
    RecordTooLarge,
    /// The host refused to map or allocate a new page.
    PageAcquisitionFailed,
    /// `allocate` was called for a family name that was never registered.
    UnknownFamily,
    /// `units * record_size` exceeds a single page's payload capacity, or
    /// `units` is not positive.
    RequestTooLarge,
}

impl fmt::Display for AllocatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocatorError::DuplicateFamily => write!(f, "family already registered"),
            AllocatorError::RecordTooLarge => {
                write!(f, "record size exceeds a page's payload capacity")
            }
            AllocatorError::PageAcquisitionFailed => write!(f, "failed to acquire a new page"),
            AllocatorError::UnknownFamily => write!(f, "no family registered under that name"),
            AllocatorError::RequestTooLarge => {
                write!(f, "requested units * record_size exceeds a page's payload capacity")
            }
        }
    }
}

impl std::error::Error for AllocatorError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_distinct() {
        let variants = [
            AllocatorError::DuplicateFamily,
            AllocatorError::RecordTooLarge,
            AllocatorError::PageAcquisitionFailed,
            AllocatorError::UnknownFamily,
            AllocatorError::RequestTooLarge,
        ];
        let mut messages: Vec<String> = variants.iter().map(|e| e.to_string()).collect();
        messages.sort();
        messages.dedup();
        assert_eq!(messages.len(), variants.len());
    }
}
