//! Server error codes the mongodb crate has no constants for.

use mongodb::error::{Error as DbError, ErrorKind, WriteFailure};

/// Raised when a write would violate a unique index.
const DUPLICATE_KEY: i32 = 11000;

/// Whether `err` reports a unique index violation, either as a write error
/// (inserts, updates) or a command error (find-and-modify).
pub fn is_duplicate_key(err: &DbError) -> bool {
    match *err.kind {
        ErrorKind::Write(WriteFailure::WriteError(ref e)) => e.code == DUPLICATE_KEY,
        ErrorKind::Command(ref e) => e.code == DUPLICATE_KEY,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn other_errors_are_not_duplicates() {
        let err = DbError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset",
        ));
        assert!(!is_duplicate_key(&err));
    }
}
