//! Conversion of engine enumerations into owned arrays.

use nix::errno::Errno;
use nix::unistd::Pid;
use tether_core::error::EngineError;

use crate::engine::ListEntry;

/// Converts the engine's container enumeration into names.
///
/// An entry without a name becomes an empty string.
///
/// # Errors
///
/// Returns an `ENOMEM` error if the result cannot be allocated; the
/// enumeration is released before returning.
pub fn container_names(entries: Vec<ListEntry>) -> Result<Vec<String>, EngineError> {
    let mut names = Vec::new();
    names
        .try_reserve_exact(entries.len())
        .map_err(|_| EngineError::with_errno(Errno::ENOMEM, "cannot allocate container list"))?;
    names.extend(entries.into_iter().map(|entry| entry.name.unwrap_or_default()));
    Ok(names)
}

/// Converts the engine's process enumeration into raw PIDs.
///
/// # Errors
///
/// Returns an `ENOMEM` error if the result cannot be allocated; the
/// enumeration is released before returning.
pub fn pid_list(pids: Vec<Pid>) -> Result<Vec<i32>, EngineError> {
    let mut out = Vec::new();
    out.try_reserve_exact(pids.len())
        .map_err(|_| EngineError::with_errno(Errno::ENOMEM, "cannot allocate pid list"))?;
    out.extend(pids.iter().map(|pid| pid.as_raw()));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_enumeration_is_empty_list() {
        assert!(container_names(Vec::new()).expect("names").is_empty());
        assert!(pid_list(Vec::new()).expect("pids").is_empty());
    }

    #[test]
    fn names_keep_order_and_blank_missing_entries() {
        let entries = vec![ListEntry::named("b"), ListEntry::default(), ListEntry::named("a")];
        assert_eq!(container_names(entries).expect("names"), vec!["b", "", "a"]);
    }

    #[test]
    fn pids_are_raw_values() {
        let pids = vec![Pid::from_raw(10), Pid::from_raw(42)];
        assert_eq!(pid_list(pids).expect("pids"), vec![10, 42]);
    }
}
