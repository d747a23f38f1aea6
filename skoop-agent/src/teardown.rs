//! Best-effort release of a group of kernel resources

use log::warn;
use std::fmt::Display;
use thiserror::Error;

/// First failure seen while releasing a resource group
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to close {resource}: {message} ({failed} resource(s) failed to close)")]
pub struct TeardownError {
    pub resource: String,
    pub message: String,
    pub failed: usize,
}

/// Close every resource in order, even after a failure.
///
/// Returns the first error; later failures are logged and counted.
pub fn close_all<T, E, I, F>(resources: I, mut close: F) -> Result<(), TeardownError>
where
    I: IntoIterator<Item = (String, T)>,
    F: FnMut(T) -> Result<(), E>,
    E: Display,
{
    let mut first: Option<TeardownError> = None;
    let mut failed = 0;

    for (name, resource) in resources {
        if let Err(e) = close(resource) {
            failed += 1;
            warn!("Failed to close {}: {}", name, e);
            if first.is_none() {
                first = Some(TeardownError {
                    resource: name,
                    message: e.to_string(),
                    failed: 0,
                });
            }
        }
    }

    match first {
        Some(err) => Err(TeardownError { failed, ..err }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_all_attempts_every_resource() {
        let mut closed = Vec::new();
        let resources = vec![
            ("trace_sendactive".to_string(), 1),
            ("trace_sendreset".to_string(), 2),
            ("EVENTS".to_string(), 3),
            ("STACKS".to_string(), 4),
        ];

        let err = close_all(resources, |id| {
            closed.push(id);
            match id {
                2 => Err("detach failed"),
                4 => Err("map busy"),
                _ => Ok(()),
            }
        })
        .unwrap_err();

        assert_eq!(closed, vec![1, 2, 3, 4]);
        assert_eq!(err.resource, "trace_sendreset");
        assert_eq!(err.message, "detach failed");
        assert_eq!(err.failed, 2);
    }

    #[test]
    fn test_close_all_ok() {
        let resources = vec![("EVENTS".to_string(), ())];
        assert!(close_all(resources, |_| Ok::<(), String>(())).is_ok());

        let empty: Vec<(String, ())> = Vec::new();
        assert!(close_all(empty, |_| Err("unreachable")).is_ok());
    }
}
