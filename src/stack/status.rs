//! Provider stack status classification.

/// Which way a stack status string points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusClass {
    Success,
    Failure,
    InProgress,
}

pub const SUCCESS_STATUSES: &[&str] = &["CREATE_COMPLETE", "UPDATE_COMPLETE", "IMPORT_COMPLETE"];

pub const FAILURE_STATUSES: &[&str] = &[
    "CREATE_FAILED",
    "ROLLBACK_COMPLETE",
    "ROLLBACK_FAILED",
    "DELETE_COMPLETE",
    "DELETE_FAILED",
    "UPDATE_FAILED",
    "UPDATE_ROLLBACK_COMPLETE",
    "UPDATE_ROLLBACK_FAILED",
    "IMPORT_ROLLBACK_COMPLETE",
    "IMPORT_ROLLBACK_FAILED",
];

/// Unknown statuses count as in progress, so a new provider status makes
/// the caller wait rather than declare an outcome.
pub fn classify(status: &str) -> StatusClass {
    if SUCCESS_STATUSES.contains(&status) {
        StatusClass::Success
    } else if FAILURE_STATUSES.contains(&status) {
        StatusClass::Failure
    } else {
        StatusClass::InProgress
    }
}

/// Whether a resource event status marks a failure or a rollback step.
pub fn is_failure_event(status: &str) -> bool {
    status.contains("FAILED") || status.contains("ROLLBACK")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert_eq!(classify("CREATE_COMPLETE"), StatusClass::Success);
        assert_eq!(classify("UPDATE_COMPLETE"), StatusClass::Success);
        assert_eq!(classify("ROLLBACK_COMPLETE"), StatusClass::Failure);
        assert_eq!(classify("UPDATE_ROLLBACK_COMPLETE"), StatusClass::Failure);
        assert_eq!(classify("CREATE_FAILED"), StatusClass::Failure);
    }

    #[test]
    fn transitional_and_unknown_are_in_progress() {
        for status in [
            "CREATE_IN_PROGRESS",
            "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS",
            "UPDATE_ROLLBACK_IN_PROGRESS",
            "REVIEW_IN_PROGRESS",
            "SOMETHING_NEW",
            "",
        ] {
            assert_eq!(classify(status), StatusClass::InProgress, "{}", status);
        }
    }

    #[test]
    fn failure_events() {
        assert!(is_failure_event("CREATE_FAILED"));
        assert!(is_failure_event("UPDATE_ROLLBACK_IN_PROGRESS"));
        assert!(!is_failure_event("CREATE_COMPLETE"));
    }
}
