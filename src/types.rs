//! Core domain types for tasklog.

/// Largest task id the record format can carry. Ids are stored as a signed
/// 32-bit protobuf field.
pub const MAX_TASK_ID: u64 = i32::MAX as u64;

/// A persisted task.
///
/// The `id` is assigned at creation time as one more than the number of records
/// already in the log, so ids are 1-based and follow creation order. A task is
/// never modified in place; completing it rewrites the whole log with `done`
/// flipped on the in-memory copy.
///
/// # Fields
///
/// * `id` - 1-based creation position.
/// * `text` - Free-form task description.
/// * `done` - Whether the task has been completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// 1-based creation position.
    pub id: u64,
    /// Free-form task description.
    pub text: String,
    /// Whether the task has been completed.
    pub done: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_task_id_matches_i32_range() {
        assert_eq!(MAX_TASK_ID, 2_147_483_647);
    }

    #[test]
    fn tasks_differing_only_in_done_are_not_equal() {
        let open = Task {
            id: 1,
            text: "water the plants".to_string(),
            done: false,
        };
        let closed = Task {
            done: true,
            ..open.clone()
        };
        assert_ne!(open, closed);
    }
}
