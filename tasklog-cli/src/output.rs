//! Text the `todo` command prints.

use tasklog::Task;

/// Printed after a successful `add`.
pub const ADDED: &str = "task added successfully";

/// Printed after a successful `complete`.
pub const COMPLETED: &str = "task completed successfully";

/// One `list` line: a status mark, the id and the text.
pub fn task_line(task: &Task) -> String {
    let mark = if task.done { "👍" } else { "😱" };
    format!("{mark} {}: {}", task.id, task.text)
}

/// Join the words after `add` into the task text.
pub fn task_text(words: &[String]) -> String {
    words.join(" ")
}
