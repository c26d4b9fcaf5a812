pub mod queue;
mod task;

pub use queue::TaskOutcome;
pub use task::{CompletedTask, DEFAULT_PRIORITY, Task, TaskSpec, TaskStatus, new_task_id};
