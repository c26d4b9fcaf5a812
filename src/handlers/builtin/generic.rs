use crate::error::Result;
use crate::handlers::builtin::{BUILD_HANDLER, GENERIC};
use crate::handlers::{HandlerContext, HandlerOutcome, TaskHandler};
use crate::tasks::{Task, TaskSpec};
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

/// 未注册类型的兜底处理器
///
/// 不视为失败：把缺口记成 learning，并派生一个 `build_handler` 任务，
/// 让队列自己记录它处理不了什么。
pub struct GenericHandler;

#[async_trait]
impl TaskHandler for GenericHandler {
    fn task_type(&self) -> &str {
        GENERIC
    }

    fn description(&self) -> &str {
        "Fallback for task types without a registered handler"
    }

    async fn handle(&self, task: &Task, ctx: &mut HandlerContext<'_>) -> Result<HandlerOutcome> {
        info!(task_type = %task.task_type, task_id = %task.id, "🕳️ 未注册的任务类型");

        if task.task_type == BUILD_HANDLER {
            return Ok(HandlerOutcome::new(json!({
                "handled": false,
                "awaitingOperator": true,
            }))
            .learn(format!("Awaiting operator: {}", task.description)));
        }

        let marker = handler_marker(&task.task_type);
        let already_queued = ctx
            .document
            .pending_tasks
            .iter()
            .any(|t| t.task_type == BUILD_HANDLER && t.description.contains(&marker));

        let mut outcome = HandlerOutcome::new(json!({
            "handled": false,
            "message": format!("no handler registered for task type '{}'", task.task_type),
        }))
        .learn(format!(
            "No handler registered for task type '{}' (task {})",
            task.task_type, task.id
        ));

        if !already_queued {
            outcome = outcome.spawn(TaskSpec::new(
                BUILD_HANDLER,
                format!("Build a handler for {}: {}", marker, task.description),
                8,
            ));
        }
        Ok(outcome)
    }
}

fn handler_marker(task_type: &str) -> String {
    format!("task type '{}'", task_type)
}
