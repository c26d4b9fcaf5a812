use crate::error::Result;
use crate::handlers::builtin::{
    CONTENT_GENERATION, HEALTH_CHECK, MEMORY_MAINTENANCE, SELF_REFLECTION,
};
use crate::handlers::{HandlerContext, HandlerOutcome, TaskHandler};
use crate::tasks::queue::has_pending_type;
use crate::tasks::{Task, TaskSpec};
use crate::tick::effectiveness::Recommendation;
use async_trait::async_trait;
use serde_json::json;

/// 自我反思后补充的常规任务：(类型, 描述, 优先级)
const ROUTINE: [(&str, &str, i64); 3] = [
    (HEALTH_CHECK, "Check queue depth and recent failure rate", 3),
    (CONTENT_GENERATION, "Draft a short update about recent progress", 5),
    (MEMORY_MAINTENANCE, "Deduplicate learnings and trim old records", 7),
];

/// 回顾各任务类型的效果统计，并补齐缺失的常规任务
pub struct SelfReflectionHandler;

#[async_trait]
impl TaskHandler for SelfReflectionHandler {
    fn task_type(&self) -> &str {
        SELF_REFLECTION
    }

    fn description(&self) -> &str {
        "Review task effectiveness and queue routine work"
    }

    async fn handle(&self, _task: &Task, ctx: &mut HandlerContext<'_>) -> Result<HandlerOutcome> {
        let doc = &*ctx.document;

        let mut notes = Vec::new();
        for (task_type, record) in &doc.task_effectiveness {
            match record.recommendation {
                Recommendation::Healthy => {}
                Recommendation::Monitor => notes.push(format!(
                    "Task type '{}' is flaky ({:.0}% failures over {} runs), keep monitoring",
                    task_type, record.fail_rate, record.total_runs
                )),
                Recommendation::ReducePriority => notes.push(format!(
                    "Task type '{}' keeps failing ({:.0}% failures over {} runs), new tasks of this type are deprioritized",
                    task_type, record.fail_rate, record.total_runs
                )),
            }
        }

        let mut outcome = HandlerOutcome::new(json!({
            "reviewedTypes": doc.task_effectiveness.len(),
            "completedTasks": doc.completed_tasks.len(),
            "notes": notes,
        }));

        if notes.is_empty() {
            outcome = outcome.learn(format!(
                "Self-reflection: all {} known task types are healthy",
                doc.task_effectiveness.len()
            ));
        } else {
            for note in notes {
                outcome = outcome.learn(note);
            }
        }

        for (task_type, description, priority) in ROUTINE {
            if !has_pending_type(&doc.pending_tasks, task_type) {
                outcome = outcome.spawn(TaskSpec::new(task_type, description, priority));
            }
        }

        Ok(outcome)
    }
}
