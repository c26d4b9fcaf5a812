use crate::error::Result;
use crate::handlers::builtin::{HEALTH_CHECK, SELF_REFLECTION};
use crate::handlers::{HandlerContext, HandlerOutcome, TaskHandler};
use crate::tasks::queue::has_pending_type;
use crate::tasks::{Task, TaskSpec};
use crate::tick::effectiveness::Recommendation;
use async_trait::async_trait;
use serde_json::json;

/// 健康检查观察的最近已完成任务数
const RECENT_WINDOW: usize = 10;

/// 检查队列深度与近期失败率，失败过多时安排一次自我反思
pub struct HealthCheckHandler;

#[async_trait]
impl TaskHandler for HealthCheckHandler {
    fn task_type(&self) -> &str {
        HEALTH_CHECK
    }

    fn description(&self) -> &str {
        "Inspect queue depth and recent failure rate"
    }

    async fn handle(&self, _task: &Task, ctx: &mut HandlerContext<'_>) -> Result<HandlerOutcome> {
        let doc = &*ctx.document;
        let recent = doc.recent_completed(RECENT_WINDOW);
        let recent_failures = recent.iter().filter(|c| c.failed()).count();
        let failure_rate = if recent.is_empty() {
            0.0
        } else {
            recent_failures as f64 * 100.0 / recent.len() as f64
        };

        let attention: Vec<&str> = doc
            .task_effectiveness
            .iter()
            .filter(|(_, r)| r.recommendation != Recommendation::Healthy)
            .map(|(t, _)| t.as_str())
            .collect();

        let result = json!({
            "pendingTasks": doc.pending_tasks.len(),
            "completedTasks": doc.completed_tasks.len(),
            "runLogSize": doc.run_log.len(),
            "recentFailureRate": failure_rate,
            "typesNeedingAttention": attention,
        });

        let mut outcome = HandlerOutcome::new(result).learn(format!(
            "Health check: {} pending, {} completed, {:.0}% of the last {} tasks failed",
            doc.pending_tasks.len(),
            doc.completed_tasks.len(),
            failure_rate,
            recent.len()
        ));

        if !attention.is_empty() {
            outcome = outcome.learn(format!(
                "Task types needing attention: {}",
                attention.join(", ")
            ));
        }

        if failure_rate > 50.0 && !has_pending_type(&doc.pending_tasks, SELF_REFLECTION) {
            outcome = outcome.spawn(TaskSpec::new(
                SELF_REFLECTION,
                "Reflect on the elevated failure rate found by the health check",
                3,
            ));
        }

        Ok(outcome)
    }
}
