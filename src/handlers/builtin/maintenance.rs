use crate::error::Result;
use crate::handlers::builtin::MEMORY_MAINTENANCE;
use crate::handlers::{HandlerContext, HandlerOutcome, TaskHandler};
use crate::memory::document::cap_oldest;
use crate::tasks::Task;
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;

/// 整理记忆文档：learnings 去重（保留最新一次出现），并按上限裁剪各列表
pub struct MemoryMaintenanceHandler;

#[async_trait]
impl TaskHandler for MemoryMaintenanceHandler {
    fn task_type(&self) -> &str {
        MEMORY_MAINTENANCE
    }

    fn description(&self) -> &str {
        "Deduplicate learnings and trim bounded lists"
    }

    async fn handle(&self, _task: &Task, ctx: &mut HandlerContext<'_>) -> Result<HandlerOutcome> {
        let config = ctx.config;
        let doc = &mut *ctx.document;

        let learnings_before = doc.learnings.len();
        let mut seen = HashSet::new();
        let mut deduped: Vec<String> = doc
            .learnings
            .drain(..)
            .rev()
            .filter(|l| seen.insert(l.clone()))
            .collect();
        deduped.reverse();
        doc.learnings = deduped;
        let duplicates_removed = learnings_before - doc.learnings.len();

        let completed_before = doc.completed_tasks.len();
        cap_oldest(&mut doc.completed_tasks, config.max_completed);
        cap_oldest(&mut doc.learnings, config.max_learnings);
        cap_oldest(&mut doc.structured_learnings, config.max_structured_learnings);
        cap_oldest(&mut doc.run_log, config.max_run_log);
        cap_oldest(&mut doc.self_improvement_notes, config.max_self_improvement_notes);
        let completed_trimmed = completed_before - doc.completed_tasks.len();

        let result = json!({
            "learningsBefore": learnings_before,
            "learningsAfter": doc.learnings.len(),
            "duplicatesRemoved": duplicates_removed,
            "completedTrimmed": completed_trimmed,
            "completedTasks": doc.completed_tasks.len(),
        });

        Ok(HandlerOutcome::new(result).learn(format!(
            "Memory maintenance removed {} duplicate learnings and trimmed {} completed tasks",
            duplicates_removed, completed_trimmed
        )))
    }
}
