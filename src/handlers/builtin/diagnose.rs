use crate::error::Result;
use crate::handlers::builtin::DIAGNOSE_FAILURE;
use crate::handlers::{HandlerContext, HandlerOutcome, TaskHandler};
use crate::tasks::Task;
use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeMap;

/// 汇总相关失败任务的错误信息，找出最常见的错误
pub struct DiagnoseFailureHandler;

#[async_trait]
impl TaskHandler for DiagnoseFailureHandler {
    fn task_type(&self) -> &str {
        DIAGNOSE_FAILURE
    }

    fn description(&self) -> &str {
        "Summarize errors of a repeated failure pattern"
    }

    async fn handle(&self, task: &Task, ctx: &mut HandlerContext<'_>) -> Result<HandlerOutcome> {
        let doc = &*ctx.document;

        let failures: Vec<_> = task
            .related_task_ids
            .iter()
            .filter_map(|id| doc.find_completed(id))
            .collect();

        if failures.is_empty() {
            return Ok(HandlerOutcome::new(json!({
                "failures": [],
                "relatedTaskIds": task.related_task_ids,
            }))
            .learn(format!(
                "Diagnosis found no completed records for {}",
                describe_ids(&task.related_task_ids)
            )));
        }

        let mut by_error: BTreeMap<&str, usize> = BTreeMap::new();
        for failure in &failures {
            *by_error
                .entry(failure.error_message().unwrap_or("no error message"))
                .or_default() += 1;
        }
        // 出现次数最多者；次数相同时取字典序最小的，保证结果稳定
        let (common_error, count) = by_error
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(e, c)| (*e, *c))
            .unwrap_or(("no error message", 0));

        let mut types: Vec<&str> = failures.iter().map(|f| f.task.task_type.as_str()).collect();
        types.sort_unstable();
        types.dedup();

        let details: Vec<_> = failures
            .iter()
            .map(|f| {
                json!({
                    "id": f.task.id,
                    "type": f.task.task_type,
                    "error": f.error_message(),
                })
            })
            .collect();

        Ok(HandlerOutcome::new(json!({
            "failures": details,
            "commonError": common_error,
            "occurrences": count,
        }))
        .learn(format!(
            "Diagnosis for '{}': {} failures, most common error ({}x): {}",
            types.join(", "),
            failures.len(),
            count,
            common_error
        )))
    }
}

fn describe_ids(ids: &[String]) -> String {
    if ids.is_empty() {
        "an empty failure list".to_string()
    } else {
        ids.join(", ")
    }
}
