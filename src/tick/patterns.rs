//! 失败模式检测与自适应
//!
//! 观察最近几条已完成任务，同一类型失败达到阈值时：
//! 同类型待处理任务整体后移、插入一个诊断任务、留下自我改进记录并递增版本号。

use crate::config::TickConfig;
use crate::handlers::builtin::DIAGNOSE_FAILURE;
use crate::memory::{MemoryDocument, SelfImprovementNote};
use crate::tasks::queue::{deprioritize, enqueue};
use crate::tasks::Task;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

/// 诊断任务的优先级（最先执行）
pub const DIAGNOSE_PRIORITY: i64 = 1;
pub const PATTERN_ORIGIN: &str = "pattern-detector";

#[derive(Debug, Clone, PartialEq)]
pub struct FailurePattern {
    pub task_type: String,
    pub failed_ids: Vec<String>,
}

/// 一次自适应的结果，随 tick 摘要返回
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Adaptation {
    pub pattern: String,
    pub adaptation: String,
    pub task_type: String,
    pub diagnostic_task_id: String,
    pub deprioritized: Vec<String>,
    pub version: u64,
}

/// 在最近 `pattern_window` 条已完成任务中寻找重复失败的类型
///
/// 以下情况不再触发：同类型已有待处理的诊断任务，
/// 或者这批失败已经被某条自我改进记录处理过。
pub fn detect(doc: &MemoryDocument, config: &TickConfig) -> Option<FailurePattern> {
    let recent = doc.recent_completed(config.pattern_window);

    // 按首次出现顺序分组
    let mut groups: Vec<(&str, Vec<String>)> = Vec::new();
    for record in recent.iter().filter(|c| c.failed()) {
        let task_type = record.task.task_type.as_str();
        match groups.iter_mut().find(|(t, _)| *t == task_type) {
            Some((_, ids)) => ids.push(record.task.id.clone()),
            None => groups.push((task_type, vec![record.task.id.clone()])),
        }
    }

    groups
        .into_iter()
        .filter(|(_, ids)| ids.len() >= config.pattern_threshold)
        .find(|(task_type, ids)| {
            !diagnosis_pending(doc, task_type) && !already_adapted(doc, ids)
        })
        .map(|(task_type, failed_ids)| FailurePattern {
            task_type: task_type.to_string(),
            failed_ids,
        })
}

fn diagnosis_pending(doc: &MemoryDocument, task_type: &str) -> bool {
    let marker = type_marker(task_type);
    doc.pending_tasks
        .iter()
        .any(|t| t.task_type == DIAGNOSE_FAILURE && t.description.contains(&marker))
}

fn already_adapted(doc: &MemoryDocument, ids: &[String]) -> bool {
    doc.self_improvement_notes
        .iter()
        .any(|n| ids.iter().all(|id| n.related_task_ids.contains(id)))
}

fn type_marker(task_type: &str) -> String {
    format!("'{}'", task_type)
}

/// 应用自适应：修改待处理队列、效果统计、自我改进记录和版本号
pub fn adapt(doc: &mut MemoryDocument, pattern: &FailurePattern, config: &TickConfig) -> Adaptation {
    let deprioritized = deprioritize(
        &mut doc.pending_tasks,
        &pattern.task_type,
        config.deprioritize_step,
        config.max_priority,
    );

    let diagnostic = Task::new(
        DIAGNOSE_FAILURE,
        format!(
            "Diagnose repeated {} failures: {}",
            type_marker(&pattern.task_type),
            pattern.failed_ids.join(", ")
        ),
    )
    .with_priority(DIAGNOSE_PRIORITY)
    .with_max_retries(config.default_max_retries)
    .spawned_by(PATTERN_ORIGIN)
    .with_related(pattern.failed_ids.clone());
    let diagnostic_task_id = diagnostic.id.clone();
    enqueue(&mut doc.pending_tasks, diagnostic);

    doc.task_effectiveness
        .entry(pattern.task_type.clone())
        .or_default()
        .force_reduce();

    let description = format!(
        "{} of the last {} completed tasks were failed '{}' tasks",
        pattern.failed_ids.len(),
        config.pattern_window,
        pattern.task_type
    );
    let adaptation = format!(
        "Deprioritized {} pending '{}' task(s) and queued diagnostic task {}",
        deprioritized.len(),
        pattern.task_type,
        diagnostic_task_id
    );

    let version_before = doc.autonomous_version;
    doc.self_improvement_notes.push(SelfImprovementNote {
        pattern: description.clone(),
        adaptation: adaptation.clone(),
        version_before,
        related_task_ids: pattern.failed_ids.clone(),
        timestamp: Utc::now(),
    });
    doc.autonomous_version += 1;

    info!(
        task_type = %pattern.task_type,
        failures = pattern.failed_ids.len(),
        version = doc.autonomous_version,
        "🧬 检测到失败模式，已自适应"
    );

    Adaptation {
        pattern: description,
        adaptation,
        task_type: pattern.task_type.clone(),
        diagnostic_task_id,
        deprioritized,
        version: doc.autonomous_version,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::queue::finish;
    use crate::tasks::{TaskOutcome, TaskStatus};
    use crate::tick::effectiveness::Recommendation;
    use serde_json::json;

    fn record(task_type: &str, success: bool) -> crate::tasks::CompletedTask {
        finish(
            Task::new(task_type, task_type),
            TaskOutcome {
                result: json!({}),
                success,
                learnings: vec![],
                execution_ms: 1,
                effectiveness: None,
            },
        )
    }

    #[test]
    fn test_two_of_three_failures_detected() {
        let mut doc = MemoryDocument::default();
        doc.completed_tasks = vec![
            record("sync", false),
            record("health_check", true),
            record("sync", false),
        ];

        let pattern = detect(&doc, &TickConfig::default()).unwrap();
        assert_eq!(pattern.task_type, "sync");
        assert_eq!(pattern.failed_ids.len(), 2);
    }

    #[test]
    fn test_single_failure_ignored() {
        let mut doc = MemoryDocument::default();
        doc.completed_tasks = vec![record("sync", false), record("a", false), record("b", true)];
        assert!(detect(&doc, &TickConfig::default()).is_none());
    }

    #[test]
    fn test_only_trailing_window_counts() {
        let mut doc = MemoryDocument::default();
        doc.completed_tasks = vec![
            record("sync", false),
            record("sync", false),
            record("a", true),
            record("b", true),
            record("sync", false),
        ];
        assert!(detect(&doc, &TickConfig::default()).is_none());
    }

    #[test]
    fn test_adapt_deprioritizes_and_queues_diagnosis() {
        let config = TickConfig::default();
        let mut doc = MemoryDocument::default();
        doc.completed_tasks = vec![record("sync", false), record("sync", false), record("sync", false)];
        doc.pending_tasks.push(Task::new("sync", "retry sync").with_priority(2));
        doc.pending_tasks.push(Task::new("other", "unrelated").with_priority(2));

        let pattern = detect(&doc, &config).unwrap();
        let adaptation = adapt(&mut doc, &pattern, &config);

        assert_eq!(doc.pending_tasks[0].priority, 7);
        assert_eq!(doc.pending_tasks[1].priority, 2);
        let diagnostic = doc.pending_tasks.last().unwrap();
        assert_eq!(diagnostic.task_type, DIAGNOSE_FAILURE);
        assert_eq!(diagnostic.priority, DIAGNOSE_PRIORITY);
        assert_eq!(diagnostic.status, TaskStatus::Pending);
        assert_eq!(diagnostic.related_task_ids.len(), 3);
        for id in &pattern.failed_ids {
            assert!(diagnostic.description.contains(id.as_str()));
        }

        assert_eq!(doc.autonomous_version, 1);
        assert_eq!(doc.self_improvement_notes.len(), 1);
        assert_eq!(doc.self_improvement_notes[0].version_before, 0);
        assert_eq!(
            doc.task_effectiveness["sync"].recommendation,
            Recommendation::ReducePriority
        );
        assert_eq!(adaptation.deprioritized.len(), 1);
    }

    #[test]
    fn test_not_repeated_while_diagnosis_pending_or_done() {
        let config = TickConfig::default();
        let mut doc = MemoryDocument::default();
        doc.completed_tasks = vec![record("sync", false), record("sync", false)];

        let pattern = detect(&doc, &config).unwrap();
        adapt(&mut doc, &pattern, &config);
        assert!(detect(&doc, &config).is_none());

        // 诊断任务完成后，同一批失败也不再触发
        doc.pending_tasks.clear();
        assert!(detect(&doc, &config).is_none());

        // 新的失败会再次触发
        doc.completed_tasks.push(record("sync", false));
        doc.completed_tasks.push(record("sync", false));
        assert!(detect(&doc, &config).is_some());
    }
}
