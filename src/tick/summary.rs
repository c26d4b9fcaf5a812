//! Tick 结果与只读报告

use crate::memory::{MemoryDocument, StructuredLearning};
use crate::tasks::Task;
use crate::tick::effectiveness::EffectivenessRecord;
use crate::tick::patterns::Adaptation;
use crate::tick::planner::TaskSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// 摘要中的任务简况
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskBrief {
    pub id: String,
    #[serde(rename = "type")]
    pub task_type: String,
    pub description: String,
    pub priority: i64,
    pub attempt: u32,
}

impl From<&Task> for TaskBrief {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            task_type: task.task_type.clone(),
            description: task.description.clone(),
            priority: task.priority,
            attempt: task.attempt_count,
        }
    }
}

/// 一次完整 tick 的结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickSummary {
    pub tick_id: String,
    pub task: TaskBrief,
    pub task_source: TaskSource,
    pub result: Value,
    pub success: bool,
    pub learnings: Vec<String>,
    pub spawned_tasks: Vec<TaskBrief>,
    /// 新进入待处理队列的任务数（含诊断任务与重试任务）
    pub tasks_spawned: usize,
    pub adaptation: Option<Adaptation>,
    /// 因超过重试上限被移出队列的任务
    pub stuck_tasks: Vec<String>,
    pub elapsed_ms: u64,
    pub memory_written: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_error: Option<String>,
    pub pending_count: usize,
    pub completed_count: usize,
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedTick {
    pub tick_id: String,
    pub reason: String,
    pub pending_count: usize,
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TickReport {
    Completed(TickSummary),
    Skipped(SkippedTick),
}

impl TickReport {
    pub fn summary(&self) -> Option<&TickSummary> {
        match self {
            TickReport::Completed(s) => Some(s),
            TickReport::Skipped(_) => None,
        }
    }
}

/// `GET /status` 报告
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub autonomous_mode: bool,
    pub version: u64,
    pub pending_count: usize,
    pub completed_count: usize,
    pub total_ticks: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub next_task: Option<TaskBrief>,
    pub recent_learnings: Vec<String>,
}

impl StatusReport {
    pub fn from_document(doc: &MemoryDocument) -> Self {
        Self {
            autonomous_mode: doc.autonomous_mode,
            version: doc.autonomous_version,
            pending_count: doc.pending_tasks.len(),
            completed_count: doc.completed_tasks.len(),
            total_ticks: doc.total_ticks,
            last_run: doc.last_run,
            next_task: crate::tasks::queue::next_task(&doc.pending_tasks).map(TaskBrief::from),
            recent_learnings: doc.recent_learnings(5).to_vec(),
        }
    }
}

/// `GET /learnings` 报告
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningsReport {
    pub learnings: Vec<String>,
    pub structured_learnings: Vec<StructuredLearning>,
    pub task_effectiveness: BTreeMap<String, EffectivenessRecord>,
}

impl LearningsReport {
    pub fn from_document(doc: &MemoryDocument) -> Self {
        Self {
            learnings: doc.learnings.clone(),
            structured_learnings: doc.structured_learnings.clone(),
            task_effectiveness: doc.task_effectiveness.clone(),
        }
    }
}
