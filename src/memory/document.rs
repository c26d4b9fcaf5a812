//! 记忆文档
//!
//! 所有队列、日志与学习记录都是同一个 JSON 文档的字段，
//! 每次 tick 整体读取、在内存中修改、再整体写回，没有局部字段更新。

use crate::tasks::{CompletedTask, Task};
use crate::tick::effectiveness::EffectivenessRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 每次 tick 一条的运行日志
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunLogEntry {
    pub tick_id: String,
    pub timestamp: DateTime<Utc>,
    pub task_id: String,
    pub task_type: String,
    pub attempt: u32,
    pub execution_ms: u64,
    pub success: bool,
    /// 截断后的结果摘要
    pub result_summary: String,
    #[serde(default)]
    pub learnings: Vec<String>,
    #[serde(default)]
    pub spawned_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adaptation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredLearning {
    pub insight: String,
    pub task_type: String,
    pub task_id: String,
    pub timestamp: DateTime<Utc>,
}

/// 模式检测触发自适应时留下的记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfImprovementNote {
    pub pattern: String,
    pub adaptation: String,
    /// 修改前的 `autonomousVersion`
    pub version_before: u64,
    #[serde(default)]
    pub related_task_ids: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemoryDocument {
    pub pending_tasks: Vec<Task>,
    pub completed_tasks: Vec<CompletedTask>,
    pub run_log: Vec<RunLogEntry>,
    pub learnings: Vec<String>,
    pub structured_learnings: Vec<StructuredLearning>,
    pub task_effectiveness: BTreeMap<String, EffectivenessRecord>,
    pub self_improvement_notes: Vec<SelfImprovementNote>,
    pub autonomous_mode: bool,
    pub autonomous_version: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub total_ticks: u64,
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self {
            pending_tasks: Vec::new(),
            completed_tasks: Vec::new(),
            run_log: Vec::new(),
            learnings: Vec::new(),
            structured_learnings: Vec::new(),
            task_effectiveness: BTreeMap::new(),
            self_improvement_notes: Vec::new(),
            autonomous_mode: true,
            autonomous_version: 0,
            last_run: None,
            total_ticks: 0,
        }
    }
}

impl MemoryDocument {
    pub fn new(autonomous_mode: bool) -> Self {
        Self {
            autonomous_mode,
            ..Self::default()
        }
    }

    /// 最近 `n` 条已完成任务，按完成顺序
    pub fn recent_completed(&self, n: usize) -> &[CompletedTask] {
        let start = self.completed_tasks.len().saturating_sub(n);
        &self.completed_tasks[start..]
    }

    /// 最近 `n` 条扁平 learnings
    pub fn recent_learnings(&self, n: usize) -> &[String] {
        let start = self.learnings.len().saturating_sub(n);
        &self.learnings[start..]
    }

    pub fn find_completed(&self, task_id: &str) -> Option<&CompletedTask> {
        self.completed_tasks.iter().find(|c| c.task.id == task_id)
    }
}

/// 保留列表末尾最新的 `max` 条
pub fn cap_oldest<T>(items: &mut Vec<T>, max: usize) {
    if items.len() > max {
        let excess = items.len() - max;
        items.drain(..excess);
    }
}
