//! 任务定义

use crate::tick::effectiveness::EffectivenessRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// 默认优先级（数值越小越先执行）
pub const DEFAULT_PRIORITY: i64 = 5;

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// 待处理
    #[default]
    Pending,
    /// 已完成
    Completed,
    /// 失败
    Failed,
    /// 超过最大重试次数，不再调度
    Stuck,
}

impl TaskStatus {
    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Stuck => "stuck",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// 任务 ID
    pub id: String,
    /// 处理器类型标签
    #[serde(rename = "type")]
    pub task_type: String,
    /// 任务描述
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_priority")]
    pub priority: i64,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub attempt_count: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// 派生该任务的任务 ID 或固定来源标签
    #[serde(default)]
    pub spawned_by: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// 诊断类任务引用的相关任务
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_task_ids: Vec<String>,
}

fn default_priority() -> i64 {
    DEFAULT_PRIORITY
}

fn default_max_retries() -> u32 {
    3
}

impl Task {
    pub fn new(task_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: new_task_id(),
            task_type: task_type.into(),
            description: description.into(),
            priority: DEFAULT_PRIORITY,
            status: TaskStatus::Pending,
            attempt_count: 0,
            max_retries: default_max_retries(),
            spawned_by: None,
            created_at: Utc::now(),
            completed_at: None,
            related_task_ids: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn spawned_by(mut self, origin: impl Into<String>) -> Self {
        self.spawned_by = Some(origin.into());
        self
    }

    pub fn with_related(mut self, ids: Vec<String>) -> Self {
        self.related_task_ids = ids;
        self
    }

    /// 是否已用完重试次数
    pub fn retries_exhausted(&self) -> bool {
        self.attempt_count >= self.max_retries
    }
}

pub fn new_task_id() -> String {
    format!("task_{}", Uuid::new_v4().simple())
}

/// 处理器请求派生的新任务
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    #[serde(rename = "type")]
    pub task_type: String,
    pub description: String,
    #[serde(default = "default_priority")]
    pub priority: i64,
}

impl TaskSpec {
    pub fn new(task_type: impl Into<String>, description: impl Into<String>, priority: i64) -> Self {
        Self {
            task_type: task_type.into(),
            description: description.into(),
            priority,
        }
    }
}

/// 已完成列表中的记录：任务本身 + 执行结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedTask {
    #[serde(flatten)]
    pub task: Task,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub learnings: Vec<String>,
    #[serde(default)]
    pub execution_ms: u64,
    /// 完成时该类型的效果统计快照
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effectiveness: Option<EffectivenessRecord>,
}

impl CompletedTask {
    pub fn failed(&self) -> bool {
        self.task.status == TaskStatus::Failed
    }

    /// 结果中的错误信息（若有）
    pub fn error_message(&self) -> Option<&str> {
        self.result.get("error").and_then(Value::as_str)
    }
}
