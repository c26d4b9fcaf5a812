//! 待处理队列操作
//!
//! 队列本身就是记忆文档里的 `pendingTasks` 数组，这里只提供对它的纯函数式操作，
//! 持久化由 Tick 引擎在同一次读-改-写周期内完成。

use crate::tasks::task::{CompletedTask, Task, TaskStatus};
use crate::tick::effectiveness::EffectivenessRecord;
use chrono::Utc;
use serde_json::Value;

/// 一次执行的产出，用于构建已完成记录
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub result: Value,
    pub success: bool,
    pub learnings: Vec<String>,
    pub execution_ms: u64,
    pub effectiveness: Option<EffectivenessRecord>,
}

/// 优先级数值最小的待处理任务；同优先级按插入顺序
pub fn next_task(pending: &[Task]) -> Option<&Task> {
    next_task_index(pending).map(|i| &pending[i])
}

pub fn next_task_index(pending: &[Task]) -> Option<usize> {
    pending
        .iter()
        .enumerate()
        .filter(|(_, t)| t.status == TaskStatus::Pending)
        .min_by_key(|(_, t)| t.priority)
        .map(|(i, _)| i)
}

pub fn enqueue(pending: &mut Vec<Task>, task: Task) {
    pending.push(task);
}

/// 将任务移出待处理队列并生成已完成记录；任务不在队列中时返回 `None`
pub fn complete(pending: &mut Vec<Task>, task_id: &str, outcome: TaskOutcome) -> Option<CompletedTask> {
    let index = pending.iter().position(|t| t.id == task_id)?;
    let task = pending.remove(index);
    Some(finish(task, outcome))
}

/// 不经过队列直接生成已完成记录（用于队列为空时合成的任务）
pub fn finish(mut task: Task, outcome: TaskOutcome) -> CompletedTask {
    task.status = if outcome.success {
        TaskStatus::Completed
    } else {
        TaskStatus::Failed
    };
    task.completed_at = Some(Utc::now());
    CompletedTask {
        task,
        result: outcome.result,
        success: outcome.success,
        learnings: outcome.learnings,
        execution_ms: outcome.execution_ms,
        effectiveness: outcome.effectiveness,
    }
}

/// 将某类型的待处理任务整体后移（优先级数值增加 `step`，不超过 `max`），返回受影响的任务 ID
pub fn deprioritize(pending: &mut [Task], task_type: &str, step: i64, max: i64) -> Vec<String> {
    pending
        .iter_mut()
        .filter(|t| t.task_type == task_type)
        .map(|t| {
            if t.priority < max {
                t.priority = (t.priority + step).min(max);
            }
            t.id.clone()
        })
        .collect()
}

pub fn has_pending_type(pending: &[Task], task_type: &str) -> bool {
    pending.iter().any(|t| t.task_type == task_type)
}
