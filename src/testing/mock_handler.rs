//! Mock 任务处理器，用于测试 Tick 引擎的分派、记录与失败路径。
//!
//! ```rust
//! use echo_autopilot::testing::MockHandler;
//! use echo_autopilot::handlers::TaskHandler;
//!
//! let handler = MockHandler::new("sync")
//!     .with_learning("synced")
//!     .with_failure("upstream down");
//! assert_eq!(handler.task_type(), "sync");
//! ```

use crate::error::{AutopilotError, Result, TickError};
use crate::handlers::{HandlerContext, HandlerOutcome, TaskHandler};
use crate::tasks::{Task, TaskSpec};
use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

enum MockHandlerResponse {
    Success,
    Failure(String),
}

/// 可脚本化的 Mock 处理器。
///
/// 按顺序消费预设的成功/失败；队列耗尽后一律成功。
/// 每次成功都会带上 `with_learning` / `with_spawn` 设置的内容。
pub struct MockHandler {
    task_type: String,
    description: String,
    learnings: Vec<String>,
    spawns: Vec<TaskSpec>,
    responses: Arc<Mutex<VecDeque<MockHandlerResponse>>>,
    /// 每次调用时收到的任务 ID
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockHandler {
    pub fn new(task_type: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            description: "A mock handler for testing".to_string(),
            learnings: Vec::new(),
            spawns: Vec::new(),
            responses: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn with_learning(mut self, insight: impl Into<String>) -> Self {
        self.learnings.push(insight.into());
        self
    }

    pub fn with_spawn(mut self, spec: TaskSpec) -> Self {
        self.spawns.push(spec);
        self
    }

    /// 追加一次成功
    pub fn with_success(self) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(MockHandlerResponse::Success);
        self
    }

    /// 追加一次失败
    pub fn with_failure(self, msg: impl Into<String>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(MockHandlerResponse::Failure(msg.into()));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// 所有调用过的任务 ID（按时序排列）
    pub fn called_task_ids(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskHandler for MockHandler {
    fn task_type(&self) -> &str {
        &self.task_type
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn handle(&self, task: &Task, _ctx: &mut HandlerContext<'_>) -> Result<HandlerOutcome> {
        self.calls.lock().unwrap().push(task.id.clone());

        let response = self.responses.lock().unwrap().pop_front();
        match response {
            Some(MockHandlerResponse::Failure(msg)) => {
                Err(AutopilotError::Tick(TickError::HandlerFailed {
                    task_type: self.task_type.clone(),
                    message: msg,
                }))
            }
            Some(MockHandlerResponse::Success) | None => Ok(HandlerOutcome {
                result: json!({ "mock": true, "taskId": task.id }),
                learnings: self.learnings.clone(),
                spawned_tasks: self.spawns.clone(),
            }),
        }
    }
}
