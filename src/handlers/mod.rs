//! 任务处理器
//!
//! 定义 [`TaskHandler`] trait 和 [`HandlerRegistry`]（按任务类型注册与分派）。
//! 内置处理器位于 [`builtin`]；未注册的类型统一落到 [`builtin::GenericHandler`]，
//! 由它把缺口记成 learning 并派生一个补齐处理器的后续任务。

pub mod builtin;

use crate::config::TickConfig;
use crate::error::Result;
use crate::llm::LlmClient;
use crate::memory::MemoryDocument;
use crate::tasks::{Task, TaskSpec};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// 处理器执行结果
#[derive(Debug, Clone, Default)]
pub struct HandlerOutcome {
    pub result: Value,
    pub learnings: Vec<String>,
    pub spawned_tasks: Vec<TaskSpec>,
}

impl HandlerOutcome {
    pub fn new(result: Value) -> Self {
        Self {
            result,
            learnings: Vec::new(),
            spawned_tasks: Vec::new(),
        }
    }

    pub fn learn(mut self, insight: impl Into<String>) -> Self {
        self.learnings.push(insight.into());
        self
    }

    pub fn spawn(mut self, spec: TaskSpec) -> Self {
        self.spawned_tasks.push(spec);
        self
    }
}

/// 处理器可见的运行上下文
pub struct HandlerContext<'a> {
    /// 当前 tick 正在修改的记忆文档
    pub document: &'a mut MemoryDocument,
    pub llm: Option<&'a dyn LlmClient>,
    pub config: &'a TickConfig,
}

/// 任务处理器接口，所有内置和自定义处理器均实现此 trait
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// 处理的任务类型标签
    fn task_type(&self) -> &str;
    fn description(&self) -> &str;
    async fn handle(&self, task: &Task, ctx: &mut HandlerContext<'_>) -> Result<HandlerOutcome>;
}

pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
    fallback: Arc<dyn TaskHandler>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerRegistry {
    /// 空注册表，只有兜底处理器
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: Arc::new(builtin::GenericHandler),
        }
    }

    /// 注册全部内置处理器
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register_handlers(builtin::all());
        registry
    }

    pub fn register(&mut self, handler: Arc<dyn TaskHandler>) {
        self.handlers
            .insert(handler.task_type().to_string(), handler);
    }

    pub fn register_handlers(&mut self, handlers: Vec<Arc<dyn TaskHandler>>) {
        for handler in handlers {
            self.register(handler);
        }
    }

    pub fn is_registered(&self, task_type: &str) -> bool {
        self.handlers.contains_key(task_type)
    }

    /// 已注册的类型（排序后）
    pub fn list_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(|k| k.as_str()).collect();
        types.sort_unstable();
        types
    }

    /// 按类型查找处理器，未注册时返回兜底处理器
    pub fn resolve(&self, task_type: &str) -> Arc<dyn TaskHandler> {
        self.handlers
            .get(task_type)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }
}
