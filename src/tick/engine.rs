//! Tick 引擎
//!
//! 每次调用 [`TickEngine::tick`] 完整执行一遍状态机：
//!
//! ```text
//! LOADING → PATTERN_CHECK → TASK_SELECT → EXECUTING → RECORDING → PERSISTING → DONE
//! ```
//!
//! 读取失败直接中止且不修改存储；处理器失败只把任务记为失败；
//! 写回失败（修订号冲突或网络错误）时仍返回计算结果，但 `memoryWritten = false`，
//! 本次 tick 的修改不会回滚也不会重试，下次读取时即丢失。

use crate::config::TickConfig;
use crate::error::{Result, TickError};
use crate::handlers::{HandlerContext, HandlerRegistry};
use crate::llm::LlmClient;
use crate::memory::document::cap_oldest;
use crate::memory::{DocumentStore, MemoryDocument, Revision, RunLogEntry, StructuredLearning};
use crate::tasks::queue::{self, TaskOutcome};
use crate::tasks::{Task, TaskStatus};
use crate::tick::effectiveness::adjusted_priority;
use crate::tick::patterns;
use crate::tick::planner::{self, TaskSource};
use crate::tick::summary::{
    LearningsReport, SkippedTick, StatusReport, TaskBrief, TickReport, TickSummary,
};
use chrono::Utc;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct TickEngine {
    store: Arc<dyn DocumentStore>,
    registry: Arc<HandlerRegistry>,
    llm: Option<Arc<dyn LlmClient>>,
    config: TickConfig,
}

impl TickEngine {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        registry: Arc<HandlerRegistry>,
        config: TickConfig,
    ) -> Self {
        Self {
            store,
            registry,
            llm: None,
            config,
        }
    }

    /// 配置 LLM，用于空队列时的任务规划和内容生成
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn llm(&self) -> Option<&Arc<dyn LlmClient>> {
        self.llm.as_ref()
    }

    pub fn config(&self) -> &TickConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// 执行一次完整的 tick
    pub async fn tick(&self) -> Result<TickReport> {
        let started = Instant::now();
        let tick_id = format!("tick_{}", Uuid::new_v4().simple());

        // ── LOADING ──────────────────────────────────────────────────────────
        let (mut doc, revision) = self.load_or_init().await?;
        if !doc.autonomous_mode {
            info!(tick = %tick_id, "⏸️ 自主模式已关闭，跳过本次 tick");
            return Ok(TickReport::Skipped(SkippedTick {
                tick_id,
                reason: "autonomous mode is disabled".to_string(),
                pending_count: doc.pending_tasks.len(),
                version: doc.autonomous_version,
            }));
        }

        // ── PATTERN_CHECK ────────────────────────────────────────────────────
        let mut spawned: Vec<TaskBrief> = Vec::new();
        let adaptation = patterns::detect(&doc, &self.config)
            .map(|pattern| patterns::adapt(&mut doc, &pattern, &self.config));
        if let Some(adaptation) = &adaptation
            && let Some(diagnostic) = doc
                .pending_tasks
                .iter()
                .find(|t| t.id == adaptation.diagnostic_task_id)
        {
            spawned.push(TaskBrief::from(diagnostic));
        }

        // ── TASK_SELECT ──────────────────────────────────────────────────────
        let mut stuck_tasks = Vec::new();
        let mut tick_learnings = Vec::new();
        let (task, source) = loop {
            let Some(index) = queue::next_task_index(&doc.pending_tasks) else {
                let known = self.registry.list_types();
                let (mut task, source) =
                    planner::synthesize(self.llm.as_deref(), &doc, &known, &self.config).await;
                task.attempt_count += 1;
                break (task, source);
            };
            if doc.pending_tasks[index].retries_exhausted() {
                let stuck = doc.pending_tasks.remove(index);
                tick_learnings.push(mark_stuck(&mut doc, stuck, &mut stuck_tasks));
                continue;
            }
            let selected = &mut doc.pending_tasks[index];
            selected.attempt_count += 1;
            break (selected.clone(), TaskSource::Queue);
        };

        // ── EXECUTING ────────────────────────────────────────────────────────
        info!(
            tick = %tick_id,
            task_id = %task.id,
            task_type = %task.task_type,
            attempt = task.attempt_count,
            "▶️ 执行任务"
        );
        let handler = self.registry.resolve(&task.task_type);
        let exec_started = Instant::now();
        let handled = {
            let mut ctx = HandlerContext {
                document: &mut doc,
                llm: self.llm.as_deref(),
                config: &self.config,
            };
            handler.handle(&task, &mut ctx).await
        };
        let execution_ms = exec_started.elapsed().as_millis() as u64;

        let (success, result, learnings, specs) = match handled {
            Ok(outcome) => (
                true,
                outcome.result,
                outcome.learnings,
                outcome.spawned_tasks,
            ),
            Err(e) => {
                warn!(task_id = %task.id, task_type = %task.task_type, error = %e, "❌ 任务执行失败");
                let learning = format!(
                    "Task type '{}' failed on attempt {}: {}",
                    task.task_type, task.attempt_count, e
                );
                (false, json!({ "error": e.to_string() }), vec![learning], Vec::new())
            }
        };

        // ── RECORDING ────────────────────────────────────────────────────────
        let effectiveness = {
            let record = doc
                .task_effectiveness
                .entry(task.task_type.clone())
                .or_default();
            record.record(
                success,
                execution_ms,
                self.config.pattern_window,
                self.config.pattern_threshold,
            );
            record.clone()
        };

        let outcome = TaskOutcome {
            result: result.clone(),
            success,
            learnings: learnings.clone(),
            execution_ms,
            effectiveness: Some(effectiveness),
        };
        let completed = match queue::complete(&mut doc.pending_tasks, &task.id, outcome.clone()) {
            Some(record) => record,
            None => queue::finish(task.clone(), outcome),
        };
        debug!(task_id = %task.id, status = completed.task.status.label(), execution_ms, "📝 任务结果已记录");
        doc.completed_tasks.push(completed);

        for spec in specs {
            let priority = adjusted_priority(
                spec.priority,
                doc.task_effectiveness.get(&spec.task_type),
                self.config.reduce_priority_penalty,
                self.config.max_priority,
            );
            let child = Task::new(spec.task_type, spec.description)
                .with_priority(priority)
                .with_max_retries(self.config.default_max_retries)
                .spawned_by(task.id.clone());
            spawned.push(TaskBrief::from(&child));
            queue::enqueue(&mut doc.pending_tasks, child);
        }

        if !success && task.attempt_count < task.max_retries {
            let priority = adjusted_priority(
                task.priority,
                doc.task_effectiveness.get(&task.task_type),
                self.config.reduce_priority_penalty,
                self.config.max_priority,
            );
            let mut retry = Task::new(task.task_type.clone(), task.description.clone())
                .with_priority(priority)
                .with_max_retries(task.max_retries)
                .spawned_by(task.id.clone())
                .with_related(task.related_task_ids.clone());
            retry.attempt_count = task.attempt_count;
            debug!(task_id = %task.id, retry_id = %retry.id, priority, "🔁 失败任务重新入队");
            spawned.push(TaskBrief::from(&retry));
            queue::enqueue(&mut doc.pending_tasks, retry);
        }

        let now = Utc::now();
        for insight in &learnings {
            doc.learnings.push(insight.clone());
            doc.structured_learnings.push(StructuredLearning {
                insight: insight.clone(),
                task_type: task.task_type.clone(),
                task_id: task.id.clone(),
                timestamp: now,
            });
        }
        tick_learnings.extend(learnings);

        doc.run_log.push(RunLogEntry {
            tick_id: tick_id.clone(),
            timestamp: now,
            task_id: task.id.clone(),
            task_type: task.task_type.clone(),
            attempt: task.attempt_count,
            execution_ms,
            success,
            result_summary: summarize(&result, self.config.result_summary_chars),
            learnings: tick_learnings.clone(),
            spawned_count: spawned.len(),
            adaptation: adaptation.as_ref().map(|a| a.adaptation.clone()),
        });
        doc.last_run = Some(now);
        doc.total_ticks += 1;
        self.apply_caps(&mut doc);

        // ── PERSISTING ───────────────────────────────────────────────────────
        let (memory_written, write_error) = match self.store.save(&doc, revision.as_ref()).await {
            Ok(new_revision) => {
                debug!(tick = %tick_id, revision = %new_revision, "💾 记忆文档已写回");
                (true, None)
            }
            Err(e) => {
                if e.is_conflict() {
                    warn!(tick = %tick_id, error = %e, "⚔️ 修订号冲突，本次 tick 的修改被丢弃");
                } else {
                    warn!(tick = %tick_id, error = %e, "⚠️ 记忆文档写回失败");
                }
                (false, Some(e.to_string()))
            }
        };

        // ── DONE ─────────────────────────────────────────────────────────────
        let summary = TickSummary {
            tick_id,
            task: TaskBrief::from(&task),
            task_source: source,
            result,
            success,
            learnings: tick_learnings,
            tasks_spawned: spawned.len(),
            spawned_tasks: spawned,
            adaptation,
            stuck_tasks,
            elapsed_ms: started.elapsed().as_millis() as u64,
            memory_written,
            write_error,
            pending_count: doc.pending_tasks.len(),
            completed_count: doc.completed_tasks.len(),
            version: doc.autonomous_version,
        };
        info!(
            tick = %summary.tick_id,
            success = summary.success,
            spawned = summary.tasks_spawned,
            memory_written = summary.memory_written,
            elapsed_ms = summary.elapsed_ms,
            "✅ tick 完成"
        );
        Ok(TickReport::Completed(summary))
    }

    /// 只读地读取文档；尚未创建时返回默认文档
    pub async fn read_document(&self) -> Result<MemoryDocument> {
        match self.store.load().await {
            Ok((doc, _)) => Ok(doc),
            Err(e) if e.is_not_found() => Ok(MemoryDocument::new(self.config.default_autonomous_mode)),
            Err(e) => Err(TickError::StoreUnavailable(e.to_string()).into()),
        }
    }

    pub async fn status(&self) -> Result<StatusReport> {
        Ok(StatusReport::from_document(&self.read_document().await?))
    }

    pub async fn learnings(&self) -> Result<LearningsReport> {
        Ok(LearningsReport::from_document(&self.read_document().await?))
    }

    /// 打开或关闭自主模式；与 tick 一样遵守修订号校验，冲突时返回错误
    pub async fn set_autonomous_mode(&self, enabled: bool) -> Result<StatusReport> {
        let (mut doc, revision) = self.load_or_init().await?;
        doc.autonomous_mode = enabled;
        self.store.save(&doc, revision.as_ref()).await?;
        info!(enabled, "🎛️ 自主模式已切换");
        Ok(StatusReport::from_document(&doc))
    }

    async fn load_or_init(&self) -> Result<(MemoryDocument, Option<Revision>)> {
        match self.store.load().await {
            Ok((doc, revision)) => Ok((doc, Some(revision))),
            Err(e) if e.is_not_found() => {
                info!(store = %self.store.describe(), "🌱 记忆文档不存在，初始化新文档");
                Ok((
                    MemoryDocument::new(self.config.default_autonomous_mode),
                    None,
                ))
            }
            Err(e) => {
                warn!(store = %self.store.describe(), error = %e, "🚫 记忆文档读取失败");
                Err(TickError::StoreUnavailable(e.to_string()).into())
            }
        }
    }

    fn apply_caps(&self, doc: &mut MemoryDocument) {
        cap_oldest(&mut doc.run_log, self.config.max_run_log);
        cap_oldest(&mut doc.learnings, self.config.max_learnings);
        cap_oldest(&mut doc.structured_learnings, self.config.max_structured_learnings);
        cap_oldest(&mut doc.completed_tasks, self.config.max_completed);
        cap_oldest(&mut doc.self_improvement_notes, self.config.max_self_improvement_notes);
    }
}

/// 把超过重试上限的任务移入已完成列表，返回留下的 learning
fn mark_stuck(doc: &mut MemoryDocument, task: Task, stuck_ids: &mut Vec<String>) -> String {
    let insight = format!(
        "Task {} ({}) exceeded {} attempts and was marked stuck",
        task.id, task.task_type, task.max_retries
    );
    warn!(task_id = %task.id, task_type = %task.task_type, attempts = task.attempt_count, "🧱 任务超过重试上限");

    let mut record = queue::finish(
        task,
        TaskOutcome {
            result: json!({ "error": "max retries exceeded" }),
            success: false,
            learnings: vec![insight.clone()],
            execution_ms: 0,
            effectiveness: None,
        },
    );
    record.task.status = TaskStatus::Stuck;

    doc.learnings.push(insight.clone());
    doc.structured_learnings.push(StructuredLearning {
        insight: insight.clone(),
        task_type: record.task.task_type.clone(),
        task_id: record.task.id.clone(),
        timestamp: Utc::now(),
    });
    stuck_ids.push(record.task.id.clone());
    doc.completed_tasks.push(record);
    insight
}

/// 结果的截断摘要（按字符）
fn summarize(result: &Value, max_chars: usize) -> String {
    let text = match result {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if text.chars().count() <= max_chars {
        text
    } else {
        let mut truncated: String = text.chars().take(max_chars).collect();
        truncated.push('…');
        truncated
    }
}
