//! 队列为空时合成下一个任务
//!
//! 配置了 LLM 时请模型以 JSON 给出恰好一个任务；调用失败或输出无法解析时，
//! 退回固定的自我反思任务，保证每次 tick 都有事可做。

use crate::config::TickConfig;
use crate::error::{ParseError, Result};
use crate::handlers::builtin::SELF_REFLECTION;
use crate::llm::LlmClient;
use crate::llm::types::Message;
use crate::memory::MemoryDocument;
use crate::tasks::{Task, TaskSpec};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const PLANNER_ORIGIN: &str = "autopilot-planner";
pub const FALLBACK_ORIGIN: &str = "autopilot-fallback";
pub const FALLBACK_DESCRIPTION: &str = "Reflect on recent work and plan the next tasks";

const SYSTEM_PROMPT: &str = "You are the planning brain of an autonomous service. \
The task queue is empty. Propose exactly one next task. \
Reply with a single JSON object and nothing else: \
{\"type\": \"<task type>\", \"description\": \"<what to do>\", \"priority\": <1-10, lower runs first>}";

/// 合成任务的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskSource {
    /// 来自待处理队列
    Queue,
    /// 由 LLM 规划
    Planner,
    /// 固定的兜底任务
    Fallback,
}

pub fn fallback_task(config: &TickConfig) -> Task {
    Task::new(SELF_REFLECTION, FALLBACK_DESCRIPTION)
        .with_max_retries(config.default_max_retries)
        .spawned_by(FALLBACK_ORIGIN)
}

/// 合成一个任务；永不失败
pub async fn synthesize(
    llm: Option<&dyn LlmClient>,
    doc: &MemoryDocument,
    known_types: &[&str],
    config: &TickConfig,
) -> (Task, TaskSource) {
    let Some(llm) = llm else {
        info!("🪞 队列为空且未配置 LLM，使用兜底自我反思任务");
        return (fallback_task(config), TaskSource::Fallback);
    };

    let prompt = planning_prompt(doc, known_types);
    let spec = match llm.complete(SYSTEM_PROMPT, vec![Message::user(prompt)]).await {
        Ok(text) => parse_task_spec(&text),
        Err(e) => Err(e),
    };

    match spec {
        Ok(spec) => {
            let priority = spec.priority.clamp(1, config.max_priority);
            info!(task_type = %spec.task_type, priority, "🧠 LLM 规划了新任务");
            let task = Task::new(spec.task_type, spec.description)
                .with_priority(priority)
                .with_max_retries(config.default_max_retries)
                .spawned_by(PLANNER_ORIGIN);
            (task, TaskSource::Planner)
        }
        Err(e) => {
            warn!(error = %e, "⚠️ LLM 规划失败，使用兜底任务");
            (fallback_task(config), TaskSource::Fallback)
        }
    }
}

fn planning_prompt(doc: &MemoryDocument, known_types: &[&str]) -> String {
    let mut prompt = format!(
        "Known task types with handlers: {}.\nCompleted tasks so far: {}.\n",
        known_types.join(", "),
        doc.completed_tasks.len()
    );
    let learnings = doc.recent_learnings(5);
    if !learnings.is_empty() {
        prompt.push_str("Recent learnings:\n");
        for l in learnings {
            prompt.push_str("- ");
            prompt.push_str(l);
            prompt.push('\n');
        }
    }
    let struggling: Vec<String> = doc
        .task_effectiveness
        .iter()
        .filter(|(_, r)| r.fail_rate > 20.0)
        .map(|(t, r)| format!("{} ({:.0}% failures)", t, r.fail_rate))
        .collect();
    if !struggling.is_empty() {
        prompt.push_str(&format!("Struggling task types: {}\n", struggling.join(", ")));
    }
    prompt.push_str("What single task should run next?");
    prompt
}

/// 从模型输出中提取任务 JSON，容忍 ```json 代码块和前后说明文字
pub fn parse_task_spec(text: &str) -> Result<TaskSpec> {
    let start = text
        .find('{')
        .ok_or_else(|| ParseError::UnexpectedFormat("no JSON object in planner output".into()))?;
    let end = text
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| ParseError::UnexpectedFormat("unterminated JSON object".into()))?;

    let spec: TaskSpec = serde_json::from_str(&text[start..=end])?;
    if spec.task_type.trim().is_empty() || spec.description.trim().is_empty() {
        return Err(
            ParseError::UnexpectedFormat("task type and description must be non-empty".into())
                .into(),
        );
    }
    Ok(spec)
}
