use crate::error::{ConfigError, Result};
use crate::handlers::builtin::CONTENT_GENERATION;
use crate::handlers::{HandlerContext, HandlerOutcome, TaskHandler};
use crate::llm::types::Message;
use crate::tasks::Task;
use async_trait::async_trait;
use serde_json::json;

const SYSTEM_PROMPT: &str = "You are the content engine of an autonomous service. \
Produce concise, publishable text for the request you are given. \
Reply with the content only.";

/// 调用 LLM 生成内容；未配置 LLM 时返回配置错误，任务记为失败
pub struct ContentGenerationHandler;

#[async_trait]
impl TaskHandler for ContentGenerationHandler {
    fn task_type(&self) -> &str {
        CONTENT_GENERATION
    }

    fn description(&self) -> &str {
        "Generate content with the configured LLM"
    }

    async fn handle(&self, task: &Task, ctx: &mut HandlerContext<'_>) -> Result<HandlerOutcome> {
        let llm = ctx.llm.ok_or_else(|| {
            ConfigError::MissingCredential("content generation requires an LLM client".to_string())
        })?;

        let mut messages = Vec::new();
        let recent = ctx.document.recent_learnings(5);
        if !recent.is_empty() {
            messages.push(Message::user(format!(
                "Recent learnings for context:\n- {}",
                recent.join("\n- ")
            )));
        }
        messages.push(Message::user(task.description.clone()));

        let content = llm.complete(SYSTEM_PROMPT, messages).await?;
        let chars = content.chars().count();

        Ok(HandlerOutcome::new(json!({
            "content": content,
            "model": llm.model_name(),
            "chars": chars,
        }))
        .learn(format!(
            "Generated {} chars of content for: {}",
            chars, task.description
        )))
    }
}
