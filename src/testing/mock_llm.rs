//! Mock LLM 客户端，用于在不发起真实 HTTP 请求的情况下测试使用了 [`LlmClient`] 的组件。

use crate::error::{AutopilotError, LlmError, Result};
use crate::llm::{CompletionOptions, LlmClient};
use crate::llm::types::Message;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// 预设响应的枚举（文本或错误）
enum MockLlmResponse {
    Content(String),
    Err(AutopilotError),
}

/// 可脚本化的 Mock LLM 客户端。
///
/// 按顺序返回预设的响应；队列耗尽后返回 `EmptyResponse` 错误。
/// 每次调用的 system prompt 与 messages 都会被记录。
pub struct MockLlmClient {
    responses: Arc<Mutex<VecDeque<MockLlmResponse>>>,
    calls: Arc<Mutex<Vec<(String, Vec<Message>)>>>,
    options: Arc<Mutex<Vec<CompletionOptions>>>,
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            options: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 追加一条成功响应文本
    pub fn with_response(self, text: impl Into<String>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(MockLlmResponse::Content(text.into()));
        self
    }

    /// 追加一条错误响应（用于测试降级路径）
    pub fn with_error(self, err: AutopilotError) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(MockLlmResponse::Err(err));
        self
    }

    pub fn with_network_error(self, msg: impl Into<String>) -> Self {
        self.with_error(AutopilotError::Llm(LlmError::NetworkError(msg.into())))
    }

    /// 追加一条限流错误（429）
    pub fn with_rate_limit_error(self) -> Self {
        self.with_error(AutopilotError::Llm(LlmError::ApiError {
            status: 429,
            message: "Too Many Requests".to_string(),
        }))
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// 最后一次调用的 system prompt
    pub fn last_system_prompt(&self) -> Option<String> {
        self.calls.lock().unwrap().last().map(|(s, _)| s.clone())
    }

    /// 最后一次调用时传入的 messages（若从未调用则返回 `None`）
    pub fn last_messages(&self) -> Option<Vec<Message>> {
        self.calls.lock().unwrap().last().map(|(_, m)| m.clone())
    }

    /// 最后一次调用的覆盖参数
    pub fn last_options(&self) -> Option<CompletionOptions> {
        self.options.lock().unwrap().last().cloned()
    }

    /// 剩余未消费的预设响应数量
    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete_with(
        &self,
        system_prompt: &str,
        messages: Vec<Message>,
        options: CompletionOptions,
    ) -> Result<String> {
        self.options.lock().unwrap().push(options);
        self.calls
            .lock()
            .unwrap()
            .push((system_prompt.to_string(), messages));

        match self.responses.lock().unwrap().pop_front() {
            Some(MockLlmResponse::Content(text)) => Ok(text),
            Some(MockLlmResponse::Err(e)) => Err(e),
            None => Err(AutopilotError::Llm(LlmError::EmptyResponse)),
        }
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}
