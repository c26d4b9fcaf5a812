mod client;
pub mod config;
pub mod types;

use crate::error::{AutopilotError, LlmError, Result};
use crate::llm::client::post;
use crate::llm::config::ModelConfig;
use crate::llm::types::{ChatCompletionRequest, ChatCompletionResponse, Message};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::HeaderMap;
use std::sync::Arc;

pub fn assemble_req_header(model: &ModelConfig) -> Result<HeaderMap> {
    let mut header_map = HeaderMap::new();

    header_map.insert(
        "Authorization",
        format!("Bearer {}", model.apikey)
            .parse()
            .map_err(|e| AutopilotError::Other(format!("Invalid Authorization header: {}", e)))?,
    );
    header_map.insert(
        "Content-Type",
        "application/json"
            .parse()
            .map_err(|e| AutopilotError::Other(format!("Invalid Content-Type header: {}", e)))?,
    );
    Ok(header_map)
}

pub async fn chat(
    client: Arc<Client>,
    model: &ModelConfig,
    messages: Vec<Message>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
) -> Result<ChatCompletionResponse> {
    let request_body = ChatCompletionRequest {
        model: model.model.clone(),
        messages,
        temperature,
        max_tokens,
    };

    let header_map = assemble_req_header(model)?;
    post(client, &request_body, header_map, model.baseurl.as_str()).await
}

/// 单次调用的覆盖参数，未设置的字段使用客户端默认值
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionOptions {
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
}

/// Tick 引擎与 HTTP 层使用的 LLM 调用接口
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 以 `system_prompt` 开头发起一次对话，返回模型的文本内容
    async fn complete(&self, system_prompt: &str, messages: Vec<Message>) -> Result<String> {
        self.complete_with(system_prompt, messages, CompletionOptions::default())
            .await
    }

    async fn complete_with(
        &self,
        system_prompt: &str,
        messages: Vec<Message>,
        options: CompletionOptions,
    ) -> Result<String>;

    /// 当前使用的模型名
    fn model_name(&self) -> &str;
}

/// 基于 `chat` 函数的默认实现
pub struct DefaultLlmClient {
    client: Arc<Client>,
    model: ModelConfig,
    max_tokens: u32,
}

impl DefaultLlmClient {
    pub fn new(client: Arc<Client>, model: ModelConfig) -> Self {
        Self {
            client,
            model,
            max_tokens: 1024,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
impl LlmClient for DefaultLlmClient {
    async fn complete_with(
        &self,
        system_prompt: &str,
        messages: Vec<Message>,
        options: CompletionOptions,
    ) -> Result<String> {
        let mut all = Vec::with_capacity(messages.len() + 1);
        if !system_prompt.is_empty() {
            all.push(Message::system(system_prompt.to_string()));
        }
        all.extend(messages);

        let mut model = self.model.clone();
        if let Some(name) = options.model {
            model.model = name;
        }
        let response = chat(
            self.client.clone(),
            &model,
            all,
            Some(0.3),
            Some(options.max_tokens.unwrap_or(self.max_tokens)),
        )
        .await?;

        response
            .first_content()
            .ok_or_else(|| LlmError::EmptyResponse.into())
    }

    fn model_name(&self) -> &str {
        &self.model.model
    }
}
