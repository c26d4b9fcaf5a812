//! 测试基础设施
//!
//! 在不依赖真实 LLM / 远程存储的情况下测试 Tick 引擎各组件的工具集。
//!
//! | 类型 | 用途 |
//! |------|------|
//! | [`MockLlmClient`] | 替代真实 LLM，用于测试任务合成与内容生成 |
//! | [`MockHandler`] | 替代真实任务处理器，用于测试引擎的分派与失败路径 |
//!
//! 记忆文档存储直接使用 [`InMemoryDocumentStore`](crate::memory::InMemoryDocumentStore)，
//! 它与远程实现遵守同一份修订号契约。
//!
//! # 设计原则
//!
//! - **零网络请求**：所有 Mock 都完全在内存中运行
//! - **可脚本化**：通过 `with_response()` / `with_failure()` 精确控制返回值
//! - **可观测**：通过 `call_count()` / `last_messages()` 等方法检查调用情况
//!
//! ```rust
//! use echo_autopilot::testing::MockLlmClient;
//! use echo_autopilot::llm::LlmClient;
//! use echo_autopilot::llm::types::Message;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mock = MockLlmClient::new().with_response("ok");
//! let text = mock.complete("system", vec![Message::user("hi".to_string())]).await.unwrap();
//! assert_eq!(text, "ok");
//! assert_eq!(mock.call_count(), 1);
//! # }
//! ```

mod mock_handler;
mod mock_llm;

pub use mock_handler::MockHandler;
pub use mock_llm::MockLlmClient;
