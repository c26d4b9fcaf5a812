//! 记忆文档与存储
//!
//! | 类型 | 作用 |
//! |------|------|
//! | [`MemoryDocument`] | 单个 JSON 文档，承载队列、日志、learnings 与效果统计 |
//! | [`DocumentStore`] | 带修订号校验的整体读写接口 |
//! | [`InMemoryDocumentStore`] | 进程内存实现 |
//! | [`GithubDocumentStore`] | 基于 GitHub contents API 的远程实现 |
//!
//! ```rust,no_run
//! use echo_autopilot::memory::{DocumentStore, InMemoryDocumentStore, MemoryDocument};
//!
//! # async fn example() -> echo_autopilot::error::Result<()> {
//! let store = InMemoryDocumentStore::new();
//! let revision = store.save(&MemoryDocument::default(), None).await?;
//! let (mut doc, loaded) = store.load().await?;
//! assert_eq!(revision, loaded);
//! doc.learnings.push("first insight".to_string());
//! store.save(&doc, Some(&loaded)).await?;
//! # Ok(())
//! # }
//! ```

pub mod document;
pub mod github;
pub mod store;

pub use document::{MemoryDocument, RunLogEntry, SelfImprovementNote, StructuredLearning};
pub use github::{GithubConfig, GithubDocumentStore};
pub use store::{DocumentStore, InMemoryDocumentStore, Revision};
