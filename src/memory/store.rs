//! 带修订号校验的文档存储
//!
//! `load` 返回文档与修订号，`save` 必须带上最近一次读到的修订号，
//! 修订号过期时写入被拒绝（[`StoreError::Conflict`]），把丢失更新变成可观测的错误。
//! 存储层从不自动重试，是否重试由调用方决定。
//!
//! ## 内置实现
//!
//! - [`InMemoryDocumentStore`]：进程内存，适合测试和单进程部署
//! - [`GithubDocumentStore`](crate::memory::github::GithubDocumentStore)：GitHub 仓库中的单个 JSON 文件

use crate::error::{Result, StoreError};
use crate::memory::document::MemoryDocument;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::RwLock;
use tracing::debug;

/// 不透明的修订号，证明写入者最后看到的是哪个版本
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Revision(pub String);

impl Revision {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── DocumentStore trait ───────────────────────────────────────────────────────

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// 读取完整文档；不存在时返回 [`StoreError::NotFound`]
    async fn load(&self) -> Result<(MemoryDocument, Revision)>;

    /// 整体写回文档。`revision` 为 `None` 表示仅创建（已存在则冲突）。
    /// 成功后返回新的修订号。
    async fn save(&self, document: &MemoryDocument, revision: Option<&Revision>)
    -> Result<Revision>;

    /// 用于日志的存储描述
    fn describe(&self) -> String;
}

// ── InMemoryDocumentStore ─────────────────────────────────────────────────────

struct Slot {
    document: MemoryDocument,
    version: u64,
}

/// 进程内存文档存储，修订号为单调递增的整数
pub struct InMemoryDocumentStore {
    slot: RwLock<Option<Slot>>,
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDocumentStore {
    /// 空存储，首次 `load` 返回 `NotFound`
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }

    /// 预置一份文档
    pub fn with_document(document: MemoryDocument) -> Self {
        Self {
            slot: RwLock::new(Some(Slot {
                document,
                version: 1,
            })),
        }
    }

    /// 当前文档快照（不影响修订号）
    pub async fn snapshot(&self) -> Option<MemoryDocument> {
        self.slot.read().await.as_ref().map(|s| s.document.clone())
    }

    pub async fn current_revision(&self) -> Option<Revision> {
        self.slot
            .read()
            .await
            .as_ref()
            .map(|s| Revision(s.version.to_string()))
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn load(&self) -> Result<(MemoryDocument, Revision)> {
        let slot = self.slot.read().await;
        match slot.as_ref() {
            Some(s) => Ok((s.document.clone(), Revision(s.version.to_string()))),
            None => Err(StoreError::NotFound("in-memory document".to_string()).into()),
        }
    }

    async fn save(
        &self,
        document: &MemoryDocument,
        revision: Option<&Revision>,
    ) -> Result<Revision> {
        let mut slot = self.slot.write().await;
        let next = match (slot.as_ref(), revision) {
            (None, None) => 1,
            (None, Some(r)) => {
                return Err(StoreError::Conflict(format!(
                    "revision {} given but no document exists",
                    r
                ))
                .into());
            }
            (Some(s), None) => {
                return Err(StoreError::Conflict(format!(
                    "document already exists at revision {}",
                    s.version
                ))
                .into());
            }
            (Some(s), Some(r)) if r.as_str() != s.version.to_string() => {
                return Err(StoreError::Conflict(format!(
                    "stale revision {}, current is {}",
                    r, s.version
                ))
                .into());
            }
            (Some(s), Some(_)) => s.version + 1,
        };

        *slot = Some(Slot {
            document: document.clone(),
            version: next,
        });
        debug!(revision = next, "💾 内存文档已写入");
        Ok(Revision(next.to_string()))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
