//! 基于 GitHub contents API 的远程文档存储
//!
//! 文档保存在仓库中的单个 JSON 文件里，文件的 blob `sha` 即修订号：
//! - 读取：`GET /repos/{owner}/{repo}/contents/{path}?ref={branch}`，内容为 base64
//! - 写入：`PUT` 同一路径，请求体携带 `sha`；sha 过期时 GitHub 返回 409
//!
//! 超过 1 MB 的文件不会内联返回（`encoding: "none"`，`content` 为空），
//! 此时改用 `application/vnd.github.raw+json` 重新读取原始内容。

use crate::error::{ConfigError, Result, StoreError};
use crate::memory::document::MemoryDocument;
use crate::memory::store::{DocumentStore, Revision};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const GITHUB_API_BASE: &str = "https://api.github.com";

/// 远程文件坐标与凭证
#[derive(Debug, Clone)]
pub struct GithubConfig {
    pub owner: String,
    pub repo: String,
    /// 仓库内文件路径，如 `memory/autopilot.json`
    pub path: String,
    pub branch: String,
    pub token: String,
    pub api_base: String,
    /// 远程文件存在但为空时，新文档的 `autonomousMode`
    pub default_autonomous_mode: bool,
}

impl GithubConfig {
    /// `repo_spec` 形如 `owner/repo`
    pub fn new(repo_spec: &str, path: &str, branch: &str, token: &str) -> Result<Self> {
        let (owner, repo) = repo_spec
            .split_once('/')
            .filter(|(o, r)| !o.is_empty() && !r.is_empty() && !r.contains('/'))
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "MEMORY_REPO".to_string(),
                message: format!("expected owner/repo, got '{}'", repo_spec),
            })?;
        if token.is_empty() {
            return Err(ConfigError::MissingCredential("GITHUB_TOKEN".to_string()).into());
        }
        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            path: path.trim_start_matches('/').to_string(),
            branch: branch.to_string(),
            token: token.to_string(),
            api_base: GITHUB_API_BASE.to_string(),
            default_autonomous_mode: true,
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_default_autonomous_mode(mut self, enabled: bool) -> Self {
        self.default_autonomous_mode = enabled;
        self
    }

    fn contents_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base, self.owner, self.repo, self.path
        )
    }
}

/// GET contents 响应中用到的字段
#[derive(Deserialize)]
struct ContentResponse {
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    size: u64,
    sha: String,
}

impl ContentResponse {
    /// 内容未内联返回（大文件）
    fn is_truncated(&self) -> bool {
        self.encoding.as_deref() == Some("none")
            || (self.content.trim().is_empty() && self.size > 0)
    }
}

#[derive(Serialize)]
struct PutContentRequest<'a> {
    message: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
    branch: &'a str,
}

#[derive(Deserialize)]
struct PutContentResponse {
    content: PutContentInfo,
}

#[derive(Deserialize)]
struct PutContentInfo {
    sha: String,
}

pub struct GithubDocumentStore {
    client: Arc<Client>,
    config: GithubConfig,
}

impl GithubDocumentStore {
    pub fn new(client: Arc<Client>, config: GithubConfig) -> Self {
        info!(
            repo = %format!("{}/{}", config.owner, config.repo),
            path = %config.path,
            branch = %config.branch,
            "🗄️ GitHub 文档存储初始化"
        );
        Self { client, config }
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.config.token)).map_err(|e| {
                ConfigError::InvalidValue {
                    field: "GITHUB_TOKEN".to_string(),
                    message: e.to_string(),
                }
            })?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("echo-autopilot"));
        Ok(headers)
    }

    async fn load_raw(&self) -> Result<MemoryDocument> {
        let mut headers = self.headers()?;
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github.raw+json"));
        let response = self
            .client
            .get(self.config.contents_url())
            .query(&[("ref", self.config.branch.as_str())])
            .headers(headers)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &self.config.path, body).into());
        }

        let bytes = response.bytes().await.map_err(transport_error)?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(StoreError::Transient(
                "raw content is empty for a non-empty file".to_string(),
            )
            .into());
        }
        serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Serialization(format!("json: {e}")).into())
    }
}

#[async_trait]
impl DocumentStore for GithubDocumentStore {
    async fn load(&self) -> Result<(MemoryDocument, Revision)> {
        let response = self
            .client
            .get(self.config.contents_url())
            .query(&[("ref", self.config.branch.as_str())])
            .headers(self.headers()?)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &self.config.path, body).into());
        }

        let body: ContentResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Transient(format!("invalid contents response: {e}")))?;
        let document = if body.is_truncated() {
            debug!(size = body.size, "📦 文档未内联返回，读取原始内容");
            // 原始内容可能比 sha 新，此时下一次写回会因 sha 过期而冲突
            self.load_raw().await?
        } else {
            decode_document(&body.content, self.config.default_autonomous_mode)?
        };
        debug!(sha = %body.sha, "📥 已读取远程文档");
        Ok((document, Revision(body.sha)))
    }

    async fn save(
        &self,
        document: &MemoryDocument,
        revision: Option<&Revision>,
    ) -> Result<Revision> {
        let request = PutContentRequest {
            message: format!(
                "autopilot: update memory (v{})",
                document.autonomous_version
            ),
            content: encode_document(document)?,
            sha: revision.map(Revision::as_str),
            branch: &self.config.branch,
        };

        let response = self
            .client
            .put(self.config.contents_url())
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = classify_status(status, &self.config.path, body);
            warn!(status = status.as_u16(), error = %err, "⚠️ 远程文档写入失败");
            return Err(err.into());
        }

        let body: PutContentResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Transient(format!("invalid update response: {e}")))?;
        debug!(sha = %body.content.sha, "💾 远程文档已写入");
        Ok(Revision(body.content.sha))
    }

    fn describe(&self) -> String {
        format!(
            "github:{}/{}/{}@{}",
            self.config.owner, self.config.repo, self.config.path, self.config.branch
        )
    }
}

fn transport_error(err: reqwest::Error) -> StoreError {
    StoreError::Transient(err.to_string())
}

/// 将非 2xx 状态映射为存储错误
fn classify_status(status: StatusCode, path: &str, body: String) -> StoreError {
    match status {
        StatusCode::NOT_FOUND => StoreError::NotFound(path.to_string()),
        // 409: sha 不匹配；422: 文件已存在却未带 sha
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
            StoreError::Conflict(format!("{} ({})", body, status.as_u16()))
        }
        _ => StoreError::Transient(format!("HTTP {}: {}", status.as_u16(), body)),
    }
}

fn encode_document(document: &MemoryDocument) -> Result<String> {
    let json = serde_json::to_vec_pretty(document)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(BASE64_STANDARD.encode(json))
}

/// GitHub 返回的 base64 内容按 60 字符换行，需要先去掉空白。
/// 只有真正为空的文件才视为新文档。
fn decode_document(content: &str, default_autonomous_mode: bool) -> Result<MemoryDocument> {
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64_STANDARD
        .decode(compact)
        .map_err(|e| StoreError::Serialization(format!("base64: {e}")))?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(MemoryDocument::new(default_autonomous_mode));
    }
    serde_json::from_slice(&bytes)
        .map_err(|e| StoreError::Serialization(format!("json: {e}")).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AutopilotError;
    use axum::extract::State;
    use axum::http::HeaderMap as AxumHeaders;
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{Value, json};
    use std::sync::Mutex;

    #[test]
    fn test_repo_spec_parsing() {
        let config = GithubConfig::new("acme/brain", "/memory/state.json", "main", "ghp_x").unwrap();
        assert_eq!(config.owner, "acme");
        assert_eq!(config.repo, "brain");
        assert_eq!(
            config.contents_url(),
            "https://api.github.com/repos/acme/brain/contents/memory/state.json"
        );

        assert!(GithubConfig::new("acme", "m.json", "main", "ghp_x").is_err());
        assert!(GithubConfig::new("a/b/c", "m.json", "main", "ghp_x").is_err());
        assert!(GithubConfig::new("acme/brain", "m.json", "main", "").is_err());
    }

    #[test]
    fn test_custom_api_base() {
        let config = GithubConfig::new("acme/brain", "m.json", "main", "t")
            .unwrap()
            .with_api_base("http://localhost:8080/");
        assert_eq!(
            config.contents_url(),
            "http://localhost:8080/repos/acme/brain/contents/m.json"
        );
    }

    #[test]
    fn test_decode_wrapped_content() {
        let mut doc = MemoryDocument::default();
        doc.learnings.push("wrapped lines decode fine".to_string());
        doc.autonomous_version = 3;

        let encoded = encode_document(&doc).unwrap();
        let wrapped: String = encoded
            .as_bytes()
            .chunks(60)
            .map(|c| format!("{}\n", String::from_utf8_lossy(c)))
            .collect();

        assert_eq!(decode_document(&wrapped, true).unwrap(), doc);
    }

    #[test]
    fn test_decode_empty_file() {
        let doc = decode_document("", false).unwrap();
        assert!(doc.pending_tasks.is_empty());
        assert!(!doc.autonomous_mode);
    }

    #[test]
    fn test_decode_garbage() {
        assert!(decode_document("!!!not base64", true).is_err());
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, "m.json", String::new()),
            StoreError::NotFound(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::CONFLICT, "m.json", "sha mismatch".into()),
            StoreError::Conflict(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::UNPROCESSABLE_ENTITY, "m.json", String::new()),
            StoreError::Conflict(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, "m.json", String::new()),
            StoreError::Transient(_)
        ));
    }

    // ── 本地模拟的 contents API ──────────────────────────────────────────────

    #[derive(Default)]
    struct FakeRepo {
        /// 原始字节与当前 sha
        file: Option<(Vec<u8>, String)>,
        next_sha: u64,
        /// 超过该字节数时不内联返回内容
        inline_limit: Option<usize>,
        fail_with: Option<StatusCode>,
        puts: Vec<Value>,
        auth: Vec<String>,
    }

    type SharedRepo = Arc<Mutex<FakeRepo>>;

    async fn get_contents(State(repo): State<SharedRepo>, headers: AxumHeaders) -> Response {
        let mut repo = repo.lock().unwrap();
        if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
            repo.auth.push(auth.to_string());
        }
        if let Some(status) = repo.fail_with {
            return (status, Json(json!({"message": "upstream trouble"}))).into_response();
        }
        let Some((bytes, sha)) = repo.file.clone() else {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({"message": "Not Found"})),
            )
                .into_response();
        };

        let wants_raw = headers.get("accept").and_then(|v| v.to_str().ok())
            == Some("application/vnd.github.raw+json");
        if wants_raw {
            return bytes.into_response();
        }
        if repo.inline_limit.is_some_and(|limit| bytes.len() > limit) {
            return Json(json!({
                "content": "",
                "encoding": "none",
                "size": bytes.len(),
                "sha": sha,
            }))
            .into_response();
        }

        let encoded = BASE64_STANDARD.encode(&bytes);
        let wrapped = encoded
            .as_bytes()
            .chunks(60)
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect::<Vec<_>>()
            .join("\n");
        Json(json!({
            "content": wrapped,
            "encoding": "base64",
            "size": bytes.len(),
            "sha": sha,
        }))
        .into_response()
    }

    async fn put_contents(State(repo): State<SharedRepo>, Json(body): Json<Value>) -> Response {
        let mut repo = repo.lock().unwrap();
        repo.puts.push(body.clone());

        let sent = body.get("sha").and_then(Value::as_str).map(str::to_string);
        let current = repo.file.as_ref().map(|(_, sha)| sha.clone());
        let rejected = match (&current, &sent) {
            (Some(_), None) => Some(StatusCode::UNPROCESSABLE_ENTITY),
            (Some(cur), Some(sent)) if cur != sent => Some(StatusCode::CONFLICT),
            (None, Some(_)) => Some(StatusCode::CONFLICT),
            _ => None,
        };
        if let Some(status) = rejected {
            return (status, Json(json!({"message": "sha mismatch"}))).into_response();
        }

        let content = body["content"].as_str().unwrap_or_default();
        let bytes = BASE64_STANDARD.decode(content).unwrap();
        repo.next_sha += 1;
        let sha = format!("sha{}", repo.next_sha);
        repo.file = Some((bytes, sha.clone()));
        Json(json!({"content": {"sha": sha}, "commit": {"sha": "commit"}})).into_response()
    }

    async fn fake_github(repo: FakeRepo, default_mode: bool) -> (SharedRepo, GithubDocumentStore) {
        let shared = Arc::new(Mutex::new(repo));
        let app = Router::new()
            .route(
                "/repos/{owner}/{repo}/contents/{*path}",
                get(get_contents).put(put_contents),
            )
            .with_state(shared.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let config = GithubConfig::new("acme/brain", "memory/state.json", "main", "ghp_test")
            .unwrap()
            .with_api_base(format!("http://{}", addr))
            .with_default_autonomous_mode(default_mode);
        (shared, GithubDocumentStore::new(Arc::new(Client::new()), config))
    }

    #[tokio::test]
    async fn test_http_revision_lifecycle() {
        let (repo, store) = fake_github(FakeRepo::default(), true).await;

        assert!(store.load().await.unwrap_err().is_not_found());

        let mut doc = MemoryDocument::new(true);
        doc.learnings.push("first".to_string());
        let created = store.save(&doc, None).await.unwrap();
        assert_eq!(created.as_str(), "sha1");

        let (mut loaded, revision) = store.load().await.unwrap();
        assert_eq!(revision, created);
        assert_eq!(loaded, doc);

        loaded.learnings.push("second".to_string());
        let updated = store.save(&loaded, Some(&revision)).await.unwrap();
        assert_eq!(updated.as_str(), "sha2");

        // 过期的 sha
        let err = store.save(&loaded, Some(&created)).await.unwrap_err();
        assert!(err.is_conflict());
        // 文件已存在时仅创建
        let err = store.save(&doc, None).await.unwrap_err();
        assert!(err.is_conflict());

        let repo = repo.lock().unwrap();
        assert!(repo.puts[0].get("sha").is_none());
        assert_eq!(repo.puts[0]["branch"], "main");
        assert_eq!(repo.puts[1]["sha"], "sha1");
        assert_eq!(repo.puts[2]["sha"], "sha1");
        assert!(repo.auth.iter().all(|a| a == "Bearer ghp_test"));
        let (bytes, sha) = repo.file.clone().unwrap();
        assert_eq!(sha, "sha2");
        let stored: MemoryDocument = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(stored.learnings, vec!["first".to_string(), "second".to_string()]);
    }

    #[tokio::test]
    async fn test_http_large_file_read_raw() {
        let mut doc = MemoryDocument::new(true);
        doc.learnings = (0..50).map(|i| format!("insight {}", i)).collect();
        doc.autonomous_version = 7;
        let bytes = serde_json::to_vec(&doc).unwrap();
        let (_repo, store) = fake_github(
            FakeRepo {
                file: Some((bytes, "big".to_string())),
                inline_limit: Some(64),
                ..FakeRepo::default()
            },
            true,
        )
        .await;

        let (loaded, revision) = store.load().await.unwrap();
        assert_eq!(revision.as_str(), "big");
        assert_eq!(loaded, doc);
    }

    #[tokio::test]
    async fn test_http_empty_file_is_fresh_document() {
        let (_repo, store) = fake_github(
            FakeRepo {
                file: Some((Vec::new(), "empty".to_string())),
                ..FakeRepo::default()
            },
            false,
        )
        .await;

        let (loaded, revision) = store.load().await.unwrap();
        assert_eq!(revision.as_str(), "empty");
        assert!(!loaded.autonomous_mode);
        assert!(loaded.pending_tasks.is_empty());
    }

    #[test]
    fn test_truncated_content_detection() {
        let body: ContentResponse = serde_json::from_value(json!({
            "content": "", "encoding": "none", "size": 2_000_000, "sha": "s"
        }))
        .unwrap();
        assert!(body.is_truncated());

        let body: ContentResponse =
            serde_json::from_value(json!({"content": "", "size": 10, "sha": "s"})).unwrap();
        assert!(body.is_truncated());

        let body: ContentResponse = serde_json::from_value(json!({
            "content": "", "encoding": "base64", "size": 0, "sha": "s"
        }))
        .unwrap();
        assert!(!body.is_truncated());
    }

    #[tokio::test]
    async fn test_http_server_error_is_transient() {
        let (_repo, store) = fake_github(
            FakeRepo {
                fail_with: Some(StatusCode::BAD_GATEWAY),
                ..FakeRepo::default()
            },
            true,
        )
        .await;

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, AutopilotError::Store(StoreError::Transient(_))));
    }
}
