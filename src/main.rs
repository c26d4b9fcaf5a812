use clap::{Parser, ValueEnum};
use dotenv::dotenv;
use echo_autopilot::config::TickConfig;
use echo_autopilot::error::{ConfigError, Result};
use echo_autopilot::handlers::HandlerRegistry;
use echo_autopilot::llm::config::Config as ModelsConfig;
use echo_autopilot::llm::{DefaultLlmClient, LlmClient};
use echo_autopilot::memory::{DocumentStore, GithubConfig, GithubDocumentStore, InMemoryDocumentStore};
use echo_autopilot::server::{self, AppState};
use echo_autopilot::tick::TickEngine;
use reqwest::Client;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreBackend {
    /// 进程内存，重启即丢失
    Memory,
    /// GitHub 仓库中的 JSON 文件
    Github,
}

#[derive(Parser, Debug)]
#[command(name = "echo-autopilot", version, about = "Autonomous tick engine with a revision-checked memory document")]
struct Cli {
    /// 完整监听地址，优先于 --port
    #[arg(long, env = "AUTOPILOT_BIND")]
    bind: Option<String>,

    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// 写接口的共享密钥
    #[arg(long, env = "API_SECRET")]
    api_secret: Option<String>,

    #[arg(long, env = "ZENITH_API_KEY", hide = true)]
    legacy_api_key: Option<String>,

    #[arg(long, env = "AUTOPILOT_STORE", value_enum, default_value_t = StoreBackend::Memory)]
    store: StoreBackend,

    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    /// `owner/repo`
    #[arg(long, env = "MEMORY_REPO")]
    memory_repo: Option<String>,

    #[arg(long, env = "MEMORY_PATH", default_value = "memory/autonomous.json")]
    memory_path: String,

    #[arg(long, env = "MEMORY_BRANCH", default_value = "main")]
    memory_branch: String,

    /// Tick 调参 YAML 文件
    #[arg(long, env = "TICK_CONFIG")]
    tick_config: Option<String>,

    /// 使用的模型：AGENT_MODEL_<ID>_* 中的 <ID>（Groq 快捷配置为 `groq`）或 model 字段值，缺省取第一个
    #[arg(long, env = "AUTOPILOT_MODEL")]
    model: Option<String>,

    /// 每次 LLM 调用的默认 max_tokens
    #[arg(long, env = "AUTOPILOT_MAX_TOKENS", default_value_t = 1024)]
    max_tokens: u32,
}

fn build_store(
    cli: &Cli,
    client: Arc<Client>,
    default_autonomous_mode: bool,
) -> Result<Arc<dyn DocumentStore>> {
    match cli.store {
        StoreBackend::Memory => {
            warn!("🧪 使用内存存储，重启后记忆文档会丢失");
            let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
            Ok(store)
        }
        StoreBackend::Github => {
            let token = cli
                .github_token
                .as_deref()
                .ok_or_else(|| ConfigError::MissingCredential("GITHUB_TOKEN".to_string()))?;
            let repo = cli
                .memory_repo
                .as_deref()
                .ok_or_else(|| ConfigError::MissingField("MEMORY_REPO".to_string()))?;
            let config = GithubConfig::new(repo, &cli.memory_path, &cli.memory_branch, token)?
                .with_default_autonomous_mode(default_autonomous_mode);
            let store: Arc<dyn DocumentStore> = Arc::new(GithubDocumentStore::new(client, config));
            Ok(store)
        }
    }
}

fn build_llm(cli: &Cli, client: Arc<Client>) -> Option<Arc<dyn LlmClient>> {
    let selected = ModelsConfig::from_env().and_then(|models| models.select(cli.model.as_deref()));
    match selected {
        Ok(model) => {
            info!(model = %model.model, "🤖 已配置 LLM");
            let llm: Arc<dyn LlmClient> =
                Arc::new(DefaultLlmClient::new(client, model).with_max_tokens(cli.max_tokens));
            Some(llm)
        }
        Err(e) => {
            warn!(error = %e, "⚠️ 未配置 LLM，规划与内容生成将降级");
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let tick_config = match cli.tick_config.as_deref() {
        Some(path) => TickConfig::load(path)?,
        None => TickConfig::default(),
    };

    let client = Arc::new(Client::new());
    let store = build_store(&cli, client.clone(), tick_config.default_autonomous_mode)?;

    let mut engine = TickEngine::new(store, Arc::new(HandlerRegistry::with_builtin()), tick_config);
    if let Some(llm) = build_llm(&cli, client) {
        engine = engine.with_llm(llm);
    }
    info!(
        store = %engine.store().describe(),
        max_run_log = engine.config().max_run_log,
        pattern_window = engine.config().pattern_window,
        "📦 Tick 引擎已就绪"
    );

    let api_secret = cli.api_secret.clone().or_else(|| cli.legacy_api_key.clone());
    if api_secret.is_none() {
        warn!("🔓 未配置 API_SECRET，写接口对所有人开放");
    }

    let bind = cli
        .bind
        .clone()
        .unwrap_or_else(|| format!("0.0.0.0:{}", cli.port));
    server::serve(Arc::new(AppState::new(engine, api_secret)), &bind).await
}
