use std::fmt;

/// Autopilot 服务的统一错误类型
#[derive(Debug)]
pub enum AutopilotError {
    /// LLM 相关错误
    Llm(LlmError),
    /// 记忆文档存储错误
    Store(StoreError),
    /// Tick 执行错误
    Tick(TickError),
    /// 解析错误
    Parse(ParseError),
    /// 配置错误
    Config(ConfigError),
    /// IO 错误
    Io(std::io::Error),
    /// 其他错误
    Other(String),
}

/// LLM 相关错误
#[derive(Debug)]
pub enum LlmError {
    /// 网络请求失败
    NetworkError(String),
    /// API 返回错误状态码（上游错误）
    ApiError { status: u16, message: String },
    /// 响应格式无效
    InvalidResponse(String),
    /// 没有返回内容
    EmptyResponse,
}

/// 记忆文档存储错误
#[derive(Debug)]
pub enum StoreError {
    /// 文档尚不存在，调用方需要初始化并创建
    NotFound(String),
    /// 修订号已过期：其他写入者抢先更新了文档
    Conflict(String),
    /// 网络或 HTTP 层的临时失败
    Transient(String),
    /// 文档内容无法编码/解码
    Serialization(String),
}

/// Tick 执行错误
#[derive(Debug)]
pub enum TickError {
    /// 无法读取记忆文档，tick 在任何修改之前中止
    StoreUnavailable(String),
    /// 任务处理器执行失败
    HandlerFailed { task_type: String, message: String },
}

/// 解析错误
#[derive(Debug)]
pub enum ParseError {
    /// JSON 解析错误
    JsonError(String),
    /// 输出格式不符合预期
    UnexpectedFormat(String),
}

/// 配置错误
#[derive(Debug)]
pub enum ConfigError {
    /// 配置文件未找到
    FileNotFound(String),
    /// 配置解析失败
    ParseFailed(String),
    /// 缺少必需的配置项
    MissingField(String),
    /// 环境变量命名不符合 `AGENT_MODEL_<ID>_<KEY>` 格式
    EnvFormatError(String),
    /// 未配置访问凭证
    MissingCredential(String),
    /// 配置值无效
    InvalidValue { field: String, message: String },
}

impl fmt::Display for AutopilotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutopilotError::Llm(e) => write!(f, "LLM Error: {}", e),
            AutopilotError::Store(e) => write!(f, "Store Error: {}", e),
            AutopilotError::Tick(e) => write!(f, "Tick Error: {}", e),
            AutopilotError::Parse(e) => write!(f, "Parse Error: {}", e),
            AutopilotError::Config(e) => write!(f, "Config Error: {}", e),
            AutopilotError::Io(e) => write!(f, "IO Error: {}", e),
            AutopilotError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            LlmError::ApiError { status, message } => {
                write!(f, "API error (status {}): {}", status, message)
            }
            LlmError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
            LlmError::EmptyResponse => write!(f, "Empty response from LLM"),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound(what) => write!(f, "Document not found: {}", what),
            StoreError::Conflict(msg) => write!(f, "Revision conflict: {}", msg),
            StoreError::Transient(msg) => write!(f, "Store request failed: {}", msg),
            StoreError::Serialization(msg) => write!(f, "Document serialization error: {}", msg),
        }
    }
}

impl fmt::Display for TickError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickError::StoreUnavailable(msg) => write!(f, "Store unavailable: {}", msg),
            TickError::HandlerFailed { task_type, message } => {
                write!(f, "Handler '{}' failed: {}", task_type, message)
            }
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::JsonError(msg) => write!(f, "JSON parse error: {}", msg),
            ParseError::UnexpectedFormat(msg) => write!(f, "Unexpected format: {}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {}", path),
            ConfigError::ParseFailed(msg) => write!(f, "Failed to parse config: {}", msg),
            ConfigError::MissingField(field) => write!(f, "Missing config field: {}", field),
            ConfigError::EnvFormatError(key) => {
                write!(f, "Malformed model env var '{}', expected AGENT_MODEL_<ID>_<KEY>", key)
            }
            ConfigError::MissingCredential(what) => write!(f, "No credential configured: {}", what),
            ConfigError::InvalidValue { field, message } => {
                write!(f, "Invalid config value for '{}': {}", field, message)
            }
        }
    }
}

impl std::error::Error for AutopilotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AutopilotError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for LlmError {}
impl std::error::Error for StoreError {}
impl std::error::Error for TickError {}
impl std::error::Error for ParseError {}
impl std::error::Error for ConfigError {}

impl AutopilotError {
    /// 是否为修订号冲突（写入被并发写者抢先）
    pub fn is_conflict(&self) -> bool {
        matches!(self, AutopilotError::Store(StoreError::Conflict(_)))
    }

    /// 是否为文档不存在
    pub fn is_not_found(&self) -> bool {
        matches!(self, AutopilotError::Store(StoreError::NotFound(_)))
    }
}

// From 转换实现
impl From<std::io::Error> for AutopilotError {
    fn from(err: std::io::Error) -> Self {
        AutopilotError::Io(err)
    }
}

impl From<reqwest::Error> for AutopilotError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AutopilotError::Llm(LlmError::NetworkError("Request timeout".to_string()))
        } else if err.is_connect() {
            AutopilotError::Llm(LlmError::NetworkError(format!(
                "Connection failed: {}",
                err
            )))
        } else {
            AutopilotError::Llm(LlmError::NetworkError(err.to_string()))
        }
    }
}

impl From<serde_json::Error> for AutopilotError {
    fn from(err: serde_json::Error) -> Self {
        AutopilotError::Parse(ParseError::JsonError(err.to_string()))
    }
}

impl From<serde_yaml::Error> for AutopilotError {
    fn from(err: serde_yaml::Error) -> Self {
        AutopilotError::Config(ConfigError::ParseFailed(err.to_string()))
    }
}

impl From<LlmError> for AutopilotError {
    fn from(err: LlmError) -> Self {
        AutopilotError::Llm(err)
    }
}

impl From<StoreError> for AutopilotError {
    fn from(err: StoreError) -> Self {
        AutopilotError::Store(err)
    }
}

impl From<TickError> for AutopilotError {
    fn from(err: TickError) -> Self {
        AutopilotError::Tick(err)
    }
}

impl From<ParseError> for AutopilotError {
    fn from(err: ParseError) -> Self {
        AutopilotError::Parse(err)
    }
}

impl From<ConfigError> for AutopilotError {
    fn from(err: ConfigError) -> Self {
        AutopilotError::Config(err)
    }
}

// 便捷的 Result 类型别名
pub type Result<T> = std::result::Result<T, AutopilotError>;
