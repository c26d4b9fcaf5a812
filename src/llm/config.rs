//! LLM 配置加载
//!
//! 从环境变量读取模型配置，格式：
//! ```text
//! AGENT_MODEL_<ID>_MODEL=gpt-4o
//! AGENT_MODEL_<ID>_BASEURL=https://api.openai.com/v1/chat/completions
//! AGENT_MODEL_<ID>_APIKEY=sk-...
//! ```
//! `<ID>` 为自定义标识（如 `GPT4O`、`QWEN`），不区分大小写。
//!
//! 另外兼容 `GROQ_API_KEY`（可选 `GROQ_MODEL`），直接注册一个 Groq 模型。

use crate::error::{ConfigError, Result};
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;

pub const GROQ_BASEURL: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const GROQ_DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

/// 单个模型的连接配置
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ModelConfig {
    /// LLM 接口中使用的模型名（如 `gpt-4o`）
    pub model: String,
    /// Chat Completions 接口完整 URL
    pub baseurl: String,
    pub apikey: String,
}

/// 已加载的模型配置表（key = model 字段值）
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    pub models: BTreeMap<String, ModelConfig>,
    /// 小写的 `<ID>` → model 字段值；Groq 快捷配置的 ID 为 `groq`
    #[serde(default)]
    pub ids: BTreeMap<String, String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    /// 从任意键值对解析，便于测试时不触碰进程环境
    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Result<Self> {
        const PREFIX: &str = "AGENT_MODEL_";
        let mut model_configs: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        let mut groq_key = None;
        let mut groq_model = None;

        for (key, value) in vars {
            if let Some(suffix) = key.strip_prefix(PREFIX) {
                let parts: Vec<&str> = suffix.split('_').collect();
                if parts.len() != 2 {
                    return Err(ConfigError::EnvFormatError(key).into());
                }
                let model_id = parts[0].to_lowercase();
                let config_key = parts[1].to_lowercase();

                match config_key.as_str() {
                    "model" | "baseurl" | "apikey" => {}
                    _ => {
                        return Err(ConfigError::InvalidValue {
                            field: key,
                            message: format!("unknown model key '{}'", config_key),
                        }
                        .into());
                    }
                }
                model_configs
                    .entry(model_id)
                    .or_default()
                    .insert(config_key, value);
            } else if key == "GROQ_API_KEY" && !value.is_empty() {
                groq_key = Some(value);
            } else if key == "GROQ_MODEL" && !value.is_empty() {
                groq_model = Some(value);
            }
        }

        let mut models = BTreeMap::new();
        let mut ids = BTreeMap::new();
        for (model_id, mut config_map) in model_configs {
            let mut take = |field: &str| {
                config_map
                    .remove(field)
                    .ok_or_else(|| ConfigError::MissingField(format!("{}.{}", model_id, field)))
            };
            let model = take("model")?;
            let baseurl = take("baseurl")?;
            let apikey = take("apikey")?;
            ids.insert(model_id.clone(), model.clone());
            models.insert(
                model.clone(),
                ModelConfig {
                    model,
                    baseurl,
                    apikey,
                },
            );
        }

        if let Some(apikey) = groq_key {
            let model = groq_model.unwrap_or_else(|| GROQ_DEFAULT_MODEL.to_string());
            ids.entry("groq".to_string()).or_insert_with(|| model.clone());
            models.entry(model.clone()).or_insert(ModelConfig {
                model,
                baseurl: GROQ_BASEURL.to_string(),
                apikey,
            });
        }

        Ok(Self { models, ids })
    }

    /// 选择模型：指定时先按 model 字段值、再按 `<ID>`（不区分大小写）匹配，
    /// 否则取第一个已配置的模型
    pub fn select(&self, model: Option<&str>) -> Result<ModelConfig> {
        match model {
            Some(name) => self
                .models
                .get(name)
                .or_else(|| {
                    self.ids
                        .get(&name.to_lowercase())
                        .and_then(|m| self.models.get(m))
                })
                .cloned()
                .ok_or_else(|| {
                ConfigError::MissingCredential(format!("model '{}' is not configured", name))
                    .into()
            }),
            None => self.models.values().next().cloned().ok_or_else(|| {
                ConfigError::MissingCredential(
                    "set GROQ_API_KEY or AGENT_MODEL_<ID>_* variables".to_string(),
                )
                .into()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_agent_model_vars() {
        let config = Config::from_vars(vars(&[
            ("AGENT_MODEL_QWEN_MODEL", "qwen3-max"),
            ("AGENT_MODEL_QWEN_BASEURL", "https://example.com/v1/chat/completions"),
            ("AGENT_MODEL_QWEN_APIKEY", "sk-1"),
            ("PATH", "/usr/bin"),
        ]))
        .unwrap();

        let model = config.select(Some("qwen3-max")).unwrap();
        assert_eq!(model.apikey, "sk-1");
    }

    #[test]
    fn test_select_by_id() {
        let config = Config::from_vars(vars(&[
            ("AGENT_MODEL_QWEN_MODEL", "qwen3-max"),
            ("AGENT_MODEL_QWEN_BASEURL", "https://example.com/v1/chat/completions"),
            ("AGENT_MODEL_QWEN_APIKEY", "sk-1"),
            ("GROQ_API_KEY", "gsk-1"),
        ]))
        .unwrap();

        assert_eq!(config.select(Some("QWEN")).unwrap().model, "qwen3-max");
        assert_eq!(config.select(Some("qwen")).unwrap().model, "qwen3-max");
        assert_eq!(config.select(Some("groq")).unwrap().model, GROQ_DEFAULT_MODEL);
        assert!(config.select(Some("gpt4o")).is_err());
    }

    #[test]
    fn test_groq_shortcut() {
        let config = Config::from_vars(vars(&[("GROQ_API_KEY", "gsk-1")])).unwrap();
        let model = config.select(None).unwrap();
        assert_eq!(model.model, GROQ_DEFAULT_MODEL);
        assert_eq!(model.baseurl, GROQ_BASEURL);
    }

    #[test]
    fn test_missing_field() {
        let err = Config::from_vars(vars(&[("AGENT_MODEL_X_MODEL", "m")])).unwrap_err();
        assert!(err.to_string().contains("x.baseurl"));
    }

    #[test]
    fn test_malformed_key() {
        let err = Config::from_vars(vars(&[("AGENT_MODEL_A_B_MODEL", "m")])).unwrap_err();
        assert!(matches!(
            err,
            crate::error::AutopilotError::Config(ConfigError::EnvFormatError(_))
        ));
    }

    #[test]
    fn test_no_credential() {
        let config = Config::from_vars(Vec::new()).unwrap();
        let err = config.select(None).unwrap_err();
        assert!(matches!(
            err,
            crate::error::AutopilotError::Config(ConfigError::MissingCredential(_))
        ));
    }
}
