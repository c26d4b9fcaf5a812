//! Tick 引擎调参配置
//!
//! 所有字段均有默认值，可通过 YAML 文件覆盖部分字段：
//! ```yaml
//! max_run_log: 500
//! max_learnings: 100
//! pattern_window: 3
//! ```

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct TickConfig {
    /// 运行日志最大条数，超出时丢弃最旧的
    pub max_run_log: usize,
    /// 扁平 learnings 列表上限
    pub max_learnings: usize,
    /// 结构化 learnings 列表上限
    pub max_structured_learnings: usize,
    /// 已完成任务列表上限
    pub max_completed: usize,
    pub max_self_improvement_notes: usize,
    /// 优先级数值上限（数值越大越靠后）
    pub max_priority: i64,
    /// 模式检测观察的最近已完成任务数
    pub pattern_window: usize,
    /// 窗口内同类型失败达到该次数即触发自适应
    pub pattern_threshold: usize,
    /// 触发模式后对同类型待处理任务追加的优先级数值
    pub deprioritize_step: i64,
    /// `REDUCE_PRIORITY` 类型新派生任务的优先级惩罚
    pub reduce_priority_penalty: i64,
    pub default_max_retries: u32,
    /// 运行日志中结果摘要的截断长度（字符）
    pub result_summary_chars: usize,
    /// 首次初始化文档时 `autonomousMode` 的取值
    pub default_autonomous_mode: bool,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            max_run_log: 500,
            max_learnings: 100,
            max_structured_learnings: 100,
            max_completed: 200,
            max_self_improvement_notes: 50,
            max_priority: 10,
            pattern_window: 3,
            pattern_threshold: 2,
            deprioritize_step: 5,
            reduce_priority_penalty: 3,
            default_max_retries: 3,
            result_summary_chars: 200,
            default_autonomous_mode: true,
        }
    }
}

impl TickConfig {
    pub fn load(path: &str) -> Result<Self> {
        let file =
            std::fs::File::open(path).map_err(|_| ConfigError::FileNotFound(path.to_string()))?;
        let config: TickConfig = serde_yaml::from_reader(file)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.pattern_threshold == 0 || self.pattern_threshold > self.pattern_window {
            return Err(ConfigError::InvalidValue {
                field: "pattern_threshold".to_string(),
                message: format!("must be within 1..={}", self.pattern_window),
            }
            .into());
        }
        if self.max_priority < 1 {
            return Err(ConfigError::InvalidValue {
                field: "max_priority".to_string(),
                message: "must be at least 1".to_string(),
            }
            .into());
        }
        Ok(())
    }
}
