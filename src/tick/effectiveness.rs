//! 任务类型效果统计
//!
//! 每个任务类型一条记录，累计全部历史运行的失败率与平均耗时，
//! 另保留最近几次的成败用于识别连续失败。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 失败率超过该百分比建议降低优先级
pub const REDUCE_THRESHOLD: f64 = 50.0;
/// 失败率超过该百分比建议持续观察
pub const MONITOR_THRESHOLD: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    #[default]
    Healthy,
    Monitor,
    ReducePriority,
}

impl Recommendation {
    pub fn from_fail_rate(fail_rate: f64) -> Self {
        if fail_rate > REDUCE_THRESHOLD {
            Recommendation::ReducePriority
        } else if fail_rate > MONITOR_THRESHOLD {
            Recommendation::Monitor
        } else {
            Recommendation::Healthy
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct EffectivenessRecord {
    pub total_runs: u64,
    pub failed_runs: u64,
    /// 失败百分比（0-100）
    pub fail_rate: f64,
    pub avg_execution_ms: f64,
    pub last_run: Option<DateTime<Utc>>,
    /// 最近若干次运行的成败，最新的在末尾
    pub recent_outcomes: Vec<bool>,
    pub recommendation: Recommendation,
}

impl EffectivenessRecord {
    /// 记录一次运行并重新计算建议
    pub fn record(&mut self, success: bool, execution_ms: u64, window: usize, threshold: usize) {
        let previous_total = self.total_runs as f64;
        self.total_runs += 1;
        if !success {
            self.failed_runs += 1;
        }
        self.fail_rate = self.failed_runs as f64 * 100.0 / self.total_runs as f64;
        self.avg_execution_ms =
            (self.avg_execution_ms * previous_total + execution_ms as f64) / self.total_runs as f64;
        self.last_run = Some(Utc::now());

        self.recent_outcomes.push(success);
        if self.recent_outcomes.len() > window {
            let excess = self.recent_outcomes.len() - window;
            self.recent_outcomes.drain(..excess);
        }

        self.recommendation = self.derive_recommendation(threshold);
    }

    fn derive_recommendation(&self, threshold: usize) -> Recommendation {
        let recent_failures = self.recent_outcomes.iter().filter(|ok| !**ok).count();
        if recent_failures >= threshold {
            Recommendation::ReducePriority
        } else {
            Recommendation::from_fail_rate(self.fail_rate)
        }
    }

    /// 模式检测命中后强制降级
    pub fn force_reduce(&mut self) {
        self.recommendation = Recommendation::ReducePriority;
    }
}

/// 根据类型的效果建议调整新派生任务的优先级
pub fn adjusted_priority(
    priority: i64,
    record: Option<&EffectivenessRecord>,
    penalty: i64,
    max: i64,
) -> i64 {
    match record.map(|r| r.recommendation) {
        Some(Recommendation::ReducePriority) if priority < max => (priority + penalty).min(max),
        _ => priority,
    }
}
