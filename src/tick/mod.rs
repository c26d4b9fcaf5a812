//! Tick：自主循环的一个完整步骤
//!
//! - [`engine`]：状态机与读-改-写周期
//! - [`patterns`]：重复失败检测与自适应
//! - [`planner`]：队列为空时合成任务
//! - [`effectiveness`]：按任务类型的效果统计
//! - [`summary`]：tick 结果与只读报告

pub mod effectiveness;
pub mod engine;
pub mod patterns;
pub mod planner;
pub mod summary;

pub use effectiveness::{EffectivenessRecord, Recommendation};
pub use engine::TickEngine;
pub use patterns::Adaptation;
pub use planner::TaskSource;
pub use summary::{LearningsReport, SkippedTick, StatusReport, TaskBrief, TickReport, TickSummary};
