//! 内置任务处理器

mod content;
mod diagnose;
mod generic;
mod health;
mod maintenance;
mod reflection;

pub use content::ContentGenerationHandler;
pub use diagnose::DiagnoseFailureHandler;
pub use generic::GenericHandler;
pub use health::HealthCheckHandler;
pub use maintenance::MemoryMaintenanceHandler;
pub use reflection::SelfReflectionHandler;

use crate::handlers::TaskHandler;
use std::sync::Arc;

pub const HEALTH_CHECK: &str = "health_check";
pub const MEMORY_MAINTENANCE: &str = "memory_maintenance";
pub const CONTENT_GENERATION: &str = "content_generation";
pub const SELF_REFLECTION: &str = "self_reflection";
pub const DIAGNOSE_FAILURE: &str = "diagnose_failure";
/// 兜底处理器的类型名（不会出现在任务上）
pub const GENERIC: &str = "generic";
/// 未知类型派生的"补齐处理器"任务
pub const BUILD_HANDLER: &str = "build_handler";

pub fn all() -> Vec<Arc<dyn TaskHandler>> {
    vec![
        Arc::new(HealthCheckHandler),
        Arc::new(MemoryMaintenanceHandler),
        Arc::new(ContentGenerationHandler),
        Arc::new(SelfReflectionHandler),
        Arc::new(DiagnoseFailureHandler),
    ]
}
