pub mod config;
pub mod error;
pub mod handlers;
pub mod llm;
pub mod memory;
pub mod server;
pub mod tasks;
pub mod testing;
pub mod tick;

pub mod prelude {
    pub use crate::config::TickConfig;
    pub use crate::error::Result;
    pub use crate::handlers::{HandlerContext, HandlerOutcome, HandlerRegistry, TaskHandler};
    pub use crate::llm::LlmClient;
    pub use crate::memory::{DocumentStore, InMemoryDocumentStore, MemoryDocument};
    pub use crate::tasks::{Task, TaskSpec};
    pub use crate::tick::{TickEngine, TickReport};
}
