//! 核心层：任务模型、注册表、执行器与错误类型

pub mod error;
pub mod executor;
pub mod registry;
pub mod task;

pub use error::{sanitize_provider_error, PipelineError};
pub use executor::{checkpoint, CancellationRegistry, ProgressReporter, TaskExecutor};
pub use registry::{spawn_reaper, InMemoryTaskStore, TaskStore};
pub use task::{ProgressEntry, Task, TaskError, TaskId, TaskKind, TaskSnapshot, TaskStatus};
