pub mod execution_store;
pub mod memory;
pub mod template_store;

pub use execution_store::{ExecutionRepository, SqliteExecutionStore};
pub use memory::MemoryExecutionStore;
pub use template_store::TemplateStore;
