pub mod execution;
pub mod template;

pub use execution::*;
pub use template::*;
