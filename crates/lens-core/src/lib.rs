pub mod analysis;
pub mod error;
pub mod lifecycle;
pub mod memory;
pub mod queue;
pub mod store;
pub mod validation;

pub mod types;

pub use crate::analysis::{Analyzer, Generator};
pub use crate::error::LensError;
pub use crate::lifecycle::TaskLifecycle;
pub use crate::queue::{JobSource, TaskQueue};
pub use crate::store::KvStore;
