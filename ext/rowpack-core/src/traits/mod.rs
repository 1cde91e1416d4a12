mod intuition;
mod storage;

pub use intuition::{ColumnMeta, RowSource, StatsEngine, TypeIntuiter};
pub use storage::{LocalStorage, Storage, StreamHandle};
