// src/library/mod.rs
// 参考光谱库与检索
pub mod entry;
pub mod matcher;
pub mod metrics;
pub mod store;
// 公开导出
pub use entry::{Library, LibraryEntry};
pub use matcher::{search, SearchOptions, SearchOutcome, SearchResult};
pub use metrics::{IurSettings, Metric};
pub use store::{load_library, save_library, DEFAULT_LIBRARY_FILE, LIBRARY_SCHEMA_VERSION};
