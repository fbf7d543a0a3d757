//! temporal-fs: time-partitioned file access
//!
//! Locates, time-indexes and reads time-series data stored as a folder
//! hierarchy whose folder and file *names* encode the time of their content,
//! such as `2020-01/02/120000.dat`. No index is kept; every query derives
//! what it needs from the names.
//!
//! # Core Concepts
//!
//! - **Templates**: date/time patterns for single path segments
//! - **File sources**: one naming convention and its validity, grouped into
//!   file source groups when the convention changed over time
//! - **Candidate location**: descending only the folders that can hold data
//!   for a window
//! - **Read decomposition**: splitting a window into bounded per-file reads
//!   with exact element offsets
//!
//! # Example
//!
//! ```no_run
//! use temporal_fs::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> temporal_fs::error::Result<()> {
//! let config = CatalogConfig::from_path("file-sources.json".as_ref())?;
//! let source = StructuredFileSource::new(Arc::new(RawFileFormat::new(8, 0)));
//! source.initialize(SourceContext::from_config("/data", config)).await?;
//!
//! let range = source.time_range("/WEATHER/STATION_A", "main").await?;
//! println!("{} .. {}", range.begin, range.end);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod core;
pub mod error;
pub mod index;
pub mod query;
pub mod source;
pub mod storage;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::core::*;
    pub use crate::error::{Error, Result};
    pub use crate::index::{CandidateFile, LocateWindow};
    pub use crate::query::{FileFormat, ProgressReporter, ReadInfo, ReadRequest, ReadSlice};
    pub use crate::source::{SourceContext, StructuredFileSource};
    pub use crate::storage::*;
}
