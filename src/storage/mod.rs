//! Catalog model and the reference file format

pub mod catalog;
pub mod raw;

pub use catalog::*;
pub use raw::RawFileFormat;
