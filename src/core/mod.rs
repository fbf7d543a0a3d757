//! Core data types and models

pub mod source;
pub mod template;
pub mod temporal;

pub use source::*;
pub use template::*;
pub use temporal::*;
