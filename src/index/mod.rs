//! Name based file indexing: no persistent index, only the folder hierarchy

pub mod locator;
pub mod resolver;

pub use locator::{locate, locate_all, CandidateFile, CandidateFiles, LocateWindow};
pub use resolver::{folder_begin, resolve};
