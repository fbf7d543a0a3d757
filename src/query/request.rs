//! Read requests and the per-file reader contract

use crate::core::source::FileSourceConfig;
use crate::core::temporal::count;
use crate::error::{Error, Result};
use crate::storage::catalog::{Catalog, FileSourceGroups};
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::path::{Path, PathBuf};

/// One bounded read of one physical file
#[derive(Debug, Clone)]
pub struct ReadInfo<'a> {
    pub file_path: PathBuf,
    pub source_config: &'a FileSourceConfig,
    /// Period-aligned UTC begin the file belongs to
    pub regular_utc_file_begin: DateTime<Utc>,
    /// First element to read, relative to the file's own content begin
    pub element_offset: u64,
    /// Elements to read
    pub element_count: u64,
    /// Elements a complete file holds (`file_period / sample_period`)
    pub nominal_file_length: u64,
}

impl fmt::Display for ReadInfo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] offset={} count={} of {}",
            self.file_path.display(),
            self.regular_utc_file_begin.format("%Y-%m-%dT%H:%M:%SZ"),
            self.element_offset,
            self.element_count,
            self.nominal_file_length
        )
    }
}

/// Destination buffers for one resource.
///
/// `data` holds `element_size` bytes per element and `status` one byte per
/// element, set to 1 by the reader for every element actually written.
#[derive(Debug, Clone)]
pub struct ReadRequest {
    pub resource_id: String,
    pub file_source_id: String,
    pub sample_period: Duration,
    pub element_size: usize,
    pub data: Vec<u8>,
    pub status: Vec<u8>,
}

impl ReadRequest {
    /// Zeroed buffers sized for `[begin, end)` at `sample_period`
    pub fn for_window(
        resource_id: impl Into<String>,
        file_source_id: impl Into<String>,
        sample_period: Duration,
        element_size: usize,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Self> {
        if sample_period <= Duration::zero() || begin >= end {
            return Err(Error::InvalidInput(format!(
                "cannot size buffers for [{begin}, {end}) at {sample_period}"
            )));
        }
        let elements = usize::try_from(count(end - begin, sample_period))
            .map_err(|_| Error::ResourceExhausted("read window too large".to_string()))?;

        Ok(Self {
            resource_id: resource_id.into(),
            file_source_id: file_source_id.into(),
            sample_period,
            element_size,
            data: vec![0; elements * element_size],
            status: vec![0; elements],
        })
    }

    /// Number of elements the buffers hold
    pub fn element_count(&self) -> usize {
        self.status.len()
    }

    /// Elements with status 1
    pub fn valid_count(&self) -> usize {
        self.status.iter().filter(|s| **s == 1).count()
    }

    /// Buffers must hold exactly `expected` elements
    pub fn check_len(&self, expected: usize) -> Result<()> {
        if self.status.len() != expected || self.data.len() != expected * self.element_size {
            return Err(Error::InvalidInput(format!(
                "buffers of resource '{}' hold {} elements ({} data bytes), expected {} elements of {} bytes",
                self.resource_id,
                self.status.len(),
                self.data.len(),
                expected,
                self.element_size
            )));
        }
        Ok(())
    }

    /// Borrow `count` elements starting at `offset`
    pub fn slice(&mut self, offset: usize, count: usize) -> Result<ReadSlice<'_>> {
        let size = self.element_size;
        let end = offset
            .checked_add(count)
            .filter(|end| *end <= self.status.len())
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "elements [{offset}, {offset}+{count}) exceed the {} elements of resource '{}'",
                    self.status.len(),
                    self.resource_id
                ))
            })?;
        Ok(ReadSlice {
            resource_id: &self.resource_id,
            element_size: size,
            data: &mut self.data[offset * size..end * size],
            status: &mut self.status[offset..end],
        })
    }
}

/// Per-file view into one request's buffers
#[derive(Debug)]
pub struct ReadSlice<'a> {
    pub resource_id: &'a str,
    pub element_size: usize,
    pub data: &'a mut [u8],
    pub status: &'a mut [u8],
}

impl ReadSlice<'_> {
    /// Elements covered by this slice
    pub fn len(&self) -> usize {
        self.status.len()
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_empty()
    }
}

/// Format specific behaviour plugged into a structured file source
pub trait FileFormat: Send + Sync {
    /// Add format specific resources or properties to a catalog
    fn enrich_catalog(&self, catalog: Catalog, _groups: &FileSourceGroups) -> Result<Catalog> {
        Ok(catalog)
    }

    /// Fill `slices` from the file described by `info`
    fn read(&self, info: &ReadInfo<'_>, slices: &mut [ReadSlice<'_>]) -> Result<()>;

    /// Fraction of a file's period it actually covers
    fn probe(&self, path: &Path) -> Result<f64> {
        Ok(if path.is_file() { 1.0 } else { 0.0 })
    }
}

/// Receives read progress as a fraction in `[0, 1]`.
///
/// Values never decrease within one operation.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, _fraction: f64) {}
}

/// No-op progress reporter
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}

impl<F> ProgressReporter for F
where
    F: Fn(f64) + Send + Sync,
{
    fn report(&self, fraction: f64) {
        self(fraction)
    }
}
