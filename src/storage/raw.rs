//! Fixed-width binary files: an optional header followed by one record of
//! `element_size` bytes per sample, without any framing.

use crate::error::{Error, Result};
use crate::query::request::{FileFormat, ReadInfo, ReadSlice};
use crate::storage::catalog::{Catalog, FileSourceGroups, Resource};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::debug;

/// Property carrying the record width of a raw resource
pub const ELEMENT_SIZE_KEY: &str = "element-size";

/// Reader for single-channel fixed-width files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFileFormat {
    pub element_size: usize,
    pub header_size: u64,
}

impl RawFileFormat {
    pub fn new(element_size: usize, header_size: u64) -> Self {
        Self {
            element_size,
            header_size,
        }
    }

    /// Whole records in a file of `len` bytes
    fn records(&self, path: &Path, len: u64, element_size: usize) -> Result<u64> {
        let payload = len.saturating_sub(self.header_size);
        let element_size = element_size as u64;
        if element_size == 0 || payload % element_size != 0 {
            return Err(Error::Read(format!(
                "{}: payload of {payload} bytes is not a multiple of {element_size}",
                path.display()
            )));
        }
        Ok(payload / element_size)
    }
}

impl FileFormat for RawFileFormat {
    fn enrich_catalog(&self, mut catalog: Catalog, groups: &FileSourceGroups) -> Result<Catalog> {
        for id in groups.keys() {
            if catalog.resource(id).is_none() {
                catalog.resources.push(
                    Resource::new(id.clone(), id.clone())
                        .with_property(ELEMENT_SIZE_KEY, self.element_size.to_string()),
                );
            }
        }
        Ok(catalog)
    }

    fn read(&self, info: &ReadInfo<'_>, slices: &mut [ReadSlice<'_>]) -> Result<()> {
        let mut file = File::open(&info.file_path)?;
        let len = file.metadata()?.len();

        for slice in slices.iter_mut() {
            let size = slice.element_size;
            let records = self.records(&info.file_path, len, size)?;
            let available = records.saturating_sub(info.element_offset);
            let wanted = (slice.len() as u64).min(info.element_count);
            let count = usize::try_from(available.min(wanted))
                .map_err(|_| Error::ResourceExhausted("record count out of range".to_string()))?;
            if count < slice.len() {
                debug!(
                    path = %info.file_path.display(),
                    wanted = slice.len(),
                    count,
                    "file is shorter than its period"
                );
            }
            if count == 0 {
                continue;
            }

            file.seek(SeekFrom::Start(self.header_size + info.element_offset * size as u64))?;
            file.read_exact(&mut slice.data[..count * size])?;
            slice.status[..count].fill(1);
        }
        Ok(())
    }

    fn probe(&self, path: &Path) -> Result<f64> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_file() => {
                let records = self.records(path, meta.len(), self.element_size)?;
                Ok(if records > 0 { 1.0 } else { 0.0 })
            }
            Ok(_) => Ok(0.0),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0.0),
            Err(e) => Err(e.into()),
        }
    }
}
