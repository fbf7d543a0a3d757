//! Candidate file discovery without a full tree walk.
//!
//! The folder hierarchy is descended one path segment level at a time.
//! Levels whose folder names carry date/time information are pruned by an
//! overlap test against the requested window; purely descriptive levels are
//! matched by exact name. Descent uses an explicit worklist whose depth is
//! bounded by the number of path segment templates.

use crate::core::source::FileSourceConfig;
use crate::core::template::Precision;
use crate::core::temporal::{reference_epoch, CanonicalTimeValue};
use crate::error::{Error, Result};
use crate::index::resolver;
use chrono::{DateTime, Duration, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Which part of the hierarchy to resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocateWindow {
    /// Folders overlapping `[begin, end)`
    Range {
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// Only the single earliest branch
    Earliest,
    /// Only the single latest branch
    Latest,
}

impl LocateWindow {
    fn is_single_branch(&self) -> bool {
        !matches!(self, LocateWindow::Range { .. })
    }
}

/// A file whose name resolved to a time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub path: PathBuf,
    pub resolved_time: CanonicalTimeValue,
}

#[derive(Debug, Clone, Copy)]
struct FolderStamp {
    value: CanonicalTimeValue,
    precision: Precision,
}

impl FolderStamp {
    /// UTC interval the folder may hold data for
    fn interval(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let begin = self.value.to_utc();
        let local = self.value.local();
        let end = self
            .precision
            .advance(local)
            .map(|next| begin + (next - local))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        (begin, end)
    }
}

#[derive(Debug)]
struct PendingFolder {
    path: PathBuf,
    depth: usize,
    stamp: Option<FolderStamp>,
}

/// Lazy sequence of candidate files, see [`locate`]
pub struct CandidateFiles<'a> {
    config: &'a FileSourceConfig,
    window: LocateWindow,
    cancel: &'a CancellationToken,
    stack: Vec<PendingFolder>,
    ready: std::vec::IntoIter<CandidateFile>,
    found_any: bool,
    finished: bool,
}

/// Enumerate the files under `root` that may hold data for `window`.
///
/// Files whose names do not match the config are skipped silently. The
/// files of one leaf folder are yielded in chronological order; branches
/// are visited earliest first (latest first for [`LocateWindow::Latest`]).
pub fn locate<'a>(
    root: &Path,
    window: LocateWindow,
    config: &'a FileSourceConfig,
    cancel: &'a CancellationToken,
) -> CandidateFiles<'a> {
    let mut stack = Vec::new();
    if root.is_dir() {
        stack.push(PendingFolder {
            path: root.to_path_buf(),
            depth: 0,
            stamp: None,
        });
    } else {
        debug!(root = %root.display(), "root folder does not exist");
    }

    CandidateFiles {
        config,
        window,
        cancel,
        stack,
        ready: Vec::new().into_iter(),
        found_any: false,
        finished: false,
    }
}

impl<'a> Iterator for CandidateFiles<'a> {
    type Item = Result<CandidateFile>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(file) = self.ready.next() {
                self.found_any = true;
                return Some(Ok(file));
            }
            if self.finished || (self.found_any && self.window.is_single_branch()) {
                self.finished = true;
                return None;
            }

            let Some(folder) = self.stack.pop() else {
                self.finished = true;
                return None;
            };
            if self.cancel.is_cancelled() {
                self.finished = true;
                return Some(Err(Error::Cancelled));
            }

            let leaf = folder.depth == self.config.path_segment_templates.len();
            if leaf {
                match self.scan_files(&folder) {
                    Ok(files) => self.ready = files.into_iter(),
                    Err(e) => {
                        self.finished = true;
                        return Some(Err(e));
                    }
                }
            } else {
                let children = self.expand(&folder);
                self.stack.extend(children.into_iter().rev());
            }
        }
    }
}

impl<'a> CandidateFiles<'a> {
    /// Matching subfolders of `folder`, in visiting order
    fn expand(&self, folder: &PendingFolder) -> Vec<PendingFolder> {
        let template = &self.config.path_segment_templates[folder.depth];
        let base = folder.stamp.map(|s| s.value.local());

        let mut has_time = false;
        let mut matched = Vec::new();
        for (name, path) in list_entries(&folder.path, true) {
            let Some(m) = template.parse(&name, self.config.utc_offset, base) else {
                continue;
            };
            let stamp = if m.kind.carries_time() {
                has_time = true;
                let precision = template
                    .precision()
                    .into_iter()
                    .chain(folder.stamp.map(|s| s.precision))
                    .max()
                    .unwrap_or(Precision::Second);
                Some(FolderStamp {
                    value: m.value,
                    precision,
                })
            } else {
                folder.stamp
            };
            let child = PendingFolder {
                path,
                depth: folder.depth + 1,
                stamp,
            };
            matched.push((name, child));
        }

        let key = |f: &PendingFolder| f.stamp.map(|s| s.value.to_utc());

        if !has_time {
            let reference = match self.window {
                LocateWindow::Range { begin, .. } => self.config.to_local(begin),
                _ => reference_epoch(),
            };
            let expected = template.render(reference, self.config.utc_offset);
            matched.retain(|(name, _)| *name == expected);
        } else if let LocateWindow::Range { begin, end } = self.window {
            let margin = search_margin(self.config);
            let begin = begin.checked_sub_signed(margin).unwrap_or(DateTime::<Utc>::MIN_UTC);
            let end = end.checked_add_signed(margin).unwrap_or(DateTime::<Utc>::MAX_UTC);
            matched.retain(|(_, f)| match f.stamp {
                Some(stamp) => {
                    let (folder_begin, folder_end) = stamp.interval();
                    folder_begin < end && folder_end > begin
                }
                None => true,
            });
        }

        matched.sort_by(|(a_name, a), (b_name, b)| {
            key(a).cmp(&key(b)).then_with(|| a_name.cmp(b_name))
        });
        if self.window == LocateWindow::Latest {
            matched.reverse();
        }

        matched.into_iter().map(|(_, f)| f).collect()
    }

    /// Files of a leaf folder that resolve to a time
    fn scan_files(&self, folder: &PendingFolder) -> Result<Vec<CandidateFile>> {
        let known = folder.stamp.map(|s| s.value);
        let mut files = Vec::new();

        for (_, path) in list_entries(&folder.path, false) {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if let Some(resolved_time) = resolver::resolve(&path, self.config, known) {
                files.push(CandidateFile {
                    path,
                    resolved_time,
                });
            }
        }

        files.sort_by(|a, b| {
            a.resolved_time
                .to_utc()
                .cmp(&b.resolved_time.to_utc())
                .then_with(|| a.path.cmp(&b.path))
        });
        Ok(files)
    }
}

/// Names and paths of the folders (`dirs`) or files in `dir`.
///
/// A folder that vanished or cannot be read contributes nothing.
fn list_entries(dir: &Path, dirs: bool) -> Vec<(String, PathBuf)> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            if err.kind() == io::ErrorKind::NotFound {
                debug!(folder = %dir.display(), "folder vanished during scan");
            } else {
                warn!(folder = %dir.display(), error = %err, "cannot read folder");
            }
            return Vec::new();
        }
    };

    entries
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.path()),
            Err(err) => {
                debug!(folder = %dir.display(), error = %err, "skipping unreadable entry");
                None
            }
        })
        .filter(|path| if dirs { path.is_dir() } else { path.is_file() })
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?.to_string();
            Some((name, path))
        })
        .collect()
}

/// Collect all candidates for a window
pub fn locate_all(
    root: &Path,
    window: LocateWindow,
    config: &FileSourceConfig,
    cancel: &CancellationToken,
) -> Result<Vec<CandidateFile>> {
    locate(root, window, config, cancel).collect()
}

/// Margin used when searching for files near a period boundary
pub(crate) fn search_margin(config: &FileSourceConfig) -> Duration {
    config.utc_offset.abs() + config.file_name_time_offset.abs()
}
