//! File begin resolution from folder and file names

use crate::core::source::FileSourceConfig;
use crate::core::template::MatchKind;
use crate::core::temporal::CanonicalTimeValue;
use std::path::Path;

/// Time encoded by the folders leading to `file_path`.
///
/// The last `n` ancestor folders are matched root to leaf against the `n`
/// path segment templates. Each level inherits the components it does not
/// specify from the level above, so the most specific segment wins.
/// Returns `None` if a folder does not match its template or no segment
/// carries date/time information.
pub fn folder_begin(file_path: &Path, config: &FileSourceConfig) -> Option<CanonicalTimeValue> {
    let templates = &config.path_segment_templates;
    if templates.is_empty() {
        return None;
    }

    let mut folders: Vec<&str> = file_path
        .parent()?
        .components()
        .rev()
        .take(templates.len())
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<_>>()?;
    if folders.len() < templates.len() {
        return None;
    }
    folders.reverse();

    let mut resolved: Option<CanonicalTimeValue> = None;
    for (name, template) in folders.iter().zip(templates) {
        let base = resolved.map(|v| v.local());
        let m = template.parse(name, config.utc_offset, base)?;
        if m.kind.carries_time() {
            resolved = Some(m.value);
        }
    }
    resolved
}

/// Authoritative begin of a file's name-encoded time.
///
/// A full date in the file name is used directly. A time-of-day is combined
/// with the date of the folder timestamp (`known_folder_begin`, or derived
/// from the path when not given). A name without any directives falls back
/// to the folder timestamp entirely.
pub fn resolve(
    file_path: &Path,
    config: &FileSourceConfig,
    known_folder_begin: Option<CanonicalTimeValue>,
) -> Option<CanonicalTimeValue> {
    let file_name = file_path.file_name()?.to_str()?;

    match config.file_name_kind() {
        MatchKind::DateTime => config.match_file_name(file_name, None).map(|m| m.value),
        MatchKind::TimeOnly => {
            let folder = known_folder_begin.or_else(|| folder_begin(file_path, config))?;
            let m = config.match_file_name(file_name, Some(folder.local().date().and_hms_opt(0, 0, 0)?))?;
            Some(m.value)
        }
        MatchKind::Empty => {
            config.match_file_name(file_name, None)?;
            known_folder_begin.or_else(|| folder_begin(file_path, config))
        }
    }
}
