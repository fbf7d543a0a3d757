//! Coverage estimation: time range and availability of a file source group

use crate::core::source::{FileSourceConfig, FileSourceGroup};
use crate::core::temporal::{nanos, round_down, TimeRange};
use crate::error::{Error, Result};
use crate::index::locator::{locate, locate_all, LocateWindow};
use crate::query::request::FileFormat;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Overall time span covered by a group.
///
/// Configs that find nothing contribute the empty range, so they never
/// narrow the result of the others. Returns [`TimeRange::empty`] when no
/// config finds any file.
pub fn time_range(
    root: &Path,
    group: &FileSourceGroup,
    cancel: &CancellationToken,
) -> Result<TimeRange> {
    let mut range = TimeRange::empty();
    for config in group.configs() {
        let config_range = config_time_range(root, config, cancel)?;
        debug!(
            group = group.id(),
            begin = %config.begin,
            range_begin = %config_range.begin,
            range_end = %config_range.end,
            "config time range"
        );
        range = range.union(&config_range);
    }
    Ok(range)
}

fn config_time_range(
    root: &Path,
    config: &FileSourceConfig,
    cancel: &CancellationToken,
) -> Result<TimeRange> {
    let first = locate(root, LocateWindow::Earliest, config, cancel).next().transpose()?;
    let Some(first) = first else {
        return Ok(TimeRange::empty());
    };

    let mut last = None;
    for file in locate(root, LocateWindow::Latest, config, cancel) {
        last = Some(file?);
    }
    let last = last.unwrap_or_else(|| first.clone());

    let begin = config.content_begin(&first.resolved_time);
    let last_begin = config.content_begin(&last.resolved_time);
    let end = if config.irregular {
        let boundary = round_down(config.to_local(last_begin), config.file_period) + config.file_period;
        config.to_utc(boundary)
    } else {
        last_begin + config.file_period
    };

    Ok(TimeRange::new(begin, end))
}

/// Fraction of `[begin, end)` covered by files, in `[0, 1]`.
///
/// Each config counts at most one file per period; its fraction is the sum
/// of the probed coverage of those files over the theoretical period count
/// of the part of the window it is in effect for. The group's availability
/// is the mean over the configs in effect during the window.
pub fn availability(
    root: &Path,
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
    group: &FileSourceGroup,
    format: &dyn FileFormat,
    cancel: &CancellationToken,
) -> Result<f64> {
    if begin >= end {
        return Err(Error::InvalidInput(format!(
            "availability window must not be empty, got [{begin}, {end})"
        )));
    }

    let mut sum = 0.0;
    let mut counted = 0;
    for (index, config) in group.configs().iter().enumerate() {
        let from = begin.max(config.begin);
        let to = group.valid_until(index).map_or(end, |until| until.min(end));
        if from >= to {
            continue;
        }
        let fraction = config_availability(root, from, to, config, format, cancel)?;
        debug!(group = group.id(), begin = %config.begin, fraction, "config availability");
        sum += fraction;
        counted += 1;
    }

    if counted == 0 {
        return Ok(0.0);
    }
    Ok(sum / counted as f64)
}

fn config_availability(
    root: &Path,
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
    config: &FileSourceConfig,
    format: &dyn FileFormat,
    cancel: &CancellationToken,
) -> Result<f64> {
    let window = LocateWindow::Range { begin, end };
    let candidates = locate_all(root, window, config, cancel)?;

    let mut seen = BTreeSet::new();
    let files: Vec<PathBuf> = candidates
        .into_iter()
        .filter_map(|file| {
            let content_begin = config.content_begin(&file.resolved_time);
            let period_begin =
                config.to_utc(round_down(config.to_local(content_begin), config.file_period));
            if period_begin + config.file_period <= begin || period_begin >= end {
                return None;
            }
            if !seen.insert(period_begin) {
                debug!(path = %file.path.display(), "ignoring second file of period");
                return None;
            }
            Some(file.path)
        })
        .collect();

    let covered: f64 = files
        .par_iter()
        .map(|path| {
            if cancel.is_cancelled() {
                return 0.0;
            }
            match format.probe(path) {
                Ok(fraction) => fraction.clamp(0.0, 1.0),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "probe failed");
                    0.0
                }
            }
        })
        .sum();

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let periods = nanos(end - begin) as f64 / nanos(config.file_period) as f64;
    Ok((covered / periods).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::template::Template;
    use crate::query::request::{ReadInfo, ReadSlice};
    use chrono::{Duration, TimeZone};
    use std::fs;
    use tempfile::TempDir;

    struct ExistsFormat;

    impl FileFormat for ExistsFormat {
        fn read(&self, _info: &ReadInfo<'_>, _slices: &mut [ReadSlice<'_>]) -> Result<()> {
            Ok(())
        }
    }

    struct FailingProbe;

    impl FileFormat for FailingProbe {
        fn read(&self, _info: &ReadInfo<'_>, _slices: &mut [ReadSlice<'_>]) -> Result<()> {
            Ok(())
        }

        fn probe(&self, path: &Path) -> Result<f64> {
            if path.to_string_lossy().contains("130000") {
                Err(Error::Read("corrupt header".to_string()))
            } else {
                Ok(1.0)
            }
        }
    }

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    fn utc(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, d, h, m, 0).unwrap()
    }

    fn group(file_template: &str, period: Duration) -> FileSourceGroup {
        let config = FileSourceConfig::new(
            utc(1, 0, 0),
            vec![Template::new("yyyy-MM").unwrap(), Template::new("dd").unwrap()],
            Template::new(file_template).unwrap(),
            period,
        );
        FileSourceGroup::new("main", vec![config]).unwrap()
    }

    #[test]
    fn test_time_range_regular() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "2020-01/02/120000.dat");
        touch(tmp.path(), "2020-01/02/121000.dat");
        touch(tmp.path(), "2020-01/03/080000.dat");

        let g = group("HHmmss.dat", Duration::minutes(10));
        let range = time_range(tmp.path(), &g, &CancellationToken::new()).unwrap();
        assert_eq!(range.begin, utc(2, 12, 0));
        assert_eq!(range.end, utc(3, 8, 10));
    }

    #[test]
    fn test_time_range_irregular_ends_on_boundary() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "2020-01/02/120000.dat");
        touch(tmp.path(), "2020-01/02/124500.dat");

        let mut g = group("HHmmss.dat", Duration::hours(1));
        let mut configs = g.configs().to_vec();
        configs[0].irregular = true;
        g = FileSourceGroup::new("main", configs).unwrap();

        let range = time_range(tmp.path(), &g, &CancellationToken::new()).unwrap();
        assert_eq!(range.begin, utc(2, 12, 0));
        assert_eq!(range.end, utc(2, 13, 0));
    }

    #[test]
    fn test_time_range_of_empty_root() {
        let tmp = TempDir::new().unwrap();
        let g = group("HHmmss.dat", Duration::minutes(10));
        let range = time_range(tmp.path(), &g, &CancellationToken::new()).unwrap();
        assert_eq!(range, TimeRange::empty());
    }

    #[test]
    fn test_full_availability() {
        let tmp = TempDir::new().unwrap();
        for hour in 0..24 {
            touch(tmp.path(), &format!("2020-01/02/{hour:02}0000.dat"));
        }

        let g = group("HHmmss.dat", Duration::hours(1));
        let value = availability(
            tmp.path(),
            utc(2, 0, 0),
            utc(3, 0, 0),
            &g,
            &ExistsFormat,
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(value, 1.0);
    }

    #[test]
    fn test_availability_deduplicates_periods() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "2020-01/02/120000.dat");
        touch(tmp.path(), "2020-01/02/123000.dat");

        let g = group("HHmmss.dat", Duration::hours(1));
        let value = availability(
            tmp.path(),
            utc(2, 12, 0),
            utc(2, 14, 0),
            &g,
            &ExistsFormat,
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(value, 0.5);
    }

    #[test]
    fn test_failed_probe_counts_zero() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "2020-01/02/120000.dat");
        touch(tmp.path(), "2020-01/02/130000.dat");

        let g = group("HHmmss.dat", Duration::hours(1));
        let value = availability(
            tmp.path(),
            utc(2, 12, 0),
            utc(2, 14, 0),
            &g,
            &FailingProbe,
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(value, 0.5);
    }

    #[test]
    fn test_availability_rejects_inverted_window() {
        let tmp = TempDir::new().unwrap();
        let g = group("HHmmss.dat", Duration::hours(1));
        let result = availability(
            tmp.path(),
            utc(2, 12, 0),
            utc(2, 12, 0),
            &g,
            &ExistsFormat,
            &CancellationToken::new(),
        );
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
