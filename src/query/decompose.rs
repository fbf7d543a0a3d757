//! Read decomposition: turn `[begin, end)` into bounded per-file reads.
//!
//! The window is walked with a cursor. At each position the config in
//! effect is selected, and the cursor advances one file period at a time
//! within that config's validity. Every period is mapped to the physical
//! files holding it, and each file gets a [`ReadInfo`] plus the destination
//! offset its elements land at.
//!
//! Positions are counted in elements of the sample period relative to the
//! period's regular begin `R`. A file whose content begins at `comp`
//! elements (negative if it starts early) covers `[comp, comp + length)`,
//! cut short where the next file of the same period begins.
//!
//! Irregular files are searched from half a period before `R` up to the
//! next boundary. A file that starts late in a period is therefore read
//! twice: its head in the period it starts in and its tail in the next one.

use crate::core::source::{FileSourceConfig, FileSourceGroup};
use crate::core::temporal::{count, is_multiple_of, nanos, round_down};
use crate::error::{Error, Result};
use crate::index::locator::{locate_all, LocateWindow};
use crate::query::request::{
    FileFormat, ProgressReporter, ReadInfo, ReadRequest, ReadSlice, SilentReporter,
};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A read together with where its elements go
#[derive(Debug, Clone)]
pub struct PlannedRead<'a> {
    pub info: ReadInfo<'a>,
    /// Destination element offset from the window begin
    pub buffer_offset: u64,
}

/// Summary of one decomposition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecomposeStats {
    /// Periods (or parts of periods) visited
    pub sub_windows: usize,
    /// Sub-windows without any file
    pub gaps: usize,
    pub files_read: usize,
    pub files_failed: usize,
}

/// A period's file, by content begin
struct PeriodFile {
    path: PathBuf,
    content_begin: DateTime<Utc>,
}

/// Read `[begin, end)` of `group` into `requests` through `format`.
///
/// All requests must share `sample_period` and hold exactly
/// `(end - begin) / sample_period` elements. Reader errors skip the file,
/// except fatal ones which abort the read.
#[allow(clippy::too_many_arguments)]
pub fn decompose(
    root: &Path,
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
    group: &FileSourceGroup,
    sample_period: Duration,
    requests: &mut [ReadRequest],
    format: &dyn FileFormat,
    progress: &dyn ProgressReporter,
    cancel: &CancellationToken,
) -> Result<DecomposeStats> {
    check_window(begin, end, group, sample_period)?;
    let expected = usize::try_from(count(end - begin, sample_period))
        .map_err(|_| Error::ResourceExhausted("read window too large".to_string()))?;
    for request in requests.iter() {
        request.check_len(expected)?;
    }

    let mut failed = 0;
    let mut stats = walk(root, begin, end, group, sample_period, progress, cancel, |read| {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let offset = to_usize(read.buffer_offset)?;
        let length = to_usize(read.info.element_count)?;
        let mut slices = requests
            .iter_mut()
            .map(|r| r.slice(offset, length))
            .collect::<Result<Vec<ReadSlice<'_>>>>()?;

        match format.read(&read.info, &mut slices) {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(path = %read.info.file_path.display(), error = %e, "skipping unreadable file");
                failed += 1;
                Ok(())
            }
        }
    })?;

    stats.files_failed = failed;
    stats.files_read -= failed;
    Ok(stats)
}

/// The reads [`decompose`] would perform, without reading
pub fn plan<'g>(
    root: &Path,
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
    group: &'g FileSourceGroup,
    sample_period: Duration,
    cancel: &CancellationToken,
) -> Result<Vec<PlannedRead<'g>>> {
    check_window(begin, end, group, sample_period)?;
    let mut reads = Vec::new();
    walk(
        root,
        begin,
        end,
        group,
        sample_period,
        &SilentReporter,
        cancel,
        |read| {
            reads.push(read);
            Ok(())
        },
    )?;
    Ok(reads)
}

/// Window and sample period checks shared by every read entry point
pub(crate) fn check_window(
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
    group: &FileSourceGroup,
    sample_period: Duration,
) -> Result<()> {
    if begin >= end {
        return Err(Error::InvalidInput(format!(
            "read window must not be empty, got [{begin}, {end})"
        )));
    }
    group.validate_sample_period(sample_period)?;
    if !is_multiple_of(begin, sample_period) || !is_multiple_of(end, sample_period) {
        return Err(Error::InvalidInput(format!(
            "read window [{begin}, {end}) is not aligned to the sample period {sample_period}"
        )));
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn walk<'g, F>(
    root: &Path,
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
    group: &'g FileSourceGroup,
    sample_period: Duration,
    progress: &dyn ProgressReporter,
    cancel: &CancellationToken,
    mut on_read: F,
) -> Result<DecomposeStats>
where
    F: FnMut(PlannedRead<'g>) -> Result<()>,
{
    let total = nanos(end - begin) as f64;
    let mut stats = DecomposeStats::default();
    let mut cursor = begin;

    while cursor < end {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let Some(index) = group.active_at(cursor) else {
            match group.next_begin_after(cursor) {
                Some(next) if next < end => {
                    debug!(group = group.id(), from = %cursor, to = %next, "no config in effect, skipping");
                    cursor = next;
                    continue;
                }
                _ => break,
            }
        };
        let config = &group.configs()[index];
        let valid_end = group.valid_until(index).map_or(end, |until| until.min(end));

        while cursor < valid_end {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let regular_local = round_down(config.to_local(cursor), config.file_period);
            let regular = config.to_utc(regular_local);
            let next_regular = config.to_utc(regular_local + config.file_period);
            let window_end = next_regular.min(valid_end);

            let window_start_el = count(cursor - regular, sample_period);
            let window_end_el = count(window_end - regular, sample_period);
            let consumed = count(cursor - begin, sample_period);
            let file_length = count(config.file_period, sample_period);

            let files = period_files(root, config, regular_local, regular, next_regular, cancel)?;
            if files.is_empty() {
                debug!(group = group.id(), period = %regular, "no file for period");
                stats.gaps += 1;
            }

            let comps: Vec<i128> = files
                .iter()
                .map(|f| nanos(f.content_begin - regular).div_euclid(nanos(sample_period)))
                .collect();

            for (i, file) in files.iter().enumerate() {
                let comp = comps[i];
                let next_comp = comps.get(i + 1).copied().unwrap_or(i128::MAX);
                let lo = window_start_el.max(comp);
                let hi = window_end_el.min(comp + file_length).min(next_comp);
                if hi <= lo {
                    continue;
                }

                let read = PlannedRead {
                    info: ReadInfo {
                        file_path: file.path.clone(),
                        source_config: config,
                        regular_utc_file_begin: regular,
                        element_offset: to_u64(lo - comp)?,
                        element_count: to_u64(hi - lo)?,
                        nominal_file_length: to_u64(file_length)?,
                    },
                    buffer_offset: to_u64(consumed + (lo - window_start_el))?,
                };
                debug!(read = %read.info, buffer_offset = read.buffer_offset, "read");
                on_read(read)?;
                stats.files_read += 1;
            }

            cursor = window_end;
            stats.sub_windows += 1;
            progress.report(nanos(cursor - begin) as f64 / total);
        }
    }

    progress.report(1.0);
    Ok(stats)
}

/// Files holding the period starting at `regular`, ordered by content begin
fn period_files(
    root: &Path,
    config: &FileSourceConfig,
    regular_local: NaiveDateTime,
    regular: DateTime<Utc>,
    next_regular: DateTime<Utc>,
    cancel: &CancellationToken,
) -> Result<Vec<PeriodFile>> {
    if !config.file_name_template.has_wildcards() && config.preselector_regex.is_none() {
        let named = regular_local + config.file_name_time_offset;
        let mut path = root.to_path_buf();
        for template in &config.path_segment_templates {
            path.push(template.render(named, config.utc_offset));
        }
        path.push(config.file_name_template.render(named, config.utc_offset));

        if path.is_file() {
            return Ok(vec![PeriodFile {
                path,
                content_begin: regular,
            }]);
        }
        debug!(path = %path.display(), "expected file is missing");
        return Ok(Vec::new());
    }

    // irregular files may start up to half a period early
    let from = if config.irregular {
        regular - (next_regular - regular) / 2
    } else {
        regular
    };
    let to = next_regular;

    let window = LocateWindow::Range { begin: from, end: to };
    let mut files: Vec<PeriodFile> = locate_all(root, window, config, cancel)?
        .into_iter()
        .map(|file| PeriodFile {
            content_begin: config.content_begin(&file.resolved_time),
            path: file.path,
        })
        .filter(|file| file.content_begin >= from && file.content_begin < to)
        .collect();
    files.sort_by(|a, b| {
        a.content_begin
            .cmp(&b.content_begin)
            .then_with(|| a.path.cmp(&b.path))
    });
    Ok(files)
}

fn to_u64(value: i128) -> Result<u64> {
    u64::try_from(value).map_err(|_| Error::Other(format!("element index {value} out of range")))
}

fn to_usize(value: u64) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::ResourceExhausted(format!("element index {value} out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::source::Preselector;
    use crate::core::template::Template;
    use chrono::TimeZone;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq)]
    struct Recorded {
        name: String,
        element_offset: u64,
        element_count: u64,
        slice_len: usize,
    }

    /// Marks every element it is handed as valid
    #[derive(Default)]
    struct Recorder {
        reads: Mutex<Vec<Recorded>>,
        fail_on: Option<&'static str>,
    }

    impl FileFormat for Recorder {
        fn read(&self, info: &ReadInfo<'_>, slices: &mut [ReadSlice<'_>]) -> Result<()> {
            let name = info.file_path.file_name().unwrap().to_string_lossy().into_owned();
            if self.fail_on == Some(name.as_str()) {
                return Err(Error::Read("truncated".to_string()));
            }
            for slice in slices.iter_mut() {
                slice.status.fill(1);
            }
            self.reads.lock().unwrap().push(Recorded {
                name,
                element_offset: info.element_offset,
                element_count: info.element_count,
                slice_len: slices[0].len(),
            });
            Ok(())
        }
    }

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    fn utc(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, 2, h, m, s).unwrap()
    }

    fn config(segments: &[&str], file: &str, period: Duration) -> FileSourceConfig {
        FileSourceConfig::new(
            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            segments.iter().map(|s| Template::new(s).unwrap()).collect(),
            Template::new(file).unwrap(),
            period,
        )
    }

    fn request(begin: DateTime<Utc>, end: DateTime<Utc>, sample_period: Duration) -> ReadRequest {
        ReadRequest::for_window("r", "main", sample_period, 4, begin, end).unwrap()
    }

    fn run(
        root: &Path,
        group: &FileSourceGroup,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
        format: &Recorder,
    ) -> (DecomposeStats, ReadRequest) {
        let sp = Duration::seconds(1);
        let mut requests = vec![request(begin, end, sp)];
        let stats = decompose(
            root,
            begin,
            end,
            group,
            sp,
            &mut requests,
            format,
            &SilentReporter,
            &CancellationToken::new(),
        )
        .unwrap();
        (stats, requests.remove(0))
    }

    #[test]
    fn test_full_on_time_file() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "2020-01/02/120000.dat");
        let group = FileSourceGroup::new(
            "main",
            vec![config(&["yyyy-MM", "dd"], "HHmmss.dat", Duration::minutes(10))],
        )
        .unwrap();

        let reads = plan(tmp.path(), utc(12, 0, 0), utc(12, 10, 0), &group, Duration::seconds(1), &CancellationToken::new())
            .unwrap();
        assert_eq!(reads.len(), 1);
        assert_eq!(reads[0].info.element_offset, 0);
        assert_eq!(reads[0].info.element_count, 600);
        assert_eq!(reads[0].info.nominal_file_length, 600);
        assert_eq!(reads[0].info.regular_utc_file_begin, utc(12, 0, 0));
        assert_eq!(reads[0].buffer_offset, 0);
    }

    #[test]
    fn test_window_before_first_file_is_a_gap() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "2020-01/02/120000.dat");
        let group = FileSourceGroup::new(
            "main",
            vec![config(&["yyyy-MM", "dd"], "HHmmss.dat", Duration::minutes(10))],
        )
        .unwrap();

        let format = Recorder::default();
        let (stats, request) = run(tmp.path(), &group, utc(11, 55, 0), utc(12, 5, 0), &format);

        assert_eq!(stats.sub_windows, 2);
        assert_eq!(stats.gaps, 1);
        assert_eq!(stats.files_read, 1);

        let reads = format.reads.lock().unwrap();
        assert_eq!(reads.len(), 1);
        assert_eq!(reads[0].element_offset, 0);
        assert_eq!(reads[0].element_count, 300);
        assert!(request.status[..300].iter().all(|s| *s == 0));
        assert!(request.status[300..].iter().all(|s| *s == 1));
    }

    #[test]
    fn test_late_file_shifts_destination() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "20200102_121000.dat");
        let group = FileSourceGroup::new(
            "main",
            vec![config(&[], "yyyyMMdd_HHmmss*.dat", Duration::hours(1))],
        )
        .unwrap();

        let reads = plan(tmp.path(), utc(12, 0, 0), utc(13, 0, 0), &group, Duration::seconds(1), &CancellationToken::new())
            .unwrap();
        assert_eq!(reads.len(), 1);
        assert_eq!(reads[0].info.element_offset, 0);
        assert_eq!(reads[0].buffer_offset, 600);
        assert_eq!(reads[0].info.element_count, 3000);
    }

    #[test]
    fn test_two_files_in_one_period_are_disjoint() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "20200102_120000_v1.dat");
        touch(tmp.path(), "20200102_124000_v2.dat");
        let group = FileSourceGroup::new(
            "main",
            vec![config(&[], "yyyyMMdd_HHmmss*.dat", Duration::hours(1))],
        )
        .unwrap();

        let format = Recorder::default();
        let (stats, request) = run(tmp.path(), &group, utc(12, 0, 0), utc(13, 0, 0), &format);
        assert_eq!(stats.files_read, 2);

        let reads = format.reads.lock().unwrap();
        assert_eq!(reads[0].name, "20200102_120000_v1.dat");
        assert_eq!((reads[0].element_offset, reads[0].element_count), (0, 2400));
        assert_eq!(reads[1].name, "20200102_124000_v2.dat");
        assert_eq!((reads[1].element_offset, reads[1].element_count), (0, 1200));
        assert_eq!(request.valid_count(), 3600);
    }

    #[test]
    fn test_irregular_early_file_shifts_source() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "20200102_115500.dat");
        let mut c = config(&[], "yyyyMMdd_HHmmss*.dat", Duration::hours(1));
        c.irregular = true;
        let group = FileSourceGroup::new("main", vec![c]).unwrap();

        let reads = plan(tmp.path(), utc(12, 0, 0), utc(13, 0, 0), &group, Duration::seconds(1), &CancellationToken::new())
            .unwrap();
        assert_eq!(reads.len(), 1);
        assert_eq!(reads[0].info.element_offset, 300);
        assert_eq!(reads[0].info.element_count, 3300);
        assert_eq!(reads[0].buffer_offset, 0);
    }

    #[test]
    fn test_irregular_late_file_is_read_in_both_periods() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "20200102_124000.dat");
        let mut c = config(&[], "yyyyMMdd_HHmmss*.dat", Duration::hours(1));
        c.irregular = true;
        let group = FileSourceGroup::new("main", vec![c]).unwrap();

        let reads = plan(tmp.path(), utc(12, 0, 0), utc(14, 0, 0), &group, Duration::seconds(1), &CancellationToken::new())
            .unwrap();
        assert_eq!(reads.len(), 2);
        // head of the file in the period it starts in
        assert_eq!(reads[0].info.regular_utc_file_begin, utc(12, 0, 0));
        assert_eq!(reads[0].info.element_offset, 0);
        assert_eq!(reads[0].info.element_count, 1200);
        assert_eq!(reads[0].buffer_offset, 2400);
        // tail in the period it is nearest to
        assert_eq!(reads[1].info.regular_utc_file_begin, utc(13, 0, 0));
        assert_eq!(reads[1].info.element_offset, 1200);
        assert_eq!(reads[1].info.element_count, 2400);
        assert_eq!(reads[1].buffer_offset, 3600);

        let format = Recorder::default();
        let (stats, request) = run(tmp.path(), &group, utc(12, 0, 0), utc(14, 0, 0), &format);
        assert_eq!(stats.files_read, 2);
        assert!(request.status[..2400].iter().all(|s| *s == 0));
        assert!(request.status[2400..6000].iter().all(|s| *s == 1));
        assert!(request.status[6000..].iter().all(|s| *s == 0));
    }

    #[test]
    fn test_irregular_late_file_does_not_overlap_next_file() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "20200102_124000.dat");
        touch(tmp.path(), "20200102_130000.dat");
        let mut c = config(&[], "yyyyMMdd_HHmmss*.dat", Duration::hours(1));
        c.irregular = true;
        let group = FileSourceGroup::new("main", vec![c]).unwrap();

        let format = Recorder::default();
        let (stats, request) = run(tmp.path(), &group, utc(12, 0, 0), utc(14, 0, 0), &format);
        assert_eq!(stats.files_read, 2);

        let reads = format.reads.lock().unwrap();
        assert_eq!(reads[0].name, "20200102_124000.dat");
        assert_eq!((reads[0].element_offset, reads[0].element_count), (0, 1200));
        assert_eq!(reads[1].name, "20200102_130000.dat");
        assert_eq!((reads[1].element_offset, reads[1].element_count), (0, 3600));
        assert_eq!(request.valid_count(), 4800);
    }

    #[test]
    fn test_preselected_file_names() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "2020-01-02/SN4711_20200102_run17_1200.csv");
        touch(tmp.path(), "2020-01-02/SN4711_20200102_run18_1300.csv");
        touch(tmp.path(), "2020-01-02/notes.txt");

        let mut c = config(&["yyyy-MM-dd"], "*'.csv'", Duration::hours(1));
        c.preselector_regex =
            Some(Preselector::new(r"^SN\d+_(\d{8})_run\d+_(\d{4})\.csv$").unwrap());
        c.selector_template = Some(Template::new("yyyyMMddHHmm").unwrap());
        let group = FileSourceGroup::new("main", vec![c]).unwrap();

        let reads = plan(tmp.path(), utc(12, 0, 0), utc(13, 0, 0), &group, Duration::seconds(1), &CancellationToken::new())
            .unwrap();
        assert_eq!(reads.len(), 1);
        assert!(reads[0].info.file_path.ends_with("2020-01-02/SN4711_20200102_run17_1200.csv"));
        assert_eq!(reads[0].info.regular_utc_file_begin, utc(12, 0, 0));
        assert_eq!(reads[0].info.element_offset, 0);
        assert_eq!(reads[0].info.element_count, 3600);
        assert_eq!(reads[0].buffer_offset, 0);
    }

    #[test]
    fn test_window_off_the_sample_grid_is_rejected() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "2020-01/02/120000.dat");
        let group = FileSourceGroup::new(
            "main",
            vec![config(&["yyyy-MM", "dd"], "HHmmss.dat", Duration::minutes(10))],
        )
        .unwrap();

        let sp = Duration::seconds(1);
        let begin = utc(12, 0, 0) + Duration::milliseconds(500);
        let end = utc(12, 10, 0) + Duration::milliseconds(400);
        let mut requests = vec![request(begin, end, sp)];
        let result = decompose(
            tmp.path(),
            begin,
            end,
            &group,
            sp,
            &mut requests,
            &Recorder::default(),
            &SilentReporter,
            &CancellationToken::new(),
        );
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert_eq!(requests[0].valid_count(), 0);

        let planned = plan(tmp.path(), begin, end, &group, sp, &CancellationToken::new());
        assert!(matches!(planned, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_file_named_after_period_end() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "2020-01-02/130000.dat");
        let mut c = config(&["yyyy-MM-dd"], "HHmmss.dat", Duration::hours(1));
        c.file_name_time_offset = Duration::hours(1);
        let group = FileSourceGroup::new("main", vec![c]).unwrap();

        let reads = plan(tmp.path(), utc(12, 0, 0), utc(13, 0, 0), &group, Duration::seconds(1), &CancellationToken::new())
            .unwrap();
        assert_eq!(reads.len(), 1);
        assert!(reads[0].info.file_path.ends_with("130000.dat"));
        assert_eq!(reads[0].info.element_count, 3600);
    }

    #[test]
    fn test_config_switch_and_leading_gap() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "a/2020-01-02/120000.dat");
        touch(tmp.path(), "b/2020-01-02_123000.bin");

        let mut a = config(&["'a'", "yyyy-MM-dd"], "HHmmss.dat", Duration::hours(1));
        a.begin = utc(11, 30, 0);
        let mut b = config(&["'b'"], "yyyy-MM-dd_HHmmss'.bin'", Duration::minutes(30));
        b.begin = utc(12, 30, 0);
        let group = FileSourceGroup::new("main", vec![a, b]).unwrap();

        let reads = plan(tmp.path(), utc(11, 0, 0), utc(13, 0, 0), &group, Duration::seconds(1), &CancellationToken::new())
            .unwrap();
        assert_eq!(reads.len(), 2);
        assert!(reads[0].info.file_path.ends_with("120000.dat"));
        assert_eq!(reads[0].buffer_offset, 3600);
        assert_eq!(reads[0].info.element_count, 1800);
        assert!(reads[1].info.file_path.ends_with("2020-01-02_123000.bin"));
        assert_eq!(reads[1].buffer_offset, 5400);
        assert_eq!(reads[1].info.element_count, 1800);
    }

    #[test]
    fn test_reader_failure_is_skipped() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "2020-01/02/120000.dat");
        touch(tmp.path(), "2020-01/02/121000.dat");
        let group = FileSourceGroup::new(
            "main",
            vec![config(&["yyyy-MM", "dd"], "HHmmss.dat", Duration::minutes(10))],
        )
        .unwrap();

        let format = Recorder {
            fail_on: Some("120000.dat"),
            ..Default::default()
        };
        let (stats, request) = run(tmp.path(), &group, utc(12, 0, 0), utc(12, 20, 0), &format);
        assert_eq!(stats.files_read, 1);
        assert_eq!(stats.files_failed, 1);
        assert_eq!(request.valid_count(), 600);
    }

    #[test]
    fn test_progress_is_monotonic() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "2020-01/02/120000.dat");
        let group = FileSourceGroup::new(
            "main",
            vec![config(&["yyyy-MM", "dd"], "HHmmss.dat", Duration::minutes(10))],
        )
        .unwrap();

        let seen = Mutex::new(Vec::new());
        let reporter = |fraction: f64| seen.lock().unwrap().push(fraction);
        let sp = Duration::seconds(1);
        let mut requests = vec![request(utc(11, 0, 0), utc(13, 0, 0), sp)];
        decompose(
            tmp.path(),
            utc(11, 0, 0),
            utc(13, 0, 0),
            &group,
            sp,
            &mut requests,
            &Recorder::default(),
            &reporter,
            &CancellationToken::new(),
        )
        .unwrap();

        let seen = seen.into_inner().unwrap();
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert!(seen.iter().all(|f| (0.0..=1.0).contains(f)));
        assert_eq!(seen.last(), Some(&1.0));
    }

    #[test]
    fn test_cancelled_read_leaves_buffers_untouched() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "2020-01/02/120000.dat");
        let group = FileSourceGroup::new(
            "main",
            vec![config(&["yyyy-MM", "dd"], "HHmmss.dat", Duration::minutes(10))],
        )
        .unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let sp = Duration::seconds(1);
        let mut requests = vec![request(utc(12, 0, 0), utc(12, 10, 0), sp)];
        let result = decompose(
            tmp.path(),
            utc(12, 0, 0),
            utc(12, 10, 0),
            &group,
            sp,
            &mut requests,
            &Recorder::default(),
            &SilentReporter,
            &cancel,
        );
        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(requests[0].valid_count(), 0);
    }

    #[test]
    fn test_wrong_buffer_length_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let group = FileSourceGroup::new(
            "main",
            vec![config(&["yyyy-MM", "dd"], "HHmmss.dat", Duration::minutes(10))],
        )
        .unwrap();

        let sp = Duration::seconds(1);
        let mut requests = vec![request(utc(12, 0, 0), utc(12, 5, 0), sp)];
        let result = decompose(
            tmp.path(),
            utc(12, 0, 0),
            utc(12, 10, 0),
            &group,
            sp,
            &mut requests,
            &Recorder::default(),
            &SilentReporter,
            &CancellationToken::new(),
        );
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
