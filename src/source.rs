//! Structured file source: the async entry points a host calls

use crate::core::source::FileSourceGroup;
use crate::core::temporal::{count, nanos, TimeRange};
use crate::error::{Error, Result};
use crate::query::decompose::{check_window, decompose, DecomposeStats};
use crate::query::range;
use crate::query::request::{FileFormat, ProgressReporter, ReadRequest};
use crate::storage::catalog::{Catalog, CatalogConfig, FileSourceGroups, GroupProvider};
use chrono::{DateTime, FixedOffset, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// What a source needs from its host
#[derive(Clone)]
pub struct SourceContext {
    /// Folder all file sources are relative to
    pub root: PathBuf,
    /// Catalogs the provider knows
    pub catalog_ids: Vec<String>,
    pub provider: GroupProvider,
}

impl SourceContext {
    /// Context backed by a loaded configuration
    pub fn from_config(root: impl Into<PathBuf>, config: CatalogConfig) -> Self {
        Self {
            root: root.into(),
            catalog_ids: config.catalog_ids().map(str::to_string).collect(),
            provider: config.into_provider(),
        }
    }
}

/// File based data source: name-encoded time partitions read through a
/// [`FileFormat`].
///
/// Blocking directory and file work runs on tokio's blocking pool; dropping
/// a returned future cancels the work behind it.
pub struct StructuredFileSource {
    format: Arc<dyn FileFormat>,
    context: RwLock<Option<Arc<SourceContext>>>,
}

impl StructuredFileSource {
    /// Create an uninitialized source
    pub fn new(format: Arc<dyn FileFormat>) -> Self {
        Self {
            format,
            context: RwLock::new(None),
        }
    }

    /// Attach the host context. Only allowed once.
    pub async fn initialize(&self, context: SourceContext) -> Result<()> {
        let mut slot = self.context.write().await;
        if slot.is_some() {
            return Err(Error::Configuration("source is already initialized".to_string()));
        }
        info!(root = %context.root.display(), catalogs = context.catalog_ids.len(), "source initialized");
        *slot = Some(Arc::new(context));
        Ok(())
    }

    async fn context(&self) -> Result<Arc<SourceContext>> {
        self.context
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::Configuration("source is not initialized".to_string()))
    }

    /// Catalog ids below `path`
    pub async fn catalog_ids(&self, path: &str) -> Result<Vec<String>> {
        let context = self.context().await?;
        let prefix = path.trim_end_matches('/');
        Ok(context
            .catalog_ids
            .iter()
            .filter(|id| {
                id.strip_prefix(prefix)
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
            })
            .cloned()
            .collect())
    }

    /// Catalog with the resources contributed by the file format
    pub async fn catalog(&self, catalog_id: &str) -> Result<Catalog> {
        let context = self.context().await?;
        let format = self.format.clone();
        let catalog_id = catalog_id.to_string();

        tokio::task::spawn_blocking(move || -> Result<Catalog> {
            let groups = (context.provider)(&catalog_id)?;
            let catalog = format.enrich_catalog(Catalog::new(catalog_id), &groups)?;
            catalog.validate(&groups)?;
            Ok(catalog)
        })
        .await?
    }

    /// Time span covered by one file source group
    pub async fn time_range(&self, catalog_id: &str, file_source_id: &str) -> Result<TimeRange> {
        let context = self.context().await?;
        let catalog_id = catalog_id.to_string();
        let file_source_id = file_source_id.to_string();
        let cancel = CancellationToken::new();
        let _guard = cancel.clone().drop_guard();

        info!(catalog = %catalog_id, file_source = %file_source_id, "time range");
        tokio::task::spawn_blocking(move || -> Result<TimeRange> {
            let groups = (context.provider)(&catalog_id)?;
            let group = find_group(&groups, &file_source_id)?;
            range::time_range(&context.root, group, &cancel)
        })
        .await?
    }

    /// Fraction of `[begin, end)` covered by one file source group
    pub async fn availability(
        &self,
        catalog_id: &str,
        file_source_id: &str,
        begin: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> Result<f64> {
        let begin = ensure_utc(begin)?;
        let end = ensure_utc(end)?;
        let context = self.context().await?;
        let format = self.format.clone();
        let catalog_id = catalog_id.to_string();
        let file_source_id = file_source_id.to_string();
        let cancel = CancellationToken::new();
        let _guard = cancel.clone().drop_guard();

        info!(catalog = %catalog_id, file_source = %file_source_id, %begin, %end, "availability");
        tokio::task::spawn_blocking(move || -> Result<f64> {
            let groups = (context.provider)(&catalog_id)?;
            let group = find_group(&groups, &file_source_id)?;
            range::availability(&context.root, begin, end, group, format.as_ref(), &cancel)
        })
        .await?
    }

    /// Read `[begin, end)` into the buffers of `requests`.
    ///
    /// Requests are grouped by file source and sample period and each group
    /// is decomposed in turn. The filled requests are returned in their
    /// original order.
    pub async fn read(
        &self,
        catalog_id: &str,
        begin: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
        requests: Vec<ReadRequest>,
        progress: Arc<dyn ProgressReporter>,
        cancel: CancellationToken,
    ) -> Result<Vec<ReadRequest>> {
        let begin = ensure_utc(begin)?;
        let end = ensure_utc(end)?;
        if begin >= end {
            return Err(Error::InvalidInput(format!(
                "read window must not be empty, got [{begin}, {end})"
            )));
        }
        let context = self.context().await?;
        let format = self.format.clone();
        let catalog_id = catalog_id.to_string();
        let cancel = cancel.child_token();
        let _guard = cancel.clone().drop_guard();

        info!(catalog = %catalog_id, %begin, %end, requests = requests.len(), "read");
        tokio::task::spawn_blocking(move || -> Result<Vec<ReadRequest>> {
            let groups = (context.provider)(&catalog_id)?;
            read_groups(
                &context.root,
                begin,
                end,
                &groups,
                requests,
                format.as_ref(),
                progress.as_ref(),
                &cancel,
            )
        })
        .await?
    }
}

/// Reject timestamps that are not UTC
pub fn ensure_utc(t: DateTime<FixedOffset>) -> Result<DateTime<Utc>> {
    if t.offset().local_minus_utc() != 0 {
        return Err(Error::InvalidInput(format!("timestamp {t} is not UTC")));
    }
    Ok(t.with_timezone(&Utc))
}

fn find_group<'a>(
    groups: &'a FileSourceGroups,
    file_source_id: &str,
) -> Result<&'a FileSourceGroup> {
    groups.get(file_source_id).ok_or_else(|| {
        Error::InvalidInput(format!("unknown file source '{file_source_id}'"))
    })
}

/// Progress of one request group mapped into its share of the whole read
struct ScaledProgress<'a> {
    inner: &'a dyn ProgressReporter,
    offset: f64,
    scale: f64,
}

impl ProgressReporter for ScaledProgress<'_> {
    fn report(&self, fraction: f64) {
        self.inner.report(self.offset + fraction.clamp(0.0, 1.0) * self.scale);
    }
}

#[allow(clippy::too_many_arguments)]
fn read_groups(
    root: &Path,
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
    groups: &FileSourceGroups,
    requests: Vec<ReadRequest>,
    format: &dyn FileFormat,
    progress: &dyn ProgressReporter,
    cancel: &CancellationToken,
) -> Result<Vec<ReadRequest>> {
    // every request is checked before any file is touched
    for request in &requests {
        let group = find_group(groups, &request.file_source_id)?;
        check_window(begin, end, group, request.sample_period)?;
        let expected = usize::try_from(count(end - begin, request.sample_period))
            .map_err(|_| Error::ResourceExhausted("read window too large".to_string()))?;
        request.check_len(expected)?;
    }

    let total = requests.len();
    let mut batches: BTreeMap<(String, i128), Vec<(usize, ReadRequest)>> = BTreeMap::new();
    for (index, request) in requests.into_iter().enumerate() {
        batches
            .entry((request.file_source_id.clone(), nanos(request.sample_period)))
            .or_default()
            .push((index, request));
    }

    let share = 1.0 / batches.len().max(1) as f64;
    let mut done: Vec<Option<ReadRequest>> = (0..total).map(|_| None).collect();

    for (i, ((file_source_id, _), batch)) in batches.into_iter().enumerate() {
        let group = find_group(groups, &file_source_id)?;
        let (indices, mut batch): (Vec<usize>, Vec<ReadRequest>) = batch.into_iter().unzip();
        let sample_period = batch[0].sample_period;
        let scaled = ScaledProgress {
            inner: progress,
            offset: i as f64 * share,
            scale: share,
        };

        let stats: DecomposeStats = decompose(
            root,
            begin,
            end,
            group,
            sample_period,
            &mut batch,
            format,
            &scaled,
            cancel,
        )?;
        debug!(
            file_source = %file_source_id,
            sub_windows = stats.sub_windows,
            gaps = stats.gaps,
            files_read = stats.files_read,
            files_failed = stats.files_failed,
            "request group done"
        );

        for (index, request) in indices.into_iter().zip(batch) {
            done[index] = Some(request);
        }
    }

    Ok(done.into_iter().flatten().collect())
}
