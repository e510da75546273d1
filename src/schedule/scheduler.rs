use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use rayon::prelude::*;

use crate::composite::compositor::Compositor;
use crate::config::{LayerSpec, PipelineConfig};
use crate::encode::sink::{NullSink, PartitionSink};
use crate::fetch::fallback::{FallbackOutcome, FallbackResolver};
use crate::fetch::source::ImageSource;
use crate::foundation::core::{FrameKey, SlotGrid, dates_inclusive, format_api_timestamp};
use crate::foundation::error::{CompositeError, FetchError, LapseError, LapseResult};
use crate::schedule::cancel::CancelToken;
use crate::schedule::duplicates::{DuplicateTracker, LayerTrace};
use crate::store::frame_store::FrameStore;
use crate::store::manifest::{FrameStatus, ManifestEntry};
use crate::store::progress::{ProgressRecord, RunStatus};

/// Encoded output of one frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompositeResult {
    /// Encoded JPEG bytes.
    pub bytes: Vec<u8>,
    /// `bytes.len()`.
    pub byte_size: u64,
    /// Whether either layer came from a non-zero offset.
    pub used_fallback: bool,
}

/// Both layers of one frame, or the error that stopped them.
struct Fetched {
    pos: usize,
    key: FrameKey,
    layers: Result<(FallbackOutcome, FallbackOutcome), FetchError>,
    attempts: u32,
}

/// Outcome of one frame, ready to be recorded.
struct FrameReport {
    pos: usize,
    entry: ManifestEntry,
    traces: Option<[LayerTrace; 2]>,
}

/// Stateless per-frame work shared by the worker threads.
struct FrameWorker<S> {
    grid: SlotGrid,
    resolver: FallbackResolver<S>,
    compositor: Compositor,
    disk: LayerSpec,
    corona: LayerSpec,
    jpeg_quality: u8,
}

impl<S: ImageSource> FrameWorker<S> {
    /// Resolve one layer; the count is the most source calls spent on a single offset.
    fn fetch_layer(
        &self,
        key: FrameKey,
        layer: &LayerSpec,
    ) -> (Result<FallbackOutcome, FetchError>, u32) {
        self.resolver.resolve_counted(self.grid.timestamp(key), layer)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(key = %key))]
    fn fetch(&self, pos: usize, key: FrameKey) -> Fetched {
        tracing::debug!(at = %format_api_timestamp(self.grid.timestamp(key)), "fetching layers");
        let ((disk, a), (corona, b)) = rayon::join(
            || self.fetch_layer(key, &self.disk),
            || self.fetch_layer(key, &self.corona),
        );
        Fetched {
            pos,
            key,
            layers: disk.and_then(|d| corona.map(|c| (d, c))),
            attempts: a.max(b),
        }
    }

    fn composite(
        &self,
        disk: &FallbackOutcome,
        corona: &FallbackOutcome,
    ) -> Result<CompositeResult, CompositeError> {
        let bytes = self
            .compositor
            .composite_jpeg(&disk.raster, &corona.raster, self.jpeg_quality)?;
        Ok(CompositeResult {
            byte_size: bytes.len() as u64,
            bytes,
            used_fallback: disk.used_fallback() || corona.used_fallback(),
        })
    }

    /// Composite and save a fetched frame. Only persistence failures are returned as `Err`.
    fn finish(&self, store: &FrameStore, fetched: Fetched) -> LapseResult<FrameReport> {
        let Fetched {
            pos,
            key,
            layers,
            attempts,
        } = fetched;
        let now = Utc::now();
        let failed = |err: LapseError| {
            tracing::warn!(%key, error = %err, "frame failed");
            FrameReport {
                pos,
                entry: ManifestEntry::failed(key, err.to_string(), attempts, now),
                traces: None,
            }
        };

        let (disk, corona) = match layers {
            Ok(pair) => pair,
            Err(err) => return Ok(failed(err.into())),
        };
        let result = match self.composite(&disk, &corona) {
            Ok(r) => r,
            Err(err) => return Ok(failed(err.into())),
        };
        store.save(&key, &result.bytes)?;
        if result.used_fallback {
            tracing::debug!(
                %key,
                disk_offset = disk.offset_minutes,
                corona_offset = corona.offset_minutes,
                "frame used fallback"
            );
        }

        Ok(FrameReport {
            pos,
            entry: ManifestEntry {
                status: FrameStatus::Success,
                path: Some(FrameStore::relative_path(&key)),
                disk_offset_minutes: Some(disk.offset_minutes),
                corona_offset_minutes: Some(corona.offset_minutes),
                byte_size: Some(result.byte_size),
                attempts,
                ..ManifestEntry::pending(key, now)
            },
            traces: Some([LayerTrace::of(&disk), LayerTrace::of(&corona)]),
        })
    }
}

/// Drives a date range through fetch, composite and save in checkpointed batches.
///
/// Within a batch, fetches run on one thread pool and compositing on another, so network and
/// CPU parallelism are bounded independently. The manifest and progress record are persisted
/// after every batch; a kill between batches loses at most the in-flight batch.
pub struct BatchScheduler<S> {
    worker: FrameWorker<S>,
    store: FrameStore,
    sink: Box<dyn PartitionSink>,
    cancel: CancelToken,
    batch_size: usize,
    batch_timeout: Duration,
    fetch_pool: rayon::ThreadPool,
    composite_pool: rayon::ThreadPool,
}

impl<S: ImageSource> BatchScheduler<S> {
    /// Build a scheduler over `source`, opening the store at `cfg.store.root`.
    pub fn new(cfg: &PipelineConfig, source: S) -> LapseResult<Self> {
        cfg.validate()?;
        let worker = FrameWorker {
            grid: cfg.slot_grid()?,
            resolver: FallbackResolver::new(source, &cfg.fallback)
                .with_retry(cfg.scheduler.max_attempts, cfg.scheduler.retry_delay()),
            compositor: Compositor::new(&cfg.composite),
            disk: cfg.source.disk.clone(),
            corona: cfg.source.corona.clone(),
            jpeg_quality: cfg.store.jpeg_quality,
        };
        Ok(Self {
            worker,
            store: FrameStore::open(&cfg.store.root)?,
            sink: Box::new(NullSink),
            cancel: CancelToken::new(),
            batch_size: cfg.scheduler.batch_size,
            batch_timeout: cfg.batch_timeout(),
            fetch_pool: build_thread_pool("fetch", cfg.scheduler.fetch_concurrency)?,
            composite_pool: build_thread_pool("composite", cfg.scheduler.composite_concurrency)?,
        })
    }

    /// Hand completed partitions to `sink`.
    pub fn with_sink(mut self, sink: impl PartitionSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// Use an externally owned cancellation token (e.g. one wired to Ctrl-C).
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that stops the run after the in-flight batch.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Borrow the frame store.
    pub fn store(&self) -> &FrameStore {
        &self.store
    }

    /// Borrow the fallback resolver (for its counters).
    pub fn resolver(&self) -> &FallbackResolver<S> {
        &self.worker.resolver
    }

    /// Produce every frame of `[start, end]` that is not already successful.
    ///
    /// Resumes from the persisted progress record when it covers a prefix of the range. Returns
    /// the final record; after cancellation its status is still [`RunStatus::Running`]. Frame
    /// failures are recorded in the manifest and do not fail the run; persistence, encoder and
    /// batch-timeout errors do.
    pub fn run(&mut self, start: NaiveDate, end: NaiveDate) -> LapseResult<ProgressRecord> {
        let keys = self.worker.grid.keys_for_range(start, end)?;
        let mut progress = self.prepare_progress(start, end, keys.len() as u64)?;

        match self.drive(&keys, &mut progress) {
            Ok(()) => Ok(progress),
            Err(err) => {
                progress.status = RunStatus::Error;
                progress.error = Some(err.to_string());
                progress.updated_at = Utc::now();
                if let Err(persist_err) = progress.persist(&self.store.progress_path()) {
                    tracing::error!(error = %persist_err, "could not record run error");
                }
                tracing::error!(error = %err, "run halted");
                Err(err)
            }
        }
    }

    /// Re-run fetch, composite and save for one key, whatever its current status.
    ///
    /// When the persisted progress record covers `key`, its counters are refreshed too. A failed
    /// regeneration removes the previous frame file.
    pub fn regenerate(&mut self, key: FrameKey) -> LapseResult<ManifestEntry> {
        let key = self.worker.grid.key(key.date, key.slot)?;
        tracing::info!(%key, "regenerating frame");
        let batch = [(0, key)];
        self.mark_pending(&batch)?;
        let mut reports = self.process_batch(&batch)?;
        let report = reports
            .pop()
            .ok_or_else(|| anyhow::anyhow!("no report produced for {key}"))?;
        self.store.mark_outcome(report.entry.clone())?;
        self.store.flush()?;

        let progress_path = self.store.progress_path();
        if let Some(mut progress) = ProgressRecord::load(&progress_path)? {
            let keys = self
                .worker
                .grid
                .keys_for_range(progress.start_date, progress.end_date)?;
            if keys.contains(&key) {
                self.refresh_counters(&keys, &mut progress);
                progress.updated_at = Utc::now();
                progress.persist(&progress_path)?;
            }
        }
        Ok(report.entry)
    }

    fn prepare_progress(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        total: u64,
    ) -> LapseResult<ProgressRecord> {
        let now = Utc::now();
        let prior = ProgressRecord::load(&self.store.progress_path())?;
        let mut progress = match prior {
            Some(mut rec) if rec.resumes(start, end) => {
                tracing::info!(
                    started_at = %rec.started_at,
                    partitions_done = rec.completed_partitions.len(),
                    "resuming previous run"
                );
                rec.end_date = end;
                rec.total_frames = total;
                rec
            }
            Some(rec) => {
                tracing::info!(
                    prior_start = %rec.start_date,
                    prior_end = %rec.end_date,
                    "progress record does not match the requested range; starting fresh"
                );
                ProgressRecord::new(start, end, total, now)
            }
            None => ProgressRecord::new(start, end, total, now),
        };
        progress.status = RunStatus::Running;
        progress.error = None;
        progress.updated_at = now;
        Ok(progress)
    }

    fn drive(&mut self, keys: &[FrameKey], progress: &mut ProgressRecord) -> LapseResult<()> {
        let pending: Vec<(usize, FrameKey)> = keys
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, k)| !self.store.has(k))
            .collect();
        progress.skipped_frames = (keys.len() - pending.len()) as u64;
        tracing::info!(
            start = %progress.start_date,
            end = %progress.end_date,
            total = keys.len(),
            pending = pending.len(),
            skipped = progress.skipped_frames,
            "run started"
        );

        self.checkpoint(keys, progress)?;

        let mut dups = DuplicateTracker::default();
        let mut cancelled = false;
        for batch in pending.chunks(self.batch_size) {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let started = Instant::now();
            self.mark_pending(batch)?;
            let reports = self.process_batch(batch)?;
            let elapsed = started.elapsed();

            for mut report in reports {
                if let Some(traces) = report.traces
                    && let Some(prev) = dups.observe(report.pos, report.entry.key, traces)
                {
                    tracing::warn!(
                        key = %report.entry.key,
                        duplicate_of = %prev,
                        "adjacent frames resolved to the same upstream raster"
                    );
                    report.entry.duplicate_of = Some(prev);
                }
                self.store.mark_outcome(report.entry)?;
            }
            progress.last_completed = batch.last().map(|(_, k)| *k);
            self.checkpoint(keys, progress)?;
            tracing::info!(
                frames = batch.len(),
                completed = progress.completed_frames,
                failed = progress.failed_frames,
                elapsed_ms = elapsed.as_millis() as u64,
                "batch checkpointed"
            );

            if elapsed > self.batch_timeout {
                return Err(LapseError::BatchTimeout {
                    secs: self.batch_timeout.as_secs(),
                });
            }
        }
        cancelled |= self.cancel.is_cancelled() && progress.terminal_frames() < keys.len() as u64;

        if cancelled {
            tracing::info!(
                completed = progress.completed_frames,
                failed = progress.failed_frames,
                "run cancelled after checkpoint"
            );
            return Ok(());
        }

        let summary = self.store.manifest().summary_for(keys);
        if summary.pending == 0 && summary.total() == keys.len() {
            progress.status = RunStatus::Completed;
        }
        progress.updated_at = Utc::now();
        progress.persist(&self.store.progress_path())?;

        let stats = self.worker.resolver.stats();
        tracing::info!(
            total = progress.total_frames,
            completed = progress.completed_frames,
            failed = progress.failed_frames,
            duplicates = progress.duplicate_frames,
            fallback_rate = progress.fallback_rate(),
            layer_fallbacks = stats.fallbacks,
            layer_exhausted = stats.exhausted,
            "run finished"
        );
        Ok(())
    }

    /// Record the batch's keys as `pending` and persist the manifest before any work starts.
    fn mark_pending(&mut self, batch: &[(usize, FrameKey)]) -> LapseResult<()> {
        let now = Utc::now();
        for &(_, key) in batch {
            self.store.mark_outcome(ManifestEntry::pending(key, now))?;
        }
        self.store.flush()
    }

    /// Fetch phase on the fetch pool, then composite-and-save on the composite pool.
    fn process_batch(&self, batch: &[(usize, FrameKey)]) -> LapseResult<Vec<FrameReport>> {
        let worker = &self.worker;
        let store = &self.store;

        let fetched: Vec<Fetched> = self.fetch_pool.install(|| {
            batch
                .par_iter()
                .map(|&(pos, key)| worker.fetch(pos, key))
                .collect()
        });

        let finished: Vec<LapseResult<FrameReport>> = self.composite_pool.install(|| {
            fetched
                .into_par_iter()
                .map(|f| worker.finish(store, f))
                .collect()
        });

        finished.into_iter().collect()
    }

    /// Persist the manifest, refresh counters, surface complete partitions, persist progress.
    fn checkpoint(&mut self, keys: &[FrameKey], progress: &mut ProgressRecord) -> LapseResult<()> {
        self.store.flush()?;
        self.refresh_counters(keys, progress);
        self.surface_partitions(progress)?;

        progress.updated_at = Utc::now();
        progress.persist(&self.store.progress_path())
    }

    fn refresh_counters(&self, keys: &[FrameKey], progress: &mut ProgressRecord) {
        let summary = self.store.manifest().summary_for(keys);
        progress.completed_frames = summary.success as u64;
        progress.failed_frames = summary.failed as u64;
        progress.fallback_frames = summary.fallback as u64;
        progress.duplicate_frames = summary.duplicates as u64;
    }

    fn surface_partitions(&mut self, progress: &mut ProgressRecord) -> LapseResult<()> {
        let done: BTreeSet<NaiveDate> = progress.completed_partitions.iter().copied().collect();
        for date in dates_inclusive(progress.start_date, progress.end_date)? {
            if done.contains(&date) {
                continue;
            }
            let complete = self.worker.grid.keys_for_day(date).all(|k| {
                self.store
                    .entry(&k)
                    .is_some_and(ManifestEntry::is_terminal)
            });
            if !complete {
                // Partitions are surfaced strictly in date order.
                break;
            }
            let frames = self.store.partition_frames(date);
            let dir = self.store.partition_dir(date);
            tracing::info!(%date, frames = frames.len(), "partition complete");
            self.sink.partition_complete(date, &dir, &frames)?;
            progress.completed_partitions.push(date);
        }
        Ok(())
    }
}

fn build_thread_pool(name: &'static str, threads: usize) -> LapseResult<rayon::ThreadPool> {
    if threads == 0 {
        return Err(LapseError::validation(format!("{name} concurrency must be >= 1")));
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(move |i| format!("coronalapse-{name}-{i}"))
        .build()
        .map_err(|e| LapseError::Other(anyhow::anyhow!("failed to build {name} thread pool: {e}")))
}

#[cfg(test)]
#[path = "../../tests/unit/schedule/scheduler.rs"]
mod tests;
