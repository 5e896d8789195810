//! Orchestrator: runs the pipeline for every selected state.
//!
//! A run has two phases:
//!
//! 1. **Prepare** (no network): validate the configuration, load the AOI and
//!    optional state boundaries, resolve each state's grid and derive its
//!    candidate tiles. Any problem here is a configuration error and aborts
//!    the run before a single request is sent.
//! 2. **Execute**: states run on a pool of `state_workers` threads. Each
//!    state reconciles its feed, plans and downloads its tiles on a pool of
//!    `workers` threads. A state whose feed is unavailable does not affect
//!    the others.

use crate::pool::run_pool;
use crate::report::{RunReport, StateReport, StateStatus, TileRecord};
use crate::{
    plan, present_in, AdapterRegistry, CancelToken, DownloadOptions, ErrorKind, FeedContext,
    FeedFetcher, MetadataError, Reconciler, RetryPolicy, TileDownloader, TileStore, Transport,
};
use chrono::Utc;
use landtiles_core::{
    derive_tiles, AreaOfInterest, CoreError, Landing, RunConfig, SourceEntry, SourcesConfig,
    StateBoundaries, StateCode, TileGridSpec, TileIndex,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// A state after the prepare phase.
#[derive(Debug, Clone)]
pub struct PreparedState {
    /// State.
    pub state: StateCode,
    /// Grid and source entry; `None` when the state has no source entry.
    pub source: Option<(TileGridSpec, SourceEntry)>,
    /// Candidate tiles in derivation order.
    pub candidates: Vec<TileIndex>,
}

/// Runs a configured download.
pub struct Orchestrator {
    config: RunConfig,
    sources: SourcesConfig,
    transport: Arc<dyn Transport>,
    registry: AdapterRegistry,
    store: Option<Arc<dyn TileStore>>,
    cancel: CancelToken,
}

impl Orchestrator {
    /// Orchestrator with the default adapter registry.
    pub fn new(config: RunConfig, sources: SourcesConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            sources,
            transport,
            registry: AdapterRegistry::with_defaults(),
            store: None,
            cancel: CancelToken::new(),
        }
    }

    /// Replace the adapter registry.
    pub fn with_registry(mut self, registry: AdapterRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Storage for `upload_s3`.
    pub fn with_store(mut self, store: Arc<dyn TileStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use `cancel` as the run's cancellation token.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run configuration.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Cancellation token of the run.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// States taking part in the run.
    fn selected_states(&self) -> Vec<StateCode> {
        match &self.config.selected_states {
            Some(states) if !states.is_empty() => {
                let mut states = states.clone();
                states.sort();
                states.dedup();
                states
            }
            _ => self.sources.configured_states(self.config.data_type),
        }
    }

    /// Validate everything and derive every state's candidates.
    pub fn prepare(&self) -> Result<Vec<PreparedState>, CoreError> {
        self.config.validate()?;
        self.sources.validate()?;
        if self.config.upload_s3 && self.store.is_none() {
            return Err(CoreError::InvalidConfig(
                "upload_s3 is set but no storage backend is configured".to_string(),
            ));
        }

        let aoi = AreaOfInterest::load(&self.config.aoi_path, self.config.aoi_state)?;
        let boundaries = match &self.config.state_boundaries_path {
            Some(path) => Some(StateBoundaries::load(path)?),
            None => None,
        };

        let data_type = self.config.data_type;
        let mut prepared = Vec::new();
        for state in self.selected_states() {
            let Some(grid) = self.sources.grid_spec(data_type, state)? else {
                debug!(state = %state, data_type = %data_type, "State has no source entry");
                prepared.push(PreparedState {
                    state,
                    source: None,
                    candidates: Vec::new(),
                });
                continue;
            };
            let entry = self
                .sources
                .entry(data_type, state)
                .cloned()
                .ok_or_else(|| CoreError::InvalidConfig(format!("missing source entry for {state}")))?;

            let candidates = match boundaries.as_ref() {
                Some(boundaries) => match boundaries.get(state) {
                    Some(boundary) => derive_tiles(&aoi.clipped_to(boundary, grid.utm_zone), &grid)?,
                    None => {
                        warn!(state = %state, "No boundary for state, using the unclipped AOI");
                        derive_tiles(&aoi, &grid)?
                    }
                },
                None => derive_tiles(&aoi, &grid)?,
            };
            info!(state = %state, candidates = candidates.len(), "Derived candidate tiles");
            prepared.push(PreparedState {
                state,
                source: Some((grid, entry)),
                candidates,
            });
        }
        RunReport::ensure_writable(&self.config.meta_path)?;
        Ok(prepared)
    }

    /// Prepare and execute the run, then write the report to `meta_path`.
    ///
    /// Only the prepare phase fails the call. A report that cannot be written
    /// after the run is logged and recorded in [`RunReport::write_error`].
    pub fn run(&self) -> Result<RunReport, CoreError> {
        let started_at = Utc::now();
        let prepared = self.prepare()?;
        info!(
            data_type = %self.config.data_type,
            states = prepared.len(),
            download = self.config.download,
            "Starting run"
        );

        let states = run_pool("state", self.config.state_workers, prepared, |state| {
            let mut report = self.run_state(state);
            report.sort_tiles();
            report
        });

        let mut report = RunReport {
            data_type: self.config.data_type,
            started_at,
            finished_at: Utc::now(),
            cancelled: self.cancel.is_cancelled(),
            states,
            write_error: None,
        };
        let path = &self.config.meta_path;
        match report.write_json(path) {
            Ok(()) => info!(path = %path.display(), "Wrote run report"),
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to write run report");
                report.write_error = Some(e.to_string());
            }
        }
        Ok(report)
    }

    /// Reconcile, plan and download one state.
    fn run_state(&self, prepared: PreparedState) -> StateReport {
        let PreparedState {
            state,
            source,
            candidates,
        } = prepared;
        let Some((grid, entry)) = source else {
            return StateReport::new(state, StateStatus::NotConfigured, 0)
                .with_message(format!("no {} source configured", self.config.data_type));
        };
        let Some(adapter) = self.registry.get(state) else {
            warn!(state = %state, "No metadata adapter for state");
            return StateReport::new(state, StateStatus::NoAdapter, candidates.len())
                .with_message(format!("no metadata adapter for {}", state.name()));
        };
        if candidates.is_empty() {
            info!(state = %state, "AOI does not touch the state's grid");
            return StateReport::new(state, StateStatus::Completed, 0);
        }
        if self.cancel.is_cancelled() {
            let mut report = StateReport::new(state, StateStatus::Cancelled, candidates.len());
            report.fail_all(&candidates, &grid, ErrorKind::Cancelled);
            return report;
        }

        let landing = Landing::new(&self.config.local_landing_path);
        if let Err(e) = landing.clean_partials(state) {
            warn!(state = %state, error = %e, "Failed to clean partial downloads");
        }

        let policy = RetryPolicy::from(&self.config.retry);
        let fetcher = FeedFetcher::new(self.transport.clone(), policy.clone(), self.cancel.clone());
        let ctx = FeedContext {
            grid: &grid,
            entry: &entry,
            candidates: &candidates,
        };
        let metadata = match Reconciler::new(fetcher).reconcile(adapter.as_ref(), &ctx) {
            Ok(metadata) => metadata,
            Err(MetadataError::Cancelled) => {
                let mut report = StateReport::new(state, StateStatus::Cancelled, candidates.len());
                report.fail_all(&candidates, &grid, ErrorKind::Cancelled);
                return report;
            }
            Err(e) => {
                error!(state = %state, error = %e, "Metadata unavailable");
                return StateReport::new(state, StateStatus::MetadataUnavailable, candidates.len())
                    .with_message(e.to_string());
            }
        };

        let date_range = self.config.effective_date_range();
        let plan = plan(&candidates, &metadata, date_range.as_ref(), &landing, present_in(&landing));
        info!(
            state = %state,
            to_download = plan.items.len(),
            skipped = plan.skipped.len(),
            filtered = plan.filtered.len(),
            unavailable = plan.unavailable.len(),
            "Planned downloads"
        );

        let mut report = StateReport::new(state, StateStatus::Completed, candidates.len());
        report.record_feed(metadata.stats);
        report.record_plan(&plan, &grid, &landing);

        if !self.config.download {
            report.status = StateStatus::Planned;
            report.record_planned(&plan);
            return report;
        }

        let mut downloader = TileDownloader::new(self.transport.clone(), landing, policy, self.cancel.clone())
            .with_options(DownloadOptions {
                extract_archives: self.config.extract_archives,
                delete: self.config.delete,
                s3_prefix: entry.links.s3_path.clone(),
            });
        if self.config.upload_s3 {
            if let Some(store) = &self.store {
                downloader = downloader.with_store(store.clone());
            }
        }

        let thread_name = format!("{}-tile", state.code().to_ascii_lowercase());
        let results = run_pool(&thread_name, self.config.workers, plan.items, |item| downloader.fetch(item));
        for result in results {
            report.push(TileRecord::from(result));
        }
        if self.cancel.is_cancelled() {
            report.status = StateStatus::Cancelled;
        }

        let stats = downloader.stats();
        info!(
            state = %state,
            downloaded = report.counts.downloaded,
            failed = report.counts.failed,
            bytes = stats.bytes_downloaded,
            "State finished"
        );
        report
    }
}
