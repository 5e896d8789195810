//! # landtiles-fetch
//!
//! Network side of the state raster tile downloader: metadata feeds, fetch
//! planning, tile downloads and the per-state orchestration.
//!
//! ## Pipeline
//!
//! ```text
//! AOI ─► derive_tiles ─► Reconciler ─► plan ─► TileDownloader ─► RunReport
//!        (core)          (adapter)     (landing)  (worker pool)
//! ```
//!
//! - [`StateAdapter`]: per-state feed logic, looked up in an [`AdapterRegistry`]
//! - [`Reconciler`]: feed documents to a tile-indexed [`MetadataIndex`]
//! - [`plan`]: which candidates need a download
//! - [`TileDownloader`]: retrying, verifying, atomically committing download
//! - [`Orchestrator`]: all of the above for every selected state
//!
//! ## Example
//!
//! ```no_run
//! use landtiles_core::{RunConfig, SourcesConfig};
//! use landtiles_fetch::{HttpTransport, Orchestrator};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let config = RunConfig::load(Path::new("init.yaml"))?;
//! let sources = SourcesConfig::load(Path::new("sources.yaml"))?;
//! let transport = Arc::new(HttpTransport::new()?);
//!
//! let report = Orchestrator::new(config, sources, transport).run()?;
//! print!("{report}");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod cancel;
mod download;
mod error;
mod metadata;
mod orchestrator;
mod planner;
pub mod pool;
mod report;
mod retry;
pub mod states;
mod storage;
mod template;
mod transport;

pub use cancel::CancelToken;
pub use download::{DownloadOptions, DownloadResult, DownloadStats, DownloadStatus, TileDownloader, TileError};
pub use error::{ErrorKind, FetchError, MetadataError, StorageError};
pub use metadata::{
    FeedContext, FeedDocument, FeedFetcher, FeedRecord, FeedStats, FetchedFeed, MetadataIndex,
    ParsedFeed, Reconciler, StateAdapter, TileMetadataEntry,
};
pub use orchestrator::{Orchestrator, PreparedState};
pub use planner::{plan, present_in, DownloadPlanItem, FetchPlan};
pub use report::{Counts, RunReport, StateReport, StateStatus, TileRecord, TileStatus};
pub use retry::{with_retry, RetryPolicy};
pub use states::AdapterRegistry;
pub use storage::{object_key, DirectoryStore, StoreAck, TileStore};
pub use template::{expand as expand_template, TemplateError, TemplateVars};
pub use transport::{HttpTransport, ResponseBody, Transport, DEFAULT_TIMEOUT};
