//! Filesystem change adapter.
//!
//! notify delivers raw events on its own thread; they are forwarded over a
//! channel to one worker thread that owns the mutation side of the
//! [`SearchService`]. The worker drains whatever is queued (up to the
//! configured batch size), applies the batch in arrival order and persists
//! the snapshot before taking the next batch.
//!
//! Watching can start before the service is initialized: events queue in the
//! channel until [`ChangeWatcher::attach`] starts the worker, so nothing that
//! changes during the initial walk is missed.

use crate::error::Result;
use crate::service::SearchService;
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// A file-level change, already stripped of directory-only events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Deleted(PathBuf),
    Moved { from: PathBuf, to: PathBuf },
}

impl fmt::Display for FileEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created(p) => write!(f, "created {}", p.display()),
            Self::Modified(p) => write!(f, "modified {}", p.display()),
            Self::Deleted(p) => write!(f, "deleted {}", p.display()),
            Self::Moved { from, to } => write!(f, "moved {} -> {}", from.display(), to.display()),
        }
    }
}

/// Translate one notify event into file events. Folder create/remove,
/// metadata-only changes and access events produce nothing.
pub fn map_notify_event(event: Event) -> Vec<FileEvent> {
    let Event { kind, paths, .. } = event;
    match kind {
        EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => Vec::new(),
        EventKind::Modify(ModifyKind::Name(mode)) => map_rename(paths, mode),
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Create(_) => paths.into_iter().map(FileEvent::Created).collect(),
        EventKind::Modify(_) => paths.into_iter().map(FileEvent::Modified).collect(),
        EventKind::Remove(_) => paths.into_iter().map(FileEvent::Deleted).collect(),
        _ => Vec::new(),
    }
}

fn map_rename(paths: Vec<PathBuf>, mode: RenameMode) -> Vec<FileEvent> {
    match mode {
        RenameMode::Both => {
            let mut it = paths.into_iter();
            match (it.next(), it.next()) {
                (Some(from), Some(to)) => vec![FileEvent::Moved { from, to }],
                (Some(from), None) => vec![FileEvent::Deleted(from)],
                _ => Vec::new(),
            }
        }
        RenameMode::From => paths.into_iter().map(FileEvent::Deleted).collect(),
        RenameMode::To => paths.into_iter().map(FileEvent::Created).collect(),
        RenameMode::Any | RenameMode::Other => paths
            .into_iter()
            .map(|p| if p.exists() { FileEvent::Created(p) } else { FileEvent::Deleted(p) })
            .collect(),
    }
}

#[derive(Debug, Default)]
struct Counters {
    events: AtomicU64,
    batches: AtomicU64,
    errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WatcherStats {
    pub events: u64,
    pub batches: u64,
    pub errors: u64,
}

/// Running watcher plus its event worker. Dropping it stops both.
pub struct ChangeWatcher {
    watcher: Option<RecommendedWatcher>,
    /// Events received before a worker was attached.
    pending: Option<Receiver<notify::Result<Event>>>,
    worker: Option<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl fmt::Debug for ChangeWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeWatcher").field("stats", &self.stats()).finish_non_exhaustive()
    }
}

impl ChangeWatcher {
    /// Watch `roots` recursively and feed their changes into `service`.
    pub fn spawn(service: Arc<SearchService>, roots: &[PathBuf]) -> Result<Self> {
        let mut watcher = Self::watch(roots)?;
        watcher.attach(service)?;
        Ok(watcher)
    }

    /// Start watching `roots` without applying anything yet.
    pub fn watch(roots: &[PathBuf]) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
        let mut watcher = notify::recommended_watcher(move |event| {
            if tx.send(event).is_err() {
                tracing::debug!("watch event dropped because worker channel is closed");
            }
        })?;
        for root in roots {
            if root.exists() {
                watcher.watch(root, RecursiveMode::Recursive)?;
                tracing::info!(root = %root.display(), "watching");
            } else {
                tracing::warn!(root = %root.display(), "cannot watch missing root");
            }
        }
        Ok(Self { watcher: Some(watcher), pending: Some(rx), worker: None, counters: Arc::default() })
    }

    /// Start the worker that applies queued and future events to `service`.
    /// Attaching twice is a no-op.
    pub fn attach(&mut self, service: Arc<SearchService>) -> Result<()> {
        let Some(rx) = self.pending.take() else {
            tracing::debug!("event worker already attached");
            return Ok(());
        };
        self.worker = Some(spawn_worker(service, rx, Arc::clone(&self.counters))?);
        Ok(())
    }

    pub fn stats(&self) -> WatcherStats {
        WatcherStats {
            events: self.counters.events.load(Ordering::Relaxed),
            batches: self.counters.batches.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }

    /// Stop watching, let the worker finish queued events, and join it.
    pub fn stop(mut self) {
        self.shutdown_inner();
    }

    fn shutdown_inner(&mut self) {
        // dropping the watcher drops the channel sender
        self.watcher.take();
        self.pending.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("event worker panicked");
            }
        }
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}

fn spawn_worker(
    service: Arc<SearchService>,
    rx: Receiver<notify::Result<Event>>,
    counters: Arc<Counters>,
) -> Result<JoinHandle<()>> {
    let batch_size = service.config().event_batch_size;
    let handle = thread::Builder::new()
        .name("livesearch-events".into())
        .spawn(move || run_worker(&service, &rx, batch_size, &counters))?;
    Ok(handle)
}

fn run_worker(
    service: &SearchService,
    rx: &Receiver<notify::Result<Event>>,
    batch_size: usize,
    counters: &Counters,
) {
    while let Ok(first) = rx.recv() {
        let mut batch = Vec::new();
        collect(first, &mut batch, counters);
        while batch.len() < batch_size {
            match rx.try_recv() {
                Ok(next) => collect(next, &mut batch, counters),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        if batch.is_empty() {
            continue;
        }
        counters.batches.fetch_add(1, Ordering::Relaxed);
        match service.apply_batch(batch) {
            Ok(outcome) => tracing::debug!(?outcome, "event batch applied"),
            Err(err) => {
                counters.errors.fetch_add(1, Ordering::Relaxed);
                tracing::error!(error = %err, "failed to apply event batch");
            }
        }
    }
    tracing::debug!("event worker exiting");
}

fn collect(event: notify::Result<Event>, batch: &mut Vec<FileEvent>, counters: &Counters) {
    match event {
        Ok(event) => {
            let mapped = map_notify_event(event);
            counters.events.fetch_add(mapped.len() as u64, Ordering::Relaxed);
            batch.extend(mapped);
        }
        Err(err) => {
            counters.errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(error = %err, "watch backend error");
        }
    }
}
