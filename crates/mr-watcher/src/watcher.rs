//! File watcher with async notice streaming.
//!
//! This module provides the [`FileWatcher`] type that bridges the synchronous
//! `notify` watcher to the async tokio runtime.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Blocking Thread (spawn_blocking)            │
//! │  ┌───────────────────┐        ┌──────────────────────────┐  │
//! │  │ RecommendedWatcher │  ───►  │ Callback                 │  │
//! │  │ (notify)          │        │ (UTF-8, filter, try_send)│  │
//! │  └───────────────────┘        └────────────┬─────────────┘  │
//! └────────────────────────────────────────────│────────────────┘
//!                                              │ bounded mpsc
//!                                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Async Runtime (tokio)                       │
//! │        FileWatcher::recv ──► WatchLoop (debounce)           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! No debouncing happens here; the watch loop owns the debounce window.
//! When the channel is full a notice is dropped, which is harmless: a full
//! channel already guarantees a pending rebuild.

use camino::{Utf8Path, Utf8PathBuf};
use notify::{RecursiveMode, Watcher};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use mr_core::WatchConfig;

use crate::error::WatchError;
use crate::events::{ChangeKind, ChangeNotice};
use crate::filter::ChangeFilter;

/// A recursive watcher on the mock root that streams [`ChangeNotice`]s.
///
/// # Lifecycle
///
/// 1. **Creation**: [`FileWatcher::new`] validates the path and starts the
///    notify watcher on the blocking pool, returning once it is subscribed.
/// 2. **Reception**: [`FileWatcher::recv`] yields filtered notices.
/// 3. **Shutdown**: [`FileWatcher::shutdown`] stops the subscription and
///    awaits the blocking task. Dropping the watcher also stops it.
///
/// # Examples
///
/// ```no_run
/// use mr_watcher::{FileWatcher, MockTreeFilter};
/// use mr_core::WatchConfig;
/// use camino::Utf8Path;
///
/// # async fn example() -> Result<(), mr_watcher::WatchError> {
/// let mut watcher = FileWatcher::new(
///     Utf8Path::new("./mocks"),
///     &WatchConfig::default(),
///     MockTreeFilter,
/// ).await?;
///
/// while let Some(notice) = watcher.recv().await {
///     println!("{} {}", notice.kind, notice.path);
/// }
/// # Ok(())
/// # }
/// ```
pub struct FileWatcher {
    /// Shutdown signal sender; `None` once shutdown has started.
    shutdown_tx: Option<oneshot::Sender<()>>,

    /// Handle to the blocking watcher task.
    task_handle: Option<JoinHandle<()>>,

    /// Notice receiver for async consumption.
    notice_rx: mpsc::Receiver<ChangeNotice>,

    /// The canonical path being watched.
    watch_path: Utf8PathBuf,
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher")
            .field("watch_path", &self.watch_path)
            .field("is_running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl FileWatcher {
    /// Starts watching `path` recursively.
    ///
    /// # Errors
    ///
    /// - [`WatchError::PathNotFound`] if the path doesn't exist.
    /// - [`WatchError::Io`] if the path cannot be canonicalized.
    /// - [`WatchError::Notify`] if the subscription cannot be set up.
    pub async fn new<F: ChangeFilter>(
        path: &Utf8Path,
        config: &WatchConfig,
        filter: F,
    ) -> Result<Self, WatchError> {
        if !path.exists() {
            return Err(WatchError::path_not_found(path));
        }

        let watch_path = path.canonicalize_utf8()?;

        let (notice_tx, notice_rx) = mpsc::channel(config.channel_capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        let task_path = watch_path.clone();
        let task_handle = tokio::task::spawn_blocking(move || {
            run_watcher_thread(&task_path, notice_tx, ready_tx, shutdown_rx, filter);
        });

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(err),
            Err(_) => return Err(WatchError::ChannelClosed),
        }

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            task_handle: Some(task_handle),
            notice_rx,
            watch_path,
        })
    }

    /// Receives the next change notice.
    ///
    /// Returns `None` once the watcher has stopped.
    pub async fn recv(&mut self) -> Option<ChangeNotice> {
        self.notice_rx.recv().await
    }

    /// Returns the canonical path being watched.
    #[must_use]
    pub fn watch_path(&self) -> &Utf8Path {
        &self.watch_path
    }

    /// Returns `true` if the watcher is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some() && self.task_handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the subscription and waits for the watcher thread to exit.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::ChannelClosed`] if the watcher thread panicked.
    pub async fn shutdown(mut self) -> Result<(), WatchError> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(handle) = self.task_handle.take() {
            handle.await.map_err(|_| WatchError::ChannelClosed)?;
        }

        Ok(())
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        // The blocking task exits on its own once signalled.
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Runs the notify watcher until the shutdown signal arrives.
///
/// Reports the outcome of the subscription on `ready_tx` so that
/// [`FileWatcher::new`] can surface setup errors.
fn run_watcher_thread<F: ChangeFilter>(
    path: &Utf8Path,
    notice_tx: mpsc::Sender<ChangeNotice>,
    ready_tx: oneshot::Sender<Result<(), WatchError>>,
    shutdown_rx: oneshot::Receiver<()>,
    filter: F,
) {
    let handler = move |res: notify::Result<notify::Event>| {
        let event = match res {
            Ok(event) => event,
            Err(error) => {
                warn!(error = %error, "File watcher error");
                return;
            }
        };

        let Some(kind) = ChangeKind::from_event_kind(&event.kind) else {
            trace!(kind = ?event.kind, "Ignoring access event");
            return;
        };

        for path in event.paths {
            let path = match Utf8PathBuf::try_from(path) {
                Ok(path) => path,
                Err(err) => {
                    warn!(
                        path = %err.into_path_buf().display(),
                        "Skipping non-UTF-8 path in change notice"
                    );
                    continue;
                }
            };

            if !filter.should_process(&path) {
                trace!(path = %path, "Filtered out change notice");
                continue;
            }

            trace!(path = %path, %kind, "Change notice");
            match notice_tx.try_send(ChangeNotice::new(path, kind)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    trace!("Notice channel full, rebuild already pending");
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Notice channel closed");
                    return;
                }
            }
        }
    };

    let mut watcher = match notify::recommended_watcher(handler) {
        Ok(watcher) => watcher,
        Err(err) => {
            let _ = ready_tx.send(Err(err.into()));
            return;
        }
    };

    if let Err(err) = watcher.watch(path.as_std_path(), RecursiveMode::Recursive) {
        let _ = ready_tx.send(Err(err.into()));
        return;
    }

    info!(path = %path, "File watcher started");
    let _ = ready_tx.send(Ok(()));

    let _ = shutdown_rx.blocking_recv();

    info!(path = %path, "File watcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{AcceptAllFilter, MockTreeFilter};
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    /// A temp dir holding an empty `mocks/get` tree.
    fn mock_tree() -> (TempDir, Utf8PathBuf) {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let root = Utf8PathBuf::from_path_buf(dir.path().join("mocks")).expect("Invalid path");
        fs::create_dir_all(root.join("get")).expect("Failed to create mock tree");
        (dir, root)
    }

    #[tokio::test]
    async fn test_watcher_starts_on_mock_root() {
        let (_dir, root) = mock_tree();

        let watcher = FileWatcher::new(&root, &WatchConfig::default(), MockTreeFilter)
            .await
            .expect("Watcher should start");

        assert!(watcher.is_running());
        assert!(watcher.watch_path().ends_with("mocks"));
        watcher.shutdown().await.expect("Shutdown failed");
    }

    #[tokio::test]
    async fn test_watcher_rejects_missing_root() {
        let (_dir, root) = mock_tree();
        let missing = root.join("absent");

        let result = FileWatcher::new(&missing, &WatchConfig::default(), AcceptAllFilter).await;

        match result {
            Err(WatchError::PathNotFound(path)) => assert_eq!(path, missing),
            other => panic!("expected PathNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_watcher_reports_new_route_file() {
        let (_dir, root) = mock_tree();
        let mut watcher = FileWatcher::new(&root, &WatchConfig::default(), MockTreeFilter)
            .await
            .expect("Watcher should start");

        fs::write(root.join("get").join("users.json"), "[]").expect("Failed to write file");

        let notice = tokio::time::timeout(Duration::from_secs(2), watcher.recv()).await;
        watcher.shutdown().await.expect("Shutdown failed");

        // Delivery is platform-dependent; only check what did arrive.
        if let Ok(Some(notice)) = notice {
            assert!(notice.path.as_str().contains("get"));
        }
    }
}
