//! The debounced rebuild loop.
//!
//! [`WatchLoop`] is a single tokio task that owns the only path to a
//! rebuild. It turns a stream of change notices into rebuilds:
//!
//! ```text
//!            notice                 window expires
//!   IDLE ─────────────► PENDING ─────────────────► REBUILDING
//!    ▲                    │ notices coalesce            │
//!    │                    ▼                             │
//!    └──────────── (no notice seen while rebuilding) ◄──┘
//!                  (notice seen: one more PENDING cycle)
//!
//!   any state ── shutdown ──► CLOSED
//! ```
//!
//! The debounce window is fixed: it starts at the first notice and is not
//! extended by later ones. A rebuild runs on the blocking pool and is never
//! interrupted; shutdown waits for it.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use mr_routes::{RebuildReport, RouteEngine, RouteError};

use crate::error::WatchError;
use crate::events::ChangeNotice;
use crate::watcher::FileWatcher;

/// Capacity of the forced-rebuild request queue.
const COMMAND_CAPACITY: usize = 8;

/// A unit of work the loop knows how to run.
pub trait Rebuild: Send + Sync + 'static {
    /// What a successful rebuild reports.
    type Report: Send + 'static;
    /// What a failed rebuild reports.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Runs one rebuild to completion. Called on the blocking pool.
    fn rebuild(&self) -> Result<Self::Report, Self::Error>;

    /// Returns `true` if `error` must stop the loop.
    fn is_fatal(error: &Self::Error) -> bool;
}

impl Rebuild for RouteEngine {
    type Report = RebuildReport;
    type Error = RouteError;

    fn rebuild(&self) -> Result<RebuildReport, RouteError> {
        Self::rebuild(self)
    }

    fn is_fatal(error: &RouteError) -> bool {
        error.is_fatal()
    }
}

/// A stream of change notices.
pub trait ChangeSource: Send + 'static {
    /// Waits for the next notice; `None` once the source has ended.
    ///
    /// Must be cancel safe.
    fn next_change(&mut self) -> impl Future<Output = Option<ChangeNotice>> + Send;
}

impl ChangeSource for mpsc::Receiver<ChangeNotice> {
    fn next_change(&mut self) -> impl Future<Output = Option<ChangeNotice>> + Send {
        self.recv()
    }
}

impl ChangeSource for FileWatcher {
    fn next_change(&mut self) -> impl Future<Output = Option<ChangeNotice>> + Send {
        self.recv()
    }
}

/// A source that never reports a change, for serving without watching.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoChanges;

impl ChangeSource for NoChanges {
    fn next_change(&mut self) -> impl Future<Output = Option<ChangeNotice>> + Send {
        std::future::pending()
    }
}

/// Where the loop is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopState {
    /// Nothing to do.
    Idle,
    /// A debounce window is running.
    Pending,
    /// A rebuild is running.
    Rebuilding,
    /// The loop has stopped.
    Closed,
}

impl LoopState {
    /// Returns the lower-case state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pending => "pending",
            Self::Rebuilding => "rebuilding",
            Self::Closed => "closed",
        }
    }
}

type RebuildResult<R> = Result<<R as Rebuild>::Report, <R as Rebuild>::Error>;
type ForceReply<R> = oneshot::Sender<RebuildResult<R>>;

/// Cloneable control surface of a running [`WatchLoop`].
pub struct WatchHandle<R: Rebuild> {
    commands: mpsc::Sender<ForceReply<R>>,
    state: watch::Receiver<LoopState>,
    rebuilds: Arc<AtomicU64>,
    cancel: CancellationToken,
}

impl<R: Rebuild> Clone for WatchHandle<R> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            state: self.state.clone(),
            rebuilds: Arc::clone(&self.rebuilds),
            cancel: self.cancel.clone(),
        }
    }
}

impl<R: Rebuild> std::fmt::Debug for WatchHandle<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("state", &self.state())
            .field("rebuilds", &self.rebuilds())
            .finish_non_exhaustive()
    }
}

impl<R: Rebuild> WatchHandle<R> {
    /// Runs a rebuild now, skipping the debounce window.
    ///
    /// The request is queued behind any rebuild already running, and a
    /// pending debounce window is folded into it. Resolves once the
    /// rebuild has completed.
    ///
    /// # Errors
    ///
    /// - [`WatchError::ChannelClosed`] if the loop has stopped.
    /// - [`WatchError::Rebuild`] if the rebuild itself failed.
    pub async fn force_rebuild(&self) -> Result<R::Report, WatchError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(reply_tx)
            .await
            .map_err(|_| WatchError::ChannelClosed)?;

        match reply_rx.await {
            Ok(Ok(report)) => Ok(report),
            Ok(Err(err)) => Err(WatchError::Rebuild(Box::new(err))),
            Err(_) => Err(WatchError::ChannelClosed),
        }
    }

    /// Returns the current loop state.
    #[must_use]
    pub fn state(&self) -> LoopState {
        *self.state.borrow()
    }

    /// Returns a receiver that observes state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LoopState> {
        self.state.clone()
    }

    /// Returns the number of rebuilds completed so far, failed ones included.
    #[must_use]
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds.load(Ordering::Acquire)
    }

    /// Asks the loop to stop and waits until it is [`LoopState::Closed`].
    ///
    /// A rebuild in progress finishes first; a pending window is dropped.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let mut state = self.state.clone();
        let _ = state.wait_for(|state| *state == LoopState::Closed).await;
    }
}

/// A running watch loop.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use mr_core::Config;
/// use mr_routes::RouteEngine;
/// use mr_watcher::{NoChanges, WatchLoop};
///
/// # async fn example() -> Result<(), mr_watcher::WatchError> {
/// let engine = Arc::new(RouteEngine::new(&Config::default()));
/// let watch = WatchLoop::spawn(engine, NoChanges, Duration::from_millis(100));
///
/// let report = watch.handle().force_rebuild().await?;
/// println!("{} routes", report.routes);
///
/// watch.shutdown().await
/// # }
/// ```
pub struct WatchLoop<R: Rebuild> {
    handle: WatchHandle<R>,
    task: JoinHandle<Result<(), WatchError>>,
}

impl<R: Rebuild> std::fmt::Debug for WatchLoop<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchLoop")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl<R: Rebuild> WatchLoop<R> {
    /// Spawns the loop on the current tokio runtime.
    pub fn spawn<S: ChangeSource>(rebuilder: Arc<R>, source: S, debounce: Duration) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (state_tx, state_rx) = watch::channel(LoopState::Idle);
        let rebuilds = Arc::new(AtomicU64::new(0));
        let cancel = CancellationToken::new();

        let task = LoopTask {
            rebuilder,
            source,
            source_open: true,
            debounce,
            commands: command_rx,
            commands_open: true,
            queued: Vec::new(),
            state: state_tx,
            rebuilds: Arc::clone(&rebuilds),
            cancel: cancel.clone(),
            deadline: None,
            dirty: false,
        };

        Self {
            handle: WatchHandle {
                commands: command_tx,
                state: state_rx,
                rebuilds,
                cancel,
            },
            task: tokio::spawn(task.run()),
        }
    }

    /// Returns a handle to the loop.
    #[must_use]
    pub fn handle(&self) -> WatchHandle<R> {
        self.handle.clone()
    }

    /// Stops the loop and waits for it to exit.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::RebuildAborted`] if the loop had already
    /// stopped on a fatal rebuild error, or [`WatchError::ChannelClosed`]
    /// if the task panicked.
    pub async fn shutdown(self) -> Result<(), WatchError> {
        self.handle.cancel.cancel();
        self.join().await
    }

    /// Waits for the loop to exit on its own.
    pub async fn join(self) -> Result<(), WatchError> {
        self.task.await.map_err(|_| WatchError::ChannelClosed)?
    }
}

/// State owned by the loop task.
struct LoopTask<R: Rebuild, S> {
    rebuilder: Arc<R>,
    source: S,
    source_open: bool,
    debounce: Duration,
    commands: mpsc::Receiver<ForceReply<R>>,
    commands_open: bool,
    /// Forced rebuilds requested while another rebuild was running.
    queued: Vec<ForceReply<R>>,
    state: watch::Sender<LoopState>,
    rebuilds: Arc<AtomicU64>,
    cancel: CancellationToken,
    /// End of the running debounce window, if any.
    deadline: Option<Instant>,
    /// A notice arrived while rebuilding.
    dirty: bool,
}

impl<R: Rebuild, S: ChangeSource> LoopTask<R, S> {
    async fn run(mut self) -> Result<(), WatchError> {
        debug!(debounce_ms = self.debounce.as_millis(), "Watch loop started");
        let result = self.event_loop().await;
        self.state.send_replace(LoopState::Closed);
        match &result {
            Ok(()) => info!(rebuilds = self.rebuilds.load(Ordering::Acquire), "Watch loop closed"),
            Err(err) => error!(error = %err, "Watch loop stopped"),
        }
        result
    }

    async fn event_loop(&mut self) -> Result<(), WatchError> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            if !self.queued.is_empty() {
                let reply = self.queued.remove(0);
                self.rebuild(Some(reply)).await?;
                continue;
            }
            if std::mem::take(&mut self.dirty) {
                self.arm();
            }

            let deadline = self.deadline;
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => return Ok(()),

                request = self.commands.recv(), if self.commands_open => {
                    let Some(reply) = request else {
                        self.commands_open = false;
                        continue;
                    };
                    self.deadline = None;
                    self.rebuild(Some(reply)).await?;
                }

                notice = self.source.next_change(), if self.source_open => {
                    self.on_notice(notice);
                    // Later notices fall into the window already running.
                    if std::mem::take(&mut self.dirty) && self.deadline.is_none() {
                        self.arm();
                    }
                }

                () = wait_until(deadline) => {
                    self.deadline = None;
                    self.rebuild(None).await?;
                }
            }
        }
    }

    /// Records a notice; the caller decides whether it opens a window.
    fn on_notice(&mut self, notice: Option<ChangeNotice>) {
        match notice {
            Some(notice) => {
                trace!(path = %notice.path, kind = %notice.kind, "Change noticed");
                self.dirty = true;
            }
            None => {
                debug!("Change source ended");
                self.source_open = false;
            }
        }
    }

    /// Opens a debounce window.
    fn arm(&mut self) {
        self.deadline = Some(Instant::now() + self.debounce);
        self.state.send_replace(LoopState::Pending);
        debug!(debounce_ms = self.debounce.as_millis(), "Rebuild pending");
    }

    /// Runs one rebuild on the blocking pool, collecting notices and
    /// forced requests that arrive meanwhile.
    async fn rebuild(&mut self, reply: Option<ForceReply<R>>) -> Result<(), WatchError> {
        self.state.send_replace(LoopState::Rebuilding);
        self.dirty = false;

        let rebuilder = Arc::clone(&self.rebuilder);
        let mut task = tokio::task::spawn_blocking(move || rebuilder.rebuild());

        let joined = loop {
            tokio::select! {
                joined = &mut task => break joined,

                request = self.commands.recv(), if self.commands_open => {
                    match request {
                        Some(reply) => self.queued.push(reply),
                        None => self.commands_open = false,
                    }
                }

                notice = self.source.next_change(), if self.source_open => {
                    self.on_notice(notice);
                }
            }
        };

        let count = self.rebuilds.fetch_add(1, Ordering::AcqRel) + 1;

        let result = match joined {
            Ok(result) => result,
            Err(err) => {
                return Err(WatchError::RebuildAborted(format!("rebuild task failed: {err}")));
            }
        };

        let fatal = match &result {
            Ok(_) => {
                debug!(rebuilds = count, "Rebuild finished");
                None
            }
            Err(err) if R::is_fatal(err) => Some(err.to_string()),
            Err(err) => {
                warn!(error = %err, "Rebuild failed, previous routes stay in service");
                None
            }
        };

        if fatal.is_none() {
            self.state.send_replace(LoopState::Idle);
        }

        if let Some(reply) = reply {
            let _ = reply.send(result);
        }

        match fatal {
            Some(reason) => Err(WatchError::RebuildAborted(reason)),
            None => Ok(()),
        }
    }
}

/// Sleeps until `deadline`, or forever if there is none.
async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
