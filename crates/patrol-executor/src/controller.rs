use crate::{
    Announcer, LogSink, NavigationService, PatrolError, PatrolExecutor, PatrolMetrics,
    PatrolReport, Result, Route, RouteBook,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Set when the patrol task ends, whether it returns, panics or is aborted.
struct CompletionFlag(Arc<AtomicBool>);

impl Drop for CompletionFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

struct ActivePatrol {
    id: u64,
    route: Route,
    stop: CancellationToken,
    done: Arc<AtomicBool>,
    /// Taken by `wait`
    task: Option<JoinHandle<PatrolReport>>,
}

impl ActivePatrol {
    fn is_running(&self) -> bool {
        !self.stop.is_cancelled() && !self.done.load(Ordering::Acquire)
    }
}

/// Entry point for patrol modes: at most one patrol runs at a time.
pub struct PatrolController {
    executor: Arc<PatrolExecutor>,
    book: RouteBook,
    active: Mutex<Option<ActivePatrol>>,
    next_id: AtomicU64,
}

impl PatrolController {
    pub fn new(
        nav: Arc<dyn NavigationService>,
        announcer: Arc<dyn Announcer>,
        log: Arc<dyn LogSink>,
        book: RouteBook,
    ) -> Self {
        let executor = PatrolExecutor::new(nav, announcer, log, book.executor.clone());
        Self::with_executor(executor, book)
    }

    pub fn with_executor(executor: PatrolExecutor, book: RouteBook) -> Self {
        Self {
            executor: Arc::new(executor),
            book,
            active: Mutex::new(None),
            next_id: AtomicU64::new(0),
        }
    }

    /// Build a controller whose executor reports into `metrics`.
    pub fn with_metrics(
        nav: Arc<dyn NavigationService>,
        announcer: Arc<dyn Announcer>,
        log: Arc<dyn LogSink>,
        book: RouteBook,
        metrics: PatrolMetrics,
    ) -> Self {
        let executor =
            PatrolExecutor::new(nav, announcer, log, book.executor.clone()).with_metrics(metrics);
        Self::with_executor(executor, book)
    }

    pub fn routes(&self) -> &RouteBook {
        &self.book
    }

    /// Compile `route` and start patrolling it on a background task.
    ///
    /// Compilation errors are returned before anything moves. Must be called
    /// from within a tokio runtime.
    pub fn start_patrol(&self, route: Route) -> Result<()> {
        let plan = self.book.plan(route)?;

        let mut active = self.active.lock();
        if let Some(current) = active.as_ref() {
            if current.is_running() {
                warn!(
                    "Refusing to start {} while {} patrol is active",
                    route, current.route
                );
                return Err(PatrolError::AlreadyActive(current.route.to_string()));
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let stop = CancellationToken::new();
        let executor = Arc::clone(&self.executor);
        let task_stop = stop.clone();
        let done = Arc::new(AtomicBool::new(false));
        let flag = CompletionFlag(Arc::clone(&done));
        let task = tokio::spawn(async move {
            let _flag = flag;
            executor.launch(&plan, &task_stop).await
        });

        info!("Patrol {} requested on route {}", id, route);
        *active = Some(ActivePatrol {
            id,
            route,
            stop,
            done,
            task: Some(task),
        });
        Ok(())
    }

    /// Cancel the active patrol, if any. Safe to call at any time.
    ///
    /// Returns whether a running patrol was signalled.
    pub fn stop_patrol(&self) -> bool {
        let active = self.active.lock();
        match active.as_ref() {
            Some(current) if current.is_running() => {
                info!("Stopping {} patrol", current.route);
                current.stop.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().as_ref().is_some_and(|a| a.is_running())
    }

    pub fn active_route(&self) -> Option<Route> {
        self.active
            .lock()
            .as_ref()
            .filter(|a| a.is_running())
            .map(|a| a.route)
    }

    /// Wait for the current patrol to end and return its report.
    ///
    /// `None` when no patrol was started or its report was already taken,
    /// including by an earlier `wait` that was dropped before completing.
    pub async fn wait(&self) -> Option<PatrolReport> {
        let (id, task) = {
            let mut active = self.active.lock();
            let current = active.as_mut()?;
            (current.id, current.task.take()?)
        };

        let report = match task.await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!("Patrol task ended abnormally: {}", e);
                None
            }
        };

        let mut active = self.active.lock();
        if active.as_ref().is_some_and(|a| a.id == id) {
            *active = None;
        }
        report
    }
}

impl Drop for PatrolController {
    fn drop(&mut self) {
        if let Some(current) = self.active.get_mut().as_ref() {
            current.stop.cancel();
        }
    }
}
