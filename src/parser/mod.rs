//! Parser pipeline.
//!
//! The parser owns one worker per service (extraction → analysis →
//! linking), dispatches items across them, tracks progress, and restores
//! uncompleted tasks on start and rescan. Completion persistence lives in
//! the workers; routing decisions live in the dispatcher here.

pub mod analysis;
pub mod extraction;
pub mod item;
pub mod link;
mod worker;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::callbacks::LibraryCallbacks;
use crate::db::tasks::{TaskRecord, TaskType, MAX_NB_RETRIES};
use crate::db::Database;
use crate::fs::holder::{FsHolder, FsHolderCallback};

pub use item::Item;

/// Outcome of one service run over one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The step succeeded; the item moves on to the next service.
    Success,
    /// The whole task is done, regardless of remaining services.
    Completed,
    /// The item cannot be processed right now (device away); it is parked
    /// without retry until the device reappears.
    TemporaryUnavailable,
    /// Unrecoverable for this task; give up on it.
    Fatal,
    /// The task is irrelevant and its row must be deleted.
    Discarded,
    /// Start over from the first service, if retries remain.
    Requeue,
}

/// One step of the parser chain.
#[async_trait]
pub trait ParserService: Send + Sync {
    fn name(&self) -> &str;

    /// The step flag this service completes (see [`crate::db::tasks::step`]).
    fn targeted_step(&self) -> i64;

    async fn run(&self, item: &mut Item) -> Status;

    /// The parser is flushing; drop any internal state tied to pending
    /// items.
    fn on_flushing(&self) {}

    /// A rescan begins.
    fn on_restarted(&self) {}

    /// Interrupt a blocking `run` if one is in progress.
    fn stop(&self) {}
}

pub(crate) enum ParserEvent {
    Done { item: Item, status: Status },
    IdleChanged { worker: usize, idle: bool },
    RefreshTaskList,
}

pub struct Parser {
    inner: Arc<ParserInner>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

struct ParserInner {
    db: Database,
    fs_holder: Arc<FsHolder>,
    workers: Vec<Arc<worker::Worker>>,
    callbacks: Arc<dyn LibraryCallbacks>,
    event_tx: mpsc::UnboundedSender<ParserEvent>,
    op_scheduled: AtomicU32,
    op_done: AtomicU32,
    idle: AtomicBool,
}

impl Parser {
    pub fn new(
        db: Database,
        fs_holder: Arc<FsHolder>,
        callbacks: Arc<dyn LibraryCallbacks>,
        services: Vec<Arc<dyn ParserService>>,
    ) -> Arc<Self> {
        assert!(!services.is_empty());
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let workers = services
            .into_iter()
            .enumerate()
            .map(|(index, service)| {
                worker::Worker::new(index, service, db.clone(), event_tx.clone())
            })
            .collect();
        let inner = Arc::new(ParserInner {
            db,
            fs_holder,
            workers,
            callbacks,
            event_tx,
            op_scheduled: AtomicU32::new(0),
            op_done: AtomicU32::new(0),
            idle: AtomicBool::new(true),
        });
        let parser = Arc::new(Self {
            inner: inner.clone(),
            dispatcher: Mutex::new(None),
        });
        let handle = tokio::spawn(dispatch_loop(inner, event_rx));
        *parser.dispatcher.lock() = Some(handle);
        parser
    }

    /// Start the workers, register for device transitions, and resume any
    /// uncompleted task.
    pub async fn start(self: &Arc<Self>) {
        for worker in &self.inner.workers {
            worker.start();
        }
        let callback: Arc<dyn FsHolderCallback> = self.inner.clone();
        self.inner.fs_holder.register_callback(callback);
        self.inner.restore().await;
    }

    /// Queue a freshly created task on the first service.
    pub fn parse(&self, task: TaskRecord) {
        self.inner.schedule(Item::new(task));
    }

    pub fn pause(&self) {
        for worker in &self.inner.workers {
            worker.pause();
        }
    }

    pub fn resume(&self) {
        for worker in &self.inner.workers {
            worker.resume();
        }
    }

    pub fn is_idle(&self) -> bool {
        self.inner.idle.load(Ordering::Acquire)
    }

    /// Wait for every worker to drain, drop their queues, and reset the
    /// progress counters. Workers stay paused afterwards.
    pub async fn flush(&self) {
        self.pause();
        for worker in &self.inner.workers {
            worker.flush().await;
        }
        self.inner.op_done.store(0, Ordering::Release);
        self.inner.op_scheduled.store(0, Ordering::Release);
    }

    /// Restart services, re-fetch uncompleted tasks, and resume.
    pub async fn rescan(&self) {
        for worker in &self.inner.workers {
            worker.restart();
        }
        self.inner.restore().await;
        self.resume();
    }

    /// Stop every worker: signal, then join.
    pub async fn stop(&self) {
        for worker in &self.inner.workers {
            worker.signal_stop();
        }
        for worker in &self.inner.workers {
            worker.join().await;
        }
        if let Some(handle) = self.dispatcher.lock().take() {
            handle.abort();
        }
    }
}

impl ParserInner {
    fn schedule(&self, item: Item) {
        self.op_scheduled.fetch_add(1, Ordering::AcqRel);
        self.update_stats();
        self.workers[0].push(item);
    }

    /// Fetch every restorable task and queue it on the first service.
    async fn restore(&self) {
        let tasks = match self.db.tasks().fetch_uncompleted().await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(error = %e, "Failed to fetch uncompleted tasks");
                return;
            }
        };
        if tasks.is_empty() {
            debug!("No task to resume");
            return;
        }
        info!(count = tasks.len(), "Resuming parsing");
        for task in tasks {
            let mut item = Item::new(task);
            match item
                .restore_linked_entities(&self.db, &self.fs_holder)
                .await
            {
                Ok(true) => self.schedule(item),
                Ok(false) => {
                    debug!(mrl = %item.mrl(), "Dropping unrestorable task");
                }
                Err(e) => {
                    error!(mrl = %item.mrl(), error = %e, "Task restoration failed");
                }
            }
        }
    }

    fn finish_op(&self) {
        self.op_done.fetch_add(1, Ordering::AcqRel);
        self.update_stats();
    }

    /// Progress callback, throttled to every ten completions plus the
    /// final one.
    fn update_stats(&self) {
        let done = self.op_done.load(Ordering::Acquire);
        let scheduled = self.op_scheduled.load(Ordering::Acquire);
        if done % 10 == 0 || done == scheduled {
            debug!(done, scheduled, "Updating parser progress");
            self.callbacks.on_parsing_stats_updated(done, scheduled);
        }
    }

    fn refresh_task_list(&self) {
        let _ = self.event_tx.send(ParserEvent::RefreshTaskList);
    }
}

impl FsHolderCallback for ParserInner {
    fn on_device_reappearing(&self, _device_id: i64) {
        // Resume the tasks that were parked while the device was away.
        self.refresh_task_list();
    }

    fn on_device_disappearing(&self, _device_id: i64) {
        // The database was updated before this callback, so the restore
        // query filters the absent device's tasks out.
        self.refresh_task_list();
    }
}

async fn dispatch_loop(
    inner: Arc<ParserInner>,
    mut event_rx: mpsc::UnboundedReceiver<ParserEvent>,
) {
    while let Some(event) = event_rx.recv().await {
        match event {
            ParserEvent::Done { item, status } => handle_done(&inner, item, status),
            ParserEvent::IdleChanged { worker: _, idle } => {
                let global = idle && inner.workers.iter().all(|w| w.is_idle());
                if inner.idle.swap(global, Ordering::AcqRel) != global {
                    inner.callbacks.on_background_tasks_idle_changed(global);
                }
            }
            ParserEvent::RefreshTaskList => {
                for worker in &inner.workers {
                    worker.pause();
                }
                for worker in &inner.workers {
                    worker.flush().await;
                }
                inner.op_done.store(0, Ordering::Release);
                inner.op_scheduled.store(0, Ordering::Release);
                inner.restore().await;
                for worker in &inner.workers {
                    worker.resume();
                }
            }
        }
    }
}

fn handle_done(inner: &Arc<ParserInner>, mut item: Item, status: Status) {
    item.current_service += 1;

    let terminal = matches!(
        status,
        Status::TemporaryUnavailable | Status::Fatal | Status::Discarded
    ) || item.task.is_completed();
    if terminal {
        inner.finish_op();
        // Refresh tasks do not count toward mrl uniqueness forever: the
        // row is removed once done so a later refresh can be created.
        // Discarded tasks are already gone.
        if item.task.task_type == TaskType::Refresh && status != Status::Discarded {
            let db = inner.db.clone();
            let task_id = item.task.id_task;
            tokio::spawn(async move {
                let _ = db.tasks().destroy(task_id).await;
            });
        }
        return;
    }

    if status == Status::Requeue {
        // Requeues happen entirely at runtime, so the retry budget must be
        // enforced here as well as in the restore query.
        if item.task.retry_count > MAX_NB_RETRIES {
            inner.finish_op();
            return;
        }
        item.current_service = 0;
    }

    if item.current_service >= inner.workers.len() {
        inner.finish_op();
        return;
    }
    inner.workers[item.current_service].push(item);
}
