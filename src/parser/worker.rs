//! Per-service parser worker.
//!
//! Each service of the chain runs on its own task consuming its own queue.
//! A worker marks step completion and maintains the retry counter around
//! the service's `run`, then reports the outcome to the parser dispatcher
//! which decides where the item goes next.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::db::tasks::{step, TaskRecord};
use crate::db::Database;

use super::item::Item;
use super::{ParserEvent, ParserService, Status};

struct WorkerState {
    queue: Mutex<VecDeque<Item>>,
    notify: Notify,
    paused: AtomicBool,
    stopped: AtomicBool,
    idle: AtomicBool,
    idle_notify: Notify,
}

pub(crate) struct Worker {
    index: usize,
    service: Arc<dyn ParserService>,
    state: Arc<WorkerState>,
    events: mpsc::UnboundedSender<ParserEvent>,
    handle: Mutex<Option<JoinHandle<()>>>,
    db: Database,
}

impl Worker {
    pub(crate) fn new(
        index: usize,
        service: Arc<dyn ParserService>,
        db: Database,
        events: mpsc::UnboundedSender<ParserEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            index,
            service,
            state: Arc::new(WorkerState {
                queue: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
                paused: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                idle: AtomicBool::new(true),
                idle_notify: Notify::new(),
            }),
            events,
            handle: Mutex::new(None),
            db,
        })
    }

    pub(crate) fn start(self: &Arc<Self>) {
        let worker = self.clone();
        let handle = tokio::spawn(async move { worker.mainloop().await });
        *self.handle.lock() = Some(handle);
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.state.idle.load(Ordering::Acquire)
    }

    pub(crate) fn pause(&self) {
        self.state.paused.store(true, Ordering::Release);
    }

    pub(crate) fn resume(&self) {
        self.state.paused.store(false, Ordering::Release);
        self.state.notify.notify_one();
    }

    /// Queue an item. The worker leaves idle state immediately so the
    /// aggregate idle flag does not flicker while the item waits for the
    /// task to wake up.
    pub(crate) fn push(&self, item: Item) {
        self.set_idle(false);
        self.state.queue.lock().push_back(item);
        self.state.notify.notify_one();
    }

    /// Non-blocking stop request; the service is asked to interrupt its
    /// current run.
    pub(crate) fn signal_stop(&self) {
        self.state.stopped.store(true, Ordering::Release);
        self.state.notify.notify_one();
        self.service.stop();
    }

    pub(crate) async fn join(&self) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Wait for the worker to drain its current item, then drop the queue
    /// and let the service flush. Callers pause the worker first.
    pub(crate) async fn flush(&self) {
        debug_assert!(self.state.paused.load(Ordering::Acquire));
        while !self.is_idle() {
            self.state.idle_notify.notified().await;
        }
        self.state.queue.lock().clear();
        self.service.on_flushing();
    }

    pub(crate) fn restart(&self) {
        self.service.on_restarted();
    }

    fn set_idle(&self, idle: bool) {
        if self.state.idle.swap(idle, Ordering::AcqRel) != idle {
            let _ = self.events.send(ParserEvent::IdleChanged {
                worker: self.index,
                idle,
            });
        }
        if idle {
            self.state.idle_notify.notify_one();
        }
    }

    async fn mainloop(self: Arc<Self>) {
        let service_name = self.service.name().to_string();
        info!(service = %service_name, "Entering parser service");
        loop {
            if self.state.stopped.load(Ordering::Acquire) {
                break;
            }
            let item = if self.state.paused.load(Ordering::Acquire) {
                None
            } else {
                self.state.queue.lock().pop_front()
            };
            let Some(mut item) = item else {
                debug!(service = %service_name, "Halting parser service mainloop");
                self.set_idle(true);
                self.state.notify.notified().await;
                debug!(service = %service_name, "Resuming parser service mainloop");
                continue;
            };
            self.set_idle(false);

            if item.task.is_step_completed(self.service.targeted_step()) {
                debug!(service = %service_name, mrl = %item.mrl(), "Skipping completed step");
                let _ = self.events.send(ParserEvent::Done {
                    item,
                    status: Status::Success,
                });
                continue;
            }

            let status = self.process(&mut item).await;
            let _ = self.events.send(ParserEvent::Done { item, status });
        }
        info!(service = %service_name, "Exiting parser service");
        self.set_idle(true);
    }

    async fn process(&self, item: &mut Item) -> Status {
        // Files on a removable device that is currently absent are parked
        // until the device comes back.
        if let Some(file) = item.file.clone().filter(|f| f.is_removable) {
            if let Some(folder_id) = file.folder_id {
                match self.db.folders().is_present(folder_id).await {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!(
                            mrl = %item.mrl(),
                            "Postponing parsing until the device gets mounted back"
                        );
                        return Status::TemporaryUnavailable;
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to check folder presence");
                        return Status::Fatal;
                    }
                }
            }
        }

        if let Err(e) = self.db.tasks().increment_retry_count(item.task.id_task).await {
            error!(error = %e, "Failed to persist retry count");
        } else {
            item.task.retry_count += 1;
        }

        let started = std::time::Instant::now();
        let status = self.service.run(item).await;
        debug!(
            service = self.service.name(),
            mrl = %item.mrl(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            ?status,
            "Service run finished"
        );

        if let Err(e) = self.handle_service_result(&mut item.task, status).await {
            error!(error = %e, "Failed to persist service result");
            return Status::Fatal;
        }
        status
    }

    async fn handle_service_result(
        &self,
        task: &mut TaskRecord,
        status: Status,
    ) -> crate::error::Result<()> {
        match status {
            Status::Success => {
                task.step |= self.service.targeted_step();
                if self.service.targeted_step() != step::METADATA_EXTRACTION {
                    self.db
                        .tasks()
                        .save_step(task.id_task, self.service.targeted_step())
                        .await?;
                    self.db.tasks().reset_retry_count(task.id_task).await?;
                    task.retry_count = 0;
                } else {
                    // Extraction has no database side effect; its step is
                    // not persisted so a restart redoes it. The retry count
                    // is decremented rather than reset, otherwise an
                    // extract/analyze crash loop would never exhaust the
                    // retry budget.
                    self.db.tasks().decrement_retry_count(task.id_task).await?;
                    task.retry_count = (task.retry_count - 1).max(0);
                }
            }
            Status::Completed => {
                task.step |= step::COMPLETED;
                self.db.tasks().save_step(task.id_task, step::COMPLETED).await?;
            }
            Status::Discarded => {
                self.db.tasks().destroy(task.id_task).await?;
            }
            Status::TemporaryUnavailable
            | Status::Fatal
            | Status::Requeue => {}
        }
        Ok(())
    }
}
