//! QueueDriver - キューを専用スレッドで所有する実行コンテキスト
//!
//! `TaskQueue` は `!Send` なので、マルチスレッドのホストからは直接触れない。
//! driver はスレッドを 1 本立て、その上の current-thread runtime でキューを
//! 生成・所有する。外からは `Send` なジョブを mpsc で送り、結果は oneshot で返る。
//!
//! - `shutdown()` / drop で停止し、スレッドを join する
//! - ジョブが panic するとスレッドごと止まり、以降は `DriverClosed`

use std::io;
use std::rc::Rc;
use std::thread;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::LocalSet;
use tracing::{debug, warn};

use crate::config::{GlobalOptions, QueueOptions, Settings};
use crate::error::QueueError;
use crate::observability::{FlushStats, QueueStats};
use crate::queue::TaskQueue;

/// Independent named queues sharing one `GlobalOptions`.
///
/// Queues are kept in declaration order. Flushing one never touches another.
#[derive(Debug)]
pub struct QueueSet {
    global: Rc<GlobalOptions>,
    queues: Vec<TaskQueue>,
}

impl QueueSet {
    pub fn new(global: GlobalOptions) -> Self {
        Self {
            global: Rc::new(global),
            queues: Vec::new(),
        }
    }

    /// One queue per configured name, without hooks.
    pub fn from_settings(settings: &Settings) -> Self {
        let mut set = Self::new(GlobalOptions::from(settings));
        for name in &settings.queues {
            set.insert(name.clone(), QueueOptions::new());
        }
        set
    }

    /// Create a queue, replacing any queue of the same name.
    pub fn insert(&mut self, name: impl Into<String>, options: QueueOptions) -> TaskQueue {
        let queue = TaskQueue::new(name, options, Rc::clone(&self.global));
        match self.queues.iter_mut().find(|q| q.name() == queue.name()) {
            Some(slot) => *slot = queue.clone(),
            None => self.queues.push(queue.clone()),
        }
        queue
    }

    pub fn with_queue(mut self, name: impl Into<String>, options: QueueOptions) -> Self {
        self.insert(name, options);
        self
    }

    pub fn get(&self, name: &str) -> Option<&TaskQueue> {
        self.queues.iter().find(|q| q.name() == name)
    }

    pub fn require(&self, name: &str) -> Result<&TaskQueue, QueueError> {
        self.get(name)
            .ok_or_else(|| QueueError::UnknownQueue(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.queues.iter().map(|q| q.name().to_string()).collect()
    }
}

type Job = Box<dyn FnOnce(&QueueSet) + Send>;

/// Handle to the thread that owns a `QueueSet`.
pub struct QueueDriver {
    jobs: mpsc::UnboundedSender<Job>,
    shutdown_tx: watch::Sender<bool>,
    thread: Option<thread::JoinHandle<()>>,
    continue_if_more: bool,
}

impl QueueDriver {
    /// Start the driver thread. `init` runs on that thread and builds the
    /// queues, so it may install hooks and error handlers that are not `Send`.
    pub fn spawn<F>(settings: Settings, init: F) -> io::Result<Self>
    where
        F: FnOnce(&Settings) -> QueueSet + Send + 'static,
    {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let (jobs, mut jobs_rx) = mpsc::unbounded_channel::<Job>();
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let continue_if_more = settings.continue_if_more;

        let thread = thread::Builder::new()
            .name("deferq-driver".to_string())
            .spawn(move || {
                let local = LocalSet::new();
                local.block_on(&runtime, async move {
                    let queues = init(&settings);
                    debug!(queues = ?queues.names(), "queue driver started");

                    loop {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                        tokio::select! {
                            changed = shutdown_rx.changed() => {
                                if changed.is_err() {
                                    break;
                                }
                            }
                            job = jobs_rx.recv() => match job {
                                Some(job) => job(&queues),
                                None => break,
                            },
                        }
                    }

                    debug!("queue driver stopped");
                });
            })?;

        Ok(Self {
            jobs,
            shutdown_tx,
            thread: Some(thread),
            continue_if_more,
        })
    }

    /// Run `job` on the driver thread and wait for its result.
    pub async fn run<R, F>(&self, job: F) -> Result<R, QueueError>
    where
        F: FnOnce(&QueueSet) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |queues| {
            // the caller may have stopped waiting
            let _ = reply_tx.send(job(queues));
        });
        self.jobs.send(job).map_err(|_| QueueError::DriverClosed)?;
        reply_rx.await.map_err(|_| QueueError::DriverClosed)
    }

    /// Flush one queue. `None` uses the configured `continue_if_more`.
    pub async fn flush(
        &self,
        queue: &str,
        continue_if_more: Option<bool>,
    ) -> Result<FlushStats, QueueError> {
        let name = queue.to_string();
        let continue_if_more = continue_if_more.unwrap_or(self.continue_if_more);
        self.run(move |queues| queues.require(&name)?.flush(continue_if_more))
            .await?
    }

    pub async fn stats(&self, queue: &str) -> Result<QueueStats, QueueError> {
        let name = queue.to_string();
        self.run(move |queues| queues.require(&name).map(TaskQueue::stats))
            .await?
    }

    pub fn request_shutdown(&self) {
        // ignore send error: the driver may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Stop the driver and wait for its thread. Blocks the caller.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.request_shutdown();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("queue driver thread panicked");
            }
        }
    }
}

impl Drop for QueueDriver {
    fn drop(&mut self) {
        self.stop();
    }
}
