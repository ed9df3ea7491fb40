//! Dependency-ordered task graph
//!
//! Each task moves through Pending -> Ready -> Running -> Completed. A task
//! becomes Ready once every dependency is Completed, and completion listeners
//! run on the driving thread before any dependent is promoted. In cooperative
//! mode work runs on the rayon pool and finished tasks report back over a
//! channel that [`TaskGraph::tick`] drains without blocking.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

use crate::error::{ImportError, Result};

pub type TaskId = usize;

type Work<C> = Box<dyn FnOnce(&C) + Send>;
type Listener<C> = Box<dyn FnOnce(&C) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Ready,
    Running,
    Completed,
}

/// Shared flag checked before any new task starts
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Snapshot of task counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub total: usize,
    pub completed: usize,
    pub running: usize,
}

impl Progress {
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f32 / self.total as f32
        }
    }

    pub fn is_done(&self) -> bool {
        self.completed == self.total
    }
}

struct Task<C> {
    name: &'static str,
    dependencies: Vec<TaskId>,
    state: TaskState,
    work: Option<Work<C>>,
    listeners: Vec<Listener<C>>,
    panicked: bool,
}

/// Message sent by a worker when its task returns or panics
struct Completion {
    id: TaskId,
    panic: Option<String>,
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run one unit of work, turning a panic into a message
fn run_guarded<C>(work: Work<C>, context: &C) -> Option<String> {
    panic::catch_unwind(AssertUnwindSafe(|| work(context)))
        .err()
        .map(panic_message)
}

/// Tasks sharing one context `C`. Tasks write their output into the context;
/// dependencies guarantee each reader runs after the writer.
pub struct TaskGraph<C: Send + Sync + 'static> {
    context: Arc<C>,
    tasks: Vec<Task<C>>,
    sender: mpsc::Sender<Completion>,
    receiver: mpsc::Receiver<Completion>,
    cancel: CancellationToken,
    running: usize,
}

impl<C: Send + Sync + 'static> TaskGraph<C> {
    pub fn new(context: Arc<C>, cancel: CancellationToken) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            context,
            tasks: Vec::new(),
            sender,
            receiver,
            cancel,
            running: 0,
        }
    }

    /// Add a task. Dependencies must already be in the graph, which keeps it
    /// acyclic by construction.
    pub fn add(
        &mut self,
        name: &'static str,
        dependencies: &[TaskId],
        work: impl FnOnce(&C) + Send + 'static,
    ) -> TaskId {
        let id = self.tasks.len();
        let dependencies: Vec<TaskId> = dependencies
            .iter()
            .copied()
            .filter(|&d| {
                let ok = d < id;
                if !ok {
                    tracing::error!("Task '{}' depends on unknown task {}", name, d);
                }
                ok
            })
            .collect();
        self.tasks.push(Task {
            name,
            dependencies,
            state: TaskState::Pending,
            work: Some(Box::new(work)),
            listeners: Vec::new(),
            panicked: false,
        });
        id
    }

    /// Run `listener` on the driving thread once `task` completes
    pub fn on_complete(&mut self, task: TaskId, listener: impl FnOnce(&C) + Send + 'static) {
        if let Some(t) = self.tasks.get_mut(task) {
            t.listeners.push(Box::new(listener));
        }
    }

    pub fn context(&self) -> &Arc<C> {
        &self.context
    }

    /// Take the context back once no worker holds it
    pub fn into_context(self) -> std::result::Result<C, Arc<C>> {
        Arc::try_unwrap(self.context)
    }

    pub fn state(&self, task: TaskId) -> Option<TaskState> {
        self.tasks.get(task).map(|t| t.state)
    }

    pub fn name(&self, task: TaskId) -> Option<&'static str> {
        self.tasks.get(task).map(|t| t.name)
    }

    /// Whether the task's work panicked
    pub fn panicked(&self, task: TaskId) -> bool {
        self.tasks.get(task).is_some_and(|t| t.panicked)
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn progress(&self) -> Progress {
        Progress {
            total: self.tasks.len(),
            completed: self
                .tasks
                .iter()
                .filter(|t| t.state == TaskState::Completed)
                .count(),
            running: self.running,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.progress().is_done()
    }

    /// Promote Pending tasks whose dependencies are all Completed
    fn promote(&mut self) {
        for i in 0..self.tasks.len() {
            if self.tasks[i].state != TaskState::Pending {
                continue;
            }
            let ready = self.tasks[i]
                .dependencies
                .iter()
                .all(|&d| self.tasks[d].state == TaskState::Completed);
            if ready {
                self.tasks[i].state = TaskState::Ready;
            }
        }
    }

    fn complete(&mut self, id: TaskId, panic: Option<String>) {
        let task = &mut self.tasks[id];
        task.state = TaskState::Completed;
        if let Some(message) = panic {
            task.panicked = true;
            tracing::error!("Task '{}' panicked: {}", task.name, message);
        } else {
            tracing::debug!("Task '{}' completed", task.name);
        }
        let listeners = std::mem::take(&mut task.listeners);
        for listener in listeners {
            if let Some(message) = run_guarded(listener, self.context.as_ref()) {
                tracing::error!("Listener of task '{}' panicked: {}", self.tasks[id].name, message);
            }
        }
    }

    /// Evaluate the outcome once nothing can start anymore
    fn settle(&self) -> Result<Option<Progress>> {
        let progress = self.progress();
        if progress.is_done() {
            return Ok(Some(progress));
        }
        if self.running > 0 {
            return Ok(None);
        }
        if self.cancel.is_cancelled() {
            return Err(ImportError::Cancelled);
        }
        let waiting = self.tasks.iter().any(|t| t.state == TaskState::Ready);
        if waiting {
            return Ok(None);
        }
        let stuck: Vec<&str> = self
            .tasks
            .iter()
            .filter(|t| t.state != TaskState::Completed)
            .map(|t| t.name)
            .collect();
        Err(ImportError::Stalled(stuck.join(", ")))
    }

    /// One cooperative scheduling step. Never blocks.
    ///
    /// Returns `Ok(Some(progress))` once every task is Completed and
    /// `Ok(None)` while work remains.
    pub fn tick(&mut self) -> Result<Option<Progress>> {
        while let Ok(Completion { id, panic }) = self.receiver.try_recv() {
            self.running = self.running.saturating_sub(1);
            self.complete(id, panic);
        }

        if !self.cancel.is_cancelled() {
            self.promote();
            for id in 0..self.tasks.len() {
                if self.tasks[id].state != TaskState::Ready {
                    continue;
                }
                let Some(work) = self.tasks[id].work.take() else {
                    continue;
                };
                self.tasks[id].state = TaskState::Running;
                self.running += 1;
                tracing::debug!("Task '{}' started", self.tasks[id].name);

                let context = Arc::clone(&self.context);
                let sender = self.sender.clone();
                rayon::spawn(move || {
                    let panic = run_guarded(work, context.as_ref());
                    // Release the context before reporting so a finished
                    // graph holds the only reference
                    drop(context);
                    // The receiver is gone only if the job was dropped
                    let _ = sender.send(Completion { id, panic });
                });
            }
        }

        self.settle()
    }

    /// Run every task to completion on the calling thread, in dependency
    /// order.
    pub fn run_sync(&mut self) -> Result<Progress> {
        loop {
            if self.cancel.is_cancelled() {
                return match self.settle()? {
                    Some(progress) => Ok(progress),
                    None => Err(ImportError::Cancelled),
                };
            }
            self.promote();
            let next = self
                .tasks
                .iter()
                .position(|t| t.state == TaskState::Ready);
            let Some(id) = next else {
                return match self.settle()? {
                    Some(progress) => Ok(progress),
                    None => Err(ImportError::Stalled("no runnable task".into())),
                };
            };

            self.tasks[id].state = TaskState::Running;
            tracing::debug!("Task '{}' started", self.tasks[id].name);
            let panic = match self.tasks[id].work.take() {
                Some(work) => run_guarded(work, self.context.as_ref()),
                None => None,
            };
            self.complete(id, panic);
        }
    }
}
