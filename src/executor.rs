use parking_lot::Mutex;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Handle to a recurring background task
pub struct ScheduledTask {
    name: String,
    token: CancellationToken,
}

impl ScheduledTask {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop the task. A tick already running finishes, no further tick starts.
    pub fn cancel(&self) {
        debug!("Cancelling scheduled task '{}'", self.name);
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Owner of the background tasks spawned on behalf of an application
pub struct ExecutorRepository {
    runtime: Handle,
    root: CancellationToken,
    tasks: Mutex<Vec<(String, JoinHandle<()>)>>,
}

impl ExecutorRepository {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            root: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Run `task` after `initial_delay`, then again `delay` after each run finishes,
    /// until the task breaks, the handle is cancelled or the repository is destroyed.
    pub fn schedule_with_fixed_delay<F>(
        &self,
        name: &str,
        initial_delay: Duration,
        delay: Duration,
        mut task: F,
    ) -> ScheduledTask
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let token = self.root.child_token();
        let task_token = token.clone();
        let task_name = name.to_string();

        let handle = self.runtime.spawn(async move {
            let mut wait = initial_delay;
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = tokio::time::sleep(wait) => {}
                }
                if task_token.is_cancelled() {
                    break;
                }
                if task().is_break() {
                    break;
                }
                wait = delay;
            }
            debug!("Scheduled task '{}' finished", task_name);
        });

        let mut tasks = self.tasks.lock();
        tasks.retain(|(_, handle)| !handle.is_finished());
        tasks.push((name.to_string(), handle));

        ScheduledTask {
            name: name.to_string(),
            token,
        }
    }

    /// Number of owned tasks still running
    pub fn active_tasks(&self) -> usize {
        self.tasks
            .lock()
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .count()
    }

    pub fn is_destroyed(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Cancel and abort every owned task
    pub fn destroy_all(&self) {
        self.root.cancel();
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for (name, handle) in tasks {
            debug!("Aborting background task '{}'", name);
            handle.abort();
        }
    }
}
