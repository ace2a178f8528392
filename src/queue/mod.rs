use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::provider::{DynExecutor, ExecutionOutcome, ExecutionRequest};

pub type TaskId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueTask {
    pub id: TaskId,
    pub prompt: String,
    pub status: TaskStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
    /// Bumped on every submission of this id; only the latest run may write.
    #[serde(skip)]
    generation: u64,
}

impl QueueTask {
    fn queued(id: TaskId, prompt: String, generation: u64) -> Self {
        Self {
            id,
            prompt,
            status: TaskStatus::Queued,
            progress: 0,
            result: None,
            execution_time_ms: None,
            generation,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// The execution outcome of a finished task, rebuilt from its entry.
    pub fn outcome(&self) -> Option<ExecutionOutcome> {
        let ms = self.execution_time_ms.unwrap_or_default();
        match self.status {
            TaskStatus::Completed => Some(ExecutionOutcome::ok(self.result.clone().unwrap_or_default(), ms)),
            TaskStatus::Failed => Some(ExecutionOutcome::failed(self.result.clone().unwrap_or_default(), ms)),
            TaskStatus::Queued | TaskStatus::Running => None,
        }
    }
}

type Tasks = Arc<Mutex<BTreeMap<TaskId, QueueTask>>>;

/// Tracks independent prompt executions by caller-assigned id. Each
/// submission runs on its own tokio task; nothing is shared between them
/// except the status table.
pub struct TaskQueue {
    executor: DynExecutor,
    tasks: Tasks,
    order: Mutex<Vec<TaskId>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskQueue {
    pub fn new(executor: DynExecutor) -> Self {
        Self {
            executor,
            tasks: Arc::new(Mutex::new(BTreeMap::new())),
            order: Mutex::new(Vec::new()),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Starts executing `req` in the background. Resubmitting an id that is
    /// still tracked replaces its entry; a run started by an earlier
    /// submission still completes but its result is discarded.
    pub fn submit(&self, id: TaskId, req: ExecutionRequest) {
        let generation = {
            let mut tasks = self.tasks.lock();
            let generation = tasks.get(&id).map_or(0, |t| t.generation + 1);
            if tasks.insert(id, QueueTask::queued(id, req.prompt.clone(), generation)).is_none() {
                self.order.lock().push(id);
            }
            generation
        };
        tracing::debug!(task = %id, generation, "task queued");

        let tasks = Arc::clone(&self.tasks);
        let executor = Arc::clone(&self.executor);
        let handle = tokio::spawn(async move {
            update(&tasks, id, generation, |t| {
                t.status = TaskStatus::Running;
                t.progress = 10;
            });
            let outcome = executor.execute(&req).await;
            finish(&tasks, id, generation, outcome);
        });
        self.handles.lock().push(handle);
    }

    pub fn get(&self, id: TaskId) -> Option<QueueTask> {
        self.tasks.lock().get(&id).cloned()
    }

    /// All tasks in submission order.
    pub fn snapshot(&self) -> Vec<QueueTask> {
        let tasks = self.tasks.lock();
        self.order.lock().iter().filter_map(|id| tasks.get(id).cloned()).collect()
    }

    /// Waits for every task submitted so far.
    pub async fn wait_all(&self) -> Vec<QueueTask> {
        let handles: Vec<_> = std::mem::take(&mut *self.handles.lock());
        for joined in join_all(handles).await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "queue task panicked");
            }
        }
        self.snapshot()
    }
}

/// Applies `f` only if the entry still belongs to `generation`.
fn update<F: FnOnce(&mut QueueTask)>(tasks: &Tasks, id: TaskId, generation: u64, f: F) -> bool {
    match tasks.lock().get_mut(&id) {
        Some(task) if task.generation == generation => {
            f(task);
            true
        }
        _ => false,
    }
}

fn finish(tasks: &Tasks, id: TaskId, generation: u64, outcome: ExecutionOutcome) {
    let applied = update(tasks, id, generation, |t| {
        t.progress = 100;
        t.execution_time_ms = Some(outcome.execution_time_ms);
        if outcome.success {
            t.status = TaskStatus::Completed;
            t.result = Some(outcome.response);
        } else {
            t.status = TaskStatus::Failed;
            t.result = outcome.error;
        }
    });
    if applied {
        tracing::debug!(task = %id, "task finished");
    } else {
        tracing::debug!(task = %id, generation, "discarding result of superseded run");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Executor;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Replies with the reversed prompt after a prompt-dependent delay, and
    /// fails for prompts starting with "fail".
    struct Reverser;

    #[async_trait]
    impl Executor for Reverser {
        async fn execute(&self, req: &ExecutionRequest) -> ExecutionOutcome {
            let delay = 40u64.saturating_sub(req.prompt.len() as u64 * 5);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            if req.prompt.starts_with("fail") {
                return ExecutionOutcome::failed("upstream 500", delay);
            }
            ExecutionOutcome::ok(req.prompt.chars().rev().collect(), delay)
        }
    }

    #[tokio::test]
    async fn results_route_back_by_id() {
        let queue = TaskQueue::new(Arc::new(Reverser));
        let ids: Vec<TaskId> = (0..3).map(|_| Uuid::new_v4()).collect();
        queue.submit(ids[0], ExecutionRequest::new("a"));
        queue.submit(ids[1], ExecutionRequest::new("abcde"));
        queue.submit(ids[2], ExecutionRequest::new("fail now"));

        let done = queue.wait_all().await;
        assert_eq!(done.iter().map(|t| t.id).collect::<Vec<_>>(), ids);
        assert!(done.iter().all(|t| t.is_finished() && t.progress == 100));

        assert_eq!(queue.get(ids[0]).unwrap().result.as_deref(), Some("a"));
        assert_eq!(queue.get(ids[1]).unwrap().result.as_deref(), Some("edcba"));
        let failed = queue.get(ids[2]).unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.result.as_deref(), Some("upstream 500"));
        assert_eq!(failed.outcome().unwrap().error.as_deref(), Some("upstream 500"));
        assert!(queue.get(ids[0]).unwrap().outcome().unwrap().success);
    }

    /// Answers after a delay given by the prompt's leading number of milliseconds.
    struct Timed;

    #[async_trait]
    impl Executor for Timed {
        async fn execute(&self, req: &ExecutionRequest) -> ExecutionOutcome {
            let (ms, word) = req.prompt.split_once(' ').unwrap_or(("0", req.prompt.as_str()));
            let ms: u64 = ms.parse().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            ExecutionOutcome::ok(format!("answer to {word}"), ms)
        }
    }

    #[tokio::test]
    async fn resubmitted_id_keeps_only_latest_result() {
        let queue = TaskQueue::new(Arc::new(Timed));
        let id = Uuid::new_v4();
        queue.submit(id, ExecutionRequest::new("120 first"));
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.submit(id, ExecutionRequest::new("5 second"));

        let done = queue.wait_all().await;
        assert_eq!(done.len(), 1);
        let task = queue.get(id).unwrap();
        assert_eq!(task.prompt, "5 second");
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.result.as_deref(), Some("answer to second"));
        assert_eq!(task.execution_time_ms, Some(5));
    }

    #[tokio::test]
    async fn unknown_id_and_empty_queue() {
        let queue = TaskQueue::new(Arc::new(Reverser));
        assert!(queue.get(Uuid::new_v4()).is_none());
        assert!(queue.wait_all().await.is_empty());
    }
}
