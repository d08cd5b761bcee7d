//! Keyed supervised tasks with cooperative cancellation.
//!
//! Each long-running task (one per imposter listener) is registered under a
//! key. Starting a task under an existing key cancels the old one first;
//! completed tasks deregister themselves so `is_running` reflects liveness.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

struct TaskSlot {
    token: CancellationToken,
    generation: u64,
}

#[derive(Default)]
pub struct TaskManager {
    tasks: Mutex<HashMap<String, TaskSlot>>,
    next_generation: Mutex<u64>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Launch a supervised task under `id`, cancelling any task already
    /// registered there. The task receives a cancellation token and must
    /// exit promptly once it fires.
    pub fn start<F, Fut>(self: &Arc<Self>, id: &str, make_task: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.stop(id);

        let token = CancellationToken::new();
        let generation = {
            let mut next = self.next_generation.lock();
            *next += 1;
            *next
        };
        self.tasks.lock().insert(
            id.to_string(),
            TaskSlot {
                token: token.clone(),
                generation,
            },
        );

        let task = make_task(token);
        let manager = Arc::clone(self);
        let key = id.to_string();
        tokio::spawn(async move {
            task.await;
            // Deregister, unless a newer task already took the key.
            let mut tasks = manager.tasks.lock();
            if tasks.get(&key).map(|slot| slot.generation) == Some(generation) {
                tasks.remove(&key);
            }
            debug!("Task {} finished", key);
        });
    }

    /// Cancel and deregister. Returns whether a task was present. Idempotent.
    pub fn stop(&self, id: &str) -> bool {
        match self.tasks.lock().remove(id) {
            Some(slot) => {
                slot.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.tasks.lock().contains_key(id)
    }

    pub fn running_count(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Cancel every task.
    pub fn shutdown(&self) {
        let mut tasks = self.tasks.lock();
        for (_, slot) in tasks.drain() {
            slot.token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_start_and_is_running() {
        let manager = Arc::new(TaskManager::new());
        manager.start("a", |token| async move {
            token.cancelled().await;
        });
        assert!(manager.is_running("a"));
        assert!(!manager.is_running("b"));
    }

    #[tokio::test]
    async fn test_stop_cancels_and_removes() {
        let manager = Arc::new(TaskManager::new());
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        manager.start("a", |token| async move {
            token.cancelled().await;
            let _ = tx.send(());
        });

        assert!(manager.stop("a"));
        assert!(!manager.is_running("a"));
        // The task observed cancellation.
        tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let manager = Arc::new(TaskManager::new());
        manager.start("a", |token| async move {
            token.cancelled().await;
        });
        assert!(manager.stop("a"));
        assert!(!manager.stop("a"));
        assert!(!manager.is_running("a"));
    }

    #[tokio::test]
    async fn test_restart_cancels_previous() {
        let manager = Arc::new(TaskManager::new());
        let (tx1, rx1) = tokio::sync::oneshot::channel::<()>();
        manager.start("a", |token| async move {
            token.cancelled().await;
            let _ = tx1.send(());
        });

        manager.start("a", |token| async move {
            token.cancelled().await;
        });

        // First task was cancelled by the restart.
        tokio::time::timeout(Duration::from_secs(1), rx1)
            .await
            .unwrap()
            .unwrap();
        assert!(manager.is_running("a"));
    }

    #[tokio::test]
    async fn test_completed_task_deregisters() {
        let manager = Arc::new(TaskManager::new());
        manager.start("a", |_token| async move {});
        // Give the supervisor a moment to observe completion.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!manager.is_running("a"));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_all() {
        let manager = Arc::new(TaskManager::new());
        manager.start("a", |token| async move { token.cancelled().await });
        manager.start("b", |token| async move { token.cancelled().await });
        assert_eq!(manager.running_count(), 2);
        manager.shutdown();
        assert_eq!(manager.running_count(), 0);
    }
}
