use dagcore::NodeId;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

/// Handle to a node task; cloneable and awaitable by any number of dependents
pub type TaskHandle<T> = Shared<BoxFuture<'static, T>>;

/// Per-run map from node id to its task handle.
///
/// The first request for an id spawns the task; later requests get a clone
/// of the same handle, so each node runs at most once per run no matter how
/// many dependents ask for it.
pub struct TaskMemo<T: Clone + Send + Sync + 'static> {
    handles: Mutex<HashMap<NodeId, TaskHandle<T>>>,
}

impl<T: Clone + Send + Sync + 'static> TaskMemo<T> {
    pub fn new() -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Return the handle for `node_id`, spawning `start()` onto the tokio
    /// runtime if this is the first request. `on_panic` turns a panicked
    /// task into a value so dependents still resolve.
    pub fn get_or_spawn<F, Fut>(
        &self,
        node_id: &str,
        start: F,
        on_panic: fn(String) -> T,
    ) -> TaskHandle<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = handles.get(node_id) {
            return handle.clone();
        }

        let join = tokio::spawn(start());
        let handle = async move {
            match join.await {
                Ok(value) => value,
                Err(e) => on_panic(e.to_string()),
            }
        }
        .boxed()
        .shared();

        handles.insert(node_id.to_string(), handle.clone());
        handle
    }

    /// Handles of every node scheduled so far
    pub fn scheduled(&self) -> Vec<(NodeId, TaskHandle<T>)> {
        self.handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(id, handle)| (id.clone(), handle.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handles.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone + Send + Sync + 'static> Default for TaskMemo<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn second_request_reuses_the_first_task() {
        let memo: TaskMemo<usize> = TaskMemo::new();
        let starts = Arc::new(AtomicUsize::new(0));

        let first = {
            let starts = starts.clone();
            memo.get_or_spawn(
                "a",
                move || async move { starts.fetch_add(1, Ordering::SeqCst) + 41 },
                |_| 0,
            )
        };
        let second = {
            let starts = starts.clone();
            memo.get_or_spawn(
                "a",
                move || async move { starts.fetch_add(1, Ordering::SeqCst) + 100 },
                |_| 0,
            )
        };

        assert_eq!(first.await, 41);
        assert_eq!(second.await, 41);
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(memo.len(), 1);
    }

    #[tokio::test]
    async fn panicking_task_resolves_through_fallback() {
        let memo: TaskMemo<String> = TaskMemo::new();
        let handle = memo.get_or_spawn(
            "boom",
            || async {
                if true {
                    panic!("node exploded");
                }
                String::new()
            },
            |message| format!("panicked: {}", message),
        );
        assert!(handle.await.starts_with("panicked:"));
    }
}
