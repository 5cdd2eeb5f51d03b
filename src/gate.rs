//! Concurrency gate
//!
//! Runs a batch of tasks with at most `max_in_flight` executing at once.
//! Tasks start in submission order as slots free up, and results come back
//! indexed exactly like the input, whatever order the tasks finish in.

use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::error;

/// Per-task failure inside the gate
#[derive(Debug, Error)]
pub enum GateError {
    #[error("task {index} panicked: {message}")]
    TaskPanicked { index: usize, message: String },
    #[error("task {index} was cancelled")]
    TaskCancelled { index: usize },
}

/// Reusable bound on in-flight work
#[derive(Debug, Clone)]
pub struct Gate {
    semaphore: Arc<Semaphore>,
    max_in_flight: usize,
}

impl Gate {
    /// Create a gate admitting `max_in_flight` tasks at once (at least one)
    pub fn new(max_in_flight: usize) -> Self {
        let max_in_flight = max_in_flight.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_in_flight)),
            max_in_flight,
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Run `tasks`, returning one result per task at the task's input index.
    ///
    /// A failing task only fails its own slot; siblings keep running.
    pub async fn run<I, Fut, T>(&self, tasks: I) -> Vec<Result<T, GateError>>
    where
        I: IntoIterator<Item = Fut>,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let mut handles: Vec<Result<JoinHandle<T>, GateError>> = Vec::new();

        for (index, task) in tasks.into_iter().enumerate() {
            // Waiting here keeps admission in submission order
            let permit = match self.semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    handles.push(Err(GateError::TaskCancelled { index }));
                    continue;
                }
            };

            handles.push(Ok(tokio::spawn(async move {
                let _permit = permit;
                task.await
            })));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (index, handle) in handles.into_iter().enumerate() {
            let result = match handle {
                Ok(handle) => handle.await.map_err(|e| {
                    if e.is_panic() {
                        let message = panic_message(e.into_panic());
                        error!("Gated task {} panicked: {}", index, message);
                        GateError::TaskPanicked { index, message }
                    } else {
                        GateError::TaskCancelled { index }
                    }
                }),
                Err(e) => Err(e),
            };
            results.push(result);
        }

        results
    }
}

/// Run `tasks` through a fresh gate of size `max_in_flight`
pub async fn run_bounded<I, Fut, T>(max_in_flight: usize, tasks: I) -> Vec<Result<T, GateError>>
where
    I: IntoIterator<Item = Fut>,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    Gate::new(max_in_flight).run(tasks).await
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
