//! Worker pool that drains buffered entry ids through the pipeline.

use crate::error::{IngestError, Result};
use crate::pipeline::IngestionPipeline;
use crate::webhook::WebhookId;
use log::{debug, error};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// A fixed number of tokio tasks pulling entry ids from one shared queue.
///
/// Different entries run in parallel with no ordering between them.
pub struct WorkerPool {
    sender: mpsc::UnboundedSender<WebhookId>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `workers` tasks (at least one). Must be called inside a tokio
    /// runtime.
    pub fn spawn(pipeline: Arc<IngestionPipeline>, workers: usize) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..workers.max(1))
            .map(|worker_id| {
                let pipeline = pipeline.clone();
                let receiver = receiver.clone();
                tokio::spawn(run_worker(worker_id, pipeline, receiver))
            })
            .collect();

        WorkerPool { sender, workers }
    }

    /// Number of worker tasks.
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queues an entry for processing.
    pub fn dispatch(&self, id: WebhookId) -> Result<()> {
        self.sender.send(id).map_err(|_| IngestError::QueueClosed)
    }

    /// Closes the queue and waits until every queued entry has been processed.
    pub async fn shutdown(self) {
        drop(self.sender);

        for handle in self.workers {
            if let Err(e) = handle.await {
                error!("Worker task ended abnormally: {}", e);
            }
        }
    }
}

async fn run_worker(
    worker_id: usize,
    pipeline: Arc<IngestionPipeline>,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<WebhookId>>>,
) {
    loop {
        let next = receiver.lock().await.recv().await;
        let Some(id) = next else { break };

        debug!("Worker {}: processing {}", worker_id, id);
        pipeline.process(id).await;
    }

    debug!("Worker {}: queue closed, stopping", worker_id);
}
