use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::engine::{EngineError, LocalEngine, QueuedRun};

/// Polls a [`LocalEngine`]'s task queue and runs each workflow instance as
/// its own tokio task. The queue is claimed on construction, so the engine
/// accepts starts from then until [`Worker::run`] returns.
pub struct Worker {
    engine: Arc<LocalEngine>,
    queue: mpsc::UnboundedReceiver<QueuedRun>,
}

impl Worker {
    pub fn new(engine: Arc<LocalEngine>) -> Result<Self, EngineError> {
        let queue = engine.take_queue()?;
        Ok(Self { engine, queue })
    }

    /// Serves queued runs until `shutdown` resolves, then hands the queue
    /// back to the engine. Instances already in flight keep running on the
    /// runtime after this returns.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        let Worker { engine, mut queue } = self;
        info!(task_queue = %engine.task_queue(), "worker polling task queue");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                next = queue.recv() => match next {
                    Some(run) => spawn_instance(&engine, run),
                    None => {
                        warn!("task queue closed");
                        break;
                    }
                },
            }
        }

        engine.restore_queue(queue);
        info!(task_queue = %engine.task_queue(), "worker stopped");
    }
}

fn spawn_instance(engine: &Arc<LocalEngine>, run: QueuedRun) {
    let engine = engine.clone();
    tokio::spawn(async move {
        engine.mark_running(&run.workflow_id, run.run_id);
        let ctx = engine.context_for(&run);
        let QueuedRun {
            workflow_id,
            run_id,
            definition,
            params,
            ..
        } = run;

        // A panicking workflow must still close its run.
        let instance = tokio::spawn(async move { definition.run(ctx, params).await });
        let outcome = match instance.await {
            Ok(Ok(result)) => serde_json::to_value(&result).map_err(|e| e.to_string()),
            Ok(Err(err)) => Err(err.to_string()),
            Err(join_err) => Err(format!("workflow task aborted: {join_err}")),
        };

        match &outcome {
            Ok(_) => info!(identity = %workflow_id, %run_id, "run completed"),
            Err(err) => error!(identity = %workflow_id, %run_id, error = %err, "run failed"),
        }
        engine.close_run(&workflow_id, run_id, outcome);
    });
}

/// Claims the engine's queue and serves it on the runtime until `shutdown`
/// flips to `true`.
pub fn start_background_workers(
    engine: Arc<LocalEngine>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<JoinHandle<()>, EngineError> {
    let worker = Worker::new(engine)?;
    Ok(tokio::spawn(async move {
        let stop = async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        };
        worker.run(stop).await;
    }))
}
