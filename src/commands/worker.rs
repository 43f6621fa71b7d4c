//! One worker task per queue, executing commands strictly in order.

use super::handlers;
use super::models::{CommandOutcome, CommandRequest};
use super::queue::{CommandQueue, QueueSet};
use super::CommandContext;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub struct QueueWorker {
    queue: Arc<CommandQueue>,
    ctx: CommandContext,
    cancel: CancellationToken,
}

impl QueueWorker {
    pub fn new(queue: Arc<CommandQueue>, ctx: CommandContext, cancel: CancellationToken) -> Self {
        Self { queue, ctx, cancel }
    }

    /// Drains the queue until cancelled. A command already running when the
    /// token fires is allowed to finish.
    pub async fn run(self) {
        info!("{} queue worker started", self.queue.kind());
        loop {
            let request = match self.queue.next(&self.cancel).await {
                Ok(Some(request)) => request,
                Ok(None) => break,
                Err(e) => {
                    error!("{} queue is unusable: {:#}", self.queue.kind(), e);
                    break;
                }
            };
            self.execute(request).await;
        }
        info!("{} queue worker stopped", self.queue.kind());
    }

    async fn execute(&self, request: CommandRequest) {
        let start_time = Instant::now();
        debug!("Running {}", request.key);

        // Handlers run in their own task so a panic only loses that command
        let handle = tokio::spawn(handlers::execute(
            request.command.clone(),
            self.ctx.clone(),
        ));
        let result = handle.await;
        let elapsed = start_time.elapsed();

        let settled = match result {
            Ok(Ok(CommandOutcome::Completed)) => {
                debug!("Command {} completed in {:?}", request.key, elapsed);
                self.queue.complete(&request)
            }
            Ok(Ok(CommandOutcome::Deferred)) => {
                info!("Command {} deferred", request.key);
                self.queue.defer(request.clone())
            }
            Ok(Err(e)) => {
                error!(
                    "Command {} ({}) failed after {:?}, dropping it. Params: {}. Error: {:#}",
                    request.key,
                    request.command_type().as_str(),
                    elapsed,
                    params_json(&request),
                    e
                );
                self.queue.complete(&request)
            }
            Err(e) => {
                error!(
                    "Command {} ({}) panicked after {:?}, dropping it. Params: {}. Error: {}",
                    request.key,
                    request.command_type().as_str(),
                    elapsed,
                    params_json(&request),
                    e
                );
                self.queue.complete(&request)
            }
        };

        if let Err(e) = settled {
            error!("Failed to settle command {}: {:#}", request.key, e);
        }
    }
}

fn params_json(request: &CommandRequest) -> String {
    serde_json::to_string(&request.command).unwrap_or_else(|_| format!("{:?}", request.command))
}

/// Spawns one worker per queue.
pub fn spawn_workers(
    queues: &QueueSet,
    ctx: CommandContext,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    queues
        .all()
        .into_iter()
        .map(|queue| {
            let worker = QueueWorker::new(queue.clone(), ctx.clone(), cancel.clone());
            tokio::spawn(worker.run())
        })
        .collect()
}
