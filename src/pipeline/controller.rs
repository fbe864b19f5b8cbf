//! Start/stop control over a shared polling loop

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::polling_loop::PollingOrchestrator;

pub struct LoopController {
    orchestrator: Arc<Mutex<PollingOrchestrator>>,
    parent: CancellationToken,
    running: Arc<AtomicBool>,
    task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl LoopController {
    /// Each start runs under a child of `parent`, so a process-wide
    /// shutdown also stops the loop.
    pub fn new(orchestrator: PollingOrchestrator, parent: CancellationToken) -> Self {
        Self {
            orchestrator: Arc::new(Mutex::new(orchestrator)),
            parent,
            running: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    /// Start the loop. Returns false if it was already running.
    pub async fn start(&self) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        let mut task = self.task.lock().await;
        // A previous run that ended on its own still needs joining
        if let Some((_, handle)) = task.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Previous polling task ended abnormally");
            }
        }

        let token = self.parent.child_token();
        let child = token.clone();
        let orchestrator = Arc::clone(&self.orchestrator);
        let running = Arc::clone(&self.running);
        let handle = tokio::spawn(async move {
            orchestrator.lock().await.run(child).await;
            running.store(false, Ordering::SeqCst);
        });
        *task = Some((token, handle));

        info!("▶️  Polling loop start requested");
        true
    }

    /// Stop the loop and wait for the current tick to finish. Returns false
    /// if nothing was running.
    pub async fn stop(&self) -> bool {
        let Some((token, handle)) = self.task.lock().await.take() else {
            return false;
        };
        token.cancel();
        if let Err(e) = handle.await {
            warn!(error = %e, "Polling task ended abnormally");
        }
        self.running.store(false, Ordering::SeqCst);
        info!("⏹️  Polling loop stopped on request");
        true
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
