use std::sync::Arc;

use tokio::sync::watch;

/// How far a pipeline has been asked to wind down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StopLevel {
    Running,
    /// Start no new work; let in-flight work finish.
    Draining,
    /// Stop everything as soon as possible.
    Cancelled,
}

/// Shared stop signal for every stage of a pipeline.
///
/// Levels only ever escalate: `Running -> Draining -> Cancelled`.
#[derive(Clone)]
pub struct CancelToken {
    level: Arc<watch::Sender<StopLevel>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(StopLevel::Running);
        Self { level: Arc::new(tx) }
    }
}

impl CancelToken {
    /// Stop scheduling new work. Returns `true` if this call changed the level.
    pub fn drain(&self) -> bool {
        self.escalate(StopLevel::Draining)
    }

    pub fn cancel(&self) {
        self.escalate(StopLevel::Cancelled);
    }

    pub fn level(&self) -> StopLevel {
        *self.level.borrow()
    }

    pub fn is_draining(&self) -> bool {
        self.level() >= StopLevel::Draining
    }

    pub fn is_cancelled(&self) -> bool {
        self.level() == StopLevel::Cancelled
    }

    /// Resolves once the token is draining or cancelled.
    pub async fn draining(&self) {
        self.reached(StopLevel::Draining).await
    }

    pub async fn cancelled(&self) {
        self.reached(StopLevel::Cancelled).await
    }

    fn escalate(&self, to: StopLevel) -> bool {
        self.level.send_if_modified(|level| {
            if *level < to {
                *level = to;
                true
            } else {
                false
            }
        })
    }

    async fn reached(&self, at: StopLevel) {
        let mut rx = self.level.subscribe();
        // The sender lives as long as `self`, so `wait_for` cannot observe a closed channel.
        let _ = rx.wait_for(|level| *level >= at).await;
    }
}
