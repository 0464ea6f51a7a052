use std::collections::HashMap;
use std::sync::Arc;

/// Per-stage overrides installed by [`Runtime`](crate::pipeline::runtime::Runtime).
#[derive(Clone, Default)]
pub(crate) struct StageConfig {
    pub buffers: Arc<HashMap<&'static str, usize>>,
    pub concurrencies: Arc<HashMap<&'static str, usize>>,
}

impl StageConfig {
    pub fn buffer_for(&self, stage: &'static str, global: usize) -> usize {
        self.buffers.get(stage).copied().unwrap_or(global).max(1)
    }

    pub fn concurrency_for(&self, stage: &'static str) -> usize {
        self.concurrencies.get(stage).copied().unwrap_or(1).max(1)
    }
}

tokio::task_local! {
    pub(crate) static STAGE_CONFIG: StageConfig;
}

/// Concurrency configured for `stage`, or 1 outside a runtime scope.
pub(crate) fn stage_concurrency(stage: &'static str) -> usize {
    STAGE_CONFIG
        .try_with(|config| config.concurrency_for(stage))
        .unwrap_or(1)
}

pub(crate) fn stage_buffer(stage: &'static str, global: usize) -> usize {
    STAGE_CONFIG
        .try_with(|config| config.buffer_for(stage, global))
        .unwrap_or_else(|_| global.max(1))
}
