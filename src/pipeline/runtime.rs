use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::config::{StageConfig, STAGE_CONFIG};
use crate::pipeline::pipe::Pipe;

pub struct Runtime {
    buffer: usize,
    buffers: HashMap<&'static str, usize>,
    concurrencies: HashMap<&'static str, usize>,
    cancel: Option<CancelToken>,
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            buffer: 128,
            buffers: HashMap::new(),
            concurrencies: HashMap::new(),
            cancel: None,
        }
    }

    /// Capacity of every channel between stages.
    pub fn buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    /// Capacity of the channel feeding `stage`.
    pub fn buffer_stage(mut self, stage: &'static str, buffer: usize) -> Self {
        self.buffers.insert(stage, buffer);
        self
    }

    /// Number of items `stage` may work on at once.
    pub fn concurrency_stage(mut self, stage: &'static str, concurrency: usize) -> Self {
        self.concurrencies.insert(stage, concurrency);
        self
    }

    /// Use an externally owned token instead of a fresh one.
    pub fn cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn spawn<I, O, P>(
        &self,
        pipe: P,
    ) -> (
        mpsc::Sender<I>,
        mpsc::Receiver<O>,
        CancelToken,
        JoinHandle<Result<()>>,
    )
    where
        I: Send + 'static,
        O: Send + 'static,
        P: Pipe<I, O> + Send + Sync + 'static,
    {
        let (tx_in, rx_in) = mpsc::channel::<I>(self.buffer);
        let (tx_out, rx_out) = mpsc::channel::<O>(self.buffer);

        let buffer = self.buffer;
        let cancel = self.cancel.clone().unwrap_or_default();
        let cancel_task = cancel.clone();
        let config = StageConfig {
            buffers: Arc::new(self.buffers.clone()),
            concurrencies: Arc::new(self.concurrencies.clone()),
        };

        #[cfg(feature = "tracing")]
        let handle = {
            use tracing::Instrument;
            let stage = pipe.stage_name();
            let span = tracing::info_span!("pdfharvest.stage", stage = stage, buffer = buffer);
            tokio::spawn(
                STAGE_CONFIG
                    .scope(config, async move {
                        pipe.process(rx_in, tx_out, buffer, cancel_task).await
                    })
                    .instrument(span),
            )
        };

        #[cfg(not(feature = "tracing"))]
        let handle = tokio::spawn(STAGE_CONFIG.scope(config, async move {
            pipe.process(rx_in, tx_out, buffer, cancel_task).await
        }));

        (tx_in, rx_out, cancel, handle)
    }

    /// Spawn a pipeline that ends in a sink; its `()` output is drained internally.
    pub fn spawn_sink<I, P>(&self, pipe: P) -> (mpsc::Sender<I>, CancelToken, JoinHandle<Result<()>>)
    where
        I: Send + 'static,
        P: Pipe<I, ()> + Send + Sync + 'static,
    {
        let (tx, mut rx, cancel, handle) = self.spawn(pipe);
        let joined = tokio::spawn(async move {
            let drain = async { while rx.recv().await.is_some() {} };
            let (result, ()) = tokio::join!(handle, drain);
            result?
        });
        (tx, cancel, joined)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
