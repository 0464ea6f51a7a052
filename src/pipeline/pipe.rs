use async_trait::async_trait;
use tokio::sync::mpsc::{Receiver, Sender};

use crate::error::Result;
use crate::pipeline::cancel::CancelToken;

/// One stage of a harvesting pipeline.
///
/// A stage consumes `I` from `input` until it is closed (or the pipeline is
/// cancelled) and produces `O` into `output`.
#[async_trait]
pub trait Pipe<I: Send + 'static, O: Send + 'static>: Send + Sync {
    fn stage_name(&self) -> &'static str {
        "pipe"
    }

    async fn process(
        &self,
        input: Receiver<I>,
        output: Sender<O>,
        buffer: usize,
        cancel: CancelToken,
    ) -> Result<()>;
}
