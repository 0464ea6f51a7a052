use std::marker::PhantomData;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::config::stage_buffer;
use crate::pipeline::pipe::Pipe;

/// Two stages joined by a bounded channel.
pub struct Chain<A, B, M> {
    a: A,
    b: B,
    _m: PhantomData<fn() -> M>,
}

impl<A, B, M> Chain<A, B, M> {
    pub fn new(a: A, b: B) -> Self {
        Self {
            a,
            b,
            _m: PhantomData,
        }
    }
}

#[async_trait]
impl<I, M, O, A, B> Pipe<I, O> for Chain<A, B, M>
where
    I: Send + 'static,
    M: Send + 'static,
    O: Send + 'static,
    A: Pipe<I, M> + Send + Sync,
    B: Pipe<M, O> + Send + Sync,
{
    fn stage_name(&self) -> &'static str {
        "chain"
    }

    async fn process(
        &self,
        input: mpsc::Receiver<I>,
        output: mpsc::Sender<O>,
        buffer: usize,
        cancel: CancelToken,
    ) -> Result<()> {
        let (tx_mid, rx_mid) = mpsc::channel::<M>(stage_buffer(self.b.stage_name(), buffer));

        let left = self.a.process(input, tx_mid, buffer, cancel.clone());
        let right = self.b.process(rx_mid, output, buffer, cancel.clone());

        tokio::pin!(left);
        tokio::pin!(right);

        let mut left_res: Option<Result<()>> = None;
        let mut right_res: Option<Result<()>> = None;

        while left_res.is_none() || right_res.is_none() {
            tokio::select! {
                res = &mut left, if left_res.is_none() => {
                    if res.is_err() {
                        cancel.cancel();
                    }
                    left_res = Some(res);
                }
                res = &mut right, if right_res.is_none() => {
                    if res.is_err() {
                        cancel.cancel();
                    }
                    right_res = Some(res);
                }
            }
        }

        left_res.unwrap_or_else(|| Err(Error::pipeline("left stage did not finish")))?;
        right_res.unwrap_or_else(|| Err(Error::pipeline("right stage did not finish")))?;
        Ok(())
    }
}

pub trait PipeExt<I, O>: Pipe<I, O> + Sized
where
    I: Send + 'static,
    O: Send + 'static,
{
    fn pipe<N, P2>(self, next: P2) -> Chain<Self, P2, O>
    where
        N: Send + 'static,
        P2: Pipe<O, N> + Send + Sync,
        Self: Send + Sync,
    {
        Chain::new(self, next)
    }
}

impl<I, O, P> PipeExt<I, O> for P
where
    I: Send + 'static,
    O: Send + 'static,
    P: Pipe<I, O> + Sized + Send + Sync,
{
}
