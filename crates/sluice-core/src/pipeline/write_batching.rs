use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tracing::warn;

use crate::error::{SluiceError, codes};
use crate::future::{Eventual, Promise};

use super::context::OutboundContext;
use super::handler::OutboundHandler;

const LOG_TARGET: &str = "sluice::pipeline::batching";

/// 按事件循环轮次聚合出站写的 OUT 链节。
///
/// 同一轮循环内提交的多笔写被拼接为一笔下游写，以减少系统调用；所有
/// 提交方共享那笔写的完成结果。`close` 时仍在排队的写以失败收尾。
#[derive(Default)]
pub struct WriteBatchingHandler {
    state: Arc<Mutex<BatchState>>,
}

#[derive(Default)]
struct BatchState {
    pending: Option<BytesMut>,
    waiters: Vec<Promise<()>>,
    flush_scheduled: bool,
}

impl WriteBatchingHandler {
    /// 创建链节。
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutboundHandler for WriteBatchingHandler {
    type Win = Bytes;
    type Wout = Bytes;

    fn on_write(&self, ctx: &OutboundContext<Bytes>, msg: Bytes) -> Eventual<()> {
        let Some(base) = ctx.event_base() else {
            // 未绑定传输时不聚合，直接透传。
            return ctx.fire_write(msg);
        };

        let (eventual, needs_flush) = {
            let mut state = self.state.lock();
            state.pending.get_or_insert_with(BytesMut::new).extend_from_slice(&msg);
            let (promise, eventual) = Promise::pair();
            state.waiters.push(promise);
            let needs_flush = !state.flush_scheduled;
            state.flush_scheduled = true;
            (eventual, needs_flush)
        };

        if needs_flush {
            let state = Arc::clone(&self.state);
            let ctx = ctx.clone();
            let flush_base = Arc::clone(&base);
            base.run_in_loop(move || {
                let (batch, waiters) = {
                    let mut state = state.lock();
                    state.flush_scheduled = false;
                    (state.pending.take(), std::mem::take(&mut state.waiters))
                };
                let Some(batch) = batch else { return };
                let downstream = ctx.fire_write(batch.freeze());
                flush_base.spawn(async move {
                    let result = downstream.await;
                    for waiter in waiters {
                        match &result {
                            Ok(()) => waiter.complete(()),
                            Err(err) => waiter.fail(err.clone()),
                        }
                    }
                });
            });
        }
        eventual
    }

    fn on_close(&self, ctx: &OutboundContext<Bytes>) -> Eventual<()> {
        let (dropped, waiters) = {
            let mut state = self.state.lock();
            state.flush_scheduled = false;
            (state.pending.take(), std::mem::take(&mut state.waiters))
        };
        if let Some(batch) = dropped {
            warn!(
                target: LOG_TARGET,
                dropped_bytes = batch.len(),
                "close() called while sends still pending"
            );
        }
        for waiter in waiters {
            waiter.fail(SluiceError::new(
                codes::TRANSPORT_CLOSED,
                "close() called while sends still pending",
            ));
        }
        ctx.fire_close()
    }
}
