use bytes::Bytes;

use crate::error::{SluiceError, codes};
use crate::future::Eventual;

use super::context::OutboundContext;
use super::handler::OutboundHandler;

/// 把出站操作钉到传输所在事件循环的 OUT 链节。
///
/// # 设计背景（Why）
/// - 管道契约要求所有 `fire_*` 调用发生在传输绑定的循环线程上；加入本
///   链节后，其后方的 Handler 可以从任意线程发起 `write`/`close`，由本
///   链节负责把下游传播搬到循环线程并同步等待其排队结果。
///
/// # 契约说明（What）
/// - 调用方已在循环线程时直接透传，无调度开销；
/// - 返回的 [`Eventual`] 即下游传播产出的那一个，完成语义不变；
/// - 尚未绑定传输时以 [`codes::TRANSPORT_CLOSED`] 失败。
#[derive(Debug, Default)]
pub struct EventBaseHandler;

impl EventBaseHandler {
    /// 创建链节。
    pub fn new() -> Self {
        Self
    }
}

impl OutboundHandler for EventBaseHandler {
    type Win = Bytes;
    type Wout = Bytes;

    fn on_write(&self, ctx: &OutboundContext<Bytes>, msg: Bytes) -> Eventual<()> {
        let Some(base) = ctx.event_base() else {
            return Eventual::failed(SluiceError::new(
                codes::TRANSPORT_CLOSED,
                "write(): no transport bound to pipeline",
            ));
        };
        if base.in_loop_thread() {
            return ctx.fire_write(msg);
        }
        let ctx = ctx.clone();
        match base.run_immediately_or_wait(move || ctx.fire_write(msg)) {
            Ok(eventual) => eventual,
            Err(err) => Eventual::failed(err),
        }
    }

    fn on_close(&self, ctx: &OutboundContext<Bytes>) -> Eventual<()> {
        let Some(base) = ctx.event_base() else {
            return Eventual::failed(SluiceError::new(
                codes::TRANSPORT_CLOSED,
                "close(): no transport bound to pipeline",
            ));
        };
        if base.in_loop_thread() {
            return ctx.fire_close();
        }
        let ctx = ctx.clone();
        match base.run_immediately_or_wait(move || ctx.fire_close()) {
            Ok(eventual) => eventual,
            Err(err) => Eventual::failed(err),
        }
    }
}
