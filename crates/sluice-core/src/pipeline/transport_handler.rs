use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use tracing::{debug, warn};

use crate::buffer::ByteQueue;
use crate::error::{SluiceError, codes};
use crate::future::Eventual;
use crate::transport::{ReadCallback, Transport, WriteFlags};

use super::context::HandlerContext;
use super::handler::{AttachState, Handler};

const LOG_TARGET: &str = "sluice::pipeline::transport";

/// 终端传输 Handler：管道与异步传输之间的桥。
///
/// # 设计背景（Why）
/// - 作为字节↔字节的全双工链节加在链首：入站方向它是传输的读回调，把
///   收到的字节并入内部队列后以队列句柄触发 `fire_read`；出站方向它是
///   OUT 链的最后一站，把字节交给传输并以传输的写完成收尾；
/// - 一个实例只能加入一条管道（内嵌 [`AttachState`]，依赖其唯一上下文
///   实现读回调到链路的回传）。
///
/// # 契约说明（What）
/// - `transport_active`：把传输挂到管道上、注册读回调、继续广播；
/// - 写路径：传输不可写时以 [`codes::TRANSPORT_CLOSED`] 立即失败；
/// - `close`：写标志含 [`WriteFlags::WRITE_SHUTDOWN`] 时执行写半关闭并
///   成功返回，否则摘除读回调、关闭传输并恰好一次地通知观察者销毁管道；
/// - 任何退出路径（解绑、关闭、析构）都摘除读回调。
pub struct TransportHandler {
    this: Weak<TransportHandler>,
    transport: Arc<dyn Transport>,
    queue: ByteQueue,
    attach: AttachState,
    fired_inactive: AtomicBool,
    pipeline_deleted: AtomicBool,
}

impl TransportHandler {
    /// 包装一个已建立的传输。
    pub fn new(transport: Arc<dyn Transport>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            transport,
            queue: ByteQueue::new(),
            attach: AttachState::new(),
            fired_inactive: AtomicBool::new(false),
            pipeline_deleted: AtomicBool::new(false),
        })
    }

    /// 底层传输。
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    fn ctx(&self) -> Option<HandlerContext<ByteQueue, Bytes>> {
        self.attach.handler_context::<ByteQueue, Bytes>()
    }

    fn attach_read_callback(&self) {
        let callback = if self.transport.good() {
            self.this
                .upgrade()
                .map(|this| this as Arc<dyn ReadCallback>)
        } else {
            None
        };
        self.transport.set_read_callback(callback);
    }

    fn detach_read_callback(&self) {
        if let Some(current) = self.transport.read_callback() {
            let current_ptr = Arc::as_ptr(&current) as *const ();
            if std::ptr::eq(current_ptr, (self as *const Self).cast()) {
                self.transport.set_read_callback(None);
            }
        }
        if let Some(ctx) = self.ctx()
            && !self.fired_inactive.swap(true, Ordering::AcqRel)
        {
            ctx.fire_transport_inactive();
        }
    }

    fn refresh_timeout(&self, ctx: &HandlerContext<ByteQueue, Bytes>) {
        if let Some(pipeline) = ctx.pipeline() {
            pipeline.refresh_timeout();
        }
    }

    fn shutdown(&self, ctx: &HandlerContext<ByteQueue, Bytes>, close_with_reset: bool) -> Eventual<()> {
        self.detach_read_callback();
        if close_with_reset {
            self.transport.close_with_reset();
        } else {
            self.transport.close_now();
        }
        if !self.pipeline_deleted.swap(true, Ordering::AcqRel)
            && let Some(pipeline) = ctx.pipeline()
        {
            pipeline.delete_pipeline();
        }
        Eventual::ready(())
    }
}

impl Handler for TransportHandler {
    type Rin = ByteQueue;
    type Rout = ByteQueue;
    type Win = Bytes;
    type Wout = Bytes;

    fn on_read(&self, ctx: &HandlerContext<ByteQueue, Bytes>, msg: ByteQueue) {
        // 链首链节不期待上游入站消息，保底原样转发。
        ctx.fire_read(msg);
    }

    fn on_transport_active(&self, ctx: &HandlerContext<ByteQueue, Bytes>) {
        if let Some(pipeline) = ctx.pipeline() {
            pipeline.set_transport(Some(Arc::clone(&self.transport)));
        }
        self.attach_read_callback();
        self.fired_inactive.store(false, Ordering::Release);
        ctx.fire_transport_active();
    }

    fn on_transport_inactive(&self, ctx: &HandlerContext<ByteQueue, Bytes>) {
        // detach_read_callback 在传输仍活跃时负责触发 fire_transport_inactive。
        self.detach_read_callback();
        if let Some(pipeline) = ctx.pipeline() {
            pipeline.set_transport(None);
        }
    }

    fn on_write(&self, ctx: &HandlerContext<ByteQueue, Bytes>, msg: Bytes) -> Eventual<()> {
        self.refresh_timeout(ctx);
        if msg.is_empty() {
            return Eventual::ready(());
        }
        if !self.transport.good() {
            debug!(target: LOG_TARGET, "socket is closed in write()");
            return Eventual::failed(SluiceError::new(
                codes::TRANSPORT_CLOSED,
                "socket is closed in write()",
            ));
        }
        self.transport.write(msg, ctx.write_flags())
    }

    fn on_write_exception(
        &self,
        ctx: &HandlerContext<ByteQueue, Bytes>,
        err: SluiceError,
    ) -> Eventual<()> {
        debug!(target: LOG_TARGET, error = %err, "closing transport with reset");
        self.shutdown(ctx, true)
    }

    fn on_close(&self, ctx: &HandlerContext<ByteQueue, Bytes>) -> Eventual<()> {
        if ctx.write_flags().contains(WriteFlags::WRITE_SHUTDOWN) {
            self.transport.shutdown_write();
            Eventual::ready(())
        } else {
            self.shutdown(ctx, false)
        }
    }

    fn on_detach(&self, _ctx: &HandlerContext<ByteQueue, Bytes>) {
        self.detach_read_callback();
    }

    fn attach_state(&self) -> Option<&AttachState> {
        Some(&self.attach)
    }
}

impl ReadCallback for TransportHandler {
    fn read_buffer_hint(&self) -> (usize, usize) {
        self.ctx()
            .map(|ctx| ctx.read_buffer_settings())
            .unwrap_or((2048, 2048))
    }

    fn on_data(&self, data: Bytes) {
        let Some(ctx) = self.ctx() else {
            warn!(target: LOG_TARGET, "read callback fired without a bound context");
            return;
        };
        self.refresh_timeout(&ctx);
        self.queue.append(&data);
        ctx.fire_read(self.queue.clone());
    }

    fn on_eof(&self) {
        if let Some(ctx) = self.ctx() {
            ctx.fire_read_eof();
        }
    }

    fn on_read_error(&self, err: SluiceError) {
        if let Some(ctx) = self.ctx() {
            ctx.fire_read_exception(err);
        }
    }
}

impl Drop for TransportHandler {
    fn drop(&mut self) {
        if let Some(current) = self.transport.read_callback() {
            let current_ptr = Arc::as_ptr(&current) as *const ();
            if std::ptr::eq(current_ptr, (self as *const Self).cast()) {
                self.transport.set_read_callback(None);
            }
        }
    }
}
