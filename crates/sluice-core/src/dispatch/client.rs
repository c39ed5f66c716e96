use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::warn;

use crate::error::{Result, SluiceError, codes};
use crate::future::{Eventual, Promise};
use crate::pipeline::{AttachState, Handler, HandlerContext, Pipeline};
use crate::service::Service;

const LOG_TARGET: &str = "sluice::dispatch";

fn connection_lost() -> SluiceError {
    SluiceError::new(codes::DISPATCH_CONNECTION_LOST, "connection lost with requests in flight")
}

fn not_bound() -> SluiceError {
    SluiceError::new(codes::SERVICE_UNAVAILABLE, "dispatcher is not bound to a pipeline")
}

/// 把分发器绑定到管道链尾：清除旧的同类分发器、加入自身并重新装配。
fn bind_to_pipeline<H: Handler>(handler: &Arc<H>, pipeline: &Arc<Pipeline>) -> Result<()> {
    // 既有的同类分发器被替换；不存在则照常继续。
    let _ = pipeline.remove::<H>();
    pipeline.add_back_arc(Arc::clone(handler))?;
    pipeline.finalize()
}

/// 串行客户端分发器：同一时刻至多一个在途请求。
///
/// # 契约说明（What）
/// - `call` 在槽位空闲时把请求写入管道并占用槽位；上一请求未完成时，
///   新调用立即以 [`codes::DISPATCH_BUSY`] 失败；
/// - `read` 到响应即完成槽位中的 Promise 并清空槽位；
/// - 读 EOF、入站异常与传输失活都会让在途 Promise 以失败收尾，绝不
///   悬挂。
pub struct SerialClientDispatcher<Req, Resp> {
    pipeline: Mutex<Weak<Pipeline>>,
    slot: Mutex<Option<Promise<Resp>>>,
    attach: AttachState,
    _req: PhantomData<fn(Req)>,
}

impl<Req, Resp> SerialClientDispatcher<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    /// 创建未绑定的分发器。
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            pipeline: Mutex::new(Weak::new()),
            slot: Mutex::new(None),
            attach: AttachState::new(),
            _req: PhantomData,
        })
    }

    /// 绑定到管道：移除既有的同类分发器、把自身加到链尾并 finalize。
    pub fn bind(self: &Arc<Self>, pipeline: &Arc<Pipeline>) -> Result<()> {
        bind_to_pipeline(self, pipeline)?;
        *self.pipeline.lock() = Arc::downgrade(pipeline);
        Ok(())
    }

    /// 发起一次请求。
    pub fn call(&self, req: Req) -> Eventual<Resp> {
        let Some(pipeline) = self.pipeline.lock().upgrade() else {
            return Eventual::failed(not_bound());
        };
        let eventual = {
            let mut slot = self.slot.lock();
            if slot.is_some() {
                return Eventual::failed(SluiceError::new(
                    codes::DISPATCH_BUSY,
                    "previous request still in flight",
                ));
            }
            let (promise, eventual) = Promise::pair();
            *slot = Some(promise);
            eventual
        };
        match pipeline.write(req) {
            Ok(_write_done) => eventual,
            Err(err) => {
                self.slot.lock().take();
                Eventual::failed(err)
            }
        }
    }

    fn fail_pending(&self, err: SluiceError) {
        if let Some(promise) = self.slot.lock().take() {
            promise.fail(err);
        }
    }
}

impl<Req, Resp> Handler for SerialClientDispatcher<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    type Rin = Resp;
    type Rout = Resp;
    type Win = Req;
    type Wout = Req;

    fn on_read(&self, _ctx: &HandlerContext<Resp, Req>, msg: Resp) {
        match self.slot.lock().take() {
            Some(promise) => promise.complete(msg),
            None => warn!(target: LOG_TARGET, "response arrived with no request in flight"),
        }
    }

    fn on_read_eof(&self, ctx: &HandlerContext<Resp, Req>) {
        self.fail_pending(connection_lost());
        ctx.fire_read_eof();
    }

    fn on_read_exception(&self, ctx: &HandlerContext<Resp, Req>, err: SluiceError) {
        match self.slot.lock().take() {
            Some(promise) => promise.fail(err),
            None => ctx.fire_read_exception(err),
        }
    }

    fn on_transport_inactive(&self, ctx: &HandlerContext<Resp, Req>) {
        self.fail_pending(connection_lost());
        ctx.fire_transport_inactive();
    }

    fn on_write(&self, ctx: &HandlerContext<Resp, Req>, msg: Req) -> Eventual<()> {
        ctx.fire_write(msg)
    }

    fn attach_state(&self) -> Option<&AttachState> {
        Some(&self.attach)
    }
}

impl<Req, Resp> Service<Req> for SerialClientDispatcher<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    type Response = Resp;

    fn call(&self, req: Req) -> Eventual<Resp> {
        SerialClientDispatcher::call(self, req)
    }

    fn close(&self) -> Eventual<()> {
        match self.pipeline.lock().upgrade() {
            Some(pipeline) => match pipeline.close() {
                Ok(eventual) => eventual,
                Err(err) => Eventual::failed(err),
            },
            None => Eventual::failed(not_bound()),
        }
    }

    fn is_available(&self) -> bool {
        self.pipeline.lock().upgrade().is_some()
    }
}

/// 流水线客户端分发器：请求按 FIFO 配对响应。
///
/// 管道契约（响应按请求顺序到达）就是配对依据：每次 `call` 入队一个
/// Promise，每收到一条响应出队队首完成之。
pub struct PipelinedClientDispatcher<Req, Resp> {
    pipeline: Mutex<Weak<Pipeline>>,
    queue: Mutex<VecDeque<Promise<Resp>>>,
    attach: AttachState,
    _req: PhantomData<fn(Req)>,
}

impl<Req, Resp> PipelinedClientDispatcher<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    /// 创建未绑定的分发器。
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            pipeline: Mutex::new(Weak::new()),
            queue: Mutex::new(VecDeque::new()),
            attach: AttachState::new(),
            _req: PhantomData,
        })
    }

    /// 见 [`SerialClientDispatcher::bind`]。
    pub fn bind(self: &Arc<Self>, pipeline: &Arc<Pipeline>) -> Result<()> {
        bind_to_pipeline(self, pipeline)?;
        *self.pipeline.lock() = Arc::downgrade(pipeline);
        Ok(())
    }

    /// 发起一次请求；多次在途请求按提交顺序配对响应。
    pub fn call(&self, req: Req) -> Eventual<Resp> {
        let Some(pipeline) = self.pipeline.lock().upgrade() else {
            return Eventual::failed(not_bound());
        };
        let (promise, eventual) = Promise::pair();
        self.queue.lock().push_back(promise);
        match pipeline.write(req) {
            Ok(_write_done) => eventual,
            Err(err) => {
                self.queue.lock().pop_back();
                Eventual::failed(err)
            }
        }
    }

    fn fail_all(&self, err: &SluiceError) {
        let drained: Vec<Promise<Resp>> = self.queue.lock().drain(..).collect();
        for promise in drained {
            promise.fail(err.clone());
        }
    }
}

impl<Req, Resp> Handler for PipelinedClientDispatcher<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    type Rin = Resp;
    type Rout = Resp;
    type Win = Req;
    type Wout = Req;

    fn on_read(&self, _ctx: &HandlerContext<Resp, Req>, msg: Resp) {
        match self.queue.lock().pop_front() {
            Some(promise) => promise.complete(msg),
            None => warn!(target: LOG_TARGET, "response arrived with no request in flight"),
        }
    }

    fn on_read_eof(&self, ctx: &HandlerContext<Resp, Req>) {
        self.fail_all(&connection_lost());
        ctx.fire_read_eof();
    }

    fn on_read_exception(&self, ctx: &HandlerContext<Resp, Req>, err: SluiceError) {
        if self.queue.lock().is_empty() {
            ctx.fire_read_exception(err);
        } else {
            self.fail_all(&err);
        }
    }

    fn on_transport_inactive(&self, ctx: &HandlerContext<Resp, Req>) {
        self.fail_all(&connection_lost());
        ctx.fire_transport_inactive();
    }

    fn on_write(&self, ctx: &HandlerContext<Resp, Req>, msg: Req) -> Eventual<()> {
        ctx.fire_write(msg)
    }

    fn attach_state(&self) -> Option<&AttachState> {
        Some(&self.attach)
    }
}

impl<Req, Resp> Service<Req> for PipelinedClientDispatcher<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    type Response = Resp;

    fn call(&self, req: Req) -> Eventual<Resp> {
        PipelinedClientDispatcher::call(self, req)
    }

    fn close(&self) -> Eventual<()> {
        match self.pipeline.lock().upgrade() {
            Some(pipeline) => match pipeline.close() {
                Ok(eventual) => eventual,
                Err(err) => Eventual::failed(err),
            },
            None => Eventual::failed(not_bound()),
        }
    }

    fn is_available(&self) -> bool {
        self.pipeline.lock().upgrade().is_some()
    }
}
