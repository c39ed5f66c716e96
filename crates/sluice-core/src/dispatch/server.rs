use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::error::Result;
use crate::future::Eventual;
use crate::pipeline::{Handler, HandlerContext};
use crate::runtime::EventBase;
use crate::service::ArcService;

const LOG_TARGET: &str = "sluice::dispatch";

/// 服务完成后把结果按响应纪律写回管道。
fn deliver<Req, Resp>(ctx: &HandlerContext<Req, Resp>, result: Result<Resp>)
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    match result {
        Ok(resp) => drop(ctx.fire_write(resp)),
        Err(err) => drop(ctx.fire_write_exception(err)),
    }
}

fn require_base<Req, Resp>(ctx: &HandlerContext<Req, Resp>) -> Option<Arc<EventBase>>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    let base = ctx.event_base();
    if base.is_none() {
        warn!(
            target: LOG_TARGET,
            "server dispatcher received a request with no transport bound; dropping"
        );
    }
    base
}

/// 串行服务端分发器：一次只有一个请求在服务中。
///
/// # 契约说明（What）
/// - 服务进行中到达的请求在分发器内部排队，按到达顺序逐个出队；
/// - 循环线程从不被阻塞：服务的完成续体在管道的事件循环上执行，写回
///   响应后再取下一个排队请求；
/// - 服务失败以 `write_exception` 向前传播。
pub struct SerialServerDispatcher<Req, Resp> {
    service: ArcService<Req, Resp>,
    state: Arc<Mutex<SerialState<Req>>>,
}

struct SerialState<Req> {
    busy: bool,
    backlog: VecDeque<Req>,
}

impl<Req, Resp> SerialServerDispatcher<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    /// 以服务句柄创建分发器。
    pub fn new(service: ArcService<Req, Resp>) -> Self {
        Self {
            service,
            state: Arc::new(Mutex::new(SerialState { busy: false, backlog: VecDeque::new() })),
        }
    }
}

fn run_serial<Req, Resp>(
    service: ArcService<Req, Resp>,
    state: Arc<Mutex<SerialState<Req>>>,
    ctx: HandlerContext<Req, Resp>,
    base: Arc<EventBase>,
    req: Req,
) where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    let call = service.call(req);
    let spawn_base = Arc::clone(&base);
    base.spawn(async move {
        let result = call.await;
        deliver(&ctx, result);
        let next = {
            let mut state_guard = state.lock();
            match state_guard.backlog.pop_front() {
                Some(req) => Some(req),
                None => {
                    state_guard.busy = false;
                    None
                }
            }
        };
        if let Some(req) = next {
            run_serial(service, state, ctx, spawn_base, req);
        }
    });
}

impl<Req, Resp> Handler for SerialServerDispatcher<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    type Rin = Req;
    type Rout = Req;
    type Win = Resp;
    type Wout = Resp;

    fn on_read(&self, ctx: &HandlerContext<Req, Resp>, msg: Req) {
        let Some(base) = require_base(ctx) else { return };
        {
            let mut state = self.state.lock();
            if state.busy {
                state.backlog.push_back(msg);
                return;
            }
            state.busy = true;
        }
        run_serial(
            Arc::clone(&self.service),
            Arc::clone(&self.state),
            ctx.clone(),
            base,
            msg,
        );
    }

    fn on_write(&self, ctx: &HandlerContext<Req, Resp>, msg: Resp) -> Eventual<()> {
        ctx.fire_write(msg)
    }
}

/// 流水线服务端分发器：响应按请求到达顺序写回。
///
/// # 契约说明（What）
/// - 每个请求领取单调递增的内部序号（自 1 起，64 位，不考虑回绕）；
/// - 服务完成的结果按序号存入映射；排水例程把 `last_written + 1` 起的
///   连续结果依次写回，乱序完成因此不会乱序响应；
/// - 失败的结果占住自己的序位、以 `write_exception` 写回，排水不被
///   单个失败卡死。
pub struct PipelinedServerDispatcher<Req, Resp> {
    service: ArcService<Req, Resp>,
    state: Arc<Mutex<PipelinedState<Resp>>>,
}

struct PipelinedState<Resp> {
    next_id: u64,
    last_written: u64,
    responses: HashMap<u64, Result<Resp>>,
}

impl<Req, Resp> PipelinedServerDispatcher<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    /// 以服务句柄创建分发器。
    pub fn new(service: ArcService<Req, Resp>) -> Self {
        Self {
            service,
            state: Arc::new(Mutex::new(PipelinedState {
                next_id: 1,
                last_written: 0,
                responses: HashMap::new(),
            })),
        }
    }
}

impl<Req, Resp> Handler for PipelinedServerDispatcher<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    type Rin = Req;
    type Rout = Req;
    type Win = Resp;
    type Wout = Resp;

    fn on_read(&self, ctx: &HandlerContext<Req, Resp>, msg: Req) {
        let Some(base) = require_base(ctx) else { return };
        let request_id = {
            let mut state = self.state.lock();
            let id = state.next_id;
            state.next_id += 1;
            id
        };
        let call = self.service.call(msg);
        let state = Arc::clone(&self.state);
        let ctx = ctx.clone();
        base.spawn(async move {
            let result = call.await;
            let ready: Vec<Result<Resp>> = {
                let mut state = state.lock();
                state.responses.insert(request_id, result);
                let mut drained = Vec::new();
                loop {
                    let key = state.last_written + 1;
                    match state.responses.remove(&key) {
                        Some(next) => {
                            state.last_written += 1;
                            drained.push(next);
                        }
                        None => break,
                    }
                }
                drained
            };
            for result in ready {
                deliver(&ctx, result);
            }
        });
    }

    fn on_write(&self, ctx: &HandlerContext<Req, Resp>, msg: Resp) -> Eventual<()> {
        ctx.fire_write(msg)
    }
}

/// 多路复用服务端分发器：响应按服务完成顺序立即写回。
///
/// 响应与请求顺序无关；调用方应在载荷内携带序号并在客户端完成关联。
pub struct MultiplexServerDispatcher<Req, Resp> {
    service: ArcService<Req, Resp>,
}

impl<Req, Resp> MultiplexServerDispatcher<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    /// 以服务句柄创建分发器。
    pub fn new(service: ArcService<Req, Resp>) -> Self {
        Self { service }
    }
}

impl<Req, Resp> Handler for MultiplexServerDispatcher<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    type Rin = Req;
    type Rout = Req;
    type Win = Resp;
    type Wout = Resp;

    fn on_read(&self, ctx: &HandlerContext<Req, Resp>, msg: Req) {
        let Some(base) = require_base(ctx) else { return };
        let call = self.service.call(msg);
        let ctx = ctx.clone();
        base.spawn(async move {
            deliver(&ctx, call.await);
        });
    }

    fn on_write(&self, ctx: &HandlerContext<Req, Resp>, msg: Resp) -> Eventual<()> {
        ctx.fire_write(msg)
    }
}
