use std::any::TypeId;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::SluiceError;
use crate::future::Eventual;

use super::context::{ContextInner, HandlerContext, InboundContext, OutboundContext};

/// Handler 的方向能力。
///
/// 决定链节被编入入站链、出站链还是两者（见
/// [`Pipeline::finalize`](super::Pipeline::finalize)）。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandlerDir {
    /// 仅处理入站事件。
    In,
    /// 仅处理出站事件。
    Out,
    /// 双向。
    Both,
}

/// 链节边界上的类型标签：`TypeId` 用于校验，类型名用于错误信息。
#[derive(Clone, Copy, Debug)]
pub(crate) struct TypeTag {
    pub(crate) id: TypeId,
    pub(crate) name: &'static str,
}

impl TypeTag {
    pub(crate) fn of<T: 'static>() -> Self {
        Self { id: TypeId::of::<T>(), name: std::any::type_name::<T>() }
    }
}

/// 全双工 Handler：声明四个关联类型并同时参与入站与出站链。
///
/// # 设计背景（Why）
/// - 入站消息以 `Rin` 进入、以 `Rout` 离开；出站消息以 `Win` 进入、以
///   `Wout` 离开。相邻链节的 `Rout`/`Rin`（及 `Wout`/`Win`）必须一致，
///   该约束在 finalize 阶段以类型标签校验；
/// - 只有 `on_read` 与 `on_write` 是必须实现的；其余事件的默认实现原样
///   向后转发，缺失某个事件的处理者因此不构成错误。
///
/// # 契约说明（What）
/// - 所有回调在管道绑定的事件循环线程上触发，实现可假定对自身状态的
///   单线程访问；
/// - 调用方通过 `ctx.fire_*` 继续传播："上游调用本节的 `on_read`，本节
///   调用 `ctx.fire_read`" 是类型化链路成立的纪律；
/// - 同一 Handler 实例同时绑定多条管道时必须自行同步，默认契约假定
///   至多绑定一条（见 [`AttachState`]）。
pub trait Handler: Send + Sync + 'static {
    /// 入站进入类型。
    type Rin: Send + 'static;
    /// 入站离开类型。
    type Rout: Send + 'static;
    /// 出站进入类型。
    type Win: Send + 'static;
    /// 出站离开类型。
    type Wout: Send + 'static;

    /// 处理一条入站消息。
    fn on_read(&self, ctx: &HandlerContext<Self::Rout, Self::Wout>, msg: Self::Rin);

    /// 对端关闭读方向。默认向后转发。
    fn on_read_eof(&self, ctx: &HandlerContext<Self::Rout, Self::Wout>) {
        ctx.fire_read_eof();
    }

    /// 入站异常。默认向后转发。
    fn on_read_exception(&self, ctx: &HandlerContext<Self::Rout, Self::Wout>, err: SluiceError) {
        ctx.fire_read_exception(err);
    }

    /// 传输变为活跃。默认向后转发。
    fn on_transport_active(&self, ctx: &HandlerContext<Self::Rout, Self::Wout>) {
        ctx.fire_transport_active();
    }

    /// 传输不再活跃。默认向后转发。
    fn on_transport_inactive(&self, ctx: &HandlerContext<Self::Rout, Self::Wout>) {
        ctx.fire_transport_inactive();
    }

    /// 处理一条出站消息。
    fn on_write(
        &self,
        ctx: &HandlerContext<Self::Rout, Self::Wout>,
        msg: Self::Win,
    ) -> Eventual<()>;

    /// 出站异常。默认向前转发。
    fn on_write_exception(
        &self,
        ctx: &HandlerContext<Self::Rout, Self::Wout>,
        err: SluiceError,
    ) -> Eventual<()> {
        ctx.fire_write_exception(err)
    }

    /// 关闭请求。默认向前转发。
    fn on_close(&self, ctx: &HandlerContext<Self::Rout, Self::Wout>) -> Eventual<()> {
        ctx.fire_close()
    }

    /// 绑定到管道后回调。
    fn on_attach(&self, ctx: &HandlerContext<Self::Rout, Self::Wout>) {
        let _ = ctx;
    }

    /// 从管道解绑后回调。
    fn on_detach(&self, ctx: &HandlerContext<Self::Rout, Self::Wout>) {
        let _ = ctx;
    }

    /// 暴露绑定计数状态。需要通过 [`AttachState::handler_context`] 找回
    /// 自身上下文的 Handler 内嵌一份 [`AttachState`] 并覆写本方法。
    fn attach_state(&self) -> Option<&AttachState> {
        None
    }
}

/// 仅入站的 Handler。
pub trait InboundHandler: Send + Sync + 'static {
    /// 入站进入类型。
    type Rin: Send + 'static;
    /// 入站离开类型。
    type Rout: Send + 'static;

    /// 处理一条入站消息。
    fn on_read(&self, ctx: &InboundContext<Self::Rout>, msg: Self::Rin);

    /// 对端关闭读方向。默认向后转发。
    fn on_read_eof(&self, ctx: &InboundContext<Self::Rout>) {
        ctx.fire_read_eof();
    }

    /// 入站异常。默认向后转发。
    fn on_read_exception(&self, ctx: &InboundContext<Self::Rout>, err: SluiceError) {
        ctx.fire_read_exception(err);
    }

    /// 传输变为活跃。默认向后转发。
    fn on_transport_active(&self, ctx: &InboundContext<Self::Rout>) {
        ctx.fire_transport_active();
    }

    /// 传输不再活跃。默认向后转发。
    fn on_transport_inactive(&self, ctx: &InboundContext<Self::Rout>) {
        ctx.fire_transport_inactive();
    }

    /// 绑定到管道后回调。
    fn on_attach(&self, ctx: &InboundContext<Self::Rout>) {
        let _ = ctx;
    }

    /// 从管道解绑后回调。
    fn on_detach(&self, ctx: &InboundContext<Self::Rout>) {
        let _ = ctx;
    }

    /// 见 [`Handler::attach_state`]。
    fn attach_state(&self) -> Option<&AttachState> {
        None
    }
}

/// 仅出站的 Handler。
pub trait OutboundHandler: Send + Sync + 'static {
    /// 出站进入类型。
    type Win: Send + 'static;
    /// 出站离开类型。
    type Wout: Send + 'static;

    /// 处理一条出站消息。
    fn on_write(&self, ctx: &OutboundContext<Self::Wout>, msg: Self::Win) -> Eventual<()>;

    /// 出站异常。默认向前转发。
    fn on_write_exception(
        &self,
        ctx: &OutboundContext<Self::Wout>,
        err: SluiceError,
    ) -> Eventual<()> {
        ctx.fire_write_exception(err)
    }

    /// 关闭请求。默认向前转发。
    fn on_close(&self, ctx: &OutboundContext<Self::Wout>) -> Eventual<()> {
        ctx.fire_close()
    }

    /// 绑定到管道后回调。
    fn on_attach(&self, ctx: &OutboundContext<Self::Wout>) {
        let _ = ctx;
    }

    /// 从管道解绑后回调。
    fn on_detach(&self, ctx: &OutboundContext<Self::Wout>) {
        let _ = ctx;
    }

    /// 见 [`Handler::attach_state`]。
    fn attach_state(&self) -> Option<&AttachState> {
        None
    }
}

/// 恒等转发的全双工 Handler：`on_read`/`on_write` 原样向后传。
///
/// 用作链路占位或测试探针的基类素材。
pub struct HandlerAdapter<R, W> {
    _types: PhantomData<fn(R, W)>,
}

impl<R, W> HandlerAdapter<R, W> {
    /// 创建恒等 Handler。
    pub fn new() -> Self {
        Self { _types: PhantomData }
    }
}

impl<R, W> Default for HandlerAdapter<R, W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, W> Handler for HandlerAdapter<R, W>
where
    R: Send + 'static,
    W: Send + 'static,
{
    type Rin = R;
    type Rout = R;
    type Win = W;
    type Wout = W;

    fn on_read(&self, ctx: &HandlerContext<R, W>, msg: R) {
        ctx.fire_read(msg);
    }

    fn on_write(&self, ctx: &HandlerContext<R, W>, msg: W) -> Eventual<()> {
        ctx.fire_write(msg)
    }
}

/// Handler 的绑定计数与已发布上下文。
///
/// # 契约说明（What）
/// - 每次 finalize 把 Handler 绑定到一条管道时计数加一；计数为 1 时
///   发布其唯一上下文，计数超过 1 即撤销发布——被多条管道共享的
///   Handler 无法交出"自己的那一个"上下文；
/// - [`AttachState::handler_context`] 等取回方法在类型标签不符时返回
///   `None`，防止内嵌方声明了与实际链节不一致的类型。
#[derive(Default)]
pub struct AttachState {
    count: AtomicUsize,
    ctx: Mutex<Option<Weak<ContextInner>>>,
}

impl AttachState {
    /// 创建未绑定状态。
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on_attach(&self, node: &Arc<ContextInner>) {
        let previous = self.count.fetch_add(1, Ordering::AcqRel);
        let mut slot = self.ctx.lock();
        *slot = if previous == 0 { Some(Arc::downgrade(node)) } else { None };
    }

    pub(crate) fn on_detach(&self) {
        let mut count = self.count.load(Ordering::Acquire);
        while count > 0 {
            match self.count.compare_exchange(
                count,
                count - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => count = actual,
            }
        }
        *self.ctx.lock() = None;
    }

    fn raw(&self) -> Option<Arc<ContextInner>> {
        if self.count.load(Ordering::Acquire) != 1 {
            return None;
        }
        self.ctx.lock().as_ref().and_then(Weak::upgrade)
    }

    /// 取回全双工上下文。仅在计数恰为 1 且类型标签吻合时返回。
    pub fn handler_context<Rout, Wout>(&self) -> Option<HandlerContext<Rout, Wout>>
    where
        Rout: Send + 'static,
        Wout: Send + 'static,
    {
        let node = self.raw()?;
        node.matches_duplex::<Rout, Wout>().then(|| HandlerContext::from_node(node))
    }

    /// 取回入站上下文。
    pub fn inbound_context<Rout>(&self) -> Option<InboundContext<Rout>>
    where
        Rout: Send + 'static,
    {
        let node = self.raw()?;
        node.matches_inbound::<Rout>().then(|| InboundContext::from_node(node))
    }

    /// 取回出站上下文。
    pub fn outbound_context<Wout>(&self) -> Option<OutboundContext<Wout>>
    where
        Wout: Send + 'static,
    {
        let node = self.raw()?;
        node.matches_outbound::<Wout>().then(|| OutboundContext::from_node(node))
    }
}
