//! 链节与事件传播。
//!
//! 每个被加入管道的 Handler 获得一个与之一一对应的链节
//! （[`ContextInner`]）：它既是 Handler 向外传播事件的 `fire_*` 表面，又是
//! 入站/出站单向链表中的节点。Handler 看到的是带类型参数的轻量视图
//! （[`HandlerContext`] / [`InboundContext`] / [`OutboundContext`]），视图间
//! 的类型一致性由 finalize 阶段的标签校验保证，因此穿过链节边界的向下
//! 转型不会失败。

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwapOption;
use tracing::{error, warn};

use crate::error::SluiceError;
use crate::future::Eventual;
use crate::runtime::EventBase;
use crate::transport::{Transport, WriteFlags};

use super::handler::{
    AttachState, Handler, HandlerDir, InboundHandler, OutboundHandler, TypeTag,
};
use super::message::PipelineMessage;
use super::pipeline::Pipeline;

const LOG_TARGET: &str = "sluice::pipeline";

/// 链节：Handler 的管道内化身。
///
/// # 契约说明（What）
/// - `next_in` / `next_out` 在 finalize 时装配；入站事件沿 `next_in` 向后，
///   出站事件沿 `next_out` 向前；
/// - 每次传播先将管道弱引用升级为强引用并持有到调用结束，保证管道
///   不会在传播中途析构；
/// - 链尾：入站事件丢弃并记录警告，出站事件以成功的空 [`Eventual`] 收尾。
pub(crate) struct ContextInner {
    direction: HandlerDir,
    rin: Option<TypeTag>,
    rout: Option<TypeTag>,
    win: Option<TypeTag>,
    wout: Option<TypeTag>,
    pipeline: Weak<Pipeline>,
    next_in: ArcSwapOption<ContextInner>,
    next_out: ArcSwapOption<ContextInner>,
    slot: Box<dyn ErasedSlot>,
    attached: AtomicBool,
}

impl ContextInner {
    pub(crate) fn duplex<H: Handler>(pipeline: Weak<Pipeline>, handler: Arc<H>) -> Self {
        Self {
            direction: HandlerDir::Both,
            rin: Some(TypeTag::of::<H::Rin>()),
            rout: Some(TypeTag::of::<H::Rout>()),
            win: Some(TypeTag::of::<H::Win>()),
            wout: Some(TypeTag::of::<H::Wout>()),
            pipeline,
            next_in: ArcSwapOption::empty(),
            next_out: ArcSwapOption::empty(),
            slot: Box::new(DuplexSlot { handler }),
            attached: AtomicBool::new(false),
        }
    }

    pub(crate) fn inbound<H: InboundHandler>(pipeline: Weak<Pipeline>, handler: Arc<H>) -> Self {
        Self {
            direction: HandlerDir::In,
            rin: Some(TypeTag::of::<H::Rin>()),
            rout: Some(TypeTag::of::<H::Rout>()),
            win: None,
            wout: None,
            pipeline,
            next_in: ArcSwapOption::empty(),
            next_out: ArcSwapOption::empty(),
            slot: Box::new(InboundSlot { handler }),
            attached: AtomicBool::new(false),
        }
    }

    pub(crate) fn outbound<H: OutboundHandler>(pipeline: Weak<Pipeline>, handler: Arc<H>) -> Self {
        Self {
            direction: HandlerDir::Out,
            rin: None,
            rout: None,
            win: Some(TypeTag::of::<H::Win>()),
            wout: Some(TypeTag::of::<H::Wout>()),
            pipeline,
            next_in: ArcSwapOption::empty(),
            next_out: ArcSwapOption::empty(),
            slot: Box::new(OutboundSlot { handler }),
            attached: AtomicBool::new(false),
        }
    }

    pub(crate) fn direction(&self) -> HandlerDir {
        self.direction
    }

    pub(crate) fn rin(&self) -> Option<TypeTag> {
        self.rin
    }

    pub(crate) fn rout(&self) -> Option<TypeTag> {
        self.rout
    }

    pub(crate) fn win(&self) -> Option<TypeTag> {
        self.win
    }

    pub(crate) fn wout(&self) -> Option<TypeTag> {
        self.wout
    }

    /// Handler 的类型名，用于错误信息与日志。
    pub(crate) fn label(&self) -> &'static str {
        self.slot.describe()
    }

    pub(crate) fn handler_type_id(&self) -> std::any::TypeId {
        self.slot.handler_type_id()
    }

    pub(crate) fn handler_ptr(&self) -> *const () {
        self.slot.handler_ptr()
    }

    pub(crate) fn handler_any(&self) -> Arc<dyn std::any::Any + Send + Sync> {
        self.slot.handler_any()
    }

    pub(crate) fn set_next_in(&self, next: Option<Arc<ContextInner>>) {
        self.next_in.store(next);
    }

    pub(crate) fn set_next_out(&self, next: Option<Arc<ContextInner>>) {
        self.next_out.store(next);
    }

    pub(crate) fn attach(self: &Arc<Self>) {
        if !self.attached.swap(true, Ordering::AcqRel) {
            if let Some(state) = self.slot.attach_state() {
                state.on_attach(self);
            }
            self.slot.attach(self);
        }
    }

    pub(crate) fn detach(self: &Arc<Self>) {
        if self.attached.swap(false, Ordering::AcqRel) {
            self.slot.detach(self);
            if let Some(state) = self.slot.attach_state() {
                state.on_detach();
            }
        }
    }

    pub(crate) fn matches_duplex<Rout: 'static, Wout: 'static>(&self) -> bool {
        self.rout.map(|tag| tag.id) == Some(std::any::TypeId::of::<Rout>())
            && self.wout.map(|tag| tag.id) == Some(std::any::TypeId::of::<Wout>())
    }

    pub(crate) fn matches_inbound<Rout: 'static>(&self) -> bool {
        self.rout.map(|tag| tag.id) == Some(std::any::TypeId::of::<Rout>())
    }

    pub(crate) fn matches_outbound<Wout: 'static>(&self) -> bool {
        self.wout.map(|tag| tag.id) == Some(std::any::TypeId::of::<Wout>())
    }

    // ---- 调用本链节的 Handler（由上游链节或管道入口触发） ----

    pub(crate) fn invoke_read(self: &Arc<Self>, msg: PipelineMessage) {
        let _guard = self.pipeline.upgrade();
        self.slot.read(self, msg);
    }

    pub(crate) fn invoke_read_eof(self: &Arc<Self>) {
        let _guard = self.pipeline.upgrade();
        self.slot.read_eof(self);
    }

    pub(crate) fn invoke_read_exception(self: &Arc<Self>, err: SluiceError) {
        let _guard = self.pipeline.upgrade();
        self.slot.read_exception(self, err);
    }

    pub(crate) fn invoke_transport_active(self: &Arc<Self>) {
        let _guard = self.pipeline.upgrade();
        self.slot.transport_active(self);
    }

    pub(crate) fn invoke_transport_inactive(self: &Arc<Self>) {
        let _guard = self.pipeline.upgrade();
        self.slot.transport_inactive(self);
    }

    pub(crate) fn invoke_write(self: &Arc<Self>, msg: PipelineMessage) -> Eventual<()> {
        let _guard = self.pipeline.upgrade();
        self.slot.write(self, msg)
    }

    pub(crate) fn invoke_write_exception(self: &Arc<Self>, err: SluiceError) -> Eventual<()> {
        let _guard = self.pipeline.upgrade();
        self.slot.write_exception(self, err)
    }

    pub(crate) fn invoke_close(self: &Arc<Self>) -> Eventual<()> {
        let _guard = self.pipeline.upgrade();
        self.slot.close(self)
    }

    // ---- 向相邻链节传播（由本链节的 Handler 通过 fire_* 触发） ----

    pub(crate) fn forward_read(&self, msg: PipelineMessage) {
        let _guard = self.pipeline.upgrade();
        match self.next_in.load_full() {
            Some(next) => next.invoke_read(msg),
            None => warn!(
                target: LOG_TARGET,
                message_type = msg.type_name(),
                "read reached end of pipeline"
            ),
        }
    }

    pub(crate) fn forward_read_eof(&self) {
        let _guard = self.pipeline.upgrade();
        match self.next_in.load_full() {
            Some(next) => next.invoke_read_eof(),
            None => warn!(target: LOG_TARGET, "read_eof reached end of pipeline"),
        }
    }

    pub(crate) fn forward_read_exception(&self, err: SluiceError) {
        let _guard = self.pipeline.upgrade();
        match self.next_in.load_full() {
            Some(next) => next.invoke_read_exception(err),
            None => warn!(
                target: LOG_TARGET,
                error = %err,
                "read_exception reached end of pipeline"
            ),
        }
    }

    pub(crate) fn forward_transport_active(&self) {
        let _guard = self.pipeline.upgrade();
        if let Some(next) = self.next_in.load_full() {
            next.invoke_transport_active();
        }
    }

    pub(crate) fn forward_transport_inactive(&self) {
        let _guard = self.pipeline.upgrade();
        if let Some(next) = self.next_in.load_full() {
            next.invoke_transport_inactive();
        }
    }

    pub(crate) fn forward_write(&self, msg: PipelineMessage) -> Eventual<()> {
        let _guard = self.pipeline.upgrade();
        match self.next_out.load_full() {
            Some(next) => next.invoke_write(msg),
            None => {
                warn!(
                    target: LOG_TARGET,
                    message_type = msg.type_name(),
                    "write reached end of pipeline"
                );
                Eventual::ready(())
            }
        }
    }

    pub(crate) fn forward_write_exception(&self, err: SluiceError) -> Eventual<()> {
        let _guard = self.pipeline.upgrade();
        match self.next_out.load_full() {
            Some(next) => next.invoke_write_exception(err),
            None => {
                warn!(target: LOG_TARGET, error = %err, "write_exception reached end of pipeline");
                Eventual::ready(())
            }
        }
    }

    pub(crate) fn forward_close(&self) -> Eventual<()> {
        let _guard = self.pipeline.upgrade();
        match self.next_out.load_full() {
            Some(next) => next.invoke_close(),
            None => {
                warn!(target: LOG_TARGET, "close reached end of pipeline");
                Eventual::ready(())
            }
        }
    }

    // ---- 公共访问器 ----

    pub(crate) fn pipeline_strong(&self) -> Option<Arc<Pipeline>> {
        self.pipeline.upgrade()
    }

    pub(crate) fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.pipeline.upgrade().and_then(|p| p.transport())
    }
}

/// 类型擦除的 Handler 槽位。
///
/// 入站/出站/双工三种适配器把擦除消息转回 Handler 的关联类型；finalize
/// 的标签校验保证转换必然成功，失败路径仅为防御性日志。
pub(crate) trait ErasedSlot: Send + Sync {
    fn describe(&self) -> &'static str;
    fn handler_type_id(&self) -> std::any::TypeId;
    fn handler_ptr(&self) -> *const ();
    fn handler_any(&self) -> Arc<dyn std::any::Any + Send + Sync>;
    fn attach_state(&self) -> Option<&AttachState>;

    fn attach(&self, node: &Arc<ContextInner>);
    fn detach(&self, node: &Arc<ContextInner>);

    fn read(&self, node: &Arc<ContextInner>, msg: PipelineMessage) {
        let _ = node;
        error!(
            target: LOG_TARGET,
            handler = self.describe(),
            message_type = msg.type_name(),
            "inbound event delivered to non-inbound handler"
        );
    }

    fn read_eof(&self, node: &Arc<ContextInner>) {
        let _ = node;
    }

    fn read_exception(&self, node: &Arc<ContextInner>, err: SluiceError) {
        let _ = (node, err);
    }

    fn transport_active(&self, node: &Arc<ContextInner>) {
        let _ = node;
    }

    fn transport_inactive(&self, node: &Arc<ContextInner>) {
        let _ = node;
    }

    fn write(&self, node: &Arc<ContextInner>, msg: PipelineMessage) -> Eventual<()> {
        let _ = node;
        error!(
            target: LOG_TARGET,
            handler = self.describe(),
            message_type = msg.type_name(),
            "outbound event delivered to non-outbound handler"
        );
        Eventual::ready(())
    }

    fn write_exception(&self, node: &Arc<ContextInner>, err: SluiceError) -> Eventual<()> {
        let _ = (node, err);
        Eventual::ready(())
    }

    fn close(&self, node: &Arc<ContextInner>) -> Eventual<()> {
        let _ = node;
        Eventual::ready(())
    }
}

struct DuplexSlot<H: Handler> {
    handler: Arc<H>,
}

impl<H: Handler> DuplexSlot<H> {
    fn ctx(&self, node: &Arc<ContextInner>) -> HandlerContext<H::Rout, H::Wout> {
        HandlerContext::from_node(Arc::clone(node))
    }
}

impl<H: Handler> ErasedSlot for DuplexSlot<H> {
    fn describe(&self) -> &'static str {
        std::any::type_name::<H>()
    }

    fn handler_type_id(&self) -> std::any::TypeId {
        std::any::TypeId::of::<H>()
    }

    fn handler_ptr(&self) -> *const () {
        Arc::as_ptr(&self.handler).cast()
    }

    fn handler_any(&self) -> Arc<dyn std::any::Any + Send + Sync> {
        Arc::clone(&self.handler) as Arc<dyn std::any::Any + Send + Sync>
    }

    fn attach_state(&self) -> Option<&AttachState> {
        self.handler.attach_state()
    }

    fn attach(&self, node: &Arc<ContextInner>) {
        self.handler.on_attach(&self.ctx(node));
    }

    fn detach(&self, node: &Arc<ContextInner>) {
        self.handler.on_detach(&self.ctx(node));
    }

    fn read(&self, node: &Arc<ContextInner>, msg: PipelineMessage) {
        match msg.downcast::<H::Rin>() {
            Ok(msg) => self.handler.on_read(&self.ctx(node), msg),
            Err(msg) => drop_mismatched(self.describe(), &msg),
        }
    }

    fn read_eof(&self, node: &Arc<ContextInner>) {
        self.handler.on_read_eof(&self.ctx(node));
    }

    fn read_exception(&self, node: &Arc<ContextInner>, err: SluiceError) {
        self.handler.on_read_exception(&self.ctx(node), err);
    }

    fn transport_active(&self, node: &Arc<ContextInner>) {
        self.handler.on_transport_active(&self.ctx(node));
    }

    fn transport_inactive(&self, node: &Arc<ContextInner>) {
        self.handler.on_transport_inactive(&self.ctx(node));
    }

    fn write(&self, node: &Arc<ContextInner>, msg: PipelineMessage) -> Eventual<()> {
        match msg.downcast::<H::Win>() {
            Ok(msg) => self.handler.on_write(&self.ctx(node), msg),
            Err(msg) => {
                drop_mismatched(self.describe(), &msg);
                Eventual::failed(mismatch_error(self.describe(), &msg))
            }
        }
    }

    fn write_exception(&self, node: &Arc<ContextInner>, err: SluiceError) -> Eventual<()> {
        self.handler.on_write_exception(&self.ctx(node), err)
    }

    fn close(&self, node: &Arc<ContextInner>) -> Eventual<()> {
        self.handler.on_close(&self.ctx(node))
    }
}

struct InboundSlot<H: InboundHandler> {
    handler: Arc<H>,
}

impl<H: InboundHandler> InboundSlot<H> {
    fn ctx(&self, node: &Arc<ContextInner>) -> InboundContext<H::Rout> {
        InboundContext::from_node(Arc::clone(node))
    }
}

impl<H: InboundHandler> ErasedSlot for InboundSlot<H> {
    fn describe(&self) -> &'static str {
        std::any::type_name::<H>()
    }

    fn handler_type_id(&self) -> std::any::TypeId {
        std::any::TypeId::of::<H>()
    }

    fn handler_ptr(&self) -> *const () {
        Arc::as_ptr(&self.handler).cast()
    }

    fn handler_any(&self) -> Arc<dyn std::any::Any + Send + Sync> {
        Arc::clone(&self.handler) as Arc<dyn std::any::Any + Send + Sync>
    }

    fn attach_state(&self) -> Option<&AttachState> {
        self.handler.attach_state()
    }

    fn attach(&self, node: &Arc<ContextInner>) {
        self.handler.on_attach(&self.ctx(node));
    }

    fn detach(&self, node: &Arc<ContextInner>) {
        self.handler.on_detach(&self.ctx(node));
    }

    fn read(&self, node: &Arc<ContextInner>, msg: PipelineMessage) {
        match msg.downcast::<H::Rin>() {
            Ok(msg) => self.handler.on_read(&self.ctx(node), msg),
            Err(msg) => drop_mismatched(self.describe(), &msg),
        }
    }

    fn read_eof(&self, node: &Arc<ContextInner>) {
        self.handler.on_read_eof(&self.ctx(node));
    }

    fn read_exception(&self, node: &Arc<ContextInner>, err: SluiceError) {
        self.handler.on_read_exception(&self.ctx(node), err);
    }

    fn transport_active(&self, node: &Arc<ContextInner>) {
        self.handler.on_transport_active(&self.ctx(node));
    }

    fn transport_inactive(&self, node: &Arc<ContextInner>) {
        self.handler.on_transport_inactive(&self.ctx(node));
    }
}

struct OutboundSlot<H: OutboundHandler> {
    handler: Arc<H>,
}

impl<H: OutboundHandler> OutboundSlot<H> {
    fn ctx(&self, node: &Arc<ContextInner>) -> OutboundContext<H::Wout> {
        OutboundContext::from_node(Arc::clone(node))
    }
}

impl<H: OutboundHandler> ErasedSlot for OutboundSlot<H> {
    fn describe(&self) -> &'static str {
        std::any::type_name::<H>()
    }

    fn handler_type_id(&self) -> std::any::TypeId {
        std::any::TypeId::of::<H>()
    }

    fn handler_ptr(&self) -> *const () {
        Arc::as_ptr(&self.handler).cast()
    }

    fn handler_any(&self) -> Arc<dyn std::any::Any + Send + Sync> {
        Arc::clone(&self.handler) as Arc<dyn std::any::Any + Send + Sync>
    }

    fn attach_state(&self) -> Option<&AttachState> {
        self.handler.attach_state()
    }

    fn attach(&self, node: &Arc<ContextInner>) {
        self.handler.on_attach(&self.ctx(node));
    }

    fn detach(&self, node: &Arc<ContextInner>) {
        self.handler.on_detach(&self.ctx(node));
    }

    fn write(&self, node: &Arc<ContextInner>, msg: PipelineMessage) -> Eventual<()> {
        match msg.downcast::<H::Win>() {
            Ok(msg) => self.handler.on_write(&self.ctx(node), msg),
            Err(msg) => {
                drop_mismatched(self.describe(), &msg);
                Eventual::failed(mismatch_error(self.describe(), &msg))
            }
        }
    }

    fn write_exception(&self, node: &Arc<ContextInner>, err: SluiceError) -> Eventual<()> {
        self.handler.on_write_exception(&self.ctx(node), err)
    }

    fn close(&self, node: &Arc<ContextInner>) -> Eventual<()> {
        self.handler.on_close(&self.ctx(node))
    }
}

fn drop_mismatched(handler: &'static str, msg: &PipelineMessage) {
    error!(
        target: LOG_TARGET,
        handler,
        message_type = msg.type_name(),
        "message type escaped finalize-time verification; dropping"
    );
}

fn mismatch_error(handler: &'static str, msg: &PipelineMessage) -> SluiceError {
    SluiceError::new(
        crate::error::codes::PIPELINE_TYPE_MISMATCH,
        format!("{} cannot accept {}", handler, msg.type_name()),
    )
}

macro_rules! common_context_accessors {
    () => {
        /// 所属管道的强引用；管道已析构时返回 `None`。
        pub fn pipeline(&self) -> Option<Arc<Pipeline>> {
            self.node.pipeline_strong()
        }

        /// 当前绑定的传输。
        pub fn transport(&self) -> Option<Arc<dyn Transport>> {
            self.node.transport()
        }

        /// 传输绑定的事件循环。
        pub fn event_base(&self) -> Option<Arc<EventBase>> {
            self.node.transport().map(|t| t.event_base())
        }

        /// 管道级写标志。
        pub fn write_flags(&self) -> WriteFlags {
            self.node
                .pipeline_strong()
                .map(|p| p.write_flags())
                .unwrap_or(WriteFlags::NONE)
        }

        /// 管道级读缓冲配置 `(最小可用, 分配尺寸)`。
        pub fn read_buffer_settings(&self) -> (usize, usize) {
            self.node
                .pipeline_strong()
                .map(|p| p.read_buffer_settings())
                .unwrap_or((2048, 2048))
        }
    };
}

/// 全双工 Handler 的上下文视图。
pub struct HandlerContext<Rout, Wout> {
    node: Arc<ContextInner>,
    _types: PhantomData<fn(Rout, Wout)>,
}

impl<Rout, Wout> Clone for HandlerContext<Rout, Wout> {
    fn clone(&self) -> Self {
        Self { node: Arc::clone(&self.node), _types: PhantomData }
    }
}

impl<Rout, Wout> HandlerContext<Rout, Wout>
where
    Rout: Send + 'static,
    Wout: Send + 'static,
{
    pub(crate) fn from_node(node: Arc<ContextInner>) -> Self {
        Self { node, _types: PhantomData }
    }

    common_context_accessors!();

    /// 把入站消息传给下一个入站链节。
    pub fn fire_read(&self, msg: Rout) {
        self.node.forward_read(PipelineMessage::new(msg));
    }

    /// 向后传播读 EOF。
    pub fn fire_read_eof(&self) {
        self.node.forward_read_eof();
    }

    /// 向后传播入站异常。
    pub fn fire_read_exception(&self, err: SluiceError) {
        self.node.forward_read_exception(err);
    }

    /// 向后传播传输活跃事件。
    pub fn fire_transport_active(&self) {
        self.node.forward_transport_active();
    }

    /// 向后传播传输失活事件。
    pub fn fire_transport_inactive(&self) {
        self.node.forward_transport_inactive();
    }

    /// 把出站消息传给前一个出站链节。
    pub fn fire_write(&self, msg: Wout) -> Eventual<()> {
        self.node.forward_write(PipelineMessage::new(msg))
    }

    /// 向前传播出站异常。
    pub fn fire_write_exception(&self, err: SluiceError) -> Eventual<()> {
        self.node.forward_write_exception(err)
    }

    /// 向前传播关闭请求。
    pub fn fire_close(&self) -> Eventual<()> {
        self.node.forward_close()
    }
}

/// 入站 Handler 的上下文视图。
pub struct InboundContext<Rout> {
    node: Arc<ContextInner>,
    _types: PhantomData<fn(Rout)>,
}

impl<Rout> Clone for InboundContext<Rout> {
    fn clone(&self) -> Self {
        Self { node: Arc::clone(&self.node), _types: PhantomData }
    }
}

impl<Rout> InboundContext<Rout>
where
    Rout: Send + 'static,
{
    pub(crate) fn from_node(node: Arc<ContextInner>) -> Self {
        Self { node, _types: PhantomData }
    }

    common_context_accessors!();

    /// 把入站消息传给下一个入站链节。
    pub fn fire_read(&self, msg: Rout) {
        self.node.forward_read(PipelineMessage::new(msg));
    }

    /// 向后传播读 EOF。
    pub fn fire_read_eof(&self) {
        self.node.forward_read_eof();
    }

    /// 向后传播入站异常。
    pub fn fire_read_exception(&self, err: SluiceError) {
        self.node.forward_read_exception(err);
    }

    /// 向后传播传输活跃事件。
    pub fn fire_transport_active(&self) {
        self.node.forward_transport_active();
    }

    /// 向后传播传输失活事件。
    pub fn fire_transport_inactive(&self) {
        self.node.forward_transport_inactive();
    }
}

/// 出站 Handler 的上下文视图。
pub struct OutboundContext<Wout> {
    node: Arc<ContextInner>,
    _types: PhantomData<fn(Wout)>,
}

impl<Wout> Clone for OutboundContext<Wout> {
    fn clone(&self) -> Self {
        Self { node: Arc::clone(&self.node), _types: PhantomData }
    }
}

impl<Wout> OutboundContext<Wout>
where
    Wout: Send + 'static,
{
    pub(crate) fn from_node(node: Arc<ContextInner>) -> Self {
        Self { node, _types: PhantomData }
    }

    common_context_accessors!();

    /// 把出站消息传给前一个出站链节。
    pub fn fire_write(&self, msg: Wout) -> Eventual<()> {
        self.node.forward_write(PipelineMessage::new(msg))
    }

    /// 向前传播出站异常。
    pub fn fire_write_exception(&self, err: SluiceError) -> Eventual<()> {
        self.node.forward_write_exception(err)
    }

    /// 向前传播关闭请求。
    pub fn fire_close(&self) -> Eventual<()> {
        self.node.forward_close()
    }
}
