//! 管道：单条连接上的有序 Handler 链。
//!
//! # 设计背景（Why）
//! - 入站事件沿插入顺序向后流过 IN 链，出站事件沿插入顺序的**反向**流过
//!   OUT 链：终端传输 Handler 通常最先加入，因此位于 IN 链之首、OUT 链之
//!   尾，恰好同时充当字节入口与字节出口；
//! - 链接关系不在加入时建立，而是由一次性的 [`Pipeline::finalize`] 统一
//!   装配，装配同时完成相邻链节的读/写类型标签校验。
//!
//! # 并发契约
//! - 管道绑定到其传输的事件循环；所有入口与 `fire_*` 调用必须发生在该
//!   循环线程上，内部互斥锁仅为满足 `Send + Sync` 而存在；
//! - 每次事件传播持有管道强引用，传播途中外部释放最后一个句柄不会导致
//!   管道中途析构（见 [`super::context::ContextInner`]）。

use std::sync::{Arc, Weak};

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use tracing::warn;

use crate::error::{Result, SluiceError, codes};
use crate::future::Eventual;
use crate::transport::{Transport, TransportInfo, WriteFlags};

use super::context::ContextInner;
use super::factory::PipelineManager;
use super::handler::{Handler, HandlerDir, InboundHandler, OutboundHandler};
use super::message::PipelineMessage;

const LOG_TARGET: &str = "sluice::pipeline";

/// 默认读缓冲配置：最小可用 2048 字节、单次分配 2048 字节。
const DEFAULT_READ_BUFFER: (usize, usize) = (2048, 2048);

/// 单条连接的 Handler 管道。
pub struct Pipeline {
    this: Weak<Pipeline>,
    ctxs: Mutex<Vec<Arc<ContextInner>>>,
    in_ctxs: Mutex<Vec<Arc<ContextInner>>>,
    out_ctxs: Mutex<Vec<Arc<ContextInner>>>,
    front: ArcSwapOption<ContextInner>,
    back: ArcSwapOption<ContextInner>,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    transport_info: Mutex<Option<TransportInfo>>,
    manager: Mutex<Option<Arc<dyn PipelineManager>>>,
    owner: Mutex<Option<Arc<ContextInner>>>,
    write_flags: Mutex<WriteFlags>,
    read_buffer_settings: Mutex<(usize, usize)>,
    frozen: Mutex<bool>,
}

impl Pipeline {
    /// 创建空管道。
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            ctxs: Mutex::new(Vec::new()),
            in_ctxs: Mutex::new(Vec::new()),
            out_ctxs: Mutex::new(Vec::new()),
            front: ArcSwapOption::empty(),
            back: ArcSwapOption::empty(),
            transport: Mutex::new(None),
            transport_info: Mutex::new(None),
            manager: Mutex::new(None),
            owner: Mutex::new(None),
            write_flags: Mutex::new(WriteFlags::NONE),
            read_buffer_settings: Mutex::new(DEFAULT_READ_BUFFER),
            frozen: Mutex::new(false),
        })
    }

    // ---- 装配 ----

    /// 在链尾加入全双工 Handler。
    pub fn add_back<H: Handler>(&self, handler: H) -> Result<()> {
        self.add_back_arc(Arc::new(handler))
    }

    /// 在链尾加入共享的全双工 Handler。
    pub fn add_back_arc<H: Handler>(&self, handler: Arc<H>) -> Result<()> {
        self.insert(ContextInner::duplex(self.this.clone(), handler), false)
    }

    /// 在链首加入全双工 Handler。
    pub fn add_front<H: Handler>(&self, handler: H) -> Result<()> {
        self.add_front_arc(Arc::new(handler))
    }

    /// 在链首加入共享的全双工 Handler。
    pub fn add_front_arc<H: Handler>(&self, handler: Arc<H>) -> Result<()> {
        self.insert(ContextInner::duplex(self.this.clone(), handler), true)
    }

    /// 在链尾加入入站 Handler。
    pub fn add_back_inbound<H: InboundHandler>(&self, handler: H) -> Result<()> {
        self.add_back_inbound_arc(Arc::new(handler))
    }

    /// 在链尾加入共享的入站 Handler。
    pub fn add_back_inbound_arc<H: InboundHandler>(&self, handler: Arc<H>) -> Result<()> {
        self.insert(ContextInner::inbound(self.this.clone(), handler), false)
    }

    /// 在链首加入入站 Handler。
    pub fn add_front_inbound<H: InboundHandler>(&self, handler: H) -> Result<()> {
        self.insert(ContextInner::inbound(self.this.clone(), Arc::new(handler)), true)
    }

    /// 在链尾加入出站 Handler。
    pub fn add_back_outbound<H: OutboundHandler>(&self, handler: H) -> Result<()> {
        self.add_back_outbound_arc(Arc::new(handler))
    }

    /// 在链尾加入共享的出站 Handler。
    pub fn add_back_outbound_arc<H: OutboundHandler>(&self, handler: Arc<H>) -> Result<()> {
        self.insert(ContextInner::outbound(self.this.clone(), handler), false)
    }

    /// 在链首加入出站 Handler。
    pub fn add_front_outbound<H: OutboundHandler>(&self, handler: H) -> Result<()> {
        self.insert(ContextInner::outbound(self.this.clone(), Arc::new(handler)), true)
    }

    fn insert(&self, ctx: ContextInner, front: bool) -> Result<()> {
        self.ensure_mutable("add")?;
        let ctx = Arc::new(ctx);
        let mut ctxs = self.ctxs.lock();
        if front {
            ctxs.insert(0, Arc::clone(&ctx));
        } else {
            ctxs.push(Arc::clone(&ctx));
        }
        drop(ctxs);

        let dir = ctx.direction();
        if matches!(dir, HandlerDir::Both | HandlerDir::In) {
            let mut list = self.in_ctxs.lock();
            if front {
                list.insert(0, Arc::clone(&ctx));
            } else {
                list.push(Arc::clone(&ctx));
            }
        }
        if matches!(dir, HandlerDir::Both | HandlerDir::Out) {
            let mut list = self.out_ctxs.lock();
            if front {
                list.insert(0, ctx);
            } else {
                list.push(ctx);
            }
        }
        Ok(())
    }

    /// 按类型移除全部同类 Handler。不存在时返回
    /// [`codes::PIPELINE_HANDLER_MISSING`]。
    pub fn remove<H: 'static>(&self) -> Result<()> {
        self.remove_where("remove", |ctx| ctx.handler_type_id() == std::any::TypeId::of::<H>())
    }

    /// 按身份移除指定 Handler 实例。
    pub fn remove_arc<H: 'static>(&self, handler: &Arc<H>) -> Result<()> {
        let target = Arc::as_ptr(handler).cast::<()>();
        self.remove_where("remove_arc", |ctx| ctx.handler_ptr() == target)
    }

    /// 移除链首 Handler。
    pub fn remove_front(&self) -> Result<()> {
        self.remove_at_edge(true)
    }

    /// 移除链尾 Handler。
    pub fn remove_back(&self) -> Result<()> {
        self.remove_at_edge(false)
    }

    fn remove_at_edge(&self, front: bool) -> Result<()> {
        self.ensure_mutable("remove")?;
        let target = {
            let ctxs = self.ctxs.lock();
            let ctx = if front { ctxs.first() } else { ctxs.last() };
            match ctx {
                Some(ctx) => Arc::clone(ctx),
                None => {
                    return Err(SluiceError::new(
                        codes::PIPELINE_HANDLER_MISSING,
                        "pipeline is empty",
                    ));
                }
            }
        };
        self.unlink(&target);
        Ok(())
    }

    fn remove_where(
        &self,
        op: &'static str,
        mut predicate: impl FnMut(&Arc<ContextInner>) -> bool,
    ) -> Result<()> {
        self.ensure_mutable(op)?;
        let matching: Vec<Arc<ContextInner>> = {
            let ctxs = self.ctxs.lock();
            ctxs.iter().filter(|ctx| predicate(ctx)).cloned().collect()
        };
        if matching.is_empty() {
            return Err(SluiceError::new(
                codes::PIPELINE_HANDLER_MISSING,
                format!("{op}: no such handler in pipeline"),
            ));
        }
        for ctx in matching {
            self.unlink(&ctx);
        }
        Ok(())
    }

    fn unlink(&self, target: &Arc<ContextInner>) {
        target.detach();
        self.ctxs.lock().retain(|ctx| !Arc::ptr_eq(ctx, target));
        self.in_ctxs.lock().retain(|ctx| !Arc::ptr_eq(ctx, target));
        self.out_ctxs.lock().retain(|ctx| !Arc::ptr_eq(ctx, target));
    }

    fn ensure_mutable(&self, op: &str) -> Result<()> {
        if *self.frozen.lock() {
            return Err(SluiceError::new(
                codes::PIPELINE_FROZEN,
                format!("{op}: pipeline is frozen"),
            ));
        }
        Ok(())
    }

    /// 冻结管道结构，此后增删 Handler 返回 [`codes::PIPELINE_FROZEN`]。
    pub fn freeze(&self) {
        *self.frozen.lock() = true;
    }

    /// 提名持有管道的 Handler：析构时跳过对它的解绑，打破
    /// "Handler 持有管道强引用"形成的环。按身份匹配，命中返回 `true`。
    pub fn set_owner<H: 'static>(&self, handler: &Arc<H>) -> bool {
        let target = Arc::as_ptr(handler).cast::<()>();
        let ctxs = self.ctxs.lock();
        for ctx in ctxs.iter() {
            if ctx.handler_ptr() == target {
                *self.owner.lock() = Some(Arc::clone(ctx));
                return true;
            }
        }
        false
    }

    /// 取首个类型为 `H` 的 Handler。
    pub fn handler<H: Send + Sync + 'static>(&self) -> Option<Arc<H>> {
        let ctxs = self.ctxs.lock();
        ctxs.iter()
            .find(|ctx| ctx.handler_type_id() == std::any::TypeId::of::<H>())
            .and_then(|ctx| ctx.handler_any().downcast::<H>().ok())
    }

    /// 当前 Handler 数量。
    pub fn num_handlers(&self) -> usize {
        self.ctxs.lock().len()
    }

    // ---- 装配收尾 ----

    /// 一次性链接装配。
    ///
    /// # 算法（What/How）
    /// 1. 正向遍历 IN 列表，为相邻链节建立 `next_in`，并校验前节的入站
    ///    离开类型与后节的入站进入类型一致；首节记为 `front`；
    /// 2. 反向遍历 OUT 列表建立 `next_out`（后节指向前节），同样校验
    ///    类型；末节记为 `back`；
    /// 3. 以插入顺序的反向为所有链节执行绑定回调。
    ///
    /// 类型不一致时返回 [`codes::PIPELINE_TYPE_MISMATCH`] 并指明出错的
    /// Handler；此时部分链接可能已建立，调用方应视本次装配为失败整体。
    pub fn finalize(&self) -> Result<()> {
        let in_list = self.in_ctxs.lock().clone();
        let out_list = self.out_ctxs.lock().clone();

        for pair in in_list.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            let out_tag = a.rout().map(|tag| tag.id);
            let in_tag = b.rin().map(|tag| tag.id);
            if out_tag != in_tag {
                return Err(SluiceError::new(
                    codes::PIPELINE_TYPE_MISMATCH,
                    format!(
                        "inbound type mismatch after {}: produces {}, {} consumes {}",
                        a.label(),
                        a.rout().map(|tag| tag.name).unwrap_or("<none>"),
                        b.label(),
                        b.rin().map(|tag| tag.name).unwrap_or("<none>"),
                    ),
                ));
            }
            a.set_next_in(Some(Arc::clone(b)));
        }
        if let Some(last) = in_list.last() {
            last.set_next_in(None);
        }
        self.front.store(in_list.first().cloned());

        for pair in out_list.windows(2) {
            let (earlier, later) = (&pair[0], &pair[1]);
            let out_tag = later.wout().map(|tag| tag.id);
            let in_tag = earlier.win().map(|tag| tag.id);
            if out_tag != in_tag {
                return Err(SluiceError::new(
                    codes::PIPELINE_TYPE_MISMATCH,
                    format!(
                        "outbound type mismatch after {}: produces {}, {} consumes {}",
                        later.label(),
                        later.wout().map(|tag| tag.name).unwrap_or("<none>"),
                        earlier.label(),
                        earlier.win().map(|tag| tag.name).unwrap_or("<none>"),
                    ),
                ));
            }
            later.set_next_out(Some(Arc::clone(earlier)));
        }
        if let Some(first) = out_list.first() {
            first.set_next_out(None);
        }
        self.back.store(out_list.last().cloned());

        if in_list.is_empty() {
            warn!(target: LOG_TARGET, "no inbound handler in pipeline; inbound entries will fail");
        }
        if out_list.is_empty() {
            warn!(target: LOG_TARGET, "no outbound handler in pipeline; outbound entries will fail");
        }

        let ctxs = self.ctxs.lock().clone();
        for ctx in ctxs.iter().rev() {
            ctx.attach();
        }
        Ok(())
    }

    // ---- 入站入口 ----

    /// 从链首注入一条入站消息。
    pub fn read<R: Send + 'static>(&self, msg: R) -> Result<()> {
        let front = self.require_front("read()")?;
        let msg = PipelineMessage::new(msg);
        self.check_entry_type(&front, &msg)?;
        front.invoke_read(msg);
        Ok(())
    }

    /// 从链首注入读 EOF。
    pub fn read_eof(&self) -> Result<()> {
        self.require_front("read_eof()")?.invoke_read_eof();
        Ok(())
    }

    /// 从链首注入入站异常。
    pub fn read_exception(&self, err: SluiceError) -> Result<()> {
        self.require_front("read_exception()")?.invoke_read_exception(err);
        Ok(())
    }

    /// 从链首广播传输活跃。IN 链为空时静默返回。
    pub fn transport_active(&self) {
        if let Some(front) = self.front.load_full() {
            front.invoke_transport_active();
        }
    }

    /// 从链首广播传输失活。IN 链为空时静默返回。
    pub fn transport_inactive(&self) {
        if let Some(front) = self.front.load_full() {
            front.invoke_transport_inactive();
        }
    }

    fn require_front(&self, op: &str) -> Result<Arc<ContextInner>> {
        self.front.load_full().ok_or_else(|| {
            SluiceError::new(
                codes::PIPELINE_MISSING_CHAIN,
                format!("{op}: no inbound handler in pipeline"),
            )
        })
    }

    fn check_entry_type(&self, front: &Arc<ContextInner>, msg: &PipelineMessage) -> Result<()> {
        let expected = front.rin();
        if expected.map(|tag| tag.id) != Some(msg.type_id()) {
            return Err(SluiceError::new(
                codes::PIPELINE_ENTRY_TYPE,
                format!(
                    "read(): front handler {} consumes {}, got {}",
                    front.label(),
                    expected.map(|tag| tag.name).unwrap_or("<none>"),
                    msg.type_name(),
                ),
            ));
        }
        Ok(())
    }

    // ---- 出站入口 ----

    /// 从链尾注入一条出站消息。
    pub fn write<W: Send + 'static>(&self, msg: W) -> Result<Eventual<()>> {
        let back = self.require_back("write()")?;
        let msg = PipelineMessage::new(msg);
        let expected = back.win();
        if expected.map(|tag| tag.id) != Some(msg.type_id()) {
            return Err(SluiceError::new(
                codes::PIPELINE_ENTRY_TYPE,
                format!(
                    "write(): back handler {} consumes {}, got {}",
                    back.label(),
                    expected.map(|tag| tag.name).unwrap_or("<none>"),
                    msg.type_name(),
                ),
            ));
        }
        Ok(back.invoke_write(msg))
    }

    /// 从链尾注入出站异常。
    pub fn write_exception(&self, err: SluiceError) -> Result<Eventual<()>> {
        Ok(self.require_back("write_exception()")?.invoke_write_exception(err))
    }

    /// 从链尾发起关闭。
    pub fn close(&self) -> Result<Eventual<()>> {
        Ok(self.require_back("close()")?.invoke_close())
    }

    fn require_back(&self, op: &str) -> Result<Arc<ContextInner>> {
        self.back.load_full().ok_or_else(|| {
            SluiceError::new(
                codes::PIPELINE_MISSING_CHAIN,
                format!("{op}: no outbound handler in pipeline"),
            )
        })
    }

    // ---- 附属状态 ----

    /// 绑定传输。传 `None` 解绑。
    pub fn set_transport(&self, transport: Option<Arc<dyn Transport>>) {
        *self.transport.lock() = transport;
    }

    /// 当前绑定的传输。
    pub fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport.lock().clone()
    }

    /// 设置连接元信息。
    pub fn set_transport_info(&self, info: Option<TransportInfo>) {
        *self.transport_info.lock() = info;
    }

    /// 连接元信息。
    pub fn transport_info(&self) -> Option<TransportInfo> {
        self.transport_info.lock().clone()
    }

    /// 设置生命周期观察者。
    pub fn set_manager(&self, manager: Option<Arc<dyn PipelineManager>>) {
        *self.manager.lock() = manager;
    }

    /// 当前观察者。
    pub fn manager(&self) -> Option<Arc<dyn PipelineManager>> {
        self.manager.lock().clone()
    }

    /// 请求观察者销毁本管道。未设置观察者时为空操作。
    pub fn delete_pipeline(self: &Arc<Self>) {
        let manager = self.manager.lock().clone();
        if let Some(manager) = manager {
            manager.delete_pipeline(self);
        }
    }

    /// 向观察者上报读写活动，用于空闲超时刷新。
    pub fn refresh_timeout(&self) {
        let manager = self.manager.lock().clone();
        if let Some(manager) = manager {
            manager.refresh_timeout();
        }
    }

    /// 设置写标志。
    pub fn set_write_flags(&self, flags: WriteFlags) {
        *self.write_flags.lock() = flags;
    }

    /// 当前写标志。
    pub fn write_flags(&self) -> WriteFlags {
        *self.write_flags.lock()
    }

    /// 设置读缓冲参数 `(最小可用, 分配尺寸)`。
    pub fn set_read_buffer_settings(&self, min_available: usize, allocation_size: usize) {
        *self.read_buffer_settings.lock() = (min_available, allocation_size);
    }

    /// 读缓冲参数。
    pub fn read_buffer_settings(&self) -> (usize, usize) {
        *self.read_buffer_settings.lock()
    }
}

impl Drop for Pipeline {
    /// 以插入顺序的反向解绑所有 Handler，靠近应用的链节先于终端传输
    /// 链节拆除；被提名的 owner 链节跳过。
    fn drop(&mut self) {
        let owner = self.owner.lock().take();
        let ctxs = std::mem::take(&mut *self.ctxs.lock());
        for ctx in ctxs.iter().rev() {
            let is_owner = owner.as_ref().is_some_and(|o| Arc::ptr_eq(o, ctx));
            if !is_owner {
                ctx.detach();
            }
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("handlers", &self.num_handlers())
            .field("frozen", &*self.frozen.lock())
            .finish()
    }
}
