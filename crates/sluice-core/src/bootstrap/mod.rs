//! 客户端引导：拨号、装配管道、交付管道。
//!
//! [`ClientBootstrap`] 是管道与拨号器之上的一层薄封装：`connect` 在选定
//! 的事件循环上建连，成功后经工厂装配管道、广播 `transport_active`，并
//! 把管道作为终值交付。引导程序持有产出的管道（持有者归属调用方手中
//! 的引导程序实例）。

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{Result, SluiceError, codes};
use crate::future::{Eventual, Promise};
use crate::pipeline::{Pipeline, PipelineFactory};
use crate::runtime::{EventBase, EventBaseGroup};
use crate::transport::{DialOptions, Dialer, TlsContext, TlsDialOptions, TlsSessionHandle};

/// TLS 会话建立回调：握手未复用既有会话时收到新会话句柄。
pub type SessionEstablishedCallback = Arc<dyn Fn(TlsSessionHandle) + Send + Sync>;

#[derive(Clone)]
struct TlsClientConfig {
    context: Arc<dyn TlsContext>,
    sni: Option<String>,
    session: Option<TlsSessionHandle>,
    defer_negotiation: bool,
}

/// 客户端引导程序。
///
/// # 使用方式（How）
/// - 链式配置：`pipeline_factory` 与 `dialer` 必选，`group` / `event_base`
///   二选一提供事件循环来源，TLS 相关项可选；
/// - `connect` 可多次调用；引导程序保留最近一次成功产出的管道。
pub struct ClientBootstrap {
    factory: Mutex<Option<Arc<dyn PipelineFactory>>>,
    dialer: Mutex<Option<Arc<dyn Dialer>>>,
    group: Mutex<Option<Arc<EventBaseGroup>>>,
    base: Mutex<Option<Arc<EventBase>>>,
    tls: Mutex<Option<TlsClientConfig>>,
    session_callback: Mutex<Option<SessionEstablishedCallback>>,
    pipeline: Mutex<Option<Arc<Pipeline>>>,
}

impl ClientBootstrap {
    /// 创建空引导程序。
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            factory: Mutex::new(None),
            dialer: Mutex::new(None),
            group: Mutex::new(None),
            base: Mutex::new(None),
            tls: Mutex::new(None),
            session_callback: Mutex::new(None),
            pipeline: Mutex::new(None),
        })
    }

    /// 设置管道工厂。
    pub fn pipeline_factory(self: &Arc<Self>, factory: Arc<dyn PipelineFactory>) -> &Arc<Self> {
        *self.factory.lock() = Some(factory);
        self
    }

    /// 设置拨号器。
    pub fn dialer(self: &Arc<Self>, dialer: Arc<dyn Dialer>) -> &Arc<Self> {
        *self.dialer.lock() = Some(dialer);
        self
    }

    /// 设置事件循环池，新连接轮转领取循环。
    pub fn group(self: &Arc<Self>, group: Arc<EventBaseGroup>) -> &Arc<Self> {
        *self.group.lock() = Some(group);
        self
    }

    /// 固定使用单个事件循环，优先于 `group`。
    pub fn event_base(self: &Arc<Self>, base: Arc<EventBase>) -> &Arc<Self> {
        *self.base.lock() = Some(base);
        self
    }

    /// 启用 TLS 并设置上下文。
    pub fn tls_context(self: &Arc<Self>, context: Arc<dyn TlsContext>) -> &Arc<Self> {
        let mut tls = self.tls.lock();
        match tls.as_mut() {
            Some(cfg) => cfg.context = context,
            None => {
                *tls = Some(TlsClientConfig {
                    context,
                    sni: None,
                    session: None,
                    defer_negotiation: false,
                });
            }
        }
        self
    }

    /// 设置 SNI 主机名。仅在 TLS 上下文已设置时生效。
    pub fn sni(self: &Arc<Self>, sni: impl Into<String>) -> &Arc<Self> {
        if let Some(cfg) = self.tls.lock().as_mut() {
            cfg.sni = Some(sni.into());
        }
        self
    }

    /// 设置待恢复的 TLS 会话。仅在 TLS 上下文已设置时生效。
    pub fn tls_session(self: &Arc<Self>, session: TlsSessionHandle) -> &Arc<Self> {
        if let Some(cfg) = self.tls.lock().as_mut() {
            cfg.session = Some(session);
        }
        self
    }

    /// 延迟安全协商。仅在 TLS 上下文已设置时生效。
    pub fn defer_security_negotiation(self: &Arc<Self>, defer: bool) -> &Arc<Self> {
        if let Some(cfg) = self.tls.lock().as_mut() {
            cfg.defer_negotiation = defer;
        }
        self
    }

    /// 设置 TLS 会话建立回调。
    pub fn session_established_callback(
        self: &Arc<Self>,
        callback: SessionEstablishedCallback,
    ) -> &Arc<Self> {
        *self.session_callback.lock() = Some(callback);
        self
    }

    /// 最近一次成功建连产出的管道。
    pub fn pipeline(&self) -> Option<Arc<Pipeline>> {
        self.pipeline.lock().clone()
    }

    /// 拨号并装配管道。
    ///
    /// # 执行步骤（How）
    /// 1. 选定事件循环（固定循环优先，否则从池中轮转领取），后续步骤
    ///    全部在该循环上执行；
    /// 2. 按 TLS 配置组装拨号选项并发起异步建连（含超时）；
    /// 3. 成功时：若启用 TLS 且会话未复用，触发会话建立回调；经工厂
    ///    装配管道；广播 `transport_active`；以管道完成终值；
    /// 4. 失败时以传输错误完成终值。
    pub fn connect(self: &Arc<Self>, addr: SocketAddr, timeout: Duration) -> Eventual<Arc<Pipeline>> {
        let Some(factory) = self.factory.lock().clone() else {
            return Eventual::failed(SluiceError::new(
                codes::TRANSPORT_CONNECT_FAILED,
                "connect(): no pipeline factory configured",
            ));
        };
        let Some(dialer) = self.dialer.lock().clone() else {
            return Eventual::failed(SluiceError::new(
                codes::TRANSPORT_CONNECT_FAILED,
                "connect(): no dialer configured",
            ));
        };
        let base = self
            .base
            .lock()
            .clone()
            .or_else(|| self.group.lock().as_ref().map(|group| group.next()));
        let Some(base) = base else {
            return Eventual::failed(SluiceError::new(
                codes::TRANSPORT_CONNECT_FAILED,
                "connect(): no event base configured",
            ));
        };

        let tls = self.tls.lock().clone();
        let options = DialOptions {
            timeout,
            tls: tls.as_ref().map(|cfg| TlsDialOptions {
                context: Arc::clone(&cfg.context),
                sni: cfg.sni.clone(),
                session: cfg.session.clone(),
                defer_negotiation: cfg.defer_negotiation,
            }),
        };

        let (promise, eventual) = Promise::pair();
        let this = Arc::clone(self);
        let dial_base = Arc::clone(&base);
        base.spawn(async move {
            let outcome: Result<Arc<Pipeline>> = async {
                let transport = dialer.dial(dial_base, addr, options).await?;
                if tls.is_some()
                    && let Some(info) = transport.tls_info()
                    && !info.session_resumed
                    && let Some(callback) = this.session_callback.lock().clone()
                    && let Some(session) = info.session
                {
                    callback(session);
                }
                let pipeline = factory.new_pipeline(transport)?;
                pipeline.transport_active();
                *this.pipeline.lock() = Some(Arc::clone(&pipeline));
                Ok(pipeline)
            }
            .await;
            match outcome {
                Ok(pipeline) => promise.complete(pipeline),
                Err(err) => promise.fail(err),
            }
        });
        eventual
    }
}
