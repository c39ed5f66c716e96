//! 传输层边界契约。
//!
//! 框架核心不实现套接字 IO，只消费此处声明的能力：绑定事件循环、挂接读回调、
//! 带完成通知的写入、半关闭与强制关闭、地址与 TLS 元信息。具体实现位于
//! 适配 crate（如 `sluice-transport-tcp`）。

use std::any::Any;
use std::net::SocketAddr;
use std::ops::BitOr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::error::SluiceError;
use crate::future::Eventual;
use crate::runtime::EventBase;

/// 写操作标志位。
///
/// # 契约说明（What）
/// - [`WriteFlags::WRITE_SHUTDOWN`]：本次写为最后一笔，终端 Handler 在
///   `close` 时应执行写半关闭而非全关闭；
/// - [`WriteFlags::CORK`]：提示传输实现聚合小包；
/// - 标志随管道配置传递给每次 [`Transport::write`]。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriteFlags(u8);

impl WriteFlags {
    /// 无标志。
    pub const NONE: Self = Self(0);
    /// 写完后只关闭写方向。
    pub const WRITE_SHUTDOWN: Self = Self(1);
    /// 提示聚合小包。
    pub const CORK: Self = Self(1 << 1);

    /// 是否包含 `other` 的全部标志位。
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for WriteFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// 连接的静态元信息，由接入侧填充、管道携带。
#[derive(Clone, Debug, Default)]
pub struct TransportInfo {
    /// 本端地址。
    pub local_addr: Option<SocketAddr>,
    /// 对端地址。
    pub peer_addr: Option<SocketAddr>,
    /// 是否处于加密传输之上。
    pub secure: bool,
    /// 协商出的应用层协议名（如 ALPN 结果）。
    pub next_protocol: Option<String>,
}

/// TLS 会话的不透明句柄，内容由具体 TLS 实现解释。
pub type TlsSessionHandle = Arc<dyn Any + Send + Sync>;

/// TLS 上下文的边界标记。具体实现由 TLS 适配层提供并自行向下转型。
pub trait TlsContext: Any + Send + Sync {}

/// 传输层回报的 TLS 会话信息。
#[derive(Clone)]
pub struct TlsInfo {
    /// 本次握手是否复用了既有会话。
    pub session_resumed: bool,
    /// 协商完成的会话句柄，可交给后续连接做会话恢复。
    pub session: Option<TlsSessionHandle>,
}

/// 读回调：传输层把收到的字节、EOF 与读错误交给它。
///
/// 终端传输 Handler（[`crate::pipeline::TransportHandler`]）实现此契约并把
/// 自己挂接到传输上；传输实现每次读取前通过 `read_buffer_hint` 询问
/// 期望的缓冲尺寸。
pub trait ReadCallback: Send + Sync + 'static {
    /// 返回 `(最小可用空间, 单次分配尺寸)`，对应管道的读缓冲配置。
    fn read_buffer_hint(&self) -> (usize, usize);

    /// 一批字节到达。
    fn on_data(&self, data: Bytes);

    /// 对端关闭了写方向。
    fn on_eof(&self);

    /// 读路径故障。
    fn on_read_error(&self, err: SluiceError);
}

/// 异步传输的消费契约。
///
/// # 契约说明（What）
/// - 实现必须绑定到单个 [`EventBase`]；读回调在该循环线程上触发；
/// - `write` 返回的 [`Eventual`] 在字节移交内核（或失败）时完成，完成顺序
///   与提交顺序一致；
/// - `close_now` 正常关闭，`close_with_reset` 以 RST 终止连接；
/// - `good` 在连接仍可读写时为真。
pub trait Transport: Send + Sync + 'static {
    /// 绑定的事件循环。
    fn event_base(&self) -> Arc<EventBase>;

    /// 挂接或摘除读回调。传 `None` 摘除。
    fn set_read_callback(&self, callback: Option<Arc<dyn ReadCallback>>);

    /// 当前挂接的读回调。
    fn read_callback(&self) -> Option<Arc<dyn ReadCallback>>;

    /// 提交一笔写并返回完成通知。
    fn write(&self, data: Bytes, flags: WriteFlags) -> Eventual<()>;

    /// 连接是否仍然可用。
    fn good(&self) -> bool;

    /// 只关闭写方向。
    fn shutdown_write(&self);

    /// 立即关闭连接。
    fn close_now(&self);

    /// 以 RST 关闭连接。
    fn close_with_reset(&self);

    /// 本端地址。
    fn local_addr(&self) -> Option<SocketAddr>;

    /// 对端地址。
    fn peer_addr(&self) -> Option<SocketAddr>;

    /// TLS 会话信息；明文传输返回 `None`。
    fn tls_info(&self) -> Option<TlsInfo> {
        None
    }
}

/// 建连选项，由客户端引导程序组装后交给 [`Dialer`]。
#[derive(Clone)]
pub struct DialOptions {
    /// 建连超时；零值表示不限时。
    pub timeout: Duration,
    /// TLS 参数；为 `None` 时建立明文连接。
    pub tls: Option<TlsDialOptions>,
}

/// TLS 建连参数。
#[derive(Clone)]
pub struct TlsDialOptions {
    /// TLS 上下文句柄。
    pub context: Arc<dyn TlsContext>,
    /// SNI 主机名。
    pub sni: Option<String>,
    /// 待恢复的会话。
    pub session: Option<TlsSessionHandle>,
    /// 延迟安全协商：先建立明文连接，由上层择机触发握手。
    pub defer_negotiation: bool,
}

/// 拨号器：按选项对目标地址发起异步连接。
///
/// 实现应在给定事件循环上完成建连，使产出的传输天然绑定到该循环。
pub trait Dialer: Send + Sync + 'static {
    /// 发起连接。失败（含超时）以 [`crate::error::codes::TRANSPORT_CONNECT_FAILED`] 回报。
    fn dial(
        &self,
        event_base: Arc<EventBase>,
        addr: SocketAddr,
        options: DialOptions,
    ) -> Eventual<Arc<dyn Transport>>;
}
