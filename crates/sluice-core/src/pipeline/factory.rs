use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::Result;
use crate::transport::{Transport, TransportInfo};

use super::pipeline::Pipeline;

/// 管道生命周期观察者。
///
/// # 契约说明（What）
/// - `delete_pipeline`：终端 Handler 在连接关闭路径上恰好调用一次，
///   观察者应在此释放与该管道关联的资源（通常是放弃持有的强引用）；
/// - `refresh_timeout`：参与空闲检测的 Handler 在每次读写活动时调用，
///   默认空实现。
pub trait PipelineManager: Send + Sync + 'static {
    /// 请求销毁管道。
    fn delete_pipeline(&self, pipeline: &Arc<Pipeline>);

    /// 读写活动上报。
    fn refresh_timeout(&self) {}
}

/// 每条新连接的管道工厂。
///
/// 建连或接入成功后调用一次 `new_pipeline`；实现负责装配 Handler 链、
/// 执行 [`Pipeline::finalize`] 并返回可用管道。
pub trait PipelineFactory: Send + Sync + 'static {
    /// 为新传输装配管道。
    fn new_pipeline(&self, transport: Arc<dyn Transport>) -> Result<Arc<Pipeline>>;

    /// UDP 形态的备选入口；返回 `Ok(None)` 表示拒绝该来源。
    fn new_datagram_pipeline(
        &self,
        socket: Arc<dyn DatagramSocket>,
        peer: SocketAddr,
    ) -> Result<Option<Arc<Pipeline>>> {
        let _ = (socket, peer);
        Ok(None)
    }
}

/// 无连接套接字的边界标记，由 UDP 适配层实现。
pub trait DatagramSocket: Send + Sync + 'static {
    /// 本端地址。
    fn local_addr(&self) -> Option<SocketAddr>;
}

/// 接入侧连接事件。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnEvent {
    /// 连接加入。
    Added,
    /// 连接移除。
    Removed,
}

/// 接入侧连接信息记录。
#[derive(Clone)]
pub struct ConnInfo {
    /// 新连接的传输。
    pub transport: Arc<dyn Transport>,
    /// 对端地址。
    pub client_addr: Option<SocketAddr>,
    /// 协商出的应用层协议名。
    pub next_protocol: Option<String>,
    /// 连接元信息。
    pub transport_info: TransportInfo,
}

/// 接入管道中流动的载荷。
///
/// 接入侧管道不束缚于单一消息类型：原始字节、新传输、连接信息、连接
/// 事件与 UDP 三元组共用同一条链路。
pub enum AcceptPayload {
    /// 原始字节。
    Buffer(Bytes),
    /// 新建立的传输。
    Transport(Arc<dyn Transport>),
    /// 连接信息记录。
    Info(Box<ConnInfo>),
    /// 连接事件。
    Event(ConnEvent),
    /// UDP 数据报三元组。
    Datagram {
        /// 报文内容。
        buffer: Bytes,
        /// 收包套接字。
        socket: Arc<dyn DatagramSocket>,
        /// 来源地址。
        peer: SocketAddr,
    },
}

impl std::fmt::Debug for AcceptPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buffer(buf) => f.debug_tuple("Buffer").field(&buf.len()).finish(),
            Self::Transport(_) => f.write_str("Transport"),
            Self::Info(_) => f.write_str("Info"),
            Self::Event(event) => f.debug_tuple("Event").field(event).finish(),
            Self::Datagram { buffer, peer, .. } => f
                .debug_struct("Datagram")
                .field("len", &buffer.len())
                .field("peer", peer)
                .finish(),
        }
    }
}

/// 接入侧管道工厂。
pub trait AcceptPipelineFactory: Send + Sync + 'static {
    /// 装配接入管道，入站消息类型为 [`AcceptPayload`]。
    fn new_pipeline(&self) -> Result<Arc<Pipeline>>;
}
