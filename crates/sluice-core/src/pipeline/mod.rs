//! 类型化 Handler 管道。
//!
//! 一条连接对应一条 [`Pipeline`]：插入顺序排列的 Handler 经
//! [`Pipeline::finalize`] 装配成入站与出站两条单向链，入站事件沿插入
//! 顺序向后传播，出站事件反向传播。链节间的消息类型在装配期以类型标签
//! 校验（见 [`message::PipelineMessage`]），Handler 内部保持完全类型化。

mod context;
mod event_base_handler;
mod factory;
mod handler;
mod message;
#[allow(clippy::module_inception)]
mod pipeline;
mod transport_handler;
mod write_batching;

pub use context::{HandlerContext, InboundContext, OutboundContext};
pub use event_base_handler::EventBaseHandler;
pub use factory::{
    AcceptPayload, AcceptPipelineFactory, ConnEvent, ConnInfo, DatagramSocket, PipelineFactory,
    PipelineManager,
};
pub use handler::{
    AttachState, Handler, HandlerAdapter, HandlerDir, InboundHandler, OutboundHandler,
};
pub use message::PipelineMessage;
pub use pipeline::Pipeline;
pub use transport_handler::TransportHandler;
pub use write_batching::WriteBatchingHandler;
