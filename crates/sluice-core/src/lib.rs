#![doc = "sluice-core：类型化 Handler 管道与请求/响应分发层。"]
#![doc = ""]
#![doc = "一条连接对应一条 [`Pipeline`]：入站字节帧与出站应用消息流经强类型"]
#![doc = "的链节序列，每个链节可以变换消息类型，链接关系在一次性 finalize 中"]
#![doc = "装配并校验。管道之上，[`dispatch`] 模块把字节流抽象适配为"]
#![doc = "`请求 → 终将到来的响应` 的 RPC 契约，提供串行、流水线、多路复用"]
#![doc = "三种分发纪律。"]
#![doc = ""]
#![doc = "传输、TLS、名字解析等外部协作者只以边界契约出现（见 [`transport`]），"]
#![doc = "具体实现位于适配 crate（如 `sluice-transport-tcp`）。"]

pub mod bootstrap;
pub mod buffer;
pub mod codec;
pub mod dispatch;
pub mod error;
pub mod future;
pub mod overload;
pub mod pipeline;
pub mod runtime;
pub mod service;
pub mod test_stubs;
pub mod time;
pub mod transport;

pub use bootstrap::{ClientBootstrap, SessionEstablishedCallback};
pub use buffer::ByteQueue;
pub use codec::{
    ByteOrder, ByteToMessageHandler, FixedLengthFrameDecoder, FrameDecoder,
    LengthFieldBasedFrameDecoder, LengthFieldPrepender,
};
pub use dispatch::{
    MultiplexServerDispatcher, PipelinedClientDispatcher, PipelinedServerDispatcher,
    SerialClientDispatcher, SerialServerDispatcher,
};
pub use error::{ErrorCause, Result, SluiceError};
pub use future::{BoxFuture, Eventual, Promise};
pub use overload::{Codel, CodelOptions};
pub use pipeline::{
    AcceptPayload, AcceptPipelineFactory, AttachState, ConnEvent, ConnInfo, EventBaseHandler,
    Handler, HandlerAdapter, HandlerContext, HandlerDir, InboundContext, InboundHandler,
    OutboundContext, OutboundHandler, Pipeline, PipelineFactory, PipelineManager, PipelineMessage,
    TransportHandler, WriteBatchingHandler,
};
pub use runtime::{EventBase, EventBaseGroup};
pub use service::{
    ArcService, ArcServiceFactory, ConstFactory, DynService, FactoryToService, Service,
    ServiceFactory, ServiceFactoryFilter, ServiceFilter,
};
pub use time::{Clock, ManualClock, SystemClock};
pub use transport::{
    DialOptions, Dialer, ReadCallback, TlsContext, TlsDialOptions, TlsInfo, TlsSessionHandle,
    Transport, TransportInfo, WriteFlags,
};
