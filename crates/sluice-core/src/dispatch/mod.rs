//! 分发器：流式管道与请求/响应语义之间的适配层。
//!
//! 客户端分发器是加在链尾的全双工链节，对外呈现
//! [`Service`](crate::service::Service) 形态：`call` 把请求写入管道并
//! 返回按序配对的响应。服务端分发器持有服务句柄、响应 `read` 事件，按
//! 三种纪律把响应写回：串行（一次一个）、流水线（到达序）、多路复用
//! （完成序）。

mod client;
mod server;

pub use client::{PipelinedClientDispatcher, SerialClientDispatcher};
pub use server::{MultiplexServerDispatcher, PipelinedServerDispatcher, SerialServerDispatcher};
