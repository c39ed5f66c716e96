#![doc = "sluice-transport-tcp：TCP 形态的传输边界实现。"]
#![doc = ""]
#![doc = "[`TcpTransport`] 以回调式读与按序完成的写实现 sluice 的"]
#![doc = "`Transport` 契约；[`TcpDialer`] 在指定事件循环上完成带超时的"]
#![doc = "异步建连。TLS 形态由独立的适配 crate 提供，本 crate 只做明文。"]

mod dialer;
mod error;
mod transport;

pub use dialer::TcpDialer;
pub use transport::TcpTransport;
