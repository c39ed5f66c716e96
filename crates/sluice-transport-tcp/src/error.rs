//! IO 错误到框架稳定错误码的映射。

use sluice_core::SluiceError;
use sluice_core::error::codes;

/// 操作标签，进入错误消息便于定位故障阶段。
pub(crate) const CONNECT: &str = "connect";
pub(crate) const READ: &str = "read";
pub(crate) const WRITE: &str = "write";

pub(crate) fn map_io_error(op: &'static str, err: std::io::Error) -> SluiceError {
    let code = match op {
        CONNECT => codes::TRANSPORT_CONNECT_FAILED,
        READ => codes::TRANSPORT_READ_FAILED,
        WRITE => codes::TRANSPORT_WRITE_FAILED,
        _ => codes::TRANSPORT_CLOSED,
    };
    SluiceError::new(code, format!("tcp {op} failed")).with_cause(err)
}

pub(crate) fn connect_timeout() -> SluiceError {
    SluiceError::new(codes::TRANSPORT_CONNECT_FAILED, "tcp connect timed out")
}
