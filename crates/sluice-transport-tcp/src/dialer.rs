use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpStream;

use sluice_core::error::codes;
use sluice_core::{DialOptions, Dialer, Eventual, EventBase, Promise, SluiceError, Transport};

use crate::error::{self, connect_timeout, map_io_error};
use crate::transport::TcpTransport;

/// 明文 TCP 拨号器。
///
/// 建连在目标事件循环上执行，产出的 [`TcpTransport`] 天然绑定该循环。
/// TLS 选项不被本拨号器支持：安全传输由 TLS 适配 crate 的拨号器承担。
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpDialer;

impl TcpDialer {
    /// 创建拨号器。
    pub fn new() -> Self {
        Self
    }
}

impl Dialer for TcpDialer {
    fn dial(
        &self,
        event_base: Arc<EventBase>,
        addr: SocketAddr,
        options: DialOptions,
    ) -> Eventual<Arc<dyn Transport>> {
        if options.tls.is_some() {
            return Eventual::failed(SluiceError::new(
                codes::TRANSPORT_CONNECT_FAILED,
                "TcpDialer is plaintext-only; use a TLS-capable dialer",
            ));
        }

        let (promise, eventual) = Promise::pair();
        let base = Arc::clone(&event_base);
        event_base.spawn(async move {
            let connect = TcpStream::connect(addr);
            let connected = if options.timeout.is_zero() {
                connect.await.map_err(|err| map_io_error(error::CONNECT, err))
            } else {
                match tokio::time::timeout(options.timeout, connect).await {
                    Ok(Ok(stream)) => Ok(stream),
                    Ok(Err(err)) => Err(map_io_error(error::CONNECT, err)),
                    Err(_) => Err(connect_timeout()),
                }
            };

            match connected.and_then(|stream| TcpTransport::from_stream(base, stream)) {
                Ok(transport) => promise.complete(transport as Arc<dyn Transport>),
                Err(err) => promise.fail(err),
            }
        });
        eventual
    }
}
