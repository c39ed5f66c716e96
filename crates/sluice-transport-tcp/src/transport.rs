use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use socket2::SockRef;
use tokio::net::TcpStream;
use tokio::sync::{Notify, mpsc};
use tracing::{debug, warn};

use sluice_core::error::codes;
use sluice_core::{
    Eventual, EventBase, Promise, ReadCallback, SluiceError, Transport, WriteFlags,
};

use crate::error::{self, map_io_error};

const LOG_TARGET: &str = "sluice::transport::tcp";

/// 回调式 TCP 传输。
///
/// # 设计背景（Why）
/// - 读与写共享同一个 `TcpStream` 的就绪事件接口（`readable`/`writable`
///   加 `try_read`/`try_write`），两条任务并发而互不加锁，保持全双工；
/// - 读任务仅在挂接了读回调时消费套接字：每次读取前向回调询问缓冲
///   尺寸，读到的字节立即交给回调；
/// - 写任务按提交顺序串行执行，每笔写的完成通知在字节全部移交内核后
///   触发，因此完成顺序与提交顺序一致。
///
/// # 关闭语义
/// - `shutdown_write` 只发 FIN；
/// - `close_now` 双向 shutdown 并终止任务；
/// - `close_with_reset` 先置 `SO_LINGER 0` 再终止，连接以 RST 收场。
pub struct TcpTransport {
    base: Arc<EventBase>,
    stream: Arc<TcpStream>,
    callback: Arc<Mutex<Option<Arc<dyn ReadCallback>>>>,
    callback_notify: Arc<Notify>,
    shutdown_notify: Arc<Notify>,
    write_tx: mpsc::UnboundedSender<WriteOp>,
    good: Arc<AtomicBool>,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
}

enum WriteOp {
    Data { bytes: Bytes, flags: WriteFlags, promise: Promise<()> },
}

impl TcpTransport {
    /// 把已建立的连接包装为传输，并在事件循环上启动读写任务。
    pub fn from_stream(base: Arc<EventBase>, stream: TcpStream) -> sluice_core::Result<Arc<Self>> {
        let local_addr = stream.local_addr().map_err(|err| map_io_error(error::CONNECT, err))?;
        let peer_addr = stream.peer_addr().map_err(|err| map_io_error(error::CONNECT, err))?;

        let stream = Arc::new(stream);
        let callback: Arc<Mutex<Option<Arc<dyn ReadCallback>>>> = Arc::new(Mutex::new(None));
        let callback_notify = Arc::new(Notify::new());
        let shutdown_notify = Arc::new(Notify::new());
        let good = Arc::new(AtomicBool::new(true));
        let (write_tx, write_rx) = mpsc::unbounded_channel();

        let transport = Arc::new(Self {
            base: Arc::clone(&base),
            stream: Arc::clone(&stream),
            callback: Arc::clone(&callback),
            callback_notify: Arc::clone(&callback_notify),
            shutdown_notify: Arc::clone(&shutdown_notify),
            write_tx,
            good: Arc::clone(&good),
            local_addr,
            peer_addr,
        });

        base.spawn(read_task(
            Arc::clone(&stream),
            callback,
            callback_notify,
            Arc::clone(&shutdown_notify),
            Arc::clone(&good),
        ));
        base.spawn(write_task(stream, write_rx, shutdown_notify, good));

        Ok(transport)
    }

    fn sock(&self) -> SockRef<'_> {
        SockRef::from(&*self.stream)
    }
}

impl Transport for TcpTransport {
    fn event_base(&self) -> Arc<EventBase> {
        Arc::clone(&self.base)
    }

    fn set_read_callback(&self, callback: Option<Arc<dyn ReadCallback>>) {
        *self.callback.lock() = callback;
        self.callback_notify.notify_waiters();
    }

    fn read_callback(&self) -> Option<Arc<dyn ReadCallback>> {
        self.callback.lock().clone()
    }

    fn write(&self, data: Bytes, flags: WriteFlags) -> Eventual<()> {
        if !self.good.load(Ordering::Acquire) {
            return Eventual::failed(SluiceError::new(
                codes::TRANSPORT_CLOSED,
                "tcp transport is closed",
            ));
        }
        let (promise, eventual) = Promise::pair();
        if self
            .write_tx
            .send(WriteOp::Data { bytes: data, flags, promise })
            .is_err()
        {
            return Eventual::failed(SluiceError::new(
                codes::TRANSPORT_CLOSED,
                "tcp write task has terminated",
            ));
        }
        eventual
    }

    fn good(&self) -> bool {
        self.good.load(Ordering::Acquire)
    }

    fn shutdown_write(&self) {
        if let Err(err) = self.sock().shutdown(std::net::Shutdown::Write) {
            debug!(target: LOG_TARGET, error = %err, "write shutdown failed");
        }
    }

    fn close_now(&self) {
        self.good.store(false, Ordering::Release);
        if let Err(err) = self.sock().shutdown(std::net::Shutdown::Both) {
            debug!(target: LOG_TARGET, error = %err, "shutdown on close failed");
        }
        self.shutdown_notify.notify_waiters();
    }

    fn close_with_reset(&self) {
        self.good.store(false, Ordering::Release);
        if let Err(err) = self.sock().set_linger(Some(Duration::from_secs(0))) {
            debug!(target: LOG_TARGET, error = %err, "SO_LINGER for reset failed");
        }
        if let Err(err) = self.sock().shutdown(std::net::Shutdown::Both) {
            debug!(target: LOG_TARGET, error = %err, "shutdown on reset failed");
        }
        self.shutdown_notify.notify_waiters();
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.local_addr)
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        Some(self.peer_addr)
    }
}

/// 读任务：挂接回调时按回调的尺寸提示消费套接字。
async fn read_task(
    stream: Arc<TcpStream>,
    callback: Arc<Mutex<Option<Arc<dyn ReadCallback>>>>,
    callback_notify: Arc<Notify>,
    shutdown_notify: Arc<Notify>,
    good: Arc<AtomicBool>,
) {
    let mut buf = BytesMut::new();
    loop {
        if !good.load(Ordering::Acquire) {
            return;
        }
        let Some(cb) = ({
            let guard = callback.lock();
            guard.clone()
        }) else {
            tokio::select! {
                _ = callback_notify.notified() => continue,
                _ = shutdown_notify.notified() => return,
            }
        };

        let (min_available, allocation_size) = cb.read_buffer_hint();
        if buf.capacity() - buf.len() < min_available {
            buf.reserve(allocation_size.max(min_available));
        }

        tokio::select! {
            _ = shutdown_notify.notified() => return,
            ready = stream.readable() => {
                if let Err(err) = ready {
                    good.store(false, Ordering::Release);
                    cb.on_read_error(map_io_error(error::READ, err));
                    return;
                }
                match stream.try_read_buf(&mut buf) {
                    Ok(0) => {
                        cb.on_eof();
                        return;
                    }
                    Ok(_) => {
                        cb.on_data(buf.split().freeze());
                    }
                    Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => continue,
                    Err(err) => {
                        good.store(false, Ordering::Release);
                        cb.on_read_error(map_io_error(error::READ, err));
                        return;
                    }
                }
            }
        }
    }
}

/// 写任务：按提交顺序执行，每笔写完后触发完成通知。
async fn write_task(
    stream: Arc<TcpStream>,
    mut rx: mpsc::UnboundedReceiver<WriteOp>,
    shutdown_notify: Arc<Notify>,
    good: Arc<AtomicBool>,
) {
    loop {
        if !good.load(Ordering::Acquire) {
            return;
        }
        let op = tokio::select! {
            _ = shutdown_notify.notified() => return,
            op = rx.recv() => match op {
                Some(op) => op,
                None => return,
            },
        };
        let WriteOp::Data { bytes, flags, promise } = op;

        let mut offset = 0usize;
        let mut failed = None;
        while offset < bytes.len() {
            if let Err(err) = stream.writable().await {
                failed = Some(err);
                break;
            }
            match stream.try_write(&bytes[offset..]) {
                Ok(0) => {
                    failed = Some(std::io::ErrorKind::WriteZero.into());
                    break;
                }
                Ok(n) => offset += n,
                Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => continue,
                Err(err) => {
                    failed = Some(err);
                    break;
                }
            }
        }

        match failed {
            Some(err) => {
                warn!(target: LOG_TARGET, error = %err, "tcp write failed");
                good.store(false, Ordering::Release);
                promise.fail(map_io_error(error::WRITE, err));
                return;
            }
            None => {
                promise.complete(());
                if flags.contains(WriteFlags::WRITE_SHUTDOWN) {
                    let _ = SockRef::from(&*stream).shutdown(std::net::Shutdown::Write);
                }
            }
        }
    }
}
