//! 官方测试桩：集中维护集成测试与示例复用的 Mock 实现。
//!
//! 核心契约演进时在此单点适配，避免各处测试重复定义桩对象。

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::{SluiceError, codes};
use crate::future::Eventual;
use crate::pipeline::{Pipeline, PipelineManager};
use crate::runtime::EventBase;
use crate::transport::{
    DialOptions, Dialer, ReadCallback, TlsInfo, Transport, WriteFlags,
};

/// 无真实网络的内存传输。
///
/// - 出站字节累积在内部记录里，`written()` / `written_flat()` 取用；
/// - `inject` / `inject_eof` / `inject_read_error` 模拟传输侧事件，直接
///   调用当前挂接的读回调；
/// - `set_good(false)` 模拟连接不可写。
pub struct MockTransport {
    base: Arc<EventBase>,
    callback: Mutex<Option<Arc<dyn ReadCallback>>>,
    written: Mutex<Vec<(Bytes, WriteFlags)>>,
    good: AtomicBool,
    shutdown_write_calls: AtomicUsize,
    close_calls: AtomicUsize,
    reset_calls: AtomicUsize,
    tls: Mutex<Option<TlsInfo>>,
}

impl MockTransport {
    /// 绑定事件循环创建。
    pub fn new(base: Arc<EventBase>) -> Arc<Self> {
        Arc::new(Self {
            base,
            callback: Mutex::new(None),
            written: Mutex::new(Vec::new()),
            good: AtomicBool::new(true),
            shutdown_write_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            reset_calls: AtomicUsize::new(0),
            tls: Mutex::new(None),
        })
    }

    /// 模拟一批入站字节。
    pub fn inject(&self, data: &[u8]) {
        if let Some(callback) = self.callback.lock().clone() {
            callback.on_data(Bytes::copy_from_slice(data));
        }
    }

    /// 模拟对端 EOF。
    pub fn inject_eof(&self) {
        if let Some(callback) = self.callback.lock().clone() {
            callback.on_eof();
        }
    }

    /// 模拟读错误。
    pub fn inject_read_error(&self, err: SluiceError) {
        if let Some(callback) = self.callback.lock().clone() {
            callback.on_read_error(err);
        }
    }

    /// 已写出的记录。
    pub fn written(&self) -> Vec<(Bytes, WriteFlags)> {
        self.written.lock().clone()
    }

    /// 拼接后的全部已写字节。
    pub fn written_flat(&self) -> Vec<u8> {
        let written = self.written.lock();
        let mut flat = Vec::new();
        for (chunk, _) in written.iter() {
            flat.extend_from_slice(chunk);
        }
        flat
    }

    /// 设置连接可用性。
    pub fn set_good(&self, good: bool) {
        self.good.store(good, Ordering::Release);
    }

    /// 预置 TLS 会话信息。
    pub fn set_tls_info(&self, info: TlsInfo) {
        *self.tls.lock() = Some(info);
    }

    /// 写半关闭调用次数。
    pub fn shutdown_write_calls(&self) -> usize {
        self.shutdown_write_calls.load(Ordering::Acquire)
    }

    /// 正常关闭调用次数。
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::Acquire)
    }

    /// RST 关闭调用次数。
    pub fn reset_calls(&self) -> usize {
        self.reset_calls.load(Ordering::Acquire)
    }
}

impl Transport for MockTransport {
    fn event_base(&self) -> Arc<EventBase> {
        Arc::clone(&self.base)
    }

    fn set_read_callback(&self, callback: Option<Arc<dyn ReadCallback>>) {
        *self.callback.lock() = callback;
    }

    fn read_callback(&self) -> Option<Arc<dyn ReadCallback>> {
        self.callback.lock().clone()
    }

    fn write(&self, data: Bytes, flags: WriteFlags) -> Eventual<()> {
        if !self.good.load(Ordering::Acquire) {
            return Eventual::failed(SluiceError::new(
                codes::TRANSPORT_CLOSED,
                "mock transport is closed",
            ));
        }
        self.written.lock().push((data, flags));
        Eventual::ready(())
    }

    fn good(&self) -> bool {
        self.good.load(Ordering::Acquire)
    }

    fn shutdown_write(&self) {
        self.shutdown_write_calls.fetch_add(1, Ordering::AcqRel);
    }

    fn close_now(&self) {
        self.close_calls.fetch_add(1, Ordering::AcqRel);
        self.good.store(false, Ordering::Release);
    }

    fn close_with_reset(&self) {
        self.reset_calls.fetch_add(1, Ordering::AcqRel);
        self.good.store(false, Ordering::Release);
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        "127.0.0.1:0".parse().ok()
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        "127.0.0.1:0".parse().ok()
    }

    fn tls_info(&self) -> Option<TlsInfo> {
        self.tls.lock().clone()
    }
}

/// 预先注入结果的拨号器。
pub struct ManualDialer {
    outcome: Mutex<Option<Result<Arc<dyn Transport>, SluiceError>>>,
    last_options: Mutex<Option<DialOptions>>,
}

impl ManualDialer {
    /// 预置成功结果。
    pub fn succeeding(transport: Arc<dyn Transport>) -> Arc<Self> {
        Arc::new(Self {
            outcome: Mutex::new(Some(Ok(transport))),
            last_options: Mutex::new(None),
        })
    }

    /// 预置失败结果。
    pub fn failing(err: SluiceError) -> Arc<Self> {
        Arc::new(Self { outcome: Mutex::new(Some(Err(err))), last_options: Mutex::new(None) })
    }

    /// 最近一次拨号携带的选项。
    pub fn last_options(&self) -> Option<DialOptions> {
        self.last_options.lock().clone()
    }
}

impl Dialer for ManualDialer {
    fn dial(
        &self,
        _event_base: Arc<EventBase>,
        _addr: SocketAddr,
        options: DialOptions,
    ) -> Eventual<Arc<dyn Transport>> {
        *self.last_options.lock() = Some(options);
        match self.outcome.lock().take() {
            Some(Ok(transport)) => Eventual::ready(transport),
            Some(Err(err)) => Eventual::failed(err),
            None => Eventual::failed(SluiceError::new(
                codes::TRANSPORT_CONNECT_FAILED,
                "manual dialer exhausted",
            )),
        }
    }
}

/// 记录销毁请求的管道观察者。
#[derive(Default)]
pub struct RecordingManager {
    deletes: AtomicUsize,
    refreshes: AtomicUsize,
    retained: Mutex<Option<Arc<Pipeline>>>,
}

impl RecordingManager {
    /// 创建观察者。
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 持有管道强引用，模拟接入层的所有权。
    pub fn retain(&self, pipeline: Arc<Pipeline>) {
        *self.retained.lock() = Some(pipeline);
    }

    /// `delete_pipeline` 被调用的次数。
    pub fn delete_calls(&self) -> usize {
        self.deletes.load(Ordering::Acquire)
    }

    /// `refresh_timeout` 被调用的次数。
    pub fn refresh_calls(&self) -> usize {
        self.refreshes.load(Ordering::Acquire)
    }
}

impl PipelineManager for RecordingManager {
    fn delete_pipeline(&self, _pipeline: &Arc<Pipeline>) {
        self.deletes.fetch_add(1, Ordering::AcqRel);
        self.retained.lock().take();
    }

    fn refresh_timeout(&self) {
        self.refreshes.fetch_add(1, Ordering::AcqRel);
    }
}
