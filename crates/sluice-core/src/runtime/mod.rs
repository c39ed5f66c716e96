//! 事件循环绑定模型。
//!
//! # 设计背景（Why）
//! - 每条管道固定绑定到单个事件循环线程，线程内事件传播无需加锁；
//! - 跨线程发起的操作必须弹跳到目标循环执行，本模块提供统一的弹跳原语。
//!
//! # 契约说明（What）
//! - [`EventBase`] 封装一个独占 OS 线程上的 tokio 单线程运行时；
//! - [`EventBase::run_immediately_or_wait`] 在调用方已处于循环线程时就地执行，
//!   否则调度到循环线程并同步等待结果；
//! - [`EventBaseGroup`] 以轮转方式向新连接分配事件循环。

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::{Result, SluiceError, codes};

/// 单线程事件循环。一个 `EventBase` 独占一个 OS 线程，线程上运行
/// tokio 的 current-thread 运行时，所有投递到此循环的任务在该线程串行执行。
pub struct EventBase {
    name: String,
    handle: tokio::runtime::Handle,
    thread_id: ThreadId,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl EventBase {
    /// 启动一个命名事件循环线程。
    ///
    /// # 契约说明（What）
    /// - **后置条件**：返回时运行时已就绪，可立即投递任务；
    /// - 线程在 `EventBase` 被丢弃时收到关闭信号并退出，未完成任务被丢弃。
    pub fn new(name: impl Into<String>) -> Result<Arc<Self>> {
        let name = name.into();
        let (ready_tx, ready_rx) = mpsc::channel::<(tokio::runtime::Handle, ThreadId)>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let thread_name = name.clone();
        let join = thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(_) => return,
                };
                if ready_tx
                    .send((runtime.handle().clone(), thread::current().id()))
                    .is_err()
                {
                    return;
                }
                runtime.block_on(async {
                    let _ = shutdown_rx.await;
                });
            })
            .map_err(|err| {
                SluiceError::new(codes::RUNTIME_TERMINATED, "failed to spawn event base thread")
                    .with_cause(err)
            })?;

        let (handle, thread_id) = ready_rx.recv().map_err(|_| {
            SluiceError::new(codes::RUNTIME_TERMINATED, "event base runtime failed to start")
        })?;

        Ok(Arc::new(Self {
            name,
            handle,
            thread_id,
            shutdown: Mutex::new(Some(shutdown_tx)),
            join: Mutex::new(Some(join)),
        }))
    }

    /// 事件循环名称，用于日志与线程命名。
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 当前线程是否就是本循环的线程。
    pub fn in_loop_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// 向循环投递一个异步任务。
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(future);
    }

    /// 向循环投递一个闭包，在下一次调度时执行。
    pub fn run_in_loop<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.spawn(async move { f() });
    }

    /// 在循环线程上执行闭包并同步等待结果。
    ///
    /// # 契约说明（What）
    /// - 调用方已处于循环线程时就地执行，不产生调度开销；
    /// - 否则闭包被投递到循环线程，当前线程阻塞等待返回值；
    /// - **前置条件**：不得在本循环的线程之外持有会与闭包争用的锁，否则死锁；
    /// - 循环已终止时返回 [`codes::RUNTIME_TERMINATED`]。
    pub fn run_immediately_or_wait<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.in_loop_thread() {
            return Ok(f());
        }
        let (tx, rx) = mpsc::sync_channel(1);
        self.handle.spawn(async move {
            let _ = tx.send(f());
        });
        rx.recv().map_err(|_| {
            SluiceError::new(codes::RUNTIME_TERMINATED, "event base terminated while waiting")
        })
    }
}

impl Drop for EventBase {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.lock().take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.lock().take() {
            let _ = join.join();
        }
    }
}

impl std::fmt::Debug for EventBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBase").field("name", &self.name).finish()
    }
}

/// 事件循环池，按轮转向调用方分配 [`EventBase`]。
///
/// 新建连接通常通过 `next()` 领取事件循环，使连接均摊到全部 IO 线程。
pub struct EventBaseGroup {
    bases: Vec<Arc<EventBase>>,
    cursor: AtomicUsize,
}

impl EventBaseGroup {
    /// 创建含 `count` 个循环的池，线程命名为 `<name>-<序号>`。
    pub fn new(count: usize, name: &str) -> Result<Arc<Self>> {
        let mut bases = Vec::with_capacity(count.max(1));
        for index in 0..count.max(1) {
            bases.push(EventBase::new(format!("{name}-{index}"))?);
        }
        Ok(Arc::new(Self { bases, cursor: AtomicUsize::new(0) }))
    }

    /// 轮转取下一个事件循环。
    pub fn next(&self) -> Arc<EventBase> {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.bases.len();
        Arc::clone(&self.bases[index])
    }

    /// 池中循环数量。
    pub fn len(&self) -> usize {
        self.bases.len()
    }

    /// 池是否为空。容量归一化后恒为 `false`，保留以满足惯用接口。
    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_immediately_or_wait_executes_on_loop_thread() {
        let base = EventBase::new("test-loop").expect("spawn event base");
        let base2 = Arc::clone(&base);
        let ran_in_loop = base
            .run_immediately_or_wait(move || base2.in_loop_thread())
            .expect("loop alive");
        assert!(ran_in_loop, "closure must run on the loop thread");
        assert!(!base.in_loop_thread(), "test thread is not the loop thread");
    }

    #[test]
    fn nested_call_from_loop_thread_runs_inline() {
        let base = EventBase::new("test-inline").expect("spawn event base");
        let inner = Arc::clone(&base);
        let value = base
            .run_immediately_or_wait(move || {
                inner.run_immediately_or_wait(|| 41).expect("inline execution") + 1
            })
            .expect("loop alive");
        assert_eq!(value, 42);
    }

    #[test]
    fn group_round_robins_between_bases() {
        let group = EventBaseGroup::new(2, "test-group").expect("spawn group");
        let first = group.next();
        let second = group.next();
        let third = group.next();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first, &third));
    }
}
