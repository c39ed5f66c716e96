use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::{Result, SluiceError, codes};

/// 通用的对象安全 Future 包装，约束 `Send + 'a`。
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// `Eventual` 表达"终将到来的一个值"：单次完成、可等待、可链式组合。
///
/// # 设计背景（Why）
/// - 出站传播与请求/响应分发都以"提交后异步完成"为基本契约，需要一个
///   单次完成的值载体贯穿全链路；
/// - 基于 `tokio::sync::oneshot` 构建，保证完成方与等待方解耦：完成方持有
///   [`Promise`]，等待方持有 `Eventual`，二者可分处不同线程。
///
/// # 契约说明（What）
/// - 实现 `Future<Output = Result<T>>`，在 `async` 上下文中直接 `.await`；
/// - 已完成的值可用 [`Eventual::ready`] / [`Eventual::failed`] 零成本构造；
/// - 由组合逻辑产生的值可用 [`Eventual::from_future`] 包装任意 `async` 块；
/// - 若对应的 [`Promise`] 在未完成时被丢弃，等待方得到
///   [`codes::DISPATCH_ABANDONED`] 失败而非永久挂起。
pub struct Eventual<T> {
    state: EventualState<T>,
}

enum EventualState<T> {
    Ready(Option<Result<T>>),
    Pending(oneshot::Receiver<Result<T>>),
    Boxed(BoxFuture<'static, Result<T>>),
}

impl<T: Send + 'static> Eventual<T> {
    /// 构造立即成功的 `Eventual`。
    pub fn ready(value: T) -> Self {
        Self { state: EventualState::Ready(Some(Ok(value))) }
    }

    /// 构造立即失败的 `Eventual`。
    pub fn failed(err: SluiceError) -> Self {
        Self { state: EventualState::Ready(Some(Err(err))) }
    }

    /// 由既有结果构造。
    pub fn from_result(result: Result<T>) -> Self {
        Self { state: EventualState::Ready(Some(result)) }
    }

    /// 将任意异步计算包装为 `Eventual`。
    pub fn from_future<F>(future: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Self { state: EventualState::Boxed(Box::pin(future)) }
    }
}

impl<T> Unpin for Eventual<T> {}

impl<T: Send + 'static> Future for Eventual<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            EventualState::Ready(slot) => {
                let result = slot
                    .take()
                    .unwrap_or_else(|| Err(abandoned("eventual polled after completion")));
                Poll::Ready(result)
            }
            EventualState::Pending(rx) => match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(result)) => Poll::Ready(result),
                Poll::Ready(Err(_)) => {
                    Poll::Ready(Err(abandoned("promise dropped before completion")))
                }
                Poll::Pending => Poll::Pending,
            },
            EventualState::Boxed(fut) => fut.as_mut().poll(cx),
        }
    }
}

/// `Promise` 是 [`Eventual`] 的完成端，单次消费。
///
/// # 契约说明（What）
/// - [`Promise::pair`] 同时产出完成端与等待端；
/// - `complete` / `fail` 消费自身，保证单次完成语义在类型层面成立；
/// - 未完成即丢弃时等待方收到 [`codes::DISPATCH_ABANDONED`]，悬而不决的
///   请求因此总能观察到终态。
pub struct Promise<T> {
    tx: oneshot::Sender<Result<T>>,
}

impl<T: Send + 'static> Promise<T> {
    /// 创建一对 Promise / Eventual。
    pub fn pair() -> (Self, Eventual<T>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, Eventual { state: EventualState::Pending(rx) })
    }

    /// 以成功值完成。若等待方已放弃等待则静默丢弃。
    pub fn complete(self, value: T) {
        let _ = self.tx.send(Ok(value));
    }

    /// 以错误完成。
    pub fn fail(self, err: SluiceError) {
        let _ = self.tx.send(Err(err));
    }
}

fn abandoned(message: &'static str) -> SluiceError {
    SluiceError::new(codes::DISPATCH_ABANDONED, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn promise_completion_resolves_eventual() {
        let (promise, eventual) = Promise::pair();
        promise.complete(7u32);
        assert_eq!(eventual.await.expect("completed value"), 7);
    }

    #[tokio::test]
    async fn dropped_promise_fails_instead_of_hanging() {
        let (promise, eventual) = Promise::<u32>::pair();
        drop(promise);
        let err = eventual.await.expect_err("dropped promise must surface an error");
        assert_eq!(err.code(), codes::DISPATCH_ABANDONED);
    }

    #[tokio::test]
    async fn from_future_adapts_async_blocks() {
        let eventual = Eventual::from_future(async { Ok(21u32) });
        assert_eq!(eventual.await.expect("async block result"), 21);
    }

    #[tokio::test]
    async fn ready_and_failed_shortcut_constructors() {
        assert_eq!(Eventual::ready(1u8).await.expect("ready"), 1);
        let err = Eventual::<u8>::failed(SluiceError::new(codes::DISPATCH_BUSY, "busy"))
            .await
            .expect_err("failed constructor");
        assert_eq!(err.code(), codes::DISPATCH_BUSY);
    }
}
