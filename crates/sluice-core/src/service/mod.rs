//! 服务组合模型：`请求 → 终将到来的响应`。
//!
//! [`Service`] 是 RPC 语义的基本单元；[`ServiceFilter`] 以装饰器方式
//! 包裹内层服务并允许转换请求/响应类型；[`ServiceFactory`] 按需产出
//! 服务实例。对象层（[`DynService`] / [`ArcService`]）把泛型服务装进
//! 可共享的 trait 对象，供工厂与分发器跨边界传递。

use std::sync::Arc;

use crate::bootstrap::ClientBootstrap;
use crate::future::Eventual;

/// 异步函数式服务：`Req → Eventual<Response>`。
///
/// # 契约说明（What）
/// - `call` 不阻塞，响应经返回的 [`Eventual`] 交付；
/// - `close` 幂等，默认立即成功；
/// - `is_available` 默认恒真，实现可据内部状态回报不可用。
pub trait Service<Req>: Send + Sync + 'static {
    /// 响应类型。
    type Response: Send + 'static;

    /// 发起一次调用。
    fn call(&self, req: Req) -> Eventual<Self::Response>;

    /// 关闭服务。幂等。
    fn close(&self) -> Eventual<()> {
        Eventual::ready(())
    }

    /// 服务当前是否可用。
    fn is_available(&self) -> bool {
        true
    }
}

/// [`Service`] 的对象安全形态，响应类型上移为泛型参数。
pub trait DynService<Req, Resp>: Send + Sync + 'static {
    /// 见 [`Service::call`]。
    fn call(&self, req: Req) -> Eventual<Resp>;

    /// 见 [`Service::close`]。
    fn close(&self) -> Eventual<()>;

    /// 见 [`Service::is_available`]。
    fn is_available(&self) -> bool;
}

impl<S, Req> DynService<Req, S::Response> for S
where
    S: Service<Req>,
    Req: Send + 'static,
{
    fn call(&self, req: Req) -> Eventual<S::Response> {
        Service::call(self, req)
    }

    fn close(&self) -> Eventual<()> {
        Service::close(self)
    }

    fn is_available(&self) -> bool {
        Service::is_available(self)
    }
}

/// 共享的对象层服务句柄。
pub type ArcService<Req, Resp> = Arc<dyn DynService<Req, Resp>>;

/// 服务装饰器：包裹内层服务，可在两侧转换请求与响应类型。
///
/// 实现 `apply` 描述转换逻辑；`close` 与 `is_available` 默认转发给内层
/// 服务。任何 `ServiceFilter<Req>` 自动成为 `Service<Req>`。
pub trait ServiceFilter<Req>: Send + Sync + 'static {
    /// 内层服务的请求类型。
    type InnerReq: Send + 'static;
    /// 内层服务类型。
    type Inner: Service<Self::InnerReq>;
    /// 对外暴露的响应类型。
    type Response: Send + 'static;

    /// 内层服务。
    fn inner(&self) -> &Self::Inner;

    /// 执行一次经过转换的调用。
    fn apply(&self, req: Req, inner: &Self::Inner) -> Eventual<Self::Response>;
}

impl<F, Req> Service<Req> for F
where
    F: ServiceFilter<Req>,
{
    type Response = F::Response;

    fn call(&self, req: Req) -> Eventual<F::Response> {
        self.apply(req, self.inner())
    }

    fn close(&self) -> Eventual<()> {
        Service::close(self.inner())
    }

    fn is_available(&self) -> bool {
        Service::is_available(self.inner())
    }
}

/// 服务工厂：给定（可选的）已连接客户端，产出一个服务。
pub trait ServiceFactory<Req, Resp>: Send + Sync + 'static {
    /// 产出服务实例。
    fn new_service(&self, client: Option<Arc<ClientBootstrap>>) -> Eventual<ArcService<Req, Resp>>;
}

/// 共享的工厂句柄。
pub type ArcServiceFactory<Req, Resp> = Arc<dyn ServiceFactory<Req, Resp>>;

/// 无视客户端、恒返回固定服务的工厂。
pub struct ConstFactory<Req, Resp> {
    service: ArcService<Req, Resp>,
}

impl<Req, Resp> ConstFactory<Req, Resp> {
    /// 以固定服务创建工厂。
    pub fn new(service: ArcService<Req, Resp>) -> Self {
        Self { service }
    }
}

impl<Req, Resp> ServiceFactory<Req, Resp> for ConstFactory<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    fn new_service(
        &self,
        _client: Option<Arc<ClientBootstrap>>,
    ) -> Eventual<ArcService<Req, Resp>> {
        Eventual::ready(Arc::clone(&self.service))
    }
}

/// 工厂装饰器：在内层工厂产出的服务外再包一层。
pub struct ServiceFactoryFilter<ReqA, RespA, ReqB, RespB> {
    inner: ArcServiceFactory<ReqB, RespB>,
    wrap: Arc<dyn Fn(ArcService<ReqB, RespB>) -> ArcService<ReqA, RespA> + Send + Sync>,
}

impl<ReqA, RespA, ReqB, RespB> ServiceFactoryFilter<ReqA, RespA, ReqB, RespB> {
    /// 以内层工厂与包装函数创建。
    pub fn new(
        inner: ArcServiceFactory<ReqB, RespB>,
        wrap: impl Fn(ArcService<ReqB, RespB>) -> ArcService<ReqA, RespA> + Send + Sync + 'static,
    ) -> Self {
        Self { inner, wrap: Arc::new(wrap) }
    }
}

impl<ReqA, RespA, ReqB, RespB> ServiceFactory<ReqA, RespA>
    for ServiceFactoryFilter<ReqA, RespA, ReqB, RespB>
where
    ReqA: Send + 'static,
    RespA: Send + 'static,
    ReqB: Send + 'static,
    RespB: Send + 'static,
{
    fn new_service(
        &self,
        client: Option<Arc<ClientBootstrap>>,
    ) -> Eventual<ArcService<ReqA, RespA>> {
        let wrap = Arc::clone(&self.wrap);
        let inner = self.inner.new_service(client);
        Eventual::from_future(async move { Ok(wrap(inner.await?)) })
    }
}

/// 把工厂压平成服务：每次调用即席产出服务、执行请求，并在调用落定后
/// 关闭本次产出的服务。
pub struct FactoryToService<Req, Resp> {
    factory: ArcServiceFactory<Req, Resp>,
}

impl<Req, Resp> FactoryToService<Req, Resp> {
    /// 以工厂创建。
    pub fn new(factory: ArcServiceFactory<Req, Resp>) -> Self {
        Self { factory }
    }
}

impl<Req, Resp> Service<Req> for FactoryToService<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    type Response = Resp;

    fn call(&self, req: Req) -> Eventual<Resp> {
        let factory = Arc::clone(&self.factory);
        Eventual::from_future(async move {
            let service = factory.new_service(None).await?;
            let result = service.call(req).await;
            let _ = service.close().await;
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct Doubler;

    impl Service<u32> for Doubler {
        type Response = u32;

        fn call(&self, req: u32) -> Eventual<u32> {
            Eventual::ready(req * 2)
        }
    }

    struct TrackedService {
        closed: Arc<AtomicBool>,
    }

    impl Service<u32> for TrackedService {
        type Response = u32;

        fn call(&self, req: u32) -> Eventual<u32> {
            Eventual::ready(req + 1)
        }

        fn close(&self) -> Eventual<()> {
            self.closed.store(true, Ordering::Release);
            Eventual::ready(())
        }
    }

    struct TrackedFactory {
        built: Arc<AtomicUsize>,
        closed: Arc<AtomicBool>,
    }

    impl ServiceFactory<u32, u32> for TrackedFactory {
        fn new_service(
            &self,
            _client: Option<Arc<ClientBootstrap>>,
        ) -> Eventual<ArcService<u32, u32>> {
            self.built.fetch_add(1, Ordering::AcqRel);
            Eventual::ready(Arc::new(TrackedService { closed: Arc::clone(&self.closed) }) as _)
        }
    }

    struct StringifyFilter {
        inner: Doubler,
    }

    impl ServiceFilter<&'static str> for StringifyFilter {
        type InnerReq = u32;
        type Inner = Doubler;
        type Response = String;

        fn inner(&self) -> &Doubler {
            &self.inner
        }

        fn apply(&self, req: &'static str, inner: &Doubler) -> Eventual<String> {
            let parsed: u32 = match req.parse() {
                Ok(v) => v,
                Err(_) => {
                    return Eventual::failed(crate::error::SluiceError::new(
                        crate::error::codes::SERVICE_UNAVAILABLE,
                        "not a number",
                    ));
                }
            };
            let inner_call = inner.call(parsed);
            Eventual::from_future(async move { Ok(inner_call.await?.to_string()) })
        }
    }

    #[tokio::test]
    async fn filter_transforms_request_and_response_types() {
        let filter = StringifyFilter { inner: Doubler };
        assert_eq!(Service::call(&filter, "21").await.expect("doubled"), "42");
        assert!(Service::is_available(&filter));
    }

    #[tokio::test]
    async fn const_factory_hands_out_the_same_service() {
        let factory = ConstFactory::new(Arc::new(Doubler) as ArcService<u32, u32>);
        let service = factory.new_service(None).await.expect("service");
        assert_eq!(service.call(4).await.expect("doubled"), 8);
    }

    #[tokio::test]
    async fn factory_to_service_builds_calls_and_closes() {
        let built = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicBool::new(false));
        let flattened = FactoryToService::new(Arc::new(TrackedFactory {
            built: Arc::clone(&built),
            closed: Arc::clone(&closed),
        }) as ArcServiceFactory<u32, u32>);

        assert_eq!(flattened.call(9).await.expect("result"), 10);
        assert_eq!(built.load(Ordering::Acquire), 1);
        assert!(closed.load(Ordering::Acquire), "produced service must be closed");
    }
}
