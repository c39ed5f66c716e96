use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;

/// `SluiceError` 是框架跨层共享的稳定错误域，所有可观察故障的最终形态。
///
/// # 设计背景（Why）
/// - 管道装配、传输 IO、编解码与服务调用在不同层次产生的故障需要合流为统一的
///   错误码，日志与测试断言才能执行精确匹配，而不是解析自由文本。
/// - 错误分三路传播：装配期错误以 `Err` 形式在调用点返回；入站运行期错误沿
///   `read_exception` 事件向前传播；出站运行期错误以失败的 [`Eventual`]
///   （见 [`crate::future`]）回到发起方。
///
/// # 契约说明（What）
/// - `code`：`'static` 稳定字符串，遵循 `<域>.<语义>` 命名，取值见 [`codes`]；
/// - `message`：面向排障人员的自然语言描述，不包含敏感信息；
/// - `cause`：可选底层原因，经 `source()` 暴露完整错误链。
///
/// # 风险提示（Trade-offs）
/// - 结构体仅承载信息，不执行指标上报或日志格式化；调用方自行处理。
#[derive(Debug)]
pub struct SluiceError {
    code: &'static str,
    message: Cow<'static, str>,
    cause: Option<ErrorCause>,
}

/// 底层原因的统一封装，保持 `Send + Sync` 以便跨线程传递。
pub type ErrorCause = Box<dyn StdError + Send + Sync + 'static>;

/// 框架统一的返回值别名，默认错误类型为 [`SluiceError`]。
pub type Result<T, E = SluiceError> = std::result::Result<T, E>;

impl SluiceError {
    /// 使用稳定错误码与消息构造错误。
    ///
    /// # 契约说明（What）
    /// - **输入**：`code` 必须来自 [`codes`] 或遵循 `<域>.<语义>` 约定；
    /// - **后置条件**：返回值拥有独立所有权，可安全跨线程移动，初始不含底层原因。
    pub fn new(code: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self { code, message: message.into(), cause: None }
    }

    /// 附带底层原因并返回新的错误。
    pub fn with_cause(mut self, cause: impl StdError + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// 获取稳定错误码。
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// 获取描述。
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 获取底层原因。
    pub fn cause(&self) -> Option<&ErrorCause> {
        self.cause.as_ref()
    }
}

impl fmt::Display for SluiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl StdError for SluiceError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn StdError + 'static))
    }
}

impl Clone for SluiceError {
    /// 错误在事件传播中可能被多个观察者持有；克隆时底层原因以文本形式保留。
    fn clone(&self) -> Self {
        let cause = self
            .cause
            .as_ref()
            .map(|c| Box::new(CauseText(c.to_string())) as ErrorCause);
        Self { code: self.code, message: self.message.clone(), cause }
    }
}

/// 克隆路径上用于保留底层原因文本的轻量包装。
#[derive(Debug)]
struct CauseText(String);

impl fmt::Display for CauseText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for CauseText {}

/// 稳定错误码清单。
///
/// # 契约说明（What）
/// - 每个常量的语义在声明处注明；新增错误码必须同步补充测试断言；
/// - 码值一经发布不得改动，重命名视为破坏性变更。
pub mod codes {
    /// 对应方向的链路为空时调用了管道入口。
    pub const PIPELINE_MISSING_CHAIN: &str = "pipeline.missing_chain";
    /// finalize 阶段相邻链节的读/写类型标签不一致。
    pub const PIPELINE_TYPE_MISMATCH: &str = "pipeline.type_mismatch";
    /// 按类型或按身份移除时未找到目标 Handler。
    pub const PIPELINE_HANDLER_MISSING: &str = "pipeline.handler_missing";
    /// 静态管道拒绝运行期增删 Handler。
    pub const PIPELINE_FROZEN: &str = "pipeline.frozen";
    /// 入口消息类型与链首 Handler 声明的入站类型不符。
    pub const PIPELINE_ENTRY_TYPE: &str = "pipeline.entry_type";

    /// 传输已关闭或不可写。
    pub const TRANSPORT_CLOSED: &str = "transport.closed";
    /// 建连失败（含超时）。
    pub const TRANSPORT_CONNECT_FAILED: &str = "transport.connect_failed";
    /// 读路径故障。
    pub const TRANSPORT_READ_FAILED: &str = "transport.read_failed";
    /// 写路径故障。
    pub const TRANSPORT_WRITE_FAILED: &str = "transport.write_failed";

    /// 解析出的帧总长小于头部长度。
    pub const CODEC_FRAME_TOO_SMALL: &str = "codec.frame_too_small";
    /// 帧总长超过解码器允许的上限。
    pub const CODEC_FRAME_OVERSIZE: &str = "codec.frame_oversize";
    /// 配置的剥离字节数大于整帧长度。
    pub const CODEC_STRIP_EXCEEDS_FRAME: &str = "codec.strip_exceeds_frame";

    /// 串行分发器在上一请求未完成时收到新请求。
    pub const DISPATCH_BUSY: &str = "dispatch.busy";
    /// 连接在存在未完成请求时断开。
    pub const DISPATCH_CONNECTION_LOST: &str = "dispatch.connection_lost";
    /// Promise 在未完成时被丢弃。
    pub const DISPATCH_ABANDONED: &str = "dispatch.abandoned";

    /// 服务不可用或已关闭。
    pub const SERVICE_UNAVAILABLE: &str = "service.unavailable";

    /// 事件循环已终止，无法继续投递或等待。
    pub const RUNTIME_TERMINATED: &str = "runtime.terminated";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_renders_code_and_message() {
        let err = SluiceError::new(codes::TRANSPORT_CLOSED, "socket is closed in write()");
        assert_eq!(format!("{err}"), "[transport.closed] socket is closed in write()");
    }

    #[test]
    fn cause_chain_round_trips_through_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "peer reset");
        let err = SluiceError::new(codes::TRANSPORT_READ_FAILED, "read failed").with_cause(io);
        let source = err.source().expect("cause should surface via source()");
        assert!(source.to_string().contains("peer reset"));
    }

    #[test]
    fn clone_preserves_code_and_cause_text() {
        let io = std::io::Error::other("underlying");
        let err = SluiceError::new(codes::TRANSPORT_WRITE_FAILED, "write failed").with_cause(io);
        let cloned = err.clone();
        assert_eq!(cloned.code(), err.code());
        assert!(cloned.source().expect("cloned cause").to_string().contains("underlying"));
    }
}
