use std::any::{Any, TypeId, type_name};

/// 链路中流动的类型擦除消息。
///
/// # 设计背景（Why）
/// - 链节之间的连接在运行期装配，消息以擦除形态穿过链节边界，由
///   finalize 阶段的类型标签校验保证相邻链节的读/写类型吻合，擦除后的
///   向下转型因此不会失败；
/// - 捕获类型名仅用于日志与错误信息，避免排障时面对裸 `TypeId`。
pub struct PipelineMessage {
    payload: Box<dyn Any + Send>,
    type_id: TypeId,
    type_name: &'static str,
}

impl PipelineMessage {
    /// 包装一条类型化消息。
    pub fn new<T: Send + 'static>(value: T) -> Self {
        Self {
            payload: Box::new(value),
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }

    /// 消息承载值的 `TypeId`。
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// 承载值的类型名，用于诊断输出。
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// 是否承载类型 `T`。
    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// 取回类型化的值；类型不符时原样退回消息。
    pub fn downcast<T: 'static>(self) -> Result<T, PipelineMessage> {
        if !self.is::<T>() {
            return Err(self);
        }
        match self.payload.downcast::<T>() {
            Ok(boxed) => Ok(*boxed),
            Err(payload) => Err(Self {
                payload,
                type_id: self.type_id,
                type_name: self.type_name,
            }),
        }
    }
}

impl std::fmt::Debug for PipelineMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineMessage")
            .field("type", &self.type_name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downcast_returns_value_for_matching_type() {
        let msg = PipelineMessage::new(5usize);
        assert!(msg.is::<usize>());
        assert_eq!(msg.downcast::<usize>().expect("matching type"), 5);
    }

    #[test]
    fn downcast_hands_back_message_on_mismatch() {
        let msg = PipelineMessage::new("text");
        let back = msg.downcast::<u64>().expect_err("mismatched type");
        assert!(back.is::<&str>());
        assert!(back.type_name().contains("str"));
    }
}
