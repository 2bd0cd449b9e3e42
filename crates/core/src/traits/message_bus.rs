use std::fmt;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::DispatchResult;

/// 发布/订阅消息总线抽象接口
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// 创建主题（已存在时不报错）
    async fn create_topic(&self, topic: &str) -> DispatchResult<()>;

    /// 发布消息到指定主题，返回即代表总线已确认
    async fn publish(&self, topic: &str, data: &[u8]) -> DispatchResult<()>;

    /// 以给定订阅名订阅主题
    async fn subscribe(&self, topic: &str, subscription: &str) -> DispatchResult<Subscription>;

    /// 关闭与总线的连接，已有订阅流随之结束。重复关闭是空操作。
    async fn close(&self) -> DispatchResult<()> {
        Ok(())
    }
}

/// 订阅得到的入站消息流
pub type Subscription = BoxStream<'static, InboundMessage>;

/// 消息确认句柄
#[async_trait]
pub trait Acker: Send + Sync {
    async fn ack(&self) -> DispatchResult<()>;
}

/// 总线入站消息
pub struct InboundMessage {
    pub data: Vec<u8>,
    acker: Option<Box<dyn Acker>>,
}

impl InboundMessage {
    /// 无需确认的消息（内存总线）
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, acker: None }
    }

    pub fn with_acker(data: Vec<u8>, acker: Box<dyn Acker>) -> Self {
        Self {
            data,
            acker: Some(acker),
        }
    }

    /// 确认消息处理完成
    pub async fn ack(self) -> DispatchResult<()> {
        match self.acker {
            Some(acker) => acker.ack().await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundMessage")
            .field("len", &self.data.len())
            .field("ackable", &self.acker.is_some())
            .finish()
    }
}
