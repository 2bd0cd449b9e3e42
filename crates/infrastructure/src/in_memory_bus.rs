use async_trait::async_trait;
use futures::StreamExt;
use jobrelay_core::{DispatchError, DispatchResult, InboundMessage, MessageBus, Subscription};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

/// 内存消息总线实现
///
/// 每个主题维护一组订阅，发布时消息被复制给每个仍然存活的订阅者。
/// 只有订阅之后发布的消息才会被收到；主题必须先创建。适用于单进程部署和测试。
#[derive(Debug, Default, Clone)]
pub struct InMemoryMessageBus {
    topics: Arc<RwLock<HashMap<String, TopicState>>>,
}

#[derive(Debug, Default)]
struct TopicState {
    subscribers: Vec<SubscriberChannel>,
    published: u64,
}

#[derive(Debug)]
struct SubscriberChannel {
    name: String,
    sender: mpsc::UnboundedSender<Vec<u8>>,
}

/// 主题统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicStats {
    pub subscribers: usize,
    pub published: u64,
}

impl InMemoryMessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn topic_stats(&self, topic: &str) -> Option<TopicStats> {
        let topics = self.topics.read().await;
        topics.get(topic).map(|state| TopicStats {
            subscribers: state
                .subscribers
                .iter()
                .filter(|s| !s.sender.is_closed())
                .count(),
            published: state.published,
        })
    }
}

#[async_trait]
impl MessageBus for InMemoryMessageBus {
    async fn create_topic(&self, topic: &str) -> DispatchResult<()> {
        let mut topics = self.topics.write().await;
        if !topics.contains_key(topic) {
            topics.insert(topic.to_string(), TopicState::default());
            info!("创建内存主题: {}", topic);
        }
        Ok(())
    }

    async fn publish(&self, topic: &str, data: &[u8]) -> DispatchResult<()> {
        let mut topics = self.topics.write().await;
        let state = topics
            .get_mut(topic)
            .ok_or_else(|| DispatchError::message_bus(format!("主题 {topic} 不存在")))?;

        // 顺带清理已关闭的订阅
        state
            .subscribers
            .retain(|subscriber| subscriber.sender.send(data.to_vec()).is_ok());
        state.published += 1;

        debug!(
            "消息已发布到内存主题 {} ({} 字节，{} 个订阅者)",
            topic,
            data.len(),
            state.subscribers.len()
        );
        Ok(())
    }

    async fn subscribe(&self, topic: &str, subscription: &str) -> DispatchResult<Subscription> {
        let mut topics = self.topics.write().await;
        let state = topics
            .get_mut(topic)
            .ok_or_else(|| DispatchError::message_bus(format!("主题 {topic} 不存在")))?;

        state.subscribers.retain(|s| !s.sender.is_closed());
        if state.subscribers.iter().any(|s| s.name == subscription) {
            return Err(DispatchError::message_bus(format!(
                "订阅 {subscription} 已存在于主题 {topic}"
            )));
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        state.subscribers.push(SubscriberChannel {
            name: subscription.to_string(),
            sender,
        });
        info!("订阅 {} 已绑定到内存主题 {}", subscription, topic);

        let stream = futures::stream::unfold(receiver, |mut receiver| async move {
            receiver
                .recv()
                .await
                .map(|data| (InboundMessage::new(data), receiver))
        });
        Ok(stream.boxed())
    }

    /// 断开所有订阅，订阅流在取完已缓冲的消息后结束；主题保留
    async fn close(&self) -> DispatchResult<()> {
        let mut topics = self.topics.write().await;
        let closed: usize = topics
            .values_mut()
            .map(|state| state.subscribers.drain(..).count())
            .sum();
        debug!("内存总线已关闭，断开 {} 个订阅", closed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_requires_topic() {
        let bus = InMemoryMessageBus::new();
        let err = bus.publish("missing", b"x").await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_fan_out_to_every_subscription() {
        let bus = InMemoryMessageBus::new();
        bus.create_topic("responses").await.unwrap();
        bus.create_topic("responses").await.unwrap();

        let mut a = bus.subscribe("responses", "a").await.unwrap();
        let mut b = bus.subscribe("responses", "b").await.unwrap();

        bus.publish("responses", b"hello").await.unwrap();

        assert_eq!(a.next().await.unwrap().data, b"hello");
        assert_eq!(b.next().await.unwrap().data, b"hello");
        assert_eq!(
            bus.topic_stats("responses").await,
            Some(TopicStats {
                subscribers: 2,
                published: 1
            })
        );
    }

    #[tokio::test]
    async fn test_only_messages_after_subscribe_are_received() {
        let bus = InMemoryMessageBus::new();
        bus.create_topic("t").await.unwrap();
        bus.publish("t", b"early").await.unwrap();

        let mut sub = bus.subscribe("t", "late").await.unwrap();
        bus.publish("t", b"after").await.unwrap();

        let message = sub.next().await.unwrap();
        assert_eq!(message.data, b"after");
        message.ack().await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_subscription_name_rejected_until_dropped() {
        let bus = InMemoryMessageBus::new();
        bus.create_topic("t").await.unwrap();

        let sub = bus.subscribe("t", "s").await.unwrap();
        assert!(bus.subscribe("t", "s").await.is_err());

        drop(sub);
        assert!(bus.subscribe("t", "s").await.is_ok());
    }

    #[tokio::test]
    async fn test_close_ends_subscriptions() {
        let bus = InMemoryMessageBus::new();
        bus.create_topic("t").await.unwrap();
        let mut sub = bus.subscribe("t", "s").await.unwrap();

        bus.publish("t", b"buffered").await.unwrap();
        bus.close().await.unwrap();
        bus.close().await.unwrap();

        assert_eq!(sub.next().await.unwrap().data, b"buffered");
        assert!(sub.next().await.is_none());
        assert_eq!(
            bus.topic_stats("t").await,
            Some(TopicStats {
                subscribers: 0,
                published: 1
            })
        );
    }
}
