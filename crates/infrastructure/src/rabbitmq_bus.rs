use async_trait::async_trait;
use futures::StreamExt;
use jobrelay_core::{
    Acker, DispatchError, DispatchResult, InboundMessage, MessageBus, Subscription,
};
use lapin::{
    options::*, types::FieldTable, BasicProperties, Channel, Connection, ConnectionProperties,
    ExchangeKind,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// RabbitMQ消息总线实现
///
/// 主题对应持久化的 fanout 交换机，订阅对应绑定到该交换机的独占、自动删除队列。
/// 发布会等待 broker 的发布确认。
pub struct RabbitMqMessageBus {
    connection: Connection,
    channel: Arc<Mutex<Channel>>,
}

impl RabbitMqMessageBus {
    /// 连接 RabbitMQ 并开启发布确认
    pub async fn new(url: &str) -> DispatchResult<Self> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| DispatchError::message_bus(format!("连接RabbitMQ失败: {e}")))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| DispatchError::message_bus(format!("创建通道失败: {e}")))?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| DispatchError::message_bus(format!("开启发布确认失败: {e}")))?;

        info!("成功连接到RabbitMQ: {}", url);

        Ok(Self {
            connection,
            channel: Arc::new(Mutex::new(channel)),
        })
    }
}

struct LapinAcker(lapin::acker::Acker);

#[async_trait]
impl Acker for LapinAcker {
    async fn ack(&self) -> DispatchResult<()> {
        self.0
            .ack(BasicAckOptions::default())
            .await
            .map(|_| ())
            .map_err(|e| DispatchError::message_bus(format!("确认消息失败: {e}")))
    }
}

#[async_trait]
impl MessageBus for RabbitMqMessageBus {
    async fn create_topic(&self, topic: &str) -> DispatchResult<()> {
        let channel = self.channel.lock().await;
        channel
            .exchange_declare(
                topic,
                ExchangeKind::Fanout,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| DispatchError::message_bus(format!("声明交换机 {topic} 失败: {e}")))?;

        debug!("交换机 {} 声明成功", topic);
        Ok(())
    }

    async fn publish(&self, topic: &str, data: &[u8]) -> DispatchResult<()> {
        let channel = self.channel.lock().await;

        let confirm = channel
            .basic_publish(
                topic,
                "",
                BasicPublishOptions::default(),
                data,
                BasicProperties::default().with_delivery_mode(2), // 2 = persistent
            )
            .await
            .map_err(|e| DispatchError::message_bus(format!("发布消息到 {topic} 失败: {e}")))?;

        // 等待确认
        let confirmation = confirm
            .await
            .map_err(|e| DispatchError::message_bus(format!("消息发布确认失败: {e}")))?;
        if confirmation.is_nack() {
            return Err(DispatchError::message_bus(format!(
                "broker 拒绝了发往 {topic} 的消息"
            )));
        }

        debug!("消息已发布到交换机 {} ({} 字节)", topic, data.len());
        Ok(())
    }

    async fn subscribe(&self, topic: &str, subscription: &str) -> DispatchResult<Subscription> {
        let channel = self.channel.lock().await;

        channel
            .queue_declare(
                subscription,
                QueueDeclareOptions {
                    durable: false,
                    exclusive: true,
                    auto_delete: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                DispatchError::message_bus(format!("声明队列 {subscription} 失败: {e}"))
            })?;

        channel
            .queue_bind(
                subscription,
                topic,
                "",
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                DispatchError::message_bus(format!("绑定队列 {subscription} 到 {topic} 失败: {e}"))
            })?;

        let consumer_tag = format!("{subscription}-{}", &uuid::Uuid::new_v4().to_string()[..8]);
        let consumer = channel
            .basic_consume(
                subscription,
                &consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| DispatchError::message_bus(format!("创建消费者失败: {e}")))?;

        info!("订阅 {} 已绑定到交换机 {}，消费者: {}", subscription, topic, consumer_tag);

        let stream = consumer.filter_map(|delivery| async move {
            match delivery {
                Ok(delivery) => Some(InboundMessage::with_acker(
                    delivery.data,
                    Box::new(LapinAcker(delivery.acker)),
                )),
                Err(e) => {
                    warn!("接收RabbitMQ消息失败: {}", e);
                    None
                }
            }
        });
        Ok(stream.boxed())
    }

    async fn close(&self) -> DispatchResult<()> {
        if !self.connection.status().connected() {
            debug!("RabbitMQ连接已关闭，跳过");
            return Ok(());
        }

        self.connection
            .close(200, "正常关闭")
            .await
            .map_err(|e| DispatchError::message_bus(format!("关闭连接失败: {e}")))?;

        info!("RabbitMQ连接已关闭");
        Ok(())
    }
}
