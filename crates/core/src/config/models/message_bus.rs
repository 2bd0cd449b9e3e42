use serde::{Deserialize, Serialize};

/// Message bus type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageBusType {
    #[default]
    InMemory,
    Rabbitmq,
}

/// Message bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageBusConfig {
    #[serde(rename = "type")]
    pub r#type: MessageBusType,
    pub url: String,
    /// 分发任务的工作主题
    pub work_topic: String,
    /// Worker 回传结果的主题
    pub response_topic: String,
    /// 订阅名前缀，进程启动时追加唯一后缀
    pub subscription_prefix: String,
}

impl Default for MessageBusConfig {
    fn default() -> Self {
        Self {
            r#type: MessageBusType::InMemory,
            url: "amqp://127.0.0.1:5672/%2f".to_string(),
            work_topic: "image-processing".to_string(),
            response_topic: "image-processing-responses".to_string(),
            subscription_prefix: "dispatcher".to_string(),
        }
    }
}

impl MessageBusConfig {
    /// Validate message bus configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.work_topic.is_empty() {
            return Err(anyhow::anyhow!("工作主题名称不能为空"));
        }

        if self.response_topic.is_empty() {
            return Err(anyhow::anyhow!("响应主题名称不能为空"));
        }

        if self.work_topic == self.response_topic {
            return Err(anyhow::anyhow!("工作主题与响应主题不能相同"));
        }

        if self.subscription_prefix.is_empty() {
            return Err(anyhow::anyhow!("订阅名前缀不能为空"));
        }

        if self.r#type == MessageBusType::Rabbitmq {
            if self.url.is_empty() {
                return Err(anyhow::anyhow!("RabbitMQ URL不能为空"));
            }

            if !self.url.starts_with("amqp://") && !self.url.starts_with("amqps://") {
                return Err(anyhow::anyhow!("RabbitMQ URL必须是AMQP格式"));
            }
        }

        Ok(())
    }

    /// 生成本进程唯一的订阅名，避免多个部署共享同一主题时冲突
    pub fn unique_subscription_name(&self, started_at_millis: i64, nonce: &str) -> String {
        format!(
            "{}-{}-{}-{}",
            self.subscription_prefix, self.response_topic, started_at_millis, nonce
        )
    }
}
