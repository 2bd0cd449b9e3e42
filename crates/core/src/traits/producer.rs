use tokio::sync::mpsc;
use tracing::warn;

use crate::models::ProducerEvent;

/// 向上游生产者回报任务结果的通道
pub trait ProducerChannel: Send + Sync {
    fn report(&self, event: ProducerEvent);
}

/// 基于 tokio 无界通道的生产者通道
#[derive(Debug, Clone)]
pub struct ChannelProducer {
    tx: mpsc::UnboundedSender<ProducerEvent>,
}

impl ChannelProducer {
    pub fn new(tx: mpsc::UnboundedSender<ProducerEvent>) -> Self {
        Self { tx }
    }

    /// 创建通道，返回生产者端与事件接收端
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProducerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl ProducerChannel for ChannelProducer {
    fn report(&self, event: ProducerEvent) {
        if let Err(e) = self.tx.send(event) {
            warn!("生产者通道已关闭，事件被丢弃: {:?}", e.0);
        }
    }
}
