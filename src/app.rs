use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use jobrelay_core::{
    AppConfig, BlobStore, ChannelProducer, JobRequest, MessageBus, ProducerEvent,
};
use jobrelay_dispatcher::{Dispatcher, JobRegistry};
use jobrelay_infrastructure::{create_blob_store, create_message_bus};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// 读取线程与分发器之间缓冲的请求行数
const INPUT_BUFFER: usize = 64;
/// 关闭时等待剩余事件写出的最长时间
const EVENT_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// 主应用程序：组装分发器并把生产者 IPC（JSON 行）接到分发器上
pub struct Application {
    config: AppConfig,
    bus: Arc<dyn MessageBus>,
    dispatcher: Dispatcher,
    events: mpsc::UnboundedReceiver<ProducerEvent>,
}

impl Application {
    /// 按配置创建消息总线与对象存储
    pub async fn new(config: AppConfig) -> Result<Self> {
        let bus = create_message_bus(&config.message_bus)
            .await
            .context("创建消息总线失败")?;
        let blobs = create_blob_store(&config.blob_store)
            .await
            .context("创建对象存储失败")?;

        Ok(Self::with_components(config, bus, blobs))
    }

    pub fn with_components(
        config: AppConfig,
        bus: Arc<dyn MessageBus>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        let registry = Arc::new(JobRegistry::with_defaults());
        let (producer, events) = ChannelProducer::channel();
        let dispatcher =
            Dispatcher::from_config(&config, registry, Arc::clone(&bus), blobs, Arc::new(producer));

        info!(
            "分发器已初始化: 工作主题 {}，响应主题 {}，超时 {:?}，直接发布阈值 {} 字节",
            config.message_bus.work_topic,
            config.message_bus.response_topic,
            dispatcher.job_timeout(),
            dispatcher.transport().threshold()
        );

        Self {
            config,
            bus,
            dispatcher,
            events,
        }
    }

    /// 运行直到输入结束且在途任务清空，或收到关闭信号
    pub async fn run<W>(
        self,
        input: mpsc::Receiver<std::io::Result<String>>,
        output: W,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let Self {
            config,
            bus,
            dispatcher,
            events,
        } = self;
        let topics = &config.message_bus;

        for topic in [&topics.work_topic, &topics.response_topic] {
            bus.create_topic(topic)
                .await
                .with_context(|| format!("创建主题 {topic} 失败"))?;
        }

        let nonce = uuid::Uuid::new_v4().simple().to_string();
        let subscription_name =
            topics.unique_subscription_name(Utc::now().timestamp_millis(), &nonce[..8]);
        let subscription = bus
            .subscribe(&topics.response_topic, &subscription_name)
            .await
            .with_context(|| format!("订阅响应主题 {} 失败", topics.response_topic))?;
        info!("已订阅响应主题 {}，订阅名: {}", topics.response_topic, subscription_name);

        let router = dispatcher.router();
        let router_shutdown = shutdown.resubscribe();
        let router_handle =
            tokio::spawn(async move { router.run(subscription, router_shutdown).await });
        let writer_handle = tokio::spawn(write_events(events, output));

        let result = read_requests(&dispatcher, input, &mut shutdown).await;

        let abandoned = dispatcher.table().pending_ids();
        if !abandoned.is_empty() {
            warn!("放弃 {} 个仍在途的任务: {:?}", abandoned.len(), abandoned);
        }

        // 释放关联表与定时器，未完成的续延随之结束，事件通道随之关闭
        router_handle.abort();
        let _ = router_handle.await;
        drop(dispatcher);

        if let Err(e) = bus.close().await {
            warn!("关闭消息总线失败: {}", e);
        }

        match tokio::time::timeout(EVENT_FLUSH_TIMEOUT, writer_handle).await {
            Ok(Ok(())) => debug!("生产者事件已全部写出"),
            Ok(Err(e)) => error!("事件写出任务异常退出: {e}"),
            Err(_) => warn!("等待事件写出超时"),
        }

        result
    }
}

/// 在独立线程上逐行读取输入。
///
/// 线程阻塞在读调用上时不占用运行时的阻塞线程池，收到关闭信号后进程可以直接退出，
/// 不必等到下一行或输入结束。接收端被丢弃后线程在下一行到达时退出。
pub fn spawn_line_reader<R>(reader: R) -> Result<mpsc::Receiver<std::io::Result<String>>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(INPUT_BUFFER);
    std::thread::Builder::new()
        .name("jobrelay-input".to_string())
        .spawn(move || {
            for line in reader.lines() {
                let failed = line.is_err();
                if tx.blocking_send(line).is_err() || failed {
                    break;
                }
            }
        })
        .context("启动输入读取线程失败")?;
    Ok(rx)
}

/// 逐行读取任务请求；输入结束后等待在途任务清空
async fn read_requests(
    dispatcher: &Dispatcher,
    mut input: mpsc::Receiver<std::io::Result<String>>,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!("停止接收任务请求");
                return Ok(());
            }
            line = input.recv() => match line.transpose().context("读取任务请求失败")? {
                Some(line) => submit_line(dispatcher, &line).await,
                None => {
                    info!("输入已结束，等待 {} 个在途任务完成", dispatcher.table().len());
                    break;
                }
            },
        }
    }

    tokio::select! {
        _ = shutdown.recv() => {
            info!("等待在途任务时收到关闭信号");
        }
        _ = dispatcher.table().wait_until_empty() => {
            info!("所有任务已处理完成");
        }
    }
    Ok(())
}

async fn submit_line(dispatcher: &Dispatcher, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    match JobRequest::from_json(line) {
        Ok(request) => {
            let outcome = dispatcher.submit(request).await;
            debug!("提交结果: {:?}", outcome);
        }
        Err(e) => warn!("忽略无法解析的任务请求: {}", e),
    }
}

/// 把生产者事件逐行写出，直到所有发送端关闭
async fn write_events<W>(mut events: mpsc::UnboundedReceiver<ProducerEvent>, mut output: W)
where
    W: AsyncWrite + Unpin,
{
    while let Some(event) = events.recv().await {
        let mut line = match event.to_json_line() {
            Ok(line) => line,
            Err(e) => {
                error!("序列化任务 {} 的事件失败: {}", event.job_id(), e);
                continue;
            }
        };
        line.push('\n');

        if let Err(e) = output.write_all(line.as_bytes()).await {
            error!("写出任务 {} 的事件失败: {}", event.job_id(), e);
            continue;
        }
        if let Err(e) = output.flush().await {
            error!("刷新事件输出失败: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use jobrelay_core::{WorkerEnvelope, WorkerResponse};
    use jobrelay_infrastructure::{InMemoryBlobStore, InMemoryMessageBus};
    use serde_json::json;
    use tokio::io::{AsyncReadExt, BufReader};

    /// 读调用一直阻塞、直到发送端被丢弃才返回 EOF 的输入，模拟保持打开的标准输入管道
    struct HeldOpenInput(std::sync::mpsc::Receiver<()>);

    impl std::io::Read for HeldOpenInput {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            let _ = self.0.recv();
            Ok(0)
        }
    }

    fn held_open_input() -> (std::sync::mpsc::Sender<()>, std::io::BufReader<HeldOpenInput>) {
        let (tx, rx) = std::sync::mpsc::channel();
        (tx, std::io::BufReader::new(HeldOpenInput(rx)))
    }

    async fn collect_events(reader: tokio::io::DuplexStream) -> Vec<ProducerEvent> {
        let mut text = String::new();
        BufReader::new(reader).read_to_string(&mut text).await.unwrap();
        text.lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_run_processes_input_until_drained() {
        let dir = tempfile::tempdir().unwrap();
        let input_file = dir.path().join("cat.png");
        std::fs::write(&input_file, b"png").unwrap();

        let config = AppConfig::default();
        let bus = InMemoryMessageBus::new();
        bus.create_topic(&config.message_bus.work_topic).await.unwrap();
        let mut work = bus
            .subscribe(&config.message_bus.work_topic, "fake-worker")
            .await
            .unwrap();

        // 模拟 Worker：收到任务后立即回复完成
        let worker_bus = bus.clone();
        let response_topic = config.message_bus.response_topic.clone();
        tokio::spawn(async move {
            while let Some(message) = work.next().await {
                let envelope = WorkerEnvelope::deserialize_bytes(&message.data).unwrap();
                let response = WorkerResponse::completed(envelope.job_id, json!({ "output": [] }));
                worker_bus
                    .publish(&response_topic, &response.to_bytes().unwrap())
                    .await
                    .unwrap();
            }
        });

        let app = Application::with_components(
            config,
            Arc::new(bus.clone()),
            Arc::new(InMemoryBlobStore::new()),
        );

        let input = format!(
            "{}\nnot json\n\n{}\n",
            json!({ "id": "a1", "jobType": "IMAGE_PROCESSING", "inputs": [input_file] }),
            json!({ "id": "v1", "jobTypeName": "VIDEO_TRANSCODE", "inputs": [] }),
        );
        let (writer, reader) = tokio::io::duplex(64 * 1024);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let input = spawn_line_reader(std::io::Cursor::new(input.into_bytes())).unwrap();
        app.run(input, writer, shutdown_rx).await.unwrap();

        let events = collect_events(reader).await;
        assert_eq!(events.len(), 2);
        assert!(events.contains(&ProducerEvent::NotPermitted {
            id: "v1".to_string(),
            job_type_name: "VIDEO_TRANSCODE".to_string(),
        }));
        assert!(events.contains(&ProducerEvent::JobCompleted {
            id: "a1".to_string(),
            result: json!({ "output": [] }),
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_abandons_in_flight_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let input_file = dir.path().join("cat.png");
        std::fs::write(&input_file, b"png").unwrap();

        let app = Application::with_components(
            AppConfig::default(),
            Arc::new(InMemoryMessageBus::new()),
            Arc::new(InMemoryBlobStore::new()),
        );

        let input = format!(
            "{}\n",
            json!({ "id": "a1", "jobType": "IMAGE_PROCESSING", "inputs": [input_file] })
        );
        let (writer, reader) = tokio::io::duplex(64 * 1024);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let input = spawn_line_reader(std::io::Cursor::new(input.into_bytes())).unwrap();
        let handle = tokio::spawn(async move { app.run(input, writer, shutdown_rx).await });

        tokio::time::sleep(Duration::from_secs(1)).await;
        shutdown_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();

        // 任务被放弃，既没有完成也没有超时事件
        assert!(collect_events(reader).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_returns_while_input_stays_open() {
        let (_hold, reader) = held_open_input();
        let app = Application::with_components(
            AppConfig::default(),
            Arc::new(InMemoryMessageBus::new()),
            Arc::new(InMemoryBlobStore::new()),
        );
        let (writer, reader_side) = tokio::io::duplex(1024);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let input = spawn_line_reader(reader).unwrap();
        let handle = tokio::spawn(async move { app.run(input, writer, shutdown_rx).await });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!handle.is_finished());
        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(collect_events(reader_side).await.is_empty());
    }

    #[test]
    fn test_runtime_drop_not_blocked_by_open_input() {
        let (hold, reader) = held_open_input();
        let (done_tx, done_rx) = std::sync::mpsc::channel();

        std::thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            runtime.block_on(async {
                let app = Application::with_components(
                    AppConfig::default(),
                    Arc::new(InMemoryMessageBus::new()),
                    Arc::new(InMemoryBlobStore::new()),
                );
                let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
                let input = spawn_line_reader(reader).unwrap();
                shutdown_tx.send(()).unwrap();
                app.run(input, tokio::io::sink(), shutdown_rx).await.unwrap();
            });
            drop(runtime);
            let _ = done_tx.send(());
        });

        // 输入仍然保持打开，运行时也必须能够关闭
        assert!(done_rx.recv_timeout(Duration::from_secs(10)).is_ok());
        drop(hold);
    }
}
