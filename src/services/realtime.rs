use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::{config::Config, error::Result, models::chat::RealtimeEvent};

/// 实时通道：发布输入状态与新消息，并接收对方的事件
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    async fn publish(&self, event: RealtimeEvent) -> Result<()>;

    fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent>;
}

/// 进程内广播通道
#[derive(Debug, Clone)]
pub struct BroadcastChannel {
    tx: broadcast::Sender<RealtimeEvent>,
}

impl BroadcastChannel {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }
}

impl Default for BroadcastChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RealtimeChannel for BroadcastChannel {
    async fn publish(&self, event: RealtimeEvent) -> Result<()> {
        debug!("Publishing realtime event: {:?}", event);
        // 没有订阅者时发送失败，忽略即可
        let _ = self.tx.send(event);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.tx.subscribe()
    }
}

#[cfg(feature = "websocket")]
pub use ws::WebSocketChannel;

#[cfg(feature = "websocket")]
mod ws {
    use super::*;
    use crate::error::ClientError;
    use futures::{sink::SinkExt, stream::StreamExt};
    use tokio::sync::mpsc;
    use tokio_tungstenite::{connect_async, tungstenite::Message};
    use tracing::{error, warn};

    /// JSON over WebSocket
    #[derive(Debug, Clone)]
    pub struct WebSocketChannel {
        outgoing: mpsc::UnboundedSender<RealtimeEvent>,
        incoming: broadcast::Sender<RealtimeEvent>,
    }

    impl WebSocketChannel {
        pub async fn connect(url: &str) -> Result<Self> {
            let (stream, _) = connect_async(url)
                .await
                .map_err(|e| ClientError::Realtime(e.to_string()))?;
            info!("Realtime connection established: {}", url);

            let (mut sink, mut source) = stream.split();
            let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<RealtimeEvent>();
            let (incoming, _) = broadcast::channel(256);

            // 发送任务
            tokio::spawn(async move {
                while let Some(event) = outgoing_rx.recv().await {
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Failed to encode realtime event: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        error!("Realtime send failed: {}", e);
                        break;
                    }
                }
            });

            // 接收任务
            let forward = incoming.clone();
            tokio::spawn(async move {
                while let Some(message) = source.next().await {
                    match message {
                        Ok(Message::Text(text)) => match serde_json::from_str::<RealtimeEvent>(&text) {
                            Ok(event) => {
                                let _ = forward.send(event);
                            }
                            Err(e) => debug!("Ignoring unknown realtime payload: {}", e),
                        },
                        Ok(Message::Close(_)) => {
                            info!("Realtime connection closed by server");
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!("Realtime connection error: {}", e);
                            break;
                        }
                    }
                }
            });

            Ok(Self { outgoing, incoming })
        }
    }

    #[async_trait]
    impl RealtimeChannel for WebSocketChannel {
        async fn publish(&self, event: RealtimeEvent) -> Result<()> {
            self.outgoing
                .send(event)
                .map_err(|_| ClientError::Realtime("connection closed".to_string()))
        }

        fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
            self.incoming.subscribe()
        }
    }
}

#[cfg(feature = "websocket")]
async fn connect_socket(url: &str) -> Result<Arc<dyn RealtimeChannel>> {
    Ok(Arc::new(WebSocketChannel::connect(url).await?))
}

#[cfg(not(feature = "websocket"))]
async fn connect_socket(url: &str) -> Result<Arc<dyn RealtimeChannel>> {
    info!("websocket feature disabled, ignoring {}; using in-process channel", url);
    Ok(Arc::new(BroadcastChannel::new()))
}

/// 根据配置选择实时通道
pub async fn connect(config: &Config) -> Result<Arc<dyn RealtimeChannel>> {
    match &config.realtime_url {
        Some(url) => connect_socket(url).await,
        None => Ok(Arc::new(BroadcastChannel::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::TypingStatus;

    #[tokio::test]
    async fn test_broadcast_delivers_to_subscribers() {
        let channel = BroadcastChannel::new();
        let mut rx = channel.subscribe();
        let event = RealtimeEvent::AwarenessUpdate {
            user_id: "u1".to_string(),
            conversation_id: "c1".to_string(),
            status: TypingStatus::Typing,
        };
        channel.publish(event.clone()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_default_connection_is_in_process() {
        let channel = connect(&Config::default()).await.unwrap();
        // 无订阅者时发布不报错
        assert!(channel
            .publish(RealtimeEvent::AwarenessUpdate {
                user_id: "u1".to_string(),
                conversation_id: "c1".to_string(),
                status: TypingStatus::Idle,
            })
            .await
            .is_ok());
    }
}
