use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    cache::{QueryKey, Reconciler},
    config::Config,
    error::Result,
    models::chat::*,
    services::api::ApiClient,
    services::realtime::RealtimeChannel,
    utils::{validation::validate_body, Debouncer},
};

#[derive(Clone)]
pub struct ChatService {
    api: ApiClient,
    reconciler: Reconciler,
    channel: Arc<dyn RealtimeChannel>,
    config: Config,
}

impl ChatService {
    pub async fn new(
        api: ApiClient,
        reconciler: Reconciler,
        channel: Arc<dyn RealtimeChannel>,
        config: Config,
    ) -> Result<Self> {
        Ok(Self {
            api,
            reconciler,
            channel,
            config,
        })
    }

    pub fn channel(&self) -> Arc<dyn RealtimeChannel> {
        self.channel.clone()
    }

    pub async fn conversations(&self) -> Result<Vec<Conversation>> {
        self.reconciler
            .read(&QueryKey::conversations(), || self.api.get("chat/"))
            .await
    }

    pub async fn conversation(&self, conversation_id: &str) -> Result<ConversationDetail> {
        let path = format!("chat/{}/", conversation_id);
        self.reconciler
            .read(&QueryKey::chat_history(conversation_id), || self.api.get(&path))
            .await
    }

    /// 发送私信，成功后通过实时通道通知对方
    pub async fn send_message(
        &self,
        conversation_id: &str,
        receiver_id: Option<&str>,
        body: &str,
    ) -> Result<ChatMessage> {
        let body = validate_body(body, self.config.max_comment_length, "消息不能为空")?;
        let path = format!("chat/{}/send/", conversation_id);
        let message: ChatMessage = self.api.post(&path, &SendMessageRequest { body }).await?;
        debug!("Message {} sent in conversation {}", message.id, conversation_id);

        self.reconciler.settle(&[
            QueryKey::chat_history(conversation_id).into(),
            QueryKey::conversations().into(),
        ]);

        let event = RealtimeEvent::Message {
            conversation_id: conversation_id.to_string(),
            sender_id: message.sender_id().to_string(),
            receiver_id: receiver_id.map(str::to_string),
            body: message.body.clone(),
        };
        if let Err(e) = self.channel.publish(event).await {
            warn!("Failed to publish message event: {}", e);
        }
        Ok(message)
    }

    pub fn typing_indicator(&self, conversation_id: &str, user_id: &str) -> TypingIndicator {
        TypingIndicator::new(
            self.channel.clone(),
            conversation_id,
            user_id,
            self.config.typing_idle(),
        )
    }
}

/// 本方输入状态：第一次输入非空内容时发布 typing，停止输入一段时间后发布 idle
#[derive(Clone)]
pub struct TypingIndicator {
    channel: Arc<dyn RealtimeChannel>,
    conversation_id: String,
    user_id: String,
    typing: Arc<AtomicBool>,
    idle_timer: Debouncer,
}

impl TypingIndicator {
    pub fn new(channel: Arc<dyn RealtimeChannel>, conversation_id: &str, user_id: &str, idle_after: Duration) -> Self {
        Self {
            channel,
            conversation_id: conversation_id.to_string(),
            user_id: user_id.to_string(),
            typing: Arc::new(AtomicBool::new(false)),
            idle_timer: Debouncer::new(idle_after),
        }
    }

    pub fn is_typing(&self) -> bool {
        self.typing.load(Ordering::SeqCst)
    }

    fn event(&self, status: TypingStatus) -> RealtimeEvent {
        RealtimeEvent::AwarenessUpdate {
            user_id: self.user_id.clone(),
            conversation_id: self.conversation_id.clone(),
            status,
        }
    }

    /// 输入框内容变化
    pub async fn on_input(&self, text: &str) -> Result<()> {
        if !text.trim().is_empty() && !self.typing.swap(true, Ordering::SeqCst) {
            self.channel.publish(self.event(TypingStatus::Typing)).await?;
        }

        let indicator = self.clone();
        self.idle_timer.trigger(move || async move {
            if let Err(e) = indicator.go_idle().await {
                warn!("Failed to publish idle status: {}", e);
            }
        });
        Ok(())
    }

    /// 发送消息时立即回到 idle
    pub async fn on_send(&self) -> Result<()> {
        self.idle_timer.cancel();
        self.go_idle().await
    }

    async fn go_idle(&self) -> Result<()> {
        if self.typing.swap(false, Ordering::SeqCst) {
            self.channel.publish(self.event(TypingStatus::Idle)).await?;
        }
        Ok(())
    }
}

/// 对方输入状态，按 (会话, 用户) 记录
#[derive(Clone, Default)]
pub struct PresenceTracker {
    statuses: Arc<DashMap<(String, String), TypingStatus>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self, conversation_id: &str, user_id: &str) -> TypingStatus {
        self.statuses
            .get(&(conversation_id.to_string(), user_id.to_string()))
            .map(|s| *s)
            .unwrap_or(TypingStatus::Idle)
    }

    pub fn apply(&self, event: &RealtimeEvent) {
        match event {
            RealtimeEvent::AwarenessUpdate {
                user_id,
                conversation_id,
                status,
            } => {
                self.statuses
                    .insert((conversation_id.clone(), user_id.clone()), *status);
            }
            // 收到消息说明对方已停止输入
            RealtimeEvent::Message {
                conversation_id,
                sender_id,
                ..
            } => {
                self.statuses
                    .insert((conversation_id.clone(), sender_id.clone()), TypingStatus::Idle);
            }
        }
    }

    /// 订阅实时通道，持续更新状态
    pub fn spawn(&self, channel: Arc<dyn RealtimeChannel>) -> JoinHandle<()> {
        let tracker = self.clone();
        let mut rx = channel.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => tracker.apply(&event),
                    Err(RecvError::Lagged(skipped)) => warn!("Presence tracker lagged, skipped {} events", skipped),
                    Err(RecvError::Closed) => {
                        info!("Realtime channel closed, presence tracker stopped");
                        break;
                    }
                }
            }
        })
    }
}
