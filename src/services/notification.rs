use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    cache::{QueryKey, Reconciler},
    error::Result,
    models::notification::*,
    models::response::MessageResponse,
    services::api::ApiClient,
};

#[derive(Clone)]
pub struct NotificationService {
    api: ApiClient,
    reconciler: Reconciler,
}

impl NotificationService {
    pub async fn new(api: ApiClient, reconciler: Reconciler) -> Result<Self> {
        Ok(Self { api, reconciler })
    }

    /// 未读通知
    pub async fn notifications(&self) -> Result<Vec<Notification>> {
        self.reconciler
            .read(&QueryKey::notifications(), || self.api.get("notifications/"))
            .await
    }

    pub async fn refresh(&self) -> Result<Vec<Notification>> {
        self.reconciler
            .refetch(&QueryKey::notifications(), || self.api.get("notifications/"))
            .await
    }

    pub async fn mark_read(&self, notification_id: &str) -> Result<MessageResponse> {
        let path = format!("notifications/read/{}/", notification_id);
        match self.api.post_empty::<MessageResponse>(&path).await {
            Ok(response) => {
                debug!("Notification {} marked as read", notification_id);
                self.reconciler.settle(&[QueryKey::notifications().into()]);
                Ok(response)
            }
            Err(e) => {
                self.reconciler
                    .notices()
                    .error(format!("标记通知失败: {}", e.user_message()));
                Err(e)
            }
        }
    }

    pub async fn mark_all_read(&self) -> Result<ReadAllResponse> {
        match self.api.post_empty::<ReadAllResponse>("notifications/read-all/").await {
            Ok(response) => {
                info!("Marked {} notifications as read", response.count);
                self.reconciler.settle(&[QueryKey::notifications().into()]);
                self.reconciler.notices().success(response.summary());
                Ok(response)
            }
            Err(e) => {
                self.reconciler
                    .notices()
                    .error(format!("批量标记已读失败: {}", e.user_message()));
                Err(e)
            }
        }
    }

    /// 后台定时刷新通知列表
    pub fn spawn_poller(&self, every: Duration) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                match service.refresh().await {
                    Ok(list) => debug!("Polled {} notifications", list.len()),
                    Err(e) => warn!("Notification poll failed: {}", e),
                }
            }
        })
    }
}
