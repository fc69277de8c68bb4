use tracing::info;

use crate::{
    cache::{QueryKey, QueryKind, Reconciler},
    config::Config,
    error::Result,
    models::friend::*,
    models::response::{MessageResponse, StatusResponse},
    models::search::SearchUser,
    services::api::ApiClient,
    utils::validation::truncate_chars,
};

#[derive(Clone)]
pub struct FriendService {
    api: ApiClient,
    reconciler: Reconciler,
    config: Config,
}

impl FriendService {
    pub async fn new(api: ApiClient, reconciler: Reconciler, config: Config) -> Result<Self> {
        Ok(Self { api, reconciler, config })
    }

    pub async fn friends(&self, user_id: &str) -> Result<FriendsView> {
        let path = format!("friends/{}/", user_id);
        self.reconciler
            .read(&QueryKey::friends(user_id), || self.api.get(&path))
            .await
    }

    pub async fn suggestions(&self) -> Result<Vec<SearchUser>> {
        self.reconciler
            .read(&QueryKey::friend_suggestions(), || self.api.get("friends/suggested/"))
            .await
    }

    /// 发送好友请求，附言超出长度时截断
    pub async fn send_request(&self, user_id: &str, message: &str) -> Result<MessageResponse> {
        let request = SendFriendRequest {
            message: truncate_chars(message.trim(), self.config.friend_request_message_max),
        };
        let path = format!("friends/{}/request/", user_id);
        let response: MessageResponse = self.api.post(&path, &request).await?;
        info!("Friend request sent to {}", user_id);

        self.reconciler.settle(&[
            QueryKind::FriendSuggestions.into(),
            QueryKey::user_posts(user_id).into(),
        ]);
        Ok(response)
    }

    pub async fn respond(&self, user_id: &str, decision: FriendRequestDecision) -> Result<MessageResponse> {
        let path = format!("friends/{}/{}/", user_id, decision);
        let response: MessageResponse = self.api.post_empty(&path).await?;
        info!("Friend request from {} {}", user_id, decision);

        self.reconciler.settle(&[
            QueryKind::Friends.into(),
            QueryKind::FriendSuggestions.into(),
            QueryKind::Conversations.into(),
            QueryKind::Notifications.into(),
        ]);
        Ok(response)
    }

    /// 删除好友；双方的会话和推荐随之变化
    pub async fn remove_friend(&self, user_id: &str) -> Result<StatusResponse> {
        let path = format!("friends/{}/remove/", user_id);
        let response: StatusResponse = self.api.post_empty(&path).await?;
        info!("Removed friend {}", user_id);

        self.reconciler.settle(&[
            QueryKind::Friends.into(),
            QueryKind::FriendSuggestions.into(),
            QueryKind::Conversations.into(),
            QueryKey::user_posts(user_id).into(),
            QueryKey::profile().into(),
        ]);
        let notices = self.reconciler.notices();
        match (response.success, response.message.is_empty()) {
            (true, true) => notices.success("已成功删除好友关系"),
            (true, false) => notices.success(response.message.clone()),
            (false, _) => notices.error("删除好友失败"),
        }
        Ok(response)
    }
}
