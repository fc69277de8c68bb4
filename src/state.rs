use crate::{
    cache::{OptimisticEngine, QueryCache, Reconciler},
    config::Config,
    error::Result,
    services::{
        api::ApiClient,
        auth::AuthService,
        chat::{ChatService, PresenceTracker},
        comment::CommentService,
        friend::FriendService,
        like::LikeService,
        notice::NoticeCenter,
        notification::NotificationService,
        post::PostService,
        realtime,
        search::SearchService,
    },
};

/// 一次客户端会话的共享状态
/// 所有服务共用同一个缓存、提示通道和令牌
#[derive(Clone)]
pub struct ClientState {
    /// 客户端配置
    pub config: Config,

    /// REST API 客户端（持有令牌）
    pub api: ApiClient,

    /// 查询缓存
    pub cache: QueryCache,

    /// 提示通道
    pub notices: NoticeCenter,

    /// 乐观更新引擎
    pub engine: OptimisticEngine,

    pub auth_service: AuthService,
    pub post_service: PostService,
    pub comment_service: CommentService,
    pub like_service: LikeService,
    pub notification_service: NotificationService,
    pub search_service: SearchService,
    pub friend_service: FriendService,
    pub chat_service: ChatService,

    /// 对方输入状态
    pub presence: PresenceTracker,
}

impl ClientState {
    pub async fn new(config: Config) -> Result<Self> {
        let api = ApiClient::new(&config)?;
        let cache = QueryCache::new(config.cache_stale_after());
        let notices = NoticeCenter::new();
        let reconciler = Reconciler::new(cache.clone(), notices.clone());
        let engine = OptimisticEngine::new(reconciler.clone());
        let channel = realtime::connect(&config).await?;

        let auth_service = AuthService::new(api.clone(), reconciler.clone(), config.clone()).await?;
        let post_service = PostService::new(api.clone(), engine.clone(), config.clone()).await?;
        let comment_service = CommentService::new(api.clone(), engine.clone(), config.clone()).await?;
        let like_service = LikeService::new(post_service.clone(), comment_service.clone(), &config).await?;
        let notification_service = NotificationService::new(api.clone(), reconciler.clone()).await?;
        let search_service = SearchService::new(api.clone(), reconciler.clone()).await?;
        let friend_service = FriendService::new(api.clone(), reconciler.clone(), config.clone()).await?;
        let chat_service = ChatService::new(api.clone(), reconciler, channel.clone(), config.clone()).await?;

        let presence = PresenceTracker::new();
        presence.spawn(channel);

        Ok(Self {
            config,
            api,
            cache,
            notices,
            engine,
            auth_service,
            post_service,
            comment_service,
            like_service,
            notification_service,
            search_service,
            friend_service,
            chat_service,
            presence,
        })
    }

    /// 退出登录：清除令牌、缓存、点赞按钮和实体版本
    pub fn logout(&self) {
        self.like_service.reset();
        self.engine.versions().clear();
        self.auth_service.logout();
    }

    pub fn is_authenticated(&self) -> bool {
        self.api.tokens().is_authenticated()
    }

    /// 检查是否为生产环境
    pub fn is_production(&self) -> bool {
        self.config.is_production()
    }

    /// 检查是否为开发环境
    pub fn is_development(&self) -> bool {
        self.config.is_development()
    }
}
