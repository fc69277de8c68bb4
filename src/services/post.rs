use reqwest::multipart::{Form, Part};
use tracing::{debug, info};
use validator::Validate;

use crate::{
    cache::{EntityRef, KeyFilter, Location, OptimisticEngine, QueryKey, QueryKind},
    config::Config,
    error::{ClientError, Result},
    models::like::{LikeRequest, Likeable},
    models::post::*,
    models::search::{SearchPostsPages, SearchResults},
    services::api::ApiClient,
    utils::validation::validate_body,
};

/// 点赞失败提示前缀
pub const LIKE_FAILED_NOTICE: &str = "点赞失败";

#[derive(Clone)]
pub struct PostService {
    api: ApiClient,
    engine: OptimisticEngine,
    config: Config,
}

impl PostService {
    pub async fn new(api: ApiClient, engine: OptimisticEngine, config: Config) -> Result<Self> {
        Ok(Self { api, engine, config })
    }

    pub fn engine(&self) -> &OptimisticEngine {
        &self.engine
    }

    /// 首页帖子列表
    pub async fn feed(&self) -> Result<Vec<Post>> {
        self.engine
            .reconciler()
            .read(&QueryKey::posts(), || self.api.get("posts/"))
            .await
    }

    pub async fn post_detail(&self, post_id: &str) -> Result<PostDetail> {
        let path = format!("posts/{}/", post_id);
        self.engine
            .reconciler()
            .read(&QueryKey::post(post_id), || self.api.get(&path))
            .await
    }

    pub async fn profile_posts(&self, user_id: &str) -> Result<ProfilePosts> {
        let path = format!("posts/profile/{}/", user_id);
        self.engine
            .reconciler()
            .read(&QueryKey::user_posts(user_id), || self.api.get(&path))
            .await
    }

    pub async fn liked_posts(&self, user_id: &str) -> Result<Vec<Post>> {
        let path = format!("posts/liked/{}/", user_id);
        self.engine
            .reconciler()
            .read(&QueryKey::liked_posts(user_id), || self.api.get(&path))
            .await
    }

    pub async fn trends(&self) -> Result<Vec<Trend>> {
        self.engine
            .reconciler()
            .read(&QueryKey::trends(), || self.api.get("posts/trends/"))
            .await
    }

    /// 发帖：图片按给定顺序作为多个 `image` 字段上传
    pub async fn create_post(&self, request: CreatePostRequest) -> Result<Post> {
        request.validate()?;
        let body = validate_body(&request.body, self.config.max_post_length, "帖子内容不能为空")?;
        debug!("Creating post with {} attachments", request.attachments.len());

        let mut form = Form::new()
            .text("body", body)
            .text("is_private", if request.is_private { "true" } else { "false" });

        if !request.attachments.is_empty() {
            form = form.text("attachments_count", request.attachments.len().to_string());
            for image in request.attachments {
                let part = Part::bytes(image.bytes)
                    .file_name(image.file_name)
                    .mime_str(&image.mime_type)?;
                form = form.part("image", part);
            }
        }

        let created: Post = self.api.post_multipart("posts/create/", form).await?;
        info!("Created post: {}", created.id);

        self.engine.reconciler().settle(&[
            QueryKind::Posts.into(),
            QueryKind::UserPosts.into(),
            QueryKind::Trends.into(),
        ]);
        Ok(created)
    }

    /// 修改帖子可见性
    pub async fn update_visibility(&self, post_id: &str, is_private: bool) -> Result<Post> {
        let path = format!("posts/{}/update/", post_id);
        let request = UpdatePostRequest {
            is_private: Some(is_private),
        };

        let result = self.api.put(&path, &request).await;
        if result.is_ok() {
            self.engine.reconciler().settle(&[
                QueryKind::Posts.into(),
                QueryKey::post(post_id).into(),
                QueryKind::UserPosts.into(),
                QueryKind::SearchPostsPaginated.into(),
            ]);
        }
        result
    }

    pub async fn delete_post(&self, post_id: &str) -> Result<()> {
        let path = format!("posts/{}/delete/", post_id);
        self.api.delete(&path).await?;
        info!("Deleted post: {}", post_id);

        self.engine.cache().remove(&QueryKey::post(post_id));
        self.engine.reconciler().settle(&[
            QueryKind::Posts.into(),
            QueryKind::UserPosts.into(),
            QueryKind::Profile.into(),
        ]);
        Ok(())
    }

    pub async fn report_post(&self, post_id: &str, reason: &str) -> Result<ReportPostResponse> {
        let request = ReportPostRequest {
            reason: reason.trim().to_string(),
        };
        request.validate()?;

        let path = format!("posts/{}/report/", post_id);
        let response: ReportPostResponse = self.api.post(&path, &request).await?;
        self.engine.reconciler().notices().success(response.message.clone());
        self.engine
            .reconciler()
            .settle(&[QueryKind::Posts.into(), QueryKey::post(post_id).into()]);
        Ok(response)
    }

    /// 展示该帖子的所有缓存位置
    pub fn like_locations(&self, post_id: &str) -> Vec<Location<Post>> {
        let cache = self.engine.cache();
        let mut locations = vec![
            Location::of::<Vec<Post>>(QueryKey::posts()),
            Location::of::<PostDetail>(QueryKey::post(post_id)),
        ];
        locations.extend(
            cache
                .keys_matching(&QueryKind::SearchPostsPaginated.into())
                .into_iter()
                .map(Location::of::<SearchPostsPages>),
        );
        locations.extend(
            cache
                .keys_matching(&QueryKind::Search.into())
                .into_iter()
                .map(Location::of::<SearchResults>),
        );
        locations.extend(
            cache
                .keys_matching(&QueryKind::LikedPosts.into())
                .into_iter()
                .map(Location::of::<Vec<Post>>),
        );
        locations.extend(
            cache
                .keys_matching(&QueryKind::UserPosts.into())
                .into_iter()
                .map(Location::of::<ProfilePosts>),
        );
        locations
    }

    pub fn like_invalidations(post_id: &str) -> Vec<KeyFilter> {
        vec![
            QueryKind::Posts.into(),
            QueryKey::post(post_id).into(),
            QueryKind::SearchPostsPaginated.into(),
            QueryKind::Search.into(),
            QueryKind::LikedPosts.into(),
            QueryKind::UserPosts.into(),
        ]
    }

    /// 发送点赞请求，携带最终方向
    pub async fn send_like(&self, post_id: &str, is_liked: bool) -> Result<Post> {
        let path = format!("posts/{}/like/", post_id);
        debug!("Sending like for post {}: {}", post_id, is_liked);
        self.api.post(&path, &LikeRequest { is_liked }).await
    }

    /// 立即点赞/取消点赞（不经过防抖）
    pub async fn like_post(&self, post_id: &str) -> Result<Post> {
        let entity = EntityRef::Post(post_id.to_string());
        let locations = self.like_locations(post_id);
        let current = self
            .engine
            .read(&entity, &locations)
            .ok_or_else(|| ClientError::not_found("Post"))?;
        let previous = current.like_state();
        let next = previous.toggled();

        let pending = self
            .engine
            .begin(entity, locations, Self::like_invalidations(post_id), |post: &mut Post| {
                post.set_like_state(next)
            })
            .with_failure_notice(LIKE_FAILED_NOTICE);

        let outcome = self.send_like(post_id, next.liked).await;
        let (_, result) = self.engine.complete(
            pending,
            outcome,
            |cached: &mut Post, server: &Post| cached.set_like_state(server.like_state()),
            |cached: &mut Post| cached.set_like_state(previous),
        );
        result
    }
}
