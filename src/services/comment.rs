use tracing::{debug, info};

use crate::{
    cache::{EntityRef, KeyFilter, Location, OptimisticEngine, QueryKey, QueryKind},
    config::Config,
    error::{ClientError, Result},
    models::comment::*,
    models::like::{LikeRequest, Likeable},
    models::post::{Post, PostDetail, ProfilePosts},
    models::search::SearchPostsPages,
    models::user::{AuthorSummary, Profile},
    services::api::ApiClient,
    services::post::LIKE_FAILED_NOTICE,
    utils::validation::validate_body,
};

pub const COMMENT_FAILED_NOTICE: &str = "评论失败";

#[derive(Clone)]
pub struct CommentService {
    api: ApiClient,
    engine: OptimisticEngine,
    config: Config,
}

impl CommentService {
    pub async fn new(api: ApiClient, engine: OptimisticEngine, config: Config) -> Result<Self> {
        Ok(Self { api, engine, config })
    }

    /// 评论数所在的缓存位置；只有详情视图带评论列表
    fn post_locations(&self, post_id: &str) -> Vec<Location<Post>> {
        let cache = self.engine.cache();
        let mut locations = vec![
            Location::of::<PostDetail>(QueryKey::post(post_id)),
            Location::of::<Vec<Post>>(QueryKey::posts()),
        ];
        locations.extend(
            cache
                .keys_matching(&QueryKind::UserPosts.into())
                .into_iter()
                .map(Location::of::<ProfilePosts>),
        );
        locations.extend(
            cache
                .keys_matching(&QueryKind::SearchPostsPaginated.into())
                .into_iter()
                .map(Location::of::<SearchPostsPages>),
        );
        locations
    }

    fn placeholder_author(&self, post: Option<&Post>) -> AuthorSummary {
        let profile: Option<Profile> = self.engine.cache().get_as(&QueryKey::profile()).ok().flatten();
        match (profile, post) {
            (Some(profile), _) => profile.summary(),
            (None, Some(post)) => post.created_by.summary(),
            (None, None) => AuthorSummary::default(),
        }
    }

    /// 发表评论
    ///
    /// 先插入一条"刚刚"的占位评论并把评论数 +1；成功后换成服务端返回的评论，
    /// 失败则只撤销这一条占位评论，同时进行中的其他评论不受影响。
    /// 最终以重新获取的详情为准。
    pub async fn create_comment(&self, post_id: &str, body: &str) -> Result<Comment> {
        let body = validate_body(body, self.config.max_comment_length, "评论内容不能为空")?;
        debug!("Creating comment for post: {}", post_id);

        let locations = self.post_locations(post_id);
        let cached_post = self.engine.read(&EntityRef::Post(post_id.to_string()), &locations);
        let placeholder = Comment::placeholder(&body, self.placeholder_author(cached_post.as_ref()));
        let placeholder_id = placeholder.id.clone();
        let entity = EntityRef::PostComments {
            post_id: post_id.to_string(),
            attempt: placeholder_id.clone(),
        };

        let invalidate: Vec<KeyFilter> = vec![QueryKey::post(post_id).into(), QueryKind::Posts.into()];
        let pending = self
            .engine
            .begin(entity, locations, invalidate, |post: &mut Post| {
                post.comments_count = post.comments_count.saturating_add(1);
                if let Some(comments) = post.comments.as_mut() {
                    comments.push(placeholder.clone());
                }
            })
            .with_failure_notice(COMMENT_FAILED_NOTICE);

        let path = format!("posts/{}/comment/", post_id);
        let outcome = self.api.post(&path, &CreateCommentRequest { body }).await;

        let (_, result) = self.engine.complete(
            pending,
            outcome,
            |post: &mut Post, created: &Comment| {
                if let Some(slot) = post
                    .comments
                    .as_mut()
                    .and_then(|comments| comments.iter_mut().find(|c| c.id == placeholder_id))
                {
                    *slot = created.clone();
                }
            },
            |post: &mut Post| remove_placeholder(post, &placeholder_id),
        );

        if let Ok(created) = &result {
            info!("Created comment {} on post {}", created.id, post_id);
        }
        result
    }

    pub fn like_locations(&self, post_id: &str) -> Vec<Location<Comment>> {
        vec![Location::of::<PostDetail>(QueryKey::post(post_id))]
    }

    pub fn like_invalidations(post_id: &str) -> Vec<KeyFilter> {
        vec![QueryKey::post(post_id).into()]
    }

    pub async fn send_like(&self, post_id: &str, comment_id: &str, is_liked: bool) -> Result<Comment> {
        let path = format!("posts/{}/comments/{}/like/", post_id, comment_id);
        debug!("Sending like for comment {}: {}", comment_id, is_liked);
        self.api.post(&path, &LikeRequest { is_liked }).await
    }

    /// 立即点赞/取消点赞评论（不经过防抖）
    pub async fn like_comment(&self, post_id: &str, comment_id: &str) -> Result<Comment> {
        let entity = EntityRef::Comment {
            post_id: post_id.to_string(),
            comment_id: comment_id.to_string(),
        };
        let locations = self.like_locations(post_id);
        let current = self
            .engine
            .read(&entity, &locations)
            .ok_or_else(|| ClientError::not_found("Comment"))?;
        let previous = current.like_state();
        let next = previous.toggled();

        let pending = self
            .engine
            .begin(entity, locations, Self::like_invalidations(post_id), |comment: &mut Comment| {
                comment.set_like_state(next)
            })
            .with_failure_notice(LIKE_FAILED_NOTICE);

        let outcome = self.send_like(post_id, comment_id, next.liked).await;
        let (_, result) = self.engine.complete(
            pending,
            outcome,
            |cached: &mut Comment, server: &Comment| cached.set_like_state(server.like_state()),
            |cached: &mut Comment| cached.set_like_state(previous),
        );
        result
    }
}

/// 撤销一条占位评论；列表视图没有评论，只回退评论数
fn remove_placeholder(post: &mut Post, placeholder_id: &str) {
    let removed = match post.comments.as_mut() {
        Some(comments) => {
            let before = comments.len();
            comments.retain(|c| c.id != placeholder_id);
            comments.len() != before
        }
        None => true,
    };
    if removed {
        post.comments_count = post.comments_count.saturating_sub(1);
    }
}
