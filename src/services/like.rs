//! 防抖点赞按钮
//!
//! 一次连续点击（两次点击间隔小于防抖时间）只发出一个请求，请求携带
//! 最后一次点击后的方向。点击本身立即写入缓存。

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

use crate::{
    cache::{EntityRef, KeyFilter, Location, OptimisticEngine, Pending, Settlement},
    config::Config,
    error::{ClientError, Result},
    models::comment::Comment,
    models::like::{LikeState, Likeable},
    models::post::Post,
    services::comment::CommentService,
    services::post::{PostService, LIKE_FAILED_NOTICE},
    utils::Debouncer,
};

/// 点赞按钮所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikePhase {
    Idle,
    /// 已乐观写入，等待防抖计时结束
    OptimisticPending,
    /// 请求已发出
    Settling,
}

/// 可点赞的目标：在哪些缓存位置展示，以及如何发请求
#[async_trait]
pub trait LikeTarget: Send + Sync + 'static {
    type Entity: Likeable + Clone + Send + 'static;

    fn entity(&self) -> EntityRef;

    fn locations(&self) -> Vec<Location<Self::Entity>>;

    fn invalidations(&self) -> Vec<KeyFilter>;

    async fn send(&self, is_liked: bool) -> Result<Self::Entity>;
}

pub struct PostLike {
    posts: PostService,
    post_id: String,
}

#[async_trait]
impl LikeTarget for PostLike {
    type Entity = Post;

    fn entity(&self) -> EntityRef {
        EntityRef::Post(self.post_id.clone())
    }

    fn locations(&self) -> Vec<Location<Post>> {
        self.posts.like_locations(&self.post_id)
    }

    fn invalidations(&self) -> Vec<KeyFilter> {
        PostService::like_invalidations(&self.post_id)
    }

    async fn send(&self, is_liked: bool) -> Result<Post> {
        self.posts.send_like(&self.post_id, is_liked).await
    }
}

pub struct CommentLike {
    comments: CommentService,
    post_id: String,
    comment_id: String,
}

#[async_trait]
impl LikeTarget for CommentLike {
    type Entity = Comment;

    fn entity(&self) -> EntityRef {
        EntityRef::Comment {
            post_id: self.post_id.clone(),
            comment_id: self.comment_id.clone(),
        }
    }

    fn locations(&self) -> Vec<Location<Comment>> {
        self.comments.like_locations(&self.post_id)
    }

    fn invalidations(&self) -> Vec<KeyFilter> {
        CommentService::like_invalidations(&self.post_id)
    }

    async fn send(&self, is_liked: bool) -> Result<Comment> {
        self.comments.send_like(&self.post_id, &self.comment_id, is_liked).await
    }
}

struct ButtonState<E> {
    /// 当前这次连续点击的乐观写入
    burst: Option<Pending<E>>,
    local: Option<LikeState>,
    /// 这次连续点击开始前的状态，失败时退回
    origin: Option<LikeState>,
    in_flight: usize,
}

impl<E> ButtonState<E> {
    fn phase(&self) -> LikePhase {
        if self.burst.is_some() {
            LikePhase::OptimisticPending
        } else if self.in_flight > 0 {
            LikePhase::Settling
        } else {
            LikePhase::Idle
        }
    }
}

/// 单个实体的点赞按钮
pub struct LikeButton<T: LikeTarget> {
    target: Arc<T>,
    engine: OptimisticEngine,
    debouncer: Debouncer,
    state: Arc<Mutex<ButtonState<T::Entity>>>,
    phase: Arc<watch::Sender<LikePhase>>,
}

impl<T: LikeTarget> Clone for LikeButton<T> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            engine: self.engine.clone(),
            debouncer: self.debouncer.clone(),
            state: self.state.clone(),
            phase: self.phase.clone(),
        }
    }
}

impl<T: LikeTarget> LikeButton<T> {
    pub fn new(target: T, engine: OptimisticEngine, debounce: std::time::Duration) -> Self {
        let (phase, _) = watch::channel(LikePhase::Idle);
        Self {
            target: Arc::new(target),
            engine,
            debouncer: Debouncer::new(debounce),
            state: Arc::new(Mutex::new(ButtonState {
                burst: None,
                local: None,
                origin: None,
                in_flight: 0,
            })),
            phase: Arc::new(phase),
        }
    }

    pub fn phase(&self) -> LikePhase {
        *self.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LikePhase> {
        self.phase.subscribe()
    }

    fn publish(&self, phase: LikePhase) {
        self.phase.send_replace(phase);
    }

    /// 点击：本地切换并立即写入缓存，重新开始防抖计时
    pub fn click(&self) -> Result<LikeState> {
        let next = {
            let mut guard = self.state.lock();
            let state = &mut *guard;

            let current = match (&state.burst, state.local) {
                (Some(_), Some(local)) => local,
                _ => self
                    .engine
                    .read(&self.target.entity(), &self.target.locations())
                    .map(|entity| entity.like_state())
                    .ok_or_else(|| ClientError::not_found("Likeable entity"))?,
            };
            let next = current.toggled();
            let apply = |entity: &mut T::Entity| entity.set_like_state(next);

            match state.burst.as_mut() {
                Some(pending) => {
                    self.engine.reapply(pending, apply);
                }
                None => {
                    let pending = self
                        .engine
                        .begin(self.target.entity(), self.target.locations(), self.target.invalidations(), apply)
                        .with_failure_notice(LIKE_FAILED_NOTICE);
                    state.burst = Some(pending);
                    state.origin = Some(current);
                }
            }
            state.local = Some(next);
            self.publish(state.phase());
            next
        };

        debug!("Like click on {}: {:?}", self.target.entity(), next);
        let button = self.clone();
        self.debouncer.trigger(move || async move {
            button.fire().await;
        });
        Ok(next)
    }

    /// 计时结束：发出一个携带最终方向的请求
    async fn fire(&self) -> Option<Settlement> {
        let (pending, desired, origin) = {
            let mut state = self.state.lock();
            let pending = state.burst.take()?;
            let desired = state.local.map(|s| s.liked)?;
            let origin = state.origin.take()?;
            state.in_flight += 1;
            self.publish(state.phase());
            (pending, desired, origin)
        };

        let outcome = self.target.send(desired).await;
        let (settlement, _) = self.engine.complete(
            pending,
            outcome,
            |cached: &mut T::Entity, server: &T::Entity| cached.set_like_state(server.like_state()),
            |cached: &mut T::Entity| cached.set_like_state(origin),
        );
        debug!("Like on {} settled: {:?}", self.target.entity(), settlement);

        let mut state = self.state.lock();
        state.in_flight -= 1;
        if state.burst.is_none() && state.in_flight == 0 {
            state.local = None;
        }
        self.publish(state.phase());
        Some(settlement)
    }

    /// 等待回到空闲状态
    pub async fn settled(&self) {
        let mut rx = self.subscribe();
        while *rx.borrow_and_update() != LikePhase::Idle {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}

/// 按实体复用点赞按钮
#[derive(Clone)]
pub struct LikeService {
    posts: PostService,
    comments: CommentService,
    debounce: std::time::Duration,
    post_buttons: Arc<DashMap<String, LikeButton<PostLike>>>,
    comment_buttons: Arc<DashMap<(String, String), LikeButton<CommentLike>>>,
}

impl LikeService {
    pub async fn new(posts: PostService, comments: CommentService, config: &Config) -> Result<Self> {
        Ok(Self {
            posts,
            comments,
            debounce: config.like_debounce(),
            post_buttons: Arc::new(DashMap::new()),
            comment_buttons: Arc::new(DashMap::new()),
        })
    }

    pub fn post_button(&self, post_id: &str) -> LikeButton<PostLike> {
        self.post_buttons
            .entry(post_id.to_string())
            .or_insert_with(|| {
                LikeButton::new(
                    PostLike {
                        posts: self.posts.clone(),
                        post_id: post_id.to_string(),
                    },
                    self.posts.engine().clone(),
                    self.debounce,
                )
            })
            .clone()
    }

    pub fn comment_button(&self, post_id: &str, comment_id: &str) -> LikeButton<CommentLike> {
        self.comment_buttons
            .entry((post_id.to_string(), comment_id.to_string()))
            .or_insert_with(|| {
                LikeButton::new(
                    CommentLike {
                        comments: self.comments.clone(),
                        post_id: post_id.to_string(),
                        comment_id: comment_id.to_string(),
                    },
                    self.posts.engine().clone(),
                    self.debounce,
                )
            })
            .clone()
    }

    pub fn click_post(&self, post_id: &str) -> Result<LikeState> {
        self.post_button(post_id).click()
    }

    pub fn click_comment(&self, post_id: &str, comment_id: &str) -> Result<LikeState> {
        self.comment_button(post_id, comment_id).click()
    }

    pub fn button_count(&self) -> usize {
        self.post_buttons.len() + self.comment_buttons.len()
    }

    /// 丢弃全部按钮，尚未发出的点击不再发送
    pub fn reset(&self) {
        for button in self.post_buttons.iter() {
            button.debouncer.cancel();
        }
        for button in self.comment_buttons.iter() {
            button.debouncer.cancel();
        }
        self.post_buttons.clear();
        self.comment_buttons.clear();
        debug!("Like buttons reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{QueryCache, QueryKey, Reconciler};
    use crate::models::post::PostDetail;
    use crate::services::notice::{NoticeCenter, NoticeLevel};
    use std::time::Duration;
    use tokio::sync::Mutex as AsyncMutex;

    /// 记录请求并按脚本返回结果的测试目标
    struct ScriptedPost {
        id: String,
        requests: Arc<AsyncMutex<Vec<bool>>>,
        server_count: u32,
        fail: bool,
        latency: Duration,
    }

    #[async_trait]
    impl LikeTarget for ScriptedPost {
        type Entity = Post;

        fn entity(&self) -> EntityRef {
            EntityRef::Post(self.id.clone())
        }

        fn locations(&self) -> Vec<Location<Post>> {
            vec![
                Location::of::<Vec<Post>>(QueryKey::posts()),
                Location::of::<PostDetail>(QueryKey::post(&self.id)),
            ]
        }

        fn invalidations(&self) -> Vec<KeyFilter> {
            vec![QueryKey::post(&self.id).into()]
        }

        async fn send(&self, is_liked: bool) -> Result<Post> {
            self.requests.lock().await.push(is_liked);
            tokio::time::sleep(self.latency).await;
            if self.fail {
                return Err(ClientError::Api {
                    status: 500,
                    message: "服务器错误".to_string(),
                });
            }
            Ok(post(&self.id, self.server_count, is_liked))
        }
    }

    fn post(id: &str, likes: u32, liked: bool) -> Post {
        serde_json::from_value(serde_json::json!({
            "id": id, "body": "b", "likes_count": likes, "is_liked": liked,
            "created_by": {"id": "u1", "name": "A"},
            "created_at": "2024-05-01T08:00:00Z"
        }))
        .unwrap()
    }

    fn setup(fail: bool, server_count: u32) -> (LikeButton<ScriptedPost>, QueryCache, NoticeCenter, Arc<AsyncMutex<Vec<bool>>>) {
        let cache = QueryCache::default();
        let notices = NoticeCenter::new();
        let engine = OptimisticEngine::new(Reconciler::new(cache.clone(), notices.clone()));
        cache.set_as(QueryKey::post("1"), &PostDetail { post: post("1", 5, false) }).unwrap();

        let requests = Arc::new(AsyncMutex::new(Vec::new()));
        let target = ScriptedPost {
            id: "1".to_string(),
            requests: requests.clone(),
            server_count,
            fail,
            latency: Duration::from_millis(50),
        };
        (LikeButton::new(target, engine, Duration::from_millis(300)), cache, notices, requests)
    }

    fn cached_state(cache: &QueryCache) -> LikeState {
        let detail: PostDetail = cache.get_as(&QueryKey::post("1")).unwrap().unwrap();
        detail.post.like_state()
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_quick_clicks_send_one_request_with_final_direction() {
        let (button, cache, _, requests) = setup(false, 5);

        assert_eq!(button.click().unwrap(), LikeState::new(true, 6));
        assert_eq!(cached_state(&cache), LikeState::new(true, 6));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(button.click().unwrap(), LikeState::new(false, 5));
        assert_eq!(button.phase(), LikePhase::OptimisticPending);

        button.settled().await;
        assert_eq!(*requests.lock().await, vec![false]);
        assert_eq!(cached_state(&cache), LikeState::new(false, 5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_like_reverts_and_notifies() {
        let (button, cache, notices, requests) = setup(true, 0);
        let mut rx = notices.subscribe();

        assert_eq!(button.click().unwrap(), LikeState::new(true, 6));
        button.settled().await;

        assert_eq!(*requests.lock().await, vec![true]);
        assert_eq!(cached_state(&cache), LikeState::new(false, 5));
        assert!(cache.is_stale(&QueryKey::post("1")));
        let notice = rx.try_recv().unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert!(notice.message.starts_with(LIKE_FAILED_NOTICE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_while_settling_starts_new_burst() {
        let (button, cache, _, requests) = setup(false, 9);

        button.click().unwrap();
        tokio::time::sleep(Duration::from_millis(320)).await;
        assert_eq!(button.phase(), LikePhase::Settling);

        // 第一次请求尚未返回
        assert_eq!(button.click().unwrap(), LikeState::new(false, 5));
        button.settled().await;

        assert_eq!(*requests.lock().await, vec![true, false]);
        // 第一次的结果已过时，只采用第二次服务端返回的值
        assert_eq!(cached_state(&cache), LikeState::new(false, 9));
    }
}
