//! 乐观更新
//!
//! 请求发出前先把预期结果写进所有展示该实体的缓存位置，请求结束后
//! 提交服务端结果或恢复快照，最后失效相关键。每次写入都会为实体
//! 取一个新的版本号，版本已落后的请求结果直接丢弃。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use crate::cache::key::{EntityRef, KeyFilter, QueryKey};
use crate::cache::reconcile::Reconciler;
use crate::cache::store::{QueryCache, Snapshot};
use crate::error::Result;
use crate::models::comment::Comment;
use crate::models::post::{Post, PostDetail, ProfilePosts};
use crate::models::search::{SearchPostsPages, SearchResults};

/// 缓存中保存的视图类型，能按ID找到其中的实体
pub trait ContainsEntity<E> {
    /// 对ID匹配的实体调用 f，返回是否找到
    fn visit_entity(&mut self, id: &str, f: &mut dyn FnMut(&mut E)) -> bool;
}

impl ContainsEntity<Post> for Vec<Post> {
    fn visit_entity(&mut self, id: &str, f: &mut dyn FnMut(&mut Post)) -> bool {
        let mut found = false;
        for post in self.iter_mut().filter(|p| p.id == id) {
            f(post);
            found = true;
        }
        found
    }
}

impl ContainsEntity<Post> for PostDetail {
    fn visit_entity(&mut self, id: &str, f: &mut dyn FnMut(&mut Post)) -> bool {
        if self.post.id == id {
            f(&mut self.post);
            true
        } else {
            false
        }
    }
}

impl ContainsEntity<Comment> for PostDetail {
    fn visit_entity(&mut self, id: &str, f: &mut dyn FnMut(&mut Comment)) -> bool {
        let mut found = false;
        if let Some(comments) = self.post.comments.as_mut() {
            for comment in comments.iter_mut().filter(|c| c.id == id) {
                f(comment);
                found = true;
            }
        }
        found
    }
}

impl ContainsEntity<Post> for ProfilePosts {
    fn visit_entity(&mut self, id: &str, f: &mut dyn FnMut(&mut Post)) -> bool {
        self.posts.visit_entity(id, f)
    }
}

impl ContainsEntity<Post> for SearchPostsPages {
    fn visit_entity(&mut self, id: &str, f: &mut dyn FnMut(&mut Post)) -> bool {
        let mut found = false;
        for page in self.pages.iter_mut() {
            found |= page.results.visit_entity(id, f);
        }
        found
    }
}

impl ContainsEntity<Post> for SearchResults {
    fn visit_entity(&mut self, id: &str, f: &mut dyn FnMut(&mut Post)) -> bool {
        self.posts.visit_entity(id, f)
    }
}

type VisitFn<E> = fn(&QueryCache, &QueryKey, &str, &mut dyn FnMut(&mut E)) -> Result<bool>;
type ReadFn<E> = fn(&QueryCache, &QueryKey, &str) -> Option<E>;

/// 一个缓存位置：键 + 该键下保存的视图类型
pub struct Location<E> {
    key: QueryKey,
    visit: VisitFn<E>,
    read: ReadFn<E>,
}

impl<E> Clone for Location<E> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            visit: self.visit,
            read: self.read,
        }
    }
}

impl<E> std::fmt::Debug for Location<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Location").field("key", &self.key).finish()
    }
}

impl<E: Clone> Location<E> {
    pub fn of<C>(key: QueryKey) -> Self
    where
        C: ContainsEntity<E> + Serialize + DeserializeOwned,
    {
        Self {
            key,
            visit: visit_container::<C, E>,
            read: read_container::<C, E>,
        }
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

fn visit_container<C, E>(cache: &QueryCache, key: &QueryKey, id: &str, f: &mut dyn FnMut(&mut E)) -> Result<bool>
where
    C: ContainsEntity<E> + Serialize + DeserializeOwned,
{
    cache.update_as::<C, _>(key, |container| container.visit_entity(id, f))
}

fn read_container<C, E>(cache: &QueryCache, key: &QueryKey, id: &str) -> Option<E>
where
    C: ContainsEntity<E> + Serialize + DeserializeOwned,
    E: Clone,
{
    let mut container: C = cache.get_as(key).ok()??;
    let mut found = None;
    container.visit_entity(id, &mut |entity| {
        if found.is_none() {
            found = Some(entity.clone());
        }
    });
    found
}

/// 每个实体最新一次乐观写入的版本号
#[derive(Debug, Clone, Default)]
pub struct EntityVersions {
    latest: Arc<DashMap<EntityRef, u64>>,
    counter: Arc<AtomicU64>,
}

impl EntityVersions {
    pub fn next(&self, entity: &EntityRef) -> u64 {
        let version = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.latest.insert(entity.clone(), version);
        version
    }

    pub fn is_current(&self, entity: &EntityRef, version: u64) -> bool {
        self.latest.get(entity).map(|v| *v == version).unwrap_or(false)
    }

    /// 结算完成后释放；之后有新的写入时不会误删
    pub fn release(&self, entity: &EntityRef, version: u64) {
        self.latest.remove_if(entity, |_, latest| *latest == version);
    }

    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }

    /// 退出登录时清空，之前发出的请求全部视为过时
    pub fn clear(&self) {
        self.latest.clear();
    }
}

/// 已应用、尚未结算的乐观写入
#[derive(Debug)]
pub struct Pending<E> {
    entity: EntityRef,
    version: u64,
    snapshot: Snapshot,
    locations: Vec<Location<E>>,
    /// 本次写入之后各位置的缓存时间戳
    marks: Vec<u64>,
    invalidate: Vec<KeyFilter>,
    failure_notice: String,
}

impl<E> Pending<E> {
    pub fn entity(&self) -> &EntityRef {
        &self.entity
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// 失败时提示的前缀，例如 "点赞失败"
    pub fn with_failure_notice(mut self, notice: impl Into<String>) -> Self {
        self.failure_notice = notice.into();
        self
    }
}

/// 结算结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// 服务端结果已写入缓存
    Committed,
    /// 快照已恢复
    RolledBack,
    /// 之后又有新的乐观写入，本次结果被丢弃
    Superseded,
}

/// 快照 → 乐观写入 → 提交/恢复 → 失效 的通用流程
#[derive(Debug, Clone)]
pub struct OptimisticEngine {
    reconciler: Reconciler,
    versions: EntityVersions,
}

impl OptimisticEngine {
    pub fn new(reconciler: Reconciler) -> Self {
        Self {
            reconciler,
            versions: EntityVersions::default(),
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn cache(&self) -> &QueryCache {
        self.reconciler.cache()
    }

    pub fn versions(&self) -> &EntityVersions {
        &self.versions
    }

    /// 第一个持有该实体的位置中的当前值
    pub fn read<E>(&self, entity: &EntityRef, locations: &[Location<E>]) -> Option<E> {
        locations
            .iter()
            .find_map(|loc| (loc.read)(self.cache(), &loc.key, entity.target_id()))
    }

    /// 捕获快照并把 mutate 应用到所有位置；不存在的位置静默跳过
    pub fn begin<E, F>(
        &self,
        entity: EntityRef,
        locations: Vec<Location<E>>,
        invalidate: Vec<KeyFilter>,
        mutate: F,
    ) -> Pending<E>
    where
        F: FnMut(&mut E),
    {
        let snapshot = self.cache().snapshot(locations.iter().map(|l| &l.key));
        let version = self.versions.next(&entity);
        let applied = self.apply(&entity, &locations, mutate);
        let marks = self.marks(&locations);
        debug!(
            "Optimistic update on {} (v{}): {} of {} locations",
            entity,
            version,
            applied,
            locations.len()
        );

        Pending {
            entity,
            version,
            snapshot,
            locations,
            marks,
            invalidate,
            failure_notice: String::new(),
        }
    }

    fn marks<E>(&self, locations: &[Location<E>]) -> Vec<u64> {
        locations.iter().map(|loc| self.cache().generation(&loc.key)).collect()
    }

    /// 在同一次交互中再次写入，不重新捕获快照
    pub fn reapply<E, F>(&self, pending: &mut Pending<E>, mutate: F) -> usize
    where
        F: FnMut(&mut E),
    {
        pending.version = self.versions.next(&pending.entity);
        let applied = self.apply(&pending.entity, &pending.locations, mutate);
        pending.marks = self.marks(&pending.locations);
        debug!("Optimistic re-apply on {} (v{})", pending.entity, pending.version);
        applied
    }

    fn apply<E, F>(&self, entity: &EntityRef, locations: &[Location<E>], mut mutate: F) -> usize
    where
        F: FnMut(&mut E),
    {
        let mut applied = 0;
        for loc in locations {
            match (loc.visit)(self.cache(), &loc.key, entity.target_id(), &mut mutate) {
                Ok(true) => applied += 1,
                Ok(false) => {}
                Err(e) => warn!("Skipping optimistic write to {}: {}", loc.key, e),
            }
        }
        applied
    }

    /// 结算：成功时用 confirm 写入服务端结果，失败时回滚并提示。
    /// 版本已落后时两者都不做。最后总是失效相关键。
    ///
    /// 回滚按位置进行：写入后没有被改动过的位置原样恢复快照；被其他乐观写入
    /// 或失效改动过的位置用 revert 撤销本次的改动；已被整体替换的位置保持不动。
    pub fn complete<E, S, F, R>(
        &self,
        pending: Pending<E>,
        outcome: Result<S>,
        mut confirm: F,
        mut revert: R,
    ) -> (Settlement, Result<S>)
    where
        F: FnMut(&mut E, &S),
        R: FnMut(&mut E),
    {
        let current = self.versions.is_current(&pending.entity, pending.version);

        let settlement = match &outcome {
            Ok(server) if current => {
                self.apply(&pending.entity, &pending.locations, |cached| confirm(cached, server));
                Settlement::Committed
            }
            Err(e) if current => {
                let (restored, reverted) = self.roll_back(&pending, &mut revert);
                info!(
                    "Rolled back optimistic update on {} (restored {}, reverted {}): {}",
                    pending.entity, restored, reverted, e
                );
                Settlement::RolledBack
            }
            _ => {
                debug!(
                    "Discarding stale completion for {} (v{})",
                    pending.entity, pending.version
                );
                Settlement::Superseded
            }
        };

        if current {
            self.versions.release(&pending.entity, pending.version);
        }

        if let (Settlement::RolledBack, Err(e)) = (settlement, &outcome) {
            let message = if pending.failure_notice.is_empty() {
                e.user_message()
            } else {
                format!("{}: {}", pending.failure_notice, e.user_message())
            };
            self.reconciler.notices().error(message);
        }

        self.reconciler.settle(&pending.invalidate);
        (settlement, outcome)
    }

    fn roll_back<E, R>(&self, pending: &Pending<E>, revert: &mut R) -> (usize, usize)
    where
        R: FnMut(&mut E),
    {
        let cache = self.cache();
        let (mut restored, mut reverted) = (0, 0);
        for (loc, mark) in pending.locations.iter().zip(pending.marks.iter().copied()) {
            if cache.generation(&loc.key) == mark {
                if cache.restore_key(&pending.snapshot, &loc.key) {
                    restored += 1;
                }
            } else if cache.replaced_at(&loc.key) > mark {
                debug!("{} was replaced after the optimistic write, leaving it", loc.key);
            } else {
                match (loc.visit)(cache, &loc.key, pending.entity.target_id(), revert) {
                    Ok(true) => reverted += 1,
                    Ok(false) => {}
                    Err(e) => warn!("Failed to revert {}: {}", loc.key, e),
                }
            }
        }
        (restored, reverted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::key::QueryKind;
    use crate::error::ClientError;
    use crate::models::like::{LikeState, Likeable};
    use crate::services::notice::NoticeCenter;
    use serde_json::json;

    fn post_json(id: &str, likes: u32, liked: bool) -> serde_json::Value {
        json!({
            "id": id,
            "body": "hello #rust",
            "likes_count": likes,
            "comments_count": 2,
            "is_liked": liked,
            "created_by": {"id": "u1", "name": "Alice"},
            "created_at": "2024-05-01T08:00:00Z",
            "attachments": []
        })
    }

    fn engine() -> OptimisticEngine {
        OptimisticEngine::new(Reconciler::new(QueryCache::default(), NoticeCenter::new()))
    }

    fn post_locations(id: &str) -> Vec<Location<Post>> {
        vec![
            Location::of::<Vec<Post>>(QueryKey::posts()),
            Location::of::<PostDetail>(QueryKey::post(id)),
            Location::of::<SearchPostsPages>(QueryKey::search_posts("")),
        ]
    }

    #[tokio::test]
    async fn test_mutates_every_location_and_skips_absent() {
        let engine = engine();
        engine.cache().set(QueryKey::posts(), json!([post_json("1", 5, false), post_json("2", 1, false)]));
        engine.cache().set(QueryKey::post("1"), json!({"post": post_json("1", 5, false)}));

        let next = LikeState::new(true, 6);
        let pending = engine.begin(
            EntityRef::Post("1".to_string()),
            post_locations("1"),
            vec![QueryKind::Posts.into()],
            |post: &mut Post| post.set_like_state(next),
        );
        assert_eq!(pending.snapshot().captured(), 2);

        let list: Vec<Post> = engine.cache().get_as(&QueryKey::posts()).unwrap().unwrap();
        assert_eq!(list[0].like_state(), next);
        assert_eq!(list[1].like_state(), LikeState::new(false, 1));
        let detail: PostDetail = engine.cache().get_as(&QueryKey::post("1")).unwrap().unwrap();
        assert_eq!(detail.post.like_state(), next);
        assert!(!engine.cache().contains(&QueryKey::search_posts("")));
    }

    #[tokio::test]
    async fn test_failure_restores_snapshot_byte_for_byte() {
        let engine = engine();
        engine.cache().set(QueryKey::post("1"), json!({"post": post_json("1", 5, false)}));
        let before = serde_json::to_vec(&engine.cache().get(&QueryKey::post("1")).unwrap()).unwrap();

        let pending = engine
            .begin(
                EntityRef::Post("1".to_string()),
                post_locations("1"),
                vec![QueryKey::post("1").into()],
                |post: &mut Post| post.set_like_state(LikeState::new(true, 6)),
            )
            .with_failure_notice("点赞失败");

        let (settlement, result) = engine.complete::<Post, Post, _, _>(
            pending,
            Err(ClientError::internal("boom")),
            |_, _| {},
            |post: &mut Post| post.set_like_state(LikeState::new(false, 5)),
        );
        assert_eq!(settlement, Settlement::RolledBack);
        assert!(result.is_err());

        let after = serde_json::to_vec(&engine.cache().get(&QueryKey::post("1")).unwrap()).unwrap();
        assert_eq!(before, after);
        assert!(engine.cache().is_stale(&QueryKey::post("1")));
    }

    #[tokio::test]
    async fn test_stale_completion_is_discarded() {
        let engine = engine();
        engine.cache().set(QueryKey::post("1"), json!({"post": post_json("1", 5, false)}));
        let entity = EntityRef::Post("1".to_string());

        let first = engine.begin(entity.clone(), post_locations("1"), vec![], |p: &mut Post| {
            p.set_like_state(LikeState::new(true, 6))
        });
        // 第二次快照里是第一次的乐观值
        let second = engine.begin(entity.clone(), post_locations("1"), vec![], |p: &mut Post| {
            p.set_like_state(LikeState::new(false, 5))
        });
        let detail: PostDetail = serde_json::from_value(second.snapshot().value(&QueryKey::post("1")).unwrap().clone()).unwrap();
        assert_eq!(detail.post.like_state(), LikeState::new(true, 6));

        // 第一次请求失败但已被第二次取代：不恢复
        let (settlement, _) =
            engine.complete::<Post, Post, _, _>(first, Err(ClientError::internal("late")), |_, _| {}, |_| {});
        assert_eq!(settlement, Settlement::Superseded);
        let current: PostDetail = engine.cache().get_as(&QueryKey::post("1")).unwrap().unwrap();
        assert_eq!(current.post.like_state(), LikeState::new(false, 5));

        // 第二次成功：写入服务端的值
        let server: Post = serde_json::from_value(post_json("1", 7, false)).unwrap();
        let (settlement, _) = engine.complete(
            second,
            Ok(server),
            |cached: &mut Post, server: &Post| cached.set_like_state(server.like_state()),
            |_: &mut Post| {},
        );
        assert_eq!(settlement, Settlement::Committed);
        let current: PostDetail = engine.cache().get_as(&QueryKey::post("1")).unwrap().unwrap();
        assert_eq!(current.post.like_state(), LikeState::new(false, 7));
        assert!(engine.versions().is_empty());
    }

    #[tokio::test]
    async fn test_overlapping_independent_writes_revert_only_their_own_change() {
        let engine = engine();
        let mut notices = engine.reconciler().notices().subscribe();
        engine.cache().set(QueryKey::post("1"), json!({"post": post_json("1", 5, false)}));

        let attempt = |id: &str| EntityRef::PostComments {
            post_id: "1".to_string(),
            attempt: id.to_string(),
        };
        let first = engine
            .begin(attempt("a"), post_locations("1"), vec![], |p: &mut Post| p.comments_count += 1)
            .with_failure_notice("评论失败");
        let second = engine.begin(attempt("b"), post_locations("1"), vec![], |p: &mut Post| {
            p.comments_count += 1;
            p.body.push_str(" +b");
        });

        // 第一次失败时第二次仍在进行：不能恢复整个快照
        let (settlement, _) = engine.complete::<Post, Post, _, _>(
            first,
            Err(ClientError::Api {
                status: 500,
                message: "服务器繁忙".to_string(),
            }),
            |_, _| {},
            |p: &mut Post| p.comments_count -= 1,
        );
        assert_eq!(settlement, Settlement::RolledBack);
        let detail: PostDetail = engine.cache().get_as(&QueryKey::post("1")).unwrap().unwrap();
        assert_eq!(detail.post.comments_count, 3);
        assert!(detail.post.body.ends_with(" +b"));
        assert_eq!(notices.try_recv().unwrap().message, "评论失败: 服务器繁忙");

        let server: Post = serde_json::from_value(post_json("1", 5, false)).unwrap();
        let (settlement, _) = engine.complete(second, Ok(server), |_: &mut Post, _: &Post| {}, |_: &mut Post| {});
        assert_eq!(settlement, Settlement::Committed);
        let detail: PostDetail = engine.cache().get_as(&QueryKey::post("1")).unwrap().unwrap();
        assert_eq!(detail.post.comments_count, 3);
    }

    #[tokio::test]
    async fn test_replaced_location_is_left_alone_on_failure() {
        let engine = engine();
        engine.cache().set(QueryKey::post("1"), json!({"post": post_json("1", 5, false)}));

        let pending = engine.begin(
            EntityRef::Post("1".to_string()),
            post_locations("1"),
            vec![],
            |p: &mut Post| p.set_like_state(LikeState::new(true, 6)),
        );
        // 请求期间详情被重新获取
        engine.cache().set(QueryKey::post("1"), json!({"post": post_json("1", 9, false)}));

        engine.complete::<Post, Post, _, _>(
            pending,
            Err(ClientError::internal("boom")),
            |_, _| {},
            |p: &mut Post| p.set_like_state(LikeState::new(false, 5)),
        );
        let detail: PostDetail = engine.cache().get_as(&QueryKey::post("1")).unwrap().unwrap();
        assert_eq!(detail.post.like_state(), LikeState::new(false, 9));
    }

    #[tokio::test]
    async fn test_read_finds_first_holding_location() {
        let engine = engine();
        engine.cache().set(QueryKey::posts(), json!([post_json("9", 3, true)]));
        let found = engine.read(&EntityRef::Post("9".to_string()), &post_locations("9"));
        assert_eq!(found.map(|p| p.like_state()), Some(LikeState::new(true, 3)));
        assert!(engine.read(&EntityRef::Post("10".to_string()), &post_locations("10")).is_none());
    }
}
