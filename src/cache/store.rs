use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cache::key::{KeyFilter, QueryKey};
use crate::error::Result;

/// 缓存项
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub value: Value,
    pub updated_at: Instant,
    /// 被标记为过期后，下一次读取会重新请求服务端
    pub stale: bool,
}

impl CacheEntry {
    fn fresh(value: Value) -> Self {
        Self {
            value,
            updated_at: Instant::now(),
            stale: false,
        }
    }

    fn is_stale_within(&self, max_age: Duration) -> bool {
        self.stale || self.updated_at.elapsed() >= max_age
    }
}

/// 缓存变更事件，界面据此重新渲染
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    Updated(QueryKey),
    Invalidated(QueryKey),
    Removed(QueryKey),
    Cleared,
}

/// 乐观更新前捕获的缓存快照
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    entries: Vec<(QueryKey, Option<CacheEntry>)>,
}

impl Snapshot {
    pub fn keys(&self) -> impl Iterator<Item = &QueryKey> {
        self.entries.iter().map(|(key, _)| key)
    }

    /// 快照中某个键的原始值；None 表示捕获时该键不存在
    pub fn value(&self, key: &QueryKey) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, entry)| entry.as_ref().map(|e| &e.value))
    }

    pub fn captured(&self) -> usize {
        self.entries.iter().filter(|(_, e)| e.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.captured() == 0
    }
}

/// 键的写入时间戳：任何改动都会更新 touched，整体替换时同时更新 replaced
#[derive(Debug, Clone, Copy, Default)]
struct KeyStamp {
    touched: u64,
    replaced: u64,
}

/// 会话级的查询缓存
///
/// 以 `QueryKey` 为键保存服务端返回的 JSON。乐观更新同步写入，
/// 请求完成后异步写入；所有写入都会广播 `CacheEvent`。
#[derive(Debug, Clone)]
pub struct QueryCache {
    entries: Arc<DashMap<QueryKey, CacheEntry>>,
    stamps: Arc<DashMap<QueryKey, KeyStamp>>,
    clock: Arc<AtomicU64>,
    cleared_at: Arc<AtomicU64>,
    stale_after: Duration,
    events: broadcast::Sender<CacheEvent>,
}

impl QueryCache {
    /// 创建新的缓存实例
    pub fn new(stale_after: Duration) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            entries: Arc::new(DashMap::new()),
            stamps: Arc::new(DashMap::new()),
            clock: Arc::new(AtomicU64::new(0)),
            cleared_at: Arc::new(AtomicU64::new(0)),
            stale_after,
            events,
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn touch(&self, key: &QueryKey, replaced: bool) {
        let now = self.tick();
        let mut stamp = self.stamps.entry(key.clone()).or_default();
        stamp.touched = now;
        if replaced {
            stamp.replaced = now;
        }
    }

    /// 键最近一次被改动（写入、原地修改、失效、恢复、删除）的时间戳
    pub fn generation(&self, key: &QueryKey) -> u64 {
        let touched = self.stamps.get(key).map(|s| s.touched).unwrap_or(0);
        touched.max(self.cleared_at.load(Ordering::SeqCst))
    }

    /// 键最近一次被整体替换的时间戳
    pub fn replaced_at(&self, key: &QueryKey) -> u64 {
        let replaced = self.stamps.get(key).map(|s| s.replaced).unwrap_or(0);
        replaced.max(self.cleared_at.load(Ordering::SeqCst))
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: CacheEvent) {
        // 没有订阅者时发送失败，忽略即可
        let _ = self.events.send(event);
    }

    pub fn get(&self, key: &QueryKey) -> Option<Value> {
        self.entries.get(key).map(|e| e.value.clone())
    }

    pub fn entry(&self, key: &QueryKey) -> Option<CacheEntry> {
        self.entries.get(key).map(|e| e.clone())
    }

    pub fn get_as<T: DeserializeOwned>(&self, key: &QueryKey) -> Result<Option<T>> {
        match self.get(key) {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.entries.contains_key(key)
    }

    /// 设置缓存项，并标记为新鲜
    pub fn set(&self, key: QueryKey, value: Value) {
        debug!("Cache set: {}", key);
        self.entries.insert(key.clone(), CacheEntry::fresh(value));
        self.touch(&key, true);
        self.emit(CacheEvent::Updated(key));
    }

    pub fn set_as<T: Serialize>(&self, key: QueryKey, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.set(key, value);
        Ok(())
    }

    /// 原地修改已存在的缓存项；键不存在时直接跳过
    ///
    /// 闭包返回 false 表示没有修改，此时不写回。新鲜度保持不变。
    pub fn update_as<T, F>(&self, key: &QueryKey, f: F) -> Result<bool>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut T) -> bool,
    {
        let changed = match self.entries.get_mut(key) {
            Some(mut entry) => {
                let mut typed: T = serde_json::from_value(entry.value.clone())?;
                if f(&mut typed) {
                    entry.value = serde_json::to_value(&typed)?;
                    true
                } else {
                    false
                }
            }
            None => false,
        };

        if changed {
            debug!("Cache updated in place: {}", key);
            self.touch(key, false);
            self.emit(CacheEvent::Updated(key.clone()));
        }
        Ok(changed)
    }

    /// 直接修改原始 JSON；键不存在时跳过
    pub fn update_value<F>(&self, key: &QueryKey, f: F) -> Result<bool>
    where
        F: FnOnce(&mut Value) -> Result<bool>,
    {
        let changed = match self.entries.get_mut(key) {
            Some(mut entry) => f(&mut entry.value)?,
            None => false,
        };

        if changed {
            self.touch(key, false);
            self.emit(CacheEvent::Updated(key.clone()));
        }
        Ok(changed)
    }

    /// 将匹配的缓存项标记为过期，返回受影响的数量
    pub fn invalidate(&self, filter: &KeyFilter) -> usize {
        let mut invalidated = Vec::new();
        for mut item in self.entries.iter_mut() {
            if filter.matches(item.key()) {
                item.value_mut().stale = true;
                invalidated.push(item.key().clone());
            }
        }

        let count = invalidated.len();
        for key in invalidated {
            debug!("Cache invalidated: {}", key);
            self.touch(&key, false);
            self.emit(CacheEvent::Invalidated(key));
        }
        count
    }

    pub fn is_stale(&self, key: &QueryKey) -> bool {
        self.is_stale_within(key, self.stale_after)
    }

    /// 不存在的键视为过期
    pub fn is_stale_within(&self, key: &QueryKey, max_age: Duration) -> bool {
        self.entries
            .get(key)
            .map(|e| e.is_stale_within(max_age))
            .unwrap_or(true)
    }

    /// 删除缓存项
    pub fn remove(&self, key: &QueryKey) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.touch(key, true);
            self.emit(CacheEvent::Removed(key.clone()));
        }
        removed
    }

    /// 清空所有缓存
    pub fn clear(&self) {
        self.entries.clear();
        self.stamps.clear();
        let now = self.tick();
        self.cleared_at.store(now, Ordering::SeqCst);
        self.emit(CacheEvent::Cleared);
    }

    /// 获取缓存大小
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys_matching(&self, filter: &KeyFilter) -> Vec<QueryKey> {
        self.entries
            .iter()
            .filter(|item| filter.matches(item.key()))
            .map(|item| item.key().clone())
            .collect()
    }

    /// 清理长时间未更新的缓存项
    pub fn evict_older_than(&self, max_idle: Duration) -> usize {
        let expired: Vec<QueryKey> = self
            .entries
            .iter()
            .filter(|item| item.updated_at.elapsed() >= max_idle)
            .map(|item| item.key().clone())
            .collect();
        expired.iter().filter(|key| self.remove(key)).count()
    }

    /// 捕获若干键当前的完整缓存项
    pub fn snapshot<'a, I>(&self, keys: I) -> Snapshot
    where
        I: IntoIterator<Item = &'a QueryKey>,
    {
        let entries = keys
            .into_iter()
            .map(|key| (key.clone(), self.entry(key)))
            .collect();
        Snapshot { entries }
    }

    /// 将快照原样写回；捕获时不存在的键保持不动
    pub fn restore(&self, snapshot: Snapshot) -> usize {
        let mut restored = 0;
        for (key, entry) in snapshot.entries {
            if let Some(entry) = entry {
                self.put_back(key, entry);
                restored += 1;
            }
        }
        restored
    }

    /// 只恢复快照中的一个键
    pub fn restore_key(&self, snapshot: &Snapshot, key: &QueryKey) -> bool {
        let entry = snapshot
            .entries
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, entry)| entry.clone());
        match entry {
            Some(entry) => {
                self.put_back(key.clone(), entry);
                true
            }
            None => false,
        }
    }

    fn put_back(&self, key: QueryKey, entry: CacheEntry) {
        self.entries.insert(key.clone(), entry);
        self.touch(&key, true);
        self.emit(CacheEvent::Updated(key));
    }

    /// 读取缓存，过期或缺失时调用 fetcher 并写入结果
    ///
    /// fetcher 失败时保留原有缓存值。
    pub async fn fetch<T, F, Fut>(&self, key: &QueryKey, fetcher: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.fetch_within(key, self.stale_after, fetcher).await
    }

    pub async fn fetch_within<T, F, Fut>(&self, key: &QueryKey, max_age: Duration, fetcher: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.is_stale_within(key, max_age) {
            match self.get_as::<T>(key) {
                Ok(Some(value)) => {
                    debug!("Cache hit: {}", key);
                    return Ok(value);
                }
                Ok(None) => {}
                Err(e) => warn!("Cached value for {} has unexpected shape: {}", key, e),
            }
        }

        debug!("Cache miss, fetching: {}", key);
        let generation = self.generation(key);
        let value = fetcher().await?;

        // 请求期间该键被改动过（乐观写入、失效、恢复），这次结果已经过时
        if self.generation(key) == generation {
            self.set_as(key.clone(), &value)?;
        } else {
            debug!("Dropping fetch result for {}: key changed while in flight", key);
        }
        Ok(value)
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::key::QueryKind;
    use crate::error::ClientError;
    use serde_json::json;

    #[tokio::test]
    async fn test_cache_basic_operations() {
        let cache = QueryCache::new(Duration::from_secs(60));

        // 测试设置和获取
        cache.set(QueryKey::post("1"), json!({"post": {"id": "1"}}));
        assert_eq!(cache.get(&QueryKey::post("1")), Some(json!({"post": {"id": "1"}})));

        // 测试不存在的键
        assert_eq!(cache.get(&QueryKey::post("2")), None);
        assert!(cache.is_stale(&QueryKey::post("2")));

        // 测试删除
        assert!(cache.remove(&QueryKey::post("1")));
        assert_eq!(cache.get(&QueryKey::post("1")), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_expiration() {
        let cache = QueryCache::new(Duration::from_millis(100));

        cache.set(QueryKey::posts(), json!([]));
        assert!(!cache.is_stale(&QueryKey::posts()));

        tokio::time::advance(Duration::from_millis(150)).await;
        assert!(cache.is_stale(&QueryKey::posts()));
        // 过期不等于删除
        assert_eq!(cache.get(&QueryKey::posts()), Some(json!([])));
    }

    #[tokio::test]
    async fn test_update_skips_absent_keys() {
        let cache = QueryCache::default();
        let changed = cache
            .update_as::<Vec<u32>, _>(&QueryKey::posts(), |v| {
                v.push(1);
                true
            })
            .unwrap();
        assert!(!changed);
        assert!(!cache.contains(&QueryKey::posts()));
    }

    #[tokio::test]
    async fn test_invalidate_by_kind() {
        let cache = QueryCache::default();
        let mut events = cache.subscribe();
        cache.set(QueryKey::post("1"), json!(1));
        cache.set(QueryKey::post("2"), json!(2));
        cache.set(QueryKey::posts(), json!([]));

        let count = cache.invalidate(&KeyFilter::Kind(QueryKind::Post));
        assert_eq!(count, 2);
        assert!(cache.is_stale(&QueryKey::post("1")));
        assert!(cache.is_stale(&QueryKey::post("2")));
        assert!(!cache.is_stale(&QueryKey::posts()));

        let mut invalidated = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, CacheEvent::Invalidated(_)) {
                invalidated += 1;
            }
        }
        assert_eq!(invalidated, 2);
    }

    #[tokio::test]
    async fn test_snapshot_restore_is_verbatim() {
        let cache = QueryCache::default();
        let key = QueryKey::post("1");
        cache.set(key.clone(), json!({"post": {"id": "1", "likes_count": 5}}));
        let before = cache.entry(&key).unwrap();

        let snapshot = cache.snapshot([&key, &QueryKey::posts()]);
        assert_eq!(snapshot.captured(), 1);

        cache
            .update_value(&key, |v| {
                v["post"]["likes_count"] = json!(6);
                Ok(true)
            })
            .unwrap();
        assert_ne!(cache.entry(&key).unwrap(), before);

        assert_eq!(cache.restore(snapshot.clone()), 1);
        assert_eq!(cache.entry(&key).unwrap(), before);
        assert!(!cache.contains(&QueryKey::posts()));

        // 重复恢复结果不变
        cache.restore(snapshot);
        assert_eq!(
            serde_json::to_vec(&cache.get(&key).unwrap()).unwrap(),
            serde_json::to_vec(&before.value).unwrap()
        );
    }

    #[tokio::test]
    async fn test_fetch_keeps_previous_value_on_failure() {
        let cache = QueryCache::new(Duration::from_secs(60));
        let key = QueryKey::notifications();

        let first: Vec<u32> = cache.fetch(&key, || async { Ok(vec![1, 2]) }).await.unwrap();
        assert_eq!(first, vec![1, 2]);

        // 新鲜时直接命中缓存
        let hit: Vec<u32> = cache
            .fetch(&key, || async { Err(ClientError::internal("must not be called")) })
            .await
            .unwrap();
        assert_eq!(hit, vec![1, 2]);

        cache.invalidate(&KeyFilter::Exact(key.clone()));
        let failed: Result<Vec<u32>> = cache
            .fetch(&key, || async { Err(ClientError::internal("offline")) })
            .await;
        assert!(failed.is_err());
        assert_eq!(cache.get_as::<Vec<u32>>(&key).unwrap(), Some(vec![1, 2]));
    }

    #[tokio::test]
    async fn test_fetch_result_dropped_when_key_changes_in_flight() {
        let cache = QueryCache::default();
        let key = QueryKey::posts();
        cache.set(key.clone(), json!([1]));
        cache.invalidate(&KeyFilter::Exact(key.clone()));

        // 请求进行中缓存被乐观写入并失效
        let writer = cache.clone();
        let changed = key.clone();
        let fetched: Vec<u32> = cache
            .fetch(&key, || async move {
                writer
                    .update_value(&changed, |v| {
                        *v = json!([2]);
                        Ok(true)
                    })
                    .unwrap();
                writer.invalidate(&KeyFilter::Exact(changed.clone()));
                Ok(vec![1])
            })
            .await
            .unwrap();

        assert_eq!(fetched, vec![1]);
        assert_eq!(cache.get(&key), Some(json!([2])));
        assert!(cache.is_stale(&key));
    }

    #[tokio::test]
    async fn test_generation_tracks_in_place_and_replacing_writes() {
        let cache = QueryCache::default();
        let key = QueryKey::post("1");
        assert_eq!(cache.generation(&key), 0);

        cache.set(key.clone(), json!({"n": 1}));
        let after_set = cache.generation(&key);
        assert_eq!(cache.replaced_at(&key), after_set);

        let snapshot = cache.snapshot([&key]);
        cache
            .update_value(&key, |v| {
                v["n"] = json!(2);
                Ok(true)
            })
            .unwrap();
        assert!(cache.generation(&key) > after_set);
        assert_eq!(cache.replaced_at(&key), after_set);

        assert!(cache.restore_key(&snapshot, &key));
        assert_eq!(cache.get(&key), Some(json!({"n": 1})));
        assert_eq!(cache.replaced_at(&key), cache.generation(&key));

        cache.clear();
        assert!(cache.generation(&key) > after_set);
    }
}
