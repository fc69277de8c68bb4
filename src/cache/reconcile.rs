use std::future::Future;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::cache::key::{KeyFilter, QueryKey};
use crate::cache::store::QueryCache;
use crate::error::Result;
use crate::services::notice::NoticeCenter;

/// 请求结束后的对账：失效相关缓存，下一次读取时从服务端重新获取
#[derive(Debug, Clone)]
pub struct Reconciler {
    cache: QueryCache,
    notices: NoticeCenter,
}

impl Reconciler {
    pub fn new(cache: QueryCache, notices: NoticeCenter) -> Self {
        Self { cache, notices }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn notices(&self) -> &NoticeCenter {
        &self.notices
    }

    /// 无论成功失败都调用：将匹配的键标记为过期
    pub fn settle(&self, filters: &[KeyFilter]) -> usize {
        let count: usize = filters.iter().map(|f| self.cache.invalidate(f)).sum();
        debug!("Settled {} filters, {} cache entries marked stale", filters.len(), count);
        count
    }

    /// 读路径：新鲜则命中缓存，否则重新获取；失败时提示用户并保留旧值
    pub async fn read<T, F, Fut>(&self, key: &QueryKey, fetcher: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.read_within(key, self.cache.stale_after(), fetcher).await
    }

    pub async fn read_within<T, F, Fut>(&self, key: &QueryKey, max_age: Duration, fetcher: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match self.cache.fetch_within(key, max_age, fetcher).await {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!("Refetch of {} failed: {}", key, e);
                self.notices.error(e.user_message());
                Err(e)
            }
        }
    }

    /// 强制重新获取
    pub async fn refetch<T, F, Fut>(&self, key: &QueryKey, fetcher: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.cache.invalidate(&KeyFilter::Exact(key.clone()));
        self.read(key, fetcher).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::key::QueryKind;
    use crate::error::ClientError;
    use crate::services::notice::NoticeLevel;
    use serde_json::json;

    #[tokio::test]
    async fn test_settle_marks_every_filter_stale() {
        let cache = QueryCache::default();
        cache.set(QueryKey::posts(), json!([]));
        cache.set(QueryKey::post("1"), json!({}));
        cache.set(QueryKey::profile(), json!({}));
        let reconciler = Reconciler::new(cache.clone(), NoticeCenter::new());

        let count = reconciler.settle(&[QueryKind::Posts.into(), QueryKey::post("1").into()]);
        assert_eq!(count, 2);
        assert!(cache.is_stale(&QueryKey::posts()));
        assert!(cache.is_stale(&QueryKey::post("1")));
        assert!(!cache.is_stale(&QueryKey::profile()));
    }

    #[tokio::test]
    async fn test_failed_refetch_notifies_and_keeps_value() {
        let cache = QueryCache::default();
        let notices = NoticeCenter::new();
        let mut rx = notices.subscribe();
        let reconciler = Reconciler::new(cache.clone(), notices);

        cache.set(QueryKey::posts(), json!(["old"]));
        let result: Result<Vec<String>> = reconciler
            .refetch(&QueryKey::posts(), || async {
                Err(ClientError::Api {
                    status: 500,
                    message: "服务器错误".to_string(),
                })
            })
            .await;

        assert!(result.is_err());
        assert_eq!(cache.get(&QueryKey::posts()), Some(json!(["old"])));
        let notice = rx.try_recv().unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert_eq!(notice.message, "服务器错误");
    }
}
