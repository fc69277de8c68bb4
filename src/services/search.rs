use tracing::debug;

use crate::{
    cache::{QueryKey, Reconciler},
    error::Result,
    models::search::*,
    services::api::ApiClient,
};

#[derive(Clone)]
pub struct SearchService {
    api: ApiClient,
    reconciler: Reconciler,
}

impl SearchService {
    pub async fn new(api: ApiClient, reconciler: Reconciler) -> Result<Self> {
        Ok(Self { api, reconciler })
    }

    /// 用户 + 帖子综合搜索
    pub async fn search(&self, query: &str) -> Result<SearchResults> {
        let request = SearchRequest {
            query: query.trim().to_string(),
        };
        self.reconciler
            .read(&QueryKey::search(&request.query), || self.api.post("search/", &request))
            .await
    }

    async fn fetch_page(&self, query: &str, page: u32) -> Result<SearchPostsPage> {
        debug!("Searching posts for '{}', page {}", query, page);
        let request = SearchPostsRequest {
            query: query.to_string(),
            page,
        };
        self.api.post("search/posts/", &request).await
    }

    /// 话题搜索的第一页；已缓存且新鲜时直接返回已加载的所有页
    pub async fn search_posts(&self, topic: &str) -> Result<SearchPostsPages> {
        let query = hashtag_query(topic);
        self.reconciler
            .read(&QueryKey::search_posts(&query), || async {
                self.fetch_page(&query, 1).await.map(|first| SearchPostsPages {
                    pages: vec![first],
                    page_params: vec![1],
                })
            })
            .await
    }

    /// 加载下一页并追加到缓存；没有下一页时原样返回
    pub async fn load_next_page(&self, topic: &str) -> Result<SearchPostsPages> {
        let query = hashtag_query(topic);
        let key = QueryKey::search_posts(&query);
        let mut pages = self.search_posts(topic).await?;

        let Some(next) = pages.next_page() else {
            return Ok(pages);
        };

        let page = self.fetch_page(&query, next).await?;
        pages.pages.push(page);
        pages.page_params.push(next);
        self.reconciler.cache().set_as(key, &pages)?;
        Ok(pages)
    }
}
