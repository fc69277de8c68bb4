use serde::{Deserialize, Serialize};

use crate::models::post::Post;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchUser {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub friends_count: u32,
    #[serde(default)]
    pub posts_count: u32,
    #[serde(default)]
    pub get_avatar: String,
    #[serde(default)]
    pub bio: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub users: Vec<SearchUser>,
    pub posts: Vec<Post>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchPostsRequest {
    pub query: String,
    pub page: u32,
}

/// `POST /search/posts/` 的一页结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPostsPage {
    #[serde(default)]
    pub count: u32,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<Post>,
    #[serde(default)]
    pub total_count: u32,
}

/// 已加载的分页搜索结果（对应一个搜索词）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchPostsPages {
    pub pages: Vec<SearchPostsPage>,
    pub page_params: Vec<u32>,
}

impl SearchPostsPages {
    /// 下一页页码：最后一页有 next 时为已加载页数 + 1
    pub fn next_page(&self) -> Option<u32> {
        match self.pages.last() {
            None => Some(1),
            Some(last) if last.next.is_some() => Some(self.pages.len() as u32 + 1),
            Some(_) => None,
        }
    }

    pub fn has_next_page(&self) -> bool {
        self.next_page().is_some()
    }

    pub fn posts(&self) -> impl Iterator<Item = &Post> {
        self.pages.iter().flat_map(|page| page.results.iter())
    }

    pub fn total_count(&self) -> u32 {
        self.pages.first().map(|p| p.total_count).unwrap_or(0)
    }
}

/// 话题搜索词统一带 `#` 前缀，空词保持为空
pub fn hashtag_query(query: &str) -> String {
    let trimmed = query.trim().trim_start_matches('#');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("#{}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(next: Option<&str>) -> SearchPostsPage {
        SearchPostsPage {
            count: 0,
            next: next.map(str::to_string),
            previous: None,
            results: Vec::new(),
            total_count: 42,
        }
    }

    #[test]
    fn test_next_page_param() {
        let mut pages = SearchPostsPages::default();
        assert_eq!(pages.next_page(), Some(1));

        pages.pages.push(page(Some("http://api/search/posts/?page=2")));
        assert_eq!(pages.next_page(), Some(2));
        assert_eq!(pages.total_count(), 42);

        pages.pages.push(page(None));
        assert_eq!(pages.next_page(), None);
        assert!(!pages.has_next_page());
    }

    #[test]
    fn test_hashtag_query() {
        assert_eq!(hashtag_query("rust"), "#rust");
        assert_eq!(hashtag_query("#rust"), "#rust");
        assert_eq!(hashtag_query("  "), "");
    }
}
