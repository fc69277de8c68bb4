use serde::{Deserialize, Serialize};
use std::fmt;

/// 缓存中的查询种类（实体类型 + 视图上下文）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    /// 首页帖子列表
    Posts,
    /// 帖子详情（含评论）
    Post,
    /// 某用户主页的帖子
    UserPosts,
    /// 某用户点赞过的帖子
    LikedPosts,
    /// 分页话题搜索
    SearchPostsPaginated,
    /// 用户 + 帖子综合搜索
    Search,
    Trends,
    Profile,
    Notifications,
    Friends,
    FriendSuggestions,
    Conversations,
    ChatHistory,
    /// 某用户的 MBTI 结果，参数 `me` 表示当前用户
    MbtiResult,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Posts => "posts",
            QueryKind::Post => "post",
            QueryKind::UserPosts => "user_posts",
            QueryKind::LikedPosts => "liked_posts",
            QueryKind::SearchPostsPaginated => "search_posts_paginated",
            QueryKind::Search => "search",
            QueryKind::Trends => "trends",
            QueryKind::Profile => "profile",
            QueryKind::Notifications => "notifications",
            QueryKind::Friends => "friends",
            QueryKind::FriendSuggestions => "friend_suggestions",
            QueryKind::Conversations => "conversations",
            QueryKind::ChatHistory => "chat_history",
            QueryKind::MbtiResult => "mbti_result",
        }
    }
}

/// 缓存键：查询种类 + 参数（通常是实体ID或搜索词）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryKey {
    pub kind: QueryKind,
    pub args: Vec<String>,
}

impl QueryKey {
    pub fn new(kind: QueryKind) -> Self {
        Self { kind, args: Vec::new() }
    }

    pub fn with_arg(kind: QueryKind, arg: impl Into<String>) -> Self {
        Self {
            kind,
            args: vec![arg.into()],
        }
    }

    pub fn posts() -> Self {
        Self::new(QueryKind::Posts)
    }

    pub fn post(post_id: &str) -> Self {
        Self::with_arg(QueryKind::Post, post_id)
    }

    pub fn user_posts(user_id: &str) -> Self {
        Self::with_arg(QueryKind::UserPosts, user_id)
    }

    pub fn liked_posts(user_id: &str) -> Self {
        Self::with_arg(QueryKind::LikedPosts, user_id)
    }

    pub fn search_posts(query: &str) -> Self {
        Self::with_arg(QueryKind::SearchPostsPaginated, query)
    }

    pub fn search(query: &str) -> Self {
        Self::with_arg(QueryKind::Search, query)
    }

    pub fn trends() -> Self {
        Self::new(QueryKind::Trends)
    }

    pub fn profile() -> Self {
        Self::new(QueryKind::Profile)
    }

    pub fn notifications() -> Self {
        Self::new(QueryKind::Notifications)
    }

    pub fn friends(user_id: &str) -> Self {
        Self::with_arg(QueryKind::Friends, user_id)
    }

    pub fn friend_suggestions() -> Self {
        Self::new(QueryKind::FriendSuggestions)
    }

    pub fn conversations() -> Self {
        Self::new(QueryKind::Conversations)
    }

    pub fn chat_history(conversation_id: &str) -> Self {
        Self::with_arg(QueryKind::ChatHistory, conversation_id)
    }

    pub fn mbti_result(user_id: Option<&str>) -> Self {
        Self::with_arg(QueryKind::MbtiResult, user_id.unwrap_or("me"))
    }

    /// 前缀匹配：`["post"]` 匹配 `["post", "1"]`
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.kind == prefix.kind
            && prefix.args.len() <= self.args.len()
            && self.args.iter().zip(prefix.args.iter()).all(|(a, b)| a == b)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind.as_str())?;
        for arg in &self.args {
            write!(f, ":{}", arg)?;
        }
        Ok(())
    }
}

/// 失效/匹配条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyFilter {
    Exact(QueryKey),
    Prefix(QueryKey),
    Kind(QueryKind),
}

impl KeyFilter {
    pub fn matches(&self, key: &QueryKey) -> bool {
        match self {
            KeyFilter::Exact(k) => k == key,
            KeyFilter::Prefix(prefix) => key.starts_with(prefix),
            KeyFilter::Kind(kind) => key.kind == *kind,
        }
    }
}

impl From<QueryKey> for KeyFilter {
    fn from(key: QueryKey) -> Self {
        KeyFilter::Exact(key)
    }
}

impl From<QueryKind> for KeyFilter {
    fn from(kind: QueryKind) -> Self {
        KeyFilter::Kind(kind)
    }
}

/// 乐观更新的实体标识，用于版本号
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityRef {
    Post(String),
    Comment { post_id: String, comment_id: String },
    /// 帖子下新增的一条评论，每次发表各自独立
    PostComments { post_id: String, attempt: String },
}

impl EntityRef {
    /// 在缓存容器中查找实体时使用的ID
    pub fn target_id(&self) -> &str {
        match self {
            EntityRef::Post(id) | EntityRef::PostComments { post_id: id, .. } => id,
            EntityRef::Comment { comment_id, .. } => comment_id,
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Post(id) => write!(f, "post:{}", id),
            EntityRef::Comment { post_id, comment_id } => write!(f, "comment:{}/{}", post_id, comment_id),
            EntityRef::PostComments { post_id, attempt } => write!(f, "post_comments:{}/{}", post_id, attempt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display() {
        assert_eq!(QueryKey::post("42").to_string(), "post:42");
        assert_eq!(QueryKey::posts().to_string(), "posts");
        assert_eq!(QueryKey::search_posts("#rust").to_string(), "search_posts_paginated:#rust");
    }

    #[test]
    fn test_filters() {
        let detail = QueryKey::post("1");
        assert!(KeyFilter::Kind(QueryKind::Post).matches(&detail));
        assert!(KeyFilter::Prefix(QueryKey::new(QueryKind::Post)).matches(&detail));
        assert!(KeyFilter::Exact(QueryKey::post("1")).matches(&detail));
        assert!(!KeyFilter::Exact(QueryKey::post("2")).matches(&detail));
        assert!(!KeyFilter::Kind(QueryKind::Posts).matches(&detail));
    }
}
