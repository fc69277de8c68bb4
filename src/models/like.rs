use serde::{Deserialize, Serialize};

/// 点赞状态：是否已点赞 + 点赞数
///
/// 点赞数为无符号整数，取消点赞时在 0 处截断。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeState {
    pub liked: bool,
    pub count: u32,
}

impl LikeState {
    pub fn new(liked: bool, count: u32) -> Self {
        Self { liked, count }
    }

    /// 切换一次点赞状态，点赞数随之 ±1
    pub fn toggled(self) -> Self {
        let liked = !self.liked;
        let count = if liked {
            self.count.saturating_add(1)
        } else {
            self.count.saturating_sub(1)
        };
        Self { liked, count }
    }

    /// 连续切换 n 次
    pub fn toggled_n(self, n: usize) -> Self {
        (0..n).fold(self, |state, _| state.toggled())
    }
}

/// 可被点赞的实体（帖子、评论）
pub trait Likeable {
    fn entity_id(&self) -> &str;

    fn like_state(&self) -> LikeState;

    fn set_like_state(&mut self, state: LikeState);
}

/// 点赞请求体，携带最终的点赞方向
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LikeRequest {
    pub is_liked: bool,
}
