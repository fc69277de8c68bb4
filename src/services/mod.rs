pub mod api;
pub mod auth;
pub mod chat;
pub mod comment;
pub mod friend;
pub mod like;
pub mod notice;
pub mod notification;
pub mod post;
pub mod realtime;
pub mod search;

// 重新导出常用类型
pub use api::{ApiClient, TokenStore};
pub use auth::AuthService;
pub use chat::{ChatService, PresenceTracker, TypingIndicator};
pub use comment::CommentService;
pub use friend::FriendService;
pub use like::{LikeButton, LikePhase, LikeService};
pub use notice::{Notice, NoticeCenter, NoticeLevel};
pub use notification::NotificationService;
pub use post::PostService;
pub use realtime::{BroadcastChannel, RealtimeChannel};
pub use search::SearchService;
