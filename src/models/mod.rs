pub mod chat;
pub mod comment;
pub mod friend;
pub mod like;
pub mod notification;
pub mod post;
pub mod response;
pub mod search;
pub mod user;

pub use chat::{ChatMessage, Conversation, ConversationDetail, RealtimeEvent, TypingStatus};
pub use comment::Comment;
pub use like::{LikeState, Likeable};
pub use notification::{Notification, NotificationType};
pub use post::{Post, PostDetail};
pub use search::{SearchPostsPage, SearchPostsPages, SearchResults};
pub use user::{AuthorSummary, Profile, TokenResponse};
