//! wey 社交网络的客户端核心
//!
//! 提供类型化的 REST API 客户端、会话级查询缓存，以及点赞、评论的
//! 乐观更新与回滚。

pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod state;
pub mod utils;

pub use config::Config;
pub use error::{ClientError, Result};
pub use state::ClientState;
