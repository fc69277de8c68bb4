use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::search::SearchUser;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FriendshipRequest {
    pub id: String,
    pub created_by: SearchUser,
    #[serde(default)]
    pub message: Option<String>,
}

/// `GET /friends/:id/` 的响应；requests 仅在查看自己时非空
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FriendsView {
    pub user: SearchUser,
    pub friends: Vec<SearchUser>,
    #[serde(default)]
    pub requests: Vec<FriendshipRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendFriendRequest {
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendRequestDecision {
    Accepted,
    Rejected,
}

impl fmt::Display for FriendRequestDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FriendRequestDecision::Accepted => write!(f, "accepted"),
            FriendRequestDecision::Rejected => write!(f, "rejected"),
        }
    }
}
