use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone)]
pub struct User {
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub phone_number: Option<String>,
    pub occupation: Option<String>,
    pub bio: Option<String>,
    pub picture: Option<String>,
    pub password_hash: String,
    pub created_at: String,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct Content {
    pub id: String,
    pub author: String,
    pub text: Option<String>,
    pub media: Option<String>,
    pub created_at: String,
}

#[derive(Serialize, Deserialize)]
pub struct TokenData {
    pub username: String,
    pub created_at: String,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct JournalEntry {
    pub id: String,
    pub username: String,
    pub topic: String,
    pub entry: String,
    pub date: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CommunityKind {
    Forum,
    Poll,
    Resource,
    Feed,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct PollOption {
    pub text: String,
    pub votes: u64,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct CommunityEntry {
    pub id: String,
    pub kind: CommunityKind,
    pub username: String,
    pub content: Option<String>,
    pub topic: Option<String>,
    pub options: Option<Vec<PollOption>>,
    pub resources: Option<Vec<String>>,
    pub media: Option<String>,
    pub media_caption: Option<String>,
    pub created_at: String,
}

// A follower's set of followed usernames, stored as one document per follower.
pub type FollowSet = Vec<String>;
