pub fn token_expiration_hours() -> i64 {
    std::env::var("WEAVE_TOKEN_EXPIRATION_HOURS")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(24)
}

pub fn store_timeout_secs() -> u64 {
    std::env::var("WEAVE_STORE_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(5)
}

// Field limits
pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MAX_USERNAME_LENGTH: usize = 30;
pub const MIN_DISPLAY_NAME_LENGTH: usize = 3;
pub const MAX_DISPLAY_NAME_LENGTH: usize = 30;
pub const MIN_PASSWORD_LENGTH: usize = 6;
pub const MAX_BIO_LENGTH: usize = 500;
pub const MAX_TEXT_LENGTH: usize = 5000;
pub const MIN_POLL_OPTIONS: usize = 2;

// Store keys
pub const USERS_LIST_KEY: &str = "users_list";
pub const CONTENTS_LIST_KEY: &str = "contents_list";
pub const COMMUNITY_LIST_KEY: &str = "community_list";
pub const TOKENS_LIST_KEY: &str = "tokens_list";

pub fn user_key(username: &str) -> String {
    format!("user:{}", username)
}

pub fn email_key(email: &str) -> String {
    format!("email:{}", email.to_lowercase())
}

pub fn content_key(id: &str) -> String {
    format!("content:{}", id)
}

pub fn liked_by_key(content_id: &str) -> String {
    format!("likedby:{}", content_id)
}

pub fn followings_key(username: &str) -> String {
    format!("followings:{}", username)
}

pub fn journal_key(id: &str) -> String {
    format!("journal:{}", id)
}

pub fn journals_key(username: &str) -> String {
    format!("journals:{}", username)
}

pub fn community_key(id: &str) -> String {
    format!("community:{}", id)
}

pub fn token_key(token: &str) -> String {
    format!("token:{}", token)
}
