use regex::Regex;
use serde::Serialize;
use spin_sdk::http::{Request, Response};
use std::collections::HashMap;
use std::sync::OnceLock;
use uuid::Uuid;

use crate::auth::validate_token;
use crate::config::{content_key, liked_by_key, user_key, CONTENTS_LIST_KEY, MAX_TEXT_LENGTH};
use crate::core::db::{self, Documents};
use crate::core::errors::ApiError;
use crate::core::helpers::{json_response, message_response, now_iso, validate_id};
use crate::follow::list_following;
use crate::models::models::{Content, User};

/// One feed entry: the content plus the author's display fields joined from
/// the account record at read time, and the current like-set.
#[derive(Serialize)]
pub struct FeedItem {
    pub id: String,
    pub author: String,
    pub author_display_name: String,
    pub author_picture: Option<String>,
    pub text: Option<String>,
    pub media: Option<String>,
    pub created_at: String,
    pub likes: Vec<String>,
    pub like_count: usize,
}

/// Everything `viewer` can see: their own content plus content from anyone
/// in their followed-set, newest first. Ties keep index order.
pub fn compute_feed(db: &Documents, viewer: &str) -> Result<Vec<FeedItem>, ApiError> {
    let mut authors = list_following(db, viewer)?;
    authors.push(viewer.to_string());

    let mut visible: Vec<Content> = Vec::new();
    for id in db.list_items(CONTENTS_LIST_KEY)? {
        let Some(content) = db.get_doc::<Content>(&content_key(&id))? else {
            continue;
        };
        if authors.iter().any(|a| a == &content.author) {
            visible.push(content);
        }
    }
    visible.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    // Author records are joined once per author, not once per item.
    let mut profiles: HashMap<String, Option<User>> = HashMap::new();
    let mut feed = Vec::with_capacity(visible.len());
    for content in visible {
        if !profiles.contains_key(&content.author) {
            let loaded = db.get_doc::<User>(&user_key(&content.author))?;
            profiles.insert(content.author.clone(), loaded);
        }
        let profile = profiles.get(&content.author).cloned().flatten();
        let likes = db.set_members(&liked_by_key(&content.id))?;
        feed.push(FeedItem {
            author_display_name: profile
                .as_ref()
                .map(|u| u.display_name.clone())
                .unwrap_or_else(|| content.author.clone()),
            author_picture: profile.and_then(|u| u.picture),
            id: content.id,
            author: content.author,
            text: content.text,
            media: content.media,
            created_at: content.created_at,
            like_count: likes.len(),
            likes,
        });
    }

    Ok(feed)
}

/// Flip `username`'s membership in the content's like-set.
///
/// Each direction is a single atomic set mutation in the store layer, so
/// concurrent toggles by different users cannot lose each other's likes.
/// Returns the resulting like-set and whether the caller now likes the item.
pub fn toggle_like(
    db: &Documents,
    content_id: &str,
    username: &str,
) -> Result<(Vec<String>, bool), ApiError> {
    if username.is_empty() {
        return Err(ApiError::Unauthorized);
    }
    if !validate_id(content_id) {
        return Err(ApiError::BadRequest("Invalid content id".to_string()));
    }
    if !db.exists(&content_key(content_id))? {
        return Err(ApiError::NotFound("Content not found".to_string()));
    }

    let key = liked_by_key(content_id);
    let now_likes = if db.set_add(&key, username)? {
        true
    } else {
        db.set_remove(&key, username)?;
        false
    };

    Ok((db.set_members(&key)?, now_likes))
}

// === HTTP handlers ===

pub fn create_content(req: Request) -> Result<Response, ApiError> {
    let Some(username) = validate_token(&req) else {
        return Err(ApiError::Unauthorized);
    };

    let db = db::open()?;
    let value: serde_json::Value = serde_json::from_slice(req.body())?;

    let text = value["text"]
        .as_str()
        .map(str::trim)
        .filter(|t| !t.is_empty());
    let media = value["media"]
        .as_str()
        .map(str::trim)
        .filter(|m| !m.is_empty());

    if text.is_none() && media.is_none() {
        return Err(ApiError::BadRequest(
            "Content requires text or media".to_string(),
        ));
    }
    if let Some(t) = text {
        if t.len() > MAX_TEXT_LENGTH {
            return Err(ApiError::BadRequest("Text too long".to_string()));
        }
    }

    let content = Content {
        id: Uuid::new_v4().to_string(),
        author: username,
        text: text.map(filter_content_text),
        media: media.map(|m| m.to_string()),
        created_at: now_iso(),
    };

    db.put_doc(&content_key(&content.id), &content)?;
    db.list_prepend(CONTENTS_LIST_KEY, &content.id)?;

    json_response(201, &content)
}

pub fn feed(req: Request) -> Result<Response, ApiError> {
    let Some(username) = validate_token(&req) else {
        return Err(ApiError::Unauthorized);
    };

    let db = db::open()?;
    let feed = compute_feed(&db, &username)?;

    json_response(200, &feed)
}

pub fn toggle_like_handler(req: Request) -> Result<Response, ApiError> {
    let Some(username) = validate_token(&req) else {
        return Err(ApiError::Unauthorized);
    };

    let path = req.path().to_string();
    let content_id = path
        .trim_start_matches("/contents/")
        .trim_end_matches("/likes");

    let db = db::open()?;
    let (likes, liked_by_current_user) = toggle_like(&db, content_id, &username)?;

    json_response(
        200,
        &serde_json::json!({
            "likes": likes,
            "liked_by_current_user": liked_by_current_user,
        }),
    )
}

pub fn delete_content(req: Request) -> Result<Response, ApiError> {
    let Some(username) = validate_token(&req) else {
        return Err(ApiError::Unauthorized);
    };

    let path = req.path().to_string();
    let content_id = path.trim_start_matches("/contents/");
    if content_id.is_empty() || !validate_id(content_id) {
        return Err(ApiError::BadRequest("Invalid content id".to_string()));
    }

    let db = db::open()?;
    let Some(content) = db.get_doc::<Content>(&content_key(content_id))? else {
        return Err(ApiError::NotFound("Content not found".to_string()));
    };
    if content.author != username {
        return Err(ApiError::Forbidden);
    }

    db.delete_doc(&content_key(content_id))?;
    db.delete_doc(&liked_by_key(content_id))?;
    db.list_remove(CONTENTS_LIST_KEY, content_id)?;

    message_response(200, "Content deleted successfully")
}

fn url_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"https?://[^\s]+").expect("Regex should compile"))
}

// Sanitize HTML, then turn bare URLs into links with escaped attributes.
fn filter_content_text(text: &str) -> String {
    let clean = ammonia::Builder::default()
        .link_rel(Some("noopener noreferrer"))
        .clean(text)
        .to_string();

    url_regex()
        .replace_all(&clean, |caps: &regex::Captures| {
            let url = &caps[0];
            let escaped_url = html_escape::encode_double_quoted_attribute(url);
            format!(r#"<a href="{}" target="_blank">{}</a>"#, escaped_url, url)
        })
        .to_string()
}
