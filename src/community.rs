use spin_sdk::http::{Request, Response};
use uuid::Uuid;

use crate::auth::validate_token;
use crate::config::{community_key, COMMUNITY_LIST_KEY, MIN_POLL_OPTIONS};
use crate::core::db;
use crate::core::errors::ApiError;
use crate::core::helpers::{json_response, message_response, now_iso, sanitize_text, validate_id};
use crate::core::query_params::{get_string, parse_query_params};
use crate::models::models::{CommunityEntry, CommunityKind, PollOption};

pub fn create_entry(req: Request) -> Result<Response, ApiError> {
    let Some(username) = validate_token(&req) else {
        return Err(ApiError::Unauthorized);
    };

    let db = db::open()?;
    let value: serde_json::Value = serde_json::from_slice(req.body())?;

    let kind = match value["kind"].as_str().unwrap_or_default() {
        "forum" => CommunityKind::Forum,
        "poll" => CommunityKind::Poll,
        "resource" => CommunityKind::Resource,
        "feed" => CommunityKind::Feed,
        _ => {
            return Err(ApiError::BadRequest(
                "Invalid community entry type".to_string(),
            ))
        }
    };

    let content = value["content"]
        .as_str()
        .map(|c| sanitize_text(c.trim()))
        .filter(|c| !c.is_empty());
    let topic = value["topic"]
        .as_str()
        .map(|t| sanitize_text(t.trim()))
        .filter(|t| !t.is_empty());
    let media = value["media"]
        .as_str()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(|m| m.to_string());
    let media_caption = value["media_caption"]
        .as_str()
        .map(|c| sanitize_text(c.trim()))
        .filter(|c| !c.is_empty());

    let mut entry = CommunityEntry {
        id: Uuid::new_v4().to_string(),
        kind,
        username,
        content,
        topic,
        options: None,
        resources: None,
        media: None,
        media_caption: None,
        created_at: now_iso(),
    };

    match kind {
        CommunityKind::Forum => {
            if entry.content.is_none() || entry.topic.is_none() {
                return Err(ApiError::BadRequest(
                    "Forum post must have content and a topic".to_string(),
                ));
            }
        }
        CommunityKind::Poll => {
            let options: Vec<PollOption> = value["options"]
                .as_array()
                .map(|opts| {
                    opts.iter()
                        .filter_map(|o| o.as_str())
                        .map(|o| sanitize_text(o.trim()))
                        .filter(|o| !o.is_empty())
                        .map(|text| PollOption { text, votes: 0 })
                        .collect()
                })
                .unwrap_or_default();

            if entry.content.is_none() || options.len() < MIN_POLL_OPTIONS {
                return Err(ApiError::BadRequest(
                    "Poll must include content and at least two options".to_string(),
                ));
            }
            entry.options = Some(options);
        }
        CommunityKind::Resource => {
            let resources: Vec<String> = value["resources"]
                .as_array()
                .map(|links| {
                    links
                        .iter()
                        .filter_map(|l| l.as_str())
                        .map(str::trim)
                        .filter(|l| !l.is_empty())
                        .map(|l| l.to_string())
                        .collect()
                })
                .unwrap_or_default();

            if resources.is_empty() {
                return Err(ApiError::BadRequest(
                    "Resource must include links".to_string(),
                ));
            }
            entry.resources = Some(resources);
        }
        CommunityKind::Feed => {
            if entry.content.is_none() && media.is_none() {
                return Err(ApiError::BadRequest(
                    "Feed must have content or media".to_string(),
                ));
            }
            entry.media = media;
            entry.media_caption = media_caption;
        }
    }

    db.put_doc(&community_key(&entry.id), &entry)?;
    db.list_prepend(COMMUNITY_LIST_KEY, &entry.id)?;

    message_response(201, "Community entry created successfully")
}

pub fn list_entries(_req: Request) -> Result<Response, ApiError> {
    let db = db::open()?;

    let mut entries = Vec::new();
    for id in db.list_items(COMMUNITY_LIST_KEY)? {
        if let Some(entry) = db.get_doc::<CommunityEntry>(&community_key(&id))? {
            entries.push(entry);
        }
    }
    entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    json_response(200, &entries)
}

pub fn delete_entry(req: Request) -> Result<Response, ApiError> {
    let Some(username) = validate_token(&req) else {
        return Err(ApiError::Unauthorized);
    };

    let path = req.path().to_string();
    let entry_id = path.trim_start_matches("/community/");
    if entry_id.is_empty() || !validate_id(entry_id) {
        return Err(ApiError::BadRequest("Invalid community post id".to_string()));
    }

    let db = db::open()?;
    let Some(entry) = db.get_doc::<CommunityEntry>(&community_key(entry_id))? else {
        return Err(ApiError::NotFound("Post not found".to_string()));
    };
    if entry.username != username {
        return Err(ApiError::Forbidden);
    }

    db.delete_doc(&community_key(entry_id))?;
    db.list_remove(COMMUNITY_LIST_KEY, entry_id)?;

    message_response(200, "Post deleted successfully")
}

pub fn vote(req: Request) -> Result<Response, ApiError> {
    let value: serde_json::Value = serde_json::from_slice(req.body())?;
    let poll_id = value["poll_id"].as_str().unwrap_or_default();
    let option_text = value["option_text"].as_str().unwrap_or_default();

    if poll_id.is_empty() || option_text.is_empty() {
        return Err(ApiError::BadRequest(
            "Poll ID and option text are required".to_string(),
        ));
    }
    if !validate_id(poll_id) {
        return Err(ApiError::BadRequest("Invalid poll id".to_string()));
    }

    let db = db::open()?;
    // One atomic document update; concurrent votes on the same poll both land.
    let registered = db.update_doc(&community_key(poll_id), |entry: &mut CommunityEntry| {
        if entry.kind != CommunityKind::Poll {
            return false;
        }
        let Some(options) = entry.options.as_mut() else {
            return false;
        };
        match options.iter_mut().find(|o| o.text == option_text) {
            Some(option) => {
                option.votes += 1;
                true
            }
            None => false,
        }
    })?;

    match registered {
        Some(true) => message_response(200, "Vote registered successfully"),
        _ => Err(ApiError::NotFound("Poll or option not found".to_string())),
    }
}

pub fn search_topics(req: Request) -> Result<Response, ApiError> {
    let db = db::open()?;
    let params = parse_query_params(req.uri());
    let query = get_string(&params, "query").unwrap_or_default().to_lowercase();

    let mut matches = Vec::new();
    for id in db.list_items(COMMUNITY_LIST_KEY)? {
        let Some(entry) = db.get_doc::<CommunityEntry>(&community_key(&id))? else {
            continue;
        };
        let topic_matches = entry
            .topic
            .as_ref()
            .map(|t| t.to_lowercase().contains(&query))
            .unwrap_or(false);
        if query.is_empty() || topic_matches {
            matches.push(entry);
        }
    }

    json_response(200, &matches)
}
