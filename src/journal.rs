use spin_sdk::http::{Request, Response};
use uuid::Uuid;

use crate::auth::validate_token;
use crate::config::{journal_key, journals_key};
use crate::core::db;
use crate::core::errors::ApiError;
use crate::core::helpers::{json_response, message_response, now_iso, sanitize_text, validate_id};
use crate::models::models::JournalEntry;

pub fn save_entry(req: Request) -> Result<Response, ApiError> {
    let Some(username) = validate_token(&req) else {
        return Err(ApiError::Unauthorized);
    };

    let db = db::open()?;
    let value: serde_json::Value = serde_json::from_slice(req.body())?;

    let topic = sanitize_text(value["topic"].as_str().unwrap_or("").trim());
    let entry = sanitize_text(value["entry"].as_str().unwrap_or("").trim());

    if topic.is_empty() || entry.is_empty() {
        return Err(ApiError::BadRequest(
            "Topic and entry content are required".to_string(),
        ));
    }

    let journal = JournalEntry {
        id: Uuid::new_v4().to_string(),
        username: username.clone(),
        topic,
        entry,
        date: now_iso(),
    };

    db.put_doc(&journal_key(&journal.id), &journal)?;
    db.list_prepend(&journals_key(&username), &journal.id)?;

    message_response(201, "Journal entry saved successfully")
}

pub fn list_entries(req: Request) -> Result<Response, ApiError> {
    let Some(username) = validate_token(&req) else {
        return Err(ApiError::Unauthorized);
    };

    let db = db::open()?;
    let mut entries = Vec::new();
    for id in db.list_items(&journals_key(&username))? {
        if let Some(entry) = db.get_doc::<JournalEntry>(&journal_key(&id))? {
            entries.push(entry);
        }
    }
    // Most recent first
    entries.sort_by(|a, b| b.date.cmp(&a.date));

    json_response(200, &entries)
}

pub fn delete_entry(req: Request) -> Result<Response, ApiError> {
    let Some(username) = validate_token(&req) else {
        return Err(ApiError::Unauthorized);
    };

    let path = req.path().to_string();
    let entry_id = path.trim_start_matches("/journal/");
    if entry_id.is_empty() || !validate_id(entry_id) {
        return Err(ApiError::BadRequest("Invalid journal entry id".to_string()));
    }

    let db = db::open()?;
    let Some(entry) = db.get_doc::<JournalEntry>(&journal_key(entry_id))? else {
        return Err(ApiError::NotFound("Journal entry not found".to_string()));
    };
    if entry.username != username {
        return Err(ApiError::Forbidden);
    }

    db.delete_doc(&journal_key(entry_id))?;
    db.list_remove(&journals_key(&username), entry_id)?;

    message_response(200, "Journal entry deleted successfully")
}
