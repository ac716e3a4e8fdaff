use regex::Regex;
use spin_sdk::http::{Request, Response};
use std::sync::OnceLock;

use crate::auth::{issue_token, validate_token};
use crate::config::*;
use crate::core::db::{self, Documents};
use crate::core::errors::ApiError;
use crate::core::helpers::{
    hash_password, json_response, message_response, now_iso, sanitize_text, verify_password,
};
use crate::core::query_params::{get_string, parse_query_params};
use crate::models::models::User;

fn username_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[A-Za-z0-9]+$").expect("Regex should compile"))
}

fn email_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("Regex should compile"))
}

fn phone_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[0-9]{10}$").expect("Regex should compile"))
}

// Profile fields visible to anyone.
pub fn public_user_json(user: &User) -> serde_json::Value {
    serde_json::json!({
        "username": user.username,
        "display_name": user.display_name,
        "occupation": user.occupation,
        "bio": user.bio,
        "picture": user.picture,
        "created_at": user.created_at,
    })
}

// The user's own view: adds contact fields, never the credential.
pub fn own_user_json(user: &User) -> serde_json::Value {
    let mut json = public_user_json(user);
    json["email"] = serde_json::Value::String(user.email.clone());
    json["phone_number"] = match &user.phone_number {
        Some(p) => serde_json::Value::String(p.clone()),
        None => serde_json::Value::Null,
    };
    json
}

pub fn create_user(req: Request) -> Result<Response, ApiError> {
    let db = db::open()?;
    let body: serde_json::Value = serde_json::from_slice(req.body())?;

    let username = body["username"].as_str().unwrap_or("").trim();
    let display_name = sanitize_text(body["display_name"].as_str().unwrap_or("").trim());
    let email = body["email"].as_str().unwrap_or("").trim().to_lowercase();
    let password = body["password"].as_str().unwrap_or("");
    let phone_number = body["phone_number"].as_str().map(str::trim);
    let occupation = body["occupation"]
        .as_str()
        .map(|o| sanitize_text(o.trim()))
        .filter(|o| !o.is_empty());

    if username.len() < MIN_USERNAME_LENGTH
        || username.len() > MAX_USERNAME_LENGTH
        || !username_regex().is_match(username)
    {
        return Err(ApiError::BadRequest(
            "Username must be 3-30 letters and digits".to_string(),
        ));
    }
    if display_name.len() < MIN_DISPLAY_NAME_LENGTH || display_name.len() > MAX_DISPLAY_NAME_LENGTH
    {
        return Err(ApiError::BadRequest(
            "Display name must be 3-30 characters".to_string(),
        ));
    }
    if !email_regex().is_match(&email) {
        return Err(ApiError::BadRequest(
            "A valid email address is required".to_string(),
        ));
    }
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::BadRequest(
            "Password must be at least 6 characters".to_string(),
        ));
    }
    if let Some(phone) = phone_number {
        if !phone_regex().is_match(phone) {
            return Err(ApiError::BadRequest(
                "Phone number must be a 10-digit number".to_string(),
            ));
        }
    }

    // Both uniqueness claims are atomic inserts: the membership insert claims
    // the username, the index insert claims the email.
    if !db.set_add(USERS_LIST_KEY, username)? {
        return Err(ApiError::Conflict("Username already exists".to_string()));
    }
    if !db.put_doc_if_absent(&email_key(&email), &username)? {
        // Release the username claim before reporting the conflict.
        db.set_remove(USERS_LIST_KEY, username)?;
        return Err(ApiError::Conflict("Email already exists".to_string()));
    }

    let user = User {
        username: username.to_string(),
        email: email.clone(),
        display_name,
        phone_number: phone_number.map(|p| p.to_string()),
        occupation,
        bio: None,
        picture: None,
        password_hash: hash_password(password)?,
        created_at: now_iso(),
    };

    db.put_doc(&user_key(username), &user)?;

    message_response(201, "User registered successfully")
}

pub fn get_profile(req: Request) -> Result<Response, ApiError> {
    let Some(username) = validate_token(&req) else {
        return Err(ApiError::Unauthorized);
    };
    let db = db::open()?;
    let Some(user) = db.get_doc::<User>(&user_key(&username))? else {
        return Err(ApiError::NotFound("User not found".to_string()));
    };
    json_response(200, &own_user_json(&user))
}

pub fn get_user_details(path: &str) -> Result<Response, ApiError> {
    let username = path.trim_start_matches("/users/");
    if username.is_empty() {
        return Err(ApiError::BadRequest("Username required".to_string()));
    }

    let db = db::open()?;
    let Some(user) = db.get_doc::<User>(&user_key(username))? else {
        return Err(ApiError::NotFound("User not found".to_string()));
    };
    json_response(200, &public_user_json(&user))
}

pub fn update_profile(req: Request) -> Result<Response, ApiError> {
    let Some(username) = validate_token(&req) else {
        return Err(ApiError::Unauthorized);
    };

    let db = db::open()?;
    let Some(mut user) = db.get_doc::<User>(&user_key(&username))? else {
        return Err(ApiError::NotFound("User not found".to_string()));
    };

    let value: serde_json::Value = serde_json::from_slice(req.body())?;
    let mut password_changed = false;

    if let Some(bio) = value["bio"].as_str() {
        if bio.len() > MAX_BIO_LENGTH {
            return Err(ApiError::BadRequest(
                "Bio too long (max 500 chars)".to_string(),
            ));
        }
        let sanitized = sanitize_text(bio);
        user.bio = if sanitized.is_empty() {
            None
        } else {
            Some(sanitized)
        };
    }

    if let Some(occupation) = value["occupation"].as_str() {
        let sanitized = sanitize_text(occupation);
        user.occupation = if sanitized.is_empty() {
            None
        } else {
            Some(sanitized)
        };
    }

    if let Some(display_name) = value["display_name"].as_str() {
        let sanitized = sanitize_text(display_name.trim());
        if sanitized.len() < MIN_DISPLAY_NAME_LENGTH || sanitized.len() > MAX_DISPLAY_NAME_LENGTH {
            return Err(ApiError::BadRequest(
                "Display name must be 3-30 characters".to_string(),
            ));
        }
        user.display_name = sanitized;
    }

    // Opaque URI reference; the upload itself lives elsewhere.
    if let Some(picture) = value["picture"].as_str() {
        let trimmed = picture.trim();
        user.picture = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        };
    }

    if let Some(new_password) = value["new_password"].as_str() {
        if new_password.len() < MIN_PASSWORD_LENGTH {
            return Err(ApiError::BadRequest(
                "Password must be at least 6 characters".to_string(),
            ));
        }

        let old_password = value["old_password"].as_str().ok_or_else(|| {
            ApiError::BadRequest("Current password required".to_string())
        })?;

        if !verify_password(old_password, &user.password_hash) {
            return Err(ApiError::Unauthorized);
        }

        user.password_hash = hash_password(new_password)?;
        password_changed = true;
    }

    db.put_doc(&user_key(&username), &user)?;

    let mut response_data = own_user_json(&user);
    if password_changed {
        revoke_tokens(&db, &username)?;
        let new_token = issue_token(&db, &username)?;
        response_data["token"] = serde_json::Value::String(new_token);
    }

    json_response(200, &response_data)
}

// Drop every session belonging to `username` after a credential change.
fn revoke_tokens(db: &Documents, username: &str) -> Result<(), ApiError> {
    use crate::models::models::TokenData;

    for token in db.list_items(TOKENS_LIST_KEY)? {
        let key = token_key(&token);
        if let Some(data) = db.get_doc::<TokenData>(&key)? {
            if data.username == username {
                db.delete_doc(&key)?;
                db.list_remove(TOKENS_LIST_KEY, &token)?;
            }
        }
    }
    Ok(())
}

pub fn search_users(req: Request) -> Result<Response, ApiError> {
    let db = db::open()?;
    let params = parse_query_params(req.uri());
    let query = get_string(&params, "query").unwrap_or_default().to_lowercase();

    let mut matches = Vec::new();
    for username in db.set_members(USERS_LIST_KEY)? {
        if !query.is_empty() && !username.to_lowercase().contains(&query) {
            continue;
        }
        if let Some(user) = db.get_doc::<User>(&user_key(&username))? {
            matches.push(public_user_json(&user));
        }
    }

    json_response(200, &matches)
}
