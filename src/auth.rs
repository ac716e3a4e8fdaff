use spin_sdk::http::{Request, Response};
use uuid::Uuid;

use crate::config::{email_key, token_expiration_hours, token_key, user_key, TOKENS_LIST_KEY};
use crate::core::db;
use crate::core::errors::ApiError;
use crate::core::helpers::{json_response, message_response, now_iso, verify_password};
use crate::models::models::{TokenData, User};
use crate::users::own_user_json;

pub fn login_user(req: Request) -> Result<Response, ApiError> {
    let db = db::open()?;
    let creds: serde_json::Value = serde_json::from_slice(req.body())?;
    let email = creds["email"].as_str().unwrap_or_default();
    let password = creds["password"].as_str().unwrap_or_default();

    if email.is_empty() || password.is_empty() {
        return Err(ApiError::BadRequest(
            "Email and password are required".to_string(),
        ));
    }

    // Unknown email and wrong password are indistinguishable to the caller.
    let Some(username) = db.get_doc::<String>(&email_key(email))? else {
        return Err(ApiError::Unauthorized);
    };
    let Some(user) = db.get_doc::<User>(&user_key(&username))? else {
        return Err(ApiError::Unauthorized);
    };
    if !verify_password(password, &user.password_hash) {
        return Err(ApiError::Unauthorized);
    }

    let token = issue_token(&db, &user.username)?;

    json_response(
        200,
        &serde_json::json!({
            "token": token,
            "user": own_user_json(&user),
        }),
    )
}

// Session probe: returns the logged-in user, or 401.
pub fn session_user(req: Request) -> Result<Response, ApiError> {
    let Some(username) = validate_token(&req) else {
        return Err(ApiError::Unauthorized);
    };
    let db = db::open()?;
    let Some(user) = db.get_doc::<User>(&user_key(&username))? else {
        return Err(ApiError::Unauthorized);
    };
    json_response(200, &serde_json::json!({ "user": own_user_json(&user) }))
}

pub fn logout_user(req: Request) -> Result<Response, ApiError> {
    let db = db::open()?;
    let Some(token) = bearer_token(&req) else {
        return Err(ApiError::Unauthorized);
    };

    db.delete_doc(&token_key(&token))?;
    db.list_remove(TOKENS_LIST_KEY, &token)?;

    message_response(200, "Logged out successfully")
}

pub fn issue_token(db: &db::Documents, username: &str) -> Result<String, ApiError> {
    let token = Uuid::new_v4().to_string();
    let data = TokenData {
        username: username.to_string(),
        created_at: now_iso(),
    };
    db.put_doc(&token_key(&token), &data)?;
    db.list_append(TOKENS_LIST_KEY, &token)?;
    Ok(token)
}

/// Resolve the bearer token to a username, or `None` when the request carries
/// no usable session. Callers pass the username on explicitly; nothing here is
/// cached between requests.
pub fn validate_token(req: &Request) -> Option<String> {
    let db = db::open().ok()?;
    let token = bearer_token(req)?;
    let data = db.get_doc::<TokenData>(&token_key(&token)).ok()??;

    // Expired tokens stay in the store until logout or password change.
    if let Ok(created) = chrono::DateTime::parse_from_rfc3339(&data.created_at) {
        let now = chrono::Utc::now();
        let age_hours = (now - created.with_timezone(&chrono::Utc)).num_hours();
        if age_hours > token_expiration_hours() {
            return None;
        }
    }

    // Check the account still exists.
    if db.get_doc::<User>(&user_key(&data.username)).ok()?.is_none() {
        return None;
    }
    Some(data.username)
}

fn bearer_token(req: &Request) -> Option<String> {
    let auth_header = req.header("Authorization")?.as_str().unwrap_or_default();
    auth_header
        .strip_prefix("Bearer ")
        .map(|token| token.to_string())
}
