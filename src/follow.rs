use spin_sdk::http::{Request, Response};

use crate::auth::validate_token;
use crate::config::{followings_key, user_key, USERS_LIST_KEY};
use crate::core::db::{self, Documents};
use crate::core::errors::ApiError;
use crate::core::helpers::{json_response, message_response};
use crate::core::query_params::{get_string, parse_query_params};
use crate::models::models::FollowSet;

/// Add `target` to `follower`'s followed-set.
///
/// Following someone twice is a no-op, not an error. Self-follows are
/// rejected at this boundary so no follow set ever contains its owner.
pub fn follow(db: &Documents, follower: &str, target: &str) -> Result<(), ApiError> {
    if follower == target {
        return Err(ApiError::BadRequest(
            "You cannot follow yourself".to_string(),
        ));
    }
    if !db.exists(&user_key(target))? {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    db.set_add(&followings_key(follower), target)?;
    Ok(())
}

/// Remove `target` from `follower`'s followed-set. Absent membership is fine.
pub fn unfollow(db: &Documents, follower: &str, target: &str) -> Result<(), ApiError> {
    db.set_remove(&followings_key(follower), target)?;
    Ok(())
}

pub fn list_following(db: &Documents, user: &str) -> Result<FollowSet, ApiError> {
    Ok(db.set_members(&followings_key(user))?)
}

/// How many users follow `user`. Counted from the follow sets on every read;
/// a stored counter would drift.
pub fn follower_count(db: &Documents, user: &str) -> Result<usize, ApiError> {
    let mut count = 0;
    for username in db.set_members(USERS_LIST_KEY)? {
        if db.set_contains(&followings_key(&username), user)? {
            count += 1;
        }
    }
    Ok(count)
}

pub fn following_count(db: &Documents, user: &str) -> Result<usize, ApiError> {
    Ok(db.set_len(&followings_key(user))?)
}

// === HTTP handlers ===

pub fn handle_follow(req: Request) -> Result<Response, ApiError> {
    let Some(current_user) = validate_token(&req) else {
        return Err(ApiError::Unauthorized);
    };

    let db = db::open()?;
    let value: serde_json::Value = serde_json::from_slice(req.body())?;
    let target = value["username"].as_str().unwrap_or_default();

    if target.is_empty() {
        return Err(ApiError::BadRequest("Username is required".to_string()));
    }

    follow(&db, &current_user, target)?;

    message_response(200, &format!("You are now following {}", target))
}

pub fn handle_unfollow(req: Request) -> Result<Response, ApiError> {
    let Some(current_user) = validate_token(&req) else {
        return Err(ApiError::Unauthorized);
    };

    let db = db::open()?;
    let value: serde_json::Value = serde_json::from_slice(req.body())?;
    let target = value["username"].as_str().unwrap_or_default();

    if target.is_empty() {
        return Err(ApiError::BadRequest("Username is required".to_string()));
    }

    unfollow(&db, &current_user, target)?;

    message_response(200, &format!("You have unfollowed {}", target))
}

pub fn follow_stats(req: Request) -> Result<Response, ApiError> {
    let params = parse_query_params(req.uri());
    let Some(username) = get_string(&params, "username") else {
        return Err(ApiError::BadRequest("Username is required".to_string()));
    };

    let db = db::open()?;
    let followers = follower_count(&db, &username)?;
    let following = following_count(&db, &username)?;

    json_response(
        200,
        &serde_json::json!({
            "followers": followers,
            "following": following,
        }),
    )
}

pub fn following_list(req: Request) -> Result<Response, ApiError> {
    let Some(current_user) = validate_token(&req) else {
        return Err(ApiError::Unauthorized);
    };

    let db = db::open()?;
    let following = list_following(&db, &current_user)?;

    json_response(200, &following)
}
