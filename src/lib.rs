use spin_sdk::http::{Request, Response};

pub mod auth;
pub mod community;
pub mod config;
pub mod contents;
pub mod follow;
pub mod journal;
pub mod users;

pub mod core {
    pub mod db;
    pub mod errors;
    pub mod helpers;
    pub mod query_params;
    pub mod static_server;
}

pub mod models {
    pub mod models;
}

use crate::core::errors::ApiError;
use crate::core::static_server::serve_static;

/// Route a request to its handler. Shared by the Spin component and the
/// native binary so there is exactly one route table.
pub fn dispatch(req: Request) -> Response {
    let method = req.method().to_string();
    let path = req.path().to_string();

    let result = match (method.as_str(), path.as_str()) {
        ("POST", "/users") => users::create_user(req),
        ("GET", "/users/search") => users::search_users(req),
        ("GET", p) if p.starts_with("/users/") => users::get_user_details(p),
        ("POST", "/login") => auth::login_user(req),
        ("GET", "/login") => auth::session_user(req),
        ("POST", "/logout") => auth::logout_user(req),
        ("GET", "/profile") => users::get_profile(req),
        ("PUT", "/profile") => users::update_profile(req),
        ("POST", "/contents") => contents::create_content(req),
        ("GET", "/contents") => contents::feed(req),
        ("GET", "/contents/search") => community::search_topics(req),
        ("POST", p) if p.starts_with("/contents/") && p.ends_with("/likes") => {
            contents::toggle_like_handler(req)
        }
        ("DELETE", p) if p.starts_with("/contents/") => contents::delete_content(req),
        ("POST", "/follow") => follow::handle_follow(req),
        ("DELETE", "/follow") => follow::handle_unfollow(req),
        ("GET", "/follow/stats") => follow::follow_stats(req),
        ("GET", "/following") => follow::following_list(req),
        ("POST", "/journal") => journal::save_entry(req),
        ("GET", "/journal") => journal::list_entries(req),
        ("DELETE", p) if p.starts_with("/journal/") => journal::delete_entry(req),
        ("POST", "/community/vote") => community::vote(req),
        ("POST", "/community") => community::create_entry(req),
        ("GET", "/community") => community::list_entries(req),
        ("DELETE", p) if p.starts_with("/community/") => community::delete_entry(req),
        ("GET", p) => serve_static(p),
        _ => Err(ApiError::NotFound("No route found".to_string())),
    };

    result.unwrap_or_else(|err| err.into())
}

#[cfg(target_arch = "wasm32")]
mod component {
    use spin_sdk::http::{IntoResponse, Request};
    use spin_sdk::http_component;

    #[http_component]
    fn handle(req: Request) -> impl IntoResponse {
        crate::dispatch(req)
    }
}
