use serde_json::json;
use std::sync::Mutex;

use spin_sdk::http::{Method, Request};
use uuid::Uuid;

static TEST_LOCK: Mutex<()> = Mutex::new(());

fn lock_test() -> std::sync::MutexGuard<'static, ()> {
    TEST_LOCK.lock().unwrap()
}

fn send(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> (u16, serde_json::Value) {
    let payload = body
        .map(|v| serde_json::to_vec(&v).unwrap())
        .unwrap_or_default();
    let auth = token.map(|t| format!("Bearer {}", t));

    let mut builder = Request::builder();
    let mut b = builder
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");
    if let Some(a) = auth.as_deref() {
        b = b.header("Authorization", a);
    }

    let resp = weave::dispatch(b.body(payload).build());
    let status = *resp.status();
    let body = serde_json::from_slice(resp.body()).unwrap_or(serde_json::Value::Null);
    (status, body)
}

fn fresh_username(tag: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}{}", tag, &suffix[..10])
}

fn register_and_login(tag: &str) -> (String, String) {
    let username = fresh_username(tag);
    let email = format!("{}@example.com", username);

    let (status, _) = send(
        Method::Post,
        "/users",
        None,
        Some(json!({
            "username": username,
            "display_name": "Flow Tester",
            "email": email,
            "password": "hunter22",
        })),
    );
    assert_eq!(status, 201);

    let (status, body) = send(
        Method::Post,
        "/login",
        None,
        Some(json!({ "email": email, "password": "hunter22" })),
    );
    assert_eq!(status, 200);
    let token = body["token"].as_str().expect("token in login response");

    (username, token.to_string())
}

#[test]
fn test_full_user_flow() {
    let _lock = lock_test();

    let (author, author_token) = register_and_login("flow");
    let (reader, reader_token) = register_and_login("read");

    // Author posts content
    let (status, content) = send(
        Method::Post,
        "/contents",
        Some(&author_token),
        Some(json!({ "text": "hello from the flow test" })),
    );
    assert_eq!(status, 201);
    assert_eq!(content["author"], json!(author));
    let content_id = content["id"].as_str().unwrap().to_string();

    // Reader follows the author
    let (status, _) = send(
        Method::Post,
        "/follow",
        Some(&reader_token),
        Some(json!({ "username": author })),
    );
    assert_eq!(status, 200);

    let (status, following) = send(Method::Get, "/following", Some(&reader_token), None);
    assert_eq!(status, 200);
    assert!(following.as_array().unwrap().contains(&json!(author)));

    // The feed carries the content, enriched with author display fields
    let (status, feed) = send(Method::Get, "/contents", Some(&reader_token), None);
    assert_eq!(status, 200);
    let item = feed
        .as_array()
        .unwrap()
        .iter()
        .find(|i| i["id"] == json!(content_id))
        .expect("followed content visible in feed");
    assert_eq!(item["text"], json!("hello from the flow test"));
    assert_eq!(item["author_display_name"], json!("Flow Tester"));

    // Like toggling is an involution
    let likes_uri = format!("/contents/{}/likes", content_id);
    let (status, liked) = send(Method::Post, &likes_uri, Some(&reader_token), None);
    assert_eq!(status, 200);
    assert_eq!(liked["liked_by_current_user"], json!(true));
    assert_eq!(liked["likes"], json!([reader]));

    let (status, unliked) = send(Method::Post, &likes_uri, Some(&reader_token), None);
    assert_eq!(status, 200);
    assert_eq!(unliked["liked_by_current_user"], json!(false));
    assert_eq!(unliked["likes"], json!([]));

    // Stats are derived from the follow sets
    let stats_uri = format!("/follow/stats?username={}", author);
    let (status, stats) = send(Method::Get, &stats_uri, None, None);
    assert_eq!(status, 200);
    assert_eq!(stats["followers"], json!(1));
    assert_eq!(stats["following"], json!(0));

    // Unfollowing empties the reader's feed again
    let (status, _) = send(
        Method::Delete,
        "/follow",
        Some(&reader_token),
        Some(json!({ "username": author })),
    );
    assert_eq!(status, 200);

    let (status, feed) = send(Method::Get, "/contents", Some(&reader_token), None);
    assert_eq!(status, 200);
    assert_eq!(feed, json!([]));
}

#[test]
fn test_registration_validation() {
    let _lock = lock_test();

    // Username with non-alphanumerics
    let (status, _) = send(
        Method::Post,
        "/users",
        None,
        Some(json!({
            "username": "not a name",
            "display_name": "Someone",
            "email": "someone@example.com",
            "password": "hunter22",
        })),
    );
    assert_eq!(status, 400);

    // Password too short
    let (status, _) = send(
        Method::Post,
        "/users",
        None,
        Some(json!({
            "username": fresh_username("short"),
            "display_name": "Someone",
            "email": format!("{}@example.com", fresh_username("short")),
            "password": "abc",
        })),
    );
    assert_eq!(status, 400);

    // Duplicates of username and email
    let username = fresh_username("dup");
    let email = format!("{}@example.com", username);
    let body = json!({
        "username": username,
        "display_name": "Someone",
        "email": email,
        "password": "hunter22",
    });
    let (status, _) = send(Method::Post, "/users", None, Some(body.clone()));
    assert_eq!(status, 201);
    let (status, _) = send(Method::Post, "/users", None, Some(body));
    assert_eq!(status, 409);

    let (status, _) = send(
        Method::Post,
        "/users",
        None,
        Some(json!({
            "username": fresh_username("dup"),
            "display_name": "Someone",
            "email": email,
            "password": "hunter22",
        })),
    );
    assert_eq!(status, 409);
}

#[test]
fn test_login_invalid_credentials() {
    let _lock = lock_test();

    let (status, _) = send(
        Method::Post,
        "/login",
        None,
        Some(json!({ "email": "nobody@example.com", "password": "wrongpass" })),
    );
    assert_eq!(status, 401);

    let (username, _) = register_and_login("creds");
    let (status, _) = send(
        Method::Post,
        "/login",
        None,
        Some(json!({
            "email": format!("{}@example.com", username),
            "password": "wrongpass",
        })),
    );
    assert_eq!(status, 401);
}

#[test]
fn test_feed_requires_auth() {
    let _lock = lock_test();

    let (status, _) = send(Method::Get, "/contents", None, None);
    assert_eq!(status, 401);
}

#[test]
fn test_follow_error_paths() {
    let _lock = lock_test();

    let (username, token) = register_and_login("self");

    let (status, _) = send(
        Method::Post,
        "/follow",
        Some(&token),
        Some(json!({ "username": username })),
    );
    assert_eq!(status, 400);

    let (status, _) = send(
        Method::Post,
        "/follow",
        Some(&token),
        Some(json!({ "username": "nosuchuserhere" })),
    );
    assert_eq!(status, 404);
}

#[test]
fn test_journal_flow() {
    let _lock = lock_test();

    let (_, token) = register_and_login("diary");
    let (_, other_token) = register_and_login("nosy");

    let (status, _) = send(
        Method::Post,
        "/journal",
        Some(&token),
        Some(json!({ "topic": "gratitude", "entry": "shipped the follow graph" })),
    );
    assert_eq!(status, 201);

    let (status, entries) = send(Method::Get, "/journal", Some(&token), None);
    assert_eq!(status, 200);
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["topic"], json!("gratitude"));
    let entry_id = entries[0]["id"].as_str().unwrap().to_string();

    // Journals are private to their owner
    let (status, other_entries) = send(Method::Get, "/journal", Some(&other_token), None);
    assert_eq!(status, 200);
    assert_eq!(other_entries, json!([]));

    let delete_uri = format!("/journal/{}", entry_id);
    let (status, _) = send(Method::Delete, &delete_uri, Some(&other_token), None);
    assert_eq!(status, 403);

    let (status, _) = send(Method::Delete, &delete_uri, Some(&token), None);
    assert_eq!(status, 200);

    let (status, entries) = send(Method::Get, "/journal", Some(&token), None);
    assert_eq!(status, 200);
    assert_eq!(entries, json!([]));
}

#[test]
fn test_community_poll_flow() {
    let _lock = lock_test();

    let (_, token) = register_and_login("poll");
    let marker = format!("poll marker {}", Uuid::new_v4());

    // Forum posts need a topic
    let (status, _) = send(
        Method::Post,
        "/community",
        Some(&token),
        Some(json!({ "kind": "forum", "content": "no topic" })),
    );
    assert_eq!(status, 400);

    let (status, _) = send(
        Method::Post,
        "/community",
        Some(&token),
        Some(json!({
            "kind": "poll",
            "content": marker,
            "options": ["Yes", "No"],
        })),
    );
    assert_eq!(status, 201);

    let (status, entries) = send(Method::Get, "/community", None, None);
    assert_eq!(status, 200);
    let poll = entries
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["content"] == json!(marker))
        .expect("poll listed")
        .clone();
    let poll_id = poll["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        Method::Post,
        "/community/vote",
        None,
        Some(json!({ "poll_id": poll_id, "option_text": "Yes" })),
    );
    assert_eq!(status, 200);

    let (status, _) = send(
        Method::Post,
        "/community/vote",
        None,
        Some(json!({ "poll_id": poll_id, "option_text": "Maybe" })),
    );
    assert_eq!(status, 404);

    let (_, entries) = send(Method::Get, "/community", None, None);
    let poll = entries
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["id"] == json!(poll_id))
        .unwrap()
        .clone();
    let yes = poll["options"]
        .as_array()
        .unwrap()
        .iter()
        .find(|o| o["text"] == json!("Yes"))
        .unwrap()
        .clone();
    assert_eq!(yes["votes"], json!(1));
}

#[test]
fn test_profile_update_and_password_change() {
    let _lock = lock_test();

    let (_, token) = register_and_login("prof");

    let (status, updated) = send(
        Method::Put,
        "/profile",
        Some(&token),
        Some(json!({ "bio": "likes distributed systems", "occupation": "gardener" })),
    );
    assert_eq!(status, 200);
    assert_eq!(updated["bio"], json!("likes distributed systems"));
    assert_eq!(updated["occupation"], json!("gardener"));

    // Password change revokes the old session and hands back a fresh one
    let (status, updated) = send(
        Method::Put,
        "/profile",
        Some(&token),
        Some(json!({ "old_password": "hunter22", "new_password": "hunter2345" })),
    );
    assert_eq!(status, 200);
    let new_token = updated["token"].as_str().unwrap().to_string();

    let (status, _) = send(Method::Get, "/profile", Some(&token), None);
    assert_eq!(status, 401);

    let (status, profile) = send(Method::Get, "/profile", Some(&new_token), None);
    assert_eq!(status, 200);
    assert_eq!(profile["bio"], json!("likes distributed systems"));
}
