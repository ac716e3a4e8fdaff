use uuid::Uuid;

use weave::config::{content_key, user_key, CONTENTS_LIST_KEY, USERS_LIST_KEY};
use weave::core::db::Documents;
use weave::core::helpers::now_iso;
use weave::contents::compute_feed;
use weave::follow::{follow, list_following, unfollow};
use weave::models::models::{Content, User};

fn seed_user(db: &Documents, username: &str) {
    let user = User {
        username: username.to_string(),
        email: format!("{}@example.com", username),
        display_name: format!("{} Display", username),
        phone_number: None,
        occupation: None,
        bio: None,
        picture: None,
        password_hash: "not-a-real-hash".to_string(),
        created_at: now_iso(),
    };
    db.put_doc(&user_key(username), &user).unwrap();
    db.set_add(USERS_LIST_KEY, username).unwrap();
}

fn seed_content(db: &Documents, author: &str, text: &str, created_at: &str) -> String {
    let content = Content {
        id: Uuid::new_v4().to_string(),
        author: author.to_string(),
        text: Some(text.to_string()),
        media: None,
        created_at: created_at.to_string(),
    };
    db.put_doc(&content_key(&content.id), &content).unwrap();
    db.list_prepend(CONTENTS_LIST_KEY, &content.id).unwrap();
    content.id
}

#[test]
fn feed_follows_the_follow_edge() {
    let db = Documents::in_memory();
    seed_user(&db, "alice");
    seed_user(&db, "bob");

    follow(&db, "alice", "bob").unwrap();
    seed_content(&db, "bob", "hello", &now_iso());

    let feed = compute_feed(&db, "alice").unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].author, "bob");
    assert_eq!(feed[0].text.as_deref(), Some("hello"));
    assert_eq!(feed[0].author_display_name, "bob Display");

    unfollow(&db, "alice", "bob").unwrap();
    assert!(compute_feed(&db, "alice").unwrap().is_empty());
}

#[test]
fn feed_contains_only_viewer_and_followed_authors() {
    let db = Documents::in_memory();
    for name in ["alice", "bob", "carol"] {
        seed_user(&db, name);
    }
    follow(&db, "alice", "bob").unwrap();

    seed_content(&db, "alice", "mine", &now_iso());
    seed_content(&db, "bob", "followed", &now_iso());
    seed_content(&db, "carol", "invisible", &now_iso());

    let feed = compute_feed(&db, "alice").unwrap();
    assert_eq!(feed.len(), 2);

    let mut allowed = list_following(&db, "alice").unwrap();
    allowed.push("alice".to_string());
    for item in &feed {
        assert!(allowed.contains(&item.author), "{} leaked in", item.author);
    }
}

#[test]
fn feed_is_sorted_newest_first() {
    let db = Documents::in_memory();
    seed_user(&db, "alice");
    seed_user(&db, "bob");
    follow(&db, "alice", "bob").unwrap();

    seed_content(&db, "bob", "oldest", "2026-01-01T08:00:00+00:00");
    seed_content(&db, "alice", "newest", "2026-01-03T08:00:00+00:00");
    seed_content(&db, "bob", "middle", "2026-01-02T08:00:00+00:00");

    let feed = compute_feed(&db, "alice").unwrap();
    let texts: Vec<_> = feed.iter().map(|i| i.text.as_deref().unwrap()).collect();
    assert_eq!(texts, vec!["newest", "middle", "oldest"]);
}

#[test]
fn feed_is_empty_for_a_lonely_user() {
    let db = Documents::in_memory();
    seed_user(&db, "alice");
    seed_user(&db, "bob");
    seed_content(&db, "bob", "unseen", &now_iso());

    assert!(compute_feed(&db, "alice").unwrap().is_empty());
}

#[test]
fn feed_enrichment_includes_likes() {
    let db = Documents::in_memory();
    seed_user(&db, "alice");
    seed_user(&db, "bob");
    follow(&db, "alice", "bob").unwrap();

    let id = seed_content(&db, "bob", "likable", &now_iso());
    weave::contents::toggle_like(&db, &id, "alice").unwrap();

    let feed = compute_feed(&db, "alice").unwrap();
    assert_eq!(feed[0].likes, vec!["alice".to_string()]);
    assert_eq!(feed[0].like_count, 1);
}
