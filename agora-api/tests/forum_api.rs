//! End-to-end tests against a migrated Postgres database.
//!
//! Run with `DATABASE_URL` pointing at a server the tests may create
//! databases on: `cargo test -- --ignored`.

mod common;

use axum::http::{Method, StatusCode};
use common::{
    TEST_PASSWORD, create_comment, create_post, create_topic, log_in, react, send, session_for,
    session_keys, sign_up, test_app,
};
use serde_json::json;
use sqlx::PgPool;

#[sqlx::test(migrations = "../agora-db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn sign_up_twice_conflicts(pool: PgPool) {
    let app = test_app(pool);

    let first = sign_up(&app, "marguerite").await;
    assert_eq!(first.status, StatusCode::CREATED);
    assert_eq!(
        first.body,
        json!({ "message": "User created successfully" })
    );

    let second = sign_up(&app, "marguerite").await;
    assert_eq!(second.status, StatusCode::CONFLICT);
    assert_eq!(second.body, json!({ "error": "Username already exists" }));
}

#[sqlx::test(migrations = "../agora-db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn login_issues_session_for_user(pool: PgPool) {
    let app = test_app(pool);
    sign_up(&app, "desmond").await;

    let response = log_in(&app, "desmond", TEST_PASSWORD).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["message"], "Login successful");
    assert_eq!(response.body["user"]["username"], "desmond");

    let set_cookie = response.headers["set-cookie"].to_str().unwrap();
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));
    assert!(set_cookie.contains("Max-Age=2592000"));
    assert!(set_cookie.contains("Expires="));

    let cookie = response.session_cookie().unwrap();
    let token = cookie.trim_start_matches("Authorisation=");
    let user_id = session_keys().verify(token).unwrap();
    assert_eq!(json!(user_id), response.body["user"]["id"]);

    let validate = send(
        &app,
        Method::GET,
        "/api/users/validate",
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(validate.status, StatusCode::OK);
    assert_eq!(validate.body["user"], response.body["user"]);
}

#[sqlx::test(migrations = "../agora-db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn bad_logins_are_indistinguishable(pool: PgPool) {
    let app = test_app(pool);
    sign_up(&app, "desmond").await;

    let wrong_password = log_in(&app, "desmond", "not the password").await;
    let unknown_user = log_in(&app, "nobody_here", TEST_PASSWORD).await;

    assert_eq!(wrong_password.status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_user.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password.body, unknown_user.body);
    assert_eq!(
        wrong_password.body,
        json!({ "error": "Invalid username or password" })
    );
    assert!(wrong_password.session_cookie().is_none());
}

#[sqlx::test(migrations = "../agora-db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn logout_clears_cookie(pool: PgPool) {
    let app = test_app(pool);
    let cookie = session_for(&app, "leaving").await;

    let response = send(&app, Method::POST, "/api/users/logout", Some(&cookie), None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.body,
        json!({ "message": "Logged out successfully" })
    );
    assert_eq!(
        response.session_cookie().as_deref(),
        Some("Authorisation=")
    );
}

#[sqlx::test(migrations = "../agora-db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn topics_lifecycle(pool: PgPool) {
    let app = test_app(pool);
    let owner = session_for(&app, "owner").await;
    let other = session_for(&app, "other").await;

    let topic_id = create_topic(&app, &owner, "Gardening").await;

    let duplicate = send(
        &app,
        Method::POST,
        "/api/topics",
        Some(&other),
        Some(json!({ "title": "Gardening" })),
    )
    .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    let blank = send(
        &app,
        Method::POST,
        "/api/topics",
        Some(&owner),
        Some(json!({ "title": "   " })),
    )
    .await;
    assert_eq!(blank.status, StatusCode::BAD_REQUEST);

    let list = send(&app, Method::GET, "/api/topics", Some(&other), None).await;
    assert_eq!(list.status, StatusCode::OK);
    assert_eq!(list.body.as_array().unwrap().len(), 1);
    assert_eq!(list.body[0]["title"], "Gardening");

    let uri = format!("/api/topics/{topic_id}");
    let forbidden = send(&app, Method::DELETE, &uri, Some(&other), None).await;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);

    let deleted = send(&app, Method::DELETE, &uri, Some(&owner), None).await;
    assert_eq!(deleted.status, StatusCode::OK);

    let gone = send(&app, Method::GET, &uri, Some(&owner), None).await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
    let gone = send(&app, Method::DELETE, &uri, Some(&owner), None).await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../agora-db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn malformed_ids_are_bad_requests_after_login(pool: PgPool) {
    let app = test_app(pool);
    let cookie = session_for(&app, "typo_prone").await;

    for (method, uri) in [
        (Method::GET, "/api/posts/abc"),
        (Method::PUT, "/api/posts/abc"),
        (Method::POST, "/api/posts/1.5/react"),
        (Method::DELETE, "/api/comments/first"),
        (Method::GET, "/api/topics/-x"),
    ] {
        let response = send(&app, method.clone(), uri, Some(&cookie), None).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "{method} {uri}");
        assert!(response.body["error"].is_string());
    }
}

#[sqlx::test(migrations = "../agora-db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn posts_need_an_existing_topic(pool: PgPool) {
    let app = test_app(pool);
    let cookie = session_for(&app, "poster").await;

    let orphan = send(
        &app,
        Method::POST,
        "/api/posts",
        Some(&cookie),
        Some(json!({ "topic_id": 4242, "title": "Lost", "content": "Nowhere to go" })),
    )
    .await;
    assert_eq!(orphan.status, StatusCode::NOT_FOUND);

    let missing_query = send(&app, Method::GET, "/api/posts", Some(&cookie), None).await;
    assert_eq!(missing_query.status, StatusCode::BAD_REQUEST);

    let malformed_query = send(
        &app,
        Method::GET,
        "/api/posts?topic_id=x",
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(malformed_query.status, StatusCode::BAD_REQUEST);
}

#[sqlx::test(migrations = "../agora-db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn only_creator_modifies_posts(pool: PgPool) {
    let app = test_app(pool);
    let author = session_for(&app, "author").await;
    let stranger = session_for(&app, "stranger").await;
    let topic_id = create_topic(&app, &author, "Cooking").await;
    let post_id = create_post(&app, &author, topic_id).await;
    let uri = format!("/api/posts/{post_id}");
    let edit = json!({ "title": "Second thoughts", "content": "Changed my mind." });

    let anonymous = send(&app, Method::PUT, &uri, None, Some(edit.clone())).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let forbidden = send(
        &app,
        Method::PUT,
        &uri,
        Some(&stranger),
        Some(edit.clone()),
    )
    .await;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);
    let forbidden = send(&app, Method::DELETE, &uri, Some(&stranger), None).await;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);

    let before = send(&app, Method::GET, &uri, Some(&author), None).await;
    let updated = send(&app, Method::PUT, &uri, Some(&author), Some(edit)).await;
    assert_eq!(updated.status, StatusCode::OK);

    let after = send(&app, Method::GET, &uri, Some(&stranger), None).await;
    assert_eq!(after.body["title"], "Second thoughts");
    assert_eq!(after.body["content"], "Changed my mind.");
    assert_eq!(after.body["username"], "author");
    assert_eq!(after.body["created_at"], before.body["created_at"]);
    assert_ne!(after.body["updated_at"], before.body["updated_at"]);

    let deleted = send(&app, Method::DELETE, &uri, Some(&author), None).await;
    assert_eq!(deleted.status, StatusCode::OK);
    let gone = send(
        &app,
        Method::PUT,
        &uri,
        Some(&author),
        Some(json!({ "title": "x", "content": "y" })),
    )
    .await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../agora-db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn reactions_toggle_and_aggregate(pool: PgPool) {
    let app = test_app(pool);
    let alice = session_for(&app, "alice").await;
    let bob = session_for(&app, "bob").await;
    let topic_id = create_topic(&app, &alice, "Music").await;
    let post_id = create_post(&app, &alice, topic_id).await;
    let post_uri = format!("/api/posts/{post_id}");
    let react_uri = format!("/api/posts/{post_id}/react");

    let created = react(&app, &alice, &react_uri, 1).await;
    assert_eq!(created.body, json!({ "message": "Reaction created" }));
    let removed = react(&app, &alice, &react_uri, 1).await;
    assert_eq!(removed.body, json!({ "message": "Reaction deleted" }));

    let post = send(&app, Method::GET, &post_uri, Some(&alice), None).await;
    assert_eq!(post.body["net_score"], 0);
    assert_eq!(post.body["like_count"], 0);
    assert!(post.body["user_reaction"].is_null());

    react(&app, &alice, &react_uri, 1).await;
    react(&app, &bob, &react_uri, 1).await;
    let liked = send(&app, Method::GET, &post_uri, Some(&alice), None).await;
    assert_eq!(liked.body["net_score"], 2);

    let switched = react(&app, &alice, &react_uri, -1).await;
    assert_eq!(switched.body, json!({ "message": "Reaction updated" }));

    let as_alice = send(&app, Method::GET, &post_uri, Some(&alice), None).await;
    let as_bob = send(&app, Method::GET, &post_uri, Some(&bob), None).await;
    assert_eq!(as_alice.body["net_score"], 0);
    assert_eq!(as_alice.body["like_count"], 1);
    assert_eq!(as_alice.body["dislike_count"], 1);
    assert_eq!(as_alice.body["user_reaction"], -1);
    assert_eq!(as_bob.body["user_reaction"], 1);
    for field in ["like_count", "dislike_count", "net_score"] {
        assert_eq!(as_alice.body[field], as_bob.body[field]);
    }

    let listed = send(
        &app,
        Method::GET,
        &format!("/api/posts?topic_id={topic_id}"),
        Some(&bob),
        None,
    )
    .await;
    assert_eq!(listed.body[0]["dislike_count"], 1);
    assert_eq!(listed.body[0]["user_reaction"], 1);
}

#[sqlx::test(migrations = "../agora-db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn invalid_reactions_are_rejected(pool: PgPool) {
    let app = test_app(pool);
    let cookie = session_for(&app, "critic").await;
    let topic_id = create_topic(&app, &cookie, "Films").await;
    let post_id = create_post(&app, &cookie, topic_id).await;
    let react_uri = format!("/api/posts/{post_id}/react");

    for value in [0, 2, -5] {
        let response = react(&app, &cookie, &react_uri, value).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
    }

    let post = send(
        &app,
        Method::GET,
        &format!("/api/posts/{post_id}"),
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(post.body["like_count"], 0);
    assert_eq!(post.body["dislike_count"], 0);

    let missing = react(&app, &cookie, "/api/posts/999999/react", 1).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    let missing = react(&app, &cookie, "/api/comments/999999/react", -1).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../agora-db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn comments_lifecycle(pool: PgPool) {
    let app = test_app(pool);
    let author = session_for(&app, "commenter").await;
    let stranger = session_for(&app, "lurker").await;
    let topic_id = create_topic(&app, &author, "Books").await;
    let post_id = create_post(&app, &author, topic_id).await;
    let comment_id = create_comment(&app, &author, post_id).await;
    let uri = format!("/api/comments/{comment_id}");

    let orphan = send(
        &app,
        Method::POST,
        "/api/comments",
        Some(&author),
        Some(json!({ "post_id": 777_777, "content": "Hello?" })),
    )
    .await;
    assert_eq!(orphan.status, StatusCode::NOT_FOUND);

    react(&app, &stranger, &format!("{uri}/react"), -1).await;
    let listed = send(
        &app,
        Method::GET,
        &format!("/api/comments?post_id={post_id}"),
        Some(&author),
        None,
    )
    .await;
    assert_eq!(listed.status, StatusCode::OK);
    assert_eq!(listed.body[0]["content"], "Agreed.");
    assert_eq!(listed.body[0]["net_score"], -1);
    assert!(listed.body[0]["user_reaction"].is_null());

    let forbidden = send(
        &app,
        Method::PUT,
        &uri,
        Some(&stranger),
        Some(json!({ "content": "Hijacked" })),
    )
    .await;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);

    let updated = send(
        &app,
        Method::PUT,
        &uri,
        Some(&author),
        Some(json!({ "content": "Agreed, mostly." })),
    )
    .await;
    assert_eq!(updated.status, StatusCode::OK);

    let deleted = send(&app, Method::DELETE, &uri, Some(&author), None).await;
    assert_eq!(deleted.status, StatusCode::OK);
    let gone = send(&app, Method::GET, &uri, Some(&author), None).await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../agora-db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn deleting_topic_cascades(pool: PgPool) {
    let app = test_app(pool);
    let cookie = session_for(&app, "archivist").await;
    let topic_id = create_topic(&app, &cookie, "Temporary").await;
    let post_id = create_post(&app, &cookie, topic_id).await;
    let comment_id = create_comment(&app, &cookie, post_id).await;

    let deleted = send(
        &app,
        Method::DELETE,
        &format!("/api/topics/{topic_id}"),
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(deleted.status, StatusCode::OK);

    let post = send(
        &app,
        Method::GET,
        &format!("/api/posts/{post_id}"),
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(post.status, StatusCode::NOT_FOUND);
    let comment = send(
        &app,
        Method::GET,
        &format!("/api/comments/{comment_id}"),
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(comment.status, StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../agora-db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn deleted_authors_leave_tombstones(pool: PgPool) {
    let app = test_app(pool.clone());
    let leaver = session_for(&app, "leaver").await;
    let reader = session_for(&app, "reader").await;
    let topic_id = create_topic(&app, &leaver, "Farewells").await;
    let post_id = create_post(&app, &leaver, topic_id).await;
    let comment_id = create_comment(&app, &leaver, post_id).await;
    react(&app, &leaver, &format!("/api/posts/{post_id}/react"), 1).await;

    sqlx::query("DELETE FROM users WHERE username = 'leaver'")
        .execute(&pool)
        .await
        .unwrap();

    let topic = send(
        &app,
        Method::GET,
        &format!("/api/topics/{topic_id}"),
        Some(&reader),
        None,
    )
    .await;
    assert!(topic.body["created_by"].is_null());

    let post = send(
        &app,
        Method::GET,
        &format!("/api/posts/{post_id}"),
        Some(&reader),
        None,
    )
    .await;
    assert_eq!(post.status, StatusCode::OK);
    assert!(post.body["created_by"].is_null());
    assert!(post.body["username"].is_null());
    assert_eq!(post.body["like_count"], 0);

    let comment = send(
        &app,
        Method::GET,
        &format!("/api/comments/{comment_id}"),
        Some(&reader),
        None,
    )
    .await;
    assert!(comment.body["created_by"].is_null());

    let stale = send(&app, Method::GET, "/api/topics", Some(&leaver), None).await;
    assert_eq!(stale.status, StatusCode::UNAUTHORIZED);
}
