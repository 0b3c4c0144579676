mod common;

use anyhow::Result;
use chrono::{Duration, Utc};
use serde_json::{json, Value};

use common::{id_of, TestApp};
use social_relay_api::services::Scheduler;

async fn scheduled_text_post(app: &TestApp, token: &str, account: &Value, body: &str) -> Result<Value> {
    let at = Utc::now() + Duration::minutes(2);
    app.create_post(
        token,
        json!({ "account_id": id_of(account), "kind": "text", "body": body, "scheduled_at": at }),
    )
    .await
}

#[tokio::test]
async fn schedule_needs_lead_time() -> Result<()> {
    let app = TestApp::spawn().await?;
    let token = app.register("lead@example.com").await?;
    let account = app.connect(&token, "facebook").await?;
    let post = app
        .create_post(&token, json!({ "account_id": id_of(&account), "kind": "text", "body": "soon" }))
        .await?;

    let res = app
        .post(&token, &format!("/api/posts/{}/schedule", id_of(&post)))
        .json(&json!({ "scheduled_at": Utc::now() + Duration::seconds(10) }))
        .send()
        .await?;
    assert_eq!(res.status(), 400);

    let at = Utc::now() + Duration::minutes(5);
    let res = app
        .post(&token, &format!("/api/posts/{}/schedule", id_of(&post)))
        .json(&json!({ "scheduled_at": at }))
        .send()
        .await?;
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await?;
    assert_eq!(body["data"]["status"], "scheduled");

    let res = app.post(&token, &format!("/api/posts/{}/unschedule", id_of(&post))).send().await?;
    let body: Value = res.json().await?;
    assert_eq!(body["data"]["status"], "draft");
    assert!(body["data"]["scheduled_at"].is_null());
    Ok(())
}

#[tokio::test]
async fn due_posts_are_published_on_tick() -> Result<()> {
    let app = TestApp::spawn().await?;
    let token = app.register("due@example.com").await?;
    let account = app.connect(&token, "facebook").await?;
    let post = scheduled_text_post(&app, &token, &account, "on time").await?;

    let scheduler = Scheduler::new(app.state.clone());
    let early = scheduler.tick(Utc::now()).await?;
    assert_eq!(early.claimed, 0);

    let report = scheduler.tick(Utc::now() + Duration::minutes(3)).await?;
    assert_eq!(report.claimed, 1);
    assert_eq!(report.published, 1);

    let post = app.get_post(&token, &id_of(&post)).await?;
    assert_eq!(post["status"], "published");
    assert_eq!(post["platform_post_id"], "page-1_111");
    Ok(())
}

#[tokio::test]
async fn concurrent_ticks_publish_each_post_once() -> Result<()> {
    let app = TestApp::spawn().await?;
    let token = app.register("race@example.com").await?;
    let account = app.connect(&token, "facebook").await?;
    for n in 0..3 {
        scheduled_text_post(&app, &token, &account, &format!("post {n}")).await?;
    }

    let later = Utc::now() + Duration::minutes(3);
    let a = Scheduler::new(app.state.clone());
    let b = Scheduler::new(app.state.clone());
    let (first, second) = tokio::join!(a.tick(later), b.tick(later));
    let (first, second) = (first?, second?);

    assert_eq!(first.claimed + second.claimed, 3);
    assert_eq!(first.published + second.published, 3);
    assert_eq!(app.fake.requests_to("POST", "/page-1/feed").len(), 3);
    Ok(())
}

#[tokio::test]
async fn transient_failure_is_retried_later() -> Result<()> {
    let app = TestApp::spawn().await?;
    let token = app.register("flaky@example.com").await?;
    let account = app.connect(&token, "facebook").await?;
    let post = scheduled_text_post(&app, &token, &account, "eventually").await?;
    app.fake.fail_next_publish(
        500,
        json!({ "error": { "message": "An unexpected error has occurred", "code": 2, "is_transient": true } }),
    );

    let scheduler = Scheduler::new(app.state.clone());
    let report = scheduler.tick(Utc::now() + Duration::minutes(3)).await?;
    assert_eq!(report.retried, 1);

    let retrying = app.get_post(&token, &id_of(&post)).await?;
    assert_eq!(retrying["status"], "scheduled");
    assert_eq!(retrying["attempts"], 1);
    assert!(retrying["last_error"].is_string());

    let report = scheduler.tick(Utc::now() + Duration::minutes(10)).await?;
    assert_eq!(report.published, 1);

    let done = app.get_post(&token, &id_of(&post)).await?;
    assert_eq!(done["status"], "published");
    assert_eq!(done["attempts"], 2);
    Ok(())
}

#[tokio::test]
async fn retries_stop_at_max_attempts() -> Result<()> {
    let app = TestApp::spawn_with(|config| config.scheduler.max_attempts = 2).await?;
    let token = app.register("giveup@example.com").await?;
    let account = app.connect(&token, "facebook").await?;
    let post = scheduled_text_post(&app, &token, &account, "never").await?;
    for _ in 0..2 {
        app.fake.fail_next_publish(429, json!({ "error": { "message": "Application request limit reached", "code": 4 } }));
    }

    let scheduler = Scheduler::new(app.state.clone());
    assert_eq!(scheduler.tick(Utc::now() + Duration::minutes(3)).await?.retried, 1);
    assert_eq!(scheduler.tick(Utc::now() + Duration::minutes(10)).await?.failed, 1);

    let failed = app.get_post(&token, &id_of(&post)).await?;
    assert_eq!(failed["status"], "failed");
    assert_eq!(failed["attempts"], 2);
    assert!(failed["last_error"].as_str().unwrap_or_default().contains("rate limit"));
    Ok(())
}

#[tokio::test]
async fn rescheduling_a_failed_post_starts_over() -> Result<()> {
    let app = TestApp::spawn().await?;
    let token = app.register("again@example.com").await?;
    let account = app.connect(&token, "facebook").await?;
    let post = scheduled_text_post(&app, &token, &account, "second chance").await?;
    app.fake.fail_next_publish(400, json!({ "error": { "message": "Invalid parameter", "code": 100 } }));

    let scheduler = Scheduler::new(app.state.clone());
    assert_eq!(scheduler.tick(Utc::now() + Duration::minutes(3)).await?.failed, 1);

    let res = app
        .post(&token, &format!("/api/posts/{}/schedule", id_of(&post)))
        .json(&json!({ "scheduled_at": Utc::now() + Duration::minutes(5) }))
        .send()
        .await?;
    let body: Value = res.json().await?;
    assert_eq!(body["data"]["status"], "scheduled");
    assert_eq!(body["data"]["attempts"], 0);
    assert!(body["data"]["last_error"].is_null());

    assert_eq!(scheduler.tick(Utc::now() + Duration::minutes(6)).await?.published, 1);
    Ok(())
}

#[tokio::test]
async fn expiring_tokens_are_refreshed_on_tick() -> Result<()> {
    let app = TestApp::spawn().await?;
    let token = app.register("fresh@example.com").await?;
    let account = app.connect(&token, "youtube").await?;

    let report = Scheduler::new(app.state.clone()).tick(Utc::now() + Duration::hours(1)).await?;
    assert_eq!(report.tokens_refreshed, 1);
    assert_eq!(report.token_failures, 0);

    let id = uuid::Uuid::parse_str(&id_of(&account))?;
    let stored = app.state.store.find_account(id).await?.expect("stored account");
    assert_eq!(stored.access_token, "yt-access-refreshed");
    assert!(!stored.needs_reauth);
    Ok(())
}

#[tokio::test]
async fn revoked_tokens_flag_account_and_fail_its_posts() -> Result<()> {
    let app = TestApp::spawn().await?;
    let token = app.register("revoked@example.com").await?;
    let account = app.connect(&token, "facebook").await?;
    app.fake.fail_next_refresh(
        400,
        json!({ "error": { "message": "Error validating access token: The session has been invalidated", "code": 190 } }),
    );

    // the page token follows the long-lived user token, which expires in 60 days
    let scheduler = Scheduler::new(app.state.clone());
    let report = scheduler.tick(Utc::now() + Duration::days(60)).await?;
    assert_eq!(report.token_failures, 1);

    let view: Value = app
        .get(&token, &format!("/api/accounts/{}", id_of(&account)))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(view["data"]["needs_reauth"], true);

    // flagged accounts are not retried on every tick
    let report = scheduler.tick(Utc::now() + Duration::days(60)).await?;
    assert_eq!(report.token_failures, 0);

    let post = scheduled_text_post(&app, &token, &account, "stuck").await?;
    let report = scheduler.tick(Utc::now() + Duration::minutes(3)).await?;
    assert_eq!(report.failed, 1);
    let post = app.get_post(&token, &id_of(&post)).await?;
    assert_eq!(post["status"], "failed");
    assert!(post["last_error"].as_str().unwrap_or_default().contains("reconnected"));
    Ok(())
}
