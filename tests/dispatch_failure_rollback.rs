//! A plugin that errors, panics or overruns its deadline must leave the
//! session exactly as it was before the message.
mod common;

use chrono::Utc;
use common::{msg, router_with, test_config};
use meshgate::gateway::router::FAILURE_REPLY;
use meshgate::gateway::MessageRouter;
use serde_json::json;

async fn router_inside_trouble() -> MessageRouter {
    let router = router_with(&test_config());
    let now = Utc::now();
    assert_eq!(router.respond(&msg("!a", "2"), now).await.unwrap(), "Trouble ready");
    assert_eq!(router.respond(&msg("!a", "kept"), now).await.unwrap(), "stored kept");
    router
}

async fn assert_rolled_back(router: &MessageRouter, input: &str) {
    let before = router.sessions().get("!a").unwrap();
    let reply = router.respond(&msg("!a", input), Utc::now()).await.unwrap();
    assert_eq!(reply, FAILURE_REPLY);

    let after = router.sessions().get("!a").unwrap();
    assert_eq!(after.id, before.id);
    assert_eq!(after.active_plugin, Some(2));
    assert_eq!(after.plugin_state, before.plugin_state);
    assert_eq!(after.plugin_state.get("value"), Some(&json!("kept")));
    assert!(!after.is_in_flight());
}

#[tokio::test]
async fn handler_error_leaves_session_unchanged() {
    let router = router_inside_trouble().await;
    assert_rolled_back(&router, "fail").await;
}

#[tokio::test]
async fn handler_panic_leaves_session_unchanged() {
    let router = router_inside_trouble().await;
    assert_rolled_back(&router, "panic").await;
}

#[tokio::test(start_paused = true)]
async fn handler_timeout_leaves_session_unchanged() {
    let router = router_inside_trouble().await;
    let started = tokio::time::Instant::now();
    assert_rolled_back(&router, "hang").await;
    assert!(started.elapsed() >= std::time::Duration::from_secs(1));
    assert!(started.elapsed() < std::time::Duration::from_secs(3600));
}

#[tokio::test]
async fn node_keeps_working_after_failure() {
    let router = router_inside_trouble().await;
    let now = Utc::now();
    router.respond(&msg("!a", "fail"), now).await;
    assert_eq!(router.respond(&msg("!a", "next"), now).await.unwrap(), "stored next");
    assert_eq!(
        router.sessions().get("!a").unwrap().plugin_state.get("value"),
        Some(&json!("next"))
    );
}

#[tokio::test]
async fn failure_for_one_node_does_not_touch_another() {
    let router = router_inside_trouble().await;
    let now = Utc::now();
    router.respond(&msg("!b", "1"), now).await;
    router.respond(&msg("!b", "hello"), now).await;
    let before = router.sessions().get("!b").unwrap();

    router.respond(&msg("!a", "panic"), now).await;

    let after = router.sessions().get("!b").unwrap();
    assert_eq!(after.plugin_state, before.plugin_state);
    assert_eq!(after.active_plugin, Some(1));
}

#[tokio::test]
async fn oversized_state_patch_is_dropped_but_reply_sent() {
    let mut config = test_config();
    config.security.max_plugin_state_bytes = 1024;
    let router = router_with(&config);
    let now = Utc::now();
    router.respond(&msg("!a", "2"), now).await;
    router.respond(&msg("!a", "small"), now).await;

    let reply = router.respond(&msg("!a", "big"), now).await.unwrap();
    assert_eq!(reply, "stored big");
    let session = router.sessions().get("!a").unwrap();
    assert!(session.plugin_state.get("blob").is_none());
    assert_eq!(session.plugin_state.get("value"), Some(&json!("small")));
}
