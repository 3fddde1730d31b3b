// Fan-out behavior: publish broadcast, follow-time reconciliation, and
// partial-failure isolation.

mod common;

use common::{ctx, harness, seed_user, FailingStore};
use std::sync::Arc;

use gramfeed::core::types::UserId;
use gramfeed::core::ViewerContext;
use gramfeed::error::AppError;
use gramfeed::infrastructure::{
    collections, composite_id, BlobStore, DocumentStore, Filter, MemoryBlobStore, MemoryStore,
};
use gramfeed::{ServiceConfig, Services};

async fn feed_entry_exists(store: &dyn DocumentStore, user: &str, post: &str) -> bool {
    store
        .exists(collections::USER_FEED, &composite_id(user, post))
        .await
        .unwrap()
}

#[tokio::test]
async fn publish_reaches_author_and_all_followers() {
    let h = harness();
    for (id, name) in [("u1", "alice"), ("u2", "bob"), ("u3", "carol"), ("u4", "dave")] {
        seed_user(&h.services, id, name).await;
    }
    h.services.follow_fanout.follow(&ctx("u2"), &UserId::new("u1")).await.unwrap();
    h.services.follow_fanout.follow(&ctx("u3"), &UserId::new("u1")).await.unwrap();

    let receipt = h
        .services
        .post_fanout
        .publish(&ctx("u1"), "hi".to_string(), vec![1, 2, 3])
        .await
        .unwrap();
    assert!(receipt.fanout.is_complete());
    assert_eq!(receipt.fanout.attempted, 3);

    let post = receipt.post_id.as_str();
    for user in ["u1", "u2", "u3"] {
        assert!(
            feed_entry_exists(h.store.as_ref(), user, post).await,
            "missing feed entry for {}",
            user
        );
    }
    assert!(!feed_entry_exists(h.store.as_ref(), "u4", post).await);
}

#[tokio::test]
async fn follow_reconciliation_is_idempotent() {
    let h = harness();
    seed_user(&h.services, "u1", "alice").await;
    seed_user(&h.services, "u5", "eve").await;
    for i in 0..3 {
        h.services
            .post_fanout
            .publish(&ctx("u1"), format!("post {}", i), vec![0])
            .await
            .unwrap();
    }

    let follower_ctx = ctx("u5");
    let followee = UserId::new("u1");
    let first = h
        .services
        .follow_fanout
        .on_follow_changed(&follower_ctx, &followee, true)
        .await
        .unwrap();
    let second = h
        .services
        .follow_fanout
        .on_follow_changed(&follower_ctx, &followee, true)
        .await
        .unwrap();
    assert!(first.is_complete());
    assert!(second.is_complete());

    let entries = h
        .store
        .query(
            collections::USER_FEED,
            Some(Filter::eq("user_id", "u5")),
            None,
        )
        .await
        .unwrap();
    assert_eq!(entries.len(), 3);
}

#[tokio::test]
async fn unfollow_sweeps_only_entries_that_were_added() {
    let h = harness();
    seed_user(&h.services, "u1", "alice").await;
    seed_user(&h.services, "u5", "eve").await;
    for i in 0..3 {
        h.services
            .post_fanout
            .publish(&ctx("u1"), format!("early {}", i), vec![0])
            .await
            .unwrap();
    }

    h.services.follow_fanout.follow(&ctx("u5"), &UserId::new("u1")).await.unwrap();
    let entries = h
        .store
        .query(collections::USER_FEED, Some(Filter::eq("user_id", "u5")), None)
        .await
        .unwrap();
    assert_eq!(entries.len(), 3);

    h.services.follow_fanout.unfollow(&ctx("u5"), &UserId::new("u1")).await.unwrap();

    // Published after the unfollow: never lands in u5's feed.
    for i in 0..2 {
        h.services
            .post_fanout
            .publish(&ctx("u1"), format!("late {}", i), vec![0])
            .await
            .unwrap();
    }

    let u5_entries = h
        .store
        .query(collections::USER_FEED, Some(Filter::eq("user_id", "u5")), None)
        .await
        .unwrap();
    assert!(u5_entries.is_empty());

    let u1_entries = h
        .store
        .query(collections::USER_FEED, Some(Filter::eq("user_id", "u1")), None)
        .await
        .unwrap();
    assert_eq!(u1_entries.len(), 5);
}

#[tokio::test]
async fn fanout_failure_on_one_follower_is_isolated() {
    let base = Arc::new(MemoryStore::new());
    let failing = Arc::new(FailingStore::wrap(base.clone()));
    failing.fail_puts_with_prefix(collections::USER_FEED, "u2:");
    let blobs: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
    let services = Services::build(failing, blobs, ServiceConfig::default());

    for (id, name) in [("u1", "alice"), ("u2", "bob"), ("u3", "carol")] {
        seed_user(&services, id, name).await;
    }
    services.follow_fanout.follow(&ctx("u2"), &UserId::new("u1")).await.unwrap();
    services.follow_fanout.follow(&ctx("u3"), &UserId::new("u1")).await.unwrap();

    let receipt = services
        .post_fanout
        .publish(&ctx("u1"), "hi".to_string(), vec![1])
        .await
        .unwrap();

    assert_eq!(receipt.fanout.attempted, 3);
    assert_eq!(receipt.fanout.failed.len(), 1);
    assert_eq!(receipt.fanout.failed[0].target, UserId::new("u2"));

    let post = receipt.post_id.as_str();
    assert!(feed_entry_exists(base.as_ref(), "u1", post).await);
    assert!(feed_entry_exists(base.as_ref(), "u3", post).await);
    assert!(!feed_entry_exists(base.as_ref(), "u2", post).await);
}

#[tokio::test]
async fn anonymous_callers_cannot_publish_or_follow() {
    let h = harness();
    seed_user(&h.services, "u1", "alice").await;

    let anon = ViewerContext::anonymous();
    let publish = h
        .services
        .post_fanout
        .publish(&anon, "hi".to_string(), vec![1])
        .await;
    assert!(matches!(publish, Err(AppError::Unauthenticated(_))));

    let follow = h
        .services
        .follow_fanout
        .follow(&anon, &UserId::new("u1"))
        .await;
    assert!(matches!(follow, Err(AppError::Unauthenticated(_))));
}

#[tokio::test]
async fn self_follow_is_rejected() {
    let h = harness();
    seed_user(&h.services, "u1", "alice").await;
    let result = h
        .services
        .follow_fanout
        .follow(&ctx("u1"), &UserId::new("u1"))
        .await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}
