use remote_store::{InMemoryStore, StoreError, StoreOp};
use serde_json::{json, Value};
use social_sync::config::Config;
use social_sync::domain::{CurrentUser, Relation, WritePath};
use social_sync::identity::SessionIdentity;
use social_sync::{SocialClient, SocialError};
use std::sync::Arc;
use uuid::Uuid;

struct Harness {
    store: Arc<InMemoryStore>,
    client: Arc<SocialClient>,
    me: Uuid,
}

fn harness(store: InMemoryStore, config: Config) -> Harness {
    let me = Uuid::new_v4();
    let store = Arc::new(store);
    let identity = Arc::new(SessionIdentity::signed_in(CurrentUser::new(me, "me")));
    let client = Arc::new(SocialClient::new(config, store.clone(), identity));
    Harness { store, client, me }
}

fn post_row(id: Uuid, likes: i64) -> Value {
    json!({
        "id": id,
        "title": "hello",
        "author_id": Uuid::new_v4(),
        "author_display_name": "author",
        "created_at": "2024-05-01T12:00:00Z",
        "like_count": likes,
        "comment_count": 0
    })
}

fn user_row(id: Uuid) -> Value {
    json!({"id": id, "following": [], "followers": []})
}

fn array(store: &InMemoryStore, id: Uuid, column: &str) -> Value {
    store
        .rows("users")
        .into_iter()
        .find(|row| row["id"] == json!(id))
        .and_then(|row| row.get(column).cloned())
        .unwrap_or(Value::Null)
}

fn like_count(client: &SocialClient, post: Uuid) -> i64 {
    client.session().post(&post).map(|p| p.like_count).unwrap_or(-1)
}

#[tokio::test]
async fn overlapping_like_toggles_return_to_original_state() {
    let store = InMemoryStore::new();
    let post = Uuid::new_v4();
    store.seed("posts", [post_row(post, 3)]);
    store.add_unique_key("likes", &["user_id", "post_id"]);
    let h = harness(store, Config::default());
    h.client.catalog().refresh().await.unwrap();

    let pause = h.store.suspend(StoreOp::Insert, "likes");
    let client = h.client.clone();
    let first = tokio::spawn(async move { client.graph().toggle_current(Relation::Like, post).await });

    pause.reached().await;
    assert!(h.client.graph().is_pending(Relation::Like, h.me, post));
    assert!(h.client.graph().is_linked(Relation::Like, h.me, post));
    assert_eq!(like_count(&h.client, post), 4);

    let client = h.client.clone();
    let second = tokio::spawn(async move { client.graph().toggle_current(Relation::Like, post).await });
    for _ in 0..1000 {
        if !h.client.graph().is_linked(Relation::Like, h.me, post) {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(!h.client.graph().is_linked(Relation::Like, h.me, post));
    assert_eq!(like_count(&h.client, post), 3);

    pause.resume();
    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();

    assert_eq!(first, second);
    assert!(!first.final_state);
    assert!(!first.applied);
    assert_eq!(first.path, Some(WritePath::Canonical));
    assert_eq!(like_count(&h.client, post), 3);
    assert!(!h.client.graph().is_pending(Relation::Like, h.me, post));
    assert!(h.store.rows("likes").is_empty());
    assert_eq!(h.store.call_count(StoreOp::Insert, "likes"), 1);
    assert_eq!(h.store.call_count(StoreOp::Delete, "likes"), 1);
}

#[tokio::test]
async fn abandoned_caller_does_not_cancel_an_issued_like() {
    let store = InMemoryStore::new();
    let post = Uuid::new_v4();
    store.seed("posts", [post_row(post, 0)]);
    store.add_unique_key("likes", &["user_id", "post_id"]);
    let h = harness(store, Config::default());
    h.client.catalog().refresh().await.unwrap();

    let pause = h.store.suspend(StoreOp::Insert, "likes");
    let client = h.client.clone();
    let caller = tokio::spawn(async move { client.graph().toggle_current(Relation::Like, post).await });

    pause.reached().await;
    caller.abort();
    assert!(caller.await.unwrap_err().is_cancelled());
    assert!(h.client.graph().is_pending(Relation::Like, h.me, post));

    pause.resume();
    for _ in 0..1000 {
        if !h.client.graph().is_pending(Relation::Like, h.me, post) {
            break;
        }
        tokio::task::yield_now().await;
    }

    assert!(!h.client.graph().is_pending(Relation::Like, h.me, post));
    assert_eq!(h.store.rows("likes").len(), 1);
    assert!(h.client.graph().is_linked(Relation::Like, h.me, post));
    assert_eq!(like_count(&h.client, post), 1);
}

#[tokio::test]
async fn follow_then_unfollow_through_canonical_table() {
    let store = InMemoryStore::new();
    store.add_unique_key("follows", &["follower_id", "followee_id"]);
    let h = harness(store, Config::default());
    let other = Uuid::new_v4();

    let follow = h.client.graph().toggle_current(Relation::Follow, other).await.unwrap();
    assert!(follow.final_state);
    assert_eq!(h.store.rows("follows").len(), 1);

    let unfollow = h.client.graph().toggle_current(Relation::Follow, other).await.unwrap();
    assert!(!unfollow.final_state);
    assert!(h.store.rows("follows").is_empty());
    assert_eq!(h.client.graph().preferred_path(Relation::Follow), WritePath::Canonical);
}

#[tokio::test]
async fn follow_then_unfollow_through_legacy_arrays() {
    let store = InMemoryStore::new();
    let other = Uuid::new_v4();
    let h = harness(store, Config::default());
    h.store.seed("users", [user_row(h.me), user_row(other)]);

    let follow = h.client.graph().toggle_current(Relation::Follow, other).await.unwrap();
    assert_eq!(follow.path, Some(WritePath::Legacy));
    assert!(!follow.is_degraded());
    assert_eq!(array(&h.store, h.me, "following"), json!([other.to_string()]));
    assert_eq!(array(&h.store, other, "followers"), json!([h.me.to_string()]));
    assert_eq!(h.client.graph().preferred_path(Relation::Follow), WritePath::Legacy);

    h.client.graph().toggle_current(Relation::Follow, other).await.unwrap();
    assert_eq!(array(&h.store, h.me, "following"), json!([]));
    assert_eq!(array(&h.store, other, "followers"), json!([]));

    // The missing canonical table was only tried once
    assert_eq!(h.store.call_count(StoreOp::Insert, "follows"), 1);
    assert_eq!(h.store.call_count(StoreOp::Delete, "follows"), 0);
}

#[tokio::test]
async fn second_legacy_write_failure_is_reported_as_partial() {
    let store = InMemoryStore::new();
    let other = Uuid::new_v4();
    let h = harness(store, Config::default());
    h.store.seed("users", [user_row(h.me), user_row(other)]);
    h.store.fail_nth(
        StoreOp::Update,
        "users",
        2,
        StoreError::Transport("connection reset".into()),
    );

    let outcome = h.client.graph().toggle_current(Relation::Follow, other).await.unwrap();

    assert!(outcome.is_degraded());
    assert!(outcome.final_state);
    let partial = outcome.partial.unwrap();
    assert_eq!(partial.written, "users.following");
    assert_eq!(partial.failed, "users.followers");
    assert!(h.client.graph().is_linked(Relation::Follow, h.me, other));
    assert_eq!(array(&h.store, other, "followers"), json!([]));
}

#[tokio::test]
async fn timeout_rolls_back_the_optimistic_like() {
    let store = InMemoryStore::new();
    let post = Uuid::new_v4();
    store.seed("posts", [post_row(post, 0)]);
    store.create_table("likes");
    let mut config = Config::default();
    config.remote.timeout_ms = 50;
    let h = harness(store, config);
    h.client.catalog().refresh().await.unwrap();
    let _stalled = h.store.suspend(StoreOp::Insert, "likes");

    let err = h.client.graph().toggle_current(Relation::Like, post).await.unwrap_err();

    assert!(matches!(err, SocialError::RemoteUnavailable(_)));
    assert!(err.is_retryable());
    assert!(!h.client.graph().is_linked(Relation::Like, h.me, post));
    assert_eq!(like_count(&h.client, post), 0);
}

#[tokio::test]
async fn self_follow_and_anonymous_toggles_are_rejected() {
    let h = harness(InMemoryStore::new(), Config::default());
    assert_eq!(
        h.client.graph().toggle_current(Relation::Follow, h.me).await.unwrap_err(),
        SocialError::SelfRelationRejected
    );

    let anonymous = SocialClient::new(
        Config::default(),
        h.store.clone(),
        Arc::new(SessionIdentity::anonymous()),
    );
    assert_eq!(
        anonymous
            .graph()
            .toggle_current(Relation::Like, Uuid::new_v4())
            .await
            .unwrap_err(),
        SocialError::NotAuthenticated
    );
    assert_eq!(h.store.call_count(StoreOp::Insert, "follows"), 0);
}

#[tokio::test]
async fn bootstrap_seeds_likes_and_follows() {
    let store = InMemoryStore::new();
    let post = Uuid::new_v4();
    let followed = Uuid::new_v4();
    store.seed("posts", [post_row(post, 1)]);
    let h = harness(store, Config::default());
    h.store
        .seed("likes", [json!({"id": Uuid::new_v4(), "user_id": h.me, "post_id": post})]);
    h.store.seed(
        "users",
        [json!({"id": h.me, "following": [followed], "followers": []})],
    );

    h.client.bootstrap().await.unwrap();

    assert!(h.client.graph().is_linked(Relation::Like, h.me, post));
    assert!(h.client.graph().is_linked(Relation::Follow, h.me, followed));
    assert_eq!(h.client.graph().preferred_path(Relation::Follow), WritePath::Legacy);
}

#[tokio::test]
async fn logout_stops_local_updates() {
    let store = InMemoryStore::new();
    let post = Uuid::new_v4();
    store.seed("posts", [post_row(post, 0)]);
    store.create_table("likes");
    let h = harness(store, Config::default());
    h.client.catalog().refresh().await.unwrap();
    let mut events = h.client.session().subscribe();

    h.client.logout();

    assert!(!h.client.session().is_open());
    assert!(h.client.session().posts().is_empty());
    assert_eq!(
        events.recv().await.unwrap(),
        social_sync::session::SessionEvent::Closed
    );

    // The remote write still happens; the torn-down cache ignores it
    h.client.graph().toggle_current(Relation::Like, post).await.unwrap();
    assert_eq!(h.store.rows("likes").len(), 1);
    assert!(!h.client.graph().is_linked(Relation::Like, h.me, post));
}
