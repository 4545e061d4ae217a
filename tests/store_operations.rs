//! Integration tests for the read, write, and verification paths

use muster::cluster::{SECURITY_INDEX_NAME, USER_DOC_TYPE};
use muster::docstore::r#impl::InMemoryDocumentStore;
use muster::docstore::{AttrMap, DocumentStore};
use muster::realm::r#impl::InMemoryRealmCache;
use muster::{
    DeleteUserRequest, Error, NativeUserStore, PutUserRequest, State, StoreConfig,
};
use serde_json::json;
use std::sync::Arc;

async fn started_store() -> (
    NativeUserStore,
    Arc<InMemoryDocumentStore>,
    Arc<InMemoryRealmCache>,
) {
    started_store_with_config(StoreConfig::default()).await
}

async fn started_store_with_config(
    config: StoreConfig,
) -> (
    NativeUserStore,
    Arc<InMemoryDocumentStore>,
    Arc<InMemoryRealmCache>,
) {
    let docs = Arc::new(InMemoryDocumentStore::new());
    let realm = Arc::new(InMemoryRealmCache::new());
    let store = NativeUserStore::new(docs.clone(), realm.clone(), config);
    store.start().await;
    assert_eq!(store.state(), State::Started);
    (store, docs, realm)
}

fn put_request(username: &str, password_hash: &str, roles: &[&str]) -> PutUserRequest {
    PutUserRequest {
        username: username.to_string(),
        password_hash: password_hash.to_string(),
        roles: roles.iter().map(|role| role.to_string()).collect(),
        refresh: true,
        ..Default::default()
    }
}

#[async_std::test]
async fn test_put_then_get() {
    let (store, _docs, realm) = started_store().await;

    let mut request = put_request("alice", "H1", &["admin"]);
    request.full_name = Some("Alice Example".to_string());
    request.email = Some("alice@example.com".to_string());
    request
        .metadata
        .insert("team".to_string(), json!("ops"));

    let created = store.put_user(request).await.unwrap();
    assert!(created);
    // a creation needs no realm-cache purge
    assert!(realm.requests().is_empty());

    let user = store.get_user("alice").await.unwrap().unwrap();
    assert_eq!(user.username, "alice");
    assert_eq!(user.roles, vec!["admin"]);
    assert_eq!(user.full_name.as_deref(), Some("Alice Example"));
    assert_eq!(user.email.as_deref(), Some("alice@example.com"));
    assert_eq!(user.metadata.get("team"), Some(&json!("ops")));
}

#[async_std::test]
async fn test_get_missing_user() {
    let (store, _docs, _realm) = started_store().await;

    // no index at all
    assert!(store.get_user("alice").await.unwrap().is_none());

    // index exists, user does not
    store
        .put_user(put_request("bob", "H1", &[]))
        .await
        .unwrap();
    assert!(store.get_user("alice").await.unwrap().is_none());
}

#[async_std::test]
async fn test_update_purges_realm_cache_once() {
    let (store, _docs, realm) = started_store().await;

    store
        .put_user(put_request("alice", "H1", &["admin"]))
        .await
        .unwrap();
    assert!(realm.requests().is_empty());

    let created = store
        .put_user(put_request("alice", "H2", &["admin", "ops"]))
        .await
        .unwrap();
    assert!(!created);
    assert_eq!(realm.requests(), vec![vec!["alice".to_string()]]);

    let user = store.get_user("alice").await.unwrap().unwrap();
    assert_eq!(user.roles, vec!["admin", "ops"]);
}

#[async_std::test]
async fn test_failed_purge_surfaces_to_the_caller() {
    let (store, _docs, realm) = started_store().await;

    store
        .put_user(put_request("alice", "H1", &["admin"]))
        .await
        .unwrap();

    realm.fail_requests(true);
    let result = store.put_user(put_request("alice", "H2", &["admin"])).await;
    match result {
        Err(Error::CachePurgeFailed { username, .. }) => assert_eq!(username, "alice"),
        other => panic!("expected a cache purge failure, got {:?}", other),
    }

    // the write itself went through; once purging recovers, updates succeed
    realm.fail_requests(false);
    let created = store
        .put_user(put_request("alice", "H3", &["admin"]))
        .await
        .unwrap();
    assert!(!created);
}

#[async_std::test]
async fn test_delete_purges_realm_cache() {
    let (store, _docs, realm) = started_store().await;

    store
        .put_user(put_request("alice", "H1", &["admin"]))
        .await
        .unwrap();

    let found = store
        .delete_user(DeleteUserRequest {
            username: "alice".to_string(),
            refresh: true,
        })
        .await
        .unwrap();
    assert!(found);
    assert_eq!(realm.requests(), vec![vec!["alice".to_string()]]);

    // deleting an absent user still purges
    let found = store
        .delete_user(DeleteUserRequest {
            username: "alice".to_string(),
            refresh: true,
        })
        .await
        .unwrap();
    assert!(!found);
    assert_eq!(realm.requests().len(), 2);
}

#[async_std::test]
async fn test_delete_with_missing_index_propagates() {
    let (store, _docs, realm) = started_store().await;

    let result = store
        .delete_user(DeleteUserRequest {
            username: "alice".to_string(),
            refresh: true,
        })
        .await;
    assert!(matches!(result, Err(Error::IndexNotFound(_))));
    assert!(realm.requests().is_empty());
}

#[async_std::test]
async fn test_get_users_all_and_filtered() {
    let (store, _docs, _realm) = started_store().await;

    for name in ["alice", "bob", "carol"] {
        store
            .put_user(put_request(name, "H1", &["user"]))
            .await
            .unwrap();
    }

    let mut all: Vec<String> = store
        .get_users(&[])
        .await
        .unwrap()
        .into_iter()
        .map(|user| user.username)
        .collect();
    all.sort();
    assert_eq!(all, vec!["alice", "bob", "carol"]);

    let filtered: Vec<String> = store
        .get_users(&["alice".to_string(), "carol".to_string()])
        .await
        .unwrap()
        .into_iter()
        .map(|user| user.username)
        .collect();
    assert_eq!(filtered, vec!["alice", "carol"]);

    // unknown names are simply absent
    let none = store.get_users(&["dave".to_string()]).await.unwrap();
    assert!(none.is_empty());
}

#[async_std::test]
async fn test_get_users_with_missing_index_is_empty() {
    let (store, _docs, _realm) = started_store().await;
    assert!(store.get_users(&[]).await.unwrap().is_empty());
}

#[async_std::test]
async fn test_get_users_scrolls_through_pages() {
    let (store, docs, _realm) = started_store_with_config(StoreConfig {
        scroll_size: 2,
        ..Default::default()
    })
    .await;

    for name in ["a", "b", "c", "d", "e"] {
        store
            .put_user(put_request(name, "H1", &[]))
            .await
            .unwrap();
    }

    let users = store.get_users(&[]).await.unwrap();
    assert_eq!(users.len(), 5);
    // every scroll the scan opened has been cleared again
    assert_eq!(docs.open_scroll_count(), 0);
}

#[async_std::test]
async fn test_malformed_documents_are_skipped() {
    let (store, docs, _realm) = started_store().await;

    store
        .put_user(put_request("alice", "H1", &["admin"]))
        .await
        .unwrap();

    // a document without a password hash cannot be decoded
    let mut source = AttrMap::new();
    source.insert("roles".to_string(), json!(["admin"]));
    docs.index(SECURITY_INDEX_NAME, USER_DOC_TYPE, "broken", source, true)
        .await
        .unwrap();

    assert!(store.get_user("broken").await.unwrap().is_none());

    let users = store.get_users(&[]).await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].username, "alice");
}

#[test]
fn test_verify_password() {
    let (store, _docs, _realm) = async_std::task::block_on(async {
        let (store, docs, realm) = started_store().await;
        let hash = bcrypt::hash("s3cr3t", 4).unwrap();
        store
            .put_user(put_request("alice", &hash, &["admin"]))
            .await
            .unwrap();
        (store, docs, realm)
    });

    let user = store.verify_password("alice", "s3cr3t").unwrap();
    assert_eq!(user.username, "alice");
    assert_eq!(user.roles, vec!["admin"]);

    assert!(store.verify_password("alice", "wrong").is_none());
    assert!(store.verify_password("missing", "s3cr3t").is_none());
}

#[test]
fn test_get_user_blocking() {
    let store = async_std::task::block_on(async {
        let (store, _docs, _realm) = started_store().await;
        store
            .put_user(put_request("alice", "H1", &["admin"]))
            .await
            .unwrap();
        store
    });

    let user = store.get_user_blocking("alice").unwrap();
    assert_eq!(user.roles, vec!["admin"]);
    assert!(store.get_user_blocking("bob").is_none());
}
