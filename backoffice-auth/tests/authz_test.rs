//! Authorization context integration tests

mod common;

use backoffice_api::{Method, ME_PATH, PERMISSIONS_PATH};
use backoffice_auth::SessionManager;
use common::*;

#[tokio::test]
async fn context_load_is_single_flight() {
    let mock = MockTransport::new();
    script_context(&mock, &["editor"], serde_json::json!(["product.view"]));
    mock.delay(Method::Get, ME_PATH, 50);

    let session = SessionManager::new(test_config(), mock.clone()).unwrap();
    let authz = session.authz();

    let (a, b, c) = tokio::join!(authz.load(false), authz.load(false), authz.load(false));
    a.unwrap();
    b.unwrap();
    c.unwrap();

    assert_eq!(mock.call_count(Method::Get, ME_PATH), 1);
    assert_eq!(mock.call_count(Method::Get, PERMISSIONS_PATH), 1);

    let state = authz.snapshot();
    assert!(state.loaded);
    assert_eq!(state.roles, vec!["editor"]);
    assert_eq!(state.permissions, vec!["product.view"]);
    assert!(authz.can("product.view"));
    assert!(!authz.can("product.create"));
}

#[tokio::test]
async fn loaded_context_is_reused_unless_forced() {
    let mock = MockTransport::new();
    script_context(&mock, &["editor"], serde_json::json!(["product.view"]));

    let session = SessionManager::new(test_config(), mock.clone()).unwrap();
    let authz = session.authz();

    authz.load(false).await.unwrap();
    authz.load(false).await.unwrap();
    assert_eq!(mock.call_count(Method::Get, ME_PATH), 1);

    script_context(&mock, &["editor", "admin"], serde_json::json!([]));
    authz.load(true).await.unwrap();
    assert_eq!(mock.call_count(Method::Get, ME_PATH), 2);
    assert!(authz.snapshot().is_admin());
    // Admin short-circuits resolution even with an empty tree.
    assert!(authz.can("anything.at.all"));
}

#[tokio::test]
async fn reset_discards_an_inflight_context_load() {
    let mock = MockTransport::new();
    script_context(&mock, &["admin"], serde_json::json!(["product.create"]));
    mock.delay(Method::Get, ME_PATH, 100);

    let session = SessionManager::new(test_config(), mock.clone()).unwrap();
    let authz = session.authz().clone();

    let pending = {
        let authz = authz.clone();
        tokio::spawn(async move { authz.load(true).await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    authz.reset().await;

    // The fetch settles after the reset; its result must not re-populate
    // the state that was just torn down.
    assert!(pending.await.unwrap().is_err());
    let state = authz.snapshot();
    assert!(!state.loaded);
    assert!(state.roles.is_empty());
    assert!(!authz.can("product.create"));
}

#[tokio::test]
async fn bare_permission_payloads_are_accepted() {
    let mock = MockTransport::new();
    mock.respond(
        Method::Get,
        ME_PATH,
        200,
        serde_json::json!({"user": user_body(&[])}),
    );
    // No envelope, just the list.
    mock.respond(
        Method::Get,
        PERMISSIONS_PATH,
        200,
        serde_json::json!(["reports:export"]),
    );

    let session = SessionManager::new(test_config(), mock.clone()).unwrap();
    let authz = session.authz();
    authz.load(true).await.unwrap();

    assert!(authz.can("reports.export"));
    assert!(authz.can("reports:export"));
}

#[tokio::test]
async fn nested_permission_payloads_normalize() {
    let mock = MockTransport::new();
    script_context(
        &mock,
        &[],
        serde_json::json!({
            "product": {"allow": true, "create": true, "delete": false},
            "billing": true,
        }),
    );

    let session = SessionManager::new(test_config(), mock.clone()).unwrap();
    let authz = session.authz();
    authz.load(true).await.unwrap();

    assert!(authz.can("product"));
    assert!(authz.can("product.create"));
    assert!(!authz.can("product.delete"));
    assert!(authz.can("billing"));
    assert!(!authz.can("missing.entirely"));
    assert!(authz.can_with("missing.entirely", true));

    let state = authz.snapshot();
    assert!(state.permissions.contains(&"billing".to_string()));
    assert!(state.permissions.contains(&"product.create".to_string()));
}
