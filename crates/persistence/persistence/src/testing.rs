use serde_json::{Value, json};

use crate::collection::{Collection, Document};
use crate::error::PersistenceError;
use crate::gateway::PersistenceGateway;
use crate::query::{Filter, FilterOp, Order};

fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

/// Run the full persistence gateway conformance test suite.
///
/// Call this from your backend's test module with a fresh gateway instance.
///
/// # Errors
///
/// Returns an error if any conformance test fails.
pub async fn run_gateway_conformance_tests(
    gateway: &dyn PersistenceGateway,
) -> Result<(), PersistenceError> {
    test_get_missing(gateway).await?;
    test_create_and_get(gateway).await?;
    test_create_generates_id(gateway).await?;
    test_create_conflict(gateway).await?;
    test_update_merges(gateway).await?;
    test_update_missing(gateway).await?;
    test_delete(gateway).await?;
    test_query_filters_and_order(gateway).await?;
    test_array_union_is_idempotent(gateway).await?;
    test_array_remove(gateway).await?;
    Ok(())
}

async fn test_get_missing(gateway: &dyn PersistenceGateway) -> Result<(), PersistenceError> {
    let record = gateway.get(Collection::Notes, "missing").await?;
    assert!(record.is_none(), "get on missing record should return None");
    Ok(())
}

async fn test_create_and_get(gateway: &dyn PersistenceGateway) -> Result<(), PersistenceError> {
    let id = gateway
        .create(Collection::Notes, Some("note-1"), doc(json!({"title": "hello"})))
        .await?;
    assert_eq!(id, "note-1");
    let record = gateway.get(Collection::Notes, "note-1").await?;
    let record = record.ok_or_else(|| crate::gateway::not_found(Collection::Notes, "note-1"))?;
    assert_eq!(record.data.get("title"), Some(&json!("hello")));

    // Collections are isolated.
    let other = gateway.get(Collection::Tasks, "note-1").await?;
    assert!(other.is_none(), "records must not leak across collections");
    Ok(())
}

async fn test_create_generates_id(
    gateway: &dyn PersistenceGateway,
) -> Result<(), PersistenceError> {
    let a = gateway
        .create(Collection::Tasks, None, doc(json!({"title": "a"})))
        .await?;
    let b = gateway
        .create(Collection::Tasks, None, doc(json!({"title": "b"})))
        .await?;
    assert!(!a.is_empty(), "generated id should not be empty");
    assert_ne!(a, b, "generated ids should be unique");
    assert!(gateway.get(Collection::Tasks, &a).await?.is_some());
    Ok(())
}

async fn test_create_conflict(gateway: &dyn PersistenceGateway) -> Result<(), PersistenceError> {
    gateway
        .create(Collection::Notes, Some("dup"), doc(json!({"v": 1})))
        .await?;
    let result = gateway
        .create(Collection::Notes, Some("dup"), doc(json!({"v": 2})))
        .await;
    assert!(
        matches!(result, Err(PersistenceError::Conflict { .. })),
        "create with an existing id should conflict"
    );
    let record = gateway.get(Collection::Notes, "dup").await?;
    assert_eq!(
        record.and_then(|r| r.data.get("v").cloned()),
        Some(json!(1)),
        "original record should remain"
    );
    Ok(())
}

async fn test_update_merges(gateway: &dyn PersistenceGateway) -> Result<(), PersistenceError> {
    gateway
        .create(
            Collection::UserProfiles,
            Some("u-merge"),
            doc(json!({"displayName": "Ada", "isPro": false, "note": "keep"})),
        )
        .await?;
    gateway
        .update(
            Collection::UserProfiles,
            "u-merge",
            doc(json!({"isPro": true, "note": null})),
        )
        .await?;
    let record = gateway
        .get(Collection::UserProfiles, "u-merge")
        .await?
        .ok_or_else(|| crate::gateway::not_found(Collection::UserProfiles, "u-merge"))?;
    assert_eq!(record.data.get("displayName"), Some(&json!("Ada")));
    assert_eq!(record.data.get("isPro"), Some(&json!(true)));
    assert_eq!(
        record.data.get("note"),
        Some(&Value::Null),
        "null should overwrite the field"
    );
    Ok(())
}

async fn test_update_missing(gateway: &dyn PersistenceGateway) -> Result<(), PersistenceError> {
    let result = gateway
        .update(Collection::Notes, "never-created", doc(json!({"a": 1})))
        .await;
    assert!(
        matches!(result, Err(ref e) if e.is_not_found()),
        "update on missing record should be NotFound"
    );
    Ok(())
}

async fn test_delete(gateway: &dyn PersistenceGateway) -> Result<(), PersistenceError> {
    gateway
        .create(Collection::ChatMessages, Some("bye"), doc(json!({})))
        .await?;
    let existed = gateway.delete(Collection::ChatMessages, "bye").await?;
    assert!(existed, "delete should return true for existing record");
    assert!(gateway.get(Collection::ChatMessages, "bye").await?.is_none());
    let existed = gateway.delete(Collection::ChatMessages, "bye").await?;
    assert!(!existed, "delete on missing record should return false");
    Ok(())
}

async fn test_query_filters_and_order(
    gateway: &dyn PersistenceGateway,
) -> Result<(), PersistenceError> {
    for (id, user, role, at) in [
        ("m1", "qa", "user", "2026-03-01T08:00:00Z"),
        ("m2", "qa", "assistant", "2026-03-01T08:00:01Z"),
        ("m3", "qa", "user", "2026-03-01T09:30:00Z"),
        ("m4", "qb", "user", "2026-03-01T10:00:00Z"),
        ("m5", "qa", "user", "2026-02-28T23:59:59Z"),
    ] {
        gateway
            .create(
                Collection::ChatMessages,
                Some(id),
                doc(json!({"userId": user, "role": role, "createdAt": at})),
            )
            .await?;
    }

    let filters = [
        Filter::eq("userId", "qa"),
        Filter::eq("role", "user"),
        Filter::gte("createdAt", "2026-03-01T00:00:00Z"),
    ];
    let records = gateway
        .query(
            Collection::ChatMessages,
            &filters,
            Some(&Order::desc("createdAt")),
            None,
        )
        .await?;
    let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, ["m3", "m1"]);

    let limited = gateway
        .query(
            Collection::ChatMessages,
            &[Filter::new("role", FilterOp::Ne, "assistant")],
            Some(&Order::asc("createdAt")),
            Some(2),
        )
        .await?;
    let ids: Vec<&str> = limited.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, ["m5", "m1"]);
    Ok(())
}

async fn test_array_union_is_idempotent(
    gateway: &dyn PersistenceGateway,
) -> Result<(), PersistenceError> {
    gateway
        .create(Collection::Notes, Some("with-files"), doc(json!({"title": "t"})))
        .await?;
    let item = json!({"storagePath": "users/u/notes/with-files/1_a.txt"});

    let changed = gateway
        .array_union(Collection::Notes, "with-files", "attachments", item.clone())
        .await?;
    assert!(changed, "first union should change the array");
    let changed = gateway
        .array_union(Collection::Notes, "with-files", "attachments", item.clone())
        .await?;
    assert!(!changed, "second union of the same value should be a no-op");

    let other = json!({"storagePath": "users/u/notes/with-files/2_b.txt"});
    gateway
        .array_union(Collection::Notes, "with-files", "attachments", other.clone())
        .await?;

    let record = gateway
        .get(Collection::Notes, "with-files")
        .await?
        .ok_or_else(|| crate::gateway::not_found(Collection::Notes, "with-files"))?;
    assert_eq!(record.data.get("attachments"), Some(&json!([item, other])));
    assert_eq!(record.data.get("title"), Some(&json!("t")));

    let result = gateway
        .array_union(Collection::Notes, "no-such-note", "attachments", json!(1))
        .await;
    assert!(
        matches!(result, Err(ref e) if e.is_not_found()),
        "union on missing record should be NotFound"
    );
    Ok(())
}

async fn test_array_remove(gateway: &dyn PersistenceGateway) -> Result<(), PersistenceError> {
    gateway
        .create(
            Collection::Tasks,
            Some("task-arr"),
            doc(json!({"attachments": [1, 2, 3]})),
        )
        .await?;
    let changed = gateway
        .array_remove(Collection::Tasks, "task-arr", "attachments", &json!(2))
        .await?;
    assert!(changed);
    let changed = gateway
        .array_remove(Collection::Tasks, "task-arr", "attachments", &json!(2))
        .await?;
    assert!(!changed, "removing an absent value should be a no-op");
    let record = gateway
        .get(Collection::Tasks, "task-arr")
        .await?
        .ok_or_else(|| crate::gateway::not_found(Collection::Tasks, "task-arr"))?;
    assert_eq!(record.data.get("attachments"), Some(&json!([1, 3])));
    Ok(())
}
