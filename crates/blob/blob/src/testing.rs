use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::BlobError;
use crate::store::{BlobStore, ProgressFn};
use crate::types::{TransferProgress, UploadMetadata};

/// Run the full blob store conformance test suite.
///
/// Call this from your backend's test module with a fresh store instance.
///
/// # Errors
///
/// Returns an error if any conformance test fails.
pub async fn run_blob_conformance_tests(store: &dyn BlobStore) -> Result<(), BlobError> {
    test_put_and_metadata(store).await?;
    test_url(store).await?;
    test_missing_blob(store).await?;
    test_delete(store).await?;
    test_list_hierarchy(store).await?;
    test_list_missing_prefix(store).await?;
    test_invalid_path(store).await?;
    test_progress(store).await?;
    Ok(())
}

async fn test_put_and_metadata(store: &dyn BlobStore) -> Result<(), BlobError> {
    let path = "conf/put/1_report.pdf";
    let stored = store
        .put(
            path,
            Bytes::from_static(b"%PDF-1.7 body"),
            UploadMetadata::new("report.pdf", "application/pdf").with_custom("owner", "u1"),
            None,
        )
        .await?;
    assert_eq!(stored.path, path);
    assert_eq!(stored.size_bytes, 13);
    assert!(!stored.url.is_empty(), "stored blob should carry a url");

    let meta = store.metadata(path).await?;
    assert_eq!(meta.path, path);
    assert_eq!(meta.size_bytes, 13);
    assert_eq!(meta.file_name, "report.pdf");
    assert_eq!(meta.content_type, "application/pdf");
    assert_eq!(meta.custom.get("owner").map(String::as_str), Some("u1"));
    Ok(())
}

async fn test_url(store: &dyn BlobStore) -> Result<(), BlobError> {
    let path = "conf/url/a.txt";
    let stored = store
        .put(path, Bytes::from_static(b"a"), UploadMetadata::new("a.txt", "text/plain"), None)
        .await?;
    let url = store.url(path).await?;
    assert_eq!(url, stored.url, "url should match the one returned by put");
    Ok(())
}

async fn test_missing_blob(store: &dyn BlobStore) -> Result<(), BlobError> {
    let result = store.metadata("conf/missing/nothing.bin").await;
    assert!(
        matches!(result, Err(ref e) if e.is_not_found()),
        "metadata on missing blob should be NotFound"
    );
    let result = store.url("conf/missing/nothing.bin").await;
    assert!(
        matches!(result, Err(ref e) if e.is_not_found()),
        "url on missing blob should be NotFound"
    );
    Ok(())
}

async fn test_delete(store: &dyn BlobStore) -> Result<(), BlobError> {
    let path = "conf/delete/gone.txt";
    store
        .put(path, Bytes::from_static(b"bye"), UploadMetadata::new("gone.txt", "text/plain"), None)
        .await?;
    store.delete(path).await?;
    assert!(store.metadata(path).await.is_err(), "blob should be gone");
    let again = store.delete(path).await;
    assert!(
        matches!(again, Err(ref e) if e.is_not_found()),
        "second delete should be NotFound"
    );
    Ok(())
}

async fn test_list_hierarchy(store: &dyn BlobStore) -> Result<(), BlobError> {
    for (path, body) in [
        ("conf/tree/top.txt", &b"12"[..]),
        ("conf/tree/notes/n1/1_a.txt", &b"123"[..]),
        ("conf/tree/notes/n2/2_b.txt", &b"1234"[..]),
        ("conf/tree/tasks/t1/3_c.txt", &b"1"[..]),
    ] {
        store
            .put(
                path,
                Bytes::copy_from_slice(body),
                UploadMetadata::new("f", "text/plain"),
                None,
            )
            .await?;
    }

    let root = store.list("conf/tree").await?;
    assert_eq!(root.items.len(), 1);
    assert_eq!(root.items[0].name, "top.txt");
    assert_eq!(root.items[0].path, "conf/tree/top.txt");
    assert_eq!(root.items[0].size_bytes, 2);
    let mut subfolders = root.subfolders.clone();
    subfolders.sort();
    assert_eq!(subfolders, ["conf/tree/notes", "conf/tree/tasks"]);

    let notes = store.list("conf/tree/notes").await?;
    assert!(notes.items.is_empty());
    assert_eq!(notes.subfolders.len(), 2);

    let n1 = store.list("conf/tree/notes/n1").await?;
    assert_eq!(n1.item_bytes(), 3);

    // A prefix must match whole segments.
    let partial = store.list("conf/tree/no").await?;
    assert!(partial.is_empty(), "partial segment prefix should be empty");
    Ok(())
}

async fn test_list_missing_prefix(store: &dyn BlobStore) -> Result<(), BlobError> {
    let listing = store.list("conf/nobody-here").await?;
    assert!(listing.is_empty(), "missing prefix should list empty");
    Ok(())
}

async fn test_invalid_path(store: &dyn BlobStore) -> Result<(), BlobError> {
    let result = store
        .put(
            "conf/../escape",
            Bytes::new(),
            UploadMetadata::new("escape", "text/plain"),
            None,
        )
        .await;
    assert!(
        matches!(result, Err(BlobError::InvalidPath(_))),
        "dot-dot segment should be rejected"
    );
    Ok(())
}

async fn test_progress(store: &dyn BlobStore) -> Result<(), BlobError> {
    let log: Arc<Mutex<Vec<TransferProgress>>> = Arc::default();
    let sink = Arc::clone(&log);
    let callback: &ProgressFn<'_> = &move |p: TransferProgress| sink.lock().push(p);
    let body = Bytes::from(vec![7u8; 300 * 1024]);
    store
        .put(
            "conf/progress/big.bin",
            body,
            UploadMetadata::new("big.bin", "application/octet-stream"),
            Some(callback),
        )
        .await?;

    let events = log.lock().clone();
    if let Some(last) = events.last() {
        assert_eq!(last.transferred_bytes, 300 * 1024, "last event should be complete");
        assert_eq!(last.total_bytes, 300 * 1024);
    }
    assert!(
        events
            .windows(2)
            .all(|w| w[0].transferred_bytes <= w[1].transferred_bytes),
        "progress should be monotonic"
    );
    Ok(())
}
