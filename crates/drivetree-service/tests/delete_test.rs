//! Recursive delete, with and without injected failures.

mod helpers;

use drivetree_core::error::ErrorKind;
use drivetree_entity::node::Node;

/// Root folder with two subfolders holding three files, plus an empty folder.
///
/// ```text
/// root/
///   docs/   a.txt  b.txt
///   media/  c.bin
///   empty/
/// ```
async fn sample(app: &helpers::TestApp) -> (Node, Vec<Node>) {
    let root = app.folder(None, "root").await;
    let docs = app.folder(Some(root.id), "docs").await;
    let media = app.folder(Some(root.id), "media").await;
    let empty = app.folder(Some(root.id), "empty").await;
    let a = app.file(Some(docs.id), "a.txt", "a").await;
    let b = app.file(Some(docs.id), "b.txt", "b").await;
    let c = app.file(Some(media.id), "c.bin", "c").await;
    (root, vec![docs, media, empty, a, b, c])
}

#[tokio::test]
async fn test_delete_folder_removes_every_descendant() {
    let app = helpers::TestApp::new();
    let (root, descendants) = sample(&app).await;
    let keep = app.folder(None, "keep").await;

    let report = app.service.delete(root.id, app.user).await.unwrap();

    assert_eq!(report.removed, descendants.len() + 1);
    assert_eq!(report.retained, 0);
    assert_eq!(report.blob_attempts, 3);
    assert_eq!(app.blobs.delete_attempts(), 3);
    assert!(app.blobs.is_empty());
    assert_eq!(app.repo.len(), 1);
    assert_eq!(app.service.get(keep.id).await.unwrap().name, "keep");
    assert_eq!(app.locks.held_keys(), 0);
}

#[tokio::test]
async fn test_delete_single_file() {
    let app = helpers::TestApp::new();
    let f = app.file(None, "f", "x").await;

    let report = app.service.delete(f.id, app.user).await.unwrap();
    assert_eq!(report.removed, 1);
    assert_eq!(report.blob_attempts, 1);
    assert!(app.repo.is_empty());
    assert_eq!(
        app.service.get(f.id).await.unwrap_err().kind,
        ErrorKind::NotFound
    );
}

#[tokio::test]
async fn test_blob_failure_leaves_orphan_after_records_are_gone() {
    let app = helpers::TestApp::new();
    let (root, nodes) = sample(&app).await;
    let a = &nodes[3];
    let a_key = a.storage_key.clone().unwrap();
    app.blobs.fail_delete_of(a_key.clone());

    let err = app.service.delete(root.id, app.user).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Storage);
    assert!(err.message.contains("1 blob"), "{}", err.message);

    // Every record went; every blob deletion was still attempted.
    assert!(app.repo.is_empty());
    assert_eq!(app.blobs.delete_attempts(), 3);
    assert!(app.blobs.contains(&a_key));
    assert_eq!(app.blobs.len(), 1);
    assert_eq!(app.locks.held_keys(), 0);
}

#[tokio::test]
async fn test_file_record_failure_keeps_its_chain_and_content() {
    let app = helpers::TestApp::new();
    let (root, nodes) = sample(&app).await;
    let (docs, media, empty, a, b, c) = (
        &nodes[0], &nodes[1], &nodes[2], &nodes[3], &nodes[4], &nodes[5],
    );
    app.repo.fail_writes_for(c.id);

    let err = app.service.delete(root.id, app.user).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Database);
    assert!(err.message.contains("3 kept"), "{}", err.message);

    // c.bin, media and root stay; siblings are gone.
    for kept in [&root, media, c] {
        assert!(app.service.get(kept.id).await.is_ok(), "{} kept", kept.name);
    }
    for gone in [docs, empty, a, b] {
        assert_eq!(
            app.service.get(gone.id).await.unwrap_err().kind,
            ErrorKind::NotFound,
            "{} removed",
            gone.name
        );
    }
    assert_eq!(app.repo.len(), 3);

    // Only removed files lost their blobs; the kept file is intact.
    assert_eq!(app.blobs.delete_attempts(), 2);
    assert_eq!(app.read(c.id).await.unwrap(), b"c");
    app.assert_files_readable().await;
    app.assert_forest();
    assert_eq!(app.locks.held_keys(), 0);

    app.repo.clear_failures();
    app.service.delete(root.id, app.user).await.unwrap();
    assert!(app.repo.is_empty());
    assert!(app.blobs.is_empty());
}

#[tokio::test]
async fn test_folder_record_failure_never_strands_a_file() {
    let app = helpers::TestApp::new();
    let (root, nodes) = sample(&app).await;
    let (media, c) = (&nodes[1], &nodes[5]);
    app.repo.fail_writes_for(media.id);

    let err = app.service.delete(root.id, app.user).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Database);
    assert!(err.message.contains("2 kept"), "{}", err.message);

    // media and root stay as empty folders; c.bin is gone with its blob.
    assert!(app.service.get(media.id).await.is_ok());
    assert!(app.service.get(root.id).await.is_ok());
    assert_eq!(
        app.service.get(c.id).await.unwrap_err().kind,
        ErrorKind::NotFound
    );
    assert_eq!(app.repo.len(), 2);
    assert!(app.blobs.is_empty());
    app.assert_files_readable().await;
    app.assert_forest();
}

#[tokio::test]
async fn test_failed_commit_deletes_no_blob() {
    let app = helpers::TestApp::new();
    let (root, _) = sample(&app).await;
    app.repo.fail_commits(true);

    let err = app.service.delete(root.id, app.user).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Database);
    assert_eq!(app.repo.len(), 7);
    assert_eq!(app.blobs.delete_attempts(), 0);
    assert_eq!(app.blobs.len(), 3);
    app.assert_files_readable().await;
    assert_eq!(app.locks.held_keys(), 0);
}

#[tokio::test]
async fn test_delete_missing_node() {
    let app = helpers::TestApp::new();
    let err = app
        .service
        .delete(drivetree_core::types::id::NodeId::new(), app.user)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}
