//! Engine behaviour under concurrent callers.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use drivetree_core::error::ErrorKind;
use drivetree_database::store::NodeStore;
use drivetree_lock::keys;
use drivetree_service::{LockPlan, UploadRequest};
use drivetree_storage::providers::MemoryBlobStore;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_create_has_one_winner() {
    let app = Arc::new(helpers::TestApp::new());
    let parent_id = app.folder(None, "shared").await.id;

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let app = app.clone();
            tokio::spawn(async move {
                app.service
                    .create_folder(Some(parent_id), "same", app.user)
                    .await
            })
        })
        .collect();

    let mut wins = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => wins += 1,
            Err(e) => assert_eq!(e.kind, ErrorKind::Conflict),
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(app.child_names(Some(parent_id)).await, ["same"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_create_waits_for_held_parent_lock() {
    let app = Arc::new(helpers::TestApp::new());
    let parent_id = app.folder(None, "shared").await.id;

    let mut held = app
        .service
        .coordinator()
        .acquire_exclusive(LockPlan::new().then([keys::node(parent_id)]))
        .await
        .unwrap();

    let creator = {
        let app = app.clone();
        tokio::spawn(async move {
            app.service
                .create_folder(Some(parent_id), "x", app.user)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!creator.is_finished());
    assert!(app.child_names(Some(parent_id)).await.is_empty());

    held.release().await.unwrap();
    creator.await.unwrap().unwrap();
    assert_eq!(app.child_names(Some(parent_id)).await, ["x"]);
    assert_eq!(app.locks.held_keys(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_root_level_create_waits_for_root_lock() {
    let app = Arc::new(helpers::TestApp::new());

    let mut held = app
        .service
        .coordinator()
        .acquire_exclusive(LockPlan::new().with_root_namespace())
        .await
        .unwrap();

    let creator = {
        let app = app.clone();
        tokio::spawn(async move { app.service.create_folder(None, "top", app.user).await })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!creator.is_finished());
    assert!(app.repo.is_empty());

    held.release().await.unwrap();
    creator.await.unwrap().unwrap();
    assert_eq!(app.child_names(None).await, ["top"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_root_level_uploads_have_one_winner() {
    let app = Arc::new(helpers::TestApp::new());

    let tasks: Vec<_> = (0..12)
        .map(|i| {
            let app = app.clone();
            tokio::spawn(async move {
                app.service
                    .upload(
                        UploadRequest::new(None, "report.pdf", format!("v{i}").into_bytes()),
                        app.user,
                    )
                    .await
            })
        })
        .collect();

    let mut wins = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => wins += 1,
            Err(e) => assert_eq!(e.kind, ErrorKind::Conflict),
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(app.repo.len(), 1);
    // Losers wrote their blobs before losing the name.
    assert_eq!(app.blobs.len(), 12);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_renames_to_one_name() {
    let app = Arc::new(helpers::TestApp::new());
    let dir = app.folder(None, "dir").await;
    let mut ids = Vec::new();
    for i in 0..8 {
        ids.push(app.file(Some(dir.id), &format!("f{i}"), "x").await.id);
    }

    let tasks: Vec<_> = ids
        .into_iter()
        .map(|id| {
            let app = app.clone();
            tokio::spawn(async move { app.service.rename(id, "final", app.user).await })
        })
        .collect();

    let mut wins = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => wins += 1,
            Err(e) => assert_eq!(e.kind, ErrorKind::Conflict),
        }
    }
    assert_eq!(wins, 1);
    app.assert_unique_names();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_random_moves_never_create_cycles() {
    let app = Arc::new(helpers::TestApp::new());
    let mut folders = Vec::new();
    for i in 0..6 {
        folders.push(app.folder(None, &format!("d{i}")).await.id);
    }
    let folders = Arc::new(folders);

    let tasks: Vec<_> = (0..8)
        .map(|worker| {
            let app = app.clone();
            let folders = folders.clone();
            tokio::spawn(async move {
                let n = folders.len();
                let mut seed = worker as usize * 7 + 1;
                for _ in 0..25 {
                    seed = (seed * 31 + 17) % 1009;
                    let src = folders[seed % n];
                    let dest = match seed % 5 {
                        0 => None,
                        _ => Some(folders[(seed / n) % n]),
                    };
                    match app.service.move_node(src, dest, app.user).await {
                        Ok(_) => {}
                        Err(e) => assert!(
                            matches!(
                                e.kind,
                                ErrorKind::Conflict | ErrorKind::LockTimeout
                            ),
                            "unexpected {e}"
                        ),
                    }
                }
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }
    app.assert_forest();
    app.assert_unique_names();
    assert_eq!(app.locks.held_keys(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_download_finishes_before_delete() {
    let blobs = MemoryBlobStore::new().with_chunk_delay(Duration::from_millis(10));
    let app = Arc::new(helpers::TestApp::with_blobs(blobs));
    let content = "0123456789abcdef0123456789abcdef";
    let dir_id = app.folder(None, "dir").await.id;
    let file_id = app.file(Some(dir_id), "big.bin", content).await.id;

    let reader = {
        let app = app.clone();
        tokio::spawn(async move { app.read(file_id).await })
    };
    // Let the download take its shared lock and start streaming.
    tokio::time::sleep(Duration::from_millis(25)).await;
    let deleter = {
        let app = app.clone();
        tokio::spawn(async move { app.service.delete(dir_id, app.user).await })
    };

    let read = reader.await.unwrap().unwrap();
    assert_eq!(read, content.as_bytes());
    let report = deleter.await.unwrap().unwrap();
    assert_eq!(report.removed, 2);

    assert_eq!(app.read(file_id).await.unwrap_err().kind, ErrorKind::NotFound);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_download_and_delete_never_yield_partial_content() {
    let blobs = MemoryBlobStore::new().with_chunk_delay(Duration::from_millis(2));
    let app = Arc::new(helpers::TestApp::with_blobs(blobs));
    let content = "the quick brown fox jumps over the lazy dog";

    for round in 0..5 {
        let file_id = app.file(None, &format!("f{round}"), content).await.id;
        let reader = {
            let app = app.clone();
            tokio::spawn(async move { app.read(file_id).await })
        };
        let deleter = {
            let app = app.clone();
            tokio::spawn(async move { app.service.delete(file_id, app.user).await })
        };

        match reader.await.unwrap() {
            Ok(bytes) => assert_eq!(bytes, content.as_bytes()),
            Err(e) => assert_eq!(e.kind, ErrorKind::NotFound),
        }
        deleter.await.unwrap().unwrap();
    }
    assert!(app.blobs.is_empty());
}

#[tokio::test]
async fn test_held_lock_times_out_without_mutation() {
    let mut config = helpers::test_config();
    config.lock.acquire_timeout_ms = 100;
    config.lock.attempt_wait_ms = 10;
    let app = helpers::TestApp::with_config(config);
    let a = app.folder(None, "A").await;

    let mut held = app
        .service
        .coordinator()
        .acquire_shared(LockPlan::new().then([keys::node(a.id)]))
        .await
        .unwrap();

    let err = app.service.create_folder(Some(a.id), "child", app.user).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::LockTimeout);
    assert!(err.is_retryable());
    assert!(app.child_names(Some(a.id)).await.is_empty());

    // Readers still share.
    app.service.list_children(Some(a.id)).await.unwrap();
    let mut other = app
        .service
        .coordinator()
        .acquire_shared(LockPlan::new().then([keys::node(a.id)]))
        .await
        .unwrap();
    other.release().await.unwrap();

    held.release().await.unwrap();
    app.service.create_folder(Some(a.id), "child", app.user).await.unwrap();
    assert_eq!(app.locks.held_keys(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_disjoint_subtrees_proceed_in_parallel() {
    let app = Arc::new(helpers::TestApp::new());
    let left = app.folder(None, "left").await;
    let right = app.folder(None, "right").await;

    let mut held = app
        .service
        .coordinator()
        .acquire_exclusive(LockPlan::new().then([keys::node(left.id)]))
        .await
        .unwrap();

    // Work under `right` does not wait for `left`.
    let started = std::time::Instant::now();
    for i in 0..5 {
        app.folder(Some(right.id), &format!("r{i}")).await;
    }
    assert!(started.elapsed() < Duration::from_secs(2));
    held.release().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_tree_changing_under_every_attempt_is_retryable() {
    let mut config = helpers::test_config();
    config.tree.max_plan_attempts = 1;
    let app = Arc::new(helpers::TestApp::with_config(config));
    let a = app.folder(None, "a").await;
    let f = app.folder(None, "f").await;

    let mut held = app
        .service
        .coordinator()
        .acquire_exclusive(LockPlan::new().then([keys::node(a.id)]))
        .await
        .unwrap();

    let renamer = {
        let app = app.clone();
        tokio::spawn(async move { app.service.rename(a.id, "z", app.user).await })
    };
    // Let the rename plan against the root level and block on `a`.
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Move `a` behind the engine's back so its namespace no longer matches.
    let mut tx = app.repo.begin().await.unwrap();
    let mut moved = tx.get(a.id).await.unwrap().unwrap();
    moved.parent_id = Some(f.id);
    tx.update(&moved).await.unwrap();
    tx.commit().await.unwrap();

    held.release().await.unwrap();

    let err = renamer.await.unwrap().unwrap_err();
    assert_eq!(err.kind, ErrorKind::LockTimeout);
    assert!(err.is_retryable());
    assert_eq!(app.service.get(a.id).await.unwrap().name, "a");
    assert_eq!(app.locks.held_keys(), 0);
}
