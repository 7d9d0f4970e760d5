//! Integration tests for the watch pipeline: initial snapshots, the
//! initial-events-end bookmark, event ordering and classification,
//! resumption, expiry against the compaction watermark, filtering, and
//! shutdown behavior.

mod common;

use std::time::Duration;

use common::{memory_factory, memory_factory_with, rv, widget, Widget};

use relstore_core::selector::FieldSelector;
use relstore_core::{DeleteOptions, ListOptions, Object, WatchEvent};
use relstore_storage::{FactoryConfig, WatchConfig, Watcher};

async fn next(watcher: &mut Watcher<Widget>) -> WatchEvent<Widget> {
    tokio::time::timeout(Duration::from_secs(5), watcher.recv())
        .await
        .expect("event within deadline")
        .expect("stream open")
}

fn initial_opts() -> ListOptions {
    ListOptions {
        send_initial_events: Some(true),
        allow_watch_bookmarks: true,
        ..Default::default()
    }
}

#[tokio::test]
async fn initial_events_end_with_a_bookmark() {
    let factory = memory_factory().await;
    let store = factory.store::<Widget>().await.unwrap();

    let created = store.create(&widget("default", "w1", "blue")).await.unwrap();

    let mut watcher = store.watch("default", &initial_opts()).await.unwrap();
    match next(&mut watcher).await {
        WatchEvent::Added(obj) => assert_eq!(obj, created),
        other => panic!("expected ADDED, got {}", other.type_str()),
    }
    match next(&mut watcher).await {
        WatchEvent::Bookmark {
            resource_version,
            initial_events_end,
        } => {
            assert_eq!(resource_version, rv(&created));
            assert!(initial_events_end);
        }
        other => panic!("expected BOOKMARK, got {}", other.type_str()),
    }

    // Change events stream after the snapshot terminator.
    let second = store.create(&widget("default", "w2", "red")).await.unwrap();
    match next(&mut watcher).await {
        WatchEvent::Added(obj) => assert_eq!(obj, second),
        other => panic!("expected ADDED, got {}", other.type_str()),
    }
    factory.destroy().await;
}

#[tokio::test]
async fn initial_snapshot_skips_tombstones() {
    let factory = memory_factory().await;
    let store = factory.store::<Widget>().await.unwrap();

    store.create(&widget("default", "w1", "blue")).await.unwrap();
    store.create(&widget("default", "w2", "blue")).await.unwrap();
    store
        .delete("default", "w2", &DeleteOptions::default())
        .await
        .unwrap();

    let mut watcher = store.watch("default", &initial_opts()).await.unwrap();
    match next(&mut watcher).await {
        WatchEvent::Added(obj) => assert_eq!(obj.name(), "w1"),
        other => panic!("expected ADDED, got {}", other.type_str()),
    }
    match next(&mut watcher).await {
        WatchEvent::Bookmark {
            initial_events_end, ..
        } => assert!(initial_events_end),
        other => panic!("expected BOOKMARK, got {}", other.type_str()),
    }
    factory.destroy().await;
}

#[tokio::test]
async fn initial_events_snapshot_at_the_requested_revision() {
    let factory = memory_factory().await;
    let store = factory.store::<Widget>().await.unwrap();

    let w1 = store.create(&widget("default", "w1", "blue")).await.unwrap();
    let w2 = store.create(&widget("default", "w2", "red")).await.unwrap();

    // Asking for initial events at w1's revision yields the state as of
    // then, with everything later arriving as change events.
    let mut watcher = store
        .watch(
            "default",
            &ListOptions {
                resource_version: w1.metadata.resource_version.clone(),
                send_initial_events: Some(true),
                allow_watch_bookmarks: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    match next(&mut watcher).await {
        WatchEvent::Added(obj) => assert_eq!(obj, w1),
        other => panic!("expected ADDED, got {}", other.type_str()),
    }
    match next(&mut watcher).await {
        WatchEvent::Bookmark {
            resource_version,
            initial_events_end,
        } => {
            assert_eq!(resource_version, rv(&w1));
            assert!(initial_events_end);
        }
        other => panic!("expected BOOKMARK, got {}", other.type_str()),
    }
    match next(&mut watcher).await {
        WatchEvent::Added(obj) => assert_eq!(obj, w2),
        other => panic!("expected ADDED, got {}", other.type_str()),
    }
    factory.destroy().await;
}

#[tokio::test]
async fn initial_events_below_the_watermark_are_expired() {
    let factory = memory_factory().await;
    let store = factory.store::<Widget>().await.unwrap();

    let w1 = store.create(&widget("default", "w1", "blue")).await.unwrap();
    let mut obj = w1.clone();
    obj.spec.color = "red".to_string();
    store.update(&obj).await.unwrap();
    let outcome = store.compact().await.unwrap();
    assert_eq!(outcome.watermark, rv(&w1));

    // A plain resume at the watermark is fine, but a historical snapshot at
    // that revision is gone.
    let err = store
        .watch(
            "default",
            &ListOptions {
                resource_version: w1.metadata.resource_version.clone(),
                send_initial_events: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(err.is_expired(), "got {err}");
    factory.destroy().await;
}

#[tokio::test]
async fn events_arrive_in_revision_order() {
    let factory = memory_factory().await;
    let store = factory.store::<Widget>().await.unwrap();

    let w1 = store.create(&widget("default", "w1", "blue")).await.unwrap();
    let mut watcher = store
        .watch(
            "default",
            &ListOptions {
                resource_version: w1.metadata.resource_version.clone(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let w2 = store.create(&widget("default", "w2", "blue")).await.unwrap();
    let mut w1b = w1.clone();
    w1b.spec.color = "red".to_string();
    let w1b = store.update(&w1b).await.unwrap();
    store
        .delete("default", "w2", &DeleteOptions::default())
        .await
        .unwrap();

    match next(&mut watcher).await {
        WatchEvent::Added(obj) => assert_eq!(obj, w2),
        other => panic!("expected ADDED, got {}", other.type_str()),
    }
    match next(&mut watcher).await {
        WatchEvent::Modified(obj) => assert_eq!(obj, w1b),
        other => panic!("expected MODIFIED, got {}", other.type_str()),
    }
    match next(&mut watcher).await {
        WatchEvent::Deleted(obj) => {
            assert_eq!(obj.name(), "w2");
            assert!(rv(&obj) > rv(&w1b), "ids strictly increase");
        }
        other => panic!("expected DELETED, got {}", other.type_str()),
    }
    factory.destroy().await;
}

#[tokio::test]
async fn deleted_events_carry_the_final_object_state() {
    let factory = memory_factory().await;
    let store = factory.store::<Widget>().await.unwrap();

    let w1 = store.create(&widget("default", "w1", "blue")).await.unwrap();
    let mut watcher = store
        .watch(
            "default",
            &ListOptions {
                resource_version: w1.metadata.resource_version.clone(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    store
        .delete("default", "w1", &DeleteOptions::default())
        .await
        .unwrap();

    match next(&mut watcher).await {
        WatchEvent::Deleted(obj) => {
            assert_eq!(obj.name(), "w1");
            assert_eq!(obj.spec.color, "blue");
            assert!(rv(&obj) > rv(&w1), "tombstone has its own revision");
        }
        other => panic!("expected DELETED, got {}", other.type_str()),
    }
    factory.destroy().await;
}

#[tokio::test]
async fn resume_from_cursor_skips_replayed_events() {
    let factory = memory_factory().await;
    let store = factory.store::<Widget>().await.unwrap();

    store.create(&widget("default", "w1", "blue")).await.unwrap();
    let w2 = store.create(&widget("default", "w2", "blue")).await.unwrap();

    // Resume after w2: only later events are delivered.
    let mut watcher = store
        .watch(
            "default",
            &ListOptions {
                resource_version: w2.metadata.resource_version.clone(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let w3 = store.create(&widget("default", "w3", "blue")).await.unwrap();
    match next(&mut watcher).await {
        WatchEvent::Added(obj) => assert_eq!(obj, w3),
        other => panic!("expected ADDED, got {}", other.type_str()),
    }
    factory.destroy().await;
}

#[tokio::test]
async fn watch_below_the_watermark_is_expired() {
    let factory = memory_factory().await;
    let store = factory.store::<Widget>().await.unwrap();

    let w1 = store.create(&widget("default", "w1", "blue")).await.unwrap();
    let mut obj = w1.clone();
    for color in ["red", "green"] {
        obj.spec.color = color.to_string();
        obj = store.update(&obj).await.unwrap();
    }
    let outcome = store.compact().await.unwrap();
    assert!(outcome.watermark > rv(&w1));

    let err = store
        .watch(
            "default",
            &ListOptions {
                resource_version: w1.metadata.resource_version.clone(),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(err.is_expired(), "got {err}");

    // Resuming exactly at the watermark is still well-defined.
    let mut watcher = store
        .watch(
            "default",
            &ListOptions {
                resource_version: outcome.watermark.to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    match next(&mut watcher).await {
        WatchEvent::Modified(latest) => assert_eq!(latest, obj),
        other => panic!("expected MODIFIED, got {}", other.type_str()),
    }
    factory.destroy().await;
}

#[tokio::test]
async fn watchers_are_scoped_to_their_namespace() {
    let factory = memory_factory().await;
    let store = factory.store::<Widget>().await.unwrap();

    let mut watcher = store.watch("a-team", &ListOptions::default()).await.unwrap();

    store.create(&widget("b-team", "other", "blue")).await.unwrap();
    let ours = store.create(&widget("a-team", "ours", "blue")).await.unwrap();

    match next(&mut watcher).await {
        WatchEvent::Added(obj) => assert_eq!(obj, ours),
        other => panic!("expected ADDED, got {}", other.type_str()),
    }
    factory.destroy().await;
}

#[tokio::test]
async fn watch_honors_field_selectors() {
    let factory = memory_factory().await;
    let store = factory.store::<Widget>().await.unwrap();

    let opts = ListOptions {
        field_selector: Some(FieldSelector::parse("status.phase=Running").unwrap()),
        ..Default::default()
    };
    let mut watcher = store.watch("default", &opts).await.unwrap();

    store
        .create(&widget("default", "idle", "blue").with_phase("Pending"))
        .await
        .unwrap();
    let running = store
        .create(&widget("default", "busy", "blue").with_phase("Running"))
        .await
        .unwrap();

    match next(&mut watcher).await {
        WatchEvent::Added(obj) => assert_eq!(obj, running),
        other => panic!("expected ADDED, got {}", other.type_str()),
    }
    factory.destroy().await;
}

#[tokio::test]
async fn keepalive_bookmarks_during_idle_waits() {
    let config = FactoryConfig {
        watch: WatchConfig {
            wait_timeout: Duration::from_millis(100),
            ..Default::default()
        },
        ..Default::default()
    };
    let factory = memory_factory_with(config).await;
    let store = factory.store::<Widget>().await.unwrap();

    let created = store.create(&widget("default", "w1", "blue")).await.unwrap();
    let opts = ListOptions {
        resource_version: created.metadata.resource_version.clone(),
        allow_watch_bookmarks: true,
        progress_notify: true,
        ..Default::default()
    };
    let mut watcher = store.watch("default", &opts).await.unwrap();

    match next(&mut watcher).await {
        WatchEvent::Bookmark {
            resource_version,
            initial_events_end,
        } => {
            assert_eq!(resource_version, rv(&created));
            assert!(!initial_events_end);
        }
        other => panic!("expected BOOKMARK, got {}", other.type_str()),
    }
    factory.destroy().await;
}

#[tokio::test]
async fn slow_consumers_lose_nothing() {
    let config = FactoryConfig {
        watch: WatchConfig {
            channel_capacity: 1,
            ..Default::default()
        },
        ..Default::default()
    };
    let factory = memory_factory_with(config).await;
    let store = factory.store::<Widget>().await.unwrap();

    let mut watcher = store.watch("default", &ListOptions::default()).await.unwrap();

    for i in 0..20 {
        store
            .create(&widget("default", &format!("w{i:02}"), "blue"))
            .await
            .unwrap();
    }

    // The watcher blocks on its bounded channel instead of dropping events;
    // draining slowly still yields every object in order.
    for i in 0..20 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        match next(&mut watcher).await {
            WatchEvent::Added(obj) => assert_eq!(obj.name(), format!("w{i:02}")),
            other => panic!("expected ADDED, got {}", other.type_str()),
        }
    }
    factory.destroy().await;
}

#[tokio::test]
async fn destroy_closes_active_watch_streams() {
    let factory = memory_factory().await;
    let store = factory.store::<Widget>().await.unwrap();

    let mut watcher = store.watch("default", &ListOptions::default()).await.unwrap();
    factory.destroy().await;

    // The stream drains (possibly through a terminal error from the closing
    // pool) and ends.
    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = watcher.recv().await {
            if let WatchEvent::Error(_) = event {
                continue;
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "stream closed after destroy");
}

#[tokio::test]
async fn invalid_watch_resource_version_is_rejected() {
    let factory = memory_factory().await;
    let store = factory.store::<Widget>().await.unwrap();

    let err = store
        .watch(
            "default",
            &ListOptions {
                resource_version: "not-a-number".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(err.is_invalid());
    factory.destroy().await;
}
