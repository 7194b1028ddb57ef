//! Integration tests for change notification, vetoes and reload.

use hotprops::prelude::*;
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn write_source(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("app.properties");
    fs::write(&path, content).unwrap();
    path
}

/// Rewrite `path` and push its mtime forward so the change is always visible.
fn rewrite(path: &Path, content: &str, offset_secs: u64) {
    fs::write(path, content).unwrap();
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(offset_secs))
        .unwrap();
}

#[derive(Clone, Default)]
struct EventLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }
}

impl PropertyChangeListener for EventLog {
    fn before_change(&self, event: &PropertyChangeEvent) -> std::result::Result<(), ListenerError> {
        self.entries.lock().push(format!(
            "before {} {:?}->{:?}",
            event.key(),
            event.old_value(),
            event.new_value()
        ));
        Ok(())
    }

    fn property_changed(&self, event: &PropertyChangeEvent) {
        self.entries.lock().push(format!("after {}", event.key()));
    }
}

#[derive(Clone, Default)]
struct ReloadLog {
    events: Arc<Mutex<Vec<ReloadEvent>>>,
}

impl ReloadListener for ReloadLog {
    fn reload_performed(&self, event: &ReloadEvent) {
        self.events.lock().push(event.clone());
    }
}

#[test]
fn test_reload_reports_exact_diff() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_source(&temp_dir, "a=1\nb=2\n");

    let store = PropertyStore::builder()
        .with_name("app")
        .with_file(&path)
        .build()
        .unwrap();
    let log = EventLog::default();
    store.add_property_change_listener(log.clone());
    let reloads = ReloadLog::default();
    store.add_reload_listener(reloads.clone());

    fs::write(&path, "a=1\nb=3\nc=4\n").unwrap();
    store.reload().unwrap();

    assert_eq!(
        log.entries(),
        vec![
            "before b Some(\"2\")->Some(\"3\")",
            "before c None->Some(\"4\")",
            "after b",
            "after c",
        ]
    );

    let reloads = reloads.events.lock();
    assert_eq!(reloads.len(), 1);
    let event = &reloads[0];
    assert_eq!(event.source(), "app");
    assert_eq!(event.events().len(), 2);
    assert_eq!(event.events()[0].source(), "app");
    assert_eq!(event.old_properties().get("b").map(String::as_str), Some("2"));
    assert_eq!(event.new_properties().get("c").map(String::as_str), Some("4"));
}

#[test]
fn test_reload_removes_vanished_keys() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_source(&temp_dir, "a=1\nb=2\n");
    let store = PropertyStore::builder().with_file(&path).build().unwrap();

    fs::write(&path, "a=1\n").unwrap();
    store.reload().unwrap();

    assert_eq!(store.keys(), vec!["a"]);
}

#[test]
fn test_reload_without_changes_still_notifies_reload_listeners() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_source(&temp_dir, "a=1\n");
    let store = PropertyStore::builder().with_file(&path).build().unwrap();
    let reloads = ReloadLog::default();
    store.add_reload_listener(reloads.clone());

    store.reload().unwrap();

    let reloads = reloads.events.lock();
    assert_eq!(reloads.len(), 1);
    assert!(reloads[0].events().is_empty());
}

#[test]
fn test_reload_single_veto_keeps_old_value() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_source(&temp_dir, "locked=1\nfree=1\n");
    let store = PropertyStore::builder().with_file(&path).build().unwrap();

    struct Lock;
    impl PropertyChangeListener for Lock {
        fn before_change(&self, event: &PropertyChangeEvent) -> std::result::Result<(), ListenerError> {
            if event.key() == "locked" {
                Err(ListenerError::RollbackOperation)
            } else {
                Ok(())
            }
        }
        fn property_changed(&self, _event: &PropertyChangeEvent) {}
    }
    store.add_property_change_listener(Lock);
    let reloads = ReloadLog::default();
    store.add_reload_listener(reloads.clone());

    fs::write(&path, "locked=2\nfree=2\n").unwrap();
    store.reload().unwrap();

    assert_eq!(store.get("locked").as_deref(), Some("1"));
    assert_eq!(store.get("free").as_deref(), Some("2"));
    let reloads = reloads.events.lock();
    assert_eq!(reloads[0].events().len(), 1);
    assert_eq!(reloads[0].events()[0].key(), "free");
}

#[test]
fn test_reload_batch_veto_from_change_listener_keeps_everything() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_source(&temp_dir, "a=1\nb=1\n");
    let store = PropertyStore::builder().with_file(&path).build().unwrap();
    let log = EventLog::default();
    store.add_property_change_listener(log.clone());

    struct BatchVetoOnB;
    impl PropertyChangeListener for BatchVetoOnB {
        fn before_change(&self, event: &PropertyChangeEvent) -> std::result::Result<(), ListenerError> {
            if event.key() == "b" {
                Err(ListenerError::RollbackBatch)
            } else {
                Ok(())
            }
        }
        fn property_changed(&self, _event: &PropertyChangeEvent) {}
    }
    store.add_property_change_listener(BatchVetoOnB);
    let reloads = ReloadLog::default();
    store.add_reload_listener(reloads.clone());

    fs::write(&path, "a=9\nb=9\n").unwrap();
    store.reload().unwrap();

    assert_eq!(store.get("a").as_deref(), Some("1"));
    assert_eq!(store.get("b").as_deref(), Some("1"));
    assert_eq!(log.entries().len(), 2);
    assert!(log.entries().iter().all(|e| e.starts_with("before")));
    assert!(reloads.events.lock().is_empty());
}

#[test]
fn test_reload_listener_veto_aborts_reload() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_source(&temp_dir, "a=1\nb=1\n");
    let store = PropertyStore::builder().with_file(&path).build().unwrap();
    let log = EventLog::default();
    store.add_property_change_listener(log.clone());

    struct Reject;
    impl ReloadListener for Reject {
        fn before_reload(&self, event: &ReloadEvent) -> std::result::Result<(), ListenerError> {
            if event.new_properties().contains_key("forbidden") {
                Err(ListenerError::RollbackBatch)
            } else {
                Ok(())
            }
        }
        fn reload_performed(&self, _event: &ReloadEvent) {
            panic!("vetoed reload must not be reported as performed");
        }
    }
    store.add_reload_listener(Reject);

    fs::write(&path, "a=2\nforbidden=yes\n").unwrap();
    store.reload().unwrap();

    assert_eq!(store.get("a").as_deref(), Some("1"));
    assert_eq!(store.get("b").as_deref(), Some("1"));
    assert!(!store.contains_key("forbidden"));
    assert!(log.entries().iter().all(|e| e.starts_with("before")));
}

#[test]
fn test_nested_reload_is_ignored() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_source(&temp_dir, "a=1\n");
    let store = PropertyStore::builder().with_file(&path).build().unwrap();

    let performed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&performed);
    let inner = store.clone();
    store.add_reload_listener(move |_event: &ReloadEvent| {
        counter.fetch_add(1, Ordering::SeqCst);
        inner.reload().unwrap();
    });

    fs::write(&path, "a=2\n").unwrap();
    store.reload().unwrap();

    assert_eq!(performed.load(Ordering::SeqCst), 1);
    assert_eq!(store.get("a").as_deref(), Some("2"));
}

#[test]
fn test_listener_failure_propagates_from_reload() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_source(&temp_dir, "a=1\n");
    let store = PropertyStore::builder().with_file(&path).build().unwrap();

    struct Broken;
    impl PropertyChangeListener for Broken {
        fn before_change(&self, _event: &PropertyChangeEvent) -> std::result::Result<(), ListenerError> {
            Err(ListenerError::failed("audit log unavailable"))
        }
        fn property_changed(&self, _event: &PropertyChangeEvent) {}
    }
    store.add_property_change_listener(Broken);

    fs::write(&path, "a=2\n").unwrap();
    let err = store.reload().unwrap_err();

    assert!(matches!(err, ConfigError::Listener(_)));
    assert_eq!(store.get("a").as_deref(), Some("1"));

    // The guard is released, so a later reload runs again.
    let err = store.reload().unwrap_err();
    assert!(matches!(err, ConfigError::Listener(_)));
}

#[test]
fn test_reload_keeps_imports_on_top() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_source(&temp_dir, "a=file\n");
    let import: PropertyMap = [("a".to_string(), "import".to_string())].into();

    let store = PropertyStore::builder()
        .with_file(&path)
        .with_import(import)
        .build()
        .unwrap();
    assert_eq!(store.get("a").as_deref(), Some("import"));

    fs::write(&path, "a=changed\nb=new\n").unwrap();
    store.reload().unwrap();

    assert_eq!(store.get("a").as_deref(), Some("import"));
    assert_eq!(store.get("b").as_deref(), Some("new"));
}

#[test]
fn test_sync_hot_reload_on_read() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_source(&temp_dir, "mode=initial\n");

    let store = PropertyStore::builder()
        .with_file(&path)
        .with_hot_reload(HotReload::new(Duration::ZERO))
        .build()
        .unwrap();
    assert_eq!(store.get("mode").as_deref(), Some("initial"));

    rewrite(&path, "mode=updated\n", 10);
    assert_eq!(store.get("mode").as_deref(), Some("updated"));
    assert!(!store.check_and_reload().unwrap());
}

#[test]
fn test_sync_hot_reload_respects_interval() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_source(&temp_dir, "mode=initial\n");

    let store = PropertyStore::builder()
        .with_file(&path)
        .with_hot_reload(HotReload::new(Duration::from_secs(3600)))
        .build()
        .unwrap();

    rewrite(&path, "mode=updated\n", 10);
    assert_eq!(store.get("mode").as_deref(), Some("initial"));
}

#[test]
fn test_sync_hot_reload_keeps_old_values_on_broken_source() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_source(&temp_dir, "mode=initial\n");

    let store = PropertyStore::builder()
        .with_file(&path)
        .with_hot_reload(HotReload::new(Duration::ZERO))
        .build()
        .unwrap();

    rewrite(&path, "mode=\\uXYZ1\n", 10);
    assert_eq!(store.get("mode").as_deref(), Some("initial"));
}

#[test]
fn test_concurrent_readers_see_complete_snapshots() {
    let store = PropertyStore::new(
        [
            ("left".to_string(), "0".to_string()),
            ("right".to_string(), "0".to_string()),
        ]
        .into(),
    );

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            thread::spawn(move || {
                for _ in 0..1000 {
                    let snapshot = store.snapshot();
                    assert_eq!(snapshot.get("left"), snapshot.get("right"));
                }
            })
        })
        .collect();

    for i in 1..=200 {
        let value = i.to_string();
        store
            .load(
                [
                    ("left".to_string(), value.clone()),
                    ("right".to_string(), value),
                ]
                .into(),
            )
            .unwrap();
    }

    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(store.get("left").as_deref(), Some("200"));
}

#[test]
fn test_writers_are_serialized_across_threads() {
    let store = PropertyStore::new(PropertyMap::new());
    let in_callback = Arc::new(AtomicUsize::new(0));
    let overlap = Arc::new(AtomicUsize::new(0));

    {
        let in_callback = Arc::clone(&in_callback);
        let overlap = Arc::clone(&overlap);
        store.add_property_change_listener(move |_event: &PropertyChangeEvent| {
            if in_callback.fetch_add(1, Ordering::SeqCst) > 0 {
                overlap.fetch_add(1, Ordering::SeqCst);
            }
            thread::sleep(Duration::from_millis(1));
            in_callback.fetch_sub(1, Ordering::SeqCst);
        });
    }

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let store = store.clone();
            thread::spawn(move || {
                for i in 0..20 {
                    store.set(&format!("key.{}", t), i.to_string()).unwrap();
                }
            })
        })
        .collect();

    for writer in writers {
        writer.join().unwrap();
    }
    assert_eq!(overlap.load(Ordering::SeqCst), 0);
    assert_eq!(store.len(), 4);
}
