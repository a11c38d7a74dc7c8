//! Storage Module Tests
//!
//! ## Test Scopes
//! - **Codec**: escaping is reversible and rejects names it would never produce.
//! - **FileStack**: LIFO order, depth accounting and on-disk durability.
//! - **Registry**: lookup/create semantics, recovery scan, removal, shutdown,
//!   idle eviction and the handle-safety guarantees under concurrency.

#[cfg(test)]
mod tests {
    use crate::error::StackError;
    use crate::storage::codec::{escape, unescape};
    use crate::storage::file_stack::FileStack;
    use crate::storage::registry::StackRegistry;
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::time::Duration;

    fn sample_keys() -> Vec<&'static str> {
        vec![
            "plain",
            "with space",
            "a/b/c",
            "back\\slash",
            "percent%20literal",
            "query?x=1&y=2",
            "zażółć gęślą jaźń",
            "日本語のキー",
            "emoji 🚀 stack",
            ".",
            "..",
            "...",
            ".hidden",
            "tab\tnew\nline",
            "system 42 #1111",
        ]
    }

    // ============================================================
    // CODEC TESTS
    // ============================================================

    #[test]
    fn test_escape_round_trip() {
        for key in sample_keys() {
            let name = escape(key);
            assert_eq!(unescape(&name).unwrap(), key, "round trip of {:?}", key);
        }
    }

    #[test]
    fn test_escaped_names_are_single_path_components() {
        for key in sample_keys() {
            let name = escape(key);
            assert!(!name.contains('/'), "{:?} -> {:?}", key, name);
            assert!(!name.contains('\\'), "{:?} -> {:?}", key, name);
            assert_ne!(name, ".");
            assert_ne!(name, "..");
        }
    }

    #[test]
    fn test_escape_is_deterministic() {
        for key in sample_keys() {
            assert_eq!(escape(key), escape(key));
        }
        assert_eq!(escape("with space"), "with%20space");
    }

    #[test]
    fn test_unescape_rejects_non_canonical_names() {
        for name in ["%zz", "50%", "a b", "%2f", "%2E%2E%2E"] {
            match unescape(name) {
                Err(StackError::Decode(_)) => {}
                other => panic!("expected decode error for {:?}, got {:?}", name, other),
            }
        }
    }

    // ============================================================
    // FILE STACK TESTS
    // ============================================================

    #[test]
    fn test_file_stack_lifo_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut stack = FileStack::open(&dir.path().join("lifo")).unwrap();

        assert_eq!(stack.push(b"h1", b"first").unwrap(), 0);
        assert_eq!(stack.push(b"h2", b"second").unwrap(), 1);
        assert_eq!(stack.depth(), 2);

        assert_eq!(stack.peek().unwrap(), Some((b"h2".to_vec(), b"second".to_vec())));
        assert_eq!(stack.pop().unwrap(), Some((b"h2".to_vec(), b"second".to_vec())));
        assert_eq!(stack.pop().unwrap(), Some((b"h1".to_vec(), b"first".to_vec())));
        assert_eq!(stack.pop().unwrap(), None);
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn test_file_stack_empty_entries() {
        let dir = tempfile::tempdir().unwrap();
        let mut stack = FileStack::open(&dir.path().join("empty-entries")).unwrap();

        stack.push(b"", b"").unwrap();
        assert_eq!(stack.depth(), 1);
        assert_eq!(stack.pop().unwrap(), Some((Vec::new(), Vec::new())));
    }

    #[test]
    fn test_file_stack_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("durable");

        {
            let mut stack = FileStack::open(&path).unwrap();
            for i in 0..5 {
                stack.push(b"{}", format!("body {}", i).as_bytes()).unwrap();
            }
            stack.pop().unwrap();
        }

        let mut stack = FileStack::open(&path).unwrap();
        assert_eq!(stack.depth(), 4);
        assert_eq!(stack.pop().unwrap().unwrap().1, b"body 3".to_vec());
    }

    #[test]
    fn test_file_stack_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt");
        std::fs::write(&path, b"not a stack").unwrap();

        assert!(matches!(FileStack::open(&path), Err(StackError::Decode(_))));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_file_stack_failed_write_leaves_depth_unchanged() {
        // Every write to /dev/full fails with ENOSPC and truncating it fails too.
        let path = std::path::Path::new("/dev/full");
        if !path.exists() {
            return;
        }

        let mut stack = FileStack::open(path).unwrap();
        assert_eq!(stack.depth(), 0);

        assert!(matches!(stack.push(b"{}", b"lost"), Err(StackError::Io(_))));
        assert_eq!(stack.depth(), 0);
        assert_eq!(stack.peek().unwrap(), None);
    }

    // ============================================================
    // REGISTRY TESTS (lookup, lifecycle)
    // ============================================================

    #[tokio::test]
    async fn test_find_without_create_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let registry = StackRegistry::open(dir.path(), Duration::from_secs(3)).unwrap();

        assert!(registry.find("never-created", false).unwrap().is_none());
        assert!(registry.names().unwrap().is_empty());
        assert!(!dir.path().join("never-created").exists());

        registry.close().unwrap();
    }

    #[tokio::test]
    async fn test_find_with_create_registers_empty_stack() {
        let dir = tempfile::tempdir().unwrap();
        let registry = StackRegistry::open(dir.path(), Duration::from_secs(3)).unwrap();

        let handle = registry.find("fresh", true).unwrap().unwrap();
        assert_eq!(handle.depth(), 0);
        assert!(handle.peek().unwrap().is_none());
        assert!(dir.path().join("fresh").is_file());

        // Now known: lookup without create finds it.
        let again = registry.find("fresh", false).unwrap().unwrap();
        assert!(Arc::ptr_eq(&handle, &again));

        registry.close().unwrap();
    }

    #[tokio::test]
    async fn test_find_opens_existing_file_without_create() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut stack = FileStack::open(&dir.path().join(escape("left behind"))).unwrap();
            stack.push(b"{}", b"old").unwrap();
        }

        let registry = StackRegistry::open(dir.path(), Duration::from_secs(3)).unwrap();
        let handle = registry.find("left behind", false).unwrap().unwrap();
        assert_eq!(handle.depth(), 1);

        registry.close().unwrap();
    }

    #[tokio::test]
    async fn test_root_directory_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested").join("db");

        let registry = StackRegistry::open(&root, Duration::from_secs(3)).unwrap();
        assert!(root.is_dir());

        registry.close().unwrap();
    }

    #[tokio::test]
    async fn test_push_then_pop_restores_depth() {
        let dir = tempfile::tempdir().unwrap();
        let registry = StackRegistry::open(dir.path(), Duration::from_secs(3)).unwrap();
        let handle = registry.get("queue").unwrap();

        handle.push(b"h0", b"b0").unwrap();
        let before = handle.depth();

        let depth = handle.push(b"header", b"body").unwrap();
        assert_eq!(depth, before, "push returns the depth before the push");

        let (header, body, observed) = handle.pop().unwrap().unwrap();
        assert_eq!(header, b"header".to_vec());
        assert_eq!(body, b"body".to_vec());
        assert_eq!(observed, before + 1, "pop reports the depth before removal");
        assert_eq!(handle.depth(), before);

        registry.close().unwrap();
    }

    #[tokio::test]
    async fn test_empty_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let registry = StackRegistry::open(dir.path(), Duration::from_secs(3)).unwrap();

        assert!(matches!(registry.get(""), Err(StackError::Io(_))));

        registry.close().unwrap();
    }

    #[tokio::test]
    async fn test_remove_deletes_file_and_entry() {
        let dir = tempfile::tempdir().unwrap();
        let registry = StackRegistry::open(dir.path(), Duration::from_secs(3)).unwrap();

        let handle = registry.get("doomed").unwrap();
        handle.push(b"{}", b"x").unwrap();

        registry.remove("doomed").unwrap();
        assert!(!dir.path().join("doomed").exists());
        assert!(registry.names().unwrap().is_empty());
        assert!(matches!(handle.push(b"{}", b"y"), Err(StackError::Closed)));

        // Unknown keys are a no-op.
        registry.remove("doomed").unwrap();
        registry.remove("never-existed").unwrap();

        // A fresh stack can be created under the same key.
        assert_eq!(registry.get("doomed").unwrap().depth(), 0);

        registry.close().unwrap();
    }

    #[tokio::test]
    async fn test_clean_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let registry = StackRegistry::open(dir.path(), Duration::from_secs(3)).unwrap();

        for i in 0..100 {
            registry
                .get(&format!("system {} #1111", i))
                .unwrap()
                .push(b"headers", b"body of simple message")
                .unwrap();
        }
        assert_eq!(registry.names().unwrap().len(), 100);

        registry.clean().unwrap();
        assert!(registry.names().unwrap().is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        registry.close().unwrap();
    }

    #[tokio::test]
    async fn test_operations_after_close_fail() {
        let dir = tempfile::tempdir().unwrap();
        let registry = StackRegistry::open(dir.path(), Duration::from_secs(3)).unwrap();
        let handle = registry.get("k").unwrap();

        registry.close().unwrap();
        registry.close().unwrap();

        assert!(registry.is_closed());
        assert!(matches!(registry.find("k", false), Err(StackError::Closed)));
        assert!(matches!(registry.get("other"), Err(StackError::Closed)));
        assert!(matches!(registry.remove("k"), Err(StackError::Closed)));
        assert!(matches!(registry.clean(), Err(StackError::Closed)));
        assert!(matches!(registry.scan(), Err(StackError::Closed)));
        assert!(matches!(registry.names(), Err(StackError::Closed)));
        assert!(matches!(handle.peek(), Err(StackError::Closed)));
        assert!(handle.is_released());
    }

    #[test]
    fn test_open_outside_runtime_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(StackRegistry::open(dir.path(), Duration::from_secs(3)).is_err());
    }

    // ============================================================
    // RECOVERY SCAN TESTS
    // ============================================================

    #[tokio::test]
    async fn test_scan_recovers_keys_and_depths() {
        let dir = tempfile::tempdir().unwrap();
        let keys = ["alpha", "with space", "a/b", "日本"];

        {
            let registry = StackRegistry::open(dir.path(), Duration::from_secs(3)).unwrap();
            for (i, key) in keys.iter().enumerate() {
                let handle = registry.get(key).unwrap();
                for _ in 0..=i {
                    handle.push(b"{}", key.as_bytes()).unwrap();
                }
            }
            registry.close().unwrap();
        }

        let registry = StackRegistry::open(dir.path(), Duration::from_secs(3)).unwrap();
        assert!(registry.names().unwrap().is_empty(), "no implicit discovery");

        let report = registry.scan().unwrap();
        assert_eq!(report.recovered, keys.len());
        assert!(report.skipped.is_empty());

        let expected: BTreeSet<String> = keys.iter().map(|k| k.to_string()).collect();
        assert_eq!(registry.names().unwrap(), expected);

        for (i, key) in keys.iter().enumerate() {
            let handle = registry.find(key, false).unwrap().unwrap();
            assert_eq!(handle.depth(), i + 1, "depth of {}", key);
        }

        // A second scan finds nothing new.
        assert_eq!(registry.scan().unwrap().recovered, 0);

        registry.close().unwrap();
    }

    #[tokio::test]
    async fn test_scan_skips_directories_and_reports_bad_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("subdir")).unwrap();
        std::fs::write(dir.path().join("bad%zz"), b"").unwrap();
        std::fs::write(dir.path().join("good"), b"").unwrap();

        let registry = StackRegistry::open(dir.path(), Duration::from_secs(3)).unwrap();
        let report = registry.scan().unwrap();

        assert_eq!(report.recovered, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].file_name, "bad%zz");
        assert_eq!(
            registry.names().unwrap(),
            BTreeSet::from(["good".to_string()])
        );

        registry.close().unwrap();
    }

    #[tokio::test]
    async fn test_scan_fails_fast_on_corrupt_stack() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken"), b"garbage").unwrap();

        let registry = StackRegistry::open(dir.path(), Duration::from_secs(3)).unwrap();
        assert!(matches!(registry.scan(), Err(StackError::Decode(_))));

        registry.close().unwrap();
    }

    // ============================================================
    // CONCURRENCY & EVICTION TESTS
    // ============================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_pushes_to_new_key() {
        let dir = tempfile::tempdir().unwrap();
        let registry = StackRegistry::open(dir.path(), Duration::from_secs(3)).unwrap();

        let mut tasks = Vec::new();
        for i in 0..100 {
            let registry = registry.clone();
            tasks.push(tokio::task::spawn_blocking(move || {
                let handle = registry.get("contended").unwrap();
                handle
                    .push(b"{}", format!("message {}", i).as_bytes())
                    .unwrap()
            }));
        }

        let mut depths = BTreeSet::new();
        for task in tasks {
            depths.insert(task.await.unwrap());
        }

        // Every push saw a distinct pre-push depth: nothing lost or duplicated.
        assert_eq!(depths, (0..100).collect::<BTreeSet<usize>>());

        let handle = registry.find("contended", false).unwrap().unwrap();
        assert_eq!(handle.depth(), 100);
        assert_eq!(registry.names().unwrap().len(), 1);

        registry.close().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_find_yields_single_handle() {
        let dir = tempfile::tempdir().unwrap();
        let registry = StackRegistry::open(dir.path(), Duration::from_secs(3)).unwrap();

        let mut tasks = Vec::new();
        for _ in 0..32 {
            let registry = registry.clone();
            tasks.push(tokio::task::spawn_blocking(move || {
                registry.find("shared", true).unwrap().unwrap()
            }));
        }

        let first = registry.get("shared").unwrap();
        for task in tasks {
            assert!(Arc::ptr_eq(&first, &task.await.unwrap()));
        }

        registry.close().unwrap();
    }

    #[tokio::test]
    async fn test_idle_handle_is_evicted_and_reopened() {
        let dir = tempfile::tempdir().unwrap();
        let registry = StackRegistry::open(dir.path(), Duration::from_millis(300)).unwrap();

        let handle = registry.get("sleepy").unwrap();
        handle.push(b"{}", b"one").unwrap();
        handle.push(b"{}", b"two").unwrap();
        assert!(handle.is_open());

        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(!handle.is_open(), "sweep should have closed the idle file");
        assert_eq!(registry.open_handles(), 0);

        let found = registry.find("sleepy", false).unwrap().unwrap();
        assert!(Arc::ptr_eq(&handle, &found));
        assert_eq!(found.depth(), 2);

        let (_, body, depth) = found.peek().unwrap().unwrap();
        assert_eq!(body, b"two".to_vec());
        assert_eq!(depth, 2);
        assert!(found.is_open());

        registry.close().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_eviction_never_closes_in_flight_handle() {
        let dir = tempfile::tempdir().unwrap();
        let registry = StackRegistry::open(dir.path(), Duration::from_millis(1)).unwrap();

        let handle = registry.get("busy").unwrap();
        handle.push(b"{}", b"seed").unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let slow = {
            let handle = handle.clone();
            tokio::task::spawn_blocking(move || {
                handle.with_stack(|stack| {
                    std::thread::sleep(Duration::from_millis(200));
                    stack.push(b"{}", b"slow")
                })
            })
        };

        // Hammer the sweep while the push holds the handle.
        for _ in 0..20 {
            registry.evict_idle();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(slow.await.unwrap().unwrap(), 1);
        assert_eq!(handle.depth(), 2);

        let (_, body, depth) = handle.pop().unwrap().unwrap();
        assert_eq!(body, b"slow".to_vec());
        assert_eq!(depth, 2);

        registry.close().unwrap();
    }

    #[tokio::test]
    async fn test_evict_idle_respects_keep_alive() {
        let dir = tempfile::tempdir().unwrap();
        let registry = StackRegistry::open(dir.path(), Duration::from_secs(60)).unwrap();

        registry.get("recent").unwrap().push(b"{}", b"x").unwrap();
        assert_eq!(registry.evict_idle(), 0);
        assert_eq!(registry.open_handles(), 1);

        registry.close().unwrap();
        assert_eq!(registry.open_handles(), 0);
    }
}
