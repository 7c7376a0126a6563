mod support;

use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use svnctx::adm::{AdmLockHierarchy, Depth};
use svnctx::credential::{Credential, CredentialKind};
use svnctx::error::Error;
use svnctx::lock;
use svnctx::session::{Challenge, ClientSession};
use svnctx::wc;

use support::{tree_dirs, TestWc};

const READY_POLL_INTERVAL: Duration = Duration::from_millis(25);
const READY_TIMEOUT: Duration = Duration::from_secs(5);

#[test]
fn lock_helper_process() {
    if std::env::var("SVNCTX_LOCK_HELPER").ok().as_deref() != Some("1") {
        return;
    }

    let path = std::env::var("SVNCTX_LOCK_PATH").expect("SVNCTX_LOCK_PATH");
    let ready = std::env::var("SVNCTX_LOCK_READY").expect("SVNCTX_LOCK_READY");

    let _hierarchy = AdmLockHierarchy::open(PathBuf::from(path), true, Depth::Infinity, None)
        .expect("lock helper open");
    std::fs::write(&ready, "ready").expect("ready write");
    thread::sleep(Duration::from_secs(2));
}

#[test]
fn write_lock_held_by_other_process_blocks_open() -> Result<(), Box<dyn std::error::Error>> {
    let test = TestWc::tree()?;
    let ready_path = test.outside().join("ready");

    let mut child = Command::new(std::env::current_exe()?)
        .args(["--exact", "lock_helper_process", "--nocapture"])
        .env("SVNCTX_LOCK_HELPER", "1")
        .env("SVNCTX_LOCK_PATH", test.root().display().to_string())
        .env("SVNCTX_LOCK_READY", ready_path.display().to_string())
        .spawn()?;

    let start = Instant::now();
    while !ready_path.exists() {
        if start.elapsed() > READY_TIMEOUT {
            let _ = child.kill();
            return Err("lock helper not ready".into());
        }
        thread::sleep(READY_POLL_INTERVAL);
    }

    assert!(wc::is_locked(&test.path("a/a1"))?);
    match AdmLockHierarchy::open(test.path("b"), true, Depth::Empty, None) {
        Ok(_) => return Err("expected lock contention".into()),
        Err(err) => assert!(matches!(err, Error::AlreadyLocked(_))),
    }
    // Nothing is left claimed in this process after the failed open
    assert!(!lock::is_registered(&test.path("b")));

    child.wait()?;
    for rel in tree_dirs() {
        assert!(!test.has_lock_file(rel), "'{rel}' lock file survived");
    }
    let reopened = AdmLockHierarchy::open(test.root(), true, Depth::Infinity, None)?;
    assert_eq!(reopened.locked_paths().len(), tree_dirs().len());
    Ok(())
}

#[test]
fn racing_sessions_get_exactly_one_hierarchy() -> Result<(), Box<dyn std::error::Error>> {
    let test = TestWc::tree()?;
    let root = test.root().to_path_buf();

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let attempted = Arc::new(Barrier::new(threads));
    let winners = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::with_capacity(threads);
    for _ in 0..threads {
        let barrier = Arc::clone(&barrier);
        let attempted = Arc::clone(&attempted);
        let winners = Arc::clone(&winners);
        let root = root.clone();

        handles.push(thread::spawn(move || {
            barrier.wait();
            let held = match AdmLockHierarchy::open(&root, true, Depth::Infinity, None) {
                Ok(hierarchy) => {
                    winners.fetch_add(1, Ordering::SeqCst);
                    Some(hierarchy)
                }
                Err(Error::AlreadyLocked(_)) => None,
                Err(other) => panic!("unexpected error: {other}"),
            };
            attempted.wait();
            drop(held);
        }));
    }

    for handle in handles {
        handle.join().expect("join thread");
    }

    assert_eq!(winners.load(Ordering::SeqCst), 1);
    for rel in tree_dirs() {
        assert!(!lock::is_registered(&test.path(rel)));
        assert!(!test.has_lock_file(rel));
    }
    Ok(())
}

#[test]
fn disjoint_subtrees_lock_in_parallel() -> Result<(), Box<dyn std::error::Error>> {
    let test = TestWc::tree()?;
    let targets = ["a/a1", "a/a2", "b"];
    let barrier = Arc::new(Barrier::new(targets.len()));

    let mut handles = Vec::new();
    for rel in targets {
        let path = test.path(rel);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || -> svnctx::Result<usize> {
            let mut session = ClientSession::new();
            barrier.wait();
            session.with_locked(&path, true, Depth::Infinity, |_, hierarchy| {
                Ok(hierarchy.locked_paths().len())
            })
        }));
    }

    let mut total = 0;
    for handle in handles {
        total += handle.join().expect("join thread")?;
    }
    assert_eq!(total, 4);
    Ok(())
}

#[test]
fn sessions_resolve_independently_across_threads() {
    let handles: Vec<_> = (0..4)
        .map(|id| {
            thread::spawn(move || {
                let mut session = ClientSession::new();
                session.add_username_prompt_provider(0, move |cred, _| {
                    if let Credential::Username { username, .. } = cred {
                        *username = format!("worker{id}");
                    }
                    Ok(())
                });
                let challenge = Challenge::new(CredentialKind::Username, "shared realm");
                let first = session.resolve(&challenge).expect("resolve");
                let second = session.resolve(&challenge).expect("cached resolve");
                assert_eq!(first, second);
                first.user().map(str::to_string)
            })
        })
        .collect();

    let mut names: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("join thread"))
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            Some("worker0".to_string()),
            Some("worker1".to_string()),
            Some("worker2".to_string()),
            Some("worker3".to_string()),
        ]
    );
}
