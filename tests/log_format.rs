//! On-disk format and unserialized-access tests.
//!
//! These tests drive `TaskService` and `LogStore` from outside the crate and
//! check the exact bytes written, plus how the log behaves when records are
//! written without going through the writer task.

use tasklog::codec::{self, PREFIX_SIZE};
use tasklog::{Error, LogStore, Task, TaskService};

fn temp_path() -> (std::path::PathBuf, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("failed to create tempdir");
    (dir.path().join("mydb.pb"), dir)
}

#[test]
fn first_add_writes_exactly_one_record() {
    let (path, _dir) = temp_path();
    TaskService::open(&path).add("x", false).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(
        bytes,
        vec![5, 0, 0, 0, 0, 0, 0, 0, 0x08, 0x01, 0x12, 0x01, b'x']
    );
}

#[test]
fn completed_record_gains_done_field() {
    let (path, _dir) = temp_path();
    let service = TaskService::open(&path);
    service.add("x", false).unwrap();
    service.complete(1).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(
        bytes,
        vec![7, 0, 0, 0, 0, 0, 0, 0, 0x08, 0x01, 0x12, 0x01, b'x', 0x18, 0x01]
    );
}

#[test]
fn file_is_concatenation_of_framed_records() {
    let (path, _dir) = temp_path();
    let service = TaskService::open(&path);
    let tasks = [
        service.add("alpha", false).unwrap(),
        service.add("", true).unwrap(),
        service.add("gamma ✓", false).unwrap(),
    ];

    let mut expected = Vec::new();
    for task in &tasks {
        expected.extend(codec::encode_record(task).unwrap());
    }
    assert_eq!(std::fs::read(&path).unwrap(), expected);
}

#[test]
fn file_written_by_hand_is_listed() {
    let (path, _dir) = temp_path();
    let mut bytes = Vec::new();
    for task in [
        Task {
            id: 1,
            text: "handmade".into(),
            done: true,
        },
        Task {
            id: 2,
            text: "second".into(),
            done: false,
        },
    ] {
        bytes.extend(codec::encode_record(&task).unwrap());
    }
    std::fs::write(&path, bytes).unwrap();

    let tasks = TaskService::open(&path).list().unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].text, "handmade");
    assert!(tasks[0].done);
}

#[test]
fn torn_trailing_record_makes_whole_log_unreadable() {
    let (path, _dir) = temp_path();
    let service = TaskService::open(&path);
    service.add("whole", false).unwrap();

    // A second writer died half-way through its prefix.
    let mut bytes = std::fs::read(&path).unwrap();
    let good_len = bytes.len();
    bytes.extend_from_slice(&[9, 0, 0]);
    std::fs::write(&path, bytes).unwrap();

    let err = service.list().unwrap_err();
    assert!(
        matches!(err, Error::CorruptLog { offset, .. } if offset == good_len as u64),
        "got: {err:?}"
    );
}

#[test]
fn two_unserialized_adds_can_share_an_id() {
    let (path, _dir) = temp_path();
    let store = LogStore::new(&path);

    // Both callers counted zero records before either appended.
    let seen_by_a = TaskService::open(&path).list().unwrap().len() as u64;
    let seen_by_b = TaskService::open(&path).list().unwrap().len() as u64;
    for (seen, text) in [(seen_by_a, "from a"), (seen_by_b, "from b")] {
        let payload = codec::encode(&Task {
            id: seen + 1,
            text: text.into(),
            done: false,
        })
        .unwrap();
        store.append(&payload).unwrap();
    }

    let tasks = TaskService::open(&path).list().unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].id, 1);
    assert_eq!(tasks[1].id, 1);

    // Later adds keep counting records, not ids.
    let next = TaskService::open(&path).add("third", false).unwrap();
    assert_eq!(next.id, 3);
}

#[test]
fn add_landing_mid_rewrite_is_lost() {
    let (path, _dir) = temp_path();
    let service = TaskService::open(&path);
    service.add("a", false).unwrap();
    let snapshot = service.list().unwrap();

    // A completion read `snapshot`, then an add appended before the rewrite.
    service.add("b", false).unwrap();
    let payloads = snapshot
        .iter()
        .map(|t| {
            codec::encode(&Task {
                done: true,
                ..t.clone()
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    service.store().replace(payloads).unwrap();

    let tasks = service.list().unwrap();
    assert_eq!(tasks.len(), 1, "the racing add is gone");
    assert_eq!(tasks[0].text, "a");
}

#[test]
fn prefix_is_eight_bytes() {
    assert_eq!(PREFIX_SIZE, 8);
}
