//! Concurrent access tests.

use framestore::{Position, RecordStore, HEADER_SIZE};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;

const THREADS: usize = 8;
const PER_THREAD: usize = 200;

fn payload(thread: usize, i: usize) -> Vec<u8> {
    // Vary the length so frames do not line up on a fixed stride.
    format!("t{}-r{}-{}", thread, i, "x".repeat(i % 17)).into_bytes()
}

#[test]
fn test_concurrent_appends_form_one_frame_sequence() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(RecordStore::open(dir.path().join("records.store")).unwrap());
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                (0..PER_THREAD)
                    .map(|i| {
                        let record = payload(t, i);
                        let (n, pos) = store.append(&record).unwrap();
                        assert_eq!(n, HEADER_SIZE + record.len() as u64);
                        (pos, record)
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut appended: BTreeMap<Position, Vec<u8>> = BTreeMap::new();
    for handle in handles {
        for (pos, record) in handle.join().unwrap() {
            assert!(appended.insert(pos, record).is_none(), "duplicate position");
        }
    }
    assert_eq!(appended.len(), THREADS * PER_THREAD);

    // Positions tile the file with no gaps or overlaps.
    let mut expected = Position(0);
    for (pos, record) in &appended {
        assert_eq!(*pos, expected);
        expected = pos.advance(HEADER_SIZE + record.len() as u64);
    }
    assert_eq!(store.size(), expected.0);

    // A front-to-back scan sees exactly what each caller was told.
    let scanned: Vec<_> = store.iter().collect::<framestore::Result<Vec<_>>>().unwrap();
    assert_eq!(scanned.len(), appended.len());
    for ((pos, data), (expected_pos, expected_data)) in scanned.iter().zip(&appended) {
        assert_eq!(pos, expected_pos);
        assert_eq!(data, expected_data);
    }
}

#[test]
fn test_per_thread_order_is_preserved() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(RecordStore::open(dir.path().join("records.store")).unwrap());

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                (0..PER_THREAD)
                    .map(|i| store.append(&payload(t, i)).unwrap().1)
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    for handle in handles {
        let positions = handle.join().unwrap();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }
}

#[test]
fn test_concurrent_readers_and_writers() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(RecordStore::open(dir.path().join("records.store")).unwrap());

    let seed: Vec<(Position, Vec<u8>)> = (0..50)
        .map(|i| {
            let record = payload(99, i);
            (store.append(&record).unwrap().1, record)
        })
        .collect();
    let seed = Arc::new(seed);

    let writers: Vec<_> = (0..THREADS / 2)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..PER_THREAD {
                    let record = payload(t, i);
                    let (_, pos) = store.append(&record).unwrap();
                    // Own writes are readable immediately.
                    assert_eq!(store.read(pos).unwrap(), record);
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..THREADS / 2)
        .map(|_| {
            let store = Arc::clone(&store);
            let seed = Arc::clone(&seed);
            thread::spawn(move || {
                for _ in 0..10 {
                    for (pos, record) in seed.iter() {
                        assert_eq!(&store.read(*pos).unwrap(), record);
                    }
                }
            })
        })
        .collect();

    for handle in writers.into_iter().chain(readers) {
        handle.join().unwrap();
    }

    let positions: HashSet<Position> = store
        .iter()
        .map(|frame| frame.unwrap().0)
        .collect();
    assert_eq!(positions.len(), seed.len() + (THREADS / 2) * PER_THREAD);
}
