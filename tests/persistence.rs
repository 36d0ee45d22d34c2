mod common;

use chunklog::{ChunkLog, SyncPolicy};
use common::{entries, entry, TestEnv, CHUNK_SIZE, NUM_ENTRIES};
use std::fs;

/// Big enough that no chunk ever fills, so no seal ever forces a sync.
const HUGE_CHUNK: u32 = 1024 * 1024 * 1024;

#[test]
fn records_survive_close_and_reopen() {
    let env = TestEnv::new();
    let path = env.db_path("persist");

    let mut log = ChunkLog::open(&path, CHUNK_SIZE, true).unwrap();
    log.append_entries(&entries(NUM_ENTRIES)).unwrap();
    log.close().unwrap();

    let mut log = ChunkLog::open(&path, CHUNK_SIZE, false).unwrap();
    assert_eq!(log.oldest_id(), 1);
    assert_eq!(log.newest_id(), NUM_ENTRIES as u64);
    for i in 0..NUM_ENTRIES {
        assert_eq!(log.get(i as u64 + 1).unwrap(), entry(i));
    }
    log.close().unwrap();
}

#[test]
fn truncation_survives_close_and_reopen() {
    let env = TestEnv::new();
    let path = env.db_path("persist_truncate");

    let mut log = ChunkLog::open(&path, CHUNK_SIZE, true).unwrap();
    log.append_entries(&entries(NUM_ENTRIES)).unwrap();
    log.truncate(21, 225).unwrap();
    log.close().unwrap();

    let mut log = ChunkLog::open(&path, CHUNK_SIZE, false).unwrap();
    assert_eq!(log.oldest_id(), 21);
    assert_eq!(log.newest_id(), 225);
    for i in 20..225 {
        assert_eq!(log.get(i as u64 + 1).unwrap(), entry(i));
    }
    log.close().unwrap();
}

#[test]
fn empty_log_reopens_empty() {
    let env = TestEnv::new();
    let path = env.db_path("persist_empty");

    let mut log = ChunkLog::open(&path, CHUNK_SIZE, true).unwrap();
    log.sync().unwrap();
    log.close().unwrap();

    let mut log = ChunkLog::open(&path, CHUNK_SIZE, false).unwrap();
    assert_eq!(log.oldest_id(), 0);
    assert_eq!(log.newest_id(), 0);
    assert_eq!(log.append(b"first").unwrap(), 1);
    log.close().unwrap();
}

#[test]
fn stored_chunk_size_wins_on_plain_open() {
    let env = TestEnv::new();
    let path = env.db_path("persist_chunk_size");

    let mut log = ChunkLog::open(&path, CHUNK_SIZE, true).unwrap();
    log.append(b"sized").unwrap();
    log.close().unwrap();

    // the caller-supplied size is ignored when not creating
    let mut log = ChunkLog::open(&path, 9999, false).unwrap();
    assert_eq!(log.get(1).unwrap(), b"sized");
    log.close().unwrap();

    assert_eq!(
        fs::read(path.join("chunk_size")).unwrap(),
        CHUNK_SIZE.to_le_bytes()
    );
}

/* ***** Sync policy */

#[test]
fn disabled_sync_writes_no_metadata() {
    let env = TestEnv::new();
    let path = env.db_path("disable_periodic_sync");

    let mut log =
        ChunkLog::open_with_policy(&path, HUGE_CHUNK, true, SyncPolicy::Never).unwrap();
    log.append_entries(&entries(NUM_ENTRIES * 2)).unwrap();

    // no periodic sync, no seal, no explicit sync: nothing flushed yet
    assert_eq!(fs::metadata(path.join("chunk_0_1.meta")).unwrap().len(), 0);
    assert!(!path.join("oldest").exists());
    log.close().unwrap();
}

#[test]
fn explicit_sync_flushes_the_metadata() {
    let env = TestEnv::new();
    let path = env.db_path("explicit_sync");

    let mut log =
        ChunkLog::open_with_policy(&path, HUGE_CHUNK, true, SyncPolicy::Never).unwrap();
    log.append_entries(&entries(NUM_ENTRIES * 2)).unwrap();
    log.sync().unwrap();

    let meta_len = fs::metadata(path.join("chunk_0_1.meta")).unwrap().len();
    assert_eq!(meta_len, 4 * (NUM_ENTRIES as u64) * 2);
    assert_eq!(fs::read(path.join("oldest")).unwrap(), 1u64.to_le_bytes());
    log.close().unwrap();
}

#[test]
fn set_sync_flushes_immediately() {
    let env = TestEnv::new();
    let path = env.db_path("setsync_syncs");

    let mut log =
        ChunkLog::open_with_policy(&path, HUGE_CHUNK, true, SyncPolicy::Never).unwrap();
    log.append_entries(&entries(NUM_ENTRIES * 2)).unwrap();
    log.set_sync(SyncPolicy::Every(3)).unwrap();

    assert!(fs::metadata(path.join("chunk_0_1.meta")).unwrap().len() > 0);
    log.close().unwrap();
}

#[test]
fn set_sync_to_never_does_not_flush() {
    let env = TestEnv::new();
    let path = env.db_path("setsync_never");

    let mut log =
        ChunkLog::open_with_policy(&path, HUGE_CHUNK, true, SyncPolicy::Never).unwrap();
    log.append(b"unflushed").unwrap();
    log.set_sync(SyncPolicy::Never).unwrap();

    assert_eq!(fs::metadata(path.join("chunk_0_1.meta")).unwrap().len(), 0);
    log.close().unwrap();
}

#[test]
fn every_op_policy_flushes_each_mutation() {
    let env = TestEnv::new();
    let path = env.db_path("sync_every_op");

    let mut log =
        ChunkLog::open_with_policy(&path, HUGE_CHUNK, true, SyncPolicy::EveryOp).unwrap();
    log.append(b"one").unwrap();
    assert_eq!(fs::metadata(path.join("chunk_0_1.meta")).unwrap().len(), 4);
    log.append(b"two").unwrap();
    assert_eq!(fs::metadata(path.join("chunk_0_1.meta")).unwrap().len(), 8);
    log.close().unwrap();
}

#[test]
fn oldest_pointer_is_written_lazily() {
    let env = TestEnv::new();
    let path = env.db_path("lazy_oldest");

    let mut log = ChunkLog::open(&path, HUGE_CHUNK, true).unwrap();
    log.append(b"a").unwrap();
    log.append(b"b").unwrap();
    assert!(!path.join("oldest").exists());

    log.forget(2).unwrap();
    log.sync().unwrap();
    assert_eq!(fs::read(path.join("oldest")).unwrap(), 2u64.to_le_bytes());
    log.close().unwrap();
}

#[test]
fn sealing_a_chunk_syncs_even_when_disabled() {
    let env = TestEnv::new();
    let path = env.db_path("seal_forces_sync");

    let mut log = ChunkLog::open_with_policy(&path, 8, true, SyncPolicy::Never).unwrap();
    log.append(b"12345678").unwrap();
    // the second record does not fit, so the first chunk seals and syncs
    log.append(b"87654321").unwrap();

    assert_eq!(fs::metadata(path.join("chunk_0_1.meta")).unwrap().len(), 4);
    assert!(path.join("oldest").exists());
    log.close().unwrap();
}

#[test]
fn dropping_without_close_still_persists() {
    let env = TestEnv::new();
    let path = env.db_path("drop_persists");

    {
        let mut log =
            ChunkLog::open_with_policy(&path, CHUNK_SIZE, true, SyncPolicy::Never).unwrap();
        log.append(b"kept by drop").unwrap();
    }

    let mut log = ChunkLog::open(&path, CHUNK_SIZE, false).unwrap();
    assert_eq!(log.newest_id(), 1);
    assert_eq!(log.get(1).unwrap(), b"kept by drop");
    log.close().unwrap();
}
