//! Spool lifecycle integration tests
//!
//! Duplicate detection, forced override and the running -> finished transition against a
//! real spool directory

use chrono::{TimeZone, Utc};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Barrier};

use hubmon_core::application::SpoolHarvester;
use hubmon_core::domain::{JobRun, JobRunConfig, SpoolEntryId};
use hubmon_core::port::{JobSpool, SpoolError};
use hubmon_infra_spool::{FsJobSpool, LOCK_FILE_NAME};

fn job(id: &str, secs: i64) -> JobRun {
    let config = JobRunConfig::new(id, vec!["true".to_string()]);
    JobRun::start(&config, "cron", Utc.timestamp_opt(secs, 0).unwrap())
}

fn spool_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n != LOCK_FILE_NAME)
        .collect();
    names.sort();
    names
}

fn read_record(dir: &Path, name: &str) -> JobRun {
    serde_json::from_slice(&fs::read(dir.join(name)).unwrap()).unwrap()
}

/// A running record for the job exists; a non-forced attempt is rejected and filed as
/// finished while the first one stays untouched
#[test]
fn test_duplicate_detection() {
    let tmp = tempfile::tempdir().unwrap();
    let spool = FsJobSpool::new(tmp.path());

    let mut first = job("backup", 1_000);
    let first_entry = spool.new_job(&mut first, false).unwrap();
    let before = fs::read(spool.entry_path(&first_entry)).unwrap();

    let mut second = job("backup", 1_060);
    let err = spool.new_job(&mut second, false).unwrap_err();

    let (job_id, entry) = match err {
        SpoolError::AlreadyRunning { job_id, entry } => (job_id, entry),
        other => panic!("expected AlreadyRunning, got {other}"),
    };
    assert_eq!(job_id, "backup");
    assert!(entry.finished);
    assert_eq!(entry.started_at_unix, 1_060);

    assert_eq!(
        spool_files(tmp.path()),
        vec!["0_1000_6261636b7570.json", "1_1060_6261636b7570.json"]
    );
    assert_eq!(fs::read(spool.entry_path(&first_entry)).unwrap(), before);

    let rejected = read_record(tmp.path(), "1_1060_6261636b7570.json");
    assert_eq!(rejected.errors, vec!["a job with the same ID is already running"]);
    assert_eq!(rejected.exit_code, None);
}

/// Forced attempts delete every prior running record of the job
#[test]
fn test_forced_override() {
    let tmp = tempfile::tempdir().unwrap();
    let spool = FsJobSpool::new(tmp.path());
    spool.new_job(&mut job("backup", 1_000), false).unwrap();
    spool.new_job(&mut job("other", 1_000), false).unwrap();

    let mut forced = job("backup", 2_000);
    let entry = spool.new_job(&mut forced, true).unwrap();

    assert!(!entry.finished);
    assert!(forced.errors.is_empty());
    assert_eq!(
        spool_files(tmp.path()),
        vec!["0_1000_6f74686572.json", "0_2000_6261636b7570.json"]
    );
    assert!(read_record(tmp.path(), "0_2000_6261636b7570.json").errors.is_empty());
}

/// NewJob -> FinishJob leaves exactly one finished file with the same identity
#[test]
fn test_state_transition() {
    let tmp = tempfile::tempdir().unwrap();
    let spool = FsJobSpool::new(tmp.path());

    let mut run = job("backup", 1_000);
    let entry = spool.new_job(&mut run, false).unwrap();

    run.exit_code = Some(0);
    run.finish(Utc.timestamp_opt(1_002, 0).unwrap());
    spool.finish_job(&entry, &run).unwrap();

    let files = spool_files(tmp.path());
    assert_eq!(files, vec!["1_1000_6261636b7570.json"]);

    let finished = SpoolEntryId::parse(&files[0]).unwrap();
    assert_eq!(finished.started_at_unix, entry.started_at_unix);
    assert_eq!(finished.encoded_job_id, entry.encoded_job_id);
    assert_eq!(read_record(tmp.path(), &files[0]), run);

    // Finishing twice is a hard error
    assert!(matches!(
        spool.finish_job(&entry, &run),
        Err(SpoolError::NotFound(_))
    ));
}

/// The metrics side reads finished records back and removes them
#[test]
fn test_harvest_round() {
    let tmp = tempfile::tempdir().unwrap();
    let spool = Arc::new(FsJobSpool::new(tmp.path()));

    let mut done = job("backup", 1_000);
    let entry = spool.new_job(&mut done, false).unwrap();
    done.exit_code = Some(1);
    done.finish(Utc.timestamp_opt(1_005, 0).unwrap());
    spool.finish_job(&entry, &done).unwrap();

    spool.new_job(&mut job("rotate", 1_100), false).unwrap();

    let harvester = SpoolHarvester::new(spool.clone());
    let harvested = harvester.harvest().unwrap();

    assert_eq!(harvested, vec![done]);
    assert_eq!(spool_files(tmp.path()), vec!["0_1100_726f74617465.json"]);
    assert!(harvester.harvest().unwrap().is_empty());
}

/// Tolerates records without optional fields
#[test]
fn test_reads_minimal_records() {
    let tmp = tempfile::tempdir().unwrap();
    let spool = FsJobSpool::new(tmp.path());
    fs::write(
        tmp.path().join("1_1000_6261636b7570.json"),
        br#"{"id":"backup","command":"true","time":"2024-01-01T00:00:00Z","errors":["boom"]}"#,
    )
    .unwrap();

    let finished = spool.get_finished_jobs().unwrap();

    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].1.errors, vec!["boom"]);
    assert_eq!(finished[0].1.duration, None);
}

/// Concurrent registrations of the same job: exactly one wins the running slot
#[test]
fn test_concurrent_new_job() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().to_path_buf();
    let workers = 8;
    let barrier = Arc::new(Barrier::new(workers));

    let handles: Vec<_> = (0..workers)
        .map(|i| {
            let dir = dir.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                let spool = FsJobSpool::new(dir);
                let mut run = job("backup", 1_000 + i as i64);
                barrier.wait();
                spool.new_job(&mut run, false)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for result in &results {
        if let Err(e) = result {
            assert!(
                matches!(e, SpoolError::AlreadyRunning { .. } | SpoolError::Lock { .. }),
                "unexpected error: {e}"
            );
        }
    }

    let running: Vec<_> = spool_files(&dir)
        .into_iter()
        .filter(|n| n.starts_with("0_"))
        .collect();
    assert_eq!(running.len(), 1);
}
