//! Runner scenarios against a real spool directory
//!
//! Process-based cases use `true`, `false`, `sh` and `sleep` and only run on unix.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hubmon_core::application::CaptureBuffer;

/// Retained tail is the last min(len, N) bytes whatever the chunking
#[test]
fn test_capture_invariance() {
    let data: Vec<u8> = (0..4096u32).map(|i| (i * 31 % 251) as u8).collect();

    for capacity in [1usize, 16, 100, 4095, 4096, 5000] {
        let expected = &data[data.len().saturating_sub(capacity)..];

        // Irregular chunk sizes: 1, 2, 3, ... cycling up to 17
        let mut chunked = CaptureBuffer::new(io::sink(), capacity);
        let mut offset = 0;
        let mut size = 1;
        while offset < data.len() {
            let end = (offset + size).min(data.len());
            chunked.write_all(&data[offset..end]).unwrap();
            offset = end;
            size = size % 17 + 1;
        }

        let mut whole = CaptureBuffer::new(io::sink(), capacity);
        whole.write_all(&data).unwrap();

        assert_eq!(chunked.retained(), expected, "capacity {}", capacity);
        assert_eq!(whole.retained(), expected, "capacity {}", capacity);
    }
}

#[cfg(unix)]
mod unix {
    use super::*;
    use hubmon_core::application::{interrupt_channel, InterruptToken};
    use hubmon_core::domain::JobRunConfig;
    use hubmon_core::port::time_provider::SystemTimeProvider;
    use hubmon_core::port::user_provider::StaticUserProvider;
    use hubmon_core::port::{JobExecutor, JobSpool};
    use hubmon_infra_spool::FsJobSpool;
    use hubmon_infra_system::SubprocessJobRunner;
    use std::path::Path;

    fn runner(dir: &Path) -> SubprocessJobRunner {
        SubprocessJobRunner::new(
            Arc::new(FsJobSpool::new(dir)),
            Arc::new(SystemTimeProvider),
            Arc::new(StaticUserProvider("cron".to_string())),
        )
        .with_tee(false)
    }

    fn config(command: &[&str]) -> JobRunConfig {
        JobRunConfig::new("backup", command.iter().map(|s| s.to_string()).collect())
    }

    /// Scenario A
    #[tokio::test]
    async fn test_true_succeeds() {
        let tmp = tempfile::tempdir().unwrap();

        let job = runner(tmp.path())
            .run_job(&config(&["true"]), InterruptToken::never())
            .await
            .unwrap();

        assert_eq!(job.exit_code, Some(0));
        assert!(job.duration.unwrap() <= 1);
        assert!(job.errors.is_empty());

        let finished = FsJobSpool::new(tmp.path()).get_finished_jobs().unwrap();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].1, job);
    }

    /// Scenario B
    #[tokio::test]
    async fn test_false_records_exit_code() {
        let tmp = tempfile::tempdir().unwrap();

        let job = runner(tmp.path())
            .run_job(&config(&["false"]), InterruptToken::never())
            .await
            .unwrap();

        assert_eq!(job.exit_code, Some(1));
    }

    /// Scenario C: a crashed run left its running record behind
    #[tokio::test]
    async fn test_stale_running_record_blocks_next_run() {
        let tmp = tempfile::tempdir().unwrap();
        let spool = FsJobSpool::new(tmp.path());
        let mut crashed =
            hubmon_core::domain::JobRun::start(&config(&["true"]), "cron", chrono::Utc::now());
        spool.new_job(&mut crashed, false).unwrap();

        let marker = tmp.path().join("executed");
        let touch = format!("touch {}", marker.display());

        let err = runner(tmp.path())
            .run_job(&config(&["sh", "-c", &touch]), InterruptToken::never())
            .await
            .unwrap_err();

        assert!(err.is_already_running());
        assert!(!marker.exists(), "command must not run");

        let finished = spool.get_finished_jobs().unwrap();
        assert_eq!(finished.len(), 1);
        assert_eq!(
            finished[0].1.errors,
            vec!["a job with the same ID is already running"]
        );
        assert_eq!(finished[0].1.exit_code, None);
    }

    /// Scenario C with --force: the stale record is replaced and the command runs
    #[tokio::test]
    async fn test_forced_run_replaces_stale_record() {
        let tmp = tempfile::tempdir().unwrap();
        let spool = FsJobSpool::new(tmp.path());
        let mut crashed = hubmon_core::domain::JobRun::start(
            &config(&["true"]),
            "cron",
            chrono::Utc::now() - chrono::Duration::hours(1),
        );
        spool.new_job(&mut crashed, false).unwrap();

        // The command lists the spool while it runs
        let listing = tempfile::NamedTempFile::new().unwrap();
        let list = format!("ls -A {} > {}", tmp.path().display(), listing.path().display());
        let mut cfg = config(&["sh", "-c", &list]);
        cfg.force = true;
        let job = runner(tmp.path())
            .run_job(&cfg, InterruptToken::never())
            .await
            .unwrap();

        assert_eq!(job.exit_code, Some(0));
        assert!(job.errors.is_empty());

        let during: Vec<String> = std::fs::read_to_string(listing.path())
            .unwrap()
            .lines()
            .filter(|name| name.ends_with(".json"))
            .map(str::to_string)
            .collect();
        assert_eq!(during.len(), 1, "spool during run: {:?}", during);
        assert!(during[0].starts_with("0_"), "spool during run: {:?}", during);

        let finished = spool.get_finished_jobs().unwrap();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].1, job);
    }

    /// Timeout wins over a long sleep
    #[tokio::test]
    async fn test_timeout_annotation() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = config(&["sleep", "30"]);
        cfg.max_execution_time = Some(Duration::from_secs(2));

        let started = Instant::now();
        let job = runner(tmp.path())
            .run_job(&cfg, InterruptToken::never())
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(job.exit_code, None);
        assert!(job
            .errors
            .iter()
            .any(|e| e.contains("max execution time of 2s exceeded")));
        let duration = job.duration.unwrap();
        assert!((2..=3).contains(&duration), "duration was {}", duration);
    }

    #[tokio::test]
    async fn test_interruption_kills_process_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let (tx, token) = interrupt_channel();
        let dir = tmp.path().to_path_buf();

        let handle = tokio::spawn(async move {
            runner(&dir)
                .run_job(&config(&["sh", "-c", "sleep 30 & sleep 30; wait"]), token)
                .await
        });
        tokio::time::sleep(Duration::from_millis(300)).await;
        tx.interrupt();

        let job = tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .expect("runner should return after interruption")
            .unwrap()
            .unwrap();

        assert!(job
            .errors
            .iter()
            .any(|e| e.contains("external interruption")));
        assert_eq!(job.exit_code, None);
    }

    #[tokio::test]
    async fn test_output_tail_recorded() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = config(&["sh", "-c", "seq 1 500; echo failing >&2; exit 2"]);
        cfg.record_stdout = true;
        cfg.record_stderr = true;

        let job = runner(tmp.path())
            .run_job(&cfg, InterruptToken::never())
            .await
            .unwrap();

        assert_eq!(job.exit_code, Some(2));
        let stdout = job.stdout.unwrap();
        assert_eq!(stdout.len(), 100);
        assert!(stdout.ends_with("499\n500\n"));
        assert_eq!(job.stderr.as_deref(), Some("failing\n"));
    }
}
