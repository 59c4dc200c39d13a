//! Drives a single benchmark session end to end: pre-flight checks, overlay
//! config and launch-option setup, launching the game, waiting for the
//! overlay log to finish writing, and restoring whatever was changed.
//! Ported from the Python original's `benchmark/runner.py`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::analyzer::RunMetrics;
use crate::config::OrchestratorConfig;
use crate::error::{BenchError, Result};
use crate::storage::BenchmarkStorage;

/// The session state machine, named and sequenced as the orchestrator
/// actually moves through them:
///
/// ```text
/// Idle -> Setup -> Launching -> Waiting -> Recording -> Analyzing -> Results
/// {any non-terminal state} -> Restoring -> Idle   (error or cancel)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Setup,
    Launching,
    Waiting,
    Recording,
    Analyzing,
    Results,
    Restoring,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub app_id: String,
    pub duration_secs: u64,
    pub output_dir: PathBuf,
    /// Fingerprint-derived id of the machine running the capture; threaded
    /// through to `BenchmarkStorage::save_run` so the persisted run lands
    /// under the right system/resolution directory.
    pub system_id: String,
    pub resolution: Option<String>,
    /// Base directory `BenchmarkStorage` persists the analyzed run under.
    pub results_base_dir: PathBuf,
}

/// A multi-run series: `runs` back-to-back captures separated by a cooldown,
/// with `warmup_runs` leading captures whose logs are discarded. Added per
/// the original's `BenchmarkRunner.run`, layered on top of the single-run
/// state machine below rather than replacing it.
#[derive(Debug, Clone)]
pub struct SeriesConfig {
    pub session: SessionConfig,
    pub runs: u32,
    pub warmup_runs: u32,
    pub cooldown_secs: u64,
}

/// Adds the orchestrator's fixed buffer to a configured log duration — the
/// overlay's internal timing is imprecise enough that a capture cut off at
/// exactly `duration_secs` risks truncating the last frame.
pub fn effective_duration(config: &OrchestratorConfig, duration_secs: u64) -> Duration {
    Duration::from_secs(duration_secs + config.duration_buffer_secs)
}

/// Abstracts the two mutable pieces of host state a benchmark session
/// touches: the overlay's config file and the game launcher's launch
/// options. A fake implementation lets orchestrator tests run without
/// touching a real MangoHud config or Steam install.
pub trait LaunchOptionsBackend: Send + Sync {
    fn backup_overlay_config(&self) -> Result<String>;
    fn write_overlay_config(&self, contents: &str) -> Result<()>;
    fn restore_overlay_config(&self, backup: &str) -> Result<()>;

    fn backup_launch_options(&self, app_id: &str) -> Result<String>;
    fn set_launch_options(&self, app_id: &str, options: &str) -> Result<()>;
    fn restore_launch_options(&self, app_id: &str, backup: &str) -> Result<()>;

    fn launch(&self, app_id: &str) -> Result<()>;
}

/// Guards the overlay config path against two sessions running at once, the
/// way a PID file guards a single-instance daemon: acquiring while another
/// holder's lock file exists is a pre-flight error, not a queued wait.
struct SessionLock {
    path: PathBuf,
}

impl SessionLock {
    fn acquire(overlay_config_path: &Path) -> Result<Self> {
        let path = lock_path(overlay_config_path);
        let file = std::fs::File::options()
            .write(true)
            .create_new(true)
            .open(&path);
        match file {
            Ok(_) => Ok(Self { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(BenchError::LockContention(format!(
                    "another session already holds the lock at {}",
                    path.display()
                )))
            }
            Err(e) => Err(BenchError::Io(e)),
        }
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("failed to remove session lock {}: {e}", self.path.display());
        }
    }
}

fn lock_path(overlay_config_path: &Path) -> PathBuf {
    let mut name = overlay_config_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("overlay")
        .to_string();
    name.push_str(".lock");
    overlay_config_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(name)
}

/// Scoped acquisition of the overlay config: on construction it backs up
/// and overwrites the config, on `release` it restores the backup. Not a
/// `Drop` impl because restoration can fail and failures must be logged,
/// not silently swallowed or panicked on in a destructor.
struct OverlayConfigGuard<'a> {
    backend: &'a dyn LaunchOptionsBackend,
    backup: String,
    released: bool,
}

impl<'a> OverlayConfigGuard<'a> {
    fn acquire(backend: &'a dyn LaunchOptionsBackend, new_contents: &str) -> Result<Self> {
        let backup = backend.backup_overlay_config()?;
        backend.write_overlay_config(new_contents)?;
        Ok(Self {
            backend,
            backup,
            released: false,
        })
    }

    fn release(mut self) {
        self.released = true;
        if let Err(e) = self.backend.restore_overlay_config(&self.backup) {
            warn!("failed to restore overlay config: {e}");
        }
    }
}

impl Drop for OverlayConfigGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.backend.restore_overlay_config(&self.backup) {
                warn!("failed to restore overlay config on drop: {e}");
            }
        }
    }
}

struct LaunchOptionsGuard<'a> {
    backend: &'a dyn LaunchOptionsBackend,
    app_id: String,
    backup: String,
    released: bool,
}

impl<'a> LaunchOptionsGuard<'a> {
    fn acquire(backend: &'a dyn LaunchOptionsBackend, app_id: &str, options: &str) -> Result<Self> {
        let backup = backend.backup_launch_options(app_id)?;
        backend.set_launch_options(app_id, options)?;
        Ok(Self {
            backend,
            app_id: app_id.to_string(),
            backup,
            released: false,
        })
    }

    fn release(mut self) {
        self.released = true;
        if let Err(e) = self.backend.restore_launch_options(&self.app_id, &self.backup) {
            warn!("failed to restore launch options: {e}");
        }
    }
}

impl Drop for LaunchOptionsGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.backend.restore_launch_options(&self.app_id, &self.backup) {
                warn!("failed to restore launch options on drop: {e}");
            }
        }
    }
}

/// Checks that the tools a session needs are on PATH, and that the
/// configured GPU PCI address (if any) and overlay config lock are free,
/// before touching any host state.
pub fn preflight_check(config: &OrchestratorConfig, overlay_config_path: &Path) -> Result<()> {
    for binary in [
        &config.overlay_binary_name,
        &config.game_launcher_binary_name,
    ] {
        if which::which(binary).is_err() {
            return Err(BenchError::PreFlight(format!("required binary not found on PATH: {binary}")));
        }
    }

    if let Some(pci_address) = &config.gpu_pci_address {
        let sysfs_path = PathBuf::from("/sys/bus/pci/devices").join(pci_address);
        if !sysfs_path.exists() {
            return Err(BenchError::PreFlight(format!(
                "configured GPU PCI address {pci_address} not found under /sys/bus/pci/devices"
            )));
        }
    }

    let lock = SessionLock::acquire(overlay_config_path)?;
    drop(lock);
    Ok(())
}

/// Runs one benchmark session: pre-flight, overlay+launch-option setup,
/// launch, wait for the log to stabilize, analyze and persist the capture,
/// then restore host state regardless of how the session concluded.
pub async fn run_session(
    config: &OrchestratorConfig,
    session: &SessionConfig,
    backend: &dyn LaunchOptionsBackend,
    overlay_config_path: &Path,
    overlay_config_contents: &str,
    launch_options: &str,
    cancel: tokio::sync::watch::Receiver<bool>,
) -> Result<RunMetrics> {
    preflight_check(config, overlay_config_path)?;
    let lock = SessionLock::acquire(overlay_config_path)?;

    let overlay_guard = OverlayConfigGuard::acquire(backend, overlay_config_contents)?;
    let launch_guard = LaunchOptionsGuard::acquire(backend, &session.app_id, launch_options)?;

    info!(app_id = %session.app_id, state = ?SessionState::Launching, "launching benchmark session");
    let launch_result = backend.launch(&session.app_id);

    let outcome = match launch_result {
        Ok(()) => {
            let wait_result = wait_for_log_completion(
                &session.output_dir,
                effective_duration(config, session.duration_secs)
                    .max(Duration::from_secs(config.recording_timeout_secs)),
                Duration::from_millis(config.poll_interval_ms),
                config.stability_samples,
                cancel,
            )
            .await;

            match wait_result {
                Ok(log_path) => {
                    info!(
                        app_id = %session.app_id,
                        state = ?SessionState::Analyzing,
                        log = %log_path.display(),
                        "log stabilized, analyzing capture"
                    );
                    analyze_and_persist(session, &log_path)
                }
                Err(e) => Err(e),
            }
        }
        Err(e) => Err(e),
    };

    launch_guard.release();
    overlay_guard.release();
    drop(lock);

    match outcome {
        Ok(metrics) => {
            info!(app_id = %session.app_id, state = ?SessionState::Results, "session complete");
            Ok(metrics)
        }
        Err(e) => Err(e),
    }
}

/// The `Analyzing` phase: parse the stabilized log, reject it if it fails
/// validation, then analyze and persist it under the session's system_id
/// and resolution.
fn analyze_and_persist(session: &SessionConfig, log_path: &Path) -> Result<RunMetrics> {
    let parsed = crate::parser::parse_log_file(log_path)?;

    let validation = crate::validator::validate(&parsed, None);
    if !validation.valid {
        let reasons: Vec<String> = validation
            .issues
            .iter()
            .filter(|i| i.severity == crate::validator::ValidationSeverity::Error)
            .map(|i| i.message.clone())
            .collect();
        return Err(BenchError::Validation(reasons.join("; ")));
    }

    let metrics = crate::analyzer::analyze(&parsed)?;
    let frametimes: Vec<f64> = parsed.frames.iter().map(|f| f.frametime_ms).collect();

    let storage = BenchmarkStorage::new(session.results_base_dir.clone());
    storage.save_run(
        &session.app_id,
        &session.system_id,
        session.resolution.as_deref(),
        &metrics,
        &frametimes,
        Some(log_path.to_path_buf()),
    )?;

    Ok(metrics)
}

/// Runs `series.runs` captures back to back, discarding the first
/// `series.warmup_runs` and sleeping `cooldown_secs` between captures.
/// Each element of the result corresponds to one non-warmup run. Warmup
/// runs are analyzed and persisted the same as any other run (so a warmup
/// failure is still visible in the logs) but excluded from the returned
/// Vec.
pub async fn run_series(
    config: &OrchestratorConfig,
    series: &SeriesConfig,
    backend: &dyn LaunchOptionsBackend,
    overlay_config_path: &Path,
    overlay_config_contents: &str,
    launch_options: &str,
) -> Vec<Result<RunMetrics>> {
    let total = series.warmup_runs + series.runs;
    let mut results = Vec::with_capacity(series.runs as usize);

    for i in 0..total {
        let is_warmup = i < series.warmup_runs;
        let (_tx, rx) = tokio::sync::watch::channel(false);

        let outcome = run_session(
            config,
            &series.session,
            backend,
            overlay_config_path,
            overlay_config_contents,
            launch_options,
            rx,
        )
        .await;

        if is_warmup {
            debug!(run = i + 1, "discarding warmup run from results");
        } else {
            results.push(outcome);
        }

        if i + 1 < total {
            tokio::time::sleep(Duration::from_secs(series.cooldown_secs)).await;
        }
    }

    results
}

/// Waits for a new `.csv` file to appear under `output_dir` (the `Waiting`
/// phase) and then for its size to hold steady across `stability_samples`
/// consecutive polls (the `Recording` phase), treating that as "the overlay
/// finished writing the log". Each phase times out with its own stable code
/// so a caller can tell a game that never launched from one that launched
/// but produced a log the overlay never finished writing. A cancellation is
/// reported as `BenchError::Cancelled`, distinct from either timeout, so a
/// caller deriving user-visible status from the error doesn't mistake a
/// user-initiated cancel for the overlay/game hanging.
async fn wait_for_log_completion(
    output_dir: &Path,
    timeout: Duration,
    poll_interval: Duration,
    stability_samples: u32,
    mut cancel: tokio::sync::watch::Receiver<bool>,
) -> Result<PathBuf> {
    let initial: std::collections::HashSet<PathBuf> = list_csv_files(output_dir);
    let deadline = Instant::now() + timeout;

    let new_file = loop {
        if *cancel.borrow() {
            return Err(BenchError::Cancelled(
                "session cancelled while waiting for log".to_string(),
            ));
        }
        if Instant::now() >= deadline {
            return Err(BenchError::Timeout(format!(
                "TIMEOUT_WAITING_FOR_RECORDING: no new log file appeared under {} within {:?}",
                output_dir.display(),
                timeout
            )));
        }

        let current = list_csv_files(output_dir);
        if let Some(new_file) = current.difference(&initial).next() {
            break new_file.clone();
        }

        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {}
            _ = cancel.changed() => {}
        }
    };

    let mut last_size = None;
    let mut stable_count = 0;

    loop {
        if *cancel.borrow() {
            return Err(BenchError::Cancelled(
                "session cancelled while stabilizing log".to_string(),
            ));
        }
        if Instant::now() >= deadline {
            return Err(BenchError::Timeout(format!(
                "TIMEOUT_WAITING_FOR_COMPLETION: log at {} never stabilized within {:?}",
                new_file.display(),
                timeout
            )));
        }

        let size = std::fs::metadata(&new_file).map(|m| m.len()).unwrap_or(0);
        if size > 0 && Some(size) == last_size {
            stable_count += 1;
            if stable_count >= stability_samples {
                return Ok(new_file);
            }
        } else {
            stable_count = 0;
        }
        last_size = Some(size);

        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {}
            _ = cancel.changed() => {}
        }
    }
}

fn list_csv_files(dir: &Path) -> std::collections::HashSet<PathBuf> {
    std::fs::read_dir(dir)
        .into_iter()
        .flatten()
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("csv"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeBackend {
        log_dir: PathBuf,
        log_delay_writes: Mutex<Vec<(u64, usize)>>,
    }

    impl LaunchOptionsBackend for FakeBackend {
        fn backup_overlay_config(&self) -> Result<String> {
            Ok("original overlay config".to_string())
        }
        fn write_overlay_config(&self, _contents: &str) -> Result<()> {
            Ok(())
        }
        fn restore_overlay_config(&self, _backup: &str) -> Result<()> {
            Ok(())
        }
        fn backup_launch_options(&self, _app_id: &str) -> Result<String> {
            Ok("original launch options".to_string())
        }
        fn set_launch_options(&self, _app_id: &str, _options: &str) -> Result<()> {
            Ok(())
        }
        fn restore_launch_options(&self, _app_id: &str, _backup: &str) -> Result<()> {
            Ok(())
        }
        fn launch(&self, _app_id: &str) -> Result<()> {
            let writes = self.log_delay_writes.lock().unwrap().clone();
            let dir = self.log_dir.clone();
            tokio::spawn(async move {
                for (delay_ms, size) in writes {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    std::fs::write(dir.join("run.csv"), vec![b'x'; size]).unwrap();
                }
            });
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_log_completion_detects_stable_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FakeBackend {
            log_dir: dir.path().to_path_buf(),
            log_delay_writes: Mutex::new(vec![(10, 100), (10, 100), (10, 100)]),
        };
        backend.launch("440").unwrap();

        let (_tx, rx) = tokio::sync::watch::channel(false);
        let result = wait_for_log_completion(
            dir.path(),
            Duration::from_secs(5),
            Duration::from_millis(5),
            2,
            rx,
        )
        .await;

        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_log_completion_times_out_with_waiting_code_when_no_file_appears() {
        let dir = tempfile::tempdir().unwrap();
        let (_tx, rx) = tokio::sync::watch::channel(false);
        let result = wait_for_log_completion(
            dir.path(),
            Duration::from_millis(20),
            Duration::from_millis(5),
            2,
            rx,
        )
        .await;
        match result {
            Err(BenchError::Timeout(msg)) => {
                assert!(msg.starts_with("TIMEOUT_WAITING_FOR_RECORDING"))
            }
            other => panic!("expected a recording timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_log_completion_times_out_with_completion_code_when_file_never_stabilizes() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FakeBackend {
            log_dir: dir.path().to_path_buf(),
            log_delay_writes: Mutex::new(vec![(5, 50)]),
        };
        backend.launch("440").unwrap();

        let (_tx, rx) = tokio::sync::watch::channel(false);
        let result = wait_for_log_completion(
            dir.path(),
            Duration::from_millis(30),
            Duration::from_millis(5),
            50,
            rx,
        )
        .await;
        match result {
            Err(BenchError::Timeout(msg)) => {
                assert!(msg.starts_with("TIMEOUT_WAITING_FOR_COMPLETION"))
            }
            other => panic!("expected a completion timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_short_circuits_the_wait_with_a_distinct_error() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = tokio::sync::watch::channel(false);
        tx.send(true).unwrap();
        let result = wait_for_log_completion(
            dir.path(),
            Duration::from_secs(30),
            Duration::from_millis(5),
            2,
            rx,
        )
        .await;
        assert!(matches!(result, Err(BenchError::Cancelled(_))));
    }

    #[test]
    fn preflight_fails_fast_on_missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let config = OrchestratorConfig {
            overlay_binary_name: "definitely-not-a-real-binary-xyz".to_string(),
            ..OrchestratorConfig::default()
        };
        assert!(preflight_check(&config, &dir.path().join("overlay.conf")).is_err());
    }

    #[test]
    fn preflight_fails_on_missing_gpu_pci_address() {
        let dir = tempfile::tempdir().unwrap();
        let config = OrchestratorConfig {
            overlay_binary_name: "sh".to_string(),
            game_launcher_binary_name: "sh".to_string(),
            gpu_pci_address: Some("0000:99:99.9".to_string()),
            ..OrchestratorConfig::default()
        };
        let result = preflight_check(&config, &dir.path().join("overlay.conf"));
        assert!(matches!(result, Err(BenchError::PreFlight(_))));
    }

    #[test]
    fn second_lock_acquisition_is_contention_while_first_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let overlay_path = dir.path().join("overlay.conf");
        let first = SessionLock::acquire(&overlay_path).unwrap();
        let second = SessionLock::acquire(&overlay_path);
        assert!(matches!(second, Err(BenchError::LockContention(_))));
        drop(first);
        assert!(SessionLock::acquire(&overlay_path).is_ok());
    }

    #[test]
    fn effective_duration_adds_the_configured_buffer() {
        let config = OrchestratorConfig {
            duration_buffer_secs: 1,
            ..OrchestratorConfig::default()
        };
        assert_eq!(effective_duration(&config, 60), Duration::from_secs(61));
    }

    /// Writes a valid overlay log in one shot instead of dribbling it in
    /// over several delayed writes, so the session's `Recording` phase
    /// still has something to stabilize against.
    struct InstantLogBackend {
        log_dir: PathBuf,
        csv_contents: String,
    }

    impl LaunchOptionsBackend for InstantLogBackend {
        fn backup_overlay_config(&self) -> Result<String> {
            Ok("original overlay config".to_string())
        }
        fn write_overlay_config(&self, _contents: &str) -> Result<()> {
            Ok(())
        }
        fn restore_overlay_config(&self, _backup: &str) -> Result<()> {
            Ok(())
        }
        fn backup_launch_options(&self, _app_id: &str) -> Result<String> {
            Ok("original launch options".to_string())
        }
        fn set_launch_options(&self, _app_id: &str, _options: &str) -> Result<()> {
            Ok(())
        }
        fn restore_launch_options(&self, _app_id: &str, _backup: &str) -> Result<()> {
            Ok(())
        }
        fn launch(&self, _app_id: &str) -> Result<()> {
            std::fs::write(self.log_dir.join("run.csv"), &self.csv_contents)?;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn successful_session_analyzes_and_persists_the_run() {
        let output_dir = tempfile::tempdir().unwrap();
        let results_dir = tempfile::tempdir().unwrap();

        let mut csv = String::from("frametime,fps\n");
        for _ in 0..2000 {
            csv.push_str("16.67,59.98\n");
        }
        let backend = InstantLogBackend {
            log_dir: output_dir.path().to_path_buf(),
            csv_contents: csv,
        };

        let config = OrchestratorConfig {
            overlay_binary_name: "sh".to_string(),
            game_launcher_binary_name: "sh".to_string(),
            poll_interval_ms: 1,
            stability_samples: 2,
            recording_timeout_secs: 2,
            ..OrchestratorConfig::default()
        };
        let session = SessionConfig {
            app_id: "440".to_string(),
            duration_secs: 1,
            output_dir: output_dir.path().to_path_buf(),
            system_id: "arch_ab12cd34".to_string(),
            resolution: Some("1920x1080".to_string()),
            results_base_dir: results_dir.path().to_path_buf(),
        };
        let (_tx, rx) = tokio::sync::watch::channel(false);

        let metrics = run_session(
            &config,
            &session,
            &backend,
            &results_dir.path().join("overlay.conf"),
            "overlay config contents",
            "launch options",
            rx,
        )
        .await
        .unwrap();

        assert!((metrics.fps.average - 60.0).abs() < 1.0);

        let storage = BenchmarkStorage::new(results_dir.path().to_path_buf());
        let runs = storage
            .get_runs("440", "arch_ab12cd34", Some("1920x1080"))
            .unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].log_file, Some(output_dir.path().join("run.csv")));
    }
}
