//! On-disk layout and persistence for benchmark runs. Ported from the
//! Python original's `benchmark/storage.py`. Directory shape:
//!
//! ```text
//! {base_dir}/steam_{app_id}/{system_id}/{resolution_class}/run_{n}.json
//! ```

use std::collections::HashMap;
use std::fs::File;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analyzer::RunMetrics;
use crate::error::{BenchError, Result};
use crate::fingerprint::SystemFingerprint;

const RESOLUTION_MAP: &[(&str, &str)] = &[
    ("1920x1080", "FHD"),
    ("2560x1440", "WQHD"),
    ("3840x2160", "UHD"),
];

const RESOLUTION_CLASSES: &[&str] = &["FHD", "WQHD", "UHD", "OTHER"];

/// Every 10th frametime sample, kept so archived runs stay small while
/// still letting a consumer re-derive a rough frame-pacing curve.
const FRAMETIME_DECIMATION: usize = 10;

/// The stable wire format for a persisted run (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_number: u32,
    pub resolution: Option<String>,
    pub system_id: String,
    pub timestamp: DateTime<Utc>,
    pub metrics: RunMetrics,
    pub log_file: Option<PathBuf>,
    pub frametimes: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintRecord {
    #[serde(flatten)]
    pub fingerprint: SystemFingerprint,
    pub hash: String,
    pub system_id: String,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedRuns {
    pub run_count: usize,
    pub fps_average: f64,
    pub fps_minimum: f64,
    pub fps_maximum: f64,
    pub p1_low: f64,
    pub p01_low: f64,
    pub frame_count: usize,
    pub duration_seconds: f64,
    pub last_metrics: RunMetrics,
}

pub fn resolution_class(resolution: Option<&str>) -> &'static str {
    match resolution {
        Some(res) => RESOLUTION_MAP
            .iter()
            .find(|(raw, _)| *raw == res)
            .map(|(_, class)| *class)
            .unwrap_or("OTHER"),
        None => "OTHER",
    }
}

pub struct BenchmarkStorage {
    base_dir: PathBuf,
}

impl BenchmarkStorage {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn game_dir(&self, app_id: &str) -> PathBuf {
        self.base_dir.join(format!("steam_{app_id}"))
    }

    fn system_root(&self, app_id: &str, system_id: &str) -> PathBuf {
        self.game_dir(app_id).join(system_id)
    }

    pub fn run_dir(&self, app_id: &str, system_id: &str, resolution: Option<&str>) -> PathBuf {
        self.system_root(app_id, system_id)
            .join(resolution_class(resolution))
    }

    /// Writes the system's fingerprint alongside its run directories so a
    /// consumer can identify the hardware behind a set of runs without
    /// re-deriving it from the system_id hash.
    pub fn save_fingerprint(
        &self,
        app_id: &str,
        system_id: &str,
        fingerprint: &SystemFingerprint,
    ) -> Result<()> {
        let dir = self.system_root(app_id, system_id);
        std::fs::create_dir_all(&dir)?;
        let record = FingerprintRecord {
            hash: fingerprint.hash(),
            system_id: system_id.to_string(),
            saved_at: Utc::now(),
            fingerprint: fingerprint.clone(),
        };
        let contents = serde_json::to_string_pretty(&record)?;
        write_atomic(&dir.join("fingerprint.json"), contents.as_bytes())
    }

    /// Persists a run, numbering it `existing_count + 1` with retry on a
    /// numbering collision from a concurrent writer, rather than trusting
    /// a single up-front count the way the source implementation does. The
    /// run number is reserved with an exclusive create, then the record is
    /// written to a temp file and renamed into place, so a reader never
    /// observes a partially written `run_{n}.json`.
    pub fn save_run(
        &self,
        app_id: &str,
        system_id: &str,
        resolution: Option<&str>,
        metrics: &RunMetrics,
        frametimes: &[f64],
        log_file: Option<PathBuf>,
    ) -> Result<RunRecord> {
        let dir = self.run_dir(app_id, system_id, resolution);
        std::fs::create_dir_all(&dir)?;

        let timestamp = Utc::now();
        let decimated: Vec<f64> = frametimes
            .iter()
            .step_by(FRAMETIME_DECIMATION)
            .copied()
            .collect();

        const MAX_ATTEMPTS: u32 = 20;
        for _ in 0..MAX_ATTEMPTS {
            let next_number = existing_run_count(&dir)? + 1;
            let path = dir.join(format!("run_{next_number}.json"));

            let record = RunRecord {
                run_number: next_number,
                resolution: resolution.map(str::to_string),
                system_id: system_id.to_string(),
                timestamp,
                metrics: metrics.clone(),
                log_file: log_file.clone(),
                frametimes: decimated.clone(),
            };

            // Reserve the run number with an exclusive create before writing
            // any content, so a losing writer sees `AlreadyExists` and moves
            // on to the next number instead of racing on the real write.
            let reservation = File::options().write(true).create_new(true).open(&path);
            match reservation {
                Ok(f) => {
                    drop(f);
                    let contents = serde_json::to_string_pretty(&record)?;
                    let tmp_path = dir.join(format!(".run_{next_number}.json.tmp"));
                    {
                        let mut tmp = File::create(&tmp_path)?;
                        tmp.write_all(contents.as_bytes())?;
                        tmp.sync_all()?;
                    }
                    std::fs::rename(&tmp_path, &path)?;
                    return Ok(record);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(BenchError::Io(e)),
            }
        }

        Err(BenchError::Storage(format!(
            "could not allocate a run number under {} after {MAX_ATTEMPTS} attempts",
            dir.display()
        )))
    }

    pub fn get_runs(
        &self,
        app_id: &str,
        system_id: &str,
        resolution: Option<&str>,
    ) -> Result<Vec<RunRecord>> {
        let dir = self.run_dir(app_id, system_id, resolution);
        read_runs_from_dir(&dir)
    }

    /// Tolerates the legacy layout (`{game_dir}/{resolution_class}/run_*.json`
    /// with no system_id level), tagging those runs `system_id = "legacy"`.
    pub fn get_all_systems_data(&self, app_id: &str) -> Result<HashMap<String, Vec<RunRecord>>> {
        let mut out: HashMap<String, Vec<RunRecord>> = HashMap::new();
        let game_dir = self.game_dir(app_id);
        if !game_dir.is_dir() {
            return Ok(out);
        }

        for first_entry in std::fs::read_dir(&game_dir)? {
            let first_path = first_entry?.path();
            if !first_path.is_dir() {
                continue;
            }
            let Some(name) = first_path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            if RESOLUTION_CLASSES.contains(&name) {
                let direct_runs = read_runs_from_dir(&first_path)?;
                if !direct_runs.is_empty() {
                    out.entry("legacy".to_string())
                        .or_default()
                        .extend(direct_runs);
                    continue;
                }
            }

            let system_id = name.to_string();
            for res_entry in std::fs::read_dir(&first_path)? {
                let res_path = res_entry?.path();
                if !res_path.is_dir() {
                    continue;
                }
                let runs = read_runs_from_dir(&res_path)?;
                if !runs.is_empty() {
                    out.entry(system_id.clone()).or_default().extend(runs);
                }
            }
        }

        Ok(out)
    }

    pub fn aggregate_runs(&self, runs: &[RunRecord]) -> Option<AggregatedRuns> {
        if runs.is_empty() {
            return None;
        }

        let n = runs.len() as f64;
        let fps_average = runs.iter().map(|r| r.metrics.fps.average).sum::<f64>() / n;
        let fps_minimum = runs
            .iter()
            .map(|r| r.metrics.fps.minimum)
            .fold(f64::INFINITY, f64::min);
        let fps_maximum = runs
            .iter()
            .map(|r| r.metrics.fps.maximum)
            .fold(f64::NEG_INFINITY, f64::max);
        let p1_low = runs.iter().map(|r| r.metrics.fps.p1_low).sum::<f64>() / n;
        let p01_low = runs.iter().map(|r| r.metrics.fps.p01_low).sum::<f64>() / n;
        let frame_count = runs.iter().map(|r| r.metrics.fps.frame_count).sum();
        let duration_seconds = runs.iter().map(|r| r.metrics.fps.duration_seconds).sum();

        Some(AggregatedRuns {
            run_count: runs.len(),
            fps_average: round2(fps_average),
            fps_minimum: round2(fps_minimum),
            fps_maximum: round2(fps_maximum),
            p1_low: round2(p1_low),
            p01_low: round2(p01_low),
            frame_count,
            duration_seconds: round2(duration_seconds),
            last_metrics: runs.last().unwrap().metrics.clone(),
        })
    }
}

fn existing_run_count(dir: &Path) -> Result<u32> {
    if !dir.is_dir() {
        return Ok(0);
    }
    let count = std::fs::read_dir(dir)?
        .flatten()
        .filter(|e| {
            e.path()
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("run_") && n.ends_with(".json"))
        })
        .count();
    Ok(count as u32)
}

fn read_runs_from_dir(dir: &Path) -> Result<Vec<RunRecord>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut runs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !(name.starts_with("run_") && name.ends_with(".json")) {
            continue;
        }
        let contents = std::fs::read_to_string(&path)?;
        if let Ok(record) = serde_json::from_str::<RunRecord>(&contents) {
            runs.push(record);
        }
    }
    runs.sort_by_key(|r| r.run_number);
    Ok(runs)
}

/// Writes `contents` to `path` via a temp file + rename so a reader never
/// observes a partially written file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;
    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("out")
    ));
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
