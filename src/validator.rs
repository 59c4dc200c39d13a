//! Sanity checks run on a parsed log before it is trusted for analysis or
//! storage. Ported from the Python original's `BenchmarkValidator`; codes
//! are the stable part of the contract (see spec §6), message text is not.

use serde::{Deserialize, Serialize};

use crate::parser::ParsedLog;

const MIN_DURATION_SECONDS: f64 = 30.0;
const MIN_FRAME_COUNT: usize = 1000;
const MIN_FPS: f64 = 1.0;
const MAX_FPS: f64 = 1000.0;
const LOADING_SCREEN_GAP_MS: f64 = 5000.0;
const KNOWN_MANGOHUD_VERSIONS: &[&str] =
    &["0.7.0", "0.7.1", "0.7.2", "0.7.3", "0.8.0", "0.8.1"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationSeverity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub code: &'static str,
    pub message: String,
    pub severity: ValidationSeverity,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidationMetadata {
    pub frame_count: usize,
    pub duration_seconds: f64,
    pub fps_avg: f64,
    pub loading_screens: Option<LoadingScreensSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadingScreensSummary {
    pub count: usize,
    pub total_duration_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
    pub metadata: ValidationMetadata,
}

impl ValidationResult {
    fn new() -> Self {
        Self {
            valid: true,
            issues: Vec::new(),
            metadata: ValidationMetadata::default(),
        }
    }

    fn add_issue(&mut self, code: &'static str, message: String, severity: ValidationSeverity) {
        if severity == ValidationSeverity::Error {
            self.valid = false;
        }
        self.issues.push(ValidationIssue {
            code,
            message,
            severity,
        });
    }
}

pub fn validate(log: &ParsedLog, mangohud_version: Option<&str>) -> ValidationResult {
    let mut result = ValidationResult::new();

    if log.frames.is_empty() {
        result.add_issue(
            "NO_DATA",
            "log contains no valid frame samples".to_string(),
            ValidationSeverity::Error,
        );
        return result;
    }

    result.metadata.frame_count = log.frames.len();
    result.metadata.duration_seconds = round2(duration_seconds(log));
    result.metadata.fps_avg = round2(average_fps(log));

    check_minimum_duration(log, &mut result);
    check_minimum_frames(log, &mut result);
    check_fps_range(log, &mut result);
    check_frametime_gaps(log, &mut result);
    check_mangohud_version(mangohud_version, &mut result);

    result
}

fn average_fps(log: &ParsedLog) -> f64 {
    let fps_values: Vec<f64> = log.frames.iter().filter_map(|f| f.fps).collect();
    if fps_values.is_empty() {
        return 0.0;
    }
    fps_values.iter().sum::<f64>() / fps_values.len() as f64
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn duration_seconds(log: &ParsedLog) -> f64 {
    log.frames.iter().map(|f| f.frametime_ms).sum::<f64>() / 1000.0
}

fn check_minimum_duration(log: &ParsedLog, result: &mut ValidationResult) {
    let duration = duration_seconds(log);
    if duration < MIN_DURATION_SECONDS {
        result.add_issue(
            "DURATION_TOO_SHORT",
            format!(
                "benchmark duration {duration:.1}s is below the minimum of {MIN_DURATION_SECONDS}s"
            ),
            ValidationSeverity::Error,
        );
    }
}

fn check_minimum_frames(log: &ParsedLog, result: &mut ValidationResult) {
    if log.frames.len() < MIN_FRAME_COUNT {
        result.add_issue(
            "TOO_FEW_FRAMES",
            format!(
                "captured {} frames, below the minimum of {MIN_FRAME_COUNT}",
                log.frames.len()
            ),
            ValidationSeverity::Error,
        );
    }
}

fn check_fps_range(log: &ParsedLog, result: &mut ValidationResult) {
    let out_of_range = log
        .frames
        .iter()
        .filter_map(|f| f.fps)
        .filter(|fps| *fps < MIN_FPS || *fps > MAX_FPS)
        .count();
    if out_of_range > 0 {
        result.add_issue(
            "FPS_OUT_OF_RANGE",
            format!("{out_of_range} frame(s) reported fps outside the sane {MIN_FPS}-{MAX_FPS} range"),
            ValidationSeverity::Warning,
        );
    }
}

fn check_frametime_gaps(log: &ParsedLog, result: &mut ValidationResult) {
    let gaps: Vec<f64> = log
        .frames
        .iter()
        .map(|f| f.frametime_ms)
        .filter(|ft| *ft > LOADING_SCREEN_GAP_MS)
        .collect();

    if !gaps.is_empty() {
        result.add_issue(
            "LOADING_SCREENS_DETECTED",
            format!("{} gap(s) longer than {LOADING_SCREEN_GAP_MS}ms detected", gaps.len()),
            ValidationSeverity::Info,
        );
        result.metadata.loading_screens = Some(LoadingScreensSummary {
            count: gaps.len(),
            total_duration_ms: round2(gaps.iter().sum()),
        });
    }
}

fn check_mangohud_version(version: Option<&str>, result: &mut ValidationResult) {
    let Some(version) = version else {
        return;
    };
    if !KNOWN_MANGOHUD_VERSIONS.contains(&version) {
        result.add_issue(
            "UNKNOWN_MANGOHUD_VERSION",
            format!("overlay version {version} has not been validated against this analyzer"),
            ValidationSeverity::Warning,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::FrameSample;

    fn log_with(frametimes: Vec<f64>) -> ParsedLog {
        ParsedLog {
            frames: frametimes
                .into_iter()
                .map(|ft| FrameSample {
                    frametime_ms: ft,
                    fps: Some(1000.0 / ft),
                    ..Default::default()
                })
                .collect(),
            resolution: None,
            system_info: None,
        }
    }

    #[test]
    fn empty_log_is_invalid_with_no_data_code() {
        let log = ParsedLog::default();
        let result = validate(&log, None);
        assert!(!result.valid);
        assert_eq!(result.issues[0].code, "NO_DATA");
    }

    #[test]
    fn short_benchmark_is_invalid() {
        let log = log_with(vec![16.67; 500]);
        let result = validate(&log, None);
        assert!(!result.valid);
        assert!(result.issues.iter().any(|i| i.code == "DURATION_TOO_SHORT"));
        assert!(result.issues.iter().any(|i| i.code == "TOO_FEW_FRAMES"));
    }

    #[test]
    fn long_steady_benchmark_is_valid() {
        let log = log_with(vec![16.67; 5000]);
        let result = validate(&log, Some("0.8.0"));
        assert!(result.valid);
        assert!(result.issues.is_empty());
    }

    #[test]
    fn unknown_mangohud_version_is_a_warning_not_an_error() {
        let log = log_with(vec![16.67; 5000]);
        let result = validate(&log, Some("9.9.9"));
        assert!(result.valid);
        assert!(result
            .issues
            .iter()
            .any(|i| i.code == "UNKNOWN_MANGOHUD_VERSION" && i.severity == ValidationSeverity::Warning));
    }

    #[test]
    fn loading_screen_gap_is_recorded_in_metadata() {
        let mut frametimes = vec![16.67; 3000];
        frametimes[100] = 6000.0;
        let log = log_with(frametimes);
        let result = validate(&log, None);
        assert!(result.valid);
        let summary = result.metadata.loading_screens.expect("loading screens summary");
        assert_eq!(summary.count, 1);
        assert!((summary.total_duration_ms - 6000.0).abs() < 0.01);
    }

    #[test]
    fn metadata_reports_frame_count_and_duration_for_every_log() {
        let log = log_with(vec![16.67; 5000]);
        let result = validate(&log, None);
        assert_eq!(result.metadata.frame_count, 5000);
        assert!((result.metadata.duration_seconds - 83.35).abs() < 0.5);
        assert!((result.metadata.fps_avg - 60.0).abs() < 1.0);
    }

    #[test]
    fn error_severity_always_implies_invalid() {
        let log = log_with(vec![16.67; 10]);
        let result = validate(&log, None);
        assert!(!result.valid);
        assert!(result
            .issues
            .iter()
            .any(|i| i.severity == ValidationSeverity::Error));
    }
}
