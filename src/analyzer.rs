//! Frametime analysis: FPS statistics, stutter/transition classification,
//! frame pacing, FPS-drop detection, bottleneck analysis, and an overall
//! quality summary. See spec §4.2.

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};
use crate::parser::ParsedLog;

const TRANSITION_THRESHOLD_MS: f64 = 50.0;
const TRANSITION_WINDOW: usize = 5;
const TRANSITION_NORMAL_MS: f64 = 20.0;
const SEQUENCE_THRESHOLD_MS: f64 = 33.0;
const SUDDEN_CHANGE_DELTA_MS: f64 = 10.0;
const DROP_WINDOW_FRAMES: usize = 60;
const DROP_THRESHOLD_RATIO: f64 = 0.80;
const COMMON_FPS_CAPS: &[f64] = &[30.0, 60.0, 120.0, 144.0, 165.0, 240.0];
const CAP_LOCK_TOLERANCE: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rating {
    Excellent,
    Good,
    Moderate,
    Poor,
}

impl Rating {
    fn rank(self) -> u8 {
        match self {
            Rating::Poor => 0,
            Rating::Moderate => 1,
            Rating::Good => 2,
            Rating::Excellent => 3,
        }
    }

    fn max(self, other: Rating) -> Rating {
        if self.rank() >= other.rank() { self } else { other }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverallRating {
    Excellent,
    Good,
    Acceptable,
    Poor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BottleneckType {
    Gpu,
    Cpu,
    Balanced,
    None,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StutterEventType {
    Transition,
    Stutter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StutterEvent {
    pub frame_index: usize,
    pub frametime_ms: f64,
    pub severity: f64,
    pub event_type: StutterEventType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StutterSequence {
    pub start_frame: usize,
    pub end_frame: usize,
    pub length: usize,
    pub avg_frametime_ms: f64,
    pub max_frametime_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FpsDrop {
    pub start_frame: usize,
    pub end_frame: usize,
    pub duration_frames: usize,
    pub min_fps: f64,
    pub avg_fps_during: f64,
    pub drop_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FpsMetrics {
    pub average: f64,
    pub minimum: f64,
    pub maximum: f64,
    pub median: f64,
    pub p1_low: f64,
    pub p01_low: f64,
    pub std_dev: f64,
    pub frame_count: usize,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StutterMetrics {
    pub stutter_index: f64,
    pub gameplay_stutter_index: f64,
    pub stutter_rating: Rating,
    pub transition_count: usize,
    pub gameplay_stutter_count: usize,
    pub event_count: usize,
    pub events: Vec<StutterEvent>,
    pub sequence_count: usize,
    pub sequences: Vec<StutterSequence>,
    pub sudden_change_count: usize,
    pub variance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FramePacingMetrics {
    pub avg_delta_ms: f64,
    pub max_delta_ms: f64,
    pub consistency_score: f64,
    pub consistency_rating: Rating,
    pub cv_percent: f64,
    pub fps_stability_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FpsDropsMetrics {
    pub drop_count: usize,
    pub total_drop_duration_frames: usize,
    pub drops: Vec<FpsDrop>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelStat {
    pub avg: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bottleneck {
    pub bottleneck_type: BottleneckType,
    pub confidence: Confidence,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HardwareMetrics {
    pub gpu_temp_c: Option<ChannelStat>,
    pub cpu_temp_c: Option<ChannelStat>,
    pub gpu_load_pct: Option<ChannelStat>,
    pub cpu_load_pct: Option<ChannelStat>,
    pub gpu_power_w: Option<ChannelStat>,
    pub gpu_clock_mhz: Option<ChannelStat>,
    pub vram_mb: Option<ChannelStat>,
    pub bottleneck: Option<Bottleneck>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryMetrics {
    pub overall_rating: OverallRating,
    pub issues: Vec<String>,
    pub playability: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub fps: FpsMetrics,
    pub stutter: StutterMetrics,
    pub frame_pacing: FramePacingMetrics,
    pub fps_drops: FpsDropsMetrics,
    pub hardware: HardwareMetrics,
    pub summary: SummaryMetrics,
}

/// FPS-target evaluation, ported from the Python original's
/// `FPSTargetEvaluator` — a downstream consumer of `RunMetrics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FpsTargetEvaluation {
    pub target_fps: u32,
    pub meets_target: bool,
    pub rating: Rating,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FpsTargetReport {
    pub targets: Vec<FpsTargetEvaluation>,
    pub recommended_fps: u32,
}

pub fn analyze(log: &ParsedLog) -> Result<RunMetrics> {
    if log.frames.is_empty() {
        return Err(BenchError::NoFrameData);
    }

    let frametimes: Vec<f64> = log.frames.iter().map(|f| f.frametime_ms).collect();
    let gameplay_mask = classify_transitions(&frametimes);

    let gameplay_ft: Vec<f64> = frametimes
        .iter()
        .zip(&gameplay_mask)
        .filter(|(_, is_gameplay)| **is_gameplay)
        .map(|(ft, _)| *ft)
        .collect();

    if gameplay_ft.is_empty() {
        return Err(BenchError::NoFrameData);
    }

    let fps = calculate_fps_metrics(&gameplay_ft);
    let stutter = analyze_stutter(&frametimes, &gameplay_mask, &gameplay_ft);
    let frame_pacing = analyze_frame_pacing(&gameplay_ft, &fps);
    let fps_drops = detect_fps_drops(&frametimes);
    let hardware = analyze_hardware(&log.frames);
    let summary = generate_summary(&fps, &stutter);

    Ok(RunMetrics {
        fps,
        stutter,
        frame_pacing,
        fps_drops,
        hardware,
        summary,
    })
}

/// `true` at index `i` means frame `i` is gameplay (not a transition spike).
fn classify_transitions(frametimes: &[f64]) -> Vec<bool> {
    let n = frametimes.len();
    (0..n)
        .map(|i| !is_transition_spike(frametimes, i))
        .collect()
}

fn is_transition_spike(frametimes: &[f64], index: usize) -> bool {
    let n = frametimes.len();
    if index < TRANSITION_WINDOW || index + TRANSITION_WINDOW >= n {
        return false;
    }
    if frametimes[index] <= TRANSITION_THRESHOLD_MS {
        return false;
    }

    let before = &frametimes[index - TRANSITION_WINDOW..index];
    let after = &frametimes[index + 1..index + 1 + TRANSITION_WINDOW];

    let avg_before = mean(before);
    let avg_after = mean(after);

    avg_before < TRANSITION_NORMAL_MS && avg_after < TRANSITION_NORMAL_MS
}

fn calculate_fps_metrics(gameplay_ft: &[f64]) -> FpsMetrics {
    let avg_frametime = mean(gameplay_ft);
    let average = 1000.0 / avg_frametime;

    let gameplay_fps: Vec<f64> = gameplay_ft.iter().map(|ft| 1000.0 / ft).collect();

    FpsMetrics {
        average: round2(average),
        minimum: round2(min(&gameplay_fps)),
        maximum: round2(max(&gameplay_fps)),
        median: round2(median(&gameplay_fps)),
        p1_low: round2(percentile_low(gameplay_ft, 1.0)),
        p01_low: round2(percentile_low(gameplay_ft, 0.1)),
        std_dev: round2(std_dev(&gameplay_fps)),
        frame_count: gameplay_ft.len(),
        duration_seconds: round2(gameplay_ft.iter().sum::<f64>() / 1000.0),
    }
}

/// Integral-method percentile low: the FPS you stay above for
/// `(100 - percentile)`% of wall-clock time.
fn percentile_low(frametimes: &[f64], percentile: f64) -> f64 {
    if frametimes.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f64> = frametimes.to_vec();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap());

    let total_time: f64 = sorted.iter().sum();
    let target_time = total_time * (percentile / 100.0);

    let mut cumulative = 0.0;
    for ft in &sorted {
        cumulative += ft;
        if cumulative >= target_time {
            return 1000.0 / ft;
        }
    }
    1000.0 / sorted[sorted.len() - 1]
}

fn analyze_stutter(
    frametimes: &[f64],
    gameplay_mask: &[bool],
    gameplay_ft: &[f64],
) -> StutterMetrics {
    let mean_ft = mean(frametimes);

    let mut transition_events = Vec::new();
    let mut gameplay_stutter_events = Vec::new();

    for (i, ft) in frametimes.iter().enumerate() {
        if *ft > TRANSITION_THRESHOLD_MS {
            let event = StutterEvent {
                frame_index: i,
                frametime_ms: round2(*ft),
                severity: round2(ft / mean_ft),
                event_type: if gameplay_mask[i] {
                    StutterEventType::Stutter
                } else {
                    StutterEventType::Transition
                },
            };
            if gameplay_mask[i] {
                gameplay_stutter_events.push(event);
            } else {
                transition_events.push(event);
            }
        }
    }

    let gameplay_mean = mean(gameplay_ft);
    let gameplay_std = std_dev(gameplay_ft);
    let gameplay_stutter_index = if gameplay_mean > 0.0 {
        (gameplay_std / gameplay_mean) * 100.0
    } else {
        0.0
    };

    let std_ft = std_dev(frametimes);
    let full_stutter_index = if mean_ft > 0.0 {
        (std_ft / mean_ft) * 100.0
    } else {
        0.0
    };

    let sequences = detect_stutter_sequences(frametimes);
    let sudden_change_count = detect_sudden_changes(frametimes);

    let mut all_events: Vec<StutterEvent> = transition_events
        .iter()
        .cloned()
        .chain(gameplay_stutter_events.iter().cloned())
        .collect();
    all_events.sort_by_key(|e| e.frame_index);

    let stutter_rating =
        rate_gameplay_stutter(gameplay_stutter_events.len(), sequences.len(), gameplay_ft.len());

    StutterMetrics {
        stutter_index: round2(full_stutter_index),
        gameplay_stutter_index: round2(gameplay_stutter_index),
        stutter_rating,
        transition_count: transition_events.len(),
        gameplay_stutter_count: gameplay_stutter_events.len(),
        event_count: all_events.len(),
        events: all_events.into_iter().take(20).collect(),
        sequence_count: sequences.len(),
        sequences: sequences.into_iter().take(10).collect(),
        sudden_change_count,
        variance: round2(std_ft.powi(2)),
    }
}

/// Rates gameplay stutter against the gameplay frame count (excluding
/// transitions), per the redesign note in spec §9 that fixes the
/// denominator ambiguity in the source.
fn rate_gameplay_stutter(stutter_count: usize, sequence_count: usize, gameplay_frames: usize) -> Rating {
    if gameplay_frames == 0 {
        return Rating::Poor;
    }
    let per_1k = (stutter_count as f64 / gameplay_frames as f64) * 1000.0;

    if stutter_count == 0 && sequence_count == 0 {
        return Rating::Excellent;
    }
    if per_1k < 0.5 && sequence_count <= 1 {
        return Rating::Good;
    }
    if per_1k < 2.0 && sequence_count <= 3 {
        return Rating::Moderate;
    }
    Rating::Poor
}

fn detect_stutter_sequences(frametimes: &[f64]) -> Vec<StutterSequence> {
    let mut sequences = Vec::new();
    let mut current: Vec<(usize, f64)> = Vec::new();

    for (i, ft) in frametimes.iter().enumerate() {
        if *ft > SEQUENCE_THRESHOLD_MS {
            current.push((i, *ft));
        } else {
            flush_sequence(&mut current, &mut sequences);
        }
    }
    flush_sequence(&mut current, &mut sequences);

    sequences
}

fn flush_sequence(current: &mut Vec<(usize, f64)>, sequences: &mut Vec<StutterSequence>) {
    if current.len() >= 3 {
        let sum: f64 = current.iter().map(|(_, ft)| ft).sum();
        let max_ft = current.iter().map(|(_, ft)| *ft).fold(f64::MIN, f64::max);
        sequences.push(StutterSequence {
            start_frame: current[0].0,
            end_frame: current[current.len() - 1].0,
            length: current.len(),
            avg_frametime_ms: round2(sum / current.len() as f64),
            max_frametime_ms: round2(max_ft),
        });
    }
    current.clear();
}

fn detect_sudden_changes(frametimes: &[f64]) -> usize {
    frametimes
        .windows(2)
        .filter(|w| (w[1] - w[0]).abs() > SUDDEN_CHANGE_DELTA_MS)
        .count()
}

fn detect_fps_drops(frametimes: &[f64]) -> FpsDropsMetrics {
    if frametimes.len() < DROP_WINDOW_FRAMES {
        return FpsDropsMetrics {
            drop_count: 0,
            total_drop_duration_frames: 0,
            drops: Vec::new(),
        };
    }

    let rolling_fps: Vec<f64> = frametimes
        .windows(DROP_WINDOW_FRAMES)
        .map(|w| 1000.0 / mean(w))
        .collect();

    let avg_fps = mean(&rolling_fps);
    let threshold_fps = avg_fps * DROP_THRESHOLD_RATIO;

    let mut drops = Vec::new();
    let mut in_drop = false;
    let mut drop_start = 0usize;

    for (i, fps) in rolling_fps.iter().enumerate() {
        if *fps < threshold_fps && !in_drop {
            in_drop = true;
            drop_start = i;
        } else if *fps >= threshold_fps && in_drop {
            in_drop = false;
            let window = &rolling_fps[drop_start..i];
            let min_fps = min(window);
            drops.push(FpsDrop {
                start_frame: drop_start,
                end_frame: i,
                duration_frames: i - drop_start,
                min_fps: round2(min_fps),
                avg_fps_during: round2(mean(window)),
                drop_percent: round1((1.0 - min_fps / avg_fps) * 100.0),
            });
        }
    }

    FpsDropsMetrics {
        drop_count: drops.len(),
        total_drop_duration_frames: drops.iter().map(|d| d.duration_frames).sum(),
        drops: drops.into_iter().take(10).collect(),
    }
}

fn analyze_frame_pacing(gameplay_ft: &[f64], fps: &FpsMetrics) -> FramePacingMetrics {
    let deltas: Vec<f64> = gameplay_ft
        .windows(2)
        .map(|w| (w[1] - w[0]).abs())
        .collect();

    let avg_frametime = mean(gameplay_ft);
    let consistency_score = if avg_frametime > 0.0 {
        mean(&deltas) / avg_frametime * 100.0
    } else {
        0.0
    };

    let cv = if fps.average > 0.0 {
        fps.std_dev / fps.average * 100.0
    } else {
        0.0
    };

    let consistency_rating = rate_frame_consistency(cv, fps.average, fps.p1_low);
    let fps_stability_pct = if fps.average > 0.0 {
        fps.p1_low / fps.average * 100.0
    } else {
        0.0
    };

    FramePacingMetrics {
        avg_delta_ms: round2(mean(&deltas)),
        max_delta_ms: round2(max(&deltas)),
        consistency_score: round2(consistency_score),
        consistency_rating,
        cv_percent: round1(cv),
        fps_stability_pct: round1(fps_stability_pct),
    }
}

fn rate_frame_consistency(cv: f64, avg_fps: f64, p1_low: f64) -> Rating {
    let band_rating = band_rating_for(cv, avg_fps, p1_low);
    let cap_floor = cap_floor_for(avg_fps, p1_low);

    match cap_floor {
        Some(floor) => band_rating.max(floor),
        None => band_rating,
    }
}

fn band_rating_for(cv: f64, avg_fps: f64, p1_low: f64) -> Rating {
    let drop_pct = if avg_fps > 0.0 {
        (avg_fps - p1_low) / avg_fps * 100.0
    } else {
        0.0
    };

    if p1_low >= 120.0 {
        if cv < 15.0 && drop_pct < 40.0 {
            Rating::Excellent
        } else if cv < 30.0 && drop_pct < 60.0 {
            Rating::Good
        } else if drop_pct < 70.0 {
            Rating::Moderate
        } else {
            Rating::Poor
        }
    } else if p1_low >= 90.0 {
        if cv < 12.0 && drop_pct < 30.0 {
            Rating::Excellent
        } else if cv < 25.0 && drop_pct < 50.0 {
            Rating::Good
        } else if drop_pct < 65.0 {
            Rating::Moderate
        } else {
            Rating::Poor
        }
    } else if p1_low >= 60.0 {
        if cv < 10.0 && drop_pct < 20.0 {
            Rating::Excellent
        } else if cv < 20.0 && drop_pct < 35.0 {
            Rating::Good
        } else if drop_pct < 45.0 {
            Rating::Moderate
        } else {
            Rating::Poor
        }
    } else if p1_low >= 40.0 {
        if cv < 8.0 && drop_pct < 15.0 {
            Rating::Good
        } else if cv < 15.0 && drop_pct < 30.0 {
            Rating::Moderate
        } else {
            Rating::Poor
        }
    } else {
        Rating::Poor
    }
}

/// The cap-locked upgrade from spec §9: compute the normal band rating,
/// then lift it to a cap floor if that floor is higher.
fn cap_floor_for(avg_fps: f64, p1_low: f64) -> Option<Rating> {
    let is_capped = COMMON_FPS_CAPS
        .iter()
        .any(|cap| (avg_fps - cap).abs() < CAP_LOCK_TOLERANCE);
    if !is_capped {
        return None;
    }

    let drop_pct = if avg_fps > 0.0 {
        (avg_fps - p1_low) / avg_fps * 100.0
    } else {
        100.0
    };
    if drop_pct >= 15.0 {
        return None;
    }

    if p1_low >= 100.0 {
        Some(Rating::Good)
    } else if p1_low >= 50.0 {
        Some(Rating::Good)
    } else if p1_low >= 25.0 {
        Some(Rating::Moderate)
    } else {
        None
    }
}

fn analyze_hardware(frames: &[crate::parser::FrameSample]) -> HardwareMetrics {
    let gpu_temps: Vec<f64> = frames.iter().filter_map(|f| f.gpu_temp_c).collect();
    let cpu_temps: Vec<f64> = frames.iter().filter_map(|f| f.cpu_temp_c).collect();
    let gpu_loads: Vec<f64> = frames.iter().filter_map(|f| f.gpu_load_pct).collect();
    let cpu_loads: Vec<f64> = frames.iter().filter_map(|f| f.cpu_load_pct).collect();
    let gpu_power: Vec<f64> = frames.iter().filter_map(|f| f.gpu_power_w).collect();
    let gpu_clock: Vec<f64> = frames.iter().filter_map(|f| f.gpu_clock_mhz).collect();
    let vram: Vec<f64> = frames.iter().filter_map(|f| f.vram_mb).collect();
    let fps_values: Vec<f64> = frames.iter().filter_map(|f| f.fps).collect();

    let bottleneck = analyze_bottleneck(&fps_values, &cpu_loads, &gpu_loads);

    HardwareMetrics {
        gpu_temp_c: channel_stat(&gpu_temps, 1),
        cpu_temp_c: channel_stat(&cpu_temps, 1),
        gpu_load_pct: channel_stat(&gpu_loads, 1),
        cpu_load_pct: channel_stat(&cpu_loads, 1),
        gpu_power_w: channel_stat(&gpu_power, 1),
        gpu_clock_mhz: channel_stat(&gpu_clock, 0),
        vram_mb: channel_stat(&vram, 0),
        bottleneck: Some(bottleneck),
    }
}

fn channel_stat(values: &[f64], decimals: i32) -> Option<ChannelStat> {
    if values.is_empty() {
        return None;
    }
    let scale = 10f64.powi(decimals);
    Some(ChannelStat {
        avg: (mean(values) * scale).round() / scale,
        max: (max(values) * scale).round() / scale,
    })
}

fn analyze_bottleneck(fps_values: &[f64], cpu_loads: &[f64], gpu_loads: &[f64]) -> Bottleneck {
    let avg_fps = if fps_values.is_empty() { 0.0 } else { mean(fps_values) };
    let avg_cpu = if cpu_loads.is_empty() { 0.0 } else { mean(cpu_loads) };
    let avg_gpu = if gpu_loads.is_empty() { 0.0 } else { mean(gpu_loads) };

    if avg_gpu > 0.0 {
        if avg_gpu > 90.0 && avg_cpu < 70.0 {
            Bottleneck {
                bottleneck_type: BottleneckType::Gpu,
                confidence: Confidence::High,
                explanation: format!("GPU at {avg_gpu:.0}% utilization"),
            }
        } else if avg_cpu > 80.0 && avg_gpu < 70.0 {
            Bottleneck {
                bottleneck_type: BottleneckType::Cpu,
                confidence: Confidence::High,
                explanation: format!("CPU at {avg_cpu:.0}% utilization"),
            }
        } else if avg_gpu > 70.0 && avg_cpu > 70.0 {
            Bottleneck {
                bottleneck_type: BottleneckType::Balanced,
                confidence: Confidence::Medium,
                explanation: format!("both near {avg_gpu:.0}%/{avg_cpu:.0}%"),
            }
        } else {
            Bottleneck {
                bottleneck_type: BottleneckType::None,
                confidence: Confidence::High,
                explanation: "neither CPU nor GPU saturated".to_string(),
            }
        }
    } else if avg_cpu > 0.0 {
        if avg_cpu > 80.0 {
            Bottleneck {
                bottleneck_type: BottleneckType::Cpu,
                confidence: Confidence::Medium,
                explanation: format!("CPU at {avg_cpu:.0}% (GPU load unavailable)"),
            }
        } else if avg_cpu < 50.0 && avg_fps > 100.0 {
            Bottleneck {
                bottleneck_type: BottleneckType::None,
                confidence: Confidence::Medium,
                explanation: format!("CPU only at {avg_cpu:.0}%, FPS very high"),
            }
        } else {
            Bottleneck {
                bottleneck_type: BottleneckType::Unknown,
                confidence: Confidence::Low,
                explanation: "GPU load unavailable".to_string(),
            }
        }
    } else {
        Bottleneck {
            bottleneck_type: BottleneckType::Unknown,
            confidence: Confidence::Low,
            explanation: "no hardware telemetry available".to_string(),
        }
    }
}

fn generate_summary(fps: &FpsMetrics, stutter: &StutterMetrics) -> SummaryMetrics {
    let mut issues = Vec::new();

    if fps.average < 30.0 {
        issues.push("very low fps".to_string());
    } else if fps.average < 60.0 {
        issues.push("low fps".to_string());
    }

    if fps.p1_low < fps.average * 0.5 {
        issues.push("significant fps drops".to_string());
    }

    match stutter.stutter_rating {
        Rating::Poor => issues.push("heavy stutter".to_string()),
        Rating::Moderate => issues.push("noticeable stutter".to_string()),
        _ => {}
    }

    let overall_rating = if issues.is_empty() {
        OverallRating::Excellent
    } else if issues.len() == 1 && issues[0].starts_with("noticeable") {
        OverallRating::Good
    } else if issues.len() <= 2 {
        OverallRating::Acceptable
    } else {
        OverallRating::Poor
    };

    let playability = describe_playability(fps.average, stutter.stutter_rating);

    SummaryMetrics {
        overall_rating,
        issues,
        playability,
    }
}

fn describe_playability(avg_fps: f64, stutter_rating: Rating) -> String {
    let smooth = matches!(stutter_rating, Rating::Excellent | Rating::Good);
    if avg_fps >= 60.0 && smooth {
        "Smooth gameplay experience".to_string()
    } else if avg_fps >= 60.0 {
        "Good FPS but occasional hitches".to_string()
    } else if avg_fps >= 30.0 && smooth {
        "Playable, but would benefit from optimization".to_string()
    } else if avg_fps >= 30.0 {
        "Playable but not optimal experience".to_string()
    } else {
        "Below minimum for comfortable gameplay".to_string()
    }
}

pub fn evaluate_fps_targets(metrics: &RunMetrics, targets: &[u32]) -> FpsTargetReport {
    let avg = metrics.fps.average;
    let p1_low = metrics.fps.p1_low;

    let evaluations: Vec<FpsTargetEvaluation> = targets
        .iter()
        .map(|&target| {
            let min_1_low = target as f64 * 0.85;
            let (meets_target, rating) = if p1_low >= target as f64 {
                (true, Rating::Excellent)
            } else if p1_low >= min_1_low {
                (true, Rating::Good)
            } else {
                (false, Rating::Poor)
            };
            FpsTargetEvaluation {
                target_fps: target,
                meets_target,
                rating,
            }
        })
        .collect();

    let recommended_fps = evaluations
        .iter()
        .filter(|e| e.meets_target)
        .map(|e| e.target_fps)
        .max()
        .unwrap_or_else(|| targets.iter().copied().min().unwrap_or(0));

    let _ = avg;
    FpsTargetReport {
        targets: evaluations,
        recommended_fps,
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance =
        values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

fn min(values: &[f64]) -> f64 {
    values.iter().cloned().fold(f64::INFINITY, f64::min)
}

fn max(values: &[f64]) -> f64 {
    values.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = sorted.len();
    if n == 0 {
        0.0
    } else if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::FrameSample;

    fn steady_log(frametime_ms: f64, count: usize) -> ParsedLog {
        ParsedLog {
            frames: (0..count)
                .map(|_| FrameSample {
                    frametime_ms,
                    fps: Some(1000.0 / frametime_ms),
                    ..Default::default()
                })
                .collect(),
            resolution: None,
            system_info: None,
        }
    }

    #[test]
    fn steady_60fps_is_excellent() {
        let log = steady_log(16.67, 2000);
        let metrics = analyze(&log).unwrap();
        assert!((metrics.fps.average - 60.0).abs() < 0.5);
        assert!((metrics.fps.p1_low - 60.0).abs() < 0.5);
        assert_eq!(metrics.stutter.stutter_rating, Rating::Excellent);
        assert_eq!(metrics.frame_pacing.consistency_rating, Rating::Excellent);
        assert_eq!(metrics.summary.overall_rating, OverallRating::Excellent);
    }

    #[test]
    fn loading_screen_is_transition_not_stutter() {
        let mut frames: Vec<FrameSample> = (0..1000)
            .map(|_| FrameSample {
                frametime_ms: 16.67,
                fps: Some(59.98),
                ..Default::default()
            })
            .collect();
        frames.push(FrameSample {
            frametime_ms: 6000.0,
            fps: Some(1000.0 / 6000.0),
            ..Default::default()
        });
        frames.extend((0..1000).map(|_| FrameSample {
            frametime_ms: 16.67,
            fps: Some(59.98),
            ..Default::default()
        }));

        let log = ParsedLog {
            frames,
            resolution: None,
            system_info: None,
        };
        let metrics = analyze(&log).unwrap();
        assert_eq!(metrics.stutter.transition_count, 1);
        assert_eq!(metrics.stutter.gameplay_stutter_count, 0);
        assert!((metrics.fps.average - 60.0).abs() < 1.0);
    }

    #[test]
    fn heavy_isolated_stutter_is_poor() {
        let mut frames: Vec<FrameSample> = (0..1000)
            .map(|_| FrameSample {
                frametime_ms: 16.67,
                fps: Some(59.98),
                ..Default::default()
            })
            .collect();

        for k in 0..10 {
            let idx = 60 + k * 90;
            frames[idx].frametime_ms = 80.0;
            frames[idx].fps = Some(1000.0 / 80.0);
        }

        let log = ParsedLog {
            frames,
            resolution: None,
            system_info: None,
        };
        let metrics = analyze(&log).unwrap();
        assert_eq!(metrics.stutter.transition_count, 0);
        assert_eq!(metrics.stutter.gameplay_stutter_count, 10);
        assert_eq!(metrics.stutter.stutter_rating, Rating::Poor);
    }

    #[test]
    fn edge_frames_are_never_transitions() {
        let mut frametimes = vec![16.67; 20];
        frametimes[0] = 80.0;
        let last = frametimes.len() - 1;
        frametimes[last] = 80.0;

        let mask = classify_transitions(&frametimes);
        assert!(mask[0], "frame 0 must be classified as gameplay stutter");
        assert!(mask[last], "last frame must be classified as gameplay stutter");
    }

    #[test]
    fn cap_locked_60fps_upgrades_consistency() {
        let rating = rate_frame_consistency(25.0, 60.0, 52.0);
        assert!(rating.rank() >= Rating::Good.rank());
    }

    #[test]
    fn invariant_ordering_holds() {
        let log = steady_log(16.67, 2000);
        let metrics = analyze(&log).unwrap();
        assert!(metrics.fps.p01_low <= metrics.fps.p1_low);
        assert!(metrics.fps.p1_low <= metrics.fps.average);
        assert!(metrics.fps.average <= metrics.fps.maximum);
    }

    #[test]
    fn empty_log_is_no_frame_data_error() {
        let log = ParsedLog::default();
        assert!(matches!(analyze(&log), Err(BenchError::NoFrameData)));
    }
}
