//! Overlay CSV log parsing.
//!
//! Accepts the two on-disk shapes an overlay tool may emit: a "sectioned"
//! format with a `SYSTEM INFO` header block followed by a `FRAME METRICS`
//! marker, or a "flat" format whose first line is already the frame-data
//! header. See spec §4.1.

use std::path::Path;

use crate::error::{BenchError, Result};

const FRAMETIME_ALIASES: &[&str] = &["frametime", "Frame Time", "frame_time"];
const FPS_ALIASES: &[&str] = &["fps", "FPS"];
const RESOLUTION_ALIASES: &[&str] = &["resolution", "Resolution"];

/// `(canonical field, alias spellings)`, evaluated first-match-wins per the
/// table-driven redesign flag in spec §9.
const HARDWARE_ALIASES: &[(&str, &[&str])] = &[
    ("gpu_temp_c", &["gpu_temp", "GPU Temp"]),
    ("cpu_temp_c", &["cpu_temp", "CPU Temp"]),
    ("gpu_load_pct", &["gpu_load", "GPU Load"]),
    ("cpu_load_pct", &["cpu_load", "CPU Load"]),
    ("gpu_power_w", &["gpu_power", "GPU Power"]),
    ("gpu_clock_mhz", &["gpu_core_clock", "GPU Core Clock"]),
    ("vram_mb", &["vram", "VRAM", "gpu_vram_used"]),
];

/// Names that indicate the `gpu` field of a SYSTEM INFO row was actually a
/// CPU name (column misalignment in the source log).
const CPU_NAME_MARKERS: &[&str] = &[
    "ryzen",
    "intel core",
    "i5-",
    "i7-",
    "i9-",
    "threadripper",
    "xeon",
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameSample {
    pub frametime_ms: f64,
    pub fps: Option<f64>,
    pub gpu_temp_c: Option<f64>,
    pub cpu_temp_c: Option<f64>,
    pub gpu_load_pct: Option<f64>,
    pub cpu_load_pct: Option<f64>,
    pub gpu_power_w: Option<f64>,
    pub gpu_clock_mhz: Option<f64>,
    pub vram_mb: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SystemInfoBlock {
    pub os: Option<String>,
    pub cpu: Option<String>,
    pub gpu: Option<String>,
    pub kernel: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedLog {
    pub frames: Vec<FrameSample>,
    pub resolution: Option<String>,
    pub system_info: Option<SystemInfoBlock>,
}

pub fn parse_log_file(path: &Path) -> Result<ParsedLog> {
    let contents = std::fs::read_to_string(path)?;
    parse_log_str(&contents)
}

pub fn parse_log_str(contents: &str) -> Result<ParsedLog> {
    let lines: Vec<&str> = contents.lines().collect();

    let system_info = find_system_info_block(&lines);
    let data_start = locate_frame_data(&lines)
        .ok_or_else(|| BenchError::Parse("no frame-data region found".to_string()))?;

    if data_start >= lines.len() {
        return Ok(ParsedLog {
            frames: Vec::new(),
            resolution: None,
            system_info,
        });
    }

    let header = split_csv_line(lines[data_start]);
    let mut frames = Vec::new();
    let mut resolution = None;

    for line in &lines[data_start + 1..] {
        if line.trim().is_empty() {
            continue;
        }
        let row = split_csv_line(line);
        match parse_row(&header, &row) {
            Some(sample) => frames.push(sample),
            None => {
                tracing::debug!("skipping unparsable frame row: {line}");
            }
        }
        if resolution.is_none() {
            if let Some(idx) = find_key(&header, RESOLUTION_ALIASES) {
                if let Some(val) = row.get(idx) {
                    if !val.is_empty() {
                        resolution = Some(val.clone());
                    }
                }
            }
        }
    }

    Ok(ParsedLog {
        frames,
        resolution,
        system_info,
    })
}

/// Find the first data row of the frame-metrics table. Tries the `FRAME
/// METRICS` section marker first, then falls back to scanning for a bare
/// `frametime` header line.
fn locate_frame_data(lines: &[&str]) -> Option<usize> {
    for (i, line) in lines.iter().enumerate() {
        if line.contains("FRAME METRICS") {
            return Some(i + 1);
        }
    }
    for (i, line) in lines.iter().enumerate() {
        if line
            .split(',')
            .any(|field| field.trim().eq_ignore_ascii_case("frametime"))
        {
            return Some(i);
        }
    }
    None
}

fn find_system_info_block(lines: &[&str]) -> Option<SystemInfoBlock> {
    let marker_idx = lines.iter().position(|l| l.contains("SYSTEM INFO"))?;
    let header_line = lines.get(marker_idx + 1)?;
    let data_line = lines.get(marker_idx + 2)?;

    let header = split_csv_line(header_line);
    let data = split_csv_line(data_line);

    if header.len() != data.len() || header.is_empty() {
        return None;
    }

    let mut info = SystemInfoBlock::default();
    for (h, d) in header.iter().zip(data.iter()) {
        match h.trim() {
            "os" => info.os = Some(d.trim().to_string()),
            "cpu" => info.cpu = Some(d.trim().to_string()),
            "gpu" => info.gpu = Some(d.trim().to_string()),
            "kernel" => info.kernel = Some(d.trim().to_string()),
            _ => {}
        }
    }

    if let Some(gpu) = &info.gpu {
        let gpu_lower = gpu.to_lowercase();
        if CPU_NAME_MARKERS.iter().any(|kw| gpu_lower.contains(kw)) {
            info.gpu = None;
        }
    }

    Some(info)
}

fn split_csv_line(line: &str) -> Vec<String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes());

    match reader.records().next() {
        Some(Ok(record)) => record.iter().map(|f| f.to_string()).collect(),
        _ => Vec::new(),
    }
}

fn find_key(header: &[String], aliases: &[&str]) -> Option<usize> {
    header.iter().position(|h| {
        aliases
            .iter()
            .any(|alias| alias.eq_ignore_ascii_case(h.trim()))
    })
}

fn parse_row(header: &[String], row: &[String]) -> Option<FrameSample> {
    let frametime_idx = find_key(header, FRAMETIME_ALIASES);
    let fps_idx = find_key(header, FPS_ALIASES);

    let raw_frametime = frametime_idx
        .and_then(|i| row.get(i))
        .and_then(|v| parse_positive_f64(v));
    let raw_fps = fps_idx
        .and_then(|i| row.get(i))
        .and_then(|v| parse_positive_f64(v));

    let (frametime_ms, fps) = match (raw_frametime, raw_fps) {
        (Some(ft), _) if ft > 0.5 && ft < 100.0 => (ft, Some(1000.0 / ft)),
        (_, Some(fps)) if fps > 10.0 && fps < 2000.0 => (1000.0 / fps, Some(fps)),
        _ => return None,
    };

    let mut sample = FrameSample {
        frametime_ms,
        fps,
        ..Default::default()
    };

    for (field, aliases) in HARDWARE_ALIASES {
        let Some(idx) = find_key(header, aliases) else {
            continue;
        };
        let Some(value) = row.get(idx).and_then(|v| parse_positive_f64(v)) else {
            continue;
        };
        match *field {
            "gpu_temp_c" => sample.gpu_temp_c = Some(value),
            "cpu_temp_c" => sample.cpu_temp_c = Some(value),
            "gpu_load_pct" => sample.gpu_load_pct = Some(value),
            "cpu_load_pct" => sample.cpu_load_pct = Some(value),
            "gpu_power_w" => sample.gpu_power_w = Some(value),
            "gpu_clock_mhz" => sample.gpu_clock_mhz = Some(value),
            "vram_mb" => sample.vram_mb = Some(value),
            _ => unreachable!(),
        }
    }

    Some(sample)
}

fn parse_positive_f64(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let value: f64 = trimmed.parse().ok()?;
    if value > 0.0 { Some(value) } else { None }
}
