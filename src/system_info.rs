//! Gathers a `SystemFingerprint` from the host: CPU/RAM via `sysinfo`, the
//! rest via the small set of shell-outs Linux gaming tooling already
//! depends on (`lspci`, `vulkaninfo`, `/etc/os-release`, `uname`). Ported
//! from the Python original's `system/hardware_info.py` and the teacher's
//! `SystemDetector`.

use std::process::Command;

use sysinfo::System;

use crate::fingerprint::SystemFingerprint;

/// `(PCI vendor:device id, model name)`, first-match-wins. A small, curated
/// slice rather than a full database; unknown ids fall back to the raw
/// `lspci` description.
const GPU_DEVICE_IDS: &[(&str, &str)] = &[
    ("1002:7480", "AMD Radeon RX 9070 XT"),
    ("1002:7550", "AMD Radeon RX 7900 XTX"),
    ("1002:73bf", "AMD Radeon RX 6900 XT"),
    ("10de:2684", "NVIDIA GeForce RTX 4090"),
    ("10de:2704", "NVIDIA GeForce RTX 4080"),
    ("10de:2484", "NVIDIA GeForce RTX 3070"),
    ("8086:a780", "Intel Arc A770"),
];

pub fn gather_system_info() -> SystemFingerprint {
    let mut system = System::new_all();
    system.refresh_all();

    SystemFingerprint {
        gpu_model: detect_gpu_model(),
        cpu_model: cpu_brand(&system),
        mesa_version: detect_mesa_version(),
        vulkan_version: detect_vulkan_version(),
        kernel_version: kernel_version(),
        ram_gb: (system.total_memory() / (1024 * 1024 * 1024)) as u32,
        os_name: os_name(),
    }
}

fn cpu_brand(system: &System) -> String {
    system
        .cpus()
        .first()
        .map(|c| c.brand().trim().to_string())
        .unwrap_or_else(|| "Unknown CPU".to_string())
}

fn os_name() -> String {
    if let Ok(contents) = std::fs::read_to_string("/etc/os-release") {
        for line in contents.lines() {
            if let Some(value) = line.strip_prefix("PRETTY_NAME=") {
                return value.trim_matches('"').to_string();
            }
        }
    }
    "Linux".to_string()
}

fn kernel_version() -> String {
    Command::new("uname")
        .arg("-r")
        .output()
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

fn detect_gpu_model() -> String {
    let Ok(output) = Command::new("lspci").args(["-nn"]).output() else {
        return "Unknown GPU".to_string();
    };
    let text = String::from_utf8_lossy(&output.stdout);

    let vga_line = text
        .lines()
        .find(|l| l.contains("VGA compatible controller") || l.contains("3D controller"));
    let Some(line) = vga_line else {
        return "Unknown GPU".to_string();
    };

    if let Some(device_id) = extract_device_id(line) {
        if let Some((_, name)) = GPU_DEVICE_IDS.iter().find(|(id, _)| *id == device_id) {
            return name.to_string();
        }
    }

    line.split(':')
        .nth(2)
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| line.trim().to_string())
}

/// Extracts the `vendor:device` hex pair from an `lspci -nn` line, e.g.
/// `... [AMD/ATI] ... [1002:7550] (rev c1)` -> `1002:7550`.
fn extract_device_id(line: &str) -> Option<String> {
    let start = line.rfind('[')?;
    let end = line[start..].find(']')? + start;
    let candidate = &line[start + 1..end];
    if candidate.contains(':') && candidate.len() == 9 {
        Some(candidate.to_string())
    } else {
        None
    }
}

fn detect_vulkan_version() -> String {
    let Ok(output) = Command::new("vulkaninfo").arg("--summary").output() else {
        return "unavailable".to_string();
    };
    let text = String::from_utf8_lossy(&output.stdout);
    for line in text.lines() {
        if line.contains("apiVersion") {
            if let Some(version) = line.split('=').nth(1) {
                return version.trim().to_string();
            }
        }
    }
    "unknown".to_string()
}

fn detect_mesa_version() -> String {
    let Ok(output) = Command::new("glxinfo").arg("-B").output() else {
        return "unavailable".to_string();
    };
    let text = String::from_utf8_lossy(&output.stdout);
    for line in text.lines() {
        if line.to_lowercase().contains("mesa") {
            if let Some(idx) = line.find("Mesa") {
                return line[idx..].split_whitespace().nth(1).unwrap_or("unknown").to_string();
            }
        }
    }
    "unknown".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_device_id_parses_lspci_bracket_form() {
        let line = "03:00.0 VGA compatible controller [0300]: AMD/ATI [1002:7550] (rev c1)";
        assert_eq!(extract_device_id(line), Some("1002:7550".to_string()));
    }

    #[test]
    fn extract_device_id_ignores_non_hex_brackets() {
        let line = "03:00.0 VGA compatible controller [0300]: Some Vendor [not-an-id]";
        assert_eq!(extract_device_id(line), None);
    }

    #[test]
    fn gather_system_info_does_not_panic_without_gpu_tools() {
        let fp = gather_system_info();
        assert!(!fp.os_name.is_empty());
        assert!(!fp.gpu_model.is_empty());
    }
}
