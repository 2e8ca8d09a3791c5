//! Memory diagnostics
//!
//! Two helpers surfaced over HTTP and the CLI: a point-in-time usage
//! report and a clear action that flushes device work and resets the
//! sequence counters. Process numbers come from `/proc/self/status` on
//! Linux and are absent elsewhere.

use serde::Serialize;

use crate::engine::EngineStats;
use crate::model::{device_label, LoadedModel};

/// Snapshot of what the process and model are holding.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryReport {
    pub device: String,
    /// Bytes of checkpoint weights on the device.
    pub weights_bytes: u64,
    /// Estimated KV cache footprint of the most recent request.
    pub last_kv_cache_bytes: u64,
    pub resident_bytes: Option<u64>,
    pub peak_resident_bytes: Option<u64>,
    pub virtual_bytes: Option<u64>,
    /// How many times the clear helper has run.
    pub memory_clears: u64,
}

impl MemoryReport {
    pub fn capture(model: &LoadedModel, stats: &EngineStats) -> Self {
        let process = ProcessMemory::current();
        Self {
            device: device_label(&model.device).to_string(),
            weights_bytes: model.weights_bytes,
            last_kv_cache_bytes: model.kv_cache_bytes(stats.last_sequence_tokens),
            resident_bytes: process.resident_bytes,
            peak_resident_bytes: process.peak_resident_bytes,
            virtual_bytes: process.virtual_bytes,
            memory_clears: stats.memory_clears,
        }
    }

    /// One-line rendering for terminal output.
    pub fn summary(&self) -> String {
        let mut parts = vec![
            format!("device {}", self.device),
            format!("weights {}", format_bytes(self.weights_bytes)),
            format!("last kv cache {}", format_bytes(self.last_kv_cache_bytes)),
        ];
        if let Some(resident) = self.resident_bytes {
            match self.peak_resident_bytes {
                Some(peak) => parts.push(format!(
                    "resident {} (peak {})",
                    format_bytes(resident),
                    format_bytes(peak)
                )),
                None => parts.push(format!("resident {}", format_bytes(resident))),
            }
        }
        parts.push(format!("clears {}", self.memory_clears));
        parts.join(", ")
    }
}

/// Process-level numbers from the kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessMemory {
    pub resident_bytes: Option<u64>,
    pub peak_resident_bytes: Option<u64>,
    pub virtual_bytes: Option<u64>,
}

impl ProcessMemory {
    #[cfg(target_os = "linux")]
    pub fn current() -> Self {
        std::fs::read_to_string("/proc/self/status")
            .map(|text| Self::parse_status(&text))
            .unwrap_or_default()
    }

    #[cfg(not(target_os = "linux"))]
    pub fn current() -> Self {
        Self::default()
    }

    fn parse_status(text: &str) -> Self {
        let mut mem = Self::default();
        for line in text.lines() {
            let Some((key, rest)) = line.split_once(':') else {
                continue;
            };
            let field = match key.trim() {
                "VmRSS" => &mut mem.resident_bytes,
                "VmHWM" => &mut mem.peak_resident_bytes,
                "VmSize" => &mut mem.virtual_bytes,
                _ => continue,
            };
            *field = parse_kb(rest);
        }
        mem
    }
}

fn parse_kb(value: &str) -> Option<u64> {
    value
        .trim()
        .strip_suffix("kB")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|kb| kb * 1024)
}

/// Human-readable byte count.
pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    let size = bytes as f64;
    if size < KB {
        format!("{} B", bytes)
    } else if size < MB {
        format!("{:.1} KB", size / KB)
    } else if size < GB {
        format!("{:.1} MB", size / MB)
    } else {
        format!("{:.2} GB", size / GB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status() {
        let text = "Name:\tstonechat\nVmSize:\t  409600 kB\nVmHWM:\t  204800 kB\nVmRSS:\t  102400 kB\nThreads:\t8\n";
        let mem = ProcessMemory::parse_status(text);
        assert_eq!(mem.virtual_bytes, Some(409600 * 1024));
        assert_eq!(mem.peak_resident_bytes, Some(204800 * 1024));
        assert_eq!(mem.resident_bytes, Some(102400 * 1024));
    }

    #[test]
    fn test_parse_status_ignores_malformed_lines() {
        let text = "VmRSS\nVmRSS: not a number kB\nVmSize:\t 1024 kB\n";
        let mem = ProcessMemory::parse_status(text);
        assert_eq!(mem.resident_bytes, None);
        assert_eq!(mem.virtual_bytes, Some(1024 * 1024));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
    }
}
