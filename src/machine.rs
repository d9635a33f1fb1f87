// Machine Profile
// Host description captured once per run and shown in the report footer.

use crate::types::MachineProfile;
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Describe the current host
pub fn capture() -> MachineProfile {
    let system = System::new_with_specifics(
        RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::nothing())
            .with_memory(MemoryRefreshKind::nothing().with_ram()),
    );

    let os = match (System::name(), System::os_version()) {
        (Some(name), Some(version)) => format!("{name} {version}"),
        (Some(name), None) => name,
        _ => std::env::consts::OS.to_string(),
    };

    let cpu_model = system
        .cpus()
        .first()
        .map(|cpu| cpu.brand().trim().to_string())
        .filter(|brand| !brand.is_empty())
        .unwrap_or_else(|| "Unknown CPU".to_string());

    MachineProfile {
        os,
        cpu_model,
        core_count: num_cpus::get(),
        total_memory_gb: (system.total_memory() as f64 / BYTES_PER_GB).round() as u64,
    }
}

/// Footer label for the candidates' runtime, e.g. `22` becomes `Node.js 22`
pub fn runtime_label(raw: Option<&str>) -> Option<String> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    let numeric = raw.starts_with(|c: char| c.is_ascii_digit())
        || (raw.starts_with('v') && raw[1..].starts_with(|c: char| c.is_ascii_digit()));
    if numeric {
        Some(format!("Node.js {raw}"))
    } else {
        Some(raw.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_describes_host() {
        let profile = capture();
        assert!(!profile.os.is_empty());
        assert!(!profile.cpu_model.is_empty());
        assert!(profile.core_count >= 1);
    }

    #[test]
    fn test_runtime_label() {
        assert_eq!(runtime_label(Some("22")).as_deref(), Some("Node.js 22"));
        assert_eq!(runtime_label(Some("v20.11.1")).as_deref(), Some("Node.js v20.11.1"));
        assert_eq!(runtime_label(Some("Bun 1.1")).as_deref(), Some("Bun 1.1"));
        assert_eq!(runtime_label(Some("  ")), None);
        assert_eq!(runtime_label(None), None);
    }
}
