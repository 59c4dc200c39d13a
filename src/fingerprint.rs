//! System identity: a short fingerprint used to bucket benchmark runs by
//! the hardware they were captured on. See spec §4.5 and the `storage`
//! module's directory layout.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemFingerprint {
    pub gpu_model: String,
    pub cpu_model: String,
    pub mesa_version: String,
    pub vulkan_version: String,
    pub kernel_version: String,
    pub ram_gb: u32,
    pub os_name: String,
}

impl SystemFingerprint {
    /// First 8 hex chars of the sha256 of the hardware-identifying fields.
    /// Mesa/vulkan/kernel versions are intentionally excluded so a driver
    /// update doesn't fragment a system's run history.
    pub fn hash(&self) -> String {
        let canonical = serde_json::json!({
            "cpu_model": self.cpu_model,
            "gpu_model": self.gpu_model,
            "mesa_version": self.mesa_version,
            "ram_gb": self.ram_gb,
        });
        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string().as_bytes());
        let digest = hasher.finalize();
        digest.iter().take(4).map(|b| format!("{b:02x}")).collect()
    }

    /// A filesystem-safe identifier: `{os}_{hash}`.
    pub fn system_id(&self) -> String {
        let os_clean: String = self
            .os_name
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '/')
            .take(20)
            .collect();
        format!("{os_clean}_{}", self.hash())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SystemFingerprint {
        SystemFingerprint {
            gpu_model: "AMD Radeon RX 7900 XTX".to_string(),
            cpu_model: "AMD Ryzen 9 7950X3D".to_string(),
            mesa_version: "24.1.0".to_string(),
            vulkan_version: "1.3.280".to_string(),
            kernel_version: "6.9.1".to_string(),
            ram_gb: 32,
            os_name: "Arch Linux".to_string(),
        }
    }

    #[test]
    fn hash_is_eight_hex_chars() {
        let hash = sample().hash();
        assert_eq!(hash.len(), 8);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn hash_is_stable_and_ignores_driver_versions() {
        let mut a = sample();
        let mut b = sample();
        a.mesa_version = "24.1.0".to_string();
        b.mesa_version = "25.0.0".to_string();
        b.vulkan_version = "1.3.290".to_string();
        b.kernel_version = "6.10.0".to_string();
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn hash_changes_with_hardware() {
        let a = sample();
        let mut b = sample();
        b.gpu_model = "NVIDIA RTX 4090".to_string();
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn system_id_strips_whitespace_and_slashes() {
        let mut fp = sample();
        fp.os_name = "Pop!_OS 22.04 LTS/x86_64".to_string();
        let id = fp.system_id();
        assert!(!id.contains(' '));
        assert!(!id.contains('/'));
        assert!(id.ends_with(&fp.hash()));
    }
}
