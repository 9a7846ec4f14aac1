use std::fmt;
use std::str::FromStr;

use super::ManifestError;

/// The marker environment of one target the manifest must install on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPlatform {
    pub sys_platform: String,
    pub platform_machine: String,
    pub platform_system: String,
    pub os_name: String,
    pub python_version: String,
    pub python_full_version: String,
    pub implementation_name: String,
    pub platform_python_implementation: String,
}

impl TargetPlatform {
    /// `os` is a `sys.platform` value or an alias (`macos`, `windows`);
    /// `machine` is taken verbatim as `platform_machine`.
    pub fn new(os: &str, machine: &str) -> Result<Self, ManifestError> {
        let (sys_platform, platform_system, os_name) = match os.to_ascii_lowercase().as_str() {
            "linux" => ("linux", "Linux", "posix"),
            "darwin" | "macos" | "mac" => ("darwin", "Darwin", "posix"),
            "win32" | "windows" | "win" => ("win32", "Windows", "nt"),
            other => return Err(ManifestError::InvalidPlatform(other.to_string())),
        };
        if machine.trim().is_empty() {
            return Err(ManifestError::InvalidPlatform(format!("{}/", os)));
        }

        Ok(Self {
            sys_platform: sys_platform.to_string(),
            platform_machine: machine.trim().to_string(),
            platform_system: platform_system.to_string(),
            os_name: os_name.to_string(),
            python_version: "3.10".to_string(),
            python_full_version: "3.10.0".to_string(),
            implementation_name: "cpython".to_string(),
            platform_python_implementation: "CPython".to_string(),
        })
    }

    /// Linux, Windows and both macOS architectures.
    pub fn defaults() -> Vec<Self> {
        [
            ("linux", "x86_64"),
            ("linux", "aarch64"),
            ("win32", "AMD64"),
            ("darwin", "x86_64"),
            ("darwin", "arm64"),
        ]
        .iter()
        .filter_map(|(os, machine)| Self::new(os, machine).ok())
        .collect()
    }

    pub fn host() -> Self {
        let os = std::env::consts::OS;
        let machine = match (os, std::env::consts::ARCH) {
            ("macos", "aarch64") => "arm64",
            ("windows", "x86_64") => "AMD64",
            ("windows", "aarch64") => "ARM64",
            (_, arch) => arch,
        };
        Self::new(os, machine).unwrap_or_else(|_| Self {
            sys_platform: os.to_string(),
            platform_machine: machine.to_string(),
            platform_system: os.to_string(),
            os_name: "posix".to_string(),
            python_version: "3.10".to_string(),
            python_full_version: "3.10.0".to_string(),
            implementation_name: "cpython".to_string(),
            platform_python_implementation: "CPython".to_string(),
        })
    }

    pub fn variable(&self, name: &str) -> &str {
        match name {
            "sys_platform" => &self.sys_platform,
            "platform_machine" => &self.platform_machine,
            "platform_system" => &self.platform_system,
            "os_name" => &self.os_name,
            "python_version" => &self.python_version,
            "python_full_version" | "implementation_version" => &self.python_full_version,
            "implementation_name" => &self.implementation_name,
            "platform_python_implementation" => &self.platform_python_implementation,
            _ => "",
        }
    }

    pub fn label(&self) -> String {
        format!("{}/{}", self.sys_platform, self.platform_machine)
    }
}

impl fmt::Display for TargetPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl FromStr for TargetPlatform {
    type Err = ManifestError;

    /// Parses `os/machine`, e.g. `darwin/arm64`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (os, machine) = s
            .split_once('/')
            .ok_or_else(|| ManifestError::InvalidPlatform(s.to_string()))?;
        Self::new(os.trim(), machine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_platform() {
        let p: TargetPlatform = "macos/arm64".parse().unwrap();
        assert_eq!(p.sys_platform, "darwin");
        assert_eq!(p.platform_system, "Darwin");
        assert_eq!(p.label(), "darwin/arm64");

        assert!("beos/x86".parse::<TargetPlatform>().is_err());
        assert!("linux".parse::<TargetPlatform>().is_err());
        assert!("linux/".parse::<TargetPlatform>().is_err());
    }

    #[test]
    fn test_defaults_cover_three_systems() {
        let defaults = TargetPlatform::defaults();
        assert_eq!(defaults.len(), 5);
        for os in ["linux", "win32", "darwin"] {
            assert!(defaults.iter().any(|p| p.sys_platform == os));
        }
    }
}
