//! Platform specifier parsing and normalization.
//!
//! A platform is an `os/arch[/variant]` triple. Every `Platform` value is kept in
//! normalized form, so equality and hashing follow the canonical string.

use crate::error::{KilnError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

const KNOWN_OS: &[&str] = &[
    "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "js", "linux",
    "nacl", "netbsd", "openbsd", "plan9", "solaris", "windows", "zos",
];

const KNOWN_ARCH: &[&str] = &[
    "386", "amd64", "amd64p32", "arm", "armbe", "arm64", "arm64be", "loong64", "mips", "mipsle",
    "mips64", "mips64le", "mips64p32", "mips64p32le", "ppc", "ppc64", "ppc64le", "riscv",
    "riscv64", "s390", "s390x", "sparc", "sparc64", "wasm",
];

/// A normalized (os, architecture, variant) triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Platform {
    os: String,
    architecture: String,
    variant: Option<String>,
}

impl Platform {
    /// Build a platform from its parts, normalizing aliases.
    pub fn new(os: &str, architecture: &str, variant: Option<&str>) -> Self {
        let (architecture, variant) = normalize_arch(architecture, variant.unwrap_or(""));
        Self {
            os: normalize_os(os),
            architecture,
            variant: if variant.is_empty() { None } else { Some(variant) },
        }
    }

    /// The platform of the invoking host.
    pub fn host() -> Self {
        Self::new(std::env::consts::OS, host_arch(), None)
    }

    pub fn os(&self) -> &str {
        &self.os
    }

    pub fn architecture(&self) -> &str {
        &self.architecture
    }

    pub fn variant(&self) -> Option<&str> {
        self.variant.as_deref()
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.variant {
            Some(variant) => write!(f, "{}/{}/{}", self.os, self.architecture, variant),
            None => write!(f, "{}/{}", self.os, self.architecture),
        }
    }
}

impl FromStr for Platform {
    type Err = KilnError;

    fn from_str(s: &str) -> Result<Self> {
        parse_one(s)
    }
}

impl TryFrom<String> for Platform {
    type Error = KilnError;

    fn try_from(s: String) -> Result<Self> {
        parse_one(&s)
    }
}

impl From<Platform> for String {
    fn from(p: Platform) -> Self {
        p.to_string()
    }
}

/// Parse platform specifiers.
///
/// Each spec may hold several comma-separated platforms. The token `local`
/// (any case) stands for the host platform.
pub fn parse<S: AsRef<str>>(specs: &[S]) -> Result<Vec<Platform>> {
    let mut out = Vec::with_capacity(specs.len());
    for spec in specs {
        let spec = spec.as_ref();
        let parts: Vec<&str> = spec.split(',').collect();
        if parts.len() > 1 {
            out.extend(parse(parts.as_slice())?);
            continue;
        }
        out.push(parse_one(spec)?);
    }
    Ok(out)
}

/// Remove duplicate platforms, keeping the first occurrence of each.
pub fn dedupe(platforms: &[Platform]) -> Vec<Platform> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(platforms.len());
    for p in platforms {
        let p = Platform::new(&p.os, &p.architecture, p.variant.as_deref());
        if seen.insert(p.to_string()) {
            out.push(p);
        }
    }
    out
}

/// Render platforms to their canonical strings.
pub fn format(platforms: &[Platform]) -> Vec<String> {
    platforms.iter().map(ToString::to_string).collect()
}

fn parse_one(spec: &str) -> Result<Platform> {
    let trimmed = spec.trim();
    if trimmed.eq_ignore_ascii_case("local") {
        return Ok(Platform::host());
    }

    let invalid = |reason: &str| KilnError::InvalidPlatform {
        spec: spec.to_string(),
        reason: reason.to_string(),
    };

    let parts: Vec<&str> = trimmed.split('/').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(invalid("empty platform component"));
    }

    let platform = match parts.as_slice() {
        [single] => {
            let single = single.to_lowercase();
            if is_known_os(&normalize_os(&single)) {
                Platform::new(&single, host_arch(), None)
            } else if is_known_arch(&normalize_arch(&single, "").0) {
                Platform::new(std::env::consts::OS, &single, None)
            } else {
                return Err(invalid("unknown operating system or architecture"));
            }
        }
        [os, arch] => Platform::new(os, arch, None),
        [os, arch, variant] => Platform::new(os, arch, Some(*variant)),
        _ => return Err(invalid("too many components, expected os/arch[/variant]")),
    };

    if !is_known_os(&platform.os) {
        return Err(invalid("unknown operating system"));
    }
    if !is_known_arch(&platform.architecture) {
        return Err(invalid("unknown architecture"));
    }
    Ok(platform)
}

fn is_known_os(os: &str) -> bool {
    KNOWN_OS.contains(&os)
}

fn is_known_arch(arch: &str) -> bool {
    KNOWN_ARCH.contains(&arch)
}

fn normalize_os(os: &str) -> String {
    match os.to_lowercase().as_str() {
        "macos" => "darwin".to_string(),
        other => other.to_string(),
    }
}

fn normalize_arch(arch: &str, variant: &str) -> (String, String) {
    let arch = arch.to_lowercase();
    let variant = variant.to_lowercase();
    match arch.as_str() {
        "i386" | "i686" => ("386".into(), String::new()),
        "x86_64" | "x86-64" | "amd64" => {
            let variant = if variant == "v1" { String::new() } else { variant };
            ("amd64".into(), variant)
        }
        "aarch64" | "arm64" => {
            let variant = match variant.as_str() {
                "8" | "v8" => String::new(),
                _ => variant,
            };
            ("arm64".into(), variant)
        }
        "armhf" => ("arm".into(), "v7".into()),
        "armel" => ("arm".into(), "v6".into()),
        "arm" => {
            let variant = match variant.as_str() {
                "" | "7" => "v7".into(),
                "5" | "6" | "8" => format!("v{}", variant),
                _ => variant,
            };
            ("arm".into(), variant)
        }
        _ => (arch, variant),
    }
}

fn host_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "x86" => "386",
        "aarch64" => "arm64",
        "loongarch64" => "loong64",
        "powerpc64" if cfg!(target_endian = "little") => "ppc64le",
        "powerpc64" => "ppc64",
        "powerpc" => "ppc",
        other => other,
    }
}
