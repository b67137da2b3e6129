use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

static PACKAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*Package \[([^\]]+)\]").expect("valid regex"));
static PERMISSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(android\.permission\.[\w.]+): granted=(true|false)").expect("valid regex")
});

pub const FEATURE_HARDWARE_KEYSTORE: &str = "android.hardware.hardware_keystore";
pub const FEATURE_STRONGBOX_KEYSTORE: &str = "android.hardware.strongbox_keystore";
pub const FEATURE_FINGERPRINT: &str = "android.hardware.fingerprint";
pub const FEATURE_FACE: &str = "android.hardware.biometrics.face";
pub const FEATURE_IRIS: &str = "android.hardware.biometrics.iris";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppPermission {
    pub permission_name: String,
    pub is_granted: bool,
    pub is_protection_dangerous: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HardwareSecurityInfo {
    pub hardware_backed_keystore: bool,
    pub strongbox_keystore: bool,
    pub fingerprint: bool,
    pub biometric: bool,
    pub tee: bool,
    pub keystore_version: String,
}

impl HardwareSecurityInfo {
    /// Derives the flags from `pm list features` and `ro.hardware.keystore`.
    ///
    /// There is no direct TEE probe without the keystore API, so fingerprint
    /// support (which requires a TEE) stands in for it.
    pub fn from_features(features: &BTreeSet<String>, keystore: Option<&str>) -> Self {
        let has = |f: &str| features.contains(f);
        let keystore = keystore.map(str::trim).filter(|k| !k.is_empty());
        let fingerprint = has(FEATURE_FINGERPRINT);
        Self {
            hardware_backed_keystore: has(FEATURE_HARDWARE_KEYSTORE) || keystore.is_some(),
            strongbox_keystore: has(FEATURE_STRONGBOX_KEYSTORE),
            fingerprint,
            biometric: fingerprint || has(FEATURE_FACE) || has(FEATURE_IRIS),
            tee: fingerprint,
            keystore_version: keystore.unwrap_or("Unknown").to_string(),
        }
    }
}

/// `getenforce` prints the mode; no output means the state is unknown.
pub fn parse_getenforce(line: Option<&str>) -> (String, String) {
    match line.map(str::trim).filter(|l| !l.is_empty()) {
        Some(mode) => {
            let status = if mode.eq_ignore_ascii_case("disabled") {
                "Disabled"
            } else {
                "Enabled"
            };
            (status.to_string(), mode.to_string())
        }
        None => ("Unknown".to_string(), "Unknown".to_string()),
    }
}

/// `pm list features` prints `feature:<name>[=<version>]` per line.
pub fn parse_features<I, S>(lines: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .filter_map(|l| {
            let rest = l.as_ref().trim().strip_prefix("feature:")?;
            let name = rest.split('=').next().unwrap_or(rest).trim();
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    None,
    Install,
    Runtime,
}

/// Builds a package → permissions map from `dumpsys package packages`.
///
/// Packages flagged `SYSTEM` are skipped. Permissions listed under
/// `runtime permissions:` are the dangerous ones; `install permissions:`
/// are not. Only `android.permission.*` entries are kept.
pub fn parse_package_permissions<I, S>(lines: I) -> BTreeMap<String, Vec<AppPermission>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: BTreeMap<String, Vec<AppPermission>> = BTreeMap::new();
    let mut current: Option<String> = None;
    let mut system = false;
    let mut section = Section::None;

    let mut flush = |pkg: Option<String>, perms: &mut Vec<AppPermission>, system: bool| {
        if let Some(pkg) = pkg {
            if !system && !perms.is_empty() {
                out.insert(pkg, std::mem::take(perms));
            }
        }
        perms.clear();
    };
    let mut perms = Vec::new();

    for line in lines {
        let line = line.as_ref();
        if let Some(caps) = PACKAGE_RE.captures(line) {
            flush(current.take(), &mut perms, system);
            current = Some(caps[1].to_string());
            system = false;
            section = Section::None;
            continue;
        }
        if current.is_none() {
            continue;
        }

        let trimmed = line.trim();
        if trimmed.starts_with("pkgFlags=[") || trimmed.starts_with("flags=[") {
            if trimmed.split_whitespace().any(|t| t == "SYSTEM") {
                system = true;
            }
            continue;
        }
        if trimmed == "install permissions:" {
            section = Section::Install;
            continue;
        }
        if trimmed == "runtime permissions:" {
            section = Section::Runtime;
            continue;
        }
        if trimmed.ends_with(':') && !trimmed.contains(' ') {
            section = Section::None;
            continue;
        }
        if trimmed.ends_with("permissions:") {
            section = Section::None;
            continue;
        }

        if section == Section::None {
            continue;
        }
        if let Some(caps) = PERMISSION_RE.captures(line) {
            perms.push(AppPermission {
                permission_name: caps[1].to_string(),
                is_granted: &caps[2] == "true",
                is_protection_dangerous: section == Section::Runtime,
            });
        }
    }
    flush(current.take(), &mut perms, system);

    out
}
