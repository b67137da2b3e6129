use super::{Cycle, Payload, Source};
use crate::error::CollectError;
use crate::parsers::security::{
    parse_features, parse_getenforce, parse_package_permissions, AppPermission,
    HardwareSecurityInfo,
};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

const SELINUX: &str = "selinux";
const FEATURES: &str = "features";
const KEYSTORE: &str = "keystore";
const PERMISSIONS: &str = "permissions";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityInfo {
    pub selinux_status: String,
    pub selinux_mode: String,
    pub permission_map: BTreeMap<String, Vec<AppPermission>>,
    pub hardware: HardwareSecurityInfo,
}

impl Payload for SecurityInfo {
    fn is_empty(&self) -> bool {
        false
    }
}

#[derive(Debug, Default)]
pub struct SecuritySource;

impl SecuritySource {
    pub fn new() -> Self {
        Self
    }
}

/// Raw answers of the four commands behind one security snapshot.
struct Answers {
    getenforce: Result<Option<String>, CollectError>,
    features: Result<Vec<String>, CollectError>,
    keystore: Result<Option<String>, CollectError>,
    packages: Result<Vec<String>, CollectError>,
}

fn security_info(
    getenforce: Option<&str>,
    features: &BTreeSet<String>,
    keystore: Option<&str>,
    permission_map: BTreeMap<String, Vec<AppPermission>>,
) -> SecurityInfo {
    let (selinux_status, selinux_mode) = parse_getenforce(getenforce);
    SecurityInfo {
        selinux_status,
        selinux_mode,
        permission_map,
        hardware: HardwareSecurityInfo::from_features(features, keystore),
    }
}

/// Failed or silent commands fall back part by part.
fn assemble(cycle: &mut Cycle, answers: Answers) -> Result<SecurityInfo, CollectError> {
    let enforce = cycle.recover(SELINUX, answers.getenforce, || None)?;
    let features = cycle.recover(
        FEATURES,
        answers.features.map(|lines| parse_features(lines)),
        BTreeSet::new,
    )?;
    let keystore = cycle.recover(KEYSTORE, answers.keystore, || None)?;
    let permission_map = cycle.recover(
        PERMISSIONS,
        answers.packages.map(|lines| parse_package_permissions(lines)),
        BTreeMap::new,
    )?;
    Ok(security_info(
        enforce.as_deref(),
        &features,
        keystore.as_deref(),
        permission_map,
    ))
}

#[async_trait]
impl Source for SecuritySource {
    type Output = SecurityInfo;

    fn name(&self) -> &'static str {
        "security"
    }

    fn parts(&self) -> &'static [&'static str] {
        &[SELINUX, FEATURES, KEYSTORE, PERMISSIONS]
    }

    async fn collect(&mut self, cycle: &mut Cycle) -> Result<SecurityInfo, CollectError> {
        let exec = cycle.executor().clone();
        let answers = Answers {
            getenforce: exec.first_line("getenforce", &[]).await,
            features: exec.lines("pm", &["list", "features"]).await,
            keystore: exec.first_line("getprop", &["ro.hardware.keystore"]).await,
            packages: exec.lines("dumpsys", &["package", "packages"]).await,
        };
        assemble(cycle, answers)
    }

    fn placeholder(&self, _now_ms: i64) -> SecurityInfo {
        security_info(None, &BTreeSet::new(), None, BTreeMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::{testing, Origin};

    fn unavailable(program: &str) -> CollectError {
        CollectError::Unavailable {
            program: program.to_string(),
            reason: "not installed".to_string(),
        }
    }

    fn owned(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn assembles_from_command_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (_tx, mut cycle) = testing::cycle("security", dir.path());
        let answers = Answers {
            getenforce: Ok(Some("Permissive".to_string())),
            features: Ok(owned(&["feature:android.hardware.fingerprint"])),
            keystore: Ok(Some("mdfpp".to_string())),
            packages: Ok(owned(&[
                "  Package [com.example.app] (1):",
                "    pkgFlags=[ HAS_CODE ]",
                "    install permissions:",
                "      android.permission.INTERNET: granted=true",
            ])),
        };
        let info = assemble(&mut cycle, answers).expect("assemble");
        assert_eq!(info.selinux_status, "Enabled");
        assert_eq!(info.selinux_mode, "Permissive");
        assert!(info.hardware.tee);
        assert_eq!(info.permission_map["com.example.app"].len(), 1);
        assert_eq!(cycle.origin(SecuritySource.parts()), Origin::Collected);
    }

    #[test]
    fn failed_commands_are_marked_synthetic() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (_tx, mut cycle) = testing::cycle("security", dir.path());
        let answers = Answers {
            getenforce: Err(unavailable("getenforce")),
            features: Err(unavailable("pm")),
            keystore: Ok(None),
            packages: Err(unavailable("dumpsys")),
        };
        let info = assemble(&mut cycle, answers).expect("assemble");
        assert_eq!(info, SecuritySource.placeholder(0));
        assert_eq!(cycle.origin(SecuritySource.parts()), Origin::Synthetic);
    }

    #[test]
    fn one_failed_command_is_partial() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (_tx, mut cycle) = testing::cycle("security", dir.path());
        let answers = Answers {
            getenforce: Ok(Some("Enforcing".to_string())),
            features: Ok(owned(&["feature:android.hardware.strongbox_keystore"])),
            keystore: Ok(Some("tee".to_string())),
            packages: Err(unavailable("dumpsys")),
        };
        let info = assemble(&mut cycle, answers).expect("assemble");
        assert!(info.hardware.strongbox_keystore);
        assert_eq!(
            cycle.origin(SecuritySource.parts()),
            Origin::Partial(vec![PERMISSIONS])
        );
    }

    #[test]
    fn cancellation_passes_through() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (_tx, mut cycle) = testing::cycle("security", dir.path());
        let answers = Answers {
            getenforce: Err(CollectError::Cancelled),
            features: Ok(Vec::new()),
            keystore: Ok(None),
            packages: Ok(Vec::new()),
        };
        assert!(assemble(&mut cycle, answers).unwrap_err().is_cancelled());
    }

    #[test]
    fn placeholder_is_all_unknown() {
        let info = SecuritySource::new().placeholder(0);
        assert_eq!(info.selinux_status, "Unknown");
        assert_eq!(info.hardware.keystore_version, "Unknown");
        assert!(info.permission_map.is_empty());
    }
}
