//! Placeholder datasets substituted when a source produces nothing.
//!
//! Every value here is fixed so a consumer can recognise it, either by the
//! snapshot's [`Origin`](crate::collectors::Origin) or by comparing against
//! these functions with [`is_placeholder`].

use crate::parsers::framework::{ApiCallInfo, BinderTransaction, ServiceManagerData};
use crate::parsers::hal::{HalInterface, HalKind, HwService, VndkInfo, VNDK_CORE_LIBRARIES};
use crate::parsers::net::{InterfaceStats, TcpConnection};
use crate::parsers::proc::CpuStat;
use std::collections::BTreeMap;

/// Prefix of every fabricated interface name.
pub const SYNTHETIC_INTERFACE_PREFIX: &str = "dummy:";

pub const PLACEHOLDER_CALLER: &str = "com.aoscoremonitor";
pub const PLACEHOLDER_VNDK_VERSION: &str = "30";

const MB: u64 = 1024 * 1024;

pub fn is_placeholder<T: PartialEq>(value: &T, placeholder: &T) -> bool {
    value == placeholder
}

pub fn is_synthetic_interface(name: &str) -> bool {
    name.starts_with(SYNTHETIC_INTERFACE_PREFIX)
}

pub fn binder_transactions(now_ms: i64) -> Vec<BinderTransaction> {
    [
        (1_234, "system_server", 7, "0x2f", 1_024),
        (1_234, "system_server", 12, "0x31", 256),
        (2_001, "surfaceflinger", 3, "0x11", 4_096),
    ]
    .into_iter()
    .map(|(pid, process, code, dest, size)| BinderTransaction {
        pid,
        process: process.to_string(),
        transaction_code: code,
        destination: dest.to_string(),
        data_size: size,
        timestamp_ms: now_ms,
    })
    .collect()
}

pub fn api_calls(now_ms: i64) -> Vec<ApiCallInfo> {
    vec![
        ApiCallInfo {
            api_name: "android.app.ActivityManager.getRunningAppProcesses".to_string(),
            caller_package: PLACEHOLDER_CALLER.to_string(),
            timestamp_ms: now_ms,
            duration_ms: 3,
        },
        ApiCallInfo {
            api_name: "android.content.pm.PackageManager.getInstalledPackages".to_string(),
            caller_package: PLACEHOLDER_CALLER.to_string(),
            timestamp_ms: now_ms - 1_000,
            duration_ms: 120,
        },
    ]
}

pub fn running_services() -> BTreeMap<String, String> {
    [
        "com.android.systemui/.SystemUIService",
        "com.android.phone/.TelephonyDebugService",
        "android/com.android.server.telecom.TelecomLoaderService",
    ]
    .into_iter()
    .map(|name| (name.to_string(), "Running".to_string()))
    .collect()
}

pub fn service_connections() -> Vec<(String, String)> {
    vec![(
        PLACEHOLDER_CALLER.to_string(),
        "com.android.systemui/.SystemUIService".to_string(),
    )]
}

pub fn service_data() -> ServiceManagerData {
    ServiceManagerData {
        running_services: running_services(),
        service_connections: service_connections(),
    }
}

pub fn hal_interfaces() -> Vec<HalInterface> {
    [
        ("android.hardware.audio@7.0::IDevicesFactory", "7.0", "default"),
        ("android.hardware.camera@2.5::ICameraProvider", "2.5", "qcom"),
        ("android.hardware.bluetooth@1.1::IBluetoothHci", "1.1", "default"),
        ("android.hardware.sensors@2.1::ISensors", "2.1", "default"),
        ("android.hardware.nfc@1.2::INfc", "1.2", "default"),
    ]
    .into_iter()
    .map(|(name, version, implementation)| HalInterface {
        name: name.to_string(),
        version: version.to_string(),
        kind: HalKind::Hidl,
        implementation: implementation.to_string(),
        status: "Running".to_string(),
    })
    .collect()
}

pub fn hw_services() -> Vec<HwService> {
    let service = |name: &str, server: &str, clients: &[&str]| HwService {
        name: name.to_string(),
        server: server.to_string(),
        clients: clients.iter().map(|c| c.to_string()).collect(),
    };
    vec![
        service(
            "SurfaceFlinger",
            "surfaceflinger",
            &["system_server", "com.android.systemui"],
        ),
        service(
            "audio",
            "audioserver",
            &["com.android.music", "com.spotify.music"],
        ),
        service("camera", "cameraserver", &["com.android.camera"]),
        service(
            "power",
            "system_server",
            &["com.android.systemui", "com.android.settings"],
        ),
    ]
}

pub fn vndk_info() -> VndkInfo {
    VndkInfo {
        version: PLACEHOLDER_VNDK_VERSION.to_string(),
        libraries: VNDK_CORE_LIBRARIES
            .iter()
            .chain(["libui.so", "libgui.so"].iter())
            .map(|l| l.to_string())
            .collect(),
    }
}

pub fn native_cpu() -> BTreeMap<String, u64> {
    CpuStat::default().as_map()
}

pub fn native_memory() -> BTreeMap<String, u64> {
    ["MemTotal", "MemFree", "MemAvailable", "Buffers", "Cached"]
        .into_iter()
        .map(|k| (k.to_string(), 0))
        .collect()
}

pub fn native_process() -> BTreeMap<String, String> {
    BTreeMap::from([("Name".to_string(), "unavailable".to_string())])
}

pub fn interface_stats() -> BTreeMap<String, InterfaceStats> {
    let entry = |rx: [u64; 4], tx: [u64; 4]| InterfaceStats {
        rx_bytes: rx[0],
        rx_packets: rx[1],
        rx_errors: rx[2],
        rx_dropped: rx[3],
        tx_bytes: tx[0],
        tx_packets: tx[1],
        tx_errors: tx[2],
        tx_dropped: tx[3],
    };
    BTreeMap::from([
        (
            format!("{SYNTHETIC_INTERFACE_PREFIX}wlan0"),
            entry([50 * MB, 1_500, 2, 0], [10 * MB, 800, 0, 1]),
        ),
        (
            format!("{SYNTHETIC_INTERFACE_PREFIX}eth0"),
            entry([25 * MB, 1_200, 1, 0], [5 * MB, 600, 0, 0]),
        ),
        (
            format!("{SYNTHETIC_INTERFACE_PREFIX}rmnet0"),
            entry([120 * MB, 3_500, 5, 2], [30 * MB, 2_200, 1, 3]),
        ),
    ])
}

pub fn tcp_connections() -> Vec<TcpConnection> {
    [
        ("192.168.1.100:45678", "142.250.196.110:443", "ESTABLISHED", 10_123),
        ("0.0.0.0:5555", "0.0.0.0:0", "LISTEN", 2_000),
        ("192.168.1.100:52344", "17.253.144.10:443", "TIME_WAIT", 10_087),
    ]
    .into_iter()
    .map(|(local, remote, status, uid)| TcpConnection {
        local_address: local.to_string(),
        remote_address: remote.to_string(),
        status: status.to_string(),
        uid,
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interface_names_are_marked() {
        let stats = interface_stats();
        assert_eq!(stats.len(), 3);
        assert!(stats.keys().all(|k| is_synthetic_interface(k)));
        assert!(!is_synthetic_interface("wlan0"));
        assert_eq!(stats["dummy:rmnet0"].rx_bytes, 120 * MB);
    }

    #[test]
    fn api_call_timestamps_follow_clock() {
        let calls = api_calls(10_000);
        assert_eq!(calls[0].timestamp_ms, 10_000);
        assert_eq!(calls[1].timestamp_ms, 9_000);
        assert!(is_placeholder(&calls, &api_calls(10_000)));
        assert!(!is_placeholder(&calls, &api_calls(10_001)));
    }

    #[test]
    fn vndk_placeholder_extends_core_list() {
        let vndk = vndk_info();
        assert_eq!(vndk.version, "30");
        assert_eq!(vndk.libraries.len(), VNDK_CORE_LIBRARIES.len() + 2);
        assert_eq!(vndk.libraries.last().map(String::as_str), Some("libgui.so"));
    }

    #[test]
    fn nothing_is_empty() {
        assert!(!binder_transactions(0).is_empty());
        assert!(!service_data().running_services.is_empty());
        assert!(!service_data().service_connections.is_empty());
        assert_eq!(hal_interfaces().len(), 5);
        assert_eq!(hw_services().len(), 4);
        assert_eq!(native_cpu().len(), 7);
        assert!(!tcp_connections().is_empty());
    }
}
