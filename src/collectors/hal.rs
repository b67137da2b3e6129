use super::{lines_or_empty, Cycle, Payload, Source};
use crate::error::CollectError;
use crate::parsers::hal::{
    parse_lshal, parse_service_list, parse_vndk_version, vndk_info, HalInterface, HwService,
    VndkInfo,
};
use crate::synthetic;
use async_trait::async_trait;
use serde::Serialize;

const INTERFACES: &str = "hal_interfaces";
const HW_SERVICES: &str = "hw_services";
const VNDK: &str = "vndk";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HalData {
    pub hal_interfaces: Vec<HalInterface>,
    pub hw_services: Vec<HwService>,
    pub vndk: VndkInfo,
}

impl Payload for HalData {
    fn is_empty(&self) -> bool {
        self.hal_interfaces.is_empty() && self.hw_services.is_empty()
    }
}

/// HAL interfaces from `lshal`, binder services and the VNDK version.
#[derive(Debug, Default)]
pub struct HalSource;

impl HalSource {
    pub fn new() -> Self {
        Self
    }
}

fn hal_data(
    cycle: &mut Cycle,
    lshal: &[String],
    services: &[String],
    vndk_version: Option<&str>,
) -> HalData {
    let hal_interfaces = cycle.fallback(INTERFACES, parse_lshal(lshal), synthetic::hal_interfaces);
    let hw_services = cycle.fallback(
        HW_SERVICES,
        parse_service_list(services),
        synthetic::hw_services,
    );
    let vndk = cycle
        .fallback(VNDK, parse_vndk_version(vndk_version).map(vndk_info), || {
            Some(synthetic::vndk_info())
        })
        .unwrap_or_else(synthetic::vndk_info);
    HalData {
        hal_interfaces,
        hw_services,
        vndk,
    }
}

#[async_trait]
impl Source for HalSource {
    type Output = HalData;

    fn name(&self) -> &'static str {
        "hal"
    }

    fn parts(&self) -> &'static [&'static str] {
        &[INTERFACES, HW_SERVICES, VNDK]
    }

    async fn collect(&mut self, cycle: &mut Cycle) -> Result<HalData, CollectError> {
        let exec = cycle.executor().clone();
        let lshal = lines_or_empty(self.name(), exec.lines("lshal", &[]).await)?;
        let services = lines_or_empty(self.name(), exec.lines("service", &["list"]).await)?;
        let version = match exec.first_line("getprop", &["ro.vndk.version"]).await {
            Ok(line) => line,
            Err(err) if err.is_cancelled() => return Err(err),
            Err(_) => None,
        };
        Ok(hal_data(cycle, &lshal, &services, version.as_deref()))
    }

    fn placeholder(&self, _now_ms: i64) -> HalData {
        HalData {
            hal_interfaces: synthetic::hal_interfaces(),
            hw_services: synthetic::hw_services(),
            vndk: synthetic::vndk_info(),
        }
    }
}
