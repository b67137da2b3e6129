use super::{lines_or_empty, Cycle, Payload, Source};
use crate::error::CollectError;
use crate::parsers::framework::{
    parse_api_calls, parse_binder_transactions, parse_service_records, ApiCallInfo,
    BinderTransaction, ServiceManagerData,
};
use crate::synthetic;
use async_trait::async_trait;
use serde::Serialize;

const BINDER: &str = "binder_transactions";
const API_CALLS: &str = "api_calls";
const SERVICES: &str = "running_services";
const CONNECTIONS: &str = "service_connections";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameworkData {
    pub binder_transactions: Vec<BinderTransaction>,
    pub api_calls: Vec<ApiCallInfo>,
    pub service_data: ServiceManagerData,
}

impl Payload for FrameworkData {
    fn is_empty(&self) -> bool {
        self.binder_transactions.is_empty()
            && self.api_calls.is_empty()
            && self.service_data.running_services.is_empty()
            && self.service_data.service_connections.is_empty()
    }
}

/// Binder traffic, framework API call summaries and the service registry.
#[derive(Debug, Default)]
pub struct FrameworkSource;

impl FrameworkSource {
    pub fn new() -> Self {
        Self
    }
}

fn framework_data(
    cycle: &mut Cycle,
    binder: &[String],
    activity: &[String],
    services: &[String],
) -> FrameworkData {
    let now_ms = cycle.now_ms();
    let binder_transactions = cycle.fallback(BINDER, parse_binder_transactions(binder, now_ms), || {
        synthetic::binder_transactions(now_ms)
    });
    let api_calls = cycle.fallback(API_CALLS, parse_api_calls(activity, now_ms), || {
        synthetic::api_calls(now_ms)
    });
    let parsed = parse_service_records(services);
    let service_data = ServiceManagerData {
        running_services: cycle.fallback(
            SERVICES,
            parsed.running_services,
            synthetic::running_services,
        ),
        service_connections: cycle.fallback(
            CONNECTIONS,
            parsed.service_connections,
            synthetic::service_connections,
        ),
    };
    FrameworkData {
        binder_transactions,
        api_calls,
        service_data,
    }
}

#[async_trait]
impl Source for FrameworkSource {
    type Output = FrameworkData;

    fn name(&self) -> &'static str {
        "framework"
    }

    fn parts(&self) -> &'static [&'static str] {
        &[BINDER, API_CALLS, SERVICES, CONNECTIONS]
    }

    async fn collect(&mut self, cycle: &mut Cycle) -> Result<FrameworkData, CollectError> {
        let exec = cycle.executor().clone();
        let binder = lines_or_empty(self.name(), exec.lines("dumpsys", &["binder_txns"]).await)?;
        let activity = lines_or_empty(self.name(), exec.lines("dumpsys", &["activity", "asm"]).await)?;
        let services = lines_or_empty(
            self.name(),
            exec.lines("dumpsys", &["activity", "services"]).await,
        )?;
        Ok(framework_data(cycle, &binder, &activity, &services))
    }

    fn placeholder(&self, now_ms: i64) -> FrameworkData {
        FrameworkData {
            binder_transactions: synthetic::binder_transactions(now_ms),
            api_calls: synthetic::api_calls(now_ms),
            service_data: synthetic::service_data(),
        }
    }
}
