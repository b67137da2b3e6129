use super::{Cycle, Source};
use crate::error::CollectError;
use crate::parsers::net::{decode_tcp_connections, TcpConnection};
use crate::synthetic;
use async_trait::async_trait;

/// IPv4 TCP sockets with decoded endpoints.
#[derive(Debug, Default)]
pub struct TcpSource;

impl TcpSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Source for TcpSource {
    type Output = Vec<TcpConnection>;

    fn name(&self) -> &'static str {
        "tcp"
    }

    async fn collect(&mut self, cycle: &mut Cycle) -> Result<Vec<TcpConnection>, CollectError> {
        let json = cycle.provider().tcp_connections().await?;
        decode_tcp_connections(&json)
    }

    fn placeholder(&self, _now_ms: i64) -> Vec<TcpConnection> {
        synthetic::tcp_connections()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::testing;
    use crate::provider::tests::fake_procfs;
    use std::fs;

    #[tokio::test]
    async fn decodes_table() {
        let procfs = fake_procfs();
        let (_tx, mut cycle) = testing::cycle("tcp", procfs.path());
        let conns = TcpSource::new().collect(&mut cycle).await.expect("collect");
        assert_eq!(conns.len(), 2);
        assert_eq!(conns[0].local_address, "127.0.0.1:80");
    }

    #[tokio::test]
    async fn header_only_table_is_empty() {
        let procfs = fake_procfs();
        fs::write(
            procfs.path().join("net/tcp"),
            "  sl  local_address rem_address   st\n",
        )
        .expect("tcp");
        let (_tx, mut cycle) = testing::cycle("tcp", procfs.path());
        let conns = TcpSource::new().collect(&mut cycle).await.expect("collect");
        assert!(conns.is_empty());
    }
}
