//! HAProxy block descriptors
//!
//! Transitional layer between the domain records and the config model: each
//! descriptor carries exactly what one HAProxy block or line needs, already
//! translated (mode, balance algorithm, numeric ids).

use uuid::Uuid;

use crate::constants::{DEFAULT_EXPECTED_CODES, DEFAULT_PROBE_METHOD, DEFAULT_PROBE_URI};
use crate::domain::{HealthMonitor, Member, MonitorType, Pool, Vip};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Frontend,
    Listen,
    Backend,
}

impl BlockKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            BlockKind::Frontend => "frontend",
            BlockKind::Listen => "listen",
            BlockKind::Backend => "backend",
        }
    }
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Names one top-level block for deletion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRef {
    pub kind: BlockKind,
    pub name: String,
}

impl BlockRef {
    pub fn frontend(name: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::Frontend,
            name: name.into(),
        }
    }

    pub fn backend(name: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::Backend,
            name: name.into(),
        }
    }
}

/// HAProxy `id` for a domain id.
///
/// `show stat` addresses proxies and servers by numeric id, so UUIDs are
/// reduced to their 16-bit `time_mid` field. Other ids are kept as they are.
pub fn block_id(domain_id: &str) -> String {
    match Uuid::parse_str(domain_id) {
        Ok(uuid) => uuid.as_fields().1.to_string(),
        Err(_) => domain_id.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frontend {
    pub name: String,
    pub id: String,
    pub bind_address: String,
    pub bind_port: u16,
    pub mode: &'static str,
    pub default_backend: String,
    pub maxconn: Option<i64>,
    pub enabled: bool,
}

impl Frontend {
    /// Build the frontend of `vip`, forwarding to the backend named `backend`.
    pub fn from_vip(vip: &Vip, backend: &str) -> Self {
        Self {
            name: vip.name.clone(),
            id: block_id(&vip.id),
            bind_address: vip.address.clone(),
            bind_port: vip.port,
            mode: vip.protocol.mode(),
            default_backend: backend.to_string(),
            maxconn: vip.connection_limit.filter(|limit| *limit > 0),
            enabled: vip.admin_state_up,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    pub name: String,
    pub id: String,
    pub balance: &'static str,
    pub mode: &'static str,
    pub enabled: bool,
}

impl From<&Pool> for Backend {
    fn from(pool: &Pool) -> Self {
        Self {
            name: pool.name.clone(),
            id: block_id(&pool.id),
            balance: pool.lb_method.balance(),
            mode: pool.protocol.mode(),
            enabled: pool.admin_state_up,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Server {
    pub name: String,
    pub id: String,
    pub address: String,
    pub port: u16,
    pub weight: u32,
    pub enabled: bool,
}

impl From<&Member> for Server {
    fn from(member: &Member) -> Self {
        Self {
            name: member.name.clone(),
            id: block_id(&member.id),
            address: member.address.clone(),
            port: member.port,
            weight: member.weight,
            enabled: member.admin_state_up,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub probe_type: MonitorType,
    pub inter: u32,
    pub timeout: u32,
    pub fall: u32,
    pub method: String,
    pub uri: String,
    pub expect: String,
    pub enabled: bool,
}

/// Monitor delay and timeout are seconds; HAProxy reads bare numbers as ms.
impl From<&HealthMonitor> for Probe {
    fn from(monitor: &HealthMonitor) -> Self {
        Self {
            probe_type: monitor.monitor_type,
            inter: monitor.delay.saturating_mul(1000),
            timeout: monitor.timeout.saturating_mul(1000),
            fall: monitor.max_retries,
            method: non_empty_or(&monitor.http_method, DEFAULT_PROBE_METHOD),
            uri: non_empty_or(&monitor.url_path, DEFAULT_PROBE_URI),
            expect: non_empty_or(&monitor.expected_codes, DEFAULT_EXPECTED_CODES),
            enabled: monitor.admin_state_up,
        }
    }
}

impl Probe {
    pub fn is_http(&self) -> bool {
        matches!(self.probe_type, MonitorType::Http | MonitorType::Https)
    }
}

fn non_empty_or(value: &Option<String>, default: &str) -> String {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LbMethod, Protocol};

    #[test]
    fn uuid_ids_are_reduced_to_time_mid() {
        assert_eq!(block_id("6ba7b810-9dad-11d1-80b4-00c04fd430c8"), "40365");
        assert_eq!(block_id("p1"), "p1");
    }

    #[test]
    fn backend_translates_method_and_protocol() {
        let pool = Pool {
            id: "p1".to_string(),
            name: "web".to_string(),
            description: String::new(),
            protocol: Protocol::Https,
            lb_method: LbMethod::SourceIp,
            subnet_id: None,
            admin_state_up: false,
            status: None,
        };
        let backend = Backend::from(&pool);
        assert_eq!(backend.balance, "source");
        assert_eq!(backend.mode, "tcp");
        assert!(!backend.enabled);
    }

    #[test]
    fn probe_fills_http_defaults() {
        let monitor = HealthMonitor {
            id: "hm1".to_string(),
            pool_id: "p1".to_string(),
            monitor_type: MonitorType::Http,
            delay: 5,
            timeout: 3,
            max_retries: 2,
            http_method: Some(" ".to_string()),
            url_path: None,
            expected_codes: None,
            admin_state_up: true,
        };
        let probe = Probe::from(&monitor);
        assert_eq!(probe.method, "GET");
        assert_eq!(probe.uri, "/");
        assert_eq!(probe.expect, "200");
        assert!(probe.is_http());
    }
}
