//! Static config generator
//!
//! Builds a complete haproxy.cfg for one configuration handle in a single
//! pass: one `listen` block per VIP. Nothing is parsed or patched, and the
//! translation is independent from the incremental path in `config_model`.

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::domain::{HealthMonitor, Member, MonitorType, PersistenceType, Pool, Vip};

const PREAMBLE: &str = "global
\tdaemon
\tmaxconn 256
\tstats socket /tmp/haproxy

defaults
\tmode http
\ttimeout connect 5000ms
\ttimeout client 50000ms
\ttimeout server 50000ms
\tstats enable
\tlog global
\tstats scope .
\tstats realm Haproxy\\ Statistics
\tstats uri /haproxy?stats
\toption contstats

";

/// Read-only access to stored load-balancing objects
pub trait ObjectSource {
    /// Every VIP grouped under `config_handle_id`, in storage order
    fn vips(&self, config_handle_id: &str) -> Result<Vec<Vip>>;
    fn pool(&self, pool_id: &str) -> Result<Pool>;
    fn members(&self, pool_id: &str) -> Result<Vec<Member>>;
    fn health_monitor(&self, pool_id: &str) -> Result<Option<HealthMonitor>>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerateRequest {
    pub config_handle_id: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratedConfig {
    pub config_handle_id: String,
    pub slug: String,
    pub version: String,
    pub data: String,
}

/// Generate the full configuration text for `request.config_handle_id`.
pub fn create_config(source: &dyn ObjectSource, request: &GenerateRequest) -> Result<GeneratedConfig> {
    let vips = source
        .vips(&request.config_handle_id)
        .with_context(|| format!("Cannot load VIPs of handle {}", request.config_handle_id))?;

    let mut data = PREAMBLE.to_string();
    for vip in &vips {
        let pool = source
            .pool(&vip.pool_id)
            .with_context(|| format!("Cannot load pool {} of VIP {}", vip.pool_id, vip.name))?;
        let members = source.members(&pool.id)?;
        let monitor = source.health_monitor(&pool.id)?;
        if monitor.is_none() {
            debug!("No health monitor mapped for VIP {}", vip.name);
        }
        data.push_str(&listen_block(vip, &pool, &members, monitor.as_ref()));
    }

    debug!(
        "Generated configuration for handle {} with {} listen blocks",
        request.config_handle_id,
        vips.len()
    );
    Ok(GeneratedConfig {
        config_handle_id: request.config_handle_id.clone(),
        slug: request.slug.clone(),
        version: request.version.clone(),
        data,
    })
}

fn listen_block(
    vip: &Vip,
    pool: &Pool,
    members: &[Member],
    monitor: Option<&HealthMonitor>,
) -> String {
    let mut block = String::new();
    let mut line = |text: String| {
        block.push('\t');
        block.push_str(&text);
        block.push('\n');
    };

    line(format!("mode {}", vip.protocol.to_string().to_lowercase()));
    line(format!("bind :{}", vip.port));
    if let Some(limit) = vip.connection_limit.filter(|limit| *limit >= 0) {
        line(format!("maxconn {}", limit));
    }
    line(format!("balance {}", pool.lb_method.to_string().to_lowercase()));

    if let Some(monitor) = monitor {
        if monitor.monitor_type == MonitorType::Http {
            line(format!(
                "option httpchk {} {} HTTP/1.0",
                non_empty(&monitor.http_method).unwrap_or("OPTIONS"),
                non_empty(&monitor.url_path).unwrap_or("/")
            ));
        }
        if let Some(codes) = non_empty(&monitor.expected_codes) {
            match codes.parse::<u16>() {
                Ok(status) => line(format!("http-check expect status {}", status)),
                Err(_) => line(format!("http-check expect {}", codes)),
            }
        }
    }

    let persistence = vip
        .session_persistence
        .as_ref()
        .and_then(|p| p.persistence_type.map(|kind| (kind, non_empty(&p.cookie_name))));
    if let Some((kind, cookie_name)) = persistence {
        line("option persist".to_string());
        match (kind, cookie_name) {
            (PersistenceType::HttpCookie, Some(name)) => line(format!("cookie {} insert", name)),
            (PersistenceType::AppCookie, Some(name)) => {
                line(format!("appsession {} len 64 timeout 1h", name))
            }
            _ => {}
        }
    }
    let cookies = matches!(persistence, Some((PersistenceType::HttpCookie, _)));

    for member in members {
        line(server_line(member, cookies, monitor));
    }

    format!("listen {}\n{}", vip.name, block)
}

fn server_line(member: &Member, cookies: bool, monitor: Option<&HealthMonitor>) -> String {
    let mut line = format!(
        "server {} {}:{}",
        member.address, member.address, member.port
    );
    if cookies {
        line.push_str(&format!(" cookie {}", member.address.replace('.', "")));
    }
    if member.weight != 0 {
        line.push_str(&format!(" weight {}", member.weight));
    }
    if let Some(monitor) = monitor.filter(|m| m.delay != 0 || m.max_retries != 0) {
        line.push_str(" check");
        if monitor.delay != 0 {
            line.push_str(&format!(" inter {}s", monitor.delay));
        }
        if monitor.max_retries != 0 {
            line.push_str(&format!(" fall {}", monitor.max_retries));
        }
        line.push_str(" rise 1");
    }
    line
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
