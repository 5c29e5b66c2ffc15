//! HAProxy configuration model
//!
//! Parses haproxy.cfg text into blocks, applies structural edits and
//! serializes back to canonical text. Backends get their own structure
//! (options, default-server line, server lines) since nearly every edit lands
//! there.
//!
//! Every line inside a block is stored trimmed and tab-prefixed. Edits that
//! fail leave the model untouched.

use log::{debug, error};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::config_blocks::{block_id, BlockKind, BlockRef, Backend, Frontend, Probe, Server};
use crate::constants::{
    COOKIE_INSERT_OPTION, DEFAULT_EXPECTED_CODES, STICK_ON_SOURCE_OPTION, STICK_TABLE_OPTION,
};
use crate::domain::{MonitorType, PersistenceType, SessionPersistence};
use crate::error::LbError;

const BLOCK_KEYWORDS: [&str; 5] = ["global", "defaults", "listen", "frontend", "backend"];
const DEFAULT_SERVER: &str = "\tdefault-server";

/// One `backend` block split into its three parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSection {
    pub options: Vec<String>,
    pub default_server: String,
    pub servers: Vec<String>,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            options: Vec::new(),
            default_server: DEFAULT_SERVER.to_string(),
            servers: Vec::new(),
        }
    }
}

impl BackendSection {
    fn has_default_server_settings(&self) -> bool {
        let trimmed = self.default_server.trim();
        !trimmed.is_empty() && trimmed != "default-server"
    }

    fn push_option(&mut self, option: String) {
        if !self.options.contains(&option) {
            self.options.push(option);
        }
    }
}

/// Structured HAProxy configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HaproxyConfig {
    comments: Vec<String>,
    /// `global`, `defaults`, `frontend <name>`, `listen <name>` keyed by header
    blocks: BTreeMap<String, Vec<String>>,
    /// Backends in insertion order
    backends: Vec<(String, BackendSection)>,
}

fn compiled(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static pattern is valid"))
}

fn inter_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(&RE, r"\s+inter\s+\d+")
}

fn fall_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(&RE, r"\s+fall\s+\d+")
}

fn check_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(&RE, r"\scheck\b")
}

fn server_cookie_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(&RE, r"\scookie\s+\S+")
}

fn server_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(&RE, r"\sid\s+(\S+)")
}

fn cookie_option_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(&RE, r"^\s+cookie\s+\w+")
}

fn common_option_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(&RE, r"^\s+(?:(?:id|balance|mode)\s+\S+|enabled\b|disabled\b)")
}

/// Header key of a block line, `None` if the line does not open a block.
fn block_header(line: &str) -> Option<String> {
    let mut tokens = line.split_whitespace();
    let keyword = tokens.next()?;
    if !BLOCK_KEYWORDS.contains(&keyword) {
        return None;
    }
    match keyword {
        "global" | "defaults" => Some(keyword.to_string()),
        _ => match tokens.next() {
            Some(name) => Some(format!("{} {}", keyword, name)),
            None => Some(keyword.to_string()),
        },
    }
}

fn header_matches(key: &str, kind: BlockKind, name: &str) -> bool {
    let mut tokens = key.split_whitespace();
    tokens.next() == Some(kind.keyword()) && tokens.next() == Some(name)
}

fn server_name(line: &str) -> Option<&str> {
    let mut tokens = line.split_whitespace();
    match tokens.next() {
        Some("server") => tokens.next(),
        _ => None,
    }
}

fn config_error(msg: String) -> LbError {
    error!("{}", msg);
    LbError::Config(msg)
}

/// Expand an expected-codes spec into an alternation for `rstatus`.
///
/// `"200, 202-204, 410"` becomes `"200|202|203|204|410"`; an empty spec
/// means `200`.
pub fn expected_codes_to_regexp(spec: &str) -> Result<String, LbError> {
    if spec.trim().is_empty() {
        return Ok(DEFAULT_EXPECTED_CODES.to_string());
    }

    let mut codes = Vec::new();
    for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let parse = |code: &str| {
            code.trim()
                .parse::<u16>()
                .map_err(|_| config_error(format!("Invalid expected code: {}", part)))
        };
        match part.split_once('-') {
            None => codes.push(parse(part)?),
            Some((lower, upper)) => {
                let (lower, upper) = (parse(lower)?, parse(upper)?);
                if lower > upper {
                    return Err(config_error(format!(
                        "Invalid range of expected codes: {}",
                        part
                    )));
                }
                codes.extend(lower..=upper);
            }
        }
    }

    if codes.is_empty() {
        return Err(config_error(format!("No expected codes in: '{}'", spec)));
    }

    Ok(codes
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join("|"))
}

impl HaproxyConfig {
    /// Parse configuration text and pin the stats socket to `stats_socket_path`.
    pub fn parse(text: &str, stats_socket_path: &str) -> Self {
        let mut comments = Vec::new();
        let mut blocks: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut raw_backends: Vec<(String, Vec<String>)> = Vec::new();
        let mut current: Option<String> = None;

        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if let Some(key) = block_header(line) {
                if let Some(name) = key.strip_prefix("backend") {
                    let name = name.trim().to_string();
                    raw_backends.retain(|(existing, _)| *existing != name);
                    raw_backends.push((name, Vec::new()));
                } else {
                    blocks.insert(key.clone(), Vec::new());
                }
                current = Some(key);
                continue;
            }

            let entry = format!("\t{}", line);
            match current.as_deref() {
                None => comments.push(line.to_string()),
                Some(key) if key.starts_with("backend") => {
                    if let Some((_, lines)) = raw_backends.last_mut() {
                        lines.push(entry);
                    }
                }
                Some(key) => blocks.entry(key.to_string()).or_default().push(entry),
            }
        }

        let backends = raw_backends
            .into_iter()
            .map(|(name, lines)| (name, Self::structure_backend(lines)))
            .collect();

        let mut config = Self {
            comments,
            blocks,
            backends,
        };
        config.ensure_stats_socket(stats_socket_path);
        config
    }

    fn structure_backend(lines: Vec<String>) -> BackendSection {
        let mut section = BackendSection::default();
        for line in lines {
            if line.starts_with("\tserver") {
                section.servers.push(line);
            } else if line.starts_with("\tdefault-server") {
                section.default_server = line;
            } else {
                section.options.push(line);
            }
        }
        section
    }

    fn ensure_stats_socket(&mut self, stats_socket_path: &str) {
        let stats_socket = format!("\tstats socket {} user root level admin", stats_socket_path);
        let global = self.blocks.entry("global".to_string()).or_default();

        match global.iter().position(|l| l.starts_with("\tstats socket")) {
            Some(index) => {
                global[index] = stats_socket;
                // keep exactly one
                let mut seen = false;
                global.retain(|l| {
                    if !l.starts_with("\tstats socket") {
                        return true;
                    }
                    let keep = !seen;
                    seen = true;
                    keep
                });
            }
            None => global.push(stats_socket),
        }
    }

    /// Serialize to canonical line list
    pub fn to_lines(&self) -> Vec<String> {
        let mut result = self.comments.clone();

        for block in ["global", "defaults"] {
            result.push(block.to_string());
            if let Some(lines) = self.blocks.get(block) {
                result.extend(lines.iter().cloned());
            }
        }

        for (key, lines) in &self.blocks {
            if key.starts_with("frontend") || key.starts_with("listen") {
                result.push(key.clone());
                let mut sorted = lines.clone();
                sorted.sort();
                result.extend(sorted);
            }
        }

        for (name, backend) in &self.backends {
            result.push(format!("backend {}", name));
            result.extend(backend.options.iter().cloned());
            if backend.has_default_server_settings() {
                result.push(backend.default_server.clone());
            }
            result.extend(backend.servers.iter().cloned());
        }

        result
    }

    /// Serialize to configuration text
    pub fn render(&self) -> String {
        let mut text = self.to_lines().join("\n");
        text.push('\n');
        text
    }

    pub fn block(&self, key: &str) -> Option<&[String]> {
        self.blocks.get(key).map(Vec::as_slice)
    }

    pub fn backend(&self, name: &str) -> Option<&BackendSection> {
        self.backends
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, section)| section)
    }

    pub fn backend_names(&self) -> impl Iterator<Item = &str> {
        self.backends.iter().map(|(name, _)| name.as_str())
    }

    /// Backend name for a pool id: a backend named after it, else the one
    /// carrying its `id`. Falls back to the id so the guard reports it.
    pub fn resolve_backend(&self, pool_id: &str) -> String {
        if self.backend(pool_id).is_some() {
            return pool_id.to_string();
        }
        let id_option = format!("\tid {}", block_id(pool_id));
        self.backends
            .iter()
            .find(|(_, section)| section.options.iter().any(|o| *o == id_option))
            .map(|(name, _)| name.clone())
            .unwrap_or_else(|| pool_id.to_string())
    }

    /// Guard for backend-scoped operations
    fn checked_backend(&self, name: &str) -> Result<&BackendSection, LbError> {
        self.backend(name)
            .ok_or_else(|| config_error(format!("No such pool: {}", name)))
    }

    fn checked_backend_mut(&mut self, name: &str) -> Result<&mut BackendSection, LbError> {
        match self.backends.iter_mut().find(|(existing, _)| existing == name) {
            Some((_, section)) => Ok(section),
            None => Err(config_error(format!("No such pool: {}", name))),
        }
    }

    pub fn add_frontend(&mut self, frontend: &Frontend) -> Result<(), LbError> {
        debug!("Adding frontend {}", frontend.name);
        if self
            .blocks
            .keys()
            .any(|key| header_matches(key, BlockKind::Frontend, &frontend.name))
        {
            return Err(config_error(format!(
                "Frontend {} already exists",
                frontend.name
            )));
        }

        let mut lines = vec![
            format!("\tid {}", frontend.id),
            format!("\tbind {}:{}", frontend.bind_address, frontend.bind_port),
            format!("\tmode {}", frontend.mode),
            format!("\tdefault_backend {}", frontend.default_backend),
        ];
        if let Some(maxconn) = frontend.maxconn {
            lines.push(format!("\tmaxconn {}", maxconn));
        }
        lines.push(enabled_line(frontend.enabled));

        self.blocks
            .insert(format!("frontend {}", frontend.name), lines);
        Ok(())
    }

    pub fn add_backend(&mut self, backend: &Backend) -> Result<(), LbError> {
        debug!("Adding backend {}", backend.name);
        if self.backend(&backend.name).is_some() {
            return Err(config_error(format!("Pool {} already exists", backend.name)));
        }

        let section = BackendSection {
            options: common_backend_options(backend),
            ..BackendSection::default()
        };
        self.backends.push((backend.name.clone(), section));
        Ok(())
    }

    /// Recompute id/balance/mode/enabled from `new`, keep every other option.
    /// A rename also repoints `default_backend` in frontends and listens.
    pub fn update_backend(&mut self, old: &Backend, new: &Backend) -> Result<(), LbError> {
        debug!("Updating backend {}", old.name);
        self.checked_backend(&old.name)?;
        if old.name != new.name && self.backend(&new.name).is_some() {
            return Err(config_error(format!("Pool {} already exists", new.name)));
        }

        let entry = self
            .backends
            .iter_mut()
            .find(|(existing, _)| *existing == old.name);
        if let Some((name, section)) = entry {
            let mut options = common_backend_options(new);
            options.extend(
                section
                    .options
                    .iter()
                    .filter(|o| !common_option_re().is_match(o))
                    .cloned(),
            );
            section.options = options;
            *name = new.name.clone();
        }

        if old.name != new.name {
            let old_target = format!("\tdefault_backend {}", old.name);
            let new_target = format!("\tdefault_backend {}", new.name);
            for (key, lines) in self.blocks.iter_mut() {
                if !(key.starts_with("frontend") || key.starts_with("listen")) {
                    continue;
                }
                for line in lines.iter_mut().filter(|l| **l == old_target) {
                    debug!("Repointing {} at backend {}", key, new.name);
                    *line = new_target.clone();
                }
            }
        }
        Ok(())
    }

    pub fn add_server(&mut self, backend: &str, server: &Server) -> Result<(), LbError> {
        debug!("Adding server {} to backend {}", server.name, backend);
        let has_checks = self.has_health_monitors(backend)?;
        let has_cookies = self.has_http_cookie_persistence(backend)?;

        let mut line = format!(
            "\tserver {} {}:{} id {} weight {}",
            server.name, server.address, server.port, server.id, server.weight
        );
        if has_checks {
            line.push_str(" check");
        }
        if has_cookies {
            line.push_str(&format!(" cookie {}", server.id));
        }
        if !server.enabled {
            line.push_str(" disabled");
        }

        self.checked_backend_mut(backend)?.servers.push(line);
        Ok(())
    }

    pub fn delete_server(&mut self, backend: &str, server: &Server) -> Result<(), LbError> {
        debug!("Deleting server {} from backend {}", server.name, backend);
        let section = self.checked_backend_mut(backend)?;
        match section
            .servers
            .iter()
            .position(|line| server_name(line) == Some(server.name.as_str()))
        {
            Some(index) => {
                section.servers.remove(index);
                Ok(())
            }
            None => Err(config_error(format!(
                "Member {} not found in pool {}",
                server.name, backend
            ))),
        }
    }

    pub fn delete_block(&mut self, block: &BlockRef) -> Result<(), LbError> {
        debug!("Deleting block {} {}", block.kind, block.name);
        if block.kind == BlockKind::Backend {
            if let Some(index) = self.backends.iter().position(|(n, _)| *n == block.name) {
                self.backends.remove(index);
                return Ok(());
            }
        } else if let Some(key) = self
            .blocks
            .keys()
            .find(|key| header_matches(key, block.kind, &block.name))
            .cloned()
        {
            self.blocks.remove(&key);
            return Ok(());
        }

        Err(config_error(format!(
            "No such {}: {}",
            block.kind, block.name
        )))
    }

    pub fn has_health_monitors(&self, backend: &str) -> Result<bool, LbError> {
        let section = self.checked_backend(backend)?;
        Ok(section.servers.iter().any(|s| check_re().is_match(s))
            || section.options.iter().any(|o| {
                o.contains("httpchk") || o.contains("ssl-hello-chk") || o.contains("http-check")
            }))
    }

    fn has_http_cookie_persistence(&self, backend: &str) -> Result<bool, LbError> {
        let section = self.checked_backend(backend)?;
        Ok(section
            .options
            .iter()
            .any(|o| cookie_option_re().is_match(o)))
    }

    pub fn add_probe(&mut self, backend: &str, probe: &Probe) -> Result<(), LbError> {
        self.checked_backend(backend)?;
        if !probe.enabled {
            debug!("Skipping disabled probe for backend {}", backend);
            return Ok(());
        }

        debug!("Adding {:?} probe to backend {}", probe.probe_type, backend);
        if self.has_health_monitors(backend)? {
            return Err(config_error(
                "Can associate only one health monitor with a HAProxy pool".to_string(),
            ));
        }

        let mut options = vec![format!("\ttimeout connect {}", probe.timeout)];
        if probe.is_http() {
            let expect = expected_codes_to_regexp(&probe.expect)?;
            options.push(format!(
                "\toption httpchk {} {} HTTP/1.0",
                probe.method, probe.uri
            ));
            options.push(format!("\thttp-check expect rstatus {}", expect));
        }
        if probe.probe_type == MonitorType::Https {
            options.push("\toption ssl-hello-chk".to_string());
        }

        let section = self.checked_backend_mut(backend)?;
        add_server_checks(section, probe.inter, probe.fall);
        section.options.extend(options);
        Ok(())
    }

    /// Drop every check from servers and backend; HAProxy allows one monitor
    /// per pool.
    pub fn delete_probe(&mut self, backend: &str) -> Result<(), LbError> {
        debug!("Deleting health probe from backend {}", backend);
        let section = self.checked_backend_mut(backend)?;

        let without_inter = inter_re()
            .replace_all(&section.default_server, "")
            .into_owned();
        section.default_server = fall_re().replace_all(&without_inter, "").into_owned();

        for server in section.servers.iter_mut() {
            *server = check_re().replace_all(server, "").into_owned();
        }

        section.options.retain(|o| {
            !(o.contains("timeout connect")
                || o.contains("httpchk")
                || o.contains("ssl-hello-chk")
                || o.contains("http-check"))
        });
        Ok(())
    }

    pub fn add_persistence(
        &mut self,
        backend: &str,
        persistence: &SessionPersistence,
    ) -> Result<(), LbError> {
        self.checked_backend(backend)?;
        let Some(kind) = persistence.persistence_type else {
            return Ok(());
        };
        debug!("Adding {} session persistence to backend {}", kind, backend);

        let cookie_name = persistence
            .cookie_name
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());
        if kind == PersistenceType::AppCookie && cookie_name.is_none() {
            return Err(config_error(format!(
                "APP_COOKIE persistence for pool {} needs a cookie name",
                backend
            )));
        }

        let section = self.checked_backend_mut(backend)?;
        match kind {
            PersistenceType::SourceIp => {
                section.push_option(format!("\t{}", STICK_TABLE_OPTION));
                section.push_option(format!("\t{}", STICK_ON_SOURCE_OPTION));
            }
            PersistenceType::HttpCookie => {
                section.push_option(format!("\t{}", COOKIE_INSERT_OPTION));
                add_server_cookies(section);
            }
            PersistenceType::AppCookie => {
                if let Some(cookie) = cookie_name {
                    section.push_option(format!("\tappsession {} len 56 timeout 3h", cookie));
                }
            }
        }
        Ok(())
    }

    pub fn delete_persistence(&mut self, backend: &str) -> Result<(), LbError> {
        debug!("Deleting session persistence from backend {}", backend);
        let section = self.checked_backend_mut(backend)?;

        for server in section.servers.iter_mut() {
            *server = server_cookie_re().replace_all(server, "").into_owned();
        }
        section
            .options
            .retain(|o| !(o.contains("stick") || o.contains("cookie") || o.contains("appsession")));
        Ok(())
    }
}

fn enabled_line(enabled: bool) -> String {
    if enabled {
        "\tenabled".to_string()
    } else {
        "\tdisabled".to_string()
    }
}

fn common_backend_options(backend: &Backend) -> Vec<String> {
    vec![
        format!("\tid {}", backend.id),
        format!("\tbalance {}", backend.balance),
        format!("\tmode {}", backend.mode),
        enabled_line(backend.enabled),
    ]
}

fn add_server_checks(section: &mut BackendSection, inter: u32, fall: u32) {
    if section.default_server.trim().is_empty() {
        section.default_server = DEFAULT_SERVER.to_string();
    }

    let inter_clause = format!(" inter {}", inter);
    section.default_server = if inter_re().is_match(&section.default_server) {
        inter_re()
            .replace_all(&section.default_server, inter_clause.as_str())
            .into_owned()
    } else {
        format!("{}{}", section.default_server, inter_clause)
    };

    let fall_clause = format!(" fall {}", fall);
    section.default_server = if fall_re().is_match(&section.default_server) {
        fall_re()
            .replace_all(&section.default_server, fall_clause.as_str())
            .into_owned()
    } else {
        format!("{}{}", section.default_server, fall_clause)
    };

    for server in section.servers.iter_mut() {
        if !check_re().is_match(server) {
            server.push_str(" check");
        }
    }
}

fn add_server_cookies(section: &mut BackendSection) {
    for server in section.servers.iter_mut() {
        if server_cookie_re().is_match(server) {
            continue;
        }
        let cookie = server_id_re()
            .captures(server)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .or_else(|| server_name(server).map(str::to_string));
        if let Some(cookie) = cookie {
            server.push_str(&format!(" cookie {}", cookie));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{HealthMonitor, LbMethod, Member, Pool, Protocol, Vip};
    use pretty_assertions::assert_eq;

    const SOCKET: &str = "/var/run/haproxy.sock";

    fn pool(id: &str, name: &str) -> Pool {
        Pool {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            protocol: Protocol::Http,
            lb_method: LbMethod::RoundRobin,
            subnet_id: None,
            admin_state_up: true,
            status: None,
        }
    }

    fn member(id: &str, name: &str, address: &str) -> Member {
        Member {
            id: id.to_string(),
            name: name.to_string(),
            pool_id: "p1".to_string(),
            address: address.to_string(),
            port: 80,
            weight: 1,
            admin_state_up: true,
            status: None,
        }
    }

    fn http_monitor(expected_codes: &str) -> HealthMonitor {
        HealthMonitor {
            id: "hm1".to_string(),
            pool_id: "p1".to_string(),
            monitor_type: MonitorType::Http,
            delay: 5,
            timeout: 3,
            max_retries: 3,
            http_method: Some("GET".to_string()),
            url_path: Some("/healthz".to_string()),
            expected_codes: Some(expected_codes.to_string()),
            admin_state_up: true,
        }
    }

    fn vip(name: &str) -> Vip {
        Vip {
            id: format!("{}-id", name),
            name: name.to_string(),
            description: String::new(),
            address: "192.168.0.10".to_string(),
            port: 80,
            protocol: Protocol::Http,
            connection_limit: None,
            pool_id: "p1".to_string(),
            admin_state_up: true,
            status: None,
            session_persistence: None,
            config_handle_id: None,
        }
    }

    fn web_config() -> HaproxyConfig {
        let mut config = HaproxyConfig::parse("", SOCKET);
        config.add_backend(&Backend::from(&pool("p1", "web"))).unwrap();
        config
            .add_server("web", &Server::from(&member("m1", "s1", "10.0.0.5")))
            .unwrap();
        config
    }

    const SAMPLE: &str = "# managed by hacfg
global
    daemon
    stats socket /tmp/old.sock mode 600
defaults
    mode http
    timeout client 50s
frontend zeta
    bind 0.0.0.0:81
    default_backend web
frontend alpha
    mode http
    bind 0.0.0.0:80
backend web
    balance roundrobin
    default-server inter 2000 fall 2
    server s1 10.0.0.5:80 id 1 weight 1 check
    server s2 10.0.0.6:80 id 2 weight 1 check
backend api
    balance leastconn
";

    #[test]
    fn parse_structures_backends_and_pins_stats_socket() {
        let config = HaproxyConfig::parse(SAMPLE, SOCKET);

        assert_eq!(
            config.block("global").unwrap(),
            &[
                "\tdaemon".to_string(),
                "\tstats socket /var/run/haproxy.sock user root level admin".to_string(),
            ]
        );
        let web = config.backend("web").unwrap();
        assert_eq!(web.options, vec!["\tbalance roundrobin".to_string()]);
        assert_eq!(web.default_server, "\tdefault-server inter 2000 fall 2");
        assert_eq!(web.servers.len(), 2);
        assert_eq!(config.backend_names().collect::<Vec<_>>(), vec!["web", "api"]);
    }

    #[test]
    fn stats_socket_is_appended_when_missing() {
        let config = HaproxyConfig::parse("defaults\n\tmode tcp\n", SOCKET);
        let global = config.block("global").unwrap();
        assert_eq!(
            global
                .iter()
                .filter(|l| l.starts_with("\tstats socket"))
                .count(),
            1
        );
    }

    #[test]
    fn render_orders_frontends_and_their_lines() {
        let config = HaproxyConfig::parse(SAMPLE, SOCKET);
        let lines = config.to_lines();

        assert_eq!(lines[0], "# managed by hacfg");
        assert_eq!(lines[1], "global");
        let alpha = lines.iter().position(|l| l == "frontend alpha").unwrap();
        let zeta = lines.iter().position(|l| l == "frontend zeta").unwrap();
        assert!(alpha < zeta);
        assert_eq!(lines[alpha + 1], "\tbind 0.0.0.0:80");
        assert_eq!(lines[alpha + 2], "\tmode http");

        let web = lines.iter().position(|l| l == "backend web").unwrap();
        assert_eq!(lines[web + 2], "\tdefault-server inter 2000 fall 2");
        assert_eq!(lines.last().unwrap(), "\tbalance leastconn");
    }

    #[test]
    fn render_then_parse_preserves_structure() {
        let first = HaproxyConfig::parse(SAMPLE, SOCKET);
        let second = HaproxyConfig::parse(&first.render(), SOCKET);

        for name in ["web", "api"] {
            assert_eq!(first.backend(name), second.backend(name));
        }
        for key in ["global", "defaults"] {
            assert_eq!(first.block(key), second.block(key));
        }
        for key in ["frontend alpha", "frontend zeta"] {
            let mut a = first.block(key).unwrap().to_vec();
            let mut b = second.block(key).unwrap().to_vec();
            a.sort();
            b.sort();
            assert_eq!(a, b);
        }
        assert_eq!(second.render(), first.render());
    }

    #[test]
    fn scenario_backend_with_one_server_and_no_monitor() {
        let text = web_config().render();

        assert!(text.contains("backend web\n"));
        assert!(text.contains("\tserver s1 10.0.0.5:80 id m1 weight 1\n"));
        assert!(!text.contains("check"));
        assert!(!text.contains("default-server"));
    }

    #[test]
    fn scenario_http_probe_marks_servers_and_adds_options() {
        let mut config = web_config();
        config
            .add_probe("web", &Probe::from(&http_monitor("200-202")))
            .unwrap();

        let web = config.backend("web").unwrap();
        assert_eq!(web.default_server, "\tdefault-server inter 5000 fall 3");
        assert!(web.servers[0].ends_with(" check"));
        assert!(web
            .options
            .contains(&"\toption httpchk GET /healthz HTTP/1.0".to_string()));
        assert!(web
            .options
            .contains(&"\thttp-check expect rstatus 200|201|202".to_string()));
        assert!(web.options.contains(&"\ttimeout connect 3000".to_string()));
    }

    #[test]
    fn second_probe_fails_without_touching_backend() {
        let mut config = web_config();
        let probe = Probe::from(&http_monitor("200"));
        config.add_probe("web", &probe).unwrap();
        let after_first = config.clone();

        let err = config.add_probe("web", &probe).unwrap_err();
        assert!(matches!(err, LbError::Config(_)));
        assert_eq!(config, after_first);
    }

    #[test]
    fn invalid_expected_codes_leave_backend_untouched() {
        let mut config = web_config();
        let before = config.clone();

        let err = config
            .add_probe("web", &Probe::from(&http_monitor("410-408")))
            .unwrap_err();
        assert!(matches!(err, LbError::Config(_)));
        assert_eq!(config, before);
    }

    #[test]
    fn existing_inter_and_fall_are_replaced_in_place() {
        let mut config = HaproxyConfig::parse(
            "backend web\n\tdefault-server inter 2000 maxconn 10 fall 9\n\tserver s1 10.0.0.5:80 id 1 weight 1\n",
            SOCKET,
        );
        config
            .add_probe("web", &Probe::from(&http_monitor("200")))
            .unwrap();

        assert_eq!(
            config.backend("web").unwrap().default_server,
            "\tdefault-server inter 5000 maxconn 10 fall 3"
        );
    }

    #[test]
    fn https_probe_adds_ssl_check_and_servers_added_later_get_check() {
        let mut config = web_config();
        let mut monitor = http_monitor("200");
        monitor.monitor_type = MonitorType::Https;
        config.add_probe("web", &Probe::from(&monitor)).unwrap();
        config
            .add_server("web", &Server::from(&member("m2", "s2", "10.0.0.6")))
            .unwrap();

        let web = config.backend("web").unwrap();
        assert!(web.options.contains(&"\toption ssl-hello-chk".to_string()));
        assert_eq!(web.servers[1], "\tserver s2 10.0.0.6:80 id m2 weight 1 check");
    }

    #[test]
    fn tcp_probe_only_sets_server_checks() {
        let mut config = web_config();
        let mut monitor = http_monitor("200");
        monitor.monitor_type = MonitorType::Tcp;
        config.add_probe("web", &Probe::from(&monitor)).unwrap();

        let web = config.backend("web").unwrap();
        assert!(!web.options.iter().any(|o| o.contains("httpchk")));
        assert!(config.has_health_monitors("web").unwrap());
    }

    #[test]
    fn disabled_probe_is_ignored() {
        let mut config = web_config();
        let before = config.clone();
        let mut monitor = http_monitor("200");
        monitor.admin_state_up = false;

        config.add_probe("web", &Probe::from(&monitor)).unwrap();
        assert_eq!(config, before);
    }

    #[test]
    fn delete_probe_strips_every_check() {
        let mut config = web_config();
        config
            .add_probe("web", &Probe::from(&http_monitor("200-201")))
            .unwrap();
        config.delete_probe("web").unwrap();

        let web = config.backend("web").unwrap();
        assert_eq!(web.servers[0], "\tserver s1 10.0.0.5:80 id m1 weight 1");
        assert_eq!(web.default_server, "\tdefault-server");
        assert_eq!(web.options.len(), 4);
        assert!(!config.has_health_monitors("web").unwrap());
        assert!(!config.render().contains("default-server"));
    }

    #[test]
    fn backend_scoped_operations_require_existing_backend() {
        let mut config = web_config();
        let before = config.clone();
        let server = Server::from(&member("m9", "s9", "10.0.0.9"));
        let probe = Probe::from(&http_monitor("200"));
        let persistence = SessionPersistence {
            persistence_type: Some(PersistenceType::SourceIp),
            cookie_name: None,
        };

        let results = vec![
            config.add_server("nope", &server),
            config.delete_server("nope", &server),
            config.add_probe("nope", &probe),
            config.delete_probe("nope"),
            config.add_persistence("nope", &persistence),
            config.delete_persistence("nope"),
        ];

        for result in results {
            assert_eq!(
                result.unwrap_err(),
                LbError::Config("No such pool: nope".to_string())
            );
        }
        assert_eq!(config, before);
    }

    #[test]
    fn http_cookie_retrofit_is_idempotent() {
        let mut config = web_config();
        config
            .add_server("web", &Server::from(&member("m2", "s2", "10.0.0.6")))
            .unwrap();
        let persistence = SessionPersistence {
            persistence_type: Some(PersistenceType::HttpCookie),
            cookie_name: None,
        };

        config.add_persistence("web", &persistence).unwrap();
        config.add_persistence("web", &persistence).unwrap();

        let web = config.backend("web").unwrap();
        for server in &web.servers {
            assert_eq!(server.matches(" cookie ").count(), 1, "{}", server);
        }
        assert!(web.servers[0].ends_with(" cookie m1"));
        assert_eq!(
            web.options
                .iter()
                .filter(|o| o.contains("cookie SRV"))
                .count(),
            1
        );

        config
            .add_server("web", &Server::from(&member("m3", "s3", "10.0.0.7")))
            .unwrap();
        assert!(config.backend("web").unwrap().servers[2].ends_with(" cookie m3"));
    }

    #[test]
    fn source_ip_and_app_cookie_persistence() {
        let mut config = web_config();
        config
            .add_persistence(
                "web",
                &SessionPersistence {
                    persistence_type: Some(PersistenceType::SourceIp),
                    cookie_name: None,
                },
            )
            .unwrap();
        let web = config.backend("web").unwrap();
        assert!(web
            .options
            .contains(&"\tstick-table type ip size 200k expire 30m".to_string()));
        assert!(web.options.contains(&"\tstick on src".to_string()));

        config.delete_persistence("web").unwrap();
        let err = config
            .add_persistence(
                "web",
                &SessionPersistence {
                    persistence_type: Some(PersistenceType::AppCookie),
                    cookie_name: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, LbError::Config(_)));

        config
            .add_persistence(
                "web",
                &SessionPersistence {
                    persistence_type: Some(PersistenceType::AppCookie),
                    cookie_name: Some("JSESSIONID".to_string()),
                },
            )
            .unwrap();
        assert!(config
            .backend("web")
            .unwrap()
            .options
            .contains(&"\tappsession JSESSIONID len 56 timeout 3h".to_string()));
    }

    #[test]
    fn delete_persistence_strips_options_and_server_cookies() {
        let mut config = web_config();
        config
            .add_persistence(
                "web",
                &SessionPersistence {
                    persistence_type: Some(PersistenceType::HttpCookie),
                    cookie_name: None,
                },
            )
            .unwrap();
        config.delete_persistence("web").unwrap();

        let web = config.backend("web").unwrap();
        assert_eq!(web.servers[0], "\tserver s1 10.0.0.5:80 id m1 weight 1");
        assert!(!web.options.iter().any(|o| o.contains("cookie")));
    }

    #[test]
    fn disabled_server_is_marked() {
        let mut config = web_config();
        let mut down = member("m2", "s2", "10.0.0.6");
        down.admin_state_up = false;
        config.add_server("web", &Server::from(&down)).unwrap();

        assert!(config.backend("web").unwrap().servers[1].ends_with(" disabled"));
    }

    #[test]
    fn delete_server_matches_whole_name() {
        let mut config = web_config();
        config
            .add_server("web", &Server::from(&member("m10", "s10", "10.0.0.10")))
            .unwrap();

        config
            .delete_server("web", &Server::from(&member("m10", "s10", "10.0.0.10")))
            .unwrap();
        assert_eq!(config.backend("web").unwrap().servers.len(), 1);

        let err = config
            .delete_server("web", &Server::from(&member("m2", "s2", "10.0.0.6")))
            .unwrap_err();
        assert_eq!(
            err,
            LbError::Config("Member s2 not found in pool web".to_string())
        );
    }

    #[test]
    fn duplicate_backend_is_rejected() {
        let mut config = web_config();
        let err = config
            .add_backend(&Backend::from(&pool("p2", "web")))
            .unwrap_err();
        assert_eq!(err, LbError::Config("Pool web already exists".to_string()));
    }

    #[test]
    fn update_backend_keeps_non_common_options() {
        let mut config = web_config();
        config
            .add_probe("web", &Probe::from(&http_monitor("200")))
            .unwrap();
        let old = Backend::from(&pool("p1", "web"));
        let mut changed = pool("p1", "web");
        changed.lb_method = LbMethod::LeastConnections;
        changed.admin_state_up = false;

        config.update_backend(&old, &Backend::from(&changed)).unwrap();

        let options = &config.backend("web").unwrap().options;
        assert_eq!(options[0], "\tid p1");
        assert_eq!(options[1], "\tbalance leastconn");
        assert_eq!(options[3], "\tdisabled");
        assert!(!options.contains(&"\tbalance roundrobin".to_string()));
        assert!(!options.contains(&"\tenabled".to_string()));
        assert!(options.iter().any(|o| o.contains("httpchk")));
    }

    #[test]
    fn backend_rename_repoints_frontends() {
        let mut config = web_config();
        config
            .add_frontend(&Frontend::from_vip(&vip("site"), "web"))
            .unwrap();
        config
            .add_backend(&Backend::from(&pool("p2", "web2")))
            .unwrap();

        let old = Backend::from(&pool("p1", "web"));
        let err = config
            .update_backend(&old, &Backend::from(&pool("p1", "web2")))
            .unwrap_err();
        assert_eq!(err, LbError::Config("Pool web2 already exists".to_string()));

        config
            .update_backend(&old, &Backend::from(&pool("p1", "shop")))
            .unwrap();

        assert!(config.backend("web").is_none());
        assert!(config.backend("shop").is_some());
        let block = config.block("frontend site").unwrap();
        assert!(block.contains(&"\tdefault_backend shop".to_string()));
        assert!(!block.contains(&"\tdefault_backend web".to_string()));
    }

    #[test]
    fn frontend_lifecycle() {
        let mut config = web_config();
        let frontend = Frontend::from_vip(&vip("site"), "web");
        config.add_frontend(&frontend).unwrap();

        let block = config.block("frontend site").unwrap();
        assert!(block.contains(&"\tbind 192.168.0.10:80".to_string()));
        assert!(block.contains(&"\tdefault_backend web".to_string()));
        assert!(block.contains(&"\tenabled".to_string()));
        assert!(config.add_frontend(&frontend).is_err());

        config.delete_block(&BlockRef::frontend("site")).unwrap();
        assert!(config.block("frontend site").is_none());
        assert_eq!(
            config.delete_block(&BlockRef::frontend("site")).unwrap_err(),
            LbError::Config("No such frontend: site".to_string())
        );
    }

    #[test]
    fn delete_backend_block() {
        let mut config = web_config();
        config.delete_block(&BlockRef::backend("web")).unwrap();
        assert!(config.backend("web").is_none());
        assert!(config.delete_block(&BlockRef::backend("web")).is_err());
    }

    #[test]
    fn resolve_backend_by_name_or_id() {
        let config = web_config();
        assert_eq!(config.resolve_backend("web"), "web");
        assert_eq!(config.resolve_backend("p1"), "web");
        assert_eq!(config.resolve_backend("p7"), "p7");
    }

    #[test]
    fn expected_codes_expand_to_alternation() {
        assert_eq!(
            expected_codes_to_regexp("200, 202-204, 410").unwrap(),
            "200|202|203|204|410"
        );
        assert_eq!(expected_codes_to_regexp("200").unwrap(), "200");
        assert!(matches!(
            expected_codes_to_regexp("410-408"),
            Err(LbError::Config(_))
        ));
        assert!(expected_codes_to_regexp("2xx").is_err());
        assert!(expected_codes_to_regexp(" , ").is_err());
        assert_eq!(expected_codes_to_regexp("").unwrap(), "200");
    }
}
