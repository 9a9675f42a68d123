use std::collections::HashMap;

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ClientConfigError {
    #[error("line {0} is not valid ini: {1}")]
    Syntax(usize, String),
    #[error("missing [common] section")]
    MissingCommon,
    #[error("duplicate section [{0}]")]
    DuplicateSection(String),
    #[error("[{0}] is missing required key `{1}`")]
    MissingKey(String, &'static str),
    #[error("[{0}] has an invalid value for `{1}`: {2}")]
    InvalidValue(String, &'static str, String),
    #[error("unsupported protocol `{0}`")]
    UnknownProtocol(String),
    #[error("no proxy sections defined")]
    NoProxies,
}

#[derive(Debug, PartialEq, Clone, Copy, Default)]
pub(crate) enum Protocol {
    #[default]
    Tcp,
    Kcp,
    Quic,
}

impl Protocol {
    /// Datagram transports need the signal-driven close handshake; for tcp a
    /// termination signal falls through to default process semantics.
    pub fn is_connectionless(self) -> bool {
        matches!(self, Protocol::Kcp | Protocol::Quic)
    }
}

#[derive(Debug, PartialEq)]
pub(crate) struct CommonConfig {
    pub server_addr: String,
    pub server_port: u16,
    pub token: String,
    pub protocol: Protocol,
    pub log_level: String,
    pub pool_count: u32,
}

#[derive(Debug, PartialEq)]
pub(crate) struct ProxyConfig {
    pub name: String,
    pub proxy_type: String,
    pub local_ip: String,
    pub local_port: u16,
    pub use_encryption: bool,
    pub use_compression: bool,
    pub subdomain: Option<String>,
}

/// Visitor sections (`role = visitor`) are recognized so a hand-edited
/// config still parses; the rendered template never emits one.
#[derive(Debug, PartialEq)]
pub(crate) struct VisitorConfig {
    pub name: String,
    pub visitor_type: String,
    pub bind_addr: String,
    pub bind_port: u16,
}

#[derive(Debug, PartialEq)]
pub(crate) struct ClientConfig {
    pub common: CommonConfig,
    pub proxies: Vec<ProxyConfig>,
    pub visitors: Vec<VisitorConfig>,
}

/// Parses and validates the rendered ini text. Any failure here aborts the
/// bootstrap before a session is started.
pub(crate) fn parse(text: &str) -> Result<ClientConfig, ClientConfigError> {
    let sections = split_sections(text)?;
    let mut common = None;
    let mut proxies = Vec::new();
    let mut visitors = Vec::new();

    for (name, keys) in sections {
        if name == "common" {
            common = Some(parse_common(&keys)?);
        } else if keys.get("role").is_some_and(|role| role == "visitor") {
            visitors.push(parse_visitor(name, &keys)?);
        } else {
            proxies.push(parse_proxy(name, &keys)?);
        }
    }

    let common = common.ok_or(ClientConfigError::MissingCommon)?;
    if proxies.is_empty() {
        return Err(ClientConfigError::NoProxies);
    }
    Ok(ClientConfig {
        common,
        proxies,
        visitors,
    })
}

type Section = (String, HashMap<String, String>);

fn split_sections(text: &str) -> Result<Vec<Section>, ClientConfigError> {
    let mut sections: Vec<Section> = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[') {
            let name = name
                .strip_suffix(']')
                .ok_or_else(|| ClientConfigError::Syntax(index + 1, raw.to_string()))?
                .trim()
                .to_string();
            if sections.iter().any(|(existing, _)| *existing == name) {
                return Err(ClientConfigError::DuplicateSection(name));
            }
            sections.push((name, HashMap::new()));
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| ClientConfigError::Syntax(index + 1, raw.to_string()))?;
        let Some((_, keys)) = sections.last_mut() else {
            return Err(ClientConfigError::Syntax(index + 1, raw.to_string()));
        };
        keys.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(sections)
}

fn parse_common(keys: &HashMap<String, String>) -> Result<CommonConfig, ClientConfigError> {
    let section = "common";
    let server_addr = require(section, keys, "server_addr")?;
    let token = require(section, keys, "token")?;
    let protocol = match keys.get("protocol").map(String::as_str).unwrap_or("tcp") {
        "tcp" => Protocol::Tcp,
        "kcp" => Protocol::Kcp,
        "quic" => Protocol::Quic,
        other => return Err(ClientConfigError::UnknownProtocol(other.to_string())),
    };
    Ok(CommonConfig {
        server_port: port(section, keys, "server_port")?,
        pool_count: keys
            .get("pool_count")
            .map(|raw| {
                raw.parse().map_err(|_| {
                    ClientConfigError::InvalidValue(section.into(), "pool_count", raw.clone())
                })
            })
            .transpose()?
            .unwrap_or(1),
        log_level: keys
            .get("log_level")
            .cloned()
            .unwrap_or_else(|| String::from("info")),
        server_addr,
        token,
        protocol,
    })
}

fn parse_proxy(
    name: String,
    keys: &HashMap<String, String>,
) -> Result<ProxyConfig, ClientConfigError> {
    Ok(ProxyConfig {
        proxy_type: require(&name, keys, "type")?,
        local_ip: keys
            .get("local_ip")
            .cloned()
            .unwrap_or_else(|| String::from("127.0.0.1")),
        local_port: port(&name, keys, "local_port")?,
        use_encryption: flag(&name, keys, "use_encryption")?,
        use_compression: flag(&name, keys, "use_compression")?,
        subdomain: keys.get("subdomain").cloned(),
        name,
    })
}

fn parse_visitor(
    name: String,
    keys: &HashMap<String, String>,
) -> Result<VisitorConfig, ClientConfigError> {
    Ok(VisitorConfig {
        visitor_type: require(&name, keys, "type")?,
        bind_addr: keys
            .get("bind_addr")
            .cloned()
            .unwrap_or_else(|| String::from("127.0.0.1")),
        bind_port: port(&name, keys, "bind_port")?,
        name,
    })
}

fn require(
    section: &str,
    keys: &HashMap<String, String>,
    key: &'static str,
) -> Result<String, ClientConfigError> {
    match keys.get(key) {
        Some(value) if !value.is_empty() => Ok(value.clone()),
        _ => Err(ClientConfigError::MissingKey(section.to_string(), key)),
    }
}

fn port(
    section: &str,
    keys: &HashMap<String, String>,
    key: &'static str,
) -> Result<u16, ClientConfigError> {
    let raw = require(section, keys, key)?;
    raw.parse()
        .map_err(|_| ClientConfigError::InvalidValue(section.to_string(), key, raw))
}

fn flag(
    section: &str,
    keys: &HashMap<String, String>,
    key: &'static str,
) -> Result<bool, ClientConfigError> {
    match keys.get(key) {
        None => Ok(false),
        Some(raw) => raw
            .parse()
            .map_err(|_| ClientConfigError::InvalidValue(section.to_string(), key, raw.clone())),
    }
}
