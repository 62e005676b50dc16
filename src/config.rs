use crate::dns::{DEFAULT_SUFFIX, RECV_BUFFER_SIZE, name::MAX_LABEL_LEN};
use crate::error::ConfigError;
use crate::matcher::{Matchers, parse_network};
use crate::relay::nat64::DualStackMode;
use serde::Deserialize;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address the client-facing socket binds to
    pub bind_addr: SocketAddr,

    /// Upstream DNS server queries are forwarded to
    pub upstream_addr: SocketAddr,

    /// Signaling suffix, normalized to a leading dot and no trailing dot
    pub suffix: String,

    /// Address family preference for paired AAAA queries
    pub ipv6_mode: DualStackMode,

    /// Whether single AAAA queries also issue a sibling A query
    pub dual_stack_pairing: bool,

    /// Receive buffer per socket, in bytes
    pub recv_buffer_size: usize,

    /// TOML file listing local and fake addresses and domains
    pub rules_file: Option<PathBuf>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 1053)),
            upstream_addr: SocketAddr::from(([8, 8, 8, 8], 53)),
            suffix: DEFAULT_SUFFIX.to_string(),
            ipv6_mode: DualStackMode::default(),
            dual_stack_pairing: false,
            recv_buffer_size: RECV_BUFFER_SIZE,
            rules_file: None,
        }
    }
}

impl RelayConfig {
    /// Create a RelayConfig from environment variables
    /// Returns Err if critical configuration is invalid
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(bind_addr) = std::env::var("BIFROST_BIND_ADDR") {
            config.bind_addr = bind_addr
                .parse()
                .map_err(|_| ConfigError::InvalidBindAddress(bind_addr))?;
        }

        if let Ok(upstream) = std::env::var("BIFROST_UPSTREAM_ADDR") {
            config.upstream_addr = upstream
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidUpstreamServer(upstream))?;
        }

        if let Ok(suffix) = std::env::var("BIFROST_SUFFIX") {
            config.suffix = normalize_suffix(&suffix)?;
        }

        if let Ok(mode) = std::env::var("BIFROST_IPV6_MODE") {
            config.ipv6_mode = mode.parse()?;
        }

        if let Ok(pairing) = std::env::var("BIFROST_DUAL_STACK_PAIRING") {
            config.dual_stack_pairing = parse_bool(&pairing, false);
        }

        if let Ok(size) = std::env::var("BIFROST_RECV_BUFFER_SIZE") {
            config.recv_buffer_size = size.parse::<usize>().map_err(|_| {
                ConfigError::ParseError(format!("Invalid receive buffer size: {}", size))
            })?;
        }

        if let Ok(rules) = std::env::var("BIFROST_RULES_FILE") {
            if !rules.is_empty() {
                config.rules_file = Some(PathBuf::from(rules));
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_addr.is_ipv6() {
            return Err(ConfigError::InvalidBindAddress(format!(
                "{} (only IPv4 is supported)",
                self.bind_addr
            )));
        }

        if self.upstream_addr.port() == 0 || self.upstream_addr.ip().is_unspecified() {
            return Err(ConfigError::InvalidUpstreamServer(
                self.upstream_addr.to_string(),
            ));
        }

        if normalize_suffix(&self.suffix)? != self.suffix {
            return Err(ConfigError::InvalidSuffix(self.suffix.clone()));
        }

        // A datagram must at least hold a header plus a minimal question
        if self.recv_buffer_size < 512 || self.recv_buffer_size > 65535 {
            return Err(ConfigError::ParseError(format!(
                "Receive buffer size must be between 512 and 65535, got {}",
                self.recv_buffer_size
            )));
        }

        Ok(())
    }

    /// Build the classification stores from the rules file, if any
    pub fn load_matchers(&self) -> Result<Matchers, ConfigError> {
        match &self.rules_file {
            Some(path) => MatchRules::load(path)?.build(),
            None => Ok(Matchers::new()),
        }
    }
}

/// Bring a suffix into `.label.label` form.
pub fn normalize_suffix(suffix: &str) -> Result<String, ConfigError> {
    let bare = suffix.trim().trim_matches('.');
    if bare.is_empty()
        || bare
            .split('.')
            .any(|label| label.is_empty() || label.len() > MAX_LABEL_LEN)
    {
        return Err(ConfigError::InvalidSuffix(suffix.to_string()));
    }
    Ok(format!(".{}", bare))
}

/// Parse a boolean from a string, with a default value for invalid input
fn parse_bool(s: &str, default: bool) -> bool {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => default,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuleSet {
    pub ips: Vec<Ipv4Addr>,
    /// `a.b.c.d/len` or `a.b.c.d/m.m.m.m`
    pub networks: Vec<String>,
    pub domains: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MatchRules {
    pub local: RuleSet,
    pub fake: RuleSet,
}

impl MatchRules {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::RulesFile {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&text).map_err(|e| ConfigError::RulesFile {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    pub fn build(&self) -> Result<Matchers, ConfigError> {
        let mut matchers = Matchers::new();

        for ip in &self.local.ips {
            matchers.add_local_ip(*ip)?;
        }
        for net in &self.local.networks {
            let (network, mask) = parse_network(net)?;
            matchers.add_local_network(network, mask)?;
        }
        for domain in &self.local.domains {
            matchers.add_local_domain(domain)?;
        }

        for ip in &self.fake.ips {
            matchers.add_fake_ip(*ip)?;
        }
        for net in &self.fake.networks {
            let (network, mask) = parse_network(net)?;
            matchers.add_fake_network(network, mask)?;
        }
        for domain in &self.fake.domains {
            matchers.add_fake_domain(domain)?;
        }

        Ok(matchers)
    }
}
