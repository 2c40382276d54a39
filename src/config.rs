use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

#[derive(Debug, Default, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub domestic: DomesticConfig,
    #[serde(default)]
    pub trusted: TrustedConfig,
    #[serde(default)]
    pub socks5: Option<Socks5Config>,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub process: ProcessConfig,
}

impl Config {
    pub fn load(path: &Path) -> Self {
        let conf = ::config::Config::builder()
            .add_source(::config::File::from(path).required(true))
            .add_source(::config::Environment::default().separator("_"))
            .build()
            .expect("unable to locate configuration file");
        conf.try_deserialize()
            .expect("configuration format invalid")
    }
}

/// Local address the UDP and TCP listeners bind to.
#[derive(Debug, serde::Deserialize)]
pub struct ListenConfig {
    #[serde(default = "ListenConfig::default_host")]
    pub host: IpAddr,
    #[serde(default = "ListenConfig::default_port")]
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
        }
    }
}

impl ListenConfig {
    fn default_host() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
    }

    fn default_port() -> u16 {
        53
    }

    pub fn address(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }
}

/// The resolver probed with SOA queries to find out whether the path to a
/// name is tampered with. `poison_answer` names the answer type that betrays
/// tampering: a resolver that never answers SOA with an address record only
/// appears to do so when something on the path forges replies.
#[derive(Debug, serde::Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "ProbeConfig::default_host")]
    pub host: String,
    #[serde(default = "ProbeConfig::default_port")]
    pub port: u16,
    #[serde(default = "ProbeConfig::default_poison_answer")]
    pub poison_answer: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            poison_answer: Self::default_poison_answer(),
        }
    }
}

impl ProbeConfig {
    fn default_host() -> String {
        "8.8.8.8".to_string()
    }

    fn default_port() -> u16 {
        53
    }

    fn default_poison_answer() -> String {
        "A".to_string()
    }
}

/// Nearby resolver answering queries for names that are not interfered with.
#[derive(Debug, serde::Deserialize)]
pub struct DomesticConfig {
    #[serde(default = "DomesticConfig::default_host")]
    pub host: String,
    #[serde(default = "DomesticConfig::default_port")]
    pub port: u16,
}

impl Default for DomesticConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
        }
    }
}

impl DomesticConfig {
    fn default_host() -> String {
        "114.114.114.114".to_string()
    }

    fn default_port() -> u16 {
        53
    }
}

/// Upstream used for poisoned names. Reached over TCP (optionally through
/// SOCKS5), or over plain UDP when `via_udp` is set and the resolver listens
/// on a port the censor leaves alone.
#[derive(Debug, serde::Deserialize)]
pub struct TrustedConfig {
    #[serde(default = "TrustedConfig::default_host")]
    pub host: String,
    #[serde(default = "TrustedConfig::default_port")]
    pub port: u16,
    #[serde(default)]
    pub via_udp: bool,
}

impl Default for TrustedConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            via_udp: false,
        }
    }
}

impl TrustedConfig {
    fn default_host() -> String {
        "8.8.4.4".to_string()
    }

    fn default_port() -> u16 {
        53
    }
}

/// SOCKS5 proxy for the trusted TCP leg; absent means a direct connection.
#[derive(Debug, serde::Deserialize)]
pub struct Socks5Config {
    pub host: String,
    #[serde(default = "Socks5Config::default_port")]
    pub port: u16,
}

impl Socks5Config {
    fn default_port() -> u16 {
        1080
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct LimitsConfig {
    /// In-flight queries beyond this are dropped, not queued.
    #[serde(default = "LimitsConfig::default_pending_queries")]
    pub pending_queries: usize,
    /// Seconds a classification verdict stays cached.
    #[serde(default = "LimitsConfig::default_verdict_ttl")]
    pub verdict_ttl: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            pending_queries: Self::default_pending_queries(),
            verdict_ttl: Self::default_verdict_ttl(),
        }
    }
}

impl LimitsConfig {
    fn default_pending_queries() -> usize {
        128
    }

    fn default_verdict_ttl() -> u32 {
        // seven days
        518_400
    }
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Accepted for the service wrapper that daemonizes and drops privileges;
/// the forwarder itself only reports on them.
#[derive(Debug, Default, serde::Deserialize)]
pub struct ProcessConfig {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub daemon: bool,
    #[serde(default)]
    pub pidfile: Option<PathBuf>,
}
