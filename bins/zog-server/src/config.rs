use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use zog_engine::{Address, BusConfig, ConsumptionStrategy, DirectConfig, TransportConfig};

use crate::error::ServerError;

/// Bind address of a direct receiver when neither the file nor `-a` gives one.
pub const DEFAULT_DIRECT_ADDR: &str = "*:5011";

// ═══════════════════════════════════════════════════════════════
//  CLI
// ═══════════════════════════════════════════════════════════════

#[derive(Parser, Debug)]
#[command(name = "zog", about = "Per-topic log aggregation receiver")]
pub struct Cli {
    /// Format of zog's own log on stderr
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a receiver until it fails or is interrupted
    Start(StartArgs),
    /// Ship stdin lines to a running receiver, one message per line
    Send(SendArgs),
    /// Write a TOML config file for `zog start --config`
    GenConfig(GenConfigArgs),
    /// Write a supervisor [program:<name>] section that runs `zog start`
    GenProgram(GenProgramArgs),
}

#[derive(ValueEnum, Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportKind {
    #[value(alias = "redis")]
    Bus,
    #[value(alias = "zmq")]
    Direct,
}

impl TransportKind {
    pub fn of(config: &TransportConfig) -> Self {
        match config {
            TransportConfig::Bus(_) => TransportKind::Bus,
            TransportConfig::Direct(_) => TransportKind::Direct,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Bus => "bus",
            TransportKind::Direct => "direct",
        }
    }
}

/// Receiver flags shared by `start`, `gen-config` and `gen-program`.
#[derive(Args, Clone, Debug, Default)]
pub struct ReceiverArgs {
    /// Receiver type
    #[arg(short = 't', long = "type", value_enum)]
    pub kind: Option<TransportKind>,

    /// `tcp://host:port` for direct, `[password@]host:port[/db]` for bus
    #[arg(short, long)]
    pub addr: Option<String>,

    /// Bus channel pattern, e.g. `app.*`. Repeat for more
    #[arg(short, long = "channel")]
    pub channels: Vec<String>,

    /// Bus consumption strategy: polling, blocking_iterate (listen), background_thread (thread)
    #[arg(short = 'm', long)]
    pub strategy: Option<ConsumptionStrategy>,

    /// Sleep between empty bus polls, microseconds
    #[arg(short = 's', long)]
    pub idle_delay_us: Option<u64>,

    /// Bus liveness probe interval, seconds
    #[arg(long)]
    pub probe_interval_secs: Option<u64>,

    /// How long a bus liveness probe may wait for its reply, seconds
    #[arg(long)]
    pub probe_timeout_secs: Option<u64>,

    /// Topic of every direct-socket message
    #[arg(long)]
    pub topic: Option<String>,
}

#[derive(Args, Clone, Debug)]
pub struct StartArgs {
    /// TOML config file; flags override its values
    #[arg(long, env = "ZOG_CONFIG")]
    pub config: Option<String>,

    /// Name of this receiver in zog's own log
    #[arg(long, default_value = "zog")]
    pub name: String,

    #[command(flatten)]
    pub receiver: ReceiverArgs,

    /// Directory of the per-topic log files
    pub logpath: Option<PathBuf>,
}

#[derive(Args, Clone, Debug)]
pub struct SendArgs {
    /// Receiver type
    #[arg(short = 't', long = "type", value_enum)]
    pub kind: TransportKind,

    /// Receiver address, same form as `zog start -a`
    #[arg(short, long)]
    pub addr: String,

    /// Bus channel to publish on
    #[arg(short, long)]
    pub channel: Option<String>,

    /// Direct socket length header size: 1, 2 or 4
    #[arg(long, default_value_t = 4)]
    pub length_bytes: usize,

    /// Little-endian direct socket length header
    #[arg(long)]
    pub little_endian: bool,
}

#[derive(Args, Clone, Debug)]
pub struct GenConfigArgs {
    #[command(flatten)]
    pub receiver: ReceiverArgs,

    /// Output file, stdout if omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Directory of the per-topic log files
    pub logpath: Option<PathBuf>,
}

#[derive(Args, Clone, Debug)]
pub struct GenProgramArgs {
    /// Program name
    #[arg(short, long)]
    pub name: String,

    #[command(flatten)]
    pub receiver: ReceiverArgs,

    /// User the program runs as
    #[arg(short, long)]
    pub user: Option<String>,

    /// Log directory, `./logs` if omitted
    #[arg(short = 'p', long)]
    pub logpath: Option<PathBuf>,

    /// zog executable in the generated command
    #[arg(long, default_value = "zog")]
    pub exe: String,

    /// Output file, `<name>.conf` in the current directory if omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

// ═══════════════════════════════════════════════════════════════
//  Config file (TOML)
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logpath: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_format: Option<LogFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<TransportConfig>,
}

impl FileConfig {
    pub fn load(path: &str) -> Result<Self, ServerError> {
        let content = std::fs::read_to_string(path).map_err(|e| ServerError::Config {
            context: "read",
            detail: format!("'{path}': {e}"),
        })?;
        toml::from_str(&content).map_err(|e| ServerError::Config {
            context: "parse",
            detail: format!("'{path}': {e}"),
        })
    }

    pub fn render(&self) -> Result<String, ServerError> {
        toml::to_string_pretty(self).map_err(|e| ServerError::Config {
            context: "render",
            detail: e.to_string(),
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  Flags → TransportConfig
// ═══════════════════════════════════════════════════════════════

impl ReceiverArgs {
    /// Overlay the flags on `file` and validate the result.
    ///
    /// A `-t` that differs from the file's receiver type discards the file's
    /// receiver table.
    pub fn resolve(&self, file: Option<TransportConfig>) -> Result<TransportConfig, ServerError> {
        let kind = match (self.kind, &file) {
            (Some(kind), _) => kind,
            (None, Some(config)) => TransportKind::of(config),
            (None, None) => {
                return Err(ServerError::Usage(
                    "receiver type not set: pass -t bus|direct or set [receiver] type".into(),
                ));
            }
        };

        let config = match kind {
            TransportKind::Bus => TransportConfig::Bus(self.resolve_bus(file)?),
            TransportKind::Direct => TransportConfig::Direct(self.resolve_direct(file)?),
        };
        check_port(&config)?;
        config.validate()?;
        Ok(config)
    }

    fn resolve_bus(&self, file: Option<TransportConfig>) -> Result<BusConfig, ServerError> {
        let mut config = match file {
            Some(TransportConfig::Bus(c)) => c,
            _ => BusConfig::default(),
        };
        if let Some(addr) = &self.addr {
            let parsed = Address::parse(addr)?;
            match parsed.scheme.as_deref() {
                None | Some("redis") => {}
                Some(other) => {
                    return Err(ServerError::Usage(format!(
                        "bus address '{addr}': unsupported scheme '{other}://'"
                    )));
                }
            }
            parsed.apply_to_bus(&mut config);
        }
        if !self.channels.is_empty() {
            config.channels = self.channels.clone();
        }
        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        if let Some(us) = self.idle_delay_us {
            config.idle_delay_us = us;
        }
        if let Some(secs) = self.probe_interval_secs {
            config.probe_interval_secs = secs;
        }
        if let Some(secs) = self.probe_timeout_secs {
            config.probe_timeout_secs = secs;
        }
        Ok(config)
    }

    fn resolve_direct(&self, file: Option<TransportConfig>) -> Result<DirectConfig, ServerError> {
        let mut config = match file {
            Some(TransportConfig::Direct(c)) => c,
            _ => DirectConfig::new(DEFAULT_DIRECT_ADDR),
        };
        if let Some(addr) = &self.addr {
            let parsed = Address::parse(addr)?;
            if parsed.scheme.as_deref() != Some("tcp") {
                return Err(ServerError::Usage(format!(
                    "direct address '{addr}' needs a tcp:// scheme"
                )));
            }
            config.addr = parsed.host_port();
        }
        if let Some(topic) = &self.topic {
            config.topic = topic.clone();
        }
        Ok(config)
    }

    /// The flags as given, in `zog start` argument form.
    pub fn to_flags(&self) -> Vec<String> {
        let mut flags = Vec::new();
        if let Some(kind) = self.kind {
            flags.extend(["-t".to_string(), kind.as_str().to_string()]);
        }
        if let Some(addr) = &self.addr {
            flags.extend(["-a".to_string(), addr.clone()]);
        }
        for channel in &self.channels {
            flags.extend(["-c".to_string(), channel.clone()]);
        }
        if let Some(strategy) = self.strategy {
            flags.extend(["-m".to_string(), strategy.to_string()]);
        }
        if let Some(us) = self.idle_delay_us {
            flags.extend(["-s".to_string(), us.to_string()]);
        }
        if let Some(secs) = self.probe_interval_secs {
            flags.extend(["--probe-interval-secs".to_string(), secs.to_string()]);
        }
        if let Some(secs) = self.probe_timeout_secs {
            flags.extend(["--probe-timeout-secs".to_string(), secs.to_string()]);
        }
        if let Some(topic) = &self.topic {
            flags.extend(["--topic".to_string(), topic.clone()]);
        }
        flags
    }
}

fn check_port(config: &TransportConfig) -> Result<(), ServerError> {
    let port = match config {
        TransportConfig::Bus(c) => c.port,
        TransportConfig::Direct(c) => Address::parse(&c.addr)?.port,
    };
    if port <= 1024 {
        return Err(ServerError::Usage(format!(
            "port {port} is privileged, use a port above 1024"
        )));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════
//  Effective: merged start config
// ═══════════════════════════════════════════════════════════════

/// Start configuration after the merge: config file < env/CLI
#[derive(Debug)]
pub struct Effective {
    pub name: String,
    pub logpath: PathBuf,
    pub log_format: LogFormat,
    pub transport: TransportConfig,
}

impl Effective {
    pub fn new(args: &StartArgs) -> Result<Self, ServerError> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };

        let logpath = args
            .logpath
            .clone()
            .or(file.logpath)
            .ok_or_else(|| ServerError::Usage("LOGPATH not set: pass it or set logpath".into()))?;

        Ok(Self {
            name: args.name.clone(),
            logpath,
            log_format: file.log_format.unwrap_or_default(),
            transport: args.receiver.resolve(file.receiver)?,
        })
    }
}
