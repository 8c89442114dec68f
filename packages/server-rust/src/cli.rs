//! Command-line and environment configuration.
//!
//! Every option is a flag and an environment variable. The variable names
//! `PORT`, `REDIS_HOST`, `REDIS_PORT`, `MAX_REQUESTS`, `TIME_BEFORE_TIMEOUT`,
//! `TIMEOUT_TIME`, and `DELAY_BEFORE_NEXT_CHECK` are kept so existing
//! deployment manifests keep working.

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::network::NetworkConfig;
use crate::service::ServiceConfig;
use crate::storage::StoreBackend;

#[derive(Parser, Debug)]
#[command(name = "opgate", version)]
#[command(about = "Admission-controlled operation gateway and dispatcher over a shared store")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub telemetry: TelemetryArgs,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve the HTTP gateway only. Pair with one or more dispatchers.
    Gateway(GatewayArgs),
    /// Run the queue drain loop only.
    Dispatcher(DispatcherArgs),
    /// Gateway and dispatcher in one process (in-memory store by default).
    Standalone(StandaloneArgs),
}

impl Command {
    /// Service settings assembled from whichever argument groups the
    /// subcommand carries. Groups it does not carry keep their defaults.
    #[must_use]
    pub fn service_config(&self) -> ServiceConfig {
        let mut config = ServiceConfig::default();
        match self {
            Self::Gateway(args) => args.admission.apply(&mut config),
            Self::Dispatcher(args) => args.execution.apply(&mut config),
            Self::Standalone(args) => {
                args.admission.apply(&mut config);
                args.execution.apply(&mut config);
            }
        }
        config
    }

    /// Store backend, defaulting to Redis except for `standalone`.
    #[must_use]
    pub fn store_backend(&self) -> StoreBackend {
        match self {
            Self::Gateway(args) => args.store.backend(StoreKind::Redis),
            Self::Dispatcher(args) => args.store.backend(StoreKind::Redis),
            Self::Standalone(args) => args.store.backend(StoreKind::Memory),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct GatewayArgs {
    #[command(flatten)]
    pub http: HttpArgs,
    #[command(flatten)]
    pub admission: AdmissionArgs,
    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args, Debug, Clone)]
pub struct DispatcherArgs {
    #[command(flatten)]
    pub execution: ExecutionArgs,
    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args, Debug, Clone)]
pub struct StandaloneArgs {
    #[command(flatten)]
    pub http: HttpArgs,
    #[command(flatten)]
    pub admission: AdmissionArgs,
    #[command(flatten)]
    pub execution: ExecutionArgs,
    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args, Debug, Clone)]
pub struct HttpArgs {
    /// Bind address
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Listen port (0 picks a free one)
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Allowed CORS origins, comma separated; `*` allows any
    #[arg(long, env = "CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    pub cors_origins: Vec<String>,
}

impl HttpArgs {
    #[must_use]
    pub fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            cors_origins: self.cors_origins.clone(),
            ..NetworkConfig::default()
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct AdmissionArgs {
    /// Cap on admitted, unfinished operations
    #[arg(long, env = "MAX_REQUESTS", default_value_t = 5)]
    pub max_requests: u32,

    /// How long a sync submission waits for its result, in milliseconds
    #[arg(long = "sync-wait-ms", env = "TIME_BEFORE_TIMEOUT", default_value_t = 12_000)]
    pub sync_wait_ms: u64,
}

impl AdmissionArgs {
    fn apply(&self, config: &mut ServiceConfig) {
        config.max_requests = self.max_requests;
        config.sync_wait_budget_ms = self.sync_wait_ms;
    }
}

#[derive(Args, Debug, Clone)]
pub struct ExecutionArgs {
    /// Duration of the simulated work per operation, in milliseconds
    #[arg(long = "execution-ms", env = "TIMEOUT_TIME", default_value_t = 10_000)]
    pub execution_ms: u64,

    /// Dispatcher sleep when both queues are empty, in milliseconds
    #[arg(long = "idle-poll-ms", env = "DELAY_BEFORE_NEXT_CHECK", default_value_t = 100)]
    pub idle_poll_ms: u64,

    /// Most operations one dispatcher executes at once
    #[arg(long, env = "MAX_IN_FLIGHT", default_value_t = 64)]
    pub max_in_flight: usize,

    /// How long shutdown waits for in-flight operations, in milliseconds
    #[arg(long = "drain-timeout-ms", env = "DRAIN_TIMEOUT_MS", default_value_t = 30_000)]
    pub drain_timeout_ms: u64,
}

impl ExecutionArgs {
    fn apply(&self, config: &mut ServiceConfig) {
        config.execution_duration_ms = self.execution_ms;
        config.idle_poll_interval_ms = self.idle_poll_ms;
        config.max_in_flight = self.max_in_flight;
        config.drain_timeout_ms = self.drain_timeout_ms;
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    Memory,
    Redis,
}

#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Shared store backend
    #[arg(long, value_enum, env = "STORE")]
    pub store: Option<StoreKind>,

    #[arg(long, env = "REDIS_HOST", default_value = "127.0.0.1")]
    pub redis_host: String,

    #[arg(long, env = "REDIS_PORT", default_value_t = 6379)]
    pub redis_port: u16,
}

impl StoreArgs {
    fn backend(&self, default: StoreKind) -> StoreBackend {
        match self.store.unwrap_or(default) {
            StoreKind::Memory => StoreBackend::Memory,
            StoreKind::Redis => StoreBackend::redis(&self.redis_host, self.redis_port),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Args, Debug, Clone)]
pub struct TelemetryArgs {
    /// Log output format
    #[arg(long, value_enum, env = "LOG_FORMAT", default_value_t = LogFormat::Pretty, global = true)]
    pub log_format: LogFormat,

    /// Serve Prometheus metrics on this port
    #[arg(long, env = "METRICS_PORT", global = true)]
    pub metrics_port: Option<u16>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("opgate").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn gateway_defaults() {
        let cli = parse(&["gateway"]);
        let config = cli.command.service_config();

        assert_eq!(config.max_requests, 5);
        assert_eq!(config.sync_wait_budget_ms, 12_000);
        assert_eq!(
            cli.command.store_backend(),
            StoreBackend::Redis {
                url: "redis://127.0.0.1:6379".into()
            }
        );
        assert_eq!(cli.telemetry.log_format, LogFormat::Pretty);
        assert!(cli.telemetry.metrics_port.is_none());
    }

    #[test]
    fn standalone_defaults_to_memory_store() {
        let cli = parse(&["standalone"]);
        assert_eq!(cli.command.store_backend(), StoreBackend::Memory);
    }

    #[test]
    fn flags_override_service_settings() {
        let cli = parse(&[
            "standalone",
            "--max-requests",
            "9",
            "--sync-wait-ms",
            "2000",
            "--execution-ms",
            "200",
            "--idle-poll-ms",
            "5",
            "--store",
            "redis",
            "--redis-host",
            "cache",
            "--redis-port",
            "6380",
        ]);
        let config = cli.command.service_config();

        assert_eq!(config.max_requests, 9);
        assert_eq!(config.sync_wait_budget_ms, 2_000);
        assert_eq!(config.execution_duration_ms, 200);
        assert_eq!(config.idle_poll_interval_ms, 5);
        assert_eq!(
            cli.command.store_backend(),
            StoreBackend::Redis {
                url: "redis://cache:6380".into()
            }
        );
    }

    #[test]
    fn dispatcher_ignores_admission_settings() {
        let cli = parse(&["dispatcher", "--execution-ms", "50"]);
        let config = cli.command.service_config();
        assert_eq!(config.execution_duration_ms, 50);
        assert_eq!(config.max_requests, ServiceConfig::default().max_requests);
    }

    #[test]
    fn cors_origins_split_on_commas() {
        let cli = parse(&[
            "gateway",
            "--cors-origins",
            "http://a.test,http://b.test",
        ]);
        let Command::Gateway(args) = cli.command else {
            panic!("expected gateway");
        };
        assert_eq!(
            args.http.network_config().cors_origins,
            vec!["http://a.test", "http://b.test"]
        );
    }

    #[test]
    fn telemetry_flags_are_global() {
        let cli = parse(&["dispatcher", "--log-format", "json", "--metrics-port", "9100"]);
        assert_eq!(cli.telemetry.log_format, LogFormat::Json);
        assert_eq!(cli.telemetry.metrics_port, Some(9100));
    }

    #[test]
    fn unknown_store_is_rejected() {
        assert!(Cli::try_parse_from(["opgate", "gateway", "--store", "etcd"]).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
