use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use clap::ValueEnum;
use utils::version;

use crate::allocator::AllocationPolicy;
use crate::registration::RetryPolicy;

pub const RESOURCE_NAME: &str = "github.com/mosvector";
pub const DEVICE_ID: &str = "mosvector-0";
pub const DEVICE_PATH: &str = "/dev/mosvector";
pub const DEVICE_PLUGIN_PATH: &str = "/var/lib/kubelet/device-plugins/";
pub const SOCKET_NAME: &str = "mosvector.sock";
pub const KUBELET_SOCKET: &str = "/var/lib/kubelet/device-plugins/kubelet.sock";

#[derive(Parser, Clone, Debug)]
#[command(about, long_about, version = &**version::VERSION)]
pub struct Cli {
    #[arg(
        long,
        env = "MOSVECTOR_RESOURCE_NAME",
        default_value = RESOURCE_NAME,
        help = "Extended resource name advertised to the scheduler"
    )]
    pub resource_name: String,

    #[arg(
        long,
        env = "MOSVECTOR_DEVICE_ID",
        default_value = DEVICE_ID,
        help = "Identifier of the advertised device"
    )]
    pub device_id: String,

    #[arg(
        long,
        env = "MOSVECTOR_DEVICE_PATH",
        default_value = DEVICE_PATH,
        value_hint = clap::ValueHint::FilePath,
        help = "Host path of the device node to bind-mount"
    )]
    pub device_path: PathBuf,

    #[arg(
        long,
        env = "MOSVECTOR_CONTAINER_PATH",
        value_hint = clap::ValueHint::FilePath,
        help = "Path of the device node inside the container (defaults to the host path)"
    )]
    pub container_path: Option<PathBuf>,

    #[arg(
        long,
        env = "DEVICE_PLUGIN_PATH",
        default_value = DEVICE_PLUGIN_PATH,
        value_hint = clap::ValueHint::DirPath,
        help = "Kubelet device plugin directory"
    )]
    pub plugin_dir: PathBuf,

    #[arg(
        long,
        env = "MOSVECTOR_SOCKET_NAME",
        default_value = SOCKET_NAME,
        help = "File name of the plugin socket inside the plugin directory"
    )]
    pub socket_name: String,

    #[arg(
        long,
        env = "KUBELET_SOCKET",
        default_value = KUBELET_SOCKET,
        value_hint = clap::ValueHint::FilePath,
        help = "Kubelet registration socket path"
    )]
    pub kubelet_socket: PathBuf,

    #[arg(
        long,
        default_value = "5",
        help = "Seconds between two device list updates on a ListAndWatch stream"
    )]
    pub advertise_interval_secs: u64,

    #[arg(
        long,
        default_value = "5",
        help = "Seconds to wait for the kubelet registration socket to accept a connection"
    )]
    pub registration_timeout_secs: u64,

    #[arg(
        long,
        default_value = "10",
        help = "Number of checks for the plugin socket file before registering"
    )]
    pub readiness_attempts: u32,

    #[arg(
        long,
        default_value = "1000",
        help = "Milliseconds between two plugin socket checks"
    )]
    pub readiness_interval_ms: u64,

    #[arg(
        long,
        env = "MOSVECTOR_REGISTRATION_RETRIES",
        default_value = "0",
        help = "Registration retries with exponential backoff, 0 fails on the first error"
    )]
    pub registration_retries: u32,

    #[arg(long, default_value = "500", help = "Initial registration backoff in milliseconds")]
    pub registration_backoff_ms: u64,

    #[arg(long, default_value = "8000", help = "Maximum registration backoff in milliseconds")]
    pub registration_max_backoff_ms: u64,

    #[arg(
        long,
        env = "MOSVECTOR_ALLOCATION_POLICY",
        value_enum,
        default_value_t = PolicyArg::Permissive,
        help = "Whether Allocate rejects device ids that are not advertised"
    )]
    pub allocation_policy: PolicyArg,

    #[arg(
        long,
        env = "MOSVECTOR_LOG_FILE",
        value_hint = clap::ValueHint::FilePath,
        help = "Also write logs to this file, rotated daily"
    )]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    Permissive,
    Strict,
}

impl From<PolicyArg> for AllocationPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Permissive => AllocationPolicy::Permissive,
            PolicyArg::Strict => AllocationPolicy::Strict,
        }
    }
}

/// Resolved device plugin configuration
#[derive(Debug, Clone)]
pub struct PluginConfig {
    pub resource_name: String,
    pub device_id: String,
    pub host_path: PathBuf,
    pub container_path: PathBuf,
    pub plugin_dir: PathBuf,
    pub socket_name: String,
    pub kubelet_socket: PathBuf,
    pub advertise_interval: Duration,
    pub registration_timeout: Duration,
    pub readiness_attempts: u32,
    pub readiness_interval: Duration,
    pub retry: RetryPolicy,
    pub allocation_policy: AllocationPolicy,
}

impl PluginConfig {
    /// full path of the plugin socket
    pub fn socket_path(&self) -> PathBuf {
        self.plugin_dir.join(&self.socket_name)
    }
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            resource_name: RESOURCE_NAME.to_string(),
            device_id: DEVICE_ID.to_string(),
            host_path: PathBuf::from(DEVICE_PATH),
            container_path: PathBuf::from(DEVICE_PATH),
            plugin_dir: PathBuf::from(DEVICE_PLUGIN_PATH),
            socket_name: SOCKET_NAME.to_string(),
            kubelet_socket: PathBuf::from(KUBELET_SOCKET),
            advertise_interval: Duration::from_secs(5),
            registration_timeout: Duration::from_secs(5),
            readiness_attempts: 10,
            readiness_interval: Duration::from_secs(1),
            retry: RetryPolicy::default(),
            allocation_policy: AllocationPolicy::Permissive,
        }
    }
}

impl From<&Cli> for PluginConfig {
    fn from(cli: &Cli) -> Self {
        Self {
            resource_name: cli.resource_name.clone(),
            device_id: cli.device_id.clone(),
            host_path: cli.device_path.clone(),
            container_path: cli
                .container_path
                .clone()
                .unwrap_or_else(|| cli.device_path.clone()),
            plugin_dir: cli.plugin_dir.clone(),
            socket_name: cli.socket_name.clone(),
            kubelet_socket: cli.kubelet_socket.clone(),
            advertise_interval: Duration::from_secs(cli.advertise_interval_secs.max(1)),
            registration_timeout: Duration::from_secs(cli.registration_timeout_secs.max(1)),
            readiness_attempts: cli.readiness_attempts,
            readiness_interval: Duration::from_millis(cli.readiness_interval_ms.max(1)),
            retry: RetryPolicy {
                max_retries: cli.registration_retries,
                initial_backoff: Duration::from_millis(cli.registration_backoff_ms),
                max_backoff: Duration::from_millis(cli.registration_max_backoff_ms),
            },
            allocation_policy: cli.allocation_policy.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn defaults_match_well_known_paths() {
        let cli = Cli::try_parse_from(["mosvector-device-plugin"]).expect("should parse no args");
        let config = PluginConfig::from(&cli);

        assert_eq!(
            config.socket_path(),
            PathBuf::from("/var/lib/kubelet/device-plugins/mosvector.sock")
        );
        assert_eq!(config.kubelet_socket, PathBuf::from(KUBELET_SOCKET));
        assert_eq!(config.resource_name, "github.com/mosvector");
        assert_eq!(config.container_path, PathBuf::from("/dev/mosvector"));
        assert_eq!(config.advertise_interval, Duration::from_secs(5));
        assert_eq!(config.retry.max_retries, 0);
        assert_eq!(config.allocation_policy, AllocationPolicy::Permissive);
    }

    #[test]
    fn cli_defaults_agree_with_config_default() {
        let cli = Cli::try_parse_from(["mosvector-device-plugin"]).expect("should parse no args");
        let from_cli = PluginConfig::from(&cli);
        let default = PluginConfig::default();

        assert_eq!(from_cli.socket_path(), default.socket_path());
        assert_eq!(from_cli.readiness_attempts, default.readiness_attempts);
        assert_eq!(from_cli.readiness_interval, default.readiness_interval);
        assert_eq!(from_cli.registration_timeout, default.registration_timeout);
        assert_eq!(from_cli.retry, default.retry);
    }

    #[test]
    fn container_path_and_policy_overrides() {
        let cli = Cli::try_parse_from([
            "mosvector-device-plugin",
            "--device-path",
            "/dev/mosvector1",
            "--container-path",
            "/dev/accel0",
            "--allocation-policy",
            "strict",
            "--advertise-interval-secs",
            "0",
        ])
        .expect("should parse overrides");
        let config = PluginConfig::from(&cli);

        assert_eq!(config.host_path, PathBuf::from("/dev/mosvector1"));
        assert_eq!(config.container_path, PathBuf::from("/dev/accel0"));
        assert_eq!(config.allocation_policy, AllocationPolicy::Strict);
        assert_eq!(config.advertise_interval, Duration::from_secs(1));
    }

    #[test]
    fn zero_durations_are_clamped() {
        let cli = Cli::try_parse_from([
            "mosvector-device-plugin",
            "--registration-timeout-secs",
            "0",
            "--readiness-interval-ms",
            "0",
        ])
        .expect("should parse zero durations");
        let config = PluginConfig::from(&cli);

        assert_eq!(config.registration_timeout, Duration::from_secs(1));
        assert_eq!(config.readiness_interval, Duration::from_millis(1));
    }
}
