//! Command-line flags, each overridable through the environment.

use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "arex-server",
    version,
    about = "Prometheus exporter for AWS resource usage and quotas"
)]
pub struct Flags {
    /// Address on which to expose metrics and the web interface.
    #[arg(
        long = "web.listen-address",
        env = "AREX_WEB_LISTEN_ADDRESS",
        default_value = "0.0.0.0:9115"
    )]
    pub listen_address: String,

    /// Path under which to expose metrics.
    #[arg(
        long = "web.telemetry-path",
        env = "AREX_WEB_TELEMETRY_PATH",
        default_value = "/metrics"
    )]
    pub telemetry_path: String,

    /// Path to the exporter configuration file.
    #[arg(
        long = "config.file",
        env = "AREX_CONFIG_FILE",
        default_value = "./arex-config.yaml"
    )]
    pub config_file: String,

    /// Only log messages with the given severity or above.
    #[arg(long = "log.level", env = "AREX_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_surface() {
        let flags = Flags::try_parse_from(["arex-server"]).unwrap();
        assert_eq!(flags.listen_address, "0.0.0.0:9115");
        assert_eq!(flags.telemetry_path, "/metrics");
        assert_eq!(flags.config_file, "./arex-config.yaml");
        assert_eq!(flags.log_level, "info");
    }

    #[test]
    fn flags_override_defaults() {
        let flags = Flags::try_parse_from([
            "arex-server",
            "--web.listen-address",
            "127.0.0.1:9000",
            "--web.telemetry-path",
            "/prom",
            "--config.file",
            "/etc/arex/config.yaml",
            "--log.level",
            "debug",
        ])
        .unwrap();
        assert_eq!(flags.listen_address, "127.0.0.1:9000");
        assert_eq!(flags.telemetry_path, "/prom");
        assert_eq!(flags.config_file, "/etc/arex/config.yaml");
        assert_eq!(flags.log_level, "debug");
    }
}
