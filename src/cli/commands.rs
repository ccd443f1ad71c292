use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Command line front end for the NetScout probe engine
#[derive(Parser)]
#[command(version)]
#[command(about = "NetScout probe engine - run network diagnostic probes and inspect host telemetry")]
#[command(long_about = "NetScout runs a catalog of network probes (port sweep, device discovery, \
reverse DNS sweep, link quality monitoring, interface telemetry) against user supplied targets \
and prints structured results. Settings come from built-in defaults, an optional config file \
and NETSCOUT__SECTION__KEY environment variables.")]
pub struct Cli {
    /// Configuration file layered over the built-in defaults (TOML, JSON or YAML)
    #[arg(short, long, global = true, help = "Path to a configuration file")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List every registered probe
    #[command(about = "List available probes")]
    Probes {
        #[arg(long, help = "Print descriptors as JSON")]
        json: bool,
    },

    /// Show the parameter schema of one probe
    #[command(about = "Describe a probe and its parameters")]
    Describe {
        /// Probe id, as shown by `nsp probes`
        id: String,
    },

    /// Validate parameters and run a probe
    #[command(about = "Run a probe")]
    #[command(long_about = "Runs a probe after checking its required parameters. Parameters are given \
as repeated key=value pairs, as a JSON object, or both (key=value pairs win).\n\n\
Examples:\n  \
nsp run port_scanner -p host=192.168.1.1 -p portRange=1-1024\n  \
nsp run reverse_dns_lookup -p ip_addresses=8.8.8.8,1.1.1.1\n  \
nsp run network_quality --params-json '{\"target\": \"1.1.1.1\", \"duration\": 10}'")]
    Run {
        /// Probe id
        id: String,

        #[arg(
            short = 'p',
            long = "param",
            value_name = "KEY=VALUE",
            value_parser = parse_key_value,
            help = "Probe parameter, may be repeated"
        )]
        params: Vec<(String, String)>,

        #[arg(long, value_name = "JSON", help = "Probe parameters as a JSON object")]
        params_json: Option<String>,

        #[arg(long, help = "Print the result on a single line")]
        compact: bool,
    },

    /// One-time snapshot of interface, addressing and traffic state
    #[command(about = "Show current network status")]
    #[command(long_about = "Takes a baseline telemetry sample, waits for the measurement duration and \
samples again so the bandwidth figure reflects real traffic.\n\n\
Examples:\n  \
nsp status                            # 2 second measurement\n  \
nsp status --measurement-duration 5   # longer window for a steadier figure\n  \
nsp status --json                     # machine readable snapshot")]
    Status {
        #[arg(
            short = 'm',
            long,
            default_value = "2",
            value_parser = clap::value_parser!(u64).range(1..=60),
            help = "Measurement duration in seconds (1-60)"
        )]
        measurement_duration: u64,

        #[arg(long, help = "Print the snapshot as JSON")]
        json: bool,
    },

    /// Stream periodic telemetry snapshots
    #[command(about = "Stream telemetry snapshots periodically")]
    Watch {
        #[arg(short, long, help = "Seconds between snapshots (defaults to the configured poll interval)")]
        interval: Option<f64>,

        #[arg(short = 'n', long, help = "Stop after this many snapshots")]
        count: Option<u64>,

        #[arg(long, help = "Print each snapshot as a JSON line")]
        json: bool,
    },
}

fn parse_key_value(text: &str) -> Result<(String, String), String> {
    let (key, value) = text
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", text))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty parameter name in '{}'", text));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("portRange=1-1024").unwrap(),
            ("portRange".to_string(), "1-1024".to_string())
        );
        assert_eq!(parse_key_value("dns_server=").unwrap().1, "");
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn test_run_command_parses_repeated_params() {
        let cli = Cli::try_parse_from([
            "nsp", "--config", "netscout.toml", "run", "port_scanner", "-p", "host=10.0.0.1", "-p", "portRange=22",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("netscout.toml")));
        match cli.command {
            Commands::Run { id, params, .. } => {
                assert_eq!(id, "port_scanner");
                assert_eq!(params.len(), 2);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_status_duration_is_bounded() {
        assert!(Cli::try_parse_from(["nsp", "status", "-m", "0"]).is_err());
        assert!(Cli::try_parse_from(["nsp", "status", "-m", "61"]).is_err());
        assert!(Cli::try_parse_from(["nsp", "status", "-m", "5", "--json"]).is_ok());
    }
}
