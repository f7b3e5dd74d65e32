use core::time::Duration;
use std::{net::SocketAddr, path::PathBuf};

use anyhow::{Context, bail};
use clap::Parser;
use docseq::{
    BusinessTable, ConflictPolicy, MAX_NUMBER_LENGTH, Timeouts, is_sequence_type,
};

/// Runtime configuration for the `docseq-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is loaded first), with defaults suitable for a single-node
/// deployment.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "docseq-server",
    version,
    about = "An HTTP service issuing daily sequential document numbers"
)]
pub struct CliArgs {
    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:8080"))]
    pub server_addr: String,

    /// Path of the SQLite database holding the counters. Every instance
    /// numbering the same documents must point at the same file.
    ///
    /// Environment variable: `DATABASE_PATH`
    #[arg(long, env = "DATABASE_PATH", default_value = "docseq.db")]
    pub database_path: PathBuf,

    /// Attempts per generation call before giving up.
    ///
    /// Environment variable: `MAX_ATTEMPTS`
    #[arg(long, env = "MAX_ATTEMPTS", default_value_t = ConflictPolicy::DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,

    /// Lower bound of the jittered backoff between attempts, in milliseconds.
    ///
    /// Environment variable: `RETRY_MIN_DELAY_MS`
    #[arg(long, env = "RETRY_MIN_DELAY_MS", default_value_t = 50)]
    pub retry_min_delay_ms: u64,

    /// Upper bound of the jittered backoff between attempts, in milliseconds.
    ///
    /// Environment variable: `RETRY_MAX_DELAY_MS`
    #[arg(long, env = "RETRY_MAX_DELAY_MS", default_value_t = 200)]
    pub retry_max_delay_ms: u64,

    /// Transaction timeout of a single-identifier attempt, in milliseconds.
    ///
    /// Environment variable: `SINGLE_TIMEOUT_MS`
    #[arg(long, env = "SINGLE_TIMEOUT_MS", default_value_t = 10_000)]
    pub single_timeout_ms: u64,

    /// Transaction timeout of a batch attempt, in milliseconds.
    ///
    /// Environment variable: `BATCH_TIMEOUT_MS`
    #[arg(long, env = "BATCH_TIMEOUT_MS", default_value_t = 15_000)]
    pub batch_timeout_ms: u64,

    /// Tail width of factory shipment numbers. Changing it for a live
    /// deployment breaks consumers that slice numbers by fixed width.
    ///
    /// Environment variable: `FACTORY_SHIPMENT_DIGITS`
    #[arg(long, env = "FACTORY_SHIPMENT_DIGITS", default_value_t = 4)]
    pub factory_shipment_digits: usize,

    /// Business tables checked before an identifier is committed, as a
    /// comma-separated list of `sequence_type=table.column`.
    ///
    /// Example: "sales_order=sales_orders.order_no,return_order=returns.rma_no"
    ///
    /// Environment variable: `BUSINESS_TABLES`
    #[arg(long, env = "BUSINESS_TABLES", default_value = "")]
    pub business_tables: String,

    /// Seconds to wait for in-flight requests after a shutdown signal.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT_SECS`
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 3)]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: SocketAddr,
    pub database_path: PathBuf,
    pub policy: ConflictPolicy,
    pub timeouts: Timeouts,
    pub factory_shipment_digits: usize,
    pub business_tables: Vec<(String, BusinessTable)>,
    pub shutdown_timeout: Duration,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let server_addr = args
            .server_addr
            .parse()
            .with_context(|| format!("SERVER_ADDR ({}) is not a socket address", args.server_addr))?;

        if args.max_attempts == 0 {
            bail!("MAX_ATTEMPTS must be greater than 0");
        }
        if args.retry_min_delay_ms > args.retry_max_delay_ms {
            bail!(
                "RETRY_MIN_DELAY_MS ({}) exceeds RETRY_MAX_DELAY_MS ({})",
                args.retry_min_delay_ms,
                args.retry_max_delay_ms
            );
        }
        let policy = ConflictPolicy::new(
            args.max_attempts,
            Duration::from_millis(args.retry_min_delay_ms),
            Duration::from_millis(args.retry_max_delay_ms),
        )?;

        if args.single_timeout_ms == 0 || args.batch_timeout_ms == 0 {
            bail!("SINGLE_TIMEOUT_MS and BATCH_TIMEOUT_MS must be greater than 0");
        }
        let timeouts = Timeouts::new(
            Duration::from_millis(args.single_timeout_ms),
            Duration::from_millis(args.batch_timeout_ms),
        )?;

        if !(1..=MAX_NUMBER_LENGTH).contains(&args.factory_shipment_digits) {
            bail!(
                "FACTORY_SHIPMENT_DIGITS ({}) must be between 1 and {}",
                args.factory_shipment_digits,
                MAX_NUMBER_LENGTH
            );
        }

        Ok(Self {
            server_addr,
            database_path: args.database_path,
            policy,
            timeouts,
            factory_shipment_digits: args.factory_shipment_digits,
            business_tables: parse_business_tables(&args.business_tables)?,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout_secs),
        })
    }
}

/// Parses `sequence_type=table.column[,...]`. Blank entries are skipped.
fn parse_business_tables(raw: &str) -> anyhow::Result<Vec<(String, BusinessTable)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let Some((sequence_type, target)) = entry.split_once('=') else {
                bail!("BUSINESS_TABLES entry {entry:?} is not `sequence_type=table.column`");
            };
            let Some((table, column)) = target.split_once('.') else {
                bail!("BUSINESS_TABLES entry {entry:?} is missing `.column`");
            };
            let sequence_type = sequence_type.trim();
            if !is_sequence_type(sequence_type) {
                bail!("BUSINESS_TABLES entry {entry:?} has an invalid sequence type");
            }
            let table = BusinessTable::new(table.trim(), column.trim())
                .with_context(|| format!("BUSINESS_TABLES entry {entry:?}"))?;
            Ok((sequence_type.to_string(), table))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> CliArgs {
        let argv = ["docseq-server"].iter().chain(extra);
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_are_valid() {
        let config = ServerConfig::try_from(args(&[])).unwrap();
        assert_eq!(config.server_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.policy, ConflictPolicy::default());
        assert_eq!(config.timeouts, Timeouts::default());
        assert_eq!(config.factory_shipment_digits, 4);
        assert!(config.business_tables.is_empty());
        assert_eq!(config.shutdown_timeout, Duration::from_secs(3));
    }

    #[test]
    fn rejects_invalid_values() {
        for bad in [
            &["--max-attempts", "0"][..],
            &["--retry-min-delay-ms", "300"],
            &["--single-timeout-ms", "0"],
            &["--factory-shipment-digits", "0"],
            &["--factory-shipment-digits", "19"],
            &["--server-addr", "localhost"],
            &["--business-tables", "sales_order=orders"],
            &["--business-tables", "Sales=orders.no"],
            &["--business-tables", "sales_order=orders;drop.no"],
        ] {
            assert!(ServerConfig::try_from(args(bad)).is_err(), "{bad:?}");
        }
    }

    #[test]
    fn parses_business_tables() {
        let tables = parse_business_tables(
            " sales_order=sales_orders.order_no , ,return_order=returns.rma_no",
        )
        .unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].0, "sales_order");
        assert_eq!(tables[0].1.table(), "sales_orders");
        assert_eq!(tables[1].1.column(), "rma_no");
    }
}
