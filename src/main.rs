mod cli;
mod dns;
mod fallback;
mod logging;
mod monitor;
mod output;
mod propagation;
mod query;
mod resolver;
mod transport;

#[cfg(test)]
mod testing;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail};
use clap::Parser;
use hickory_proto::rr::Name;

use crate::cli::{BackendKind, Cli};
use crate::logging::Logging;
use crate::monitor::CheckCycle;
use crate::query::{Backend, DigQuery, UdpQuery};
use crate::resolver::ResolverDirectory;
use crate::transport::{CheckConfig, TargetSet};

/// Concurrent queries against primary resolvers
const PRIMARY_WORKERS: usize = 20;
/// Concurrent queries against backup resolvers
const BACKUP_WORKERS: usize = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	// Usage errors exit with 1; --help and --version exit with 0
	let cli = match Cli::try_parse() {
		Ok(cli) => cli,
		Err(e) if !e.use_stderr() => e.exit(),
		Err(e) => {
			let _ = e.print();
			std::process::exit(1);
		}
	};

	Logging::new(cli.verbose).start()?;

	let domain = cli.domain.trim().to_string();
	Name::from_ascii(&domain)
		.map_err(|e| anyhow!("invalid domain name '{}': {}", domain, e))?;

	let targets = TargetSet::new(&cli.targets);
	if targets.is_empty() {
		bail!("at least one non-empty --target value is required");
	}

	let directory = match &cli.directory {
		Some(path) => ResolverDirectory::from_file(path)?,
		None => ResolverDirectory::builtin(),
	};

	let backend = match cli.backend {
		BackendKind::Udp => Backend::Udp(UdpQuery),
		BackendKind::Dig => Backend::Dig(DigQuery::default()),
	};
	if let Err(e) = backend.ensure_available().await {
		eprintln!("Error: {}", e);
		if cli.backend == BackendKind::Dig {
			eprintln!("Please install dig (usually part of the 'dnsutils' or 'bind-utils' package).");
		}
		std::process::exit(1);
	}

	let config = CheckConfig {
		domain,
		record_type: cli.record_type,
		targets,
		interval: Duration::from_secs(cli.interval.max(0) as u64),
		timeout: Duration::from_secs(cli.timeout),
		primary_workers: PRIMARY_WORKERS,
		backup_workers: BACKUP_WORKERS,
		seed: cli.seed,
	};

	output::print_config_summary(&config, &directory, backend.name());
	println!("Verifying propagation for {}...", config.domain);

	let clear = !cli.no_clear;
	let mut last_cycle: Option<CheckCycle> = None;
	let ctrl_c = async {
		// Without a signal handler the loop can only end on its own
		if tokio::signal::ctrl_c().await.is_err() {
			std::future::pending::<()>().await;
		}
	};

	let report = monitor::run_monitor(
		&config,
		&directory,
		Arc::new(backend),
		|cycle| {
			if clear && cycle.index > 1 {
				output::clear_screen();
			}
			output::print_cycle(&config, cycle);
			if cli.output.is_some() {
				last_cycle = Some(cycle.clone());
			}
		},
		ctrl_c,
	).await;

	output::print_final(&report);

	if let (Some(path), Some(cycle)) = (&cli.output, &last_cycle) {
		output::write_csv(path, cycle, &config.targets)?;
	}

	Ok(())
}
