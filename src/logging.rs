use std::io::IsTerminal;

use anyhow::Result;
use tracing::subscriber::set_global_default;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

/// Diagnostic logging to stderr, kept apart from the dashboard on stdout.
pub struct Logging {
	verbosity: u8,
}

impl Logging {
	pub fn new(verbosity: u8) -> Logging {
		Logging { verbosity }
	}

	fn log_level(verbosity: u8) -> LevelFilter {
		match verbosity {
			0 => LevelFilter::WARN,
			1 => LevelFilter::INFO,
			2 => LevelFilter::DEBUG,
			_ => LevelFilter::TRACE,
		}
	}

	pub fn start(self) -> Result<()> {
		let filter = if std::env::var_os("RUST_LOG").is_some() {
			// RUST_LOG overrides the -v count when set
			EnvFilter::from_default_env()
		} else {
			EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), Logging::log_level(self.verbosity)))
		};

		let fmt = fmt::layer()
			.with_writer(std::io::stderr)
			.with_ansi(std::io::stderr().is_terminal())
			.with_target(false);

		let registry = tracing_subscriber::registry().with(filter).with(fmt);
		set_global_default(registry)?;

		Ok(())
	}
}
