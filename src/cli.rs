use std::str::FromStr;

use clap::{Parser, ValueEnum};
use hickory_proto::rr::RecordType;

/// How DNS queries are sent to each resolver
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
	/// Built-in UDP client
	Udp,
	/// The external `dig` command
	Dig,
}

/// Nameserver propagation checker
#[derive(Parser, Debug)]
#[command(name = "propagation-check", version)]
#[command(about = "Watch a nameserver change propagate across public DNS resolvers worldwide")]
pub struct Cli {
	/// Domain to check propagation for
	pub domain: String,

	/// Check every N seconds until fully propagated (0 = single check)
	#[arg(default_value = "0", allow_negative_numbers = true)]
	pub interval: i64,

	/// Timeout for each DNS query in seconds
	#[arg(default_value = "5", value_parser = clap::value_parser!(u64).range(1..))]
	pub timeout: u64,

	/// Record type to query
	#[arg(short = 't', long = "record-type", default_value = "NS", value_parser = parse_record_type)]
	pub record_type: RecordType,

	/// Value that counts as propagated when a resolver returns it (repeatable)
	#[arg(
		short = 'T',
		long = "target",
		default_values = ["ns1.cloudflare.com", "ns2.cloudflare.com"],
	)]
	pub targets: Vec<String>,

	/// Resolver directory file (lines of tier,region,name,address)
	#[arg(short = 'd', long = "directory")]
	pub directory: Option<String>,

	/// DNS query mechanism
	#[arg(short = 'b', long = "backend", value_enum, default_value_t = BackendKind::Udp)]
	pub backend: BackendKind,

	/// Random seed for backup resolver selection
	#[arg(short = 's', long = "seed")]
	pub seed: Option<u64>,

	/// Write the last cycle's results to a CSV file
	#[arg(short = 'o', long = "output")]
	pub output: Option<String>,

	/// Do not clear the terminal between checks
	#[arg(long = "no-clear")]
	pub no_clear: bool,

	/// Increase log verbosity (repeatable)
	#[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
	pub verbose: u8,
}

fn parse_record_type(input: &str) -> Result<RecordType, String> {
	RecordType::from_str(&input.trim().to_ascii_uppercase())
		.map_err(|e| format!("unknown record type '{}': {}", input, e))
}
