use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::fallback::select_fallbacks;
use crate::propagation::{summarize, PropagationSummary};
use crate::query::{fan_out, DnsQuery};
use crate::resolver::ResolverDirectory;
use crate::transport::{CheckConfig, QueryResult};

/// One complete round of querying and aggregation
#[derive(Debug, Clone)]
pub struct CheckCycle {
	pub index: u32,
	pub timestamp: DateTime<Local>,
	/// Primary results followed by backup results
	pub results: Vec<QueryResult>,
	pub summary: PropagationSummary,
	/// Wall time spent querying in this cycle
	pub duration: Duration,
	/// Time since the first cycle started; only set when repeating
	pub monitoring_for: Option<Duration>,
}

impl CheckCycle {
	pub fn backup_count(&self) -> usize {
		self.results.iter().filter(|r| r.resolver.is_backup).count()
	}
}

/// How a monitoring run ended
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorReport {
	/// Cycles that ran to completion
	pub cycles: u32,
	/// Summary of the last completed cycle
	pub last: Option<PropagationSummary>,
	pub cancelled: bool,
}

impl MonitorReport {
	/// Last summary, or an empty one when no cycle finished
	pub fn final_summary(&self) -> PropagationSummary {
		self.last.unwrap_or_default()
	}
}

/// Query all primaries, fall back to backups for silent regions, then aggregate.
pub async fn run_cycle<Q: DnsQuery, R: Rng + ?Sized>(
	config: &CheckConfig,
	directory: &ResolverDirectory,
	executor: &Arc<Q>,
	rng: &mut R,
	index: u32,
	started: Option<Instant>,
) -> CheckCycle {
	let timestamp = Local::now();
	let begin = Instant::now();
	let request = config.request();

	debug!(cycle = index, resolvers = directory.primaries().len(), "querying primary resolvers");
	let mut results = fan_out(
		executor, directory.primaries(), &request, config.primary_workers,
	).await;

	let backups = select_fallbacks(directory, &results, rng);
	if !backups.is_empty() {
		debug!(cycle = index, resolvers = backups.len(), "querying backup resolvers");
		results.extend(fan_out(executor, &backups, &request, config.backup_workers).await);
	}

	let summary = summarize(&results, &config.targets);
	info!(
		cycle = index,
		matched = summary.matched,
		responsive = summary.responsive,
		total = results.len(),
		"check finished",
	);

	CheckCycle {
		index,
		timestamp,
		results,
		summary,
		duration: begin.elapsed(),
		monitoring_for: started.map(|s| s.elapsed()),
	}
}

/// Run check cycles until propagation completes, the single check is done,
/// or `cancel` resolves.
///
/// `on_cycle` is called after every completed cycle. Cancellation during a
/// cycle abandons its in-flight queries; the report keeps the summary of the
/// last cycle that did complete.
pub async fn run_monitor<Q, F, C>(
	config: &CheckConfig,
	directory: &ResolverDirectory,
	executor: Arc<Q>,
	mut on_cycle: F,
	cancel: C,
) -> MonitorReport
where
	Q: DnsQuery,
	F: FnMut(&CheckCycle),
	C: Future<Output = ()>,
{
	tokio::pin!(cancel);

	let mut rng = match config.seed {
		Some(seed) => StdRng::seed_from_u64(seed),
		None => StdRng::from_entropy(),
	};
	let started = config.is_repeating().then(Instant::now);
	let mut report = MonitorReport { cycles: 0, last: None, cancelled: false };

	loop {
		let index = report.cycles + 1;
		let cycle = tokio::select! {
			biased;
			_ = &mut cancel => {
				report.cancelled = true;
				return report;
			}
			cycle = run_cycle(config, directory, &executor, &mut rng, index, started) => cycle,
		};

		on_cycle(&cycle);
		report.cycles = index;
		report.last = Some(cycle.summary);

		if !config.is_repeating() || cycle.summary.is_complete() {
			return report;
		}

		tokio::select! {
			biased;
			_ = &mut cancel => {
				report.cancelled = true;
				return report;
			}
			_ = tokio::time::sleep(config.interval) => {}
		}
	}
}
