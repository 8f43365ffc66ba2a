use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::{IsTerminal, Write as _};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use yansi::Paint;

use crate::monitor::{CheckCycle, MonitorReport};
use crate::propagation::{classify, Outcome, PropagationSummary, Status};
use crate::resolver::ResolverDirectory;
use crate::transport::{CheckConfig, QueryResult, TargetSet};

/// Width of the textual progress bar in cells
const BAR_WIDTH: usize = 50;

/// Print the check configuration before the first cycle.
pub fn print_config_summary(config: &CheckConfig, directory: &ResolverDirectory, backend: &str) {
	println!("Nameserver Propagation Check");
	println!("============================");
	println!("Domain:         {}", config.domain);
	println!("Record type:    {}", config.record_type);
	println!("Targets:        {}", config.targets.sorted().join(", "));
	println!(
		"Resolvers:      {} primary, {} backup in {} regions",
		directory.primaries().len(),
		directory.backups().len(),
		directory.regions().len(),
	);
	println!("Backend:        {}", backend);
	println!("Timeout:        {} s", config.timeout.as_secs_f64());
	if config.is_repeating() {
		println!("Interval:       {} s", config.interval.as_secs());
	} else {
		println!("Interval:       single check");
	}
	if let Some(seed) = config.seed {
		println!("Seed:           {}", seed);
	}
	println!();
}

/// Clear the terminal so each cycle redraws in place.
pub fn clear_screen() {
	let mut stdout = std::io::stdout();
	if stdout.is_terminal() {
		let _ = write!(stdout, "\x1B[2J\x1B[H");
		let _ = stdout.flush();
	}
}

fn status_color(status: Status) -> Color {
	match status {
		Status::Error => Color::Red,
		Status::NoData => Color::Yellow,
		Status::Matched => Color::Green,
		Status::Stale => Color::Magenta,
	}
}

/// One line per answer; target values in green, everything else dimmed.
fn answer_lines(result: &QueryResult, status: Status, targets: &TargetSet) -> String {
	match status {
		Status::Error => format!(
			"Error: {}",
			result.error.as_deref().unwrap_or("unknown error"),
		).bright_black().to_string(),
		Status::NoData => "No records returned".bright_black().to_string(),
		Status::Matched | Status::Stale => result.answers.iter()
			.map(|answer| if targets.contains(answer) {
				answer.green().to_string()
			} else {
				answer.bright_black().to_string()
			})
			.collect::<Vec<_>>()
			.join("\n"),
	}
}

fn region_table(results: &[&QueryResult], targets: &TargetSet) -> Table {
	let mut table = Table::new();
	table.load_preset(UTF8_FULL);
	table.set_content_arrangement(ContentArrangement::Dynamic);
	table.set_header(vec!["", "Resolver", "Address", "Status", "Answers"]);

	for result in results {
		let status = classify(result, targets);
		let color = status_color(status);
		let mut name = result.resolver.name.clone();
		if result.resolver.is_backup {
			name.push_str(" [BACKUP]");
		}
		table.add_row(vec![
			Cell::new(status.glyph()).fg(color),
			Cell::new(name),
			Cell::new(result.resolver.addr.ip()),
			Cell::new(status.label()).fg(color),
			Cell::new(answer_lines(result, status, targets)),
		]);
	}
	table
}

/// Fixed-width bar, filled in proportion to `ratio`.
pub fn progress_bar(ratio: f64, width: usize) -> String {
	let filled = ((width as f64) * ratio.clamp(0.0, 1.0)) as usize;
	format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

fn summary_block(out: &mut String, summary: &PropagationSummary) {
	let pct = summary.percent();
	let _ = writeln!(out, "\n=== PROPAGATION SUMMARY ===");
	let _ = writeln!(
		out,
		"Target values detected: {}/{} servers ({:.1}%)",
		summary.matched, summary.responsive, pct,
	);
	let _ = writeln!(out, "Progress: |{}| {:.1}%", progress_bar(summary.ratio, BAR_WIDTH), pct);

	if let Some(hours) = summary.estimate() {
		let _ = writeln!(out, "Estimated completion: Approximately {} hours remaining", hours);
	} else if summary.is_complete() {
		let _ = writeln!(out, "Status: PROPAGATION COMPLETE!");
	} else {
		let _ = writeln!(out, "Status: No propagation detected yet");
	}

	if !summary.is_complete() {
		let _ = writeln!(out, "\nNOTE: DNS changes can take up to 48 hours to fully propagate worldwide.");
		let _ = writeln!(out, "      Some ISPs and DNS services cache results longer than others.");
		let _ = writeln!(out, "      Run this check periodically to track progress.");
	}
}

/// Render one cycle as a text dashboard: header, a table per region, summary.
pub fn render_dashboard(config: &CheckConfig, cycle: &CheckCycle) -> String {
	let mut out = String::new();
	let _ = writeln!(out, "\n=== NAMESERVER PROPAGATION DASHBOARD ===");
	let _ = writeln!(out, "Domain: {} ({})", config.domain, config.record_type);
	let elapsed = cycle.monitoring_for
		.map(|d| format!(" (monitoring for {} seconds)", d.as_secs()))
		.unwrap_or_default();
	let _ = writeln!(out, "Time: {}{}", cycle.timestamp.format("%Y-%m-%d %H:%M:%S"), elapsed);
	let _ = writeln!(out, "Check # {}", cycle.index);

	let mut by_region: BTreeMap<&str, Vec<&QueryResult>> = BTreeMap::new();
	for result in &cycle.results {
		by_region.entry(result.resolver.region.as_str()).or_default().push(result);
	}
	for (region, mut results) in by_region {
		results.sort_by(|a, b| a.resolver.name.cmp(&b.resolver.name));
		let _ = writeln!(out, "\n== {} ==", region);
		let _ = writeln!(out, "{}", region_table(&results, &config.targets));
	}

	summary_block(&mut out, &cycle.summary);
	out
}

/// Print a cycle's dashboard and the line telling when the next check runs.
pub fn print_cycle(config: &CheckConfig, cycle: &CheckCycle) {
	print!("{}", render_dashboard(config, cycle));
	println!(
		"\nCheck completed in {:.2} seconds ({} backup resolvers queried).",
		cycle.duration.as_secs_f64(), cycle.backup_count(),
	);

	if config.is_repeating() && !cycle.summary.is_complete() {
		if let Some(next) = next_check_at(Local::now(), config.interval) {
			println!("\nNext check at: {}", next.format("%H:%M:%S"));
		}
		println!("Press Ctrl+C to stop monitoring...");
	}
}

/// `None` when the interval runs past what chrono can represent.
fn next_check_at(now: DateTime<Local>, interval: std::time::Duration) -> Option<DateTime<Local>> {
	let interval = chrono::Duration::from_std(interval).ok()?;
	now.checked_add_signed(interval)
}

pub fn final_message(summary: &PropagationSummary) -> &'static str {
	match summary.outcome() {
		Outcome::Complete => "SUCCESS: Target values are fully propagated!",
		Outcome::Partial => "IN PROGRESS: Target values are partially propagated.",
		Outcome::NotStarted => "NOT STARTED: Target values have not propagated yet.",
	}
}

/// What to do next when propagation is not complete
pub fn final_hint(summary: &PropagationSummary) -> Option<&'static str> {
	match summary.outcome() {
		Outcome::Complete => None,
		Outcome::Partial => Some("Run this check again later to track progress."),
		Outcome::NotStarted => Some("Make sure the nameserver change was accepted by the registrar."),
	}
}

/// Print how monitoring ended and the final propagation classification.
pub fn print_final(report: &MonitorReport) {
	if report.cancelled {
		println!("\nMonitoring stopped by user.");
	}
	let summary = report.final_summary();
	println!("\n{}", final_message(&summary));
	if let Some(hint) = final_hint(&summary) {
		println!("{}", hint);
	}
}

/// Write the rows of one cycle to a CSV file.
pub fn write_csv(path: &str, cycle: &CheckCycle, targets: &TargetSet) -> Result<()> {
	let mut writer = csv::Writer::from_path(path)
		.with_context(|| format!("failed to create '{}'", path))?;

	writer.write_record([
		"cycle", "region", "resolver", "address", "backup",
		"status", "answers", "error",
	])?;

	let mut results: Vec<&QueryResult> = cycle.results.iter().collect();
	results.sort_by(|a, b| {
		(&a.resolver.region, &a.resolver.name).cmp(&(&b.resolver.region, &b.resolver.name))
	});
	for r in results {
		writer.write_record([
			cycle.index.to_string(),
			r.resolver.region.clone(),
			r.resolver.name.clone(),
			r.resolver.addr.to_string(),
			r.resolver.is_backup.to_string(),
			classify(r, targets).label().to_string(),
			r.answers.join(" "),
			r.error.clone().unwrap_or_default(),
		])?;
	}

	writer.flush()?;
	println!("\nResults written to: {}", path);
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::propagation::summarize;
	use crate::testing::resolver;
	use hickory_proto::rr::RecordType;
	use std::time::Duration;

	fn config() -> CheckConfig {
		CheckConfig {
			domain: "example.com".to_string(),
			record_type: RecordType::NS,
			targets: TargetSet::new(["ns1.cloudflare.com"]),
			interval: Duration::ZERO,
			timeout: Duration::from_secs(5),
			primary_workers: 20,
			backup_workers: 10,
			seed: None,
		}
	}

	fn cycle(config: &CheckConfig) -> CheckCycle {
		let results = vec![
			QueryResult::answered(
				resolver("Google", "8.8.8.8", "North America", false),
				vec!["ns1.cloudflare.com.".to_string()],
			),
			QueryResult::answered(
				resolver("Cloudflare", "1.1.1.1", "North America", false),
				vec!["ns1.oldhost.net.".to_string()],
			),
			QueryResult::failed(resolver("Japan DNS", "203.112.2.4", "Asia", false), "timeout"),
			QueryResult::answered(resolver("Taiwan DNS", "101.101.101.101", "Asia", true), vec![]),
		];
		let summary = summarize(&results, &config.targets);
		CheckCycle {
			index: 3,
			timestamp: Local::now(),
			results,
			summary,
			duration: Duration::from_millis(1500),
			monitoring_for: Some(Duration::from_secs(600)),
		}
	}

	#[test]
	fn test_progress_bar() {
		assert_eq!(progress_bar(0.0, 10), "░░░░░░░░░░");
		assert_eq!(progress_bar(0.5, 10), "█████░░░░░");
		assert_eq!(progress_bar(1.0, 10), "██████████");
		assert_eq!(progress_bar(0.37, BAR_WIDTH).chars().count(), BAR_WIDTH);
	}

	#[test]
	fn test_dashboard_contents() {
		let config = config();
		let text = render_dashboard(&config, &cycle(&config));
		assert!(text.contains("Domain: example.com (NS)"));
		assert!(text.contains("(monitoring for 600 seconds)"));
		assert!(text.contains("Check # 3"));
		// regions in sorted order
		let asia = text.find("== Asia ==").unwrap();
		let na = text.find("== North America ==").unwrap();
		assert!(asia < na);
		assert!(text.contains("Taiwan DNS [BACKUP]"));
		assert!(text.contains("Error: timeout"));
		assert!(text.contains("No records returned"));
		assert!(text.contains("1/3 servers (33.3%)"));
		assert!(text.contains("Approximately 12-24 hours remaining"));
		assert!(text.contains("Run this check periodically to track progress."));
	}

	#[test]
	fn test_dashboard_complete() {
		let config = config();
		let mut c = cycle(&config);
		c.results.truncate(1);
		c.summary = summarize(&c.results, &config.targets);
		c.monitoring_for = None;
		let text = render_dashboard(&config, &c);
		assert!(text.contains("PROPAGATION COMPLETE"));
		assert!(!text.contains("monitoring for"));
		assert!(!text.contains("NOTE:"));
		assert!(!text.contains("periodically"));
	}

	#[test]
	fn test_final_messages() {
		let complete = PropagationSummary { matched: 2, responsive: 2, ratio: 1.0 };
		let partial = PropagationSummary { matched: 1, responsive: 2, ratio: 0.5 };
		assert!(final_message(&complete).starts_with("SUCCESS"));
		assert!(final_message(&partial).starts_with("IN PROGRESS"));
		assert!(final_message(&PropagationSummary::default()).starts_with("NOT STARTED"));
		assert_eq!(final_hint(&complete), None);
		assert!(final_hint(&partial).unwrap().contains("again later"));
		assert!(final_hint(&PropagationSummary::default()).unwrap().contains("registrar"));
	}

	#[test]
	fn test_answers_highlighted_one_by_one() {
		let targets = TargetSet::new(["ns2.cloudflare.com"]);
		let result = QueryResult::answered(
			resolver("Quad9", "9.9.9.9", "Europe", false),
			vec!["ns1.oldhost.net.".to_string(), "ns2.cloudflare.com.".to_string()],
		);
		let status = classify(&result, &targets);
		assert_eq!(status, Status::Matched);

		let lines = answer_lines(&result, status, &targets);
		let lines: Vec<&str> = lines.lines().collect();
		assert_eq!(lines.len(), 2);
		assert_eq!(lines[0], "ns1.oldhost.net.".bright_black().to_string());
		assert_eq!(lines[1], "ns2.cloudflare.com.".green().to_string());
	}

	#[test]
	fn test_next_check_at() {
		let now = Local::now();
		let next = next_check_at(now, Duration::from_secs(90)).unwrap();
		assert_eq!((next - now).num_seconds(), 90);
		assert_eq!(next_check_at(now, Duration::from_secs(10_000_000_000_000)), None);
		assert_eq!(next_check_at(now, Duration::from_secs(u64::MAX)), None);
	}

	#[test]
	fn test_print_cycle_with_huge_interval() {
		let mut config = config();
		config.interval = Duration::from_secs(10_000_000_000_000);
		let c = cycle(&config);
		assert!(!c.summary.is_complete());
		print_cycle(&config, &c);
	}

	#[test]
	fn test_write_csv() {
		let config = config();
		let path = std::env::temp_dir()
			.join(format!("propagation-check-{}.csv", std::process::id()));
		let path = path.to_str().unwrap().to_string();
		write_csv(&path, &cycle(&config), &config.targets).unwrap();

		let content = std::fs::read_to_string(&path).unwrap();
		std::fs::remove_file(&path).unwrap();
		let lines: Vec<&str> = content.lines().collect();
		assert_eq!(lines.len(), 5);
		assert_eq!(lines[0], "cycle,region,resolver,address,backup,status,answers,error");
		assert!(lines[1].starts_with("3,Asia,Japan DNS,203.112.2.4:53,false,ERROR,,timeout"));
		assert!(content.contains("3,North America,Google,8.8.8.8:53,false,MATCHED,ns1.cloudflare.com.,"));
	}
}
