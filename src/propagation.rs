use crate::transport::{QueryResult, TargetSet};

/// Display classification of one resolver's reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
	/// The query failed
	Error,
	/// Reachable, but no records returned
	NoData,
	/// At least one answer is a target value
	Matched,
	/// Answers present, none of them a target value
	Stale,
}

impl Status {
	pub fn label(self) -> &'static str {
		match self {
			Status::Error => "ERROR",
			Status::NoData => "NO DATA",
			Status::Matched => "MATCHED",
			Status::Stale => "STALE",
		}
	}

	pub fn glyph(self) -> &'static str {
		match self {
			Status::Error => "✗",
			Status::NoData => "?",
			Status::Matched => "✓",
			Status::Stale => "!",
		}
	}
}

/// Classify a result; the checks run in priority order so exactly one applies.
pub fn classify(result: &QueryResult, targets: &TargetSet) -> Status {
	if !result.succeeded {
		Status::Error
	} else if result.answers.is_empty() {
		Status::NoData
	} else if result.answers.iter().any(|a| targets.contains(a)) {
		Status::Matched
	} else {
		Status::Stale
	}
}

/// Aggregate propagation counts for one cycle
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PropagationSummary {
	pub matched: usize,
	pub responsive: usize,
	/// matched / responsive, 0 when nobody responded
	pub ratio: f64,
}

/// How far propagation got, as reported when monitoring stops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
	Complete,
	Partial,
	NotStarted,
}

impl PropagationSummary {
	pub fn percent(&self) -> f64 {
		self.ratio * 100.0
	}

	/// Every responsive resolver already serves a target value
	pub fn is_complete(&self) -> bool {
		self.responsive > 0 && self.matched == self.responsive
	}

	pub fn outcome(&self) -> Outcome {
		if self.is_complete() {
			Outcome::Complete
		} else if self.matched > 0 {
			Outcome::Partial
		} else {
			Outcome::NotStarted
		}
	}

	/// Rough remaining-time bucket, shown only while propagation is underway.
	///
	/// This is a rule of thumb about typical TTLs, not a measurement.
	pub fn estimate(&self) -> Option<&'static str> {
		let pct = self.percent();
		if pct <= 0.0 || pct >= 100.0 {
			return None;
		}
		Some(if pct < 30.0 {
			"24-48"
		} else if pct < 60.0 {
			"12-24"
		} else if pct < 90.0 {
			"4-12"
		} else {
			"1-4"
		})
	}
}

/// Count responsive and matching resolvers across primary and backup results.
pub fn summarize(results: &[QueryResult], targets: &TargetSet) -> PropagationSummary {
	let mut summary = PropagationSummary::default();
	for result in results {
		match classify(result, targets) {
			Status::Error => {}
			Status::Matched => {
				summary.responsive += 1;
				summary.matched += 1;
			}
			Status::NoData | Status::Stale => summary.responsive += 1,
		}
	}
	if summary.responsive > 0 {
		summary.ratio = summary.matched as f64 / summary.responsive as f64;
	}
	summary
}
