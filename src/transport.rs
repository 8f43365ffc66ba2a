use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use hickory_proto::rr::RecordType;

/// A named DNS resolver in one geographic region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolver {
	pub name: String,
	pub addr: SocketAddr,
	pub region: String,
	pub is_backup: bool,
}

/// What to ask every resolver during a fan-out
#[derive(Debug, Clone)]
pub struct QueryRequest {
	pub domain: String,
	pub record_type: RecordType,
	pub timeout: Duration,
}

/// Outcome of querying one resolver once.
///
/// Failures are carried in `error` rather than returned as `Err`, so a
/// fan-out always yields one result per resolver.
#[derive(Debug, Clone)]
pub struct QueryResult {
	pub resolver: Resolver,
	pub succeeded: bool,
	pub answers: Vec<String>,
	pub error: Option<String>,
}

impl QueryResult {
	pub fn answered(resolver: Resolver, answers: Vec<String>) -> Self {
		QueryResult { resolver, succeeded: true, answers, error: None }
	}

	pub fn failed(resolver: Resolver, error: impl Into<String>) -> Self {
		QueryResult {
			resolver,
			succeeded: false,
			answers: Vec::new(),
			error: Some(error.into()),
		}
	}

	/// True when the resolver replied with at least one record
	pub fn has_answers(&self) -> bool {
		self.succeeded && !self.answers.is_empty()
	}
}

/// Values that count as "propagated" when they appear in an answer.
///
/// Members are stored normalized: lowercase, trailing dots stripped.
#[derive(Debug, Clone, Default)]
pub struct TargetSet {
	values: HashSet<String>,
}

impl TargetSet {
	pub fn new<I, S>(values: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let values = values.into_iter()
			.map(|v| normalize(v.as_ref()))
			.filter(|v| !v.is_empty())
			.collect();
		TargetSet { values }
	}

	pub fn contains(&self, answer: &str) -> bool {
		self.values.contains(&normalize(answer))
	}

	pub fn is_empty(&self) -> bool {
		self.values.is_empty()
	}

	/// Sorted for stable display
	pub fn sorted(&self) -> Vec<&str> {
		let mut values: Vec<&str> = self.values.iter().map(String::as_str).collect();
		values.sort_unstable();
		values
	}
}

/// Case-fold an answer and strip trailing dots so "NS1.Example.com." and
/// "ns1.example.com" compare equal.
pub fn normalize(value: &str) -> String {
	value.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Propagation check configuration, built once at startup
#[derive(Debug, Clone)]
pub struct CheckConfig {
	pub domain: String,
	pub record_type: RecordType,
	pub targets: TargetSet,
	/// Zero means a single check
	pub interval: Duration,
	pub timeout: Duration,
	pub primary_workers: usize,
	pub backup_workers: usize,
	pub seed: Option<u64>,
}

impl CheckConfig {
	pub fn request(&self) -> QueryRequest {
		QueryRequest {
			domain: self.domain.clone(),
			record_type: self.record_type,
			timeout: self.timeout,
		}
	}

	pub fn is_repeating(&self) -> bool {
		!self.interval.is_zero()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_normalize_strips_dot_and_case() {
		assert_eq!(normalize("NS1.Cloudflare.COM."), "ns1.cloudflare.com");
		assert_eq!(normalize("  ns2.cloudflare.com  "), "ns2.cloudflare.com");
		assert_eq!(normalize(normalize("A.B.").as_str()), "a.b");
	}

	#[test]
	fn test_target_set_contains_normalized() {
		let targets = TargetSet::new(["ns1.cloudflare.com", "NS2.cloudflare.com."]);
		assert_eq!(targets.sorted(), vec!["ns1.cloudflare.com", "ns2.cloudflare.com"]);
		assert!(targets.contains("ns1.cloudflare.com."));
		assert!(targets.contains("ns2.CLOUDFLARE.com"));
		assert!(!targets.contains("ns1.example.net."));
	}

	#[test]
	fn test_target_set_skips_blank() {
		let targets = TargetSet::new(["", "."]);
		assert!(targets.is_empty());
	}

	#[test]
	fn test_has_answers() {
		let resolver = Resolver {
			name: "Google".to_string(),
			addr: "8.8.8.8:53".parse().unwrap(),
			region: "North America".to_string(),
			is_backup: false,
		};
		assert!(!QueryResult::answered(resolver.clone(), vec![]).has_answers());
		assert!(QueryResult::answered(resolver.clone(), vec!["x.".into()]).has_answers());
		assert!(!QueryResult::failed(resolver, "timeout").has_answers());
	}
}
