use std::collections::HashMap;
use std::io::Read;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use anyhow::{anyhow, bail, Context, Result};

use crate::transport::Resolver;

/// Region reported for addresses that are not in the directory
pub const UNKNOWN_REGION: &str = "Unknown";

/// Built-in primary resolvers: (region, name, IPv4 address)
const PRIMARY_RESOLVERS: &[(&str, &str, [u8; 4])] = &[
	("North America", "Cloudflare", [1, 1, 1, 1]),
	("North America", "Google", [8, 8, 8, 8]),
	("North America", "OpenDNS US", [208, 67, 222, 222]),
	("North America", "Quad9", [9, 9, 9, 9]),
	("Europe", "France DNS", [212, 27, 40, 240]),
	("Europe", "Germany DNS", [194, 150, 168, 168]),
	("Europe", "UK DNS", [156, 154, 70, 1]),
	("Asia", "Singapore DNS", [202, 136, 162, 11]),
	("Asia", "Japan DNS", [203, 112, 2, 4]),
	("Asia", "Hong Kong DNS", [205, 252, 144, 228]),
	("Oceania", "Australia DNS", [61, 8, 0, 113]),
	("South America", "Brazil DNS", [200, 221, 11, 101]),
];

/// Built-in backup resolvers, tried when a region's primaries give no answer
const BACKUP_RESOLVERS: &[(&str, &str, [u8; 4])] = &[
	("North America", "Level3", [4, 2, 2, 2]),
	("North America", "Verisign", [64, 6, 64, 6]),
	("North America", "Comodo", [8, 26, 56, 26]),
	("North America", "AT&T", [68, 94, 156, 1]),
	("Europe", "Swiss DNS", [77, 109, 138, 45]),
	("Europe", "Dutch DNS", [195, 46, 39, 39]),
	("Europe", "Italy DNS", [193, 70, 152, 25]),
	("Asia", "India DNS", [210, 5, 56, 108]),
	("Asia", "Taiwan DNS", [101, 101, 101, 101]),
	("Asia", "Korea DNS", [164, 124, 101, 2]),
	("Oceania", "NZ DNS", [219, 88, 200, 63]),
	("Oceania", "AU Telstra", [61, 9, 133, 1]),
	("South America", "Argentina DNS", [200, 69, 193, 1]),
	("South America", "Colombia DNS", [200, 116, 213, 240]),
];

/// Static catalogue of resolvers grouped into regions.
///
/// Read-only once built; shared by every query worker.
#[derive(Debug, Clone)]
pub struct ResolverDirectory {
	primary: Vec<Resolver>,
	backup: Vec<Resolver>,
	regions: HashMap<IpAddr, String>,
}

impl ResolverDirectory {
	/// Build a directory, rejecting duplicate addresses and an empty primary list.
	pub fn new(resolvers: Vec<Resolver>) -> Result<Self> {
		let mut seen: HashMap<IpAddr, &str> = HashMap::new();
		for r in &resolvers {
			if let Some(other) = seen.insert(r.addr.ip(), &r.name) {
				bail!(
					"duplicate resolver address {} ({} and {})",
					r.addr.ip(), other, r.name,
				);
			}
		}
		if !resolvers.iter().any(|r| !r.is_backup) {
			bail!("resolver directory has no primary resolvers");
		}
		Ok(Self::index(resolvers))
	}

	/// The built-in worldwide catalogue.
	pub fn builtin() -> Self {
		let tier = |table: &[(&str, &str, [u8; 4])], is_backup: bool| {
			table.iter()
				.map(|(region, name, ip)| Resolver {
					name: name.to_string(),
					addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::from(*ip)), 53),
					region: region.to_string(),
					is_backup,
				})
				.collect::<Vec<_>>()
		};
		let mut resolvers = tier(PRIMARY_RESOLVERS, false);
		resolvers.extend(tier(BACKUP_RESOLVERS, true));
		Self::index(resolvers)
	}

	/// Read a directory file.
	///
	/// Each line is `tier,region,name,address` where tier is `primary` or
	/// `backup`. Blank lines and lines starting with '#' are skipped.
	pub fn from_file(path: &str) -> Result<Self> {
		let file = std::fs::File::open(path)
			.with_context(|| format!("failed to read resolver directory '{}'", path))?;
		Self::from_reader(file)
			.with_context(|| format!("invalid resolver directory '{}'", path))
	}

	pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
		let mut csv_reader = csv::ReaderBuilder::new()
			.has_headers(false)
			.comment(Some(b'#'))
			.trim(csv::Trim::All)
			.flexible(true)
			.from_reader(reader);

		let mut resolvers = Vec::new();
		for (i, record) in csv_reader.records().enumerate() {
			let record = record?;
			let line = record.position().map(|p| p.line()).unwrap_or(i as u64 + 1);
			if record.len() != 4 {
				bail!("line {}: expected 4 fields (tier,region,name,address), got {}", line, record.len());
			}
			let is_backup = match record[0].to_ascii_lowercase().as_str() {
				"primary" => false,
				"backup" => true,
				other => bail!("line {}: unknown tier '{}'", line, other),
			};
			if record[1].is_empty() || record[2].is_empty() {
				bail!("line {}: region and name must not be empty", line);
			}
			let addr = parse_address(&record[3])
				.with_context(|| format!("line {}", line))?;
			resolvers.push(Resolver {
				name: record[2].to_string(),
				addr,
				region: record[1].to_string(),
				is_backup,
			});
		}
		Self::new(resolvers)
	}

	fn index(resolvers: Vec<Resolver>) -> Self {
		let regions = resolvers.iter()
			.map(|r| (r.addr.ip(), r.region.clone()))
			.collect();
		let (backup, primary): (Vec<Resolver>, Vec<Resolver>) =
			resolvers.into_iter().partition(|r| r.is_backup);
		ResolverDirectory { primary, backup, regions }
	}

	pub fn primaries(&self) -> &[Resolver] {
		&self.primary
	}

	pub fn backups(&self) -> &[Resolver] {
		&self.backup
	}

	/// Backup resolvers configured for one region
	pub fn backups_in<'a>(&'a self, region: &'a str) -> impl Iterator<Item = &'a Resolver> + 'a {
		self.backup.iter().filter(move |r| r.region == region)
	}

	/// Region of a resolver address, or "Unknown" when it is not listed.
	pub fn region_of(&self, ip: IpAddr) -> &str {
		self.regions.get(&ip).map(String::as_str).unwrap_or(UNKNOWN_REGION)
	}

	/// Region names in sorted order
	pub fn regions(&self) -> Vec<&str> {
		let mut names: Vec<&str> = self.regions.values().map(String::as_str).collect();
		names.sort_unstable();
		names.dedup();
		names
	}
}

/// Parse a resolver address string.
///
/// Supports formats:
///   "1.1.1.1"              -- IPv4, default port 53
///   "1.1.1.1:53"           -- IPv4 with explicit port
///   "2606:4700::1111"      -- bare IPv6, default port 53
///   "[2606:4700::1111]:53" -- bracketed IPv6 with port
pub fn parse_address(input: &str) -> Result<SocketAddr> {
	let trimmed = input.trim();
	if trimmed.is_empty() {
		return Err(anyhow!("empty resolver address"));
	}

	let addr = if trimmed.starts_with('[') {
		trimmed.parse()
			.map_err(|e| anyhow!("invalid bracketed IPv6 address '{}': {}", trimmed, e))?
	} else if trimmed.contains("::") || trimmed.matches(':').count() > 1 {
		let ip = trimmed.parse()
			.map_err(|e| anyhow!("invalid IPv6 address '{}': {}", trimmed, e))?;
		SocketAddr::new(ip, 53)
	} else if let Ok(addr) = trimmed.parse::<SocketAddr>() {
		addr
	} else {
		let ip = trimmed.parse()
			.map_err(|e| anyhow!("invalid IP address '{}': {}", trimmed, e))?;
		SocketAddr::new(ip, 53)
	};
	Ok(addr)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_ipv4_no_port() {
		let addr = parse_address("1.1.1.1").unwrap();
		assert_eq!(addr.port(), 53);
		assert_eq!(addr.ip().to_string(), "1.1.1.1");
	}

	#[test]
	fn test_ipv4_with_port() {
		let addr = parse_address("8.8.8.8:5353").unwrap();
		assert_eq!(addr.port(), 5353);
	}

	#[test]
	fn test_ipv6_bare_and_bracketed() {
		assert_eq!(parse_address("2606:4700::1111").unwrap().port(), 53);
		assert_eq!(parse_address("[2606:4700::1111]:5300").unwrap().port(), 5300);
	}

	#[test]
	fn test_invalid_address() {
		assert!(parse_address("not-an-ip").is_err());
		assert!(parse_address("  ").is_err());
	}

	#[test]
	fn test_builtin_catalogue() {
		let dir = ResolverDirectory::builtin();
		assert_eq!(dir.primaries().len(), PRIMARY_RESOLVERS.len());
		assert_eq!(dir.backups().len(), BACKUP_RESOLVERS.len());
		assert!(dir.primaries().iter().all(|r| !r.is_backup));
		assert!(dir.backups().iter().all(|r| r.is_backup));
		assert_eq!(
			dir.regions(),
			vec!["Asia", "Europe", "North America", "Oceania", "South America"],
		);
		assert_eq!(dir.backups_in("Oceania").count(), 2);
	}

	#[test]
	fn test_region_lookup() {
		let dir = ResolverDirectory::builtin();
		assert_eq!(dir.region_of("9.9.9.9".parse().unwrap()), "North America");
		// backup addresses resolve too
		assert_eq!(dir.region_of("101.101.101.101".parse().unwrap()), "Asia");
		assert_eq!(dir.region_of("192.0.2.1".parse().unwrap()), UNKNOWN_REGION);
	}

	#[test]
	fn test_from_reader() {
		let text = "\
# tier,region,name,address
primary, Lab, Local One, 127.0.0.1:5353

backup,Lab,Local Two,127.0.0.2
primary,Remote,V6,2001:db8::53
";
		let dir = ResolverDirectory::from_reader(text.as_bytes()).unwrap();
		assert_eq!(dir.primaries().len(), 2);
		assert_eq!(dir.backups().len(), 1);
		assert_eq!(dir.primaries()[0].name, "Local One");
		assert_eq!(dir.primaries()[0].addr.port(), 5353);
		assert_eq!(dir.backups_in("Lab").count(), 1);
		assert_eq!(dir.backups_in("Remote").count(), 0);
		assert_eq!(dir.region_of("2001:db8::53".parse().unwrap()), "Remote");
	}

	#[test]
	fn test_from_reader_rejects_bad_tier() {
		let err = ResolverDirectory::from_reader("tertiary,Lab,X,127.0.0.1\n".as_bytes());
		assert!(err.is_err());
	}

	#[test]
	fn test_from_reader_rejects_duplicates() {
		let text = "primary,Lab,A,127.0.0.1\nbackup,Lab,B,127.0.0.1:5353\n";
		let err = ResolverDirectory::from_reader(text.as_bytes()).unwrap_err();
		assert!(err.to_string().contains("duplicate"));
	}

	#[test]
	fn test_from_reader_requires_primary() {
		let text = "backup,Lab,A,127.0.0.1\n";
		assert!(ResolverDirectory::from_reader(text.as_bytes()).is_err());
	}
}
