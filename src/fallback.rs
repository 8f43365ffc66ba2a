use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info};

use crate::resolver::ResolverDirectory;
use crate::transport::{QueryResult, Resolver};

/// Regions where no primary resolver returned a non-empty answer.
///
/// Timeouts, errors and empty answers are all treated alike. Regions are
/// returned in sorted order.
pub fn unanswered_regions<'a>(
	directory: &'a ResolverDirectory,
	primary_results: &[QueryResult],
) -> Vec<&'a str> {
	let mut answered: BTreeMap<&str, bool> = BTreeMap::new();
	for result in primary_results {
		let region = directory.region_of(result.resolver.addr.ip());
		*answered.entry(region).or_insert(false) |= result.has_answers();
	}
	answered.into_iter()
		.filter(|(_, ok)| !ok)
		.map(|(region, _)| region)
		.collect()
}

/// Pick one random backup resolver for every region left unanswered.
///
/// Regions without configured backups stay unresolved for this cycle.
pub fn select_fallbacks<R: Rng + ?Sized>(
	directory: &ResolverDirectory,
	primary_results: &[QueryResult],
	rng: &mut R,
) -> Vec<Resolver> {
	let mut selected = Vec::new();
	for region in unanswered_regions(directory, primary_results) {
		let backups: Vec<&Resolver> = directory.backups_in(region).collect();
		match backups.choose(rng) {
			Some(backup) => {
				info!(region, backup = %backup.name, "primary resolvers gave no answer, trying backup");
				selected.push((*backup).clone());
			}
			None => debug!(region, "no backup resolvers configured"),
		}
	}
	selected
}
