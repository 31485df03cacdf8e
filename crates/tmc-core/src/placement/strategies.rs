//! The seven cluster-selection strategies (spec.md §4.D strategy table).

use rand::rngs::SmallRng;
use rand::SeedableRng;

use super::types::{Candidate, Strategy};

/// Selects up to `replicas` clusters from `candidates` per `strategy`. All ties are
/// broken by cluster name ascending for determinism (spec.md §4.D step 5).
///
/// `candidates` must already be suitable-filtered and score-sorted by the caller;
/// this function re-sorts per strategy as needed. `rng_seed` makes `Random`
/// reproducible (spec.md §8 "Idempotence of placement").
#[must_use]
pub fn select(strategy: Strategy, candidates: &[Candidate], replicas: u32, rng_seed: u64) -> Vec<Candidate> {
    let n = replicas as usize;
    match strategy {
        Strategy::RoundRobin => {
            let mut sorted = candidates.to_vec();
            sorted.sort_by(|a, b| a.cluster.as_str().cmp(b.cluster.as_str()));
            sorted.into_iter().take(n).collect()
        }
        Strategy::LeastLoaded => {
            let mut sorted = candidates.to_vec();
            sorted.sort_by(|a, b| a.workload_count.cmp(&b.workload_count).then_with(|| a.cluster.as_str().cmp(b.cluster.as_str())));
            sorted.into_iter().take(n).collect()
        }
        Strategy::Random => {
            use rand::seq::SliceRandom;
            let mut sorted = candidates.to_vec();
            sorted.sort_by(|a, b| a.cluster.as_str().cmp(b.cluster.as_str()));
            let mut rng = SmallRng::seed_from_u64(rng_seed);
            sorted.shuffle(&mut rng);
            sorted.into_iter().take(n).collect()
        }
        Strategy::LocationAware => select_location_aware(candidates, n),
        Strategy::FairShare => {
            // Lowest average resource utilization first (spec.md §4.D/§4.E
            // `FairShare`), the same computation `quota::fair_share_cluster` uses.
            let mut sorted = candidates.to_vec();
            sorted.sort_by(|a, b| a.utilization.partial_cmp(&b.utilization).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.cluster.as_str().cmp(b.cluster.as_str())));
            sorted.into_iter().take(n).collect()
        }
        Strategy::FirstFit => candidates.iter().take(n).cloned().collect(),
        Strategy::BestFit => {
            // Minimize unused slack Σ(available−requested) (spec.md §4.D/§4.E
            // `BestFit`), the same computation `quota::best_fit_cluster` uses.
            let mut sorted = candidates.to_vec();
            sorted.sort_by(|a, b| a.slack.partial_cmp(&b.slack).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.cluster.as_str().cmp(b.cluster.as_str())));
            sorted.into_iter().take(n).collect()
        }
    }
}

/// First pass: one cluster per distinct location, ordered by load then name.
/// Second pass: cycle through locations again until `n` are selected or
/// candidates are exhausted (spec.md §4.D "`LocationAware`").
fn select_location_aware(candidates: &[Candidate], n: usize) -> Vec<Candidate> {
    use std::collections::{BTreeMap, HashSet};

    let mut by_location: BTreeMap<String, Vec<Candidate>> = BTreeMap::new();
    for c in candidates {
        by_location.entry(c.location.clone()).or_default().push(c.clone());
    }
    for bucket in by_location.values_mut() {
        bucket.sort_by(|a, b| a.workload_count.cmp(&b.workload_count).then_with(|| a.cluster.as_str().cmp(b.cluster.as_str())));
    }

    let mut selected = Vec::new();
    let mut used = HashSet::new();
    let locations: Vec<String> = by_location.keys().cloned().collect();

    // First pass: one per location.
    for loc in &locations {
        if selected.len() >= n {
            break;
        }
        if let Some(first) = by_location[loc].iter().find(|c| !used.contains(c.cluster.as_str())) {
            used.insert(first.cluster.as_str().to_string());
            selected.push(first.clone());
        }
    }

    // Second pass: cycle locations picking the next unused candidate in each
    // until n reached or all candidates exhausted.
    let mut progressed = true;
    while selected.len() < n && progressed {
        progressed = false;
        for loc in &locations {
            if selected.len() >= n {
                break;
            }
            if let Some(next) = by_location[loc].iter().find(|c| !used.contains(c.cluster.as_str())) {
                used.insert(next.cluster.as_str().to_string());
                selected.push(next.clone());
                progressed = true;
            }
        }
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ClusterName;

    fn candidate(name: &str, location: &str, workload_count: u32) -> Candidate {
        Candidate {
            cluster: ClusterName::parse(name).unwrap(),
            location: location.into(),
            workload_count,
            score: 100.0,
            details: Default::default(),
            suitable: true,
            utilization: 0.0,
            slack: 0.0,
        }
    }

    fn candidate_with(name: &str, utilization: f64, slack: f64) -> Candidate {
        Candidate { utilization, slack, ..candidate(name, "us", 0) }
    }

    #[test]
    fn round_robin_is_alphabetical() {
        let candidates = vec![candidate("c", "us", 0), candidate("a", "us", 0), candidate("b", "us", 0)];
        let chosen = select(Strategy::RoundRobin, &candidates, 2, 0);
        assert_eq!(chosen.iter().map(|c| c.cluster.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn least_loaded_breaks_ties_by_name() {
        let candidates = vec![candidate("a", "us", 5), candidate("b", "us", 2), candidate("c", "us", 2)];
        let chosen = select(Strategy::LeastLoaded, &candidates, 2, 0);
        assert_eq!(chosen.iter().map(|c| c.cluster.as_str()).collect::<Vec<_>>(), vec!["b", "c"]);
    }

    #[test]
    fn random_is_reproducible_given_same_seed() {
        let candidates = vec![candidate("a", "us", 0), candidate("b", "us", 0), candidate("c", "us", 0), candidate("d", "us", 0)];
        let first = select(Strategy::Random, &candidates, 2, 42);
        let second = select(Strategy::Random, &candidates, 2, 42);
        assert_eq!(
            first.iter().map(|c| c.cluster.as_str()).collect::<Vec<_>>(),
            second.iter().map(|c| c.cluster.as_str()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn fair_share_picks_lowest_utilization() {
        let candidates = vec![candidate_with("a", 0.8, 0.0), candidate_with("b", 0.2, 0.0), candidate_with("c", 0.5, 0.0)];
        let chosen = select(Strategy::FairShare, &candidates, 1, 0);
        assert_eq!(chosen[0].cluster.as_str(), "b");
    }

    #[test]
    fn best_fit_picks_smallest_slack() {
        let candidates = vec![candidate_with("a", 0.0, 40.0), candidate_with("b", 0.0, 5.0), candidate_with("c", 0.0, 20.0)];
        let chosen = select(Strategy::BestFit, &candidates, 1, 0);
        assert_eq!(chosen[0].cluster.as_str(), "b");
    }

    #[test]
    fn location_aware_spreads_before_doubling_up() {
        let candidates = vec![
            candidate("a1", "us", 0),
            candidate("a2", "us", 0),
            candidate("b1", "eu", 0),
        ];
        let chosen = select(Strategy::LocationAware, &candidates, 2, 0);
        let locations: Vec<&str> = chosen.iter().map(|c| c.location.as_str()).collect();
        assert!(locations.contains(&"us"));
        assert!(locations.contains(&"eu"));
    }
}
