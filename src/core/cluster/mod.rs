//! # Cluster Module
//!
//! Groups items into clusters of likely duplicates.
//!
//! ## How It Works
//! 1. Every id starts in its own set (union-find)
//! 2. Pairs are ranked by similarity (descending, ties by pair key)
//! 3. A pair is unioned if it meets the threshold **or** its rank is
//!    inside the top-K. The top-K pairs are always merged so a run with
//!    nothing above the bar still surfaces its best candidates.
//! 4. Sets become clusters; singletons are dropped unless requested
//! 5. The representative is the member with the highest total similarity
//!    to the rest of its cluster (ties go to the smallest id)
//!
//! If A matches B and B matches C, then {A, B, C} is one cluster even if
//! A and C were never compared above the threshold.

mod union_find;

pub use union_find::UnionFind;

use crate::core::comparator::{rank_order, SimilarityPair};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use xxhash_rust::xxh3::xxh3_64;

/// Default similarity threshold (percent)
pub const DEFAULT_THRESHOLD: u8 = 70;
/// Default number of top-ranked pairs that are always merged
pub const DEFAULT_TOP_PAIRS: usize = 100;
/// Length of the hex cluster identifier
pub const CLUSTER_ID_LEN: usize = 12;

/// Clustering parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterOptions {
    /// Pairs at or above this similarity are merged
    pub threshold: u8,
    /// Pairs ranked below this index are merged regardless of threshold
    pub top_pairs: usize,
    /// Keep single-item clusters
    pub include_singles: bool,
}

impl ClusterOptions {
    pub fn new() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            top_pairs: DEFAULT_TOP_PAIRS,
            include_singles: false,
        }
    }

    pub fn threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold.min(100);
        self
    }

    pub fn top_pairs(mut self, top_pairs: usize) -> Self {
        self.top_pairs = top_pairs;
        self
    }

    pub fn include_singles(mut self, include: bool) -> Self {
        self.include_singles = include;
        self
    }
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// A cluster of likely duplicates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub cluster_id: String,
    pub representative_id: String,
    /// Member ids, sorted
    pub members: Vec<String>,
    /// Total intra-cluster similarity per member, aligned with `members`
    pub scores: Vec<u32>,
    /// Similarity over the pairs known inside the cluster
    pub similarity: SimilarityStats,
}

impl Cluster {
    /// Number of members
    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.binary_search_by(|m| m.as_str().cmp(id)).is_ok()
    }

    /// Score of a member, if it belongs to the cluster
    pub fn score_of(&self, id: &str) -> Option<u32> {
        self.members
            .binary_search_by(|m| m.as_str().cmp(id))
            .ok()
            .map(|idx| self.scores[idx])
    }
}

/// Min/max/mean similarity of the pairs inside a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SimilarityStats {
    pub pair_count: usize,
    pub min: Option<u8>,
    pub max: Option<u8>,
    /// Mean, rounded to the nearest integer
    pub mean: Option<u8>,
}

/// Bookkeeping from one clustering pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClusterCounters {
    /// Distinct pairs whose ids are both known
    pub pairs_considered: usize,
    /// Pairs that triggered a union (threshold or top-K)
    pub pairs_merged: usize,
    /// Merged pairs that were below the threshold (top-K only)
    pub pairs_forced: usize,
    /// Pairs dropped because an id is not in the item set
    pub pairs_unknown: usize,
    /// Singleton sets left out of the result
    pub singles_excluded: usize,
}

/// Result of clustering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clustering {
    /// Clusters ordered by their smallest member id
    pub clusters: Vec<Cluster>,
    /// Known, non-self pairs after deduplication, in ranking order
    pub ranked: Vec<SimilarityPair>,
    pub counters: ClusterCounters,
}

/// Stable short identifier for a sorted member list
pub fn cluster_id(sorted_members: &[String]) -> String {
    let digest = xxh3_64(sorted_members.join("|").as_bytes());
    let mut hex = format!("{:016x}", digest);
    hex.truncate(CLUSTER_ID_LEN);
    hex
}

/// Partition `ids` into clusters using the similarity `pairs`.
///
/// Duplicate ids are collapsed. Pairs that name an id outside `ids`, or the
/// same id twice, are discarded before ranking. When a pair appears more
/// than once only the last row seen is ranked and scored.
pub fn build_clusters<S: AsRef<str>>(
    ids: &[S],
    pairs: &[SimilarityPair],
    options: &ClusterOptions,
) -> Clustering {
    let mut sorted_ids: Vec<&str> = ids.iter().map(AsRef::as_ref).collect();
    sorted_ids.sort_unstable();
    sorted_ids.dedup();

    let index: HashMap<&str, usize> = sorted_ids
        .iter()
        .enumerate()
        .map(|(i, id)| (*id, i))
        .collect();

    let mut counters = ClusterCounters::default();

    // Indices follow sorted id order, so (lesser, greater) is the canonical key
    let mut latest: HashMap<(usize, usize), &SimilarityPair> = HashMap::new();
    for pair in pairs {
        match (index.get(pair.id_a.as_str()), index.get(pair.id_b.as_str())) {
            (Some(&a), Some(&b)) if a != b => {
                latest.insert((a.min(b), a.max(b)), pair);
            }
            (Some(_), Some(_)) => {}
            _ => counters.pairs_unknown += 1,
        }
    }
    if counters.pairs_unknown > 0 {
        tracing::warn!(
            count = counters.pairs_unknown,
            "similarity pairs reference unknown items"
        );
    }

    let similarity: HashMap<(usize, usize), u8> = latest
        .iter()
        .map(|(key, pair)| (*key, pair.similarity_percent))
        .collect();
    let mut ranked: Vec<((usize, usize), &SimilarityPair)> = latest.into_iter().collect();
    ranked.sort_by(|x, y| rank_order(x.1, y.1));
    counters.pairs_considered = ranked.len();

    let mut uf = UnionFind::new(sorted_ids.len());
    for (rank, ((a, b), pair)) in ranked.iter().enumerate() {
        let above = pair.similarity_percent >= options.threshold;
        if above || rank < options.top_pairs {
            uf.union(*a, *b);
            counters.pairs_merged += 1;
            if !above {
                counters.pairs_forced += 1;
            }
        }
    }

    // Walking ids in sorted order keeps members sorted and orders groups
    // by their smallest member
    let mut group_of_root: HashMap<usize, usize> = HashMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for idx in 0..sorted_ids.len() {
        let root = uf.find(idx);
        let group = *group_of_root.entry(root).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[group].push(idx);
    }

    let mut clusters = Vec::new();
    for group in groups {
        if group.len() < 2 && !options.include_singles {
            counters.singles_excluded += 1;
            continue;
        }
        clusters.push(assemble(&group, &sorted_ids, &similarity));
    }

    tracing::debug!(
        clusters = clusters.len(),
        merged = counters.pairs_merged,
        forced = counters.pairs_forced,
        "clustering complete"
    );

    let ranked = ranked.into_iter().map(|(_, pair)| pair.clone()).collect();
    Clustering {
        clusters,
        ranked,
        counters,
    }
}

fn assemble(group: &[usize], ids: &[&str], similarity: &HashMap<(usize, usize), u8>) -> Cluster {
    let mut scores = vec![0u32; group.len()];
    let mut present: Vec<u8> = Vec::new();

    for i in 0..group.len() {
        for j in (i + 1)..group.len() {
            if let Some(&score) = similarity.get(&(group[i], group[j])) {
                scores[i] += u32::from(score);
                scores[j] += u32::from(score);
                present.push(score);
            }
        }
    }

    // Strictly greater keeps the smallest id on ties
    let mut best = 0;
    for (i, &score) in scores.iter().enumerate() {
        if score > scores[best] {
            best = i;
        }
    }

    let members: Vec<String> = group.iter().map(|&idx| ids[idx].to_string()).collect();

    Cluster {
        cluster_id: cluster_id(&members),
        representative_id: members[best].clone(),
        members,
        scores,
        similarity: stats(&present),
    }
}

fn stats(values: &[u8]) -> SimilarityStats {
    if values.is_empty() {
        return SimilarityStats::default();
    }
    let sum: u64 = values.iter().map(|&v| u64::from(v)).sum();
    SimilarityStats {
        pair_count: values.len(),
        min: values.iter().copied().min(),
        max: values.iter().copied().max(),
        mean: Some((sum as f64 / values.len() as f64).round() as u8),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn pair(a: &str, b: &str, similarity: u8) -> SimilarityPair {
        SimilarityPair::new(a, b, 0, similarity, 64)
    }

    fn options(threshold: u8, top_pairs: usize, include_singles: bool) -> ClusterOptions {
        ClusterOptions::new()
            .threshold(threshold)
            .top_pairs(top_pairs)
            .include_singles(include_singles)
    }

    #[test]
    fn connected_components_exclude_singles() {
        let ids = ["a", "b", "c", "d"];
        let pairs = vec![pair("a", "b", 80), pair("b", "c", 75)];

        let result = build_clusters(&ids, &pairs, &options(70, 0, false));

        assert_eq!(result.clusters.len(), 1);
        assert_eq!(result.clusters[0].members, vec!["a", "b", "c"]);
        assert_eq!(result.counters.singles_excluded, 1);
    }

    #[test]
    fn singles_included_when_requested() {
        let ids = ["a", "b"];
        let result = build_clusters(&ids, &[], &options(70, 0, true));

        assert_eq!(result.clusters.len(), 2);
        assert!(result.clusters.iter().all(|c| c.size() == 1));
        assert_eq!(result.clusters[0].representative_id, "a");
    }

    #[test]
    fn top_pairs_force_merge_below_threshold() {
        let ids = ["a", "b", "c", "d"];
        let pairs = vec![pair("a", "b", 40), pair("c", "d", 30)];

        let none = build_clusters(&ids, &pairs, &options(70, 0, false));
        assert!(none.clusters.is_empty());

        let forced = build_clusters(&ids, &pairs, &options(70, 1, false));
        assert_eq!(forced.clusters.len(), 1);
        assert_eq!(forced.clusters[0].members, vec!["a", "b"]);
        assert_eq!(forced.counters.pairs_forced, 1);
    }

    #[test]
    fn threshold_or_top_k_not_and() {
        // Above threshold but outside top-K still merges
        let ids = ["a", "b", "c", "d"];
        let pairs = vec![pair("a", "b", 95), pair("c", "d", 90)];
        let result = build_clusters(&ids, &pairs, &options(70, 1, false));
        assert_eq!(result.clusters.len(), 2);
        assert_eq!(result.counters.pairs_forced, 0);
    }

    #[test]
    fn representative_has_highest_total_similarity() {
        let ids = ["a", "b", "c"];
        let pairs = vec![pair("a", "b", 80), pair("b", "c", 90), pair("a", "c", 72)];

        let result = build_clusters(&ids, &pairs, &options(70, 0, false));
        let cluster = &result.clusters[0];

        // a: 152, b: 170, c: 162
        assert_eq!(cluster.representative_id, "b");
        assert_eq!(cluster.score_of("a"), Some(152));
        assert_eq!(cluster.score_of("b"), Some(170));
        assert_eq!(cluster.score_of("c"), Some(162));
        assert_eq!(cluster.similarity.min, Some(72));
        assert_eq!(cluster.similarity.max, Some(90));
        assert_eq!(cluster.similarity.mean, Some(81));
    }

    #[test]
    fn representative_ties_go_to_smallest_id() {
        let ids = ["m", "k"];
        let pairs = vec![pair("m", "k", 99)];
        let result = build_clusters(&ids, &pairs, &options(70, 0, false));
        assert_eq!(result.clusters[0].representative_id, "k");
    }

    #[test]
    fn representative_is_always_a_member() {
        let ids: Vec<String> = (0..12).map(|i| format!("id{:02}", i)).collect();
        let pairs: Vec<_> = (0..11)
            .map(|i| pair(&ids[i], &ids[i + 1], (60 + i * 3) as u8))
            .collect();

        for threshold in [0, 50, 70, 90, 100] {
            let result = build_clusters(&ids, &pairs, &options(threshold, 2, true));
            for cluster in &result.clusters {
                assert!(cluster.contains(&cluster.representative_id));
            }
        }
    }

    #[test]
    fn singles_included_partition_the_id_set() {
        let ids = ["e", "a", "d", "c", "b", "a"];
        let pairs = vec![pair("a", "c", 91), pair("d", "e", 50), pair("b", "e", 71)];

        let result = build_clusters(&ids, &pairs, &options(70, 0, true));

        let mut seen = Vec::new();
        for cluster in &result.clusters {
            seen.extend(cluster.members.iter().cloned());
        }
        let unique: HashSet<_> = seen.iter().cloned().collect();
        assert_eq!(seen.len(), unique.len(), "no id may appear twice");
        let expected: HashSet<String> = ["a", "b", "c", "d", "e"].iter().map(|s| s.to_string()).collect();
        assert_eq!(unique, expected);
    }

    #[test]
    fn raising_threshold_never_merges_more() {
        let ids: Vec<String> = (0..10).map(|i| format!("p{}", i)).collect();
        let mut pairs = Vec::new();
        for i in 0..10 {
            for j in (i + 1)..10 {
                let similarity = ((i * 7 + j * 13) % 60 + 40) as u8;
                pairs.push(pair(&ids[i], &ids[j], similarity));
            }
        }

        let mut previous: Option<Vec<Cluster>> = None;
        for threshold in (40..=100).step_by(5) {
            let current = build_clusters(&ids, &pairs, &options(threshold, 3, true)).clusters;
            if let Some(prev) = &previous {
                // Every cluster at the higher threshold fits inside one cluster at the lower one
                for cluster in &current {
                    let holder = prev
                        .iter()
                        .find(|p| p.contains(&cluster.members[0]))
                        .unwrap();
                    assert!(cluster.members.iter().all(|m| holder.contains(m)));
                    assert!(cluster.size() <= holder.size());
                }
            }
            previous = Some(current);
        }
    }

    #[test]
    fn unknown_and_self_pairs_are_ignored() {
        let ids = ["a", "b"];
        let pairs = vec![pair("a", "zzz", 100), pair("a", "a", 100), pair("a", "b", 10)];

        let result = build_clusters(&ids, &pairs, &options(70, 1, false));

        // The unknown pair does not consume the single top-K slot
        assert_eq!(result.clusters.len(), 1);
        assert_eq!(result.counters.pairs_unknown, 1);
        assert_eq!(result.counters.pairs_considered, 1);
    }

    #[test]
    fn cluster_id_is_stable_and_short() {
        let members = vec!["a".to_string(), "b".to_string()];
        let id = cluster_id(&members);
        assert_eq!(id.len(), CLUSTER_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(id, cluster_id(&members));
        assert_ne!(id, cluster_id(&["a".to_string(), "c".to_string()]));
    }

    #[test]
    fn clustering_is_deterministic_regardless_of_input_order() {
        let ids = ["c", "a", "b", "d"];
        let forward = vec![pair("a", "b", 80), pair("c", "d", 80), pair("b", "c", 60)];
        let mut reversed = forward.clone();
        reversed.reverse();

        let opts = options(70, 0, false);
        assert_eq!(
            build_clusters(&ids, &forward, &opts),
            build_clusters(&ids, &reversed, &opts)
        );
    }

    #[test]
    fn ranked_pairs_exclude_unknown_self_and_repeated_rows() {
        let ids = ["a", "b", "c"];
        let pairs = vec![
            pair("a", "ghost", 100),
            pair("a", "a", 100),
            pair("b", "c", 40),
            pair("a", "b", 50),
            pair("b", "a", 60),
        ];

        let result = build_clusters(&ids, &pairs, &options(70, 1, false));

        let keys: Vec<String> = result.ranked.iter().map(|p| p.key().to_string()).collect();
        assert_eq!(keys, vec!["a::b", "b::c"]);
        assert_eq!(result.ranked[0].similarity_percent, 60);
        assert_eq!(result.counters.pairs_considered, 2);
        assert_eq!(result.clusters[0].members, vec!["a", "b"]);
        assert_eq!(result.clusters[0].score_of("a"), Some(60));
    }
}
