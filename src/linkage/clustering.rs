// src/linkage/clustering.rs
use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Scored LinkedIn/CRM edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkEdge {
    pub linkedin_idx: usize,
    pub crm_idx: usize,
    pub probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: usize,
    pub linkedin: Vec<usize>,
    pub crm: Vec<usize>,
    /// Mean probability of the edges that linked this cluster together.
    pub score: f64,
    pub edge_count: usize,
}

impl Cluster {
    pub fn is_cross_source(&self) -> bool {
        !self.linkedin.is_empty() && !self.crm.is_empty()
    }

    /// Every LinkedIn × CRM combination inside the cluster.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.linkedin
            .iter()
            .flat_map(move |li| self.crm.iter().map(move |crm| (*li, *crm)))
    }
}

#[derive(Default)]
struct ClusterAccumulator {
    linkedin: Vec<usize>,
    crm: Vec<usize>,
    probability_sum: f64,
    edge_count: usize,
}

/// Transitive closure over edges at or above `threshold`.
///
/// Clusters are numbered by their smallest LinkedIn index, then smallest CRM index,
/// so the same edges always give the same ids.
pub fn cluster(linkedin_count: usize, crm_count: usize, edges: &[LinkEdge], threshold: f64) -> Vec<Cluster> {
    let node_count = linkedin_count + crm_count;
    let mut union_find: UnionFind<usize> = UnionFind::new(node_count);
    let linking: Vec<&LinkEdge> = edges
        .iter()
        .filter(|e| e.probability >= threshold && e.linkedin_idx < linkedin_count && e.crm_idx < crm_count)
        .collect();

    for edge in &linking {
        union_find.union(edge.linkedin_idx, linkedin_count + edge.crm_idx);
    }

    let mut groups: BTreeMap<usize, ClusterAccumulator> = BTreeMap::new();
    for edge in &linking {
        let root = union_find.find(edge.linkedin_idx);
        let group = groups.entry(root).or_default();
        group.probability_sum += edge.probability;
        group.edge_count += 1;
        if !group.linkedin.contains(&edge.linkedin_idx) {
            group.linkedin.push(edge.linkedin_idx);
        }
        if !group.crm.contains(&edge.crm_idx) {
            group.crm.push(edge.crm_idx);
        }
    }

    let mut clusters: Vec<Cluster> = groups
        .into_values()
        .map(|mut group| {
            group.linkedin.sort_unstable();
            group.crm.sort_unstable();
            Cluster {
                id: 0,
                score: group.probability_sum / group.edge_count as f64,
                edge_count: group.edge_count,
                linkedin: group.linkedin,
                crm: group.crm,
            }
        })
        .collect();
    clusters.sort_by(|a, b| a.linkedin.first().cmp(&b.linkedin.first()).then_with(|| a.crm.first().cmp(&b.crm.first())));
    for (id, cluster) in clusters.iter_mut().enumerate() {
        cluster.id = id;
    }
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(li: usize, crm: usize, probability: f64) -> LinkEdge {
        LinkEdge {
            linkedin_idx: li,
            crm_idx: crm,
            probability,
        }
    }

    #[test]
    fn test_transitive_closure() {
        // LinkedIn 0 - CRM 0 - LinkedIn 1 form one cluster through CRM 0.
        let edges = vec![edge(0, 0, 0.9), edge(1, 0, 0.7), edge(2, 1, 0.2)];
        let clusters = cluster(3, 2, &edges, 0.5);
        assert_eq!(clusters.len(), 1);
        let only = &clusters[0];
        assert_eq!(only.linkedin, vec![0, 1]);
        assert_eq!(only.crm, vec![0]);
        assert!((only.score - 0.8).abs() < 1e-9);
        assert!(only.is_cross_source());
        assert_eq!(only.pairs().collect::<Vec<_>>(), vec![(0, 0), (1, 0)]);
    }

    #[test]
    fn test_cluster_ids_are_stable() {
        let edges = vec![edge(3, 2, 0.9), edge(0, 1, 0.95), edge(1, 0, 0.6)];
        let clusters = cluster(4, 3, &edges, 0.5);
        assert_eq!(clusters.len(), 3);
        assert_eq!(clusters[0].linkedin, vec![0]);
        assert_eq!(clusters[1].linkedin, vec![1]);
        assert_eq!(clusters[2].linkedin, vec![3]);
        assert_eq!(clusters.iter().map(|c| c.id).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_nothing_above_threshold() {
        let edges = vec![edge(0, 0, 0.1)];
        assert!(cluster(1, 1, &edges, 0.5).is_empty());
    }

    #[test]
    fn test_out_of_range_edges_are_ignored() {
        let edges = vec![edge(5, 0, 0.99)];
        assert!(cluster(1, 1, &edges, 0.5).is_empty());
    }
}
