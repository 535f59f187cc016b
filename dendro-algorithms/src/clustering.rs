use std::collections::VecDeque;

use dendro_core::nalgebra::{Vector2, Vector3};
use rayon::prelude::*;

use crate::spatial_index::{SpatialIndex2, SpatialIndex3};

/// Density based clustering (DBSCAN) of `positions`.
///
/// A position is a core position if at least `min_samples` positions (itself included) lie within `eps`
/// of it. Clusters grow from core positions through their neighbourhoods; positions that are reachable
/// from no core position are noise and get the label `None`.
///
/// Positions are visited in index order and neighbourhoods are sorted, so labels are numbered
/// `0, 1, ...` in the order in which clusters are first discovered and the result is fully deterministic.
pub fn dbscan(positions: &[Vector3<f64>], eps: f64, min_samples: usize) -> Vec<Option<usize>> {
    let index = SpatialIndex3::build(positions);
    let neighbourhoods = positions
        .par_iter()
        .map(|position| index.within_radius(position, eps))
        .collect::<Vec<_>>();
    expand_clusters(&neighbourhoods, min_samples)
}

/// Single-linkage clustering of 2D `positions` cut at distance `max_distance`: two positions share a
/// cluster iff they are connected by a chain of positions no farther than `max_distance` apart.
/// Every position gets a cluster, labels are numbered in order of their smallest member.
pub fn single_linkage(positions: &[Vector2<f64>], max_distance: f64) -> Vec<usize> {
    let index = SpatialIndex2::build(positions);
    let neighbourhoods = positions
        .iter()
        .map(|position| index.within_radius(position, max_distance))
        .collect::<Vec<_>>();
    expand_clusters(&neighbourhoods, 1)
        .into_iter()
        .map(|label| label.unwrap_or_default())
        .collect()
}

/// Number of members for every cluster label, indexed by label. Noise is not counted
pub fn cluster_sizes(labels: &[Option<usize>]) -> Vec<usize> {
    let mut sizes = vec![];
    for label in labels.iter().flatten() {
        if *label >= sizes.len() {
            sizes.resize(*label + 1, 0);
        }
        sizes[*label] += 1;
    }
    sizes
}

/// Indices of the members of the largest cluster. If several clusters have the maximum size, the one with
/// the smallest label wins
pub fn largest_cluster(labels: &[usize]) -> Vec<usize> {
    let sizes = cluster_sizes(&labels.iter().map(|l| Some(*l)).collect::<Vec<_>>());
    let largest = match sizes
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, usize)>, (label, &size)| match best {
            Some((_, best_size)) if best_size >= size => best,
            _ => Some((label, size)),
        }) {
        Some((label, _)) => label,
        None => return vec![],
    };
    labels
        .iter()
        .enumerate()
        .filter(|(_, label)| **label == largest)
        .map(|(index, _)| index)
        .collect()
}

fn expand_clusters(neighbourhoods: &[Vec<usize>], min_samples: usize) -> Vec<Option<usize>> {
    let is_core = |index: usize| neighbourhoods[index].len() >= min_samples;
    let mut labels = vec![None; neighbourhoods.len()];
    let mut next_label = 0;
    let mut queue = VecDeque::new();

    for seed in 0..neighbourhoods.len() {
        if labels[seed].is_some() || !is_core(seed) {
            continue;
        }
        let label = next_label;
        next_label += 1;
        labels[seed] = Some(label);
        queue.push_back(seed);

        while let Some(current) = queue.pop_front() {
            if !is_core(current) {
                continue;
            }
            for &neighbour in &neighbourhoods[current] {
                if labels[neighbour].is_none() {
                    labels[neighbour] = Some(label);
                    queue.push_back(neighbour);
                }
            }
        }
    }
    labels
}
