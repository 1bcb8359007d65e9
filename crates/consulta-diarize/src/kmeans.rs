//! Deterministic two-cluster k-means over segment feature vectors.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::features::FEATURE_DIM;

const MAX_ITERATIONS: usize = 50;

fn distance2(a: &[f64; FEATURE_DIM], b: &[f64; FEATURE_DIM]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Cluster feature rows into exactly two clusters.
///
/// Initialization is deterministic for a fixed seed: the first centroid is a
/// seeded random row, the second the row farthest from it. Fewer than two
/// rows all land in cluster 0.
pub fn cluster2(rows: &[[f64; FEATURE_DIM]], seed: u64) -> Vec<usize> {
    if rows.len() < 2 {
        return vec![0; rows.len()];
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let first = rng.gen_range(0..rows.len());
    let second = rows
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| {
            distance2(a, &rows[first])
                .partial_cmp(&distance2(b, &rows[first]))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(i, _)| i)
        .unwrap_or(0);

    let mut centroids = [rows[first], rows[second]];
    let mut assignments = vec![0usize; rows.len()];

    for _ in 0..MAX_ITERATIONS {
        let mut changed = false;
        for (i, row) in rows.iter().enumerate() {
            let cluster = if distance2(row, &centroids[0]) <= distance2(row, &centroids[1]) {
                0
            } else {
                1
            };
            if assignments[i] != cluster {
                assignments[i] = cluster;
                changed = true;
            }
        }

        for cluster in 0..2 {
            let members: Vec<&[f64; FEATURE_DIM]> = rows
                .iter()
                .zip(assignments.iter())
                .filter(|(_, a)| **a == cluster)
                .map(|(r, _)| r)
                .collect();
            if members.is_empty() {
                continue;
            }
            let mut centroid = [0f64; FEATURE_DIM];
            for member in &members {
                for (c, v) in centroid.iter_mut().zip(member.iter()) {
                    *c += v;
                }
            }
            for c in centroid.iter_mut() {
                *c /= members.len() as f64;
            }
            centroids[cluster] = centroid;
        }

        if !changed {
            break;
        }
    }

    assignments
}
