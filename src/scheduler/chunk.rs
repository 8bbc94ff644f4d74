//! Group partitioning, row-budget chunking, and conflict-free waves.
//!
//! # Ordering
//! Groups keep caller order within a size partition. A wave never holds two
//! groups that share a person, and a group is never placed ahead of an
//! earlier group it shares a person with, so every person sees its groups
//! resolved in caller order whatever the chunk size.

use std::collections::HashSet;

use crate::models::{PersonId, TourGroup};

/// Group indices partitioned by participant count.
///
/// Partitions are ordered by the first appearance of their size; indices
/// within a partition keep caller order.
pub(crate) fn partition_by_size(groups: &[TourGroup]) -> Vec<Vec<usize>> {
    let mut sizes: Vec<usize> = Vec::new();
    let mut partitions: Vec<Vec<usize>> = Vec::new();
    for (i, group) in groups.iter().enumerate() {
        match sizes.iter().position(|&s| s == group.size()) {
            Some(p) => partitions[p].push(i),
            None => {
                sizes.push(group.size());
                partitions.push(vec![i]);
            }
        }
    }
    partitions
}

/// Groups per chunk so that `groups × alternatives <= chunk_size`.
///
/// `chunk_size == 0` disables chunking. A chunk always holds at least one
/// group.
pub(crate) fn groups_per_chunk(chunk_size: usize, alternatives: usize, total: usize) -> usize {
    if chunk_size == 0 {
        return total.max(1);
    }
    (chunk_size / alternatives.max(1)).max(1)
}

/// Splits a chunk into waves of person-disjoint groups.
///
/// Each pass walks the pending groups in order. A group joins the wave
/// unless a person it touches is already claimed by an earlier pending
/// group; either way its persons become claimed for the rest of the pass.
pub(crate) fn waves(groups: &[TourGroup], chunk: &[usize]) -> Vec<Vec<usize>> {
    let mut pending: Vec<usize> = chunk.to_vec();
    let mut out = Vec::new();
    while !pending.is_empty() {
        let mut claimed: HashSet<PersonId> = HashSet::new();
        let mut wave = Vec::new();
        let mut deferred = Vec::new();
        for &g in &pending {
            let persons = &groups[g].participants;
            if persons.iter().any(|p| claimed.contains(p)) {
                deferred.push(g);
            } else {
                wave.push(g);
            }
            claimed.extend(persons.iter().copied());
        }
        out.push(wave);
        pending = deferred;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_first_appearance() {
        let groups = vec![
            TourGroup::new(1, vec![1, 2]),
            TourGroup::new(2, vec![3]),
            TourGroup::new(3, vec![4, 5]),
            TourGroup::new(4, vec![6, 7, 8]),
            TourGroup::new(5, vec![9]),
        ];
        assert_eq!(
            partition_by_size(&groups),
            vec![vec![0, 2], vec![1, 4], vec![3]]
        );
    }

    #[test]
    fn test_groups_per_chunk() {
        assert_eq!(groups_per_chunk(0, 10, 7), 7);
        assert_eq!(groups_per_chunk(100, 10, 50), 10);
        assert_eq!(groups_per_chunk(5, 10, 50), 1);
        assert_eq!(groups_per_chunk(5, 0, 50), 5);
    }

    #[test]
    fn test_waves_keep_person_order() {
        let groups = vec![
            TourGroup::new(1, vec![1, 2]),
            TourGroup::new(2, vec![2, 3]),
            TourGroup::new(3, vec![4, 5]),
            TourGroup::new(4, vec![3, 6]),
            TourGroup::new(5, vec![7, 8]),
        ];
        let w = waves(&groups, &[0, 1, 2, 3, 4]);
        // group 4 waits for group 2 (person 3) even though 3 is free in wave 0
        assert_eq!(w, vec![vec![0, 2, 4], vec![1], vec![3]]);
    }

    #[test]
    fn test_waves_disjoint() {
        let groups: Vec<_> = (0..4).map(|i| TourGroup::new(i, vec![i * 10])).collect();
        assert_eq!(waves(&groups, &[0, 1, 2, 3]), vec![vec![0, 1, 2, 3]]);
    }
}
