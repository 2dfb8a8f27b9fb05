//! Cosine ranking with per-source coverage.
//!
//! Candidates are scored against the query vector, dropped below the
//! threshold and stably sorted by similarity (ties keep store order). The
//! selection then takes the best chunk of every distinct source first, in the
//! order those sources first appear, and backfills remaining slots from the
//! leftover chunks in similarity order.

use crate::models::ChunkRecord;
use std::collections::HashSet;

/// Added to the norm product so near-zero vectors do not divide by zero.
pub const SIMILARITY_EPSILON: f64 = 1e-10;

/// Returns `None` when the vectors are empty or differ in length.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    Some(dot / (norm_a.sqrt() * norm_b.sqrt() + SIMILARITY_EPSILON))
}

#[derive(Debug, Clone, Copy)]
pub struct ScoredRecord<'a> {
    pub record: &'a ChunkRecord,
    pub similarity: f64,
}

/// Outcome of scoring, so callers can report dimension mismatches.
#[derive(Debug, Default)]
pub struct Ranking<'a> {
    pub ranked: Vec<ScoredRecord<'a>>,
    pub mismatched: usize,
}

/// Scores candidates, keeps those at or above `min_similarity` and sorts
/// them by similarity descending. The sort is stable.
pub fn rank<'a, I>(query: &[f32], candidates: I, min_similarity: f64) -> Ranking<'a>
where
    I: IntoIterator<Item = &'a ChunkRecord>,
{
    let mut ranking = Ranking::default();

    for record in candidates {
        match cosine_similarity(query, &record.embedding) {
            Some(similarity) if similarity >= min_similarity => {
                ranking.ranked.push(ScoredRecord { record, similarity });
            }
            Some(_) => {}
            None => ranking.mismatched += 1,
        }
    }

    ranking
        .ranked
        .sort_by(|left, right| right.similarity.total_cmp(&left.similarity));
    ranking
}

/// Picks up to `limit` entries from an already sorted list: first-seen
/// chunk of each source, then the rest by similarity.
pub fn select_with_coverage<'a>(sorted: Vec<ScoredRecord<'a>>, limit: usize) -> Vec<ScoredRecord<'a>> {
    let mut seen_sources = HashSet::new();
    let mut guaranteed = Vec::new();
    let mut remaining = Vec::new();

    for entry in sorted {
        if seen_sources.insert(entry.record.metadata.source_id) {
            guaranteed.push(entry);
        } else {
            remaining.push(entry);
        }
    }

    guaranteed
        .into_iter()
        .chain(remaining)
        .take(limit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;

    fn record(source_id: i64, chunk_index: usize, embedding: Vec<f32>) -> ChunkRecord {
        ChunkRecord {
            id: format!("ws:source-{source_id}-chunk-{chunk_index}"),
            text: format!("chunk {chunk_index} of {source_id}"),
            embedding,
            metadata: ChunkMetadata {
                source_id,
                source_name: format!("source {source_id}"),
                chunk_index,
                workspace_id: "ws".to_string(),
            },
        }
    }

    /// Unit vector at `angle` radians in the plane; similarity to [1, 0] is cos(angle).
    fn at_angle(angle: f64) -> Vec<f32> {
        vec![angle.cos() as f32, angle.sin() as f32]
    }

    fn with_similarity(similarity: f64) -> Vec<f32> {
        at_angle(similarity.acos())
    }

    #[test]
    fn identical_vectors_score_one() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v).expect("same length");
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_and_opposite_vectors() {
        let sim = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).expect("same length");
        assert!(sim.abs() < 1e-9);
        let sim = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]).expect("same length");
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_does_not_divide_by_zero() {
        let sim = cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).expect("same length");
        assert_eq!(sim, 0.0);
    }

    #[test]
    fn mismatched_or_empty_vectors_have_no_score() {
        assert!(cosine_similarity(&[1.0, 2.0], &[1.0]).is_none());
        assert!(cosine_similarity(&[], &[]).is_none());
    }

    #[test]
    fn threshold_drops_weak_matches() {
        let records = vec![record(1, 0, with_similarity(0.1)), record(2, 0, with_similarity(0.05))];
        let ranking = rank(&[1.0, 0.0], &records, 0.3);
        assert!(ranking.ranked.is_empty());
    }

    #[test]
    fn ranking_is_descending_and_stable_on_ties() {
        let records = vec![
            record(1, 0, with_similarity(0.5)),
            record(2, 0, with_similarity(0.9)),
            record(3, 0, with_similarity(0.5)),
        ];
        let ranking = rank(&[1.0, 0.0], &records, 0.0);
        let order: Vec<i64> = ranking
            .ranked
            .iter()
            .map(|entry| entry.record.metadata.source_id)
            .collect();
        assert_eq!(order, vec![2, 1, 3]);
    }

    #[test]
    fn dimension_mismatches_are_counted_not_ranked() {
        let records = vec![record(1, 0, vec![1.0, 0.0, 0.0]), record(2, 0, vec![1.0, 0.0])];
        let ranking = rank(&[1.0, 0.0], &records, 0.0);
        assert_eq!(ranking.ranked.len(), 1);
        assert_eq!(ranking.mismatched, 1);
    }

    #[test]
    fn every_source_is_represented_despite_score_skew() {
        let mut records = Vec::new();
        for index in 0..6 {
            records.push(record(1, index, with_similarity(0.99 - index as f64 * 0.001)));
        }
        for source in 2..=5 {
            records.push(record(source, 0, with_similarity(0.40 + source as f64 * 0.01)));
            records.push(record(source, 1, with_similarity(0.35)));
        }

        let ranking = rank(&[1.0, 0.0], &records, 0.3);
        let selected = select_with_coverage(ranking.ranked, 5);

        let picked: Vec<(i64, usize)> = selected
            .iter()
            .map(|entry| (entry.record.metadata.source_id, entry.record.metadata.chunk_index))
            .collect();
        assert_eq!(picked, vec![(1, 0), (5, 0), (4, 0), (3, 0), (2, 0)]);
    }

    #[test]
    fn remaining_slots_are_backfilled_by_similarity() {
        let records = vec![
            record(1, 0, with_similarity(0.95)),
            record(1, 1, with_similarity(0.90)),
            record(1, 2, with_similarity(0.85)),
            record(2, 0, with_similarity(0.50)),
        ];
        let ranking = rank(&[1.0, 0.0], &records, 0.3);
        let selected = select_with_coverage(ranking.ranked, 3);

        let picked: Vec<(i64, usize)> = selected
            .iter()
            .map(|entry| (entry.record.metadata.source_id, entry.record.metadata.chunk_index))
            .collect();
        assert_eq!(picked, vec![(1, 0), (2, 0), (1, 1)]);
    }

    #[test]
    fn limit_below_source_count_keeps_best_sources() {
        let records = vec![
            record(1, 0, with_similarity(0.6)),
            record(2, 0, with_similarity(0.9)),
            record(3, 0, with_similarity(0.7)),
        ];
        let ranking = rank(&[1.0, 0.0], &records, 0.3);
        let selected = select_with_coverage(ranking.ranked, 2);
        let sources: Vec<i64> = selected
            .iter()
            .map(|entry| entry.record.metadata.source_id)
            .collect();
        assert_eq!(sources, vec![2, 3]);
    }
}
