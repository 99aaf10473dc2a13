use crate::index::{SparseIndex, TermId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::PathBuf;

/// Cutoff used by the sparse ranker unless configured otherwise. Results
/// must score strictly above it.
pub const DEFAULT_RELEVANCE_THRESHOLD: f32 = 0.07;

/// One ranked result with the query terms that explain it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub path: PathBuf,
    pub score: f32,
    pub matched_terms: Vec<String>,
}

/// Cosine-rank every row of `index` against `query`.
///
/// The document side is the full weighted row; the query side is an
/// unweighted indicator over the distinct in-vocabulary query terms.
/// Results are sorted by descending score, ties kept in row order, and
/// truncated to `top_k` when given.
pub fn search_sparse(index: &SparseIndex, query: &str, threshold: f32, top_k: Option<usize>) -> Vec<SearchHit> {
    let mut seen = HashSet::new();
    let q_terms: Vec<(TermId, &str)> = index
        .normalizer()
        .normalize(query)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .filter_map(|t| index.term_id(&t))
        .map(|tid| (tid, index.terms[tid as usize].as_str()))
        .collect();
    if q_terms.is_empty() {
        return Vec::new();
    }
    let q_norm = (q_terms.len() as f32).sqrt();

    let mut scored: Vec<(usize, f32)> = Vec::new();
    for (pos, weights) in index.weighted.iter().enumerate() {
        let norm = index.norms[pos];
        if norm == 0.0 {
            continue;
        }
        let dot: f32 = q_terms.iter().filter_map(|(tid, _)| weights.get(tid)).sum();
        let score = dot / (q_norm * norm);
        if score > threshold {
            scored.push((pos, score));
        }
    }
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    if let Some(k) = top_k {
        scored.truncate(k);
    }

    scored
        .into_iter()
        .map(|(pos, score)| {
            let row = &index.rows[pos];
            let weights = &index.weighted[pos];
            let matched_terms = q_terms
                .iter()
                .filter(|(tid, _)| weights.get(tid).is_some_and(|w| *w > 0.0))
                .map(|(_, t)| t.to_string())
                .collect();
            SearchHit { title: row.title.clone(), path: row.path.clone(), score, matched_terms }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn corpus() -> SparseIndex {
        let mut idx = SparseIndex::new();
        idx.add_many(vec![
            (PathBuf::from("/docs/a.txt"), "cats are small mammals".to_string()),
            (PathBuf::from("/docs/b.txt"), "dogs are loyal companions".to_string()),
        ]);
        idx
    }

    #[test]
    fn cats_finds_only_a() {
        let idx = corpus();
        let hits = search_sparse(&idx, "cats", DEFAULT_RELEVANCE_THRESHOLD, None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, Path::new("/docs/a.txt"));
        assert_eq!(hits[0].title, "a");
        assert!(hits[0].score > 0.0);
        assert_eq!(hits[0].matched_terms, vec!["cat".to_string()]);
    }

    #[test]
    fn out_of_vocabulary_query_is_empty() {
        let idx = corpus();
        assert!(search_sparse(&idx, "quantum chromodynamics", 0.0, None).is_empty());
        assert!(search_sparse(&idx, "", 0.0, None).is_empty());
    }

    #[test]
    fn empty_index_is_empty() {
        let idx = SparseIndex::new();
        assert!(search_sparse(&idx, "cats", 0.0, None).is_empty());
    }

    #[test]
    fn results_are_sorted_and_above_threshold() {
        let mut idx = SparseIndex::new();
        idx.add_many(vec![
            (PathBuf::from("/d/1.txt"), "river bank river boat".to_string()),
            (PathBuf::from("/d/2.txt"), "river".to_string()),
            (PathBuf::from("/d/3.txt"), "mountain lake forest river trail cabin".to_string()),
            (PathBuf::from("/d/4.txt"), "desert sand".to_string()),
        ]);
        let threshold = 0.1;
        let hits = search_sparse(&idx, "river boat", threshold, None);
        assert!(!hits.is_empty());
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert!(hits.iter().all(|h| h.score > threshold));
        assert!(hits.iter().all(|h| h.path != Path::new("/d/4.txt")));
    }

    #[test]
    fn top_k_truncates() {
        let mut idx = SparseIndex::new();
        idx.add_many((0..5).map(|i| (PathBuf::from(format!("/d/{i}.txt")), "shared topic".to_string())));
        let hits = search_sparse(&idx, "topic", 0.0, Some(2));
        assert_eq!(hits.len(), 2);
        // equal scores keep row order
        assert_eq!(hits[0].path, Path::new("/d/0.txt"));
        assert_eq!(hits[1].path, Path::new("/d/1.txt"));
    }
}
