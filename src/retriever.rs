//! Time-Aware Retriever (C9): wraps the vector store (C8) with
//! recency-weighted re-ranking. The same weighted-sum-of-heterogeneous-
//! signals-then-sort shape this codebase's other scoring code uses,
//! specialized to two inputs (similarity, time weight) and three
//! strategies.

use crate::config::TimeAwareSearchConfig;
use crate::vector_store::{DocumentFilters, StoredDocument, VectorStore};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Hybrid,
    FreshFirst,
    Balanced,
}

impl Strategy {
    pub fn parse(s: &str) -> Strategy {
        match s {
            "fresh_first" => Strategy::FreshFirst,
            "balanced" => Strategy::Balanced,
            _ => Strategy::Hybrid,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RankedDocument {
    pub document: StoredDocument,
    pub similarity: f32,
    pub time_weight: f32,
    pub adjusted_score: f32,
    pub is_fresh: bool,
}

const OVERFETCH_FACTOR: usize = 3;

/// `Δd ≤ 0 → 1.0`; `0 < Δd ≤ fresh_days → 1.0 − 0.3·(Δd/fresh_days)`;
/// `fresh_days < Δd ≤ 30 → 0.7 − 0.3·((Δd−fresh_days)/(30−fresh_days))`;
/// `Δd > 30 → max(0.1, 0.4·exp(−0.5·min(Δd/365, 2.0)))`.
pub fn time_weight(created_at: &str, now: DateTime<Utc>, fresh_days: i64) -> f32 {
    let Ok(timestamp) = DateTime::parse_from_rfc3339(created_at) else {
        return 0.5;
    };
    let timestamp = timestamp.with_timezone(&Utc);
    let delta_days = (now - timestamp).num_seconds() as f64 / 86_400.0;

    let weight = if delta_days <= 0.0 {
        1.0
    } else if delta_days <= fresh_days as f64 {
        1.0 - 0.3 * (delta_days / fresh_days as f64)
    } else if delta_days <= 30.0 {
        0.7 - 0.3 * ((delta_days - fresh_days as f64) / (30.0 - fresh_days as f64))
    } else {
        (0.4 * (-0.5 * (delta_days / 365.0).min(2.0)).exp()).max(0.1)
    };
    weight as f32
}

pub fn is_fresh(created_at: &str, now: DateTime<Utc>, fresh_days: i64) -> bool {
    match DateTime::parse_from_rfc3339(created_at) {
        Ok(ts) => {
            let delta_days = (now - ts.with_timezone(&Utc)).num_seconds() as f64 / 86_400.0;
            (0.0..=fresh_days as f64).contains(&delta_days)
        }
        Err(_) => false,
    }
}

pub struct TimeAwareRetriever<'a> {
    store: &'a VectorStore,
    config: TimeAwareSearchConfig,
}

impl<'a> TimeAwareRetriever<'a> {
    pub fn new(store: &'a VectorStore, config: TimeAwareSearchConfig) -> Self {
        Self { store, config }
    }

    pub async fn search(
        &self,
        query: &str,
        k: usize,
        filters: Option<&DocumentFilters>,
        strategy: Strategy,
    ) -> Vec<RankedDocument> {
        let now = Utc::now();
        let overfetch = k.saturating_mul(OVERFETCH_FACTOR).max(k);

        let scored = match self.store.similarity_search_with_score(query, overfetch, filters).await {
            Ok(results) => results,
            Err(_) => return Vec::new(),
        };

        match self.rerank(scored, now, strategy) {
            Ok(mut ranked) => {
                ranked.truncate(k);
                ranked
            }
            Err(fallback) => fallback.into_iter().take(k).collect(),
        }
    }

    fn rerank(
        &self,
        scored: Vec<(StoredDocument, f32)>,
        now: DateTime<Utc>,
        strategy: Strategy,
    ) -> Result<Vec<RankedDocument>, Vec<RankedDocument>> {
        let fresh_days = self.config.fresh_data_days;
        let fresh_boost = self.config.fresh_data_boost as f32;
        let decay = self.config.time_decay_factor as f32;

        let mut candidates: Vec<RankedDocument> = scored
            .into_iter()
            .map(|(doc, similarity)| {
                let tw = time_weight(&doc.created_at, now, fresh_days);
                let fresh = is_fresh(&doc.created_at, now, fresh_days);
                RankedDocument {
                    document: doc,
                    similarity,
                    time_weight: tw,
                    adjusted_score: similarity,
                    is_fresh: fresh,
                }
            })
            .collect();

        if !self.config.enable_time_boost {
            candidates.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
            return Ok(candidates);
        }

        match strategy {
            Strategy::Hybrid => {
                for c in candidates.iter_mut() {
                    let mut adjusted = 0.7 * c.similarity + 0.3 * c.time_weight;
                    if c.is_fresh {
                        adjusted += fresh_boost;
                    }
                    c.adjusted_score = adjusted;
                }
                candidates.sort_by(|a, b| {
                    b.adjusted_score.partial_cmp(&a.adjusted_score).unwrap_or(std::cmp::Ordering::Equal)
                });
                Ok(candidates)
            }
            Strategy::Balanced => {
                for c in candidates.iter_mut() {
                    c.adjusted_score = 0.5 * c.similarity + 0.5 * c.time_weight;
                }
                candidates.sort_by(|a, b| {
                    b.adjusted_score.partial_cmp(&a.adjusted_score).unwrap_or(std::cmp::Ordering::Equal)
                });
                Ok(candidates)
            }
            Strategy::FreshFirst => {
                let (mut fresh, mut stale): (Vec<_>, Vec<_>) =
                    candidates.into_iter().partition(|c| c.is_fresh);
                for c in fresh.iter_mut() {
                    c.adjusted_score = c.similarity + fresh_boost;
                }
                for c in stale.iter_mut() {
                    c.adjusted_score = c.similarity * (1.0 - decay) + c.time_weight * decay;
                }
                fresh.sort_by(|a, b| {
                    b.adjusted_score.partial_cmp(&a.adjusted_score).unwrap_or(std::cmp::Ordering::Equal)
                });
                stale.sort_by(|a, b| {
                    b.adjusted_score.partial_cmp(&a.adjusted_score).unwrap_or(std::cmp::Ordering::Equal)
                });
                fresh.extend(stale);
                Ok(fresh)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn days_ago(n: i64) -> String {
        (Utc::now() - chrono::Duration::days(n)).to_rfc3339()
    }

    #[test]
    fn time_weight_is_one_for_future_or_present() {
        assert_eq!(time_weight(&days_ago(0), Utc::now(), 7), 1.0);
    }

    #[test]
    fn time_weight_decreases_monotonically_with_age() {
        let now = Utc::now();
        let w1 = time_weight(&days_ago(1), now, 7);
        let w7 = time_weight(&days_ago(7), now, 7);
        let w20 = time_weight(&days_ago(20), now, 7);
        let w60 = time_weight(&days_ago(60), now, 7);
        let w400 = time_weight(&days_ago(400), now, 7);
        assert!(w1 > w7);
        assert!(w7 > w20);
        assert!(w20 > w60);
        assert!(w60 >= w400);
        assert!(w400 >= 0.1);
    }

    #[test]
    fn time_weight_missing_timestamp_is_half() {
        assert_eq!(time_weight("not-a-date", Utc::now(), 7), 0.5);
    }

    #[test]
    fn is_fresh_within_window_only() {
        let now = Utc::now();
        assert!(is_fresh(&days_ago(3), now, 7));
        assert!(!is_fresh(&days_ago(10), now, 7));
    }

    #[test]
    fn strategy_parse_defaults_to_hybrid() {
        assert_eq!(Strategy::parse("unknown"), Strategy::Hybrid);
        assert_eq!(Strategy::parse("fresh_first"), Strategy::FreshFirst);
        assert_eq!(Strategy::parse("balanced"), Strategy::Balanced);
    }
}
