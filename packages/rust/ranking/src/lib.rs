//! Notebook ranking engine.
//!
//! Orders notebook references by a score combining upvotes and recency:
//! `score = ln(votes + 1) * decay(age)`, where decay is an exponential
//! half-life curve over time since the notebook last ran. The half-life is a
//! config tunable, not a fixed contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use kaggleingest_shared::{NotebookMeta, RankingConfig};

/// Age assumed for notebooks whose source reported no timestamp.
/// Old enough for maximal practical decay without zeroing the score.
const DEFAULT_AGE_DAYS: f64 = 730.0;

/// Floor for the vote component so zero-vote notebooks keep a small non-zero
/// score and equal-score ties stay stable instead of collapsing at 0.0.
const MIN_VOTE_WEIGHT: f64 = 0.05;

/// A notebook reference with its computed rank score. Immutable once scored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedNotebook {
    pub meta: NotebookMeta,
    pub score: f64,
}

/// Scores and orders notebook references, most relevant first.
#[derive(Debug, Clone)]
pub struct Ranker {
    half_life_days: f64,
}

impl Ranker {
    pub fn new(config: &RankingConfig) -> Self {
        // Guard against a nonsensical config value; a non-positive half-life
        // would make decay undefined.
        let half_life_days = if config.half_life_days > 0.0 {
            config.half_life_days
        } else {
            RankingConfig::default().half_life_days
        };
        Self { half_life_days }
    }

    /// Rank notebooks best-first.
    ///
    /// The output is a permutation of the input. The sort is stable: equal
    /// scores preserve the provider's original ordering, so identical input
    /// always yields identical output.
    pub fn rank(&self, notebooks: Vec<NotebookMeta>) -> Vec<RankedNotebook> {
        self.rank_at(notebooks, Utc::now())
    }

    /// Rank with an explicit "now", so tests are deterministic.
    pub fn rank_at(&self, notebooks: Vec<NotebookMeta>, now: DateTime<Utc>) -> Vec<RankedNotebook> {
        let mut ranked: Vec<RankedNotebook> = notebooks
            .into_iter()
            .map(|meta| {
                let score = self.score(&meta, now);
                RankedNotebook { meta, score }
            })
            .collect();

        // sort_by is stable; descending by score.
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        debug!(
            count = ranked.len(),
            top_score = ranked.first().map(|n| n.score),
            "ranked notebooks"
        );
        ranked
    }

    fn score(&self, meta: &NotebookMeta, now: DateTime<Utc>) -> f64 {
        // Upstream vote counts may be missing or negative; clamp before ln.
        let votes = meta.votes.max(0) as f64;
        let vote_weight = (votes + 1.0).ln().max(MIN_VOTE_WEIGHT);

        let age_days = match meta.last_updated {
            Some(updated) => {
                let age = now.signed_duration_since(updated);
                (age.num_seconds() as f64 / 86_400.0).max(0.0)
            }
            // Absent timestamp: treat as very old rather than erroring.
            None => DEFAULT_AGE_DAYS,
        };

        let decay = 0.5_f64.powf(age_days / self.half_life_days);
        vote_weight * decay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn meta(reference: &str, votes: i64, age_days: Option<i64>, now: DateTime<Utc>) -> NotebookMeta {
        NotebookMeta {
            reference: reference.into(),
            title: reference.into(),
            author: "tester".into(),
            votes,
            url: format!("https://www.kaggle.com/code/{reference}"),
            last_updated: age_days.map(|d| now - Duration::days(d)),
        }
    }

    fn ranker() -> Ranker {
        Ranker::new(&RankingConfig::default())
    }

    #[test]
    fn output_is_a_permutation_with_non_increasing_scores() {
        let now = Utc::now();
        let input = vec![
            meta("a/one", 3, Some(10), now),
            meta("b/two", 500, Some(400), now),
            meta("c/three", 0, None, now),
            meta("d/four", 42, Some(1), now),
        ];
        let refs: Vec<String> = input.iter().map(|m| m.reference.clone()).collect();

        let ranked = ranker().rank_at(input, now);

        assert_eq!(ranked.len(), refs.len());
        for r in &refs {
            assert!(ranked.iter().any(|n| &n.meta.reference == r));
        }
        for pair in ranked.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn higher_votes_win_at_equal_age() {
        let now = Utc::now();
        let ranked = ranker().rank_at(
            vec![meta("a/low", 2, Some(30), now), meta("b/high", 200, Some(30), now)],
            now,
        );
        assert_eq!(ranked[0].meta.reference, "b/high");
    }

    #[test]
    fn recency_outranks_stale_votes() {
        let now = Utc::now();
        // Same votes, wildly different age: the fresh one must come first.
        let ranked = ranker().rank_at(
            vec![meta("a/stale", 50, Some(1000), now), meta("b/fresh", 50, Some(2), now)],
            now,
        );
        assert_eq!(ranked[0].meta.reference, "b/fresh");
        assert!(ranked[0].score > ranked[1].score);
    }

    #[test]
    fn equal_scores_preserve_provider_order() {
        let now = Utc::now();
        let input = vec![
            meta("a/first", 7, Some(14), now),
            meta("b/second", 7, Some(14), now),
            meta("c/third", 7, Some(14), now),
        ];
        let ranked = ranker().rank_at(input, now);
        assert_eq!(ranked[0].meta.reference, "a/first");
        assert_eq!(ranked[1].meta.reference, "b/second");
        assert_eq!(ranked[2].meta.reference, "c/third");
    }

    #[test]
    fn negative_votes_clamp_to_zero_and_stay_positive() {
        let now = Utc::now();
        let ranked = ranker().rank_at(vec![meta("a/garbage", -12, Some(5), now)], now);
        assert!(ranked[0].score > 0.0);
        assert!(ranked[0].score.is_finite());
    }

    #[test]
    fn missing_timestamp_decays_maximally() {
        let now = Utc::now();
        let ranked = ranker().rank_at(
            vec![meta("a/undated", 100, None, now), meta("b/dated", 100, Some(1), now)],
            now,
        );
        assert_eq!(ranked[0].meta.reference, "b/dated");
        // Still a usable non-zero score.
        assert!(ranked[1].score > 0.0);
    }

    #[test]
    fn zero_votes_keep_small_non_zero_score() {
        let now = Utc::now();
        let ranked = ranker().rank_at(vec![meta("a/new", 0, Some(0), now)], now);
        assert!(ranked[0].score > 0.0);
    }

    #[test]
    fn example_scenario_votes_100_1_50_0_10() {
        let now = Utc::now();
        // All the same age, so ordering reduces to ln(votes + 1).
        let input = vec![
            meta("a/v100", 100, Some(7), now),
            meta("b/v1", 1, Some(7), now),
            meta("c/v50", 50, Some(7), now),
            meta("d/v0", 0, Some(7), now),
            meta("e/v10", 10, Some(7), now),
        ];
        let ranked = ranker().rank_at(input, now);
        let top3: Vec<&str> = ranked.iter().take(3).map(|n| n.meta.reference.as_str()).collect();
        assert_eq!(top3, vec!["a/v100", "c/v50", "e/v10"]);
    }

    #[test]
    fn bad_half_life_falls_back_to_default() {
        let ranker = Ranker::new(&RankingConfig { half_life_days: 0.0 });
        let now = Utc::now();
        let ranked = ranker.rank_at(vec![meta("a/nb", 5, Some(10), now)], now);
        assert!(ranked[0].score.is_finite());
    }
}
