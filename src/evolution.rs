//! Score evolution: lazy half-life decay and reinforcement.
//!
//! A memory's stored `score` is the value it had at `last_accessed`. Nothing
//! runs in the background; every read computes the decayed value on demand, and
//! a reinforcement materializes it before adding the bonus and moving the
//! anchor to `now`.

use crate::types::Memory;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Time for an untouched score to halve
pub const DEFAULT_HALF_LIFE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Flat bonus for being returned by a search
pub const RETRIEVAL_BONUS: f64 = 0.1;

/// Extra retrieval bonus per unit of relevance
pub const RELEVANCE_BONUS: f64 = 1.0;

/// Bonus per unit of similarity for each network connection
pub const CONNECTION_BONUS: f64 = 0.05;

/// Why a memory is being reinforced
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reinforcement {
    /// Returned by a search with the given relevance
    Retrieval { relevance: f64 },
    /// Connected in the network graph; carries the summed edge similarity
    Connection { similarity: f64 },
}

/// Decay and reinforcement constants
#[derive(Debug, Clone, PartialEq)]
pub struct ScorePolicy {
    pub half_life: Duration,
    pub retrieval_bonus: f64,
    pub relevance_bonus: f64,
    pub connection_bonus: f64,
}

impl Default for ScorePolicy {
    fn default() -> Self {
        Self {
            half_life: DEFAULT_HALF_LIFE,
            retrieval_bonus: RETRIEVAL_BONUS,
            relevance_bonus: RELEVANCE_BONUS,
            connection_bonus: CONNECTION_BONUS,
        }
    }
}

impl ScorePolicy {
    /// Multiplier in (0, 1] for the elapsed time. Negative elapsed time (clock
    /// skew) does not grow the score.
    pub fn decay_factor(&self, elapsed: chrono::Duration) -> f64 {
        let secs = elapsed.num_milliseconds() as f64 / 1000.0;
        if secs <= 0.0 {
            return 1.0;
        }

        let half_life = self.half_life.as_secs_f64();
        if half_life <= 0.0 {
            return 0.0;
        }

        0.5f64.powf(secs / half_life)
    }

    /// Score of `memory` at `now` with pending decay applied
    pub fn decayed_score(&self, memory: &Memory, now: DateTime<Utc>) -> f64 {
        sanitize(memory.score) * self.decay_factor(now - memory.last_accessed)
    }

    /// Copy of `memory` whose score reflects decay up to `now`
    pub fn with_decay(&self, memory: &Memory, now: DateTime<Utc>) -> Memory {
        let mut view = memory.clone();
        view.score = self.decayed_score(memory, now);
        view
    }

    pub fn bonus(&self, reason: Reinforcement) -> f64 {
        let bonus = match reason {
            Reinforcement::Retrieval { relevance } => {
                self.retrieval_bonus + self.relevance_bonus * sanitize(relevance).min(1.0)
            }
            Reinforcement::Connection { similarity } => self.connection_bonus * sanitize(similarity),
        };
        sanitize(bonus)
    }

    /// Apply pending decay, add the bonus and re-anchor at `now`.
    ///
    /// Only retrievals count as an access.
    pub fn reinforce(&self, memory: &mut Memory, reason: Reinforcement, now: DateTime<Utc>) {
        memory.score = self.decayed_score(memory, now) + self.bonus(reason);
        if now > memory.last_accessed {
            memory.last_accessed = now;
        }
        if let Reinforcement::Retrieval { .. } = reason {
            memory.access_count = memory.access_count.saturating_add(1);
        }
    }
}

/// Clamp NaN, infinities and negatives to zero
fn sanitize(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn memory_at(score: f64, at: DateTime<Utc>) -> Memory {
        Memory {
            id: "m".to_string(),
            content: "I like tea".to_string(),
            tags: Vec::new(),
            created: at,
            last_accessed: at,
            access_count: 0,
            score,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_half_life_halves() {
        let policy = ScorePolicy::default();
        let memory = memory_at(8.0, t0());
        let later = t0() + chrono::Duration::days(7);

        assert!((policy.decayed_score(&memory, later) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_decay_is_monotonic_and_non_negative() {
        let policy = ScorePolicy::default();
        let memory = memory_at(3.0, t0());

        let mut previous = policy.decayed_score(&memory, t0());
        for hours in [1, 5, 24, 24 * 30, 24 * 365, 24 * 365 * 50] {
            let score = policy.decayed_score(&memory, t0() + chrono::Duration::hours(hours));
            assert!(score <= previous);
            assert!(score >= 0.0);
            previous = score;
        }
    }

    #[test]
    fn test_clock_skew_does_not_grow_score() {
        let policy = ScorePolicy::default();
        let memory = memory_at(2.0, t0());
        let earlier = t0() - chrono::Duration::hours(3);

        assert_eq!(policy.decayed_score(&memory, earlier), 2.0);
    }

    #[test]
    fn test_corrupt_scores_read_as_zero() {
        let policy = ScorePolicy::default();
        assert_eq!(policy.decayed_score(&memory_at(-1.0, t0()), t0()), 0.0);
        assert_eq!(policy.decayed_score(&memory_at(f64::NAN, t0()), t0()), 0.0);
    }

    #[test]
    fn test_retrieval_reinforcement() {
        let policy = ScorePolicy::default();
        let mut memory = memory_at(1.0, t0());
        let later = t0() + chrono::Duration::days(7);

        policy.reinforce(&mut memory, Reinforcement::Retrieval { relevance: 0.5 }, later);

        assert!((memory.score - (0.5 + RETRIEVAL_BONUS + 0.5 * RELEVANCE_BONUS)).abs() < 1e-9);
        assert_eq!(memory.access_count, 1);
        assert_eq!(memory.last_accessed, later);
    }

    #[test]
    fn test_connection_reinforcement_is_not_an_access() {
        let policy = ScorePolicy::default();
        let mut memory = memory_at(0.0, t0());

        policy.reinforce(&mut memory, Reinforcement::Connection { similarity: 2.0 }, t0());

        assert!((memory.score - 2.0 * CONNECTION_BONUS).abs() < 1e-9);
        assert_eq!(memory.access_count, 0);
    }
}
