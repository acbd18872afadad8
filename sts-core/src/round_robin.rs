//! Generation of the fixed round-robin pairing structure.
//!
//! All four paradigms share the same preprocessing step: the pairings of a
//! single round-robin tournament are fixed up front with the classical circle
//! method, and only the assignment of matches to periods (and, for the
//! fairness variants, the home/away orientation) is left to the solver.

use crate::error::StsError;
use crate::error::StsResult;

/// A single match of the tournament, bound to the week it is played in.
///
/// The orientation of the pair is the one produced by the generator; fairness
/// variants may flip it through an orientation variable at solve time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Match {
    /// Week in `[1, n - 1]`.
    pub week: u32,
    /// The team listed as playing at home, in `[1, n]`.
    pub home: u32,
    /// The team listed as playing away, in `[1, n]`.
    pub away: u32,
}

impl Match {
    /// Whether the given team is one of the two sides of this match.
    pub fn involves(&self, team: u32) -> bool {
        self.home == team || self.away == team
    }
}

/// The fixed pairing table of a round-robin tournament with `n` teams:
/// `n - 1` weeks of `n / 2` matches each.
///
/// Invariants guaranteed by construction: every unordered pair of teams meets
/// exactly once across all weeks, and every team plays exactly once per week.
/// Generation is deterministic; two calls with the same `n` produce identical
/// tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundRobin {
    n: u32,
    weeks: Vec<Vec<Match>>,
}

impl RoundRobin {
    /// Generate the pairing table for `n` teams with the circle method: team 1
    /// stays fixed while the remaining `n - 1` teams rotate one position per
    /// week, pairing opposite positions.
    ///
    /// Fails with [`StsError::InvalidInstance`] when `n` is odd or smaller
    /// than 2.
    pub fn generate(n: u32) -> StsResult<RoundRobin> {
        if n < 2 || n % 2 != 0 {
            return Err(StsError::InvalidInstance(i64::from(n)));
        }

        let teams = n as usize;
        let mut circle: Vec<u32> = (1..=n).collect();

        let weeks = (1..n)
            .map(|week| {
                let matches = (0..teams / 2)
                    .map(|position| Match {
                        week,
                        home: circle[position],
                        away: circle[teams - 1 - position],
                    })
                    .collect();

                // Team 1 stays put; the rest of the circle advances by one.
                circle[1..].rotate_right(1);

                matches
            })
            .collect();

        Ok(RoundRobin { n, weeks })
    }

    /// The number of teams.
    pub fn num_teams(&self) -> u32 {
        self.n
    }

    /// The number of weeks, `n - 1`.
    pub fn num_weeks(&self) -> u32 {
        self.n - 1
    }

    /// The number of periods per week, `n / 2`.
    pub fn num_periods(&self) -> u32 {
        self.n / 2
    }

    /// The matches of the given week (1-based), in generation order. The
    /// position of a match within this slice is its slot index used by the
    /// encoders.
    pub fn week(&self, week: u32) -> &[Match] {
        &self.weeks[week as usize - 1]
    }

    /// All weeks in order.
    pub fn weeks(&self) -> &[Vec<Match>] {
        &self.weeks
    }

    /// Iterate over all matches in `(week, slot)` order.
    pub fn matches(&self) -> impl Iterator<Item = &Match> {
        self.weeks.iter().flatten()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn rejects_odd_and_degenerate_instances() {
        for n in [0, 1, 3, 7, 15] {
            assert!(matches!(
                RoundRobin::generate(n),
                Err(StsError::InvalidInstance(_))
            ));
        }
    }

    #[test]
    fn produces_the_expected_shape() {
        for n in (4..=24).step_by(2) {
            let table = RoundRobin::generate(n).unwrap();

            assert_eq!(table.num_weeks(), n - 1);
            for week in 1..n {
                assert_eq!(table.week(week).len() as u32, n / 2);
            }
        }
    }

    #[test]
    fn every_team_plays_exactly_once_per_week() {
        for n in (4..=24).step_by(2) {
            let table = RoundRobin::generate(n).unwrap();

            for week in 1..n {
                let mut seen = HashSet::new();
                for game in table.week(week) {
                    assert_ne!(game.home, game.away);
                    assert!(seen.insert(game.home));
                    assert!(seen.insert(game.away));
                }
                assert_eq!(seen.len() as u32, n);
            }
        }
    }

    #[test]
    fn every_pair_meets_exactly_once() {
        for n in (4..=24).step_by(2) {
            let table = RoundRobin::generate(n).unwrap();

            let mut pairs = HashSet::new();
            for game in table.matches() {
                let pair = (game.home.min(game.away), game.home.max(game.away));
                assert!(pairs.insert(pair), "pair {pair:?} repeated for n = {n}");
            }
            assert_eq!(pairs.len() as u32, n * (n - 1) / 2);
        }
    }

    #[test]
    fn generation_is_deterministic() {
        for n in (4..=24).step_by(2) {
            assert_eq!(RoundRobin::generate(n).unwrap(), RoundRobin::generate(n).unwrap());
        }
    }

    #[test]
    fn small_instance_matches_the_circle_layout() {
        let table = RoundRobin::generate(4).unwrap();

        let pairs: Vec<Vec<(u32, u32)>> = table
            .weeks()
            .iter()
            .map(|week| week.iter().map(|game| (game.home, game.away)).collect())
            .collect();

        assert_eq!(
            pairs,
            vec![
                vec![(1, 4), (2, 3)],
                vec![(1, 3), (4, 2)],
                vec![(1, 2), (3, 4)],
            ]
        );
    }
}
