//! The canonical schedule representation and its invariant checks.

use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::error::StsError;
use crate::error::StsResult;

/// A violation of one of the tournament invariants by a decoded schedule.
///
/// Any of these indicates an encoder/decoder bug rather than a property of
/// the instance: the fixed pairing structure makes the invariants hold for
/// every correctly decoded solver assignment.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleViolation {
    #[error("expected a {expected_periods} x {expected_weeks} matrix, found {periods} x {weeks}")]
    ShapeMismatch {
        expected_periods: u32,
        expected_weeks: u32,
        periods: u32,
        weeks: u32,
    },
    #[error("team {0} is out of range in week {1}")]
    UnknownTeam(u32, u32),
    #[error("team {team} plays {count} times in week {week}")]
    WeeklyClash { team: u32, week: u32, count: u32 },
    #[error("teams {0} and {1} meet more than once")]
    RepeatedPair(u32, u32),
    #[error("team {team} appears {count} times in period {period}")]
    PeriodOverflow { team: u32, period: u32, count: u32 },
}

/// The realized `(n/2) x (n-1)` schedule matrix, indexed `[period][week]`,
/// each cell a `[home, away]` pair. This is the shape serialized into the
/// result record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schedule {
    rows: Vec<Vec<[u32; 2]>>,
}

impl Schedule {
    /// Assemble a schedule from `(week, period, home, away)` cells produced
    /// by a decoder.
    ///
    /// Fails with [`StsError::EncodingInconsistency`] when a `(period, week)`
    /// slot is filled twice or remains empty; that means the solver output
    /// and the reverse index disagree.
    pub fn from_cells(
        n: u32,
        cells: impl IntoIterator<Item = (u32, u32, u32, u32)>,
    ) -> StsResult<Schedule> {
        let weeks = (n - 1) as usize;
        let periods = (n / 2) as usize;
        let mut rows = vec![vec![None; weeks]; periods];

        for (week, period, home, away) in cells {
            if week == 0 || week as usize > weeks || period == 0 || period as usize > periods {
                return Err(StsError::EncodingInconsistency(format!(
                    "week {week}, period {period} outside the {periods}x{weeks} schedule"
                )));
            }

            let cell = &mut rows[period as usize - 1][week as usize - 1];
            if cell.is_some() {
                return Err(StsError::EncodingInconsistency(format!(
                    "two matches decoded for period {period}, week {week}"
                )));
            }
            *cell = Some([home, away]);
        }

        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(period, row)| {
                row.into_iter()
                    .enumerate()
                    .map(|(week, cell)| {
                        cell.ok_or_else(|| {
                            StsError::EncodingInconsistency(format!(
                                "no match decoded for period {}, week {}",
                                period + 1,
                                week + 1
                            ))
                        })
                    })
                    .collect::<StsResult<Vec<_>>>()
            })
            .collect::<StsResult<Vec<_>>>()?;

        Ok(Schedule { rows })
    }

    /// The number of periods (rows).
    pub fn num_periods(&self) -> u32 {
        self.rows.len() as u32
    }

    /// The number of weeks (columns).
    pub fn num_weeks(&self) -> u32 {
        self.rows.first().map(|row| row.len() as u32).unwrap_or(0)
    }

    /// The number of teams implied by the matrix shape.
    pub fn num_teams(&self) -> u32 {
        self.num_weeks() + 1
    }

    /// The rows of the matrix, one per period.
    pub fn rows(&self) -> &[Vec<[u32; 2]>] {
        &self.rows
    }

    /// Check the full tournament invariants: matrix shape, team ranges, one
    /// match per team per week, round-robin completeness and the at most two
    /// appearances per team per period.
    pub fn validate(&self, n: u32) -> Result<(), ScheduleViolation> {
        let expected_periods = n / 2;
        let expected_weeks = n - 1;

        if self.num_periods() != expected_periods
            || self.rows.iter().any(|row| row.len() as u32 != expected_weeks)
        {
            return Err(ScheduleViolation::ShapeMismatch {
                expected_periods,
                expected_weeks,
                periods: self.num_periods(),
                weeks: self.num_weeks(),
            });
        }

        // One match per team per week.
        for week in 1..=expected_weeks {
            let mut played: HashMap<u32, u32> = HashMap::new();
            for row in &self.rows {
                let [home, away] = row[week as usize - 1];
                for team in [home, away] {
                    if team == 0 || team > n {
                        return Err(ScheduleViolation::UnknownTeam(team, week));
                    }
                    *played.entry(team).or_insert(0) += 1;
                }
            }
            for (team, count) in played {
                if count != 1 {
                    return Err(ScheduleViolation::WeeklyClash { team, week, count });
                }
            }
        }

        // Round-robin completeness: every unordered pair exactly once. The
        // cell count equals the pair count, so it is enough to rule out
        // repeats.
        let mut pairs: HashMap<(u32, u32), u32> = HashMap::new();
        for row in &self.rows {
            for &[home, away] in row {
                let pair = (home.min(away), home.max(away));
                let seen = pairs.entry(pair).or_insert(0);
                *seen += 1;
                if *seen > 1 {
                    return Err(ScheduleViolation::RepeatedPair(pair.0, pair.1));
                }
            }
        }

        // Period limit.
        for (row, period) in self.rows.iter().zip(1..) {
            let mut appearances: HashMap<u32, u32> = HashMap::new();
            for &[home, away] in row {
                *appearances.entry(home).or_insert(0) += 1;
                *appearances.entry(away).or_insert(0) += 1;
            }
            for (team, count) in appearances {
                if count > 2 {
                    return Err(ScheduleViolation::PeriodOverflow { team, period, count });
                }
            }
        }

        Ok(())
    }

    /// `max_t |home_t - away_t|`, the fairness objective recomputed from the
    /// realized schedule.
    pub fn max_imbalance(&self) -> u32 {
        let mut homes: HashMap<u32, i64> = HashMap::new();
        for row in &self.rows {
            for &[home, away] in row {
                *homes.entry(home).or_insert(0) += 1;
                homes.entry(away).or_insert(0);
            }
        }

        let games = i64::from(self.num_weeks());
        homes
            .values()
            .map(|&home_count| (2 * home_count - games).unsigned_abs() as u32)
            .max()
            .unwrap_or(0)
    }
}
