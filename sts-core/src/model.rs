//! The paradigm-neutral constraint model.
//!
//! The model is a pure value: the fixed pairing table plus the option flags.
//! Every constraint is stated once, as a cardinality constraint over abstract
//! boolean variables, and each paradigm encoder interprets that list in its
//! own representation. This keeps the combinatorial structure in one place
//! instead of four.

use std::time::Duration;

use crate::round_robin::RoundRobin;

/// The default wall-clock ceiling for a single run, in seconds.
pub const DEFAULT_TIME_LIMIT_SECS: u64 = 300;

/// Immutable option flags threaded through a run. Passed explicitly so that
/// runs stay reproducible and testable in isolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelOptions {
    /// Pin the week-1 match of team 1 to period 1, removing one symmetry
    /// class without losing feasibility.
    pub symmetry_breaking: bool,
    /// Emit the redundant three-consecutive-weeks strengthening constraint.
    pub implied_constraints: bool,
    /// Minimize the maximum home/away imbalance instead of stopping at the
    /// first feasible assignment.
    pub fairness: bool,
    /// Hard wall-clock ceiling for the whole run, including encoding.
    pub time_limit: Duration,
}

impl Default for ModelOptions {
    fn default() -> ModelOptions {
        ModelOptions {
            symmetry_breaking: false,
            implied_constraints: false,
            fairness: false,
            time_limit: Duration::from_secs(DEFAULT_TIME_LIMIT_SECS),
        }
    }
}

/// An abstract boolean decision variable of the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelVar {
    /// The match in the given `slot` of `week` is played in `period`.
    Assign { week: u32, slot: u32, period: u32 },
    /// The generated orientation of the match in `slot` of `week` is flipped,
    /// so the listed away team plays at home. Only present in fairness
    /// variants.
    Flip { week: u32, slot: u32 },
}

impl ModelVar {
    /// The canonical textual name of the variable, shared by the SMT and MIP
    /// encoders so their decoders can use one reverse index format.
    pub fn name(&self) -> String {
        match *self {
            ModelVar::Assign { week, slot, period } => format!("x_w{week}_s{slot}_p{period}"),
            ModelVar::Flip { week, slot } => format!("o_w{week}_s{slot}"),
        }
    }
}

/// A literal over a [`ModelVar`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoolLit {
    pub var: ModelVar,
    pub positive: bool,
}

impl BoolLit {
    pub fn pos(var: ModelVar) -> BoolLit {
        BoolLit { var, positive: true }
    }

    pub fn neg(var: ModelVar) -> BoolLit {
        BoolLit { var, positive: false }
    }
}

/// `at_least <= sum(lits) <= at_most` over boolean literals.
///
/// The label names the constraint instance; it doubles as the row name in the
/// MIP export and makes encoder bugs traceable.
#[derive(Debug, Clone)]
pub struct Cardinality {
    pub label: String,
    pub lits: Vec<BoolLit>,
    pub at_least: u32,
    pub at_most: u32,
}

impl Cardinality {
    fn exactly(label: String, lits: Vec<BoolLit>, count: u32) -> Cardinality {
        Cardinality {
            label,
            lits,
            at_least: count,
            at_most: count,
        }
    }
}

/// The constraint model for one instance: the fixed pairings of §`round_robin`
/// plus the constraint set each encoder has to realize.
#[derive(Debug, Clone)]
pub struct ConstraintModel {
    pairings: RoundRobin,
    options: ModelOptions,
    /// Upper bound on `max_t |home_t - away_t|` for the current fairness
    /// probe, if any. Used by the paradigms without a native objective, which
    /// approach the optimum by bound search.
    fairness_bound: Option<u32>,
}

impl ConstraintModel {
    pub fn new(pairings: RoundRobin, options: ModelOptions) -> ConstraintModel {
        ConstraintModel {
            pairings,
            options,
            fairness_bound: None,
        }
    }

    /// The same model with the fairness imbalance bounded by `bound`.
    pub fn with_fairness_bound(&self, bound: u32) -> ConstraintModel {
        ConstraintModel {
            pairings: self.pairings.clone(),
            options: self.options,
            fairness_bound: Some(bound),
        }
    }

    pub fn pairings(&self) -> &RoundRobin {
        &self.pairings
    }

    pub fn options(&self) -> ModelOptions {
        self.options
    }

    pub fn fairness_bound(&self) -> Option<u32> {
        self.fairness_bound
    }

    pub fn num_teams(&self) -> u32 {
        self.pairings.num_teams()
    }

    pub fn num_weeks(&self) -> u32 {
        self.pairings.num_weeks()
    }

    pub fn num_periods(&self) -> u32 {
        self.pairings.num_periods()
    }

    /// All assignment variables in canonical `(week, slot, period)` order.
    /// Encoders register variables in exactly this order, which is what makes
    /// artifacts byte-identical across runs.
    pub fn assignment_vars(&self) -> Vec<ModelVar> {
        let mut vars = Vec::new();
        for week in 1..=self.num_weeks() {
            for slot in 1..=self.num_periods() {
                for period in 1..=self.num_periods() {
                    vars.push(ModelVar::Assign { week, slot, period });
                }
            }
        }
        vars
    }

    /// All orientation variables in canonical order. Empty for decision
    /// variants.
    pub fn orientation_vars(&self) -> Vec<ModelVar> {
        if !self.options.fairness {
            return Vec::new();
        }

        let mut vars = Vec::new();
        for week in 1..=self.num_weeks() {
            for slot in 1..=self.num_periods() {
                vars.push(ModelVar::Flip { week, slot });
            }
        }
        vars
    }

    /// The cardinality constraints over the assignment variables:
    /// the per-match and per-(week, period) bijection, the period limit, the
    /// optional three-week strengthening windows and the optional symmetry
    /// anchor.
    pub fn assignment_constraints(&self) -> Vec<Cardinality> {
        let weeks = self.num_weeks();
        let periods = self.num_periods();
        let mut constraints = Vec::new();

        // Each match is assigned exactly one period.
        for week in 1..=weeks {
            for slot in 1..=periods {
                let lits = (1..=periods)
                    .map(|period| BoolLit::pos(ModelVar::Assign { week, slot, period }))
                    .collect();
                constraints.push(Cardinality::exactly(format!("match_w{week}_s{slot}"), lits, 1));
            }
        }

        // Each (week, period) slot hosts exactly one match.
        for week in 1..=weeks {
            for period in 1..=periods {
                let lits = (1..=periods)
                    .map(|slot| BoolLit::pos(ModelVar::Assign { week, slot, period }))
                    .collect();
                constraints.push(Cardinality::exactly(format!("slot_w{week}_p{period}"), lits, 1));
            }
        }

        // Each team appears at most twice in the same period over the season.
        for team in 1..=self.num_teams() {
            for period in 1..=periods {
                constraints.push(Cardinality {
                    label: format!("period_t{team}_p{period}"),
                    lits: self.team_period_lits(team, period, 1..=weeks),
                    at_least: 0,
                    at_most: 2,
                });
            }
        }

        if self.options.implied_constraints {
            // Strengthening windows: no team sits in the same period in three
            // consecutive weeks. Implied by the period limit, but gives the
            // solvers shorter propagation chains.
            for team in 1..=self.num_teams() {
                for period in 1..=periods {
                    for week in 1..=weeks.saturating_sub(2) {
                        constraints.push(Cardinality {
                            label: format!("window_t{team}_p{period}_w{week}"),
                            lits: self.team_period_lits(team, period, week..=week + 2),
                            at_least: 0,
                            at_most: 2,
                        });
                    }
                }
            }
        }

        if self.options.symmetry_breaking {
            let slot = self
                .pairings
                .week(1)
                .iter()
                .position(|game| game.involves(1))
                .map(|position| position as u32 + 1)
                .unwrap_or(1);
            constraints.push(Cardinality::exactly(
                String::from("anchor"),
                vec![BoolLit::pos(ModelVar::Assign { week: 1, slot, period: 1 })],
                1,
            ));
        }

        constraints
    }

    /// The per-team home-count bounds realizing the current fairness bound,
    /// over the orientation variables. Empty unless a bound is set.
    ///
    /// With `g = n - 1` games per team, an imbalance of at most `d` is
    /// equivalent to a home count within `[(g - d) / 2, (g + d) / 2]` (integer
    /// division, matching the reference formulation).
    pub fn fairness_constraints(&self) -> Vec<Cardinality> {
        let Some(bound) = self.fairness_bound else {
            return Vec::new();
        };

        let games = self.num_weeks();
        let min_home = games.saturating_sub(bound) / 2;
        let max_home = (games + bound) / 2;

        (1..=self.num_teams())
            .map(|team| Cardinality {
                label: format!("home_t{team}"),
                lits: self.home_lits(team),
                at_least: min_home,
                at_most: max_home,
            })
            .collect()
    }

    /// Literals which are true exactly when `team` plays at home, one per week.
    pub fn home_lits(&self, team: u32) -> Vec<BoolLit> {
        let mut lits = Vec::new();
        for week in 1..=self.num_weeks() {
            for (position, game) in self.pairings.week(week).iter().enumerate() {
                let slot = position as u32 + 1;
                if game.home == team {
                    lits.push(BoolLit::neg(ModelVar::Flip { week, slot }));
                } else if game.away == team {
                    lits.push(BoolLit::pos(ModelVar::Flip { week, slot }));
                }
            }
        }
        lits
    }

    fn team_period_lits(
        &self,
        team: u32,
        period: u32,
        weeks: impl Iterator<Item = u32>,
    ) -> Vec<BoolLit> {
        let mut lits = Vec::new();
        for week in weeks {
            for (position, game) in self.pairings.week(week).iter().enumerate() {
                if game.involves(team) {
                    let slot = position as u32 + 1;
                    lits.push(BoolLit::pos(ModelVar::Assign { week, slot, period }));
                }
            }
        }
        lits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(n: u32, options: ModelOptions) -> ConstraintModel {
        ConstraintModel::new(RoundRobin::generate(n).unwrap(), options)
    }

    #[test]
    fn counts_assignment_constraints_for_the_plain_variant() {
        let model = model(6, ModelOptions::default());
        let constraints = model.assignment_constraints();

        // 5 weeks * 3 matches + 5 weeks * 3 periods + 6 teams * 3 periods.
        assert_eq!(constraints.len(), 15 + 15 + 18);
        assert!(constraints.iter().all(|c| !c.label.starts_with("anchor")));
    }

    #[test]
    fn symmetry_anchor_pins_the_match_of_team_one() {
        let options = ModelOptions {
            symmetry_breaking: true,
            ..ModelOptions::default()
        };
        let model = model(6, options);
        let constraints = model.assignment_constraints();

        let anchor = constraints.iter().find(|c| c.label == "anchor").unwrap();
        assert_eq!(anchor.lits.len(), 1);
        assert_eq!(
            anchor.lits[0].var,
            // Team 1 opens week 1 in the first circle slot.
            ModelVar::Assign { week: 1, slot: 1, period: 1 }
        );
        assert_eq!((anchor.at_least, anchor.at_most), (1, 1));
    }

    #[test]
    fn each_team_has_one_home_literal_per_week() {
        let options = ModelOptions {
            fairness: true,
            ..ModelOptions::default()
        };
        let model = model(8, options);

        for team in 1..=8 {
            assert_eq!(model.home_lits(team).len(), 7);
        }
    }

    #[test]
    fn fairness_bounds_follow_the_reference_rounding() {
        let options = ModelOptions {
            fairness: true,
            ..ModelOptions::default()
        };
        let model = model(6, options).with_fairness_bound(1);
        let constraints = model.fairness_constraints();

        assert_eq!(constraints.len(), 6);
        // 5 games, bound 1: between (5 - 1) / 2 = 2 and (5 + 1) / 2 = 3 home
        // games per team.
        assert!(constraints.iter().all(|c| c.at_least == 2 && c.at_most == 3));
    }

    #[test]
    fn implied_windows_cover_consecutive_weeks_only() {
        let options = ModelOptions {
            implied_constraints: true,
            ..ModelOptions::default()
        };
        let model = model(6, options);
        let windows: Vec<_> = model
            .assignment_constraints()
            .into_iter()
            .filter(|c| c.label.starts_with("window"))
            .collect();

        // 6 teams * 3 periods * 3 window starts.
        assert_eq!(windows.len(), 54);
        assert!(windows.iter().all(|c| c.lits.len() == 3 && c.at_most == 2));
    }
}
