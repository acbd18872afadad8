//! Propositional encoding and DIMACS CNF export.
//!
//! One variable per `(match, period)` pair (plus one orientation variable per
//! match for fairness probes). Exactly-one constraints use an at-least-one
//! clause plus pairwise at-most-one; the wider cardinality constraints use
//! the sequential counter encoding.

use itertools::Itertools;

use crate::encodings::Approach;
use crate::encodings::Decoded;
use crate::encodings::Encoding;
use crate::encodings::EncodingFile;
use crate::encodings::SolveStatus;
use crate::encodings::VarIndex;
use crate::error::StsError;
use crate::error::StsResult;
use crate::model::BoolLit;
use crate::model::Cardinality;
use crate::model::ConstraintModel;
use crate::model::ModelVar;
use crate::schedule::Schedule;

/// Build the DIMACS CNF artifact for the given model.
pub fn encode(model: &ConstraintModel) -> Encoding {
    let mut builder = CnfBuilder::default();

    for var in model.assignment_vars() {
        let _ = builder.index.register(var);
    }
    for var in model.orientation_vars() {
        let _ = builder.index.register(var);
    }
    builder.num_vars = builder.index.len();

    for constraint in model
        .assignment_constraints()
        .iter()
        .chain(model.fairness_constraints().iter())
    {
        builder.post(constraint);
    }

    let contents = builder.to_dimacs(model);
    let num_solver_vars = builder.num_vars;

    Encoding {
        approach: Approach::Sat,
        files: vec![EncodingFile {
            name: format!("sts_{}.cnf", model.num_teams()),
            contents,
        }],
        index: builder.index,
        num_solver_vars,
    }
}

/// Decode the standard SAT-competition output (`s`/`v` lines) back into a
/// schedule through the reverse index of `encoding`.
pub fn decode(encoding: &Encoding, model: &ConstraintModel, stdout: &str) -> StsResult<Decoded> {
    let mut status = SolveStatus::Unknown;
    let mut true_vars: Vec<ModelVar> = Vec::new();

    for line in stdout.lines() {
        if let Some(claim) = line.strip_prefix("s ") {
            status = match claim.trim() {
                "SATISFIABLE" => SolveStatus::Satisfiable,
                "UNSATISFIABLE" => SolveStatus::Unsatisfiable,
                _ => SolveStatus::Unknown,
            };
        } else if let Some(values) = line.strip_prefix("v ") {
            for token in values.split_whitespace() {
                let literal: i64 = token
                    .parse()
                    .map_err(|_| StsError::crash(format!("invalid literal '{token}'")))?;
                if literal == 0 || literal < 0 {
                    continue;
                }
                if literal > encoding.num_solver_vars as i64 {
                    return Err(StsError::EncodingInconsistency(format!("{literal}")));
                }
                // Codes above the model range belong to cardinality
                // auxiliaries and carry no schedule information.
                if let Some(var) = encoding.index.var_of_code(literal as i32) {
                    true_vars.push(var);
                }
            }
        }
    }

    if status != SolveStatus::Satisfiable {
        return Ok(Decoded { status, schedule: None });
    }

    let schedule = schedule_from_true_vars(model, &true_vars)?;
    Ok(Decoded {
        status,
        schedule: Some(schedule),
    })
}

/// Shared by the SAT and SMT decoders: reconstruct the schedule matrix from
/// the set of model variables the solver set to true.
pub(crate) fn schedule_from_true_vars(
    model: &ConstraintModel,
    true_vars: &[ModelVar],
) -> StsResult<Schedule> {
    let mut flipped = vec![vec![false; model.num_periods() as usize]; model.num_weeks() as usize];
    for var in true_vars {
        if let ModelVar::Flip { week, slot } = *var {
            flipped[week as usize - 1][slot as usize - 1] = true;
        }
    }

    let cells = true_vars.iter().filter_map(|var| match *var {
        ModelVar::Assign { week, slot, period } => {
            let game = model.pairings().week(week)[slot as usize - 1];
            let (home, away) = if flipped[week as usize - 1][slot as usize - 1] {
                (game.away, game.home)
            } else {
                (game.home, game.away)
            };
            Some((week, period, home, away))
        }
        ModelVar::Flip { .. } => None,
    });

    Schedule::from_cells(model.num_teams(), cells)
}

#[derive(Debug, Default)]
struct CnfBuilder {
    index: VarIndex,
    /// Total variable count including sequential-counter auxiliaries.
    num_vars: usize,
    clauses: Vec<Vec<i32>>,
}

impl CnfBuilder {
    fn literal(&self, lit: BoolLit) -> i32 {
        // Model variables are all registered before posting starts, so the
        // lookup cannot fail.
        let code = self.index.code_of(lit.var).unwrap();
        if lit.positive {
            code
        } else {
            -code
        }
    }

    fn fresh_aux(&mut self) -> i32 {
        self.num_vars += 1;
        self.num_vars as i32
    }

    fn add_clause(&mut self, clause: Vec<i32>) {
        self.clauses.push(clause);
    }

    fn post(&mut self, constraint: &Cardinality) {
        let lits: Vec<i32> = constraint.lits.iter().map(|&l| self.literal(l)).collect();

        if constraint.at_least == 1 && constraint.at_most == 1 {
            self.exactly_one(&lits);
            return;
        }

        if (constraint.at_most as usize) < lits.len() {
            self.at_most_seq(&lits, constraint.at_most);
        }
        if constraint.at_least > 0 {
            // sum(lits) >= k  <=>  sum(!lits) <= len - k.
            let negated: Vec<i32> = lits.iter().map(|&l| -l).collect();
            self.at_most_seq(&negated, lits.len() as u32 - constraint.at_least);
        }
    }

    fn exactly_one(&mut self, lits: &[i32]) {
        self.add_clause(lits.to_vec());
        for (&a, &b) in lits.iter().tuple_combinations() {
            self.add_clause(vec![-a, -b]);
        }
    }

    /// Sequential counter encoding of `sum(lits) <= k` (Sinz 2005).
    fn at_most_seq(&mut self, lits: &[i32], k: u32) {
        let n = lits.len();
        let k = k as usize;

        if k >= n {
            return;
        }
        if k == 0 {
            for &lit in lits {
                self.add_clause(vec![-lit]);
            }
            return;
        }

        // registers[i][j] <=> at least j+1 of the first i+1 literals are true.
        let registers: Vec<Vec<i32>> = (0..n - 1)
            .map(|_| (0..k).map(|_| self.fresh_aux()).collect())
            .collect();

        self.add_clause(vec![-lits[0], registers[0][0]]);
        for j in 1..k {
            self.add_clause(vec![-registers[0][j]]);
        }

        for i in 1..n {
            self.add_clause(vec![-lits[i], -registers[i - 1][k - 1]]);
            if i == n - 1 {
                break;
            }

            self.add_clause(vec![-lits[i], registers[i][0]]);
            self.add_clause(vec![-registers[i - 1][0], registers[i][0]]);
            for j in 1..k {
                self.add_clause(vec![-lits[i], -registers[i - 1][j - 1], registers[i][j]]);
                self.add_clause(vec![-registers[i - 1][j], registers[i][j]]);
            }
        }
    }

    fn to_dimacs(&self, model: &ConstraintModel) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "c sts period assignment, n = {}\n",
            model.num_teams()
        ));
        out.push_str(&format!(
            "c sb = {}, implied = {}, fairness bound = {}\n",
            u8::from(model.options().symmetry_breaking),
            u8::from(model.options().implied_constraints),
            model
                .fairness_bound()
                .map(|b| b.to_string())
                .unwrap_or_else(|| String::from("-")),
        ));
        out.push_str(&format!("p cnf {} {}\n", self.num_vars, self.clauses.len()));
        for clause in &self.clauses {
            for literal in clause {
                out.push_str(&format!("{literal} "));
            }
            out.push_str("0\n");
        }
        out
    }
}
