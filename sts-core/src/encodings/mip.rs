//! Integer programming encoding in CPLEX LP format, solved with an external
//! branch-and-cut solver.
//!
//! Binary `x` variables assign matches to periods. The fairness variant adds
//! binary `y` variables linking the kept orientation to the chosen period
//! (`y <= x`), per-team home/away counters `h`/`a`, the absolute-difference
//! linearization `d >= h - a`, `d >= a - h`, and the minimax scalar `F` with
//! `F >= d` and objective `minimize F`. That block follows the reference
//! formulation exactly; equivalent-looking alternatives change the optimum.

use std::fmt::Write;

use crate::encodings::Approach;
use crate::encodings::Decoded;
use crate::encodings::Encoding;
use crate::encodings::EncodingFile;
use crate::encodings::SolveStatus;
use crate::encodings::VarIndex;
use crate::error::StsError;
use crate::error::StsResult;
use crate::model::ConstraintModel;
use crate::model::ModelVar;
use crate::schedule::Schedule;

/// Build the LP artifact for the given model.
pub fn encode(model: &ConstraintModel) -> Encoding {
    let mut index = VarIndex::default();
    for var in model.assignment_vars() {
        let _ = index.register(var);
    }

    let fairness = model.options().fairness;
    let mut out = String::new();

    let _ = writeln!(out, "\\ sts period assignment, n = {}", model.num_teams());
    out.push_str("Minimize\n");
    if fairness {
        out.push_str(" obj: F\n");
    } else {
        // Nothing to optimize; any feasible assignment is accepted.
        out.push_str(" obj: 0 x_w1_s1_p1\n");
    }

    out.push_str("Subject To\n");
    for constraint in model.assignment_constraints() {
        let terms: Vec<String> = constraint.lits.iter().map(|lit| lit.var.name()).collect();
        let sum = terms.join(" + ");

        if constraint.at_least == constraint.at_most {
            let _ = writeln!(out, " {}: {sum} = {}", constraint.label, constraint.at_least);
        } else {
            if (constraint.at_most as usize) < constraint.lits.len() {
                let _ = writeln!(out, " {}: {sum} <= {}", constraint.label, constraint.at_most);
            }
            if constraint.at_least > 0 {
                let _ = writeln!(out, " {}: {sum} >= {}", constraint.label, constraint.at_least);
            }
        }
    }

    if fairness {
        push_fairness_block(&mut out, model);
    }

    out.push_str("Binaries\n");
    for var in model.assignment_vars() {
        let _ = writeln!(out, " {}", var.name());
    }
    if fairness {
        for var in model.assignment_vars() {
            let _ = writeln!(out, " y{}", var.name().trim_start_matches('x'));
        }
    }

    if fairness {
        out.push_str("Generals\n");
        for team in 1..=model.num_teams() {
            let _ = writeln!(out, " h_t{team}\n a_t{team}\n d_t{team}");
        }
        out.push_str(" F\n");
    }
    out.push_str("End\n");

    let num_solver_vars = index.len();
    Encoding {
        approach: Approach::Mip,
        files: vec![EncodingFile {
            name: format!("sts_{}.lp", model.num_teams()),
            contents: out,
        }],
        index,
        num_solver_vars,
    }
}

fn push_fairness_block(out: &mut String, model: &ConstraintModel) {
    let periods = model.num_periods();

    // y can only pick up a period the match is actually assigned to.
    for week in 1..=model.num_weeks() {
        for slot in 1..=periods {
            for period in 1..=periods {
                let x = ModelVar::Assign { week, slot, period }.name();
                let _ = writeln!(
                    out,
                    " link_w{week}_s{slot}_p{period}: y{} - {x} <= 0",
                    x.trim_start_matches('x')
                );
            }
        }
    }

    // h counts the games a team actually plays at home: the kept orientation
    // of its listed-home matches plus the flipped orientation of its
    // listed-away matches.
    for team in 1..=model.num_teams() {
        let mut terms = format!(" home_t{team}: h_t{team}");
        for week in 1..=model.num_weeks() {
            for (position, game) in model.pairings().week(week).iter().enumerate() {
                let slot = position as u32 + 1;
                for period in 1..=periods {
                    let x = ModelVar::Assign { week, slot, period }.name();
                    let y = format!("y{}", x.trim_start_matches('x'));
                    if game.home == team {
                        let _ = write!(terms, " - {y}");
                    } else if game.away == team {
                        let _ = write!(terms, " - {x} + {y}");
                    }
                }
            }
        }
        let _ = writeln!(out, "{terms} = 0");
        let _ = writeln!(
            out,
            " games_t{team}: h_t{team} + a_t{team} = {}",
            model.num_weeks()
        );
        let _ = writeln!(out, " dpos_t{team}: d_t{team} - h_t{team} + a_t{team} >= 0");
        let _ = writeln!(out, " dneg_t{team}: d_t{team} + h_t{team} - a_t{team} >= 0");
        let _ = writeln!(out, " fmax_t{team}: F - d_t{team} >= 0");
    }
}

/// Decode a CBC solution file: a status line followed by
/// `<index> <name> <value> <reduced cost>` rows.
pub fn decode(encoding: &Encoding, model: &ConstraintModel, solution: &str) -> StsResult<Decoded> {
    let mut lines = solution.lines();
    let status_line = lines.next().unwrap_or("").trim();

    let status = if status_line.starts_with("Optimal") {
        SolveStatus::Optimal
    } else if status_line.contains("nfeasible") {
        SolveStatus::Unsatisfiable
    } else if status_line.starts_with("Stopped") {
        SolveStatus::Satisfiable
    } else {
        SolveStatus::Unknown
    };

    if status == SolveStatus::Unsatisfiable || status == SolveStatus::Unknown {
        return Ok(Decoded { status, schedule: None });
    }

    let weeks = model.num_weeks() as usize;
    let periods = model.num_periods() as usize;
    let mut assigned: Vec<Vec<Option<u32>>> = vec![vec![None; periods]; weeks];
    let mut kept: Vec<Vec<Vec<bool>>> = vec![vec![vec![false; periods]; periods]; weeks];

    for line in lines {
        let fields: Vec<&str> = line.split_whitespace().collect();
        // CBC prefixes rows of an infeasible relaxation with '**'.
        let fields: &[&str] = if fields.first() == Some(&"**") {
            &fields[1..]
        } else {
            &fields
        };
        if fields.len() < 3 {
            continue;
        }

        let name = fields[1];
        let value: f64 = fields[2]
            .parse()
            .map_err(|_| StsError::crash(format!("bad solution value in '{line}'")))?;
        let is_set = value > 0.5;

        if name.starts_with("x_") {
            let var = encoding
                .index
                .var_of_name(name)
                .ok_or_else(|| StsError::EncodingInconsistency(String::from(name)))?;
            if let (ModelVar::Assign { week, slot, period }, true) = (var, is_set) {
                let cell = &mut assigned[week as usize - 1][slot as usize - 1];
                if cell.is_some() {
                    return Err(StsError::EncodingInconsistency(String::from(name)));
                }
                *cell = Some(period);
            }
        } else if let Some(rest) = name.strip_prefix("y_") {
            let (week, slot, period) = parse_wsp(rest)
                .filter(|&(w, s, p)| {
                    w >= 1 && w as usize <= weeks && s >= 1 && s as usize <= periods && p >= 1 && p as usize <= periods
                })
                .ok_or_else(|| StsError::EncodingInconsistency(String::from(name)))?;
            if is_set {
                kept[week as usize - 1][slot as usize - 1][period as usize - 1] = true;
            }
        } else if !is_known_counter(name) {
            return Err(StsError::EncodingInconsistency(String::from(name)));
        }
    }

    if assigned.iter().flatten().all(|cell| cell.is_none()) {
        // A time-limited run can stop without an incumbent; the solution file
        // then carries no usable rows.
        return Ok(Decoded {
            status: SolveStatus::Unknown,
            schedule: None,
        });
    }

    let fairness = model.options().fairness;
    let mut cells = Vec::new();
    for (week_idx, row) in assigned.iter().enumerate() {
        let week = week_idx as u32 + 1;
        for (slot_idx, cell) in row.iter().enumerate() {
            let Some(period) = *cell else {
                // An unassigned match with a feasible status is a decoder
                // mismatch, surfaced by the schedule assembly below.
                continue;
            };
            let game = model.pairings().week(week)[slot_idx];
            let keep = !fairness || kept[week_idx][slot_idx][period as usize - 1];
            let (home, away) = if keep {
                (game.home, game.away)
            } else {
                (game.away, game.home)
            };
            cells.push((week, period, home, away));
        }
    }

    let schedule = Schedule::from_cells(model.num_teams(), cells)?;
    Ok(Decoded {
        status,
        schedule: Some(schedule),
    })
}

fn parse_wsp(rest: &str) -> Option<(u32, u32, u32)> {
    let mut parts = rest.split('_');
    let week = parts.next()?.strip_prefix('w')?.parse().ok()?;
    let slot = parts.next()?.strip_prefix('s')?.parse().ok()?;
    let period = parts.next()?.strip_prefix('p')?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((week, slot, period))
}

fn is_known_counter(name: &str) -> bool {
    name == "F" || name.starts_with("h_t") || name.starts_with("a_t") || name.starts_with("d_t")
}
