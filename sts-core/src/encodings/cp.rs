//! Constraint programming through the MiniZinc toolchain.
//!
//! The declarative period-assignment model is a single file shipped with the
//! crate; symmetry breaking, the implied constraint and the fairness
//! objective are toggled through data flags rather than model variants. The
//! encoder only generates the data instance with the fixed pairing table,
//! and the decoder reads the JSON solution stream of
//! `minizinc --output-mode json`.

use std::fmt::Write;

use serde::Deserialize;

use crate::encodings::Approach;
use crate::encodings::Decoded;
use crate::encodings::Encoding;
use crate::encodings::EncodingFile;
use crate::encodings::SolveStatus;
use crate::encodings::VarIndex;
use crate::error::StsError;
use crate::error::StsResult;
use crate::model::ConstraintModel;
use crate::schedule::Schedule;

/// The declarative model consumed by the MiniZinc engine.
const MODEL: &str = include_str!("sts.mzn");

/// Marker printed by MiniZinc after every solution.
const SOLUTION_SEPARATOR: &str = "----------";
/// Marker printed by MiniZinc when the search completed (optimality or
/// exhaustion).
const SEARCH_COMPLETE: &str = "==========";
const UNSATISFIABLE: &str = "=====UNSATISFIABLE=====";

/// Build the MiniZinc artifact: the model file plus the generated data
/// instance.
pub fn encode(model: &ConstraintModel) -> Encoding {
    let options = model.options();
    let mut data = String::new();

    let _ = writeln!(data, "n = {};", model.num_teams());
    let _ = writeln!(data, "use_sb = {};", options.symmetry_breaking);
    let _ = writeln!(data, "use_implied = {};", options.implied_constraints);
    let _ = writeln!(data, "use_fairness = {};", options.fairness);
    push_pairing_table(&mut data, model, "home", |game| game.home);
    push_pairing_table(&mut data, model, "away", |game| game.away);

    Encoding {
        approach: Approach::Cp,
        files: vec![
            EncodingFile {
                name: String::from("sts.mzn"),
                contents: String::from(MODEL),
            },
            EncodingFile {
                name: format!("sts_{}.dzn", model.num_teams()),
                contents: data,
            },
        ],
        index: VarIndex::default(),
        num_solver_vars: 0,
    }
}

fn push_pairing_table(
    data: &mut String,
    model: &ConstraintModel,
    name: &str,
    side: impl Fn(&crate::round_robin::Match) -> u32,
) {
    let cells: Vec<String> = model
        .pairings()
        .matches()
        .map(|game| side(game).to_string())
        .collect();
    let _ = writeln!(
        data,
        "{name} = array2d(1..{}, 1..{}, [{}]);",
        model.num_weeks(),
        model.num_periods(),
        cells.join(", ")
    );
}

#[derive(Debug, Deserialize)]
struct CpSolution {
    slot: Vec<Vec<u32>>,
    flip: Option<Vec<Vec<bool>>>,
}

/// Decode the JSON solution stream. The last solution block before the final
/// separator is the best one; a trailing `==========` marks a completed
/// search.
pub fn decode(_encoding: &Encoding, model: &ConstraintModel, stdout: &str) -> StsResult<Decoded> {
    let complete = stdout.lines().any(|line| line.trim() == SEARCH_COMPLETE);
    let unsatisfiable = stdout.lines().any(|line| line.trim() == UNSATISFIABLE);

    let last_block = stdout
        .rsplit(SOLUTION_SEPARATOR)
        .skip(1)
        .find(|block| block.contains('{'));

    let Some(block) = last_block else {
        let status = if unsatisfiable {
            SolveStatus::Unsatisfiable
        } else {
            SolveStatus::Unknown
        };
        return Ok(Decoded { status, schedule: None });
    };

    let start = block.find('{').unwrap_or(0);
    let end = block
        .rfind('}')
        .ok_or_else(|| StsError::crash("unterminated solution block"))?;
    let solution: CpSolution = serde_json::from_str(&block[start..=end])?;

    let weeks = model.num_weeks() as usize;
    let periods = model.num_periods() as usize;
    if solution.slot.len() != weeks || solution.slot.iter().any(|row| row.len() != periods) {
        return Err(StsError::EncodingInconsistency(format!(
            "solution has shape {}x{}, expected {weeks}x{periods}",
            solution.slot.len(),
            solution.slot.first().map(|row| row.len()).unwrap_or(0),
        )));
    }

    let mut cells = Vec::new();
    for (week_idx, row) in solution.slot.iter().enumerate() {
        let week = week_idx as u32 + 1;
        for (slot_idx, &period) in row.iter().enumerate() {
            if period == 0 || period as usize > periods {
                return Err(StsError::EncodingInconsistency(format!(
                    "period {period} in week {week}"
                )));
            }
            let game = model.pairings().week(week)[slot_idx];
            let flipped = solution
                .flip
                .as_ref()
                .and_then(|rows| rows.get(week_idx))
                .and_then(|row| row.get(slot_idx))
                .copied()
                .unwrap_or(false);
            let (home, away) = if flipped {
                (game.away, game.home)
            } else {
                (game.home, game.away)
            };
            cells.push((week, period, home, away));
        }
    }

    let schedule = Schedule::from_cells(model.num_teams(), cells)?;
    Ok(Decoded {
        status: if complete {
            SolveStatus::Optimal
        } else {
            SolveStatus::Satisfiable
        },
        schedule: Some(schedule),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelOptions;
    use crate::round_robin::RoundRobin;
    use crate::schedule::tests::valid_six_team_schedule;

    fn model(n: u32, options: ModelOptions) -> ConstraintModel {
        ConstraintModel::new(RoundRobin::generate(n).unwrap(), options)
    }

    const SIX_TEAM_SLOTS: &str = "[[1, 2, 3], [2, 3, 1], [2, 3, 1], [1, 2, 3], [3, 2, 1]]";

    #[test]
    fn data_instance_carries_the_pairing_table_and_flags() {
        let options = ModelOptions {
            symmetry_breaking: true,
            ..ModelOptions::default()
        };
        let encoding = encode(&model(4, options));
        let data = &encoding.files[1].contents;

        assert!(data.contains("n = 4;"));
        assert!(data.contains("use_sb = true;"));
        assert!(data.contains("use_fairness = false;"));
        assert!(data.contains("home = array2d(1..3, 1..2, [1, 2, 1, 4, 1, 3]);"));
        assert!(data.contains("away = array2d(1..3, 1..2, [4, 3, 3, 2, 2, 4]);"));
    }

    #[test]
    fn model_file_is_shipped_verbatim() {
        let encoding = encode(&model(6, ModelOptions::default()));
        assert_eq!(encoding.files[0].contents, MODEL);
    }

    #[test]
    fn artifact_is_deterministic() {
        let options = ModelOptions {
            fairness: true,
            ..ModelOptions::default()
        };
        assert_eq!(encode(&model(10, options)).files, encode(&model(10, options)).files);
    }

    #[test]
    fn decodes_the_last_solution_of_a_completed_search() {
        let model = model(6, ModelOptions::default());
        let encoding = encode(&model);
        let stdout = format!(
            "{{\"slot\": [[1, 2, 3], [1, 2, 3], [1, 2, 3], [1, 2, 3], [1, 2, 3]]}}\n\
             ----------\n\
             {{\"slot\": {SIX_TEAM_SLOTS}}}\n\
             ----------\n\
             ==========\n"
        );

        let decoded = decode(&encoding, &model, &stdout).unwrap();

        assert_eq!(decoded.status, SolveStatus::Optimal);
        assert_eq!(decoded.schedule.unwrap(), valid_six_team_schedule());
    }

    #[test]
    fn an_incomplete_search_is_satisfiable_only() {
        let model = model(6, ModelOptions::default());
        let encoding = encode(&model);
        let stdout = format!("{{\"slot\": {SIX_TEAM_SLOTS}}}\n----------\n");

        let decoded = decode(&encoding, &model, &stdout).unwrap();
        assert_eq!(decoded.status, SolveStatus::Satisfiable);
        assert!(decoded.schedule.is_some());
    }

    #[test]
    fn flip_reverses_the_reported_orientation() {
        let options = ModelOptions {
            fairness: true,
            ..ModelOptions::default()
        };
        let model = model(6, options);
        let encoding = encode(&model);
        let stdout = format!(
            "{{\"slot\": {SIX_TEAM_SLOTS}, \"flip\": [[true, false, false], [false, false, false], \
             [false, false, false], [false, false, false], [false, false, false]]}}\n----------\n==========\n"
        );

        let decoded = decode(&encoding, &model, &stdout).unwrap();
        let schedule = decoded.schedule.unwrap();

        // Week 1, slot 1 is (1, 6) in the pairing table and sits in period 1.
        assert_eq!(schedule.rows()[0][0], [6, 1]);
    }

    #[test]
    fn unsatisfiable_marker_is_reported() {
        let model = model(4, ModelOptions::default());
        let encoding = encode(&model);

        let decoded = decode(&encoding, &model, "=====UNSATISFIABLE=====\n").unwrap();
        assert_eq!(decoded.status, SolveStatus::Unsatisfiable);
        assert!(decoded.schedule.is_none());
    }

    #[test]
    fn garbage_between_solutions_is_rejected() {
        let model = model(6, ModelOptions::default());
        let encoding = encode(&model);
        let stdout = "{\"slot\": [[9, 9, 9]]}\n----------\n";

        assert!(decode(&encoding, &model, stdout).is_err());
    }
}
