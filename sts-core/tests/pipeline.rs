//! End-to-end pipeline tests with scripted solver backends.
//!
//! No external solver is involved: each backend fabricates the textual
//! output a real solver would produce for the hand-checked six team
//! instance, and the tests assert on the normalized result records.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::time::Duration;

use sts_core::backend::RawOutput;
use sts_core::backend::SolverBackend;
use sts_core::encodings::Approach;
use sts_core::encodings::Encoding;
use sts_core::error::StsError;
use sts_core::error::StsResult;
use sts_core::model::ModelOptions;
use sts_core::model::ModelVar;
use sts_core::result::SolverResult;
use sts_core::runner::run_instance;

/// The period of each `(week, slot)` pair in a valid period assignment for
/// the circle pairings of six teams.
const SIX_TEAM_ASSIGNMENT: [[u32; 3]; 5] =
    [[1, 2, 3], [2, 3, 1], [2, 3, 1], [1, 2, 3], [3, 2, 1]];

/// Orientation flips which balance the six team schedule to imbalance 1:
/// team 1 hands two of its home games to teams 5 and 6.
const SIX_TEAM_FLIPS: [(u32, u32); 2] = [(1, 1), (2, 1)];

type Responder = Box<dyn Fn(&Encoding) -> StsResult<RawOutput>>;

/// A backend which replays scripted responses, one per invocation.
struct ScriptedBackend {
    responses: RefCell<VecDeque<Responder>>,
}

impl ScriptedBackend {
    fn new(responses: Vec<Responder>) -> ScriptedBackend {
        ScriptedBackend {
            responses: RefCell::new(responses.into_iter().collect()),
        }
    }

    fn single(responder: Responder) -> ScriptedBackend {
        ScriptedBackend::new(vec![responder])
    }
}

impl SolverBackend for ScriptedBackend {
    fn invoke(&self, encoding: &Encoding, _time_limit: Duration) -> StsResult<RawOutput> {
        let responder = self
            .responses
            .borrow_mut()
            .pop_front()
            .expect("backend invoked more often than scripted");
        responder(encoding)
    }
}

fn output(stdout: &str) -> RawOutput {
    RawOutput {
        stdout: String::from(stdout),
        solution_file: None,
        elapsed: Duration::from_millis(10),
        timed_out: false,
    }
}

/// The DIMACS `v` line realizing [`SIX_TEAM_ASSIGNMENT`] under the reverse
/// index of the given encoding, with orientation variables set per
/// [`SIX_TEAM_FLIPS`] when present.
fn sat_v_line(encoding: &Encoding) -> String {
    let mut literals = Vec::new();
    for (week_idx, periods) in SIX_TEAM_ASSIGNMENT.iter().enumerate() {
        let week = week_idx as u32 + 1;
        for (slot_idx, &period) in periods.iter().enumerate() {
            let slot = slot_idx as u32 + 1;
            for p in 1..=3 {
                let code = encoding
                    .index
                    .code_of(ModelVar::Assign { week, slot, period: p })
                    .unwrap();
                literals.push(if p == period { code } else { -code });
            }
            if let Some(code) = encoding.index.code_of(ModelVar::Flip { week, slot }) {
                let flipped = SIX_TEAM_FLIPS.contains(&(week, slot));
                literals.push(if flipped { code } else { -code });
            }
        }
    }
    let body: Vec<String> = literals.iter().map(|l| l.to_string()).collect();
    format!("v {} 0", body.join(" "))
}

/// The SMT model output for the same assignment.
fn smt_model_output(encoding: &Encoding) -> String {
    let mut out = String::from("sat\n(model\n");
    for (week_idx, periods) in SIX_TEAM_ASSIGNMENT.iter().enumerate() {
        let week = week_idx as u32 + 1;
        for (slot_idx, &period) in periods.iter().enumerate() {
            let slot = slot_idx as u32 + 1;
            for p in 1..=3 {
                let var = ModelVar::Assign { week, slot, period: p };
                let value = if p == period { "true" } else { "false" };
                out.push_str(&format!("  (define-fun {} () Bool {value})\n", var.name()));
            }
            let flip = ModelVar::Flip { week, slot };
            if encoding.index.code_of(flip).is_some() {
                let value = if SIX_TEAM_FLIPS.contains(&(week, slot)) {
                    "true"
                } else {
                    "false"
                };
                out.push_str(&format!("  (define-fun {} () Bool {value})\n", flip.name()));
            }
        }
    }
    out.push_str(")\n");
    out
}

/// The CBC solution file for the same assignment, with `y` rows for every
/// kept orientation when `with_orientation` is set.
fn mip_solution_file(with_orientation: bool) -> String {
    let mut out = String::from("Optimal - objective value 1.00000000\n");
    let mut row = 0;
    for (week_idx, periods) in SIX_TEAM_ASSIGNMENT.iter().enumerate() {
        let week = week_idx as u32 + 1;
        for (slot_idx, &period) in periods.iter().enumerate() {
            let slot = slot_idx as u32 + 1;
            out.push_str(&format!("{row} x_w{week}_s{slot}_p{period} 1 0\n"));
            row += 1;
            if with_orientation && !SIX_TEAM_FLIPS.contains(&(week, slot)) {
                out.push_str(&format!("{row} y_w{week}_s{slot}_p{period} 1 0\n"));
                row += 1;
            }
        }
    }
    out
}

fn assert_valid_solution(result: &SolverResult, n: u32) {
    let schedule = result.sol.as_ref().expect("expected a schedule");
    assert_eq!(schedule.validate(n), Ok(()));
}

#[test]
fn sat_decision_run_produces_an_optimal_record() {
    let backend = ScriptedBackend::single(Box::new(|encoding: &Encoding| {
        Ok(output(&format!("s SATISFIABLE\n{}\n", sat_v_line(encoding))))
    }));

    let result = run_instance(6, Approach::Sat, ModelOptions::default(), &backend).unwrap();

    assert!(result.optimal);
    assert_eq!(result.obj, None);
    assert!(result.time < 300.0);
    assert_valid_solution(&result, 6);
}

#[test]
fn smt_decision_run_produces_an_optimal_record() {
    let backend =
        ScriptedBackend::single(Box::new(|encoding: &Encoding| Ok(output(&smt_model_output(encoding)))));

    let result = run_instance(6, Approach::Smt, ModelOptions::default(), &backend).unwrap();

    assert!(result.optimal);
    assert_eq!(result.obj, None);
    assert_valid_solution(&result, 6);
}

#[test]
fn cp_decision_run_accepts_the_json_stream() {
    let slots = "[[1, 2, 3], [2, 3, 1], [2, 3, 1], [1, 2, 3], [3, 2, 1]]";
    let stdout = format!("{{\"slot\": {slots}}}\n----------\n==========\n");
    let backend = ScriptedBackend::single(Box::new(move |_: &Encoding| Ok(output(&stdout))));

    let result = run_instance(6, Approach::Cp, ModelOptions::default(), &backend).unwrap();

    assert!(result.optimal);
    assert_valid_solution(&result, 6);
}

#[test]
fn mip_fairness_run_reports_the_recomputed_objective() {
    let backend = ScriptedBackend::single(Box::new(|_: &Encoding| {
        let mut raw = output("");
        raw.solution_file = Some(mip_solution_file(true));
        Ok(raw)
    }));
    let options = ModelOptions {
        fairness: true,
        ..ModelOptions::default()
    };

    let result = run_instance(6, Approach::Mip, options, &backend).unwrap();

    assert!(result.optimal);
    assert_eq!(result.obj, Some(1));
    assert_valid_solution(&result, 6);
    assert_eq!(
        result.sol.unwrap().max_imbalance() as i64,
        result.obj.unwrap()
    );
}

#[test]
fn sat_fairness_search_converges_to_the_optimum() {
    // First probe bounds the imbalance by 2: satisfiable with realized
    // imbalance 1. Second probe at bound 0: unsatisfiable. The search then
    // closes with a proved optimum of 1.
    let backend = ScriptedBackend::new(vec![
        Box::new(|encoding: &Encoding| {
            Ok(output(&format!("s SATISFIABLE\n{}\n", sat_v_line(encoding))))
        }),
        Box::new(|_: &Encoding| Ok(output("s UNSATISFIABLE\n"))),
    ]);
    let options = ModelOptions {
        fairness: true,
        ..ModelOptions::default()
    };

    let result = run_instance(6, Approach::Sat, options, &backend).unwrap();

    assert!(result.optimal);
    assert_eq!(result.obj, Some(1));
    assert_valid_solution(&result, 6);
}

#[test]
fn interrupted_fairness_search_keeps_the_incumbent() {
    let backend = ScriptedBackend::new(vec![
        Box::new(|encoding: &Encoding| {
            Ok(output(&format!("s SATISFIABLE\n{}\n", sat_v_line(encoding))))
        }),
        Box::new(|_: &Encoding| {
            Ok(RawOutput {
                stdout: String::new(),
                solution_file: None,
                elapsed: Duration::from_secs(300),
                timed_out: true,
            })
        }),
    ]);
    let options = ModelOptions {
        fairness: true,
        ..ModelOptions::default()
    };

    let result = run_instance(6, Approach::Sat, options, &backend).unwrap();

    assert!(!result.optimal);
    assert_eq!(result.time, 300.0);
    assert_eq!(result.obj, Some(1));
    assert_valid_solution(&result, 6);
}

#[test]
fn timeout_without_a_solution_yields_the_ceiling_record() {
    let backend = ScriptedBackend::single(Box::new(|_: &Encoding| {
        Ok(RawOutput {
            stdout: String::new(),
            solution_file: None,
            elapsed: Duration::from_secs(300),
            timed_out: true,
        })
    }));

    let result = run_instance(8, Approach::Sat, ModelOptions::default(), &backend).unwrap();

    assert_eq!(result.time, 300.0);
    assert!(!result.optimal);
    assert!(result.sol.is_none());
    assert_eq!(result.obj, None);
}

#[test]
fn cp_timeout_with_an_incumbent_decodes_the_incumbent() {
    let slots = "[[1, 2, 3], [2, 3, 1], [2, 3, 1], [1, 2, 3], [3, 2, 1]]";
    let stdout = format!("{{\"slot\": {slots}}}\n----------\n");
    let backend = ScriptedBackend::single(Box::new(move |_: &Encoding| {
        Ok(RawOutput {
            stdout: stdout.clone(),
            solution_file: None,
            elapsed: Duration::from_secs(300),
            timed_out: true,
        })
    }));

    let result = run_instance(6, Approach::Cp, ModelOptions::default(), &backend).unwrap();

    assert_eq!(result.time, 300.0);
    assert!(!result.optimal);
    assert_valid_solution(&result, 6);
}

#[test]
fn a_crashing_solver_fails_the_run() {
    let backend =
        ScriptedBackend::single(Box::new(|_: &Encoding| Err(StsError::crash("segfault"))));

    assert!(matches!(
        run_instance(6, Approach::Smt, ModelOptions::default(), &backend),
        Err(StsError::SolverCrash(_))
    ));
}

#[test]
fn an_invalid_decoded_schedule_is_a_checker_failure() {
    // Identity period assignment: every week reuses period 1 for slot 1,
    // which puts team 1 in period 1 five times.
    let backend = ScriptedBackend::single(Box::new(|encoding: &Encoding| {
        let mut literals = Vec::new();
        for week in 1..=5u32 {
            for slot in 1..=3u32 {
                for period in 1..=3u32 {
                    let code = encoding
                        .index
                        .code_of(ModelVar::Assign { week, slot, period })
                        .unwrap();
                    literals.push(if period == slot { code } else { -code });
                }
            }
        }
        let body: Vec<String> = literals.iter().map(|l| l.to_string()).collect();
        Ok(output(&format!("s SATISFIABLE\nv {} 0\n", body.join(" "))))
    }));

    assert!(matches!(
        run_instance(6, Approach::Sat, ModelOptions::default(), &backend),
        Err(StsError::Checker(_))
    ));
}

#[test]
fn an_unmapped_solver_variable_is_an_encoding_inconsistency() {
    let backend = ScriptedBackend::single(Box::new(|encoding: &Encoding| {
        Ok(output(&format!(
            "s SATISFIABLE\nv {} 0\n",
            encoding.num_solver_vars + 1
        )))
    }));

    assert!(matches!(
        run_instance(6, Approach::Sat, ModelOptions::default(), &backend),
        Err(StsError::EncodingInconsistency(_))
    ));
}

#[test]
fn odd_instances_are_rejected_before_any_solver_call() {
    let backend = ScriptedBackend::new(Vec::new());

    assert!(matches!(
        run_instance(5, Approach::Cp, ModelOptions::default(), &backend),
        Err(StsError::InvalidInstance(5))
    ));
}

#[test]
fn all_four_encoders_share_one_model_shape() {
    // The same scripted answer, translated per paradigm, decodes to the same
    // schedule everywhere.
    let slots = "[[1, 2, 3], [2, 3, 1], [2, 3, 1], [1, 2, 3], [3, 2, 1]]";
    let cp_stdout = format!("{{\"slot\": {slots}}}\n----------\n==========\n");

    let runs: Vec<(Approach, ScriptedBackend)> = vec![
        (
            Approach::Cp,
            ScriptedBackend::single(Box::new(move |_: &Encoding| Ok(output(&cp_stdout)))),
        ),
        (
            Approach::Sat,
            ScriptedBackend::single(Box::new(|encoding: &Encoding| {
                Ok(output(&format!("s SATISFIABLE\n{}\n", sat_v_line(encoding))))
            })),
        ),
        (
            Approach::Smt,
            ScriptedBackend::single(Box::new(|encoding: &Encoding| {
                Ok(output(&smt_model_output(encoding)))
            })),
        ),
        (
            Approach::Mip,
            ScriptedBackend::single(Box::new(|_: &Encoding| {
                let mut raw = output("");
                raw.solution_file = Some(mip_solution_file(false));
                Ok(raw)
            })),
        ),
    ];

    let mut schedules = Vec::new();
    for (approach, backend) in runs {
        let result = run_instance(6, approach, ModelOptions::default(), &backend).unwrap();
        assert!(result.optimal, "{approach} did not settle the decision run");
        schedules.push(result.sol.unwrap());
    }

    for schedule in &schedules {
        assert_eq!(schedule, &schedules[0]);
    }
}
