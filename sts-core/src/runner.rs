//! One `(approach, n)` run: encode, invoke, decode, validate, record.
//!
//! A run is a pure function of the instance size, the approach and the
//! option flags; the stopwatch starts before encoding so that preprocessing
//! is charged to the reported runtime. CP and MIP optimize the fairness
//! objective natively; SAT and SMT reach the optimum through binary search
//! on the imbalance bound, re-encoding per probe under the remaining budget.

use std::time::Duration;
use std::time::Instant;

use log::debug;
use log::info;
use log::warn;

use crate::backend::RawOutput;
use crate::backend::SolverBackend;
use crate::encodings::cp;
use crate::encodings::mip;
use crate::encodings::sat;
use crate::encodings::smt;
use crate::encodings::Approach;
use crate::encodings::Decoded;
use crate::encodings::Encoding;
use crate::encodings::SolveStatus;
use crate::error::StsError;
use crate::error::StsResult;
use crate::model::ConstraintModel;
use crate::model::ModelOptions;
use crate::result::SolverResult;
use crate::round_robin::RoundRobin;
use crate::schedule::Schedule;

/// Solve one instance with one approach and produce its result record.
pub fn run_instance(
    n: u32,
    approach: Approach,
    options: ModelOptions,
    backend: &dyn SolverBackend,
) -> StsResult<SolverResult> {
    let start = Instant::now();
    let pairings = RoundRobin::generate(n)?;
    let model = ConstraintModel::new(pairings, options);

    let bound_search = options.fairness && matches!(approach, Approach::Sat | Approach::Smt);
    if bound_search {
        run_bound_search(approach, &model, backend, start)
    } else {
        run_single(approach, &model, backend, start)
    }
}

/// Decision variants on every paradigm, plus the native-objective fairness
/// variants (CP, MIP).
fn run_single(
    approach: Approach,
    model: &ConstraintModel,
    backend: &dyn SolverBackend,
    start: Instant,
) -> StsResult<SolverResult> {
    let options = model.options();
    let encoding = encode_for(approach, model);
    let raw = backend.invoke(&encoding, remaining_budget(start, options.time_limit))?;
    let decoded = decode_for(approach, &encoding, model, &raw)?;

    let schedule = validated_schedule(model, decoded.schedule)?;
    let timed_out = raw.timed_out || start.elapsed() >= options.time_limit;

    let proved = match decoded.status {
        SolveStatus::Optimal => true,
        // A satisfiability proof settles a decision variant, but is not an
        // optimality proof when there is an objective.
        SolveStatus::Satisfiable => !options.fairness,
        SolveStatus::Unsatisfiable => {
            warn!("{approach} proved the instance infeasible");
            false
        }
        SolveStatus::Unknown => false,
    };

    Ok(finish(model, schedule, proved && !timed_out, timed_out, start))
}

/// Fairness on paradigms without a native objective: binary search on the
/// imbalance bound, as long as budget remains.
fn run_bound_search(
    approach: Approach,
    model: &ConstraintModel,
    backend: &dyn SolverBackend,
    start: Instant,
) -> StsResult<SolverResult> {
    let time_limit = model.options().time_limit;
    let mut low: i64 = 0;
    let mut high: i64 = i64::from(model.num_teams()) - 1;
    let mut best: Option<Schedule> = None;
    let mut out_of_time = false;

    while low <= high {
        if start.elapsed() >= time_limit {
            out_of_time = true;
            break;
        }

        let bound = ((low + high) / 2) as u32;
        debug!("{approach} probing imbalance bound {bound}");

        let probe = model.with_fairness_bound(bound);
        let encoding = encode_for(approach, &probe);
        let raw = backend.invoke(&encoding, remaining_budget(start, time_limit))?;
        let decoded = decode_for(approach, &encoding, &probe, &raw)?;

        if raw.timed_out {
            out_of_time = true;
            break;
        }

        match decoded.status {
            SolveStatus::Optimal | SolveStatus::Satisfiable => {
                let schedule = validated_schedule(&probe, decoded.schedule)?
                    .ok_or_else(|| StsError::crash("satisfiable probe without a model"))?;
                // The realized imbalance can undercut the probed bound;
                // continue below it.
                let achieved = i64::from(schedule.max_imbalance());
                info!("{approach} found a schedule with imbalance {achieved}");
                best = Some(schedule);
                high = achieved - 1;
            }
            SolveStatus::Unsatisfiable => low = i64::from(bound) + 1,
            SolveStatus::Unknown => {
                out_of_time = true;
                break;
            }
        }
    }

    let timed_out = out_of_time || start.elapsed() >= time_limit;
    let converged = best.is_some() && low > high;

    Ok(finish(model, best, converged && !timed_out, timed_out, start))
}

fn finish(
    model: &ConstraintModel,
    schedule: Option<Schedule>,
    optimal: bool,
    timed_out: bool,
    start: Instant,
) -> SolverResult {
    let time_limit = model.options().time_limit;
    let time = if timed_out {
        time_limit.as_secs_f64()
    } else {
        start.elapsed().as_secs_f64()
    };

    let obj = if model.options().fairness {
        schedule.as_ref().map(|s| i64::from(s.max_imbalance()))
    } else {
        None
    };

    SolverResult {
        time,
        optimal,
        obj,
        sol: schedule,
    }
}

/// Check a decoded schedule against the tournament invariants before it can
/// reach a result record. A violation is an encoder/decoder bug and fails
/// the run.
fn validated_schedule(
    model: &ConstraintModel,
    schedule: Option<Schedule>,
) -> StsResult<Option<Schedule>> {
    match schedule {
        Some(schedule) => {
            schedule.validate(model.num_teams())?;
            Ok(Some(schedule))
        }
        None => Ok(None),
    }
}

fn remaining_budget(start: Instant, time_limit: Duration) -> Duration {
    time_limit.saturating_sub(start.elapsed())
}

fn encode_for(approach: Approach, model: &ConstraintModel) -> Encoding {
    match approach {
        Approach::Cp => cp::encode(model),
        Approach::Sat => sat::encode(model),
        Approach::Smt => smt::encode(model),
        Approach::Mip => mip::encode(model),
    }
}

fn decode_for(
    approach: Approach,
    encoding: &Encoding,
    model: &ConstraintModel,
    raw: &RawOutput,
) -> StsResult<Decoded> {
    match approach {
        Approach::Cp => cp::decode(encoding, model, &raw.stdout),
        Approach::Sat => sat::decode(encoding, model, &raw.stdout),
        Approach::Smt => smt::decode(encoding, model, &raw.stdout),
        Approach::Mip => match &raw.solution_file {
            Some(solution) => mip::decode(encoding, model, solution),
            None if raw.timed_out => Ok(Decoded {
                status: SolveStatus::Unknown,
                schedule: None,
            }),
            None => Err(StsError::crash("solver wrote no solution file")),
        },
    }
}
