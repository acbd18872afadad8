//! QF_LIA SMT-LIB2 export and model decoding.
//!
//! The cardinality constraints of the model are rendered as bounds on sums
//! of `(ite b 1 0)` terms over boolean variables, which keeps the export in
//! QF_LIA and digestible by any SMT-LIB2 solver. The artifact ends in
//! `(check-sat)` `(get-model)`, and the decoder reads the `define-fun` lines
//! of the printed model.

use std::fmt::Write;

use crate::encodings::sat::schedule_from_true_vars;
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

/// Build the SMT-LIB2 artifact for the given model.
pub fn encode(model: &ConstraintModel) -> Encoding {
    let mut index = VarIndex::default();
    let mut out = String::new();

    out.push_str("(set-logic QF_LIA)\n");

    for var in model
        .assignment_vars()
        .into_iter()
        .chain(model.orientation_vars())
    {
        let _ = index.register(var);
        // Writing to a String cannot fail.
        let _ = writeln!(out, "(declare-fun {} () Bool)", var.name());
    }

    for constraint in model
        .assignment_constraints()
        .iter()
        .chain(model.fairness_constraints().iter())
    {
        push_cardinality(&mut out, constraint);
    }

    out.push_str("(check-sat)\n(get-model)\n");

    let num_solver_vars = index.len();
    Encoding {
        approach: Approach::Smt,
        files: vec![EncodingFile {
            name: format!("sts_{}.smt2", model.num_teams()),
            contents: out,
        }],
        index,
        num_solver_vars,
    }
}

fn push_cardinality(out: &mut String, constraint: &Cardinality) {
    let sum = sum_term(&constraint.lits);

    if constraint.at_least == constraint.at_most {
        let _ = writeln!(out, "(assert (= {sum} {}))", constraint.at_least);
        return;
    }
    if (constraint.at_most as usize) < constraint.lits.len() {
        let _ = writeln!(out, "(assert (<= {sum} {}))", constraint.at_most);
    }
    if constraint.at_least > 0 {
        let _ = writeln!(out, "(assert (>= {sum} {}))", constraint.at_least);
    }
}

fn sum_term(lits: &[BoolLit]) -> String {
    let terms: Vec<String> = lits
        .iter()
        .map(|lit| {
            if lit.positive {
                format!("(ite {} 1 0)", lit.var.name())
            } else {
                format!("(ite {} 0 1)", lit.var.name())
            }
        })
        .collect();

    match terms.len() {
        1 => terms.into_iter().next().unwrap(),
        _ => format!("(+ {})", terms.join(" ")),
    }
}

/// Decode the solver answer: the leading `sat`/`unsat`/`unknown` verdict and,
/// when satisfiable, the `(define-fun <name> () Bool <value>)` entries of the
/// printed model.
pub fn decode(encoding: &Encoding, model: &ConstraintModel, stdout: &str) -> StsResult<Decoded> {
    let status = match stdout.split_whitespace().next() {
        Some("sat") => SolveStatus::Satisfiable,
        Some("unsat") => SolveStatus::Unsatisfiable,
        _ => SolveStatus::Unknown,
    };

    if status != SolveStatus::Satisfiable {
        return Ok(Decoded { status, schedule: None });
    }

    let mut true_vars: Vec<ModelVar> = Vec::new();
    let tokens: Vec<&str> = stdout
        .split(|c: char| c.is_whitespace() || c == '(' || c == ')')
        .filter(|t| !t.is_empty())
        .collect();

    let mut position = 0;
    while position < tokens.len() {
        if tokens[position] == "define-fun" {
            let name = tokens
                .get(position + 1)
                .ok_or_else(|| StsError::crash("truncated model output"))?;
            let value = tokens
                .get(position + 3)
                .ok_or_else(|| StsError::crash("truncated model output"))?;

            let var = encoding
                .index
                .var_of_name(name)
                .ok_or_else(|| StsError::EncodingInconsistency(String::from(*name)))?;
            match *value {
                "true" => true_vars.push(var),
                "false" => {}
                other => {
                    return Err(StsError::crash(format!(
                        "unexpected model value '{other}' for {name}"
                    )))
                }
            }
            position += 4;
        } else {
            position += 1;
        }
    }

    let schedule = schedule_from_true_vars(model, &true_vars)?;
    Ok(Decoded {
        status,
        schedule: Some(schedule),
    })
}
