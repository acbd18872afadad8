//! The four paradigm encoders and their matching decoders.
//!
//! Every encoder consumes the [`ConstraintModel`] read-only and produces an
//! [`Encoding`]: the textual artifact handed to the solver subprocess plus
//! the reverse index the decoder needs to map solver identifiers back to
//! model variables. Artifacts are byte-identical for identical
//! `(n, options)` inputs; nothing in an encoder may depend on iteration
//! order of a hash map or on the clock.

pub mod cp;
pub mod mip;
pub mod sat;
pub mod smt;

use fnv::FnvHashMap;

use crate::model::ModelVar;
use crate::schedule::Schedule;

/// The four modeling paradigms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum Approach {
    Cp,
    Sat,
    Smt,
    Mip,
}

impl Approach {
    /// All approaches, in the order the batch driver runs them.
    pub fn all() -> [Approach; 4] {
        [Approach::Cp, Approach::Sat, Approach::Smt, Approach::Mip]
    }

    /// The directory name used under the result root, e.g. `res/SAT/`.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Approach::Cp => "CP",
            Approach::Sat => "SAT",
            Approach::Smt => "SMT",
            Approach::Mip => "MIP",
        }
    }
}

impl std::fmt::Display for Approach {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Bidirectional map between model variables and the identifiers a solver
/// sees: numeric codes for DIMACS, names for SMT-LIB and LP files.
///
/// Codes are assigned densely from 1 in registration order, so the encoder's
/// canonical variable order fixes the numbering.
#[derive(Debug, Default)]
pub struct VarIndex {
    by_code: Vec<ModelVar>,
    by_var: FnvHashMap<ModelVar, i32>,
    by_name: FnvHashMap<String, ModelVar>,
}

impl VarIndex {
    /// Register a variable and return its numeric code.
    pub fn register(&mut self, var: ModelVar) -> i32 {
        if let Some(&code) = self.by_var.get(&var) {
            return code;
        }

        self.by_code.push(var);
        let code = self.by_code.len() as i32;
        let _ = self.by_var.insert(var, code);
        let _ = self.by_name.insert(var.name(), var);
        code
    }

    /// The number of registered model variables.
    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }

    /// The numeric code of a registered variable.
    pub fn code_of(&self, var: ModelVar) -> Option<i32> {
        self.by_var.get(&var).copied()
    }

    /// The variable behind a numeric code, if the code denotes a model
    /// variable rather than an encoder-internal auxiliary.
    pub fn var_of_code(&self, code: i32) -> Option<ModelVar> {
        if code < 1 {
            return None;
        }
        self.by_code.get(code as usize - 1).copied()
    }

    /// The variable behind a textual name.
    pub fn var_of_name(&self, name: &str) -> Option<ModelVar> {
        self.by_name.get(name).copied()
    }
}

/// A file of the artifact, written to the solver working directory before the
/// subprocess starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingFile {
    pub name: String,
    pub contents: String,
}

/// The product of an encoder: the artifact files plus the reverse index.
#[derive(Debug)]
pub struct Encoding {
    pub approach: Approach,
    /// The first file is the primary solver input; the CP encoding carries
    /// the data file as a second entry.
    pub files: Vec<EncodingFile>,
    pub index: VarIndex,
    /// The total number of solver variables including encoder-internal
    /// auxiliaries (equal to `index.len()` for encodings without
    /// auxiliaries). Codes above this range in solver output are rejected.
    pub num_solver_vars: usize,
}

/// What the solver claimed about the instance, before the time-limit
/// bookkeeping of the runner is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// A solution together with a proof of optimality (or of satisfiability
    /// for decision variants where nothing is optimized).
    Optimal,
    /// A solution without a completed proof.
    Satisfiable,
    Unsatisfiable,
    Unknown,
}

/// The decoded outcome of one solver invocation.
#[derive(Debug)]
pub struct Decoded {
    pub status: SolveStatus,
    pub schedule: Option<Schedule>,
}
