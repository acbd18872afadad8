//! The canonical result record and its on-disk layout.

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::encodings::Approach;
use crate::error::StsResult;
use crate::schedule::Schedule;

/// The uniform record produced for every `(approach, n)` run.
///
/// `time` is wall-clock seconds including the encoding step, reported as
/// exactly the ceiling when the run timed out. `obj` is only present for
/// fairness variants. `sol` is `None` when no feasible schedule was found in
/// time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverResult {
    pub time: f64,
    pub optimal: bool,
    pub obj: Option<i64>,
    pub sol: Option<Schedule>,
}

/// Write the record to `<root>/<APPROACH>/<n>.json`, creating directories as
/// needed, and return the path. Nothing is written for failed runs; callers
/// only reach this with a complete record.
pub fn write_record(
    root: impl AsRef<Path>,
    approach: Approach,
    n: u32,
    result: &SolverResult,
) -> StsResult<PathBuf> {
    let dir = root.as_ref().join(approach.dir_name());
    std::fs::create_dir_all(&dir)?;

    let path = dir.join(format!("{n}.json"));
    let mut body = serde_json::to_string_pretty(result)?;
    body.push('\n');
    std::fs::write(&path, body)?;

    Ok(path)
}
