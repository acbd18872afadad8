//! Invocation of the external solvers.
//!
//! The pipeline needs exactly one capability from the four solver
//! ecosystems: run a process on an artifact with a wall-clock ceiling and
//! hand back what it printed. [`SolverBackend`] is that seam; the scripted
//! implementations used by the tests plug in here as well.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::process::Stdio;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use log::debug;
use wait_timeout::ChildExt;

use crate::encodings::Encoding;
use crate::error::StsError;
use crate::error::StsResult;

/// What a solver invocation produced.
#[derive(Debug, Clone)]
pub struct RawOutput {
    /// Everything the solver printed to stdout. For time-limited runs this
    /// may contain intermediate solutions, which the decoders treat as the
    /// incumbent.
    pub stdout: String,
    /// The contents of the solver-written solution file, for solvers which
    /// do not print solutions to stdout.
    pub solution_file: Option<String>,
    pub elapsed: Duration,
    /// Whether the invocation hit the ceiling. The subprocess has been
    /// terminated when this is set.
    pub timed_out: bool,
}

/// The uniform contract between the pipeline and an external solver.
pub trait SolverBackend {
    fn invoke(&self, encoding: &Encoding, time_limit: Duration) -> StsResult<RawOutput>;
}

/// The command line of a solver, with placeholders substituted per
/// invocation:
///
/// * `{input}` - path of the primary artifact file,
/// * `{data}` - path of the secondary artifact file (MiniZinc data),
/// * `{solution}` - path the solver should write its solution file to,
/// * `{time_limit_s}` / `{time_limit_ms}` - the ceiling in seconds or
///   milliseconds.
#[derive(Debug, Clone)]
pub struct CommandTemplate {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandTemplate {
    pub fn new(program: impl Into<String>, args: &[&str]) -> CommandTemplate {
        CommandTemplate {
            program: program.into(),
            args: args.iter().map(|arg| String::from(*arg)).collect(),
        }
    }

    /// Whether any argument asks for a solution file.
    fn wants_solution_file(&self) -> bool {
        self.args.iter().any(|arg| arg.contains("{solution}"))
    }
}

/// Exit statuses which do not indicate a crash. SAT solvers signal their
/// verdict through 10 (satisfiable) and 20 (unsatisfiable) per competition
/// convention.
const BENIGN_EXIT_CODES: [i32; 3] = [0, 10, 20];

/// Extra wall-clock slack granted on top of the ceiling before the
/// subprocess is killed, so that a solver honouring its own time limit can
/// still report a best-effort incumbent.
const KILL_GRACE: Duration = Duration::from_secs(2);

static NEXT_RUN_ID: AtomicU64 = AtomicU64::new(0);

/// Runs a solver as a subprocess with the artifact written to a scratch
/// directory. No state is shared across invocations.
#[derive(Debug, Clone)]
pub struct ProcessBackend {
    template: CommandTemplate,
}

impl ProcessBackend {
    pub fn new(template: CommandTemplate) -> ProcessBackend {
        ProcessBackend { template }
    }

    fn scratch_dir(&self) -> StsResult<PathBuf> {
        let run_id = NEXT_RUN_ID.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!(
            "sts-solver-{}-{run_id}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

impl SolverBackend for ProcessBackend {
    fn invoke(&self, encoding: &Encoding, time_limit: Duration) -> StsResult<RawOutput> {
        let dir = self.scratch_dir()?;
        let result = run_in_dir(&self.template, encoding, time_limit, &dir);
        let _ = std::fs::remove_dir_all(&dir);
        result
    }
}

fn run_in_dir(
    template: &CommandTemplate,
    encoding: &Encoding,
    time_limit: Duration,
    dir: &Path,
) -> StsResult<RawOutput> {
    let mut file_paths = Vec::new();
    for file in &encoding.files {
        let path = dir.join(&file.name);
        std::fs::write(&path, &file.contents)?;
        file_paths.push(path);
    }

    let solution_path = dir.join("solution.txt");
    let stdout_path = dir.join("stdout.log");
    let stderr_path = dir.join("stderr.log");

    let substitute = |arg: &str| -> String {
        arg.replace("{input}", &file_paths[0].to_string_lossy())
            .replace(
                "{data}",
                &file_paths
                    .get(1)
                    .map(|path| path.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            )
            .replace("{solution}", &solution_path.to_string_lossy())
            .replace("{time_limit_s}", &time_limit.as_secs().to_string())
            .replace("{time_limit_ms}", &time_limit.as_millis().to_string())
    };

    let mut command = Command::new(&template.program);
    for arg in &template.args {
        let _ = command.arg(substitute(arg));
    }

    debug!("spawning {:?}", command);

    let start = Instant::now();
    let mut child = command
        .stdin(Stdio::null())
        .stdout(File::create(&stdout_path)?)
        .stderr(File::create(&stderr_path)?)
        .spawn()
        .map_err(|e| StsError::crash(format!("failed to start {}: {e}", template.program)))?;

    let status = child.wait_timeout(time_limit + KILL_GRACE)?;
    let timed_out = match status {
        Some(_) => start.elapsed() >= time_limit,
        None => {
            child.kill()?;
            let _ = child.wait()?;
            true
        }
    };
    let elapsed = start.elapsed();

    if let Some(status) = status {
        let benign = status
            .code()
            .map(|code| BENIGN_EXIT_CODES.contains(&code))
            .unwrap_or(false);
        if !benign && !timed_out {
            let stderr = read_to_string_lossy(&stderr_path).unwrap_or_default();
            let tail: String = stderr.lines().rev().take(5).collect::<Vec<_>>().join(" | ");
            return Err(StsError::crash(format!(
                "{} exited with {status}: {tail}",
                template.program
            )));
        }
    }

    let stdout = read_to_string_lossy(&stdout_path)?;
    let solution_file = if template.wants_solution_file() {
        read_to_string_lossy(&solution_path).ok()
    } else {
        None
    };

    Ok(RawOutput {
        stdout,
        solution_file,
        elapsed,
        timed_out,
    })
}

fn read_to_string_lossy(path: &Path) -> StsResult<String> {
    let mut bytes = Vec::new();
    let _ = File::open(path)?.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
