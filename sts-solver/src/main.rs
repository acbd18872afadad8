use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use log::error;
use log::info;
use log::Level;
use log::LevelFilter;
use sts_core::backend::CommandTemplate;
use sts_core::backend::ProcessBackend;
use sts_core::encodings::Approach;
use sts_core::error::StsError;
use sts_core::error::StsResult;
use sts_core::model::ModelOptions;
use sts_core::result::write_record;
use sts_core::runner::run_instance;

/// The instance sizes of the benchmark batch, run when no explicit instance
/// is given.
const BATCH_INSTANCES: [u32; 6] = [6, 8, 10, 12, 14, 16];

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The modeling approach to run. When absent, all four approaches are
    /// run sequentially.
    #[arg(short = 'a', long = "approach", value_enum)]
    approach: Option<Approach>,

    /// The number of teams. Must be even. When absent, the full benchmark
    /// batch of instance sizes is run.
    #[arg(short = 'n', long = "instance")]
    instance: Option<u32>,

    /// The wall-clock ceiling per run in seconds, including encoding time.
    #[arg(short = 't', long = "time-limit", default_value_t = 300)]
    time_limit: u64,

    /// Pin the week-1 match of team 1 to period 1.
    #[arg(long = "symmetry-breaking", default_value_t = false)]
    symmetry_breaking: bool,

    /// Add the redundant three-consecutive-weeks strengthening constraint.
    #[arg(long = "implied-constraints", default_value_t = false)]
    implied_constraints: bool,

    /// Minimize the maximum home/away imbalance instead of stopping at the
    /// first feasible schedule.
    #[arg(long = "optimize", default_value_t = false)]
    optimize: bool,

    /// The directory the result records are written to.
    #[arg(long = "output-dir", default_value = "res")]
    output_dir: PathBuf,

    /// The MiniZinc backend solver to use for the CP approach.
    #[arg(long = "minizinc-solver", default_value = "gecode")]
    minizinc_solver: String,

    /// The SAT solver executable. Expected to follow the SAT-competition
    /// output conventions.
    #[arg(long = "sat-solver", default_value = "kissat")]
    sat_solver: String,

    /// The SMT solver executable. Expected to accept SMT-LIB2 input.
    #[arg(long = "smt-solver", default_value = "z3")]
    smt_solver: String,

    /// The MIP solver executable. Expected to accept CPLEX LP input and
    /// write a CBC-style solution file.
    #[arg(long = "mip-solver", default_value = "cbc")]
    mip_solver: String,

    /// Enables log message output from the pipeline.
    #[arg(short = 'v', long = "verbose", default_value_t = false)]
    verbose: bool,

    /// If `--verbose` is enabled, removes the timestamp information from the
    /// log messages.
    #[arg(long = "omit-timestamp", default_value_t = false)]
    omit_timestamp: bool,
}

fn configure_logging(verbose: bool, omit_timestamp: bool) {
    let level_filter = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::new()
        .format(move |buf, record| {
            if record.level() != Level::Info && !omit_timestamp {
                write!(buf, "{} ", buf.timestamp())?;
            }
            write!(buf, "{} ", record.level())?;
            writeln!(buf, "{}", record.args())
        })
        .filter_level(level_filter)
        .target(env_logger::Target::Stdout)
        .init();
}

fn main() {
    match run() {
        Ok(0) => {}
        Ok(failed) => {
            error!("{failed} run(s) failed");
            std::process::exit(1);
        }
        Err(e) => {
            error!("execution failed: {e}");
            std::process::exit(1);
        }
    }
}

/// Run the requested batch and return the number of failed runs.
fn run() -> StsResult<usize> {
    let args = Args::parse();
    configure_logging(args.verbose, args.omit_timestamp);

    let instances: Vec<u32> = match args.instance {
        Some(n) => vec![n],
        None => BATCH_INSTANCES.to_vec(),
    };
    // Reject bad instances up front, before any solver work or file output.
    for &n in &instances {
        if n < 2 || n % 2 != 0 {
            return Err(StsError::InvalidInstance(i64::from(n)));
        }
    }

    let approaches: Vec<Approach> = match args.approach {
        Some(approach) => vec![approach],
        None => Approach::all().to_vec(),
    };

    let options = ModelOptions {
        symmetry_breaking: args.symmetry_breaking,
        implied_constraints: args.implied_constraints,
        fairness: args.optimize,
        time_limit: Duration::from_secs(args.time_limit),
    };

    let mut failed = 0;
    for &n in &instances {
        for &approach in &approaches {
            let backend = ProcessBackend::new(solver_command(approach, &args));
            info!("running {approach} on n = {n}");

            match run_instance(n, approach, options, &backend) {
                Ok(result) => {
                    let path = write_record(&args.output_dir, approach, n, &result)?;
                    info!(
                        "{approach} n = {n}: optimal = {}, time = {:.2}s, written to {}",
                        result.optimal,
                        result.time,
                        path.display()
                    );
                }
                Err(e) => {
                    // One broken run must not take down the rest of the
                    // batch; the record for this pair is simply not written.
                    error!("{approach} failed on n = {n}: {e}");
                    failed += 1;
                }
            }
        }
    }

    Ok(failed)
}

fn solver_command(approach: Approach, args: &Args) -> CommandTemplate {
    match approach {
        Approach::Cp => CommandTemplate::new(
            "minizinc",
            &[
                "--solver",
                &args.minizinc_solver,
                "--time-limit",
                "{time_limit_ms}",
                "--output-mode",
                "json",
                "{input}",
                "{data}",
            ],
        ),
        Approach::Sat => {
            CommandTemplate::new(&args.sat_solver, &["--time={time_limit_s}", "{input}"])
        }
        Approach::Smt => CommandTemplate::new(&args.smt_solver, &["-T:{time_limit_s}", "{input}"]),
        Approach::Mip => CommandTemplate::new(
            &args.mip_solver,
            &[
                "{input}",
                "sec",
                "{time_limit_s}",
                "solve",
                "printingOptions",
                "all",
                "solution",
                "{solution}",
            ],
        ),
    }
}
