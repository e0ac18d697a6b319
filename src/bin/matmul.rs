use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use parallel_matmul::load::SystemLoadProbe;
use parallel_matmul::prompt::Prompter;
use parallel_matmul::{Coordinator, Settings};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::io;
use std::path::PathBuf;

/// Multiply two random integer matrices across worker threads.
#[derive(Parser, Debug)]
#[command(name = "matmul", version)]
struct Cli {
    /// TOML settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for partial results, the final result and the log
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Seed for the matrix generator
    #[arg(long)]
    seed: Option<u64>,

    /// Do not echo log entries to the console
    #[arg(short, long)]
    quiet: bool,

    /// Recompute the product sequentially and compare
    #[arg(long)]
    verify: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref()).context("loading settings")?;
    if let Some(dir) = &cli.output_dir {
        settings.output_dir = dir.clone();
    }
    if cli.quiet {
        settings.echo_to_console = false;
    }

    let coordinator = Coordinator::start(settings).context("starting the run")?;
    let outcome = session(&coordinator, &cli);
    if let Err(err) = &outcome {
        coordinator.log().error(format!("Error: {err:#}"));
    }

    let stats = coordinator.shutdown();
    if stats.file_errors > 0 {
        eprintln!(
            "{} {} log entries could not be written to the log file",
            "warning:".yellow().bold(),
            stats.file_errors
        );
    }
    outcome
}

fn session(coordinator: &Coordinator, cli: &Cli) -> Result<()> {
    let stdin = io::stdin();
    let mut prompter = Prompter::new(stdin.lock(), io::stdout());

    let request = prompter
        .read_request()
        .context("reading matrix dimensions")?;

    let snapshot = coordinator.sample_load(&mut SystemLoadProbe::new());
    let workers = prompter
        .read_worker_count(snapshot.recommended_max_workers)
        .context("reading worker count")?;

    let mut rng = match cli.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let report = coordinator.run(&request, workers, &mut rng)?;

    if cli.verify {
        let reference = report.a.multiply_naive(&report.b)?;
        if reference != report.multiplication.result {
            bail!("parallel result differs from the sequential product");
        }
        coordinator
            .log()
            .info("Result verified against the sequential product");
    }

    println!(
        "{} {}x{} result in {:.4}s using {} workers",
        "Done:".green().bold(),
        report.multiplication.result.rows(),
        report.multiplication.result.cols(),
        report.multiplication.elapsed.as_secs_f64(),
        report.multiplication.shards.len()
    );
    if let Some(path) = &report.saved_to {
        println!("Final result: {}", path.display());
    }
    Ok(())
}
