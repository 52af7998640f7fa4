//! symqemu-harness: regression tests for the SymQEMU emulator

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};

use symqemu_harness::{ComparisonPolicy, Config, DiffReporter, Fixture, Harness, Suite};

#[derive(Parser, Debug)]
#[command(
    name = "symqemu-harness",
    version,
    about = "Run test binaries under SymQEMU and compare the generated test cases with a baseline"
)]
struct Cli {
    /// Emulator executable (overrides config)
    #[arg(long, global = true, value_name = "PATH")]
    emulator: Option<PathBuf>,

    /// Directory holding one subdirectory per test binary (overrides config)
    #[arg(long, global = true, value_name = "DIR")]
    binaries: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Verify fixtures against their expected outputs (all when none named)
    Run {
        /// Fixture names
        names: Vec<String>,

        /// Keep generated test cases in <fixture>/generated_outputs
        #[arg(long)]
        keep_outputs: bool,

        /// Comparison policy: content (by SHA-256) or filename (with hex diffs)
        #[arg(long, value_name = "POLICY")]
        policy: Option<ComparisonPolicy>,

        /// Kill a run after this many seconds (0 = no timeout)
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,

        /// Disable colored diff output
        #[arg(long)]
        no_color: bool,
    },
    /// Record expected outputs for a fixture that has none yet
    Bless {
        /// Fixture name
        name: String,
    },
    /// List discovered fixtures
    List,
    /// Show the active configuration and a sample config file
    Config,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let mut config = Config::get().clone();
    config.merge(Config {
        emulator: cli.emulator.as_ref().map(|p| p.display().to_string()),
        binaries_dir: cli.binaries.as_ref().map(|p| p.display().to_string()),
        ..Default::default()
    });

    match cli.command {
        Commands::Run {
            names,
            keep_outputs,
            policy,
            timeout,
            no_color,
        } => {
            config.merge(Config {
                timeout_secs: timeout,
                policy,
                keep_outputs: keep_outputs.then_some(true),
                ..Default::default()
            });
            run(&config, &names, no_color)
        }
        Commands::Bless { name } => bless(&config, &name),
        Commands::List => list(&config),
        Commands::Config => {
            println!("Active configuration:");
            println!("  emulator:     {}", config.emulator().display());
            println!("  binaries_dir: {}", config.binaries_dir().display());
            match config.timeout() {
                Some(t) => println!("  timeout:      {}s", t.as_secs()),
                None => println!("  timeout:      none"),
            }
            println!("  policy:       {}", config.policy());
            println!("  keep_outputs: {}", config.keep_outputs());
            if let Some(path) = Config::user_config_path() {
                println!();
                println!("User config file: {}", path.display());
            }
            println!();
            print!("{}", Config::sample_config());
            Ok(())
        }
    }
}

fn run(config: &Config, names: &[String], no_color: bool) -> anyhow::Result<()> {
    let mut harness = Harness::from_config(config);
    if no_color {
        harness = harness.with_reporter(DiffReporter::new(false));
    }

    let banner = format!(
        "{} (policy: {}, timeout: {})",
        harness.runner().emulator().display(),
        harness.policy(),
        match harness.runner().timeout() {
            Some(t) => format!("{}s", t.as_secs()),
            None => "none".to_string(),
        }
    );

    let binaries = config.binaries_dir();
    let mut suite = Suite::discover(&binaries, harness)
        .with_context(|| format!("Failed to discover fixtures in {}", binaries.display()))?;
    suite.select(names)?;

    if suite.fixture_count() == 0 {
        anyhow::bail!("No fixtures found in {}", binaries.display());
    }

    println!("Running {} fixture(s) with {}", suite.fixture_count(), banner);
    let result = suite.run_all();
    print!("{}", suite.summary_report(&result));
    println!("Pass rate: {:.1}%", result.pass_rate());

    if !result.all_passed() {
        std::process::exit(1);
    }
    Ok(())
}

fn bless(config: &Config, name: &str) -> anyhow::Result<()> {
    let binaries = config.binaries_dir();
    let fixture = Fixture::load(&binaries, name)?;
    let harness = Harness::from_config(config);

    let started = Instant::now();
    let set = harness.seed_expected(&fixture)?;
    println!(
        "Expected outputs for {} generated in {} ({} test cases, {:.2}s)",
        fixture.name,
        fixture.expected_outputs_dir().display(),
        set.len(),
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

fn list(config: &Config) -> anyhow::Result<()> {
    let binaries = config.binaries_dir();
    let names = symqemu_harness::fixture::discover(&binaries)?;
    for name in names {
        match Fixture::load(&binaries, &name) {
            Ok(fixture) => {
                let baseline = if fixture.has_baseline() {
                    "baseline"
                } else {
                    "no baseline"
                };
                println!(
                    "{:20} args: {:30} ({})",
                    name,
                    fixture.args.tokens().join(" "),
                    baseline
                );
            }
            Err(e) => println!("{:20} error: {}", name, e),
        }
    }
    Ok(())
}
