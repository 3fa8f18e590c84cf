//! Laxity binary crate.

use std::io::{self, Write};
use std::path::PathBuf;

use clap::Parser;
use fs_err as fs;
use serde_json::Value;

use laxity::automaton::system::StaticSystem;
use laxity::io::{
    Config, DumpConfig, DumpHandler, OutputConfig, RelaxationInput, SolutionRecord,
    SolutionWriter, StatsWriter,
};
use laxity::logic;
use laxity::options::{CliOptions, RelaxationOptions, TraceLevel};
use laxity::{relax, Error};

fn main() {
    if let Err(error) = laxity_main() {
        // discard result as we cannot further propagate a write error
        let _ = writeln!(io::stderr(), "Error: {}", error);
        std::process::exit(1);
    }
}

/// Initialize the logging framework with the given trace level.
fn initialize_logging(level: TraceLevel) {
    let _ = env_logger::builder()
        .filter(None, level.into())
        .format_timestamp_millis()
        .try_init();
}

struct RunSetup {
    inputs: Vec<RelaxationInput>,
    solution_writer: SolutionWriter,
    stats_writer: StatsWriter,
    dump_root: Option<PathBuf>,
    options: RelaxationOptions,
}

/// Main function that parses the options, loads the configuration or the
/// single model, runs the relaxation pipeline and writes the results.
fn laxity_main() -> Result<(), Error> {
    let cli = CliOptions::parse();
    initialize_logging(TraceLevel::from(cli.verbose));
    let setup = build_setup(&cli)?;

    for input in &setup.inputs {
        run_input(input, &setup)?;
    }
    Ok(())
}

fn build_setup(cli: &CliOptions) -> Result<RunSetup, Error> {
    let mut options = RelaxationOptions {
        grid_points: cli.grid_points,
        epsilon: logic::parse_rational(&cli.epsilon)?,
        ..RelaxationOptions::default()
    };

    if let Some(config_path) = &cli.config {
        let config = Config::from_file(config_path)?;
        if let Some(grid_points) = config.grid_points {
            options.grid_points = grid_points;
        }
        if let Some(epsilon) = &config.epsilon {
            options.epsilon = logic::parse_rational(epsilon)?;
        }
        let solution_writer = match &config.output {
            Some(OutputConfig::File { path }) => SolutionWriter::JsonFile(path.clone()),
            Some(OutputConfig::Stdout) | None => SolutionWriter::Stdout,
        };
        let stats_writer = match &config.stats {
            Some(OutputConfig::File { path }) => StatsWriter::JsonFile(path.clone()),
            Some(OutputConfig::Stdout) | None => StatsWriter::Empty,
        };
        let dump_root = config
            .dump
            .as_ref()
            .map(|DumpConfig::Directory { path }| path.clone());
        Ok(RunSetup {
            inputs: config.inputs,
            solution_writer,
            stats_writer,
            dump_root,
            options,
        })
    } else {
        // clap guarantees model and depth are present together
        let model = cli.model.clone().expect("no model");
        let depth = cli.depth.expect("no depth");
        let solution_writer = match &cli.output {
            Some(path) => SolutionWriter::JsonFile(path.clone()),
            None => SolutionWriter::Stdout,
        };
        let stats_writer = match &cli.stats {
            Some(path) => StatsWriter::JsonFile(path.clone()),
            None => StatsWriter::Empty,
        };
        Ok(RunSetup {
            inputs: vec![RelaxationInput { model, depth }],
            solution_writer,
            stats_writer,
            dump_root: cli.dump.clone(),
            options,
        })
    }
}

fn run_input(input: &RelaxationInput, setup: &RunSetup) -> Result<(), Error> {
    let now = chrono::Local::now();
    let timestamp = now.to_rfc3339();

    let mut dump = match &setup.dump_root {
        Some(root) => {
            DumpHandler::directory(root.join(now.format("%Y-%m-%d_%H-%M-%S-%f").to_string()))
        }
        None => DumpHandler::noop(),
    };

    let model_text = fs::read_to_string(&input.model)?;
    let system = StaticSystem::from_json(&model_text)?;

    let options = RelaxationOptions {
        depth: input.depth,
        ..setup.options.clone()
    };
    let result = relax(&system, &options, &mut dump)?;

    let model_name = input.model.display().to_string();
    setup.solution_writer.write_solutions(&SolutionRecord {
        model: &model_name,
        timestamp: &timestamp,
        depth: input.depth,
        supported: result.supported(),
        solutions: result.solutions(),
    })?;

    let mut stats = result.stats().to_json();
    if let Value::Object(record) = &mut stats {
        record.insert("depth".to_owned(), Value::from(input.depth));
        record.insert(
            "grid_points".to_owned(),
            Value::from(options.grid_points as u64),
        );
        record.insert(
            "supported_optima".to_owned(),
            Value::from(result.supported()),
        );
    }
    setup.stats_writer.write_stats(&model_name, &timestamp, stats)?;
    Ok(())
}
