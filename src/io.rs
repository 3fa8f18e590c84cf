//! Configuration loading, dump sinks and result writers.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use fs_err as fs;
use num_traits::{Signed, ToPrimitive};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::optimizer::pareto::{Coord, Point};
use crate::Error;

/// Creates named dump locations for intermediate artifacts of a run.
///
/// The no-op variant hands out locations that discard everything; the
/// directory variant creates one subdirectory per location. Creating two
/// locations with the same name fails.
#[derive(Debug)]
pub enum DumpHandler {
    Noop,
    Directory {
        root: PathBuf,
        locations: BTreeSet<String>,
    },
}

impl DumpHandler {
    pub fn noop() -> Self {
        Self::Noop
    }

    pub fn directory(root: impl Into<PathBuf>) -> Self {
        Self::Directory {
            root: root.into(),
            locations: BTreeSet::new(),
        }
    }

    pub fn create_location(&mut self, name: &str) -> Result<DumpLocation, Error> {
        match self {
            Self::Noop => Ok(DumpLocation::Noop),
            Self::Directory { root, locations } => {
                if !locations.insert(name.to_owned()) {
                    return Err(Error::DuplicateDumpLocation(name.to_owned()));
                }
                let path = root.join(name);
                fs::create_dir_all(&path)?;
                Ok(DumpLocation::Directory(path))
            }
        }
    }
}

/// A named dump location handed out by a [`DumpHandler`].
#[derive(Debug, Clone)]
pub enum DumpLocation {
    Noop,
    Directory(PathBuf),
}

impl DumpLocation {
    /// Write one named dump file, replacing any previous content
    /// atomically.
    pub fn write(&self, name: &str, content: &str) -> Result<(), Error> {
        match self {
            Self::Noop => Ok(()),
            Self::Directory(path) => {
                let target = path.join(name);
                let staging = path.join(format!(".{}.tmp", name));
                fs::write(&staging, content)?;
                fs::rename(staging, target)?;
                Ok(())
            }
        }
    }
}

/// One relaxation task of a configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct RelaxationInput {
    /// Path to the JSON model.
    pub model: PathBuf,
    pub depth: usize,
}

/// Where solutions or statistics are written.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputConfig {
    Stdout,
    File { path: PathBuf },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DumpConfig {
    Directory { path: PathBuf },
}

/// A JSON configuration driving one or more relaxation runs.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub inputs: Vec<RelaxationInput>,
    #[serde(default)]
    pub output: Option<OutputConfig>,
    #[serde(default)]
    pub stats: Option<OutputConfig>,
    #[serde(default)]
    pub dump: Option<DumpConfig>,
    #[serde(default)]
    pub grid_points: Option<usize>,
    /// Epsilon for strict inequalities, e.g. `"1/10"`.
    #[serde(default)]
    pub epsilon: Option<String>,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| Error::Config(e.to_string()))
    }
}

/// A solved relaxation task, ready for serialization.
pub struct SolutionRecord<'a> {
    pub model: &'a str,
    pub timestamp: &'a str,
    pub depth: usize,
    pub supported: bool,
    pub solutions: &'a BTreeSet<Point>,
}

/// Writes solution records to stdout or appends them to a JSON file.
pub enum SolutionWriter {
    Stdout,
    JsonFile(PathBuf),
}

impl SolutionWriter {
    pub fn write_solutions(&self, record: &SolutionRecord<'_>) -> Result<(), Error> {
        match self {
            Self::Stdout => {
                let stdout = std::io::stdout();
                let mut out = stdout.lock();
                writeln!(out, "Model: {}", record.model)?;
                writeln!(out, "Timestamp: {}", record.timestamp)?;
                writeln!(out, "Depth: {}", record.depth)?;
                writeln!(out, "Supported: {}", record.supported)?;
                writeln!(out, "Solutions:")?;
                for point in record.solutions.iter().rev() {
                    writeln!(out, "  {}", format_point(point))?;
                }
                Ok(())
            }
            Self::JsonFile(path) => append_json(
                path,
                json!({
                    "model": record.model,
                    "timestamp": record.timestamp,
                    "depth": record.depth,
                    "supported_solution": record.supported,
                    "solution": record
                        .solutions
                        .iter()
                        .map(|point| point_to_json(point))
                        .collect::<Vec<_>>(),
                }),
            ),
        }
    }
}

/// Appends statistics objects to a JSON file.
pub enum StatsWriter {
    Empty,
    JsonFile(PathBuf),
}

impl StatsWriter {
    pub fn write_stats(&self, model: &str, timestamp: &str, stats: Value) -> Result<(), Error> {
        match self {
            Self::Empty => Ok(()),
            Self::JsonFile(path) => {
                let mut record = json!({
                    "model": model,
                    "timestamp": timestamp,
                });
                if let (Value::Object(target), Value::Object(source)) = (&mut record, stats) {
                    target.extend(source);
                }
                append_json(path, record)
            }
        }
    }
}

/// Append a record to a JSON array file, creating it when missing.
fn append_json(path: &Path, record: Value) -> Result<(), Error> {
    let mut records = match fs::read_to_string(path) {
        Ok(text) => match serde_json::from_str::<Value>(&text) {
            Ok(Value::Array(records)) => records,
            Ok(other) => vec![other],
            Err(_) => Vec::new(),
        },
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(error) => return Err(error.into()),
    };
    records.push(record);
    let text = serde_json::to_string_pretty(&Value::Array(records))
        .map_err(|e| Error::Config(e.to_string()))?;
    fs::write(path, text)?;
    Ok(())
}

pub fn format_point(point: &Point) -> String {
    let coords: Vec<String> = point.iter().map(|coord| coord.to_string()).collect();
    format!("({})", coords.join(", "))
}

/// A solution tuple as JSON: numbers, with `"inf"` for unbounded
/// coordinates. Exact rationals are only narrowed to doubles here, at the
/// serialization boundary.
fn point_to_json(point: &Point) -> Value {
    Value::Array(
        point
            .iter()
            .map(|coord| match coord {
                Coord::Infinite => json!("inf"),
                Coord::Finite(value) => {
                    let narrowed = value.to_f64().unwrap_or_else(|| {
                        if value.is_negative() {
                            f64::NEG_INFINITY
                        } else {
                            f64::INFINITY
                        }
                    });
                    json!(narrowed)
                }
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::Rational;

    #[test]
    fn noop_handler_accepts_duplicate_names() {
        let mut handler = DumpHandler::noop();
        let location = handler.create_location("trace").unwrap();
        location.write("0.json", "{}").unwrap();
        assert!(handler.create_location("trace").is_ok());
    }

    #[test]
    fn directory_handler_rejects_duplicate_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut handler = DumpHandler::directory(dir.path());
        handler.create_location("trace").unwrap();
        let error = handler.create_location("trace").unwrap_err();
        assert!(error.to_string().contains("trace already exists"));
    }

    #[test]
    fn directory_location_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut handler = DumpHandler::directory(dir.path());
        let location = handler.create_location("qe_input").unwrap();
        location.write("0.smt2", "(assert true)").unwrap();
        location.write("0.smt2", "(assert false)").unwrap();
        let content = fs::read_to_string(dir.path().join("qe_input").join("0.smt2")).unwrap();
        assert_eq!(content, "(assert false)");
    }

    #[test]
    fn json_append_accumulates_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("solutions.json");
        append_json(&path, json!({"a": 1})).unwrap();
        append_json(&path, json!({"b": 2})).unwrap();
        let parsed: Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
    }

    #[test]
    fn points_serialize_with_inf_sentinel() {
        let point: Point = vec![
            Coord::Finite(Rational::new(49.into(), 10.into())),
            Coord::Infinite,
        ];
        assert_eq!(point_to_json(&point), json!([4.9, "inf"]));
        assert_eq!(format_point(&point), "(49/10, inf)");
    }

    #[test]
    fn config_parses_inputs_and_options() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{
                "inputs": [{"model": "model.json", "depth": 3}],
                "output": {"type": "file", "path": "out.json"},
                "dump": {"type": "directory", "path": "dumps"},
                "grid_points": 3,
                "epsilon": "1/100"
            }"#,
        )
        .unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.inputs.len(), 1);
        assert_eq!(config.inputs[0].depth, 3);
        assert_eq!(config.grid_points, Some(3));
        assert_eq!(config.epsilon.as_deref(), Some("1/100"));
    }
}
