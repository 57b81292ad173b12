use crate::expander::LevelEntry;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::{collections::BTreeMap, fmt, fs, io::Error, path::Path, str::FromStr, time::Duration};
use thiserror::Error;
use tracing::error;

/// a single concrete parameter set, one value per variable
pub type Assignment = BTreeMap<String, Value>;

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Level {level} of the variable section has {found} entries, expected exactly one")]
    InvalidLevel { level: usize, found: usize },
    #[error("Type of configuration file not supported: {0}")]
    UnsupportedConfigFormat(String),
    #[error("Script type not supported: {0}")]
    UnsupportedScriptType(String),
    #[error("Missing required execution parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid execution parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("Failed to read input document")]
    Read(#[from] Error),
    #[error("Failed to parse input document")]
    Deserialize(#[from] serde_yaml::Error),
}

/// The input document of a sweep
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct SweepConfig {
    // leveled variables, expanded into their full cross product
    #[serde(default)]
    pub variable: BTreeMap<String, LevelEntry>,
    // literal parameter sets appended after the expansion
    #[serde(default)]
    pub param_sets: Vec<Assignment>,
    // merged into every job, wins over variable values
    #[serde(default)]
    pub fixed: Assignment,
    #[serde(default)]
    pub exec_param: ExecParam,
    // scheduler directives, emitted verbatim and in document order
    #[serde(default)]
    pub slurm: Mapping,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default, deny_unknown_fields)]
pub struct ExecParam {
    pub copy_files: Vec<String>,
    pub sep: String,
    pub order: Vec<String>,
    pub preamble_commands: Vec<String>,
    pub job_preamble: Vec<String>,
    pub inp: String,
    pub log: String,
    pub exec_command: String,
    #[serde(alias = "executable")]
    pub exec: Option<String>,
    pub dir: String,
    // see ScriptFlavor::from_str
    #[serde(rename = "type")]
    pub script_type: String,
    // see ConfigFormat::from_str
    pub config: String,
    // one script per node instead of one per job, slurm only
    pub pack_nodes: bool,

    // scheduler specific
    pub threads: usize,
    pub max_cores: usize,
    pub minutes: Option<u64>,
    pub hours: Option<u64>,
    pub memory: Option<String>,
    pub partition: Option<String>,
    pub constraint: Option<String>,
}

impl Default for ExecParam {
    fn default() -> Self {
        Self {
            copy_files: Vec::new(),
            sep: String::from("!"),
            order: Vec::new(),
            preamble_commands: Vec::new(),
            job_preamble: Vec::new(),
            inp: String::from("setup.inp"),
            log: String::from("logfile.log"),
            exec_command: String::from("./{exec} -i {inp} -o {log}"),
            exec: None,
            dir: String::from("run"),
            script_type: String::from("slurm"),
            config: String::from("json"),
            pack_nodes: false,
            threads: 1,
            max_cores: 1,
            minutes: None,
            hours: None,
            memory: None,
            partition: None,
            constraint: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Plain,
    Json,
    Yaml,
    Ini,
}

impl FromStr for ConfigFormat {
    type Err = ConfigErrors;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_lowercase().as_str() {
            "plain" => Ok(Self::Plain),
            "json" => Ok(Self::Json),
            "yaml" => Ok(Self::Yaml),
            "ini" => Ok(Self::Ini),
            _ => Err(ConfigErrors::UnsupportedConfigFormat(name.to_owned())),
        }
    }
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plain => "plain",
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Ini => "ini",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptFlavor {
    Slurm,
    Batch,
    Python,
}

impl FromStr for ScriptFlavor {
    type Err = ConfigErrors;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_lowercase().as_str() {
            "slurm" => Ok(Self::Slurm),
            "batch" => Ok(Self::Batch),
            "python" => Ok(Self::Python),
            _ => Err(ConfigErrors::UnsupportedScriptType(name.to_owned())),
        }
    }
}

impl SweepConfig {
    /// load and parse an input document from disk
    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        let text = fs::read_to_string(path)?;

        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigErrors> {
        Ok(serde_yaml::from_str(text)?)
    }
}

impl ExecParam {
    pub fn format(&self) -> Result<ConfigFormat, ConfigErrors> {
        self.config.parse()
    }

    pub fn flavor(&self) -> Result<ScriptFlavor, ConfigErrors> {
        self.script_type.parse()
    }

    /// wall time of a single job, if any was configured
    pub fn walltime(&self) -> Option<Duration> {
        match (self.hours, self.minutes) {
            (None, None) => None,
            (hours, minutes) => Some(Duration::from_secs(
                hours.unwrap_or(0) * 3600 + minutes.unwrap_or(0) * 60,
            )),
        }
    }

    /// the invocation line shared by all jobs, with every placeholder filled in
    pub fn command(&self) -> Result<String, ConfigErrors> {
        let mut command = self.exec_command.clone();

        if command.contains("{exec}") {
            match &self.exec {
                Some(exec) => command = command.replace("{exec}", exec),
                None => return Err(ConfigErrors::MissingParameter("exec")),
            }
        }

        Ok(command.replace("{inp}", &self.inp).replace("{log}", &self.log))
    }

    /// Check every execution parameter at once so users see all problems in a single run.
    /// Returns the first problem after logging all of them.
    pub fn preflight_checks(&self) -> Result<(), ConfigErrors> {
        let mut errors = Vec::new();

        let format = match self.format() {
            Ok(format) => Some(format),
            Err(e) => {
                errors.push(e);
                None
            }
        };
        if let Err(e) = self.flavor() {
            errors.push(e);
        }
        if let Err(e) = self.command() {
            errors.push(e);
        }

        if self.threads == 0 {
            errors.push(ConfigErrors::InvalidParameter {
                name: "threads",
                reason: String::from("a job needs at least one thread"),
            });
        }
        if self.max_cores == 0 {
            errors.push(ConfigErrors::InvalidParameter {
                name: "max_cores",
                reason: String::from("a node needs at least one core"),
            });
        }
        if format == Some(ConfigFormat::Plain) && self.sep.is_empty() {
            errors.push(ConfigErrors::InvalidParameter {
                name: "sep",
                reason: String::from("plain configs need a non-empty separator"),
            });
        }
        if self.dir.is_empty() {
            errors.push(ConfigErrors::MissingParameter("dir"));
        }

        for e in errors.iter() {
            error!("exec_param: {e}");
        }

        match errors.into_iter().next() {
            Some(first) => Err(first),
            None => Ok(()),
        }
    }
}
