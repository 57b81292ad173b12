use crate::{
    config::{Assignment, ConfigErrors, ConfigFormat, ExecParam, ScriptFlavor, SweepConfig},
    distributor::{jobs_per_node, CapacityError},
    executors::{
        local::{LocalExecutor, LocalReport},
        ExecutorError,
    },
    expander::LeveledSpec,
    flavors::{self, ScriptError, ScriptPlan},
    formats::{self, FormatError, RenderOptions},
    job::{IdSource, Job},
    script::RunScript,
};
use globset::GlobBuilder;
use ignore::{DirEntry, WalkBuilder};
use itertools::Itertools;
use serde_yaml::Mapping;
use std::{
    fmt, fs, io,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum RunError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigErrors),
    #[error("Invalid node capacity: {0}")]
    Capacity(#[from] CapacityError),
    #[error("Failed to build scripts: {0}")]
    Script(#[from] ScriptError),
    #[error("Failed to access {}: {source}", .path.display())]
    Resource { path: PathBuf, source: io::Error },
    #[error("Failed to produce config file {}: {source}", .path.display())]
    Format { path: PathBuf, source: FormatError },
    #[error("Invalid copy_files pattern")]
    Glob(#[from] globset::Error),
    #[error("Local execution failed: {0}")]
    Executor(#[from] ExecutorError),
}

fn resource(path: &Path) -> impl FnOnce(io::Error) -> RunError + '_ {
    move |source| RunError::Resource {
        path: path.to_path_buf(),
        source,
    }
}

/// Expand the variable section, append the literal parameter sets and merge
/// the fixed parameters into every assignment
pub fn assignments(config: &SweepConfig) -> Result<Vec<Assignment>, ConfigErrors> {
    let spec = LeveledSpec::new(&config.variable)?;

    // the identity of an empty expansion only counts when nothing else produces jobs
    let mut all = if spec.is_empty() && !config.param_sets.is_empty() {
        Vec::new()
    } else {
        spec.expand()
    };
    all.extend(config.param_sets.iter().cloned());

    for assignment in all.iter_mut() {
        assignment.extend(
            config
                .fixed
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
    }

    Ok(all)
}

/// Build the collection, populate the job tree and write the scripts.
/// With `local` the jobs then run on this machine; the pool is sized before
/// anything touches the disk, so oversized jobs fail without leaving a tree behind.
pub fn run_sweep(
    config: SweepConfig,
    workdir: &Path,
    local: bool,
) -> Result<Option<LocalReport>, RunError> {
    let run = RunCollection::new(config, workdir)?;
    info!("{run}");

    let executor = if local {
        Some(LocalExecutor::load(&run)?)
    } else {
        None
    };

    run.materialize()?;
    let scripts = run.generate_scripts()?;
    info!("Wrote {} scripts to {}", scripts.len(), run.root().display());

    match executor {
        Some(executor) => Ok(Some(executor.execute()?)),
        None => Ok(None),
    }
}

/// Container for creating the directory tree and everything needed to run it
#[derive(Debug)]
pub struct RunCollection {
    exec: ExecParam,
    format: ConfigFormat,
    flavor: ScriptFlavor,
    slurm: Mapping,
    command: String,
    workdir: PathBuf,
    root: PathBuf,
    jobs: Vec<Job>,
}

impl RunCollection {
    /// Validate the document and build one job per assignment under `<workdir>/<dir>`.
    /// Nothing is written to disk here.
    pub fn new(config: SweepConfig, workdir: &Path) -> Result<Self, RunError> {
        Self::with_id_source(config, workdir, &mut IdSource::new())
    }

    pub fn with_id_source(
        config: SweepConfig,
        workdir: &Path,
        ids: &mut IdSource,
    ) -> Result<Self, RunError> {
        config.exec_param.preflight_checks()?;

        let format = config.exec_param.format()?;
        let flavor = config.exec_param.flavor()?;
        let command = config.exec_param.command()?;

        if config.exec_param.pack_nodes || flavor != ScriptFlavor::Slurm {
            jobs_per_node(config.exec_param.max_cores, config.exec_param.threads)?;
        }

        let root = workdir.join(&config.exec_param.dir);
        let jobs = assignments(&config)?
            .into_iter()
            .map(|assignment| Job::new(assignment, &root, ids))
            .collect_vec();

        if jobs.is_empty() {
            warn!("The sweep produced no jobs");
        }

        Ok(Self {
            exec: config.exec_param,
            format,
            flavor,
            slurm: config.slurm,
            command,
            workdir: workdir.to_path_buf(),
            root,
            jobs,
        })
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exec_param(&self) -> &ExecParam {
        &self.exec
    }

    /// invocation line shared by all jobs
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Files to copy into every job directory. Relative entries are resolved against the
    /// working directory, entries with glob metacharacters are matched against its tree.
    /// Every copy lands at the top of the job directory under its file name, so names must be unique.
    pub fn copy_sources(&self) -> Result<Vec<PathBuf>, RunError> {
        let mut sources = Vec::new();

        for entry in self.exec.copy_files.iter() {
            if !entry.contains(['*', '?', '[', '{']) {
                let path = self.workdir.join(entry);
                if !path.is_file() {
                    return Err(RunError::Resource {
                        path,
                        source: io::Error::new(io::ErrorKind::NotFound, "not a file"),
                    });
                }
                sources.push(path);
                continue;
            }

            let matcher = GlobBuilder::new(entry)
                .literal_separator(true)
                .build()?
                .compile_matcher();
            let root = self.root.clone();
            let matched = WalkBuilder::new(&self.workdir)
                .standard_filters(false)
                .filter_entry(move |path| path.path() != root.as_path())
                .build()
                .filter_map(Result::ok)
                .filter(|path| path.file_type().is_some_and(|kind| kind.is_file()))
                .map(DirEntry::into_path)
                .filter(|path| {
                    path.strip_prefix(&self.workdir)
                        .is_ok_and(|relative| matcher.is_match(relative))
                })
                .sorted()
                .collect_vec();

            if matched.is_empty() {
                warn!("copy_files pattern {entry} matched no files");
            }
            sources.extend(matched);
        }

        let duplicates = sources
            .iter()
            .filter_map(|path| path.file_name())
            .duplicates()
            .map(|name| name.to_string_lossy().into_owned())
            .collect_vec();
        if !duplicates.is_empty() {
            return Err(RunError::Config(ConfigErrors::InvalidParameter {
                name: "copy_files",
                reason: format!("file names copied more than once: {}", duplicates.join(", ")),
            }));
        }

        Ok(sources)
    }

    /// Copy `source` to the top of the job directory and mark it executable
    fn copy_into(job: &Job, source: &Path) -> Result<(), RunError> {
        let target = match source.file_name() {
            Some(name) => job.path().join(name),
            None => {
                return Err(RunError::Resource {
                    path: source.to_path_buf(),
                    source: io::Error::new(io::ErrorKind::InvalidInput, "no file name"),
                })
            }
        };

        // copying a file onto itself truncates it
        if target.exists()
            && fs::canonicalize(&target).map_err(resource(&target))?
                == fs::canonicalize(source).map_err(resource(source))?
        {
            return Err(RunError::Resource {
                path: target,
                source: io::Error::new(io::ErrorKind::InvalidInput, "copy target is its own source"),
            });
        }

        fs::copy(source, &target).map_err(resource(source))?;

        let mut permissions = fs::metadata(&target)
            .map_err(resource(&target))?
            .permissions();
        permissions.set_mode(permissions.mode() | 0o111);
        fs::set_permissions(&target, permissions).map_err(resource(&target))
    }

    /// Create every job directory, write its config file and copy the auxiliary files.
    /// Safe to repeat: existing directories are reused and files overwritten.
    pub fn materialize(&self) -> Result<(), RunError> {
        let options = RenderOptions {
            sep: &self.exec.sep,
            order: &self.exec.order,
        };

        // render everything up front so a bad parameter set fails before the tree is touched
        let mut configs = Vec::with_capacity(self.jobs.len());
        for job in self.jobs.iter() {
            let path = job.path().join(&self.exec.inp);
            match formats::render(self.format, job.assignment(), options) {
                Ok(text) => configs.push((path, text)),
                Err(source) => return Err(RunError::Format { path, source }),
            }
        }
        let sources = self.copy_sources()?;

        for (job, (config_path, text)) in self.jobs.iter().zip(configs) {
            fs::create_dir_all(job.path()).map_err(resource(job.path()))?;
            fs::write(&config_path, text).map_err(resource(&config_path))?;

            for source in sources.iter() {
                Self::copy_into(job, source)?;
            }

            debug!(job = %job, "Populated job directory");
        }

        info!(
            "Populated {} job directories under {} ({} config)",
            self.jobs.len(),
            self.root.display(),
            self.format
        );

        Ok(())
    }

    pub fn plan(&self) -> ScriptPlan<'_> {
        ScriptPlan {
            jobs: &self.jobs,
            exec: &self.exec,
            slurm: &self.slurm,
            command: &self.command,
            root: &self.root,
        }
    }

    /// build the scripts of the configured flavor without writing them
    pub fn build_scripts(&self) -> Result<Vec<RunScript>, RunError> {
        Ok(flavors::build(self.flavor, &self.plan())?)
    }

    /// Build and persist all scripts, returns the written paths
    pub fn generate_scripts(&self) -> Result<Vec<PathBuf>, RunError> {
        let scripts = self.build_scripts()?;

        fs::create_dir_all(&self.root).map_err(resource(&self.root))?;
        for script in scripts.iter() {
            script.persist().map_err(resource(&script.filename))?;
        }

        Ok(scripts.into_iter().map(|script| script.filename).collect())
    }
}

impl fmt::Display for RunCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.flavor {
            ScriptFlavor::Slurm => "SLURM",
            ScriptFlavor::Batch => "Batch",
            ScriptFlavor::Python => "Python",
        };

        write!(f, "{kind} run with {} jobs.", self.jobs.len())
    }
}
