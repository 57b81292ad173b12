mod batch;
mod python;
mod slurm;

use crate::{
    config::{ExecParam, ScriptFlavor},
    distributor::CapacityError,
    formats::FormatError,
    job::Job,
    script::{shell_quote, RunScript},
};
use serde_yaml::Mapping;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Jobs do not fit on a node")]
    Capacity(#[from] CapacityError),
    #[error("Invalid scheduler directive")]
    Directive(#[from] FormatError),
    #[error("No jobs - no script")]
    NoJobs,
}

/// Everything a script builder needs to know about a collection
#[derive(Debug, Clone, Copy)]
pub struct ScriptPlan<'a> {
    pub jobs: &'a [Job],
    pub exec: &'a ExecParam,
    pub slurm: &'a Mapping,
    pub command: &'a str,
    pub root: &'a Path,
}

impl ScriptPlan<'_> {
    /// Shell line running a single job from anywhere, in the background
    pub fn background_line(&self, job: &Job) -> String {
        let cd = format!("cd {}", shell_quote(&job.path().to_string_lossy()));
        let steps = std::iter::once(cd)
            .chain(self.exec.job_preamble.iter().cloned())
            .chain(std::iter::once(self.command.to_owned()))
            .collect::<Vec<_>>();

        format!("({}) &", steps.join(" && "))
    }
}

/// Dispatch to the builder of the configured flavor.
/// Nothing is written here, see `RunScript::persist`.
pub fn build(flavor: ScriptFlavor, plan: &ScriptPlan) -> Result<Vec<RunScript>, ScriptError> {
    match flavor {
        ScriptFlavor::Slurm if plan.exec.pack_nodes => slurm::node_scripts(plan),
        ScriptFlavor::Slurm => slurm::job_scripts(plan),
        ScriptFlavor::Batch => batch::batch_script(plan).map(|script| vec![script]),
        ScriptFlavor::Python => python::python_script(plan).map(|script| vec![script]),
    }
}
