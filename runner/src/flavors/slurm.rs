use super::{ScriptError, ScriptPlan};
use crate::{
    distributor::distribute,
    formats::scalar_text,
    script::{shell_quote, suffixed_filename, RunScript, ScriptInfo, BASH_SHEBANG},
};
use std::path::Path;
use tracing::info;

const OUT_FILE: &str = "run.sh";

fn quoted_path(path: &Path) -> String {
    shell_quote(&path.to_string_lossy())
}

/// `#SBATCH` lines shared by every script of a collection
fn directives(plan: &ScriptPlan) -> Result<Vec<String>, ScriptError> {
    let exec = plan.exec;
    let mut lines = Vec::new();

    if exec.hours.is_some() || exec.minutes.is_some() {
        let minutes = exec.hours.unwrap_or(0) * 60 + exec.minutes.unwrap_or(0);
        lines.push(format!("#SBATCH --time={}:{:02}:00", minutes / 60, minutes % 60));
    }
    if let Some(memory) = &exec.memory {
        lines.push(format!("#SBATCH --mem={memory}"));
    }
    if let Some(partition) = &exec.partition {
        lines.push(format!("#SBATCH --partition={partition}"));
    }
    if let Some(constraint) = &exec.constraint {
        lines.push(format!("#SBATCH --constraint={constraint}"));
    }

    // verbatim entries go last so they win over the generated ones
    for (key, value) in plan.slurm.iter() {
        lines.push(format!(
            "#SBATCH --{}={}",
            scalar_text(key)?,
            scalar_text(value)?
        ));
    }

    Ok(lines)
}

/// One script per job, each changing into the job directory itself
pub fn job_scripts(plan: &ScriptPlan) -> Result<Vec<RunScript>, ScriptError> {
    let exec = plan.exec;
    let shared = directives(plan)?;
    let mut scripts = Vec::with_capacity(plan.jobs.len());

    for (n, job) in plan.jobs.iter().enumerate() {
        let mut preamble = Vec::new();
        if exec.threads > 1 {
            preamble.push(format!("#SBATCH --cpus-per-task={}", exec.threads));
        }
        preamble.extend(shared.iter().cloned());
        preamble.push(format!("#SBATCH --chdir={}", quoted_path(job.path())));
        preamble.push(format!(
            "#SBATCH --output={}",
            quoted_path(&job.path().join(&exec.log))
        ));
        preamble.push(format!(
            "#SBATCH --error={}",
            quoted_path(&job.path().join("error.log"))
        ));
        preamble.push(String::new());

        let mut main_text = exec.preamble_commands.clone();
        main_text.push(String::new());
        main_text.extend(exec.job_preamble.iter().cloned());
        main_text.push(format!("{} &", plan.command));
        main_text.push(String::from("sleep 0.5"));

        let script = RunScript {
            shebang: BASH_SHEBANG,
            preamble,
            main_text,
            epilogue: vec![String::new(), String::from("wait")],
            filename: plan.root.join(suffixed_filename(OUT_FILE, n + 1)),
            info: ScriptInfo {
                n_jobs: 1,
                n_threads: exec.threads,
                max_cores: None,
            },
        };
        info!("{script}");
        scripts.push(script);
    }

    Ok(scripts)
}

/// One script per node, jobs packed with the node distributor
pub fn node_scripts(plan: &ScriptPlan) -> Result<Vec<RunScript>, ScriptError> {
    let exec = plan.exec;
    let allocation = distribute(plan.jobs.len(), exec.max_cores, exec.threads)?;
    let shared = directives(plan)?;
    let mut remaining = plan.jobs.iter();
    let mut scripts = Vec::with_capacity(allocation.len());

    for (n, count) in allocation.into_iter().enumerate() {
        let mut preamble = vec![
            String::from("#SBATCH --nodes=1"),
            format!("#SBATCH --ntasks={count}"),
            format!("#SBATCH --cpus-per-task={}", exec.threads),
        ];
        preamble.extend(shared.iter().cloned());
        preamble.push(format!(
            "#SBATCH --output={}",
            quoted_path(&plan.root.join(format!("node_{}.log", n + 1)))
        ));
        preamble.push(String::new());

        let mut main_text = exec.preamble_commands.clone();
        main_text.push(String::new());
        main_text.extend(
            remaining
                .by_ref()
                .take(count)
                .map(|job| plan.background_line(job)),
        );

        let script = RunScript {
            shebang: BASH_SHEBANG,
            preamble,
            main_text,
            epilogue: vec![String::new(), String::from("wait")],
            filename: plan.root.join(suffixed_filename(OUT_FILE, n + 1)),
            info: ScriptInfo {
                n_jobs: count,
                n_threads: exec.threads,
                max_cores: Some(exec.max_cores),
            },
        };
        info!("{script}");
        scripts.push(script);
    }

    Ok(scripts)
}
