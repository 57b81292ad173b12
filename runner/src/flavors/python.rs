use super::{ScriptError, ScriptPlan};
use crate::{
    distributor::jobs_per_node,
    script::{RunScript, ScriptInfo, PYTHON_SHEBANG},
};
use tracing::info;

const OUT_FILE: &str = "run.py";

const PROLOGUE: &[&str] = &[
    "from multiprocessing import Pool",
    "from datetime import datetime",
    "import subprocess",
    "",
    "",
    "class Job(object):",
    "    def __init__(self, dir, command, label):",
    "        self.label = label",
    "        self.dir = dir",
    "        self.command = command",
    "",
    "    def __str__(self):",
    "        return self.label + ' ' + self.dir",
    "",
    "    def run(self):",
    "        subprocess.run(self.command, shell=True, cwd=self.dir)",
    "",
    "",
    "def job_starter(job):",
    "    print('[' + str(datetime.now()) + '] ' + str(job))",
    "    job.run()",
    "",
    "",
    "if __name__ == '__main__':",
];

/// Python string literal for `text`; JSON string escapes are valid in Python
fn quoted(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| format!("{text:?}"))
}

/// Single aggregated script dispatching all jobs on a bounded process pool
pub fn python_script(plan: &ScriptPlan) -> Result<RunScript, ScriptError> {
    if plan.jobs.is_empty() {
        return Err(ScriptError::NoJobs);
    }

    let exec = plan.exec;
    let n_proc = jobs_per_node(exec.max_cores, exec.threads)?;
    let command = exec
        .job_preamble
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(plan.command))
        .collect::<Vec<_>>()
        .join(" && ");
    let total = plan.jobs.len();

    let mut main_text = vec![String::from("    jobs = [")];
    main_text.extend(plan.jobs.iter().enumerate().map(|(k, job)| {
        format!(
            "        Job({}, {}, \"{}/{total}\"),",
            quoted(&job.path().to_string_lossy()),
            quoted(&command),
            k + 1
        )
    }));
    main_text.push(String::from("    ]"));

    let script = RunScript {
        shebang: PYTHON_SHEBANG,
        preamble: PROLOGUE.iter().map(|line| (*line).to_owned()).collect(),
        main_text,
        epilogue: vec![
            format!("    n_proc = {n_proc}"),
            String::from("    with Pool(n_proc) as p:"),
            String::from("        p.map(job_starter, jobs)"),
        ],
        filename: plan.root.join(OUT_FILE),
        info: ScriptInfo {
            n_jobs: total,
            n_threads: exec.threads,
            max_cores: Some(exec.max_cores),
        },
    };
    info!("{script}");

    Ok(script)
}
