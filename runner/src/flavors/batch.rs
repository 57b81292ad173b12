use super::{ScriptError, ScriptPlan};
use crate::{
    distributor::distribute,
    script::{RunScript, ScriptInfo, BASH_SHEBANG},
};
use tracing::info;

const OUT_FILE: &str = "run.sh";

/// Single shell script running the jobs in waves that fit on this machine,
/// each wave backgrounded and awaited before the next one starts
pub fn batch_script(plan: &ScriptPlan) -> Result<RunScript, ScriptError> {
    let exec = plan.exec;
    let waves = distribute(plan.jobs.len(), exec.max_cores, exec.threads)?;
    let n_waves = waves.len();
    let mut remaining = plan.jobs.iter();

    let mut main_text = exec.preamble_commands.clone();
    main_text.push(String::new());

    for (n, count) in waves.into_iter().enumerate() {
        main_text.push(format!("# wave {}/{n_waves}", n + 1));
        main_text.extend(
            remaining
                .by_ref()
                .take(count)
                .map(|job| plan.background_line(job)),
        );
        if n + 1 < n_waves {
            main_text.push(String::from("wait"));
        }
        main_text.push(String::new());
    }

    let script = RunScript {
        shebang: BASH_SHEBANG,
        preamble: Vec::new(),
        main_text,
        epilogue: vec![String::from("wait")],
        filename: plan.root.join(OUT_FILE),
        info: ScriptInfo {
            n_jobs: plan.jobs.len(),
            n_threads: exec.threads,
            max_cores: Some(exec.max_cores),
        },
    };
    info!("{script}");

    Ok(script)
}
