use crate::{
    collection::{assignments, run_sweep, RunCollection, RunError},
    config::{Assignment, ConfigErrors, SweepConfig},
    distributor::CapacityError,
    executors::ExecutorError,
};
use std::{fs, os::unix::fs::PermissionsExt, path::PathBuf};
use tempfile::TempDir;

fn sweep(yaml: &str) -> SweepConfig {
    SweepConfig::from_yaml(yaml).unwrap()
}

/// 4 x 5 = 20 jobs
const TWENTY_JOBS: &str = "
variable:
  a: {order: 1, values: [1, 2, 3, 4]}
  b: {order: 2, values: [v, w, x, y, z]}
fixed:
  steps: 10
";

fn with_exec(exec_param: &str) -> SweepConfig {
    sweep(&format!("{TWENTY_JOBS}exec_param: {exec_param}\n"))
}

fn read_scripts(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|path| fs::read_to_string(path).unwrap())
        .collect()
}

#[test]
pub fn fixed_overrides_and_param_sets_follow() {
    let config = sweep(
        "
variable:
  a: {order: 1, values: [1, 2]}
param_sets:
  - {a: 9, extra: yes}
fixed:
  a: 0
  b: fixed
",
    );
    let expected: Vec<Assignment> = serde_yaml::from_str(
        "[{a: 0, b: fixed}, {a: 0, b: fixed}, {a: 0, b: fixed, extra: yes}]",
    )
    .unwrap();

    assert_eq!(assignments(&config).unwrap(), expected);
}

#[test]
pub fn param_sets_alone() {
    let config = sweep("param_sets: [{x: 1}, {x: 2}]");

    assert_eq!(assignments(&config).unwrap().len(), 2);
}

#[test]
pub fn fixed_alone_is_one_job() {
    let config = sweep("fixed: {x: 1}");

    assert_eq!(
        assignments(&config).unwrap(),
        vec![serde_yaml::from_str::<Assignment>("{x: 1}").unwrap()]
    );
}

#[test]
pub fn malformed_levels_fail_construction() {
    let dir = TempDir::new().unwrap();
    let config = sweep(
        "
variable:
  a: {order: 1, values: [1]}
  b: {order: 1, values: [2]}
exec_param: {exec: a.out}
",
    );

    assert!(matches!(
        RunCollection::new(config, dir.path()),
        Err(RunError::Config(ConfigErrors::InvalidLevel { level: 1, .. }))
    ));
}

#[test]
pub fn materialize_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let run = RunCollection::new(with_exec("{exec: a.out, config: plain, order: [b]}"), dir.path())
        .unwrap();

    run.materialize().unwrap();
    let first: Vec<String> = run
        .jobs()
        .iter()
        .map(|job| fs::read_to_string(job.path().join("setup.inp")).unwrap())
        .collect();

    run.materialize().unwrap();
    let second: Vec<String> = run
        .jobs()
        .iter()
        .map(|job| fs::read_to_string(job.path().join("setup.inp")).unwrap())
        .collect();

    assert_eq!(first.len(), 20);
    assert_eq!(first, second);
    assert_eq!(first[0], "b ! v\na ! 1\nsteps ! 10\n");
    assert_eq!(fs::read_dir(run.root()).unwrap().count(), 20);
}

#[test]
pub fn copies_files_and_marks_them_executable() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("solver"), "#!/bin/sh\n").unwrap();
    fs::create_dir(dir.path().join("data")).unwrap();
    fs::write(dir.path().join("data/a.dat"), "1").unwrap();
    fs::write(dir.path().join("data/b.dat"), "2").unwrap();
    fs::write(dir.path().join("data/c.txt"), "3").unwrap();

    let run = RunCollection::new(
        sweep("fixed: {x: 1}\nexec_param: {exec: solver, copy_files: [solver, 'data/*.dat']}"),
        dir.path(),
    )
    .unwrap();
    run.materialize().unwrap();

    let job = &run.jobs()[0];
    for copied in ["solver", "a.dat", "b.dat"] {
        let mode = fs::metadata(job.path().join(copied))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o111, 0o111, "{copied} is not executable");
    }
    assert!(!job.path().join("c.txt").exists());
    assert!(!job.path().join("data").exists());
}

#[test]
pub fn absolute_copy_entry_lands_in_job_directory() {
    let dir = TempDir::new().unwrap();
    let outside = TempDir::new().unwrap();
    let solver = outside.path().join("solver");
    fs::write(&solver, "#!/bin/sh\necho simulating\n").unwrap();

    let run = RunCollection::new(
        sweep(&format!(
            "fixed: {{x: 1}}\nexec_param: {{exec: solver, copy_files: ['{}']}}",
            solver.display()
        )),
        dir.path(),
    )
    .unwrap();
    run.materialize().unwrap();

    assert_eq!(fs::read_to_string(&solver).unwrap(), "#!/bin/sh\necho simulating\n");
    assert_eq!(
        fs::read_to_string(run.jobs()[0].path().join("solver")).unwrap(),
        "#!/bin/sh\necho simulating\n"
    );
}

#[test]
pub fn parent_copy_entry_stays_inside_job_directory() {
    let dir = TempDir::new().unwrap();
    let workdir = dir.path().join("sweep");
    fs::create_dir(&workdir).unwrap();
    fs::write(dir.path().join("tool.sh"), "echo tool\n").unwrap();

    let run = RunCollection::new(
        sweep("fixed: {x: 1}\nexec_param: {exec: solver, copy_files: ['../tool.sh']}"),
        &workdir,
    )
    .unwrap();
    run.materialize().unwrap();

    let job = &run.jobs()[0];
    assert_eq!(fs::read_to_string(job.path().join("tool.sh")).unwrap(), "echo tool\n");
    assert_eq!(fs::read_to_string(dir.path().join("tool.sh")).unwrap(), "echo tool\n");
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
}

#[test]
pub fn colliding_copy_names_are_rejected() {
    let dir = TempDir::new().unwrap();
    for sub in ["left", "right"] {
        fs::create_dir(dir.path().join(sub)).unwrap();
        fs::write(dir.path().join(sub).join("input.dat"), sub).unwrap();
    }

    let run = RunCollection::new(
        sweep("fixed: {x: 1}\nexec_param: {exec: solver, copy_files: ['*/input.dat']}"),
        dir.path(),
    )
    .unwrap();

    assert!(matches!(
        run.materialize(),
        Err(RunError::Config(ConfigErrors::InvalidParameter {
            name: "copy_files",
            ..
        }))
    ));
    assert!(!run.root().exists());
}

#[test]
pub fn missing_copy_source_is_a_resource_error() {
    let dir = TempDir::new().unwrap();
    let run = RunCollection::new(
        sweep("fixed: {x: 1}\nexec_param: {exec: solver, copy_files: [solver]}"),
        dir.path(),
    )
    .unwrap();

    match run.materialize() {
        Err(RunError::Resource { path, .. }) => assert_eq!(path, dir.path().join("solver")),
        other => panic!("expected a resource error, got {other:?}"),
    }
}

#[test]
pub fn unsupported_config_fails_before_io() {
    let dir = TempDir::new().unwrap();
    let result = RunCollection::new(with_exec("{exec: a.out, config: toml}"), dir.path());

    assert!(matches!(
        result,
        Err(RunError::Config(ConfigErrors::UnsupportedConfigFormat(_)))
    ));
    assert!(!dir.path().join("run").exists());
}

#[test]
pub fn missing_executable_fails_before_io() {
    let dir = TempDir::new().unwrap();
    let result = RunCollection::new(sweep(TWENTY_JOBS), dir.path());

    assert!(matches!(
        result,
        Err(RunError::Config(ConfigErrors::MissingParameter("exec")))
    ));
    assert!(!dir.path().join("run").exists());
}

#[test]
pub fn bad_ordered_key_leaves_tree_untouched() {
    let dir = TempDir::new().unwrap();
    let run = RunCollection::new(
        with_exec("{exec: a.out, config: plain, order: [missing]}"),
        dir.path(),
    )
    .unwrap();

    assert!(matches!(run.materialize(), Err(RunError::Format { .. })));
    assert!(!run.root().exists());
}

#[test]
pub fn one_slurm_script_per_job() {
    let dir = TempDir::new().unwrap();
    let run = RunCollection::new(
        sweep(&format!(
            "{TWENTY_JOBS}exec_param: {{exec: a.out, partition: short}}\nslurm: {{account: physics}}\n"
        )),
        dir.path(),
    )
    .unwrap();

    let scripts = run.generate_scripts().unwrap();
    assert_eq!(scripts.len(), 20);
    assert_eq!(scripts[0], run.root().join("run_1.sh"));
    assert_eq!(scripts[19], run.root().join("run_20.sh"));

    let text = &read_scripts(&scripts)[4];
    let job = &run.jobs()[4];
    assert!(text.starts_with("#!/bin/bash\n"));
    assert!(text.contains(&format!("#SBATCH --chdir={}\n", job.path().display())));
    assert!(text.contains("#SBATCH --partition=short\n#SBATCH --account=physics\n"));
    assert!(text.contains("./a.out -i setup.inp -o logfile.log &\nsleep 0.5\n"));
    assert!(text.ends_with("\nwait\n"));
}

#[test]
pub fn node_packed_slurm_scripts() {
    let dir = TempDir::new().unwrap();
    let run = RunCollection::new(
        with_exec("{exec: a.out, pack_nodes: true, max_cores: 6, threads: 2}"),
        dir.path(),
    )
    .unwrap();

    let scripts = read_scripts(&run.generate_scripts().unwrap());
    assert_eq!(scripts.len(), 7);
    assert!(scripts[0].contains("#SBATCH --ntasks=3\n#SBATCH --cpus-per-task=2\n"));
    assert!(scripts[6].contains("#SBATCH --ntasks=2\n"));

    // every job lands in exactly one script, in order
    let all = scripts.concat();
    let mut last = 0;
    for job in run.jobs() {
        let line = format!("(cd {} && ./a.out", job.path().display());
        let position = all.find(&line).unwrap();
        assert!(position > last);
        assert_eq!(all.matches(&line).count(), 1);
        last = position;
    }
}

#[test]
pub fn oversized_tasks_fail_before_scripts() {
    let dir = TempDir::new().unwrap();
    let result = RunCollection::new(
        with_exec("{exec: a.out, type: batch, max_cores: 2, threads: 4}"),
        dir.path(),
    );

    assert!(matches!(
        result,
        Err(RunError::Capacity(CapacityError {
            max_threads_per_node: 2,
            threads_per_task: 4
        }))
    ));
}

#[test]
pub fn batch_script_runs_in_waves() {
    let dir = TempDir::new().unwrap();
    let run = RunCollection::new(
        with_exec("{exec: a.out, type: batch, max_cores: 8, preamble_commands: ['module load gcc']}"),
        dir.path(),
    )
    .unwrap();

    let scripts = run.generate_scripts().unwrap();
    assert_eq!(scripts, vec![run.root().join("run.sh")]);

    let text = &read_scripts(&scripts)[0];
    assert!(text.contains("module load gcc\n"));
    assert!(text.contains("# wave 3/3\n"));
    // two waits between three waves plus the closing one
    assert_eq!(text.lines().filter(|line| *line == "wait").count(), 3);
    assert_eq!(text.matches(") &\n").count(), 20);
}

#[test]
pub fn python_script_lists_every_job() {
    let dir = TempDir::new().unwrap();
    let run = RunCollection::new(
        with_exec("{exec: a.out, type: python, max_cores: 8, threads: 2}"),
        dir.path(),
    )
    .unwrap();

    let scripts = run.generate_scripts().unwrap();
    assert_eq!(scripts, vec![run.root().join("run.py")]);

    let text = &read_scripts(&scripts)[0];
    assert!(text.starts_with("#!/usr/bin/env python3\n"));
    assert!(text.contains("    n_proc = 4\n"));
    assert!(text.contains("\"20/20\""));
    for job in run.jobs() {
        assert!(text.contains(&format!("Job(\"{}\"", job.path().display())));
    }
    assert_eq!(run.to_string(), "Python run with 20 jobs.");
}

#[test]
pub fn local_capacity_fails_before_io() {
    let dir = TempDir::new().unwrap();
    let result = run_sweep(with_exec("{exec: a.out, threads: 4}"), dir.path(), true);

    assert!(matches!(
        result,
        Err(RunError::Executor(ExecutorError::Capacity(CapacityError {
            max_threads_per_node: 1,
            threads_per_task: 4
        })))
    ));
    assert!(!dir.path().join("run").exists());
}

#[test]
pub fn sweep_without_local_only_writes() {
    let dir = TempDir::new().unwrap();
    let report = run_sweep(with_exec("{exec: a.out, threads: 4}"), dir.path(), false).unwrap();

    assert!(report.is_none());
    assert!(dir.path().join("run/run_20.sh").is_file());
}

#[test]
pub fn job_paths_with_spaces_are_quoted() {
    let dir = TempDir::new().unwrap();
    let workdir = dir.path().join("my sweep");
    fs::create_dir(&workdir).unwrap();

    let single = RunCollection::new(with_exec("{exec: a.out}"), &workdir).unwrap();
    let job = &single.jobs()[0];
    let text = &read_scripts(&single.generate_scripts().unwrap())[0];
    assert!(text.contains(&format!("#SBATCH --chdir='{}'\n", job.path().display())));
    assert!(text.contains(&format!(
        "#SBATCH --error='{}'\n",
        job.path().join("error.log").display()
    )));

    let packed = RunCollection::new(
        with_exec("{exec: a.out, type: batch, max_cores: 4}"),
        &workdir,
    )
    .unwrap();
    let text = &read_scripts(&packed.generate_scripts().unwrap())[0];
    for job in packed.jobs() {
        assert!(text.contains(&format!("(cd '{}' && ./a.out", job.path().display())));
    }
}
