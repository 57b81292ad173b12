use crate::config::{ConfigErrors, ConfigFormat, ExecParam, ScriptFlavor, SweepConfig};
use std::time::Duration;

#[test]
pub fn defaults_fill_missing_options() {
    let config = SweepConfig::from_yaml("exec_param: {exec: solver}").unwrap();
    let exec = &config.exec_param;

    assert_eq!(exec.sep, "!");
    assert_eq!(exec.inp, "setup.inp");
    assert_eq!(exec.log, "logfile.log");
    assert_eq!(exec.dir, "run");
    assert_eq!(exec.format().unwrap(), ConfigFormat::Json);
    assert_eq!(exec.flavor().unwrap(), ScriptFlavor::Slurm);
    assert_eq!(exec.command().unwrap(), "./solver -i setup.inp -o logfile.log");
    assert!(config.variable.is_empty());
    assert!(config.slurm.is_empty());
    assert!(exec.preflight_checks().is_ok());
}

#[test]
pub fn full_document() {
    let config = SweepConfig::from_yaml(
        "
variable:
  temperature: {order: 1, values: [1.0, 2.0]}
  size: {order: 2, values: [8, 16, 32]}
param_sets:
  - {temperature: 9.0, size: 4}
fixed:
  steps: 1000
exec_param:
  executable: mc
  type: Batch
  config: plain
  threads: 2
  max_cores: 8
  hours: 1
  minutes: 30
slurm:
  account: physics
  qos: normal
",
    )
    .unwrap();

    assert_eq!(config.variable["size"].order, 2);
    assert_eq!(config.param_sets.len(), 1);
    assert_eq!(config.exec_param.exec.as_deref(), Some("mc"));
    assert_eq!(config.exec_param.flavor().unwrap(), ScriptFlavor::Batch);
    assert_eq!(config.exec_param.walltime(), Some(Duration::from_secs(5400)));

    let keys: Vec<&str> = config
        .slurm
        .iter()
        .filter_map(|(key, _)| key.as_str())
        .collect();
    assert_eq!(keys, vec!["account", "qos"]);
}

#[test]
pub fn unknown_keys_are_rejected() {
    assert!(matches!(
        SweepConfig::from_yaml("varaible: {}"),
        Err(ConfigErrors::Deserialize(_))
    ));
}

#[test]
pub fn unsupported_names() {
    let exec = ExecParam {
        config: String::from("toml"),
        script_type: String::from("pbs"),
        exec: Some(String::from("a.out")),
        ..ExecParam::default()
    };

    assert!(matches!(exec.format(), Err(ConfigErrors::UnsupportedConfigFormat(name)) if name == "toml"));
    assert!(matches!(exec.flavor(), Err(ConfigErrors::UnsupportedScriptType(name)) if name == "pbs"));
    assert!(matches!(
        exec.preflight_checks(),
        Err(ConfigErrors::UnsupportedConfigFormat(_))
    ));
}

#[test]
pub fn exec_required_by_template() {
    let exec = ExecParam::default();
    assert!(matches!(
        exec.command(),
        Err(ConfigErrors::MissingParameter("exec"))
    ));

    let exec = ExecParam {
        exec_command: String::from("python sim.py {inp} > {log}"),
        ..ExecParam::default()
    };
    assert_eq!(exec.command().unwrap(), "python sim.py setup.inp > logfile.log");
}

#[test]
pub fn zero_threads_is_invalid() {
    let exec = ExecParam {
        exec: Some(String::from("a.out")),
        threads: 0,
        ..ExecParam::default()
    };

    assert!(matches!(
        exec.preflight_checks(),
        Err(ConfigErrors::InvalidParameter { name: "threads", .. })
    ));
}
