use chrono::Local;
use once_cell::sync::Lazy;
use std::{
    fmt, fs,
    io::{self, Write},
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};
use tracing::debug;

pub const BASH_SHEBANG: &str = "#!/bin/bash";
pub const PYTHON_SHEBANG: &str = "#!/usr/bin/env python3";

const BANNER: &str =
    "################################################################################";

static HOSTNAME: Lazy<String> = Lazy::new(|| match nix::unistd::gethostname() {
    Ok(hostname) => hostname.to_string_lossy().into_owned(),
    Err(error) => {
        debug!(error = ?error, "Failed to retrieve hostname for the script header");
        String::from("unknown host")
    }
});

/// Quote `text` for a POSIX shell word. Plain words are left untouched,
/// anything else is single quoted with embedded quotes spliced in as `'\''`.
pub fn shell_quote(text: &str) -> String {
    let plain = !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+=:,@%".contains(c));

    if plain {
        text.to_owned()
    } else {
        format!("'{}'", text.replace('\'', "'\\''"))
    }
}

/// Insert `_<n>` in front of the final extension: `run.sh` -> `run_2.sh`.
/// Names without an extension get the suffix appended.
pub fn suffixed_filename(name: &str, n: usize) -> String {
    let path = Path::new(name);

    match (path.file_stem(), path.extension()) {
        (Some(stem), Some(extension)) => {
            let file_name = format!(
                "{}_{n}.{}",
                stem.to_string_lossy(),
                extension.to_string_lossy()
            );
            path.with_file_name(file_name).to_string_lossy().into_owned()
        }
        _ => format!("{name}_{n}"),
    }
}

/// Bookkeeping shown when a script is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptInfo {
    pub n_jobs: usize,
    pub n_threads: usize,
    pub max_cores: Option<usize>,
}

/// A script file, split into the directive block, the job lines and the closing lines
#[derive(Debug, Clone)]
pub struct RunScript {
    pub shebang: &'static str,
    pub preamble: Vec<String>,
    pub main_text: Vec<String>,
    pub epilogue: Vec<String>,
    pub filename: PathBuf,
    pub info: ScriptInfo,
}

impl fmt::Display for RunScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: script has {} tasks ({} threads used",
            self.filename.display(),
            self.info.n_jobs,
            self.info.n_jobs * self.info.n_threads
        )?;

        match self.info.max_cores {
            Some(max_cores) => write!(f, " of {max_cores})"),
            None => write!(f, ")"),
        }
    }
}

impl RunScript {
    /// full text of the script, including shebang and provenance header
    pub fn render(&self) -> String {
        let mut text = String::new();

        text.push_str(self.shebang);
        text.push('\n');
        text.push_str(BANNER);
        text.push_str("\n#\n");
        text.push_str(&format!(
            "# This script was produced by slurm-wrangler at {} on {}\n",
            Local::now().format("%d.%m.%Y, %H:%M:%S"),
            HOSTNAME.as_str()
        ));
        text.push_str("#\n");
        text.push_str(BANNER);
        text.push_str("\n\n\n");

        for line in self
            .preamble
            .iter()
            .chain(self.main_text.iter())
            .chain(self.epilogue.iter())
        {
            text.push_str(line);
            text.push('\n');
        }

        text
    }

    /// write the script to its file and make it executable
    pub fn persist(&self) -> io::Result<()> {
        let mut file = fs::File::create(&self.filename)?;
        file.write_all(self.render().as_bytes())?;

        let mut permissions = file.metadata()?.permissions();
        permissions.set_mode(permissions.mode() | 0o111);
        fs::set_permissions(&self.filename, permissions)
    }
}
