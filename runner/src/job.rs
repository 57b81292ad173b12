use crate::config::Assignment;
use sha2::{Digest, Sha256};
use std::{
    fmt,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

/// hex characters kept from the digest
const ID_LENGTH: usize = 32;

/// Hands out job ids derived from the parameter content plus a run-unique salt.
/// The salt is a wall clock seed taken once and a counter bumped for every id,
/// so identical parameter sets never share an id within a run and ids differ across runs.
#[derive(Debug, Clone)]
pub struct IdSource {
    seed: u128,
    counter: u64,
}

impl IdSource {
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos())
            .unwrap_or_default();

        Self::with_seed(seed)
    }

    pub fn with_seed(seed: u128) -> Self {
        Self { seed, counter: 0 }
    }

    pub fn next_id(&mut self, content: &str) -> String {
        self.counter += 1;

        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        hasher.update(b" ");
        hasher.update(self.seed.to_le_bytes());
        hasher.update(self.counter.to_le_bytes());

        hasher
            .finalize()
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect::<String>()[..ID_LENGTH]
            .to_owned()
    }
}

impl Default for IdSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Information on a single, separate run
#[derive(Debug, Clone)]
pub struct Job {
    assignment: Assignment,
    id: String,
    path: PathBuf,
}

impl Job {
    pub fn new(assignment: Assignment, root: &Path, ids: &mut IdSource) -> Self {
        // BTreeMap keeps the serialized content independent of insertion order
        let content = serde_json::to_string(&assignment)
            .unwrap_or_else(|_| format!("{assignment:?}"));
        let id = ids.next_id(&content);
        let path = root.join(format!("job_{id}"));

        Self {
            assignment,
            id,
            path,
        }
    }

    pub fn assignment(&self) -> &Assignment {
        &self.assignment
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}
