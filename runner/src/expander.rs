use crate::config::{Assignment, ConfigErrors};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use tracing::{debug, error};

/// One entry of the `variable` section, as written in the input document
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LevelEntry {
    pub order: usize,
    pub values: Vec<Value>,
}

/// A single level after validation
#[derive(Clone, Debug, PartialEq)]
pub struct Level {
    pub name: String,
    pub values: Vec<Value>,
}

/// Validated variable section, levels sorted by ascending order.
/// Only constructible through `LeveledSpec::new`, which enforces one entry per level.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LeveledSpec {
    levels: Vec<Level>,
}

impl LeveledSpec {
    pub fn new(variables: &BTreeMap<String, LevelEntry>) -> Result<Self, ConfigErrors> {
        let depth = variables.len();
        let mut slots: Vec<Vec<(&String, &LevelEntry)>> = vec![Vec::new(); depth];
        let mut stray = Vec::new();

        for (name, entry) in variables.iter() {
            match entry.order.checked_sub(1).and_then(|index| slots.get_mut(index)) {
                Some(slot) => slot.push((name, entry)),
                None => stray.push(entry.order),
            }
        }

        // out-of-range orders always leave some level in 1..=depth empty, report that one
        let mut levels = Vec::with_capacity(depth);
        for (index, slot) in slots.into_iter().enumerate() {
            let level = index + 1;

            match slot.as_slice() {
                [(name, entry)] => levels.push(Level {
                    name: (*name).clone(),
                    values: entry.values.clone(),
                }),
                entries => {
                    error!(
                        level,
                        found = entries.len(),
                        stray = ?stray,
                        "Duplicate or missing order in the variable section"
                    );

                    return Err(ConfigErrors::InvalidLevel {
                        level,
                        found: entries.len(),
                    });
                }
            }
        }

        Ok(Self { levels })
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// number of assignments `expand` will produce
    pub fn size(&self) -> usize {
        self.levels.iter().map(|level| level.values.len()).product()
    }

    pub fn expand(&self) -> Vec<Assignment> {
        debug!(depth = self.depth(), size = self.size(), "Expanding variables");

        expand(&self.levels)
    }
}

/// Full cross product of `levels`: outer loop over the first level's values in
/// the given order, inner loop over every combination of the remaining levels.
/// An empty slice yields a single empty assignment.
pub fn expand(levels: &[Level]) -> Vec<Assignment> {
    let Some((current, rest)) = levels.split_first() else {
        return vec![Assignment::new()];
    };

    let remainder = expand(rest);
    let mut all = Vec::with_capacity(current.values.len() * remainder.len());

    for value in current.values.iter() {
        for lower in remainder.iter() {
            let mut assignment = lower.clone();
            assignment.insert(current.name.clone(), value.clone());
            all.push(assignment);
        }
    }

    all
}
