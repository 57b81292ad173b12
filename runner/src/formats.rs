use crate::config::{Assignment, ConfigFormat};
use itertools::Itertools;
use serde::Serialize;
use serde_json::ser::{Formatter, PrettyFormatter, Serializer};
use serde_yaml::Value;
use std::{
    collections::{BTreeMap, BTreeSet},
    io::{self, Write},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Key {0} is listed in `order` but missing from the job parameters")]
    MissingOrderedKey(String),
    #[error("INI parameter {0} is neither a section nor a dotted `section.key`")]
    MissingSection(String),
    #[error("INI parameter {0} nests deeper than one section level")]
    MultiLevelKey(String),
    #[error("Failed to encode JSON config")]
    Json(#[from] serde_json::Error),
    #[error("Failed to encode YAML config")]
    Yaml(#[from] serde_yaml::Error),
}

/// Options for the line based formats
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions<'a> {
    pub sep: &'a str,
    pub order: &'a [String],
}

/// Serialize the parameters of a job into the text of its config file
pub fn render(
    format: ConfigFormat,
    assignment: &Assignment,
    options: RenderOptions,
) -> Result<String, FormatError> {
    match format {
        ConfigFormat::Plain => plain(assignment, options.sep, options.order),
        ConfigFormat::Json => json(assignment),
        ConfigFormat::Yaml => Ok(serde_yaml::to_string(assignment)?),
        ConfigFormat::Ini => ini(assignment),
    }
}

/// text of a value as it appears in line based formats
pub fn scalar_text(value: &Value) -> Result<String, FormatError> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(flag) => Ok(flag.to_string()),
        Value::Null => Ok(String::from("null")),
        nested => Ok(serde_json::to_string(nested)?),
    }
}

/// `key <sep> value` lines, keys from `order` first, then the rest
pub fn plain(assignment: &Assignment, sep: &str, order: &[String]) -> Result<String, FormatError> {
    let ordered: BTreeSet<&str> = order.iter().map(String::as_str).collect();
    let mut text = String::new();

    for key in order.iter() {
        let value = assignment
            .get(key)
            .ok_or_else(|| FormatError::MissingOrderedKey(key.clone()))?;
        text.push_str(&format!("{key} {sep} {}\n", scalar_text(value)?));
    }

    for (key, value) in assignment
        .iter()
        .filter(|(key, _)| !ordered.contains(key.as_str()))
    {
        text.push_str(&format!("{key} {sep} {}\n", scalar_text(value)?));
    }

    Ok(text)
}

/// Pretty printer writing ` : ` between keys and values
struct SpacedFormatter<'a>(PrettyFormatter<'a>);

impl Formatter for SpacedFormatter<'_> {
    fn begin_array<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.begin_array(writer)
    }

    fn end_array<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_array(writer)
    }

    fn begin_array_value<W: ?Sized + Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        self.0.begin_array_value(writer, first)
    }

    fn end_array_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_array_value(writer)
    }

    fn begin_object<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.begin_object(writer)
    }

    fn end_object<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_object(writer)
    }

    fn begin_object_key<W: ?Sized + Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        self.0.begin_object_key(writer, first)
    }

    fn begin_object_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b" : ")
    }

    fn end_object_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_object_value(writer)
    }
}

/// sorted keys at every depth, four space indent, ` : ` separators
pub fn json(assignment: &Assignment) -> Result<String, FormatError> {
    // serde_json's map is ordered, converting sorts nested mappings as well
    let sorted = serde_json::to_value(assignment)?;
    let mut buffer = Vec::new();
    let mut serializer = Serializer::with_formatter(
        &mut buffer,
        SpacedFormatter(PrettyFormatter::with_indent(b"    ")),
    );
    sorted.serialize(&mut serializer)?;

    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Mappings become `[section]` blocks and `section.key` entries are regrouped
/// into their section. Only a single level of sections is supported.
pub fn ini(assignment: &Assignment) -> Result<String, FormatError> {
    let mut sections: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();

    for (key, value) in assignment.iter() {
        match (key.split('.').collect_vec().as_slice(), value) {
            ([section], Value::Mapping(entries)) => {
                let section_entries = sections.entry((*section).to_owned()).or_default();

                for (entry_key, entry_value) in entries.iter() {
                    let entry_key = scalar_text(entry_key)?;
                    if matches!(entry_value, Value::Mapping(_)) {
                        return Err(FormatError::MultiLevelKey(format!("{key}.{entry_key}")));
                    }
                    section_entries.insert(entry_key, scalar_text(entry_value)?);
                }
            }
            ([_], _) => return Err(FormatError::MissingSection(key.clone())),
            ([section, entry_key], entry_value) => {
                if matches!(entry_value, Value::Mapping(_)) {
                    return Err(FormatError::MultiLevelKey(key.clone()));
                }
                sections
                    .entry((*section).to_owned())
                    .or_default()
                    .insert((*entry_key).to_owned(), scalar_text(entry_value)?);
            }
            _ => return Err(FormatError::MultiLevelKey(key.clone())),
        }
    }

    Ok(sections
        .iter()
        .map(|(section, entries)| {
            let body = entries
                .iter()
                .map(|(key, value)| format!("{key} = {value}\n"))
                .join("");
            format!("[{section}]\n{body}\n")
        })
        .join(""))
}
