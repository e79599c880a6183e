//! Formation template loading.
//!
//! Templates are TOML files with one `[[entry]]` table per deployment slot.
//! The samurai reinforcement table ships embedded in the binary.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Deserialize;
use tracing::info;
use warstage_model::{UnitClass, UnitDescriptor};
use warstage_reconcile::{FormationEntry, FormationSlot, FormationTemplate};

use crate::config::ConfigError;

/// Built-in samurai reinforcement formation.
pub const DEFAULT_FORMATION: &str = include_str!("../formations/samurai.toml");

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TemplateFile {
    #[serde(default)]
    entry: Vec<EntrySpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EntrySpec {
    level: u32,
    index: u32,
    count: u32,
    unit_type: UnitClass,
    marker: String,
}

/// Load the template at `path`, or the built-in one.
pub fn load_formation(path: Option<&Path>) -> Result<FormationTemplate, ConfigError> {
    let template = match path {
        Some(path) => {
            let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            parse_formation(&source)?
        }
        None => parse_formation(DEFAULT_FORMATION)?,
    };

    info!(
        source = %path.map_or_else(|| "built-in".to_string(), |p| p.display().to_string()),
        entries = template.len(),
        "Formation template loaded"
    );
    Ok(template)
}

/// Parse and validate a template.
pub fn parse_formation(source: &str) -> Result<FormationTemplate, ConfigError> {
    let file: TemplateFile = toml::from_str(source)?;
    validate(&file.entry)?;

    Ok(FormationTemplate::new(
        file.entry
            .into_iter()
            .map(|e| FormationEntry {
                slot: FormationSlot::new(e.level, e.index, e.count),
                unit: UnitDescriptor {
                    unit_type: e.unit_type,
                    marker: e.marker,
                },
            })
            .collect(),
    ))
}

fn validate(entries: &[EntrySpec]) -> Result<(), ConfigError> {
    if entries.is_empty() {
        return Err(ConfigError::Template("no entries".to_string()));
    }

    let mut ring_sizes: HashMap<u32, u32> = HashMap::new();
    let mut taken: HashSet<(u32, u32)> = HashSet::new();

    for (n, entry) in entries.iter().enumerate() {
        if entry.count == 0 || entry.index >= entry.count {
            return Err(ConfigError::Template(format!(
                "entry {n}: index {} outside ring of {}",
                entry.index, entry.count
            )));
        }
        if entry.marker.trim().is_empty() {
            return Err(ConfigError::Template(format!("entry {n}: empty marker")));
        }
        let size = *ring_sizes.entry(entry.level).or_insert(entry.count);
        if size != entry.count {
            return Err(ConfigError::Template(format!(
                "entry {n}: level {} declared with {} and {} slots",
                entry.level, size, entry.count
            )));
        }
        if !taken.insert((entry.level, entry.index)) {
            return Err(ConfigError::Template(format!(
                "entry {n}: slot {} on level {} used twice",
                entry.index, entry.level
            )));
        }
    }

    Ok(())
}
