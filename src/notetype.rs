//! Note-type registry.
//!
//! Compiles the configured note-type table into [`NoteType`]s: one per
//! enabled variant, each carrying its Anki model name, an ordered list of
//! compiled match patterns, and a field recipe resolved into tagged
//! [`FieldSpec`]s. All recipe validation happens here, once, at startup, so
//! per-note field construction never has to re-interpret configuration.

use anyhow::{bail, Context, Result};
use regex::Regex;

use crate::config::{Config, NoteTypeConfig};

/// Supported note shapes. Closed set; the key in the `[note_types]` config
/// table selects the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteVariant {
    Basic,
    BasicAndReversed,
    TypeAnswer,
    Cloze,
    Obsidian,
}

impl NoteVariant {
    pub fn from_key(key: &str) -> Option<NoteVariant> {
        match key {
            "basic" => Some(NoteVariant::Basic),
            "basic_reversed" => Some(NoteVariant::BasicAndReversed),
            "type_answer" => Some(NoteVariant::TypeAnswer),
            "cloze" => Some(NoteVariant::Cloze),
            "obsidian" => Some(NoteVariant::Obsidian),
            _ => None,
        }
    }

    /// Default Anki model name for this variant.
    pub fn model_name(&self) -> &'static str {
        match self {
            NoteVariant::Basic => "Basic",
            NoteVariant::BasicAndReversed => "Basic (and reversed card)",
            NoteVariant::TypeAnswer => "Basic (type in the answer)",
            NoteVariant::Cloze => "Cloze",
            NoteVariant::Obsidian => "Obsidian",
        }
    }

    /// Fixed field recipe for the built-in variants. The obsidian variant has
    /// no default; its recipe must come from configuration.
    fn default_recipe(&self) -> Option<Vec<(String, FieldSpec)>> {
        match self {
            NoteVariant::Basic | NoteVariant::BasicAndReversed | NoteVariant::TypeAnswer => {
                Some(vec![
                    ("Front".to_string(), FieldSpec::Capture(1)),
                    ("Back".to_string(), FieldSpec::Capture(2)),
                ])
            }
            NoteVariant::Cloze => Some(vec![("Text".to_string(), FieldSpec::Capture(1))]),
            NoteVariant::Obsidian => None,
        }
    }
}

/// Where a field's content comes from: a positional capture group, the
/// heading-hierarchy context at the match site, or a synthesized back-link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSpec {
    Capture(usize),
    Context,
    Link,
}

/// One compiled note type: variant, model name, patterns tried in order, and
/// the ordered (field name, source) recipe.
#[derive(Debug)]
pub struct NoteType {
    pub variant: NoteVariant,
    pub model: String,
    pub patterns: Vec<Regex>,
    pub recipe: Vec<(String, FieldSpec)>,
}

/// Build the registry from configuration. Fails on unknown variant keys,
/// empty pattern lists, invalid regexes, malformed field specs, and capture
/// indices not present in every pattern of the variant.
pub fn build_note_types(config: &Config) -> Result<Vec<NoteType>> {
    let mut note_types = Vec::new();
    for (key, nt_config) in &config.note_types {
        let variant = NoteVariant::from_key(key)
            .with_context(|| format!("Unknown note type '{}' in config", key))?;
        note_types.push(build_one(variant, nt_config).with_context(|| {
            format!("Invalid configuration for note type '{}'", key)
        })?);
    }
    Ok(note_types)
}

fn build_one(variant: NoteVariant, config: &NoteTypeConfig) -> Result<NoteType> {
    if config.patterns.is_empty() {
        bail!("note type enabled with zero patterns");
    }

    let mut patterns = Vec::with_capacity(config.patterns.len());
    for raw in &config.patterns {
        let re = Regex::new(raw).with_context(|| format!("Invalid pattern: {}", raw))?;
        patterns.push(re);
    }

    let recipe = match (&config.fields, variant.default_recipe()) {
        (Some(fields), _) => parse_recipe(fields)?,
        (None, Some(recipe)) => recipe,
        (None, None) => bail!("note type requires a 'fields' recipe"),
    };

    // Every capture index must resolve against every pattern, otherwise field
    // construction would silently produce empty fields for some matches.
    for (name, spec) in &recipe {
        if let FieldSpec::Capture(idx) = spec {
            if *idx == 0 {
                bail!("field '{}' uses capture group 0 (the whole match)", name);
            }
            for (pat_idx, re) in patterns.iter().enumerate() {
                if *idx >= re.captures_len() {
                    bail!(
                        "field '{}' references capture group {} which pattern {} does not define",
                        name,
                        idx,
                        pat_idx
                    );
                }
            }
        }
    }

    Ok(NoteType {
        variant,
        model: config
            .model
            .clone()
            .unwrap_or_else(|| variant.model_name().to_string()),
        patterns,
        recipe,
    })
}

#[cfg(test)]
pub(crate) fn build_for_tests(variant: NoteVariant, config: &NoteTypeConfig) -> NoteType {
    build_one(variant, config).expect("test note type")
}

/// A fields spec is either a table of `name -> source` or a list of
/// single-entry tables (which preserves order in formats that need it).
fn parse_recipe(fields: &toml::Value) -> Result<Vec<(String, FieldSpec)>> {
    match fields {
        toml::Value::Table(table) => table
            .iter()
            .map(|(name, value)| Ok((name.clone(), parse_spec(name, value)?)))
            .collect(),
        toml::Value::Array(entries) => {
            let mut recipe = Vec::with_capacity(entries.len());
            for entry in entries {
                let table = match entry {
                    toml::Value::Table(t) if t.len() == 1 => t,
                    _ => bail!("fields list entries must be single-entry tables"),
                };
                let (name, value) = table.iter().next().expect("len checked above");
                recipe.push((name.clone(), parse_spec(name, value)?));
            }
            Ok(recipe)
        }
        _ => bail!("fields must be a table or a list of single-entry tables"),
    }
}

fn parse_spec(name: &str, value: &toml::Value) -> Result<FieldSpec> {
    match value {
        toml::Value::Integer(idx) if *idx >= 0 => Ok(FieldSpec::Capture(*idx as usize)),
        toml::Value::String(s) if s == "CONTEXT" => Ok(FieldSpec::Context),
        toml::Value::String(s) if s == "LINK" => Ok(FieldSpec::Link),
        other => bail!(
            "field '{}' must map to a capture group index, \"CONTEXT\" or \"LINK\" (got {})",
            name,
            other
        ),
    }
}
