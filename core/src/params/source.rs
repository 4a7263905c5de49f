//! Parameter source parsing.
//!
//! A source is an object of blocks, each block an object of scalar
//! parameters. Parsing produces a detached `Blocks` tree; nothing touches a
//! store until the whole tree has validated.

use std::path::Path;

use serde_json::Value;

use super::errors::{StoreError, StoreResult};
use super::store::{Block, Blocks};
use crate::types::{json_kind_name, ParamValue};


/// Text format of a parameter source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceFormat {
    #[default]
    Json,
    Yaml,
}

impl SourceFormat {
    /// Pick a format from a file extension. Anything other than `.yaml` /
    /// `.yml` is treated as JSON.
    pub fn from_path(path: &Path) -> SourceFormat {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                SourceFormat::Yaml
            }
            _ => SourceFormat::Json,
        }
    }
}


/// Parse and validate source text into a detached block tree.
pub fn parse_source(text: &str, format: SourceFormat) -> StoreResult<Blocks> {
    let doc: Value = match format {
        SourceFormat::Json => serde_json::from_str(text)?,
        SourceFormat::Yaml => {
            let doc: serde_yaml::Value = serde_yaml::from_str(text)?;
            reject_non_finite(&doc)?;
            serde_yaml::from_value(doc)?
        }
    };
    validate(doc)
}


/// YAML can spell `.nan` and `.inf`, which have no JSON form and would
/// otherwise surface as nulls. Report them as what they are.
fn reject_non_finite(doc: &serde_yaml::Value) -> StoreResult<()> {
    let Some(top) = doc.as_mapping() else {
        return Ok(());
    };
    for (block, params) in top {
        let Some(params) = params.as_mapping() else {
            continue;
        };
        for (name, leaf) in params {
            if leaf.as_f64().map_or(false, |n| !n.is_finite()) {
                return Err(StoreError::MalformedParameter {
                    block: yaml_key(block),
                    name: yaml_key(name),
                    found: "non-finite number",
                });
            }
        }
    }
    Ok(())
}


fn yaml_key(key: &serde_yaml::Value) -> String {
    match key.as_str() {
        Some(s) => s.to_string(),
        None => format!("{:?}", key),
    }
}


fn validate(doc: Value) -> StoreResult<Blocks> {
    let top = match doc {
        Value::Object(map) => map,
        other => {
            return Err(StoreError::MalformedSource(format!(
                "expected an object of blocks, found {}",
                json_kind_name(&other)
            )))
        }
    };

    let mut blocks = Blocks::new();
    for (block_name, block) in top {
        let entries = match block {
            Value::Object(map) => map,
            other => {
                return Err(StoreError::MalformedSource(format!(
                    "block {} is a {}, expected an object",
                    block_name,
                    json_kind_name(&other)
                )))
            }
        };

        let mut params = Block::new();
        for (name, leaf) in entries {
            match ParamValue::try_from(leaf) {
                Ok(value) => {
                    params.insert(name, value);
                }
                Err(found) => {
                    return Err(StoreError::MalformedParameter {
                        block: block_name,
                        name,
                        found,
                    })
                }
            }
        }
        blocks.insert(block_name, params);
    }
    Ok(blocks)
}
