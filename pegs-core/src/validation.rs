//! Schema checks for kind-specific fields.
//!
//! Everything here is pure: values are checked against the field specs of
//! [`crate::registry`] and turned into [`KindProps`]. Whether a referenced
//! requirement exists and has the right kind needs storage, so that part is
//! done by the catalog using [`references`].

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{PegsError, Result};
use crate::models::{KindProps, ReqType};
use crate::registry::{self, FieldSpec, FieldType};

/// Name given to requirements created without one.
pub fn untitled(req_type: ReqType) -> String {
    format!("{{Untitled {}}}", req_type.label())
}

pub fn resolve_name(req_type: ReqType, name: Option<&str>) -> String {
    match name.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => untitled(req_type),
    }
}

/// Checks a creation field set and builds the kind's props.
///
/// Absent fields take their default. Required fields without a default must
/// be present unless the requirement is a silence placeholder.
pub fn props_for_create(
    req_type: ReqType,
    is_silence: bool,
    fields: &Map<String, Value>,
) -> Result<KindProps> {
    let specs = registry::fields_of(req_type);
    reject_unknown(req_type, &specs, fields)?;

    let mut resolved = Map::new();
    for spec in &specs {
        match fields.get(spec.name) {
            Some(value) if !value.is_null() => {
                resolved.insert(spec.name.to_string(), check_value(spec, value)?);
            }
            _ => {
                if let Some(default) = spec.default {
                    resolved.insert(spec.name.to_string(), Value::String(default.into()));
                }
            }
        }
    }

    require_complete(req_type, &specs, &resolved, is_silence)?;
    KindProps::from_fields(req_type.shape(), resolved)
}

/// Applies a partial update to existing props.
///
/// A `null` value clears an optional field and resets a defaulted one.
pub fn props_for_update(
    req_type: ReqType,
    current: &KindProps,
    is_silence: bool,
    changes: &Map<String, Value>,
) -> Result<KindProps> {
    let specs = registry::fields_of(req_type);
    reject_unknown(req_type, &specs, changes)?;

    let mut resolved = current.to_fields()?;
    for spec in &specs {
        match changes.get(spec.name) {
            None => {}
            Some(Value::Null) => {
                resolved.remove(spec.name);
                if let Some(default) = spec.default {
                    resolved.insert(spec.name.to_string(), Value::String(default.into()));
                }
            }
            Some(value) => {
                resolved.insert(spec.name.to_string(), check_value(spec, value)?);
            }
        }
    }

    require_complete(req_type, &specs, &resolved, is_silence)?;
    KindProps::from_fields(req_type.shape(), resolved)
}

/// Reference-typed fields that are set, with the kind their target must have.
pub fn references(req_type: ReqType, props: &KindProps) -> Vec<(&'static str, ReqType, Uuid)> {
    registry::fields_of(req_type)
        .into_iter()
        .filter_map(|spec| {
            let FieldType::Reference(target) = spec.ty else {
                return None;
            };
            let id = match spec.name {
                "parent_component" => props.parent_component(),
                "follows" => props.follows(),
                _ => None,
            }?;
            Some((spec.name, target, id))
        })
        .collect()
}

fn reject_unknown(
    req_type: ReqType,
    specs: &[&'static FieldSpec],
    fields: &Map<String, Value>,
) -> Result<()> {
    match fields
        .keys()
        .find(|name| !specs.iter().any(|spec| spec.name == name.as_str()))
    {
        Some(name) => Err(PegsError::validation(format!(
            "{} has no field '{}'",
            req_type.label(),
            name
        ))),
        None => Ok(()),
    }
}

fn require_complete(
    req_type: ReqType,
    specs: &[&'static FieldSpec],
    resolved: &Map<String, Value>,
    is_silence: bool,
) -> Result<()> {
    if is_silence {
        return Ok(());
    }
    let missing: Vec<&str> = specs
        .iter()
        .filter(|spec| spec.required && !resolved.contains_key(spec.name))
        .map(|spec| spec.name)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(PegsError::validation(format!(
            "{} requires {}",
            req_type.label(),
            missing.join(", ")
        )))
    }
}

/// Type-checks one value and returns its normalized form.
fn check_value(spec: &FieldSpec, value: &Value) -> Result<Value> {
    let Some(text) = value.as_str() else {
        return Err(PegsError::validation(format!(
            "field '{}' must be a string",
            spec.name
        )));
    };

    match spec.ty {
        FieldType::Email => {
            if is_email(text) {
                Ok(Value::String(text.trim().to_string()))
            } else {
                Err(PegsError::validation(format!(
                    "field '{}' is not an email address: {}",
                    spec.name, text
                )))
            }
        }
        FieldType::Reference(_) => Uuid::parse_str(text)
            .map(|id| Value::String(id.to_string()))
            .map_err(|_| {
                PegsError::validation(format!(
                    "field '{}' must reference a requirement id, got '{}'",
                    spec.name, text
                ))
            }),
        FieldType::Enum(values) => {
            if values.contains(&text) {
                Ok(Value::String(text.to_string()))
            } else {
                Err(PegsError::validation(format!(
                    "field '{}' must be one of {}, got '{}'",
                    spec.name,
                    values.join(", "),
                    text
                )))
            }
        }
    }
}

fn is_email(text: &str) -> bool {
    let text = text.trim();
    match text.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && !text.contains(char::is_whitespace)
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        }
        None => false,
    }
}
