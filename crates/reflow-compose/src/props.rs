#![forbid(unsafe_code)]

//! Prop extraction against normalized descriptors.
//!
//! Given the supplied prop values of an instantiation and one normalized
//! [`PropSpec`], [`validate_prop`] produces the effective value: the supplied
//! one (with a non-fatal type-check report on mismatch), else the declared
//! default, else `Null` — with a report when the prop was marked required.

use reflow_core::warn;
use reflow_reactive::{MapRef, Value};

use crate::instance::Instance;
use crate::options::{PropSpec, PropType};

fn type_label(ty: PropType) -> &'static str {
    match ty {
        PropType::Any => "any",
        PropType::Bool => "boolean",
        PropType::Num => "number",
        PropType::Str => "string",
        PropType::Map => "mapping",
        PropType::List => "list",
    }
}

fn type_matches(value: &Value, ty: PropType) -> bool {
    match ty {
        PropType::Any => true,
        PropType::Bool => matches!(value, Value::Bool(_)),
        PropType::Num => matches!(value, Value::Num(_)),
        PropType::Str => matches!(value, Value::Str(_)),
        PropType::Map => matches!(value, Value::Map(_)),
        PropType::List => matches!(value, Value::List(_)),
    }
}

/// The effective value of one declared prop. A supplied `Null` counts as
/// absent for the type check but not for defaulting.
#[must_use]
pub fn validate_prop(
    key: &str,
    spec: &PropSpec,
    supplied: Option<&MapRef>,
    instance: &Instance,
) -> Value {
    match supplied.and_then(|values| values.get_raw(key)) {
        Some(value) => {
            if !value.is_null() && !type_matches(&value, spec.ty) {
                warn(&format!(
                    "invalid prop: type check failed for prop \"{key}\", expected {}",
                    type_label(spec.ty)
                ));
            }
            value
        }
        None => {
            if spec.required {
                warn(&format!("missing required prop: \"{key}\""));
            }
            match &spec.default {
                Some(default) => default.resolve(instance),
                None => Value::Null,
            }
        }
    }
}
