//! Parameter trees.
//!
//! A node declares its parameters as `group → name → Param`. Every node also
//! gets a `common` group with `autotrigger` and `max_frequency`; a node may
//! declare either of those itself to change the default.

use crate::error::ValidationError;
use crate::protocol::ParamValue;
use std::collections::BTreeMap;

/// Group added to every node's tree.
pub const COMMON_GROUP: &str = "common";
pub const AUTOTRIGGER: &str = "autotrigger";
pub const MAX_FREQUENCY: &str = "max_frequency";

pub const MIN_FREQUENCY_HZ: f64 = 0.1;
pub const MAX_FREQUENCY_HZ: f64 = 1000.0;

/// What values a parameter accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    Bool,
    Int { min: Option<i64>, max: Option<i64> },
    Float { min: Option<f64>, max: Option<f64> },
    /// Free text, or one of `options` when non-empty.
    String { options: Vec<String> },
    /// Fires once when set to true; reading it resets it.
    Trigger,
}

/// A single parameter: current value plus its constraints.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    kind: ParamKind,
    value: ParamValue,
    default: ParamValue,
    doc: Option<String>,
    requires_setup: bool,
}

impl Param {
    fn with_kind(kind: ParamKind, default: ParamValue) -> Self {
        Self {
            kind,
            value: default.clone(),
            default,
            doc: None,
            requires_setup: false,
        }
    }

    pub fn bool(default: bool) -> Self {
        Self::with_kind(ParamKind::Bool, default.into())
    }

    pub fn int(default: i64, min: Option<i64>, max: Option<i64>) -> Self {
        Self::with_kind(ParamKind::Int { min, max }, default.into())
    }

    pub fn float(default: f64, min: Option<f64>, max: Option<f64>) -> Self {
        Self::with_kind(ParamKind::Float { min, max }, default.into())
    }

    pub fn string(default: impl Into<String>) -> Self {
        Self::with_kind(
            ParamKind::String {
                options: Vec::new(),
            },
            ParamValue::String(default.into()),
        )
    }

    pub fn choice(default: impl Into<String>, options: &[&str]) -> Self {
        Self::with_kind(
            ParamKind::String {
                options: options.iter().map(|s| s.to_string()).collect(),
            },
            ParamValue::String(default.into()),
        )
    }

    pub fn trigger() -> Self {
        Self::with_kind(ParamKind::Trigger, false.into())
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Changing this parameter re-runs the node's setup.
    pub fn requires_setup(mut self) -> Self {
        self.requires_setup = true;
        self
    }

    pub fn kind(&self) -> &ParamKind {
        &self.kind
    }

    pub fn value(&self) -> &ParamValue {
        &self.value
    }

    pub fn default_value(&self) -> &ParamValue {
        &self.default
    }

    pub fn doc_text(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    pub fn needs_setup(&self) -> bool {
        self.requires_setup
    }

    pub fn is_trigger(&self) -> bool {
        matches!(self.kind, ParamKind::Trigger)
    }

    /// Check `value` against this parameter, returning the value to store.
    /// Integers are widened for float parameters.
    pub fn check(&self, value: &ParamValue) -> Result<ParamValue, String> {
        match (&self.kind, value) {
            (ParamKind::Bool | ParamKind::Trigger, ParamValue::Bool(_)) => Ok(value.clone()),
            (ParamKind::Int { min, max }, ParamValue::Int(v)) => {
                if min.is_some_and(|m| *v < m) || max.is_some_and(|m| *v > m) {
                    return Err(format!("{v} outside {}", bounds(min, max)));
                }
                Ok(value.clone())
            }
            (ParamKind::Float { min, max }, ParamValue::Float(_) | ParamValue::Int(_)) => {
                let v = value.as_float().unwrap_or_default();
                if !v.is_finite() {
                    return Err(format!("{v} is not a finite number"));
                }
                if min.is_some_and(|m| v < m) || max.is_some_and(|m| v > m) {
                    return Err(format!("{v} outside {}", bounds(min, max)));
                }
                Ok(ParamValue::Float(v))
            }
            (ParamKind::String { options }, ParamValue::String(s)) => {
                if !options.is_empty() && !options.iter().any(|o| o == s) {
                    return Err(format!("`{s}` is not one of {options:?}"));
                }
                Ok(value.clone())
            }
            (kind, v) => Err(format!("expected {}, got {}", kind_name(kind), v.type_name())),
        }
    }
}

fn bounds<T: std::fmt::Display>(min: &Option<T>, max: &Option<T>) -> String {
    let lo = min.as_ref().map(|m| m.to_string()).unwrap_or_else(|| "-inf".into());
    let hi = max.as_ref().map(|m| m.to_string()).unwrap_or_else(|| "inf".into());
    format!("[{lo}, {hi}]")
}

fn kind_name(kind: &ParamKind) -> &'static str {
    match kind {
        ParamKind::Bool | ParamKind::Trigger => "bool",
        ParamKind::Int { .. } => "int",
        ParamKind::Float { .. } => "float",
        ParamKind::String { .. } => "string",
    }
}

/// Side effects the runtime must apply after an accepted update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParamChange {
    pub requires_setup: bool,
    pub triggered: bool,
}

/// Nested `group → name → Param` mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamTree {
    groups: BTreeMap<String, BTreeMap<String, Param>>,
}

impl ParamTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or extend) a group.
    pub fn group<'a>(
        mut self,
        name: impl Into<String>,
        params: impl IntoIterator<Item = (&'a str, Param)>,
    ) -> Self {
        let group = self.groups.entry(name.into()).or_default();
        for (key, param) in params {
            group.insert(key.to_string(), param);
        }
        self
    }

    /// Fill in the `common` group entries the node did not declare.
    pub fn with_common(mut self, default_max_frequency: f64) -> Self {
        let common = self.groups.entry(COMMON_GROUP.to_string()).or_default();
        common
            .entry(AUTOTRIGGER.to_string())
            .or_insert_with(|| Param::bool(false).doc("Process on a fixed period"));
        common.entry(MAX_FREQUENCY.to_string()).or_insert_with(|| {
            Param::float(
                default_max_frequency.clamp(MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ),
                Some(MIN_FREQUENCY_HZ),
                Some(MAX_FREQUENCY_HZ),
            )
            .doc("Autotrigger rate in Hz")
        });
        self
    }

    pub fn get(&self, group: &str, name: &str) -> Option<&Param> {
        self.groups.get(group)?.get(name)
    }

    pub fn value(&self, group: &str, name: &str) -> Option<&ParamValue> {
        self.get(group, name).map(Param::value)
    }

    pub fn float(&self, group: &str, name: &str) -> Option<f64> {
        self.value(group, name)?.as_float()
    }

    pub fn int(&self, group: &str, name: &str) -> Option<i64> {
        self.value(group, name)?.as_int()
    }

    pub fn bool(&self, group: &str, name: &str) -> Option<bool> {
        self.value(group, name)?.as_bool()
    }

    pub fn string(&self, group: &str, name: &str) -> Option<&str> {
        self.value(group, name)?.as_str()
    }

    /// Read a trigger and reset it to false.
    pub fn take_trigger(&mut self, group: &str, name: &str) -> bool {
        let Some(param) = self.groups.get_mut(group).and_then(|g| g.get_mut(name)) else {
            return false;
        };
        if !param.is_trigger() {
            return false;
        }
        let fired = param.value.as_bool().unwrap_or(false);
        param.value = ParamValue::Bool(false);
        fired
    }

    /// Reset every trigger to false. Returns how many were set.
    pub fn reset_triggers(&mut self) -> usize {
        let mut fired = 0;
        for param in self.groups.values_mut().flat_map(|g| g.values_mut()) {
            if param.is_trigger() && param.value.as_bool() == Some(true) {
                param.value = ParamValue::Bool(false);
                fired += 1;
            }
        }
        fired
    }

    /// Validate and store a new value.
    pub fn update(
        &mut self,
        group: &str,
        name: &str,
        value: ParamValue,
    ) -> Result<ParamChange, ValidationError> {
        let err = |reason: String| ValidationError::Param {
            group: group.to_string(),
            name: name.to_string(),
            reason,
        };
        let param = self
            .groups
            .get_mut(group)
            .and_then(|g| g.get_mut(name))
            .ok_or_else(|| err("no such parameter".into()))?;
        let value = param.check(&value).map_err(err)?;
        let triggered = param.is_trigger() && value.as_bool() == Some(true);
        param.value = value;
        Ok(ParamChange {
            requires_setup: param.requires_setup,
            triggered,
        })
    }

    pub fn autotrigger(&self) -> bool {
        self.bool(COMMON_GROUP, AUTOTRIGGER).unwrap_or(false)
    }

    pub fn max_frequency(&self) -> f64 {
        self.float(COMMON_GROUP, MAX_FREQUENCY)
            .unwrap_or(MAX_FREQUENCY_HZ)
            .clamp(MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ)
    }

    pub fn groups(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, Param>)> {
        self.groups.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn contains(&self, group: &str, name: &str) -> bool {
        self.get(group, name).is_some()
    }
}
