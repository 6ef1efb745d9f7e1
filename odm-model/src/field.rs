//! Typed fields.
//!
//! A [`Field`] holds one named value of one [`FieldKind`]. Every write goes
//! through the kind's validation; a rejected write leaves both the value and
//! the dirty flag untouched. Reference kinds store tokens only and resolve
//! them through an injected [`Resolver`] when read.

use crate::entity::Entity;
use crate::{OdmError, OdmResult};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};
use odm_types::{RefToken, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Maps a reference token to a live entity.
///
/// `Ok(None)` means the referenced document no longer exists.
pub trait Resolver: Send + Sync {
    fn resolve(&self, token: &RefToken) -> OdmResult<Option<Entity>>;
}

/// The kind of a field, fixing which values it accepts and which mutators
/// it supports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    Float,
    Bool,
    DateTime,
    List,
    UniqueList,
    Dict,
    /// Pointer to one document of `model`.
    Ref { model: String },
    RefList { model: String },
    /// Reference list deduplicated by resolved entity identity.
    UniqueRefList { model: String },
    /// Computed by the owning model's get hook; never stored.
    Virtual,
}

impl FieldKind {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::String => "String",
            Self::Integer => "Integer",
            Self::Float => "Float",
            Self::Bool => "Bool",
            Self::DateTime => "DateTime",
            Self::List => "List",
            Self::UniqueList => "UniqueList",
            Self::Dict => "Dict",
            Self::Ref { .. } => "Ref",
            Self::RefList { .. } => "RefList",
            Self::UniqueRefList { .. } => "UniqueRefList",
            Self::Virtual => "Virtual",
        }
    }

    /// Collection a reference kind points into.
    #[must_use]
    pub fn target_model(&self) -> Option<&str> {
        match self {
            Self::Ref { model } | Self::RefList { model } | Self::UniqueRefList { model } => {
                Some(model)
            }
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_number(&self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }

    fn default_value(&self) -> Value {
        match self {
            Self::String => Value::String(String::new()),
            Self::Integer => Value::Int(0),
            Self::Float => Value::Float(0.0),
            Self::Bool => Value::Bool(false),
            Self::DateTime => Value::DateTime(DateTime::<Utc>::UNIX_EPOCH),
            Self::List | Self::UniqueList | Self::RefList { .. } | Self::UniqueRefList { .. } => {
                Value::List(Vec::new())
            }
            Self::Dict => Value::Map(BTreeMap::new()),
            Self::Ref { .. } | Self::Virtual => Value::Null,
        }
    }
}

/// Options for reading a field.
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    format: Option<String>,
    args: BTreeMap<String, Value>,
}

impl GetOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// strftime-style format applied to DateTime fields.
    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Free-form argument for get hooks (e.g. a thumbnail size).
    #[must_use]
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn format(&self) -> Option<&str> {
        self.format.as_deref()
    }

    #[must_use]
    pub fn arg(&self, key: &str) -> Option<&Value> {
        self.args.get(key)
    }
}

/// Result of reading a field.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Value(Value),
    /// A single reference; `None` when unset or dangling.
    Entity(Option<Entity>),
    /// Reference lists; unresolved elements are left out.
    Entities(Vec<Entity>),
}

impl FieldValue {
    #[must_use]
    pub const fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_entity(self) -> Option<Entity> {
        match self {
            Self::Entity(e) => e,
            _ => None,
        }
    }

    #[must_use]
    pub fn into_entities(self) -> Vec<Entity> {
        match self {
            Self::Entities(list) => list,
            Self::Entity(Some(e)) => vec![e],
            _ => Vec::new(),
        }
    }

    /// True for an unset or dangling reference and for a null value.
    #[must_use]
    pub const fn is_nothing(&self) -> bool {
        matches!(self, Self::Entity(None) | Self::Value(Value::Null))
    }
}

impl From<Value> for FieldValue {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}

pub(crate) fn format_datetime(dt: &DateTime<Utc>, format: &str) -> OdmResult<String> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(OdmError::InvalidFormat(format.to_string()));
    }
    Ok(dt.format(format).to_string())
}

const fn is_list_element(value: &Value) -> bool {
    matches!(
        value,
        Value::Bool(_)
            | Value::Int(_)
            | Value::Float(_)
            | Value::String(_)
            | Value::List(_)
            | Value::Map(_)
    )
}

/// Drops empty elements and later duplicates, keeping first-seen order.
fn unique_items(items: Vec<Value>) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::with_capacity(items.len());
    for item in items {
        if !item.is_empty() && !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

fn into_items(value: Value) -> Vec<Value> {
    match value {
        Value::Null => Vec::new(),
        Value::List(items) => items,
        single => vec![single],
    }
}

/// One named, typed attribute of an entity.
#[derive(Clone)]
pub struct Field {
    name: String,
    kind: FieldKind,
    value: Value,
    default: Value,
    required: bool,
    modified: bool,
    heal_dangling: bool,
    resolver: Option<Arc<dyn Resolver>>,
}

impl Field {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        let default = kind.default_value();
        Self {
            name: name.into(),
            value: default.clone(),
            default,
            kind,
            required: false,
            modified: false,
            heal_dangling: true,
            resolver: None,
        }
    }

    #[must_use]
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::String)
    }

    #[must_use]
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    #[must_use]
    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Float)
    }

    #[must_use]
    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Bool)
    }

    #[must_use]
    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::DateTime)
    }

    #[must_use]
    pub fn list(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::List)
    }

    #[must_use]
    pub fn unique_list(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::UniqueList)
    }

    #[must_use]
    pub fn dict(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Dict)
    }

    #[must_use]
    pub fn reference(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Ref { model: model.into() })
    }

    #[must_use]
    pub fn ref_list(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new(name, FieldKind::RefList { model: model.into() })
    }

    #[must_use]
    pub fn unique_ref_list(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new(name, FieldKind::UniqueRefList { model: model.into() })
    }

    #[must_use]
    pub fn virtual_field(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Virtual)
    }

    /// Marks the field as non-empty on save.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Replaces the default. It is validated when the schema is registered.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = default.into();
        self.value = self.default.clone();
        self
    }

    /// Attaches the resolver used by reference kinds.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Whether reading a dangling single reference clears the field.
    #[must_use]
    pub fn heal_dangling(mut self, heal: bool) -> Self {
        self.heal_dangling = heal;
        self
    }

    pub(crate) const fn set_required(&mut self, required: bool) {
        self.required = required;
    }

    // ── Accessors ───────────────────────────────────────────────

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn kind(&self) -> &FieldKind {
        &self.kind
    }

    /// Raw stored value, without resolution.
    #[must_use]
    pub const fn value(&self) -> &Value {
        &self.value
    }

    #[must_use]
    pub const fn default_value(&self) -> &Value {
        &self.default
    }

    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.required
    }

    #[must_use]
    pub const fn is_modified(&self) -> bool {
        self.modified
    }

    pub const fn reset_modified(&mut self) {
        self.modified = false;
    }

    // ── Validation ──────────────────────────────────────────────

    fn mismatch(&self, expected: &str, got: &Value) -> OdmError {
        OdmError::type_kind(
            &self.name,
            format!("{expected} expected, got {}", got.type_name()),
        )
    }

    fn unsupported(&self, op: &'static str) -> OdmError {
        OdmError::UnsupportedOperation {
            field: self.name.clone(),
            kind: self.kind.name(),
            op,
        }
    }

    fn coerce_token(&self, model: &str, value: Value) -> OdmResult<RefToken> {
        let token = match value {
            Value::Ref(token) => token,
            Value::String(s) => s
                .parse::<RefToken>()
                .map_err(|e| OdmError::type_kind(&self.name, e.to_string()))?,
            other => return Err(self.mismatch("entity or reference", &other)),
        };
        if token.collection() != model {
            return Err(OdmError::type_kind(
                &self.name,
                format!(
                    "instance of model '{model}' expected, got '{}'",
                    token.collection()
                ),
            ));
        }
        Ok(token)
    }

    /// Validates `value` against the kind and returns its stored form.
    fn coerce(&self, value: Value) -> OdmResult<Value> {
        match &self.kind {
            FieldKind::String => match value {
                Value::Null => Ok(Value::String(String::new())),
                Value::String(s) => Ok(Value::String(s.trim().to_string())),
                Value::Bool(b) => Ok(Value::String(b.to_string())),
                Value::Int(i) => Ok(Value::String(i.to_string())),
                Value::Float(f) => Ok(Value::String(f.to_string())),
                Value::DateTime(dt) => Ok(Value::String(dt.to_rfc3339())),
                other => Err(self.mismatch("string", &other)),
            },
            FieldKind::Integer => match value {
                Value::Int(_) => Ok(value),
                other => Err(self.mismatch("integer", &other)),
            },
            FieldKind::Float => match value {
                Value::Float(f) if !f.is_finite() => Err(self.mismatch("finite number", &value)),
                Value::Float(_) => Ok(value),
                Value::Int(i) => Ok(Value::Float(i as f64)),
                other => Err(self.mismatch("number", &other)),
            },
            FieldKind::Bool => Ok(Value::Bool(value.is_truthy())),
            FieldKind::DateTime => match value {
                Value::DateTime(_) => Ok(value),
                other => Err(self.mismatch("datetime", &other)),
            },
            FieldKind::List | FieldKind::UniqueList => {
                let items = into_items(value);
                if let Some(bad) = items.iter().find(|v| !is_list_element(v)) {
                    return Err(self.mismatch("scalar, list or map element", bad));
                }
                if self.kind == FieldKind::UniqueList {
                    Ok(Value::List(unique_items(items)))
                } else {
                    Ok(Value::List(items))
                }
            }
            FieldKind::Dict => match value {
                Value::Map(_) => Ok(value),
                other => Err(self.mismatch("map", &other)),
            },
            FieldKind::Ref { model } => match value {
                Value::Null => Ok(Value::Null),
                Value::List(items) => match items.into_iter().next() {
                    Some(first) => self.coerce_token(model, first).map(Value::Ref),
                    None => Ok(Value::Null),
                },
                other => self.coerce_token(model, other).map(Value::Ref),
            },
            FieldKind::RefList { model } | FieldKind::UniqueRefList { model } => into_items(value)
                .into_iter()
                .map(|v| self.coerce_token(model, v).map(Value::Ref))
                .collect::<OdmResult<Vec<_>>>()
                .map(Value::List),
            FieldKind::Virtual => Ok(value),
        }
    }

    fn resolver(&self) -> OdmResult<&dyn Resolver> {
        self.resolver
            .as_deref()
            .ok_or_else(|| OdmError::MissingResolver(self.name.clone()))
    }

    /// Resolves every token, drops unresolved ones and keeps the first
    /// token per resolved entity.
    fn dedupe_refs(&self, value: Value) -> OdmResult<Value> {
        let resolver = self.resolver()?;
        let mut seen: Vec<RefToken> = Vec::new();
        for item in into_items(value) {
            let Value::Ref(token) = item else { continue };
            let Some(entity) = resolver.resolve(&token)? else {
                continue;
            };
            let identity = entity.to_ref()?;
            if !seen.contains(&identity) {
                seen.push(identity);
            }
        }
        Ok(Value::List(seen.into_iter().map(Value::Ref).collect()))
    }

    fn list_items(&self) -> Vec<Value> {
        self.value.as_list().map(<[Value]>::to_vec).unwrap_or_default()
    }

    fn sum(&self, delta: Value) -> OdmResult<Value> {
        match (&self.value, self.coerce(delta)?) {
            (Value::Int(a), Value::Int(b)) => a
                .checked_add(b)
                .map(Value::Int)
                .ok_or_else(|| OdmError::type_kind(&self.name, "integer overflow")),
            (Value::Float(a), Value::Float(b)) => Some(a + b)
                .filter(|sum| sum.is_finite())
                .map(Value::Float)
                .ok_or_else(|| OdmError::type_kind(&self.name, "float overflow")),
            (current, _) => Err(self.mismatch("number", current)),
        }
    }

    // ── Mutators ────────────────────────────────────────────────

    /// Validates and stores `value`, setting the dirty flag if
    /// `mark_modified` is true.
    pub fn assign(&mut self, value: Value, mark_modified: bool) -> OdmResult<()> {
        let mut value = self.coerce(value)?;
        if matches!(self.kind, FieldKind::UniqueRefList { .. }) {
            value = self.dedupe_refs(value)?;
        }
        self.value = value;
        if mark_modified {
            self.modified = true;
        }
        Ok(())
    }

    pub fn set(&mut self, value: Value) -> OdmResult<()> {
        self.assign(value, true)
    }

    /// Populates the field from a stored document. Never marks it dirty and
    /// never resolves references.
    pub fn load(&mut self, value: Value) -> OdmResult<()> {
        self.value = self.coerce(value)?;
        Ok(())
    }

    /// Appends to list kinds, merges into maps, adds a delta to numbers.
    pub fn add(&mut self, value: Value) -> OdmResult<()> {
        let next = match &self.kind {
            FieldKind::Integer | FieldKind::Float => self.sum(value)?,
            FieldKind::List | FieldKind::UniqueList => {
                if !is_list_element(&value) {
                    return Err(self.mismatch("scalar, list or map element", &value));
                }
                let mut items = self.list_items();
                items.push(value);
                if self.kind == FieldKind::UniqueList {
                    Value::List(unique_items(items))
                } else {
                    Value::List(items)
                }
            }
            FieldKind::Dict => match value {
                Value::Map(extra) => {
                    let mut map = self.value.as_map().cloned().unwrap_or_default();
                    map.extend(extra);
                    Value::Map(map)
                }
                other => return Err(self.mismatch("map", &other)),
            },
            FieldKind::RefList { model } => {
                let token = self.coerce_token(model, value)?;
                let mut items = self.list_items();
                items.push(Value::Ref(token));
                Value::List(items)
            }
            FieldKind::UniqueRefList { model } => {
                let token = self.coerce_token(model, value)?;
                let mut items = self.list_items();
                items.push(Value::Ref(token));
                self.dedupe_refs(Value::List(items))?
            }
            _ => return Err(self.unsupported("add")),
        };
        self.value = next;
        self.modified = true;
        Ok(())
    }

    /// Removes every element equal to `value` from list kinds, or the key
    /// named by `value` from a map.
    pub fn sub(&mut self, value: Value) -> OdmResult<()> {
        let next = match &self.kind {
            FieldKind::List | FieldKind::UniqueList => {
                let mut items = self.list_items();
                items.retain(|v| v != &value);
                Value::List(items)
            }
            FieldKind::RefList { model } | FieldKind::UniqueRefList { model } => {
                let target = Value::Ref(self.coerce_token(model, value)?);
                let mut items = self.list_items();
                items.retain(|v| v != &target);
                Value::List(items)
            }
            FieldKind::Dict => {
                let Some(key) = value.as_str() else {
                    return Err(self.mismatch("string key", &value));
                };
                let mut map = self.value.as_map().cloned().unwrap_or_default();
                map.remove(key);
                Value::Map(map)
            }
            _ => return Err(self.unsupported("sub")),
        };
        self.value = next;
        self.modified = true;
        Ok(())
    }

    pub fn increment(&mut self, delta: Value) -> OdmResult<()> {
        if !self.kind.is_number() {
            return Err(self.unsupported("increment"));
        }
        self.value = self.sum(delta)?;
        self.modified = true;
        Ok(())
    }

    pub fn decrement(&mut self, delta: Value) -> OdmResult<()> {
        if !self.kind.is_number() {
            return Err(self.unsupported("decrement"));
        }
        let negated = match self.coerce(delta)? {
            Value::Int(i) => i
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| OdmError::type_kind(&self.name, "integer overflow"))?,
            Value::Float(f) => Value::Float(-f),
            other => return Err(self.mismatch("number", &other)),
        };
        self.value = self.sum(negated)?;
        self.modified = true;
        Ok(())
    }

    /// Resets the value to the default.
    pub fn clear(&mut self) {
        self.value = self.default.clone();
        self.modified = true;
    }

    // ── Reads ───────────────────────────────────────────────────

    /// Reads the field. Reference kinds are resolved; a dangling single
    /// reference clears the field and reads as nothing.
    pub fn get(&mut self, opts: &GetOptions) -> OdmResult<FieldValue> {
        match self.kind {
            FieldKind::DateTime => {
                if let (Some(format), Value::DateTime(dt)) = (opts.format(), &self.value) {
                    return Ok(FieldValue::Value(Value::String(format_datetime(dt, format)?)));
                }
            }
            FieldKind::Ref { .. } => return self.resolve_single(),
            FieldKind::RefList { .. } | FieldKind::UniqueRefList { .. } => {
                return self.resolve_list().map(FieldValue::Entities);
            }
            _ => {}
        }
        Ok(FieldValue::Value(self.value.clone()))
    }

    fn resolve_single(&mut self) -> OdmResult<FieldValue> {
        let Value::Ref(token) = &self.value else {
            return Ok(FieldValue::Entity(None));
        };
        let token = token.clone();
        let entity = self.resolver()?.resolve(&token)?;
        if entity.is_none() && self.heal_dangling {
            warn!(field = %self.name, token = %token, "Referenced entity is gone, clearing field");
            self.value = Value::Null;
            self.modified = true;
        }
        Ok(FieldValue::Entity(entity))
    }

    fn resolve_list(&self) -> OdmResult<Vec<Entity>> {
        let resolver = self.resolver()?;
        let mut out = Vec::new();
        for item in self.value.as_list().unwrap_or_default() {
            if let Value::Ref(token) = item {
                if let Some(entity) = resolver.resolve(token)? {
                    out.push(entity);
                }
            }
        }
        Ok(out)
    }

    /// Value handed to the backend; `None` for virtual fields.
    pub fn storable_value(&self) -> OdmResult<Option<Value>> {
        if self.required && !self.value.is_truthy() {
            return Err(OdmError::ConstraintViolation {
                field: self.name.clone(),
            });
        }
        if self.kind == FieldKind::Virtual {
            return Ok(None);
        }
        Ok(Some(self.value.clone()))
    }

    /// Plain JSON rendering of the raw value.
    pub fn jsonable(&self, datetime_format: Option<&str>) -> OdmResult<serde_json::Value> {
        if let (Some(format), Value::DateTime(dt)) = (datetime_format, &self.value) {
            return Ok(serde_json::Value::String(format_datetime(dt, format)?));
        }
        Ok(self.value.to_json())
    }

    /// Checks that the configured default is acceptable to the kind.
    pub(crate) fn validate_default(&self) -> OdmResult<()> {
        self.coerce(self.default.clone()).map(|_| ())
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("value", &self.value)
            .field("required", &self.required)
            .field("modified", &self.modified)
            .finish_non_exhaustive()
    }
}
