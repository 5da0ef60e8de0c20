//! Resource records: the persisted unit of the resource tree.

pub mod attributes;
pub mod virtual_resource;

pub use attributes::{
    content_size, AccessControlPolicyAttributes, AccessControlRule, AeAttributes, Attributes,
    ContainerAttributes, ContentInstanceAttributes, CseBaseAttributes, EventNotificationCriteria,
    GroupAttributes, Privileges, RemoteCseAttributes, SubscriptionAttributes,
};
pub use virtual_resource::VirtualResource;

use crate::error::CseError;
use crate::primitive::time::{format_timestamp, parse_timestamp, Timestamp};
use crate::primitive::ResourceType;
use rand::Rng;
use serde_json::{Map, Value};

/// Attributes that never change once a resource exists.
const IDENTITY_ATTRIBUTES: [&str; 5] = ["ty", "ri", "rn", "pi", "ct"];

#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    /// Hierarchical path, e.g. `mobius/ae1/cnt1`. The root has no separator.
    pub path: String,
    /// Path of the parent; empty for the CSEBase.
    pub parent_path: String,
    pub ty: ResourceType,
    pub ri: String,
    pub rn: String,
    pub pi: String,
    pub ct: Timestamp,
    pub lt: Timestamp,
    pub et: Option<Timestamp>,
    pub st: Option<u64>,
    pub lbl: Vec<String>,
    pub acpi: Vec<String>,
    pub cr: Option<String>,
    pub attrs: Attributes,
}

impl Resource {
    /// Flat short-key representation, as exchanged on the wire.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = self.attrs.to_map();
        map.insert("ty".into(), Value::from(self.ty.code()));
        map.insert("ri".into(), Value::from(self.ri.clone()));
        map.insert("rn".into(), Value::from(self.rn.clone()));
        map.insert("pi".into(), Value::from(self.pi.clone()));
        map.insert("ct".into(), Value::from(format_timestamp(&self.ct)));
        map.insert("lt".into(), Value::from(format_timestamp(&self.lt)));
        if let Some(et) = &self.et {
            map.insert("et".into(), Value::from(format_timestamp(et)));
        }
        if let Some(st) = self.st {
            map.insert("st".into(), Value::from(st));
        }
        if !self.lbl.is_empty() {
            map.insert("lbl".into(), Value::from(self.lbl.clone()));
        }
        if !self.acpi.is_empty() {
            map.insert("acpi".into(), Value::from(self.acpi.clone()));
        }
        if let Some(cr) = &self.cr {
            map.insert("cr".into(), Value::from(cr.clone()));
        }
        map
    }

    /// Rebuilds a record from its flat representation.
    pub fn from_map(
        path: &str,
        parent_path: &str,
        mut map: Map<String, Value>,
    ) -> Result<Self, CseError> {
        let ty = map
            .remove("ty")
            .ok_or_else(|| CseError::Store(format!("record {} has no resource type", path)))
            .and_then(|v| {
                serde_json::from_value::<ResourceType>(v)
                    .map_err(|e| CseError::Store(format!("record {}: {}", path, e)))
            })?;
        let ri = take_string(&mut map, "ri").unwrap_or_default();
        let rn = take_string(&mut map, "rn").unwrap_or_default();
        let pi = take_string(&mut map, "pi").unwrap_or_default();
        let ct = take_time(&mut map, "ct")?;
        let lt = take_time(&mut map, "lt")?;
        let et = take_time(&mut map, "et")?;
        let st = map.remove("st").and_then(|v| value_as_u64(&v));
        let lbl = take_strings(&mut map, "lbl");
        let acpi = take_strings(&mut map, "acpi");
        let cr = take_string(&mut map, "cr");

        let attrs = Attributes::from_map(ty, map)
            .map_err(|e| CseError::Validation(format!("invalid {} attributes: {}", ty, e)))?;

        let now = crate::primitive::time::now();
        Ok(Self {
            path: path.to_string(),
            parent_path: parent_path.to_string(),
            ty,
            ri,
            rn,
            pi,
            ct: ct.unwrap_or(now),
            lt: lt.unwrap_or(now),
            et,
            st,
            lbl,
            acpi,
            cr,
            attrs,
        })
    }

    /// Merges an Update body into this record. Identity attributes are kept.
    pub fn merge(&mut self, patch: Map<String, Value>) -> Result<(), CseError> {
        let mut map = self.to_map();
        for (key, value) in patch {
            if IDENTITY_ATTRIBUTES.contains(&key.as_str()) {
                continue;
            }
            if value.is_null() {
                map.remove(&key);
            } else {
                map.insert(key, value);
            }
        }
        *self = Self::from_map(&self.path, &self.parent_path, map)?;
        Ok(())
    }

    /// `{"m2m:<short>": {...}}`
    pub fn wrapped(&self) -> Value {
        wrap(self.ty, Value::Object(self.to_map()))
    }

    pub fn poa(&self) -> &[String] {
        self.attrs.poa()
    }

    pub fn container(&self) -> Option<&ContainerAttributes> {
        match &self.attrs {
            Attributes::Container(c) => Some(c),
            _ => None,
        }
    }

    pub fn content_instance(&self) -> Option<&ContentInstanceAttributes> {
        match &self.attrs {
            Attributes::ContentInstance(c) => Some(c),
            _ => None,
        }
    }

    pub fn subscription(&self) -> Option<&SubscriptionAttributes> {
        match &self.attrs {
            Attributes::Subscription(s) => Some(s),
            _ => None,
        }
    }

    pub fn group(&self) -> Option<&GroupAttributes> {
        match &self.attrs {
            Attributes::Group(g) => Some(g),
            _ => None,
        }
    }

    pub fn policy(&self) -> Option<&AccessControlPolicyAttributes> {
        match &self.attrs {
            Attributes::AccessControlPolicy(p) => Some(p),
            _ => None,
        }
    }

    /// Content byte size, for types that carry content.
    pub fn content_size(&self) -> Option<u64> {
        self.content_instance().map(|c| c.cs)
    }

    /// Value of a single attribute in the wire representation.
    pub fn attribute(&self, key: &str) -> Option<Value> {
        self.to_map().remove(key)
    }
}

pub fn wrap(ty: ResourceType, body: Value) -> Value {
    let mut map = Map::new();
    map.insert(ty.wire_key(), body);
    Value::Object(map)
}

/// Extracts the attribute map of a request body keyed `m2m:<short>` (or the
/// bare short name) for the declared resource type.
pub fn unwrap_content(ty: ResourceType, pc: &Value) -> Result<Map<String, Value>, CseError> {
    let outer = pc
        .as_object()
        .ok_or_else(|| CseError::Validation("content must be a JSON object".into()))?;
    let inner = outer
        .get(&ty.wire_key())
        .or_else(|| outer.get(ty.short_name()))
        .ok_or_else(|| {
            CseError::Validation(format!(
                "content does not contain a '{}' representation",
                ty.wire_key()
            ))
        })?;
    inner
        .as_object()
        .cloned()
        .ok_or_else(|| CseError::Validation(format!("'{}' must be a JSON object", ty.wire_key())))
}

/// Determines the resource type of a body from its wrapping key.
pub fn content_type_of(pc: &Value) -> Option<ResourceType> {
    pc.as_object()?
        .keys()
        .find_map(|key| ResourceType::from_short_name(key))
}

/// New type-prefixed resource identifier, e.g. `cnt-k3j9x0a1b2c3`.
pub fn generate_resource_id(ty: ResourceType) -> String {
    let mut rng = rand::thread_rng();
    let random: String = (0..12)
        .map(|_| {
            let idx = rng.gen_range(0..36);
            if idx < 10 {
                (b'0' + idx) as char
            } else {
                (b'a' + idx - 10) as char
            }
        })
        .collect();
    format!("{}-{}", ty.id_prefix(), random)
}

/// Whether a bare identifier has the shape produced by [`generate_resource_id`].
pub fn looks_like_resource_id(text: &str) -> bool {
    match text.split_once('-') {
        Some((prefix, rest)) => {
            ResourceType::from_short_name(prefix).is_some()
                && !rest.is_empty()
                && rest.chars().all(|c| c.is_ascii_alphanumeric())
        }
        None => false,
    }
}

/// Path of the parent of `path` (empty for a single segment).
pub fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

fn take_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.remove(key)? {
        Value::String(s) => Some(s),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn take_strings(map: &mut Map<String, Value>, key: &str) -> Vec<String> {
    match map.remove(key) {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) => s.split_whitespace().map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

fn take_time(map: &mut Map<String, Value>, key: &str) -> Result<Option<Timestamp>, CseError> {
    match take_string(map, key) {
        None => Ok(None),
        Some(text) => parse_timestamp(&text)
            .map(Some)
            .ok_or_else(|| CseError::Validation(format!("invalid timestamp in '{}': {}", key, text))),
    }
}

pub(crate) fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
