//! Type-specific attribute sets. Every struct keeps unknown attributes in
//! `extra` so vendor or newer-release attributes survive a round trip.

use crate::primitive::filter::one_or_many;
use crate::primitive::{CseType, NotificationEventType, Operation, ResourceType};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Default content info of a contentInstance without `cnf`.
pub const DEFAULT_CONTENT_INFO: &str = "text/plain:0";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AeAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub aei: String,
    #[serde(deserialize_with = "uri_list", skip_serializing_if = "Vec::is_empty")]
    pub poa: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rr: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mni: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mbs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mia: Option<u64>,
    pub cni: u64,
    pub cbs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub li: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disr: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentInstanceAttributes {
    pub cnf: String,
    pub cs: u64,
    pub con: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for ContentInstanceAttributes {
    fn default() -> Self {
        Self {
            cnf: DEFAULT_CONTENT_INFO.to_string(),
            cs: 0,
            con: Value::Null,
            extra: Map::new(),
        }
    }
}

/// Byte size of a content value: the length of a string, or of the JSON
/// text for any other value.
pub fn content_size(con: &Value) -> u64 {
    match con {
        Value::Null => 0,
        Value::String(s) => s.len() as u64,
        other => other.to_string().len() as u64,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CseBaseAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cst: Option<CseType>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub csi: String,
    #[serde(deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub srt: Vec<ResourceType>,
    #[serde(deserialize_with = "uri_list", skip_serializing_if = "Vec::is_empty")]
    pub poa: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteCseAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cst: Option<CseType>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub cb: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub csi: String,
    #[serde(deserialize_with = "uri_list", skip_serializing_if = "Vec::is_empty")]
    pub poa: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rr: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mt: Option<ResourceType>,
    pub cnm: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mnm: Option<u64>,
    #[serde(deserialize_with = "one_or_many")]
    pub mid: Vec<String>,
    #[serde(deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub macp: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtv: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csy: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gn: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `om` of the event notification criteria.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationMonitor {
    #[serde(deserialize_with = "one_or_many")]
    pub opr: Vec<Operation>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `atr` of the event notification criteria.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeFilter {
    #[serde(deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub ty: Vec<ResourceType>,
    #[serde(deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub lbl: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AttributeFilter {
    pub fn is_empty(&self) -> bool {
        self.ty.is_empty() && self.lbl.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventNotificationCriteria {
    #[serde(deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub net: Vec<NotificationEventType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub om: Option<OperationMonitor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub atr: Option<AttributeFilter>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enc: Option<EventNotificationCriteria>,
    #[serde(deserialize_with = "uri_list")]
    pub nu: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nct: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub su: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One privilege entry of an access control policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessControlRule {
    #[serde(deserialize_with = "uri_list")]
    pub acor: Vec<String>,
    pub acop: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acco: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Privileges {
    #[serde(deserialize_with = "one_or_many")]
    pub acr: Vec<AccessControlRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessControlPolicyAttributes {
    pub pv: Privileges,
    pub pvs: Privileges,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Type-specific part of a resource record.
#[derive(Debug, Clone, PartialEq)]
pub enum Attributes {
    Ae(AeAttributes),
    Container(ContainerAttributes),
    ContentInstance(ContentInstanceAttributes),
    CseBase(CseBaseAttributes),
    RemoteCse(RemoteCseAttributes),
    Group(GroupAttributes),
    Subscription(SubscriptionAttributes),
    AccessControlPolicy(AccessControlPolicyAttributes),
    /// Types without dedicated handling keep every attribute verbatim.
    Generic(Map<String, Value>),
}

impl Attributes {
    pub fn from_map(ty: ResourceType, map: Map<String, Value>) -> Result<Self, serde_json::Error> {
        let value = Value::Object(map);
        Ok(match ty {
            ResourceType::Ae => Attributes::Ae(serde_json::from_value(value)?),
            ResourceType::Container => Attributes::Container(serde_json::from_value(value)?),
            ResourceType::ContentInstance => {
                Attributes::ContentInstance(serde_json::from_value(value)?)
            }
            ResourceType::CseBase => Attributes::CseBase(serde_json::from_value(value)?),
            ResourceType::RemoteCse => Attributes::RemoteCse(serde_json::from_value(value)?),
            ResourceType::Group => Attributes::Group(serde_json::from_value(value)?),
            ResourceType::Subscription => Attributes::Subscription(serde_json::from_value(value)?),
            ResourceType::AccessControlPolicy => {
                Attributes::AccessControlPolicy(serde_json::from_value(value)?)
            }
            _ => match value {
                Value::Object(map) => Attributes::Generic(map),
                _ => Attributes::Generic(Map::new()),
            },
        })
    }

    pub fn to_map(&self) -> Map<String, Value> {
        let value = match self {
            Attributes::Ae(a) => serde_json::to_value(a),
            Attributes::Container(a) => serde_json::to_value(a),
            Attributes::ContentInstance(a) => serde_json::to_value(a),
            Attributes::CseBase(a) => serde_json::to_value(a),
            Attributes::RemoteCse(a) => serde_json::to_value(a),
            Attributes::Group(a) => serde_json::to_value(a),
            Attributes::Subscription(a) => serde_json::to_value(a),
            Attributes::AccessControlPolicy(a) => serde_json::to_value(a),
            Attributes::Generic(map) => return map.clone(),
        };
        match value {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Points of access carried by AE, CSEBase and remoteCSE records.
    pub fn poa(&self) -> &[String] {
        match self {
            Attributes::Ae(a) => &a.poa,
            Attributes::CseBase(a) => &a.poa,
            Attributes::RemoteCse(a) => &a.poa,
            _ => &[],
        }
    }
}

/// URI lists arrive either as JSON arrays or as one space-separated string.
fn uri_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let items: Vec<String> = one_or_many(deserializer)?;
    Ok(items
        .iter()
        .flat_map(|item| item.split_whitespace())
        .map(str::to_string)
        .collect())
}
