use super::codes::{FilterUsage, ResourceType, SortType};
use super::time::{serde_ts_opt, Timestamp};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Filter criteria (`fc`) of a Retrieve or discovery request.
///
/// Bounds follow the usual oneM2M convention: the `*b` ("before"/"below")
/// keys are exclusive upper bounds and the `*a` ("after"/"above") keys are
/// inclusive lower bounds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterCriteria {
    #[serde(with = "serde_ts_opt", skip_serializing_if = "Option::is_none")]
    pub crb: Option<Timestamp>,
    #[serde(with = "serde_ts_opt", skip_serializing_if = "Option::is_none")]
    pub cra: Option<Timestamp>,
    #[serde(with = "serde_ts_opt", skip_serializing_if = "Option::is_none")]
    pub ms: Option<Timestamp>,
    #[serde(with = "serde_ts_opt", skip_serializing_if = "Option::is_none")]
    pub us: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stb: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sts: Option<u64>,
    #[serde(with = "serde_ts_opt", skip_serializing_if = "Option::is_none")]
    pub exb: Option<Timestamp>,
    #[serde(with = "serde_ts_opt", skip_serializing_if = "Option::is_none")]
    pub exa: Option<Timestamp>,
    #[serde(deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub lbl: Vec<String>,
    #[serde(deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub ty: Vec<ResourceType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sza: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub szb: Option<u64>,
    #[serde(deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub cty: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fu: Option<FilterUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lim: Option<usize>,
    /// 1-based offset into the matched list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ofst: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lvl: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dst: Option<SortType>,
    /// Attribute equality filters (`rn=temp*`), `*` acts as a wildcard.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl FilterCriteria {
    pub fn is_discovery(&self) -> bool {
        self.fu == Some(FilterUsage::DiscoveryCriteria)
    }

    pub fn discovery() -> Self {
        Self {
            fu: Some(FilterUsage::DiscoveryCriteria),
            ..Self::default()
        }
    }

    pub fn of_type(ty: ResourceType) -> Self {
        Self {
            ty: vec![ty],
            ..Self::default()
        }
    }

    /// Number of matched records to skip before applying `lim`.
    pub fn skip(&self) -> usize {
        self.ofst.map(|o| o.saturating_sub(1)).unwrap_or(0)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

pub(crate) fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    match Option::<OneOrMany<T>>::deserialize(deserializer)? {
        None => Ok(Vec::new()),
        Some(OneOrMany::One(item)) => Ok(vec![item]),
        Some(OneOrMany::Many(items)) => Ok(items),
    }
}
