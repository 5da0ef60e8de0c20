//! Request and response primitives, the protocol-neutral messages every
//! binder translates to and from its transport.

pub mod codes;
pub mod filter;
pub mod query;
pub mod time;

pub use codes::{
    CseType, DiscResType, FilterUsage, NotificationEventType, Operation, ResourceType,
    ResponseStatusCode, ResultContent, SortType, DISCOVER_MASK_BIT,
};
pub use filter::FilterCriteria;

use crate::error::CseError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// Content serialization used by this CSE on every binding.
pub const CONTENT_TYPE_JSON: &str = "json";

pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// One request, serialized with the short attribute codes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestPrimitive {
    pub op: Operation,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub fr: String,
    #[serde(default)]
    pub rqi: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<ResourceType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pc: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rcn: Option<ResultContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fc: Option<FilterCriteria>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drt: Option<DiscResType>,
    /// Requested content serialization of the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cty: Option<String>,
}

impl RequestPrimitive {
    pub fn new(op: Operation, to: impl Into<String>, fr: impl Into<String>) -> Self {
        Self {
            op,
            to: to.into(),
            fr: fr.into(),
            rqi: new_request_id(),
            ty: None,
            pc: None,
            rcn: None,
            fc: None,
            drt: None,
            cty: None,
        }
    }

    pub fn with_type(mut self, ty: ResourceType) -> Self {
        self.ty = Some(ty);
        self
    }

    pub fn with_content(mut self, pc: Value) -> Self {
        self.pc = Some(pc);
        self
    }

    pub fn with_rcn(mut self, rcn: ResultContent) -> Self {
        self.rcn = Some(rcn);
        self
    }

    pub fn with_filter(mut self, fc: FilterCriteria) -> Self {
        self.fc = Some(fc);
        self
    }

    pub fn is_discovery(&self) -> bool {
        self.fc.as_ref().map_or(false, FilterCriteria::is_discovery)
    }

    pub fn result_content(&self) -> ResultContent {
        self.rcn.unwrap_or(ResultContent::Attributes)
    }

    pub fn content_type(&self) -> &str {
        self.cty.as_deref().unwrap_or(CONTENT_TYPE_JSON)
    }

    pub fn to_json(&self) -> Result<Vec<u8>, CseError> {
        serde_json::to_vec(self).map_err(|e| CseError::Store(e.to_string()))
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, CseError> {
        serde_json::from_slice(bytes).map_err(|e| CseError::Validation(e.to_string()))
    }
}

/// Response correlated to a request by `rqi`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePrimitive {
    pub rsc: ResponseStatusCode,
    #[serde(default)]
    pub rqi: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub fr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pc: Option<Value>,
}

impl ResponsePrimitive {
    /// Response to `rqp` originated by `fr`.
    pub fn new(rqp: &RequestPrimitive, fr: &str, rsc: ResponseStatusCode, pc: Option<Value>) -> Self {
        Self {
            rsc,
            rqi: rqp.rqi.clone(),
            to: rqp.fr.clone(),
            fr: fr.to_string(),
            pc,
        }
    }

    pub fn from_error(rqp: &RequestPrimitive, fr: &str, err: &CseError) -> Self {
        Self::new(rqp, fr, err.status(), Some(debug_content(&err.to_string())))
    }

    pub fn is_success(&self) -> bool {
        self.rsc.is_success()
    }

    /// The debug message carried by an error response, if any.
    pub fn debug_message(&self) -> Option<&str> {
        self.pc.as_ref()?.get("m2m:dbg")?.as_str()
    }

    pub fn to_json(&self) -> Result<Vec<u8>, CseError> {
        serde_json::to_vec(self).map_err(|e| CseError::Store(e.to_string()))
    }
}

pub fn debug_content(message: &str) -> Value {
    json!({ "m2m:dbg": message })
}

#[cfg(test)]
mod tests;
