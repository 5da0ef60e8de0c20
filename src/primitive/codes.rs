use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Numeric protocol code as it appears on the wire.
///
/// Peers are not consistent about quoting numbers (HTTP query strings and some
/// MQTT clients send `"op": "1"`), so both forms are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Code(pub u16);

impl<'de> Deserialize<'de> for Code {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Num(u64),
            Str(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Num(n) => u16::try_from(n)
                .map(Code)
                .map_err(|_| serde::de::Error::custom(format!("code out of range: {}", n))),
            Raw::Str(s) => s
                .trim()
                .parse::<u16>()
                .map(Code)
                .map_err(|_| serde::de::Error::custom(format!("not a numeric code: '{}'", s))),
        }
    }
}

/// Error for a numeric code outside an enumeration's range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCode {
    pub kind: &'static str,
    pub code: u16,
}

impl fmt::Display for UnknownCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {}", self.kind, self.code)
    }
}

impl std::error::Error for UnknownCode {}

macro_rules! numeric_code {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $($variant:ident = $value:literal => $label:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "Code", into = "u16")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn code(self) -> u16 {
                match self {
                    $($name::$variant => $value),+
                }
            }

            pub fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl TryFrom<u16> for $name {
            type Error = UnknownCode;

            fn try_from(code: u16) -> Result<Self, Self::Error> {
                match code {
                    $($value => Ok($name::$variant),)+
                    other => Err(UnknownCode { kind: $kind, code: other }),
                }
            }
        }

        impl TryFrom<Code> for $name {
            type Error = UnknownCode;

            fn try_from(code: Code) -> Result<Self, Self::Error> {
                Self::try_from(code.0)
            }
        }

        impl From<$name> for u16 {
            fn from(value: $name) -> u16 {
                value.code()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}

numeric_code! {
    /// Request operation (`op`).
    Operation, "operation type" {
        Create = 1 => "Create",
        Retrieve = 2 => "Retrieve",
        Update = 3 => "Update",
        Delete = 4 => "Delete",
        Notify = 5 => "Notify",
    }
}

impl Operation {
    /// Bit of this operation in an access-control operation mask (`acop`)
    /// or an operation-monitor mask.
    pub fn mask_bit(self) -> u32 {
        1 << (self.code() - 1)
    }

    pub fn is_mutating(self) -> bool {
        matches!(self, Operation::Create | Operation::Update | Operation::Delete)
    }

    pub fn http_method(self) -> &'static str {
        match self {
            Operation::Create | Operation::Notify => "POST",
            Operation::Retrieve => "GET",
            Operation::Update => "PUT",
            Operation::Delete => "DELETE",
        }
    }
}

/// `acop` bit for a Retrieve issued in discovery mode.
pub const DISCOVER_MASK_BIT: u32 = 32;

numeric_code! {
    /// Response status code (`rsc`).
    ResponseStatusCode, "response status code" {
        Ok = 2000 => "OK",
        Created = 2001 => "CREATED",
        BadRequest = 4000 => "BAD_REQUEST",
        NotFound = 4004 => "NOT_FOUND",
        OperationNotAllowed = 4005 => "OPERATION_NOT_ALLOWED",
        RequestTimeout = 4008 => "REQUEST_TIMEOUT",
        OriginatorHasNoPrivilege = 4103 => "ORIGINATOR_HAS_NO_PRIVILEGE",
        AlreadyExists = 4105 => "ALREADY_EXISTS",
        InternalServerError = 5000 => "INTERNAL_SERVER_ERROR",
        NotImplemented = 5001 => "NOT_IMPLEMENTED",
        TargetNotReachable = 5103 => "TARGET_NOT_REACHABLE",
    }
}

impl ResponseStatusCode {
    pub fn is_success(self) -> bool {
        self.code() < 3000
    }

    pub fn http_status(self) -> u16 {
        match self {
            ResponseStatusCode::Ok => 200,
            ResponseStatusCode::Created => 201,
            ResponseStatusCode::BadRequest => 400,
            ResponseStatusCode::NotFound | ResponseStatusCode::TargetNotReachable => 404,
            ResponseStatusCode::OperationNotAllowed => 405,
            ResponseStatusCode::RequestTimeout => 408,
            ResponseStatusCode::OriginatorHasNoPrivilege => 403,
            ResponseStatusCode::AlreadyExists => 409,
            ResponseStatusCode::InternalServerError => 500,
            ResponseStatusCode::NotImplemented => 501,
        }
    }
}

numeric_code! {
    /// Result content (`rcn`).
    ResultContent, "ResultContent type" {
        Nothing = 0 => "Nothing",
        Attributes = 1 => "Attributes",
        HierarchicalAddress = 2 => "Hierarchical address",
        HierarchicalAddressAndAttributes = 3 => "Hierarchical address and attributes",
        AttributesAndChildResources = 4 => "Attributes and child resources",
        AttributesAndChildResourceReferences = 5 => "Attributes and child resource references",
        ChildResourceReferences = 6 => "Child resource references",
        ChildResources = 8 => "Child resources",
    }
}

impl ResultContent {
    pub fn includes_attributes(self) -> bool {
        matches!(
            self,
            ResultContent::Attributes
                | ResultContent::HierarchicalAddressAndAttributes
                | ResultContent::AttributesAndChildResources
                | ResultContent::AttributesAndChildResourceReferences
        )
    }

    pub fn is_reference_list(self) -> bool {
        matches!(
            self,
            ResultContent::ChildResourceReferences
                | ResultContent::AttributesAndChildResourceReferences
        )
    }

    pub fn is_hierarchical_address(self) -> bool {
        matches!(
            self,
            ResultContent::HierarchicalAddress | ResultContent::HierarchicalAddressAndAttributes
        )
    }
}

numeric_code! {
    /// Filter usage (`fu`).
    FilterUsage, "filter usage" {
        DiscoveryCriteria = 1 => "Discovery Criteria",
        ConditionalRetrieval = 2 => "Conditional Retrieval",
    }
}

numeric_code! {
    /// Discovery result type (`drt`).
    DiscResType, "discovery result type" {
        Structured = 1 => "structured",
        Unstructured = 2 => "unstructured",
    }
}

numeric_code! {
    /// Discovery sort order (`dst`), by creation time.
    SortType, "sort type" {
        Ascending = 1 => "Ascending",
        Descending = 2 => "Descending",
    }
}

numeric_code! {
    /// CSE role (`cst`).
    CseType, "CSE type" {
        In = 1 => "IN_CSE",
        Mn = 2 => "MN_CSE",
        Asn = 3 => "ASN_CSE",
    }
}

impl CseType {
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_uppercase().trim_end_matches("_CSE") {
            "IN" | "1" => Some(CseType::In),
            "MN" | "2" => Some(CseType::Mn),
            "ASN" | "3" => Some(CseType::Asn),
            _ => None,
        }
    }
}

numeric_code! {
    /// Notification event type (`net`) inside event notification criteria.
    NotificationEventType, "notification event type" {
        UpdateOfResource = 1 => "Update_of_Resource",
        DeleteOfResource = 2 => "Delete_of_Resource",
        CreateOfDirectChildResource = 3 => "Create_of_Direct_Child_Resource",
        DeleteOfDirectChildResource = 4 => "Delete_of_Direct_Child_Resource",
        RetrieveOfContainerWithNoChild = 5 => "Retrieve_of_Container_Resource_With_No_Child_Resource",
    }
}

numeric_code! {
    /// Resource type (`ty`).
    ResourceType, "resource type" {
        AccessControlPolicy = 1 => "accessControlPolicy",
        Ae = 2 => "AE",
        Container = 3 => "container",
        ContentInstance = 4 => "contentInstance",
        CseBase = 5 => "CSEBase",
        Delivery = 6 => "delivery",
        Group = 9 => "group",
        Node = 14 => "node",
        PollingChannel = 15 => "pollingChannel",
        RemoteCse = 16 => "remoteCSE",
        Request = 17 => "request",
        Schedule = 18 => "schedule",
        Subscription = 23 => "subscription",
        SemanticDescriptor = 24 => "semanticDescriptor",
        FlexContainer = 28 => "flexContainer",
        TimeSeries = 29 => "timeSeries",
    }
}

impl ResourceType {
    /// Short resource-type name used as the representation key (`m2m:<short>`).
    pub fn short_name(self) -> &'static str {
        match self {
            ResourceType::AccessControlPolicy => "acp",
            ResourceType::Ae => "ae",
            ResourceType::Container => "cnt",
            ResourceType::ContentInstance => "cin",
            ResourceType::CseBase => "cb",
            ResourceType::Delivery => "dlv",
            ResourceType::Group => "grp",
            ResourceType::Node => "nod",
            ResourceType::PollingChannel => "pch",
            ResourceType::RemoteCse => "csr",
            ResourceType::Request => "req",
            ResourceType::Schedule => "sch",
            ResourceType::Subscription => "sub",
            ResourceType::SemanticDescriptor => "smd",
            ResourceType::FlexContainer => "fcnt",
            ResourceType::TimeSeries => "ts",
        }
    }

    /// Prefix of generated resource identifiers.
    pub fn id_prefix(self) -> &'static str {
        self.short_name()
    }

    pub fn from_short_name(name: &str) -> Option<Self> {
        let name = name.strip_prefix("m2m:").unwrap_or(name);
        ALL_RESOURCE_TYPES
            .iter()
            .copied()
            .find(|ty| ty.short_name() == name || ty.label() == name)
    }

    /// Representation key of this type, e.g. `m2m:cnt`.
    pub fn wire_key(self) -> String {
        format!("m2m:{}", self.short_name())
    }
}

pub const ALL_RESOURCE_TYPES: [ResourceType; 16] = [
    ResourceType::AccessControlPolicy,
    ResourceType::Ae,
    ResourceType::Container,
    ResourceType::ContentInstance,
    ResourceType::CseBase,
    ResourceType::Delivery,
    ResourceType::Group,
    ResourceType::Node,
    ResourceType::PollingChannel,
    ResourceType::RemoteCse,
    ResourceType::Request,
    ResourceType::Schedule,
    ResourceType::Subscription,
    ResourceType::SemanticDescriptor,
    ResourceType::FlexContainer,
    ResourceType::TimeSeries,
];
