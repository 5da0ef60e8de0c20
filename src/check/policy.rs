//! Attribute presence rules per resource type, for Create and Update bodies.

use crate::primitive::{Operation, ResourceType};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Required,
    Forbidden,
    Optional,
}

use Presence::{Forbidden as F, Optional as O, Required as R};

/// One attribute and its expected presence on Create and on Update.
#[derive(Debug, Clone, Copy)]
pub struct AttributeRule {
    pub short: &'static str,
    pub long: &'static str,
    pub create: Presence,
    pub update: Presence,
}

const fn rule(short: &'static str, long: &'static str, create: Presence, update: Presence) -> AttributeRule {
    AttributeRule {
        short,
        long,
        create,
        update,
    }
}

impl AttributeRule {
    pub fn expected(&self, op: Operation) -> Presence {
        match op {
            Operation::Create => self.create,
            Operation::Update => self.update,
            _ => O,
        }
    }
}

const RESOURCE_NAME: AttributeRule = rule("rn", "resourceName", O, F);
const RESOURCE_TYPE: AttributeRule = rule("ty", "resourceType", F, F);
const RESOURCE_ID: AttributeRule = rule("ri", "resourceID", F, F);
const PARENT_ID: AttributeRule = rule("pi", "parentID", F, F);
const CREATION_TIME: AttributeRule = rule("ct", "creationTime", F, F);
const LAST_MODIFIED_TIME: AttributeRule = rule("lt", "lastModifiedTime", F, F);
const STATE_TAG: AttributeRule = rule("st", "stateTag", F, F);
const CREATOR: AttributeRule = rule("cr", "creator", O, F);

const ACCESS_CONTROL_POLICY: &[AttributeRule] = &[
    RESOURCE_NAME,
    RESOURCE_TYPE,
    RESOURCE_ID,
    PARENT_ID,
    CREATION_TIME,
    LAST_MODIFIED_TIME,
    rule("pv", "privileges", R, O),
    rule("pvs", "selfPrivileges", R, O),
];

const AE: &[AttributeRule] = &[
    RESOURCE_NAME,
    RESOURCE_TYPE,
    RESOURCE_ID,
    PARENT_ID,
    CREATION_TIME,
    LAST_MODIFIED_TIME,
    rule("api", "App-ID", R, F),
    rule("aei", "AE-ID", F, F),
    rule("nl", "nodeLink", F, F),
    rule("rr", "requestReachability", R, O),
];

const CONTAINER: &[AttributeRule] = &[
    RESOURCE_NAME,
    RESOURCE_TYPE,
    RESOURCE_ID,
    PARENT_ID,
    CREATION_TIME,
    LAST_MODIFIED_TIME,
    STATE_TAG,
    CREATOR,
    rule("cni", "currentNrOfInstances", F, F),
    rule("cbs", "currentByteSize", F, F),
    rule("disr", "disableRetrieval", O, F),
];

const CONTENT_INSTANCE: &[AttributeRule] = &[
    RESOURCE_NAME,
    RESOURCE_TYPE,
    RESOURCE_ID,
    PARENT_ID,
    CREATION_TIME,
    LAST_MODIFIED_TIME,
    STATE_TAG,
    rule("cs", "contentSize", F, O),
    rule("con", "content", R, R),
];

const CSE_BASE: &[AttributeRule] = &[
    rule("cst", "cseType", F, F),
    rule("csi", "CSE-ID", F, F),
    rule("srt", "supportedResourceType", F, F),
];

const GROUP: &[AttributeRule] = &[
    RESOURCE_NAME,
    RESOURCE_TYPE,
    RESOURCE_ID,
    PARENT_ID,
    CREATION_TIME,
    LAST_MODIFIED_TIME,
    CREATOR,
    rule("mt", "memberType", O, F),
    rule("cnm", "currentNrOfMembers", F, F),
    rule("mnm", "maxNrOfMembers", R, O),
    rule("mid", "memberIDs", R, F),
    rule("mtv", "memberTypeValidated", F, F),
    rule("csy", "consistencyStrategy", O, F),
];

const REMOTE_CSE: &[AttributeRule] = &[
    RESOURCE_NAME,
    RESOURCE_TYPE,
    RESOURCE_ID,
    PARENT_ID,
    CREATION_TIME,
    LAST_MODIFIED_TIME,
    rule("cst", "cseType", O, F),
    rule("cb", "CSEBase", R, F),
    rule("csi", "CSE-ID", R, F),
];

const SUBSCRIPTION: &[AttributeRule] = &[
    RESOURCE_NAME,
    RESOURCE_TYPE,
    RESOURCE_ID,
    PARENT_ID,
    CREATION_TIME,
    LAST_MODIFIED_TIME,
    CREATOR,
    rule("nu", "notificationURI", R, O),
    rule("psn", "preSubscriptionNotify", O, F),
    rule("su", "subscriberURI", O, F),
];

/// Rules for `ty`; types without a table accept any attribute set.
pub fn rules_for(ty: ResourceType) -> &'static [AttributeRule] {
    match ty {
        ResourceType::AccessControlPolicy => ACCESS_CONTROL_POLICY,
        ResourceType::Ae => AE,
        ResourceType::Container => CONTAINER,
        ResourceType::ContentInstance => CONTENT_INSTANCE,
        ResourceType::CseBase => CSE_BASE,
        ResourceType::Group => GROUP,
        ResourceType::RemoteCse => REMOTE_CSE,
        ResourceType::Subscription => SUBSCRIPTION,
        _ => &[],
    }
}

/// Every attribute whose presence in `body` contradicts the table,
/// rendered as `"<name> is present"` or `"<name> is not present"`.
pub fn violations(op: Operation, ty: ResourceType, body: &Map<String, Value>) -> Vec<String> {
    rules_for(ty)
        .iter()
        .filter_map(|rule| {
            let present = body.contains_key(rule.short);
            match (rule.expected(op), present) {
                (Presence::Required, false) => Some(format!("{} is not present", rule.long)),
                (Presence::Forbidden, true) => Some(format!("{} is present", rule.long)),
                _ => None,
            }
        })
        .collect()
}
