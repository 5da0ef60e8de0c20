//! Which resource types may be created under which parent types.

use crate::primitive::ResourceType;
use ResourceType::*;

const CSE_BASE_CHILDREN: &[ResourceType] = &[
    RemoteCse,
    Node,
    Ae,
    Container,
    Group,
    AccessControlPolicy,
    Subscription,
    Request,
    Delivery,
    Schedule,
    FlexContainer,
    TimeSeries,
];

const AE_CHILDREN: &[ResourceType] = &[
    Subscription,
    Container,
    Group,
    AccessControlPolicy,
    PollingChannel,
    Schedule,
    SemanticDescriptor,
    FlexContainer,
    TimeSeries,
];

const CONTAINER_CHILDREN: &[ResourceType] = &[
    ContentInstance,
    Subscription,
    Container,
    SemanticDescriptor,
    FlexContainer,
];

const CONTENT_INSTANCE_CHILDREN: &[ResourceType] = &[SemanticDescriptor];

const GROUP_CHILDREN: &[ResourceType] = &[Subscription, SemanticDescriptor];

const REMOTE_CSE_CHILDREN: &[ResourceType] = &[
    Container,
    FlexContainer,
    Group,
    AccessControlPolicy,
    Subscription,
    PollingChannel,
    Schedule,
    TimeSeries,
];

const SUBSCRIPTION_CHILDREN: &[ResourceType] = &[Schedule];

const ACP_CHILDREN: &[ResourceType] = &[Subscription];

const NODE_CHILDREN: &[ResourceType] = &[Subscription, SemanticDescriptor];

const FLEX_CONTAINER_CHILDREN: &[ResourceType] = &[Subscription, FlexContainer, SemanticDescriptor];

const TIME_SERIES_CHILDREN: &[ResourceType] = &[Subscription, SemanticDescriptor];

pub fn allowed_children(parent: ResourceType) -> &'static [ResourceType] {
    match parent {
        CseBase => CSE_BASE_CHILDREN,
        Ae => AE_CHILDREN,
        Container => CONTAINER_CHILDREN,
        ContentInstance => CONTENT_INSTANCE_CHILDREN,
        Group => GROUP_CHILDREN,
        RemoteCse => REMOTE_CSE_CHILDREN,
        Subscription => SUBSCRIPTION_CHILDREN,
        AccessControlPolicy => ACP_CHILDREN,
        Node => NODE_CHILDREN,
        FlexContainer => FLEX_CONTAINER_CHILDREN,
        TimeSeries => TIME_SERIES_CHILDREN,
        _ => &[],
    }
}

pub fn is_possible_child(parent: ResourceType, child: ResourceType) -> bool {
    allowed_children(parent).contains(&child)
}

/// Types that can have `<subscription>` children and so may trigger
/// notifications.
pub fn can_host_subscriptions(ty: ResourceType) -> bool {
    is_possible_child(ty, Subscription)
}
