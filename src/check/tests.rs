use super::*;
use crate::primitive::FilterCriteria;
use serde_json::json;

fn create(ty: ResourceType, body: serde_json::Value) -> RequestPrimitive {
    RequestPrimitive::new(Operation::Create, "mobius/ae", "S0001")
        .with_type(ty)
        .with_content(json!({ ty.wire_key(): body }))
}

fn update(to: &str, ty: ResourceType, body: serde_json::Value) -> RequestPrimitive {
    RequestPrimitive::new(Operation::Update, to, "S0001").with_content(json!({ ty.wire_key(): body }))
}

#[test]
fn test_empty_identifiers_rejected_in_order() {
    let mut rqp = RequestPrimitive::new(Operation::Retrieve, "", "");
    rqp.rqi.clear();
    assert_eq!(check_request(&rqp, None), Err(ValidationError::EmptyRequestId));

    rqp.rqi = "1".into();
    assert_eq!(check_request(&rqp, None), Err(ValidationError::EmptyOriginator));

    rqp.fr = "S".into();
    assert_eq!(check_request(&rqp, None), Err(ValidationError::EmptyTarget));
}

#[test]
fn test_result_content_rules() {
    assert!(check_result_content(Operation::Retrieve, ResultContent::Nothing).is_err());
    assert!(check_result_content(Operation::Create, ResultContent::Nothing).is_ok());
    assert!(check_result_content(Operation::Update, ResultContent::AttributesAndChildResources).is_err());
    assert!(check_result_content(Operation::Retrieve, ResultContent::AttributesAndChildResources).is_ok());
    assert!(check_result_content(Operation::Retrieve, ResultContent::HierarchicalAddress).is_err());
    assert!(check_result_content(Operation::Create, ResultContent::HierarchicalAddressAndAttributes).is_ok());
}

#[test]
fn test_latest_allows_only_retrieve_and_delete() {
    let rqp = RequestPrimitive::new(Operation::Update, "mobius/ae/cnt/la", "S");
    assert_eq!(
        check_request(&rqp, Some(ResourceType::Container)),
        Err(ValidationError::VirtualOperation(VirtualResource::Latest, Operation::Update))
    );

    let rqp = RequestPrimitive::new(Operation::Retrieve, "mobius/ae/cnt/la", "S")
        .with_filter(FilterCriteria::default());
    assert!(matches!(
        check_request(&rqp, Some(ResourceType::Container)),
        Err(ValidationError::VirtualOperation(..))
    ));

    let rqp = RequestPrimitive::new(Operation::Retrieve, "mobius/ae/cnt/ol", "S");
    assert_eq!(check_request(&rqp, Some(ResourceType::Container)), Ok(()));

    let rqp = RequestPrimitive::new(Operation::Retrieve, "mobius/ae/la", "S");
    assert_eq!(
        check_request(&rqp, Some(ResourceType::Ae)),
        Err(ValidationError::VirtualParent(VirtualResource::Latest, ResourceType::Ae))
    );
}

#[test]
fn test_fan_out_point_requires_group_parent() {
    let rqp = RequestPrimitive::new(Operation::Retrieve, "mobius/cnt/fopt", "S");
    assert!(matches!(
        check_request(&rqp, Some(ResourceType::Container)),
        Err(ValidationError::VirtualParent(..))
    ));
    let rqp = RequestPrimitive::new(Operation::Retrieve, "mobius/grp/fopt", "S");
    assert_eq!(check_request(&rqp, Some(ResourceType::Group)), Ok(()));
}

#[test]
fn test_create_requires_resource_type() {
    let rqp = RequestPrimitive::new(Operation::Create, "mobius", "S").with_content(json!({}));
    assert_eq!(
        check_request(&rqp, Some(ResourceType::CseBase)),
        Err(ValidationError::MissingResourceType(Operation::Create))
    );
}

#[test]
fn test_update_with_mismatched_type_rejected() {
    let rqp = update("mobius/ae/cnt", ResourceType::Container, json!({ "mni": 1 }))
        .with_type(ResourceType::Ae);
    assert_eq!(
        check_request(&rqp, Some(ResourceType::Container)),
        Err(ValidationError::InconsistentResourceType(Operation::Update))
    );
}

#[test]
fn test_type_specific_operation_restrictions() {
    let rqp = RequestPrimitive::new(Operation::Delete, "mobius", "S");
    assert_eq!(
        check_request(&rqp, Some(ResourceType::CseBase)),
        Err(ValidationError::OperationNotAllowed(ResourceType::CseBase, Operation::Delete))
    );

    let rqp = update("mobius/ae/cnt/cin", ResourceType::ContentInstance, json!({ "con": "x" }));
    assert_eq!(
        check_request(&rqp, Some(ResourceType::ContentInstance)),
        Err(ValidationError::OperationNotAllowed(
            ResourceType::ContentInstance,
            Operation::Update
        ))
    );
}

#[test]
fn test_content_required_on_create_and_update() {
    let rqp = RequestPrimitive::new(Operation::Update, "mobius/ae", "S");
    assert_eq!(
        check_request(&rqp, Some(ResourceType::Ae)),
        Err(ValidationError::MissingContent(Operation::Update))
    );
}

#[test]
fn test_container_create_with_resource_id_rejected() {
    let rqp = create(ResourceType::Container, json!({ "rn": "temp", "ri": "cnt-123" }));
    let err = check_request(&rqp, Some(ResourceType::Ae)).unwrap_err();
    assert_eq!(
        err,
        ValidationError::AttributeViolations(vec!["resourceID is present".into()])
    );
    assert!(err.to_string().contains("resourceID is present"));
}

#[test]
fn test_container_create_without_member_limit_accepted() {
    let rqp = create(ResourceType::Container, json!({ "rn": "temp" }));
    assert_eq!(check_request(&rqp, Some(ResourceType::Ae)), Ok(()));
}

#[test]
fn test_group_create_requires_member_attributes() {
    let rqp = create(ResourceType::Group, json!({ "rn": "g", "mid": [] }));
    assert_eq!(
        check_request(&rqp, Some(ResourceType::Ae)),
        Err(ValidationError::AttributeViolations(vec![
            "maxNrOfMembers is not present".into()
        ]))
    );

    let rqp = create(ResourceType::Group, json!({ "rn": "g", "mnm": 3, "mid": [] }));
    assert_eq!(check_request(&rqp, Some(ResourceType::Ae)), Ok(()));
}

#[test]
fn test_every_violation_is_listed() {
    let rqp = create(ResourceType::Ae, json!({ "rn": "app", "aei": "x", "ct": "20240101T000000" }));
    let Err(ValidationError::AttributeViolations(list)) = check_request(&rqp, Some(ResourceType::CseBase)) else {
        panic!("expected attribute violations");
    };
    assert_eq!(
        list,
        vec![
            "creationTime is present",
            "App-ID is not present",
            "AE-ID is present",
            "requestReachability is not present",
        ]
    );
}

#[test]
fn test_update_forbids_resource_name() {
    let rqp = update("mobius/ae/cnt", ResourceType::Container, json!({ "rn": "other" }));
    assert_eq!(
        check_request(&rqp, Some(ResourceType::Container)),
        Err(ValidationError::AttributeViolations(vec!["resourceName is present".into()]))
    );
}

#[test]
fn test_possible_children() {
    assert!(is_possible_child(ResourceType::Container, ResourceType::ContentInstance));
    assert!(is_possible_child(ResourceType::CseBase, ResourceType::Ae));
    assert!(!is_possible_child(ResourceType::ContentInstance, ResourceType::Container));
    assert!(!is_possible_child(ResourceType::Ae, ResourceType::Ae));
    assert!(can_host_subscriptions(ResourceType::Container));
    assert!(!can_host_subscriptions(ResourceType::ContentInstance));
}
