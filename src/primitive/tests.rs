use super::query::QueryParams;
use super::time::{format_timestamp, parse_timestamp};
use super::*;
use serde_json::json;

#[test]
fn test_request_decodes_short_keys() {
    let rqp: RequestPrimitive = serde_json::from_value(json!({
        "op": 1,
        "to": "/mb/mobius",
        "fr": "S0001",
        "rqi": "req-1",
        "ty": 3,
        "pc": { "m2m:cnt": { "rn": "temp" } }
    }))
    .unwrap();

    assert_eq!(rqp.op, Operation::Create);
    assert_eq!(rqp.ty, Some(ResourceType::Container));
    assert_eq!(rqp.result_content(), ResultContent::Attributes);
    assert!(!rqp.is_discovery());
}

#[test]
fn test_request_accepts_quoted_codes() {
    let rqp: RequestPrimitive = serde_json::from_value(json!({
        "op": "2", "to": "mobius", "fr": "S", "rqi": "1", "rcn": "4"
    }))
    .unwrap();
    assert_eq!(rqp.op, Operation::Retrieve);
    assert_eq!(rqp.rcn, Some(ResultContent::AttributesAndChildResources));
}

#[test]
fn test_request_rejects_unknown_operation() {
    let err = serde_json::from_value::<RequestPrimitive>(json!({
        "op": 9, "to": "mobius", "fr": "S", "rqi": "1"
    }))
    .unwrap_err();
    assert!(err.to_string().contains("invalid operation type: 9"));
}

#[test]
fn test_response_error_carries_debug_message() {
    let rqp = RequestPrimitive::new(Operation::Retrieve, "mobius/none", "S0001");
    let rsp = ResponsePrimitive::from_error(&rqp, "/mb", &CseError::not_found("mobius/none"));

    assert_eq!(rsp.rsc, ResponseStatusCode::NotFound);
    assert_eq!(rsp.to, "S0001");
    assert_eq!(rsp.rqi, rqp.rqi);
    assert_eq!(
        rsp.debug_message(),
        Some("resource does not exist: mobius/none")
    );

    let wire = serde_json::to_value(&rsp).unwrap();
    assert_eq!(wire["rsc"], 4004);
}

#[test]
fn test_operation_mask_bits() {
    assert_eq!(Operation::Create.mask_bit(), 1);
    assert_eq!(Operation::Retrieve.mask_bit(), 2);
    assert_eq!(Operation::Update.mask_bit(), 4);
    assert_eq!(Operation::Delete.mask_bit(), 8);
    assert_eq!(Operation::Notify.mask_bit(), 16);
}

#[test]
fn test_resource_type_short_names() {
    assert_eq!(ResourceType::from_short_name("m2m:cnt"), Some(ResourceType::Container));
    assert_eq!(ResourceType::from_short_name("cb"), Some(ResourceType::CseBase));
    assert_eq!(ResourceType::from_short_name("bogus"), None);
    assert_eq!(ResourceType::ContentInstance.wire_key(), "m2m:cin");
}

#[test]
fn test_cse_type_parse() {
    assert_eq!(CseType::parse("IN"), Some(CseType::In));
    assert_eq!(CseType::parse("mn_cse"), Some(CseType::Mn));
    assert_eq!(CseType::parse("gateway"), None);
}

#[test]
fn test_timestamp_format() {
    let ts = parse_timestamp("20240131T235959").unwrap();
    assert_eq!(format_timestamp(&ts), "20240131T235959");
    assert_eq!(
        parse_timestamp("20240131T235959,123"),
        Some(ts)
    );
    assert!(parse_timestamp("yesterday").is_none());
}

#[test]
fn test_query_splits_primitive_and_filter_params() {
    let q = QueryParams::parse("rcn=6&fu=1&ty=4&ty=3&lbl=home&lim=2&dst=2&rn=temp*").unwrap();

    assert_eq!(q.rcn, Some(ResultContent::ChildResourceReferences));
    let fc = q.fc.unwrap();
    assert!(fc.is_discovery());
    assert_eq!(fc.ty, vec![ResourceType::ContentInstance, ResourceType::Container]);
    assert_eq!(fc.lbl, vec!["home".to_string()]);
    assert_eq!(fc.lim, Some(2));
    assert_eq!(fc.dst, Some(SortType::Descending));
    assert_eq!(fc.attributes.get("rn"), Some(&json!("temp*")));
}

#[test]
fn test_query_without_filter_keys() {
    let q = QueryParams::parse("rcn=4").unwrap();
    assert_eq!(q.rcn, Some(ResultContent::AttributesAndChildResources));
    assert!(q.fc.is_none());
    assert_eq!(QueryParams::parse("").unwrap(), QueryParams::default());
}

#[test]
fn test_query_rejects_non_numeric_codes() {
    let err = QueryParams::parse("lim=many").unwrap_err();
    assert_eq!(err.status(), ResponseStatusCode::BadRequest);
}

#[test]
fn test_query_encode_parses_back() {
    let fc = FilterCriteria {
        fu: Some(FilterUsage::DiscoveryCriteria),
        ty: vec![ResourceType::ContentInstance],
        cra: parse_timestamp("20240101T000000"),
        ..FilterCriteria::default()
    };
    let text = QueryParams::encode(Some(ResultContent::ChildResourceReferences), None, Some(&fc));
    let parsed = QueryParams::parse(&text).unwrap();
    assert_eq!(parsed.fc, Some(fc));
    assert_eq!(parsed.rcn, Some(ResultContent::ChildResourceReferences));
}
