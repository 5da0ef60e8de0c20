use super::*;
use crate::primitive::FilterCriteria;
use crate::store::MemoryStore;
use serde_json::{json, Value};

fn resource(path: &str, value: Value) -> Resource {
    let parent = crate::resource::parent_of(path);
    Resource::from_map(path, parent, value.as_object().cloned().unwrap()).unwrap()
}

async fn tree(root_acpi: Value) -> (Arc<MemoryStore>, Resource) {
    let store = Arc::new(MemoryStore::new());
    let root = resource(
        "mobius",
        json!({ "ty": 5, "ri": "mb", "rn": "mobius", "pi": "", "acpi": root_acpi }),
    );
    store.create(&root).await.unwrap();
    store
        .create(&resource(
            "mobius/policy",
            json!({
                "ty": 1, "ri": "acp-read", "rn": "policy", "pi": "mb",
                "pv": { "acr": [{ "acor": ["X"], "acop": 2 }] },
                "pvs": { "acr": [{ "acor": ["admin"], "acop": 63 }] }
            }),
        ))
        .await
        .unwrap();
    store
        .create(&resource(
            "mobius/cnt",
            json!({ "ty": 3, "ri": "cnt-1", "rn": "cnt", "pi": "mb", "acpi": ["acp-read"], "cr": "owner" }),
        ))
        .await
        .unwrap();
    store
        .create(&resource(
            "mobius/cnt/child",
            json!({ "ty": 3, "ri": "cnt-2", "rn": "child", "pi": "cnt-1" }),
        ))
        .await
        .unwrap();
    (store, root)
}

fn engine(store: Arc<MemoryStore>, root_policy: RootPolicy) -> AccessControl {
    AccessControl::new(store, root_policy, vec!["/mb".to_string()])
}

#[test]
fn test_decision_point_requires_originator_and_operation() {
    let rules = vec![
        AccessControlRule {
            acor: vec!["X".into(), "Y".into()],
            acop: 2,
            acco: None,
        },
        AccessControlRule {
            acor: vec!["*".into()],
            acop: 16,
            acco: None,
        },
    ];
    assert!(policy_decision_point(&rules, "X", Operation::Retrieve.mask_bit()));
    assert!(policy_decision_point(&rules, " Y ", Operation::Retrieve.mask_bit()));
    assert!(!policy_decision_point(&rules, "X", Operation::Create.mask_bit()));
    assert!(!policy_decision_point(&rules, "Z", Operation::Retrieve.mask_bit()));
    assert!(policy_decision_point(&rules, "anyone", Operation::Notify.mask_bit()));
}

#[test]
fn test_discovery_needs_discover_bit() {
    let plain = RequestPrimitive::new(Operation::Retrieve, "mobius", "X");
    let discovery = plain.clone().with_filter(FilterCriteria::discovery());
    assert_eq!(required_bit(&plain), 2);
    assert_eq!(required_bit(&discovery), DISCOVER_MASK_BIT);
}

#[tokio::test]
async fn test_retrieve_only_policy_rejects_create() {
    let (store, _) = tree(json!([])).await;
    let acp = engine(store.clone(), RootPolicy::Deny);
    let cnt = store.retrieve("mobius/cnt").await.unwrap();

    let retrieve = RequestPrimitive::new(Operation::Retrieve, "mobius/cnt", "X");
    assert!(acp.enforce(&retrieve, &cnt).await.is_ok());

    let create = RequestPrimitive::new(Operation::Create, "mobius/cnt", "X")
        .with_type(ResourceType::ContentInstance);
    let err = acp.enforce(&create, &cnt).await.unwrap_err();
    assert_eq!(
        err.status(),
        crate::primitive::ResponseStatusCode::OriginatorHasNoPrivilege
    );
}

#[tokio::test]
async fn test_policy_inherited_from_ancestor() {
    let (store, _) = tree(json!([])).await;
    let acp = engine(store.clone(), RootPolicy::Deny);
    let child = store.retrieve("mobius/cnt/child").await.unwrap();

    let retrieve = RequestPrimitive::new(Operation::Retrieve, "mobius/cnt/child", "X");
    assert!(acp.enforce(&retrieve, &child).await.is_ok());
    let other = RequestPrimitive::new(Operation::Retrieve, "mobius/cnt/child", "Z");
    assert!(acp.enforce(&other, &child).await.is_err());
}

#[tokio::test]
async fn test_policy_takes_precedence_over_creator() {
    let (store, _) = tree(json!([])).await;
    let acp = engine(store.clone(), RootPolicy::Deny);
    let cnt = store.retrieve("mobius/cnt").await.unwrap();

    let update = RequestPrimitive::new(Operation::Update, "mobius/cnt", "owner");
    assert!(acp.enforce(&update, &cnt).await.is_err());
}

async fn with_deleter_policy(store: &MemoryStore) {
    store
        .create(&resource(
            "mobius/deleter",
            json!({
                "ty": 1, "ri": "acp-del", "rn": "deleter", "pi": "mb",
                "pv": { "acr": [{ "acor": ["X"], "acop": 8 }] },
                "pvs": { "acr": [{ "acor": ["admin"], "acop": 63 }] }
            }),
        ))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_delete_governed_by_parent_policy() {
    let (store, _) = tree(json!([])).await;
    with_deleter_policy(&store).await;
    store
        .create(&resource(
            "mobius/box",
            json!({ "ty": 3, "ri": "cnt-3", "rn": "box", "pi": "mb", "acpi": ["acp-del"] }),
        ))
        .await
        .unwrap();
    store
        .create(&resource(
            "mobius/box/item",
            json!({ "ty": 3, "ri": "cnt-4", "rn": "item", "pi": "cnt-3", "acpi": ["acp-read"] }),
        ))
        .await
        .unwrap();
    store
        .create(&resource(
            "mobius/cnt/doomed",
            json!({ "ty": 3, "ri": "cnt-5", "rn": "doomed", "pi": "cnt-1", "acpi": ["acp-del"] }),
        ))
        .await
        .unwrap();
    let acp = engine(store.clone(), RootPolicy::Deny);

    // The parent grants Delete although the item's own policy does not.
    let item = store.retrieve("mobius/box/item").await.unwrap();
    let delete = RequestPrimitive::new(Operation::Delete, "mobius/box/item", "X");
    assert!(acp.enforce(&delete, &item).await.is_ok());

    // The parent only grants Retrieve; the resource's own grant is ignored.
    let doomed = store.retrieve("mobius/cnt/doomed").await.unwrap();
    let delete = RequestPrimitive::new(Operation::Delete, "mobius/cnt/doomed", "X");
    assert!(acp.enforce(&delete, &doomed).await.is_err());
}

#[tokio::test]
async fn test_creator_may_delete_own_resource() {
    let (store, _) = tree(json!([])).await;
    let acp = engine(store.clone(), RootPolicy::Deny);
    let cnt = store.retrieve("mobius/cnt").await.unwrap();

    let by_owner = RequestPrimitive::new(Operation::Delete, "mobius/cnt", "owner");
    assert!(acp.enforce(&by_owner, &cnt).await.is_ok());
    let by_reader = RequestPrimitive::new(Operation::Delete, "mobius/cnt", "X");
    assert!(acp.enforce(&by_reader, &cnt).await.is_err());
}

#[tokio::test]
async fn test_root_policy_applies_without_any_policy() {
    let (store, root) = tree(json!([])).await;
    let rqp = RequestPrimitive::new(Operation::Retrieve, "mobius", "Z");

    assert!(engine(store.clone(), RootPolicy::Deny).enforce(&rqp, &root).await.is_err());
    assert!(engine(store, RootPolicy::Allow).enforce(&rqp, &root).await.is_ok());
}

#[tokio::test]
async fn test_registration_open_and_cse_trusted() {
    let (store, root) = tree(json!([])).await;
    let acp = engine(store, RootPolicy::Deny);

    let register = RequestPrimitive::new(Operation::Create, "mobius", "S0001")
        .with_type(ResourceType::Ae);
    assert!(acp.enforce(&register, &root).await.is_ok());

    let container = RequestPrimitive::new(Operation::Create, "mobius", "S0001")
        .with_type(ResourceType::Container);
    assert!(acp.enforce(&container, &root).await.is_err());

    let from_cse = RequestPrimitive::new(Operation::Delete, "mobius", "mb");
    assert!(acp.enforce(&from_cse, &root).await.is_ok());
}

#[tokio::test]
async fn test_creator_owns_subtree_without_policy() {
    let store = Arc::new(MemoryStore::new());
    store
        .create(&resource("mobius", json!({ "ty": 5, "ri": "mb", "rn": "mobius", "pi": "" })))
        .await
        .unwrap();
    store
        .create(&resource(
            "mobius/app",
            json!({ "ty": 2, "ri": "ae-1", "rn": "app", "pi": "mb", "cr": "S0001", "api": "Napp" }),
        ))
        .await
        .unwrap();
    let ae = store.retrieve("mobius/app").await.unwrap();
    let acp = engine(store, RootPolicy::Deny);

    let own = RequestPrimitive::new(Operation::Create, "mobius/app", "S0001")
        .with_type(ResourceType::Container);
    assert!(acp.enforce(&own, &ae).await.is_ok());
    let foreign = RequestPrimitive::new(Operation::Create, "mobius/app", "S0002")
        .with_type(ResourceType::Container);
    assert!(acp.enforce(&foreign, &ae).await.is_err());
}

#[tokio::test]
async fn test_policy_resource_uses_self_privileges() {
    let (store, _) = tree(json!([])).await;
    let acp = engine(store.clone(), RootPolicy::Deny);
    let policy = store.retrieve("mobius/policy").await.unwrap();

    let by_admin = RequestPrimitive::new(Operation::Update, "mobius/policy", "admin");
    assert!(acp.enforce(&by_admin, &policy).await.is_ok());
    let by_reader = RequestPrimitive::new(Operation::Retrieve, "mobius/policy", "X");
    assert!(acp.enforce(&by_reader, &policy).await.is_err());
}
