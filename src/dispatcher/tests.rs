use super::*;
use crate::acp::RootPolicy;
use crate::binder::Binder;
use crate::error::BinderError;
use crate::federation::{shared_upstream, UpstreamCse};
use crate::store::{MemoryStore, ResourceStore};
use std::sync::Mutex;
use std::time::Duration;

/// Answers every outbound request with OK and keeps a copy of it.
#[derive(Default)]
struct RecordingBinder {
    sent: Mutex<Vec<(String, RequestPrimitive)>>,
}

impl RecordingBinder {
    fn sent(&self) -> Vec<(String, RequestPrimitive)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Binder for RecordingBinder {
    fn schemes(&self) -> &'static [&'static str] {
        &["http", "mqtt"]
    }

    async fn send(&self, poa: &str, rqp: RequestPrimitive) -> Result<ResponsePrimitive, BinderError> {
        self.sent.lock().unwrap().push((poa.to_string(), rqp.clone()));
        Ok(ResponsePrimitive::new(
            &rqp,
            "/peer",
            ResponseStatusCode::Ok,
            Some(json!({ "m2m:dbg": "answered by peer" })),
        ))
    }
}

struct Fixture {
    dispatcher: Dispatcher,
    binder: Arc<RecordingBinder>,
}

async fn fixture(identity: CseIdentity, cse_type: CseType) -> Fixture {
    let store: Arc<dyn ResourceStore> = Arc::new(MemoryStore::new());
    let crud = Arc::new(CrudEngine::new(Arc::clone(&store)));
    let root = Resource::from_map(
        &identity.name,
        "",
        json!({
            "ty": 5,
            "ri": identity.csi,
            "rn": identity.name,
            "pi": "",
            "csi": identity.sp_relative_id(),
            "cst": cse_type.code(),
        })
        .as_object()
        .cloned()
        .unwrap(),
    )
    .unwrap();
    store.create(&root).await.unwrap();

    let access = Arc::new(AccessControl::new(
        store,
        RootPolicy::Deny,
        [identity.csi.clone(), "CAdmin".to_string()],
    ));
    let binder = Arc::new(RecordingBinder::default());
    let binders = Arc::new(BinderRegistry::new());
    binders.register(binder.clone());

    let dispatcher = Dispatcher::new(identity, cse_type, crud, access, binders, 4);
    Fixture { dispatcher, binder }
}

async fn in_cse() -> Fixture {
    fixture(CseIdentity::new("mb", "mobius", "mobius.net"), CseType::In).await
}

impl Fixture {
    async fn send(&self, rqp: RequestPrimitive) -> ResponsePrimitive {
        self.dispatcher.handle(rqp).await
    }

    async fn create(&self, to: &str, fr: &str, ty: ResourceType, pc: Value) -> ResponsePrimitive {
        self.send(
            RequestPrimitive::new(Operation::Create, to, fr)
                .with_type(ty)
                .with_content(pc),
        )
        .await
    }

    async fn retrieve(&self, to: &str, fr: &str) -> ResponsePrimitive {
        self.send(RequestPrimitive::new(Operation::Retrieve, to, fr)).await
    }

    /// Registers AE `app` (originator S0001) with container `cnt`.
    async fn with_app(&self) -> String {
        let rsp = self
            .create(
                "mobius",
                "S0001",
                ResourceType::Ae,
                json!({ "m2m:ae": {
                    "rn": "app",
                    "api": "Napp",
                    "rr": true,
                    "poa": ["http://ae.local:9000"],
                }}),
            )
            .await;
        assert_eq!(rsp.rsc, ResponseStatusCode::Created, "{:?}", rsp.pc);

        let rsp = self
            .create(
                "mobius/app",
                "S0001",
                ResourceType::Container,
                json!({ "m2m:cnt": { "rn": "cnt" } }),
            )
            .await;
        assert_eq!(rsp.rsc, ResponseStatusCode::Created, "{:?}", rsp.pc);
        rsp.pc.unwrap()["m2m:cnt"]["ri"].as_str().unwrap().to_string()
    }

    async fn add_instance(&self, con: &str) -> ResponsePrimitive {
        self.create(
            "mobius/app/cnt",
            "S0001",
            ResourceType::ContentInstance,
            json!({ "m2m:cin": { "con": con } }),
        )
        .await
    }
}

#[tokio::test]
async fn test_address_forms_reach_the_same_resource() {
    let cse = in_cse().await;
    let ri = cse.with_app().await;

    for to in [
        "mobius/app/cnt".to_string(),
        "/mb/mobius/app/cnt".to_string(),
        "//mobius.net/mb/mobius/app/cnt".to_string(),
        "mobius/app/cnt/".to_string(),
        ri.clone(),
        format!("/mb/{}", ri),
    ] {
        let rsp = cse.retrieve(&to, "S0001").await;
        assert_eq!(rsp.rsc, ResponseStatusCode::Ok, "{}", to);
        assert_eq!(rsp.pc.unwrap()["m2m:cnt"]["ri"], Value::from(ri.as_str()), "{}", to);
    }

    let rsp = cse.retrieve("/mb", "CAdmin").await;
    assert_eq!(rsp.rsc, ResponseStatusCode::Ok);
    assert_eq!(rsp.fr, "/mb");
    assert_eq!(rsp.to, "CAdmin");
    assert_eq!(rsp.pc.unwrap()["m2m:cb"]["rn"], "mobius");

    let rsp = cse.retrieve("cnt-doesnotexist", "S0001").await;
    assert_eq!(rsp.rsc, ResponseStatusCode::NotFound);
}

#[tokio::test]
async fn test_response_keeps_request_id() {
    let cse = in_cse().await;
    cse.with_app().await;
    let mut rqp = RequestPrimitive::new(Operation::Retrieve, "mobius/app", "S0001");
    rqp.rqi = "req-7".to_string();
    let rsp = cse.send(rqp).await;
    assert_eq!(rsp.rqi, "req-7");
    assert_eq!(rsp.to, "S0001");
}

#[tokio::test]
async fn test_create_rejections() {
    let cse = in_cse().await;
    cse.with_app().await;

    let rsp = cse
        .create("mobius/app", "S0001", ResourceType::Container, json!({ "m2m:cnt": { "rn": "cnt" } }))
        .await;
    assert_eq!(rsp.rsc, ResponseStatusCode::AlreadyExists);

    let rsp = cse
        .create("mobius", "CAdmin", ResourceType::ContentInstance, json!({ "m2m:cin": { "con": "x" } }))
        .await;
    assert_eq!(rsp.rsc, ResponseStatusCode::BadRequest);

    // The child type is checked before the originator's privileges.
    let rsp = cse
        .create("mobius", "S0002", ResourceType::ContentInstance, json!({ "m2m:cin": { "con": "x" } }))
        .await;
    assert_eq!(rsp.rsc, ResponseStatusCode::BadRequest);

    let rsp = cse
        .create("mobius/app", "S0001", ResourceType::Container, json!({ "m2m:cin": { "con": "x" } }))
        .await;
    assert_eq!(rsp.rsc, ResponseStatusCode::BadRequest);

    let rsp = cse
        .send(RequestPrimitive::new(Operation::Create, "mobius/app", "S0001").with_type(ResourceType::Container))
        .await;
    assert_eq!(rsp.rsc, ResponseStatusCode::BadRequest);

    let rsp = cse
        .create("mobius/nowhere", "S0001", ResourceType::Container, json!({ "m2m:cnt": {} }))
        .await;
    assert_eq!(rsp.rsc, ResponseStatusCode::NotFound);
}

#[tokio::test]
async fn test_access_denied_to_other_originators() {
    let cse = in_cse().await;
    cse.with_app().await;

    let rsp = cse
        .create("mobius/app", "S0002", ResourceType::Container, json!({ "m2m:cnt": { "rn": "x" } }))
        .await;
    assert_eq!(rsp.rsc, ResponseStatusCode::OriginatorHasNoPrivilege);

    let rsp = cse.retrieve("mobius/app/cnt", "S0002").await;
    assert_eq!(rsp.rsc, ResponseStatusCode::OriginatorHasNoPrivilege);

    let rsp = cse.retrieve("mobius", "S0002").await;
    assert_eq!(rsp.rsc, ResponseStatusCode::OriginatorHasNoPrivilege);

    let rsp = cse.retrieve("mobius/app/cnt", "CAdmin").await;
    assert_eq!(rsp.rsc, ResponseStatusCode::Ok);
}

#[tokio::test]
async fn test_cse_base_accepts_only_retrieve() {
    let cse = in_cse().await;
    let rsp = cse
        .send(
            RequestPrimitive::new(Operation::Update, "mobius", "CAdmin")
                .with_content(json!({ "m2m:cb": { "lbl": ["x"] } })),
        )
        .await;
    assert_eq!(rsp.rsc, ResponseStatusCode::BadRequest);

    let rsp = cse.send(RequestPrimitive::new(Operation::Delete, "mobius", "CAdmin")).await;
    assert_eq!(rsp.rsc, ResponseStatusCode::BadRequest);
    assert_eq!(cse.retrieve("mobius", "CAdmin").await.rsc, ResponseStatusCode::Ok);
}

#[tokio::test]
async fn test_update_and_delete() {
    let cse = in_cse().await;
    cse.with_app().await;

    let rsp = cse
        .send(
            RequestPrimitive::new(Operation::Update, "mobius/app/cnt", "S0001")
                .with_content(json!({ "m2m:cnt": { "lbl": ["kitchen"] } })),
        )
        .await;
    assert_eq!(rsp.rsc, ResponseStatusCode::Ok);
    let pc = rsp.pc.unwrap();
    assert_eq!(pc["m2m:cnt"]["lbl"], json!(["kitchen"]));
    assert_eq!(pc["m2m:cnt"]["st"], 1);

    let rsp = cse
        .send(
            RequestPrimitive::new(Operation::Update, "mobius/app/cnt", "S0001")
                .with_content(json!({ "m2m:cnt": { "cni": 3 } })),
        )
        .await;
    assert_eq!(rsp.rsc, ResponseStatusCode::BadRequest);

    cse.add_instance("21.5").await;
    let rsp = cse.send(RequestPrimitive::new(Operation::Delete, "mobius/app", "S0001")).await;
    assert_eq!(rsp.rsc, ResponseStatusCode::Ok);
    assert!(rsp.pc.is_none());

    for to in ["mobius/app", "mobius/app/cnt", "mobius/app/cnt/la"] {
        let rsp = cse.retrieve(to, "CAdmin").await;
        assert_eq!(rsp.rsc, ResponseStatusCode::NotFound, "{}", to);
    }
}

#[tokio::test]
async fn test_latest_and_oldest() {
    let cse = in_cse().await;
    cse.with_app().await;

    let rsp = cse.retrieve("mobius/app/cnt/la", "S0001").await;
    assert_eq!(rsp.rsc, ResponseStatusCode::NotFound);

    for con in ["1", "2", "3"] {
        assert_eq!(cse.add_instance(con).await.rsc, ResponseStatusCode::Created);
    }

    let rsp = cse.retrieve("mobius/app/cnt/la", "S0001").await;
    assert_eq!(rsp.pc.unwrap()["m2m:cin"]["con"], "3");
    let rsp = cse.retrieve("mobius/app/cnt/latest", "S0001").await;
    assert_eq!(rsp.pc.unwrap()["m2m:cin"]["con"], "3");
    let rsp = cse.retrieve("mobius/app/cnt/ol", "S0001").await;
    assert_eq!(rsp.pc.unwrap()["m2m:cin"]["con"], "1");

    let rsp = cse.send(RequestPrimitive::new(Operation::Delete, "mobius/app/cnt/ol", "S0001")).await;
    assert_eq!(rsp.rsc, ResponseStatusCode::Ok);
    let rsp = cse.retrieve("mobius/app/cnt/ol", "S0001").await;
    assert_eq!(rsp.pc.unwrap()["m2m:cin"]["con"], "2");

    let rsp = cse
        .send(
            RequestPrimitive::new(Operation::Update, "mobius/app/cnt/la", "S0001")
                .with_content(json!({ "m2m:cin": { "con": "9" } })),
        )
        .await;
    assert_eq!(rsp.rsc, ResponseStatusCode::BadRequest);

    let rsp = cse.retrieve("mobius/app/la", "S0001").await;
    assert_eq!(rsp.rsc, ResponseStatusCode::BadRequest);

    let rsp = cse.retrieve("mobius/app/cnt/la", "S0002").await;
    assert_eq!(rsp.rsc, ResponseStatusCode::OriginatorHasNoPrivilege);
}

impl Fixture {
    /// Policy under `mobius/app` granting X the operations in `acop`.
    async fn policy_for_x(&self, rn: &str, acop: u32) -> String {
        let rsp = self
            .create(
                "mobius/app",
                "CAdmin",
                ResourceType::AccessControlPolicy,
                json!({ "m2m:acp": {
                    "rn": rn,
                    "pv": { "acr": [{ "acor": ["X"], "acop": acop }] },
                    "pvs": { "acr": [{ "acor": ["CAdmin"], "acop": 63 }] },
                }}),
            )
            .await;
        assert_eq!(rsp.rsc, ResponseStatusCode::Created, "{:?}", rsp.pc);
        rsp.pc.unwrap()["m2m:acp"]["ri"].as_str().unwrap().to_string()
    }

    async fn guarded_container(&self, parent: &str, rn: &str, acpi: &str) {
        let rsp = self
            .create(
                parent,
                "CAdmin",
                ResourceType::Container,
                json!({ "m2m:cnt": { "rn": rn, "acpi": [acpi] } }),
            )
            .await;
        assert_eq!(rsp.rsc, ResponseStatusCode::Created, "{:?}", rsp.pc);
    }
}

#[tokio::test]
async fn test_delete_decided_by_parent_policy() {
    let cse = in_cse().await;
    cse.with_app().await;
    let deleters = cse.policy_for_x("deleters", 8).await;
    let readers = cse.policy_for_x("readers", 2).await;

    cse.guarded_container("mobius/app", "p", &deleters).await;
    cse.guarded_container("mobius/app/p", "c", &readers).await;
    let rsp = cse.send(RequestPrimitive::new(Operation::Delete, "mobius/app/p/c", "X")).await;
    assert_eq!(rsp.rsc, ResponseStatusCode::Ok);
    assert_eq!(cse.retrieve("mobius/app/p/c", "CAdmin").await.rsc, ResponseStatusCode::NotFound);

    let rsp = cse
        .create("mobius/app/p", "CAdmin", ResourceType::ContentInstance, json!({ "m2m:cin": { "con": "1" } }))
        .await;
    assert_eq!(rsp.rsc, ResponseStatusCode::Created);
    let rsp = cse.send(RequestPrimitive::new(Operation::Delete, "mobius/app/p/la", "X")).await;
    assert_eq!(rsp.rsc, ResponseStatusCode::Ok);
    assert_eq!(cse.retrieve("mobius/app/p/la", "CAdmin").await.rsc, ResponseStatusCode::NotFound);

    cse.guarded_container("mobius/app", "q", &readers).await;
    cse.guarded_container("mobius/app/q", "r", &deleters).await;
    let rsp = cse.send(RequestPrimitive::new(Operation::Delete, "mobius/app/q/r", "X")).await;
    assert_eq!(rsp.rsc, ResponseStatusCode::OriginatorHasNoPrivilege);
    assert_eq!(cse.retrieve("mobius/app/q/r", "CAdmin").await.rsc, ResponseStatusCode::Ok);
}

fn retrieve_events(cse: &Fixture) -> usize {
    cse.binder
        .sent()
        .iter()
        .filter(|(_, rqp)| {
            rqp.pc
                .as_ref()
                .map_or(false, |pc| pc["m2m:sgn"]["nev"]["net"] == 5)
        })
        .count()
}

#[tokio::test]
async fn test_retrieve_event_only_for_container_without_children() {
    let cse = in_cse().await;
    cse.with_app().await;
    let rsp = cse
        .create(
            "mobius/app/cnt",
            "S0001",
            ResourceType::Subscription,
            json!({ "m2m:sub": {
                "rn": "watch",
                "nu": ["http://ae.local:9000/S0001"],
                "enc": { "net": [5] },
            }}),
        )
        .await;
    assert_eq!(rsp.rsc, ResponseStatusCode::Created, "{:?}", rsp.pc);
    let rsp = cse
        .create("mobius/app/cnt", "S0001", ResourceType::Container, json!({ "m2m:cnt": { "rn": "inner" } }))
        .await;
    assert_eq!(rsp.rsc, ResponseStatusCode::Created);

    assert_eq!(cse.retrieve("mobius/app/cnt", "S0001").await.rsc, ResponseStatusCode::Ok);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(retrieve_events(&cse), 0);

    let rsp = cse.send(RequestPrimitive::new(Operation::Delete, "mobius/app/cnt/inner", "S0001")).await;
    assert_eq!(rsp.rsc, ResponseStatusCode::Ok);
    assert_eq!(cse.retrieve("mobius/app/cnt", "S0001").await.rsc, ResponseStatusCode::Ok);
    tokio::time::timeout(Duration::from_secs(2), async {
        while retrieve_events(&cse) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("retrieve event delivered");
}

#[tokio::test]
async fn test_group_fan_out_aggregates_member_responses() {
    let cse = in_cse().await;
    cse.with_app().await;
    let rsp = cse
        .create(
            "mobius/app",
            "S0001",
            ResourceType::Group,
            json!({ "m2m:grp": {
                "rn": "grp",
                "mnm": 5,
                "mid": ["mobius/app/cnt", "mobius/app/missing"],
            }}),
        )
        .await;
    assert_eq!(rsp.rsc, ResponseStatusCode::Created, "{:?}", rsp.pc);
    assert_eq!(rsp.pc.unwrap()["m2m:grp"]["cnm"], 2);

    let rsp = cse.retrieve("mobius/app/grp/fopt", "S0001").await;
    assert_eq!(rsp.rsc, ResponseStatusCode::Ok);
    let pc = rsp.pc.unwrap();
    let entries = pc["m2m:agr"]["m2m:rsp"].as_array().unwrap().clone();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["rsc"], 2000);
    assert_eq!(entries[0]["pc"]["m2m:cnt"]["rn"], "cnt");
    assert_eq!(entries[1]["rsc"], 4004);
    assert!(entries.iter().all(|e| e.get("rqi").is_none()));

    let rsp = cse.retrieve("mobius/app/cnt/fopt", "S0001").await;
    assert_eq!(rsp.rsc, ResponseStatusCode::BadRequest);

    let rsp = cse
        .create(
            "mobius/app",
            "S0001",
            ResourceType::Group,
            json!({ "m2m:grp": { "rn": "big", "mnm": 1, "mid": ["a", "b"] } }),
        )
        .await;
    assert_eq!(rsp.rsc, ResponseStatusCode::BadRequest);
}

#[tokio::test]
async fn test_notify_retargeted_to_ae() {
    let cse = in_cse().await;
    cse.with_app().await;

    let rqp = RequestPrimitive::new(Operation::Notify, "mobius/app", "CAdmin")
        .with_content(json!({ "m2m:sgn": { "sur": "/mb/sub-1" } }));
    let rqi = rqp.rqi.clone();
    let rsp = cse.send(rqp).await;
    assert_eq!(rsp.rsc, ResponseStatusCode::Ok);
    assert_eq!(rsp.rqi, rqi);

    let sent = cse.binder.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "http://ae.local:9000");
    assert!(sent[0].1.to.starts_with("ae-"));
    assert_eq!(sent[0].1.op, Operation::Notify);

    let rsp = cse
        .send(
            RequestPrimitive::new(Operation::Notify, "mobius/app/cnt", "CAdmin")
                .with_content(json!({ "m2m:sgn": {} })),
        )
        .await;
    assert_eq!(rsp.rsc, ResponseStatusCode::BadRequest);
}

#[tokio::test]
async fn test_subscription_receives_child_creation() {
    let cse = in_cse().await;
    cse.with_app().await;
    let rsp = cse
        .create(
            "mobius/app/cnt",
            "S0001",
            ResourceType::Subscription,
            json!({ "m2m:sub": {
                "rn": "sub",
                "nu": ["http://ae.local:9000/S0001"],
                "enc": { "net": [3] },
            }}),
        )
        .await;
    assert_eq!(rsp.rsc, ResponseStatusCode::Created, "{:?}", rsp.pc);

    cse.add_instance("on").await;

    let delivered = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let found = cse.binder.sent().into_iter().find(|(_, rqp)| {
                rqp.pc
                    .as_ref()
                    .map_or(false, |pc| pc["m2m:sgn"]["nev"]["rep"]["m2m:cin"]["con"] == "on")
            });
            if let Some(found) = found {
                return found;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("notification delivered");

    let (poa, rqp) = delivered;
    assert_eq!(poa, "http://ae.local:9000/S0001");
    assert_eq!(rqp.to, "S0001");
    assert_eq!(rqp.fr, "/mb");
    let sgn = &rqp.pc.unwrap()["m2m:sgn"];
    assert_eq!(sgn["nev"]["net"], 3);
    assert!(sgn["sur"].as_str().unwrap().starts_with("/mb/sub-"));
}

#[tokio::test]
async fn test_unregistered_cse_is_unreachable_on_in() {
    let cse = in_cse().await;
    let rsp = cse.retrieve("/other-cse/base/ae", "CAdmin").await;
    assert_eq!(rsp.rsc, ResponseStatusCode::TargetNotReachable);

    let rsp = cse.retrieve("//other.net/cse/base", "CAdmin").await;
    assert_eq!(rsp.rsc, ResponseStatusCode::TargetNotReachable);
    assert!(cse.binder.sent().is_empty());
}

#[tokio::test]
async fn test_forward_to_registered_remote_cse() {
    let cse = in_cse().await;
    let rsp = cse
        .create(
            "/mb/mobius",
            "/mn-cse",
            ResourceType::RemoteCse,
            json!({ "m2m:csr": {
                "rn": "gateway",
                "cb": "//mobius.net/mn-cse",
                "csi": "/mn-cse",
                "cst": 2,
                "poa": ["http://mn.local:7580"],
                "rr": true,
            }}),
        )
        .await;
    assert_eq!(rsp.rsc, ResponseStatusCode::Created, "{:?}", rsp.pc);

    let mut rqp = RequestPrimitive::new(Operation::Retrieve, "/mn-cse/gateway/sensor", "S0001");
    rqp.rqi = "req-42".to_string();
    let rsp = cse.send(rqp).await;
    assert_eq!(rsp.rsc, ResponseStatusCode::Ok);
    assert_eq!(rsp.rqi, "req-42");
    assert_eq!(rsp.fr, "/peer");
    assert_eq!(rsp.pc.unwrap()["m2m:dbg"], "answered by peer");

    let sent = cse.binder.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "http://mn.local:7580");
    assert_eq!(sent[0].1.to, "/mn-cse/gateway/sensor");
    assert_eq!(sent[0].1.rqi, "req-42");
    assert_eq!(sent[0].1.fr, "S0001");
}

#[tokio::test]
async fn test_middle_node_forwards_upstream() {
    let mn = fixture(CseIdentity::new("mn-cse", "gateway", "mobius.net"), CseType::Mn).await;
    let upstream = UpstreamCse::parse("http://in.local:7579/mb/mobius").unwrap();
    let mn = Fixture {
        dispatcher: mn.dispatcher.with_upstream(shared_upstream(Some(upstream))),
        binder: mn.binder,
    };

    let rsp = mn.retrieve("/mb/mobius/app", "S0001").await;
    assert_eq!(rsp.rsc, ResponseStatusCode::Ok);
    let sent = mn.binder.sent();
    assert_eq!(sent[0].0, "http://in.local:7579/mb");
    assert_eq!(sent[0].1.to, "/mb/mobius/app");

    let rsp = mn.retrieve("/mn-cse", "mn-cse").await;
    assert_eq!(rsp.pc.unwrap()["m2m:cb"]["rn"], "gateway");
}

#[tokio::test]
async fn test_middle_node_without_upstream_is_unreachable() {
    let mn = fixture(CseIdentity::new("mn-cse", "gateway", "mobius.net"), CseType::Mn).await;
    let rsp = mn.retrieve("/mb/mobius/app", "S0001").await;
    assert_eq!(rsp.rsc, ResponseStatusCode::TargetNotReachable);
}

#[test]
fn test_locate() {
    let id = CseIdentity::new("/mb", "mobius", "mobius.net");
    assert_eq!(id.locate("mobius/ae"), Locality::Local("mobius/ae".into()));
    assert_eq!(id.locate("/mb"), Locality::Local("mobius".into()));
    assert_eq!(id.locate("/mb/mobius/ae/"), Locality::Local("mobius/ae".into()));
    assert_eq!(id.locate("//mobius.net/mb/ae-1"), Locality::Local("ae-1".into()));
    assert_eq!(
        id.locate("/in/base"),
        Locality::Remote {
            csi: "in".into(),
            to: "/in/base".into()
        }
    );
    assert!(matches!(
        id.locate("//other.net/in/base"),
        Locality::Foreign { sp, .. } if sp == "other.net"
    ));
    assert_eq!(id.absolute_id(), "//mobius.net/mb");
}
