//! MQTT binding.
//!
//! Every primitive travels on `{class}/{req|resp}/{sender}/{receiver}/{cty}`
//! at QoS 1. A CSE listens on `{class}/+/+/{own id}/#` on each broker it
//! talks to. Responses are matched to outbound requests by request
//! identifier through [`PendingRequests`].

use super::correlation::{InflightRequests, PendingRequests};
use super::{poa_path, Binder, RequestHandler};
use crate::error::BinderError;
use crate::primitive::{
    debug_content, new_request_id, RequestPrimitive, ResponsePrimitive, ResponseStatusCode,
    CONTENT_TYPE_JSON,
};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, Publish, QoS};
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

const DEFAULT_PORT: u16 = 1883;
const KEEP_ALIVE: Duration = Duration::from_secs(30);
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Topic segment naming requests or responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Request,
    Response,
}

impl MessageKind {
    fn segment(self) -> &'static str {
        match self {
            MessageKind::Request => "req",
            MessageKind::Response => "resp",
        }
    }
}

/// Broker host, port and credentials taken from an `mqtt://` point of
/// access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
    pub credentials: Option<(String, String)>,
}

impl BrokerAddress {
    pub fn parse(poa: &str) -> Result<Self, BinderError> {
        let invalid = || BinderError::InvalidAddress(poa.to_string());
        let rest = poa.split_once("://").map_or(poa, |(_, rest)| rest);
        let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
        let (credentials, host_port) = match authority.rsplit_once('@') {
            Some((userinfo, host_port)) => {
                let credentials = userinfo
                    .split_once(':')
                    .map(|(u, p)| (u.to_string(), p.to_string()));
                (credentials, host_port)
            }
            None => (None, authority),
        };
        let (host, port) = match host_port.rsplit_once(':') {
            Some((host, port)) => (host, port.parse().map_err(|_| invalid())?),
            None => (host_port, DEFAULT_PORT),
        };
        if host.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            host: host.to_string(),
            port,
            credentials,
        })
    }

    fn key(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Topic naming for one topic class.
#[derive(Debug, Clone)]
pub struct Topics {
    /// Leading topic segment, always starting with `/`
    class: String,
    own_id: String,
}

impl Topics {
    pub fn new(class: &str, own_id: &str) -> Self {
        Self {
            class: format!("/{}", class.trim_matches('/')),
            own_id: own_id.trim_start_matches('/').to_string(),
        }
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    /// Topic for a message from this CSE to `peer`.
    pub fn outbound(&self, kind: MessageKind, peer: &str, cty: &str) -> String {
        format!("{}/{}/{}/{}/{}", self.class, kind.segment(), self.own_id, peer, cty)
    }

    /// Filter matching everything addressed to this CSE.
    pub fn inbound_filter(&self, share: bool) -> String {
        let filter = format!("{}/+/+/{}/#", self.class, self.own_id);
        if share {
            format!("$share/{}/{}", self.own_id, filter)
        } else {
            filter
        }
    }

    /// Retained announcement topic of the CSE `csi`.
    pub fn announcement(&self, csi: &str) -> String {
        format!("{}/cse/{}", self.class, csi.trim_start_matches('/'))
    }

    pub fn announcement_filter(&self) -> String {
        format!("{}/cse/#", self.class)
    }

    /// `(kind, sender, receiver, cty)` of a primitive topic.
    pub fn parse<'a>(&self, topic: &'a str) -> Option<(MessageKind, &'a str, &'a str, Option<&'a str>)> {
        let rest = topic.strip_prefix(self.class.as_str())?.strip_prefix('/')?;
        let mut parts = rest.split('/');
        let kind = match parts.next()? {
            "req" => MessageKind::Request,
            "resp" => MessageKind::Response,
            _ => return None,
        };
        let sender = parts.next().filter(|s| !s.is_empty())?;
        let receiver = parts.next().filter(|s| !s.is_empty())?;
        Some((kind, sender, receiver, parts.next().filter(|s| !s.is_empty())))
    }
}

/// State shared between the binder and its connection tasks.
struct Shared {
    topics: Topics,
    pending: PendingRequests,
    inflight: InflightRequests,
    handler: OnceLock<Arc<dyn RequestHandler>>,
    announcements: broadcast::Sender<(String, Vec<u8>)>,
}

struct Connection {
    client: AsyncClient,
    /// Re-subscribed on every (re)connect
    filters: Arc<DashSet<String>>,
}

pub struct MqttBinder {
    shared: Arc<Shared>,
    /// Connections keyed by `host:port`
    connections: DashMap<String, Connection>,
    /// Broker used when a point of access names no host
    home: BrokerAddress,
    share: bool,
}

impl MqttBinder {
    pub fn new(
        own_id: &str,
        topic_class: &str,
        home: BrokerAddress,
        share: bool,
        request_timeout: Duration,
    ) -> Self {
        let (announcements, _) = broadcast::channel(64);
        Self {
            shared: Arc::new(Shared {
                topics: Topics::new(topic_class, own_id),
                pending: PendingRequests::new(request_timeout),
                inflight: InflightRequests::new(),
                handler: OnceLock::new(),
                announcements,
            }),
            connections: DashMap::new(),
            home,
            share,
        }
    }

    pub fn topics(&self) -> &Topics {
        &self.shared.topics
    }

    pub fn pending(&self) -> &PendingRequests {
        &self.shared.pending
    }

    pub fn inflight(&self) -> &InflightRequests {
        &self.shared.inflight
    }

    /// Installs the handler for inbound requests and connects to the home
    /// broker so they start flowing.
    pub fn listen(&self, handler: Arc<dyn RequestHandler>) {
        if self.shared.handler.set(handler).is_err() {
            warn!("MQTT request handler already installed");
        }
        let home = self.home.clone();
        self.client_for(&home);
        info!(
            broker = %home.key(),
            filter = %self.shared.topics.inbound_filter(self.share),
            "MQTT binding listening"
        );
    }

    /// Stream of retained CSE announcements seen on the home broker.
    pub fn announcements(&self) -> broadcast::Receiver<(String, Vec<u8>)> {
        self.shared.announcements.subscribe()
    }

    /// Subscribes the home broker connection to `filter`.
    pub async fn subscribe(&self, filter: &str) -> Result<(), BinderError> {
        let home = self.home.clone();
        let (client, filters) = self.client_for(&home);
        filters.insert(filter.to_string());
        client
            .subscribe(filter, QoS::AtLeastOnce)
            .await
            .map_err(|e| BinderError::Transport(e.to_string()))
    }

    /// Publishes `payload` on the home broker.
    pub async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<(), BinderError> {
        let home = self.home.clone();
        let (client, _) = self.client_for(&home);
        client
            .publish(topic, QoS::AtLeastOnce, retain, payload)
            .await
            .map_err(|e| BinderError::Transport(e.to_string()))
    }

    /// Client connected to `broker`, created on first use.
    fn client_for(&self, broker: &BrokerAddress) -> (AsyncClient, Arc<DashSet<String>>) {
        let entry = self.connections.entry(broker.key()).or_insert_with(|| {
            let client_id = format!(
                "{}-{}",
                self.shared.topics.own_id,
                &new_request_id()[..8]
            );
            let mut options = MqttOptions::new(client_id, broker.host.clone(), broker.port);
            options.set_keep_alive(KEEP_ALIVE);
            if let Some((username, password)) = &broker.credentials {
                options.set_credentials(username.clone(), password.clone());
            }
            let (client, eventloop) = AsyncClient::new(options, 64);

            let filters = Arc::new(DashSet::new());
            filters.insert(self.shared.topics.inbound_filter(self.share));
            tokio::spawn(run_connection(
                Arc::clone(&self.shared),
                broker.key(),
                client.clone(),
                eventloop,
                Arc::clone(&filters),
            ));
            debug!(broker = %broker.key(), "Opened MQTT connection");
            Connection { client, filters }
        });
        (entry.client.clone(), Arc::clone(&entry.filters))
    }

    /// Peer addressed by `poa`: the last path segment, or the CSE-ID of an
    /// SP-relative target.
    fn peer_for(poa: &str, rqp: &RequestPrimitive) -> Option<String> {
        let from_path = poa_path(poa)
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        from_path.or_else(|| {
            rqp.to
                .trim_start_matches('/')
                .split('/')
                .next()
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
    }
}

#[async_trait]
impl Binder for MqttBinder {
    fn schemes(&self) -> &'static [&'static str] {
        &["mqtt", "mqtts"]
    }

    async fn send(&self, poa: &str, mut rqp: RequestPrimitive) -> Result<ResponsePrimitive, BinderError> {
        if rqp.rqi.is_empty() {
            rqp.rqi = new_request_id();
        }
        if rqp.fr.is_empty() {
            rqp.fr = format!("/{}", self.shared.topics.own_id);
        }
        let broker = BrokerAddress::parse(poa)?;
        let peer = Self::peer_for(poa, &rqp).ok_or_else(|| BinderError::InvalidAddress(poa.to_string()))?;
        let cty = rqp.cty.clone().unwrap_or_else(|| CONTENT_TYPE_JSON.to_string());
        let topic = self.shared.topics.outbound(MessageKind::Request, &peer, &cty);
        let payload = serde_json::to_vec(&rqp).map_err(|e| BinderError::Codec(e.to_string()))?;

        let reply = self.shared.pending.register(&peer, &rqp)?;
        let (client, _) = self.client_for(&broker);
        if let Err(e) = client.publish(topic.as_str(), QoS::AtLeastOnce, false, payload).await {
            self.shared.pending.cancel(&peer, &rqp.rqi);
            return Err(BinderError::Transport(e.to_string()));
        }
        debug!(rqi = %rqp.rqi, topic = %topic, "Published request");

        reply
            .await
            .map_err(|_| BinderError::Transport(format!("request {} abandoned", rqp.rqi)))
    }
}

/// Drives one broker connection: re-subscribes after every connect and
/// routes incoming publishes.
async fn run_connection(
    shared: Arc<Shared>,
    broker: String,
    client: AsyncClient,
    mut eventloop: EventLoop,
    filters: Arc<DashSet<String>>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!(broker = %broker, "Connected to MQTT broker");
                let wanted: Vec<String> = filters.iter().map(|f| f.key().clone()).collect();
                for filter in wanted {
                    if let Err(e) = client.subscribe(filter.as_str(), QoS::AtLeastOnce).await {
                        error!(broker = %broker, filter = %filter, error = %e, "Subscribe failed");
                    }
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                route_publish(&shared, &client, publish);
            }
            Ok(_) => {}
            Err(e) => {
                warn!(broker = %broker, error = %e, "MQTT connection error, reconnecting");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

fn route_publish(shared: &Arc<Shared>, client: &AsyncClient, publish: Publish) {
    let topic = publish.topic.as_str();
    if topic.starts_with(&format!("{}/cse/", shared.topics.class())) {
        let _ = shared
            .announcements
            .send((publish.topic.clone(), publish.payload.to_vec()));
        return;
    }

    let Some((kind, sender, receiver, cty)) = shared.topics.parse(topic) else {
        debug!(topic = %topic, "Ignoring foreign topic");
        return;
    };
    if receiver != shared.topics.own_id {
        return;
    }

    let message: Value = match serde_json::from_slice(&publish.payload) {
        Ok(message) => message,
        Err(e) => {
            error!(topic = %topic, error = %e, "Malformed primitive");
            return;
        }
    };

    match kind {
        MessageKind::Response => match serde_json::from_value::<ResponsePrimitive>(message) {
            Ok(rsp) if !rsp.rqi.is_empty() => {
                shared.pending.complete(sender, rsp);
            }
            Ok(_) => error!(topic = %topic, "Response without request identifier"),
            Err(e) => error!(topic = %topic, error = %e, "Malformed response primitive"),
        },
        MessageKind::Request => {
            let mut rqp = match serde_json::from_value::<RequestPrimitive>(message.clone()) {
                Ok(rqp) => rqp,
                Err(e) => {
                    error!(topic = %topic, error = %e, "Malformed request primitive");
                    reject(shared, client, sender, cty, &message, &e.to_string());
                    return;
                }
            };
            if rqp.rqi.is_empty() || rqp.fr.is_empty() || rqp.to.is_empty() {
                error!(topic = %topic, "Request primitive missing rqi, fr or to");
                reject(shared, client, sender, cty, &message, "missing rqi, fr or to");
                return;
            }
            if rqp.cty.is_none() {
                rqp.cty = cty.map(str::to_string);
            }
            let Some(handler) = shared.handler.get().cloned() else {
                warn!(rqi = %rqp.rqi, "No MQTT request handler installed");
                return;
            };
            if !shared.inflight.begin(sender, &rqp) {
                return;
            }
            tokio::spawn(answer(
                Arc::clone(shared),
                client.clone(),
                handler,
                sender.to_string(),
                rqp,
            ));
        }
    }
}

/// Processes one inbound request and publishes its response.
async fn answer(
    shared: Arc<Shared>,
    client: AsyncClient,
    handler: Arc<dyn RequestHandler>,
    sender: String,
    rqp: RequestPrimitive,
) {
    let cty = rqp.content_type().to_string();
    let rqi = rqp.rqi.clone();
    let rsp = handler.handle(rqp).await;
    shared.inflight.drop(&sender, &rqi);

    let topic = shared.topics.outbound(MessageKind::Response, &sender, &cty);
    publish_response(&client, topic, &rsp).await;
}

/// Answers an undecodable request with BAD_REQUEST when it still names a
/// request identifier and an originator to address the reply to.
fn reject(
    shared: &Arc<Shared>,
    client: &AsyncClient,
    sender: &str,
    cty: Option<&str>,
    message: &Value,
    reason: &str,
) {
    let field = |name: &str| {
        message
            .get(name)
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    let (Some(rqi), Some(fr)) = (field("rqi"), field("fr")) else {
        return;
    };
    let rsp = ResponsePrimitive {
        rsc: ResponseStatusCode::BadRequest,
        rqi,
        to: fr,
        fr: format!("/{}", shared.topics.own_id),
        pc: Some(debug_content(reason)),
    };
    let topic = shared
        .topics
        .outbound(MessageKind::Response, sender, cty.unwrap_or(CONTENT_TYPE_JSON));
    let client = client.clone();
    tokio::spawn(async move { publish_response(&client, topic, &rsp).await });
}

async fn publish_response(client: &AsyncClient, topic: String, rsp: &ResponsePrimitive) {
    match serde_json::to_vec(rsp) {
        Ok(payload) => {
            if let Err(e) = client.publish(topic.as_str(), QoS::AtLeastOnce, false, payload).await {
                error!(rqi = %rsp.rqi, topic = %topic, error = %e, "Failed to publish response");
            }
        }
        Err(e) => error!(rqi = %rsp.rqi, error = %e, "Failed to encode response"),
    }
}

#[cfg(test)]
impl MqttBinder {
    /// Installs `handler` without connecting to any broker.
    pub(super) fn with_handler(self, handler: Arc<dyn RequestHandler>) -> Self {
        let _ = self.shared.handler.set(handler);
        self
    }

    /// Routes `publish` as if it had arrived on `client`'s connection.
    pub(super) fn route(&self, client: &AsyncClient, publish: Publish) {
        route_publish(&self.shared, client, publish);
    }
}
