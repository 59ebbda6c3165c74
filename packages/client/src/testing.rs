//! Scripted test doubles for the channel and the media engine.
//!
//! `FakeChannel` answers requests the way the development server would
//! unless a reply is scripted for the event. `FakeEngine` drives the
//! transport callbacks like a real WebRTC engine and counts every close.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use studyroom_shared::protocol::EventName;

use crate::domain::{
    ChannelEvent, ConsumerHandle, ConsumerId, ConsumerParams, EventHub, EventSubscription,
    LocalTrack, MediaEngine, MediaEngineError, MediaKind, ProducerHandle, ProducerId,
    SocketChannel, TransportDirection, TransportHandle, TransportId, TransportOptions,
    TransportSignaler,
};
use crate::error::ChannelError;

#[derive(Debug, Clone)]
pub enum Reply {
    Ack(Value),
    Fail(ChannelError),
    /// Never answers
    Hang,
    Delayed(Duration, Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sent {
    pub event: EventName,
    pub payload: Value,
    pub request: bool,
}

pub fn transport_options(id: &str) -> Value {
    json!({
        "id": id,
        "iceParameters": {"usernameFragment": "frag", "password": "pass"},
        "iceCandidates": [],
        "dtlsParameters": {"role": "auto", "fingerprints": []}
    })
}

pub fn waiting_room_json(master: &str, joiners: &[&str], capacity: u32) -> Value {
    let joiners: Vec<Value> = joiners
        .iter()
        .map(|id| json!({"id": id, "name": id.to_uppercase()}))
        .collect();
    json!({
        "joinerList": joiners,
        "capacity": capacity,
        "masterId": master,
        "blacklist": [],
        "hasPassword": false
    })
}

pub fn join_success_json(peers: &[&str]) -> Value {
    let peers: Vec<Value> = peers
        .iter()
        .map(|id| {
            json!({
                "uid": id,
                "name": id.to_uppercase(),
                "enabledMicrophone": false,
                "enabledHeadset": true
            })
        })
        .collect();
    json!({
        "type": "success",
        "rtpCapabilities": {"codecs": []},
        "peerStates": peers,
        "timerState": "STOPPED",
        "timerProperty": {
            "timerLengthMinutes": 25,
            "shortBreakMinutes": 5,
            "longBreakMinutes": 15,
            "longBreakInterval": 4
        }
    })
}

pub struct FakeChannel {
    scripted: Mutex<HashMap<EventName, VecDeque<Reply>>>,
    connect_replies: Mutex<VecDeque<Reply>>,
    sent: Mutex<Vec<Sent>>,
    events: EventHub,
    counter: AtomicUsize,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

impl FakeChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            scripted: Mutex::new(HashMap::new()),
            connect_replies: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            events: EventHub::new(),
            counter: AtomicUsize::new(0),
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        })
    }

    /// Queue a reply for the next request of `event`
    pub fn script(&self, event: EventName, reply: Reply) {
        self.scripted
            .lock()
            .entry(event)
            .or_default()
            .push_back(reply);
    }

    pub fn script_connect(&self, reply: Reply) {
        self.connect_replies.lock().push_back(reply);
    }

    pub fn push(&self, event: EventName, data: Value) {
        self.push_raw(event.as_str(), data);
    }

    pub fn push_raw(&self, name: &str, data: Value) {
        self.events.publish(ChannelEvent::Event {
            name: name.to_string(),
            data,
        });
    }

    /// Simulate the socket going away
    pub fn drop_connection(&self) {
        self.events.publish(ChannelEvent::Disconnected);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    pub fn request_names(&self) -> Vec<EventName> {
        self.sent
            .lock()
            .iter()
            .filter(|s| s.request)
            .map(|s| s.event)
            .collect()
    }

    pub fn requests(&self, event: EventName) -> Vec<Value> {
        self.payloads(event, true)
    }

    pub fn emitted(&self, event: EventName) -> Vec<Value> {
        self.payloads(event, false)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    fn payloads(&self, event: EventName, request: bool) -> Vec<Value> {
        self.sent
            .lock()
            .iter()
            .filter(|s| s.event == event && s.request == request)
            .map(|s| s.payload.clone())
            .collect()
    }

    fn record(&self, event: EventName, payload: &Value, request: bool) {
        self.sent.lock().push(Sent {
            event,
            payload: payload.clone(),
            request,
        });
    }

    /// What the development server would answer
    fn default_reply(&self, event: EventName, payload: &Value) -> Value {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        match event {
            EventName::CreateTransport => transport_options(&format!("t-{n}")),
            EventName::TransportProduce => {
                let kind = payload["kind"].as_str().unwrap_or("audio");
                json!({"id": format!("p-me-{kind}-{n}")})
            }
            EventName::Consume => {
                let producer_id = payload["producerId"].as_str().unwrap_or_default();
                // kind is encoded in the producer id of these fixtures
                let kind = if producer_id.contains("video") {
                    "video"
                } else {
                    "audio"
                };
                json!({
                    "id": format!("c-{producer_id}"),
                    "producerId": producer_id,
                    "kind": kind,
                    "rtpParameters": {"codecs": []}
                })
            }
            EventName::GetProducers => json!([]),
            _ => json!({}),
        }
    }
}

#[async_trait]
impl SocketChannel for FakeChannel {
    async fn connect(&self) -> Result<(), ChannelError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let reply = self.connect_replies.lock().pop_front();
        match reply {
            None | Some(Reply::Ack(_)) => Ok(()),
            Some(Reply::Fail(error)) => Err(error),
            Some(Reply::Hang) => std::future::pending().await,
            Some(Reply::Delayed(delay, _)) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }

    async fn emit(&self, event: EventName, payload: Value) -> Result<(), ChannelError> {
        self.record(event, &payload, false);
        Ok(())
    }

    async fn request(&self, event: EventName, payload: Value) -> Result<Value, ChannelError> {
        self.record(event, &payload, true);
        let scripted = self
            .scripted
            .lock()
            .get_mut(&event)
            .and_then(VecDeque::pop_front);
        match scripted {
            None => Ok(self.default_reply(event, &payload)),
            Some(Reply::Ack(value)) => Ok(value),
            Some(Reply::Fail(error)) => Err(error),
            Some(Reply::Hang) => std::future::pending().await,
            Some(Reply::Delayed(delay, value)) => {
                tokio::time::sleep(delay).await;
                Ok(value)
            }
        }
    }

    fn subscribe(&self) -> EventSubscription {
        self.events.subscribe()
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeEngine {
    signalers: Mutex<HashMap<TransportId, Arc<dyn TransportSignaler>>>,
    connected: Mutex<HashSet<TransportId>>,
    failing_consumers: Mutex<HashSet<String>>,
    produce_delay: Mutex<Option<Duration>>,
    consume_delays: Mutex<HashMap<String, Duration>>,
    tracks: AtomicUsize,
    loads: AtomicUsize,
    producers_created: AtomicUsize,
    consumers_created: AtomicUsize,
    closed_producers: AtomicUsize,
    closed_tracks: AtomicUsize,
    closed_transports: AtomicUsize,
    closed_consumers: Mutex<Vec<ConsumerId>>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_consumer_for(&self, producer_id: &str) {
        self.failing_consumers.lock().insert(producer_id.to_string());
    }

    pub fn set_produce_delay(&self, delay: Duration) {
        *self.produce_delay.lock() = Some(delay);
    }

    pub fn delay_consumer_for(&self, producer_id: &str, delay: Duration) {
        self.consume_delays
            .lock()
            .insert(producer_id.to_string(), delay);
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn producers_created(&self) -> usize {
        self.producers_created.load(Ordering::SeqCst)
    }

    pub fn consumers_created(&self) -> usize {
        self.consumers_created.load(Ordering::SeqCst)
    }

    pub fn closed_producers(&self) -> usize {
        self.closed_producers.load(Ordering::SeqCst)
    }

    pub fn closed_tracks(&self) -> usize {
        self.closed_tracks.load(Ordering::SeqCst)
    }

    pub fn closed_transports(&self) -> usize {
        self.closed_transports.load(Ordering::SeqCst)
    }

    pub fn closed_consumers(&self) -> Vec<ConsumerId> {
        self.closed_consumers.lock().clone()
    }

    async fn connect_once(&self, transport: &TransportHandle) -> Result<(), MediaEngineError> {
        if self.connected.lock().contains(&transport.id) {
            return Ok(());
        }
        let signaler = self.signaler(&transport.id)?;
        signaler
            .on_connect(&transport.id, json!({"role": "client"}))
            .await?;
        self.connected.lock().insert(transport.id.clone());
        Ok(())
    }

    fn signaler(&self, id: &TransportId) -> Result<Arc<dyn TransportSignaler>, MediaEngineError> {
        self.signalers
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| MediaEngineError::Engine(format!("unknown transport {id}")))
    }
}

#[async_trait]
impl MediaEngine for FakeEngine {
    async fn load_device(&self, _router_rtp_capabilities: Value) -> Result<Value, MediaEngineError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(json!({"codecs": [{"mimeType": "audio/opus"}]}))
    }

    async fn create_track(&self, kind: MediaKind) -> Result<LocalTrack, MediaEngineError> {
        let n = self.tracks.fetch_add(1, Ordering::SeqCst);
        Ok(LocalTrack {
            id: format!("local-{kind}-{n}"),
            kind,
        })
    }

    async fn create_transport(
        &self,
        direction: TransportDirection,
        options: TransportOptions,
        signaler: Arc<dyn TransportSignaler>,
    ) -> Result<TransportHandle, MediaEngineError> {
        self.signalers.lock().insert(options.id.clone(), signaler);
        Ok(TransportHandle {
            id: options.id,
            direction,
        })
    }

    async fn create_producer(
        &self,
        transport: &TransportHandle,
        track: &LocalTrack,
    ) -> Result<ProducerHandle, MediaEngineError> {
        let delay = *self.produce_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.connect_once(transport).await?;
        let id = self
            .signaler(&transport.id)?
            .on_produce(&transport.id, track.kind, json!({"codecs": []}))
            .await?;
        self.producers_created.fetch_add(1, Ordering::SeqCst);
        Ok(ProducerHandle {
            id,
            kind: track.kind,
            track_id: track.id.clone(),
        })
    }

    async fn create_consumer(
        &self,
        transport: &TransportHandle,
        params: ConsumerParams,
    ) -> Result<String, MediaEngineError> {
        let delay = self
            .consume_delays
            .lock()
            .get(params.producer_id.as_str())
            .copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self
            .failing_consumers
            .lock()
            .contains(params.producer_id.as_str())
        {
            return Err(MediaEngineError::Engine("cannot decode stream".to_string()));
        }
        self.connect_once(transport).await?;
        self.consumers_created.fetch_add(1, Ordering::SeqCst);
        Ok(format!("remote-{}", params.id))
    }

    async fn close_producer(&self, _producer: &ProducerHandle) {
        self.closed_producers.fetch_add(1, Ordering::SeqCst);
    }

    async fn close_consumer(&self, consumer: &ConsumerHandle) {
        self.closed_consumers.lock().push(consumer.id.clone());
    }

    async fn close_track(&self, _track: &LocalTrack) {
        self.closed_tracks.fetch_add(1, Ordering::SeqCst);
    }

    async fn close_transport(&self, _transport: &TransportHandle) {
        self.closed_transports.fetch_add(1, Ordering::SeqCst);
    }
}

/// Producer id of a fixture
pub fn producer_id(id: &str) -> ProducerId {
    ProducerId::new(id).unwrap_or_else(|_| panic!("invalid producer id {id}"))
}
