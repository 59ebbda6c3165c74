//! Media engine boundary.
//!
//! RTP processing belongs to an external WebRTC engine. The engine only sees
//! opaque JSON parameters and calls back into a [`TransportSignaler`] whenever
//! the SFU has to be told about a local transport action.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use super::value_object::{ConsumerId, MediaKind, ProducerId, TransportId, UserId};
use crate::error::NegotiationStep;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportDirection {
    Send,
    Receive,
}

impl TransportDirection {
    /// Value of `consuming` in `create-transport`
    pub fn is_consuming(&self) -> bool {
        matches!(self, TransportDirection::Receive)
    }
}

/// Server-side transport parameters handed to the engine
#[derive(Debug, Clone, PartialEq)]
pub struct TransportOptions {
    pub id: TransportId,
    pub ice_parameters: Value,
    pub ice_candidates: Value,
    pub dtls_parameters: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportHandle {
    pub id: TransportId,
    pub direction: TransportDirection,
}

/// Local capture track (microphone or camera)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTrack {
    pub id: String,
    pub kind: MediaKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerHandle {
    pub id: ProducerId,
    pub kind: MediaKind,
    pub track_id: String,
}

/// Parameters of a consumer as answered by `consume`
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerParams {
    pub id: ConsumerId,
    pub producer_id: ProducerId,
    pub kind: MediaKind,
    pub rtp_parameters: Value,
}

/// A remote stream subscribed to by this client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerHandle {
    pub id: ConsumerId,
    pub producer_id: ProducerId,
    pub peer_id: UserId,
    pub kind: MediaKind,
    /// Remote track exposed by the engine for rendering
    pub track_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaEngineError {
    /// A signaling round trip requested by the engine failed
    #[error("signaling failed at {step}: {reason}")]
    Signaling {
        step: NegotiationStep,
        reason: String,
    },

    #[error("media engine error: {0}")]
    Engine(String),
}

/// Callbacks the engine awaits before considering a transport usable
#[async_trait]
pub trait TransportSignaler: Send + Sync {
    /// First use of a transport; the SFU must learn our DTLS parameters
    async fn on_connect(
        &self,
        transport_id: &TransportId,
        dtls_parameters: Value,
    ) -> Result<(), MediaEngineError>;

    /// A producer is being created; resolves to the server-assigned id
    async fn on_produce(
        &self,
        transport_id: &TransportId,
        kind: MediaKind,
        rtp_parameters: Value,
    ) -> Result<ProducerId, MediaEngineError>;
}

/// External WebRTC engine capability
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Load the device with the router capabilities; returns the device's own
    /// RTP capabilities used for `consume`
    async fn load_device(&self, router_rtp_capabilities: Value) -> Result<Value, MediaEngineError>;

    async fn create_track(&self, kind: MediaKind) -> Result<LocalTrack, MediaEngineError>;

    async fn create_transport(
        &self,
        direction: TransportDirection,
        options: TransportOptions,
        signaler: Arc<dyn TransportSignaler>,
    ) -> Result<TransportHandle, MediaEngineError>;

    async fn create_producer(
        &self,
        transport: &TransportHandle,
        track: &LocalTrack,
    ) -> Result<ProducerHandle, MediaEngineError>;

    /// Create a consumer; returns the id of the remote track
    async fn create_consumer(
        &self,
        transport: &TransportHandle,
        params: ConsumerParams,
    ) -> Result<String, MediaEngineError>;

    async fn close_producer(&self, producer: &ProducerHandle);

    async fn close_consumer(&self, consumer: &ConsumerHandle);

    async fn close_track(&self, track: &LocalTrack);

    async fn close_transport(&self, transport: &TransportHandle);
}
