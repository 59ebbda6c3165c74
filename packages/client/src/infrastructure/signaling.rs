//! Media signaling adapter.
//!
//! Turns the media engine's local actions into signaling requests on the
//! room channel and feeds the server's answers back into the engine. Every
//! negotiation sequence is all-or-nothing: whatever a failed sequence created
//! is closed before the error is returned.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use studyroom_shared::protocol::EventName;
use tokio::sync::Mutex as AsyncMutex;

use crate::domain::{
    ConsumerHandle, LocalTrack, MediaEngine, MediaEngineError, MediaKind, ProducerHandle,
    ProducerId, ProducerInfo, SocketChannel, TransportDirection, TransportHandle, TransportId,
    TransportSignaler, with_timeout,
};
use crate::error::{MediaError, NegotiationStep};
use crate::infrastructure::{codec, dto};

pub struct MediaSignalingAdapter {
    channel: Arc<dyn SocketChannel>,
    engine: Arc<dyn MediaEngine>,
    request_timeout: Duration,
    /// RTP capabilities of the loaded device
    device: Mutex<Option<Value>>,
    send_transport: AsyncMutex<Option<TransportHandle>>,
    receive_transport: AsyncMutex<Option<TransportHandle>>,
    producers: Mutex<HashMap<MediaKind, (ProducerHandle, LocalTrack)>>,
    producing: Mutex<HashSet<MediaKind>>,
    released: AtomicBool,
}

/// Clears the in-progress flag of a produce call on every exit path
struct ProducingGuard<'a> {
    producing: &'a Mutex<HashSet<MediaKind>>,
    kind: MediaKind,
}

impl Drop for ProducingGuard<'_> {
    fn drop(&mut self) {
        self.producing.lock().remove(&self.kind);
    }
}

impl MediaSignalingAdapter {
    pub fn new(
        channel: Arc<dyn SocketChannel>,
        engine: Arc<dyn MediaEngine>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            channel,
            engine,
            request_timeout,
            device: Mutex::new(None),
            send_transport: AsyncMutex::new(None),
            receive_transport: AsyncMutex::new(None),
            producers: Mutex::new(HashMap::new()),
            producing: Mutex::new(HashSet::new()),
            released: AtomicBool::new(false),
        }
    }

    /// Load the engine device with the router capabilities, once per session
    pub async fn load(&self, router_rtp_capabilities: Value) -> Result<(), MediaError> {
        self.ensure_alive()?;
        if self.device.lock().is_some() {
            return Ok(());
        }
        let capabilities = self
            .engine
            .load_device(router_rtp_capabilities)
            .await
            .map_err(|e| from_engine(NegotiationStep::Load, e))?;
        *self.device.lock() = Some(capabilities);
        tracing::debug!("Media device loaded");
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.device.lock().is_some()
    }

    pub async fn create_send_transport(&self) -> Result<TransportHandle, MediaError> {
        self.ensure_transport(TransportDirection::Send)
            .await
            .map(|(transport, _)| transport)
    }

    pub async fn create_receive_transport(&self) -> Result<TransportHandle, MediaError> {
        self.ensure_transport(TransportDirection::Receive)
            .await
            .map(|(transport, _)| transport)
    }

    /// Start sending local media of `kind`
    pub async fn produce(&self, kind: MediaKind) -> Result<ProducerHandle, MediaError> {
        self.ensure_alive()?;
        if !self.producing.lock().insert(kind) {
            return Err(MediaError::AlreadyInProgress(kind));
        }
        let _guard = ProducingGuard {
            producing: &self.producing,
            kind,
        };

        if let Some((producer, _)) = self.producers.lock().get(&kind) {
            return Ok(producer.clone());
        }
        if !self.is_loaded() {
            return Err(MediaError::NotLoaded);
        }

        let (transport, created) = self.ensure_transport(TransportDirection::Send).await?;

        let track = match self.engine.create_track(kind).await {
            Ok(track) => track,
            Err(e) => {
                self.rollback_send_transport(created).await;
                return Err(from_engine(NegotiationStep::Produce, e));
            }
        };

        let producer = match self.engine.create_producer(&transport, &track).await {
            Ok(producer) => producer,
            Err(e) => {
                self.engine.close_track(&track).await;
                self.rollback_send_transport(created).await;
                return Err(from_engine(NegotiationStep::Produce, e));
            }
        };

        // checked under the lock `release` drains
        let stored = {
            let mut producers = self.producers.lock();
            if self.released.load(Ordering::SeqCst) {
                false
            } else {
                producers.insert(kind, (producer.clone(), track.clone()));
                true
            }
        };
        if !stored {
            self.engine.close_producer(&producer).await;
            self.engine.close_track(&track).await;
            return Err(MediaError::Released);
        }

        tracing::info!("Producing {} as {}", kind, producer.id);
        Ok(producer)
    }

    pub fn is_producing(&self, kind: MediaKind) -> bool {
        self.producers.lock().contains_key(&kind)
    }

    pub fn producer_ids(&self) -> Vec<ProducerId> {
        self.producers
            .lock()
            .values()
            .map(|(producer, _)| producer.id.clone())
            .collect()
    }

    /// Subscribe to a remote producer
    pub async fn consume(&self, info: &ProducerInfo) -> Result<ConsumerHandle, MediaError> {
        self.ensure_alive()?;
        let Some(rtp_capabilities) = self.device.lock().clone() else {
            return Err(MediaError::NotLoaded);
        };
        let (transport, _) = self.ensure_transport(TransportDirection::Receive).await?;

        let step = NegotiationStep::Consume;
        let payload = codec::encode(
            EventName::Consume,
            &dto::ConsumeRequest {
                transport_id: transport.id.as_str().to_string(),
                producer_id: info.producer_id.as_str().to_string(),
                rtp_capabilities,
            },
        )
        .map_err(|e| MediaError::negotiation(step, e))?;
        let answer = with_timeout(
            self.request_timeout,
            self.channel.request(EventName::Consume, payload),
        )
        .await
        .map_err(|e| MediaError::negotiation(step, e))?;
        let params = codec::decode_consume(answer).map_err(|e| MediaError::negotiation(step, e))?;

        let consumer_id = params.id.clone();
        let track_id = self
            .engine
            .create_consumer(&transport, params)
            .await
            .map_err(|e| from_engine(step, e))?;
        let consumer = ConsumerHandle {
            id: consumer_id,
            producer_id: info.producer_id.clone(),
            peer_id: info.peer_id.clone(),
            kind: info.kind,
            track_id,
        };

        let resume = codec::encode(
            EventName::ConsumerResume,
            &dto::ConsumerResumeRequest {
                consumer_id: consumer.id.as_str().to_string(),
            },
        );
        let resumed = match resume {
            Ok(payload) => self
                .channel
                .emit(EventName::ConsumerResume, payload)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(reason) = resumed {
            self.engine.close_consumer(&consumer).await;
            return Err(MediaError::negotiation(NegotiationStep::Resume, reason));
        }

        tracing::debug!(
            "Consuming {} {} of {}",
            consumer.kind,
            consumer.producer_id,
            consumer.peer_id
        );
        Ok(consumer)
    }

    /// Stop sending local media of `kind`; a no-op when not producing
    pub async fn close_producer(&self, kind: MediaKind) -> Option<ProducerId> {
        let (producer, track) = self.producers.lock().remove(&kind)?;
        self.engine.close_producer(&producer).await;
        self.engine.close_track(&track).await;

        let event = match kind {
            MediaKind::Audio => EventName::CloseAudioProducer,
            MediaKind::Video => EventName::CloseVideoProducer,
        };
        let payload = codec::encode(
            event,
            &dto::CloseProducerRequest {
                producer_id: producer.id.as_str().to_string(),
            },
        );
        let emitted = match payload {
            Ok(payload) => self.channel.emit(event, payload).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(reason) = emitted {
            tracing::warn!("Failed to announce closed {} producer: {}", kind, reason);
        }
        Some(producer.id)
    }

    pub async fn close_consumer(&self, consumer: &ConsumerHandle) {
        self.engine.close_consumer(consumer).await;
    }

    /// Close every producer, track and transport held by the adapter. Idempotent.
    pub async fn release(&self) {
        let producers: Vec<_> = {
            let mut producers = self.producers.lock();
            if self.released.swap(true, Ordering::SeqCst) {
                return;
            }
            producers.drain().map(|(_, entry)| entry).collect()
        };
        for (producer, track) in &producers {
            self.engine.close_producer(producer).await;
            self.engine.close_track(track).await;
        }
        if let Some(transport) = self.send_transport.lock().await.take() {
            self.engine.close_transport(&transport).await;
        }
        if let Some(transport) = self.receive_transport.lock().await.take() {
            self.engine.close_transport(&transport).await;
        }
        tracing::debug!("Media adapter released");
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    fn ensure_alive(&self) -> Result<(), MediaError> {
        if self.released.load(Ordering::SeqCst) {
            return Err(MediaError::Released);
        }
        Ok(())
    }

    /// Returns the transport of `direction`, creating it on first use.
    /// The flag tells whether this call created it.
    async fn ensure_transport(
        &self,
        direction: TransportDirection,
    ) -> Result<(TransportHandle, bool), MediaError> {
        self.ensure_alive()?;
        let mut slot = match direction {
            TransportDirection::Send => self.send_transport.lock().await,
            TransportDirection::Receive => self.receive_transport.lock().await,
        };
        if let Some(transport) = slot.as_ref() {
            return Ok((transport.clone(), false));
        }
        self.ensure_alive()?;

        let step = NegotiationStep::TransportCreate;
        let payload = codec::encode(
            EventName::CreateTransport,
            &dto::CreateTransportRequest {
                consuming: direction.is_consuming(),
            },
        )
        .map_err(|e| MediaError::negotiation(step, e))?;
        let answer = with_timeout(
            self.request_timeout,
            self.channel.request(EventName::CreateTransport, payload),
        )
        .await
        .map_err(|e| MediaError::negotiation(step, e))?;
        let options =
            codec::decode_transport_options(answer).map_err(|e| MediaError::negotiation(step, e))?;

        let signaler = Arc::new(ChannelSignaler {
            channel: Arc::clone(&self.channel),
            request_timeout: self.request_timeout,
            direction,
        });
        let transport = self
            .engine
            .create_transport(direction, options, signaler)
            .await
            .map_err(|e| from_engine(step, e))?;

        tracing::debug!("Created {:?} transport {}", direction, transport.id);
        *slot = Some(transport.clone());
        Ok((transport, true))
    }

    /// Close a send transport created by a failed produce, unless another
    /// producer already uses it
    async fn rollback_send_transport(&self, created: bool) {
        if !created || !self.producers.lock().is_empty() {
            return;
        }
        if let Some(transport) = self.send_transport.lock().await.take() {
            self.engine.close_transport(&transport).await;
        }
    }
}

fn from_engine(step: NegotiationStep, error: MediaEngineError) -> MediaError {
    match error {
        MediaEngineError::Signaling { step, reason } => MediaError::Negotiation { step, reason },
        MediaEngineError::Engine(reason) => MediaError::Negotiation { step, reason },
    }
}

/// Transport callbacks answered over the room channel
struct ChannelSignaler {
    channel: Arc<dyn SocketChannel>,
    request_timeout: Duration,
    direction: TransportDirection,
}

impl ChannelSignaler {
    async fn round_trip(
        &self,
        step: NegotiationStep,
        event: EventName,
        payload: Result<Value, crate::error::ProtocolError>,
    ) -> Result<Value, MediaEngineError> {
        let signaling = |reason: String| MediaEngineError::Signaling { step, reason };
        let payload = payload.map_err(|e| signaling(e.to_string()))?;
        with_timeout(self.request_timeout, self.channel.request(event, payload))
            .await
            .map_err(|e| signaling(e.to_string()))
    }
}

#[async_trait]
impl TransportSignaler for ChannelSignaler {
    async fn on_connect(
        &self,
        transport_id: &TransportId,
        dtls_parameters: Value,
    ) -> Result<(), MediaEngineError> {
        let event = match self.direction {
            TransportDirection::Send => EventName::TransportProducerConnected,
            TransportDirection::Receive => EventName::TransportReceiverConnected,
        };
        let payload = codec::encode(
            event,
            &dto::TransportConnectRequest {
                transport_id: transport_id.as_str().to_string(),
                dtls_parameters,
            },
        );
        let step = NegotiationStep::TransportConnect;
        let answer = self.round_trip(step, event, payload).await?;
        codec::decode_empty_ack(&answer).map_err(|e| MediaEngineError::Signaling {
            step,
            reason: e.to_string(),
        })
    }

    async fn on_produce(
        &self,
        transport_id: &TransportId,
        kind: MediaKind,
        rtp_parameters: Value,
    ) -> Result<ProducerId, MediaEngineError> {
        let event = EventName::TransportProduce;
        let payload = codec::encode(
            event,
            &dto::TransportProduceRequest {
                transport_id: transport_id.as_str().to_string(),
                kind,
                rtp_parameters,
            },
        );
        let step = NegotiationStep::Produce;
        let answer = self.round_trip(step, event, payload).await?;
        codec::decode_produce(answer).map_err(|e| MediaEngineError::Signaling {
            step,
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MockMediaEngine, MockSocketChannel, UserId};
    use crate::error::ChannelError;
    use crate::testing::{FakeChannel, FakeEngine, Reply, transport_options};
    use serde_json::json;

    fn adapter(channel: &Arc<FakeChannel>, engine: &Arc<FakeEngine>) -> MediaSignalingAdapter {
        MediaSignalingAdapter::new(
            channel.clone(),
            engine.clone(),
            Duration::from_millis(200),
        )
    }

    fn remote_producer(id: &str, kind: MediaKind) -> ProducerInfo {
        ProducerInfo {
            producer_id: ProducerId::new(id).unwrap(),
            peer_id: UserId::new("bob").unwrap(),
            kind,
        }
    }

    #[tokio::test]
    async fn test_produce_round_trips_transport_callbacks() {
        // テスト項目: produce でトランスポート作成・接続・プロデュースが順に送信される
        // given (前提条件):
        let channel = FakeChannel::new();
        let engine = FakeEngine::new();
        let adapter = adapter(&channel, &engine);
        adapter.load(json!({})).await.unwrap();

        // when (操作):
        let producer = adapter.produce(MediaKind::Audio).await.unwrap();

        // then (期待する結果):
        assert_eq!(producer.kind, MediaKind::Audio);
        assert_eq!(
            channel.request_names(),
            vec![
                EventName::CreateTransport,
                EventName::TransportProducerConnected,
                EventName::TransportProduce,
            ]
        );
        assert!(adapter.is_producing(MediaKind::Audio));
    }

    #[tokio::test]
    async fn test_produce_before_load_fails() {
        // テスト項目: デバイスのロード前の produce は NotLoaded になる
        // given (前提条件):
        let channel = FakeChannel::new();
        let engine = FakeEngine::new();
        let adapter = adapter(&channel, &engine);

        // when (操作):
        let result = adapter.produce(MediaKind::Video).await;

        // then (期待する結果):
        assert_eq!(result, Err(MediaError::NotLoaded));
        assert!(channel.request_names().is_empty());
    }

    #[tokio::test]
    async fn test_second_produce_of_same_kind_is_rejected_while_pending() {
        // テスト項目: 同じ種別の produce が処理中の間、2 回目の呼び出しは AlreadyInProgress になる
        // given (前提条件):
        let channel = FakeChannel::new();
        let engine = FakeEngine::new();
        engine.set_produce_delay(Duration::from_millis(50));
        let adapter = adapter(&channel, &engine);
        adapter.load(json!({})).await.unwrap();

        // when (操作):
        let (first, second) = tokio::join!(
            adapter.produce(MediaKind::Video),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                adapter.produce(MediaKind::Video).await
            }
        );

        // then (期待する結果):
        assert!(first.is_ok());
        assert_eq!(second, Err(MediaError::AlreadyInProgress(MediaKind::Video)));
        assert_eq!(engine.producers_created(), 1);
    }

    #[tokio::test]
    async fn test_rejected_produce_rolls_back_everything() {
        // テスト項目: transport-produce が拒否されるとトラックと新規トランスポートが閉じられる
        // given (前提条件):
        let channel = FakeChannel::new();
        channel.script(
            EventName::TransportProduce,
            Reply::Ack(json!({"error": {"type": "not-allowed"}})),
        );
        let engine = FakeEngine::new();
        let adapter = adapter(&channel, &engine);
        adapter.load(json!({})).await.unwrap();

        // when (操作):
        let result = adapter.produce(MediaKind::Audio).await;

        // then (期待する結果):
        assert!(matches!(
            result,
            Err(MediaError::Negotiation { step: NegotiationStep::Produce, .. })
        ));
        assert_eq!(engine.closed_tracks(), 1);
        assert_eq!(engine.closed_transports(), 1);
        assert!(!adapter.is_producing(MediaKind::Audio));
    }

    #[tokio::test]
    async fn test_transport_create_timeout_is_negotiation_error() {
        // テスト項目: create-transport の応答がない場合 transport-create で失敗する
        // given (前提条件):
        let channel = FakeChannel::new();
        channel.script(EventName::CreateTransport, Reply::Hang);
        let engine = FakeEngine::new();
        let adapter = adapter(&channel, &engine);

        // when (操作):
        let result = adapter.create_receive_transport().await;

        // then (期待する結果):
        assert_eq!(
            result,
            Err(MediaError::Negotiation {
                step: NegotiationStep::TransportCreate,
                reason: ChannelError::Timeout.to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_receive_transport_is_created_once() {
        // テスト項目: 受信トランスポートは 2 回目以降の呼び出しで既存のものが返される
        // given (前提条件):
        let channel = FakeChannel::new();
        let engine = FakeEngine::new();
        let adapter = adapter(&channel, &engine);

        // when (操作):
        let first = adapter.create_receive_transport().await.unwrap();
        let second = adapter.create_receive_transport().await.unwrap();

        // then (期待する結果):
        assert_eq!(first, second);
        assert_eq!(channel.request_names(), vec![EventName::CreateTransport]);
    }

    #[tokio::test]
    async fn test_consume_resumes_consumer() {
        // テスト項目: consume が成功するとコンシューマが再開される
        // given (前提条件):
        let channel = FakeChannel::new();
        let engine = FakeEngine::new();
        let adapter = adapter(&channel, &engine);
        adapter.load(json!({})).await.unwrap();

        // when (操作):
        let consumer = adapter
            .consume(&remote_producer("p-bob-video", MediaKind::Video))
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(consumer.peer_id, UserId::new("bob").unwrap());
        assert_eq!(consumer.kind, MediaKind::Video);
        assert_eq!(
            channel.emitted(EventName::ConsumerResume),
            vec![json!({"consumerId": consumer.id.as_str()})]
        );
        assert_eq!(
            channel.request_names(),
            vec![
                EventName::CreateTransport,
                EventName::Consume,
                EventName::TransportReceiverConnected,
            ]
        );
    }

    #[tokio::test]
    async fn test_consume_engine_failure_skips_resume() {
        // テスト項目: エンジンがコンシューマ作成に失敗すると consume エラーになり再開は送信されない
        // given (前提条件):
        let channel = FakeChannel::new();
        let engine = FakeEngine::new();
        engine.fail_consumer_for("p-broken");
        let adapter = adapter(&channel, &engine);
        adapter.load(json!({})).await.unwrap();

        // when (操作):
        let result = adapter
            .consume(&remote_producer("p-broken", MediaKind::Audio))
            .await;

        // then (期待する結果):
        assert!(matches!(
            result,
            Err(MediaError::Negotiation { step: NegotiationStep::Consume, .. })
        ));
        assert!(channel.emitted(EventName::ConsumerResume).is_empty());
    }

    #[tokio::test]
    async fn test_close_producer_announces_closure() {
        // テスト項目: プロデューサーを閉じると close-video-producer が送信される
        // given (前提条件):
        let channel = FakeChannel::new();
        let engine = FakeEngine::new();
        let adapter = adapter(&channel, &engine);
        adapter.load(json!({})).await.unwrap();
        let producer = adapter.produce(MediaKind::Video).await.unwrap();

        // when (操作):
        let closed = adapter.close_producer(MediaKind::Video).await;
        let again = adapter.close_producer(MediaKind::Video).await;

        // then (期待する結果):
        assert_eq!(closed, Some(producer.id.clone()));
        assert_eq!(again, None);
        assert_eq!(
            channel.emitted(EventName::CloseVideoProducer),
            vec![json!({"producerId": producer.id.as_str()})]
        );
        assert_eq!(engine.closed_producers(), 1);
    }

    #[tokio::test]
    async fn test_release_closes_each_resource_once() {
        // テスト項目: release を 2 回呼んでもプロデューサー・トラック・トランスポートは 1 回ずつ閉じられる
        // given (前提条件):
        let mut channel = MockSocketChannel::new();
        channel
            .expect_request()
            .returning(|event, _| match event {
                EventName::CreateTransport => Ok(transport_options("t-send")),
                _ => Ok(json!({})),
            });
        let mut engine = MockMediaEngine::new();
        engine.expect_load_device().returning(|_| Ok(json!({})));
        engine
            .expect_create_transport()
            .returning(|direction, options, _| {
                Ok(TransportHandle {
                    id: options.id,
                    direction,
                })
            });
        engine.expect_create_track().returning(|kind| {
            Ok(LocalTrack {
                id: "mic".to_string(),
                kind,
            })
        });
        engine.expect_create_producer().returning(|_, track| {
            Ok(ProducerHandle {
                id: ProducerId::new("p-1").unwrap(),
                kind: track.kind,
                track_id: track.id.clone(),
            })
        });
        engine.expect_close_producer().times(1).returning(|_| ());
        engine.expect_close_track().times(1).returning(|_| ());
        engine.expect_close_transport().times(1).returning(|_| ());
        let adapter =
            MediaSignalingAdapter::new(Arc::new(channel), Arc::new(engine), Duration::from_secs(1));
        adapter.load(json!({})).await.unwrap();
        adapter.produce(MediaKind::Audio).await.unwrap();

        // when (操作):
        adapter.release().await;
        adapter.release().await;

        // then (期待する結果):
        assert!(adapter.is_released());
        assert_eq!(
            adapter.produce(MediaKind::Audio).await,
            Err(MediaError::Released)
        );
    }
}
