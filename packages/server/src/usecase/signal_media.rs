//! UseCase: 擬似 SFU とのメディアシグナリング
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - プロデューサーの登録・置き換え・削除と、その通知
//! - コンシューマーの作成
//!
//! ### なぜこのテストが必要か
//! - 他のメンバーは `new-producer` / `producer-closed` を受けて消費の開始・終了を行う
//! - 音声のプロデューサーはマイクの状態と連動している
//!
//! ### どのような状況を想定しているか
//! - 正常系：音声の送信開始と停止、同じ種類の送信の置き換え
//! - 異常系：存在しないプロデューサーの消費、学習室の外からの要求

use std::sync::Arc;

use studyroom_shared::protocol::{
    EventName, MediaKind,
    dto::{ConsumeResponse, PeerStateDto, ProduceResponse, ProducerInfoDto, TransportOptionsDto},
};

use crate::{
    domain::{MessagePusher, Producer, Room, RoomError, RoomId, RoomRepository, UserId},
    infrastructure::sfu,
};

use super::{
    error::UseCaseError,
    notify::{except, notify, notify_producers_closed},
};

pub struct SignalMediaUseCase {
    repository: Arc<dyn RoomRepository>,
    message_pusher: Arc<dyn MessagePusher>,
}

impl SignalMediaUseCase {
    pub fn new(
        repository: Arc<dyn RoomRepository>,
        message_pusher: Arc<dyn MessagePusher>,
    ) -> Self {
        Self {
            repository,
            message_pusher,
        }
    }

    async fn member_room(&self, room_id: &RoomId, user_id: &UserId) -> Result<Room, UseCaseError> {
        let room = self.repository.find_room(room_id).await?;
        if !room.is_member(user_id) {
            return Err(RoomError::NotInRoom(user_id.to_string()).into());
        }
        Ok(room)
    }

    pub async fn create_transport(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        consuming: bool,
    ) -> Result<TransportOptionsDto, UseCaseError> {
        self.member_room(room_id, user_id).await?;
        let options = sfu::transport_options();
        tracing::debug!(
            "Created {} transport '{}' for '{}'",
            if consuming { "receive" } else { "send" },
            options.id,
            user_id
        );
        Ok(options)
    }

    /// `transport-producer-connected` / `transport-receiver-connected`
    pub async fn connect_transport(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        transport_id: &str,
    ) -> Result<(), UseCaseError> {
        self.member_room(room_id, user_id).await?;
        tracing::debug!("Transport '{}' of '{}' connected", transport_id, user_id);
        Ok(())
    }

    /// 送信を登録し、学習室の他のメンバーに `new-producer` を送る
    pub async fn produce(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        kind: MediaKind,
    ) -> Result<ProduceResponse, UseCaseError> {
        let producer = Producer {
            id: sfu::new_id(),
            peer_id: user_id.clone(),
            kind,
        };
        let mut replaced: Option<Producer> = None;
        let slot = &mut replaced;
        let added = producer.clone();
        let room = self
            .repository
            .update_room(
                room_id,
                Box::new(move |room: &mut Room| {
                    *slot = room.add_producer(added)?;
                    Ok(())
                }),
            )
            .await?;
        tracing::info!("'{}' started producing {} ({})", user_id, kind, producer.id);

        let others = except(room.member_ids(), user_id);
        if let Some(previous) = replaced {
            notify_producers_closed(&self.message_pusher, &others, &[previous]).await?;
        }
        notify(
            &self.message_pusher,
            others.clone(),
            EventName::NewProducer,
            &ProducerInfoDto::from(&producer),
        )
        .await?;
        if kind == MediaKind::Audio {
            self.notify_peer_state(&room, user_id, others).await?;
        }
        Ok(ProduceResponse { id: producer.id })
    }

    pub async fn consume(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        producer_id: &str,
    ) -> Result<ConsumeResponse, UseCaseError> {
        let room = self.member_room(room_id, user_id).await?;
        let producer = room
            .producer(producer_id)
            .ok_or_else(|| RoomError::UnknownProducer(producer_id.to_string()))?;
        let consumer = sfu::consumer_for(producer);
        tracing::debug!(
            "'{}' consumes '{}' with '{}'",
            user_id,
            producer_id,
            consumer.id
        );
        Ok(consumer)
    }

    pub fn resume_consumer(&self, user_id: &UserId, consumer_id: &str) {
        tracing::debug!("'{}' resumed consumer '{}'", user_id, consumer_id);
    }

    /// 他のメンバーのプロデューサー一覧（`get-producers`）
    pub async fn list_producers(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
    ) -> Result<Vec<ProducerInfoDto>, UseCaseError> {
        let room = self.member_room(room_id, user_id).await?;
        Ok(room
            .producers_except(user_id)
            .iter()
            .map(ProducerInfoDto::from)
            .collect())
    }

    /// 送信を止め、学習室の他のメンバーに `producer-closed` を送る
    pub async fn close_producer(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        producer_id: String,
    ) -> Result<(), UseCaseError> {
        let mut removed: Option<Producer> = None;
        let slot = &mut removed;
        let peer = user_id.clone();
        let room = self
            .repository
            .update_room(
                room_id,
                Box::new(move |room: &mut Room| {
                    *slot = Some(room.remove_producer(&peer, &producer_id)?);
                    Ok(())
                }),
            )
            .await?;
        let Some(producer) = removed else {
            return Ok(());
        };
        tracing::info!("'{}' stopped producing {}", user_id, producer.kind);

        let others = except(room.member_ids(), user_id);
        notify_producers_closed(&self.message_pusher, &others, std::slice::from_ref(&producer))
            .await?;
        if producer.kind == MediaKind::Audio {
            self.notify_peer_state(&room, user_id, others).await?;
        }
        Ok(())
    }

    async fn notify_peer_state(
        &self,
        room: &Room,
        user_id: &UserId,
        targets: Vec<UserId>,
    ) -> Result<(), UseCaseError> {
        let Some(member) = room.member(user_id) else {
            return Ok(());
        };
        notify(
            &self.message_pusher,
            targets,
            EventName::PeerStateChanged,
            &PeerStateDto::from(member),
        )
        .await
    }
}
