//! 擬似 SFU
//!
//! メディアを転送しない SFU の代役。クライアントのシグナリング手順を最後まで
//! 通すためのトランスポート / コンシューマーのパラメータを生成します。
//! パラメータの中身はクライアントにとって不透明な JSON です。

use serde_json::{Value, json};
use studyroom_shared::protocol::{
    MediaKind,
    dto::{ConsumeResponse, TransportOptionsDto},
};
use uuid::Uuid;

use crate::domain::Producer;

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Answer to `create-transport`
pub fn transport_options() -> TransportOptionsDto {
    TransportOptionsDto {
        id: new_id(),
        ice_parameters: json!({
            "usernameFragment": Uuid::new_v4().simple().to_string(),
            "password": Uuid::new_v4().simple().to_string(),
            "iceLite": true
        }),
        ice_candidates: json!([
            {
                "foundation": "udpcandidate",
                "priority": 1076302079,
                "ip": "127.0.0.1",
                "protocol": "udp",
                "port": 40000,
                "type": "host"
            }
        ]),
        dtls_parameters: json!({
            "role": "auto",
            "fingerprints": [{"algorithm": "sha-256", "value": "00:00:00:00"}]
        }),
    }
}

/// Answer to `consume` for a known producer
pub fn consumer_for(producer: &Producer) -> ConsumeResponse {
    ConsumeResponse {
        id: new_id(),
        producer_id: producer.id.clone(),
        kind: producer.kind,
        rtp_parameters: rtp_parameters(producer),
    }
}

fn rtp_parameters(producer: &Producer) -> Value {
    let mime_type = match producer.kind {
        MediaKind::Audio => "audio/opus",
        MediaKind::Video => "video/VP8",
    };
    json!({
        "codecs": [{"mimeType": mime_type, "payloadType": 100}],
        "encodings": [{"ssrc": 1000}],
        "mid": producer.id
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UserId;

    #[test]
    fn test_transport_ids_are_unique() {
        // テスト項目: トランスポートごとに異なる ID が払い出される
        // given (前提条件):
        let first = transport_options();

        // when (操作):
        let second = transport_options();

        // then (期待する結果):
        assert_ne!(first.id, second.id);
        assert!(first.ice_candidates.is_array());
    }

    #[test]
    fn test_consumer_mirrors_producer() {
        // テスト項目: コンシューマーはプロデューサーの ID と種類を引き継ぐ
        // given (前提条件):
        let producer = Producer {
            id: "p-1".to_string(),
            peer_id: UserId::new("alice").unwrap(),
            kind: MediaKind::Video,
        };

        // when (操作):
        let consumer = consumer_for(&producer);

        // then (期待する結果):
        assert_eq!(consumer.producer_id, "p-1");
        assert_eq!(consumer.kind, MediaKind::Video);
        assert_eq!(consumer.rtp_parameters["codecs"][0]["mimeType"], "video/VP8");
    }
}
