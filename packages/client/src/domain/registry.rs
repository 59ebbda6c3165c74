//! Peer & media registry.
//!
//! Maps every known peer of the study room to its UI state and the remote
//! consumers this client holds for it. Handles leave the registry only by
//! being returned to the caller, who closes them exactly once.

use super::{
    entity::PeerState,
    media::ConsumerHandle,
    value_object::{MediaKind, ProducerId, UserId},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerUiState {
    pub state: PeerState,
    pub is_me: bool,
    pub audio: Option<ConsumerHandle>,
    pub video: Option<ConsumerHandle>,
}

impl PeerUiState {
    fn slot_mut(&mut self, kind: MediaKind) -> &mut Option<ConsumerHandle> {
        match kind {
            MediaKind::Audio => &mut self.audio,
            MediaKind::Video => &mut self.video,
        }
    }

    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }
}

/// Result of attaching a consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attach {
    /// Stored; `replaced` is the prior handle of the same kind, to be closed
    Attached { replaced: Option<ConsumerHandle> },
    /// Unknown or local peer; the handle is handed back to be closed
    Refused(ConsumerHandle),
}

impl Attach {
    /// The handle the caller has to close, if any
    pub fn into_closable(self) -> Option<ConsumerHandle> {
        match self {
            Attach::Attached { replaced } => replaced,
            Attach::Refused(handle) => Some(handle),
        }
    }
}

/// Insertion-ordered registry keyed by peer id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerMediaRegistry {
    me: UserId,
    peers: Vec<PeerUiState>,
}

impl PeerMediaRegistry {
    pub fn new(me: UserId) -> Self {
        Self {
            me,
            peers: Vec::new(),
        }
    }

    pub fn me_id(&self) -> &UserId {
        &self.me
    }

    /// Insert a peer or replace its state, keeping the consumers it holds
    pub fn upsert(&mut self, state: PeerState) {
        if let Some(peer) = self.find_mut(&state.uid) {
            peer.state = state;
            return;
        }
        let is_me = state.uid == self.me;
        self.peers.push(PeerUiState {
            state,
            is_me,
            audio: None,
            video: None,
        });
    }

    /// Remove a peer and hand back every consumer it held
    pub fn remove(&mut self, id: &UserId) -> Vec<ConsumerHandle> {
        let Some(index) = self.peers.iter().position(|p| &p.state.uid == id) else {
            return Vec::new();
        };
        let peer = self.peers.remove(index);
        peer.audio.into_iter().chain(peer.video).collect()
    }

    pub fn attach(&mut self, handle: ConsumerHandle) -> Attach {
        let peer_id = handle.peer_id.clone();
        let kind = handle.kind;
        self.attach_consumer(&peer_id, kind, handle)
    }

    fn attach_consumer(&mut self, peer_id: &UserId, kind: MediaKind, handle: ConsumerHandle) -> Attach {
        match self.find_mut(peer_id) {
            Some(peer) if !peer.is_me => {
                let replaced = peer.slot_mut(kind).replace(handle);
                Attach::Attached { replaced }
            }
            _ => Attach::Refused(handle),
        }
    }

    /// Returns the handle to close: the replaced one, or `handle` itself if refused
    pub fn attach_video_consumer(
        &mut self,
        peer_id: &UserId,
        handle: ConsumerHandle,
    ) -> Option<ConsumerHandle> {
        self.attach_consumer(peer_id, MediaKind::Video, handle)
            .into_closable()
    }

    /// Returns the handle to close: the replaced one, or `handle` itself if refused
    pub fn attach_audio_consumer(
        &mut self,
        peer_id: &UserId,
        handle: ConsumerHandle,
    ) -> Option<ConsumerHandle> {
        self.attach_consumer(peer_id, MediaKind::Audio, handle)
            .into_closable()
    }

    pub fn detach_video_consumer(&mut self, peer_id: &UserId) -> Option<ConsumerHandle> {
        self.find_mut(peer_id).and_then(|p| p.video.take())
    }

    pub fn detach_audio_consumer(&mut self, peer_id: &UserId) -> Option<ConsumerHandle> {
        self.find_mut(peer_id).and_then(|p| p.audio.take())
    }

    /// Detach whichever consumer subscribes to `producer_id`
    pub fn detach_by_producer(&mut self, producer_id: &ProducerId) -> Option<ConsumerHandle> {
        self.peers.iter_mut().find_map(|peer| {
            if peer.audio.as_ref().is_some_and(|c| &c.producer_id == producer_id) {
                peer.audio.take()
            } else if peer.video.as_ref().is_some_and(|c| &c.producer_id == producer_id) {
                peer.video.take()
            } else {
                None
            }
        })
    }

    pub fn is_consuming(&self, producer_id: &ProducerId) -> bool {
        self.peers.iter().any(|peer| {
            peer.audio
                .iter()
                .chain(peer.video.iter())
                .any(|c| &c.producer_id == producer_id)
        })
    }

    /// Take every consumer out of the registry, leaving the roster in place
    pub fn drain_consumers(&mut self) -> Vec<ConsumerHandle> {
        self.peers
            .iter_mut()
            .flat_map(|peer| [peer.audio.take(), peer.video.take()])
            .flatten()
            .collect()
    }

    pub fn get(&self, id: &UserId) -> Option<&PeerUiState> {
        self.peers.iter().find(|p| &p.state.uid == id)
    }

    pub fn contains(&self, id: &UserId) -> bool {
        self.get(id).is_some()
    }

    pub fn me(&self) -> Option<&PeerUiState> {
        self.get(&self.me)
    }

    pub fn peers(&self) -> &[PeerUiState] {
        &self.peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    fn find_mut(&mut self, id: &UserId) -> Option<&mut PeerUiState> {
        self.peers.iter_mut().find(|p| &p.state.uid == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_object::ConsumerId;

    fn uid(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn peer(id: &str) -> PeerState {
        PeerState {
            uid: uid(id),
            name: id.to_uppercase(),
            enabled_microphone: false,
            enabled_headset: true,
        }
    }

    fn consumer(id: &str, peer_id: &str, kind: MediaKind) -> ConsumerHandle {
        ConsumerHandle {
            id: ConsumerId::new(id).unwrap(),
            producer_id: ProducerId::new(format!("producer-{id}")).unwrap(),
            peer_id: uid(peer_id),
            kind,
            track_id: format!("track-{id}"),
        }
    }

    fn registry() -> PeerMediaRegistry {
        let mut registry = PeerMediaRegistry::new(uid("alice"));
        registry.upsert(peer("alice"));
        registry.upsert(peer("bob"));
        registry
    }

    #[test]
    fn test_upsert_flags_local_peer() {
        // テスト項目: 自分自身のエントリだけ is_me が true になる
        // given (前提条件):
        let registry = registry();

        // when (操作):
        let me = registry.me().unwrap();
        let bob = registry.get(&uid("bob")).unwrap();

        // then (期待する結果):
        assert!(me.is_me);
        assert!(!bob.is_me);
    }

    #[test]
    fn test_upsert_keeps_consumers_and_order() {
        // テスト項目: 状態の更新で保持中のコンシューマと並び順が維持される
        // given (前提条件):
        let mut registry = registry();
        registry.attach(consumer("c1", "bob", MediaKind::Video));

        // when (操作):
        let mut changed = peer("bob");
        changed.enabled_microphone = true;
        registry.upsert(changed);

        // then (期待する結果):
        let bob = &registry.peers()[1];
        assert!(bob.state.enabled_microphone);
        assert!(bob.has_video());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_attach_second_video_returns_previous_once() {
        // テスト項目: 同じ種別のコンシューマを再度登録すると以前のハンドルが 1 度だけ返される
        // given (前提条件):
        let mut registry = registry();
        let first = consumer("c1", "bob", MediaKind::Video);
        let second = consumer("c2", "bob", MediaKind::Video);

        // when (操作):
        let none = registry.attach_video_consumer(&uid("bob"), first.clone());
        let replaced = registry.attach_video_consumer(&uid("bob"), second.clone());

        // then (期待する結果):
        assert_eq!(none, None);
        assert_eq!(replaced, Some(first));
        assert_eq!(registry.get(&uid("bob")).unwrap().video, Some(second));
        assert_eq!(registry.drain_consumers().len(), 1);
    }

    #[test]
    fn test_attach_to_local_peer_is_refused() {
        // テスト項目: 自分自身へのコンシューマ登録は拒否されハンドルが返される
        // given (前提条件):
        let mut registry = registry();
        let handle = consumer("c1", "alice", MediaKind::Audio);

        // when (操作):
        let result = registry.attach(handle.clone());

        // then (期待する結果):
        assert_eq!(result, Attach::Refused(handle));
        assert!(registry.me().unwrap().audio.is_none());
    }

    #[test]
    fn test_attach_to_unknown_peer_is_refused() {
        // テスト項目: 未知のピアへのコンシューマ登録は拒否される
        // given (前提条件):
        let mut registry = registry();
        let handle = consumer("c1", "carol", MediaKind::Audio);

        // when (操作):
        let to_close = registry.attach_audio_consumer(&uid("carol"), handle.clone());

        // then (期待する結果):
        assert_eq!(to_close, Some(handle));
    }

    #[test]
    fn test_remove_returns_all_consumers() {
        // テスト項目: ピア削除で保持していた全てのコンシューマが返される
        // given (前提条件):
        let mut registry = registry();
        registry.attach(consumer("c1", "bob", MediaKind::Audio));
        registry.attach(consumer("c2", "bob", MediaKind::Video));

        // when (操作):
        let removed = registry.remove(&uid("bob"));

        // then (期待する結果):
        assert_eq!(removed.len(), 2);
        assert!(!registry.contains(&uid("bob")));
        assert!(registry.remove(&uid("bob")).is_empty());
    }

    #[test]
    fn test_detach_by_producer() {
        // テスト項目: プロデューサー ID から対応するコンシューマを取り外せる
        // given (前提条件):
        let mut registry = registry();
        let handle = consumer("c1", "bob", MediaKind::Audio);
        registry.attach(handle.clone());

        // when (操作):
        let detached = registry.detach_by_producer(&handle.producer_id);

        // then (期待する結果):
        assert_eq!(detached, Some(handle.clone()));
        assert!(!registry.is_consuming(&handle.producer_id));
        assert_eq!(registry.detach_audio_consumer(&uid("bob")), None);
    }
}
