use std::{
    collections::HashMap,
    sync::{
        mpsc::{self, Receiver, Sender, TryRecvError},
        Arc, Mutex,
    },
};

use hotstuff_sync::{
    networking::{messages::Message, network::Network},
    types::{crypto_primitives::VerifyingKey, validator_set::ValidatorSet},
};

/// A mock network stub which passes messages from and to threads using channels.
#[derive(Clone)]
pub(crate) struct NetworkStub {
    my_verifying_key: VerifyingKey,
    all_peers: HashMap<VerifyingKey, Sender<(VerifyingKey, Message)>>,
    inbox: Arc<Mutex<Receiver<(VerifyingKey, Message)>>>,
}

impl NetworkStub {
    pub(crate) fn verifying_key(&self) -> VerifyingKey {
        self.my_verifying_key
    }
}

impl Network for NetworkStub {
    fn init_validator_set(&mut self, _: ValidatorSet) {}

    fn send(&mut self, peer: VerifyingKey, message: Message) {
        if let Some(peer) = self.all_peers.get(&peer) {
            let _ = peer.send((self.my_verifying_key, message));
        }
    }

    fn recv(&mut self) -> Option<(VerifyingKey, Message)> {
        match self.inbox.lock().unwrap().try_recv() {
            Ok(o_m) => Some(o_m),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => panic!(),
        }
    }
}

pub(crate) fn mock_network(peers: impl Iterator<Item = VerifyingKey>) -> Vec<NetworkStub> {
    let mut all_peers = HashMap::new();
    let peer_and_inboxes: Vec<(VerifyingKey, Receiver<(VerifyingKey, Message)>)> = peers
        .map(|peer| {
            let (sender, receiver) = mpsc::channel();
            all_peers.insert(peer, sender);

            (peer, receiver)
        })
        .collect();

    peer_and_inboxes
        .into_iter()
        .map(|(my_verifying_key, inbox)| NetworkStub {
            my_verifying_key,
            all_peers: all_peers.clone(),
            inbox: Arc::new(Mutex::new(inbox)),
        })
        .collect()
}

/// A network that records every message sent through it and never delivers anything.
#[derive(Clone, Default)]
pub(crate) struct RecordingNetwork {
    sent: Arc<Mutex<Vec<(VerifyingKey, Message)>>>,
}

impl RecordingNetwork {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Remove and return every message sent so far.
    pub(crate) fn take_sent(&self) -> Vec<(VerifyingKey, Message)> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }
}

impl Network for RecordingNetwork {
    fn init_validator_set(&mut self, _: ValidatorSet) {}

    fn send(&mut self, peer: VerifyingKey, message: Message) {
        self.sent.lock().unwrap().push((peer, message));
    }

    fn recv(&mut self) -> Option<(VerifyingKey, Message)> {
        None
    }
}
