use std::{
    collections::HashMap,
    sync::{
        mpsc::{self, Receiver, Sender},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};

use tracing::debug;

use crate::utils::sync::lock;

use super::{
    channel_error::ChannelError,
    frame::{Command, Frame},
    transport::{Session, Transport},
};

type Inbound = Result<Frame, ChannelError>;

struct BrokerSubscription {
    session_id: u64,
    subscription_id: String,
    topic: String,
}

#[derive(Default)]
struct BrokerState {
    sessions: HashMap<u64, Sender<Inbound>>,
    subscriptions: Vec<BrokerSubscription>,
    next_session_id: u64,
    next_message_id: u64,
    handshakes: usize,
    refuse_next: usize,
    offline: bool,
    handshake_delay: Duration,
}

/// Broker STOMP en memoria. Implementa `Transport`, asi que un `RealtimeClient`
/// lo usa igual que a un broker real.
///
/// Los frames que envian las sesiones se procesan en el mismo thread que llama
/// a `send`, por lo que cuando `subscribe` vuelve la suscripcion ya esta activa.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MemoryBroker {
    pub fn new() -> MemoryBroker {
        MemoryBroker::default()
    }

    /// Publica `body` en `topic`. Devuelve a cuantas suscripciones se entrego.
    pub fn publish(&self, topic: &str, body: &str) -> usize {
        self.publish_raw(topic, body.as_bytes().to_vec())
    }

    pub fn publish_raw(&self, topic: &str, body: Vec<u8>) -> usize {
        let mut state = lock(&self.state);
        state.next_message_id += 1;
        let message_id = state.next_message_id;

        let mut delivered = 0;
        for subscription in state.subscriptions.iter().filter(|s| s.topic == topic) {
            let frame = Frame::new(Command::Message)
                .with_header("subscription", &subscription.subscription_id)
                .with_header("destination", topic)
                .with_header("message-id", &message_id.to_string())
                .with_header("content-type", "application/json")
                .with_body(body.clone());
            if let Some(sender) = state.sessions.get(&subscription.session_id) {
                if sender.send(Ok(frame)).is_ok() {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Hace que todas las sesiones vivas reciban un frame ilegible.
    pub fn inject_malformed_frame(&self) {
        let state = lock(&self.state);
        for sender in state.sessions.values() {
            let _ = sender.send(Err(ChannelError::MalformedFrame(
                "frame inyectado".to_string(),
            )));
        }
    }

    /// Manda un frame ERROR a todas las sesiones vivas.
    pub fn send_error(&self, message: &str) {
        let state = lock(&self.state);
        for sender in state.sessions.values() {
            let _ = sender.send(Ok(Frame::new(Command::Error).with_header("message", message)));
        }
    }

    /// Corta todas las conexiones como si se hubiera caido la red.
    pub fn drop_connections(&self) {
        let mut state = lock(&self.state);
        state.sessions.clear();
        state.subscriptions.clear();
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        lock(&self.state)
            .subscriptions
            .iter()
            .filter(|s| s.topic == topic)
            .count()
    }

    pub fn session_count(&self) -> usize {
        lock(&self.state).sessions.len()
    }

    /// Cantidad de handshakes intentados, exitosos o no.
    pub fn handshakes(&self) -> usize {
        lock(&self.state).handshakes
    }

    pub fn refuse_handshakes(&self, count: usize) {
        lock(&self.state).refuse_next = count;
    }

    /// Mientras esta offline rechaza todos los handshakes.
    pub fn set_offline(&self, offline: bool) {
        lock(&self.state).offline = offline;
    }

    pub fn set_handshake_delay(&self, delay: Duration) {
        lock(&self.state).handshake_delay = delay;
    }

    fn handle_frame(&self, session_id: u64, frame: &Frame) -> Result<(), ChannelError> {
        let mut state = lock(&self.state);
        if !state.sessions.contains_key(&session_id) {
            return Err(ChannelError::Disconnected);
        }

        match frame.command {
            Command::Subscribe => {
                let id = frame
                    .header("id")
                    .ok_or_else(|| ChannelError::MalformedFrame("SUBSCRIBE sin id".to_string()))?;
                let destination = frame.header("destination").ok_or_else(|| {
                    ChannelError::MalformedFrame("SUBSCRIBE sin destination".to_string())
                })?;
                state.subscriptions.push(BrokerSubscription {
                    session_id,
                    subscription_id: id.to_string(),
                    topic: destination.to_string(),
                });
            }
            Command::Unsubscribe => {
                let id = frame.header("id").unwrap_or_default().to_string();
                state
                    .subscriptions
                    .retain(|s| !(s.session_id == session_id && s.subscription_id == id));
            }
            Command::Disconnect => {
                state.sessions.remove(&session_id);
                state.subscriptions.retain(|s| s.session_id != session_id);
            }
            Command::Send => {
                let destination = frame.header("destination").unwrap_or_default().to_string();
                let body = frame.body.clone();
                drop(state);
                self.publish_raw(&destination, body);
            }
            other => debug!("el broker en memoria ignora {}", other.as_str()),
        }
        Ok(())
    }

    fn close_session(&self, session_id: u64) {
        let mut state = lock(&self.state);
        state.sessions.remove(&session_id);
        state.subscriptions.retain(|s| s.session_id != session_id);
    }
}

impl Transport for MemoryBroker {
    fn open(&self) -> Result<Box<dyn Session>, ChannelError> {
        let delay = {
            let mut state = lock(&self.state);
            state.handshakes += 1;
            state.handshake_delay
        };
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let mut state = lock(&self.state);
        if state.offline {
            return Err(ChannelError::ConnectionFailed(
                "el broker en memoria esta offline".to_string(),
            ));
        }
        if state.refuse_next > 0 {
            state.refuse_next -= 1;
            return Err(ChannelError::HandshakeRefused(
                "handshake rechazado".to_string(),
            ));
        }

        state.next_session_id += 1;
        let session_id = state.next_session_id;
        let (sender, receiver) = mpsc::channel();
        state.sessions.insert(session_id, sender);

        Ok(Box::new(MemorySession {
            id: session_id,
            broker: self.clone(),
            inbox: Mutex::new(receiver),
        }))
    }
}

struct MemorySession {
    id: u64,
    broker: MemoryBroker,
    inbox: Mutex<Receiver<Inbound>>,
}

impl Session for MemorySession {
    fn send(&self, frame: &Frame) -> Result<(), ChannelError> {
        self.broker.handle_frame(self.id, frame)
    }

    fn next_frame(&self) -> Result<Option<Frame>, ChannelError> {
        let inbox = lock(&self.inbox);
        match inbox.recv() {
            Ok(Ok(frame)) => Ok(Some(frame)),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(None),
        }
    }

    fn close(&self) {
        self.broker.close_session(self.id);
    }
}
