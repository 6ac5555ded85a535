use rand::Rng;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        mpsc::{self, Receiver, Sender},
        Arc, Condvar, Mutex, Weak,
    },
    thread,
    time::Duration,
};

use tracing::{debug, info, warn};

use crate::utils::sync::{lock, wait};

use super::{
    channel_error::ChannelError,
    connection_state::ConnectionState,
    frame::{Command, Frame},
    transport::{Session, Transport},
};

pub type MessageHandler = Arc<dyn Fn(&Frame) + Send + Sync>;

/// Politica de reconexion automatica ante una caida del transporte.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy {
            max_attempts: 5,
            delay: Duration::from_millis(3000),
        }
    }
}

struct Registration {
    topic: String,
    handler: MessageHandler,
}

struct Link {
    state: ConnectionState,
    session: Option<Arc<dyn Session>>,
    // se incrementa cada vez que termina un intento de conexion explicito
    cycle: u64,
    last_error: Option<ChannelError>,
    // se incrementa en cada disconnect(); invalida intentos y reconexiones en curso
    generation: u64,
    // se incrementa en cada sesion instalada; el reader de una sesion vieja no hace nada al caer
    session_epoch: u64,
}

struct ClientInner {
    transport: Arc<dyn Transport>,
    policy: ReconnectPolicy,
    client_tag: u32,
    next_subscription: AtomicU64,
    registry: Mutex<HashMap<String, Registration>>,
    link: Mutex<Link>,
    changed: Condvar,
    watchers: Mutex<Vec<Sender<ConnectionState>>>,
}

/// Cliente de una unica conexion logica STOMP compartida por todos los que se
/// suscriben a traves de el.
///
/// Clonar el cliente comparte la misma conexion.
#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<ClientInner>,
}

/// Registro de un handler en el cliente. Se da de baja con `unsubscribe`.
pub struct Subscription {
    id: String,
    topic: String,
    client: Weak<ClientInner>,
}

impl RealtimeClient {
    pub fn new(transport: Arc<dyn Transport>, policy: ReconnectPolicy) -> RealtimeClient {
        let client_tag = rand::thread_rng().gen::<u32>();
        RealtimeClient {
            inner: Arc::new(ClientInner {
                transport,
                policy,
                client_tag,
                next_subscription: AtomicU64::new(0),
                registry: Mutex::new(HashMap::new()),
                link: Mutex::new(Link {
                    state: ConnectionState::Disconnected,
                    session: None,
                    cycle: 0,
                    last_error: None,
                    generation: 0,
                    session_epoch: 0,
                }),
                changed: Condvar::new(),
                watchers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.inner.link).state
    }

    /// Devuelve un canal por el que llega cada cambio de estado a partir de ahora.
    pub fn watch_state(&self) -> Receiver<ConnectionState> {
        let (sender, receiver) = mpsc::channel();
        lock(&self.inner.watchers).push(sender);
        receiver
    }

    /// Conecta con el broker si todavia no hay conexion.
    ///
    /// Si ya hay un intento en curso, espera ese intento y devuelve su resultado
    /// sin disparar otro handshake. Si el handshake falla se reintenta con la
    /// politica de reconexion hasta quedar `Unavailable`. Desde `Unavailable`
    /// arranca un intento nuevo.
    pub fn connect(&self) -> Result<(), ChannelError> {
        self.inner.connect()
    }

    /// Registra `handler` para los mensajes de `topic`, conectando antes si hace falta.
    pub fn subscribe(&self, topic: &str, handler: MessageHandler) -> Result<Subscription, ChannelError> {
        self.inner.connect()?;

        let id = format!(
            "sub-{:08x}-{}",
            self.inner.client_tag,
            self.inner.next_subscription.fetch_add(1, Ordering::SeqCst)
        );
        let session = {
            let mut registry = lock(&self.inner.registry);
            registry.insert(
                id.clone(),
                Registration {
                    topic: topic.to_string(),
                    handler,
                },
            );
            let link = lock(&self.inner.link);
            match link.state {
                ConnectionState::Connected => link.session.clone(),
                _ => None,
            }
        };

        // si no hay sesion, la reconexion en curso re-suscribe todo el registro
        if let Some(session) = session {
            if let Err(e) = session.send(&Frame::subscribe(&id, topic)) {
                warn!(topic = %topic, "no se pudo enviar SUBSCRIBE: {}", e);
            }
        }
        debug!(topic = %topic, subscription = %id, "suscripcion registrada");

        Ok(Subscription {
            id,
            topic: topic.to_string(),
            client: Arc::downgrade(&self.inner),
        })
    }

    /// Corta la sesion y limpia todos los registros.
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    pub fn active_subscriptions(&self) -> usize {
        lock(&self.inner.registry).len()
    }
}

impl Subscription {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn is_active(&self) -> bool {
        match self.client.upgrade() {
            Some(inner) => lock(&inner.registry).contains_key(&self.id),
            None => false,
        }
    }

    /// Da de baja el registro. Llamarlo de nuevo, o despues de `disconnect`, no hace nada.
    pub fn unsubscribe(&self) {
        let inner = match self.client.upgrade() {
            Some(inner) => inner,
            None => return,
        };

        let session = {
            let mut registry = lock(&inner.registry);
            if registry.remove(&self.id).is_none() {
                return;
            }
            let link = lock(&inner.link);
            match link.state {
                ConnectionState::Connected => link.session.clone(),
                _ => None,
            }
        };

        if let Some(session) = session {
            if let Err(e) = session.send(&Frame::unsubscribe(&self.id)) {
                debug!(topic = %self.topic, "no se pudo enviar UNSUBSCRIBE: {}", e);
            }
        }
    }
}

impl ClientInner {
    fn set_state(&self, link: &mut Link, state: ConnectionState) {
        if link.state == state {
            return;
        }
        link.state = state;
        lock(&self.watchers).retain(|watcher| watcher.send(state).is_ok());
        self.changed.notify_all();
    }

    fn connect(self: &Arc<Self>) -> Result<(), ChannelError> {
        let mut link = lock(&self.link);
        loop {
            match link.state {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Connecting => {
                    let cycle = link.cycle;
                    while link.cycle == cycle {
                        link = wait(&self.changed, link);
                    }
                    match link.state {
                        ConnectionState::Connected => return Ok(()),
                        // el intento fallo y arrancaron los reintentos: se espera su resultado
                        ConnectionState::Reconnecting { .. } => continue,
                        _ => return Err(link.last_error.clone().unwrap_or(ChannelError::Disconnected)),
                    }
                }
                ConnectionState::Reconnecting { .. } => {
                    while matches!(link.state, ConnectionState::Reconnecting { .. }) {
                        link = wait(&self.changed, link);
                    }
                    return match link.state {
                        ConnectionState::Connected => Ok(()),
                        ConnectionState::Unavailable => Err(ChannelError::Unavailable),
                        _ => Err(ChannelError::Disconnected),
                    };
                }
                ConnectionState::Disconnected | ConnectionState::Unavailable => break,
            }
        }

        let generation = link.generation;
        self.set_state(&mut link, ConnectionState::Connecting);
        drop(link);

        info!("conectando al broker");
        let opened = self.transport.open();

        match opened {
            Ok(session) => self.install_session(Arc::from(session), generation),
            Err(e) => {
                warn!("fallo la conexion al broker: {}", e);
                {
                    let mut link = lock(&self.link);
                    link.cycle += 1;
                    link.last_error = Some(e.clone());
                    self.changed.notify_all();
                    if link.generation != generation {
                        return Err(e);
                    }
                    self.set_state(&mut link, ConnectionState::Reconnecting { attempt: 1 });
                }
                self.retry(generation)
            }
        }
    }

    /// Reintenta abrir la sesion segun la politica de reconexion.
    ///
    /// Termina en `Connected` o, agotados los intentos, en `Unavailable`. Si en el
    /// medio hubo un `disconnect()` corta sin tocar el estado.
    fn retry(self: &Arc<Self>, generation: u64) -> Result<(), ChannelError> {
        for attempt in 1..=self.policy.max_attempts {
            {
                let mut link = lock(&self.link);
                if link.generation != generation {
                    return Err(ChannelError::Disconnected);
                }
                self.set_state(&mut link, ConnectionState::Reconnecting { attempt });
            }
            thread::sleep(self.policy.delay);

            if lock(&self.link).generation != generation {
                return Err(ChannelError::Disconnected);
            }
            info!(attempt, "reintentando la conexion");
            match self.transport.open() {
                // si hubo un disconnect() en el medio, install_session cierra la sesion
                Ok(session) => return self.install_session(Arc::from(session), generation),
                Err(e) => {
                    warn!(attempt, "fallo el reintento: {}", e);
                    lock(&self.link).last_error = Some(e);
                }
            }
        }

        let mut link = lock(&self.link);
        if link.generation != generation {
            return Err(ChannelError::Disconnected);
        }
        warn!("se agotaron los reintentos, el canal queda no disponible");
        self.set_state(&mut link, ConnectionState::Unavailable);
        Err(ChannelError::Unavailable)
    }

    /// Deja `session` como sesion activa, re-suscribe todo el registro y arranca el reader.
    fn install_session(self: &Arc<Self>, session: Arc<dyn Session>, generation: u64) -> Result<(), ChannelError> {
        let (pending, epoch) = {
            let registry = lock(&self.registry);
            let mut link = lock(&self.link);
            link.cycle += 1;
            if link.generation != generation {
                link.last_error = Some(ChannelError::Disconnected);
                self.changed.notify_all();
                drop(link);
                drop(registry);
                session.close();
                return Err(ChannelError::Disconnected);
            }
            link.session_epoch += 1;
            link.session = Some(Arc::clone(&session));
            link.last_error = None;
            self.set_state(&mut link, ConnectionState::Connected);
            self.changed.notify_all();

            let pending: Vec<(String, String)> = registry
                .iter()
                .map(|(id, registration)| (id.clone(), registration.topic.clone()))
                .collect();
            (pending, link.session_epoch)
        };

        for (id, topic) in pending {
            if let Err(e) = session.send(&Frame::subscribe(&id, &topic)) {
                warn!(topic = %topic, "no se pudo re-suscribir: {}", e);
            }
        }
        info!("conectado al broker");

        let inner = Arc::clone(self);
        thread::spawn(move || inner.run_reader(session, epoch));
        Ok(())
    }

    fn run_reader(self: Arc<Self>, session: Arc<dyn Session>, epoch: u64) {
        loop {
            match session.next_frame() {
                Ok(Some(frame)) => self.dispatch(&frame),
                Ok(None) => {
                    debug!("el broker cerro la sesion");
                    break;
                }
                Err(ChannelError::MalformedFrame(reason)) => {
                    warn!("se descarta un frame malformado: {}", reason);
                }
                Err(e) => {
                    warn!("se perdio la conexion con el broker: {}", e);
                    break;
                }
            }
        }
        self.on_session_lost(epoch);
    }

    fn dispatch(&self, frame: &Frame) {
        match frame.command {
            Command::Message => {
                let subscription = frame.header("subscription").unwrap_or_default();
                let handler = lock(&self.registry)
                    .get(subscription)
                    .map(|registration| Arc::clone(&registration.handler));
                match handler {
                    Some(handler) => handler(frame),
                    None => debug!(subscription, "MESSAGE para una suscripcion desconocida"),
                }
            }
            Command::Error => {
                warn!(
                    "el broker envio ERROR: {}",
                    frame.header("message").unwrap_or("sin mensaje")
                );
            }
            other => debug!("se ignora el frame {}", other.as_str()),
        }
    }

    fn on_session_lost(self: Arc<Self>, epoch: u64) {
        let generation = {
            let mut link = lock(&self.link);
            if link.session_epoch != epoch || link.state != ConnectionState::Connected {
                return;
            }
            link.session = None;
            self.set_state(&mut link, ConnectionState::Reconnecting { attempt: 1 });
            link.generation
        };

        let _ = self.retry(generation);
    }

    fn disconnect(&self) {
        lock(&self.registry).clear();

        let session = {
            let mut link = lock(&self.link);
            link.generation += 1;
            let session = link.session.take();
            self.set_state(&mut link, ConnectionState::Disconnected);
            session
        };

        if let Some(session) = session {
            let _ = session.send(&Frame::disconnect());
            session.close();
            info!("desconectado del broker");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::memory_broker::MemoryBroker;
    use std::sync::atomic::AtomicUsize;

    fn quick_policy() -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: 2,
            delay: Duration::from_millis(20),
        }
    }

    #[test]
    fn test_01_connect_is_idempotent() {
        let broker = MemoryBroker::new();
        let client = RealtimeClient::new(Arc::new(broker.clone()), quick_policy());

        client.connect().unwrap();
        client.connect().unwrap();

        assert_eq!(client.state(), ConnectionState::Connected);
        assert_eq!(broker.handshakes(), 1);
    }

    #[test]
    fn test_02_subscribe_auto_connects_and_delivers() {
        let broker = MemoryBroker::new();
        let client = RealtimeClient::new(Arc::new(broker.clone()), quick_policy());
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        let subscription = client
            .subscribe(
                "/topic/drone/1",
                Arc::new(move |_frame: &Frame| {
                    count_clone.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        assert!(subscription.is_active());
        assert_eq!(broker.subscriber_count("/topic/drone/1"), 1);
        broker.publish("/topic/drone/1", "{}");

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while count.load(Ordering::SeqCst) == 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_03_unsubscribe_is_idempotent() {
        let broker = MemoryBroker::new();
        let client = RealtimeClient::new(Arc::new(broker.clone()), quick_policy());
        let subscription = client.subscribe("/t", Arc::new(|_: &Frame| {})).unwrap();

        subscription.unsubscribe();
        subscription.unsubscribe();

        assert!(!subscription.is_active());
        assert_eq!(broker.subscriber_count("/t"), 0);
        assert_eq!(client.active_subscriptions(), 0);
    }

    #[test]
    fn test_04_unsubscribe_after_disconnect_is_noop() {
        let broker = MemoryBroker::new();
        let client = RealtimeClient::new(Arc::new(broker.clone()), quick_policy());
        let subscription = client.subscribe("/t", Arc::new(|_: &Frame| {})).unwrap();

        client.disconnect();
        subscription.unsubscribe();

        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(broker.session_count(), 0);
        assert!(!subscription.is_active());
    }

    #[test]
    fn test_05_failed_connect_ends_unavailable() {
        let broker = MemoryBroker::new();
        broker.set_offline(true);
        let client = RealtimeClient::new(Arc::new(broker.clone()), quick_policy());

        assert_eq!(client.connect(), Err(ChannelError::Unavailable));
        assert_eq!(client.state(), ConnectionState::Unavailable);
        assert_eq!(broker.handshakes(), 1 + 2);
        assert!(client.subscribe("/t", Arc::new(|_: &Frame| {})).is_err());
        assert_eq!(client.active_subscriptions(), 0);
    }

    #[test]
    fn test_06_failed_handshake_recovers_with_retries() {
        let broker = MemoryBroker::new();
        broker.refuse_handshakes(1);
        let client = RealtimeClient::new(Arc::new(broker.clone()), quick_policy());

        client.subscribe("/t", Arc::new(|_: &Frame| {})).unwrap();

        assert_eq!(client.state(), ConnectionState::Connected);
        assert_eq!(broker.handshakes(), 2);
        assert_eq!(broker.subscriber_count("/t"), 1);
    }

    #[test]
    fn test_07_disconnect_releases_the_reader() {
        let broker = MemoryBroker::new();
        let client = RealtimeClient::new(Arc::new(broker.clone()), quick_policy());
        let _subscription = client.subscribe("/t", Arc::new(|_: &Frame| {})).unwrap();
        let inner = Arc::downgrade(&client.inner);

        client.disconnect();
        drop(client);

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while inner.upgrade().is_some() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(inner.upgrade().is_none());
    }
}
