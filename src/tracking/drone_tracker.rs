use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar, Mutex,
    },
    thread,
    time::Duration,
};

use tracing::{debug, info, warn};

use crate::{
    channel::{Frame, RealtimeClient, Subscription},
    utils::sync::{lock, wait_while_for},
};

use super::{
    drone_location::DroneLocation, location_sink::LocationSink, tracking_error::TrackingError,
};

pub const DEFAULT_TOPIC_PREFIX: &str = "/topic/drone/";

/// Estado de un seguimiento.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Subscribing,
    Subscribed,
    Unsubscribed,
}

impl fmt::Display for TrackState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            TrackState::Subscribing => write!(f, "suscribiendo"),
            TrackState::Subscribed => write!(f, "suscripto"),
            TrackState::Unsubscribed => write!(f, "sin suscripcion"),
        }
    }
}

struct TrackStatus {
    state: TrackState,
    subscription: Option<Subscription>,
    // el thread de suscripcion ya termino
    settled: bool,
    error: Option<TrackingError>,
}

struct TrackSlot {
    drone_id: String,
    topic: String,
    status: Mutex<TrackStatus>,
    changed: Condvar,
    cancelled: AtomicBool,
    // se toma mientras se entrega una lectura; stop() lo toma para esperar la entrega en curso
    delivery: Mutex<()>,
}

/// Handle de un seguimiento en curso. Clonarlo no duplica la suscripcion.
#[derive(Clone)]
pub struct TrackHandle {
    slot: Arc<TrackSlot>,
}

impl TrackHandle {
    pub fn drone_id(&self) -> &str {
        &self.slot.drone_id
    }

    pub fn topic(&self) -> &str {
        &self.slot.topic
    }

    pub fn state(&self) -> TrackState {
        lock(&self.slot.status).state
    }

    pub fn is_stopped(&self) -> bool {
        self.slot.cancelled.load(Ordering::SeqCst)
    }

    /// Detiene el seguimiento. Cuando vuelve, el sink no se invoca nunca mas.
    ///
    /// Si la suscripcion todavia esta en curso, se deja terminar y se da de baja
    /// en cuanto termina. No se debe llamar desde adentro del sink.
    pub fn stop(&self) {
        {
            let _delivery = lock(&self.slot.delivery);
            if self.slot.cancelled.swap(true, Ordering::SeqCst) {
                return;
            }
        }

        let subscription = {
            let mut status = lock(&self.slot.status);
            if status.state == TrackState::Subscribed {
                status.state = TrackState::Unsubscribed;
            }
            self.slot.changed.notify_all();
            status.subscription.take()
        };

        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }
        info!(drone_id = %self.slot.drone_id, "seguimiento detenido");
    }

    /// Espera a que la suscripcion quede activa.
    pub fn wait_subscribed(&self, timeout: Duration) -> Result<(), TrackingError> {
        let status = lock(&self.slot.status);
        let (status, timed_out) = wait_while_for(&self.slot.changed, status, timeout, |s| {
            s.state == TrackState::Subscribing && s.error.is_none()
        });
        if let Some(error) = &status.error {
            return Err(error.clone());
        }
        match status.state {
            TrackState::Subscribed => Ok(()),
            _ if timed_out => Err(TrackingError::Timeout),
            _ => Err(TrackingError::Stopped),
        }
    }

    /// Espera a que termine el thread de suscripcion. Devuelve `false` si se agoto el tiempo.
    pub fn wait_settled(&self, timeout: Duration) -> bool {
        let status = lock(&self.slot.status);
        let (_status, timed_out) =
            wait_while_for(&self.slot.changed, status, timeout, |s| !s.settled);
        !timed_out
    }

    pub fn error(&self) -> Option<TrackingError> {
        lock(&self.slot.status).error.clone()
    }
}

/// Traduce "seguir al drone X" en una suscripcion del `RealtimeClient`.
///
/// Cada `DroneTracker` mantiene a lo sumo un seguimiento activo por drone.
pub struct DroneTracker {
    client: RealtimeClient,
    topic_prefix: String,
    tracks: Mutex<HashMap<String, TrackHandle>>,
}

impl DroneTracker {
    pub fn new(client: RealtimeClient, topic_prefix: &str) -> DroneTracker {
        DroneTracker {
            client,
            topic_prefix: topic_prefix.to_string(),
            tracks: Mutex::new(HashMap::new()),
        }
    }

    pub fn topic_for(&self, drone_id: &str) -> String {
        format!("{}{}", self.topic_prefix, drone_id)
    }

    /// Empieza a seguir a `drone_id` sin bloquear.
    ///
    /// Si ya habia un seguimiento para ese drone, primero se detiene.
    pub fn track(&self, drone_id: &str, sink: Arc<dyn LocationSink>) -> TrackHandle {
        let slot = Arc::new(TrackSlot {
            drone_id: drone_id.to_string(),
            topic: self.topic_for(drone_id),
            status: Mutex::new(TrackStatus {
                state: TrackState::Subscribing,
                subscription: None,
                settled: false,
                error: None,
            }),
            changed: Condvar::new(),
            cancelled: AtomicBool::new(false),
            delivery: Mutex::new(()),
        });
        let handle = TrackHandle {
            slot: Arc::clone(&slot),
        };
        // reemplazo atomico: cada handle desplazado lo detiene quien lo saco del mapa
        let previous = lock(&self.tracks).insert(drone_id.to_string(), handle.clone());
        if let Some(previous) = previous {
            debug!(drone_id, "se reemplaza el seguimiento anterior");
            previous.stop();
        }

        let client = self.client.clone();
        thread::spawn(move || run_subscribe(client, slot, sink));
        handle
    }

    /// Detiene el seguimiento de `drone_id` si existe.
    pub fn stop(&self, drone_id: &str) {
        let handle = lock(&self.tracks).remove(drone_id);
        if let Some(handle) = handle {
            handle.stop();
        }
    }

    pub fn stop_all(&self) {
        let handles: Vec<TrackHandle> = lock(&self.tracks).drain().map(|(_, h)| h).collect();
        for handle in handles {
            handle.stop();
        }
    }

    pub fn active_tracks(&self) -> Vec<String> {
        lock(&self.tracks)
            .values()
            .filter(|h| !h.is_stopped())
            .map(|h| h.drone_id().to_string())
            .collect()
    }

    pub fn client(&self) -> &RealtimeClient {
        &self.client
    }
}

impl Drop for DroneTracker {
    fn drop(&mut self) {
        self.stop_all();
    }
}

fn run_subscribe(client: RealtimeClient, slot: Arc<TrackSlot>, sink: Arc<dyn LocationSink>) {
    let handler_slot = Arc::clone(&slot);
    let handler = Arc::new(move |frame: &Frame| deliver(&handler_slot, sink.as_ref(), frame));

    let result = client.subscribe(&slot.topic, handler);

    let mut status = lock(&slot.status);
    match result {
        Ok(subscription) => {
            if slot.cancelled.load(Ordering::SeqCst) {
                // se pidio stop mientras la suscripcion estaba en vuelo
                drop(status);
                subscription.unsubscribe();
                status = lock(&slot.status);
                status.state = TrackState::Unsubscribed;
                debug!(drone_id = %slot.drone_id, "suscripcion tardia dada de baja");
            } else {
                status.state = TrackState::Subscribed;
                status.subscription = Some(subscription);
                info!(drone_id = %slot.drone_id, topic = %slot.topic, "drone suscripto");
            }
        }
        Err(e) => {
            warn!(drone_id = %slot.drone_id, "no se pudo seguir al drone: {}", e);
            status.state = TrackState::Unsubscribed;
            status.error = Some(TrackingError::SubscribeFailed(e));
        }
    }
    status.settled = true;
    slot.changed.notify_all();
}

fn deliver(slot: &TrackSlot, sink: &dyn LocationSink, frame: &Frame) {
    if slot.cancelled.load(Ordering::SeqCst) {
        return;
    }
    let location = match DroneLocation::decode_for(&frame.body, &slot.drone_id) {
        Ok(location) => location,
        Err(e) => {
            warn!(drone_id = %slot.drone_id, "se descarta un mensaje: {}", e);
            return;
        }
    };

    let _delivery = lock(&slot.delivery);
    if slot.cancelled.load(Ordering::SeqCst) {
        return;
    }
    sink.on_location(location);
}
