use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::{channel::ConnectionState, gateway::gateway_error::GatewayError, utils::sync::lock};

use super::{drone_location::DroneLocation, location_sink::LocationSink};

/// Vista acumulada de un drone seguido: ultima lectura buena, distancia
/// recorrida, ultimo error y estado del enlace en tiempo real.
///
/// Un error nunca borra la ultima lectura buena. El enlace queda en `None`
/// cuando las lecturas llegan por polling.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedDrone {
    drone_id: String,
    last: Option<DroneLocation>,
    distance_km: f64,
    last_error: Option<String>,
    missing: bool,
    updates: u64,
    link: Option<ConnectionState>,
}

impl TrackedDrone {
    pub fn new(drone_id: &str) -> TrackedDrone {
        TrackedDrone {
            drone_id: drone_id.to_string(),
            last: None,
            distance_km: 0.0,
            last_error: None,
            missing: false,
            updates: 0,
            link: None,
        }
    }

    pub fn apply(&mut self, location: DroneLocation) {
        if let Some(previous) = &self.last {
            let leg = previous.get_point().distance_km(&location.get_point());
            self.distance_km = ((self.distance_km + leg) * 100.0).round() / 100.0;
        }
        self.last = Some(location);
        self.last_error = None;
        self.missing = false;
        self.updates += 1;
    }

    pub fn record_error(&mut self, message: &str) {
        self.last_error = Some(message.to_string());
    }

    pub fn record_missing(&mut self) {
        self.missing = true;
    }

    pub fn set_link(&mut self, state: ConnectionState) {
        self.link = Some(state);
    }

    pub fn link(&self) -> Option<ConnectionState> {
        self.link
    }

    /// `true` si el canal en tiempo real agoto los reintentos.
    pub fn is_live_unavailable(&self) -> bool {
        self.link == Some(ConnectionState::Unavailable)
    }

    pub fn get_drone_id(&self) -> &str {
        &self.drone_id
    }

    pub fn last_location(&self) -> Option<&DroneLocation> {
        self.last.as_ref()
    }

    pub fn distance_km(&self) -> f64 {
        self.distance_km
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// `true` si el gateway respondio que no hay lecturas y todavia no llego ninguna.
    pub fn is_missing(&self) -> bool {
        self.missing && self.last.is_none()
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Tiempo desde que se recibio la ultima lectura, en texto. `None` si no hay lecturas.
    pub fn staleness(&self, now: DateTime<Utc>) -> Option<String> {
        let last = self.last.as_ref()?;
        let seconds = (now - last.get_received_at()).num_seconds().max(0);
        Some(format_elapsed(seconds))
    }
}

pub fn format_elapsed(seconds: i64) -> String {
    if seconds < 60 {
        return format!("{} s ago", seconds);
    }
    let minutes = seconds / 60;
    if minutes < 60 {
        return format!("{} min ago", minutes);
    }
    format!("{} h ago", minutes / 60)
}

/// `TrackedDrone` compartido que se puede pasar como sink.
#[derive(Debug, Clone)]
pub struct SharedTrackedDrone {
    inner: Arc<Mutex<TrackedDrone>>,
}

impl SharedTrackedDrone {
    pub fn new(drone_id: &str) -> SharedTrackedDrone {
        SharedTrackedDrone {
            inner: Arc::new(Mutex::new(TrackedDrone::new(drone_id))),
        }
    }

    pub fn snapshot(&self) -> TrackedDrone {
        lock(&self.inner).clone()
    }

    pub fn record_error(&self, message: &str) {
        lock(&self.inner).record_error(message);
    }

    pub fn set_link(&self, state: ConnectionState) {
        lock(&self.inner).set_link(state);
    }
}

impl LocationSink for SharedTrackedDrone {
    fn on_location(&self, location: DroneLocation) {
        lock(&self.inner).apply(location);
    }

    fn on_location_missing(&self) {
        lock(&self.inner).record_missing();
    }

    fn on_fetch_error(&self, error: &GatewayError) {
        lock(&self.inner).record_error(&error.to_string());
    }
}
