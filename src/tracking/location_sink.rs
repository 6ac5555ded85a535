use crate::gateway::gateway_error::GatewayError;

use super::drone_location::DroneLocation;

/// Consumidor de lecturas ya validadas.
///
/// Tanto el seguimiento en tiempo real como el polling entregan por aca, asi
/// que quien consume no sabe que transporte esta en uso.
pub trait LocationSink: Send + Sync {
    fn on_location(&self, location: DroneLocation);

    /// El gateway todavia no tiene ninguna lectura para el drone. No es un error.
    fn on_location_missing(&self) {}

    /// Fallo transitorio al consultar el gateway. Se reintenta en el proximo tick.
    fn on_fetch_error(&self, _error: &GatewayError) {}
}

impl<F> LocationSink for F
where
    F: Fn(DroneLocation) + Send + Sync,
{
    fn on_location(&self, location: DroneLocation) {
        self(location)
    }
}
