use std::sync::Arc;

use drone_tracker::{
    gateway::GatewayError,
    map::{MapSceneController, SceneHandle},
    tracking::{DroneLocation, LocationSink, SharedTrackedDrone},
};
use tracing::warn;

/// Sink del visor: acumula la lectura en el `SharedTrackedDrone`, mueve el
/// marcador del drone en la escena y pide un repintado.
pub struct SceneSink {
    pub tracked: SharedTrackedDrone,
    pub controller: Arc<MapSceneController>,
    pub scene: SceneHandle,
    pub ctx: egui::Context,
}

impl LocationSink for SceneSink {
    fn on_location(&self, location: DroneLocation) {
        let point = location.get_point();
        self.tracked.on_location(location);
        if let Err(e) = self.controller.update_current_point(&self.scene, Some(point)) {
            warn!("no se pudo actualizar la escena: {}", e);
        }
        self.ctx.request_repaint();
    }

    fn on_location_missing(&self) {
        self.tracked.on_location_missing();
        self.ctx.request_repaint();
    }

    fn on_fetch_error(&self, error: &GatewayError) {
        self.tracked.on_fetch_error(error);
        self.ctx.request_repaint();
    }
}
