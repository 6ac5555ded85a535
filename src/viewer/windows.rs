use chrono::Utc;
use egui::{Align2, Color32, RichText, Ui, Window};
use walkers::MapMemory;

use drone_tracker::{
    map::{SceneStatus, WidgetEvent},
    tracking::TrackedDrone,
};

/// Botones de zoom del mapa.
pub fn zoom(ui: &Ui, map_memory: &mut MapMemory) {
    Window::new("Map")
        .collapsible(false)
        .resizable(false)
        .title_bar(false)
        .anchor(Align2::LEFT_BOTTOM, [10., -10.])
        .show(ui.ctx(), |ui| {
            ui.horizontal(|ui| {
                if ui.button(RichText::new("➕").heading()).clicked() {
                    let _ = map_memory.zoom_in();
                }

                if ui.button(RichText::new("➖").heading()).clicked() {
                    let _ = map_memory.zoom_out();
                }
            });
        });
}

/// Panel con el estado del drone seguido.
pub fn status_window(
    ui: &Ui,
    drone: &TrackedDrone,
    connection: &str,
    scene_status: &SceneStatus,
    last_event: Option<WidgetEvent>,
) {
    Window::new("Drone")
        .collapsible(false)
        .resizable(false)
        .title_bar(false)
        .anchor(Align2::RIGHT_TOP, [-10., 10.])
        .show(ui.ctx(), |ui| {
            ui.label(
                RichText::new(format!("Drone {}", drone.get_drone_id()))
                    .heading()
                    .color(Color32::WHITE),
            );
            ui.label(format!("Conexion: {}", connection));
            if drone.is_live_unavailable() {
                ui.label(
                    RichText::new("Seguimiento en vivo no disponible").color(Color32::RED),
                );
            }
            ui.label(format!("Mapa: {}", scene_status));

            match drone.last_location() {
                Some(location) => {
                    let point = location.get_point();
                    ui.label(format!(
                        "Posicion: {:.6}, {:.6}",
                        point.get_latitude(),
                        point.get_longitude()
                    ));
                    if let Some(staleness) = drone.staleness(Utc::now()) {
                        ui.label(format!("Ultima lectura: {}", staleness));
                    }
                }
                None if drone.is_missing() => {
                    ui.label(RichText::new("Sin lecturas para este drone").color(Color32::YELLOW));
                }
                None => {
                    ui.label("Esperando la primera lectura...");
                }
            }

            ui.label(format!("Distancia recorrida: {:.2} km", drone.distance_km()));
            ui.label(format!("Lecturas: {}", drone.updates()));

            if let Some(error) = drone.last_error() {
                ui.label(RichText::new(error).color(Color32::RED));
            }

            match last_event {
                Some(WidgetEvent::Clicked(point)) => {
                    ui.label(format!(
                        "Click: {:.4} {:.4}",
                        point.get_latitude(),
                        point.get_longitude()
                    ));
                }
                Some(WidgetEvent::MarkerClicked(kind)) => {
                    ui.label(format!("Marcador: {}", kind.label()));
                }
                None => {}
            }
        });
}
