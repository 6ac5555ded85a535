use std::{
    collections::HashMap,
    sync::{mpsc::Sender, Arc, Mutex},
};

use egui::{Color32, ColorImage, Pos2, Rect, Response, Stroke, TextureHandle, TextureOptions, Vec2};
use tracing::debug;
use walkers::{MapMemory, Plugin, Position, Projector};

use crate::utils::{
    location::{bounds_of, GeoPoint},
    sync::lock,
};

use super::{
    asset_loader::MapAssets,
    backend::{ListenerId, MapBackend, MarkerId, RouteId, WidgetId},
    scene::{ContainerId, MarkerKind, WidgetEvent},
    scene_error::SceneError,
};

const MARKER_SIZE: f32 = 28.0;
const CLICK_RADIUS: f32 = 16.0;
const MIN_ZOOM: f64 = 2.0;
const MAX_ZOOM: f64 = 18.0;
const TILE_SIZE: f64 = 256.0;

/// Pedido de movimiento de camara pendiente de aplicar en el proximo frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewRequest {
    Fit { points: Vec<GeoPoint>, padding: f32 },
    Pan(GeoPoint),
}

#[derive(Clone)]
struct MarkerLayer {
    kind: MarkerKind,
    point: GeoPoint,
}

struct WidgetLayers {
    container: ContainerId,
    assets: Arc<MapAssets>,
    markers: HashMap<MarkerId, MarkerLayer>,
    routes: HashMap<RouteId, Vec<GeoPoint>>,
    listeners: HashMap<ListenerId, Sender<WidgetEvent>>,
    view: Option<ViewRequest>,
}

#[derive(Default)]
struct BackendState {
    bindings: HashMap<ContainerId, WidgetId>,
    widgets: HashMap<WidgetId, WidgetLayers>,
    next_id: u64,
    widgets_created: usize,
}

impl BackendState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn widget(&mut self, widget: WidgetId) -> Result<&mut WidgetLayers, SceneError> {
        self.widgets
            .get_mut(&widget)
            .ok_or(SceneError::UnknownWidget(widget))
    }
}

/// `MapBackend` que guarda las capas de cada widget y las dibuja sobre un mapa de walkers.
///
/// El estado vive detras de un `Arc`, asi que clonar el backend lo comparte.
#[derive(Clone, Default)]
pub struct WalkersBackend {
    state: Arc<Mutex<BackendState>>,
    textures: Arc<Mutex<HashMap<(WidgetId, MarkerKind), TextureHandle>>>,
}

impl WalkersBackend {
    pub fn new() -> WalkersBackend {
        WalkersBackend::default()
    }

    /// Plugin con una foto de las capas del widget, para pasarle a `Map::with_plugin`.
    pub fn plugin(&self, widget: WidgetId) -> Option<ScenePlugin> {
        let state = lock(&self.state);
        let layers = state.widgets.get(&widget)?;

        let mut markers: Vec<(MarkerId, MarkerLayer)> = layers
            .markers
            .iter()
            .map(|(id, marker)| (*id, marker.clone()))
            .collect();
        markers.sort_by_key(|(id, _)| *id);

        Some(ScenePlugin {
            widget,
            assets: Arc::clone(&layers.assets),
            markers: markers.into_iter().map(|(_, marker)| marker).collect(),
            routes: layers.routes.values().cloned().collect(),
            listeners: layers.listeners.values().cloned().collect(),
            textures: Arc::clone(&self.textures),
        })
    }

    /// Saca el pedido de camara pendiente del widget, si hay.
    pub fn take_view_request(&self, widget: WidgetId) -> Option<ViewRequest> {
        lock(&self.state)
            .widgets
            .get_mut(&widget)
            .and_then(|layers| layers.view.take())
    }

    /// Aplica el pedido de camara pendiente sobre `memory`.
    pub fn apply_view(&self, widget: WidgetId, memory: &mut MapMemory, viewport: Vec2) {
        match self.take_view_request(widget) {
            Some(ViewRequest::Fit { points, padding }) => {
                if let Some((center, zoom)) = fit_view(&points, viewport, padding) {
                    memory.center_at(to_position(center));
                    if memory.set_zoom(zoom as f32).is_err() {
                        debug!(zoom, "zoom fuera de rango");
                    }
                }
            }
            Some(ViewRequest::Pan(point)) => memory.center_at(to_position(point)),
            None => {}
        }
    }

    pub fn widgets_created(&self) -> usize {
        lock(&self.state).widgets_created
    }

    pub fn live_widgets(&self) -> usize {
        lock(&self.state).widgets.len()
    }

    pub fn widget_for(&self, container: &ContainerId) -> Option<WidgetId> {
        lock(&self.state).bindings.get(container).copied()
    }

    pub fn marker_count(&self, widget: WidgetId) -> usize {
        lock(&self.state)
            .widgets
            .get(&widget)
            .map_or(0, |layers| layers.markers.len())
    }

    pub fn route_count(&self, widget: WidgetId) -> usize {
        lock(&self.state)
            .widgets
            .get(&widget)
            .map_or(0, |layers| layers.routes.len())
    }

    pub fn listener_count(&self, widget: WidgetId) -> usize {
        lock(&self.state)
            .widgets
            .get(&widget)
            .map_or(0, |layers| layers.listeners.len())
    }

    /// Puntos de la unica ruta del widget, si tiene exactamente una.
    pub fn route_points(&self, widget: WidgetId) -> Option<Vec<GeoPoint>> {
        let state = lock(&self.state);
        let layers = state.widgets.get(&widget)?;
        if layers.routes.len() != 1 {
            return None;
        }
        layers.routes.values().next().cloned()
    }

    /// Simula un click sobre el widget, como si viniera de la interfaz.
    pub fn emit(&self, widget: WidgetId, event: WidgetEvent) {
        let listeners: Vec<Sender<WidgetEvent>> = lock(&self.state)
            .widgets
            .get(&widget)
            .map(|layers| layers.listeners.values().cloned().collect())
            .unwrap_or_default();
        for listener in listeners {
            let _ = listener.send(event);
        }
    }
}

impl MapBackend for WalkersBackend {
    fn create_widget(&self, container: &ContainerId, assets: &Arc<MapAssets>) -> Result<WidgetId, SceneError> {
        let mut state = lock(&self.state);
        if state.bindings.contains_key(container) {
            return Err(SceneError::ContainerBusy(container.to_string()));
        }

        let widget = state.next_id();
        state.bindings.insert(container.clone(), widget);
        state.widgets.insert(
            widget,
            WidgetLayers {
                container: container.clone(),
                assets: Arc::clone(assets),
                markers: HashMap::new(),
                routes: HashMap::new(),
                listeners: HashMap::new(),
                view: None,
            },
        );
        state.widgets_created += 1;
        debug!(container = %container, widget, "widget creado");
        Ok(widget)
    }

    fn destroy_widget(&self, widget: WidgetId) {
        let mut state = lock(&self.state);
        if let Some(layers) = state.widgets.remove(&widget) {
            if state.bindings.get(&layers.container) == Some(&widget) {
                state.bindings.remove(&layers.container);
            }
            debug!(container = %layers.container, widget, "widget destruido");
        }
        lock(&self.textures).retain(|(owner, _), _| *owner != widget);
    }

    fn add_marker(&self, widget: WidgetId, kind: MarkerKind, point: GeoPoint) -> Result<MarkerId, SceneError> {
        let mut state = lock(&self.state);
        let marker = state.next_id();
        state.widget(widget)?.markers.insert(marker, MarkerLayer { kind, point });
        Ok(marker)
    }

    fn move_marker(&self, widget: WidgetId, marker: MarkerId, point: GeoPoint) -> Result<(), SceneError> {
        let mut state = lock(&self.state);
        match state.widget(widget)?.markers.get_mut(&marker) {
            Some(layer) => {
                layer.point = point;
                Ok(())
            }
            None => Err(SceneError::UnknownWidget(widget)),
        }
    }

    fn remove_marker(&self, widget: WidgetId, marker: MarkerId) {
        if let Ok(layers) = lock(&self.state).widget(widget) {
            layers.markers.remove(&marker);
        }
    }

    fn add_route(&self, widget: WidgetId, points: &[GeoPoint]) -> Result<RouteId, SceneError> {
        let mut state = lock(&self.state);
        let route = state.next_id();
        state.widget(widget)?.routes.insert(route, points.to_vec());
        Ok(route)
    }

    fn remove_route(&self, widget: WidgetId, route: RouteId) {
        if let Ok(layers) = lock(&self.state).widget(widget) {
            layers.routes.remove(&route);
        }
    }

    fn fit_bounds(&self, widget: WidgetId, points: &[GeoPoint], padding: f32) {
        if let Ok(layers) = lock(&self.state).widget(widget) {
            layers.view = Some(ViewRequest::Fit {
                points: points.to_vec(),
                padding,
            });
        }
    }

    fn pan_to(&self, widget: WidgetId, point: GeoPoint) {
        if let Ok(layers) = lock(&self.state).widget(widget) {
            layers.view = Some(ViewRequest::Pan(point));
        }
    }

    fn add_listener(&self, widget: WidgetId, events: Sender<WidgetEvent>) -> Result<ListenerId, SceneError> {
        let mut state = lock(&self.state);
        let listener = state.next_id();
        state.widget(widget)?.listeners.insert(listener, events);
        Ok(listener)
    }

    fn remove_listener(&self, widget: WidgetId, listener: ListenerId) {
        if let Ok(layers) = lock(&self.state).widget(widget) {
            layers.listeners.remove(&listener);
        }
    }

    fn release_container(&self, container: &ContainerId) {
        let mut state = lock(&self.state);
        if let Some(widget) = state.bindings.remove(container) {
            // un widget que sigue vivo sin contenedor no se puede volver a dibujar
            state.widgets.remove(&widget);
        }
    }
}

fn to_position(point: GeoPoint) -> Position {
    Position::from_lon_lat(point.get_longitude(), point.get_latitude())
}

fn to_geo_point(position: Position) -> Option<GeoPoint> {
    GeoPoint::new(position.lat(), position.lon()).ok()
}

fn marker_color(kind: MarkerKind) -> Color32 {
    match kind {
        MarkerKind::Start => Color32::from_rgb(34, 197, 94),
        MarkerKind::End => Color32::from_rgb(239, 68, 68),
        MarkerKind::Drone => Color32::from_rgb(59, 130, 246),
    }
}

/// Centro y zoom que encuadran `points` en un viewport de `viewport` pixeles.
pub fn fit_view(points: &[GeoPoint], viewport: Vec2, padding: f32) -> Option<(GeoPoint, f64)> {
    let (south_west, north_east) = bounds_of(points)?;
    let center = GeoPoint::new(
        (south_west.get_latitude() + north_east.get_latitude()) / 2.0,
        (south_west.get_longitude() + north_east.get_longitude()) / 2.0,
    )
    .ok()?;

    let width = (viewport.x - 2.0 * padding).max(1.0) as f64;
    let height = (viewport.y - 2.0 * padding).max(1.0) as f64;

    let lon_span = (north_east.get_longitude() - south_west.get_longitude()).abs();
    let lat_span = (mercator_y(north_east.get_latitude()) - mercator_y(south_west.get_latitude())).abs();

    // en zoom z el mundo mide TILE_SIZE * 2^z pixeles
    let zoom_x = if lon_span > 0.0 {
        (width * 360.0 / (TILE_SIZE * lon_span)).log2()
    } else {
        MAX_ZOOM
    };
    let zoom_y = if lat_span > 0.0 {
        (height * 2.0 * std::f64::consts::PI / (TILE_SIZE * lat_span)).log2()
    } else {
        MAX_ZOOM
    };

    Some((center, zoom_x.min(zoom_y).floor().clamp(MIN_ZOOM, MAX_ZOOM)))
}

fn mercator_y(latitude: f64) -> f64 {
    let lat = latitude.clamp(-85.0511, 85.0511).to_radians();
    (std::f64::consts::FRAC_PI_4 + lat / 2.0).tan().ln()
}

/// Dibuja las capas de un widget: la ruta, los marcadores y reenvia los clicks.
pub struct ScenePlugin {
    widget: WidgetId,
    assets: Arc<MapAssets>,
    markers: Vec<MarkerLayer>,
    routes: Vec<Vec<GeoPoint>>,
    listeners: Vec<Sender<WidgetEvent>>,
    textures: Arc<Mutex<HashMap<(WidgetId, MarkerKind), TextureHandle>>>,
}

impl ScenePlugin {
    fn texture(&self, ctx: &egui::Context, kind: MarkerKind) -> Option<TextureHandle> {
        let mut textures = lock(&self.textures);
        if let Some(texture) = textures.get(&(self.widget, kind)) {
            return Some(texture.clone());
        }
        let icon = self.assets.icon(kind)?;
        let image = ColorImage::from_rgba_unmultiplied(
            [icon.width as usize, icon.height as usize],
            &icon.rgba,
        );
        let texture = ctx.load_texture(
            format!("marker-{}-{:?}", self.widget, kind),
            image,
            TextureOptions::default(),
        );
        textures.insert((self.widget, kind), texture.clone());
        Some(texture)
    }

    fn marker_at(&self, screen: Pos2, projector: &Projector) -> Option<MarkerKind> {
        self.markers
            .iter()
            .rev()
            .find(|marker| {
                let at = projector.project(to_position(marker.point)).to_pos2();
                at.distance(screen) <= CLICK_RADIUS
            })
            .map(|marker| marker.kind)
    }

    fn notify(&self, event: WidgetEvent) {
        for listener in &self.listeners {
            let _ = listener.send(event);
        }
    }
}

impl Plugin for ScenePlugin {
    fn run(&mut self, response: &Response, painter: egui::Painter, projector: &Projector) {
        let has_drone = self.markers.iter().any(|m| m.kind == MarkerKind::Drone);
        let route_color = if has_drone {
            Color32::from_rgb(59, 130, 246)
        } else {
            Color32::from_rgb(107, 114, 128)
        };
        for route in &self.routes {
            let screen: Vec<Pos2> = route
                .iter()
                .map(|point| projector.project(to_position(*point)).to_pos2())
                .collect();
            for pair in screen.windows(2) {
                painter.line_segment([pair[0], pair[1]], Stroke::new(3.0, route_color));
            }
        }

        for marker in &self.markers {
            let at = projector.project(to_position(marker.point)).to_pos2();
            match self.texture(painter.ctx(), marker.kind) {
                Some(texture) => {
                    let rect = Rect::from_center_size(at, Vec2::splat(MARKER_SIZE));
                    painter.image(
                        texture.id(),
                        rect,
                        Rect::from_min_max(Pos2::new(0.0, 0.0), Pos2::new(1.0, 1.0)),
                        Color32::WHITE,
                    );
                }
                None => {
                    painter.circle_filled(at, MARKER_SIZE / 2.0, marker_color(marker.kind));
                }
            }
        }

        if !response.changed() && response.clicked_by(egui::PointerButton::Primary) {
            if let Some(screen) = response.interact_pointer_pos() {
                match self.marker_at(screen, projector) {
                    Some(kind) => self.notify(WidgetEvent::MarkerClicked(kind)),
                    None => {
                        let position = projector.unproject(screen - response.rect.center());
                        if let Some(point) = to_geo_point(position) {
                            self.notify(WidgetEvent::Clicked(point));
                        }
                    }
                }
            }
        }
    }
}
