use std::sync::{mpsc::Sender, Arc};

use crate::utils::location::GeoPoint;

use super::{
    asset_loader::MapAssets,
    scene::{ContainerId, MarkerKind, WidgetEvent},
    scene_error::SceneError,
};

pub type WidgetId = u64;
pub type MarkerId = u64;
pub type RouteId = u64;
pub type ListenerId = u64;

/// Padding en pixeles al encuadrar los marcadores.
pub const FIT_PADDING: f32 = 50.0;

/// Operaciones que el controlador necesita de la libreria de mapas.
///
/// Un contenedor solo puede tener un widget vivo. `release_container` borra
/// cualquier rastro que haya dejado el widget para poder reusar el contenedor.
pub trait MapBackend: Send + Sync {
    fn create_widget(&self, container: &ContainerId, assets: &Arc<MapAssets>) -> Result<WidgetId, SceneError>;

    fn destroy_widget(&self, widget: WidgetId);

    fn add_marker(&self, widget: WidgetId, kind: MarkerKind, point: GeoPoint) -> Result<MarkerId, SceneError>;

    fn move_marker(&self, widget: WidgetId, marker: MarkerId, point: GeoPoint) -> Result<(), SceneError>;

    fn remove_marker(&self, widget: WidgetId, marker: MarkerId);

    fn add_route(&self, widget: WidgetId, points: &[GeoPoint]) -> Result<RouteId, SceneError>;

    fn remove_route(&self, widget: WidgetId, route: RouteId);

    fn fit_bounds(&self, widget: WidgetId, points: &[GeoPoint], padding: f32);

    fn pan_to(&self, widget: WidgetId, point: GeoPoint);

    fn add_listener(&self, widget: WidgetId, events: Sender<WidgetEvent>) -> Result<ListenerId, SceneError>;

    fn remove_listener(&self, widget: WidgetId, listener: ListenerId);

    fn release_container(&self, container: &ContainerId);
}
