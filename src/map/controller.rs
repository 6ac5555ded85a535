use std::{
    collections::HashMap,
    fmt,
    sync::{
        mpsc::{self, Receiver, Sender},
        Arc, Condvar, Mutex,
    },
    time::Duration,
};

use threadpool::ThreadPool;
use tracing::{debug, info, warn};

use crate::utils::{
    location::GeoPoint,
    sync::{lock, wait_while_for},
};

use super::{
    asset_loader::{MapAssets, SharedAssetLoader},
    backend::{ListenerId, MapBackend, MarkerId, RouteId, WidgetId, FIT_PADDING},
    scene::{ContainerId, MapScene, MarkerKind, WidgetEvent},
    scene_error::SceneError,
};

const DEFAULT_WORKERS: usize = 2;

/// Estado de vida de una escena.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneStatus {
    Initializing,
    Ready,
    Failed(SceneError),
    Destroyed,
}

impl SceneStatus {
    fn is_live(&self) -> bool {
        matches!(self, SceneStatus::Initializing | SceneStatus::Ready)
    }
}

impl fmt::Display for SceneStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SceneStatus::Initializing => write!(f, "inicializando"),
            SceneStatus::Ready => write!(f, "lista"),
            SceneStatus::Failed(e) => write!(f, "fallida ({})", e),
            SceneStatus::Destroyed => write!(f, "destruida"),
        }
    }
}

struct SceneState {
    status: SceneStatus,
    scene: MapScene,
    widget: Option<WidgetId>,
    start_marker: Option<MarkerId>,
    end_marker: Option<MarkerId>,
    drone_marker: Option<MarkerId>,
    route: Option<RouteId>,
    listener: Option<ListenerId>,
    events_sender: Option<Sender<WidgetEvent>>,
    events: Option<Receiver<WidgetEvent>>,
}

struct SceneSlot {
    container: ContainerId,
    state: Mutex<SceneState>,
    changed: Condvar,
}

/// Referencia opaca a una escena. Todos los ids del widget quedan dentro del controlador.
#[derive(Clone)]
pub struct SceneHandle {
    slot: Arc<SceneSlot>,
}

impl SceneHandle {
    pub fn container(&self) -> &ContainerId {
        &self.slot.container
    }

    pub fn status(&self) -> SceneStatus {
        lock(&self.slot.state).status.clone()
    }

    pub fn is_ready(&self) -> bool {
        lock(&self.slot.state).status == SceneStatus::Ready
    }

    /// Widget que dibuja la escena, solo mientras esta lista.
    pub fn widget_id(&self) -> Option<WidgetId> {
        let state = lock(&self.slot.state);
        match state.status {
            SceneStatus::Ready => state.widget,
            _ => None,
        }
    }

    /// Espera el resultado de la creacion.
    pub fn wait_ready(&self, timeout: Duration) -> Result<(), SceneError> {
        let state = lock(&self.slot.state);
        let (state, _timed_out) = wait_while_for(&self.slot.changed, state, timeout, |s| {
            s.status == SceneStatus::Initializing
        });
        match &state.status {
            SceneStatus::Ready => Ok(()),
            SceneStatus::Failed(e) => Err(e.clone()),
            SceneStatus::Destroyed => Err(SceneError::Destroyed),
            SceneStatus::Initializing => Err(SceneError::Timeout),
        }
    }

    /// `true` si ambos handles apuntan a la misma escena.
    pub fn same_scene(&self, other: &SceneHandle) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

/// Crea, actualiza y destruye escenas de mapa, a lo sumo una por contenedor.
///
/// La carga de recursos y la creacion del widget corren en un pool de threads.
/// Las operaciones sobre una escena destruida no hacen nada.
pub struct MapSceneController {
    loader: Arc<SharedAssetLoader>,
    backend: Arc<dyn MapBackend>,
    pool: Mutex<ThreadPool>,
    containers: Arc<Mutex<HashMap<ContainerId, SceneHandle>>>,
}

impl MapSceneController {
    pub fn new(loader: Arc<SharedAssetLoader>, backend: Arc<dyn MapBackend>) -> MapSceneController {
        MapSceneController::with_workers(loader, backend, DEFAULT_WORKERS)
    }

    pub fn with_workers(
        loader: Arc<SharedAssetLoader>,
        backend: Arc<dyn MapBackend>,
        workers: usize,
    ) -> MapSceneController {
        MapSceneController {
            loader,
            backend,
            pool: Mutex::new(ThreadPool::new(workers.max(1))),
            containers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Crea la escena para `container` sin bloquear.
    ///
    /// Si el contenedor ya tiene una escena viva o en creacion, devuelve esa misma.
    pub fn create_scene(&self, container: &ContainerId, start: GeoPoint, end: GeoPoint) -> SceneHandle {
        let mut containers = lock(&self.containers);
        if let Some(existing) = containers.get(container) {
            if lock(&existing.slot.state).status.is_live() {
                debug!(container = %container, "la escena ya existe");
                return existing.clone();
            }
        }

        let (events_sender, events) = mpsc::channel();
        let slot = Arc::new(SceneSlot {
            container: container.clone(),
            state: Mutex::new(SceneState {
                status: SceneStatus::Initializing,
                scene: MapScene::new(start, end),
                widget: None,
                start_marker: None,
                end_marker: None,
                drone_marker: None,
                route: None,
                listener: None,
                events_sender: Some(events_sender),
                events: Some(events),
            }),
            changed: Condvar::new(),
        });
        let handle = SceneHandle {
            slot: Arc::clone(&slot),
        };
        containers.insert(container.clone(), handle.clone());
        drop(containers);

        let loader = Arc::clone(&self.loader);
        let backend = Arc::clone(&self.backend);
        let containers = Arc::clone(&self.containers);
        lock(&self.pool).execute(move || run_create(loader, backend, containers, slot));

        info!(container = %container, "creando escena");
        handle
    }

    /// Actualiza la posicion del drone en la escena.
    ///
    /// Antes de que la escena este lista solo se guarda el punto. Despues de
    /// destruida no hace nada.
    pub fn update_current_point(
        &self,
        handle: &SceneHandle,
        point: Option<GeoPoint>,
    ) -> Result<(), SceneError> {
        let mut state = lock(&handle.slot.state);
        match state.status {
            SceneStatus::Initializing => {
                state.scene = state.scene.with_current_point(point);
                Ok(())
            }
            SceneStatus::Ready => apply_current_point(self.backend.as_ref(), &mut state, point),
            _ => {
                debug!(container = %handle.slot.container, "actualizacion descartada: escena inactiva");
                Ok(())
            }
        }
    }

    /// Destruye la escena. Llamarlo mas de una vez no tiene efecto.
    pub fn destroy_scene(&self, handle: &SceneHandle) {
        {
            let mut containers = lock(&self.containers);
            let owned = containers
                .get(&handle.slot.container)
                .is_some_and(|current| current.same_scene(handle));
            if owned {
                containers.remove(&handle.slot.container);
            }
        }

        let mut state = lock(&handle.slot.state);
        if state.status == SceneStatus::Destroyed {
            return;
        }
        let had_widget = state.widget.is_some();
        state.status = SceneStatus::Destroyed;
        teardown(self.backend.as_ref(), &handle.slot.container, &mut state);
        state.events_sender = None;
        handle.slot.changed.notify_all();

        if had_widget {
            info!(container = %handle.slot.container, "escena destruida");
        } else {
            debug!(container = %handle.slot.container, "escena destruida antes de estar lista");
        }
    }

    pub fn destroy_all(&self) {
        let handles: Vec<SceneHandle> = lock(&self.containers).values().cloned().collect();
        for handle in handles {
            self.destroy_scene(&handle);
        }
    }

    /// Extremo receptor de los eventos del widget. Solo se entrega una vez.
    pub fn take_events(&self, handle: &SceneHandle) -> Option<Receiver<WidgetEvent>> {
        lock(&handle.slot.state).events.take()
    }

    pub fn current_scene(&self, handle: &SceneHandle) -> MapScene {
        lock(&handle.slot.state).scene
    }

    pub fn scene_for(&self, container: &ContainerId) -> Option<SceneHandle> {
        lock(&self.containers).get(container).cloned()
    }

    /// Espera a que terminen todos los trabajos de creacion encolados.
    pub fn wait_idle(&self) {
        lock(&self.pool).join();
    }
}

impl Drop for MapSceneController {
    fn drop(&mut self) {
        self.destroy_all();
    }
}

fn run_create(
    loader: Arc<SharedAssetLoader>,
    backend: Arc<dyn MapBackend>,
    containers: Arc<Mutex<HashMap<ContainerId, SceneHandle>>>,
    slot: Arc<SceneSlot>,
) {
    let loaded = loader.load();

    let mut state = lock(&slot.state);
    if state.status != SceneStatus::Initializing {
        debug!(container = %slot.container, "creacion descartada: la escena ya no existe");
        return;
    }

    let outcome = loaded.and_then(|assets| build(backend.as_ref(), &slot.container, &assets, &mut state));
    let failed = match outcome {
        Ok(()) => {
            state.status = SceneStatus::Ready;
            info!(container = %slot.container, "escena lista");
            false
        }
        Err(e) => {
            warn!(container = %slot.container, "fallo la creacion de la escena: {}", e);
            teardown(backend.as_ref(), &slot.container, &mut state);
            state.events_sender = None;
            state.status = SceneStatus::Failed(e);
            true
        }
    };
    slot.changed.notify_all();
    drop(state);

    if failed {
        let mut containers = lock(&containers);
        let owned = containers
            .get(&slot.container)
            .is_some_and(|current| Arc::ptr_eq(&current.slot, &slot));
        if owned {
            containers.remove(&slot.container);
        }
    }
}

fn build(
    backend: &dyn MapBackend,
    container: &ContainerId,
    assets: &Arc<MapAssets>,
    state: &mut SceneState,
) -> Result<(), SceneError> {
    let widget = backend.create_widget(container, assets)?;
    state.widget = Some(widget);

    let scene = state.scene;
    state.start_marker = Some(backend.add_marker(widget, MarkerKind::Start, scene.get_start_point())?);
    state.end_marker = Some(backend.add_marker(widget, MarkerKind::End, scene.get_end_point())?);
    if let Some(current) = scene.get_current_point() {
        state.drone_marker = Some(backend.add_marker(widget, MarkerKind::Drone, current)?);
    }
    state.route = Some(backend.add_route(widget, &scene.route_segments())?);

    if let Some(sender) = &state.events_sender {
        state.listener = Some(backend.add_listener(widget, sender.clone())?);
    }

    backend.fit_bounds(widget, &scene.marker_points(), FIT_PADDING);
    Ok(())
}

fn apply_current_point(
    backend: &dyn MapBackend,
    state: &mut SceneState,
    point: Option<GeoPoint>,
) -> Result<(), SceneError> {
    let widget = match state.widget {
        Some(widget) => widget,
        None => return Ok(()),
    };
    let had_drone = state.drone_marker.is_some();
    state.scene = state.scene.with_current_point(point);

    match (state.drone_marker, point) {
        (Some(marker), Some(point)) => backend.move_marker(widget, marker, point)?,
        (None, Some(point)) => {
            state.drone_marker = Some(backend.add_marker(widget, MarkerKind::Drone, point)?);
        }
        (Some(marker), None) => {
            backend.remove_marker(widget, marker);
            state.drone_marker = None;
        }
        (None, None) => {}
    }

    if let Some(route) = state.route.take() {
        backend.remove_route(widget, route);
    }
    state.route = Some(backend.add_route(widget, &state.scene.route_segments())?);

    if had_drone != point.is_some() {
        backend.fit_bounds(widget, &state.scene.marker_points(), FIT_PADDING);
    } else if let Some(point) = point {
        backend.pan_to(widget, point);
    }
    Ok(())
}

fn teardown(backend: &dyn MapBackend, container: &ContainerId, state: &mut SceneState) {
    let widget = match state.widget.take() {
        Some(widget) => widget,
        None => return,
    };

    if let Some(listener) = state.listener.take() {
        backend.remove_listener(widget, listener);
    }
    for marker in [
        state.start_marker.take(),
        state.end_marker.take(),
        state.drone_marker.take(),
    ]
    .into_iter()
    .flatten()
    {
        backend.remove_marker(widget, marker);
    }
    if let Some(route) = state.route.take() {
        backend.remove_route(widget, route);
    }
    // primero se libera el contenedor y despues el widget, asi otra escena
    // no puede quedar pegada al binding viejo
    backend.release_container(container);
    backend.destroy_widget(widget);
}
