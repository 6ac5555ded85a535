mod scene_sink;
mod windows;

use std::{env, sync::mpsc::Receiver, sync::Arc, thread};

use eframe::{run_native, App, CreationContext, NativeOptions};
use egui::CentralPanel;
use tracing::{error, info, warn};
use walkers::{sources::OpenStreetMap, HttpTiles, Map, MapMemory, Position, Tiles};

use drone_tracker::{
    channel::{RealtimeClient, StompTransport},
    config::{TrackerConfig, TrackingMode},
    gateway::HttpLocationGateway,
    logging::{init_logging, DEFAULT_FILTER},
    map::{
        AssetSource, ContainerId, HttpAssetSource, MapAssets, MapBackend, MapSceneController,
        SceneHandle, SharedAssetLoader, StaticAssetSource, WalkersBackend, WidgetEvent,
    },
    polling::{PollHandle, PollingTracker},
    tracking::{DroneTracker, SharedTrackedDrone, TrackHandle},
    utils::location::GeoPoint,
};

use scene_sink::SceneSink;
use windows::{status_window, zoom};

const DEFAULT_CONFIG_PATH: &str = "./config/tracker_config.json";
const DEFAULT_DRONE_ID: &str = "drone-1";
const MAP_CONTAINER: &str = "tracker-map";

/// De donde salen las lecturas del drone.
enum Feed {
    Realtime {
        tracker: DroneTracker,
        handle: TrackHandle,
    },
    Polling {
        _poller: PollingTracker,
        handle: PollHandle,
    },
    Idle(String),
}

impl Feed {
    fn connection(&self) -> String {
        match self {
            Feed::Realtime { tracker, handle } => {
                format!("{} ({})", tracker.client().state(), handle.state())
            }
            Feed::Polling { handle, .. } => {
                format!("polling cada {} ms", handle.interval().as_millis())
            }
            Feed::Idle(reason) => reason.clone(),
        }
    }

    fn stop(&self) {
        match self {
            Feed::Realtime { tracker, handle } => {
                handle.stop();
                // el reader de la sesion retiene al cliente hasta el disconnect
                tracker.client().disconnect();
            }
            Feed::Polling { handle, .. } => handle.stop(),
            Feed::Idle(_) => {}
        }
    }
}

struct TrackerApp {
    tiles: Box<dyn Tiles>,
    map_memory: MapMemory,
    backend: Arc<WalkersBackend>,
    controller: Arc<MapSceneController>,
    scene: SceneHandle,
    events: Option<Receiver<WidgetEvent>>,
    last_event: Option<WidgetEvent>,
    tracked: SharedTrackedDrone,
    feed: Feed,
    home: Position,
}

impl TrackerApp {
    fn drain_events(&mut self) {
        if let Some(events) = &self.events {
            while let Ok(event) = events.try_recv() {
                info!(?event, "evento del mapa");
                self.last_event = Some(event);
            }
        }
    }
}

impl App for TrackerApp {
    fn update(&mut self, ctx: &eframe::egui::Context, _frame: &mut eframe::Frame) {
        self.drain_events();

        CentralPanel::default().show(ctx, |ui| {
            let widget = self.scene.widget_id();
            if let Some(widget) = widget {
                self.backend
                    .apply_view(widget, &mut self.map_memory, ui.available_size());
            }

            let tiles_ref: &mut dyn Tiles = &mut *self.tiles;
            let map = Map::new(Some(tiles_ref), &mut self.map_memory, self.home);
            match widget.and_then(|widget| self.backend.plugin(widget)) {
                Some(plugin) => ui.add(map.with_plugin(plugin)),
                None => ui.add(map),
            };

            zoom(ui, &mut self.map_memory);
            status_window(
                ui,
                &self.tracked.snapshot(),
                &self.feed.connection(),
                &self.scene.status(),
                self.last_event,
            );
        });
    }
}

impl Drop for TrackerApp {
    fn drop(&mut self) {
        self.feed.stop();
        self.controller.destroy_scene(&self.scene);
    }
}

fn asset_source(config: &TrackerConfig) -> Arc<dyn AssetSource> {
    match HttpAssetSource::new(config.icons.clone(), config.http_timeout()) {
        Ok(source) => Arc::new(source),
        Err(e) => {
            warn!("se usan iconos por defecto: {}", e);
            Arc::new(StaticAssetSource::new(MapAssets::placeholder()))
        }
    }
}

fn start_feed(config: &TrackerConfig, drone_id: &str, sink: Arc<SceneSink>) -> Feed {
    match config.mode {
        TrackingMode::Realtime => {
            let transport = Arc::new(StompTransport::new(config.stomp_config()));
            let client = RealtimeClient::new(transport, config.reconnect_policy());

            // termina cuando se libera el cliente
            let states = client.watch_state();
            let tracked = sink.tracked.clone();
            let ctx = sink.ctx.clone();
            thread::spawn(move || {
                for state in states {
                    tracked.set_link(state);
                    ctx.request_repaint();
                }
            });

            let tracker = DroneTracker::new(client, &config.topic_prefix);
            let handle = tracker.track(drone_id, sink);
            Feed::Realtime { tracker, handle }
        }
        TrackingMode::Polling => {
            match HttpLocationGateway::new(&config.api_base_url, config.http_timeout()) {
                Ok(gateway) => {
                    let poller = PollingTracker::new(Arc::new(gateway));
                    let handle = poller.start_polling(drone_id, config.poll_interval(), sink);
                    Feed::Polling {
                        _poller: poller,
                        handle,
                    }
                }
                Err(e) => {
                    error!("no se pudo crear el cliente HTTP: {}", e);
                    Feed::Idle(e.to_string())
                }
            }
        }
    }
}

/// Arma la escena, el sink y la fuente de lecturas a partir de la configuracion.
fn create_tracker_app(
    cc: &CreationContext<'_>,
    config: TrackerConfig,
    drone_id: String,
    (start, end): (GeoPoint, GeoPoint),
) -> Box<dyn App> {
    let source = asset_source(&config);
    let loader = SharedAssetLoader::process_wide(move || source);
    let backend = Arc::new(WalkersBackend::new());
    let controller = Arc::new(MapSceneController::new(
        loader,
        Arc::clone(&backend) as Arc<dyn MapBackend>,
    ));

    let scene = controller.create_scene(&ContainerId::new(MAP_CONTAINER), start, end);
    let events = controller.take_events(&scene);

    let tracked = SharedTrackedDrone::new(&drone_id);
    let sink = Arc::new(SceneSink {
        tracked: tracked.clone(),
        controller: Arc::clone(&controller),
        scene: scene.clone(),
        ctx: cc.egui_ctx.clone(),
    });
    let feed = start_feed(&config, &drone_id, sink);

    let tiles = Box::new(HttpTiles::new(OpenStreetMap, cc.egui_ctx.clone()));

    Box::new(TrackerApp {
        tiles,
        map_memory: MapMemory::default(),
        backend,
        controller,
        scene,
        events,
        last_event: None,
        tracked,
        feed,
        home: Position::from_lon_lat(start.get_longitude(), start.get_latitude()),
    })
}

/// Uso: tracker_viewer [drone_id] [config.json]
fn main() {
    init_logging(DEFAULT_FILTER);

    let args: Vec<String> = env::args().collect();
    let drone_id = args
        .get(1)
        .cloned()
        .unwrap_or_else(|| DEFAULT_DRONE_ID.to_string());
    let config_path = args
        .get(2)
        .cloned()
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let config = match TrackerConfig::from_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            warn!("{}, se usa la configuracion por defecto", e);
            TrackerConfig::default()
        }
    };
    let route = match config.route_points() {
        Ok(route) => route,
        Err(e) => {
            eprintln!("Error: {}", e);
            return;
        }
    };
    info!(drone_id = %drone_id, mode = ?config.mode, "iniciando visor");

    let app_name = "Drone Tracker";
    let win_options = NativeOptions {
        ..Default::default()
    };
    if let Err(e) = run_native(
        app_name,
        win_options,
        Box::new(move |cc| Ok(create_tracker_app(cc, config, drone_id, route))),
    ) {
        eprintln!("Error: {}", e);
    }
}
