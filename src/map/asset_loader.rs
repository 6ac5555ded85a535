use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Condvar, Mutex, OnceLock,
    },
    time::Duration,
};

use image::{Rgba, RgbaImage};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::utils::sync::{lock, wait};

use super::{scene::MarkerKind, scene_error::SceneError};

const ICON_BASE: &str = "https://raw.githubusercontent.com/pointhi/leaflet-color-markers/master/img";

/// URLs de los iconos de los marcadores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IconUrls {
    #[serde(default = "default_start_icon")]
    pub start: String,
    #[serde(default = "default_end_icon")]
    pub end: String,
    #[serde(default = "default_drone_icon")]
    pub drone: String,
}

fn default_start_icon() -> String {
    format!("{}/marker-icon-2x-green.png", ICON_BASE)
}

fn default_end_icon() -> String {
    format!("{}/marker-icon-2x-red.png", ICON_BASE)
}

fn default_drone_icon() -> String {
    format!("{}/marker-icon-2x-blue.png", ICON_BASE)
}

impl Default for IconUrls {
    fn default() -> Self {
        IconUrls {
            start: default_start_icon(),
            end: default_end_icon(),
            drone: default_drone_icon(),
        }
    }
}

/// Icono ya decodificado a RGBA.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerIcon {
    pub width: u32,
    pub height: u32,
    pub rgba: Arc<Vec<u8>>,
}

impl MarkerIcon {
    pub fn decode(bytes: &[u8]) -> Result<MarkerIcon, SceneError> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| SceneError::AssetLoad(e.to_string()))?
            .to_rgba8();
        Ok(MarkerIcon::from_image(image))
    }

    fn from_image(image: RgbaImage) -> MarkerIcon {
        MarkerIcon {
            width: image.width(),
            height: image.height(),
            rgba: Arc::new(image.into_raw()),
        }
    }

    /// Circulo de un color, para cuando no hay red.
    pub fn circle(color: [u8; 3], size: u32) -> MarkerIcon {
        let center = size as f32 / 2.0;
        let radius = center - 1.0;
        let image = RgbaImage::from_fn(size, size, |x, y| {
            let dx = x as f32 + 0.5 - center;
            let dy = y as f32 + 0.5 - center;
            if dx * dx + dy * dy <= radius * radius {
                Rgba([color[0], color[1], color[2], 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        });
        MarkerIcon::from_image(image)
    }
}

/// Recursos que necesita un widget de mapa antes de poder crearse.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapAssets {
    icons: HashMap<MarkerKind, MarkerIcon>,
}

impl MapAssets {
    pub fn new() -> MapAssets {
        MapAssets::default()
    }

    pub fn with_icon(mut self, kind: MarkerKind, icon: MarkerIcon) -> MapAssets {
        self.icons.insert(kind, icon);
        self
    }

    pub fn icon(&self, kind: MarkerKind) -> Option<&MarkerIcon> {
        self.icons.get(&kind)
    }

    /// Iconos circulares verde, rojo y azul.
    pub fn placeholder() -> MapAssets {
        MapAssets::new()
            .with_icon(MarkerKind::Start, MarkerIcon::circle([34, 197, 94], 24))
            .with_icon(MarkerKind::End, MarkerIcon::circle([239, 68, 68], 24))
            .with_icon(MarkerKind::Drone, MarkerIcon::circle([59, 130, 246], 24))
    }
}

/// De donde salen los recursos del mapa.
pub trait AssetSource: Send + Sync {
    fn load(&self) -> Result<MapAssets, SceneError>;
}

/// Descarga los iconos por HTTP.
pub struct HttpAssetSource {
    urls: IconUrls,
    http: Client,
}

impl HttpAssetSource {
    pub fn new(urls: IconUrls, timeout: Duration) -> Result<HttpAssetSource, SceneError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SceneError::AssetLoad(e.to_string()))?;
        Ok(HttpAssetSource { urls, http })
    }

    fn fetch(&self, url: &str) -> Result<MarkerIcon, SceneError> {
        let response = self
            .http
            .get(url)
            .send()
            .map_err(|e| SceneError::AssetLoad(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SceneError::AssetLoad(format!(
                "{} respondio {}",
                url,
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .map_err(|e| SceneError::AssetLoad(e.to_string()))?;
        MarkerIcon::decode(&bytes)
    }
}

impl AssetSource for HttpAssetSource {
    fn load(&self) -> Result<MapAssets, SceneError> {
        let mut assets = MapAssets::new();
        for (kind, url) in [
            (MarkerKind::Start, &self.urls.start),
            (MarkerKind::End, &self.urls.end),
            (MarkerKind::Drone, &self.urls.drone),
        ] {
            debug!(url = %url, "descargando icono");
            assets = assets.with_icon(kind, self.fetch(url)?);
        }
        Ok(assets)
    }
}

/// Recursos fijos en memoria.
pub struct StaticAssetSource {
    assets: MapAssets,
}

impl StaticAssetSource {
    pub fn new(assets: MapAssets) -> StaticAssetSource {
        StaticAssetSource { assets }
    }
}

impl AssetSource for StaticAssetSource {
    fn load(&self) -> Result<MapAssets, SceneError> {
        Ok(self.assets.clone())
    }
}

enum Phase {
    Idle,
    Loading,
    Loaded(Arc<MapAssets>),
}

struct LoaderState {
    phase: Phase,
    attempt: u64,
    last_error: Option<SceneError>,
}

/// Cargador perezoso de los recursos del mapa, compartido por todas las escenas.
///
/// Carga a lo sumo una vez. Quien llama mientras hay una carga en curso espera
/// esa misma carga. Si falla, todos los que esperaban reciben el error y el
/// cargador vuelve a quedar libre para reintentar.
pub struct SharedAssetLoader {
    source: Arc<dyn AssetSource>,
    state: Mutex<LoaderState>,
    changed: Condvar,
    loads: AtomicUsize,
}

static PROCESS_LOADER: OnceLock<Arc<SharedAssetLoader>> = OnceLock::new();

impl SharedAssetLoader {
    pub fn new(source: Arc<dyn AssetSource>) -> SharedAssetLoader {
        SharedAssetLoader {
            source,
            state: Mutex::new(LoaderState {
                phase: Phase::Idle,
                attempt: 0,
                last_error: None,
            }),
            changed: Condvar::new(),
            loads: AtomicUsize::new(0),
        }
    }

    /// Cargador unico del proceso. `source` solo se usa en la primera llamada.
    pub fn process_wide<F>(source: F) -> Arc<SharedAssetLoader>
    where
        F: FnOnce() -> Arc<dyn AssetSource>,
    {
        Arc::clone(PROCESS_LOADER.get_or_init(|| Arc::new(SharedAssetLoader::new(source()))))
    }

    pub fn load(&self) -> Result<Arc<MapAssets>, SceneError> {
        let mut state = lock(&self.state);
        if let Phase::Loaded(assets) = &state.phase {
            return Ok(Arc::clone(assets));
        }
        if matches!(state.phase, Phase::Loading) {
            let attempt = state.attempt;
            while matches!(state.phase, Phase::Loading) && state.attempt == attempt {
                state = wait(&self.changed, state);
            }
            return match &state.phase {
                Phase::Loaded(assets) => Ok(Arc::clone(assets)),
                _ => Err(state
                    .last_error
                    .clone()
                    .unwrap_or_else(|| SceneError::AssetLoad("carga fallida".to_string()))),
            };
        }

        state.phase = Phase::Loading;
        state.attempt += 1;
        drop(state);

        self.loads.fetch_add(1, Ordering::SeqCst);
        info!("cargando recursos del mapa");
        let result = self.source.load();

        let mut state = lock(&self.state);
        let outcome = match result {
            Ok(assets) => {
                let assets = Arc::new(assets);
                state.phase = Phase::Loaded(Arc::clone(&assets));
                state.last_error = None;
                Ok(assets)
            }
            Err(e) => {
                warn!("fallo la carga de recursos del mapa: {}", e);
                state.phase = Phase::Idle;
                state.last_error = Some(e.clone());
                Err(e)
            }
        };
        self.changed.notify_all();
        outcome
    }

    pub fn is_loaded(&self) -> bool {
        matches!(lock(&self.state).phase, Phase::Loaded(_))
    }

    /// Cantidad de veces que se consulto a la fuente.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{thread, time::Duration};

    struct SlowSource {
        delay: Duration,
        fail_first: AtomicUsize,
    }

    impl AssetSource for SlowSource {
        fn load(&self) -> Result<MapAssets, SceneError> {
            thread::sleep(self.delay);
            if self.fail_first.load(Ordering::SeqCst) > 0 {
                self.fail_first.fetch_sub(1, Ordering::SeqCst);
                return Err(SceneError::AssetLoad("sin red".to_string()));
            }
            Ok(MapAssets::placeholder())
        }
    }

    #[test]
    fn test_01_concurrent_callers_share_one_load() {
        let loader = Arc::new(SharedAssetLoader::new(Arc::new(SlowSource {
            delay: Duration::from_millis(100),
            fail_first: AtomicUsize::new(0),
        })));

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let loader = Arc::clone(&loader);
                thread::spawn(move || loader.load().is_ok())
            })
            .collect();
        for worker in workers {
            assert!(worker.join().unwrap());
        }

        assert_eq!(loader.loads(), 1);
        assert!(loader.is_loaded());
        loader.load().unwrap();
        assert_eq!(loader.loads(), 1);
    }

    #[test]
    fn test_02_failure_reaches_waiters_and_allows_retry() {
        let loader = Arc::new(SharedAssetLoader::new(Arc::new(SlowSource {
            delay: Duration::from_millis(100),
            fail_first: AtomicUsize::new(1),
        })));

        let waiter = {
            let loader = Arc::clone(&loader);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                loader.load()
            })
        };
        let first = loader.load();
        let second = waiter.join().unwrap();

        assert_eq!(first, Err(SceneError::AssetLoad("sin red".to_string())));
        assert_eq!(second, Err(SceneError::AssetLoad("sin red".to_string())));
        assert!(!loader.is_loaded());

        assert!(loader.load().is_ok());
        assert_eq!(loader.loads(), 2);
    }

    #[test]
    fn test_03_placeholder_icons() {
        let assets = MapAssets::placeholder();
        let icon = assets.icon(MarkerKind::Drone).unwrap();
        assert_eq!((icon.width, icon.height), (24, 24));
        assert_eq!(icon.rgba.len(), 24 * 24 * 4);
    }

    #[test]
    fn test_04_decode_rejects_garbage() {
        assert!(matches!(
            MarkerIcon::decode(b"no es una imagen"),
            Err(SceneError::AssetLoad(_))
        ));
    }
}
