pub mod asset_loader;
pub mod backend;
pub mod controller;
pub mod scene;
pub mod scene_error;
pub mod walkers_backend;

pub use asset_loader::{AssetSource, HttpAssetSource, IconUrls, MapAssets, MarkerIcon, SharedAssetLoader, StaticAssetSource};
pub use backend::{MapBackend, FIT_PADDING};
pub use controller::{MapSceneController, SceneHandle, SceneStatus};
pub use scene::{ContainerId, MapScene, MarkerKind, WidgetEvent};
pub use scene_error::SceneError;
pub use walkers_backend::{fit_view, ScenePlugin, ViewRequest, WalkersBackend};
