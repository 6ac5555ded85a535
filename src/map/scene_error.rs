use thiserror::Error;

/// Errores del controlador de escenas de mapa.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SceneError {
    #[error("Error al cargar los recursos del mapa: {0}")]
    AssetLoad(String),

    #[error("Error: el contenedor {0} ya tiene un widget")]
    ContainerBusy(String),

    #[error("Error: no existe el widget {0}")]
    UnknownWidget(u64),

    #[error("Error: la escena fue destruida")]
    Destroyed,

    #[error("Error: se agoto el tiempo de espera de la escena")]
    Timeout,
}
