use thiserror::Error;

/// Errores al levantar la configuracion del tracker.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Error al abrir el archivo de configuracion {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Error al parsear el archivo de configuracion: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Error: configuracion invalida en {field}: {message}")]
    Invalid { field: &'static str, message: String },
}
