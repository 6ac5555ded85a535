use thiserror::Error;

/// Errores de validacion de coordenadas geograficas.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordinateError {
    #[error("Error: la latitud debe estar entre -90 y 90 (recibida {0})")]
    LatitudeOutOfRange(f64),

    #[error("Error: la longitud debe estar entre -180 y 180 (recibida {0})")]
    LongitudeOutOfRange(f64),

    #[error("Error: la coordenada no es un numero finito")]
    NotFinite,
}

impl CoordinateError {
    /// Nombre del campo al que corresponde el error, tal como lo espera el gateway.
    pub fn field(&self) -> &'static str {
        match self {
            CoordinateError::LatitudeOutOfRange(_) => "latitude",
            CoordinateError::LongitudeOutOfRange(_) => "longitude",
            CoordinateError::NotFinite => "coordinates",
        }
    }
}
