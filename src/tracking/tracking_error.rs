use thiserror::Error;

use crate::{channel::ChannelError, utils::coordinate_error::CoordinateError};

/// Motivos por los que un mensaje de ubicacion no se acepta.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LocationError {
    #[error("Error: el mensaje no es JSON valido: {0}")]
    InvalidJson(String),

    #[error("Error: falta el campo requerido {0}")]
    MissingField(&'static str),

    #[error("Error: coordenada invalida: {0}")]
    InvalidCoordinate(#[from] CoordinateError),

    #[error("Error: fecha invalida: {0}")]
    InvalidTimestamp(String),

    #[error("Error: se esperaba el drone {expected} y llego {received}")]
    WrongDrone { expected: String, received: String },
}

/// Errores del seguimiento de un drone.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackingError {
    #[error("Error: no se pudo suscribir al topic del drone: {0}")]
    SubscribeFailed(#[from] ChannelError),

    #[error("Error: se agoto el tiempo de espera")]
    Timeout,

    #[error("Error: el seguimiento fue detenido")]
    Stopped,
}
