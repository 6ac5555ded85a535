use std::{collections::BTreeMap, fmt};

use thiserror::Error;

/// Errores de validacion por campo (`droneId`, `latitude`, `longitude`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    fields: BTreeMap<String, String>,
}

impl ValidationErrors {
    pub fn new() -> ValidationErrors {
        ValidationErrors::default()
    }

    pub fn add(&mut self, field: &str, message: &str) {
        self.fields
            .entry(field.to_string())
            .or_insert_with(|| message.to_string());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(|m| m.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|(field, message)| format!("{}: {}", field, message))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// Errores del cliente del gateway de ubicaciones.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    #[error("Error en la request HTTP: {0}")]
    Http(String),

    #[error("Error: el gateway respondio con status {0}")]
    Status(u16),

    #[error("Error: respuesta invalida del gateway: {0}")]
    InvalidResponse(String),

    #[error("Error de validacion: {0}")]
    Validation(ValidationErrors),

    #[error("Error: URL del gateway invalida: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Http(err.to_string())
    }
}
