use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::utils::location::GeoPoint;

use super::gateway_error::{GatewayError, ValidationErrors};

/// Request para publicar una ubicacion. Solo se construye si pasa la validacion local.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateLocationRequest {
    drone_id: String,
    point: GeoPoint,
    recorded_at: Option<DateTime<Utc>>,
    timestamp: Option<i64>,
}

/// Cuerpo JSON del `POST /locations`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLocationBody {
    pub drone_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub recorded_at: String,
    pub timestamp: i64,
}

impl CreateLocationRequest {
    /// Valida los campos y devuelve todos los errores juntos, por campo.
    pub fn new(drone_id: &str, latitude: f64, longitude: f64) -> Result<CreateLocationRequest, GatewayError> {
        let mut errors = ValidationErrors::new();
        if drone_id.trim().is_empty() {
            errors.add("droneId", "Drone ID is required");
        }
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            errors.add("latitude", "Latitude must be between -90 and 90");
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            errors.add("longitude", "Longitude must be between -180 and 180");
        }

        let point = match GeoPoint::new(latitude, longitude) {
            Ok(point) if errors.is_empty() => point,
            Err(e) => {
                errors.add(e.field(), &e.to_string());
                return Err(GatewayError::Validation(errors));
            }
            Ok(_) => return Err(GatewayError::Validation(errors)),
        };

        Ok(CreateLocationRequest {
            drone_id: drone_id.trim().to_string(),
            point,
            recorded_at: None,
            timestamp: None,
        })
    }

    pub fn with_recorded_at(mut self, recorded_at: DateTime<Utc>) -> CreateLocationRequest {
        self.recorded_at = Some(recorded_at);
        self
    }

    pub fn with_timestamp(mut self, timestamp_ms: i64) -> CreateLocationRequest {
        self.timestamp = Some(timestamp_ms);
        self
    }

    pub fn get_drone_id(&self) -> &str {
        &self.drone_id
    }

    pub fn get_point(&self) -> GeoPoint {
        self.point
    }

    /// Arma el cuerpo completando `recordedAt` y `timestamp` con `now` si faltan.
    pub fn to_body(&self, now: DateTime<Utc>) -> CreateLocationBody {
        CreateLocationBody {
            drone_id: self.drone_id.clone(),
            latitude: self.point.get_latitude(),
            longitude: self.point.get_longitude(),
            recorded_at: self
                .recorded_at
                .unwrap_or(now)
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            timestamp: self.timestamp.unwrap_or_else(|| now.timestamp_millis()),
        }
    }
}
