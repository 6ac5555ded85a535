use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::location::GeoPoint;

use super::tracking_error::LocationError;

/// Forma de una ubicacion en el cable, tanto en el GET del gateway como en el topic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
    #[serde(default)]
    pub drone_id: Option<Value>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// Una lectura de posicion de un drone. No tiene setters: cada actualizacion es una lectura nueva.
#[derive(Debug, Clone, PartialEq)]
pub struct DroneLocation {
    location_id: Option<String>,
    drone_id: String,
    point: GeoPoint,
    recorded_at: DateTime<Utc>,
    received_at: DateTime<Utc>,
}

impl DroneLocation {
    pub fn new(
        location_id: Option<String>,
        drone_id: &str,
        point: GeoPoint,
        recorded_at: DateTime<Utc>,
    ) -> DroneLocation {
        DroneLocation {
            location_id,
            drone_id: drone_id.to_string(),
            point,
            recorded_at,
            received_at: Utc::now(),
        }
    }

    /// Decodifica un cuerpo JSON. Ver `from_payload` para las reglas.
    pub fn from_json(body: &[u8]) -> Result<DroneLocation, LocationError> {
        let payload: LocationPayload =
            serde_json::from_slice(body).map_err(|e| LocationError::InvalidJson(e.to_string()))?;
        DroneLocation::from_payload(payload)
    }

    /// Valida un `LocationPayload`.
    ///
    /// `droneId`, `latitude` y `longitude` son obligatorios, y al menos uno de
    /// `recordedAt` o `timestamp`. Si vienen los dos, manda `recordedAt`.
    pub fn from_payload(payload: LocationPayload) -> Result<DroneLocation, LocationError> {
        let drone_id = match payload.drone_id {
            Some(Value::String(id)) if !id.trim().is_empty() => id,
            Some(Value::Number(id)) => id.to_string(),
            _ => return Err(LocationError::MissingField("droneId")),
        };
        let latitude = payload
            .latitude
            .ok_or(LocationError::MissingField("latitude"))?;
        let longitude = payload
            .longitude
            .ok_or(LocationError::MissingField("longitude"))?;
        let point = GeoPoint::new(latitude, longitude)?;

        let recorded_at = match (payload.recorded_at, payload.timestamp) {
            (Some(raw), _) if !raw.is_null() => parse_recorded_at(&raw)?,
            (_, Some(ms)) if ms > 0 => from_millis(ms)?,
            _ => return Err(LocationError::MissingField("recordedAt")),
        };

        Ok(DroneLocation::new(
            payload.location_id,
            &drone_id,
            point,
            recorded_at,
        ))
    }

    /// Como `from_json`, pero rechaza lecturas de otro drone.
    pub fn decode_for(body: &[u8], expected_drone: &str) -> Result<DroneLocation, LocationError> {
        let location = DroneLocation::from_json(body)?;
        if location.drone_id != expected_drone {
            return Err(LocationError::WrongDrone {
                expected: expected_drone.to_string(),
                received: location.drone_id,
            });
        }
        Ok(location)
    }

    pub fn get_location_id(&self) -> Option<&str> {
        self.location_id.as_deref()
    }

    pub fn get_drone_id(&self) -> &str {
        &self.drone_id
    }

    pub fn get_point(&self) -> GeoPoint {
        self.point
    }

    pub fn get_recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    pub fn get_received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, LocationError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| LocationError::InvalidTimestamp(ms.to_string()))
}

// acepta RFC 3339, fecha sin zona (se toma como UTC) o milisegundos
fn parse_recorded_at(raw: &Value) -> Result<DateTime<Utc>, LocationError> {
    match raw {
        Value::String(text) => {
            if let Ok(date) = DateTime::parse_from_rfc3339(text) {
                return Ok(date.with_timezone(&Utc));
            }
            NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                .map(|naive| naive.and_utc())
                .map_err(|_| LocationError::InvalidTimestamp(text.clone()))
        }
        Value::Number(number) => match number.as_i64() {
            Some(ms) => from_millis(ms),
            None => Err(LocationError::InvalidTimestamp(number.to_string())),
        },
        other => Err(LocationError::InvalidTimestamp(other.to_string())),
    }
}
