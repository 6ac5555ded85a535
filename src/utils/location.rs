use serde::{Deserialize, Serialize};

use super::coordinate_error::CoordinateError;

pub const LATITUDE_MIN: f64 = -90.0;
pub const LATITUDE_MAX: f64 = 90.0;
pub const LONGITUDE_MIN: f64 = -180.0;
pub const LONGITUDE_MAX: f64 = 180.0;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Contiene una posicion especifica en el mapa.
///
/// Solo se puede construir a traves de `GeoPoint::new`, que valida los rangos
/// (ambos extremos incluidos). Por eso cualquier `GeoPoint` que circule por el
/// sistema es una coordenada valida.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPoint", into = "RawPoint")]
pub struct GeoPoint {
    lat: f64,
    long: f64,
}

#[derive(Serialize, Deserialize)]
struct RawPoint {
    latitude: f64,
    longitude: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, long: f64) -> Result<GeoPoint, CoordinateError> {
        if !lat.is_finite() || !long.is_finite() {
            return Err(CoordinateError::NotFinite);
        }
        if !(LATITUDE_MIN..=LATITUDE_MAX).contains(&lat) {
            return Err(CoordinateError::LatitudeOutOfRange(lat));
        }
        if !(LONGITUDE_MIN..=LONGITUDE_MAX).contains(&long) {
            return Err(CoordinateError::LongitudeOutOfRange(long));
        }

        Ok(GeoPoint { lat, long })
    }

    pub fn get_latitude(&self) -> f64 {
        self.lat
    }

    pub fn get_longitude(&self) -> f64 {
        self.long
    }

    /// Distancia en kilometros hasta `other` usando la formula de haversine,
    /// redondeada a dos decimales.
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let d_lat = (other.lat - self.lat).to_radians();
        let d_long = (other.long - self.long).to_radians();

        let a = (d_lat / 2.0).sin().powi(2)
            + self.lat.to_radians().cos()
                * other.lat.to_radians().cos()
                * (d_long / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        (EARTH_RADIUS_KM * c * 100.0).round() / 100.0
    }
}

impl TryFrom<RawPoint> for GeoPoint {
    type Error = CoordinateError;

    fn try_from(raw: RawPoint) -> Result<Self, Self::Error> {
        GeoPoint::new(raw.latitude, raw.longitude)
    }
}

impl From<GeoPoint> for RawPoint {
    fn from(point: GeoPoint) -> Self {
        RawPoint {
            latitude: point.lat,
            longitude: point.long,
        }
    }
}

/// Rectangulo minimo que contiene a todos los puntos recibidos.
///
/// Devuelve `None` si no hay puntos.
pub fn bounds_of(points: &[GeoPoint]) -> Option<(GeoPoint, GeoPoint)> {
    let first = points.first()?;
    let (mut min_lat, mut min_long) = (first.lat, first.long);
    let (mut max_lat, mut max_long) = (first.lat, first.long);

    for point in &points[1..] {
        min_lat = min_lat.min(point.lat);
        min_long = min_long.min(point.long);
        max_lat = max_lat.max(point.lat);
        max_long = max_long.max(point.long);
    }

    Some((
        GeoPoint {
            lat: min_lat,
            long: min_long,
        },
        GeoPoint {
            lat: max_lat,
            long: max_long,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_new() {
        let location = GeoPoint::new(1.0, 2.0).unwrap();
        assert_eq!(location.get_latitude(), 1.0);
        assert_eq!(location.get_longitude(), 2.0);
    }

    #[test]
    fn test_rejects_out_of_range_coordinates() {
        assert_eq!(
            GeoPoint::new(91.0, 0.0),
            Err(CoordinateError::LatitudeOutOfRange(91.0))
        );
        assert_eq!(
            GeoPoint::new(0.0, 181.0),
            Err(CoordinateError::LongitudeOutOfRange(181.0))
        );
        assert_eq!(GeoPoint::new(f64::NAN, 0.0), Err(CoordinateError::NotFinite));
    }

    #[test]
    fn test_accepts_boundaries() {
        assert!(GeoPoint::new(-90.0, -180.0).is_ok());
        assert!(GeoPoint::new(90.0, 180.0).is_ok());
    }

    #[test]
    fn test_distance_km() {
        let origin = GeoPoint::new(10.762622, 106.660172).unwrap();
        assert_eq!(origin.distance_km(&origin), 0.0);

        let north = GeoPoint::new(11.762622, 106.660172).unwrap();
        // un grado de latitud son ~111.19 km
        assert!((origin.distance_km(&north) - 111.19).abs() < 0.01);
    }

    #[test]
    fn test_bounds_of() {
        let points = vec![
            GeoPoint::new(10.0, 100.0).unwrap(),
            GeoPoint::new(11.0, 101.0).unwrap(),
            GeoPoint::new(10.5, 99.5).unwrap(),
        ];
        let (south_west, north_east) = bounds_of(&points).unwrap();
        assert_eq!(south_west, GeoPoint::new(10.0, 99.5).unwrap());
        assert_eq!(north_east, GeoPoint::new(11.0, 101.0).unwrap());
        assert!(bounds_of(&[]).is_none());
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: Result<GeoPoint, _> = serde_json::from_str(r#"{"latitude": 10.0, "longitude": 20.0}"#);
        assert!(ok.is_ok());

        let bad: Result<GeoPoint, _> = serde_json::from_str(r#"{"latitude": 100.0, "longitude": 20.0}"#);
        assert!(bad.is_err());
    }
}
