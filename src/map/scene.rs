use std::fmt;

use crate::utils::location::GeoPoint;

/// Identifica el lugar de la interfaz donde se monta un mapa.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerId(String);

impl ContainerId {
    pub fn new(name: &str) -> ContainerId {
        ContainerId(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    Start,
    End,
    Drone,
}

impl MarkerKind {
    pub fn label(&self) -> &'static str {
        match self {
            MarkerKind::Start => "Inicio",
            MarkerKind::End => "Destino",
            MarkerKind::Drone => "Drone",
        }
    }
}

/// Eventos que emite un widget de mapa. Reemplazan a los callbacks del widget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WidgetEvent {
    Clicked(GeoPoint),
    MarkerClicked(MarkerKind),
}

/// Contenido declarativo de un mapa: origen y destino fijos y, opcionalmente,
/// la posicion actual del drone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapScene {
    start_point: GeoPoint,
    end_point: GeoPoint,
    current_point: Option<GeoPoint>,
}

impl MapScene {
    pub fn new(start_point: GeoPoint, end_point: GeoPoint) -> MapScene {
        MapScene {
            start_point,
            end_point,
            current_point: None,
        }
    }

    pub fn get_start_point(&self) -> GeoPoint {
        self.start_point
    }

    pub fn get_end_point(&self) -> GeoPoint {
        self.end_point
    }

    pub fn get_current_point(&self) -> Option<GeoPoint> {
        self.current_point
    }

    pub fn with_current_point(&self, current_point: Option<GeoPoint>) -> MapScene {
        MapScene {
            current_point,
            ..*self
        }
    }

    /// `[inicio, actual, destino]` si hay posicion actual, si no `[inicio, destino]`.
    pub fn route_segments(&self) -> Vec<GeoPoint> {
        match self.current_point {
            Some(current) => vec![self.start_point, current, self.end_point],
            None => vec![self.start_point, self.end_point],
        }
    }

    /// Puntos de todos los marcadores visibles.
    pub fn marker_points(&self) -> Vec<GeoPoint> {
        self.route_segments()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(lat: f64, lng: f64) -> GeoPoint {
        GeoPoint::new(lat, lng).unwrap()
    }

    #[test]
    fn test_route_segments() {
        let scene = MapScene::new(point(10.0, 100.0), point(11.0, 101.0));
        assert_eq!(
            scene.route_segments(),
            vec![point(10.0, 100.0), point(11.0, 101.0)]
        );

        let scene = scene.with_current_point(Some(point(10.5, 100.5)));
        assert_eq!(
            scene.route_segments(),
            vec![point(10.0, 100.0), point(10.5, 100.5), point(11.0, 101.0)]
        );

        let scene = scene.with_current_point(None);
        assert_eq!(scene.route_segments().len(), 2);
    }

    #[test]
    fn test_start_and_end_are_fixed() {
        let scene = MapScene::new(point(10.0, 100.0), point(11.0, 101.0))
            .with_current_point(Some(point(1.0, 1.0)));
        assert_eq!(scene.get_start_point(), point(10.0, 100.0));
        assert_eq!(scene.get_end_point(), point(11.0, 101.0));
    }
}
