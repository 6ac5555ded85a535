use std::time::Duration;

use chrono::Utc;
use reqwest::{blocking::Client, StatusCode, Url};
use serde_json::Value;
use tracing::debug;

use crate::tracking::drone_location::{DroneLocation, LocationPayload};

use super::{create_location_request::CreateLocationRequest, gateway_error::GatewayError};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Acceso al gateway que cachea la ultima ubicacion de cada drone.
pub trait LocationGateway: Send + Sync {
    /// Ultima ubicacion conocida. `Ok(None)` si todavia no hay ninguna.
    fn latest_location(&self, drone_id: &str) -> Result<Option<DroneLocation>, GatewayError>;

    fn publish_location(&self, request: &CreateLocationRequest) -> Result<DroneLocation, GatewayError>;
}

/// Cliente HTTP bloqueante del gateway.
pub struct HttpLocationGateway {
    http: Client,
    base_url: Url,
}

impl HttpLocationGateway {
    pub fn new(base_url: &str, timeout: Duration) -> Result<HttpLocationGateway, GatewayError> {
        let base_url = Url::parse(base_url).map_err(|e| GatewayError::InvalidUrl(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(GatewayError::InvalidUrl(base_url.to_string()));
        }
        let http = Client::builder().timeout(timeout).build()?;
        Ok(HttpLocationGateway { http, base_url })
    }

    pub fn with_defaults() -> Result<HttpLocationGateway, GatewayError> {
        HttpLocationGateway::new(DEFAULT_API_BASE_URL, DEFAULT_HTTP_TIMEOUT)
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Agrega `segments` al path base. Cada segmento se escapa (un `/` en el id no abre otro nivel).
    fn url_for(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GatewayError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

/// Interpreta el cuerpo de una respuesta del gateway.
///
/// Acepta la ubicacion suelta o envuelta en `{success, message, data}`. Un
/// cuerpo vacio, `null` o `data: null` significa que no hay ubicacion.
pub fn parse_location_body(body: &[u8]) -> Result<Option<DroneLocation>, GatewayError> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(None);
    }
    let value: Value =
        serde_json::from_slice(body).map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

    let value = match value {
        Value::Object(mut object) if object.contains_key("data") && object.contains_key("success") => {
            object.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    };
    if value.is_null() {
        return Ok(None);
    }

    let payload: LocationPayload =
        serde_json::from_value(value).map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
    DroneLocation::from_payload(payload)
        .map(Some)
        .map_err(|e| GatewayError::InvalidResponse(e.to_string()))
}

impl LocationGateway for HttpLocationGateway {
    fn latest_location(&self, drone_id: &str) -> Result<Option<DroneLocation>, GatewayError> {
        let response = self.http.get(self.url_for(&["locations", "drone", drone_id])?).send()?;
        let status = response.status();
        debug!(drone_id, status = status.as_u16(), "ubicacion consultada");

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(GatewayError::Status(status.as_u16()));
        }

        let body = response.bytes()?;
        parse_location_body(&body)
    }

    fn publish_location(&self, request: &CreateLocationRequest) -> Result<DroneLocation, GatewayError> {
        let body = request.to_body(Utc::now());
        let response = self.http.post(self.url_for(&["locations"])?).json(&body).send()?;
        let status = response.status();
        debug!(drone_id = %body.drone_id, status = status.as_u16(), "ubicacion publicada");

        if !status.is_success() {
            return Err(GatewayError::Status(status.as_u16()));
        }

        let bytes = response.bytes()?;
        parse_location_body(&bytes)?
            .ok_or_else(|| GatewayError::InvalidResponse("respuesta vacia".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Servidor HTTP de una sola respuesta. Devuelve la URL base y el request recibido.
    fn serve_once(status_line: &'static str, body: &'static str) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}/api", listener.local_addr().unwrap());

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request = String::new();
            let mut content_length = 0;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap();
                }
                request.push_str(&line);
                if line == "\r\n" || line.is_empty() {
                    break;
                }
            }
            let mut body_buf = vec![0; content_length];
            reader.read_exact(&mut body_buf).unwrap();
            request.push_str(&String::from_utf8(body_buf).unwrap());

            let mut stream = stream;
            write!(
                stream,
                "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            )
            .unwrap();
            stream.flush().unwrap();
            request
        });
        (base, server)
    }

    fn gateway(base: &str) -> HttpLocationGateway {
        HttpLocationGateway::new(base, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_01_latest_location_ok() {
        let (base, server) = serve_once(
            "HTTP/1.1 200 OK",
            r#"{"locationId":"l1","droneId":"d1","latitude":10.5,"longitude":100.5,"recordedAt":"2024-05-01T10:00:00Z","timestamp":1714557600000}"#,
        );
        let location = gateway(&base).latest_location("d1").unwrap().unwrap();

        assert_eq!(location.get_drone_id(), "d1");
        let request = server.join().unwrap();
        assert!(request.starts_with("GET /api/locations/drone/d1 "));
    }

    #[test]
    fn test_02_not_found_is_none() {
        let (base, server) = serve_once("HTTP/1.1 404 Not Found", "");
        assert_eq!(gateway(&base).latest_location("d1").unwrap(), None);
        server.join().unwrap();
    }

    #[test]
    fn test_03_null_body_is_none() {
        let (base, server) = serve_once("HTTP/1.1 200 OK", "null");
        assert_eq!(gateway(&base).latest_location("d1").unwrap(), None);
        server.join().unwrap();
    }

    #[test]
    fn test_04_server_error_is_status() {
        let (base, server) = serve_once("HTTP/1.1 500 Internal Server Error", "{}");
        assert_eq!(
            gateway(&base).latest_location("d1"),
            Err(GatewayError::Status(500))
        );
        server.join().unwrap();
    }

    #[test]
    fn test_05_publish_sends_defaults() {
        let (base, server) = serve_once(
            "HTTP/1.1 200 OK",
            r#"{"locationId":"l9","droneId":"d1","latitude":10,"longitude":100,"timestamp":1714557600000}"#,
        );
        let request = CreateLocationRequest::new("d1", 10.0, 100.0).unwrap();
        let location = gateway(&base).publish_location(&request).unwrap();
        assert_eq!(location.get_location_id(), Some("l9"));

        let raw = server.join().unwrap();
        assert!(raw.starts_with("POST /api/locations "));
        assert!(raw.contains("\"droneId\":\"d1\""));
        assert!(raw.contains("\"recordedAt\""));
        assert!(raw.contains("\"timestamp\""));
    }

    #[test]
    fn test_06_parse_wrapped_body() {
        let wrapped = br#"{"success":true,"message":"ok","data":{"droneId":"d1","latitude":1,"longitude":2,"timestamp":5}}"#;
        assert!(parse_location_body(wrapped).unwrap().is_some());

        let empty = br#"{"success":true,"message":"No location found","data":null}"#;
        assert_eq!(parse_location_body(empty).unwrap(), None);
        assert_eq!(parse_location_body(b"  ").unwrap(), None);
        assert!(matches!(
            parse_location_body(br#"{"droneId":"d1","latitude":100,"longitude":2,"timestamp":5}"#),
            Err(GatewayError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_07_drone_id_is_escaped_in_the_path() {
        let (base, server) = serve_once("HTTP/1.1 404 Not Found", "");
        assert_eq!(gateway(&format!("{}/", base)).latest_location("d 1/x").unwrap(), None);

        let request = server.join().unwrap();
        assert!(request.starts_with("GET /api/locations/drone/d%201%2Fx "));
    }

    #[test]
    fn test_08_invalid_base_url() {
        assert!(matches!(
            HttpLocationGateway::new("no es una url", Duration::from_secs(1)),
            Err(GatewayError::InvalidUrl(_))
        ));
    }
}
