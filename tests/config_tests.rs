#[cfg(test)]
mod tests {
    use drone_tracker::config::{ConfigError, TrackerConfig, TrackingMode};
    use std::{io::Write, time::Duration};
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_01_archivo_parcial_completa_con_defaults() {
        let file = write_config(
            r#"{"mode": "polling", "poll_interval_ms": 1500, "route": {"start": [1.0, 2.0], "end": [3.0, 4.0]}}"#,
        );
        let config = TrackerConfig::from_file(file.path().to_str().unwrap()).unwrap();

        assert_eq!(config.mode, TrackingMode::Polling);
        assert_eq!(config.poll_interval(), Duration::from_millis(1500));
        assert_eq!(config.broker_address, "127.0.0.1:61613");
        assert_eq!(config.api_base_url, "http://localhost:8080/api");
        assert_eq!(config.http_timeout(), Duration::from_millis(10000));

        let (start, end) = config.route_points().unwrap();
        assert_eq!(start.get_latitude(), 1.0);
        assert_eq!(end.get_longitude(), 4.0);
    }

    #[test]
    fn test_02_json_invalido_o_valores_invalidos() {
        let file = write_config("{ esto no es json");
        assert!(matches!(
            TrackerConfig::from_file(file.path().to_str().unwrap()),
            Err(ConfigError::Parse(_))
        ));

        let file = write_config(r#"{"poll_interval_ms": 0}"#);
        assert!(matches!(
            TrackerConfig::from_file(file.path().to_str().unwrap()),
            Err(ConfigError::Invalid { field: "poll_interval_ms", .. })
        ));

        let file = write_config(r#"{"route": {"start": [0.0, 200.0], "end": [0.0, 0.0]}}"#);
        assert!(matches!(
            TrackerConfig::from_file(file.path().to_str().unwrap()),
            Err(ConfigError::Invalid { field: "route.start", .. })
        ));
    }
}
