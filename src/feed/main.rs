use std::{env, process, thread, time::Duration};

use rand::Rng;
use tracing::{info, warn};

use drone_tracker::{
    config::TrackerConfig,
    gateway::{CreateLocationRequest, GatewayError, HttpLocationGateway, LocationGateway},
    logging::{init_logging, DEFAULT_FILTER},
};

const DEFAULT_CONFIG_PATH: &str = "./config/tracker_config.json";

/// Desplazamiento maximo por paso al simular, en grados.
const WANDER_STEP: f64 = 0.0005;

fn usage() -> ! {
    eprintln!("Uso: location_feed <drone_id> <latitud> <longitud> [pasos] [config.json]");
    process::exit(2);
}

fn parse_coordinate(raw: &str) -> f64 {
    // lo que no parsea se manda igual para que lo rechace la validacion
    raw.parse().unwrap_or(f64::NAN)
}

fn print_validation(error: &GatewayError) {
    match error {
        GatewayError::Validation(errors) => {
            for (field, message) in errors.fields() {
                eprintln!("  {}: {}", field, message);
            }
        }
        other => eprintln!("Error: {}", other),
    }
}

/// Publica una ubicacion y, si se piden varios pasos, simula al drone
/// moviendose alrededor de ese punto.
fn main() {
    init_logging(DEFAULT_FILTER);

    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        usage();
    }
    let drone_id = &args[1];
    let mut latitude = parse_coordinate(&args[2]);
    let mut longitude = parse_coordinate(&args[3]);
    let steps: u32 = match args.get(4) {
        Some(raw) => raw.parse().unwrap_or_else(|_| usage()),
        None => 1,
    };
    let config_path = args.get(5).map(String::as_str).unwrap_or(DEFAULT_CONFIG_PATH);

    let config = match TrackerConfig::from_file(config_path) {
        Ok(config) => config,
        Err(e) => {
            warn!("{}, se usa la configuracion por defecto", e);
            TrackerConfig::default()
        }
    };

    let gateway = match HttpLocationGateway::new(&config.api_base_url, config.http_timeout()) {
        Ok(gateway) => gateway,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let mut rng = rand::thread_rng();
    for step in 0..steps {
        let request = match CreateLocationRequest::new(drone_id, latitude, longitude) {
            Ok(request) => request,
            Err(e) => {
                eprintln!("La ubicacion no es valida:");
                print_validation(&e);
                process::exit(1);
            }
        };

        match gateway.publish_location(&request) {
            Ok(location) => {
                let point = location.get_point();
                info!(
                    drone_id = %location.get_drone_id(),
                    step,
                    "ubicacion publicada: {:.6}, {:.6}",
                    point.get_latitude(),
                    point.get_longitude()
                );
            }
            Err(e) => {
                print_validation(&e);
                process::exit(1);
            }
        }

        if step + 1 < steps {
            latitude = (latitude + rng.gen_range(-WANDER_STEP..=WANDER_STEP)).clamp(-90.0, 90.0);
            longitude = (longitude + rng.gen_range(-WANDER_STEP..=WANDER_STEP)).clamp(-180.0, 180.0);
            thread::sleep(config.poll_interval());
        }
    }
}
