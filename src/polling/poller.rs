use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        mpsc::{self, RecvTimeoutError, Sender},
        Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

use tracing::{debug, info, warn};

use crate::{
    gateway::location_gateway::LocationGateway,
    tracking::location_sink::LocationSink,
    utils::sync::lock,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5000);

struct PollState {
    drone_id: String,
    interval: Duration,
    stop_sender: Mutex<Option<Sender<()>>>,
    stopped: AtomicBool,
    busy: AtomicBool,
    skipped_ticks: AtomicU64,
    fetches_started: AtomicU64,
    // se toma mientras se entrega un resultado; stop() lo toma para esperar la entrega en curso
    delivery: Mutex<()>,
}

/// Handle de un polling en curso.
#[derive(Clone)]
pub struct PollHandle {
    state: Arc<PollState>,
}

impl PollHandle {
    pub fn drone_id(&self) -> &str {
        &self.state.drone_id
    }

    pub fn interval(&self) -> Duration {
        self.state.interval
    }

    /// Cancela el ticker. Un fetch en vuelo termina, pero su resultado se descarta.
    pub fn stop(&self) {
        {
            let _delivery = lock(&self.state.delivery);
            if self.state.stopped.swap(true, Ordering::SeqCst) {
                return;
            }
        }
        // al soltar el sender el ticker sale de recv_timeout
        lock(&self.state.stop_sender).take();
        info!(drone_id = %self.state.drone_id, "polling detenido");
    }

    pub fn is_stopped(&self) -> bool {
        self.state.stopped.load(Ordering::SeqCst)
    }

    pub fn is_fetching(&self) -> bool {
        self.state.busy.load(Ordering::SeqCst)
    }

    /// Ticks que se saltearon porque habia un fetch en vuelo.
    pub fn skipped_ticks(&self) -> u64 {
        self.state.skipped_ticks.load(Ordering::SeqCst)
    }

    pub fn fetches_started(&self) -> u64 {
        self.state.fetches_started.load(Ordering::SeqCst)
    }
}

/// Alternativa al canal en tiempo real: consulta periodicamente el gateway y
/// entrega por el mismo `LocationSink`.
pub struct PollingTracker {
    gateway: Arc<dyn LocationGateway>,
}

impl PollingTracker {
    pub fn new(gateway: Arc<dyn LocationGateway>) -> PollingTracker {
        PollingTracker { gateway }
    }

    /// Consulta una vez en el momento y despues en cada tick de `interval`.
    ///
    /// Si al llegar un tick sigue habiendo un fetch en vuelo, ese tick se saltea.
    pub fn start_polling(
        &self,
        drone_id: &str,
        interval: Duration,
        sink: Arc<dyn LocationSink>,
    ) -> PollHandle {
        let (stop_sender, stop_receiver) = mpsc::channel::<()>();
        let state = Arc::new(PollState {
            drone_id: drone_id.to_string(),
            interval,
            stop_sender: Mutex::new(Some(stop_sender)),
            stopped: AtomicBool::new(false),
            busy: AtomicBool::new(false),
            skipped_ticks: AtomicU64::new(0),
            fetches_started: AtomicU64::new(0),
            delivery: Mutex::new(()),
        });

        let ticker_state = Arc::clone(&state);
        let gateway = Arc::clone(&self.gateway);
        thread::spawn(move || {
            let start = Instant::now();
            let mut tick: u32 = 0;
            loop {
                fire(&ticker_state, &gateway, &sink);
                tick += 1;

                let next = start + interval * tick;
                let wait = next.saturating_duration_since(Instant::now());
                match stop_receiver.recv_timeout(wait) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    _ => break,
                }
            }
            debug!(drone_id = %ticker_state.drone_id, "ticker terminado");
        });

        info!(drone_id, interval_ms = interval.as_millis() as u64, "polling iniciado");
        PollHandle { state }
    }

    pub fn stop_polling(&self, handle: &PollHandle) {
        handle.stop();
    }
}

fn fire(state: &Arc<PollState>, gateway: &Arc<dyn LocationGateway>, sink: &Arc<dyn LocationSink>) {
    if state.stopped.load(Ordering::SeqCst) {
        return;
    }
    if state.busy.swap(true, Ordering::SeqCst) {
        state.skipped_ticks.fetch_add(1, Ordering::SeqCst);
        debug!(drone_id = %state.drone_id, "tick salteado, hay un fetch en vuelo");
        return;
    }
    state.fetches_started.fetch_add(1, Ordering::SeqCst);

    let state = Arc::clone(state);
    let gateway = Arc::clone(gateway);
    let sink = Arc::clone(sink);
    thread::spawn(move || {
        let result = gateway.latest_location(&state.drone_id);

        {
            let _delivery = lock(&state.delivery);
            if state.stopped.load(Ordering::SeqCst) {
                debug!(drone_id = %state.drone_id, "se descarta una respuesta tardia");
            } else {
                match result {
                    Ok(Some(location)) if location.get_drone_id() == state.drone_id => {
                        sink.on_location(location)
                    }
                    Ok(Some(location)) => warn!(
                        drone_id = %state.drone_id,
                        received = location.get_drone_id(),
                        "el gateway devolvio otro drone"
                    ),
                    Ok(None) => sink.on_location_missing(),
                    Err(e) => {
                        warn!(drone_id = %state.drone_id, "fallo la consulta: {}", e);
                        sink.on_fetch_error(&e);
                    }
                }
            }
        }
        state.busy.store(false, Ordering::SeqCst);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        gateway::{create_location_request::CreateLocationRequest, gateway_error::GatewayError},
        tracking::drone_location::DroneLocation,
        utils::location::GeoPoint,
    };
    use chrono::Utc;

    struct FixedGateway {
        answer: Result<Option<(f64, f64)>, GatewayError>,
    }

    impl LocationGateway for FixedGateway {
        fn latest_location(&self, drone_id: &str) -> Result<Option<DroneLocation>, GatewayError> {
            self.answer.clone().map(|point| {
                point.map(|(lat, lng)| {
                    DroneLocation::new(None, drone_id, GeoPoint::new(lat, lng).unwrap(), Utc::now())
                })
            })
        }

        fn publish_location(&self, _: &CreateLocationRequest) -> Result<DroneLocation, GatewayError> {
            Err(GatewayError::Status(405))
        }
    }

    #[derive(Default)]
    struct Recorder {
        locations: Mutex<Vec<DroneLocation>>,
        missing: AtomicU64,
        errors: AtomicU64,
    }

    impl LocationSink for Recorder {
        fn on_location(&self, location: DroneLocation) {
            lock(&self.locations).push(location);
        }

        fn on_location_missing(&self) {
            self.missing.fetch_add(1, Ordering::SeqCst);
        }

        fn on_fetch_error(&self, _error: &GatewayError) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn wait_for(condition: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !condition() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_01_fetches_immediately() {
        let tracker = PollingTracker::new(Arc::new(FixedGateway {
            answer: Ok(Some((10.0, 100.0))),
        }));
        let recorder = Arc::new(Recorder::default());
        let handle = tracker.start_polling("d1", Duration::from_secs(60), recorder.clone());

        wait_for(|| !lock(&recorder.locations).is_empty());
        assert_eq!(lock(&recorder.locations).len(), 1);
        assert_eq!(handle.fetches_started(), 1);
        tracker.stop_polling(&handle);
        assert!(handle.is_stopped());
    }

    #[test]
    fn test_02_not_found_is_not_an_error() {
        let tracker = PollingTracker::new(Arc::new(FixedGateway { answer: Ok(None) }));
        let recorder = Arc::new(Recorder::default());
        let handle = tracker.start_polling("d1", Duration::from_secs(60), recorder.clone());

        wait_for(|| recorder.missing.load(Ordering::SeqCst) == 1);
        assert_eq!(recorder.missing.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.errors.load(Ordering::SeqCst), 0);
        handle.stop();
    }

    #[test]
    fn test_03_fetch_error_reaches_sink() {
        let tracker = PollingTracker::new(Arc::new(FixedGateway {
            answer: Err(GatewayError::Status(503)),
        }));
        let recorder = Arc::new(Recorder::default());
        let handle = tracker.start_polling("d1", Duration::from_secs(60), recorder.clone());

        wait_for(|| recorder.errors.load(Ordering::SeqCst) == 1);
        assert_eq!(recorder.errors.load(Ordering::SeqCst), 1);
        assert!(lock(&recorder.locations).is_empty());
        handle.stop();
    }

    #[test]
    fn test_04_stop_is_idempotent() {
        let tracker = PollingTracker::new(Arc::new(FixedGateway { answer: Ok(None) }));
        let handle = tracker.start_polling("d1", Duration::from_millis(20), Arc::new(|_: DroneLocation| {}));
        handle.stop();
        handle.stop();
        thread::sleep(Duration::from_millis(30));

        let started = handle.fetches_started();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(handle.fetches_started(), started);
    }
}
