#[cfg(test)]
mod tests {
    use drone_tracker::{
        channel::{
            ChannelError, Command, ConnectionState, Frame, MemoryBroker, RealtimeClient,
            ReconnectPolicy, StompConfig, StompTransport,
        },
        tracking::{DroneLocation, DroneTracker, TrackState, TrackingError, DEFAULT_TOPIC_PREFIX},
    };
    use std::{
        io::{BufReader, Write},
        net::TcpListener,
        sync::{
            atomic::{AtomicUsize, Ordering},
            mpsc, Arc, Mutex,
        },
        thread,
        time::{Duration, Instant},
    };

    fn policy(max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts,
            delay: Duration::from_millis(10),
        }
    }

    fn wait_for(condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(3);
        while !condition() {
            if Instant::now() > deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
        true
    }

    fn reading(drone_id: &str, lat: f64, lng: f64) -> String {
        format!(
            r#"{{"droneId":"{}","latitude":{},"longitude":{},"recordedAt":"2024-05-01T10:00:00Z"}}"#,
            drone_id, lat, lng
        )
    }

    #[test]
    fn test_01_conexiones_concurrentes_hacen_un_solo_handshake() {
        let broker = MemoryBroker::new();
        broker.set_handshake_delay(Duration::from_millis(100));
        let client = RealtimeClient::new(Arc::new(broker.clone()), policy(1));

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let client = client.clone();
                thread::spawn(move || client.connect())
            })
            .collect();
        for worker in workers {
            assert!(worker.join().unwrap().is_ok());
        }

        assert_eq!(client.state(), ConnectionState::Connected);
        assert_eq!(broker.handshakes(), 1);
    }

    #[test]
    fn test_02_reconexion_acotada_termina_en_unavailable() {
        let broker = MemoryBroker::new();
        let client = RealtimeClient::new(Arc::new(broker.clone()), policy(3));
        let _subscription = client.subscribe("/t", Arc::new(|_: &Frame| {})).unwrap();
        let states = client.watch_state();

        broker.set_offline(true);
        broker.drop_connections();

        assert!(wait_for(|| client.state() == ConnectionState::Unavailable));
        assert_eq!(broker.handshakes(), 1 + 3);

        let seen: Vec<ConnectionState> = states.try_iter().collect();
        assert!(seen.contains(&ConnectionState::Reconnecting { attempt: 1 }));
        assert!(seen.contains(&ConnectionState::Reconnecting { attempt: 3 }));
        assert_eq!(seen.last(), Some(&ConnectionState::Unavailable));
    }

    #[test]
    fn test_03_despues_de_una_caida_se_vuelve_a_suscribir() {
        let broker = MemoryBroker::new();
        let client = RealtimeClient::new(Arc::new(broker.clone()), policy(3));
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        let _subscription = client
            .subscribe(
                "/topic/drone/d1",
                Arc::new(move |_: &Frame| {
                    count_clone.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        broker.drop_connections();

        assert!(wait_for(|| broker.handshakes() == 2
            && broker.subscriber_count("/topic/drone/d1") == 1));
        assert_eq!(client.state(), ConnectionState::Connected);

        broker.publish("/topic/drone/d1", "{}");
        assert!(wait_for(|| count.load(Ordering::SeqCst) == 1));
    }

    #[test]
    fn test_04_un_frame_malformado_no_corta_la_conexion() {
        let broker = MemoryBroker::new();
        let client = RealtimeClient::new(Arc::new(broker.clone()), policy(1));
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        let _subscription = client
            .subscribe(
                "/t",
                Arc::new(move |_: &Frame| {
                    count_clone.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        broker.inject_malformed_frame();
        broker.send_error("algo salio mal");
        broker.publish("/t", "{}");

        assert!(wait_for(|| count.load(Ordering::SeqCst) == 1));
        assert_eq!(client.state(), ConnectionState::Connected);
        assert_eq!(broker.handshakes(), 1);
    }

    #[test]
    fn test_05_seguir_dos_veces_no_duplica_la_suscripcion() {
        let broker = MemoryBroker::new();
        let client = RealtimeClient::new(Arc::new(broker.clone()), policy(1));
        let tracker = DroneTracker::new(client.clone(), DEFAULT_TOPIC_PREFIX);

        let first = tracker.track("d1", Arc::new(|_: DroneLocation| {}));
        let second = tracker.track("d1", Arc::new(|_: DroneLocation| {}));

        assert!(first.wait_settled(Duration::from_secs(2)));
        second.wait_subscribed(Duration::from_secs(2)).unwrap();

        assert!(first.is_stopped());
        assert_eq!(broker.subscriber_count("/topic/drone/d1"), 1);
        assert_eq!(client.active_subscriptions(), 1);
        assert_eq!(tracker.active_tracks(), vec!["d1".to_string()]);
    }

    #[test]
    fn test_06_se_descartan_lecturas_invalidas_o_de_otro_drone() {
        let broker = MemoryBroker::new();
        let tracker = DroneTracker::new(
            RealtimeClient::new(Arc::new(broker.clone()), policy(1)),
            DEFAULT_TOPIC_PREFIX,
        );
        let (sender, receiver) = mpsc::channel();
        let sender = Mutex::new(sender);
        let handle = tracker.track(
            "d1",
            Arc::new(move |location: DroneLocation| {
                let _ = sender.lock().unwrap().send(location);
            }),
        );
        handle.wait_subscribed(Duration::from_secs(2)).unwrap();

        broker.publish("/topic/drone/d1", "esto no es json");
        broker.publish("/topic/drone/d1", &reading("d2", 10.0, 100.0));
        broker.publish("/topic/drone/d1", &reading("d1", 91.0, 100.0));
        broker.publish("/topic/drone/d1", &reading("d1", 10.5, 100.5));

        let location = receiver.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(location.get_drone_id(), "d1");
        assert_eq!(location.get_point().get_latitude(), 10.5);
        assert!(receiver.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_07_despues_de_stop_no_llegan_mas_lecturas() {
        let broker = MemoryBroker::new();
        let tracker = DroneTracker::new(
            RealtimeClient::new(Arc::new(broker.clone()), policy(1)),
            DEFAULT_TOPIC_PREFIX,
        );
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        let handle = tracker.track(
            "d1",
            Arc::new(move |_: DroneLocation| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );
        handle.wait_subscribed(Duration::from_secs(2)).unwrap();

        handle.stop();
        broker.publish("/topic/drone/d1", &reading("d1", 10.0, 100.0));
        thread::sleep(Duration::from_millis(100));

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(broker.subscriber_count("/topic/drone/d1"), 0);
    }

    #[test]
    fn test_08_frames_ilegibles_del_broker_no_cortan_la_sesion() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let (done_sender, done_receiver) = mpsc::channel::<()>();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            Frame::read_from(&mut reader).unwrap().unwrap();
            Frame::new(Command::Connected)
                .with_header("version", "1.2")
                .with_header("heart-beat", "0,0")
                .write_to(&mut stream)
                .unwrap();

            let subscribe = Frame::read_from(&mut reader).unwrap().unwrap();
            let id = subscribe.header("id").unwrap().to_string();
            stream
                .write_all(b"MESSAGE\nsubscription:s\ncontent-length:18446744073709551615\n\n{}\0")
                .unwrap();
            stream
                .write_all(b"MESSAGE\nsubscription:\xff\xfe\nx:y\n\n{}\0")
                .unwrap();
            Frame::new(Command::Message)
                .with_header("subscription", &id)
                .with_body(reading("d1", 10.0, 100.0).into_bytes())
                .write_to(&mut stream)
                .unwrap();
            stream.flush().unwrap();
            let _ = done_receiver.recv_timeout(Duration::from_secs(5));
        });

        let transport = StompTransport::new(StompConfig {
            address,
            host: "/".to_string(),
            login: None,
            passcode: None,
            heartbeat: Duration::from_millis(0),
            connect_timeout: Duration::from_secs(2),
        });
        let client = RealtimeClient::new(Arc::new(transport), policy(1));
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        let _subscription = client
            .subscribe(
                "/topic/drone/d1",
                Arc::new(move |_: &Frame| {
                    count_clone.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        assert!(wait_for(|| count.load(Ordering::SeqCst) == 1));
        assert_eq!(client.state(), ConnectionState::Connected);

        client.disconnect();
        let _ = done_sender.send(());
        server.join().unwrap();
    }

    #[test]
    fn test_09_si_el_broker_vuelve_durante_los_reintentos_se_suscribe() {
        let broker = MemoryBroker::new();
        broker.set_offline(true);
        let client = RealtimeClient::new(
            Arc::new(broker.clone()),
            ReconnectPolicy {
                max_attempts: 40,
                delay: Duration::from_millis(25),
            },
        );
        let tracker = DroneTracker::new(client.clone(), DEFAULT_TOPIC_PREFIX);

        let handle = tracker.track("d1", Arc::new(|_: DroneLocation| {}));
        thread::sleep(Duration::from_millis(150));
        assert_eq!(handle.state(), TrackState::Subscribing);
        assert!(matches!(client.state(), ConnectionState::Reconnecting { .. }));

        broker.set_offline(false);

        handle.wait_subscribed(Duration::from_secs(3)).unwrap();
        assert_eq!(client.state(), ConnectionState::Connected);
        assert!(broker.handshakes() >= 2);
        assert_eq!(broker.subscriber_count("/topic/drone/d1"), 1);
    }

    #[test]
    fn test_10_handshake_fallido_sin_recuperacion_queda_unavailable() {
        let broker = MemoryBroker::new();
        broker.set_offline(true);
        let client = RealtimeClient::new(Arc::new(broker.clone()), policy(3));
        let tracker = DroneTracker::new(client.clone(), DEFAULT_TOPIC_PREFIX);

        let handle = tracker.track("d1", Arc::new(|_: DroneLocation| {}));

        assert_eq!(
            handle.wait_subscribed(Duration::from_secs(3)),
            Err(TrackingError::SubscribeFailed(ChannelError::Unavailable))
        );
        assert_eq!(handle.state(), TrackState::Unsubscribed);
        assert_eq!(client.state(), ConnectionState::Unavailable);
        assert_eq!(broker.handshakes(), 1 + 3);
    }
}
