use std::{
    io::BufReader,
    net::{Shutdown, TcpStream, ToSocketAddrs},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};

use tracing::{debug, warn};

use crate::utils::sync::lock;

use super::{
    channel_error::ChannelError,
    frame::{Command, Frame},
};

/// Abre sesiones contra un broker. `open` incluye el handshake completo.
pub trait Transport: Send + Sync {
    fn open(&self) -> Result<Box<dyn Session>, ChannelError>;
}

/// Una conexion viva con el broker, ya pasado el handshake.
pub trait Session: Send + Sync {
    fn send(&self, frame: &Frame) -> Result<(), ChannelError>;

    /// Bloquea hasta el proximo frame. `Ok(None)` significa que la sesion se cerro.
    fn next_frame(&self) -> Result<Option<Frame>, ChannelError>;

    fn close(&self);
}

#[derive(Debug, Clone)]
pub struct StompConfig {
    pub address: String,
    pub host: String,
    pub login: Option<String>,
    pub passcode: Option<String>,
    pub heartbeat: Duration,
    pub connect_timeout: Duration,
}

/// Transporte STOMP 1.2 sobre TCP.
pub struct StompTransport {
    config: StompConfig,
}

impl StompTransport {
    pub fn new(config: StompConfig) -> StompTransport {
        StompTransport { config }
    }

    fn connect_stream(&self) -> Result<TcpStream, ChannelError> {
        let addresses = self
            .config
            .address
            .to_socket_addrs()
            .map_err(|e| ChannelError::ConnectionFailed(e.to_string()))?;

        let mut last_error = ChannelError::ConnectionFailed(format!(
            "no se pudo resolver {}",
            self.config.address
        ));
        for address in addresses {
            match TcpStream::connect_timeout(&address, self.config.connect_timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_error = ChannelError::ConnectionFailed(e.to_string()),
            }
        }
        Err(last_error)
    }
}

/// Calcula los intervalos (saliente, entrante) en ms a partir de lo que pide el
/// cliente `(cx, cy)` y lo que responde el broker `(sx, sy)`. Cero significa sin heart-beat.
pub fn negotiate_heartbeat(client: (u64, u64), server: (u64, u64)) -> (u64, u64) {
    let (cx, cy) = client;
    let (sx, sy) = server;
    let outgoing = if cx == 0 || sy == 0 { 0 } else { cx.max(sy) };
    let incoming = if sx == 0 || cy == 0 { 0 } else { sx.max(cy) };
    (outgoing, incoming)
}

impl Transport for StompTransport {
    fn open(&self) -> Result<Box<dyn Session>, ChannelError> {
        let mut stream = self.connect_stream()?;
        stream.set_read_timeout(Some(self.config.connect_timeout))?;

        let heartbeat_ms = self.config.heartbeat.as_millis() as u64;
        let connect = Frame::connect(
            &self.config.host,
            self.config.login.as_deref(),
            self.config.passcode.as_deref(),
            heartbeat_ms,
        );
        connect.write_to(&mut stream)?;

        let mut reader = BufReader::new(stream.try_clone()?);
        let reply = Frame::read_from(&mut reader)?
            .ok_or_else(|| ChannelError::HandshakeRefused("el broker cerro la conexion".to_string()))?;

        match reply.command {
            Command::Connected => {}
            Command::Error => {
                let message = reply.header("message").unwrap_or("sin mensaje").to_string();
                return Err(ChannelError::HandshakeRefused(message));
            }
            other => {
                return Err(ChannelError::HandshakeRefused(format!(
                    "se esperaba CONNECTED y llego {}",
                    other.as_str()
                )))
            }
        }

        let (outgoing, incoming) =
            negotiate_heartbeat((heartbeat_ms, heartbeat_ms), reply.heartbeat()?);
        debug!(outgoing, incoming, "heart-beat negociado");

        // un broker que no manda nada durante dos intervalos se considera caido
        let read_timeout = match incoming {
            0 => None,
            ms => Some(Duration::from_millis(ms * 2)),
        };
        stream.set_read_timeout(read_timeout)?;

        let session = Arc::new(StompSessionInner {
            writer: Mutex::new(stream.try_clone()?),
            reader: Mutex::new(reader),
            control: stream,
            closed: AtomicBool::new(false),
        });

        if outgoing > 0 {
            let heartbeat_session = Arc::clone(&session);
            let interval = Duration::from_millis(outgoing);
            thread::spawn(move || heartbeat_session.run_heartbeat(interval));
        }

        Ok(Box::new(StompSession { inner: session }))
    }
}

struct StompSessionInner {
    writer: Mutex<TcpStream>,
    reader: Mutex<BufReader<TcpStream>>,
    control: TcpStream,
    closed: AtomicBool,
}

impl StompSessionInner {
    fn run_heartbeat(&self, interval: Duration) {
        loop {
            thread::sleep(interval);
            if self.closed.load(Ordering::SeqCst) {
                return;
            }
            let mut writer = lock(&self.writer);
            if let Err(e) = std::io::Write::write_all(&mut *writer, b"\n") {
                debug!("se corta el heart-beat: {}", e);
                return;
            }
        }
    }
}

pub struct StompSession {
    inner: Arc<StompSessionInner>,
}

impl Session for StompSession {
    fn send(&self, frame: &Frame) -> Result<(), ChannelError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(ChannelError::Disconnected);
        }
        let mut writer = lock(&self.inner.writer);
        frame.write_to(&mut *writer)
    }

    fn next_frame(&self) -> Result<Option<Frame>, ChannelError> {
        let mut reader = lock(&self.inner.reader);
        Frame::read_from(&mut *reader)
    }

    fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.inner.control.shutdown(Shutdown::Both) {
            warn!("error al cerrar el socket: {}", e);
        }
    }
}

impl Drop for StompSession {
    fn drop(&mut self) {
        self.close();
    }
}
