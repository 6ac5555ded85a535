use std::fmt;

/// Estado de la conexion logica con el broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Se perdio el transporte y se esta reintentando. `attempt` arranca en 1.
    Reconnecting {
        attempt: u32,
    },
    /// Se agotaron los reintentos. Solo un `connect()` explicito sale de este estado.
    Unavailable,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ConnectionState::Disconnected => write!(f, "desconectado"),
            ConnectionState::Connecting => write!(f, "conectando"),
            ConnectionState::Connected => write!(f, "conectado"),
            ConnectionState::Reconnecting { attempt } => {
                write!(f, "reconectando (intento {})", attempt)
            }
            ConnectionState::Unavailable => write!(f, "no disponible"),
        }
    }
}
