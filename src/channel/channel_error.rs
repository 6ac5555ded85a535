use thiserror::Error;

/// Errores que puede devolver el cliente del canal en tiempo real.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChannelError {
    #[error("Error al conectar al broker: {0}")]
    ConnectionFailed(String),

    #[error("Error: el broker rechazo el handshake: {0}")]
    HandshakeRefused(String),

    #[error("Error: frame malformado: {0}")]
    MalformedFrame(String),

    #[error("Error de entrada/salida en el stream: {0}")]
    Io(String),

    #[error("Error: el canal no esta disponible, se agotaron los reintentos")]
    Unavailable,

    #[error("Error: el cliente fue desconectado")]
    Disconnected,
}

impl From<std::io::Error> for ChannelError {
    fn from(err: std::io::Error) -> Self {
        ChannelError::Io(err.to_string())
    }
}
