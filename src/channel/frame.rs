use std::io::{BufRead, BufWriter, Write};

use crate::utils::{reader::*, writer::*};

use super::channel_error::ChannelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Connected,
    Subscribe,
    Unsubscribe,
    Send,
    Message,
    Error,
    Disconnect,
    Receipt,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Connected => "CONNECTED",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Send => "SEND",
            Command::Message => "MESSAGE",
            Command::Error => "ERROR",
            Command::Disconnect => "DISCONNECT",
            Command::Receipt => "RECEIPT",
        }
    }

    pub fn parse(raw: &str) -> Option<Command> {
        match raw {
            "CONNECT" | "STOMP" => Some(Command::Connect),
            "CONNECTED" => Some(Command::Connected),
            "SUBSCRIBE" => Some(Command::Subscribe),
            "UNSUBSCRIBE" => Some(Command::Unsubscribe),
            "SEND" => Some(Command::Send),
            "MESSAGE" => Some(Command::Message),
            "ERROR" => Some(Command::Error),
            "DISCONNECT" => Some(Command::Disconnect),
            "RECEIPT" => Some(Command::Receipt),
            _ => None,
        }
    }
}

/// Un frame STOMP 1.2: comando, headers y cuerpo.
///
/// Los headers se guardan en el orden en que llegaron. Si un header esta repetido
/// vale la primera aparicion.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Frame {
    pub fn new(command: Command) -> Frame {
        Frame {
            command,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, key: &str, value: &str) -> Frame {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Frame {
        self.body = body;
        self
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn connect(host: &str, login: Option<&str>, passcode: Option<&str>, heartbeat_ms: u64) -> Frame {
        let mut frame = Frame::new(Command::Connect)
            .with_header("accept-version", "1.2")
            .with_header("host", host)
            .with_header("heart-beat", &format!("{},{}", heartbeat_ms, heartbeat_ms));
        if let Some(login) = login {
            frame = frame.with_header("login", login);
        }
        if let Some(passcode) = passcode {
            frame = frame.with_header("passcode", passcode);
        }
        frame
    }

    pub fn subscribe(id: &str, destination: &str) -> Frame {
        Frame::new(Command::Subscribe)
            .with_header("id", id)
            .with_header("destination", destination)
            .with_header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Frame {
        Frame::new(Command::Unsubscribe).with_header("id", id)
    }

    pub fn disconnect() -> Frame {
        Frame::new(Command::Disconnect)
    }

    /// Devuelve el par `(cx, cy)` del header `heart-beat`, o `(0, 0)` si no esta.
    pub fn heartbeat(&self) -> Result<(u64, u64), ChannelError> {
        let raw = match self.header("heart-beat") {
            Some(raw) => raw,
            None => return Ok((0, 0)),
        };
        let (x, y) = raw
            .split_once(',')
            .ok_or_else(|| ChannelError::MalformedFrame(format!("heart-beat invalido: {}", raw)))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<u64>()
                .map_err(|_| ChannelError::MalformedFrame(format!("heart-beat invalido: {}", raw)))
        };
        Ok((parse(x)?, parse(y)?))
    }

    pub fn write_to(&self, stream: &mut dyn Write) -> Result<(), ChannelError> {
        let mut writer = BufWriter::new(stream);
        write_line(&mut writer, self.command.as_str())?;
        write_headers(&mut writer, &self.headers)?;
        if !self.body.is_empty() && self.header("content-length").is_none() {
            write_line(&mut writer, &format!("content-length:{}", self.body.len()))?;
        }
        write_line(&mut writer, "")?;
        write_body(&mut writer, &self.body)?;
        writer.flush()?;
        Ok(())
    }

    /// Lee el proximo frame del stream salteando los EOL de heart-beat.
    ///
    /// Devuelve `Ok(None)` si el stream se cerro entre frames. Un frame con un
    /// comando desconocido, un header mal formado, texto que no es UTF-8 o un
    /// `content-length` mayor a `MAX_FRAME_BODY` se consume entero hasta el NUL y
    /// se devuelve `MalformedFrame`, de modo que el stream queda alineado.
    pub fn read_from(stream: &mut dyn BufRead) -> Result<Option<Frame>, ChannelError> {
        let raw_command = loop {
            match read_line(stream)? {
                None => return Ok(None),
                Some(line) if line.is_empty() => continue,
                Some(line) => break line,
            }
        };

        let mut problem: Option<String> = None;
        let command_line = match String::from_utf8(raw_command) {
            Ok(line) => line,
            Err(_) => {
                problem.get_or_insert("comando que no es UTF-8".to_string());
                String::new()
            }
        };

        let mut headers = Vec::new();
        loop {
            let raw = read_line(stream)?
                .ok_or_else(|| ChannelError::Io("el stream se cerro en los headers".to_string()))?;
            if raw.is_empty() {
                break;
            }
            let line = match String::from_utf8(raw) {
                Ok(line) => line,
                Err(_) => {
                    problem.get_or_insert("header que no es UTF-8".to_string());
                    continue;
                }
            };
            match line.split_once(':') {
                Some((key, value)) => match (unescape_header(key), unescape_header(value)) {
                    (Ok(key), Ok(value)) => headers.push((key, value)),
                    _ => {
                        problem.get_or_insert(format!("header con escape invalido: {}", line));
                    }
                },
                None => {
                    problem.get_or_insert(format!("header sin ':': {}", line));
                }
            }
        }

        let content_length = headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .map(|(_, v)| v.parse::<usize>());
        let body = match content_length {
            Some(Ok(length)) if length <= MAX_FRAME_BODY => read_exact_body(stream, length)?,
            Some(Ok(length)) => {
                problem.get_or_insert(format!("content-length demasiado grande: {}", length));
                read_until_nul(stream)?
            }
            Some(Err(_)) => {
                problem.get_or_insert("content-length invalido".to_string());
                read_until_nul(stream)?
            }
            None => read_until_nul(stream)?,
        };

        if let Some(problem) = problem {
            return Err(ChannelError::MalformedFrame(problem));
        }
        let command = match Command::parse(&command_line) {
            Some(command) => command,
            None => {
                return Err(ChannelError::MalformedFrame(format!(
                    "comando desconocido: {}",
                    command_line
                )))
            }
        };

        Ok(Some(Frame {
            command,
            headers,
            body,
        }))
    }
}
