use std::io::{BufRead, Error, ErrorKind, Read};

/// Tamano maximo del cuerpo de un frame.
pub const MAX_FRAME_BODY: usize = 4 * 1024 * 1024;

/// Largo maximo de la linea de comando o de un header.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Lee una linea terminada en `\n` (o `\r\n`) y devuelve sus bytes sin el terminador.
///
/// Devuelve `Ok(None)` si el stream llego a su fin antes de leer un solo byte.
/// Una linea de mas de `MAX_LINE_LENGTH` bytes es un error.
pub fn read_line(stream: &mut dyn BufRead) -> Result<Option<Vec<u8>>, Error> {
    let mut buf = Vec::new();
    let read = Read::take(&mut *stream, MAX_LINE_LENGTH as u64 + 1).read_until(b'\n', &mut buf)?;
    if read == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
    } else if buf.len() > MAX_LINE_LENGTH {
        return Err(Error::new(ErrorKind::InvalidData, "linea demasiado larga"));
    }
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    Ok(Some(buf))
}

/// Lee exactamente `length` bytes seguidos del octeto NUL que cierra un frame.
///
/// `length` tiene que ser como mucho `MAX_FRAME_BODY`.
pub fn read_exact_body(stream: &mut dyn BufRead, length: usize) -> Result<Vec<u8>, Error> {
    if length > MAX_FRAME_BODY {
        return Err(Error::new(ErrorKind::InvalidData, "cuerpo demasiado grande"));
    }
    let mut body = Vec::new();
    Read::take(&mut *stream, length as u64).read_to_end(&mut body)?;
    if body.len() < length {
        return Err(Error::new(
            ErrorKind::UnexpectedEof,
            "el stream se cerro en el cuerpo",
        ));
    }

    let mut terminator = [0u8; 1];
    stream.read_exact(&mut terminator)?;
    if terminator[0] != 0 {
        return Err(Error::new(
            ErrorKind::InvalidData,
            "el cuerpo no termina en NUL",
        ));
    }
    Ok(body)
}

/// Lee hasta el octeto NUL (que se consume pero no se devuelve).
///
/// Un cuerpo de mas de `MAX_FRAME_BODY` bytes sin NUL es un error.
pub fn read_until_nul(stream: &mut dyn BufRead) -> Result<Vec<u8>, Error> {
    let mut body = Vec::new();
    Read::take(&mut *stream, MAX_FRAME_BODY as u64 + 1).read_until(0, &mut body)?;
    if body.last() != Some(&0) {
        if body.len() > MAX_FRAME_BODY {
            return Err(Error::new(ErrorKind::InvalidData, "cuerpo demasiado grande"));
        }
        return Err(Error::new(
            ErrorKind::UnexpectedEof,
            "el frame termino sin NUL",
        ));
    }
    body.pop();
    Ok(body)
}

/// Revierte el escapado de un header STOMP 1.2 (`\\`, `\n`, `\r`, `\c`).
pub fn unescape_header(raw: &str) -> Result<String, Error> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(Error::new(
                    ErrorKind::InvalidData,
                    format!("secuencia de escape invalida: \\{}", other.unwrap_or(' ')),
                ))
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_line() {
        let mut cursor = Cursor::new(b"MESSAGE\r\nrest".to_vec());
        assert_eq!(read_line(&mut cursor).unwrap(), Some(b"MESSAGE".to_vec()));
        assert_eq!(read_line(&mut cursor).unwrap(), Some(b"rest".to_vec()));
        assert_eq!(read_line(&mut cursor).unwrap(), None);
    }

    #[test]
    fn test_read_line_too_long() {
        let mut raw = vec![b'a'; MAX_LINE_LENGTH + 10];
        raw.push(b'\n');
        assert!(read_line(&mut Cursor::new(raw)).is_err());

        let mut raw = vec![b'a'; MAX_LINE_LENGTH];
        raw.push(b'\n');
        assert_eq!(read_line(&mut Cursor::new(raw)).unwrap().unwrap().len(), MAX_LINE_LENGTH);
    }

    #[test]
    fn test_read_exact_body() {
        let mut cursor = Cursor::new(b"hola\0".to_vec());
        assert_eq!(read_exact_body(&mut cursor, 4).unwrap(), b"hola".to_vec());

        let mut cursor = Cursor::new(b"holax".to_vec());
        assert!(read_exact_body(&mut cursor, 4).is_err());

        let mut cursor = Cursor::new(b"ho".to_vec());
        assert!(read_exact_body(&mut cursor, 4).is_err());

        let mut cursor = Cursor::new(b"{}\0".to_vec());
        assert!(read_exact_body(&mut cursor, usize::MAX).is_err());
    }

    #[test]
    fn test_read_until_nul() {
        let mut cursor = Cursor::new(b"{}\0\n".to_vec());
        assert_eq!(read_until_nul(&mut cursor).unwrap(), b"{}".to_vec());

        let mut cursor = Cursor::new(b"{}".to_vec());
        assert!(read_until_nul(&mut cursor).is_err());

        let mut cursor = Cursor::new(vec![b'x'; MAX_FRAME_BODY + 2]);
        let error = read_until_nul(&mut cursor).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn test_unescape_header() {
        assert_eq!(unescape_header("a\\cb\\nc\\\\").unwrap(), "a:b\nc\\");
        assert!(unescape_header("bad\\t").is_err());
    }
}
