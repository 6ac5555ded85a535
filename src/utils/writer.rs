use std::io::{Error, Write};

/// Escribe una linea terminada en `\n`.
pub fn write_line(stream: &mut dyn Write, line: &str) -> Result<(), Error> {
    stream.write_all(line.as_bytes())?;
    stream.write_all(b"\n")?;
    Ok(())
}

///Recibe una lista de headers y el stream al que escribirlos
///
/// Cada header se escribe como `clave:valor` con ambos lados escapados.
pub fn write_headers(stream: &mut dyn Write, headers: &[(String, String)]) -> Result<(), Error> {
    for (key, value) in headers {
        let line = format!("{}:{}", escape_header(key), escape_header(value));
        write_line(stream, &line)?;
    }
    Ok(())
}

/// Escribe el cuerpo seguido del octeto NUL que cierra el frame.
pub fn write_body(stream: &mut dyn Write, body: &[u8]) -> Result<(), Error> {
    stream.write_all(body)?;
    stream.write_all(&[0])?;
    Ok(())
}

/// Escapa `\`, `\n`, `\r` y `:` segun STOMP 1.2.
pub fn escape_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}
