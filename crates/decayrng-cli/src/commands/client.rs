use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

const READ_TIMEOUT: Duration = Duration::from_secs(10);

pub fn run(host: &str, port: u16, requests: usize, stats: bool) -> io::Result<()> {
    let stream = TcpStream::connect((host, port))?;
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);

    let greeting = read_line(&mut reader)?;
    if greeting != "ready" {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unexpected greeting: {greeting:?}"),
        ));
    }
    log::info!("connected to {host}:{port}");

    for _ in 0..requests {
        writer.write_all(b"req")?;
        println!("RNG: {}", read_line(&mut reader)?);
    }

    if stats {
        writer.write_all(b"sta")?;
        println!("STATS: {}", read_line(&mut reader)?);
    }

    writer.write_all(b"end")?;
    let mut rest = Vec::new();
    reader.read_to_end(&mut rest)?;
    if !rest.is_empty() {
        log::warn!("{} unexpected bytes before close", rest.len());
    }
    println!("Disconnected.");
    Ok(())
}

fn read_line(reader: &mut impl BufRead) -> io::Result<String> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "server closed the connection",
        ));
    }
    Ok(line.trim_end_matches('\n').to_string())
}
