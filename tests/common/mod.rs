#![allow(dead_code)]

use maap::{Client, ClientConfig};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

/// A client whose endpoints all live under `<server>/api`.
pub fn client_for(server: &mockito::Server) -> Client {
    config_for(server, |c| c)
}

pub fn config_for(server: &mockito::Server, adjust: impl FnOnce(ClientConfig) -> ClientConfig) -> Client {
    client_at(&server.url(), adjust)
}

pub fn client_at(base: &str, adjust: impl FnOnce(ClientConfig) -> ClientConfig) -> Client {
    let config = adjust(ClientConfig::new(format!("{base}/api")).with_token("test-token"));
    Client::with_config(config)
        .expect("client")
        .with_progress(false)
}

/// What a [`raw_server`] connection gets back.
pub enum Reply {
    /// A complete 200 response.
    Body(String),
    /// Promises 1000 bytes, sends five, then closes.
    Truncated,
    /// Closes without answering.
    Drop,
    /// Holds the connection open without answering.
    Hang,
}

/// Answers one connection per reply, in order, and returns the base URL.
///
/// Every reply closes its connection, so each request lands on the next one.
pub fn raw_server(replies: Vec<Reply>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let url = format!("http://{}", listener.local_addr().expect("local addr"));
    thread::spawn(move || {
        for reply in replies {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            read_head(&mut stream);
            let _ = match reply {
                Reply::Body(body) => write!(
                    stream,
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                ),
                Reply::Truncated => stream.write_all(
                    b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\nConnection: close\r\n\r\n<wps:",
                ),
                Reply::Drop => Ok(()),
                Reply::Hang => {
                    thread::sleep(Duration::from_secs(30));
                    Ok(())
                }
            };
        }
    });
    url
}

fn read_head(stream: &mut TcpStream) {
    let mut seen = Vec::new();
    let mut buf = [0u8; 1024];
    while !seen.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => return,
            Ok(n) => seen.extend_from_slice(&buf[..n]),
        }
    }
}

/// An echo10 results page with one granule per id.
pub fn granule_page(ids: &[String]) -> String {
    let results: String = ids
        .iter()
        .map(|id| {
            format!(
                r#"<result concept-id="{id}" collection-concept-id="C1-MAAP" format="application/echo10+xml">
  <Granule>
    <GranuleUR>{id}_UR</GranuleUR>
    <LastUpdate>2021-06-01T00:00:00Z</LastUpdate>
    <OnlineAccessURLs>
      <OnlineAccessURL><URL>https://data.example/file/{id}.h5</URL></OnlineAccessURL>
    </OnlineAccessURLs>
  </Granule>
</result>"#
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><results><hits>{}</hits><took>5</took>{}</results>"#,
        ids.len(),
        results
    )
}

pub fn ids(range: std::ops::Range<usize>) -> Vec<String> {
    range.map(|i| format!("G{i}-MAAP")).collect()
}
