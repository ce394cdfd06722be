use std::fs;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use tempfile::TempDir;

/// Temp dir holding a receipt image and a config file pointing at `base_url`.
pub struct TestEnv {
    _tmp: TempDir,
    pub config: PathBuf,
    pub image: PathBuf,
}

impl TestEnv {
    pub fn new(api_key: &str, base_url: &str) -> Self {
        let tmp = TempDir::new().expect("create temp dir");
        let config = tmp.path().join("GenerativeAI-Info.toml");
        fs::write(
            &config,
            format!("API_KEY = \"{}\"\nMODEL = \"gemini-test\"\nBASE_URL = \"{}\"\nTIMEOUT_SECS = 10\n", api_key, base_url),
        )
        .expect("write config");

        let image = tmp.path().join("receipt.png");
        image::RgbaImage::from_pixel(6, 9, image::Rgba([250, 250, 250, 255]))
            .save(&image)
            .expect("write receipt image");

        Self { _tmp: tmp, config, image }
    }
}

/// One-shot HTTP server returning a canned JSON response.
pub fn serve_once(status: u16, body: &str) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub server");
    let base_url = format!("http://{}/v1beta", listener.local_addr().unwrap());
    let body = body.to_string();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        drain_request(&mut stream);
        let response = format!(
            "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).expect("write response");
    });
    (base_url, handle)
}

fn drain_request(stream: &mut TcpStream) {
    let mut data = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = stream.read(&mut buf).expect("read request");
        if n == 0 {
            return;
        }
        data.extend_from_slice(&buf[..n]);
        if let Some(end) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            let headers = String::from_utf8_lossy(&data[..end]).to_ascii_lowercase();
            let length = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if data.len() >= end + 4 + length {
                return;
            }
        }
    }
}
