use super::*;

use std::io::{BufRead as _, BufReader, Write as _};
use std::net::TcpListener;
use std::sync::mpsc;

fn png_bytes() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(4, 4, image::Rgb([10, 20, 30]));
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

fn layer() -> LayerSpec {
    LayerSpec {
        name: "disk".to_string(),
        selector: "[SDO,AIA,AIA,171,1,100]".to_string(),
        scale: 2.5,
        width: 64,
        height: 48,
        x0: 0.0,
        y0: 0.0,
    }
}

fn ts() -> DateTime<Utc> {
    crate::foundation::core::parse_api_timestamp("2024-03-01T01:15:00.250Z").unwrap()
}

/// Serve exactly one canned HTTP response and report the request line.
fn serve_once(status: &str, content_type: &str, body: Vec<u8>) -> (String, mpsc::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::channel();
    let status = status.to_string();
    let content_type = content_type.to_string();
    std::thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut request_line = String::new();
        reader.read_line(&mut request_line).unwrap();
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            if line == "\r\n" || line.is_empty() {
                break;
            }
        }
        let mut stream = stream;
        let head = format!(
            "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        stream.write_all(head.as_bytes()).unwrap();
        stream.write_all(&body).unwrap();
        let _ = tx.send(request_line);
    });
    (format!("http://{addr}/v2/takeScreenshot/"), rx)
}

fn source(endpoint: &str) -> HttpImageSource {
    HttpImageSource::with_timeout(endpoint, Duration::from_secs(5), 1024 * 1024)
}

#[test]
fn sniff_recognizes_png_and_jpeg() {
    assert_eq!(sniff_raster_format(&png_bytes()), Some(RasterFormat::Png));
    assert_eq!(
        sniff_raster_format(&[0xFF, 0xD8, 0xFF, 0xE0, 0, 0]),
        Some(RasterFormat::Jpeg)
    );
    assert_eq!(sniff_raster_format(b"{\"error\":1}"), None);
    assert_eq!(sniff_raster_format(&[]), None);
}

#[test]
fn validate_rejects_non_image_content() {
    let png = png_bytes();
    assert!(validate_raster(Some("image/png"), &png).is_ok());
    assert!(validate_raster(None, &png).is_ok());
    assert!(validate_raster(Some("application/octet-stream"), &png).is_ok());

    let err = validate_raster(Some("text/html; charset=utf-8"), &png).unwrap_err();
    assert!(matches!(err, FetchError::InvalidContent(_)));

    let err = validate_raster(Some("image/png"), b"not really").unwrap_err();
    assert!(matches!(err, FetchError::InvalidContent(_)));

    let err = validate_raster(Some("image/png"), &[]).unwrap_err();
    assert!(matches!(err, FetchError::InvalidContent(_)));
}

#[test]
fn params_carry_whole_second_timestamp() {
    let params = screenshot_params(ts(), &layer());
    let date = params.iter().find(|(k, _)| *k == "date").unwrap();
    assert_eq!(date.1, "2024-03-01T01:15:00Z");
    assert!(params.iter().any(|(k, v)| *k == "width" && v == "64"));
    assert!(params.iter().any(|(k, v)| *k == "layers" && v.contains("AIA")));
}

#[test]
fn http_source_returns_image_bytes() {
    let png = png_bytes();
    let (url, rx) = serve_once("200 OK", "image/png", png.clone());
    let got = source(&url).fetch(ts(), &layer()).unwrap();
    assert_eq!(got, png);

    let request_line = rx.recv().unwrap();
    assert!(request_line.starts_with("GET /v2/takeScreenshot/?"));
    assert!(request_line.contains("imageScale=2.5"));
    assert!(!request_line.contains(".250"));
}

#[test]
fn http_source_flags_html_as_invalid_content() {
    let (url, _rx) = serve_once("200 OK", "text/html", b"<html>no data</html>".to_vec());
    let err = source(&url).fetch(ts(), &layer()).unwrap_err();
    assert!(matches!(err, FetchError::InvalidContent(_)), "{err:?}");
}

#[test]
fn http_source_maps_server_errors_to_transport() {
    let (url, _rx) = serve_once("503 Service Unavailable", "text/plain", b"busy".to_vec());
    let err = source(&url).fetch(ts(), &layer()).unwrap_err();
    assert!(err.is_transient(), "{err:?}");
}

#[test]
fn http_source_maps_client_errors_to_invalid_content() {
    let (url, _rx) = serve_once("404 Not Found", "application/json", b"{}".to_vec());
    let err = source(&url).fetch(ts(), &layer()).unwrap_err();
    assert!(matches!(err, FetchError::InvalidContent(_)), "{err:?}");
}

#[test]
fn http_source_reports_refused_connection_as_transport() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let err = source(&format!("http://{addr}/"))
        .fetch(ts(), &layer())
        .unwrap_err();
    assert!(err.is_transient(), "{err:?}");
}

#[test]
fn http_source_times_out_on_silent_server() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = std::thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        std::thread::sleep(Duration::from_secs(3));
        drop(stream);
    });
    let src = HttpImageSource::with_timeout(
        &format!("http://{addr}/"),
        Duration::from_secs(1),
        1024,
    );
    let err = src.fetch(ts(), &layer()).unwrap_err();
    assert!(matches!(err, FetchError::Timeout { .. }), "{err:?}");
    handle.join().unwrap();
}
