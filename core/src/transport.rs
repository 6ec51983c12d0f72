//! Pluggable HTTP transport.
//!
//! # Design
//! `ApiClient` never touches sockets. It hands a signed `HttpRequest` to a
//! `Transport` and gets an `HttpResponse` back; any status code, including
//! 4xx/5xx, is a response, and only a failed exchange is an error. The
//! default `UreqTransport` is blocking, which matches the one-call,
//! one-round-trip model of the client. Tests substitute in-memory transports.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use ureq::tls::{PemItem, RootCerts, TlsConfig};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::http::{Headers, HttpRequest, HttpResponse};

/// Executes one HTTP exchange.
pub trait Transport: Send + Sync {
    /// Send `request` and return whatever the server answered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] when no response could be obtained.
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        (**self).send(request)
    }
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        (**self).send(request)
    }
}

/// Where raw wire traces go when debugging is enabled.
enum WireLog {
    Off,
    Tracing,
    File(Mutex<File>),
}

/// Blocking transport backed by `ureq`.
pub struct UreqTransport {
    agent: ureq::Agent,
    wire_log: WireLog,
}

impl UreqTransport {
    /// Build an agent honouring the timeout, TLS and debug settings of `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the CA bundle holds no certificate,
    /// and [`Error::Io`] if the bundle or the debug file cannot be opened.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let tls = tls_config(config.certificate_authority.as_deref(), config.verify_tls)?;
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(config.timeout()))
            .timeout_connect(Some(config.timeout().min(Duration::from_secs(10))))
            .tls_config(tls)
            .build()
            .new_agent();

        let wire_log = match (&config.debug_file, config.debug) {
            (_, false) => WireLog::Off,
            (Some(path), true) => {
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                WireLog::File(Mutex::new(file))
            }
            (None, true) => WireLog::Tracing,
        };

        Ok(Self { agent, wire_log })
    }

    fn trace(&self, direction: &str, head: &str, headers: &Headers, body: Option<&[u8]>) {
        if matches!(self.wire_log, WireLog::Off) {
            return;
        }
        let mut text = format!("{direction} {head}\n");
        for (name, value) in headers.iter() {
            text.push_str(&format!("{name}: {value}\n"));
        }
        if let Some(body) = body {
            text.push('\n');
            text.push_str(&String::from_utf8_lossy(body));
            text.push('\n');
        }
        match &self.wire_log {
            WireLog::Off => {}
            WireLog::Tracing => tracing::debug!(target: "payment_sdk::wire", "{text}"),
            WireLog::File(file) => {
                if let Ok(mut file) = file.lock() {
                    // Tracing is best effort; a failing debug sink must not fail the call.
                    let _ = file.write_all(text.as_bytes());
                }
            }
        }
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        self.trace(
            ">",
            &format!("{} {}", request.method, request.url),
            &request.headers,
            request.body.as_deref(),
        );

        let mut builder = ureq::http::Request::builder()
            .method(request.method.as_str())
            .uri(request.url.as_str());
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        let sent = match &request.body {
            Some(body) => builder.body(body.as_slice()).map(|r| self.agent.run(r)),
            None => builder.body(()).map(|r| self.agent.run(r)),
        };
        let mut response = sent
            .map_err(|e| Error::Connection(format!("request could not be built: {e}")))?
            .map_err(|e| Error::Connection(e.to_string()))?;

        let status = response.status().as_u16();
        let headers: Headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v.to_string())))
            .collect();
        // Downloads are materialized whole, so lift ureq's default 10 MiB cap.
        let body = response
            .body_mut()
            .with_config()
            .limit(u64::MAX)
            .read_to_vec()
            .map_err(|e| Error::Connection(format!("reading response body failed: {e}")))?;

        self.trace("<", &status.to_string(), &headers, Some(&body));
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn tls_config(certificate_authority: Option<&Path>, verify: bool) -> Result<TlsConfig> {
    let mut builder = TlsConfig::builder();
    if !verify {
        builder = builder.disable_verification(true);
    }
    if let Some(path) = certificate_authority {
        let pem = std::fs::read(path)?;
        let certs: Vec<_> = ureq::tls::parse_pem(&pem)
            .filter_map(|item| match item {
                Ok(PemItem::Certificate(cert)) => Some(cert.to_owned()),
                _ => None,
            })
            .collect();
        if certs.is_empty() {
            return Err(Error::configuration(format!(
                "certificate authority file {} contains no certificate",
                path.display()
            )));
        }
        builder = builder.root_certs(RootCerts::new_with_certs(&certs));
    }
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ca_bundle_without_certificates_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.pem");
        std::fs::write(&path, "not a certificate").unwrap();
        let config = ClientConfig::new(1, "c2VjcmV0").with_certificate_authority(&path);
        assert!(matches!(
            UreqTransport::new(&config),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn refused_connection_is_a_connection_error() {
        // Bind then drop to get a port with nothing listening on it.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let transport = UreqTransport::new(&ClientConfig::new(1, "c2VjcmV0")).unwrap();
        let request = HttpRequest {
            method: crate::http::HttpMethod::Get,
            url: format!("http://127.0.0.1:{port}/api/account/read"),
            headers: Headers::new(),
            body: None,
            correlation_id: "00000000-0000-0000-0000-000000000000".to_string(),
        };
        assert!(matches!(transport.send(&request), Err(Error::Connection(_))));
    }

    #[test]
    fn large_downloads_are_read_in_full() {
        use std::io::Read;

        const SIZE: usize = 11 * 1024 * 1024;
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut head = Vec::new();
            let mut byte = [0u8; 1];
            while !head.ends_with(b"\r\n\r\n") {
                stream.read_exact(&mut byte).unwrap();
                head.push(byte[0]);
            }
            let header = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/pdf\r\nContent-Length: {SIZE}\r\nConnection: close\r\n\r\n"
            );
            stream.write_all(header.as_bytes()).unwrap();
            stream.write_all(&vec![b'x'; SIZE]).unwrap();
        });

        let transport = UreqTransport::new(&ClientConfig::new(1, "c2VjcmV0")).unwrap();
        let request = HttpRequest {
            method: crate::http::HttpMethod::Get,
            url: format!("http://127.0.0.1:{port}/api/transaction/getInvoiceDocument"),
            headers: Headers::new(),
            body: None,
            correlation_id: "00000000-0000-0000-0000-000000000000".to_string(),
        };
        let response = transport.send(&request).unwrap();
        server.join().unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body.len(), SIZE);
    }

    #[test]
    fn debug_file_is_created_when_debugging() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wire.log");
        let config = ClientConfig::new(1, "c2VjcmV0").with_debug_file(&path);
        let transport = UreqTransport::new(&config).unwrap();
        transport.trace(">", "GET http://x/y", &Headers::new(), Some(b"{}"));
        let logged = std::fs::read_to_string(&path).unwrap();
        assert!(logged.starts_with("> GET http://x/y"));
    }
}
