//! Local HTTP callback server for OAuth authentication.
//!
//! Listens on the loopback port named by the redirect URI, answers the
//! browser with a short result page and hands the callback URL back to the
//! interactive sign-in flow.

use crate::error::AuthError;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};
use url::Url;

/// How long a single browser connection may take to send its request line.
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// One-shot listener for the OAuth redirect.
pub struct CallbackServer {
    listener: TcpListener,
    origin: String,
    path: String,
}

impl CallbackServer {
    /// Bind to the port of `redirect_uri` on 127.0.0.1.
    ///
    /// Bind before opening the browser so the redirect cannot arrive early.
    pub async fn bind(redirect_uri: &str) -> Result<Self, AuthError> {
        let url = Url::parse(redirect_uri)
            .map_err(|e| AuthError::Transport(format!("invalid redirect URI: {}", e)))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| AuthError::Transport("redirect URI has no port".into()))?;

        let addr = format!("127.0.0.1:{}", port);
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            error!("Failed to bind callback server to {}: {}", addr, e);
            AuthError::Transport(format!("Failed to start callback server: {}", e))
        })?;

        info!("OAuth callback server listening on {}", addr);

        Ok(Self {
            listener,
            origin: url.origin().ascii_serialization(),
            path: url.path().to_string(),
        })
    }

    /// Local address the server is bound to.
    pub fn local_port(&self) -> Option<u16> {
        self.listener.local_addr().ok().map(|a| a.port())
    }

    /// Wait for the redirect and return the full callback URL.
    pub async fn wait(self, timeout: Duration) -> Result<String, AuthError> {
        tokio::time::timeout(timeout, self.accept_loop())
            .await
            .map_err(|_| AuthError::CallbackTimeout)?
    }

    async fn accept_loop(&self) -> Result<String, AuthError> {
        loop {
            let (stream, peer) = self
                .listener
                .accept()
                .await
                .map_err(|e| AuthError::Transport(format!("Connection error: {}", e)))?;
            debug!("Connection from {}", peer);

            if let Some(target) = self.handle_connection(stream).await {
                info!("OAuth callback received");
                return Ok(format!("{}{}", self.origin, target));
            }
        }
    }

    /// Returns the request target if this was the OAuth redirect.
    async fn handle_connection(&self, mut stream: TcpStream) -> Option<String> {
        let mut buffer = [0u8; 4096];
        let read = tokio::time::timeout(READ_TIMEOUT, stream.read(&mut buffer)).await;
        let bytes_read = match read {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                debug!("Failed to read request: {}", e);
                return None;
            }
            Err(_) => {
                debug!("Timed out reading request");
                return None;
            }
        };

        let request = String::from_utf8_lossy(&buffer[..bytes_read]);
        let request_line = request.lines().next()?;
        debug!("Received request: {}", request_line);

        let mut parts = request_line.split_whitespace();
        let (method, target) = match (parts.next(), parts.next()) {
            (Some(m), Some(t)) => (m, t.to_string()),
            _ => {
                respond(&mut stream, 400, "Bad Request", "text/plain", "Bad Request").await;
                return None;
            }
        };

        if method != "GET" {
            respond(&mut stream, 405, "Method Not Allowed", "text/plain", "Method Not Allowed")
                .await;
            return None;
        }

        let target_path = target.split('?').next().unwrap_or_default();
        if target_path != self.path {
            respond(&mut stream, 404, "Not Found", "text/plain", "Not Found").await;
            return None;
        }

        let query = target.split_once('?').map(|(_, q)| q).unwrap_or_default();
        let html = if query.contains("error=") {
            result_page("Sign-in failed", &error_description(query))
        } else if query.contains("code=") {
            result_page("Signed in", "You can close this tab and return to the terminal.")
        } else {
            respond(&mut stream, 400, "Bad Request", "text/plain", "Missing authorization code")
                .await;
            return None;
        };

        respond(&mut stream, 200, "OK", "text/html; charset=utf-8", &html).await;
        Some(target)
    }
}

fn error_description(query: &str) -> String {
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("error_description="))
        .map(|raw| {
            urlencoding::decode(&raw.replace('+', " "))
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| "Authentication failed".into())
        })
        .unwrap_or_else(|| "Authentication was cancelled or failed.".to_string())
}

fn result_page(title: &str, message: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"UTF-8\"><title>{title}</title></head>\n\
         <body style=\"font-family: sans-serif; text-align: center; margin-top: 4rem\">\n\
         <h1>{title}</h1>\n<p>{message}</p>\n</body>\n</html>",
        title = html_escape(title),
        message = html_escape(message),
    )
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

async fn respond(stream: &mut TcpStream, status: u16, reason: &str, content_type: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        content_type,
        body.len(),
        body
    );

    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.flush().await;
}
