use std::time::Duration;
use log::{debug, error};
use thiserror::Error;

/// Error types that can occur when talking HTTP to a remote service
#[derive(Debug, Error)]
pub enum HttpClientError {
    #[error("HTTP request error: {0}")]
    RequestError(String),

    #[error("Failed to read response: {0}")]
    ParseError(String),
}

/// Raw response as seen by the transport. Status codes >= 400 are not
/// errors at this level; the API layer decides what they mean.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A trait for form-posting HTTP transports.
/// Kept object safe so clients can hold an `Arc<dyn FormTransport>`.
pub trait FormTransport: Send + Sync + std::fmt::Debug {
    /// Send a POST request with an `application/x-www-form-urlencoded` body
    fn post_form(&self, url: &str, params: &[(&str, &str)]) -> Result<HttpResponse, HttpClientError>;
}

/// A transport implementation using ureq
#[derive(Clone, Debug)]
pub struct UreqFormTransport {
    agent: ureq::Agent,
    timeout: Duration,
}

impl Default for UreqFormTransport {
    fn default() -> Self {
        Self::new(10)
    }
}

impl UreqFormTransport {
    /// Create a new transport with the specified timeout
    pub fn new(timeout_secs: u64) -> Self {
        let timeout = Duration::from_secs(timeout_secs);
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl FormTransport for UreqFormTransport {
    fn post_form(&self, url: &str, params: &[(&str, &str)]) -> Result<HttpResponse, HttpClientError> {
        debug!("POST form request to {} ({} fields)", url, params.len());

        match self.agent.post(url).send_form(params) {
            Ok(response) => {
                let status = response.status();
                let body = response
                    .into_string()
                    .map_err(|e| HttpClientError::ParseError(format!("Failed to read response body: {}", e)))?;
                Ok(HttpResponse { status, body })
            }
            Err(ureq::Error::Status(status, response)) => {
                let body = response
                    .into_string()
                    .unwrap_or_else(|_| "<empty response body>".to_string());
                debug!("POST request to {} returned HTTP {}", url, status);
                Ok(HttpResponse { status, body })
            }
            Err(e) => {
                error!("POST request to {} failed: {}", url, e);
                Err(HttpClientError::RequestError(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_range() {
        assert!(HttpResponse { status: 200, body: String::new() }.is_success());
        assert!(HttpResponse { status: 204, body: String::new() }.is_success());
        assert!(!HttpResponse { status: 403, body: String::new() }.is_success());
        assert!(!HttpResponse { status: 500, body: String::new() }.is_success());
    }

    #[test]
    fn test_unreachable_host_is_request_error() {
        let transport = UreqFormTransport::new(1);
        assert_eq!(transport.timeout(), Duration::from_secs(1));

        // Port 9 on localhost is the discard port and is almost never bound
        let result = transport.post_form("http://127.0.0.1:9/2.0/", &[("method", "auth.getToken")]);
        assert!(matches!(result, Err(HttpClientError::RequestError(_))));
    }
}
