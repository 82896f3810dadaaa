use reqwest::StatusCode;

use waypoint_core::{
    BoxFuture, DirectoryRequest, DirectoryTransport, RawSnapshot, Result, WaypointError,
};

/// Directory transport over HTTP.
///
/// Speaks the etcd v2 keys API: `GET http://host:port/<path>?<params>`.
/// The per-request timeout covers the whole exchange, so long-polls must be
/// issued with a timeout longer than the server's hold time.
#[derive(Clone)]
pub struct HttpDirectoryTransport {
    client: reqwest::Client,
}

impl HttpDirectoryTransport {
    /// Create a transport with a default client.
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    /// Create a transport around an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Full URL for a request, without query parameters.
    pub fn url(request: &DirectoryRequest) -> String {
        let path = if request.path.starts_with('/') {
            request.path.clone()
        } else {
            format!("/{}", request.path)
        };
        format!("http://{}:{}{}", request.host, request.port, path)
    }

    async fn send(&self, request: DirectoryRequest) -> Result<Option<RawSnapshot>> {
        let url = Self::url(&request);

        let response = self
            .client
            .get(&url)
            .query(&request.params)
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| classify(&url, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            tracing::debug!(url = %url, "Directory not found");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(WaypointError::Transport(format!(
                "{} answered {}",
                url, status
            )));
        }

        let body = response.bytes().await.map_err(|e| classify(&url, e))?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        let raw: RawSnapshot = serde_json::from_slice(&body).map_err(|e| {
            WaypointError::Transport(format!("{} returned an undecodable body: {}", url, e))
        })?;
        Ok(Some(raw))
    }
}

impl Default for HttpDirectoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectoryTransport for HttpDirectoryTransport {
    fn fetch(&self, request: DirectoryRequest) -> BoxFuture<'_, Result<Option<RawSnapshot>>> {
        Box::pin(self.send(request))
    }
}

fn classify(url: &str, e: reqwest::Error) -> WaypointError {
    if e.is_timeout() {
        WaypointError::TransportTimeout(url.to_string())
    } else {
        WaypointError::Transport(format!("{}: {}", url, e))
    }
}
