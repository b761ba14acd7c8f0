//! Transport seam to the device's HTTP control surface.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use shared::{
    domain::ServoChannel,
    error::DeviceError,
    protocol::{MoveRequest, MoveResponse, StatusResponse},
};
use url::Url;

/// Per-request timeout. A dead device must degrade to `disconnected`
/// within one health-check period instead of hanging the session.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// The device's control endpoints. Implementations must map every network
/// or decoding failure into [`DeviceError::Transport`]; callers decide what
/// a rejection means.
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// `GET /status` health probe.
    async fn probe_status(&self) -> Result<StatusResponse, DeviceError>;

    /// `POST /servo/move` with an already-clamped angle.
    async fn move_servo(
        &self,
        channel: ServoChannel,
        angle: i32,
    ) -> Result<MoveResponse, DeviceError>;

    /// `POST /servo/stop`. Any response counts as acknowledged.
    async fn stop_all(&self) -> Result<(), DeviceError>;
}

pub struct HttpDeviceTransport {
    http: Client,
    base_url: Url,
}

impl HttpDeviceTransport {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("invalid device url '{base_url}'"))?;
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build http client")?;
        Ok(Self { http, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url, DeviceError> {
        self.base_url
            .join(path)
            .map_err(|err| DeviceError::Transport(err.to_string()))
    }
}

fn transport_err(err: reqwest::Error) -> DeviceError {
    DeviceError::Transport(err.to_string())
}

#[async_trait]
impl DeviceTransport for HttpDeviceTransport {
    async fn probe_status(&self) -> Result<StatusResponse, DeviceError> {
        self.http
            .get(self.endpoint("/status")?)
            .send()
            .await
            .map_err(transport_err)?
            .error_for_status()
            .map_err(transport_err)?
            .json()
            .await
            .map_err(transport_err)
    }

    async fn move_servo(
        &self,
        channel: ServoChannel,
        angle: i32,
    ) -> Result<MoveResponse, DeviceError> {
        let response = self
            .http
            .post(self.endpoint("/servo/move")?)
            .json(&MoveRequest { channel, angle })
            .send()
            .await
            .map_err(transport_err)?;

        // The device answers rejections with an error status AND a
        // success:false body; prefer the body when it parses.
        let status = response.status();
        match response.json::<MoveResponse>().await {
            Ok(body) => Ok(body),
            Err(_) if !status.is_success() => {
                Err(DeviceError::Rejected(format!("http {status}")))
            }
            Err(err) => Err(transport_err(err)),
        }
    }

    async fn stop_all(&self) -> Result<(), DeviceError> {
        self.http
            .post(self.endpoint("/servo/stop")?)
            .send()
            .await
            .map_err(transport_err)?;
        Ok(())
    }
}
