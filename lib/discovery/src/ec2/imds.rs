use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, Request, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;

use crate::error::ResolutionError;

pub const DEFAULT_ENDPOINT: &str = "http://169.254.169.254";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);
const TOKEN_PATH: &str = "/latest/api/token";
const REGION_PATH: &str = "/latest/meta-data/placement/region";
const TOKEN_TTL_HEADER: &str = "x-aws-ec2-metadata-token-ttl-seconds";
const TOKEN_HEADER: &str = "x-aws-ec2-metadata-token";
const TOKEN_TTL: &str = "21600";

/// Something that can tell which region this process runs in.
#[async_trait]
pub trait RegionProbe: Send + Sync {
    async fn region(&self) -> Result<String, ResolutionError>;
}

/// Asks the EC2 instance metadata service, IMDSv2 first and IMDSv1 when the
/// token endpoint is not available. The whole probe is bounded by `timeout`.
pub struct ImdsRegionProbe {
    endpoint: String,
    timeout: Duration,
    client: Client<HttpConnector, Full<Bytes>>,
}

impl ImdsRegionProbe {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, ResolutionError> {
        let uri = endpoint
            .parse::<Uri>()
            .map_err(|err| ResolutionError::Request(err.to_string()))?;
        if uri.scheme().is_none() || uri.authority().is_none() {
            return Err(ResolutionError::Request(format!(
                "invalid metadata endpoint {endpoint}"
            )));
        }

        let client = Client::builder(TokioExecutor::new()).build_http();

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            timeout,
            client,
        })
    }

    pub fn with_endpoint(endpoint: Option<&str>) -> Result<Self, ResolutionError> {
        Self::new(endpoint.unwrap_or(DEFAULT_ENDPOINT), DEFAULT_TIMEOUT)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        header: (&'static str, &str),
    ) -> Result<(StatusCode, Bytes), ResolutionError> {
        let req = Request::builder()
            .method(method)
            .uri(format!("{}{}", self.endpoint, path))
            .header(header.0, header.1)
            .body(Full::default())
            .map_err(|err| ResolutionError::Request(err.to_string()))?;

        let resp = self
            .client
            .request(req)
            .await
            .map_err(|err| ResolutionError::Request(err.to_string()))?;
        let (parts, incoming) = resp.into_parts();
        let body = incoming
            .collect()
            .await
            .map_err(|err| ResolutionError::Request(err.to_string()))?
            .to_bytes();

        Ok((parts.status, body))
    }

    /// `None` means the service only speaks IMDSv1.
    async fn token(&self) -> Result<Option<String>, ResolutionError> {
        let (status, body) = self
            .send(Method::PUT, TOKEN_PATH, (TOKEN_TTL_HEADER, TOKEN_TTL))
            .await?;

        match status {
            StatusCode::OK => Ok(Some(String::from_utf8_lossy(&body).trim().to_string())),
            StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED => Ok(None),
            status => Err(ResolutionError::UnexpectedStatus(status)),
        }
    }

    async fn fetch_region(&self) -> Result<String, ResolutionError> {
        let token = self.token().await?;
        let (status, body) = match &token {
            Some(token) => {
                self.send(Method::GET, REGION_PATH, (TOKEN_HEADER, token.as_str()))
                    .await?
            }
            None => self.send(Method::GET, REGION_PATH, ("accept", "*/*")).await?,
        };

        if status != StatusCode::OK {
            return Err(ResolutionError::UnexpectedStatus(status));
        }

        let region = String::from_utf8_lossy(&body).trim().to_string();
        if region.is_empty() {
            return Err(ResolutionError::Request("empty region returned".into()));
        }

        Ok(region)
    }
}

#[async_trait]
impl RegionProbe for ImdsRegionProbe {
    async fn region(&self) -> Result<String, ResolutionError> {
        tokio::time::timeout(self.timeout, self.fetch_region())
            .await
            .map_err(|_elapsed| ResolutionError::Timeout(self.timeout))?
    }
}
