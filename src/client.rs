use async_trait::async_trait;
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::debug;

use crate::error::{ClientError, SourceError};
use crate::models::{Pod, PodList, PodStatus, StatusUpdate};
use crate::runtime::PodSource;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for the pod endpoints of the API server.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    http: Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn list_pods(&self) -> Result<Vec<Pod>, ClientError> {
        let url = format!("{}/api/v1/pods", self.base_url);
        debug!("GET {}", url);

        let resp = check(self.http.get(&url).send().await?).await?;
        let list: PodList = resp.json().await?;
        Ok(list.items)
    }

    pub async fn update_pod_status(
        &self,
        namespace: &str,
        name: &str,
        status: PodStatus,
    ) -> Result<Pod, ClientError> {
        let url = format!(
            "{}/api/v1/namespaces/{}/pods/{}/status",
            self.base_url, namespace, name
        );
        debug!("PUT {} ({})", url, status);

        let resp = check(
            self.http
                .put(&url)
                .json(&StatusUpdate { status })
                .send()
                .await?,
        )
        .await?;
        Ok(resp.json().await?)
    }
}

async fn check(resp: Response) -> Result<Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ClientError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl PodSource for ApiClient {
    async fn list_pods(&self) -> Result<Vec<Pod>, SourceError> {
        Ok(ApiClient::list_pods(self).await?)
    }

    async fn update_pod_status(&self, pod: &Pod, status: PodStatus) -> Result<(), SourceError> {
        ApiClient::update_pod_status(self, &pod.namespace, &pod.name, status).await?;
        Ok(())
    }
}
