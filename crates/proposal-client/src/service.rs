//! The proposal service as seen from the lifecycle client, plus the HTTP
//! implementation that talks to `proposal-api`.

use std::future::Future;
use std::time::Duration;

use reqwest::Url;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use proposal_types::api::{
    CreateProposalResponse, ProposalStatusResponse, RespondRequest, RespondResponse,
};
use proposal_types::{Proposal, ProposalRecord};

use crate::error::ServiceError;

/// The two calls the lifecycle needs. Implementations report transport and
/// decoding problems as `Err`; a `success: false` acknowledgement is returned
/// as-is for the lifecycle to interpret.
pub trait ProposalService {
    fn create(
        &self,
        proposal: &Proposal,
    ) -> impl Future<Output = Result<CreateProposalResponse, ServiceError>> + Send;

    fn respond(
        &self,
        proposal_id: &str,
        request: &RespondRequest,
    ) -> impl Future<Output = Result<RespondResponse, ServiceError>> + Send;
}

/// HTTP client for the proposal endpoints.
pub struct HttpProposalService {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpProposalService {
    /// `base_url` is the service root, e.g. `http://localhost:8001`. A path
    /// prefix is kept, so `http://host/love` reaches `/love/api/proposals`.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, ServiceError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ServiceError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ServiceError::InvalidUrl(base_url.to_string()));
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// GET /api/proposals/{id}
    pub async fn fetch_proposal(&self, proposal_id: &str) -> Result<ProposalRecord, ServiceError> {
        self.get_json(self.endpoint(&["api", "proposals", proposal_id])).await
    }

    /// GET /api/proposals/{id}/status
    pub async fn fetch_status(
        &self,
        proposal_id: &str,
    ) -> Result<ProposalStatusResponse, ServiceError> {
        self.get_json(self.endpoint(&["api", "proposals", proposal_id, "status"]))
            .await
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Checked in `new`: the base URL can carry path segments.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ServiceError> {
        debug!(url = %url, "GET");
        let resp = self.client.get(url).send().await?;
        read_json(resp).await
    }

    async fn post_json<B, T>(&self, url: Url, body: &B) -> Result<T, ServiceError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(url = %url, "POST");
        let resp = self.client.post(url).json(body).send().await?;
        read_json(resp).await
    }
}

impl ProposalService for HttpProposalService {
    async fn create(&self, proposal: &Proposal) -> Result<CreateProposalResponse, ServiceError> {
        self.post_json(self.endpoint(&["api", "proposals"]), proposal)
            .await
    }

    async fn respond(
        &self,
        proposal_id: &str,
        request: &RespondRequest,
    ) -> Result<RespondResponse, ServiceError> {
        self.post_json(
            self.endpoint(&["api", "proposals", proposal_id, "respond"]),
            request,
        )
        .await
    }
}

/// Non-2xx is a `Status` error; a 2xx body that isn't the expected JSON is
/// `Malformed`.
async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ServiceError> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(ServiceError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(serde_json::from_str(&body)?)
}
