//! HTTP submission endpoint client.
//!
//! Results are POSTed as JSON. Any 2xx response is success; every other
//! status, and any transport failure, is a failed attempt.

use async_trait::async_trait;
use snafu::prelude::*;

use crate::config::EndpointConfig;
use crate::delivery::Submitter;
use crate::error::{
    ClientBuildSnafu, MissingClientResultIdSnafu, RejectedSnafu, SubmitError, TransportSnafu,
};
use crate::record::ResultPayload;

/// Header carrying the idempotency token when enabled.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Longest response body kept in a rejection error.
const MAX_ERROR_BODY: usize = 512;

/// `Submitter` backed by a `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpSubmitter {
    client: reqwest::Client,
    url: String,
    auth_token: Option<String>,
    idempotency_header: bool,
}

impl HttpSubmitter {
    pub fn new(config: &EndpointConfig) -> Result<Self, SubmitError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .context(ClientBuildSnafu)?;

        Ok(Self {
            client,
            url: config.url.clone(),
            auth_token: config.bearer_token().map(str::to_string),
            idempotency_header: config.idempotency_header,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Submitter for HttpSubmitter {
    async fn submit(&self, payload: &ResultPayload) -> Result<(), SubmitError> {
        let token = payload
            .client_result_id()
            .context(MissingClientResultIdSnafu)?;

        let mut request = self.client.post(&self.url).json(payload);
        if let Some(auth_token) = &self.auth_token {
            request = request.bearer_auth(auth_token);
        }
        if self.idempotency_header {
            request = request.header(IDEMPOTENCY_HEADER, token);
        }

        let response = request.send().await.context(TransportSnafu)?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut end = MAX_ERROR_BODY;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            body.truncate(end);
        }

        RejectedSnafu {
            status: status.as_u16(),
            body,
        }
        .fail()
    }
}
