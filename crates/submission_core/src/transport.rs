//! reqwest-backed implementations of the two remote collaborators.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{
    header::CONTENT_TYPE,
    multipart::{Form, Part},
    Client, Response,
};
use shared::{
    domain::{ClerkId, CreditBalance},
    protocol::{Attachment, BalanceEnvelope, FormField, OperationOutput, SubmissionPayload},
};
use thiserror::Error;
use url::Url;

use crate::{BalanceProvider, OperationService};

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("invalid endpoint url '{url}': {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("failed to build http client: {0}")]
    ClientBuild(reqwest::Error),
}

fn parse_endpoint(endpoint: &str) -> Result<Url, EndpointError> {
    Url::parse(endpoint).map_err(|source| EndpointError::InvalidUrl {
        url: endpoint.to_string(),
        source,
    })
}

fn build_client(timeout: Duration) -> Result<Client, EndpointError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(EndpointError::ClientBuild)
}

/// `GET <credits-endpoint>?clerkId=<id>` → `{"data":{"currentLimit":N}}`.
pub struct HttpBalanceProvider {
    http: Client,
    endpoint: Url,
}

impl HttpBalanceProvider {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, EndpointError> {
        Ok(Self {
            http: build_client(timeout)?,
            endpoint: parse_endpoint(endpoint)?,
        })
    }
}

#[async_trait]
impl BalanceProvider for HttpBalanceProvider {
    async fn fetch_balance(&self, clerk_id: &ClerkId) -> Result<CreditBalance> {
        let envelope: BalanceEnvelope = self
            .http
            .get(self.endpoint.clone())
            .query(&[("clerkId", clerk_id.as_str())])
            .send()
            .await
            .context("balance fetch failed")?
            .error_for_status()
            .context("balance service returned an error status")?
            .json()
            .await
            .context("balance response body was malformed")?;
        Ok(CreditBalance(envelope.data.current_limit))
    }
}

/// `POST <operation-endpoint>?clerkId=<id>` with a multipart or JSON body.
pub struct HttpOperationService {
    http: Client,
    endpoint: Url,
}

impl HttpOperationService {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, EndpointError> {
        Ok(Self {
            http: build_client(timeout)?,
            endpoint: parse_endpoint(endpoint)?,
        })
    }
}

fn multipart_form(fields: &[FormField], attachments: &[Attachment]) -> Result<Form> {
    let mut form = Form::new();
    for field in fields {
        form = form.text(field.name.clone(), field.value.clone());
    }
    for attachment in attachments {
        let mut part = Part::bytes(attachment.bytes.clone()).file_name(attachment.filename.clone());
        if let Some(mime) = &attachment.mime_type {
            part = part
                .mime_str(mime)
                .with_context(|| format!("invalid mime type '{mime}'"))?;
        }
        form = form.part(attachment.field_name.clone(), part);
    }
    Ok(form)
}

async fn classify_output(response: Response) -> Result<OperationOutput> {
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    if content_type.starts_with("application/json") {
        let value = response
            .json()
            .await
            .context("operation response claimed json but did not parse")?;
        return Ok(OperationOutput::Json(value));
    }
    if content_type.starts_with("text/") {
        let text = response
            .text()
            .await
            .context("operation response body was not readable text")?;
        return Ok(OperationOutput::Text(text));
    }

    let mime_type = content_type
        .split(';')
        .next()
        .filter(|m| !m.is_empty())
        .map(|m| m.trim().to_string());
    let bytes = response
        .bytes()
        .await
        .context("operation response body was not readable")?;
    Ok(OperationOutput::Binary {
        bytes: bytes.to_vec(),
        mime_type,
    })
}

#[async_trait]
impl OperationService for HttpOperationService {
    async fn execute(
        &self,
        clerk_id: &ClerkId,
        payload: &SubmissionPayload,
    ) -> Result<OperationOutput> {
        let request = self
            .http
            .post(self.endpoint.clone())
            .query(&[("clerkId", clerk_id.as_str())]);

        let request = match payload {
            SubmissionPayload::Multipart {
                fields,
                attachments,
            } => request.multipart(multipart_form(fields, attachments)?),
            SubmissionPayload::Json(value) => request.json(value),
        };

        let response = request
            .send()
            .await
            .context("operation request failed")?
            .error_for_status()
            .context("operation service returned an error status")?;
        classify_output(response).await
    }
}
