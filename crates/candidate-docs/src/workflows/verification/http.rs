//! REST client for the verification pipeline.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::domain::{ActorCredential, AuthenticatedActor, CandidateId, Document, DocumentId};
use super::gateway::{
    ExtractionResult, GatewayError, IdentityVerifier, ReprocessAck, VerificationGateway,
};
use super::upload::UploadFile;
use crate::config::PipelineConfig;

const UPLOAD_SOURCE: &str = "web";

pub struct HttpVerificationGateway {
    http: Client,
    config: PipelineConfig,
}

#[derive(Deserialize)]
struct DocumentEnvelope {
    document: Document,
}

#[derive(Deserialize)]
struct ExtractionEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

impl HttpVerificationGateway {
    pub fn new(config: PipelineConfig) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| GatewayError::Network(err.to_string()))?;
        Ok(Self::with_client(http, config))
    }

    pub fn with_client(http: Client, config: PipelineConfig) -> Self {
        Self { http, config }
    }

    /// Pipeline endpoint under the base URL; every segment is percent-encoded on its own, so an
    /// id can never reach another path.
    fn url(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        if let Some(segment) = segments
            .iter()
            .find(|segment| matches!(**segment, "" | "." | ".."))
        {
            return Err(GatewayError::InvalidRequest(format!(
                "{segment:?} is not a usable path segment"
            )));
        }
        let mut url = Url::parse(&self.config.base_url).map_err(|err| {
            GatewayError::InvalidRequest(format!("pipeline base url: {err}"))
        })?;
        url.path_segments_mut()
            .map_err(|()| {
                GatewayError::InvalidRequest(format!(
                    "pipeline base url {} cannot carry a path",
                    self.config.base_url
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
        timeout: Duration,
    ) -> Result<T, GatewayError> {
        let response = request
            .timeout(timeout)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|err| transport_error(operation, timeout, err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }

        response
            .json::<T>()
            .await
            .map_err(|err| GatewayError::Decode(format!("{operation}: {err}")))
    }
}

fn transport_error(operation: &'static str, after: Duration, err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::TimedOut { operation, after }
    } else {
        GatewayError::Network(err.to_string())
    }
}

fn status_error(status: StatusCode, body: String) -> GatewayError {
    let body = remote_message(&body).unwrap_or(body);
    match status {
        StatusCode::UNAUTHORIZED => GatewayError::Unauthorized(body),
        StatusCode::NOT_FOUND => GatewayError::NotFound(body),
        other => GatewayError::Remote {
            status: other.as_u16(),
            body,
        },
    }
}

/// Pull `error` or `message` out of a JSON error body, if it has one.
fn remote_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("error")
        .or_else(|| value.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait]
impl VerificationGateway for HttpVerificationGateway {
    async fn upload_document(
        &self,
        file: &UploadFile,
        candidate_id: &CandidateId,
    ) -> Result<Document, GatewayError> {
        let part = multipart::Part::bytes(file.bytes.clone())
            .file_name(file.file_name.clone())
            .mime_str(file.content_type.as_ref())
            .map_err(|err| GatewayError::Network(err.to_string()))?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("candidate_id", candidate_id.0.clone())
            .text("source", UPLOAD_SOURCE);

        let timeout = self.config.upload_timeout_for(file.bytes.len() as u64);
        let request = self
            .http
            .post(self.url(&["documents", "candidate-documents"])?)
            .multipart(form);
        let envelope: DocumentEnvelope = self.send("upload", request, timeout).await?;
        Ok(envelope.document)
    }

    async fn document_status(&self, document_id: &DocumentId) -> Result<Document, GatewayError> {
        let request = self.http.get(self.url(&[
            "documents",
            "candidate-documents",
            &document_id.0,
        ])?);
        let envelope: DocumentEnvelope = self
            .send("status fetch", request, self.config.read_timeout)
            .await?;
        Ok(envelope.document)
    }

    async fn trigger_extraction(
        &self,
        candidate_id: &CandidateId,
        storage_ref: &str,
    ) -> Result<ExtractionResult, GatewayError> {
        let request = self
            .http
            .post(self.url(&["candidates", &candidate_id.0, "extract"])?)
            .json(&json!({ "cvUrl": storage_ref }));
        let envelope: ExtractionEnvelope = self
            .send("extraction", request, self.config.extraction_timeout)
            .await?;

        if envelope.success {
            Ok(ExtractionResult::Extracted {
                data: envelope.data.unwrap_or(Value::Null),
            })
        } else {
            Ok(ExtractionResult::Rejected {
                error: envelope
                    .error
                    .unwrap_or_else(|| "extraction failed".to_string()),
            })
        }
    }

    async fn reprocess_document(
        &self,
        document_id: &DocumentId,
    ) -> Result<ReprocessAck, GatewayError> {
        let request = self.http.post(self.url(&[
            "documents",
            "candidate-documents",
            &document_id.0,
            "reprocess",
        ])?);
        self.send("reprocess", request, self.config.write_timeout)
            .await
    }

    async fn override_document(
        &self,
        document_id: &DocumentId,
        credential: &ActorCredential,
        justification: &str,
    ) -> Result<Document, GatewayError> {
        let request = self
            .http
            .post(self.url(&[
                "documents",
                "candidate-documents",
                &document_id.0,
                "override",
            ])?)
            .json(&json!({
                "admin_email": credential.email,
                "admin_password": credential.password,
                "justification": justification,
            }));
        let envelope: DocumentEnvelope = self
            .send("override", request, self.config.write_timeout)
            .await?;
        Ok(envelope.document)
    }
}

#[async_trait]
impl IdentityVerifier for HttpVerificationGateway {
    async fn reauthenticate(
        &self,
        credential: &ActorCredential,
    ) -> Result<AuthenticatedActor, GatewayError> {
        let request = self.http.post(self.url(&["auth", "verify"])?).json(&json!({
            "email": credential.email,
            "password": credential.password,
        }));
        self.send("re-authentication", request, self.config.write_timeout)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway_at(base_url: &str) -> HttpVerificationGateway {
        HttpVerificationGateway::with_client(
            Client::builder().no_proxy().build().expect("client"),
            PipelineConfig {
                base_url: base_url.to_string(),
                ..PipelineConfig::default()
            },
        )
    }

    #[test]
    fn joins_base_url_without_double_slash() {
        let gateway = gateway_at("http://pipeline.local/api/");
        assert_eq!(
            gateway
                .url(&["documents", "candidate-documents", "doc-1"])
                .expect("url")
                .as_str(),
            "http://pipeline.local/api/documents/candidate-documents/doc-1"
        );
    }

    #[test]
    fn ids_are_encoded_as_a_single_segment() {
        let gateway = gateway_at("http://pipeline.local/api");
        let url = gateway
            .url(&["documents", "candidate-documents", "x/../../../auth/verify?#"])
            .expect("url");
        assert_eq!(
            url.path(),
            "/api/documents/candidate-documents/x%2F..%2F..%2F..%2Fauth%2Fverify%3F%23"
        );
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn dot_and_empty_ids_are_refused() {
        let gateway = gateway_at("http://pipeline.local/api");
        for id in ["", ".", ".."] {
            assert!(matches!(
                gateway.url(&["documents", "candidate-documents", id]),
                Err(GatewayError::InvalidRequest(_))
            ));
        }
    }

    #[tokio::test]
    async fn traversal_id_stays_under_the_documents_path() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        let capture = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut received = Vec::new();
            let mut buf = [0u8; 1024];
            while !received.windows(4).any(|window| window == b"\r\n\r\n") {
                let read = socket.read(&mut buf).await.expect("read");
                if read == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..read]);
            }
            socket
                .write_all(b"HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .await
                .expect("respond");
            String::from_utf8_lossy(&received)
                .lines()
                .next()
                .unwrap_or_default()
                .to_string()
        });

        let gateway = gateway_at(&format!("http://{addr}/api"));
        let result = gateway
            .document_status(&DocumentId("x/../../../auth/verify?".to_string()))
            .await;
        assert!(matches!(result, Err(GatewayError::NotFound(_))));
        assert_eq!(
            capture.await.expect("capture"),
            "GET /api/documents/candidate-documents/x%2F..%2F..%2F..%2Fauth%2Fverify%3F HTTP/1.1"
        );
    }

    #[test]
    fn error_bodies_keep_the_remote_message() {
        assert_eq!(
            status_error(
                StatusCode::PAYLOAD_TOO_LARGE,
                r#"{"error":"File exceeds 10MB"}"#.to_string()
            ),
            GatewayError::Remote {
                status: 413,
                body: "File exceeds 10MB".to_string()
            }
        );
        assert_eq!(
            status_error(StatusCode::UNAUTHORIZED, "bad password".to_string()),
            GatewayError::Unauthorized("bad password".to_string())
        );
    }

    #[test]
    fn document_envelope_parses_pipeline_payload() {
        let payload = json!({
            "document": {
                "id": "doc-1",
                "candidate_id": "cand-1",
                "file_name": "passport.pdf",
                "category": "passport",
                "verification_status": "rejected_mismatch",
                "rejection": {
                    "code": "CNIC_MISMATCH",
                    "reason": "CNIC differs",
                    "mismatch_fields": ["cnic"],
                    "retry_possible": true,
                    "is_overridable": true,
                    "required_role": "admin"
                }
            }
        });
        let envelope: DocumentEnvelope = serde_json::from_value(payload).expect("parse");
        let rejection = envelope.document.rejection.expect("rejection");
        assert_eq!(rejection.max_retries, 2);
        assert_eq!(rejection.code.as_str(), "CNIC_MISMATCH");
    }
}
