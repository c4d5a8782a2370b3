use std::task::{Context, Poll};

use futures::future::BoxFuture;
use reqwest::multipart::{Form, Part};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tower::Service;
use tracing::debug;

use crate::config::ServiceSettings;
use crate::error::ServiceError;
use crate::services::request_log::Operation;
use crate::workflow::{
    CapturedImage, FollowupAnswer, IdentificationOutcome, MedicationRecord, MedicationSuggestion,
};

const UPLOAD_FIELD: &str = "file";
const UPLOAD_FILE_NAME: &str = "foto.jpg";
const UPLOAD_MIME: &str = "image/jpeg";
const NOT_FOUND_MESSAGE: &str = "Medication not found";

#[derive(Debug, Clone)]
pub enum ServiceRequest {
    Identify(CapturedImage),
    Lookup(String),
    Ask { subject: String, question: String },
}

impl Operation for ServiceRequest {
    fn operation(&self) -> &'static str {
        match self {
            ServiceRequest::Identify(_) => "identify",
            ServiceRequest::Lookup(_) => "lookup",
            ServiceRequest::Ask { .. } => "ask",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceResponse {
    Outcome(IdentificationOutcome),
    Answer(FollowupAnswer),
}

/// Talks to the identification backend over HTTP. Timeouts are applied by the
/// surrounding tower stack, not by the client itself.
#[derive(Debug, Clone)]
pub struct HttpIdentificationService {
    client: reqwest::Client,
    identify_url: String,
    lookup_url: String,
    ask_url: String,
}

impl HttpIdentificationService {
    pub fn new(settings: &ServiceSettings) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ServiceError::Unreachable(e.to_string()))?;
        Ok(Self {
            client,
            identify_url: settings.endpoint(&settings.identify_path),
            lookup_url: settings.endpoint(&settings.lookup_path),
            ask_url: settings.endpoint(&settings.ask_path),
        })
    }

    async fn identify(&self, image: CapturedImage) -> Result<IdentificationOutcome, ServiceError> {
        let part = Part::bytes(image.bytes().to_vec())
            .file_name(UPLOAD_FILE_NAME)
            .mime_str(UPLOAD_MIME)
            .map_err(|e| ServiceError::Protocol(e.to_string()))?;
        let form = Form::new().part(UPLOAD_FIELD, part);
        debug!("Uploading {:?} to {}", image, self.identify_url);

        let response = self
            .client
            .post(&self.identify_url)
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport_error)?;
        outcome_from_body(status, &body)
    }

    /// The code travels as a single path segment, so reserved characters are escaped.
    fn lookup_target(&self, code: &str) -> Result<Url, ServiceError> {
        let mut url =
            Url::parse(&self.lookup_url).map_err(|e| ServiceError::Protocol(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ServiceError::Protocol(format!("{} takes no path", self.lookup_url)))?
            .pop_if_empty()
            .push(code);
        Ok(url)
    }

    async fn lookup(&self, code: String) -> Result<IdentificationOutcome, ServiceError> {
        let url = self.lookup_target(&code)?;
        let response = self.client.get(url).send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport_error)?;
        outcome_from_body(status, &body)
    }

    async fn ask(&self, subject: String, question: String) -> Result<FollowupAnswer, ServiceError> {
        let response = self
            .client
            .post(&self.ask_url)
            .json(&AskBody {
                code: &subject,
                question: &question,
            })
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport_error)?;
        answer_from_body(status, &body, question)
    }
}

impl Service<ServiceRequest> for HttpIdentificationService {
    type Response = ServiceResponse;
    type Error = ServiceError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: ServiceRequest) -> Self::Future {
        let service = self.clone();
        Box::pin(async move {
            match request {
                ServiceRequest::Identify(image) => {
                    service.identify(image).await.map(ServiceResponse::Outcome)
                }
                ServiceRequest::Lookup(code) => {
                    service.lookup(code).await.map(ServiceResponse::Outcome)
                }
                ServiceRequest::Ask { subject, question } => service
                    .ask(subject, question)
                    .await
                    .map(ServiceResponse::Answer),
            }
        })
    }
}

fn transport_error(err: reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        ServiceError::Timeout
    } else {
        ServiceError::Unreachable(err.to_string())
    }
}

#[derive(Debug, Serialize)]
struct AskBody<'a> {
    #[serde(rename = "codigo")]
    code: &'a str,
    #[serde(rename = "pregunta")]
    question: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MedicationBody {
    #[serde(alias = "nombre")]
    name: Option<String>,
    #[serde(alias = "codigo_nacional", alias = "codigo")]
    code: Option<String>,
    #[serde(alias = "descripcion", alias = "info")]
    description: Option<String>,
    #[serde(alias = "laboratorio")]
    manufacturer: Option<String>,
    #[serde(alias = "prospecto", alias = "prospecto_pdf")]
    leaflet: Option<String>,
    #[serde(alias = "sugerencias")]
    suggestions: Vec<SuggestionBody>,
    error: Option<String>,
    #[serde(alias = "mensaje")]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SuggestionBody {
    #[serde(alias = "codigo")]
    code: String,
    #[serde(alias = "nombre")]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AnswerBody {
    #[serde(alias = "respuesta")]
    answer: Option<String>,
    error: Option<String>,
}

/// Maps an identify or lookup response onto an outcome. Only an unreadable body
/// is a transport error; everything the service says on purpose is an outcome.
pub(crate) fn outcome_from_body(
    status: u16,
    body: &str,
) -> Result<IdentificationOutcome, ServiceError> {
    let parsed = serde_json::from_str::<MedicationBody>(body);
    if status == 404 {
        let message = parsed
            .ok()
            .and_then(|b| b.error.or(b.message))
            .unwrap_or_else(|| NOT_FOUND_MESSAGE.to_string());
        return Ok(IdentificationOutcome::NotFound { message });
    }

    let body = parsed.map_err(|e| ServiceError::Protocol(format!("status {}: {}", status, e)))?;
    if let Some(message) = body.error {
        return Ok(IdentificationOutcome::ServiceError { message });
    }
    if !(200..300).contains(&status) {
        return Ok(IdentificationOutcome::ServiceError {
            message: format!("The identification service answered with status {}", status),
        });
    }
    if !body.suggestions.is_empty() {
        let suggestions = body
            .suggestions
            .into_iter()
            .map(|s| MedicationSuggestion {
                code: s.code,
                name: s.name,
            })
            .collect();
        return Ok(IdentificationOutcome::Ambiguous { suggestions });
    }

    match body.name {
        Some(name) => Ok(IdentificationOutcome::Identified {
            subject: MedicationRecord {
                name,
                description: body.description.unwrap_or_default(),
                manufacturer: body.manufacturer,
                code: body.code,
                leaflet: body.leaflet,
            },
        }),
        None => Ok(IdentificationOutcome::NotFound {
            message: body
                .message
                .unwrap_or_else(|| NOT_FOUND_MESSAGE.to_string()),
        }),
    }
}

pub(crate) fn answer_from_body(
    status: u16,
    body: &str,
    question: String,
) -> Result<FollowupAnswer, ServiceError> {
    let body = serde_json::from_str::<AnswerBody>(body)
        .map_err(|e| ServiceError::Protocol(format!("status {}: {}", status, e)))?;
    if let Some(error) = body.error {
        return Err(ServiceError::Rejected(error));
    }
    if !(200..300).contains(&status) {
        return Err(ServiceError::Rejected(format!(
            "The identification service answered with status {}",
            status
        )));
    }
    match body.answer {
        Some(text) => Ok(FollowupAnswer { question, text }),
        None => Err(ServiceError::Protocol("answer missing from response".to_string())),
    }
}
