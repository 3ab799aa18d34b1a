use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use serde::Deserialize;
use thiserror::Error;

use crate::analysis::domain::face_box::FaceBoxInput;
use crate::analysis::domain::frame_analyzer::{AnalysisError, FrameAnalyzer};
use crate::shared::constants::{SEARCH_ENDPOINT, UPLOAD_FIELD_NAME, UPLOAD_FILE_NAME};
use crate::shared::encoded_frame::EncodedFrame;

#[derive(Error, Debug)]
pub enum HttpAnalyzerError {
    #[error("service URL must start with http:// or https://, got '{0}'")]
    InvalidUrl(String),
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Body of the search endpoint. The service answers with a list of faces,
/// a single face, or a `message` when nothing was found.
#[derive(Debug, Deserialize)]
struct SearchResponse {
    faces: Option<Vec<FaceBoxInput>>,
    face: Option<FaceBoxInput>,
}

/// Uploads frames to the recognition service's user search endpoint.
///
/// The frame goes out as a multipart form with a single file field, the
/// same request the service's web UI makes.
pub struct HttpFrameAnalyzer {
    client: reqwest::blocking::Client,
    search_url: String,
}

impl HttpFrameAnalyzer {
    pub fn new(service_url: &str, timeout: Duration) -> Result<Self, HttpAnalyzerError> {
        let base = service_url.trim_end_matches('/');
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(HttpAnalyzerError::InvalidUrl(service_url.to_string()));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(HttpAnalyzerError::Client)?;
        Ok(Self {
            client,
            search_url: format!("{base}{SEARCH_ENDPOINT}"),
        })
    }

    pub fn search_url(&self) -> &str {
        &self.search_url
    }

    fn transport_error(&self, err: reqwest::Error) -> AnalysisError {
        AnalysisError::Transport {
            url: self.search_url.clone(),
            message: err.to_string(),
        }
    }
}

impl FrameAnalyzer for HttpFrameAnalyzer {
    fn analyze(&self, frame: &EncodedFrame) -> Result<Vec<FaceBoxInput>, AnalysisError> {
        let part = Part::bytes(frame.bytes().to_vec())
            .file_name(UPLOAD_FILE_NAME)
            .mime_str(frame.mime_type())
            .map_err(|e| AnalysisError::Encode(e.to_string()))?;
        let form = Form::new().part(UPLOAD_FIELD_NAME, part);

        let response = self
            .client
            .post(&self.search_url)
            .multipart(form)
            .send()
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AnalysisError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().map_err(|e| self.transport_error(e))?;
        parse_search_response(&body)
    }
}

/// Flattens a search response into the list of reported faces.
///
/// `faces` takes precedence over `face`; a body with neither (the
/// "no face found" message) yields an empty list.
pub fn parse_search_response(body: &[u8]) -> Result<Vec<FaceBoxInput>, AnalysisError> {
    let parsed: SearchResponse =
        serde_json::from_slice(body).map_err(|e| AnalysisError::Malformed(e.to_string()))?;
    if let Some(faces) = parsed.faces {
        return Ok(faces);
    }
    Ok(parsed.face.into_iter().collect())
}
