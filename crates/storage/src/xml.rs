//! XML bodies of the S3 multipart API.

use serde::{Deserialize, Serialize};

use crate::{CompletedPart, StorageError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct InitiateMultipartUploadResult {
    pub upload_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename = "CompleteMultipartUpload")]
struct CompleteMultipartUpload<'a> {
    #[serde(rename = "Part")]
    parts: Vec<PartEntry<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PartEntry<'a> {
    part_number: u32,
    #[serde(rename = "ETag")]
    etag: &'a str,
}

/// `<Error>` document returned with non-success responses.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ErrorResponse {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

pub(crate) fn parse_initiate(body: &str) -> Result<String, StorageError> {
    let result: InitiateMultipartUploadResult =
        quick_xml::de::from_str(body).map_err(|e| StorageError::Xml(e.to_string()))?;
    if result.upload_id.is_empty() {
        return Err(StorageError::Xml("empty UploadId".into()));
    }
    Ok(result.upload_id)
}

pub(crate) fn complete_body(parts: &[CompletedPart]) -> Result<String, StorageError> {
    let doc = CompleteMultipartUpload {
        parts: parts
            .iter()
            .map(|p| PartEntry {
                part_number: p.part_number,
                etag: &p.etag,
            })
            .collect(),
    };
    quick_xml::se::to_string(&doc).map_err(|e| StorageError::Xml(e.to_string()))
}

/// Parses an error document; malformed or empty bodies yield empty fields.
pub(crate) fn parse_error(body: &str) -> ErrorResponse {
    quick_xml::de::from_str(body).unwrap_or_default()
}

/// S3 can answer a Complete request with `200 OK` and an error document.
pub(crate) fn is_error_document(body: &str) -> bool {
    body.contains("<Error>")
}
