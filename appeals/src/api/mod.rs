//! HTTP and WebSocket endpoints.
//!
//! Handlers are thin: they authenticate through [`auth::Authenticated`],
//! translate request bodies into service inputs and map
//! [`appeals_core::AppealsError`] into [`appeals_web::AppError`].
//!
//! - Tickets: create, list, detail, history, state machine commands
//! - Messages: thread paging, posting, editing, deleting, read receipts
//! - Export: CSV
//! - WebSocket: channel subscriptions

pub mod auth;
pub mod export;
pub mod messages;
pub mod tickets;
pub mod websocket;

use crate::services::Upload;
use appeals_core::{AppealsError, AttachmentKind};
use appeals_web::AppError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use std::str::FromStr;

/// A file sent inline with a message, base64 encoded.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    /// Original file name
    pub file_name: String,
    /// Standard base64 content
    pub data: String,
    /// `IMAGE`, `VIDEO`, `AUDIO` or `FILE`; guessed from the name when absent
    pub kind: Option<String>,
}

pub(crate) fn decode_uploads(uploads: Vec<UploadRequest>) -> Result<Vec<Upload>, AppError> {
    uploads
        .into_iter()
        .map(|upload| {
            if upload.file_name.trim().is_empty() {
                return Err(AppError::validation("attachment file name is required"));
            }
            let bytes = STANDARD.decode(upload.data.trim()).map_err(|_| {
                AppError::validation(format!("attachment {} is not valid base64", upload.file_name))
            })?;
            Ok(Upload {
                kind: parse_optional::<AttachmentKind>(upload.kind.as_deref())?,
                file_name: upload.file_name,
                bytes,
            })
        })
        .collect()
}

/// Parse an optional query or body value, treating blanks as absent.
pub(crate) fn parse_optional<T>(raw: Option<&str>) -> Result<Option<T>, AppError>
where
    T: FromStr<Err = AppealsError>,
{
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .transpose()
        .map_err(AppError::from)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use appeals_core::TicketStatus;

    #[test]
    fn test_decode_uploads() {
        let uploads = decode_uploads(vec![UploadRequest {
            file_name: "scan.pdf".into(),
            data: STANDARD.encode(b"%PDF"),
            kind: None,
        }])
        .unwrap();
        assert_eq!(uploads[0].bytes, b"%PDF");
        assert_eq!(uploads[0].kind, None);

        let bad = decode_uploads(vec![UploadRequest {
            file_name: "scan.pdf".into(),
            data: "***".into(),
            kind: None,
        }]);
        assert_eq!(bad.unwrap_err().code(), "VALIDATION");
    }

    #[test]
    fn test_parse_optional() {
        assert_eq!(parse_optional::<TicketStatus>(None).unwrap(), None);
        assert_eq!(parse_optional::<TicketStatus>(Some("  ")).unwrap(), None);
        assert_eq!(
            parse_optional::<TicketStatus>(Some("in_progress")).unwrap(),
            Some(TicketStatus::InProgress)
        );
        assert_eq!(
            parse_optional::<TicketStatus>(Some("closed")).unwrap_err().code(),
            "VALIDATION"
        );
    }
}
