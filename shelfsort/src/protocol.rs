//! Wire protocol types for the client WebSocket.
//!
//! Both directions use the same `{type, data}` envelope:
//! - **Inbound** (client → server): upload control, file chunks, mode selection,
//!   prediction start and human approvals. Each message type has exactly one
//!   payload shape, validated once in [`crate::codec`].
//! - **Outbound** (server → client): progress notifications, approval requests
//!   and the final export.

use serde::{Deserialize, Deserializer, Serialize};

use crate::aggregate::RankedPrediction;
use crate::policy::ResolutionMode;

/// Messages from the client, one variant per recognized `type`.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    InitUpload(InitUpload),
    CancelUpload,
    FileUpload(FileUpload),
    SelectMode(SelectMode),
    InitPredictions,
    PredictionApproval(PredictionApproval),
}

impl InboundMessage {
    pub const INIT_UPLOAD: &'static str = "init_upload";
    pub const CANCEL_UPLOAD: &'static str = "cancel_upload";
    pub const FILE_UPLOAD: &'static str = "file_upload";
    pub const SELECT_MODE: &'static str = "select_mode";
    pub const INIT_PREDICTIONS: &'static str = "init_predictions";
    pub const PREDICTION_APPROVAL: &'static str = "prediction_approval";

    /// Wire name of this message's `type`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InitUpload(_) => Self::INIT_UPLOAD,
            Self::CancelUpload => Self::CANCEL_UPLOAD,
            Self::FileUpload(_) => Self::FILE_UPLOAD,
            Self::SelectMode(_) => Self::SELECT_MODE,
            Self::InitPredictions => Self::INIT_PREDICTIONS,
            Self::PredictionApproval(_) => Self::PREDICTION_APPROVAL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitUpload {
    /// Rejected at decode time when negative or not an integer.
    pub number_of_files: u64,
    pub root_dir: String,
    /// Client-side correlation id, echoed on every `upload_progress` of this upload.
    #[serde(default)]
    pub upload_id: Option<u64>,
}

#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUpload {
    pub file_name: String,
    #[serde(deserialize_with = "deserialize_base64")]
    pub file_data: Vec<u8>,
}

impl std::fmt::Debug for FileUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileUpload")
            .field("file_name", &self.file_name)
            .field("file_data_len", &self.file_data.len())
            .finish()
    }
}

fn deserialize_base64<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    use base64::Engine;

    let encoded = String::deserialize(deserializer)?;
    base64::engine::general_purpose::STANDARD
        .decode(encoded.as_bytes())
        .map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SelectMode {
    pub mode: ResolutionMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionApproval {
    pub product_name: String,
    pub class: String,
}

/// Notifications pushed to the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum OutboundMessage {
    ModeSelected {
        mode: ResolutionMode,
    },

    /// Percentage of expected files stored so far, in `[0, 100]`.
    UploadProgress {
        progress: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        upload_id: Option<u64>,
    },

    /// Distinct products in the cycle vs. products with a resolved class.
    PredictionProgress {
        files_to_predict: usize,
        approved_files: usize,
    },

    PredictionApprovalRequest {
        file_to_approve: RankedPrediction,
    },

    CsvFile {
        csv_data: String,
    },
}
