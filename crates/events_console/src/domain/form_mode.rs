use serde::{Deserialize, Serialize};

/// Phase of the events view, as shown to the UI
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FormMode {
    #[default]
    Initialized,
    Working,
    Fetched,
    Failed,
    Updating,
    Upserted,
    SetDecoderSucceeded,
    SetDecoderFailed,
}
