use serde::{Deserialize, Serialize};

/// One registered device. Field names are the wire format: list/get/search
/// responses serialize this struct directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: u64,
    pub inventory_name: String,
    pub description: String,
    pub photo_filename: Option<String>,
    pub created_at: i64,
}

impl DeviceRecord {
    /// Relative URL the photo is served under, when one is attached.
    pub fn photo_url(&self) -> Option<String> {
        self.photo_filename
            .as_ref()
            .map(|_| format!("/inventory/{}/photo", self.id))
    }
}
