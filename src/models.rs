use serde::{Deserialize, Serialize};

// Contact form payload
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ContactRequest {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub message: String,
}

// Property inquiry payload - a contact tied to one listing
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct InquiryRequest {
    pub property_id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub message: String,
}

// What the lead endpoints answer with
#[derive(Serialize, Clone, Debug)]
pub struct LeadReceipt {
    pub id: String,
    pub status: &'static str,
}

/// Client identifier the gatekeeper derived from IP-bearing headers.
#[derive(Clone, Debug)]
pub struct ClientIp(pub String);
