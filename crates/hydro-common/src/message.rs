//! Queue message and product document types.

use serde::{Deserialize, Serialize};

use crate::error::{HydroError, HydroResult};

/// A forecast advisory notification as delivered by the queue.
///
/// `rdf` points at the full product document; the product text embedded in
/// that document carries one XML document per forecast site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub rdf: String,
    pub issuance_time: String,
}

impl InboundMessage {
    pub fn new(rdf: impl Into<String>, issuance_time: impl Into<String>) -> Self {
        Self {
            rdf: rdf.into(),
            issuance_time: issuance_time.into(),
        }
    }

    /// Decode a message body. Empty URLs are rejected.
    pub fn from_slice(body: &[u8]) -> HydroResult<Self> {
        let message: InboundMessage = serde_json::from_slice(body)
            .map_err(|e| HydroError::InvalidMessage(e.to_string()))?;

        if message.rdf.trim().is_empty() {
            return Err(HydroError::InvalidMessage(
                "reference document URL is empty".to_string(),
            ));
        }

        Ok(message)
    }

    pub fn to_json(&self) -> HydroResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Product document returned by the reference URL.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductDocument {
    #[serde(rename = "productText")]
    pub product_text: String,
    #[serde(default, rename = "issuanceTime")]
    pub issuance_time: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_message() {
        let body = br#"{"rdf": "https://api.weather.gov/products/abc", "issuance_time": "2024-05-01T12:00:00+00:00"}"#;
        let message = InboundMessage::from_slice(body).unwrap();

        assert_eq!(message.rdf, "https://api.weather.gov/products/abc");
        assert_eq!(message.issuance_time, "2024-05-01T12:00:00+00:00");
    }

    #[test]
    fn test_decode_message_missing_field() {
        let body = br#"{"rdf": "https://api.weather.gov/products/abc"}"#;
        assert!(matches!(
            InboundMessage::from_slice(body),
            Err(HydroError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_decode_message_empty_url() {
        let body = br#"{"rdf": "  ", "issuance_time": "now"}"#;
        assert!(InboundMessage::from_slice(body).is_err());
    }

    #[test]
    fn test_product_document() {
        let doc: ProductDocument =
            serde_json::from_str(r#"{"id": "x", "productText": "000\nHMLMKX\n"}"#).unwrap();
        assert_eq!(doc.product_text, "000\nHMLMKX\n");
        assert!(doc.issuance_time.is_none());
    }
}
