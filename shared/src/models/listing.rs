//! Listing metadata payload

use serde::{Deserialize, Serialize};

/// Decoded listing payload
///
/// `d_tag` is the author-scoped stable identifier; replacements of the
/// same listing carry the same `d_tag` under a new event id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingData {
    pub d_tag: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub price: f64,
    pub currency: String,
    pub quantity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_data_roundtrip() {
        let listing = ListingData {
            d_tag: "coffee-5lb".to_string(),
            title: "Green coffee, 5 lb".to_string(),
            summary: None,
            price: 42.5,
            currency: "USD".to_string(),
            quantity: 10,
            location: Some("Yirgacheffe".to_string()),
        };

        let json = serde_json::to_string(&listing).unwrap();
        assert!(!json.contains("summary"));

        let parsed: ListingData = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, listing);
    }
}
