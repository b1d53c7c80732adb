use serde::{Deserialize, Serialize};

use crate::error::ExtractionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdType {
    Ktp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimItem {
    pub class_id: u32,
    pub quantity: u32,
}

/// Body of `POST /v1/claim/lock`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimLockRequest {
    pub schedule_id: u32,
    pub items: Vec<ClaimItem>,
}

/// One passenger in a claim entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TicketData {
    pub class_id: u32,
    pub passenger_name: String,
    pub passenger_age: u8,
    pub passenger_gender: Gender,
    pub id_type: IdType,
    pub id_number: String,
    pub address: String,
}

/// Body of `POST /v1/claim/entry/{session_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimEntryRequest {
    pub customer_name: String,
    pub id_type: IdType,
    pub id_number: String,
    pub phone_number: String,
    pub email: String,
    pub payment_method: String,
    pub ticket_data: Vec<TicketData>,
}

/// Body of `POST /v1/payment/callback`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentCallbackRequest {
    pub reference: String,
    pub merchant_ref: String,
    pub status: String,
    pub amount: u64,
    pub payment_method: String,
    pub signature: String,
}

/// Every response of the API wraps its payload in `data`.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

/// An identifier that the API may send as a string or as a number.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
enum Identifier {
    Text(String),
    Number(u64),
}

impl From<Identifier> for String {
    fn from(value: Identifier) -> Self {
        match value {
            Identifier::Text(text) => text,
            Identifier::Number(number) => number.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClaimLockData {
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClaimEntryData {
    #[serde(deserialize_with = "identifier")]
    pub order_id: String,
}

fn identifier<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Identifier::deserialize(deserializer).map(String::from)
}

/// A response payload that can be checked after decoding.
pub trait Extract: Sized {
    fn extract(body: &str) -> Result<Self, ExtractionError>;
}

/// Responses that carry nothing the flow needs.
impl Extract for () {
    fn extract(_body: &str) -> Result<Self, ExtractionError> {
        Ok(())
    }
}

impl Extract for ClaimLockData {
    fn extract(body: &str) -> Result<Self, ExtractionError> {
        let data = serde_json::from_str::<Envelope<ClaimLockData>>(body)?.data;
        if data.session_id.trim().is_empty() {
            return Err(ExtractionError::EmptyField("data.session_id"));
        }
        Ok(data)
    }
}

impl Extract for ClaimEntryData {
    fn extract(body: &str) -> Result<Self, ExtractionError> {
        let data = serde_json::from_str::<Envelope<ClaimEntryData>>(body)?.data;
        if data.order_id.trim().is_empty() {
            return Err(ExtractionError::EmptyField("data.order_id"));
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn session_id_is_extracted() {
        let data = ClaimLockData::extract(r#"{"data":{"session_id":"abc","expires_in":300}}"#).unwrap();
        assert_eq!("abc", data.session_id);
    }

    #[test]
    fn missing_session_id_is_rejected() {
        assert!(matches!(
            ClaimLockData::extract(r#"{"data":{}}"#),
            Err(ExtractionError::Decode(_))
        ));
        assert!(matches!(
            ClaimLockData::extract(r#"{"message":"ok"}"#),
            Err(ExtractionError::Decode(_))
        ));
    }

    #[test]
    fn mistyped_session_id_is_rejected() {
        assert!(matches!(
            ClaimLockData::extract(r#"{"data":{"session_id":42}}"#),
            Err(ExtractionError::Decode(_))
        ));
    }

    #[test]
    fn empty_session_id_is_rejected() {
        assert!(matches!(
            ClaimLockData::extract(r#"{"data":{"session_id":"  "}}"#),
            Err(ExtractionError::EmptyField("data.session_id"))
        ));
    }

    #[test]
    fn order_id_accepts_text_and_numbers() {
        assert_eq!(
            "ORD-1",
            ClaimEntryData::extract(r#"{"data":{"order_id":"ORD-1"}}"#)
                .unwrap()
                .order_id
        );
        assert_eq!(
            "991",
            ClaimEntryData::extract(r#"{"data":{"order_id":991}}"#)
                .unwrap()
                .order_id
        );
        assert!(ClaimEntryData::extract(r#"{"data":{"order_id":null}}"#).is_err());
        assert!(ClaimEntryData::extract(r#"{"data":{"order_id":true}}"#).is_err());
    }

    #[test]
    fn non_json_body_is_rejected() {
        assert!(matches!(
            ClaimEntryData::extract("<html>Bad Gateway</html>"),
            Err(ExtractionError::Decode(_))
        ));
    }

    #[test]
    fn claim_entry_serializes_with_api_field_names() {
        let request = ClaimEntryRequest {
            customer_name: "LoadTest1-0".to_string(),
            id_type: IdType::Ktp,
            id_number: "1234567890123456".to_string(),
            phone_number: "08123456789".to_string(),
            email: "lt1-0@test.com".to_string(),
            payment_method: "BRIVA".to_string(),
            ticket_data: vec![TicketData {
                class_id: 1,
                passenger_name: "Pass1-0-1".to_string(),
                passenger_age: 30,
                passenger_gender: Gender::Female,
                id_type: IdType::Ktp,
                id_number: "6543210987654321".to_string(),
                address: "Addr 1 0".to_string(),
            }],
        };

        assert_eq!(
            json!({
                "customer_name": "LoadTest1-0",
                "id_type": "ktp",
                "id_number": "1234567890123456",
                "phone_number": "08123456789",
                "email": "lt1-0@test.com",
                "payment_method": "BRIVA",
                "ticket_data": [{
                    "class_id": 1,
                    "passenger_name": "Pass1-0-1",
                    "passenger_age": 30,
                    "passenger_gender": "female",
                    "id_type": "ktp",
                    "id_number": "6543210987654321",
                    "address": "Addr 1 0"
                }]
            }),
            serde_json::to_value(&request).unwrap()
        );
    }
}
