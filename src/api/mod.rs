//! REST API shared utilities (response types)

pub mod binding;
pub mod health;

use serde::{Deserialize, Serialize};

/// Success response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse<T> {
    pub data: T,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Message response (for delete, etc.)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_response() {
        let response = SuccessResponse::new("test data");
        assert_eq!(response.data, "test data");
    }

    #[test]
    fn test_success_response_serialization() {
        #[derive(serde::Serialize)]
        struct TestData {
            id: u32,
            name: String,
        }

        let response = SuccessResponse::new(TestData {
            id: 1,
            name: "Test".to_string(),
        });

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"id\":1"));
        assert!(json.contains("\"name\":\"Test\""));
    }

    #[test]
    fn test_message_response() {
        let response = MessageResponse::new("Operation successful");
        assert_eq!(response.message, "Operation successful");
    }

    #[test]
    fn test_message_response_from_string() {
        let response = MessageResponse::new(String::from("Dynamic message"));
        assert_eq!(response.message, "Dynamic message");
    }
}
