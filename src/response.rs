use serde::Serialize;

/// JSON envelope shared by every success response.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> Envelope<T> {
    pub fn data(data: T) -> Self {
        Self {
            status: "success",
            token: None,
            message: None,
            results: None,
            data: Some(data),
        }
    }

    pub fn with_token(token: String, data: T) -> Self {
        Self {
            token: Some(token),
            ..Self::data(data)
        }
    }

    pub fn with_results(results: usize, data: T) -> Self {
        Self {
            results: Some(results),
            ..Self::data(data)
        }
    }
}

impl Envelope<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            status: "success",
            token: None,
            message: Some(message.into()),
            results: None,
            data: None,
        }
    }

    pub fn empty() -> Self {
        Self {
            status: "success",
            token: None,
            message: None,
            results: None,
            data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_absent_fields() {
        let json = serde_json::to_value(Envelope::message("Token sent by email!")).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["message"], "Token sent by email!");
        assert!(json.get("token").is_none());
        assert!(json.get("data").is_none());
    }
}
