use anyhow::{Result, bail};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Every terminal API response is wrapped as `{"result": .., "error": ".."}`.
/// An empty `error` means success.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T = Value> {
    pub result: Option<T>,
    #[serde(default)]
    pub error: String,
}

impl<T> ApiEnvelope<T> {
    pub fn into_result(self, endpoint: &str) -> Result<Option<T>> {
        if !self.error.is_empty() {
            bail!("{} returned error: {}", endpoint, self.error);
        }
        Ok(self.result)
    }
}

/// Decodes an envelope body and unwraps its result
pub fn parse_envelope<T: DeserializeOwned>(body: &str, endpoint: &str) -> Result<Option<T>> {
    let envelope: ApiEnvelope<T> = serde_json::from_str(body)
        .map_err(|e| anyhow::anyhow!("{} returned an unparseable body: {}", endpoint, e))?;
    envelope.into_result(endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_success_envelope() {
        let body = r#"{"result":[["1","2","3","1","2","10","20"]],"error":""}"#;
        let result: Option<Value> = parse_envelope(body, "candles").unwrap();
        assert_eq!(result.unwrap().as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn test_error_envelope() {
        let body = r#"{"result":null,"error":"empty candle list"}"#;
        let err = parse_envelope::<Value>(body, "candle").unwrap_err();
        assert!(err.to_string().contains("empty candle list"));
    }

    #[test]
    fn test_null_result_without_error() {
        let body = r#"{"result":null,"error":""}"#;
        assert!(parse_envelope::<Value>(body, "candle").unwrap().is_none());
    }

    #[test]
    fn test_typed_prediction_result() {
        let body = r#"{"result":{"xgb_linear-H1_PerfectTrend-p4":[0.1,0.9]},"error":""}"#;
        let result: HashMap<String, Vec<f64>> = parse_envelope(body, "predict").unwrap().unwrap();
        assert_eq!(result["xgb_linear-H1_PerfectTrend-p4"], vec![0.1, 0.9]);
    }

    #[test]
    fn test_missing_result_field_is_absent() {
        let body = r#"{"error":""}"#;
        let result: Option<HashMap<String, Vec<f64>>> = parse_envelope(body, "predict").unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_garbage_body() {
        assert!(parse_envelope::<Value>("<html>", "candles").is_err());
    }
}
