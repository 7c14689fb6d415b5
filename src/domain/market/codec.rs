//! Candle wire codec.
//!
//! Candles travel as positional tuples `[timestamp, open, high, low, close, volume, turnover]`.
//! The terminal API emits every field as a string; numeric JSON fields are accepted too.
//! Encoding always produces strings, with floats in their shortest round-trip form.

use super::candle::Candle;
use crate::domain::errors::FormatError;
use serde_json::Value;

/// Wire tuple as emitted by [`encode`]
pub type WireCandle = [String; 7];

const FIELDS: [&str; 7] = ["timestamp", "open", "high", "low", "close", "volume", "turnover"];

/// Result of decoding a payload that may hold one tuple or a sequence of tuples
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    One(Candle),
    Many(Vec<Candle>),
}

impl Decoded {
    pub fn into_vec(self) -> Vec<Candle> {
        match self {
            Decoded::One(candle) => vec![candle],
            Decoded::Many(candles) => candles,
        }
    }
}

/// Decodes a JSON payload holding either one tuple or a sequence of tuples.
///
/// A `null` payload is not an error and yields `Ok(None)`.
pub fn decode(payload: &Value) -> Result<Option<Decoded>, FormatError> {
    match payload {
        Value::Null => Ok(None),
        Value::Array(items) => match items.first() {
            None => Ok(Some(Decoded::Many(Vec::new()))),
            Some(Value::Array(_)) => items
                .iter()
                .map(|item| match item {
                    Value::Array(fields) => decode_fields(fields),
                    other => Err(unsupported(other)),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(|candles| Some(Decoded::Many(candles))),
            Some(_) => decode_fields(items).map(|candle| Some(Decoded::One(candle))),
        },
        other => Err(unsupported(other)),
    }
}

/// Decodes a payload expected to hold a single tuple
pub fn decode_one(payload: &Value) -> Result<Option<Candle>, FormatError> {
    match decode(payload)? {
        None => Ok(None),
        Some(Decoded::One(candle)) => Ok(Some(candle)),
        Some(Decoded::Many(_)) => Err(FormatError::UnsupportedShape {
            shape: "sequence of tuples where a single tuple was expected".to_string(),
        }),
    }
}

/// Decodes a payload expected to hold a sequence of tuples; `null` becomes an empty sequence
pub fn decode_many(payload: &Value) -> Result<Vec<Candle>, FormatError> {
    Ok(decode(payload)?.map(Decoded::into_vec).unwrap_or_default())
}

/// Decodes a string tuple, the shape produced by [`encode`]
pub fn decode_wire<S: AsRef<str>>(fields: &[S]) -> Result<Candle, FormatError> {
    if fields.len() < FIELDS.len() {
        return Err(FormatError::TooFewFields {
            found: fields.len(),
        });
    }
    let float = |idx: usize| parse_float(FIELDS[idx], fields[idx].as_ref());
    Ok(Candle {
        timestamp: parse_int(fields[0].as_ref())?,
        open: float(1)?,
        high: float(2)?,
        low: float(3)?,
        close: float(4)?,
        volume: float(5)?,
        turnover: float(6)?,
    })
}

/// Encodes a candle as a string tuple
pub fn encode(candle: &Candle) -> Result<WireCandle, FormatError> {
    let values = [
        candle.open,
        candle.high,
        candle.low,
        candle.close,
        candle.volume,
        candle.turnover,
    ];
    for (idx, value) in values.iter().enumerate() {
        if !value.is_finite() {
            return Err(FormatError::NonFinite {
                field: FIELDS[idx + 1],
            });
        }
    }
    Ok([
        candle.timestamp.to_string(),
        values[0].to_string(),
        values[1].to_string(),
        values[2].to_string(),
        values[3].to_string(),
        values[4].to_string(),
        values[5].to_string(),
    ])
}

pub fn encode_all(candles: &[Candle]) -> Result<Vec<WireCandle>, FormatError> {
    candles.iter().map(encode).collect()
}

fn decode_fields(fields: &[Value]) -> Result<Candle, FormatError> {
    if fields.len() < FIELDS.len() {
        return Err(FormatError::TooFewFields {
            found: fields.len(),
        });
    }
    let float = |idx: usize| json_float(FIELDS[idx], &fields[idx]);
    Ok(Candle {
        timestamp: json_int(&fields[0])?,
        open: float(1)?,
        high: float(2)?,
        low: float(3)?,
        close: float(4)?,
        volume: float(5)?,
        turnover: float(6)?,
    })
}

fn json_int(value: &Value) -> Result<i64, FormatError> {
    match value {
        Value::String(s) => parse_int(s),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| is_whole_i64(*f)).map(|f| f as i64))
            .ok_or_else(|| invalid(FIELDS[0], n.to_string())),
        other => Err(invalid(FIELDS[0], other.to_string())),
    }
}

/// Whole and inside the `i64` range, so the cast cannot saturate
fn is_whole_i64(value: f64) -> bool {
    value.fract() == 0.0 && value >= i64::MIN as f64 && value < i64::MAX as f64
}

fn json_float(field: &'static str, value: &Value) -> Result<f64, FormatError> {
    match value {
        Value::String(s) => parse_float(field, s),
        Value::Number(n) => n.as_f64().ok_or_else(|| invalid(field, n.to_string())),
        other => Err(invalid(field, other.to_string())),
    }
}

fn parse_int(raw: &str) -> Result<i64, FormatError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| invalid(FIELDS[0], raw.to_string()))
}

fn parse_float(field: &'static str, raw: &str) -> Result<f64, FormatError> {
    let value = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| invalid(field, raw.to_string()))?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(FormatError::NonFinite { field })
    }
}

fn invalid(field: &'static str, value: String) -> FormatError {
    FormatError::InvalidNumber { field, value }
}

fn unsupported(value: &Value) -> FormatError {
    let shape = match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    FormatError::UnsupportedShape {
        shape: shape.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn btc() -> Candle {
        Candle {
            timestamp: 1_704_067_200_000,
            open: 42000.5,
            high: 42150.0,
            low: 41980.25,
            close: 42100.75,
            volume: 12.345,
            turnover: 519_876.1,
        }
    }

    #[test]
    fn test_decode_string_tuple() {
        let payload = json!([
            "1704067200000", "42000.5", "42150", "41980.25", "42100.75", "12.345", "519876.1"
        ]);
        let decoded = decode(&payload).unwrap();
        assert_eq!(decoded, Some(Decoded::One(btc())));
    }

    #[test]
    fn test_decode_numeric_tuple_with_extra_fields() {
        let payload = json!([1704067200000i64, 42000.5, 42150, 41980.25, 42100.75, 12.345, 519876.1, "x"]);
        assert_eq!(decode_one(&payload).unwrap(), Some(btc()));
    }

    #[test]
    fn test_decode_sequence() {
        let payload = json!([
            ["100", "1", "2", "0.5", "1.5", "10", "15"],
            ["200", "1.5", "2", "1", "1.75", "8", "14"]
        ]);
        let candles = decode_many(&payload).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].timestamp, 100);
        assert_eq!(candles[1].close, 1.75);
    }

    #[test]
    fn test_decode_null_is_absent() {
        assert_eq!(decode(&Value::Null).unwrap(), None);
        assert_eq!(decode_one(&Value::Null).unwrap(), None);
        assert!(decode_many(&Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_decode_too_few_fields() {
        let payload = json!(["100", "1", "2", "0.5", "1.5", "10"]);
        assert_eq!(
            decode(&payload).unwrap_err(),
            FormatError::TooFewFields { found: 6 }
        );
    }

    #[test]
    fn test_decode_unparseable_number() {
        let payload = json!(["100", "1", "2", "0.5", "abc", "10", "15"]);
        assert_eq!(
            decode(&payload).unwrap_err(),
            FormatError::InvalidNumber {
                field: "close",
                value: "abc".to_string()
            }
        );
        let payload = json!(["1.5", "1", "2", "0.5", "1", "10", "15"]);
        assert!(matches!(
            decode(&payload).unwrap_err(),
            FormatError::InvalidNumber { field: "timestamp", .. }
        ));
    }

    #[test]
    fn test_decode_rejects_out_of_range_timestamp() {
        for timestamp in [json!(1e300), json!(-1e300), json!(u64::MAX)] {
            let payload = json!([timestamp, 1, 2, 0.5, 1, 10, 15]);
            assert!(matches!(
                decode(&payload).unwrap_err(),
                FormatError::InvalidNumber { field: "timestamp", .. }
            ));
        }
        let payload = json!([1.7e12, 1, 2, 0.5, 1, 10, 15]);
        assert_eq!(decode_one(&payload).unwrap().unwrap().timestamp, 1_700_000_000_000);
    }

    #[test]
    fn test_decode_rejects_non_finite() {
        let payload = json!(["100", "NaN", "2", "0.5", "1", "10", "15"]);
        assert_eq!(
            decode(&payload).unwrap_err(),
            FormatError::NonFinite { field: "open" }
        );
    }

    #[test]
    fn test_decode_unsupported_shapes() {
        assert!(matches!(
            decode(&json!({"t": 1})).unwrap_err(),
            FormatError::UnsupportedShape { .. }
        ));
        assert!(matches!(
            decode(&json!([["100", "1", "2", "0.5", "1", "10", "15"], "oops"])).unwrap_err(),
            FormatError::UnsupportedShape { .. }
        ));
        assert!(decode_one(&json!([["100", "1", "2", "0.5", "1", "10", "15"]])).is_err());
    }

    #[test]
    fn test_encode_stringifies_shortest_form() {
        let wire = encode(&btc()).unwrap();
        assert_eq!(
            wire,
            [
                "1704067200000",
                "42000.5",
                "42150",
                "41980.25",
                "42100.75",
                "12.345",
                "519876.1"
            ]
            .map(String::from)
        );
    }

    #[test]
    fn test_encode_rejects_non_finite() {
        let mut candle = btc();
        candle.volume = f64::INFINITY;
        assert_eq!(
            encode(&candle).unwrap_err(),
            FormatError::NonFinite { field: "volume" }
        );
        assert!(encode_all(&[btc(), candle]).is_err());
    }

    #[test]
    fn test_round_trip_laws() {
        let candle = btc();
        assert_eq!(decode_wire(&encode(&candle).unwrap()).unwrap(), candle);

        let tuple = ["1704070800000", "0.1", "0.30000000000000004", "1e-7", "3", "0", "-2.5"];
        let decoded = decode_wire(&tuple).unwrap();
        let reencoded = encode(&decoded).unwrap();
        assert_eq!(decode_wire(&reencoded).unwrap(), decoded);
        assert_eq!(reencoded[0], tuple[0]);
        assert_eq!(reencoded[1], tuple[1]);
        assert_eq!(reencoded[2], tuple[2]);
    }
}
