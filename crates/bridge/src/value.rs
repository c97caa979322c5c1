// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Cell values and the codec between database-native values and the
//! transport-safe scalars sent to the hub.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DatabaseError;

/// A transport-safe scalar: one cell of a result row or one query parameter.
///
/// Serialises to the bare JSON scalar (`null`, `true`, `42`, `1.5`, `"text"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
	Null,
	Boolean(bool),
	Integer(i64),
	Float(f64),
	String(String),
}

impl Value {
	/// Converts one decoded JSON parameter into a scalar.
	///
	/// Arrays and objects have no scalar form and are rejected with the
	/// parameter's position.
	pub fn from_param(position: usize, param: serde_json::Value) -> Result<Self, DatabaseError> {
		match param {
			serde_json::Value::Null => Ok(Value::Null),
			serde_json::Value::Bool(b) => Ok(Value::Boolean(b)),
			serde_json::Value::Number(n) => {
				if let Some(i) = n.as_i64() {
					Ok(Value::Integer(i))
				} else if let Some(f) = n.as_f64() {
					Ok(Value::Float(f))
				} else {
					Err(DatabaseError::UnsupportedParam {
						position,
					})
				}
			}
			serde_json::Value::String(s) => Ok(Value::String(s)),
			serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
				Err(DatabaseError::UnsupportedParam {
					position,
				})
			}
		}
	}
}

/// A value as read from a database driver, before normalisation.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
	Null,
	Boolean(bool),
	Integer(i64),
	Float(f64),
	Text(String),
	Bytes(Vec<u8>),
	Timestamp(DateTime<Utc>),
}

/// Converts a native value into its transport scalar.
///
/// Byte sequences become text and timestamps become `YYYY-MM-DDTHH:MM:SSZ`;
/// everything else maps onto the matching scalar unchanged.
pub fn convert(value: NativeValue) -> Value {
	match value {
		NativeValue::Bytes(bytes) => Value::String(bytes_to_text(bytes)),
		NativeValue::Timestamp(ts) => Value::String(format_timestamp(&ts)),
		NativeValue::Null => Value::Null,
		NativeValue::Boolean(b) => Value::Boolean(b),
		NativeValue::Integer(i) => Value::Integer(i),
		NativeValue::Float(f) => Value::Float(f),
		NativeValue::Text(s) => Value::String(s),
	}
}

/// Formats an instant in UTC with whole-second precision and a `Z` suffix.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
	ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

// Invalid UTF-8 sequences are replaced rather than rejected; the codec is total.
fn bytes_to_text(bytes: Vec<u8>) -> String {
	match String::from_utf8(bytes) {
		Ok(text) => text,
		Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
	}
}

#[cfg(test)]
mod tests {
	use chrono::TimeZone;
	use serde_json::json;

	use super::*;

	#[test]
	fn test_bytes_become_text() {
		let value = convert(NativeValue::Bytes(b"binary data as string".to_vec()));
		assert_eq!(value, Value::String("binary data as string".to_string()));
	}

	#[test]
	fn test_invalid_utf8_bytes_do_not_fail() {
		let value = convert(NativeValue::Bytes(vec![b'o', b'k', 0xff]));
		assert_eq!(value, Value::String("ok\u{fffd}".to_string()));
	}

	#[test]
	fn test_timestamp_formats_second_precision_utc() {
		let ts = Utc.with_ymd_and_hms(2025, 2, 13, 14, 30, 0).unwrap();
		assert_eq!(convert(NativeValue::Timestamp(ts)), Value::String("2025-02-13T14:30:00Z".to_string()));

		let ts = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
		assert_eq!(convert(NativeValue::Timestamp(ts)), Value::String("2025-01-01T00:00:00Z".to_string()));
	}

	#[test]
	fn test_timestamp_drops_subseconds() {
		let ts = Utc.with_ymd_and_hms(2025, 2, 13, 14, 30, 0).unwrap() + chrono::Duration::milliseconds(987);
		assert_eq!(format_timestamp(&ts), "2025-02-13T14:30:00Z");
	}

	#[test]
	fn test_null_stays_null() {
		assert_eq!(convert(NativeValue::Null), Value::Null);
		assert_eq!(serde_json::to_value(convert(NativeValue::Null)).unwrap(), json!(null));
	}

	#[test]
	fn test_mixed_row() {
		let ts = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
		let row: Vec<Value> = vec![
			NativeValue::Integer(42),
			NativeValue::Text("test".to_string()),
			NativeValue::Bytes(b"blob".to_vec()),
			NativeValue::Timestamp(ts),
		]
		.into_iter()
		.map(convert)
		.collect();

		assert_eq!(
			row,
			vec![
				Value::Integer(42),
				Value::String("test".to_string()),
				Value::String("blob".to_string()),
				Value::String("2025-01-01T00:00:00Z".to_string()),
			]
		);
	}

	#[test]
	fn test_scalars_pass_through() {
		assert_eq!(convert(NativeValue::Boolean(true)), Value::Boolean(true));
		assert_eq!(convert(NativeValue::Float(1.5)), Value::Float(1.5));
		assert_eq!(convert(NativeValue::Integer(-7)), Value::Integer(-7));
	}

	#[test]
	fn test_value_serializes_as_bare_scalar() {
		let row = vec![
			Value::Null,
			Value::Boolean(false),
			Value::Integer(3),
			Value::Float(2.5),
			Value::String("x".to_string()),
		];
		assert_eq!(serde_json::to_value(&row).unwrap(), json!([null, false, 3, 2.5, "x"]));
	}

	#[test]
	fn test_from_param() {
		assert_eq!(Value::from_param(0, json!(1)).unwrap(), Value::Integer(1));
		assert_eq!(Value::from_param(0, json!(1.25)).unwrap(), Value::Float(1.25));
		assert_eq!(Value::from_param(0, json!("a")).unwrap(), Value::String("a".to_string()));
		assert_eq!(Value::from_param(0, json!(true)).unwrap(), Value::Boolean(true));
		assert_eq!(Value::from_param(0, json!(null)).unwrap(), Value::Null);
	}

	#[test]
	fn test_from_param_rejects_composites() {
		let err = Value::from_param(2, json!([1, 2])).unwrap_err();
		assert!(matches!(err, DatabaseError::UnsupportedParam { position: 2 }));
		assert!(Value::from_param(0, json!({"a": 1})).is_err());
	}
}
