// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::{error::Error, fmt::Write, net::IpAddr, time::Duration};

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use r2d2::Pool;
use r2d2_postgres::{
	PostgresConnectionManager,
	postgres::{
		Config, NoTls, Row,
		types::{FromSql, Format, IsNull, Kind, ToSql, Type, to_sql_checked},
	},
};

use super::{Database, RowSet};
use crate::{
	config::PoolConfig,
	error::DatabaseError,
	value::{NativeValue, Value},
};

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// PostgreSQL backend over an r2d2 pool.
pub struct Postgres {
	pool: Pool<PostgresConnectionManager<NoTls>>,
}

impl Postgres {
	pub fn open(url: &str, pool: &PoolConfig) -> Result<Self, DatabaseError> {
		let config: Config = url.parse()?;
		let manager = PostgresConnectionManager::new(config, NoTls);
		let pool = Pool::builder()
			.max_size(pool.max_open)
			.min_idle(Some(pool.max_idle))
			.connection_timeout(CONNECTION_TIMEOUT)
			.build(manager)?;
		Ok(Self {
			pool,
		})
	}
}

impl Database for Postgres {
	fn ping(&self) -> Result<(), DatabaseError> {
		let mut client = self.pool.get()?;
		client.simple_query("SELECT 1")?;
		Ok(())
	}

	fn query(&self, sql: &str, params: &[Value]) -> Result<RowSet, DatabaseError> {
		let mut client = self.pool.get()?;
		let statement = client.prepare(sql)?;
		let columns = statement.columns().iter().map(|column| column.name().to_string()).collect();

		let params: Vec<TextParam> = params.iter().map(TextParam::from).collect();
		let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

		let mut rows = Vec::new();
		for row in client.query(&statement, &refs)? {
			let mut values = Vec::with_capacity(statement.columns().len());
			for (idx, column) in statement.columns().iter().enumerate() {
				values.push(read_value(&row, idx, column.type_())?);
			}
			rows.push(values);
		}

		Ok(RowSet {
			columns,
			rows,
		})
	}
}

/// A positional parameter sent in Postgres text format.
///
/// Text format lets the server coerce the literal to whatever type it
/// inferred for the placeholder, so an integer can bind to a `numeric` or a
/// string to a `date`.
#[derive(Debug)]
struct TextParam(Option<String>);

impl From<&Value> for TextParam {
	fn from(value: &Value) -> Self {
		match value {
			Value::Null => TextParam(None),
			Value::Boolean(b) => TextParam(Some(b.to_string())),
			Value::Integer(i) => TextParam(Some(i.to_string())),
			Value::Float(f) => TextParam(Some(f.to_string())),
			Value::String(s) => TextParam(Some(s.clone())),
		}
	}
}

impl ToSql for TextParam {
	fn to_sql(&self, _ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
		match &self.0 {
			Some(text) => {
				out.extend_from_slice(text.as_bytes());
				Ok(IsNull::No)
			}
			None => Ok(IsNull::Yes),
		}
	}

	fn accepts(_ty: &Type) -> bool {
		true
	}

	fn encode_format(&self, _ty: &Type) -> Format {
		Format::Text
	}

	to_sql_checked!();
}

/// The undecoded wire bytes of a column value.
struct Raw(Vec<u8>);

impl<'a> FromSql<'a> for Raw {
	fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
		Ok(Raw(raw.to_vec()))
	}

	fn accepts(_ty: &Type) -> bool {
		true
	}
}

/// Reads one column, mapping scalars natively and everything else to its
/// Postgres text rendering.
fn read_value(row: &Row, idx: usize, ty: &Type) -> Result<NativeValue, DatabaseError> {
	let value = match *ty {
		Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.map(NativeValue::Boolean),
		Type::INT2 => row.try_get::<_, Option<i16>>(idx)?.map(|v| NativeValue::Integer(v.into())),
		Type::INT4 => row.try_get::<_, Option<i32>>(idx)?.map(|v| NativeValue::Integer(v.into())),
		Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.map(NativeValue::Integer),
		Type::OID => row.try_get::<_, Option<u32>>(idx)?.map(|v| NativeValue::Integer(v.into())),
		Type::FLOAT4 => row.try_get::<_, Option<f32>>(idx)?.map(|v| NativeValue::Float(widen_float4(v))),
		Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.map(NativeValue::Float),
		Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
			row.try_get::<_, Option<String>>(idx)?.map(NativeValue::Text)
		}
		Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(NativeValue::Bytes),
		Type::TIMESTAMPTZ => row.try_get::<_, Option<DateTime<Utc>>>(idx)?.map(NativeValue::Timestamp),
		Type::TIMESTAMP => {
			row.try_get::<_, Option<NaiveDateTime>>(idx)?.map(|v| NativeValue::Timestamp(v.and_utc()))
		}
		_ => match row.try_get::<_, Option<Raw>>(idx)? {
			Some(Raw(raw)) => {
				let text = render(ty, &raw).ok_or_else(|| DatabaseError::UnsupportedType(ty.name().to_string()))?;
				Some(NativeValue::Text(text))
			}
			None => None,
		},
	};
	Ok(value.unwrap_or(NativeValue::Null))
}

/// Widens a `real` through its shortest decimal form, so `1.1` stays `1.1`
/// instead of `1.100000023841858`.
fn widen_float4(value: f32) -> f64 {
	value.to_string().parse().unwrap_or(f64::from(value))
}

fn decode<'a, T: FromSql<'a>>(ty: &Type, raw: &'a [u8]) -> Option<T> {
	if T::accepts(ty) {
		T::from_sql(ty, raw).ok()
	} else {
		None
	}
}

/// Renders a binary column value the way Postgres prints it in text mode.
///
/// Returns `None` for types with no known rendering.
fn render(ty: &Type, raw: &[u8]) -> Option<String> {
	match *ty {
		Type::BOOL => decode::<bool>(ty, raw).map(|v| if v { "t" } else { "f" }.to_string()),
		Type::CHAR => decode::<i8>(ty, raw).map(|v| char::from(v as u8).to_string()),
		Type::INT2 => decode::<i16>(ty, raw).map(|v| v.to_string()),
		Type::INT4 => decode::<i32>(ty, raw).map(|v| v.to_string()),
		Type::INT8 => decode::<i64>(ty, raw).map(|v| v.to_string()),
		Type::OID => decode::<u32>(ty, raw).map(|v| v.to_string()),
		Type::FLOAT4 => decode::<f32>(ty, raw).map(|v| float_text(widen_float4(v))),
		Type::FLOAT8 => decode::<f64>(ty, raw).map(float_text),
		Type::NUMERIC => numeric_to_string(raw),
		Type::MONEY => money_to_string(raw),
		Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN | Type::XML => {
			String::from_utf8(raw.to_vec()).ok()
		}
		Type::BYTEA => {
			let mut out = String::with_capacity(2 + raw.len() * 2);
			out.push_str("\\x");
			for byte in raw {
				let _ = write!(out, "{:02x}", byte);
			}
			Some(out)
		}
		Type::DATE => decode::<NaiveDate>(ty, raw).map(|v| v.to_string()),
		Type::TIME => decode::<NaiveTime>(ty, raw).map(|v| v.to_string()),
		Type::TIMETZ => timetz_to_string(raw),
		Type::TIMESTAMP => decode::<NaiveDateTime>(ty, raw).map(|v| v.to_string()),
		Type::TIMESTAMPTZ => decode::<DateTime<Utc>>(ty, raw).map(|v| v.format("%Y-%m-%d %H:%M:%S%.f+00").to_string()),
		Type::INTERVAL => interval_to_string(raw),
		Type::UUID => decode::<uuid::Uuid>(ty, raw).map(|v| v.to_string()),
		Type::JSON | Type::JSONB => decode::<serde_json::Value>(ty, raw).map(|v| v.to_string()),
		Type::INET | Type::CIDR => inet_to_string(raw),
		_ => match ty.kind() {
			Kind::Array(member) => array_to_string(member, raw),
			Kind::Domain(base) => render(base, raw),
			// Enum labels and citext travel as their text.
			Kind::Enum(_) => String::from_utf8(raw.to_vec()).ok(),
			Kind::Simple if ty.name() == "citext" => String::from_utf8(raw.to_vec()).ok(),
			_ => None,
		},
	}
}

fn float_text(value: f64) -> String {
	if value.is_nan() {
		"NaN".to_string()
	} else if value == f64::INFINITY {
		"Infinity".to_string()
	} else if value == f64::NEG_INFINITY {
		"-Infinity".to_string()
	} else {
		value.to_string()
	}
}

/// Big-endian cursor over a binary wire value.
struct Reader<'a> {
	buf: &'a [u8],
}

impl<'a> Reader<'a> {
	fn new(buf: &'a [u8]) -> Self {
		Self {
			buf,
		}
	}

	fn take(&mut self, n: usize) -> Option<&'a [u8]> {
		if self.buf.len() < n {
			return None;
		}
		let (head, rest) = self.buf.split_at(n);
		self.buf = rest;
		Some(head)
	}

	fn u8(&mut self) -> Option<u8> {
		self.take(1).map(|b| b[0])
	}

	fn u16(&mut self) -> Option<u16> {
		self.take(2).map(|b| u16::from_be_bytes([b[0], b[1]]))
	}

	fn i32(&mut self) -> Option<i32> {
		self.take(4).map(|b| i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
	}

	fn i64(&mut self) -> Option<i64> {
		self.take(8).map(|b| i64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
	}
}

/// Appends `.ffffff` with trailing zeros removed; nothing for zero.
fn push_fraction(out: &mut String, micros: u64) {
	if micros != 0 {
		let digits = format!("{:06}", micros);
		out.push('.');
		out.push_str(digits.trim_end_matches('0'));
	}
}

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Renders a binary `numeric` as its exact decimal text.
///
/// Layout: ndigits, weight, sign, dscale (all 16 bit), then ndigits base-10000
/// digit groups, most significant first. `weight` is the power of 10000 of the
/// first group.
fn numeric_to_string(raw: &[u8]) -> Option<String> {
	let mut reader = Reader::new(raw);
	let ndigits = reader.u16()? as usize;
	let weight = reader.u16()? as i16 as i32;
	let sign = reader.u16()?;
	let dscale = reader.u16()? as usize;

	match sign {
		NUMERIC_NAN => return Some("NaN".to_string()),
		NUMERIC_PINF => return Some("Infinity".to_string()),
		NUMERIC_NINF => return Some("-Infinity".to_string()),
		_ => {}
	}

	let digits = (0..ndigits).map(|_| reader.u16()).collect::<Option<Vec<u16>>>()?;
	let digit = |idx: i32| if idx < 0 { 0 } else { digits.get(idx as usize).copied().unwrap_or(0) };

	let mut out = String::new();
	if sign == NUMERIC_NEG {
		out.push('-');
	}

	if weight < 0 {
		out.push('0');
	} else {
		for idx in 0..=weight {
			if idx == 0 {
				let _ = write!(out, "{}", digit(idx));
			} else {
				let _ = write!(out, "{:04}", digit(idx));
			}
		}
	}

	if dscale > 0 {
		let mut fraction = String::with_capacity(dscale + 4);
		let mut idx = weight + 1;
		while fraction.len() < dscale {
			let _ = write!(fraction, "{:04}", digit(idx));
			idx += 1;
		}
		fraction.truncate(dscale);
		out.push('.');
		out.push_str(&fraction);
	}

	Some(out)
}

/// `money` is an int64 count of cents; rendered without locale symbols.
fn money_to_string(raw: &[u8]) -> Option<String> {
	let cents = Reader::new(raw).i64()?;
	let abs = cents.unsigned_abs();
	Some(format!("{}{}.{:02}", if cents < 0 { "-" } else { "" }, abs / 100, abs % 100))
}

const MICROS_PER_SECOND: u64 = 1_000_000;
const MICROS_PER_MINUTE: u64 = 60 * MICROS_PER_SECOND;
const MICROS_PER_HOUR: u64 = 60 * MICROS_PER_MINUTE;

fn write_clock(out: &mut String, micros: u64) {
	let _ = write!(
		out,
		"{:02}:{:02}:{:02}",
		micros / MICROS_PER_HOUR,
		micros / MICROS_PER_MINUTE % 60,
		micros / MICROS_PER_SECOND % 60
	);
	push_fraction(out, micros % MICROS_PER_SECOND);
}

/// Renders an `interval` (microseconds, days, months) in the default
/// `postgres` interval style, e.g. `1 year 2 mons 3 days 04:05:06.789`.
fn interval_to_string(raw: &[u8]) -> Option<String> {
	let mut reader = Reader::new(raw);
	let micros = reader.i64()?;
	let days = reader.i32()?;
	let months = reader.i32()?;

	let mut out = String::new();
	let mut is_zero = true;
	let mut is_before = false;
	for (value, unit) in [(months / 12, "year"), (months % 12, "mon"), (days, "day")] {
		if value == 0 {
			continue;
		}
		let _ = write!(
			out,
			"{}{}{} {}{}",
			if is_zero { "" } else { " " },
			if is_before && value > 0 { "+" } else { "" },
			value,
			unit,
			if value != 1 { "s" } else { "" }
		);
		is_before = value < 0;
		is_zero = false;
	}

	if is_zero || micros != 0 {
		if !is_zero {
			out.push(' ');
		}
		if micros < 0 {
			out.push('-');
		} else if is_before {
			out.push('+');
		}
		write_clock(&mut out, micros.unsigned_abs());
	}

	Some(out)
}

/// Renders a `timetz` (microseconds since midnight, zone in seconds west of
/// UTC) as `HH:MM:SS[.ffffff]+HH[:MM[:SS]]`.
fn timetz_to_string(raw: &[u8]) -> Option<String> {
	let mut reader = Reader::new(raw);
	let micros = u64::try_from(reader.i64()?).ok()?;
	let offset = -i64::from(reader.i32()?);

	let mut out = String::new();
	write_clock(&mut out, micros);

	let abs = offset.unsigned_abs();
	let _ = write!(out, "{}{:02}", if offset < 0 { '-' } else { '+' }, abs / 3600);
	if abs % 3600 != 0 {
		let _ = write!(out, ":{:02}", abs / 60 % 60);
		if abs % 60 != 0 {
			let _ = write!(out, ":{:02}", abs % 60);
		}
	}
	Some(out)
}

const PGSQL_AF_INET: u8 = 2;
const PGSQL_AF_INET6: u8 = 3;

/// Renders `inet`/`cidr`: family, prefix bits, cidr flag, address length,
/// address bytes. A host `inet` omits its full-length prefix.
fn inet_to_string(raw: &[u8]) -> Option<String> {
	let mut reader = Reader::new(raw);
	let family = reader.u8()?;
	let bits = reader.u8()?;
	let is_cidr = reader.u8()? != 0;
	let len = reader.u8()? as usize;
	let bytes = reader.take(len)?;

	let (address, max_bits) = match family {
		PGSQL_AF_INET => (IpAddr::from(<[u8; 4]>::try_from(bytes).ok()?), 32),
		PGSQL_AF_INET6 => (IpAddr::from(<[u8; 16]>::try_from(bytes).ok()?), 128),
		_ => return None,
	};

	if is_cidr || bits != max_bits {
		Some(format!("{}/{}", address, bits))
	} else {
		Some(address.to_string())
	}
}

/// Renders a binary array in Postgres text form, e.g. `{1,NULL,3}` or
/// `{{"a b",c}}`. Arrays with a lower bound other than 1 carry a
/// `[lo:hi]` prefix.
fn array_to_string(member: &Type, raw: &[u8]) -> Option<String> {
	let mut reader = Reader::new(raw);
	let ndim = usize::try_from(reader.i32()?).ok()?;
	let _has_nulls = reader.i32()?;
	let _element_oid = reader.i32()?;

	let mut dims = Vec::with_capacity(ndim.min(6));
	for _ in 0..ndim {
		let len = usize::try_from(reader.i32()?).ok()?;
		let lower = reader.i32()?;
		dims.push((len, lower));
	}

	let mut out = String::new();
	if dims.is_empty() {
		out.push_str("{}");
		return Some(out);
	}
	if dims.iter().any(|&(_, lower)| lower != 1) {
		for &(len, lower) in &dims {
			let upper = i64::from(lower) + len as i64 - 1;
			let _ = write!(out, "[{}:{}]", lower, upper);
		}
		out.push('=');
	}

	let total = dims.iter().try_fold(1usize, |acc, &(len, _)| acc.checked_mul(len))?;
	let mut elements = Vec::new();
	for _ in 0..total {
		let len = reader.i32()?;
		if len < 0 {
			elements.push("NULL".to_string());
			continue;
		}
		let bytes = reader.take(len as usize)?;
		elements.push(quote_element(render(member, bytes)?));
	}

	write_dimension(&mut out, &dims, &mut elements.into_iter());
	Some(out)
}

fn write_dimension(out: &mut String, dims: &[(usize, i32)], elements: &mut impl Iterator<Item = String>) {
	let Some(&(len, _)) = dims.first() else {
		return;
	};
	out.push('{');
	for idx in 0..len {
		if idx > 0 {
			out.push(',');
		}
		if dims.len() > 1 {
			write_dimension(out, &dims[1..], elements);
		} else if let Some(element) = elements.next() {
			out.push_str(&element);
		}
	}
	out.push('}');
}

/// Double-quotes an array element when Postgres would.
fn quote_element(text: String) -> String {
	let needs_quotes = text.is_empty()
		|| text.eq_ignore_ascii_case("NULL")
		|| text.chars().any(|c| matches!(c, '{' | '}' | ',' | '"' | '\\') || c.is_ascii_whitespace());
	if !needs_quotes {
		return text;
	}
	let mut quoted = String::with_capacity(text.len() + 2);
	quoted.push('"');
	for c in text.chars() {
		if c == '"' || c == '\\' {
			quoted.push('\\');
		}
		quoted.push(c);
	}
	quoted.push('"');
	quoted
}
