//! Row Decoding
//!
//! Converts driver rows into [`CellValue`]s. Column types are only known at
//! run time, so every cell is decoded by inspecting its wire type.
//!
//! # Type Mapping
//! - BOOL → Bool; integer and float families → Number (NaN/Infinity → Null)
//! - NUMERIC → String, preserving the exact decimal text
//! - text family → String; UUID and temporal types → ISO-formatted String
//! - JSON/JSONB → Nested
//! - BYTEA → Bytes (Base64 in JSON output)
//! - one-dimensional arrays of the scalar types above → Nested array
//! - anything else → the raw wire text if it is UTF-8, otherwise Bytes

use std::error::Error as StdError;

use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::Row;

use crate::engine::CellValue;
use crate::error::{LensError, Result};

type BoxError = Box<dyn StdError + Sync + Send>;

/// Decode every cell of `row`, keyed by column name
///
/// Keys follow the statement's column order. Duplicate column names collapse
/// into the first position and the last value wins.
pub fn decode_row(row: &Row) -> Result<crate::engine::Row> {
    let mut decoded = crate::engine::Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        decoded.insert(column.name().to_string(), decode_cell(row, idx)?);
    }
    Ok(decoded)
}

fn get<'a, T: FromSql<'a>>(row: &'a Row, idx: usize, what: &str) -> Result<Option<T>> {
    row.try_get::<_, Option<T>>(idx)
        .map_err(|e| LensError::query_failed(format!("Failed to get {what} value: {e}")))
}

fn float(v: f64) -> CellValue {
    serde_json::Number::from_f64(v).map_or(CellValue::Null, CellValue::Number)
}

fn json_float(v: f64) -> serde_json::Value {
    serde_json::Number::from_f64(v).map_or(serde_json::Value::Null, serde_json::Value::Number)
}

/// Decode a single cell
pub fn decode_cell(row: &Row, idx: usize) -> Result<CellValue> {
    let col_type = row.columns()[idx].type_().clone();

    let value = match col_type {
        Type::BOOL => get::<bool>(row, idx, "boolean")?.map(CellValue::Bool),

        Type::INT2 => get::<i16>(row, idx, "i16")?.map(|v| CellValue::from(i64::from(v))),
        Type::INT4 => get::<i32>(row, idx, "i32")?.map(|v| CellValue::from(i64::from(v))),
        Type::INT8 => get::<i64>(row, idx, "i64")?.map(CellValue::from),
        Type::OID => get::<u32>(row, idx, "oid")?.map(|v| CellValue::from(i64::from(v))),

        Type::FLOAT4 => get::<f32>(row, idx, "f32")?.map(|v| float(f64::from(v))),
        Type::FLOAT8 => get::<f64>(row, idx, "f64")?.map(float),

        Type::NUMERIC => get::<Numeric>(row, idx, "numeric")?.map(|n| CellValue::String(n.0)),

        Type::VARCHAR | Type::TEXT | Type::BPCHAR | Type::NAME => {
            get::<String>(row, idx, "string")?.map(CellValue::String)
        }

        Type::JSON | Type::JSONB => {
            get::<serde_json::Value>(row, idx, "JSON")?.map(CellValue::Nested)
        }

        Type::BYTEA => get::<Vec<u8>>(row, idx, "bytea")?.map(CellValue::Bytes),

        Type::TIMESTAMP => get::<chrono::NaiveDateTime>(row, idx, "timestamp")?
            .map(|v| CellValue::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        Type::TIMESTAMPTZ => get::<chrono::DateTime<chrono::Utc>>(row, idx, "timestamptz")?
            .map(|v| CellValue::String(v.to_rfc3339())),
        Type::DATE => get::<chrono::NaiveDate>(row, idx, "date")?
            .map(|v| CellValue::String(v.format("%Y-%m-%d").to_string())),
        Type::TIME => get::<chrono::NaiveTime>(row, idx, "time")?
            .map(|v| CellValue::String(v.format("%H:%M:%S%.f").to_string())),

        Type::UUID => {
            get::<uuid::Uuid>(row, idx, "UUID")?.map(|v| CellValue::String(v.to_string()))
        }

        Type::BOOL_ARRAY => array::<bool>(row, idx, serde_json::Value::Bool)?,
        Type::INT2_ARRAY => array::<i16>(row, idx, |v| serde_json::Value::from(v))?,
        Type::INT4_ARRAY => array::<i32>(row, idx, |v| serde_json::Value::from(v))?,
        Type::INT8_ARRAY => array::<i64>(row, idx, |v| serde_json::Value::from(v))?,
        Type::FLOAT4_ARRAY => array::<f32>(row, idx, |v| json_float(f64::from(v)))?,
        Type::FLOAT8_ARRAY => array::<f64>(row, idx, json_float)?,
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY | Type::BPCHAR_ARRAY | Type::NAME_ARRAY => {
            array::<String>(row, idx, serde_json::Value::String)?
        }
        Type::UUID_ARRAY => {
            array::<uuid::Uuid>(row, idx, |v| serde_json::Value::String(v.to_string()))?
        }

        _ => get::<RawValue>(row, idx, col_type.name())?.map(RawValue::into_cell),
    };

    Ok(value.unwrap_or(CellValue::Null))
}

fn array<'a, T: FromSql<'a>>(
    row: &'a Row,
    idx: usize,
    convert: impl Fn(T) -> serde_json::Value,
) -> Result<Option<CellValue>> {
    let items = get::<Vec<Option<T>>>(row, idx, "array")?;
    Ok(items.map(|items| {
        CellValue::Nested(serde_json::Value::Array(
            items
                .into_iter()
                .map(|item| item.map_or(serde_json::Value::Null, &convert))
                .collect(),
        ))
    }))
}

/// Decimal text of a NUMERIC value
#[derive(Debug, PartialEq, Eq)]
struct Numeric(String);

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

impl<'a> FromSql<'a> for Numeric {
    fn from_sql(_: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        parse_numeric(raw).map(Numeric)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

fn read_u16(raw: &[u8], at: usize) -> std::result::Result<u16, BoxError> {
    match raw.get(at..at + 2) {
        Some(bytes) => Ok(u16::from_be_bytes([bytes[0], bytes[1]])),
        None => Err("truncated numeric".into()),
    }
}

/// Render the binary NUMERIC wire format as decimal text
///
/// Layout: ndigits, weight, sign, dscale (all 16-bit), then `ndigits`
/// base-10000 digits. `weight` is the power of 10000 of the first digit.
fn parse_numeric(raw: &[u8]) -> std::result::Result<String, BoxError> {
    let ndigits = usize::from(read_u16(raw, 0)?);
    let weight = i32::from(read_u16(raw, 2)? as i16);
    let sign = read_u16(raw, 4)?;
    let dscale = usize::from(read_u16(raw, 6)?);

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        _ => {}
    }

    let digits = (0..ndigits)
        .map(|i| read_u16(raw, 8 + i * 2))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let digit_at = |pos: i32| -> u16 {
        usize::try_from(pos)
            .ok()
            .and_then(|p| digits.get(p).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG {
        out.push('-');
    }

    if weight < 0 {
        out.push('0');
    } else {
        for pos in 0..=weight {
            let d = digit_at(pos);
            if pos == 0 {
                out.push_str(&d.to_string());
            } else {
                out.push_str(&format!("{d:04}"));
            }
        }
    }

    if dscale > 0 {
        let mut frac = String::new();
        let mut pos = weight + 1;
        while frac.len() < dscale {
            frac.push_str(&format!("{:04}", digit_at(pos)));
            pos += 1;
        }
        frac.truncate(dscale);
        out.push('.');
        out.push_str(&frac);
    }

    Ok(out)
}

/// Wire bytes of a type with no dedicated decoding
struct RawValue(Vec<u8>);

impl RawValue {
    fn into_cell(self) -> CellValue {
        match String::from_utf8(self.0) {
            Ok(text) => CellValue::String(text),
            Err(e) => CellValue::Bytes(e.into_bytes()),
        }
    }
}

impl<'a> FromSql<'a> for RawValue {
    fn from_sql(_: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        Ok(Self(raw.to_vec()))
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}
