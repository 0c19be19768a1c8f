use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    constants::{PROPERTY_ENG_UNIT, PROPERTY_SEMANTIC_ID, PROPERTY_SOURCE},
    payload::{self, DataType},
    property_set::{string_property, PropertySet},
    utils::timestamp,
    value::{DateTime, MetricValue},
};

/// A scalar metric value as produced by the ingestion layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
        }
    }

    /// A deterministic byte encoding of the value, tagged with its variant.
    ///
    /// `Int(1)` and `UInt(1)` encode differently, as do `String("1")` and `Bytes(b"1")`.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let (tag, body): (u8, Vec<u8>) = match self {
            Value::Bool(v) => (0, vec![*v as u8]),
            Value::Int(v) => (1, v.to_le_bytes().to_vec()),
            Value::UInt(v) => (2, v.to_le_bytes().to_vec()),
            Value::Float(v) => {
                // collapse -0.0 and NaN payloads
                let v = if *v == 0.0 { 0.0 } else { *v };
                let bits = if v.is_nan() { f64::NAN.to_bits() } else { v.to_bits() };
                (3, bits.to_le_bytes().to_vec())
            }
            Value::String(v) => (4, v.as_bytes().to_vec()),
            Value::Bytes(v) => (5, v.clone()),
        };
        let mut out = Vec::with_capacity(body.len() + 1);
        out.push(tag);
        out.extend(body);
        out
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(v) => f.write_str(v),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

macro_rules! impl_value_from {
    ($variant:ident, $($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(value: $t) -> Self {
                    Value::$variant(value.into())
                }
            }
        )*
    };
}

impl_value_from!(Bool, bool);
impl_value_from!(Int, i8, i16, i32, i64);
impl_value_from!(UInt, u8, u16, u32, u64);
impl_value_from!(Float, f32, f64);
impl_value_from!(String, String, &str);
impl_value_from!(Bytes, Vec<u8>);

/// The declared type of a metric, mapped onto a Sparkplug datatype.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    String,
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float,
    Double,
    DateTime,
    Bytes,
}

impl ValueType {
    /// Map a source schema type name (e.g. `xs:int`, `unsignedShort`, `dateTime`) onto a
    /// value type. Namespace prefixes and case are ignored; unknown names map to `String`.
    pub fn from_schema_type(schema_type: &str) -> Self {
        let name = schema_type.trim();
        let name = name.rsplit(':').next().unwrap_or(name).to_ascii_lowercase();
        match name.as_str() {
            "boolean" | "bool" => ValueType::Boolean,
            "byte" | "int8" => ValueType::Int8,
            "short" | "int16" => ValueType::Int16,
            "int" | "int32" => ValueType::Int32,
            "long" | "integer" | "int64" => ValueType::Int64,
            "unsignedbyte" | "uint8" => ValueType::UInt8,
            "unsignedshort" | "uint16" => ValueType::UInt16,
            "unsignedint" | "uint32" => ValueType::UInt32,
            "unsignedlong" | "uint64" => ValueType::UInt64,
            "float" => ValueType::Float,
            "double" | "decimal" => ValueType::Double,
            "datetime" | "datetimestamp" | "date" => ValueType::DateTime,
            "base64binary" | "hexbinary" | "bytes" | "blob" => ValueType::Bytes,
            _ => ValueType::String,
        }
    }

    pub fn datatype(&self) -> DataType {
        match self {
            ValueType::String => DataType::String,
            ValueType::Boolean => DataType::Boolean,
            ValueType::Int8 => DataType::Int8,
            ValueType::Int16 => DataType::Int16,
            ValueType::Int32 => DataType::Int32,
            ValueType::Int64 => DataType::Int64,
            ValueType::UInt8 => DataType::UInt8,
            ValueType::UInt16 => DataType::UInt16,
            ValueType::UInt32 => DataType::UInt32,
            ValueType::UInt64 => DataType::UInt64,
            ValueType::Float => DataType::Float,
            ValueType::Double => DataType::Double,
            ValueType::DateTime => DataType::DateTime,
            ValueType::Bytes => DataType::Bytes,
        }
    }

    pub fn from_datatype(datatype: DataType) -> Option<Self> {
        let ty = match datatype {
            DataType::String | DataType::Text | DataType::Uuid => ValueType::String,
            DataType::Boolean => ValueType::Boolean,
            DataType::Int8 => ValueType::Int8,
            DataType::Int16 => ValueType::Int16,
            DataType::Int32 => ValueType::Int32,
            DataType::Int64 => ValueType::Int64,
            DataType::UInt8 => ValueType::UInt8,
            DataType::UInt16 => ValueType::UInt16,
            DataType::UInt32 => ValueType::UInt32,
            DataType::UInt64 => ValueType::UInt64,
            DataType::Float => ValueType::Float,
            DataType::Double => ValueType::Double,
            DataType::DateTime => ValueType::DateTime,
            DataType::Bytes | DataType::File => ValueType::Bytes,
            _ => return None,
        };
        Some(ty)
    }

    /// Name used in the retained JSON payload.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Boolean => "boolean",
            ValueType::Int8 => "int8",
            ValueType::Int16 => "int16",
            ValueType::Int32 => "int32",
            ValueType::Int64 => "int64",
            ValueType::UInt8 => "uint8",
            ValueType::UInt16 => "uint16",
            ValueType::UInt32 => "uint32",
            ValueType::UInt64 => "uint64",
            ValueType::Float => "float",
            ValueType::Double => "double",
            ValueType::DateTime => "datetime",
            ValueType::Bytes => "bytes",
        }
    }

    /// Coerce a value into the wire representation of this type.
    pub fn encode(&self, value: &Value) -> Result<MetricValue, ValueError> {
        let out = match self {
            ValueType::Boolean => match value {
                Value::Bool(b) => (*b).into(),
                Value::Int(v) => (*v != 0).into(),
                Value::UInt(v) => (*v != 0).into(),
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" => true.into(),
                    "false" | "0" => false.into(),
                    _ => return Err(self.out_of_range(value)),
                },
                _ => return Err(self.incompatible(value)),
            },
            ValueType::Int8 => integer::<i8>(self, value)?.into(),
            ValueType::Int16 => integer::<i16>(self, value)?.into(),
            ValueType::Int32 => integer::<i32>(self, value)?.into(),
            ValueType::Int64 => integer::<i64>(self, value)?.into(),
            ValueType::UInt8 => integer::<u8>(self, value)?.into(),
            ValueType::UInt16 => integer::<u16>(self, value)?.into(),
            ValueType::UInt32 => integer::<u32>(self, value)?.into(),
            ValueType::UInt64 => integer::<u64>(self, value)?.into(),
            ValueType::DateTime => DateTime::new(integer::<u64>(self, value)?).into(),
            ValueType::Float => (float(self, value)? as f32).into(),
            ValueType::Double => float(self, value)?.into(),
            ValueType::String => match value {
                Value::Bytes(_) => return Err(self.incompatible(value)),
                other => other.to_string().into(),
            },
            ValueType::Bytes => match value {
                Value::Bytes(b) => b.clone().into(),
                Value::String(s) => s.as_bytes().to_vec().into(),
                _ => return Err(self.incompatible(value)),
            },
        };
        Ok(out)
    }

    /// Read a wire value back as this type.
    pub fn decode(&self, value: MetricValue) -> Result<Value, ValueError> {
        let decoded = match self {
            ValueType::Boolean => bool::try_from(value).map(Value::Bool),
            ValueType::Int8 => i8::try_from(value).map(Value::from),
            ValueType::Int16 => i16::try_from(value).map(Value::from),
            ValueType::Int32 => i32::try_from(value).map(Value::from),
            ValueType::Int64 => i64::try_from(value).map(Value::from),
            ValueType::UInt8 => u8::try_from(value).map(Value::from),
            ValueType::UInt16 => u16::try_from(value).map(Value::from),
            ValueType::UInt32 => u32::try_from(value).map(Value::from),
            ValueType::UInt64 => u64::try_from(value).map(Value::from),
            ValueType::DateTime => DateTime::try_from(value).map(|d| Value::UInt(d.date_time)),
            ValueType::Float => f32::try_from(value).map(|v| Value::Float(v as f64)),
            ValueType::Double => f64::try_from(value).map(Value::Float),
            ValueType::String => String::try_from(value).map(Value::String),
            ValueType::Bytes => Vec::<u8>::try_from(value).map(Value::Bytes),
        };
        decoded.map_err(|_| ValueError::WireMismatch(*self))
    }

    fn incompatible(&self, value: &Value) -> ValueError {
        ValueError::Incompatible {
            value_type: *self,
            found: value.kind(),
        }
    }

    fn out_of_range(&self, value: &Value) -> ValueError {
        ValueError::OutOfRange {
            value_type: *self,
            value: value.to_string(),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn integer<T>(ty: &ValueType, value: &Value) -> Result<T, ValueError>
where
    T: TryFrom<i64> + TryFrom<u64>,
{
    let out = match value {
        Value::Bool(b) => T::try_from(*b as u64).ok(),
        Value::Int(v) => T::try_from(*v).ok(),
        Value::UInt(v) => T::try_from(*v).ok(),
        Value::Float(f) if f.is_finite() && f.fract() == 0.0 => {
            if *f < 0.0 {
                T::try_from(*f as i64).ok()
            } else {
                T::try_from(*f as u64).ok()
            }
        }
        Value::Float(_) => None,
        Value::String(s) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(v) => T::try_from(v).ok(),
                Err(_) => s.parse::<u64>().ok().and_then(|v| T::try_from(v).ok()),
            }
        }
        Value::Bytes(_) => return Err(ty.incompatible(value)),
    };
    out.ok_or_else(|| ty.out_of_range(value))
}

fn float(ty: &ValueType, value: &Value) -> Result<f64, ValueError> {
    match value {
        Value::Float(f) => Ok(*f),
        Value::Int(v) => Ok(*v as f64),
        Value::UInt(v) => Ok(*v as f64),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse().map_err(|_| ty.out_of_range(value)),
        Value::Bytes(_) => Err(ty.incompatible(value)),
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ValueError {
    #[error("a {found} value cannot be encoded as {value_type}")]
    Incompatible {
        value_type: ValueType,
        found: &'static str,
    },
    #[error("value {value} does not fit {value_type}")]
    OutOfRange { value_type: ValueType, value: String },
    #[error("wire value does not match declared type {0}")]
    WireMismatch(ValueType),
    #[error("wire metric has no name")]
    MissingName,
    #[error("wire metric has an unsupported datatype")]
    UnsupportedDataType,
}

/// An immutable metric snapshot.
///
/// `path` identifies the metric inside its device's namespace.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub path: String,
    pub value: Option<Value>,
    pub value_type: ValueType,
    pub timestamp_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl Metric {
    pub fn new<P: Into<String>>(path: P, value_type: ValueType, value: Option<Value>) -> Self {
        Self {
            path: path.into(),
            value,
            value_type,
            timestamp_ms: timestamp() as i64,
            semantic_id: None,
            unit: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp_ms: i64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }

    pub fn with_semantic_id<S: Into<String>>(mut self, semantic_id: S) -> Self {
        self.semantic_id = Some(semantic_id.into());
        self
    }

    pub fn with_unit<S: Into<String>>(mut self, unit: S) -> Self {
        self.unit = Some(unit.into());
        self
    }

    fn wire_timestamp(&self) -> u64 {
        self.timestamp_ms.max(0) as u64
    }

    fn set_wire_value(&self, metric: &mut payload::Metric) -> Result<(), ValueError> {
        match &self.value {
            Some(v) => {
                metric.set_value(self.value_type.encode(v)?.into());
            }
            None => {
                metric.set_null();
            }
        }
        Ok(())
    }

    /// Build the birth representation: name, alias, datatype and properties.
    pub fn to_birth_metric(
        &self,
        alias: u64,
        source: Option<&str>,
    ) -> Result<payload::Metric, ValueError> {
        let mut metric = payload::Metric::new();
        metric
            .set_name(self.path.clone())
            .set_alias(alias)
            .set_datatype(self.value_type.datatype())
            .set_timestamp(self.wire_timestamp());
        self.set_wire_value(&mut metric)?;

        let mut properties = PropertySet::new();
        if let Some(unit) = &self.unit {
            properties.insert(PROPERTY_ENG_UNIT, Some(unit.clone()));
        }
        if let Some(semantic_id) = &self.semantic_id {
            properties.insert(PROPERTY_SEMANTIC_ID, Some(semantic_id.clone()));
        }
        if let Some(source) = source {
            properties.insert(PROPERTY_SOURCE, Some(source.to_string()));
        }
        if !properties.is_empty() {
            metric.properties = Some(properties.into());
        }
        Ok(metric)
    }

    /// Build the data representation: alias, timestamp and value only.
    pub fn to_data_metric(&self, alias: u64) -> Result<payload::Metric, ValueError> {
        let mut metric = payload::Metric::new();
        metric.set_alias(alias).set_timestamp(self.wire_timestamp());
        self.set_wire_value(&mut metric)?;
        Ok(metric)
    }
}

impl TryFrom<&payload::Metric> for Metric {
    type Error = ValueError;

    /// Recover a metric from a birth representation.
    fn try_from(metric: &payload::Metric) -> Result<Self, Self::Error> {
        let path = metric.name.clone().ok_or(ValueError::MissingName)?;
        let value_type = metric
            .datatype
            .and_then(|d| DataType::try_from(d).ok())
            .and_then(ValueType::from_datatype)
            .ok_or(ValueError::UnsupportedDataType)?;
        let value = match &metric.value {
            Some(v) => Some(value_type.decode(v.clone().into())?),
            None => None,
        };
        let (semantic_id, unit) = match &metric.properties {
            Some(p) => (
                string_property(p, PROPERTY_SEMANTIC_ID),
                string_property(p, PROPERTY_ENG_UNIT),
            ),
            None => (None, None),
        };
        Ok(Metric {
            path,
            value,
            value_type,
            timestamp_ms: metric.timestamp.unwrap_or(0) as i64,
            semantic_id,
            unit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::metric::Value as WireValue;

    #[test]
    fn schema_type_table() {
        assert_eq!(ValueType::from_schema_type("xs:int"), ValueType::Int32);
        assert_eq!(ValueType::from_schema_type("xs:unsignedShort"), ValueType::UInt16);
        assert_eq!(ValueType::from_schema_type("BOOLEAN"), ValueType::Boolean);
        assert_eq!(ValueType::from_schema_type("xs:dateTime"), ValueType::DateTime);
        assert_eq!(ValueType::from_schema_type("xs:base64Binary"), ValueType::Bytes);
        assert_eq!(ValueType::from_schema_type("xs:double"), ValueType::Double);
        assert_eq!(ValueType::from_schema_type("xs:long"), ValueType::Int64);
        assert_eq!(ValueType::from_schema_type("xs:anyURI"), ValueType::String);
        assert_eq!(ValueType::from_schema_type(""), ValueType::String);
        assert_eq!(ValueType::from_schema_type("something:odd"), ValueType::String);
    }

    #[test]
    fn encode_coerces_and_checks_range() {
        assert_eq!(
            ValueType::Int16.encode(&Value::Float(12.0)).unwrap().0,
            WireValue::IntValue(12)
        );
        assert_eq!(
            ValueType::UInt8.encode(&Value::String(" 200 ".into())).unwrap().0,
            WireValue::IntValue(200)
        );
        assert!(matches!(
            ValueType::UInt8.encode(&Value::Int(-1)),
            Err(ValueError::OutOfRange { .. })
        ));
        assert!(matches!(
            ValueType::Int8.encode(&Value::Float(1.5)),
            Err(ValueError::OutOfRange { .. })
        ));
        assert!(matches!(
            ValueType::Double.encode(&Value::Bytes(vec![1])),
            Err(ValueError::Incompatible { .. })
        ));
        assert_eq!(
            ValueType::String.encode(&Value::Float(1.5)).unwrap().0,
            WireValue::StringValue("1.5".into())
        );
        assert_eq!(
            ValueType::Boolean.encode(&Value::Int(3)).unwrap().0,
            WireValue::BooleanValue(true)
        );
    }

    #[test]
    fn birth_metric_carries_names_and_properties() {
        let metric = Metric::new("Temp/Value", ValueType::Double, Some(Value::Float(21.5)))
            .with_timestamp(1_000)
            .with_unit("degC")
            .with_semantic_id("0173-1#02-AAB381#003");
        let wire = metric.to_birth_metric(4, Some("urn:asset:1")).unwrap();
        assert_eq!(wire.name.as_deref(), Some("Temp/Value"));
        assert_eq!(wire.alias, Some(4));
        assert_eq!(wire.datatype, Some(DataType::Double as u32));
        assert_eq!(wire.timestamp, Some(1_000));
        assert_eq!(wire.value, Some(WireValue::DoubleValue(21.5)));
        let props = wire.properties.as_ref().unwrap();
        assert_eq!(string_property(props, PROPERTY_ENG_UNIT), Some("degC".into()));
        assert_eq!(
            string_property(props, PROPERTY_SOURCE),
            Some("urn:asset:1".into())
        );

        let recovered = Metric::try_from(&wire).unwrap();
        assert_eq!(recovered, metric);
    }

    #[test]
    fn data_metric_is_alias_only() {
        let metric = Metric::new("a", ValueType::Int32, Some(Value::Int(-5)));
        let wire = metric.to_data_metric(9).unwrap();
        assert_eq!(wire.name, None);
        assert_eq!(wire.datatype, None);
        assert_eq!(wire.properties, None);
        assert_eq!(wire.alias, Some(9));
        assert_eq!(wire.is_null, None);

        let null = Metric::new("b", ValueType::String, None).to_data_metric(1).unwrap();
        assert_eq!(null.is_null, Some(true));
        assert_eq!(null.value, None);
    }

    #[test]
    fn canonical_bytes_distinguish_variants() {
        assert_ne!(
            Value::Int(1).canonical_bytes(),
            Value::UInt(1).canonical_bytes()
        );
        assert_eq!(
            Value::Float(0.0).canonical_bytes(),
            Value::Float(-0.0).canonical_bytes()
        );
        assert_eq!(
            Value::String("x".into()).canonical_bytes(),
            Value::from("x").canonical_bytes()
        );
    }

    #[test]
    fn metric_json_shape() {
        let metric = Metric::new("p", ValueType::UInt16, Some(Value::UInt(7))).with_timestamp(5);
        let json = serde_json::to_value(&metric).unwrap();
        assert_eq!(json["path"], "p");
        assert_eq!(json["value"], 7);
        assert_eq!(json["timestampMs"], 5);
        assert!(json.get("unit").is_none());
    }
}
