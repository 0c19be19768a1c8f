//! Conversions between Rust scalars and the protobuf metric value.
//!
//! Sparkplug carries signed integers in the unsigned `int_value`/`long_value` fields as two's
//! complement of the declared width, so a negative `Int8` occupies only the low byte.

use thiserror::Error;

use crate::payload::metric;

/// A protobuf metric value.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricValue(pub metric::Value);

impl From<MetricValue> for metric::Value {
    fn from(value: MetricValue) -> Self {
        value.0
    }
}

impl From<metric::Value> for MetricValue {
    fn from(value: metric::Value) -> Self {
        MetricValue(value)
    }
}

/// Milliseconds since the unix epoch, carried as `DateTime`.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct DateTime {
    pub date_time: u64,
}

impl DateTime {
    pub fn new(date_time: u64) -> Self {
        Self { date_time }
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("metric value has variant {found}, expected {expected}")]
pub struct WireVariantError {
    expected: &'static str,
    found: &'static str,
}

fn variant_name(value: &metric::Value) -> &'static str {
    match value {
        metric::Value::IntValue(_) => "int_value",
        metric::Value::LongValue(_) => "long_value",
        metric::Value::FloatValue(_) => "float_value",
        metric::Value::DoubleValue(_) => "double_value",
        metric::Value::BooleanValue(_) => "boolean_value",
        metric::Value::StringValue(_) => "string_value",
        metric::Value::BytesValue(_) => "bytes_value",
    }
}

macro_rules! wire_conversion {
    ($type:ty, $variant:ident, |$to:ident| $encode:expr, |$from:ident| $decode:expr) => {
        impl From<$type> for MetricValue {
            fn from($to: $type) -> Self {
                MetricValue(metric::Value::$variant($encode))
            }
        }

        impl TryFrom<MetricValue> for $type {
            type Error = WireVariantError;

            fn try_from(value: MetricValue) -> Result<Self, Self::Error> {
                match value.0 {
                    metric::Value::$variant($from) => Ok($decode),
                    other => Err(WireVariantError {
                        expected: stringify!($variant),
                        found: variant_name(&other),
                    }),
                }
            }
        }
    };
}

wire_conversion!(bool, BooleanValue, |v| v, |v| v);
wire_conversion!(u8, IntValue, |v| v as u32, |v| v as u8);
wire_conversion!(u16, IntValue, |v| v as u32, |v| v as u16);
wire_conversion!(u32, IntValue, |v| v, |v| v);
wire_conversion!(u64, LongValue, |v| v, |v| v);
wire_conversion!(i8, IntValue, |v| v as u8 as u32, |v| v as u8 as i8);
wire_conversion!(i16, IntValue, |v| v as u16 as u32, |v| v as u16 as i16);
wire_conversion!(i32, IntValue, |v| v as u32, |v| v as i32);
wire_conversion!(i64, LongValue, |v| v as u64, |v| v as i64);
wire_conversion!(f32, FloatValue, |v| v, |v| v);
wire_conversion!(f64, DoubleValue, |v| v, |v| v);
wire_conversion!(String, StringValue, |v| v, |v| v);
wire_conversion!(Vec<u8>, BytesValue, |v| v, |v| v);
wire_conversion!(DateTime, LongValue, |v| v.date_time, |v| DateTime::new(v));

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! round_trip_limits {
        ($type:ty, $variant:ident) => {
            for start in [<$type>::MIN, <$type>::MAX] {
                let wire: MetricValue = start.into();
                assert!(matches!(wire.0, metric::Value::$variant(_)));
                assert_eq!(<$type>::try_from(wire).unwrap(), start);
            }
        };
    }

    #[test]
    fn integers_survive_the_unsigned_wire_fields() {
        round_trip_limits!(i8, IntValue);
        round_trip_limits!(i16, IntValue);
        round_trip_limits!(i32, IntValue);
        round_trip_limits!(i64, LongValue);
        round_trip_limits!(u16, IntValue);
        round_trip_limits!(u64, LongValue);
    }

    #[test]
    fn small_signed_values_do_not_sign_extend() {
        let v: MetricValue = (-1i8).into();
        assert_eq!(v.0, metric::Value::IntValue(0xFF));
        let v: MetricValue = (-1i16).into();
        assert_eq!(v.0, metric::Value::IntValue(0xFFFF));
    }

    #[test]
    fn wrong_variant_is_rejected() {
        let v: MetricValue = true.into();
        let err = String::try_from(v).unwrap_err();
        assert_eq!(
            err.to_string(),
            "metric value has variant boolean_value, expected StringValue"
        );
        let v: MetricValue = 1.5f64.into();
        assert!(Vec::<u8>::try_from(v).is_err());
    }
}
