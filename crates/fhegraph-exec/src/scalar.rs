//! Cleartext slot values of each scheme and their arithmetic.
//!
//! Raw values never reach a primitive; the executor computes Raw⊗Raw
//! operations with these methods. Integer arithmetic wraps.

use std::fmt::Debug;

use fhegraph_core::types::ConstValue;
use fhegraph_core::valuation::PlainValue;

pub trait RawScalar: Copy + PartialEq + Debug + Send + Sync + 'static {
    fn is_zero(self) -> bool;
    fn raw_add(self, rhs: Self) -> Self;
    fn raw_sub(self, rhs: Self) -> Self;
    fn raw_mul(self, rhs: Self) -> Self;
    /// Callers check [`RawScalar::is_zero`] on the divisor first.
    fn raw_div(self, rhs: Self) -> Self;
    fn raw_neg(self) -> Self;

    /// Slots of a constant, before replication.
    fn from_const(value: &ConstValue) -> Result<Vec<Self>, String>;
    /// Slots of a caller value; scalars give one slot.
    fn from_plain(value: &PlainValue) -> Result<Vec<Self>, String>;
    fn into_plain(values: Vec<Self>) -> PlainValue;
}

impl RawScalar for f64 {
    fn is_zero(self) -> bool {
        self == 0.0
    }

    fn raw_add(self, rhs: Self) -> Self {
        self + rhs
    }

    fn raw_sub(self, rhs: Self) -> Self {
        self - rhs
    }

    fn raw_mul(self, rhs: Self) -> Self {
        self * rhs
    }

    fn raw_div(self, rhs: Self) -> Self {
        self / rhs
    }

    fn raw_neg(self) -> Self {
        -self
    }

    fn from_const(value: &ConstValue) -> Result<Vec<Self>, String> {
        Ok(match value {
            ConstValue::Float(values) => values.clone(),
            ConstValue::Int(values) => values.iter().map(|v| *v as f64).collect(),
            ConstValue::Byte(byte) => vec![f64::from(*byte)],
        })
    }

    fn from_plain(value: &PlainValue) -> Result<Vec<Self>, String> {
        Ok(match value {
            PlainValue::F64(v) => vec![*v],
            PlainValue::F64Vec(values) => values.clone(),
            PlainValue::I64(v) => vec![*v as f64],
            PlainValue::I64Vec(values) => values.iter().map(|v| *v as f64).collect(),
            PlainValue::Byte(byte) => vec![f64::from(*byte)],
        })
    }

    fn into_plain(values: Vec<Self>) -> PlainValue {
        PlainValue::F64Vec(values)
    }
}

impl RawScalar for i64 {
    fn is_zero(self) -> bool {
        self == 0
    }

    fn raw_add(self, rhs: Self) -> Self {
        self.wrapping_add(rhs)
    }

    fn raw_sub(self, rhs: Self) -> Self {
        self.wrapping_sub(rhs)
    }

    fn raw_mul(self, rhs: Self) -> Self {
        self.wrapping_mul(rhs)
    }

    fn raw_div(self, rhs: Self) -> Self {
        self.wrapping_div(rhs)
    }

    fn raw_neg(self) -> Self {
        self.wrapping_neg()
    }

    fn from_const(value: &ConstValue) -> Result<Vec<Self>, String> {
        match value {
            ConstValue::Int(values) => Ok(values.clone()),
            ConstValue::Byte(byte) => Ok(vec![i64::from(*byte)]),
            ConstValue::Float(values) => integral(values),
        }
    }

    fn from_plain(value: &PlainValue) -> Result<Vec<Self>, String> {
        match value {
            PlainValue::I64(v) => Ok(vec![*v]),
            PlainValue::I64Vec(values) => Ok(values.clone()),
            PlainValue::Byte(byte) => Ok(vec![i64::from(*byte)]),
            PlainValue::F64(v) => integral(&[*v]),
            PlainValue::F64Vec(values) => integral(values),
        }
    }

    fn into_plain(values: Vec<Self>) -> PlainValue {
        PlainValue::I64Vec(values)
    }
}

impl RawScalar for u8 {
    fn is_zero(self) -> bool {
        self == 0
    }

    fn raw_add(self, rhs: Self) -> Self {
        self.wrapping_add(rhs)
    }

    fn raw_sub(self, rhs: Self) -> Self {
        self.wrapping_sub(rhs)
    }

    fn raw_mul(self, rhs: Self) -> Self {
        self.wrapping_mul(rhs)
    }

    fn raw_div(self, rhs: Self) -> Self {
        self / rhs
    }

    fn raw_neg(self) -> Self {
        self.wrapping_neg()
    }

    fn from_const(value: &ConstValue) -> Result<Vec<Self>, String> {
        match value {
            ConstValue::Byte(byte) => Ok(vec![*byte]),
            ConstValue::Int(values) => values.iter().map(|v| to_byte(*v)).collect(),
            ConstValue::Float(_) => Err("the bitwise scheme has no real constants".to_string()),
        }
    }

    fn from_plain(value: &PlainValue) -> Result<Vec<Self>, String> {
        match value {
            PlainValue::Byte(byte) => Ok(vec![*byte]),
            PlainValue::I64(v) => Ok(vec![to_byte(*v)?]),
            PlainValue::I64Vec(values) => values.iter().map(|v| to_byte(*v)).collect(),
            PlainValue::F64(_) | PlainValue::F64Vec(_) => {
                Err("the bitwise scheme cannot encode real values".to_string())
            }
        }
    }

    fn into_plain(values: Vec<Self>) -> PlainValue {
        PlainValue::Byte(values.first().copied().unwrap_or(0))
    }
}

fn integral(values: &[f64]) -> Result<Vec<i64>, String> {
    values
        .iter()
        .map(|v| {
            if v.fract() == 0.0 && v.is_finite() {
                Ok(*v as i64)
            } else {
                Err(format!("{v} is not an integer"))
            }
        })
        .collect()
}

fn to_byte(value: i64) -> Result<u8, String> {
    u8::try_from(value).map_err(|_| format!("{value} does not fit in a byte"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_schemes_reject_fractions() {
        assert_eq!(i64::from_plain(&PlainValue::F64(3.0)), Ok(vec![3]));
        assert!(i64::from_plain(&PlainValue::F64(3.5)).is_err());
        assert!(i64::from_const(&ConstValue::Float(vec![0.25])).is_err());
    }

    #[test]
    fn bytes_must_fit() {
        assert_eq!(u8::from_plain(&PlainValue::I64(200)), Ok(vec![200]));
        assert!(u8::from_plain(&PlainValue::I64(256)).is_err());
        assert!(u8::from_plain(&PlainValue::F64(1.0)).is_err());
        assert_eq!(u8::into_plain(vec![7]), PlainValue::Byte(7));
    }

    #[test]
    fn integer_arithmetic_wraps() {
        assert_eq!(i64::MAX.raw_add(1), i64::MIN);
        assert_eq!(i64::MIN.raw_div(-1), i64::MIN);
        assert_eq!(0u8.raw_sub(1), 255);
    }
}
