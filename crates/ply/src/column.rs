use std::borrow::Cow;

use crate::header::ScalarType;

/// One attribute column, stored with the type the header declared.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    I8(Vec<i8>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

macro_rules! each_column {
    ($column:expr, $v:ident => $body:expr) => {
        match $column {
            Column::I8($v) => $body,
            Column::U8($v) => $body,
            Column::I16($v) => $body,
            Column::U16($v) => $body,
            Column::I32($v) => $body,
            Column::U32($v) => $body,
            Column::F32($v) => $body,
            Column::F64($v) => $body,
        }
    };
}

macro_rules! push_binary {
    ($v:ident, $t:ty, $raw:expr, $big_endian:expr) => {{
        let mut buf = [0u8; std::mem::size_of::<$t>()];
        buf.copy_from_slice($raw);
        $v.push(if $big_endian {
            <$t>::from_be_bytes(buf)
        } else {
            <$t>::from_le_bytes(buf)
        });
    }};
}

impl Column {
    pub fn with_capacity(ty: ScalarType, capacity: usize) -> Self {
        match ty {
            ScalarType::I8 => Column::I8(Vec::with_capacity(capacity)),
            ScalarType::U8 => Column::U8(Vec::with_capacity(capacity)),
            ScalarType::I16 => Column::I16(Vec::with_capacity(capacity)),
            ScalarType::U16 => Column::U16(Vec::with_capacity(capacity)),
            ScalarType::I32 => Column::I32(Vec::with_capacity(capacity)),
            ScalarType::U32 => Column::U32(Vec::with_capacity(capacity)),
            ScalarType::F32 => Column::F32(Vec::with_capacity(capacity)),
            ScalarType::F64 => Column::F64(Vec::with_capacity(capacity)),
        }
    }

    pub fn scalar_type(&self) -> ScalarType {
        match self {
            Column::I8(_) => ScalarType::I8,
            Column::U8(_) => ScalarType::U8,
            Column::I16(_) => ScalarType::I16,
            Column::U16(_) => ScalarType::U16,
            Column::I32(_) => ScalarType::I32,
            Column::U32(_) => ScalarType::U32,
            Column::F32(_) => ScalarType::F32,
            Column::F64(_) => ScalarType::F64,
        }
    }

    pub fn len(&self) -> usize {
        each_column!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values as `f32`, borrowed when the column already is `float`.
    pub fn to_f32(&self) -> Cow<'_, [f32]> {
        match self {
            Column::F32(v) => Cow::Borrowed(v),
            other => Cow::Owned(each_column!(other, v => v.iter().map(|&x| x as f32).collect())),
        }
    }

    /// Append one value decoded from `raw`, which must be exactly `scalar_type().size()` bytes.
    pub(crate) fn push_binary(&mut self, raw: &[u8], big_endian: bool) {
        match self {
            Column::I8(v) => push_binary!(v, i8, raw, big_endian),
            Column::U8(v) => push_binary!(v, u8, raw, big_endian),
            Column::I16(v) => push_binary!(v, i16, raw, big_endian),
            Column::U16(v) => push_binary!(v, u16, raw, big_endian),
            Column::I32(v) => push_binary!(v, i32, raw, big_endian),
            Column::U32(v) => push_binary!(v, u32, raw, big_endian),
            Column::F32(v) => push_binary!(v, f32, raw, big_endian),
            Column::F64(v) => push_binary!(v, f64, raw, big_endian),
        }
    }

    /// Append one value parsed from an ascii token. Returns `false` if it does not parse.
    pub(crate) fn push_text(&mut self, token: &str) -> bool {
        each_column!(self, v => match token.parse() {
            Ok(value) => {
                v.push(value);
                true
            }
            Err(_) => false,
        })
    }

    /// Encode value `index` into `out`.
    pub(crate) fn write_binary(&self, index: usize, big_endian: bool, out: &mut Vec<u8>) {
        each_column!(self, v => {
            let value = v[index];
            if big_endian {
                out.extend_from_slice(&value.to_be_bytes());
            } else {
                out.extend_from_slice(&value.to_le_bytes());
            }
        })
    }

    pub(crate) fn write_text(&self, index: usize, out: &mut String) {
        each_column!(self, v => out.push_str(&v[index].to_string()))
    }
}

impl From<Vec<f32>> for Column {
    fn from(values: Vec<f32>) -> Self {
        Column::F32(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_push_respects_endianness() {
        let mut le = Column::with_capacity(ScalarType::U16, 1);
        le.push_binary(&[0x01, 0x02], false);
        let mut be = Column::with_capacity(ScalarType::U16, 1);
        be.push_binary(&[0x01, 0x02], true);
        assert_eq!(le, Column::U16(vec![0x0201]));
        assert_eq!(be, Column::U16(vec![0x0102]));
    }

    #[test]
    fn text_push_rejects_garbage() {
        let mut column = Column::with_capacity(ScalarType::F32, 2);
        assert!(column.push_text("1.5"));
        assert!(!column.push_text("abc"));
        assert_eq!(column.len(), 1);
    }

    #[test]
    fn widening_to_f32() {
        let column = Column::U8(vec![0, 255]);
        assert_eq!(column.to_f32().as_ref(), &[0.0, 255.0]);
        let floats = Column::F32(vec![0.25]);
        assert!(matches!(floats.to_f32(), Cow::Borrowed(_)));
    }
}
