use std::borrow::Cow;
use std::io::Read;
use std::path::Path;

use crate::PlyError;
use crate::column::Column;
use crate::header::{Element, Format, Header, PropertyKind, ScalarType, parse_header};

/// Element whose properties become attribute columns.
pub const VERTEX_ELEMENT: &str = "vertex";

/// Named, typed columns decoded from the vertex element of a point-record stream.
///
/// Every column has exactly [`record_count`](Self::record_count) entries; a
/// stream that cannot supply them fails to load.
#[derive(Debug, Clone)]
pub struct AttributeCollection {
    header: Header,
    record_count: usize,
    columns: Vec<(String, Column)>,
}

impl AttributeCollection {
    /// Read a PLY stream to completion and decode its vertex columns.
    pub fn load(mut reader: impl Read) -> Result<Self, PlyError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes)
    }

    pub fn load_path(path: impl AsRef<Path>) -> Result<Self, PlyError> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::load(std::io::BufReader::new(file))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PlyError> {
        let (header, offset) = parse_header(bytes)?;
        let vertex_index = header
            .elements
            .iter()
            .position(|e| e.name == VERTEX_ELEMENT)
            .ok_or_else(|| PlyError::ElementNotFound(VERTEX_ELEMENT.into()))?;

        let body = &bytes[offset..];
        let columns = match header.format {
            Format::Ascii => read_ascii(&header.elements, vertex_index, body)?,
            Format::BinaryLittleEndian => read_binary(&header.elements, vertex_index, body, false)?,
            Format::BinaryBigEndian => read_binary(&header.elements, vertex_index, body, true)?,
        };
        let record_count = header.elements[vertex_index].count;

        tracing::debug!(
            format = header.format.as_str(),
            records = record_count,
            columns = columns.len(),
            "point records decoded"
        );

        Ok(Self {
            header,
            record_count,
            columns,
        })
    }

    /// Build a collection from in-memory columns, all of which must share one length.
    pub fn from_columns(columns: Vec<(String, Column)>) -> Result<Self, PlyError> {
        let record_count = columns.first().map_or(0, |(_, c)| c.len());
        if let Some((name, column)) = columns.iter().find(|(_, c)| c.len() != record_count) {
            return Err(PlyError::MalformedStream(format!(
                "column '{name}' has {} values, expected {record_count}",
                column.len()
            )));
        }
        let properties = columns
            .iter()
            .map(|(name, column)| crate::header::Property {
                name: name.clone(),
                kind: PropertyKind::Scalar(column.scalar_type()),
            })
            .collect();
        Ok(Self {
            header: Header {
                format: Format::BinaryLittleEndian,
                elements: vec![Element {
                    name: VERTEX_ELEMENT.into(),
                    count: record_count,
                    properties,
                }],
                comments: Vec::new(),
            },
            record_count,
            columns,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }

    /// Column names in declaration order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn column(&self, name: &str) -> Result<&Column, PlyError> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
            .ok_or_else(|| PlyError::MissingAttribute(name.into()))
    }

    /// A `float` column, without conversion.
    pub fn get_column(&self, name: &str) -> Result<&[f32], PlyError> {
        match self.column(name)? {
            Column::F32(values) => Ok(values),
            other => Err(PlyError::TypeMismatch {
                name: name.into(),
                found: other.scalar_type().as_str(),
            }),
        }
    }

    /// Any numeric column as `f32`.
    pub fn float_column(&self, name: &str) -> Result<Cow<'_, [f32]>, PlyError> {
        Ok(self.column(name)?.to_f32())
    }
}

struct ByteCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8], PlyError> {
        let end = self.pos.saturating_add(len);
        if end > self.bytes.len() {
            return Err(PlyError::MalformedStream(format!(
                "stream ended at byte {} while reading {what}",
                self.bytes.len()
            )));
        }
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }
}

fn list_len(ty: ScalarType, raw: &[u8], big_endian: bool) -> Result<usize, PlyError> {
    let mut column = Column::with_capacity(ty, 1);
    column.push_binary(raw, big_endian);
    let len = match column {
        Column::I8(v) => i64::from(v[0]),
        Column::U8(v) => i64::from(v[0]),
        Column::I16(v) => i64::from(v[0]),
        Column::U16(v) => i64::from(v[0]),
        Column::I32(v) => i64::from(v[0]),
        Column::U32(v) => i64::from(v[0]),
        Column::F32(_) | Column::F64(_) => {
            return Err(PlyError::MalformedStream(format!(
                "list length type '{}' is not an integer",
                ty.as_str()
            )));
        }
    };
    usize::try_from(len)
        .map_err(|_| PlyError::MalformedStream(format!("invalid list length {len}")))
}

/// Columns for the scalar properties of `element`, reserving at most `capacity` entries.
///
/// The declared count is untrusted; callers bound the reservation by what the body can hold.
fn empty_columns(element: &Element, capacity: usize) -> Vec<(String, Column)> {
    let capacity = element.count.min(capacity);
    element
        .properties
        .iter()
        .filter_map(|p| match p.kind {
            PropertyKind::Scalar(ty) => Some((p.name.clone(), Column::with_capacity(ty, capacity))),
            PropertyKind::List { .. } => None,
        })
        .collect()
}

/// Fewest bytes one binary record can occupy: scalars plus the length prefix of each list.
fn min_record_bytes(element: &Element) -> usize {
    element
        .properties
        .iter()
        .map(|p| match p.kind {
            PropertyKind::Scalar(ty) => ty.size(),
            PropertyKind::List { count, .. } => count.size(),
        })
        .sum()
}

fn read_binary(
    elements: &[Element],
    vertex_index: usize,
    body: &[u8],
    big_endian: bool,
) -> Result<Vec<(String, Column)>, PlyError> {
    let mut cursor = ByteCursor { bytes: body, pos: 0 };

    for element in &elements[..vertex_index] {
        for _ in 0..element.count {
            for property in &element.properties {
                skip_binary_property(&mut cursor, property.kind, big_endian)?;
            }
        }
    }

    let vertex = &elements[vertex_index];
    if let Some(record_size) = vertex.record_size() {
        let needed = record_size.saturating_mul(vertex.count);
        if needed > cursor.remaining() {
            return Err(PlyError::MalformedStream(format!(
                "{} records of {record_size} bytes need {needed} bytes, found {}",
                vertex.count,
                cursor.remaining()
            )));
        }
    }

    let fits = cursor.remaining() / min_record_bytes(vertex).max(1);
    let mut columns = empty_columns(vertex, fits);
    for _ in 0..vertex.count {
        let mut slot = 0;
        for property in &vertex.properties {
            match property.kind {
                PropertyKind::Scalar(ty) => {
                    let raw = cursor.take(ty.size(), &property.name)?;
                    columns[slot].1.push_binary(raw, big_endian);
                    slot += 1;
                }
                kind => skip_binary_property(&mut cursor, kind, big_endian)?,
            }
        }
    }
    Ok(columns)
}

fn skip_binary_property(
    cursor: &mut ByteCursor<'_>,
    kind: PropertyKind,
    big_endian: bool,
) -> Result<(), PlyError> {
    match kind {
        PropertyKind::Scalar(ty) => {
            cursor.take(ty.size(), "scalar property")?;
        }
        PropertyKind::List { count, item } => {
            let raw = cursor.take(count.size(), "list length")?;
            let len = list_len(count, raw, big_endian)?;
            cursor.take(len.saturating_mul(item.size()), "list items")?;
        }
    }
    Ok(())
}

fn read_ascii(
    elements: &[Element],
    vertex_index: usize,
    body: &[u8],
) -> Result<Vec<(String, Column)>, PlyError> {
    let text = std::str::from_utf8(body)
        .map_err(|_| PlyError::MalformedStream("ascii body is not valid UTF-8".into()))?;
    let mut tokens = text.split_whitespace();
    let mut next = |what: &str| {
        tokens
            .next()
            .ok_or_else(|| PlyError::MalformedStream(format!("stream ended while reading {what}")))
    };

    for element in &elements[..vertex_index] {
        for _ in 0..element.count {
            for property in &element.properties {
                let first = next(&property.name)?;
                if let PropertyKind::List { .. } = property.kind {
                    let len: usize = first.parse().map_err(|_| {
                        PlyError::MalformedStream(format!("invalid list length '{first}'"))
                    })?;
                    for _ in 0..len {
                        next(&property.name)?;
                    }
                }
            }
        }
    }

    let vertex = &elements[vertex_index];
    // every value needs at least one character and one separator
    let mut columns = empty_columns(vertex, body.len() / 2 + 1);
    for record in 0..vertex.count {
        let mut slot = 0;
        for property in &vertex.properties {
            let token = next(&property.name)?;
            match property.kind {
                PropertyKind::Scalar(_) => {
                    if !columns[slot].1.push_text(token) {
                        return Err(PlyError::MalformedStream(format!(
                            "record {record}: invalid value '{token}' for '{}'",
                            property.name
                        )));
                    }
                    slot += 1;
                }
                PropertyKind::List { .. } => {
                    let len: usize = token.parse().map_err(|_| {
                        PlyError::MalformedStream(format!("invalid list length '{token}'"))
                    })?;
                    for _ in 0..len {
                        next(&property.name)?;
                    }
                }
            }
        }
    }
    Ok(columns)
}
