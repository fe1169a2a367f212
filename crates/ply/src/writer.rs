use std::io::{self, Write};

use crate::column::Column;
use crate::header::Format;

/// Serializes named columns as a single-element (`vertex`) PLY stream.
///
/// Used to build fixtures and to re-export decoded collections.
#[derive(Debug, Clone)]
pub struct PlyWriter {
    format: Format,
    comments: Vec<String>,
    columns: Vec<(String, Column)>,
}

impl PlyWriter {
    pub fn new(format: Format) -> Self {
        Self {
            format,
            comments: Vec::new(),
            columns: Vec::new(),
        }
    }

    pub fn comment(mut self, text: impl Into<String>) -> Self {
        self.comments.push(text.into());
        self
    }

    pub fn column(mut self, name: impl Into<String>, values: impl Into<Column>) -> Self {
        self.columns.push((name.into(), values.into()));
        self
    }

    /// Drop a column by name, if present.
    pub fn without(mut self, name: &str) -> Self {
        self.columns.retain(|(n, _)| n != name);
        self
    }

    fn record_count(&self) -> io::Result<usize> {
        let count = self.columns.first().map_or(0, |(_, c)| c.len());
        if self.columns.iter().any(|(_, c)| c.len() != count) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "columns differ in length",
            ));
        }
        Ok(count)
    }

    pub fn write(&self, mut out: impl Write) -> io::Result<()> {
        out.write_all(&self.to_bytes()?)
    }

    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let count = self.record_count()?;

        let mut header = String::from("ply\n");
        header.push_str(&format!("format {} 1.0\n", self.format.as_str()));
        for comment in &self.comments {
            header.push_str(&format!("comment {comment}\n"));
        }
        header.push_str(&format!("element vertex {count}\n"));
        for (name, column) in &self.columns {
            header.push_str(&format!("property {} {name}\n", column.scalar_type().as_str()));
        }
        header.push_str("end_header\n");

        let mut bytes = header.into_bytes();
        match self.format {
            Format::Ascii => {
                let mut line = String::new();
                for i in 0..count {
                    line.clear();
                    for (slot, (_, column)) in self.columns.iter().enumerate() {
                        if slot > 0 {
                            line.push(' ');
                        }
                        column.write_text(i, &mut line);
                    }
                    line.push('\n');
                    bytes.extend_from_slice(line.as_bytes());
                }
            }
            Format::BinaryLittleEndian | Format::BinaryBigEndian => {
                let big_endian = self.format == Format::BinaryBigEndian;
                for i in 0..count {
                    for (_, column) in &self.columns {
                        column.write_binary(i, big_endian, &mut bytes);
                    }
                }
            }
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lists_columns_in_order() {
        let bytes = PlyWriter::new(Format::Ascii)
            .comment("fixture")
            .column("x", vec![1.0f32])
            .column("y", vec![2.0f32])
            .to_bytes()
            .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("ply\nformat ascii 1.0\ncomment fixture\nelement vertex 1\n"));
        assert!(text.contains("property float x\nproperty float y\nend_header\n1 2\n"));
    }

    #[test]
    fn ragged_columns_rejected() {
        let writer = PlyWriter::new(Format::BinaryLittleEndian)
            .column("x", vec![1.0f32, 2.0])
            .column("y", vec![1.0f32]);
        assert!(writer.to_bytes().is_err());
    }

    #[test]
    fn without_removes_column() {
        let bytes = PlyWriter::new(Format::BinaryLittleEndian)
            .column("x", vec![1.0f32])
            .column("rot_3", vec![1.0f32])
            .without("rot_3")
            .to_bytes()
            .unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(!text.contains("rot_3"));
    }
}
