use crate::PlyError;

/// Body encoding declared by the `format` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ascii,
    BinaryLittleEndian,
    BinaryBigEndian,
}

impl Format {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "ascii" => Some(Format::Ascii),
            "binary_little_endian" => Some(Format::BinaryLittleEndian),
            "binary_big_endian" => Some(Format::BinaryBigEndian),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Format::Ascii => "ascii",
            Format::BinaryLittleEndian => "binary_little_endian",
            Format::BinaryBigEndian => "binary_big_endian",
        }
    }
}

/// Scalar property types, under both their legacy and sized names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl ScalarType {
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "char" | "int8" => Some(ScalarType::I8),
            "uchar" | "uint8" => Some(ScalarType::U8),
            "short" | "int16" => Some(ScalarType::I16),
            "ushort" | "uint16" => Some(ScalarType::U16),
            "int" | "int32" => Some(ScalarType::I32),
            "uint" | "uint32" => Some(ScalarType::U32),
            "float" | "float32" => Some(ScalarType::F32),
            "double" | "float64" => Some(ScalarType::F64),
            _ => None,
        }
    }

    /// Encoded width in bytes.
    pub fn size(self) -> usize {
        match self {
            ScalarType::I8 | ScalarType::U8 => 1,
            ScalarType::I16 | ScalarType::U16 => 2,
            ScalarType::I32 | ScalarType::U32 | ScalarType::F32 => 4,
            ScalarType::F64 => 8,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScalarType::I8 => "char",
            ScalarType::U8 => "uchar",
            ScalarType::I16 => "short",
            ScalarType::U16 => "ushort",
            ScalarType::I32 => "int",
            ScalarType::U32 => "uint",
            ScalarType::F32 => "float",
            ScalarType::F64 => "double",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Scalar(ScalarType),
    List { count: ScalarType, item: ScalarType },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub kind: PropertyKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub count: usize,
    pub properties: Vec<Property>,
}

impl Element {
    /// Fixed record width in bytes, or `None` when a list property makes it variable.
    pub fn record_size(&self) -> Option<usize> {
        self.properties
            .iter()
            .map(|p| match p.kind {
                PropertyKind::Scalar(ty) => Some(ty.size()),
                PropertyKind::List { .. } => None,
            })
            .sum()
    }
}

/// Parsed header: format, declared elements in file order, comments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub format: Format,
    pub elements: Vec<Element>,
    pub comments: Vec<String>,
}

impl Header {
    pub fn element(&self, name: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.name == name)
    }
}

const END_HEADER: &str = "end_header";

/// Parse the header at the start of `bytes`.
///
/// Returns the header and the offset of the first body byte.
pub(crate) fn parse_header(bytes: &[u8]) -> Result<(Header, usize), PlyError> {
    let mut offset = 0;
    let mut line_no = 0;
    let mut format = None;
    let mut elements: Vec<Element> = Vec::new();
    let mut comments = Vec::new();

    loop {
        let Some(len) = bytes[offset..].iter().position(|&b| b == b'\n') else {
            return Err(if line_no == 0 {
                PlyError::MissingMagic
            } else {
                PlyError::MalformedHeader {
                    line: line_no + 1,
                    reason: format!("header is not terminated by '{END_HEADER}'"),
                }
            });
        };
        let raw = &bytes[offset..offset + len];
        offset += len + 1;
        line_no += 1;

        let line = std::str::from_utf8(raw)
            .map_err(|_| PlyError::MalformedHeader {
                line: line_no,
                reason: "header line is not valid UTF-8".into(),
            })?
            .trim_end_matches('\r');

        if line_no == 1 {
            if line.trim() != "ply" {
                return Err(PlyError::MissingMagic);
            }
            continue;
        }

        let malformed = |reason: String| PlyError::MalformedHeader {
            line: line_no,
            reason,
        };
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            [] => {}
            ["comment" | "obj_info", ..] => {
                let text = line.split_once(char::is_whitespace).map_or("", |(_, rest)| rest);
                comments.push(text.trim().to_string());
            }
            ["format", kind, version] => {
                let parsed = Format::parse(kind)
                    .ok_or_else(|| PlyError::UnsupportedFormat((*kind).to_string()))?;
                if *version != "1.0" {
                    return Err(PlyError::UnsupportedFormat(format!("{kind} {version}")));
                }
                format = Some(parsed);
            }
            ["element", name, count] => {
                let count = count
                    .parse::<usize>()
                    .map_err(|_| malformed(format!("invalid element count '{count}'")))?;
                elements.push(Element {
                    name: (*name).to_string(),
                    count,
                    properties: Vec::new(),
                });
            }
            ["property", "list", count_ty, item_ty, name] => {
                let count = parse_type(count_ty).map_err(&malformed)?;
                let item = parse_type(item_ty).map_err(&malformed)?;
                let element = elements
                    .last_mut()
                    .ok_or_else(|| malformed("property declared before any element".into()))?;
                element.properties.push(Property {
                    name: (*name).to_string(),
                    kind: PropertyKind::List { count, item },
                });
            }
            ["property", ty, name] => {
                let ty = parse_type(ty).map_err(&malformed)?;
                let element = elements
                    .last_mut()
                    .ok_or_else(|| malformed("property declared before any element".into()))?;
                element.properties.push(Property {
                    name: (*name).to_string(),
                    kind: PropertyKind::Scalar(ty),
                });
            }
            [END_HEADER] => break,
            _ => return Err(malformed(format!("unrecognized header line '{line}'"))),
        }
    }

    let format = format.ok_or_else(|| PlyError::MalformedHeader {
        line: line_no,
        reason: "missing format line".into(),
    })?;

    Ok((
        Header {
            format,
            elements,
            comments,
        },
        offset,
    ))
}

fn parse_type(token: &str) -> Result<ScalarType, String> {
    ScalarType::parse(token).ok_or_else(|| format!("unknown property type '{token}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_header() {
        let text = b"ply\nformat binary_little_endian 1.0\ncomment made by hand\nelement vertex 2\nproperty float x\nproperty uchar red\nend_header\n\x00";
        let (header, offset) = parse_header(text).unwrap();
        assert_eq!(header.format, Format::BinaryLittleEndian);
        assert_eq!(header.comments, vec!["made by hand".to_string()]);
        let vertex = header.element("vertex").unwrap();
        assert_eq!(vertex.count, 2);
        assert_eq!(vertex.properties.len(), 2);
        assert_eq!(vertex.record_size(), Some(5));
        assert_eq!(offset, text.len() - 1);
    }

    #[test]
    fn tolerates_crlf_and_lists() {
        let text = b"ply\r\nformat ascii 1.0\r\nelement face 1\r\nproperty list uchar int vertex_indices\r\nend_header\r\n";
        let (header, _) = parse_header(text).unwrap();
        let face = header.element("face").unwrap();
        assert_eq!(face.record_size(), None);
        assert_eq!(
            face.properties[0].kind,
            PropertyKind::List {
                count: ScalarType::U8,
                item: ScalarType::I32
            }
        );
    }

    #[test]
    fn rejects_missing_magic() {
        let err = parse_header(b"obj\nformat ascii 1.0\nend_header\n").unwrap_err();
        assert!(matches!(err, PlyError::MissingMagic));
    }

    #[test]
    fn rejects_unknown_format() {
        let err = parse_header(b"ply\nformat binary_middle_endian 1.0\nend_header\n").unwrap_err();
        assert!(matches!(err, PlyError::UnsupportedFormat(_)));
    }

    #[test]
    fn rejects_orphan_property() {
        let err = parse_header(b"ply\nformat ascii 1.0\nproperty float x\nend_header\n").unwrap_err();
        assert!(matches!(err, PlyError::MalformedHeader { line: 3, .. }));
    }

    #[test]
    fn rejects_unterminated_header() {
        let err = parse_header(b"ply\nformat ascii 1.0\nelement vertex 1\n").unwrap_err();
        assert!(matches!(err, PlyError::MalformedHeader { .. }));
    }

    #[test]
    fn scalar_type_aliases() {
        assert_eq!(ScalarType::parse("float32"), Some(ScalarType::F32));
        assert_eq!(ScalarType::parse("uchar"), ScalarType::parse("uint8"));
        assert_eq!(ScalarType::F64.size(), 8);
        assert_eq!(ScalarType::parse("quad"), None);
    }
}
