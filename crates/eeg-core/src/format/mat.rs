//! MATLAB level 5 MAT-file reader
//!
//! Covers the subset EEGLAB writes with `save -v6`: numeric, logical, char,
//! struct and cell arrays, uncompressed, in either byte order.

use std::fmt;

/// Size of the fixed descriptive header
pub const HEADER_LEN: usize = 128;

// Data element types
pub(crate) const MI_INT8: u32 = 1;
pub(crate) const MI_UINT8: u32 = 2;
pub(crate) const MI_INT16: u32 = 3;
pub(crate) const MI_UINT16: u32 = 4;
pub(crate) const MI_INT32: u32 = 5;
pub(crate) const MI_UINT32: u32 = 6;
pub(crate) const MI_SINGLE: u32 = 7;
pub(crate) const MI_DOUBLE: u32 = 9;
pub(crate) const MI_INT64: u32 = 12;
pub(crate) const MI_UINT64: u32 = 13;
pub(crate) const MI_MATRIX: u32 = 14;
pub(crate) const MI_COMPRESSED: u32 = 15;
pub(crate) const MI_UTF8: u32 = 16;
pub(crate) const MI_UTF16: u32 = 17;
pub(crate) const MI_UTF32: u32 = 18;

// Array classes
pub(crate) const MX_CELL: u8 = 1;
pub(crate) const MX_STRUCT: u8 = 2;
pub(crate) const MX_OBJECT: u8 = 3;
pub(crate) const MX_CHAR: u8 = 4;
pub(crate) const MX_SPARSE: u8 = 5;
pub(crate) const MX_DOUBLE: u8 = 6;
pub(crate) const MX_SINGLE: u8 = 7;
pub(crate) const MX_UINT64: u8 = 15;

pub(crate) const FLAG_COMPLEX: u32 = 0x0800;

/// Parse failure with the byte offset where it happened
#[derive(Debug, Clone, PartialEq)]
pub enum MatError {
    /// Not a level 5 MAT-file or a variant we cannot decode
    Unsupported(String),
    /// Structure is inconsistent
    Corrupt { offset: usize, reason: String },
}

impl fmt::Display for MatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatError::Unsupported(reason) => write!(f, "{}", reason),
            MatError::Corrupt { offset, reason } => {
                write!(f, "corrupt MAT data at byte {}: {}", offset, reason)
            }
        }
    }
}

impl std::error::Error for MatError {}

pub type MatResult<T> = Result<T, MatError>;

/// Decoded MATLAB array. Multi-dimensional data stays column-major.
#[derive(Debug, Clone, PartialEq)]
pub enum MatValue {
    /// Numeric or logical array, widened to f64
    Numeric {
        dims: Vec<usize>,
        data: Vec<f64>,
    },
    Char {
        dims: Vec<usize>,
        text: String,
    },
    Struct {
        dims: Vec<usize>,
        field_names: Vec<String>,
        /// One entry per element (column-major), each with one value per field
        elements: Vec<Vec<MatValue>>,
    },
    Cell {
        dims: Vec<usize>,
        items: Vec<MatValue>,
    },
    /// Sparse or object arrays, kept only as a placeholder
    Unsupported {
        class: u8,
    },
}

impl MatValue {
    /// Empty `[]`, as written for zero-length matrix elements
    pub fn empty() -> Self {
        MatValue::Numeric {
            dims: vec![0, 0],
            data: Vec::new(),
        }
    }

    pub fn dims(&self) -> &[usize] {
        match self {
            MatValue::Numeric { dims, .. }
            | MatValue::Char { dims, .. }
            | MatValue::Struct { dims, .. }
            | MatValue::Cell { dims, .. } => dims,
            MatValue::Unsupported { .. } => &[],
        }
    }

    /// First element of a numeric array
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            MatValue::Numeric { data, .. } => data.first().copied(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MatValue::Char { text, .. } => Some(text.as_str()),
            _ => None,
        }
    }

    /// Field of a struct element
    pub fn field(&self, element: usize, name: &str) -> Option<&MatValue> {
        match self {
            MatValue::Struct { field_names, elements, .. } => {
                let index = field_names.iter().position(|f| f == name)?;
                elements.get(element)?.get(index)
            }
            _ => None,
        }
    }

    /// Number of elements in the array
    pub fn element_count(&self) -> usize {
        match self {
            MatValue::Struct { elements, .. } => elements.len(),
            MatValue::Cell { items, .. } => items.len(),
            MatValue::Numeric { data, .. } => data.len(),
            MatValue::Char { dims, .. } => dims.iter().product(),
            MatValue::Unsupported { .. } => 0,
        }
    }
}

/// Named top-level variable
#[derive(Debug, Clone, PartialEq)]
pub struct MatVariable {
    pub name: String,
    pub value: MatValue,
}

/// Fully decoded MAT-file
#[derive(Debug, Clone, PartialEq)]
pub struct MatFile {
    pub description: String,
    pub variables: Vec<MatVariable>,
}

impl MatFile {
    pub fn get(&self, name: &str) -> Option<&MatValue> {
        self.variables.iter().find(|v| v.name == name).map(|v| &v.value)
    }

    /// Decode a whole file held in memory
    pub fn parse(bytes: &[u8]) -> MatResult<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(MatError::Unsupported(format!(
                "file is {} bytes, shorter than a MAT-file header",
                bytes.len()
            )));
        }

        let description = String::from_utf8_lossy(&bytes[..116])
            .trim_end_matches(|c: char| c == '\0' || c.is_whitespace())
            .to_string();

        if description.starts_with("MATLAB 7.3") {
            return Err(MatError::Unsupported(
                "MAT-file v7.3 (HDF5) is not supported, resave with -v6".to_string(),
            ));
        }

        let little_endian = match &bytes[126..128] {
            b"IM" => true,
            b"MI" => false,
            _ => {
                return Err(MatError::Unsupported(
                    "missing MAT-file v5 endian indicator".to_string(),
                ))
            }
        };

        let mut reader = ElementReader {
            bytes,
            pos: HEADER_LEN,
            little_endian,
        };

        let mut variables = Vec::new();
        while reader.pos + 8 <= bytes.len() {
            let element = reader.next_element()?;
            match element.data_type {
                MI_MATRIX => {
                    let (name, value) = reader.decode_matrix(element)?;
                    variables.push(MatVariable { name, value });
                }
                MI_COMPRESSED => {
                    return Err(MatError::Unsupported(
                        "compressed MAT-file (v7) is not supported, resave with -v6".to_string(),
                    ))
                }
                other => {
                    return Err(reader.corrupt(
                        element.offset,
                        format!("unexpected top-level element type {}", other),
                    ))
                }
            }
        }

        Ok(MatFile { description, variables })
    }
}

/// Tagged data element located inside the buffer
#[derive(Debug, Clone, Copy)]
struct Element {
    data_type: u32,
    offset: usize,
    start: usize,
    len: usize,
}

struct ElementReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    little_endian: bool,
}

impl<'a> ElementReader<'a> {
    fn corrupt(&self, offset: usize, reason: String) -> MatError {
        MatError::Corrupt { offset, reason }
    }

    fn read_u32_at(&self, offset: usize) -> MatResult<u32> {
        let raw: [u8; 4] = self
            .bytes
            .get(offset..offset + 4)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| self.corrupt(offset, "unexpected end of file".to_string()))?;
        Ok(if self.little_endian {
            u32::from_le_bytes(raw)
        } else {
            u32::from_be_bytes(raw)
        })
    }

    /// Read the tag at the cursor and advance past the element
    fn next_element(&mut self) -> MatResult<Element> {
        let offset = self.pos;
        let first = self.read_u32_at(offset)?;

        // Small data element: size in the upper half, payload in the tag
        if first >> 16 != 0 {
            let element = Element {
                data_type: first & 0xFFFF,
                offset,
                start: offset + 4,
                len: (first >> 16) as usize,
            };
            if element.len > 4 {
                return Err(self.corrupt(offset, "small element larger than 4 bytes".to_string()));
            }
            self.pos = offset + 8;
            return Ok(element);
        }

        let len = self.read_u32_at(offset + 4)? as usize;
        let start = offset + 8;
        let end = start
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| {
                self.corrupt(offset, format!("element of {} bytes overruns the file", len))
            })?;

        // Compressed elements are not padded
        self.pos = if first == MI_COMPRESSED {
            end
        } else {
            (end + 7) & !7
        };

        Ok(Element {
            data_type: first,
            offset,
            start,
            len,
        })
    }

    fn payload(&self, element: &Element) -> &'a [u8] {
        &self.bytes[element.start..element.start + element.len]
    }

    /// Decode the payload of a numeric element into f64
    fn numeric(&self, element: &Element) -> MatResult<Vec<f64>> {
        let bytes = self.payload(element);
        let le = self.little_endian;

        macro_rules! decode {
            ($ty:ty, $size:expr) => {{
                if bytes.len() % $size != 0 {
                    return Err(self.corrupt(
                        element.offset,
                        format!("payload of {} bytes is not a multiple of {}", bytes.len(), $size),
                    ));
                }
                bytes
                    .chunks_exact($size)
                    .map(|chunk| {
                        let raw: [u8; $size] = chunk.try_into().unwrap_or([0u8; $size]);
                        let value = if le {
                            <$ty>::from_le_bytes(raw)
                        } else {
                            <$ty>::from_be_bytes(raw)
                        };
                        value as f64
                    })
                    .collect()
            }};
        }

        let values: Vec<f64> = match element.data_type {
            MI_INT8 => bytes.iter().map(|&b| b as i8 as f64).collect(),
            MI_UINT8 | MI_UTF8 => bytes.iter().map(|&b| b as f64).collect(),
            MI_INT16 => decode!(i16, 2),
            MI_UINT16 | MI_UTF16 => decode!(u16, 2),
            MI_INT32 => decode!(i32, 4),
            MI_UINT32 | MI_UTF32 => decode!(u32, 4),
            MI_SINGLE => decode!(f32, 4),
            MI_DOUBLE => decode!(f64, 8),
            MI_INT64 => decode!(i64, 8),
            MI_UINT64 => decode!(u64, 8),
            other => {
                return Err(self.corrupt(
                    element.offset,
                    format!("element type {} is not numeric", other),
                ))
            }
        };
        Ok(values)
    }

    /// Reject `count` elements of `tags_each` tags that cannot fit before `end`.
    ///
    /// A struct without fields still needs its elements bounded, so it is
    /// held to the size of the whole file.
    fn check_item_count(&self, count: usize, tags_each: usize, end: usize, dims: &[usize]) -> MatResult<()> {
        let room = end.saturating_sub(self.pos) / 8;
        let fits = match count.checked_mul(tags_each) {
            Some(_) if tags_each == 0 => count <= self.bytes.len(),
            Some(tags) => tags <= room,
            None => false,
        };
        if fits {
            Ok(())
        } else {
            Err(self.corrupt(
                self.pos,
                format!("dimensions {:?} describe more items than the matrix holds", dims),
            ))
        }
    }

    fn expect_element(&mut self, end: usize, what: &str) -> MatResult<Element> {
        if self.pos + 8 > end {
            return Err(self.corrupt(self.pos, format!("matrix ended before its {}", what)));
        }
        self.next_element()
    }

    /// Decode an `miMATRIX` element into its name and value
    fn decode_matrix(&mut self, element: Element) -> MatResult<(String, MatValue)> {
        if element.len == 0 {
            return Ok((String::new(), MatValue::empty()));
        }

        let saved = self.pos;
        self.pos = element.start;
        let end = element.start + element.len;
        let result = self.decode_matrix_body(end);
        self.pos = saved;
        result
    }

    fn decode_matrix_body(&mut self, end: usize) -> MatResult<(String, MatValue)> {
        let flags_element = self.expect_element(end, "array flags")?;
        let flags = self.read_u32_at(flags_element.start)?;
        let class = (flags & 0xFF) as u8;
        let complex = flags & FLAG_COMPLEX != 0;

        let dims_element = self.expect_element(end, "dimensions")?;
        let dims: Vec<usize> = self
            .numeric(&dims_element)?
            .into_iter()
            .map(|d| d.max(0.0) as usize)
            .collect();
        let count = dims
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| self.corrupt(dims_element.offset, format!("dimensions {:?} overflow", dims)))?;

        let name_element = self.expect_element(end, "name")?;
        let name = String::from_utf8_lossy(self.payload(&name_element)).into_owned();

        let value = match class {
            MX_DOUBLE..=MX_UINT64 => {
                let real = self.expect_element(end, "real part")?;
                let data = self.numeric(&real)?;
                if complex {
                    // imaginary part is read and dropped
                    self.expect_element(end, "imaginary part")?;
                }
                if data.len() != count {
                    return Err(self.corrupt(
                        real.offset,
                        format!("{} values for dimensions {:?}", data.len(), dims),
                    ));
                }
                MatValue::Numeric { dims, data }
            }
            MX_CHAR => {
                let text = if count == 0 && self.pos + 8 > end {
                    String::new()
                } else {
                    let chars = self.expect_element(end, "characters")?;
                    self.decode_text(&chars)?
                };
                MatValue::Char { dims, text }
            }
            MX_STRUCT => self.decode_struct(dims, count, end)?,
            MX_CELL => {
                // Every item carries at least one tag
                self.check_item_count(count, 1, end, &dims)?;
                let mut items = Vec::new();
                for _ in 0..count {
                    let cell = self.expect_element(end, "cell item")?;
                    items.push(self.decode_matrix(cell)?.1);
                }
                MatValue::Cell { dims, items }
            }
            MX_OBJECT | MX_SPARSE => MatValue::Unsupported { class },
            other => MatValue::Unsupported { class: other },
        };

        Ok((name, value))
    }

    fn decode_text(&self, element: &Element) -> MatResult<String> {
        match element.data_type {
            MI_UTF8 | MI_INT8 | MI_UINT8 => {
                Ok(String::from_utf8_lossy(self.payload(element)).into_owned())
            }
            _ => {
                let units: Vec<u32> = self.numeric(element)?.into_iter().map(|v| v as u32).collect();
                Ok(units
                    .into_iter()
                    .map(|u| char::from_u32(u).unwrap_or(char::REPLACEMENT_CHARACTER))
                    .collect())
            }
        }
    }

    fn decode_struct(&mut self, dims: Vec<usize>, count: usize, end: usize) -> MatResult<MatValue> {
        let len_element = self.expect_element(end, "field name length")?;
        let name_len = self
            .numeric(&len_element)?
            .first()
            .copied()
            .unwrap_or(0.0) as usize;

        let names_element = self.expect_element(end, "field names")?;
        let raw_names = self.payload(&names_element);
        let field_names: Vec<String> = if name_len == 0 {
            Vec::new()
        } else {
            raw_names
                .chunks(name_len)
                .map(|chunk| {
                    let stop = chunk.iter().position(|&b| b == 0).unwrap_or(chunk.len());
                    String::from_utf8_lossy(&chunk[..stop]).into_owned()
                })
                .filter(|name| !name.is_empty())
                .collect()
        };

        self.check_item_count(count, field_names.len(), end, &dims)?;
        let mut elements = Vec::new();
        for _ in 0..count {
            let mut values = Vec::new();
            for _ in &field_names {
                let field = self.expect_element(end, "struct field")?;
                if field.data_type != MI_MATRIX {
                    return Err(self.corrupt(
                        field.offset,
                        format!("struct field has element type {}", field.data_type),
                    ));
                }
                values.push(self.decode_matrix(field)?.1);
            }
            elements.push(values);
        }

        Ok(MatValue::Struct {
            dims,
            field_names,
            elements,
        })
    }
}
