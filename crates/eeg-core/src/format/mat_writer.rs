//! MATLAB level 5 MAT-file writer (little-endian, uncompressed)

use super::mat::{
    MatValue, HEADER_LEN, MI_DOUBLE, MI_INT32, MI_INT8, MI_MATRIX, MI_SINGLE, MI_UINT16,
    MI_UINT32, MX_CELL, MX_CHAR, MX_DOUBLE, MX_SINGLE, MX_STRUCT,
};

/// Accumulates variables and produces the file bytes
pub struct MatWriter {
    buffer: Vec<u8>,
}

impl MatWriter {
    /// Start a file whose text header begins with `description`
    pub fn new(description: &str) -> Self {
        let mut header = format!("MATLAB 5.0 MAT-file, {}", description).into_bytes();
        header.truncate(116);
        header.resize(116, b' ');

        let mut buffer = Vec::with_capacity(HEADER_LEN);
        buffer.extend_from_slice(&header);
        buffer.extend_from_slice(&[0u8; 8]);
        buffer.extend_from_slice(&0x0100u16.to_le_bytes());
        buffer.extend_from_slice(b"IM");

        Self { buffer }
    }

    /// Append a named top-level variable
    pub fn variable(&mut self, name: &str, value: &MatValue) -> &mut Self {
        let body = matrix_body(name, value);
        push_element(&mut self.buffer, MI_MATRIX, &body);
        self
    }

    /// Append a single-precision numeric matrix with column-major `data`
    pub fn single_matrix(&mut self, name: &str, dims: &[usize], data: &[f32]) -> &mut Self {
        let mut body = Vec::new();
        push_header(&mut body, MX_SINGLE, dims, name);
        let payload: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        push_element(&mut body, MI_SINGLE, &payload);
        push_element(&mut self.buffer, MI_MATRIX, &body);
        self
    }

    /// Append an arbitrary tagged element
    pub fn raw_element(&mut self, data_type: u32, payload: &[u8]) -> &mut Self {
        push_element(&mut self.buffer, data_type, payload);
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.buffer
    }
}

fn push_element(out: &mut Vec<u8>, data_type: u32, payload: &[u8]) {
    out.extend_from_slice(&data_type.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    while out.len() % 8 != 0 {
        out.push(0);
    }
}

fn push_header(out: &mut Vec<u8>, class: u8, dims: &[usize], name: &str) {
    let mut flags = Vec::with_capacity(8);
    flags.extend_from_slice(&(class as u32).to_le_bytes());
    flags.extend_from_slice(&0u32.to_le_bytes());
    push_element(out, MI_UINT32, &flags);

    let dims: Vec<u8> = dims.iter().flat_map(|&d| (d as i32).to_le_bytes()).collect();
    push_element(out, MI_INT32, &dims);

    push_element(out, MI_INT8, name.as_bytes());
}

fn matrix_body(name: &str, value: &MatValue) -> Vec<u8> {
    let mut body = Vec::new();
    match value {
        MatValue::Numeric { dims, data } => {
            push_header(&mut body, MX_DOUBLE, dims, name);
            let payload: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
            push_element(&mut body, MI_DOUBLE, &payload);
        }
        MatValue::Char { dims, text } => {
            let units: Vec<u16> = text.encode_utf16().collect();
            let dims = if dims.iter().product::<usize>() == units.len() {
                dims.clone()
            } else {
                vec![1, units.len()]
            };
            push_header(&mut body, MX_CHAR, &dims, name);
            let payload: Vec<u8> = units.iter().flat_map(|u| u.to_le_bytes()).collect();
            push_element(&mut body, MI_UINT16, &payload);
        }
        MatValue::Struct { dims, field_names, elements } => {
            push_header(&mut body, MX_STRUCT, dims, name);

            let name_len = field_names
                .iter()
                .map(|f| f.len() + 1)
                .max()
                .unwrap_or(0)
                .max(32);
            push_element(&mut body, MI_INT32, &(name_len as i32).to_le_bytes());

            let mut names = Vec::with_capacity(name_len * field_names.len());
            for field in field_names {
                let mut padded = field.as_bytes().to_vec();
                padded.resize(name_len, 0);
                names.extend_from_slice(&padded);
            }
            push_element(&mut body, MI_INT8, &names);

            for element in elements {
                for field in element {
                    let field_body = matrix_body("", field);
                    push_element(&mut body, MI_MATRIX, &field_body);
                }
            }
        }
        MatValue::Cell { dims, items } => {
            push_header(&mut body, MX_CELL, dims, name);
            for item in items {
                let item_body = matrix_body("", item);
                push_element(&mut body, MI_MATRIX, &item_body);
            }
        }
        MatValue::Unsupported { .. } => {
            push_header(&mut body, MX_DOUBLE, &[0, 0], name);
            push_element(&mut body, MI_DOUBLE, &[]);
        }
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let bytes = MatWriter::new("written by test").finish();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert!(bytes.starts_with(b"MATLAB 5.0 MAT-file, written by test"));
        assert_eq!(&bytes[126..128], b"IM");
    }

    #[test]
    fn test_elements_are_aligned() {
        let mut writer = MatWriter::new("test");
        writer.variable("abc", &MatValue::Char { dims: vec![1, 3], text: "xyz".into() });
        let bytes = writer.finish();
        assert_eq!(bytes.len() % 8, 0);
    }
}
