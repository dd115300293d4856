//! Export encoding for resolved product → class assignments.

use serde::Serialize;

pub const CSV_HEADER: [&str; 2] = ["productName", "class"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovedAssignment {
    pub product_name: String,
    pub class: String,
}

impl ApprovedAssignment {
    pub fn new(product_name: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            product_name: product_name.into(),
            class: class.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("export encoding failed: {0}")]
    Encoding(String),
}

/// Serializes approved assignments for the final `csv_file` notification.
pub trait ExportEncoder: Send + Sync {
    fn encode(&self, assignments: &[ApprovedAssignment]) -> Result<String, ExportError>;
}

/// Two-column CSV with a fixed header and RFC 4180 quoting.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvEncoder;

impl CsvEncoder {
    fn push_field(out: &mut String, field: &str) {
        if field.contains([',', '"', '\n', '\r']) {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(field);
        }
    }

    fn push_row(out: &mut String, fields: [&str; 2]) {
        Self::push_field(out, fields[0]);
        out.push(',');
        Self::push_field(out, fields[1]);
        out.push('\n');
    }
}

impl ExportEncoder for CsvEncoder {
    fn encode(&self, assignments: &[ApprovedAssignment]) -> Result<String, ExportError> {
        let mut out = String::new();
        Self::push_row(&mut out, CSV_HEADER);
        for assignment in assignments {
            Self::push_row(&mut out, [assignment.product_name.as_str(), assignment.class.as_str()]);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_only_when_empty() {
        assert_eq!(CsvEncoder.encode(&[]).unwrap(), "productName,class\n");
    }

    #[test]
    fn rows_in_order() {
        let csv = CsvEncoder
            .encode(&[
                ApprovedAssignment::new("shoe", "sneaker"),
                ApprovedAssignment::new("mug", "kitchen"),
            ])
            .unwrap();
        assert_eq!(csv, "productName,class\nshoe,sneaker\nmug,kitchen\n");
    }

    #[test]
    fn quotes_special_characters() {
        let csv = CsvEncoder
            .encode(&[
                ApprovedAssignment::new("shoe, red", "say \"hi\""),
                ApprovedAssignment::new("multi\nline", "plain"),
            ])
            .unwrap();
        assert_eq!(
            csv,
            "productName,class\n\"shoe, red\",\"say \"\"hi\"\"\"\n\"multi\nline\",plain\n"
        );
    }
}
