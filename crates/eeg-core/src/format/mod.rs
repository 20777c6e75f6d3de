//! Recording file formats
//!
//! Only EEGLAB datasets are read. Format is chosen from the file extension.

pub mod eeglab;
pub mod mat;
pub mod mat_writer;

pub use eeglab::{write_set, EeglabDataset, EeglabWriteOptions, SampleSource};
pub use mat::{MatError, MatFile, MatValue};
pub use mat_writer::MatWriter;

use crate::error::{EegError, EegResult, LoadFailure};
use std::path::Path;

/// Supported recording container formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingFormat {
    /// EEGLAB `.set`, with samples inline or in a `.fdt` companion
    EeglabSet,
}

impl RecordingFormat {
    /// Detect the format of `path` from its extension
    pub fn detect(path: &Path) -> EegResult<Self> {
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "set" => Ok(RecordingFormat::EeglabSet),
            "" => Err(EegError::load(
                path,
                LoadFailure::UnsupportedFormat("file has no extension".to_string()),
            )),
            other => Err(EegError::load(
                path,
                LoadFailure::UnsupportedFormat(format!(".{} recordings are not supported", other)),
            )),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            RecordingFormat::EeglabSet => "set",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_detection() {
        assert_eq!(
            RecordingFormat::detect(Path::new("/data/sub-01.SET")).unwrap(),
            RecordingFormat::EeglabSet
        );
        assert!(RecordingFormat::detect(Path::new("sub-01.edf")).is_err());
        assert!(RecordingFormat::detect(Path::new("sub-01")).is_err());
    }
}
