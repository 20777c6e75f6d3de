//! EEGLAB dataset (`.set` + optional `.fdt`) reading and writing
//!
//! A `.set` file is a MAT-file holding the `EEG` structure, either as one
//! struct variable or as one variable per field. Samples are either inline in
//! `EEG.data` or stored in a companion float32 file named by `EEG.data`.

use super::mat::{MatFile, MatValue};
use super::mat_writer::MatWriter;
use crate::error::{EegError, EegResult, LoadFailure};
use crate::recording::Recording;
use ndarray::Array2;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where the sample payload of a dataset lives
#[derive(Debug, Clone, PartialEq)]
pub enum SampleSource {
    /// Column-major `[nbchan x pnts]` values from the `.set` itself
    Inline(Vec<f64>),
    /// Companion file name as stored in `EEG.data`
    Companion(String),
}

/// Parsed dataset header with its sample source, before samples are decoded
#[derive(Debug, Clone)]
pub struct EeglabDataset {
    pub path: PathBuf,
    pub channel_count: usize,
    pub samples_per_channel: usize,
    pub trials: usize,
    pub sampling_rate: f64,
    pub channel_labels: Vec<String>,
    pub source: SampleSource,
}

/// Field lookup over either dataset layout
enum Fields<'a> {
    Struct(&'a MatValue),
    TopLevel(&'a MatFile),
}

impl<'a> Fields<'a> {
    fn get(&self, name: &str) -> Option<&'a MatValue> {
        match self {
            Fields::Struct(value) => value.field(0, name),
            Fields::TopLevel(file) => file.get(name),
        }
    }
}

impl EeglabDataset {
    /// Read and validate the header of a `.set` file
    pub fn open(path: impl AsRef<Path>) -> EegResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .map_err(|e| EegError::load(path, LoadFailure::Io(e.to_string())))?;
        Self::parse(path, &bytes)
    }

    /// Validate a dataset from bytes already in memory
    pub fn parse(path: &Path, bytes: &[u8]) -> EegResult<Self> {
        let fail = |failure: LoadFailure| EegError::load(path, failure);

        let file = MatFile::parse(bytes).map_err(|e| match e {
            super::mat::MatError::Unsupported(reason) => fail(LoadFailure::UnsupportedFormat(reason)),
            corrupt => fail(LoadFailure::Malformed(corrupt.to_string())),
        })?;

        if file.get("ALLEEG").is_some() {
            return Err(fail(LoadFailure::UnsupportedFormat(
                "file holds an ALLEEG study, not a single dataset".to_string(),
            )));
        }

        let fields = match file.get("EEG") {
            Some(value) if matches!(value, MatValue::Struct { .. }) => Fields::Struct(value),
            Some(_) => {
                return Err(fail(LoadFailure::Malformed("EEG variable is not a struct".to_string())))
            }
            None => Fields::TopLevel(&file),
        };

        let number = |name: &'static str| -> EegResult<f64> {
            fields
                .get(name)
                .and_then(MatValue::as_scalar)
                .ok_or_else(|| fail(LoadFailure::MissingField(name)))
        };

        let channel_count = count(path, "nbchan", number("nbchan")?)?;
        let samples_per_channel = count(path, "pnts", number("pnts")?)?;
        let sampling_rate = number("srate")?;
        let trials = match fields.get("trials").and_then(MatValue::as_scalar) {
            Some(t) => count(path, "trials", t)?,
            None => 1,
        };

        if channel_count == 0 {
            return Err(fail(LoadFailure::Malformed("nbchan is zero".to_string())));
        }
        if !sampling_rate.is_finite() || sampling_rate <= 0.0 {
            return Err(fail(LoadFailure::Malformed(format!(
                "invalid sampling rate {}",
                sampling_rate
            ))));
        }
        if trials != 1 {
            return Err(fail(LoadFailure::EpochedData { trials }));
        }

        let source = match fields.get("data") {
            Some(MatValue::Char { text, .. }) => SampleSource::Companion(text.trim().to_string()),
            Some(MatValue::Numeric { dims, data }) => {
                let expected = checked_len(path, &[channel_count, samples_per_channel, trials])?;
                if dims.first().copied() != Some(channel_count) || data.len() != expected {
                    return Err(fail(LoadFailure::Malformed(format!(
                        "data dimensions {:?} do not match nbchan={} pnts={} trials={}",
                        dims, channel_count, samples_per_channel, trials
                    ))));
                }
                SampleSource::Inline(data.clone())
            }
            Some(_) => {
                return Err(fail(LoadFailure::Malformed(
                    "EEG.data is neither numeric nor a file name".to_string(),
                )))
            }
            None => return Err(fail(LoadFailure::MissingField("data"))),
        };

        let channel_labels = fields
            .get("chanlocs")
            .map(|locs| {
                (0..locs.element_count())
                    .filter_map(|i| locs.field(i, "labels").and_then(MatValue::as_str))
                    .map(|s| s.trim().to_string())
                    .collect::<Vec<_>>()
            })
            .filter(|labels| labels.len() == channel_count)
            .unwrap_or_default();

        debug!(
            path = %path.display(),
            channels = channel_count,
            samples = samples_per_channel,
            srate = sampling_rate,
            "parsed EEGLAB header"
        );

        Ok(EeglabDataset {
            path: path.to_path_buf(),
            channel_count,
            samples_per_channel,
            trials,
            sampling_rate,
            channel_labels,
            source,
        })
    }

    /// Companion paths checked, in order, for an external sample file
    pub fn companion_candidates(&self, name: &str) -> Vec<PathBuf> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new(""));
        let mut candidates = Vec::new();
        // Only the file name is honoured; the companion must sit next to the `.set`
        if let Some(file_name) = Path::new(name).file_name() {
            candidates.push(dir.join(file_name));
        }
        let by_stem = self.path.with_extension("fdt");
        if !candidates.contains(&by_stem) {
            candidates.push(by_stem);
        }
        candidates
    }

    /// Decode samples in microvolts, shape `(channels, samples)`
    pub fn read_samples(&self) -> EegResult<Array2<f64>> {
        let (channels, samples) = (self.channel_count, self.samples_per_channel);
        let fail = |failure: LoadFailure| EegError::load(&self.path, failure);
        let total = checked_len(&self.path, &[channels, samples])?;

        let column_major: Vec<f64> = match &self.source {
            SampleSource::Inline(values) => values.clone(),
            SampleSource::Companion(name) => {
                let tried = self.companion_candidates(name);
                let companion = tried
                    .iter()
                    .find(|p| p.is_file())
                    .cloned()
                    .ok_or_else(|| fail(LoadFailure::MissingCompanion { tried: tried.clone() }))?;

                let bytes = fs::read(&companion)
                    .map_err(|e| EegError::load(&companion, LoadFailure::Io(e.to_string())))?;
                let needed = checked_len(&companion, &[total, 4])?;
                if bytes.len() < needed {
                    return Err(EegError::load(
                        &companion,
                        LoadFailure::Malformed(format!(
                            "companion holds {} bytes, {} channels x {} samples need {}",
                            bytes.len(),
                            channels,
                            samples,
                            needed
                        )),
                    ));
                }
                bytes[..needed]
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64)
                    .collect()
            }
        };

        if column_major.len() < total {
            return Err(fail(LoadFailure::Malformed("sample payload truncated".to_string())));
        }
        if let Some(position) = column_major[..total].iter().position(|v| !v.is_finite()) {
            return Err(fail(LoadFailure::Malformed(format!(
                "non-finite sample on channel {} at index {}",
                position % channels,
                position / channels
            ))));
        }

        // Column-major [nbchan x pnts]: sample t of channel c sits at t * nbchan + c
        Ok(Array2::from_shape_fn((channels, samples), |(c, t)| {
            column_major[t * channels + c]
        }))
    }
}

/// Largest header count accepted for `nbchan`, `pnts` or `trials`
const MAX_HEADER_COUNT: f64 = u32::MAX as f64;

/// Header count as a whole, non-negative number within `MAX_HEADER_COUNT`
fn count(path: &Path, name: &str, value: f64) -> EegResult<usize> {
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 || value > MAX_HEADER_COUNT {
        return Err(EegError::load(
            path,
            LoadFailure::Malformed(format!("{} must be a whole number, got {}", name, value)),
        ));
    }
    Ok(value as usize)
}

/// Product of `factors`, malformed when it does not fit in memory arithmetic
fn checked_len(path: &Path, factors: &[usize]) -> EegResult<usize> {
    factors
        .iter()
        .try_fold(1usize, |acc, &f| acc.checked_mul(f))
        .ok_or_else(|| {
            EegError::load(
                path,
                LoadFailure::Malformed(format!("sample count {:?} overflows", factors)),
            )
        })
}

/// Options for writing a dataset
#[derive(Debug, Clone)]
pub struct EeglabWriteOptions {
    /// Dataset name stored in `EEG.setname`
    pub setname: String,
    /// Store samples in a `.fdt` companion next to the `.set`
    pub companion: bool,
}

impl Default for EeglabWriteOptions {
    fn default() -> Self {
        Self {
            setname: "synthetic".to_string(),
            companion: false,
        }
    }
}

fn scalar(value: f64) -> MatValue {
    MatValue::Numeric {
        dims: vec![1, 1],
        data: vec![value],
    }
}

fn text(value: &str) -> MatValue {
    MatValue::Char {
        dims: vec![1, value.encode_utf16().count()],
        text: value.to_string(),
    }
}

/// Write `recording` as an EEGLAB dataset, samples converted to microvolts
pub fn write_set(path: &Path, recording: &Recording, options: &EeglabWriteOptions) -> io::Result<()> {
    let channels = recording.channel_count();
    let samples = recording.samples_per_channel();
    let to_microvolts = 1.0 / recording.unit().scale_from_microvolts();

    let column_major: Vec<f64> = recording
        .data()
        .t()
        .iter()
        .map(|v| v * to_microvolts)
        .collect();

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_path = path
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();

    let data = if options.companion {
        let companion = path.with_extension("fdt");
        let bytes: Vec<u8> = column_major
            .iter()
            .flat_map(|&v| (v as f32).to_le_bytes())
            .collect();
        fs::write(&companion, bytes)?;
        let name = companion
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        text(&name)
    } else {
        MatValue::Numeric {
            dims: vec![channels, samples],
            data: column_major,
        }
    };

    let chanlocs = MatValue::Struct {
        dims: vec![1, channels],
        field_names: vec!["labels".to_string()],
        elements: recording
            .channel_names()
            .iter()
            .map(|label| vec![text(label)])
            .collect(),
    };

    let fs_hz = recording.sampling_rate();
    let eeg = MatValue::Struct {
        dims: vec![1, 1],
        field_names: [
            "setname", "filename", "filepath", "nbchan", "trials", "pnts", "srate", "xmin",
            "xmax", "data", "chanlocs", "icaweights",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
        elements: vec![vec![
            text(&options.setname),
            text(&file_name),
            text(&file_path),
            scalar(channels as f64),
            scalar(1.0),
            scalar(samples as f64),
            scalar(fs_hz),
            scalar(0.0),
            scalar(samples.saturating_sub(1) as f64 / fs_hz),
            data,
            chanlocs,
            MatValue::empty(),
        ]],
    };

    let mut writer = MatWriter::new("written by eeg-core");
    writer.variable("EEG", &eeg);
    fs::write(path, writer.finish())
}
