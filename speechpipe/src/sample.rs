//! Utterance records and the loader that validates them.

use crate::error::DatasetError;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Sentinel duration meaning "until the end of the audio file".
pub const FLOAT_INF: f64 = f64::INFINITY;

/// One labeled audio segment.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub id: String,
    pub audio: PathBuf,
    /// Offset into the audio file in seconds
    pub begin: f64,
    /// Segment length in seconds, [`FLOAT_INF`] when unbounded
    pub duration: f64,
    pub text: String,
    pub speaker: String,
}

impl Default for Sample {
    fn default() -> Self {
        Self {
            id: String::new(),
            audio: PathBuf::new(),
            begin: 0.0,
            duration: FLOAT_INF,
            text: String::new(),
            speaker: String::new(),
        }
    }
}

/// Metadata column names for each [`Sample`] attribute.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FieldMap {
    pub id: String,
    pub audio: String,
    pub begin: String,
    pub duration: String,
    pub text: String,
    pub speaker: String,
}

impl Default for FieldMap {
    fn default() -> Self {
        Self {
            id: "ID".into(),
            audio: "AUDIO".into(),
            begin: "BEGIN".into(),
            duration: "DURATION".into(),
            text: "TEXT".into(),
            speaker: "SPEAKER".into(),
        }
    }
}

/// Maps one metadata row to a [`Sample`], rejecting rows outside the
/// configured duration and text length bounds.
///
/// Filters only apply to values that were actually supplied: an unbounded
/// duration passes any duration filter and empty text passes any length
/// filter.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SampleLoader {
    pub field_map: FieldMap,
    pub min_duration: f64,
    pub max_duration: f64,
    pub min_text_length: usize,
    pub max_text_length: usize,
}

impl Default for SampleLoader {
    fn default() -> Self {
        Self {
            field_map: FieldMap::default(),
            min_duration: 0.0,
            max_duration: FLOAT_INF,
            min_text_length: 0,
            max_text_length: usize::MAX,
        }
    }
}

impl SampleLoader {
    /// Load a sample from a column → value row.
    ///
    /// Audio paths are joined onto `base_dir`. Missing or empty cells keep the
    /// [`Sample`] default.
    ///
    /// Returns `Ok(None)` when the row is filtered out.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::InvalidField`] if a begin or duration cell is
    /// not a number.
    pub fn load(
        &self,
        base_dir: &Path,
        row: &HashMap<&str, &str>,
    ) -> Result<Option<Sample>, DatasetError> {
        let field = |name: &str| row.get(name).copied().filter(|v| !v.is_empty());
        let number = |name: &str, value: &str| {
            value.trim().parse::<f64>().map_err(|_| DatasetError::InvalidField {
                field: name.to_string(),
                value: value.to_string(),
            })
        };

        let map = &self.field_map;
        let mut sample = Sample::default();

        if let Some(v) = field(&map.id) {
            sample.id = v.to_string();
        }
        if let Some(v) = field(&map.audio) {
            sample.audio = base_dir.join(v);
        }
        if let Some(v) = field(&map.begin) {
            sample.begin = number(&map.begin, v)?;
        }
        if let Some(v) = field(&map.duration) {
            sample.duration = number(&map.duration, v)?;
        }
        if let Some(v) = field(&map.text) {
            sample.text = v.to_string();
        }
        if let Some(v) = field(&map.speaker) {
            sample.speaker = v.to_string();
        }

        Ok(self.accepts(&sample).then_some(sample))
    }

    fn accepts(&self, sample: &Sample) -> bool {
        if sample.duration != FLOAT_INF
            && (sample.duration < self.min_duration || sample.duration > self.max_duration)
        {
            return false;
        }

        if !sample.text.is_empty() {
            let len = sample.text.chars().count();
            if len < self.min_text_length || len > self.max_text_length {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loader() -> SampleLoader {
        SampleLoader {
            min_duration: 1.0,
            max_duration: 10.0,
            min_text_length: 2,
            max_text_length: 20,
            ..Default::default()
        }
    }

    fn row<'a>(pairs: &[(&'a str, &'a str)]) -> HashMap<&'a str, &'a str> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn loads_all_fields() {
        let r = row(&[
            ("ID", "utt1"),
            ("AUDIO", "audio/utt1.wav"),
            ("BEGIN", "0.5"),
            ("DURATION", "1.28"),
            ("TEXT", "Hey, Siri"),
            ("SPEAKER", "Jerry"),
        ]);

        let sample = loader().load(Path::new("/data"), &r).unwrap().unwrap();

        assert_eq!(sample.id, "utt1");
        assert_eq!(sample.audio, PathBuf::from("/data/audio/utt1.wav"));
        assert_eq!(sample.begin, 0.5);
        assert_eq!(sample.duration, 1.28);
        assert_eq!(sample.text, "Hey, Siri");
        assert_eq!(sample.speaker, "Jerry");
    }

    #[test]
    fn rejects_out_of_bounds_duration() {
        let short = row(&[("ID", "a"), ("DURATION", "0.5"), ("TEXT", "ok")]);
        let long = row(&[("ID", "b"), ("DURATION", "12.0"), ("TEXT", "ok")]);

        assert!(loader().load(Path::new("."), &short).unwrap().is_none());
        assert!(loader().load(Path::new("."), &long).unwrap().is_none());
    }

    #[test]
    fn rejects_out_of_bounds_text_length() {
        let short = row(&[("DURATION", "2.0"), ("TEXT", "a")]);
        let long = row(&[("DURATION", "2.0"), ("TEXT", "this text is way too long")]);

        assert!(loader().load(Path::new("."), &short).unwrap().is_none());
        assert!(loader().load(Path::new("."), &long).unwrap().is_none());
    }

    #[test]
    fn text_length_counts_characters() {
        // 3 characters, 9 bytes
        let r = row(&[("DURATION", "2.0"), ("TEXT", "你好吗")]);
        let loader = SampleLoader {
            max_text_length: 3,
            ..Default::default()
        };

        assert!(loader.load(Path::new("."), &r).unwrap().is_some());
    }

    #[test]
    fn missing_duration_is_unbounded_and_unfiltered() {
        let r = row(&[("ID", "a"), ("AUDIO", "a.wav"), ("TEXT", "hello")]);

        let sample = loader().load(Path::new("."), &r).unwrap().unwrap();

        assert_eq!(sample.duration, FLOAT_INF);
        assert_eq!(sample.begin, 0.0);
    }

    #[test]
    fn empty_cell_keeps_default() {
        let r = row(&[("ID", "a"), ("DURATION", ""), ("TEXT", "")]);

        let sample = loader().load(Path::new("."), &r).unwrap().unwrap();

        assert_eq!(sample.duration, FLOAT_INF);
        assert!(sample.text.is_empty());
    }

    #[test]
    fn custom_field_map() {
        let loader = SampleLoader {
            field_map: FieldMap {
                id: "key".into(),
                text: "transcript".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        let r = row(&[("key", "k1"), ("transcript", "hi there"), ("ID", "ignored")]);

        let sample = loader.load(Path::new("."), &r).unwrap().unwrap();

        assert_eq!(sample.id, "k1");
        assert_eq!(sample.text, "hi there");
    }

    #[test]
    fn invalid_number_is_error() {
        let r = row(&[("DURATION", "abc")]);

        let result = loader().load(Path::new("."), &r);

        assert!(matches!(
            result,
            Err(DatasetError::InvalidField { field, value }) if field == "DURATION" && value == "abc"
        ));
    }

    #[test]
    fn field_map_rejects_unknown_keys() {
        let result: std::result::Result<FieldMap, _> = serde_yaml::from_str("idx: ID\n");

        assert!(result.is_err());
    }
}
