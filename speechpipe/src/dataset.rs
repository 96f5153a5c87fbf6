//! Corpus loading from subset registries and TSV metadata.

use crate::error::{ConfigError, DatasetError, Result};
use crate::sample::{Sample, SampleLoader};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Location of one subset on disk.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SubsetEntry {
    /// Base directory that audio paths are relative to
    pub dir: PathBuf,
    /// Metadata table (`.tsv`)
    pub metadata: PathBuf,
}

/// Registry mapping subset id → subset location.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct SubsetRegistry {
    pub subsets: BTreeMap<String, SubsetEntry>,
}

impl SubsetRegistry {
    /// Load a registry from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|_| ConfigError::FileNotFound(path.to_path_buf()))?;
        Ok(serde_yaml::from_reader(file)?)
    }

    pub fn get(&self, id: &str) -> Result<&SubsetEntry> {
        self.subsets
            .get(id)
            .ok_or_else(|| ConfigError::UnknownSubset(id.to_string()).into())
    }
}

/// One subset to draw samples from.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SubsetConfig {
    pub id: String,
    /// Cap on samples drawn: 0 skips the subset, negative is unbounded
    #[serde(default = "unbounded")]
    pub max_num_samples: i64,
}

fn unbounded() -> i64 {
    -1
}

/// Ordered list of subsets forming one dataset.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DatasetConfig {
    pub subsets: Vec<SubsetConfig>,
}

/// Validated samples concatenated across subsets in config order.
#[derive(Clone, Debug, Default)]
pub struct Dataset {
    samples: Vec<Sample>,
}

impl Dataset {
    /// Load every subset listed in `config`, in order.
    ///
    /// Within a subset, rows are taken in file order until the subset cap is
    /// reached; rejected rows do not count towards the cap.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - A subset id is missing from the registry
    /// - A metadata file is not `.tsv`
    /// - A metadata file cannot be read or has malformed numeric cells
    pub fn load(
        registry: &SubsetRegistry,
        config: &DatasetConfig,
        loader: &SampleLoader,
    ) -> Result<Self> {
        let mut samples = Vec::new();

        for subset in &config.subsets {
            let cap = match subset.max_num_samples {
                0 => continue,
                n if n < 0 => usize::MAX,
                n => n as usize,
            };

            let entry = registry.get(&subset.id)?;
            tracing::debug!(
                subset = %subset.id,
                dir = ?entry.dir.display(),
                metadata = ?entry.metadata.display(),
                "loading subset"
            );

            let before = samples.len();
            load_tsv(entry, loader, cap, &mut samples)?;

            tracing::debug!(subset = %subset.id, count = samples.len() - before, "subset loaded");
        }

        tracing::debug!(total = samples.len(), "dataset loaded");
        Ok(Self { samples })
    }

    pub fn from_samples(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    pub fn get(&self, index: usize) -> Option<&Sample> {
        self.samples.get(index)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }
}

impl std::ops::Index<usize> for Dataset {
    type Output = Sample;

    fn index(&self, index: usize) -> &Sample {
        &self.samples[index]
    }
}

fn load_tsv(
    entry: &SubsetEntry,
    loader: &SampleLoader,
    cap: usize,
    samples: &mut Vec<Sample>,
) -> Result<()> {
    let path = &entry.metadata;
    if path.extension().and_then(|s| s.to_str()) != Some("tsv") {
        return Err(DatasetError::Unsupported(path.clone()).into());
    }

    let file = std::fs::File::open(path).map_err(DatasetError::from)?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_reader(std::io::BufReader::new(file));

    let headers = reader.headers()?.clone();
    warn_missing_columns(&headers, loader, path);

    let mut record = csv::StringRecord::new();
    let mut k = 0;
    while k < cap && reader.read_record(&mut record)? {
        let row: HashMap<&str, &str> = headers.iter().zip(record.iter()).collect();
        let loaded = loader
            .load(&entry.dir, &row)
            .map_err(|e| DatasetError::InvalidRow {
                path: path.clone(),
                line: record.position().map_or(0, |p| p.line()),
                source: Box::new(e),
            })?;
        if let Some(sample) = loaded {
            samples.push(sample);
            k += 1;
        }
    }

    Ok(())
}

fn warn_missing_columns(headers: &csv::StringRecord, loader: &SampleLoader, path: &Path) {
    let has = |name: &str| headers.iter().any(|h| h == name);
    let map = &loader.field_map;

    if !has(&map.begin) {
        tracing::warn!(
            metadata = ?path.display(),
            column = %map.begin,
            "metadata provides no begin column, using default 0.0"
        );
    }
    if !has(&map.duration) {
        tracing::warn!(
            metadata = ?path.display(),
            column = %map.duration,
            "metadata provides no duration column, min/max duration filtering is off"
        );
    }
    if !has(&map.text) {
        tracing::warn!(
            metadata = ?path.display(),
            column = %map.text,
            "metadata provides no text column, min/max text length filtering is off"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    fn registry(dir: &Path, subsets: &[(&str, &Path)]) -> SubsetRegistry {
        SubsetRegistry {
            subsets: subsets
                .iter()
                .map(|(id, metadata)| {
                    (
                        id.to_string(),
                        SubsetEntry {
                            dir: dir.to_path_buf(),
                            metadata: metadata.to_path_buf(),
                        },
                    )
                })
                .collect(),
        }
    }

    fn config(subsets: &[(&str, i64)]) -> DatasetConfig {
        DatasetConfig {
            subsets: subsets
                .iter()
                .map(|(id, n)| SubsetConfig {
                    id: id.to_string(),
                    max_num_samples: *n,
                })
                .collect(),
        }
    }

    const TSV_A: &str = "ID\tAUDIO\tDURATION\tTEXT\n\
        a1\ta1.wav\t1.0\thello\n\
        a2\ta2.wav\t0.1\ttoo short\n\
        a3\ta3.wav\t2.0\tworld\n\
        a4\ta4.wav\t3.0\tagain\n";

    const TSV_B: &str = "ID\tAUDIO\tDURATION\tTEXT\n\
        b1\tb1.wav\t1.5\tfoo\n\
        b2\tb2.wav\t2.5\tbar\n";

    fn loader() -> SampleLoader {
        SampleLoader {
            min_duration: 0.5,
            ..Default::default()
        }
    }

    #[test]
    fn loads_subsets_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_file(dir.path(), "a.tsv", TSV_A);
        let b = write_file(dir.path(), "b.tsv", TSV_B);
        let reg = registry(dir.path(), &[("A", &a), ("B", &b)]);

        let ds = Dataset::load(&reg, &config(&[("B", -1), ("A", -1)]), &loader()).unwrap();

        let ids: Vec<_> = ds.samples().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["b1", "b2", "a1", "a3", "a4"]);
        assert_eq!(ds[2].audio, dir.path().join("a1.wav"));
    }

    #[test]
    fn cap_counts_accepted_samples_only() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_file(dir.path(), "a.tsv", TSV_A);
        let reg = registry(dir.path(), &[("A", &a)]);

        let ds = Dataset::load(&reg, &config(&[("A", 2)]), &loader()).unwrap();

        let ids: Vec<_> = ds.samples().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["a1", "a3"]);
    }

    #[test]
    fn zero_cap_skips_subset() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_file(dir.path(), "a.tsv", TSV_A);
        let b = write_file(dir.path(), "b.tsv", TSV_B);
        let reg = registry(dir.path(), &[("A", &a), ("B", &b)]);

        let ds = Dataset::load(&reg, &config(&[("A", 0), ("B", -1)]), &loader()).unwrap();

        assert_eq!(ds.len(), 2);
        assert_eq!(ds[0].id, "b1");
    }

    #[test]
    fn rejects_non_tsv_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_file(dir.path(), "a.jsonl", "{}\n");
        let reg = registry(dir.path(), &[("A", &a)]);

        let result = Dataset::load(&reg, &config(&[("A", -1)]), &loader());

        assert!(matches!(
            result,
            Err(Error::Dataset(DatasetError::Unsupported(_)))
        ));
    }

    #[test]
    fn unknown_subset_is_error() {
        let reg = SubsetRegistry::default();

        let result = Dataset::load(&reg, &config(&[("missing", -1)]), &loader());

        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::UnknownSubset(id))) if id == "missing"
        ));
    }

    #[test]
    fn missing_duration_column_disables_filter() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_file(dir.path(), "a.tsv", "ID\tAUDIO\nx\tx.wav\ny\ty.wav\n");
        let reg = registry(dir.path(), &[("A", &a)]);
        let strict = SampleLoader {
            min_duration: 100.0,
            max_duration: 200.0,
            ..Default::default()
        };

        let ds = Dataset::load(&reg, &config(&[("A", -1)]), &strict).unwrap();

        assert_eq!(ds.len(), 2);
        assert!(ds.samples().iter().all(|s| s.duration.is_infinite()));
    }

    #[test]
    fn invalid_cell_names_file_and_line() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_file(
            dir.path(),
            "a.tsv",
            "ID\tAUDIO\tDURATION\na1\ta1.wav\t1.0\na2\ta2.wav\tlong\n",
        );
        let reg = registry(dir.path(), &[("A", &a)]);

        let result = Dataset::load(&reg, &config(&[("A", -1)]), &loader());

        match result {
            Err(Error::Dataset(DatasetError::InvalidRow { path, line, source })) => {
                assert_eq!(path, a);
                assert_eq!(line, 3);
                assert!(matches!(
                    *source,
                    DatasetError::InvalidField { ref field, ref value }
                        if field == "DURATION" && value == "long"
                ));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    /// Collects formatted log output for assertions.
    #[derive(Clone, Default)]
    struct LogBuffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn warns_about_missing_columns() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_file(dir.path(), "a.tsv", "ID\tAUDIO\nx\tx.wav\n");
        let reg = registry(dir.path(), &[("A", &a)]);

        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .finish();

        let ds = tracing::subscriber::with_default(subscriber, || {
            Dataset::load(&reg, &config(&[("A", -1)]), &loader()).unwrap()
        });

        assert_eq!(ds.len(), 1);
        let out = logs.contents();
        assert!(out.contains("WARN"), "{out}");
        assert!(out.contains("no begin column"), "{out}");
        assert!(out.contains("no duration column"), "{out}");
        assert!(out.contains("no text column"), "{out}");
        assert!(out.contains("column=DURATION"), "{out}");
    }

    #[test]
    fn complete_metadata_does_not_warn() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_file(
            dir.path(),
            "a.tsv",
            "ID\tAUDIO\tBEGIN\tDURATION\tTEXT\nx\tx.wav\t0\t1.0\thi\n",
        );
        let reg = registry(dir.path(), &[("A", &a)]);

        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            Dataset::load(&reg, &config(&[("A", -1)]), &loader()).unwrap()
        });

        assert!(logs.contents().is_empty());
    }

    #[test]
    fn registry_from_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "db.yaml",
            "train-clean-100:\n  dir: /corpus/ls\n  metadata: /corpus/ls/train.tsv\n",
        );

        let reg = SubsetRegistry::from_file(&path).unwrap();

        let entry = reg.get("train-clean-100").unwrap();
        assert_eq!(entry.dir, PathBuf::from("/corpus/ls"));
        assert_eq!(entry.metadata, PathBuf::from("/corpus/ls/train.tsv"));
    }

    #[test]
    fn subset_config_defaults_to_unbounded() {
        let cfg: DatasetConfig = serde_yaml::from_str("subsets:\n  - id: A\n").unwrap();

        assert_eq!(cfg.subsets[0].max_num_samples, -1);
    }
}
