//! CSV dataset source
//!
//! Datasets are CSV files in the upload directory, referenced by file name.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use causegraph_core::{CausalError, Dataset, RecordSource, Result};

/// Record source reading uploaded CSV files
#[derive(Debug, Clone)]
pub struct CsvRecordSource {
    upload_dir: PathBuf,
}

impl CsvRecordSource {
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
        }
    }

    /// Resolve a reference to a file inside the upload directory
    pub fn resolve(&self, reference: &str) -> Result<PathBuf> {
        let path = Path::new(reference);
        let mut components = path.components();
        let plain_name = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !plain_name {
            return Err(CausalError::Validation(format!(
                "Invalid source reference: {reference:?}"
            )));
        }

        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if !is_csv {
            return Err(CausalError::Validation(format!(
                "Unsupported file type: {reference}"
            )));
        }

        Ok(self.upload_dir.join(path))
    }

    async fn read(&self, reference: &str) -> Result<Vec<u8>> {
        let path = self.resolve(reference)?;
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                CausalError::Validation(format!("Unknown source: {reference}"))
            }
            _ => CausalError::Source(format!("{}: {e}", path.display())),
        })
    }
}

fn parse(bytes: &[u8], max_rows: usize) -> Result<Dataset> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);
    let headers = reader
        .headers()
        .map_err(|e| CausalError::Source(e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let records = reader
        .records()
        .take(max_rows)
        .map(|record| {
            record
                .map(|r| r.iter().map(str::to_string).collect())
                .map_err(|e| CausalError::Source(e.to_string()))
        })
        .collect::<Result<Vec<Vec<String>>>>()?;

    Ok(Dataset { headers, records })
}

#[async_trait]
impl RecordSource for CsvRecordSource {
    async fn headers(&self, reference: &str) -> Result<Vec<String>> {
        let bytes = self.read(reference).await?;
        Ok(parse(&bytes, 0)?.headers)
    }

    async fn load(&self, reference: &str, max_rows: usize) -> Result<Dataset> {
        let bytes = self.read(reference).await?;
        let dataset = parse(&bytes, max_rows)?;
        tracing::debug!(reference, rows = dataset.len(), max_rows, "Dataset loaded");
        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_with(name: &str, contents: &str) -> (tempfile::TempDir, CsvRecordSource) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(name), contents).unwrap();
        let source = CsvRecordSource::new(dir.path());
        (dir, source)
    }

    #[tokio::test]
    async fn test_load_with_row_cap() {
        let (_dir, source) = source_with("data.csv", "id,text\n1,a\n2,b\n3,c\n");

        let dataset = source.load("data.csv", 2).await.unwrap();
        assert_eq!(dataset.headers, vec!["id", "text"]);
        assert_eq!(dataset.column("text").unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_headers_and_ragged_rows() {
        let (_dir, source) = source_with("data.csv", "text, lang\n\"Rain, then floods\"\nHeat,en\n");

        assert_eq!(source.headers("data.csv").await.unwrap(), vec!["text", "lang"]);
        let dataset = source.load("data.csv", 10).await.unwrap();
        assert_eq!(dataset.column("lang").unwrap(), vec!["", "en"]);
        assert_eq!(dataset.column("text").unwrap()[0], "Rain, then floods");
    }

    #[test]
    fn test_references_cannot_escape_upload_dir() {
        let source = CsvRecordSource::new("/srv/uploads");
        for reference in ["../secret.csv", "/etc/data.csv", "nested/data.csv", "", "."] {
            assert!(
                matches!(source.resolve(reference), Err(CausalError::Validation(_))),
                "reference {reference:?}"
            );
        }
        assert!(source.resolve("notes.txt").is_err());
        assert_eq!(
            source.resolve("data.CSV").unwrap(),
            Path::new("/srv/uploads/data.CSV")
        );
    }

    #[tokio::test]
    async fn test_unknown_source_is_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = CsvRecordSource::new(dir.path());
        assert!(matches!(
            source.headers("missing.csv").await,
            Err(CausalError::Validation(_))
        ));
    }
}
