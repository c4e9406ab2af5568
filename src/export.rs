//! CSV output for harvested records.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::timeline::{Record, HEADERS};
use crate::Result;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Writes records as CSV with a fixed header row.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvExporter {
    bom: bool,
}

impl CsvExporter {
    /// `bom` prefixes output with a UTF-8 byte order mark.
    pub fn new(bom: bool) -> Self {
        Self { bom }
    }

    /// Write header and records to `out`.
    pub fn write<W: Write>(&self, mut out: W, records: &[Record]) -> Result<()> {
        if self.bom {
            out.write_all(UTF8_BOM)?;
        }
        let mut writer = csv::Writer::from_writer(out);
        writer.write_record(HEADERS)?;
        for record in records {
            writer.write_record(record.to_row())?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write records to a file, creating parent directories.
    ///
    /// Nothing is written for an empty record set; returns the path written otherwise.
    pub fn write_path<P: AsRef<Path>>(
        &self,
        path: P,
        records: &[Record],
    ) -> Result<Option<PathBuf>> {
        if records.is_empty() {
            return Ok(None);
        }
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = BufWriter::new(File::create(path)?);
        self.write(file, records)?;
        info!("wrote {} records to {}", records.len(), path.display());
        Ok(Some(path.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> Record {
        Record {
            author_name: "Ada, Countess".into(),
            post_date: "2018-10-10 20:19:24".into(),
            post_link: "https://x.com/ada/status/1".into(),
            other_hashtags: vec!["#Coding".into(), "#Math".into()],
            repost_count: 2,
            impression_count: 100,
            like_count: 5,
        }
    }

    #[test]
    fn test_write_with_header() {
        let mut buf = Vec::new();
        CsvExporter::new(false).write(&mut buf, &[record()]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("Author Name,Post Date,Post Link,Other Hashtags,Repost Count,Impression Count,Like Count")
        );
        assert_eq!(
            lines.next(),
            Some(r##""Ada, Countess",2018-10-10 20:19:24,https://x.com/ada/status/1,"#Coding, #Math",2,100,5"##)
        );
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_bom_prefix() {
        let mut buf = Vec::new();
        CsvExporter::new(true).write(&mut buf, &[]).unwrap();
        assert!(buf.starts_with(UTF8_BOM));
    }

    #[test]
    fn test_write_path_skips_empty() {
        let path = std::env::temp_dir().join("eoka-harvest-empty-test.csv");
        let _ = std::fs::remove_file(&path);
        let written = CsvExporter::new(true).write_path(&path, &[]).unwrap();
        assert!(written.is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_write_path_creates_dirs() {
        let dir = std::env::temp_dir().join(format!("eoka-harvest-{}", std::process::id()));
        let path = dir.join("nested").join("out.csv");
        let written = CsvExporter::new(false)
            .write_path(&path, &[record()])
            .unwrap();
        assert_eq!(written.as_deref(), Some(path.as_path()));
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
