use crate::model::{BookFields, ExportPayload};
use crate::Error;
use chrono::{DateTime, Local, TimeZone};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

#[cfg(feature = "tracing")]
use tracing::info;

/// Sortable, filesystem-safe date-time rendering used in filenames
pub const FILENAME_DATE_FORMAT: &str = "%Y-%m-%d %H-%M";

const RESERVED: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Persists export payloads as one pretty-printed JSON file per book.
///
/// Filenames are derived from payload content plus the export time. Two
/// exports deriving the same name overwrite each other silently; there is no
/// other collision guard.
#[derive(Debug, Clone)]
pub struct ResultWriter {
    dir: PathBuf,
}

impl ResultWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Write `payload` stamped with the current local time.
    pub async fn write(&self, payload: &ExportPayload) -> Result<PathBuf, Error> {
        self.write_at(payload, Local::now()).await
    }

    pub async fn write_at<Tz>(
        &self,
        payload: &ExportPayload,
        exported_at: DateTime<Tz>,
    ) -> Result<PathBuf, Error>
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        let fields = payload.book_fields()?;
        let path = self.dir.join(output_filename(&fields, &exported_at));

        tokio::fs::create_dir_all(&self.dir).await?;
        let json = serde_json::to_vec_pretty(payload.as_value())?;
        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(&json).await?;
        file.flush().await?;

        info!("Wrote {}", path.display());
        Ok(path)
    }
}

/// `Book <loan> <title> by <author> <format> notes (downloaded <export>).json`
///
/// The loan date is rendered in the export time's zone.
pub fn output_filename<Tz>(fields: &BookFields, exported_at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let zone = exported_at.timezone();
    let loaned = fields.loaned_at.with_timezone(&zone);
    format!(
        "Book {} {} by {} {} notes (downloaded {}).json",
        loaned.format(FILENAME_DATE_FORMAT),
        sanitize_component(&fields.title),
        sanitize_component(&fields.author),
        sanitize_component(&fields.format),
        exported_at.format(FILENAME_DATE_FORMAT),
    )
}

/// Strip characters that are reserved in filenames on common filesystems.
pub fn sanitize_component(component: &str) -> String {
    component
        .chars()
        .filter(|c| !RESERVED.contains(c) && !c.is_control())
        .collect()
}

/// Append-only log of export destination URLs
#[derive(Debug, Clone)]
pub struct ExportLog {
    path: PathBuf,
}

impl ExportLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn append(&self, url: &str) -> Result<(), Error> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(format!("Exported URL: {url}\n").as_bytes())
            .await?;
        file.flush().await?;
        Ok(())
    }
}
