use std::path::{Path, PathBuf};

use meter_client::{db::Channel, domain::MeterReading};
use time::{format_description::FormatItem, macros::format_description, Date};
use tokio::{fs, io::AsyncWriteExt};

use crate::pipeline::{IngestError, ReadingLog};

const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");
const TIMESTAMP_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Append-only text log, one file per calendar day (`<prefix>_<date>.txt`).
pub struct DailyFileLog {
    dir: PathBuf,
    prefix: String,
}

impl DailyFileLog {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_path(&self, date: Date) -> Result<PathBuf, IngestError> {
        let date = date
            .format(DATE_FORMAT)
            .map_err(|e| IngestError::LogSink(format!("failed to format date: {e}")))?;
        Ok(self.dir.join(format!("{}_{date}.txt", self.prefix)))
    }
}

/// Timestamp followed by every channel of every meter, comma-joined.
pub fn format_line(reading: &MeterReading) -> Result<String, IngestError> {
    let ts = reading
        .ts
        .format(TIMESTAMP_FORMAT)
        .map_err(|e| IngestError::LogSink(format!("failed to format timestamp: {e}")))?;

    let mut record = Vec::with_capacity(1 + reading.meters.len() * Channel::ALL.len());
    record.push(ts);
    for m in &reading.meters {
        record.extend(Channel::ALL.iter().map(|c| c.value(m).to_string()));
    }

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer
        .write_record(&record)
        .map_err(|e| IngestError::LogSink(format!("failed to encode line: {e}")))?;
    let bytes = writer
        .into_inner()
        .map_err(|e| IngestError::LogSink(format!("failed to encode line: {e}")))?;

    String::from_utf8(bytes).map_err(|e| IngestError::LogSink(e.to_string()))
}

#[async_trait::async_trait]
impl ReadingLog for DailyFileLog {
    async fn append(&self, reading: &MeterReading) -> Result<(), IngestError> {
        let path = self.file_path(reading.ts.date())?;
        let line = format_line(reading)?;

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| IngestError::LogSink(format!("failed to create {}: {e}", self.dir.display())))?;

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| IngestError::LogSink(format!("failed to open {}: {e}", path.display())))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| IngestError::LogSink(format!("failed to append to {}: {e}", path.display())))?;
        file.flush()
            .await
            .map_err(|e| IngestError::LogSink(format!("failed to flush {}: {e}", path.display())))?;

        tracing::debug!(path = %path.display(), "reading appended to log");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meter_client::domain::MeterChannels;
    use time::macros::{date, datetime};

    fn reading(ts: time::PrimitiveDateTime) -> MeterReading {
        MeterReading {
            ts,
            meters: vec![
                MeterChannels {
                    meter: 70,
                    total_kw: 12.5,
                    total_kva: 13.0,
                    avg_pf: 0.96,
                    total_net_kwh: 107.5,
                    total_net_kvah: 112.0,
                },
                MeterChannels {
                    meter: 40,
                    total_kw: 0.0,
                    total_kva: 0.0,
                    avg_pf: 1.0,
                    total_net_kwh: 42.0,
                    total_net_kvah: 44.0,
                },
            ],
        }
    }

    #[test]
    fn line_lists_timestamp_then_channels_per_meter() {
        let line = format_line(&reading(datetime!(2024-03-01 09:05:07))).unwrap();
        assert_eq!(line, "2024-03-01 09:05:07,12.5,107.5,13,0.96,112,0,42,0,1,44\n");
    }

    #[test]
    fn file_is_named_by_date() {
        let log = DailyFileLog::new("VIT-Data", "VITB");
        assert_eq!(
            log.file_path(date!(2024-03-01)).unwrap(),
            PathBuf::from("VIT-Data/VITB_2024-03-01.txt")
        );
    }

    #[tokio::test]
    async fn appends_lines_to_per_day_files() {
        let dir = tempfile::tempdir().unwrap();
        let log = DailyFileLog::new(dir.path().join("logs"), "VITB");

        log.append(&reading(datetime!(2024-03-01 23:59:00))).await.unwrap();
        log.append(&reading(datetime!(2024-03-01 23:59:30))).await.unwrap();
        log.append(&reading(datetime!(2024-03-02 00:00:10))).await.unwrap();

        let day1 = std::fs::read_to_string(log.file_path(date!(2024-03-01)).unwrap()).unwrap();
        let day2 = std::fs::read_to_string(log.file_path(date!(2024-03-02)).unwrap()).unwrap();

        assert_eq!(day1.lines().count(), 2);
        assert!(day1.starts_with("2024-03-01 23:59:00,"));
        assert_eq!(day2.lines().count(), 1);
        assert!(day2.starts_with("2024-03-02 00:00:10,"));
    }
}
