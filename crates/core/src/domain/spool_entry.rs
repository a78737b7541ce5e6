// Spool Entry Identity
//
// File name layout: {marker}_{startUnixSeconds}_{hexJobId}.json
// marker "0" = attempt in progress, "1" = attempt finished

use chrono::{DateTime, Utc};
use std::fmt;

use super::error::{DomainError, Result};

const MARKER_RUNNING: &str = "0";
const MARKER_FINISHED: &str = "1";
const EXTENSION: &str = ".json";

/// Durable identity of one job attempt, reconstructible from a directory listing
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpoolEntryId {
    pub finished: bool,
    pub started_at_unix: i64,
    pub encoded_job_id: String,
}

impl SpoolEntryId {
    pub fn new(job_id: &str, started_at: DateTime<Utc>, finished: bool) -> Self {
        Self {
            finished,
            started_at_unix: started_at.timestamp(),
            encoded_job_id: encode_job_id(job_id),
        }
    }

    /// Same attempt, flipped to the finished marker
    pub fn as_finished(&self) -> Self {
        Self {
            finished: true,
            ..self.clone()
        }
    }

    pub fn file_name(&self) -> String {
        let marker = if self.finished {
            MARKER_FINISHED
        } else {
            MARKER_RUNNING
        };
        format!(
            "{}_{}_{}{}",
            marker, self.started_at_unix, self.encoded_job_id, EXTENSION
        )
    }

    /// Parse a spool file name. Anything that is not a spool entry is rejected.
    pub fn parse(file_name: &str) -> Result<Self> {
        let invalid = || DomainError::InvalidSpoolEntry(file_name.to_string());

        let stem = file_name.strip_suffix(EXTENSION).ok_or_else(invalid)?;
        let mut parts = stem.splitn(3, '_');
        let (marker, started, encoded) = match (parts.next(), parts.next(), parts.next()) {
            (Some(m), Some(s), Some(e)) => (m, s, e),
            _ => return Err(invalid()),
        };

        let finished = match marker {
            MARKER_RUNNING => false,
            MARKER_FINISHED => true,
            _ => return Err(invalid()),
        };

        let started_at_unix: i64 = started.parse().map_err(|_| invalid())?;

        if encoded.is_empty() || hex::decode(encoded).is_err() {
            return Err(invalid());
        }

        Ok(Self {
            finished,
            started_at_unix,
            encoded_job_id: encoded.to_string(),
        })
    }

    /// Decoded job identifier (lossy for non UTF-8 ids)
    pub fn job_id(&self) -> String {
        hex::decode(&self.encoded_job_id)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default()
    }

    pub fn belongs_to(&self, job_id: &str) -> bool {
        self.encoded_job_id == encode_job_id(job_id)
    }
}

impl fmt::Display for SpoolEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

pub fn encode_job_id(job_id: &str) -> String {
    hex::encode(job_id.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_file_name_layout() {
        let started = Utc.timestamp_opt(1_714_532_400, 0).unwrap();
        let id = SpoolEntryId::new("backup", started, false);

        assert_eq!(id.file_name(), "0_1714532400_6261636b7570.json");
        assert_eq!(id.as_finished().file_name(), "1_1714532400_6261636b7570.json");
    }

    #[test]
    fn test_parse() {
        let id = SpoolEntryId::parse("1_1714532400_6261636b7570.json").unwrap();

        assert!(id.finished);
        assert_eq!(id.started_at_unix, 1_714_532_400);
        assert_eq!(id.job_id(), "backup");
        assert!(id.belongs_to("backup"));
        assert!(!id.belongs_to("backup2"));
    }

    #[test]
    fn test_parse_keeps_identity() {
        let started = Utc.timestamp_opt(42, 0).unwrap();
        let id = SpoolEntryId::new("db_dump nightly", started, true);

        assert_eq!(SpoolEntryId::parse(&id.file_name()).unwrap(), id);
    }

    #[test]
    fn test_parse_rejects_foreign_files() {
        for name in [
            ".lock",
            "2_100_6162.json",
            "0_abc_6162.json",
            "0_100_zz.json",
            "0_100_.json",
            "0_100_6162.txt",
            "0_100.json",
        ] {
            assert!(SpoolEntryId::parse(name).is_err(), "{} should be rejected", name);
        }
    }
}
