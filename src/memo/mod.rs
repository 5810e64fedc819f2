pub mod attachment;
pub mod thumbnail;

use chrono::{DateTime, Local, LocalResult, NaiveDateTime, Offset, TimeZone};
use serde::Serialize;
use thiserror::Error;

use attachment::{strip_media_links, AttachmentDescriptor};

/// Extension of memo files inside `memos/`.
pub const MEMO_EXTENSION: &str = ".md";

/// File-name timestamp pattern (`yyyyMMddHHmmss`).
pub const MEMO_ID_FORMAT: &str = "%Y%m%d%H%M%S";

const MEMO_ID_LEN: usize = 14;

/// Full memo as presented in the detail view. Rebuilt on every read.
#[derive(Debug, Clone, Serialize)]
pub struct MemoRecord {
    pub id: String,
    pub time: DateTime<Local>,
    /// Reserved; always empty for now.
    pub tags: Vec<String>,
    /// Body with media links replaced by the placeholder
    pub body_text: String,
    pub attachments: Vec<AttachmentDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    #[error("file name {name:?} is not a yyyyMMddHHmmss timestamp")]
    InvalidName { name: String },

    #[error("unreadable memo: {reason}")]
    Unreadable { reason: String },
}

/// Base name of a memo file, or `None` if it does not carry the memo extension.
pub fn memo_base_name(file_name: &str) -> Option<&str> {
    file_name.strip_suffix(MEMO_EXTENSION)
}

/// Format a memo id for the given instant.
pub fn memo_id_for<Tz: TimeZone>(time: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    time.format(MEMO_ID_FORMAT).to_string()
}

/// Parse a memo id into its local wall-clock timestamp.
pub fn parse_memo_id(id: &str) -> Result<NaiveDateTime, ParseFailure> {
    let invalid = || ParseFailure::InvalidName { name: id.to_string() };
    if id.len() != MEMO_ID_LEN || !id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    NaiveDateTime::parse_from_str(id, MEMO_ID_FORMAT).map_err(|_| invalid())
}

/// Interpret a memo id in the given zone.
pub fn parse_memo_time_in<Tz: TimeZone>(id: &str, tz: &Tz) -> Result<DateTime<Tz>, ParseFailure> {
    let naive = parse_memo_id(id)?;
    zoned_from_local(&naive, tz).ok_or_else(|| ParseFailure::InvalidName { name: id.to_string() })
}

/// Interpret a memo id in the device's current default zone.
pub fn parse_memo_time(id: &str) -> Result<DateTime<Local>, ParseFailure> {
    parse_memo_time_in(id, &Local)
}

/// Attach a zone to a wall-clock time.
///
/// Ambiguous times (DST fall-back) take the earlier offset. Times inside a
/// DST gap are shifted forward by the length of the gap.
pub fn zoned_from_local<Tz: TimeZone>(naive: &NaiveDateTime, tz: &Tz) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(naive) {
        LocalResult::Single(time) => Some(time),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => {
            let day_before = *naive - chrono::Duration::days(1);
            let before = tz.from_local_datetime(&day_before).earliest()?;
            let offset_secs = before.offset().fix().local_minus_utc() as i64;
            let utc = *naive - chrono::Duration::seconds(offset_secs);
            Some(tz.from_utc_datetime(&utc))
        }
    }
}

/// Parse a memo from its file base name and raw content.
pub fn parse_memo_file(base_name: &str, raw_text: &str) -> Result<MemoRecord, ParseFailure> {
    let time = parse_memo_time(base_name)?;
    Ok(MemoRecord {
        id: base_name.to_string(),
        time,
        tags: Vec::new(),
        body_text: strip_media_links(raw_text),
        attachments: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, FixedOffset, Timelike, Utc};

    #[test]
    fn test_parses_valid_name() {
        let memo = parse_memo_file("20240515120000", "Hello").unwrap();
        assert_eq!(memo.id, "20240515120000");
        assert_eq!(memo.time.year(), 2024);
        assert_eq!(memo.time.month(), 5);
        assert_eq!(memo.time.day(), 15);
        assert_eq!(memo.time.hour(), 12);
        assert!(memo.tags.is_empty());
        assert_eq!(memo.body_text, "Hello");
    }

    #[test]
    fn test_id_round_trip() {
        for id in ["20240515120000", "19991231235959", "00010101000000", "20240229060708"] {
            let time = parse_memo_time_in(id, &Utc).unwrap();
            assert_eq!(memo_id_for(&time), id, "id 왕복 변환이 일치해야 함");
        }
    }

    #[test]
    fn test_rejects_malformed_names() {
        for name in [
            "",
            "2024051512000",
            "202405151200000",
            "2024-05-15 12:00",
            "2024051512000a",
            "+2024051512000",
            "20241315120000",
            "20240230120000",
            "20240515250000",
            "note",
        ] {
            assert!(
                matches!(parse_memo_file(name, "x"), Err(ParseFailure::InvalidName { .. })),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_body_text_strips_media_links() {
        let memo = parse_memo_file(
            "20240515120000",
            "  Hello ![Image](../../../images/2024/05/20240515120000-0.jpg)  \n",
        )
        .unwrap();
        assert_eq!(memo.body_text, "Hello [Media Inserted]");
    }

    #[test]
    fn test_memo_base_name() {
        assert_eq!(memo_base_name("20240515120000.md"), Some("20240515120000"));
        assert_eq!(memo_base_name("20240515120000.txt"), None);
        assert_eq!(memo_base_name("README"), None);
    }

    #[test]
    fn test_zoned_from_local_uses_fixed_offset() {
        let tz = FixedOffset::east_opt(9 * 3600).unwrap();
        let time = parse_memo_time_in("20240515120000", &tz).unwrap();
        assert_eq!(time.with_timezone(&Utc).hour(), 3);
    }
}
