//! Typed access to row attributes.

use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use tracing::warn;

use super::client::{AttrValue, Item, PK, SI1_HASH, SI1_SORT, SK};
use super::{Result, StorageError};

/// Common attribute names.
pub mod attr {
    pub const CREATED_AT: &str = "createdAt";
    pub const UPDATED_AT: &str = "updatedAt";
}

/// Builds one row for a write.
#[derive(Debug, Clone)]
pub struct RowBuilder {
    item: Item,
}

impl RowBuilder {
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        let mut item = Item::new();
        item.insert(PK.to_string(), AttrValue::S(pk.into()));
        item.insert(SK.to_string(), AttrValue::S(sk.into()));
        Self { item }
    }

    /// Project the row into the list index.
    pub fn index(self, hash: impl Into<String>, sort: impl Into<String>) -> Self {
        self.s(SI1_HASH, hash).s(SI1_SORT, sort)
    }

    pub fn s(mut self, name: &str, value: impl Into<String>) -> Self {
        self.item
            .insert(name.to_string(), AttrValue::S(value.into()));
        self
    }

    /// Set a string attribute only when present. Absent values are omitted
    /// rather than written as NULL.
    pub fn opt_s(self, name: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.s(name, v),
            None => self,
        }
    }

    pub fn n(mut self, name: &str, value: impl Display) -> Self {
        self.item
            .insert(name.to_string(), AttrValue::N(value.to_string()));
        self
    }

    pub fn timestamp(self, name: &str, value: &DateTime<Utc>) -> Self {
        self.s(name, value.to_rfc3339())
    }

    pub fn build(self) -> Item {
        self.item
    }
}

/// Read-only view over a fetched row.
#[derive(Debug, Clone, Copy)]
pub struct RowReader<'a> {
    item: &'a Item,
}

impl<'a> RowReader<'a> {
    pub fn new(item: &'a Item) -> Self {
        Self { item }
    }

    pub fn pk(&self) -> Option<&'a str> {
        self.s(PK)
    }

    pub fn sk(&self) -> Option<&'a str> {
        self.s(SK)
    }

    pub fn s(&self, name: &str) -> Option<&'a str> {
        self.item.get(name).and_then(AttrValue::as_s)
    }

    pub fn required_s(&self, name: &str) -> Result<&'a str> {
        self.s(name).ok_or_else(|| StorageError::MissingAttribute {
            attribute: name.to_string(),
            sk: self.sk().unwrap_or("<none>").to_string(),
        })
    }

    pub fn n<T>(&self, name: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.item.get(name).and_then(AttrValue::as_n) {
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|e: T::Err| StorageError::InvalidAttribute {
                    attribute: name.to_string(),
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    pub fn required_n<T>(&self, name: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.n(name)?.ok_or_else(|| StorageError::MissingAttribute {
            attribute: name.to_string(),
            sk: self.sk().unwrap_or("<none>").to_string(),
        })
    }

    /// Parse an RFC 3339 timestamp attribute.
    pub fn timestamp(&self, name: &str) -> Result<Option<DateTime<Utc>>> {
        self.s(name)
            .map(|raw| {
                DateTime::parse_from_rfc3339(raw)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| StorageError::InvalidAttribute {
                        attribute: name.to_string(),
                        reason: e.to_string(),
                    })
            })
            .transpose()
    }

    /// Parse a string attribute through `FromStr`.
    pub fn parsed<T>(&self, name: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.s(name)
            .map(|raw| {
                raw.parse().map_err(|e: T::Err| StorageError::InvalidAttribute {
                    attribute: name.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }
}

/// Earliest-created / latest-updated accumulator for merged children.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timestamps {
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Timestamps {
    pub fn observe(&mut self, created_at: Option<DateTime<Utc>>, updated_at: Option<DateTime<Utc>>) {
        if let Some(created) = created_at {
            self.created_at = Some(self.created_at.map_or(created, |c| c.min(created)));
        }
        if let Some(updated) = updated_at {
            self.updated_at = Some(self.updated_at.map_or(updated, |u| u.max(updated)));
        }
    }

    /// Read a single row's `createdAt`/`updatedAt`.
    pub fn of_row(row: &RowReader<'_>) -> Result<Self> {
        let mut timestamps = Self::default();
        timestamps.observe_row(row)?;
        Ok(timestamps)
    }

    pub fn merge(&mut self, other: Timestamps) {
        self.observe(other.created_at, other.updated_at);
    }

    /// Fold in a row's `createdAt`/`updatedAt`.
    pub fn observe_row(&mut self, row: &RowReader<'_>) -> Result<()> {
        self.observe(
            row.timestamp(attr::CREATED_AT)?,
            row.timestamp(attr::UPDATED_AT)?,
        );
        Ok(())
    }

    /// Resolve to concrete values, falling back to the Unix epoch.
    pub fn resolve(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let created = self.created_at.unwrap_or_else(|| {
            warn!("Row has no createdAt, using the Unix epoch");
            DateTime::<Utc>::UNIX_EPOCH
        });
        let updated = self.updated_at.unwrap_or(created);
        (created, updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_builder_and_reader() {
        let item = RowBuilder::new("G:a", "G:a")
            .index("T:base", "G:a")
            .s("status", "ok")
            .opt_s("arn", None)
            .n("version", 4)
            .timestamp(attr::CREATED_AT, &at(100))
            .build();

        let row = RowReader::new(&item);
        assert_eq!(row.pk(), Some("G:a"));
        assert_eq!(row.s(SI1_HASH), Some("T:base"));
        assert_eq!(row.s("arn"), None);
        assert!(!item.contains_key("arn"));
        assert_eq!(row.n::<u32>("version").unwrap(), Some(4));
        assert_eq!(row.timestamp(attr::CREATED_AT).unwrap(), Some(at(100)));
    }

    #[test]
    fn test_reader_errors() {
        let item = RowBuilder::new("G:a", "G:a")
            .n("version", "x")
            .s(attr::CREATED_AT, "yesterday")
            .build();
        let row = RowReader::new(&item);

        assert!(matches!(
            row.required_s("name"),
            Err(StorageError::MissingAttribute { .. })
        ));
        assert!(matches!(
            row.n::<u32>("version"),
            Err(StorageError::InvalidAttribute { .. })
        ));
        assert!(matches!(
            row.timestamp(attr::CREATED_AT),
            Err(StorageError::InvalidAttribute { .. })
        ));
    }

    #[test]
    fn test_timestamps_keep_earliest_created_latest_updated() {
        let mut forward = Timestamps::default();
        forward.observe(Some(at(1)), Some(at(3)));
        forward.observe(Some(at(2)), Some(at(4)));

        let mut backward = Timestamps::default();
        backward.observe(Some(at(2)), Some(at(4)));
        backward.observe(Some(at(1)), Some(at(3)));

        assert_eq!(forward, backward);
        assert_eq!(forward.created_at, Some(at(1)));
        assert_eq!(forward.updated_at, Some(at(4)));
    }

    #[test]
    fn test_timestamps_resolve_defaults() {
        let mut ts = Timestamps::default();
        ts.observe(Some(at(10)), None);
        assert_eq!(ts.resolve(), (at(10), at(10)));
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn test_timestamps_missing_created_warns() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let resolved = tracing::subscriber::with_default(subscriber, || {
            let mut ts = Timestamps::default();
            ts.observe(None, Some(at(20)));
            ts.resolve()
        });

        assert_eq!(resolved, (DateTime::<Utc>::UNIX_EPOCH, at(20)));
        assert!(logs.text().contains("no createdAt"));

        let quiet = CapturedLogs::default();
        let writer = quiet.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            let mut ts = Timestamps::default();
            ts.observe(Some(at(10)), None);
            ts.resolve()
        });
        assert!(quiet.text().is_empty());
    }
}
