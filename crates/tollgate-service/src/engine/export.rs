//! Ledger exports.
//!
//! Events stream from [`Ledger::for_each`] straight into the writer, so an
//! export never holds more than one event in memory. [`export_report`] is the
//! buffered convenience used by the HTTP layer.
//!
//! CSV columns, in order:
//!
//! ```text
//! event_id,timestamp,provider,endpoint,quantity,unit_cost_usd,cost_usd,
//! status_code,success,response_time_ms,unrecognized,path,request_id,profile_id
//! ```

use std::io::Write;
use std::str::FromStr;

use tollgate_core::{micros_to_usd, DateRange, MeterError, UsageEvent};
use tollgate_store::{Ledger, LedgerFilter, StoreError};

/// CSV header, in column order.
pub const CSV_COLUMNS: [&str; 14] = [
    "event_id",
    "timestamp",
    "provider",
    "endpoint",
    "quantity",
    "unit_cost_usd",
    "cost_usd",
    "status_code",
    "success",
    "response_time_ms",
    "unrecognized",
    "path",
    "request_id",
    "profile_id",
];

/// Supported export encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// JSON array of usage events.
    Json,
    /// CSV with a header row.
    Csv,
}

impl ExportFormat {
    /// MIME type of the encoding.
    #[must_use]
    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Csv => "text/csv; charset=utf-8",
        }
    }

    /// File extension of the encoding.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = MeterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(MeterError::InvalidFormat(other.to_string())),
        }
    }
}

/// Which events to export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportFilters {
    /// Only this provider.
    pub provider: Option<String>,
    /// Only events in this range.
    pub range: Option<DateRange>,
}

impl From<&ExportFilters> for LedgerFilter {
    fn from(filters: &ExportFilters) -> Self {
        Self {
            provider: filters.provider.clone(),
            endpoint: None,
            range: filters.range,
        }
    }
}

/// Stream matching events into `writer`. Returns the number of events written.
///
/// # Errors
///
/// - `Serialization` if encoding or writing fails.
/// - `ServiceUnavailable` if the ledger cannot be read.
pub fn export_to_writer<W: Write>(
    ledger: &dyn Ledger,
    format: ExportFormat,
    filters: &ExportFilters,
    writer: W,
) -> Result<u64, MeterError> {
    let filter = LedgerFilter::from(filters);
    match format {
        ExportFormat::Json => write_json(ledger, &filter, writer),
        ExportFormat::Csv => write_csv(ledger, &filter, writer),
    }
}

/// Export matching events into memory.
///
/// # Errors
///
/// Same as [`export_to_writer`].
pub fn export_report(
    ledger: &dyn Ledger,
    format: ExportFormat,
    filters: &ExportFilters,
) -> Result<Vec<u8>, MeterError> {
    let mut buffer = Vec::new();
    let count = export_to_writer(ledger, format, filters, &mut buffer)?;
    tracing::debug!(
        format = format.extension(),
        events = count,
        bytes = buffer.len(),
        "Exported usage"
    );
    Ok(buffer)
}

fn write_json<W: Write>(
    ledger: &dyn Ledger,
    filter: &LedgerFilter,
    mut writer: W,
) -> Result<u64, MeterError> {
    let mut count = 0u64;
    let mut failure: Option<String> = None;

    writer.write_all(b"[").map_err(serialization)?;
    let scanned = ledger.for_each(filter, &mut |event| {
        let written = (if count == 0 {
            Ok(())
        } else {
            writer.write_all(b",")
        })
        .map_err(|e| e.to_string())
        .and_then(|()| serde_json::to_writer(&mut writer, event).map_err(|e| e.to_string()));
        match written {
            Ok(()) => {
                count += 1;
                Ok(())
            }
            Err(e) => {
                failure = Some(e);
                Err(StoreError::Serialization("export aborted".into()))
            }
        }
    });
    finish_scan(scanned, failure)?;
    writer.write_all(b"]").map_err(serialization)?;
    writer.flush().map_err(serialization)?;
    Ok(count)
}

fn write_csv<W: Write>(
    ledger: &dyn Ledger,
    filter: &LedgerFilter,
    writer: W,
) -> Result<u64, MeterError> {
    let mut csv = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    csv.write_record(CSV_COLUMNS).map_err(serialization)?;

    let mut count = 0u64;
    let mut failure: Option<String> = None;
    let scanned = ledger.for_each(filter, &mut |event| {
        match csv.write_record(csv_row(event)) {
            Ok(()) => {
                count += 1;
                Ok(())
            }
            Err(e) => {
                failure = Some(e.to_string());
                Err(StoreError::Serialization("export aborted".into()))
            }
        }
    });
    finish_scan(scanned, failure)?;
    csv.flush().map_err(serialization)?;
    Ok(count)
}

fn csv_row(event: &UsageEvent) -> [String; 14] {
    [
        event.event_id.to_string(),
        event.timestamp.to_rfc3339(),
        event.provider.clone(),
        event.endpoint.clone(),
        event.quantity.to_string(),
        micros_to_usd(event.unit_cost_micros).to_string(),
        micros_to_usd(event.cost_micros).to_string(),
        event.status_code.to_string(),
        event.success.to_string(),
        event
            .response_time_ms
            .map(|ms| ms.to_string())
            .unwrap_or_default(),
        event.unrecognized.to_string(),
        event.path.clone().unwrap_or_default(),
        event.request_id.clone().unwrap_or_default(),
        event.profile_id.clone().unwrap_or_default(),
    ]
}

/// A writer failure takes precedence over the store error used to stop the scan.
fn finish_scan(scanned: Result<(), StoreError>, failure: Option<String>) -> Result<(), MeterError> {
    if let Some(e) = failure {
        return Err(MeterError::Serialization(e));
    }
    scanned.map_err(MeterError::from)
}

fn serialization(e: impl std::fmt::Display) -> MeterError {
    MeterError::Serialization(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_core::UsageContext;
    use tollgate_store::MemoryLedger;

    fn ledger() -> MemoryLedger {
        let ledger = MemoryLedger::new();
        for (provider, ts) in [
            ("semrush", "2026-10-02T00:00:00Z"),
            ("dataforseo", "2026-10-01T00:00:00Z"),
        ] {
            ledger
                .append(&UsageEvent::priced(
                    provider,
                    "lookup",
                    2,
                    500,
                    UsageContext::default()
                        .with_path("/v1/lookup?q=a,b")
                        .occurred_at(ts.parse().unwrap()),
                ))
                .unwrap();
        }
        ledger
    }

    #[test]
    fn format_parsing_rejects_unknown_encodings() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert!(matches!(
            "xml".parse::<ExportFormat>(),
            Err(MeterError::InvalidFormat(_))
        ));
    }

    #[test]
    fn json_is_the_raw_event_array_in_time_order() {
        let bytes = export_report(&ledger(), ExportFormat::Json, &ExportFilters::default()).unwrap();
        let events: Vec<UsageEvent> = serde_json::from_slice(&bytes).unwrap();
        let providers: Vec<_> = events.iter().map(|e| e.provider.as_str()).collect();
        assert_eq!(providers, vec!["dataforseo", "semrush"]);
    }

    #[test]
    fn empty_json_export_is_an_empty_array() {
        let bytes =
            export_report(&MemoryLedger::new(), ExportFormat::Json, &ExportFilters::default())
                .unwrap();
        assert_eq!(bytes, b"[]");
    }

    #[test]
    fn csv_has_fixed_columns_and_quotes_commas() {
        let filters = ExportFilters {
            provider: Some("semrush".into()),
            range: None,
        };
        let bytes = export_report(&ledger(), ExportFormat::Csv, &filters).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();

        assert_eq!(lines.next().unwrap(), CSV_COLUMNS.join(","));
        let row = lines.next().unwrap();
        assert!(row.contains(",semrush,lookup,2,0.0005,0.001,200,true,,false,"));
        assert!(row.contains("\"/v1/lookup?q=a,b\""));
        assert!(lines.next().is_none());
    }
}
