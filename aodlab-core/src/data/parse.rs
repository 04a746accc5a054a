//! Layout-driven CSV parsing into typed records.
//!
//! `parse_table` handles everything the source families share: preamble
//! skipping, header resolution, timestamp decoding and localization, and
//! composite-column splitting with quality-flag filtering. The format parsers
//! (`AeronetParser`, `FlatAodParser`, `IsdParser`) sit on top of it behind the
//! `RecordParser` trait and produce one explicit record type each.
//!
//! Values stay textual here; the cleaner owns numeric conversion.

use super::layout::{
    CsvLayout, FieldMapping, SubField, TimestampColumns, FIELD_AOD, FIELD_TEMPERATURE,
    FIELD_WIND_DIRECTION, FIELD_WIND_SPEED, FLAT_TIMESTAMP_FORMAT,
};
use crate::domain::Quantity;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use chrono_tz::Tz;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("input is not valid UTF-8: {0}")]
    Encoding(String),

    #[error("missing expected column '{column}'")]
    MissingColumn { column: String },

    #[error("line {line}: expected {expected} columns, found {found}")]
    MalformedRow {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: column '{column}' has {found} sub-fields, need {needed}")]
    MalformedComposite {
        line: usize,
        column: String,
        found: usize,
        needed: usize,
    },

    #[error("line {line}: cannot decode timestamp '{value}': {reason}")]
    BadTimestamp {
        line: usize,
        value: String,
        reason: String,
    },

    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
}

/// One parsed row: a localized timestamp plus the textual fields the layout
/// asked for. Sub-fields that failed the quality check are absent.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// 1-based line in the original input.
    pub line: usize,
    pub timestamp: DateTime<Tz>,
    pub fields: BTreeMap<String, String>,
}

/// Parse `bytes` according to `layout`.
///
/// Deterministic: identical input yields identical records.
pub fn parse_table(bytes: &[u8], layout: &CsvLayout) -> Result<Vec<RawRecord>, ParseError> {
    let text = std::str::from_utf8(bytes).map_err(|e| ParseError::Encoding(e.to_string()))?;
    let text = text.trim_start_matches('\u{feff}');
    // Preambles are free text (AERONET's carries commas), so they are skipped by
    // line before the CSV reader sees anything.
    let body = skip_lines(text, layout.skip_rows);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(layout.delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let headers = reader.headers()?.clone();
    let resolved = Resolved::new(layout, &headers)?;

    let mut records = Vec::new();
    let mut flagged = 0usize;

    for row in reader.records() {
        let row = row?;
        let line = layout.skip_rows + row.position().map_or(0, |p| p.line() as usize);

        if row.iter().all(str::is_empty) {
            continue;
        }
        if row.len() <= resolved.max_index {
            return Err(ParseError::MalformedRow {
                line,
                expected: headers.len(),
                found: row.len(),
            });
        }

        let timestamp = resolved.timestamp(&row, line, layout.timezone)?;
        let mut fields = BTreeMap::new();

        for field in &resolved.fields {
            match field {
                ResolvedField::Plain { index, field } => {
                    fields.insert(field.to_string(), row[*index].to_string());
                }
                ResolvedField::Composite {
                    index,
                    column,
                    separator,
                    parts,
                    needed,
                } => {
                    let raw = &row[*index];
                    if raw.is_empty() {
                        continue;
                    }
                    let split: Vec<&str> = raw.split(*separator).map(str::trim).collect();
                    if split.len() < *needed {
                        return Err(ParseError::MalformedComposite {
                            line,
                            column: column.to_string(),
                            found: split.len(),
                            needed: *needed,
                        });
                    }
                    for part in parts.iter() {
                        if let Some(flag) = part.flag_index {
                            if split[flag] != layout.valid_quality {
                                flagged += 1;
                                continue;
                            }
                        }
                        fields.insert(part.field.clone(), split[part.value_index].to_string());
                    }
                }
            }
        }

        records.push(RawRecord {
            line,
            timestamp,
            fields,
        });
    }

    debug!(rows = records.len(), flagged, "parsed table");
    Ok(records)
}

fn skip_lines(text: &str, n: usize) -> &str {
    let mut rest = text;
    for _ in 0..n {
        match rest.find('\n') {
            Some(i) => rest = &rest[i + 1..],
            None => return "",
        }
    }
    rest
}

fn column_index(headers: &csv::StringRecord, column: &str) -> Result<usize, ParseError> {
    headers
        .iter()
        .position(|h| h == column)
        .ok_or_else(|| ParseError::MissingColumn {
            column: column.to_string(),
        })
}

enum ResolvedTimestamp<'a> {
    Single {
        index: usize,
        format: &'a str,
    },
    Split {
        date_index: usize,
        date_format: &'a str,
        time_index: usize,
        time_format: &'a str,
    },
}

enum ResolvedField<'a> {
    Plain {
        index: usize,
        field: &'a str,
    },
    Composite {
        index: usize,
        column: &'a str,
        separator: char,
        parts: &'a [SubField],
        needed: usize,
    },
}

/// Layout with column names resolved to header positions.
struct Resolved<'a> {
    timestamp: ResolvedTimestamp<'a>,
    fields: Vec<ResolvedField<'a>>,
    max_index: usize,
}

impl<'a> Resolved<'a> {
    fn new(layout: &'a CsvLayout, headers: &csv::StringRecord) -> Result<Self, ParseError> {
        let timestamp = match &layout.timestamp {
            TimestampColumns::Single { column, format } => ResolvedTimestamp::Single {
                index: column_index(headers, column)?,
                format,
            },
            TimestampColumns::Split {
                date_column,
                date_format,
                time_column,
                time_format,
            } => ResolvedTimestamp::Split {
                date_index: column_index(headers, date_column)?,
                date_format,
                time_index: column_index(headers, time_column)?,
                time_format,
            },
        };

        let fields = layout
            .fields
            .iter()
            .map(|mapping| -> Result<ResolvedField<'a>, ParseError> {
                let index = column_index(headers, mapping.column())?;
                Ok(match mapping {
                    FieldMapping::Plain { field, .. } => ResolvedField::Plain { index, field },
                    FieldMapping::Composite {
                        column,
                        separator,
                        parts,
                    } => ResolvedField::Composite {
                        index,
                        column,
                        separator: *separator,
                        parts,
                        needed: parts
                            .iter()
                            .map(|p| p.value_index.max(p.flag_index.unwrap_or(0)) + 1)
                            .max()
                            .unwrap_or(0),
                    },
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let ts_max = match &timestamp {
            ResolvedTimestamp::Single { index, .. } => *index,
            ResolvedTimestamp::Split {
                date_index,
                time_index,
                ..
            } => (*date_index).max(*time_index),
        };
        let max_index = fields
            .iter()
            .map(|f| match f {
                ResolvedField::Plain { index, .. } | ResolvedField::Composite { index, .. } => {
                    *index
                }
            })
            .fold(ts_max, usize::max);

        Ok(Self {
            timestamp,
            fields,
            max_index,
        })
    }

    fn timestamp(
        &self,
        row: &csv::StringRecord,
        line: usize,
        tz: Tz,
    ) -> Result<DateTime<Tz>, ParseError> {
        let (value, naive) = match &self.timestamp {
            ResolvedTimestamp::Single { index, format } => {
                let value = &row[*index];
                (
                    value.to_string(),
                    NaiveDateTime::parse_from_str(value, format).map_err(|e| e.to_string()),
                )
            }
            ResolvedTimestamp::Split {
                date_index,
                date_format,
                time_index,
                time_format,
            } => {
                let (d, t) = (&row[*date_index], &row[*time_index]);
                let naive = NaiveDate::parse_from_str(d, date_format)
                    .and_then(|date| {
                        NaiveTime::parse_from_str(t, time_format).map(|time| date.and_time(time))
                    })
                    .map_err(|e| e.to_string());
                (format!("{d} {t}"), naive)
            }
        };

        let naive = naive.map_err(|reason| ParseError::BadTimestamp {
            line,
            value: value.clone(),
            reason,
        })?;

        tz.from_local_datetime(&naive)
            .earliest()
            .ok_or_else(|| ParseError::BadTimestamp {
                line,
                value,
                reason: format!("local time does not exist in {}", tz.name()),
            })
    }
}

// ── Typed records ───────────────────────────────────────────────────

/// One AOD sample, value still textual.
#[derive(Debug, Clone, PartialEq)]
pub struct AodRecord {
    pub timestamp: DateTime<Tz>,
    pub aod: String,
}

/// One ISD report. A sub-field is `None` when the source left it blank or its
/// quality flag was not the valid code.
#[derive(Debug, Clone, PartialEq)]
pub struct MetRecord {
    pub timestamp: DateTime<Tz>,
    pub wind_direction: Option<String>,
    pub wind_speed: Option<String>,
    pub temperature: Option<String>,
}

/// Common interface for format-specific parsers.
pub trait RecordParser {
    type Record;

    fn layout(&self) -> &CsvLayout;

    fn parse(&self, bytes: &[u8]) -> Result<Vec<Self::Record>, ParseError>;
}

fn into_aod_records(rows: Vec<RawRecord>) -> Vec<AodRecord> {
    rows.into_iter()
        .map(|mut r| AodRecord {
            timestamp: r.timestamp,
            aod: r.fields.remove(FIELD_AOD).unwrap_or_default(),
        })
        .collect()
}

/// AERONET `.lev15` / `.lev20` parser for one wavelength.
#[derive(Debug, Clone)]
pub struct AeronetParser {
    layout: CsvLayout,
    wavelength_nm: u32,
}

impl AeronetParser {
    pub fn new(wavelength_nm: u32) -> Self {
        Self {
            layout: CsvLayout::aeronet(wavelength_nm),
            wavelength_nm,
        }
    }

    pub fn with_layout(layout: CsvLayout, wavelength_nm: u32) -> Self {
        Self {
            layout,
            wavelength_nm,
        }
    }

    pub fn quantity(&self) -> Quantity {
        Quantity::Aod {
            wavelength_nm: self.wavelength_nm,
        }
    }
}

impl RecordParser for AeronetParser {
    type Record = AodRecord;

    fn layout(&self) -> &CsvLayout {
        &self.layout
    }

    fn parse(&self, bytes: &[u8]) -> Result<Vec<AodRecord>, ParseError> {
        parse_table(bytes, &self.layout).map(into_aod_records)
    }
}

/// Flat `Date`,`AOD` CSV parser. The wavelength is nominal; the file does not carry it.
#[derive(Debug, Clone)]
pub struct FlatAodParser {
    layout: CsvLayout,
    wavelength_nm: u32,
}

impl FlatAodParser {
    pub fn new(timestamp_format: Option<&str>, wavelength_nm: u32) -> Self {
        Self {
            layout: CsvLayout::flat_aod(timestamp_format.unwrap_or(FLAT_TIMESTAMP_FORMAT)),
            wavelength_nm,
        }
    }

    pub fn with_layout(layout: CsvLayout, wavelength_nm: u32) -> Self {
        Self {
            layout,
            wavelength_nm,
        }
    }

    pub fn quantity(&self) -> Quantity {
        Quantity::Aod {
            wavelength_nm: self.wavelength_nm,
        }
    }
}

impl RecordParser for FlatAodParser {
    type Record = AodRecord;

    fn layout(&self) -> &CsvLayout {
        &self.layout
    }

    fn parse(&self, bytes: &[u8]) -> Result<Vec<AodRecord>, ParseError> {
        parse_table(bytes, &self.layout).map(into_aod_records)
    }
}

/// NOAA ISD global-hourly parser (`WND` and `TMP` composites).
#[derive(Debug, Clone)]
pub struct IsdParser {
    layout: CsvLayout,
}

impl IsdParser {
    pub fn new() -> Self {
        Self {
            layout: CsvLayout::isd(),
        }
    }

    pub fn with_layout(layout: CsvLayout) -> Self {
        Self { layout }
    }
}

impl Default for IsdParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordParser for IsdParser {
    type Record = MetRecord;

    fn layout(&self) -> &CsvLayout {
        &self.layout
    }

    fn parse(&self, bytes: &[u8]) -> Result<Vec<MetRecord>, ParseError> {
        let rows = parse_table(bytes, &self.layout)?;
        Ok(rows
            .into_iter()
            .map(|mut r| MetRecord {
                timestamp: r.timestamp,
                wind_direction: r.fields.remove(FIELD_WIND_DIRECTION),
                wind_speed: r.fields.remove(FIELD_WIND_SPEED),
                temperature: r.fields.remove(FIELD_TEMPERATURE),
            })
            .collect())
    }
}
