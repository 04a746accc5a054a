//! Layout descriptors for the supported CSV source families.
//!
//! A layout says how many preamble rows to skip, where the timestamp lives,
//! which columns map to which record fields, and how composite columns split
//! into flagged sub-fields.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Field name for the AOD value in AOD layouts.
pub const FIELD_AOD: &str = "aod";
/// ISD wind direction (degrees clockwise from north, direction wind comes from).
pub const FIELD_WIND_DIRECTION: &str = "wind_direction";
/// ISD wind speed (tenths of m/s).
pub const FIELD_WIND_SPEED: &str = "wind_speed";
/// ISD air temperature (tenths of °C).
pub const FIELD_TEMPERATURE: &str = "temperature";

/// ISD quality code meaning "passed all quality control checks".
pub const ISD_VALID_QUALITY: &str = "1";

/// AERONET files carry six metadata lines before the header row.
pub const AERONET_PREAMBLE_ROWS: usize = 6;

/// Where the timestamp comes from in each row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimestampColumns {
    /// One column holding date and time.
    Single { column: String, format: String },
    /// Separate date and time columns (AERONET style).
    Split {
        date_column: String,
        date_format: String,
        time_column: String,
        time_format: String,
    },
}

/// One sub-measurement packed inside a composite column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubField {
    pub field: String,
    /// Position of the value after splitting.
    pub value_index: usize,
    /// Position of the quality flag, if the source carries one.
    pub flag_index: Option<usize>,
}

/// Column → record field mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldMapping {
    Plain {
        column: String,
        field: String,
    },
    Composite {
        column: String,
        separator: char,
        parts: Vec<SubField>,
    },
}

impl FieldMapping {
    pub fn column(&self) -> &str {
        match self {
            FieldMapping::Plain { column, .. } | FieldMapping::Composite { column, .. } => column,
        }
    }
}

/// Complete description of one CSV source layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvLayout {
    /// Lines dropped before the header row.
    pub skip_rows: usize,
    pub delimiter: u8,
    pub timestamp: TimestampColumns,
    /// Zone the source writes its timestamps in.
    pub timezone: Tz,
    pub fields: Vec<FieldMapping>,
    /// Sub-fields whose flag differs from this code are dropped.
    pub valid_quality: String,
}

impl CsvLayout {
    /// AERONET version 3 `.lev15`/`.lev20` files, one AOD wavelength.
    ///
    /// Timestamps are UTC, split into `Date(dd:mm:yyyy)` and `Time(hh:mm:ss)`.
    pub fn aeronet(wavelength_nm: u32) -> Self {
        Self {
            skip_rows: AERONET_PREAMBLE_ROWS,
            delimiter: b',',
            timestamp: TimestampColumns::Split {
                date_column: "Date(dd:mm:yyyy)".into(),
                date_format: "%d:%m:%Y".into(),
                time_column: "Time(hh:mm:ss)".into(),
                time_format: "%H:%M:%S".into(),
            },
            timezone: Tz::UTC,
            fields: vec![FieldMapping::Plain {
                column: aeronet_aod_column(wavelength_nm),
                field: FIELD_AOD.into(),
            }],
            valid_quality: ISD_VALID_QUALITY.into(),
        }
    }

    /// NOAA ISD global-hourly CSV with composite `WND` and `TMP` columns.
    ///
    /// `WND` = `direction,direction_quality,type,speed,speed_quality`,
    /// `TMP` = `temperature,quality`. Timestamps are UTC.
    pub fn isd() -> Self {
        Self {
            skip_rows: 0,
            delimiter: b',',
            timestamp: TimestampColumns::Single {
                column: "DATE".into(),
                format: "%Y-%m-%dT%H:%M:%S".into(),
            },
            timezone: Tz::UTC,
            fields: vec![
                FieldMapping::Composite {
                    column: "WND".into(),
                    separator: ',',
                    parts: vec![
                        SubField {
                            field: FIELD_WIND_DIRECTION.into(),
                            value_index: 0,
                            flag_index: Some(1),
                        },
                        SubField {
                            field: FIELD_WIND_SPEED.into(),
                            value_index: 3,
                            flag_index: Some(4),
                        },
                    ],
                },
                FieldMapping::Composite {
                    column: "TMP".into(),
                    separator: ',',
                    parts: vec![SubField {
                        field: FIELD_TEMPERATURE.into(),
                        value_index: 0,
                        flag_index: Some(1),
                    }],
                },
            ],
            valid_quality: ISD_VALID_QUALITY.into(),
        }
    }

    /// Flat two-column CSV: `Date`, `AOD`.
    pub fn flat_aod(timestamp_format: &str) -> Self {
        Self {
            skip_rows: 0,
            delimiter: b',',
            timestamp: TimestampColumns::Single {
                column: "Date".into(),
                format: timestamp_format.into(),
            },
            timezone: Tz::UTC,
            fields: vec![FieldMapping::Plain {
                column: "AOD".into(),
                field: FIELD_AOD.into(),
            }],
            valid_quality: ISD_VALID_QUALITY.into(),
        }
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_skip_rows(mut self, skip_rows: usize) -> Self {
        self.skip_rows = skip_rows;
        self
    }

    /// Every column the layout reads, timestamp columns first.
    pub fn required_columns(&self) -> Vec<&str> {
        let mut cols: Vec<&str> = match &self.timestamp {
            TimestampColumns::Single { column, .. } => vec![column],
            TimestampColumns::Split {
                date_column,
                time_column,
                ..
            } => vec![date_column, time_column],
        };
        cols.extend(self.fields.iter().map(|f| f.column()));
        cols
    }
}

/// Default timestamp format for flat AOD files.
pub const FLAT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// AERONET column name for a wavelength, e.g. `AOD_500nm`.
pub fn aeronet_aod_column(wavelength_nm: u32) -> String {
    format!("AOD_{wavelength_nm}nm")
}
