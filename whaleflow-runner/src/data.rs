//! CSV loading and saving for bars and whale events.
//!
//! Bars: `symbol,timestamp,open,high,low,close,volume`
//! Whales: `symbol,timestamp,usd_value,counterparty_kind,entity_label,direction`
//!
//! Timestamps are RFC 3339. Rows keep file order: nothing is sorted here,
//! so ordering problems surface when the run validates its input.

use std::fs::File;
use std::path::Path;

use thiserror::Error;
use tracing::debug;

use whaleflow_core::domain::{PriceBar, WhaleEvent};
use whaleflow_core::MarketData;

/// Errors from data loading.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot open '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("bad CSV in '{path}': {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("'{path}' contains no rows")]
    Empty { path: String },
}

fn open(path: &Path) -> Result<File, LoadError> {
    File::open(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn read_rows<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(open(path)?);
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        let row: T = record.map_err(|source| LoadError::Csv {
            path: path.display().to_string(),
            source,
        })?;
        rows.push(row);
    }
    Ok(rows)
}

pub fn load_bars_csv(path: &Path) -> Result<Vec<PriceBar>, LoadError> {
    let bars: Vec<PriceBar> = read_rows(path)?;
    if bars.is_empty() {
        return Err(LoadError::Empty {
            path: path.display().to_string(),
        });
    }
    debug!(path = %path.display(), rows = bars.len(), "bars loaded");
    Ok(bars)
}

/// An empty whale file is valid: a market can be quiet.
pub fn load_whales_csv(path: &Path) -> Result<Vec<WhaleEvent>, LoadError> {
    let events: Vec<WhaleEvent> = read_rows(path)?;
    debug!(path = %path.display(), rows = events.len(), "whale events loaded");
    Ok(events)
}

/// Bars plus an optional whale file.
pub fn load_market(bars: &Path, whales: Option<&Path>) -> Result<MarketData, LoadError> {
    let bars = load_bars_csv(bars)?;
    let events = match whales {
        Some(p) => load_whales_csv(p)?,
        None => Vec::new(),
    };
    Ok(MarketData::from_parts(bars, events))
}

fn write_rows<'a, T: serde::Serialize + 'a>(
    path: &Path,
    rows: impl IntoIterator<Item = &'a T>,
) -> Result<(), LoadError> {
    let csv_err = |source| LoadError::Csv {
        path: path.display().to_string(),
        source,
    };
    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    for row in rows {
        writer.serialize(row).map_err(csv_err)?;
    }
    writer.flush().map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Write every bar, symbol by symbol.
pub fn write_bars_csv(path: &Path, data: &MarketData) -> Result<(), LoadError> {
    write_rows(path, data.bars.values().flatten())
}

pub fn write_whales_csv(path: &Path, events: &[WhaleEvent]) -> Result<(), LoadError> {
    write_rows(path, events)
}
