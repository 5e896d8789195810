//! Shared identifiers: federal states, data types, tile indices and date ranges.

use crate::CoreError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// German federal state, identified by its two-letter code.
///
/// Deserializes from the code (`"NW"`) or the German state name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StateCode {
    /// Baden-Württemberg
    #[serde(alias = "Baden-Württemberg")]
    Bw,
    /// Bayern
    #[serde(alias = "Bayern")]
    By,
    /// Berlin
    #[serde(alias = "Berlin")]
    Be,
    /// Brandenburg
    #[serde(alias = "Brandenburg")]
    Bb,
    /// Bremen
    #[serde(alias = "Bremen")]
    Hb,
    /// Hamburg
    #[serde(alias = "Hamburg")]
    Hh,
    /// Hessen
    #[serde(alias = "Hessen")]
    He,
    /// Mecklenburg-Vorpommern
    #[serde(alias = "Mecklenburg-Vorpommern")]
    Mv,
    /// Niedersachsen
    #[serde(alias = "Niedersachsen")]
    Ni,
    /// Nordrhein-Westfalen
    #[serde(alias = "Nordrhein-Westfalen")]
    Nw,
    /// Rheinland-Pfalz
    #[serde(alias = "Rheinland-Pfalz")]
    Rp,
    /// Saarland
    #[serde(alias = "Saarland")]
    Sl,
    /// Sachsen
    #[serde(alias = "Sachsen")]
    Sn,
    /// Sachsen-Anhalt
    #[serde(alias = "Sachsen-Anhalt")]
    St,
    /// Schleswig-Holstein
    #[serde(alias = "Schleswig-Holstein")]
    Sh,
    /// Thüringen
    #[serde(alias = "Thüringen")]
    Th,
}

impl StateCode {
    /// All sixteen states.
    pub const ALL: [StateCode; 16] = [
        StateCode::Bw,
        StateCode::By,
        StateCode::Be,
        StateCode::Bb,
        StateCode::Hb,
        StateCode::Hh,
        StateCode::He,
        StateCode::Mv,
        StateCode::Ni,
        StateCode::Nw,
        StateCode::Rp,
        StateCode::Sl,
        StateCode::Sn,
        StateCode::St,
        StateCode::Sh,
        StateCode::Th,
    ];

    /// Upper-case two-letter code.
    pub const fn code(&self) -> &'static str {
        match self {
            StateCode::Bw => "BW",
            StateCode::By => "BY",
            StateCode::Be => "BE",
            StateCode::Bb => "BB",
            StateCode::Hb => "HB",
            StateCode::Hh => "HH",
            StateCode::He => "HE",
            StateCode::Mv => "MV",
            StateCode::Ni => "NI",
            StateCode::Nw => "NW",
            StateCode::Rp => "RP",
            StateCode::Sl => "SL",
            StateCode::Sn => "SN",
            StateCode::St => "ST",
            StateCode::Sh => "SH",
            StateCode::Th => "TH",
        }
    }

    /// German state name as used in the BKG administrative boundaries (`GEN`).
    pub const fn name(&self) -> &'static str {
        match self {
            StateCode::Bw => "Baden-Württemberg",
            StateCode::By => "Bayern",
            StateCode::Be => "Berlin",
            StateCode::Bb => "Brandenburg",
            StateCode::Hb => "Bremen",
            StateCode::Hh => "Hamburg",
            StateCode::He => "Hessen",
            StateCode::Mv => "Mecklenburg-Vorpommern",
            StateCode::Ni => "Niedersachsen",
            StateCode::Nw => "Nordrhein-Westfalen",
            StateCode::Rp => "Rheinland-Pfalz",
            StateCode::Sl => "Saarland",
            StateCode::Sn => "Sachsen",
            StateCode::St => "Sachsen-Anhalt",
            StateCode::Sh => "Schleswig-Holstein",
            StateCode::Th => "Thüringen",
        }
    }

    /// Lower-case code, used for directory names.
    pub fn dir_name(&self) -> String {
        self.code().to_ascii_lowercase()
    }

    /// UTM zone of the state's official tiling.
    ///
    /// The eastern states tile in ETRS89 / UTM zone 33, everybody else in zone 32.
    pub const fn default_utm_zone(&self) -> u8 {
        match self {
            StateCode::Bb | StateCode::Be | StateCode::Mv | StateCode::Sn => 33,
            _ => 32,
        }
    }

    /// Look up a state by its German name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        StateCode::ALL
            .into_iter()
            .find(|s| s.name().to_lowercase() == name)
    }
}

impl fmt::Display for StateCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for StateCode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        StateCode::ALL
            .into_iter()
            .find(|state| state.code().eq_ignore_ascii_case(trimmed))
            .or_else(|| StateCode::from_name(trimmed))
            .ok_or_else(|| CoreError::UnknownState(s.to_string()))
    }
}

/// Kind of raster product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Digital terrain model.
    #[serde(rename = "DTM")]
    Dtm,
    /// Digital surface model (the states often publish it as image-based iDSM).
    #[serde(rename = "DSM", alias = "iDSM")]
    Dsm,
    /// Digital orthophoto.
    #[serde(rename = "DOP")]
    Dop,
}

impl DataType {
    /// Upper-case label.
    pub const fn label(&self) -> &'static str {
        match self {
            DataType::Dtm => "DTM",
            DataType::Dsm => "DSM",
            DataType::Dop => "DOP",
        }
    }

    /// Lower-case label, used in directory and object names.
    pub fn prefix(&self) -> String {
        self.label().to_ascii_lowercase()
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DataType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DTM" => Ok(DataType::Dtm),
            "DSM" | "IDSM" => Ok(DataType::Dsm),
            "DOP" => Ok(DataType::Dop),
            _ => Err(CoreError::UnknownDataType(s.to_string())),
        }
    }
}

/// Key of one candidate tile across the whole system.
///
/// Ordering is by state, data type, then `(row, col)` so that a sorted list of
/// indices is the reproducible download order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileIndex {
    /// Federal state whose grid the tile belongs to.
    pub state: StateCode,
    /// Product type.
    pub data_type: DataType,
    /// Grid column (eastward).
    pub col: i64,
    /// Grid row (northward).
    pub row: i64,
}

impl TileIndex {
    /// Create a new tile index.
    pub fn new(state: StateCode, data_type: DataType, col: i64, row: i64) -> Self {
        Self {
            state,
            data_type,
            col,
            row,
        }
    }
}

impl Ord for TileIndex {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.state, self.data_type, self.row, self.col).cmp(&(
            other.state,
            other.data_type,
            other.row,
            other.col,
        ))
    }
}

impl PartialOrd for TileIndex {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TileIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}:{}", self.state, self.data_type, self.col, self.row)
    }
}

/// Inclusive date window; either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// First accepted date.
    #[serde(default)]
    pub begin: Option<NaiveDate>,
    /// Last accepted date.
    #[serde(default)]
    pub end: Option<NaiveDate>,
}

impl DateRange {
    /// Create a range from optional bounds.
    pub fn new(begin: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { begin, end }
    }

    /// Whether `date` lies within the range, bounds included.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.begin.map_or(true, |b| date >= b) && self.end.map_or(true, |e| date <= e)
    }

    /// Whether both bounds are open.
    pub fn is_unbounded(&self) -> bool {
        self.begin.is_none() && self.end.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_code_parsing() {
        assert_eq!("nw".parse::<StateCode>().unwrap(), StateCode::Nw);
        assert_eq!("BB".parse::<StateCode>().unwrap(), StateCode::Bb);
        assert_eq!("Thüringen".parse::<StateCode>().unwrap(), StateCode::Th);
        assert!("XX".parse::<StateCode>().is_err());
    }

    #[test]
    fn test_state_serde_uses_codes() {
        let json = serde_json::to_string(&StateCode::Rp).unwrap();
        assert_eq!(json, "\"RP\"");
        let parsed: StateCode = serde_json::from_str("\"SH\"").unwrap();
        assert_eq!(parsed, StateCode::Sh);
        let by_name: StateCode = serde_json::from_str("\"Nordrhein-Westfalen\"").unwrap();
        assert_eq!(by_name, StateCode::Nw);
    }

    #[test]
    fn test_data_type_alias() {
        let parsed: DataType = serde_json::from_str("\"iDSM\"").unwrap();
        assert_eq!(parsed, DataType::Dsm);
        assert_eq!("idsm".parse::<DataType>().unwrap(), DataType::Dsm);
        assert_eq!(DataType::Dop.prefix(), "dop");
    }

    #[test]
    fn test_tile_index_orders_by_row_then_col() {
        let a = TileIndex::new(StateCode::Nw, DataType::Dtm, 5, 0);
        let b = TileIndex::new(StateCode::Nw, DataType::Dtm, 0, 1);
        let c = TileIndex::new(StateCode::Nw, DataType::Dtm, 1, 1);
        let mut tiles = vec![c, b, a];
        tiles.sort();
        assert_eq!(tiles, vec![a, b, c]);
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let d = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        let range = DateRange::new(Some(d("2020-01-01")), Some(d("2020-12-31")));
        assert!(range.contains(d("2020-01-01")));
        assert!(range.contains(d("2020-12-31")));
        assert!(!range.contains(d("2019-12-31")));
        assert!(!range.contains(d("2021-01-01")));

        let open_end = DateRange::new(Some(d("2020-01-01")), None);
        assert!(open_end.contains(d("2030-01-01")));
        assert!(DateRange::default().is_unbounded());
    }
}
