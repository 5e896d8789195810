//! State adapters and their registry.

mod bw;
mod ni;
mod nw;
mod rp;
mod sheet;

pub use bw::BwAdapter;
pub use ni::NiAdapter;
pub use nw::NwAdapter;
pub use rp::RpAdapter;
pub use sheet::SheetCsvAdapter;

use crate::StateAdapter;
use landtiles_core::StateCode;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Adapters keyed by state code.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<StateCode, Arc<dyn StateAdapter>>,
}

impl AdapterRegistry {
    /// Registry without adapters.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with every built-in adapter.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(SheetCsvAdapter::new(StateCode::Bb)));
        registry.register(Arc::new(SheetCsvAdapter::new(StateCode::Be)));
        registry.register(Arc::new(NwAdapter));
        registry.register(Arc::new(BwAdapter));
        registry.register(Arc::new(RpAdapter));
        registry.register(Arc::new(NiAdapter));
        registry
    }

    /// Add or replace the adapter of `adapter.state()`.
    pub fn register(&mut self, adapter: Arc<dyn StateAdapter>) {
        self.adapters.insert(adapter.state(), adapter);
    }

    /// Adapter of `state`.
    pub fn get(&self, state: StateCode) -> Option<Arc<dyn StateAdapter>> {
        self.adapters.get(&state).cloned()
    }

    /// States with an adapter.
    pub fn states(&self) -> impl Iterator<Item = StateCode> + '_ {
        self.adapters.keys().copied()
    }
}

/// A delimited text table with a header row.
///
/// The states' CSV listings are plain semicolon files without embedded
/// delimiters; fields are trimmed and stripped of surrounding quotes.
pub(crate) struct DelimitedTable<'a> {
    header: Vec<&'a str>,
    /// `(line number, fields)` of each non-empty data row.
    pub rows: Vec<(usize, Vec<&'a str>)>,
}

impl<'a> DelimitedTable<'a> {
    /// Parse `text`, ignoring `skip` preamble lines before the header.
    pub fn parse(text: &'a str, delimiter: char, skip: usize) -> Option<Self> {
        let mut lines = text
            .lines()
            .enumerate()
            .skip(skip)
            .filter(|(_, l)| !l.trim().is_empty());
        let (_, header) = lines.next()?;
        let header = split_fields(header.trim_start_matches('\u{feff}'), delimiter);
        let rows = lines
            .map(|(idx, line)| (idx + 1, split_fields(line, delimiter)))
            .collect();
        Some(Self { header, rows })
    }

    /// Index of the first column named like any of `names` (case-insensitive).
    pub fn column(&self, names: &[&str]) -> Option<usize> {
        self.header
            .iter()
            .position(|h| names.iter().any(|n| h.eq_ignore_ascii_case(n)))
    }
}

fn split_fields(line: &str, delimiter: char) -> Vec<&str> {
    line.split(delimiter)
        .map(|f| f.trim().trim_matches('"').trim())
        .collect()
}
