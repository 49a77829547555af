// src/lib.rs

pub mod filter;
pub mod models;
pub mod overview;
pub mod table;

pub use filter::select;
pub use models::{
    Candidate, Exclusion, ExclusionReason, FilterCriteria, FundamentalsRecord, Regime,
    ScreenerError, SectorPolicy, Selection, DEFAULT_SECTOR_TABLE,
};
