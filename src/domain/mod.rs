pub mod instrument;
pub mod position;
pub mod prediction;

pub use instrument::{Instrument, SymbolFilters};
pub use position::Position;
pub use prediction::{PredictionRecord, PredictionTable};
