//! Raw bar source port.

use crate::domain::error::EngineError;
use crate::domain::ohlcv::Bar;

/// Loads the finest-granularity bars stored for a symbol. Aggregation and
/// cutoff filtering happen in the domain, not here.
pub trait BarProvider: Send + Sync {
    fn load_raw(&self, symbol: &str) -> Result<Vec<Bar>, EngineError>;
}
