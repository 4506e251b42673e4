//! Market history providers and multi-ticker alignment.

pub mod align;
pub mod circuit_breaker;
pub mod csv_dir;
pub mod memory;
pub mod provider;
pub mod yahoo;

pub use align::{align_closes, PricePanel};
pub use circuit_breaker::CircuitBreaker;
pub use csv_dir::CsvDirProvider;
pub use memory::MemoryProvider;
pub use provider::{DailyBar, DataError, HistoryProvider};
pub use yahoo::YahooProvider;
