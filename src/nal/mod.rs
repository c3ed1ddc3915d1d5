mod cache;
mod scanner;

pub use cache::ParameterSetCache;
pub use scanner::{NalScanner, NalUnit, NalUnitType, START_CODE};
