// gridloom-core/src/domain/mod.rs

pub mod error;
pub mod quality;
pub mod record;
pub mod silver;
pub mod snapshot;
pub mod value;
pub mod warehouse;

pub use record::{CleanedRecord, RawRecord};
pub use snapshot::DatasetSnapshot;
pub use value::{ColumnType, Value};
