//! Table and value types shared by every pipeline stage

pub mod table;
pub mod value;

pub use table::{Column, RawTable, TransformedTable};
pub use value::{ColumnType, Value};
