pub mod normalize;
pub mod row;

pub use normalize::{NormalizedResult, RecordsetShape, normalize};
pub use row::{CustomDbRow, Recordset};
