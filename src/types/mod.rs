mod row;

pub use row::{QueryResult, Row};
