mod driver;

pub use driver::{DatabaseDriver, InsertMethod, TransactionOp};
