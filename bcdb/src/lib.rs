pub mod config;
pub mod database;
pub mod error;
pub mod row;
pub mod schema;
pub mod table;
pub mod validation;

pub use config::Config;
pub use database::Database;
pub use error::{BcdbError, Result};
pub use row::{Row, Value};
pub use schema::{Column, Constraint, DataType};
pub use table::Table;
