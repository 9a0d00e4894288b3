mod query;
mod row;

pub use query::{ComQuery, QueryAttribute};
pub use row::TextRow;
