mod connection;
mod query;
mod schema;
mod store;

pub use connection::*;
pub use query::*;
pub use schema::*;
pub use store::*;
