pub mod migrations;
pub mod repo;

pub use migrations::{init_db, DbPools};
pub use repo::Repository;
