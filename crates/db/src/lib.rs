pub mod connection;
pub mod history_store;
pub mod migrations;
pub mod repositories;
pub mod warehouse;

pub use connection::{connect, connect_warehouse, connect_with_settings, DbPool, WarehousePool};
pub use history_store::HistoryStore;
pub use repositories::{
    HistoryRepository, InMemoryHistoryRepository, RepositoryError, SqlHistoryRepository,
};
pub use warehouse::{MySqlQueryExecutor, QueryError, QueryExecutor};
