pub mod sqlite;

pub use sqlite::{
    run_migrations, DatabaseManager, DbPool, SqliteExcludedDateRepository,
    SqliteExecutionLogRepository, SqliteJobRepository, SqliteStrategyRepository,
};
