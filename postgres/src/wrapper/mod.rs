pub mod pg_dump;

// Re-export for convenience
pub use pg_dump::{clean_sql, PgDump, PgDumpOptions};
