use rusqlite::Connection;

pub mod tables {
    pub const TRACKS: &str = "tracks";

    pub const ALL_TABLES: &[&str] = &[TRACKS];
}

pub mod columns {
    pub const ID: &str = "id";
    pub const TITLE: &str = "title";
}

pub use columns::*;
pub use tables::*;

// AUTOINCREMENT keeps ids of deleted rows from being handed out again
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tracks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL
);
"#;

pub fn init(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA)
}
