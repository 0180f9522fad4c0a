use super::schema::SCHEMA;
use rusqlite::{Connection, Result};

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    seed_default_config(conn)?;
    Ok(())
}

/// Insert the single config row with column defaults, once.
fn seed_default_config(conn: &Connection) -> Result<()> {
    let count: i32 = conn.query_row("SELECT COUNT(*) FROM security_config", [], |row| {
        row.get(0)
    })?;

    if count == 0 {
        conn.execute("INSERT INTO security_config (id) VALUES (1)", [])?;
    }
    Ok(())
}
