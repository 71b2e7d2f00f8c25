use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (proposals + responses)");
        conn.execute_batch(
            "
            CREATE TABLE proposals (
                id              TEXT PRIMARY KEY,
                partner_name    TEXT NOT NULL,
                proposer_name   TEXT NOT NULL,
                message         TEXT NOT NULL,
                our_story       TEXT NOT NULL DEFAULT '[]',
                status          TEXT NOT NULL DEFAULT 'pending',
                response        TEXT,
                created_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE responses (
                seq             INTEGER PRIMARY KEY AUTOINCREMENT,
                id              TEXT NOT NULL UNIQUE,
                proposal_id     TEXT NOT NULL REFERENCES proposals(id),
                response        TEXT NOT NULL,
                message         TEXT NOT NULL DEFAULT '',
                responded_at    TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_responses_proposal
                ON responses(proposal_id, seq);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
