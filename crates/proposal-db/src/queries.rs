use crate::Database;
use crate::models::{NewProposal, ProposalRow, ResponseRow};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};

impl Database {
    // -- Proposals --

    pub fn insert_proposal(&self, proposal: &NewProposal<'_>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO proposals (id, partner_name, proposer_name, message, our_story)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    proposal.id,
                    proposal.partner_name,
                    proposal.proposer_name,
                    proposal.message,
                    proposal.our_story,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_proposal(&self, id: &str) -> Result<Option<ProposalRow>> {
        self.with_conn(|conn| query_proposal(conn, id))
    }

    // -- Responses --

    /// Store a response and mark the proposal as responded, atomically.
    /// Returns `false` (and writes nothing) when the proposal doesn't exist.
    /// Repeated responses are all kept; the proposal reflects the latest.
    pub fn record_response(
        &self,
        id: &str,
        proposal_id: &str,
        response: &str,
        message: &str,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let exists = tx
                .query_row("SELECT 1 FROM proposals WHERE id = ?1", [proposal_id], |_| Ok(()))
                .optional()?
                .is_some();
            if !exists {
                return Ok(false);
            }

            tx.execute(
                "INSERT INTO responses (id, proposal_id, response, message) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, proposal_id, response, message],
            )?;
            tx.execute(
                "UPDATE proposals SET status = 'responded', response = ?2 WHERE id = ?1",
                rusqlite::params![proposal_id, response],
            )?;

            tx.commit()?;
            Ok(true)
        })
    }

    pub fn latest_response(&self, proposal_id: &str) -> Result<Option<ResponseRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, proposal_id, response, message, responded_at
                     FROM responses
                     WHERE proposal_id = ?1
                     ORDER BY seq DESC
                     LIMIT 1",
                    [proposal_id],
                    |row| {
                        Ok(ResponseRow {
                            id: row.get(0)?,
                            proposal_id: row.get(1)?,
                            response: row.get(2)?,
                            message: row.get(3)?,
                            responded_at: row.get(4)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }
}

fn query_proposal(conn: &Connection, id: &str) -> Result<Option<ProposalRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, partner_name, proposer_name, message, our_story, status, response, created_at
         FROM proposals WHERE id = ?1",
    )?;

    let row = stmt
        .query_row([id], |row| {
            Ok(ProposalRow {
                id: row.get(0)?,
                partner_name: row.get(1)?,
                proposer_name: row.get(2)?,
                message: row.get(3)?,
                our_story: row.get(4)?,
                status: row.get(5)?,
                response: row.get(6)?,
                created_at: row.get(7)?,
            })
        })
        .optional()?;

    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(db: &Database, id: &str) {
        db.insert_proposal(&NewProposal {
            id,
            partner_name: "Maryam",
            proposer_name: "Barzan",
            message: "Will you give me a chance?",
            our_story: r#"[{"date":"First Sight","description":"Time stood still."}]"#,
        })
        .unwrap();
    }

    #[test]
    fn insert_then_get_proposal() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, "p1");

        let row = db.get_proposal("p1").unwrap().expect("proposal stored");
        assert_eq!(row.partner_name, "Maryam");
        assert_eq!(row.status, "pending");
        assert!(row.response.is_none());
        assert!(row.our_story.contains("First Sight"));
        assert!(!row.created_at.is_empty());

        assert!(db.get_proposal("missing").unwrap().is_none());
    }

    #[test]
    fn duplicate_proposal_id_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, "p1");
        let again = db.insert_proposal(&NewProposal {
            id: "p1",
            partner_name: "x",
            proposer_name: "y",
            message: "z",
            our_story: "[]",
        });
        assert!(again.is_err());
    }

    #[test]
    fn response_to_unknown_proposal_writes_nothing() {
        let db = Database::open_in_memory().unwrap();
        let recorded = db.record_response("r1", "ghost", "yes", "").unwrap();
        assert!(!recorded);
        assert!(db.latest_response("ghost").unwrap().is_none());
    }

    #[test]
    fn response_marks_proposal_responded() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, "p1");

        assert!(db.record_response("r1", "p1", "yes", "Yes!").unwrap());

        let row = db.get_proposal("p1").unwrap().unwrap();
        assert_eq!(row.status, "responded");
        assert_eq!(row.response.as_deref(), Some("yes"));

        let response = db.latest_response("p1").unwrap().unwrap();
        assert_eq!(response.id, "r1");
        assert_eq!(response.proposal_id, "p1");
        assert_eq!(response.message, "Yes!");
    }

    #[test]
    fn latest_response_wins() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, "p1");

        db.record_response("r1", "p1", "no", "Need time").unwrap();
        db.record_response("r2", "p1", "yes", "Yes!").unwrap();

        let row = db.get_proposal("p1").unwrap().unwrap();
        assert_eq!(row.response.as_deref(), Some("yes"));
        assert_eq!(db.latest_response("p1").unwrap().unwrap().id, "r2");
    }

    #[test]
    fn migrations_are_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| crate::migrations::run(conn)).unwrap();
        seed(&db, "p1");
        assert!(db.get_proposal("p1").unwrap().is_some());
    }
}
