//! Contact rows. Every write follows the same merge rule: a non-empty
//! incoming field overwrites, an empty one never erases.

use rusqlite::{params, Connection, OptionalExtension};

use crate::database::{now_millis, Database};
use crate::error::{Result, StoreError};
use crate::models::Contact;

const UPSERT_CONTACT_SQL: &str = "
    INSERT INTO contacts (jid, name, push_name, updated_at)
    VALUES (?1, ?2, ?3, ?4)
    ON CONFLICT(jid) DO UPDATE SET
        name = CASE WHEN excluded.name <> '' THEN excluded.name ELSE contacts.name END,
        push_name = CASE WHEN excluded.push_name <> '' THEN excluded.push_name ELSE contacts.push_name END,
        updated_at = excluded.updated_at";

impl Database {
    pub fn upsert_contact(&self, contact: &Contact) -> Result<()> {
        upsert_contact_in(self.conn(), contact)
    }

    /// Merge many contacts in one transaction. Contacts with an empty
    /// identifier are skipped. Returns the number written.
    pub fn upsert_contacts(&mut self, contacts: &[Contact]) -> Result<usize> {
        let tx = self.conn_mut().transaction()?;
        let mut written = 0;
        for contact in contacts.iter().filter(|c| !c.jid.is_empty()) {
            upsert_contact_in(&tx, contact)?;
            written += 1;
        }
        tx.commit()?;
        Ok(written)
    }

    pub fn get_contact(&self, jid: &str) -> Result<Contact> {
        self.conn()
            .query_row(
                "SELECT jid, name, push_name FROM contacts WHERE jid = ?1",
                params![jid],
                |row| {
                    Ok(Contact {
                        jid: row.get(0)?,
                        name: row.get(1)?,
                        push_name: row.get(2)?,
                    })
                },
            )
            .optional()?
            .ok_or(StoreError::NotFound)
    }
}

pub(crate) fn upsert_contact_in(conn: &Connection, contact: &Contact) -> Result<()> {
    conn.execute(
        UPSERT_CONTACT_SQL,
        params![contact.jid, contact.name, contact.push_name, now_millis()],
    )?;
    Ok(())
}
