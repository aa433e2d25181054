use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::types::ToSql;
use rusqlite::{params, OptionalExtension};

use super::connection::Database;
use crate::errors::{ContactGraphError, Result};
use crate::types::*;

/// Column list shared by every query that materializes a `Contact`.
const CONTACT_COLUMNS: &str = "id, phone_number, email, linked_id, link_precedence,
                               created_at, updated_at, deleted_at";

/// Returns the current UNIX timestamp in milliseconds.
fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Maps a row from the `contacts` table to a `Contact`.
fn row_to_contact(row: &rusqlite::Row) -> rusqlite::Result<Contact> {
    let precedence_idx = row.as_ref().column_index("link_precedence")?;
    let precedence: String = row.get(precedence_idx)?;

    Ok(Contact {
        id: row.get("id")?,
        phone_number: row.get("phone_number")?,
        email: row.get("email")?,
        linked_id: row.get("linked_id")?,
        link_precedence: LinkPrecedence::from_str(&precedence).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                precedence_idx,
                rusqlite::types::Type::Text,
                format!("unknown link precedence '{precedence}'").into(),
            )
        })?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        deleted_at: row.get("deleted_at")?,
    })
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

impl Database {
    /// Runs a `SELECT` over `contacts` and collects every row, tagging
    /// failures with `operation`.
    fn query_contacts(
        &self,
        sql: &str,
        params: &[&dyn ToSql],
        operation: &str,
    ) -> Result<Vec<Contact>> {
        let mut stmt = self.conn().prepare(sql).map_err(|e| ContactGraphError::Database {
            message: format!("failed to prepare query: {e}"),
            operation: operation.to_string(),
        })?;

        let rows = stmt
            .query_map(params, row_to_contact)
            .map_err(|e| ContactGraphError::Database {
                message: format!("failed to query contacts: {e}"),
                operation: operation.to_string(),
            })?;

        let mut contacts = Vec::new();
        for row in rows {
            contacts.push(row.map_err(|e| ContactGraphError::Database {
                message: format!("failed to read contact row: {e}"),
                operation: operation.to_string(),
            })?);
        }
        Ok(contacts)
    }

    /// Returns live contacts whose email equals `email` or whose phone
    /// number equals `phone_number`, oldest first.
    ///
    /// An absent side is left out of the filter; with both absent the
    /// result is empty.
    pub fn find_matching_contacts(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> Result<Vec<Contact>> {
        let mut conditions = Vec::new();
        let mut values: Vec<&dyn ToSql> = Vec::new();

        if let Some(email) = &email {
            values.push(email);
            conditions.push(format!("email = ?{}", values.len()));
        }
        if let Some(phone_number) = &phone_number {
            values.push(phone_number);
            conditions.push(format!("phone_number = ?{}", values.len()));
        }

        if conditions.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts
             WHERE deleted_at IS NULL AND ({})
             ORDER BY created_at ASC, id ASC",
            conditions.join(" OR ")
        );

        self.query_contacts(&sql, &values, "find_matching_contacts")
    }

    /// Returns every live contact that is one of `primary_ids` or is linked
    /// to one of them, oldest first.
    pub fn find_cluster(&self, primary_ids: &[i64]) -> Result<Vec<Contact>> {
        if primary_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders: Vec<String> = (1..=primary_ids.len()).map(|i| format!("?{i}")).collect();
        let list = placeholders.join(", ");
        let sql = format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts
             WHERE deleted_at IS NULL AND (id IN ({list}) OR linked_id IN ({list}))
             ORDER BY created_at ASC, id ASC"
        );

        let values: Vec<&dyn ToSql> = primary_ids.iter().map(|id| id as &dyn ToSql).collect();
        self.query_contacts(&sql, &values, "find_cluster")
    }

    /// Retrieves a live contact by id, returning `None` if it does not
    /// exist or has been soft-deleted.
    pub fn get_contact_by_id(&self, id: i64) -> Result<Option<Contact>> {
        self.conn()
            .query_row(
                &format!(
                    "SELECT {CONTACT_COLUMNS} FROM contacts
                     WHERE id = ?1 AND deleted_at IS NULL"
                ),
                params![id],
                row_to_contact,
            )
            .optional()
            .map_err(|e| ContactGraphError::Database {
                message: format!("failed to get contact by id: {e}"),
                operation: "get_contact_by_id".to_string(),
            })
    }

    /// Returns every live contact, oldest first.
    pub fn get_all_contacts(&self) -> Result<Vec<Contact>> {
        let sql = format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts
             WHERE deleted_at IS NULL
             ORDER BY created_at ASC, id ASC"
        );
        self.query_contacts(&sql, &[], "get_all_contacts")
    }
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

impl Database {
    /// Inserts a contact and returns the stored row.
    ///
    /// `created_at` is never lower than the newest existing row, so a clock
    /// step backwards cannot make a new contact look older than its cluster.
    pub fn insert_contact(&self, contact: &NewContact) -> Result<Contact> {
        let now = now_ms();
        self.conn()
            .execute(
                "INSERT INTO contacts
                    (phone_number, email, linked_id, link_precedence, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4,
                         MAX(?5, COALESCE((SELECT MAX(created_at) FROM contacts), 0)),
                         ?5)",
                params![
                    contact.phone_number,
                    contact.email,
                    contact.linked_id,
                    contact.link_precedence.as_str(),
                    now,
                ],
            )
            .map_err(|e| ContactGraphError::Database {
                message: format!("failed to insert contact: {e}"),
                operation: "insert_contact".to_string(),
            })?;

        let id = self.conn().last_insert_rowid();
        self.get_contact_by_id(id)?
            .ok_or(ContactGraphError::NotFound { id })
    }

    /// Turns contact `id` into a secondary of `primary_id`.
    ///
    /// Returns the number of rows changed (0 if `id` is absent or deleted).
    pub fn demote_contact(&self, id: i64, primary_id: i64) -> Result<usize> {
        self.conn()
            .execute(
                "UPDATE contacts
                 SET link_precedence = 'secondary', linked_id = ?2, updated_at = ?3
                 WHERE id = ?1 AND deleted_at IS NULL",
                params![id, primary_id, now_ms()],
            )
            .map_err(|e| ContactGraphError::Database {
                message: format!("failed to demote contact: {e}"),
                operation: "demote_contact".to_string(),
            })
    }

    /// Re-points every contact linked to `from_id` at `to_id`.
    ///
    /// Soft-deleted rows are re-pointed too, so no row anywhere keeps a link
    /// to a non-primary. Returns the number of rows changed.
    pub fn relink_contacts(&self, from_id: i64, to_id: i64) -> Result<usize> {
        self.conn()
            .execute(
                "UPDATE contacts SET linked_id = ?2, updated_at = ?3 WHERE linked_id = ?1",
                params![from_id, to_id, now_ms()],
            )
            .map_err(|e| ContactGraphError::Database {
                message: format!("failed to relink contacts: {e}"),
                operation: "relink_contacts".to_string(),
            })
    }

    /// Soft-deletes a contact by setting `deleted_at`.
    ///
    /// A primary that still has live secondaries is refused: deleting it
    /// would leave its cluster without a primary. The check and the update
    /// share one immediate transaction, so no secondary can be linked to
    /// the contact in between.
    pub fn soft_delete_contact(&self, id: i64) -> Result<()> {
        let tx = self.begin_immediate()?;

        let contact = self
            .get_contact_by_id(id)?
            .ok_or(ContactGraphError::NotFound { id })?;

        if contact.is_primary() {
            let dependents: i64 = self
                .conn()
                .query_row(
                    "SELECT COUNT(*) FROM contacts WHERE linked_id = ?1 AND deleted_at IS NULL",
                    params![id],
                    |row| row.get(0),
                )
                .map_err(|e| ContactGraphError::Database {
                    message: format!("failed to count linked contacts: {e}"),
                    operation: "soft_delete_contact".to_string(),
                })?;
            if dependents > 0 {
                return Err(ContactGraphError::validation(format!(
                    "contact {id} is the primary of {dependents} linked contact(s)"
                )));
            }
        }

        self.conn()
            .execute(
                "UPDATE contacts SET deleted_at = ?2, updated_at = ?2 WHERE id = ?1",
                params![id, now_ms()],
            )
            .map_err(|e| ContactGraphError::Database {
                message: format!("failed to delete contact: {e}"),
                operation: "soft_delete_contact".to_string(),
            })?;

        tx.commit().map_err(|e| ContactGraphError::Database {
            message: format!("failed to commit delete: {e}"),
            operation: "soft_delete_contact".to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

impl Database {
    /// Returns aggregate counts over the contact table.
    pub fn get_stats(&self) -> Result<GraphStats> {
        let (contact_count, primary_count, deleted_count): (i64, i64, i64) = self
            .conn()
            .query_row(
                "SELECT
                    COALESCE(SUM(deleted_at IS NULL), 0),
                    COALESCE(SUM(deleted_at IS NULL AND link_precedence = 'primary'), 0),
                    COALESCE(SUM(deleted_at IS NOT NULL), 0)
                 FROM contacts",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(|e| ContactGraphError::Database {
                message: format!("failed to count contacts: {e}"),
                operation: "get_stats".to_string(),
            })?;

        Ok(GraphStats {
            contact_count: contact_count as u64,
            primary_count: primary_count as u64,
            secondary_count: (contact_count - primary_count) as u64,
            deleted_count: deleted_count as u64,
            db_size_bytes: self.size()?,
        })
    }
}
