use chrono::Utc;
use tokio_rusqlite::{params, Connection, OptionalExtension, Result};

use crate::contact::ContactSubmission;

pub async fn init_db(db_path: &str) -> Result<Connection> {
    let conn = Connection::open(db_path).await?;
    create_schema(&conn).await?;
    Ok(conn)
}

async fn create_schema(conn: &Connection) -> Result<()> {
    conn.call(|conn| {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS contacts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                email TEXT NOT NULL,
                message TEXT NOT NULL,
                created_at TEXT NOT NULL
                )",
            [],
        )?;
        Ok(())
    })
    .await
}

/// Contact submissions, stored one row per accepted request.
#[derive(Clone)]
pub struct ContactStore {
    conn: Connection,
}

impl ContactStore {
    pub async fn open(db_path: &str) -> Result<Self> {
        Ok(Self {
            conn: init_db(db_path).await?,
        })
    }

    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        create_schema(&conn).await?;
        Ok(Self { conn })
    }

    pub async fn insert(&self, contact: &ContactSubmission) -> Result<i64> {
        let contact = contact.clone();
        let created_at = Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "INSERT INTO contacts (name, email, message, created_at) VALUES (?, ?, ?, ?);",
                )?;
                stmt.execute(params![
                    contact.name,
                    contact.email,
                    contact.message,
                    created_at
                ])?;
                Ok(conn.last_insert_rowid())
            })
            .await
    }

    pub async fn get(&self, id: i64) -> Result<Option<ContactSubmission>> {
        self.conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT name, email, message FROM contacts WHERE id = ?")?;
                let contact = stmt
                    .query_row(params![id], |row| {
                        Ok(ContactSubmission {
                            name: row.get(0)?,
                            email: row.get(1)?,
                            message: row.get(2)?,
                        })
                    })
                    .optional()?;
                Ok(contact)
            })
            .await
    }

    pub async fn count(&self) -> Result<i64> {
        self.conn
            .call(|conn| {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM contacts", [], |row| row.get(0))?;
                Ok(count)
            })
            .await
    }

    pub async fn close(self) -> Result<()> {
        self.conn.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> ContactSubmission {
        ContactSubmission {
            name: "Ada".into(),
            email: "ada@example.com".into(),
            message: "Hello there, let's talk.".into(),
        }
    }

    #[tokio::test]
    async fn insert_assigns_increasing_ids() {
        let store = ContactStore::open_in_memory().await.unwrap();

        let first = store.insert(&sample()).await.unwrap();
        let second = store.insert(&sample()).await.unwrap();

        assert!(second > first);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn stored_contact_round_trips() {
        let store = ContactStore::open_in_memory().await.unwrap();

        let id = store.insert(&sample()).await.unwrap();

        assert_eq!(store.get(id).await.unwrap(), Some(sample()));
        assert_eq!(store.get(id + 100).await.unwrap(), None);
    }
}
