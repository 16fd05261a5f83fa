use crate::models::{FileRow, MessageRow, ReactionRow, ReadRow, UserRow};
use crate::{Database, now_timestamp};
use anyhow::Result;
use rusqlite::{Connection, Row};

const USER_COLUMNS: &str = "id, email, password, name, avatar, online, last_seen, created_at";

const MESSAGE_SELECT: &str = "SELECT m.id, m.room_id, m.user_id, u.name, u.avatar, m.content, m.type, m.created_at
     FROM messages m
     LEFT JOIN users u ON m.user_id = u.id";

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        email: &str,
        password_hash: &str,
        name: &str,
        avatar: Option<&str>,
    ) -> Result<()> {
        let now = now_timestamp();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, password, name, avatar, online, last_seen, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6, ?6)",
                rusqlite::params![id, email, password_hash, name, avatar, now],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1");
            conn.query_row(&sql, [email], user_from_row).optional()
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    /// Ids from `ids` that have no user row.
    pub fn missing_users(&self, ids: &[String]) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut missing = Vec::new();
            for id in ids {
                if query_user_by_id(conn, id)?.is_none() {
                    missing.push(id.clone());
                }
            }
            Ok(missing)
        })
    }

    /// Apply the given profile fields. Returns the updated row, or `None` for an
    /// unknown user.
    pub fn update_profile(
        &self,
        id: &str,
        name: Option<&str>,
        avatar: Option<&str>,
    ) -> Result<Option<UserRow>> {
        let now = now_timestamp();
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET name = COALESCE(?2, name), avatar = COALESCE(?3, avatar), updated_at = ?4
                 WHERE id = ?1",
                rusqlite::params![id, name, avatar, now],
            )?;
            query_user_by_id(conn, id)
        })
    }

    /// Case-insensitive substring match on name or email, excluding `exclude_id`.
    /// Online users first, then alphabetical.
    pub fn search_users(&self, exclude_id: &str, query: &str, limit: usize) -> Result<Vec<UserRow>> {
        let needle = query.to_lowercase();
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users WHERE id != ?1 ORDER BY online DESC, name COLLATE NOCASE ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([exclude_id], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows
                .into_iter()
                .filter(|u| {
                    u.name.to_lowercase().contains(&needle)
                        || u.email.to_lowercase().contains(&needle)
                })
                .take(limit)
                .collect())
        })
    }

    pub fn set_online(&self, id: &str, online: bool) -> Result<()> {
        let now = now_timestamp();
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET online = ?2, last_seen = ?3 WHERE id = ?1",
                rusqlite::params![id, online, now],
            )?;
            Ok(())
        })
    }

    pub fn touch_last_seen(&self, id: &str) -> Result<()> {
        let now = now_timestamp();
        self.with_conn(|conn| {
            conn.execute("UPDATE users SET last_seen = ?2 WHERE id = ?1", [id, now.as_str()])?;
            Ok(())
        })
    }

    /// Every user except `exclude_id`, optionally restricted to members of a room.
    /// Online first, then most recently seen.
    pub fn list_presence(&self, exclude_id: &str, room_id: Option<&str>) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = match room_id {
                Some(_) => format!(
                    "SELECT {} FROM users u
                     JOIN room_members rm ON rm.user_id = u.id AND rm.room_id = ?2
                     WHERE u.id != ?1
                     ORDER BY u.online DESC, u.last_seen DESC",
                    prefixed_user_columns("u")
                ),
                None => format!(
                    "SELECT {USER_COLUMNS} FROM users WHERE id != ?1 ORDER BY online DESC, last_seen DESC"
                ),
            };
            let mut stmt = conn.prepare(&sql)?;
            let rows = match room_id {
                Some(room) => stmt.query_map([exclude_id, room], user_from_row)?,
                None => stmt.query_map([exclude_id], user_from_row)?,
            }
            .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    pub fn insert_message(
        &self,
        id: &str,
        room_id: &str,
        user_id: &str,
        content: &str,
        kind: &str,
    ) -> Result<()> {
        let now = now_timestamp();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, room_id, user_id, content, type, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, room_id, user_id, content, kind, now],
            )?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!("{MESSAGE_SELECT} WHERE m.id = ?1");
            conn.query_row(&sql, [id], message_from_row).optional()
        })
    }

    /// All messages of a room, oldest first.
    pub fn get_messages(&self, room_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!("{MESSAGE_SELECT} WHERE m.room_id = ?1 ORDER BY m.created_at ASC, m.rowid ASC");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([room_id], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Text messages whose content contains `query`, compared case-insensitively.
    /// Newest first, at most `limit`.
    pub fn search_messages(&self, room_id: &str, query: &str, limit: usize) -> Result<Vec<MessageRow>> {
        let needle = query.to_lowercase();
        self.with_conn(|conn| {
            let sql = format!(
                "{MESSAGE_SELECT} WHERE m.room_id = ?1 AND m.type = 'text' ORDER BY m.created_at DESC, m.rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([room_id], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows
                .into_iter()
                .filter(|m| m.content.to_lowercase().contains(&needle))
                .take(limit)
                .collect())
        })
    }

    pub fn delete_message(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let affected = conn.execute("DELETE FROM messages WHERE id = ?1", [id])?;
            Ok(affected > 0)
        })
    }

    /// Record read receipts for `user_id`. Messages in rooms the user does not
    /// belong to, unknown ids and already-read messages are skipped.
    /// Returns the number of receipts created.
    pub fn mark_messages_read(&self, user_id: &str, message_ids: &[String]) -> Result<usize> {
        let now = now_timestamp();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut updated = 0;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO message_reads (message_id, user_id, read_at)
                     SELECT m.id, ?2, ?3 FROM messages m
                     JOIN room_members rm ON rm.room_id = m.room_id AND rm.user_id = ?2
                     WHERE m.id = ?1",
                )?;
                for id in message_ids {
                    updated += stmt.execute(rusqlite::params![id, user_id, now])?;
                }
            }
            tx.commit()?;
            Ok(updated)
        })
    }

    /// Batch-fetch read receipts for a set of message IDs.
    pub fn get_reads_for_messages(&self, message_ids: &[String]) -> Result<Vec<ReadRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT message_id, user_id FROM message_reads WHERE message_id IN ({}) ORDER BY read_at ASC",
                placeholders(message_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(message_ids), |row| {
                    Ok(ReadRow {
                        message_id: row.get(0)?,
                        user_id: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Files --

    /// Store a file and the `file` message announcing it in one transaction.
    pub fn insert_file_message(&self, file: &FileRow, message_id: &str, content: &str) -> Result<()> {
        let now = now_timestamp();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO files (id, name, type, size, url, uploaded_by, room_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    file.id,
                    file.name,
                    file.file_type,
                    file.size,
                    file.url,
                    file.uploaded_by,
                    file.room_id,
                    now
                ],
            )?;
            tx.execute(
                "INSERT INTO messages (id, room_id, user_id, content, type, file_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, 'file', ?5, ?6)",
                rusqlite::params![message_id, file.room_id, file.uploaded_by, content, file.id, now],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_file(&self, id: &str) -> Result<Option<FileRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, type, size, url, uploaded_by, room_id FROM files WHERE id = ?1",
                [id],
                |row| {
                    Ok(FileRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        file_type: row.get(2)?,
                        size: row.get(3)?,
                        url: row.get(4)?,
                        uploaded_by: row.get(5)?,
                        room_id: row.get(6)?,
                    })
                },
            )
            .optional()
        })
    }

    // -- Reactions --

    /// Insert a reaction. Returns `false` when the (message, user, emoji) row
    /// already existed.
    pub fn add_reaction(&self, id: &str, message_id: &str, user_id: &str, emoji: &str) -> Result<bool> {
        let now = now_timestamp();
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO message_reactions (id, message_id, user_id, emoji, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, message_id, user_id, emoji, now],
            )?;
            Ok(inserted == 1)
        })
    }

    /// Returns `false` when there was nothing to remove.
    pub fn remove_reaction(&self, message_id: &str, user_id: &str, emoji: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM message_reactions WHERE message_id = ?1 AND user_id = ?2 AND emoji = ?3",
                rusqlite::params![message_id, user_id, emoji],
            )?;
            Ok(removed > 0)
        })
    }

    /// Batch-fetch reactions for a set of message IDs, oldest first, with the
    /// reacting user's display fields.
    pub fn get_reactions_for_messages(&self, message_ids: &[String]) -> Result<Vec<ReactionRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT r.id, r.message_id, r.user_id, u.name, u.avatar, r.emoji, r.created_at
                 FROM message_reactions r
                 LEFT JOIN users u ON r.user_id = u.id
                 WHERE r.message_id IN ({})
                 ORDER BY r.created_at ASC, r.rowid ASC",
                placeholders(message_ids.len())
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(message_ids), |row| {
                    Ok(ReactionRow {
                        id: row.get(0)?,
                        message_id: row.get(1)?,
                        user_id: row.get(2)?,
                        user_name: row
                            .get::<_, Option<String>>(3)?
                            .unwrap_or_else(|| "unknown".to_string()),
                        user_avatar: row.get(4)?,
                        emoji: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

pub(crate) fn query_user_by_id(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    conn.query_row(&sql, [id], user_from_row).optional()
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        password: row.get(2)?,
        name: row.get(3)?,
        avatar: row.get(4)?,
        online: row.get(5)?,
        last_seen: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        room_id: row.get(1)?,
        user_id: row.get(2)?,
        // JOIN may miss if the author row is gone
        user_name: row.get::<_, Option<String>>(3)?.unwrap_or_else(|| "unknown".to_string()),
        user_avatar: row.get(4)?,
        content: row.get(5)?,
        kind: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn prefixed_user_columns(alias: &str) -> String {
    USER_COLUMNS
        .split(", ")
        .map(|c| format!("{alias}.{c}"))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ")
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
