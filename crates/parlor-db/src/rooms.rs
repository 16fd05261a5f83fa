use crate::models::{LeaveOutcome, MemberRow, RoomRow};
use crate::queries::OptionalExt;
use crate::{Database, now_timestamp};
use anyhow::Result;
use rusqlite::{Connection, Row};

/// Room columns plus per-viewer aggregates. `?1` is the viewer's user id.
const ROOM_SELECT: &str = "SELECT r.id, r.name, r.description, r.type, r.admin_id, r.created_by, r.created_at, r.updated_at,
        (SELECT COUNT(*) FROM room_members WHERE room_id = r.id),
        (SELECT MAX(created_at) FROM messages WHERE room_id = r.id),
        (SELECT COUNT(*) FROM messages m
          WHERE m.room_id = r.id AND m.user_id != ?1
            AND m.created_at > COALESCE(
                (SELECT last_read_at FROM room_members WHERE room_id = r.id AND user_id = ?1), ''))
     FROM rooms r";

impl Database {
    /// Rooms `user_id` belongs to, most recent activity first.
    pub fn list_rooms_for_user(&self, user_id: &str) -> Result<Vec<RoomRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{ROOM_SELECT} JOIN room_members me ON me.room_id = r.id AND me.user_id = ?1"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt
                .query_map([user_id], room_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.sort_by(|a, b| b.activity_at().cmp(a.activity_at()));
            Ok(rows)
        })
    }

    /// A single room with aggregates computed for `viewer_id`.
    pub fn get_room(&self, room_id: &str, viewer_id: &str) -> Result<Option<RoomRow>> {
        self.with_conn(|conn| query_room(conn, room_id, viewer_id))
    }

    /// Create a room with `creator_id` as admin and first member, then add
    /// `member_ids`. Duplicates and the creator's own id are ignored.
    pub fn create_room(
        &self,
        id: &str,
        name: &str,
        description: Option<&str>,
        room_type: &str,
        creator_id: &str,
        member_ids: &[String],
    ) -> Result<()> {
        let now = now_timestamp();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            insert_room(&tx, id, name, description, room_type, creator_id, &now)?;
            insert_member(&tx, id, creator_id, &now)?;
            for member in member_ids {
                if member != creator_id {
                    insert_member(&tx, id, member, &now)?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Return the DM shared by `user_id` and `target_id`, creating it when none
    /// exists. Lookup and creation run in one transaction so concurrent calls
    /// converge on a single room. The flag is `true` when the room was created.
    pub fn find_or_create_dm(
        &self,
        new_id: &str,
        user_id: &str,
        target_id: &str,
        target_name: &str,
    ) -> Result<(String, bool)> {
        let now = now_timestamp();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

            let existing: Option<String> = tx
                .query_row(
                    "SELECT r.id FROM rooms r
                     JOIN room_members a ON a.room_id = r.id AND a.user_id = ?1
                     JOIN room_members b ON b.room_id = r.id AND b.user_id = ?2
                     WHERE r.type = 'dm'
                     ORDER BY r.created_at ASC
                     LIMIT 1",
                    [user_id, target_id],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(id) = existing {
                tx.commit()?;
                return Ok((id, false));
            }

            let name = format!("DM: {}", target_name);
            let description = format!("Direct message with {}", target_name);
            insert_room(&tx, new_id, &name, Some(&description), "dm", user_id, &now)?;
            insert_member(&tx, new_id, user_id, &now)?;
            insert_member(&tx, new_id, target_id, &now)?;
            tx.commit()?;
            Ok((new_id.to_string(), true))
        })
    }

    pub fn is_member(&self, room_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| query_is_member(conn, room_id, user_id))
    }

    /// Returns `false` when the user was already a member.
    pub fn add_member(&self, room_id: &str, user_id: &str) -> Result<bool> {
        let now = now_timestamp();
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO room_members (room_id, user_id, joined_at, last_read_at) VALUES (?1, ?2, ?3, ?3)",
                [room_id, user_id, now.as_str()],
            )?;
            Ok(inserted == 1)
        })
    }

    /// Returns `false` when the user was not a member.
    pub fn remove_member(&self, room_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM room_members WHERE room_id = ?1 AND user_id = ?2",
                [room_id, user_id],
            )?;
            Ok(removed > 0)
        })
    }

    /// Remove `user_id` from the room, keeping the one-admin-who-is-a-member rule:
    /// a departing admin hands the role to the earliest-joined remaining member,
    /// and the last member out deletes the room.
    pub fn leave_room(&self, room_id: &str, user_id: &str) -> Result<LeaveOutcome> {
        let now = now_timestamp();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let removed = tx.execute(
                "DELETE FROM room_members WHERE room_id = ?1 AND user_id = ?2",
                [room_id, user_id],
            )?;
            if removed == 0 {
                return Ok(LeaveOutcome::NotMember);
            }

            let successor: Option<String> = tx
                .query_row(
                    "SELECT user_id FROM room_members WHERE room_id = ?1 ORDER BY joined_at ASC, rowid ASC LIMIT 1",
                    [room_id],
                    |row| row.get(0),
                )
                .optional()?;

            let outcome = match successor {
                None => {
                    tx.execute("DELETE FROM rooms WHERE id = ?1", [room_id])?;
                    LeaveOutcome::RoomDeleted
                }
                Some(next) => {
                    let was_admin = tx.execute(
                        "UPDATE rooms SET admin_id = ?2, updated_at = ?3 WHERE id = ?1 AND admin_id = ?4",
                        [room_id, next.as_str(), now.as_str(), user_id],
                    )?;
                    if was_admin > 0 {
                        LeaveOutcome::AdminTransferred(next)
                    } else {
                        LeaveOutcome::Left
                    }
                }
            };

            tx.commit()?;
            Ok(outcome)
        })
    }

    pub fn set_admin(&self, room_id: &str, user_id: &str) -> Result<()> {
        let now = now_timestamp();
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE rooms SET admin_id = ?2, updated_at = ?3 WHERE id = ?1",
                [room_id, user_id, now.as_str()],
            )?;
            Ok(())
        })
    }

    /// Members, messages, reactions and files go with the room (cascade).
    pub fn delete_room(&self, room_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM rooms WHERE id = ?1", [room_id])?;
            Ok(deleted > 0)
        })
    }

    /// Members ordered by join time.
    pub fn list_members(&self, room_id: &str) -> Result<Vec<MemberRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.name, u.avatar, u.online, u.last_seen, rm.joined_at
                 FROM room_members rm
                 JOIN users u ON u.id = rm.user_id
                 WHERE rm.room_id = ?1
                 ORDER BY rm.joined_at ASC, rm.rowid ASC",
            )?;
            let rows = stmt
                .query_map([room_id], |row| {
                    Ok(MemberRow {
                        user_id: row.get(0)?,
                        name: row.get(1)?,
                        avatar: row.get(2)?,
                        online: row.get(3)?,
                        last_seen: row.get(4)?,
                        joined_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Move the member's read marker to now. Returns `false` for non-members.
    pub fn mark_room_read(&self, room_id: &str, user_id: &str) -> Result<bool> {
        let now = now_timestamp();
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE room_members SET last_read_at = ?3 WHERE room_id = ?1 AND user_id = ?2",
                [room_id, user_id, now.as_str()],
            )?;
            Ok(updated > 0)
        })
    }
}

impl RoomRow {
    /// Latest of last message, update and creation. Timestamps are fixed-width
    /// RFC 3339 text, so string order is time order.
    pub fn activity_at(&self) -> &str {
        let mut latest = self.created_at.as_str().max(self.updated_at.as_str());
        if let Some(last) = self.last_message_at.as_deref() {
            latest = latest.max(last);
        }
        latest
    }
}

fn query_room(conn: &Connection, room_id: &str, viewer_id: &str) -> Result<Option<RoomRow>> {
    let sql = format!("{ROOM_SELECT} WHERE r.id = ?2");
    conn.query_row(&sql, [viewer_id, room_id], room_from_row).optional()
}

fn query_is_member(conn: &Connection, room_id: &str, user_id: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM room_members WHERE room_id = ?1 AND user_id = ?2",
            [room_id, user_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn insert_room(
    conn: &Connection,
    id: &str,
    name: &str,
    description: Option<&str>,
    room_type: &str,
    creator_id: &str,
    now: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO rooms (id, name, description, type, admin_id, created_by, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6, ?6)",
        rusqlite::params![id, name, description, room_type, creator_id, now],
    )?;
    Ok(())
}

fn insert_member(conn: &Connection, room_id: &str, user_id: &str, now: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO room_members (room_id, user_id, joined_at, last_read_at) VALUES (?1, ?2, ?3, ?3)",
        [room_id, user_id, now],
    )?;
    Ok(())
}

fn room_from_row(row: &Row<'_>) -> rusqlite::Result<RoomRow> {
    Ok(RoomRow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        room_type: row.get(3)?,
        admin_id: row.get(4)?,
        created_by: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        member_count: row.get(8)?,
        last_message_at: row.get(9)?,
        unread_count: row.get(10)?,
    })
}
