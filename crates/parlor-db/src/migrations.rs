use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                email       TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                name        TEXT NOT NULL,
                avatar      TEXT,
                online      INTEGER NOT NULL DEFAULT 0,
                last_seen   TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE INDEX idx_users_online ON users(online);

            CREATE TABLE rooms (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                description TEXT,
                type        TEXT NOT NULL DEFAULT 'group' CHECK (type IN ('group', 'dm')),
                admin_id    TEXT NOT NULL REFERENCES users(id),
                created_by  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE TABLE room_members (
                room_id       TEXT NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
                user_id       TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                joined_at     TEXT NOT NULL,
                last_read_at  TEXT NOT NULL,
                PRIMARY KEY (room_id, user_id)
            );

            CREATE INDEX idx_room_members_user ON room_members(user_id);

            CREATE TABLE files (
                id           TEXT PRIMARY KEY,
                name         TEXT NOT NULL,
                type         TEXT NOT NULL,
                size         INTEGER NOT NULL,
                url          TEXT NOT NULL,
                uploaded_by  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                room_id      TEXT NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
                created_at   TEXT NOT NULL
            );

            CREATE TABLE messages (
                id          TEXT PRIMARY KEY,
                room_id     TEXT NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                content     TEXT NOT NULL,
                type        TEXT NOT NULL DEFAULT 'text' CHECK (type IN ('text', 'file')),
                file_id     TEXT REFERENCES files(id) ON DELETE SET NULL,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_messages_room ON messages(room_id, created_at);

            CREATE TABLE message_reads (
                message_id  TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                read_at     TEXT NOT NULL,
                PRIMARY KEY (message_id, user_id)
            );

            CREATE TABLE message_reactions (
                id          TEXT PRIMARY KEY,
                message_id  TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                emoji       TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                UNIQUE (message_id, user_id, emoji)
            );

            CREATE INDEX idx_reactions_message ON message_reactions(message_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
