use crate::models::{FollowRow, LikeRow, ReplyRow, ThreadRow, UserRow};
use crate::{Database, now_rfc3339};
use anyhow::Result;
use rusqlite::Connection;

impl Database {
    // -- Users --

    pub fn create_user(&self, row: &UserRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, fullname, email, password, profile_picture, bio, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    row.id,
                    row.username,
                    row.fullname,
                    row.email,
                    row.password,
                    row.profile_picture,
                    row.bio,
                    row.created_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn user_exists(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM users WHERE id = ?1",
                [id],
                |row| row.get(0),
            )?;
            Ok(n > 0)
        })
    }

    pub fn email_registered(&self, email: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM users WHERE email = ?1",
                [email],
                |row| row.get(0),
            )?;
            Ok(n > 0)
        })
    }

    pub fn list_users(&self, limit: i64, offset: i64) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLS} FROM users ORDER BY created_at DESC LIMIT ?1 OFFSET ?2"
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![limit, offset], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_users(&self) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
        })
    }

    /// Users the caller does not already follow, newest first. Excludes the
    /// caller themselves.
    pub fn suggested_users(&self, for_user: &str, limit: i64) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLS} FROM users u
                 WHERE u.id != ?1
                   AND NOT EXISTS (
                       SELECT 1 FROM follows f
                       WHERE f.follower_id = ?1 AND f.followee_id = u.id
                   )
                 ORDER BY u.created_at DESC
                 LIMIT ?2"
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![for_user, limit], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_user(&self, id: &str, fullname: &str, bio: &str, password: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET fullname = ?2, bio = ?3, password = ?4 WHERE id = ?1",
                rusqlite::params![id, fullname, bio, password],
            )?;
            Ok(())
        })
    }

    /// Delete a user and everything hanging off them in one transaction:
    /// follow edges in both directions, their likes and replies, then their
    /// threads (FK cascade clears other users' likes/replies on those), then
    /// the user row. Returns false if the user did not exist.
    pub fn delete_user_cascade(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM follows WHERE follower_id = ?1 OR followee_id = ?1",
                [id],
            )?;
            tx.execute("DELETE FROM likes WHERE user_id = ?1", [id])?;
            tx.execute("DELETE FROM replies WHERE author_id = ?1", [id])?;
            tx.execute("DELETE FROM threads WHERE author_id = ?1", [id])?;
            let n = tx.execute("DELETE FROM users WHERE id = ?1", [id])?;
            tx.commit()?;
            Ok(n > 0)
        })
    }

    /// Batch-fetch users for a set of ids (author hydration for a page).
    pub fn users_by_ids(&self, ids: &[String]) -> Result<Vec<UserRow>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT {USER_COLS} FROM users WHERE id IN ({})",
                placeholders.join(", ")
            );
            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> =
                ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();
            let rows = stmt
                .query_map(params.as_slice(), user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Threads --

    pub fn insert_thread(&self, row: &ThreadRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO threads (id, author_id, content, images, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![row.id, row.author_id, row.content, row.images, row.created_at],
            )?;
            Ok(())
        })
    }

    pub fn get_thread(&self, id: &str) -> Result<Option<ThreadRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, author_id, content, images, created_at FROM threads WHERE id = ?1",
            )?;
            stmt.query_row([id], thread_from_row).optional()
        })
    }

    /// Rewrites content and images and refreshes `created_at`, resurfacing
    /// the thread to the top of the recency ordering.
    pub fn update_thread(&self, id: &str, content: &str, images: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE threads SET content = ?2, images = ?3, created_at = ?4 WHERE id = ?1",
                rusqlite::params![id, content, images, now_rfc3339()],
            )?;
            Ok(())
        })
    }

    pub fn delete_thread(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM threads WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    pub fn list_threads(&self, limit: i64, offset: i64) -> Result<Vec<ThreadRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, author_id, content, images, created_at
                 FROM threads
                 ORDER BY created_at DESC
                 LIMIT ?1 OFFSET ?2",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![limit, offset], thread_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_threads(&self) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM threads", [], |row| row.get(0))?)
        })
    }

    pub fn count_threads_by_author(&self, author_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM threads WHERE author_id = ?1",
                [author_id],
                |row| row.get(0),
            )?)
        })
    }

    /// Batch-fetch likes for a set of thread ids.
    pub fn likes_for_threads(&self, thread_ids: &[String]) -> Result<Vec<LikeRow>> {
        if thread_ids.is_empty() {
            return Ok(vec![]);
        }
        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=thread_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT id, thread_id, user_id, created_at FROM likes WHERE thread_id IN ({})",
                placeholders.join(", ")
            );
            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = thread_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();
            let rows = stmt
                .query_map(params.as_slice(), |row| {
                    Ok(LikeRow {
                        id: row.get(0)?,
                        thread_id: row.get(1)?,
                        user_id: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Batch-fetch replies for a set of thread ids, oldest first.
    pub fn replies_for_threads(&self, thread_ids: &[String]) -> Result<Vec<ReplyRow>> {
        if thread_ids.is_empty() {
            return Ok(vec![]);
        }
        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=thread_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT id, thread_id, author_id, content, images, created_at
                 FROM replies WHERE thread_id IN ({})
                 ORDER BY created_at ASC",
                placeholders.join(", ")
            );
            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = thread_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();
            let rows = stmt
                .query_map(params.as_slice(), reply_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Likes --

    /// Toggle a like: removes if it exists, inserts if not.
    /// Returns true when the like was added, false when removed. The
    /// UNIQUE(thread_id, user_id) constraint keeps this at one row per pair.
    pub fn toggle_like(&self, id: &str, thread_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let existing: Option<String> = conn
                .query_row(
                    "SELECT id FROM likes WHERE thread_id = ?1 AND user_id = ?2",
                    rusqlite::params![thread_id, user_id],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(existing_id) = existing {
                conn.execute("DELETE FROM likes WHERE id = ?1", [&existing_id])?;
                Ok(false)
            } else {
                conn.execute(
                    "INSERT INTO likes (id, thread_id, user_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![id, thread_id, user_id, now_rfc3339()],
                )?;
                Ok(true)
            }
        })
    }

    pub fn count_likes_by_user(&self, user_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM likes WHERE user_id = ?1",
                [user_id],
                |row| row.get(0),
            )?)
        })
    }

    // -- Follows --

    /// Toggle a follow edge: removes if it exists, inserts if not.
    /// Returns true when the edge was created, false when removed.
    pub fn toggle_follow(&self, id: &str, follower_id: &str, followee_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let existing: Option<String> = conn
                .query_row(
                    "SELECT id FROM follows WHERE follower_id = ?1 AND followee_id = ?2",
                    rusqlite::params![follower_id, followee_id],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(existing_id) = existing {
                conn.execute("DELETE FROM follows WHERE id = ?1", [&existing_id])?;
                Ok(false)
            } else {
                conn.execute(
                    "INSERT INTO follows (id, follower_id, followee_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![id, follower_id, followee_id, now_rfc3339()],
                )?;
                Ok(true)
            }
        })
    }

    pub fn followers_of(&self, user_id: &str) -> Result<Vec<FollowRow>> {
        self.with_conn(|conn| query_follows(conn, "followee_id", user_id))
    }

    pub fn following_of(&self, user_id: &str) -> Result<Vec<FollowRow>> {
        self.with_conn(|conn| query_follows(conn, "follower_id", user_id))
    }

    // -- Replies --

    pub fn insert_reply(&self, row: &ReplyRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO replies (id, thread_id, author_id, content, images, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    row.id,
                    row.thread_id,
                    row.author_id,
                    row.content,
                    row.images,
                    row.created_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_reply(&self, id: &str) -> Result<Option<ReplyRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, thread_id, author_id, content, images, created_at FROM replies WHERE id = ?1",
            )?;
            stmt.query_row([id], reply_from_row).optional()
        })
    }

    pub fn update_reply(&self, id: &str, content: &str, images: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE replies SET content = ?2, images = ?3 WHERE id = ?1",
                rusqlite::params![id, content, images],
            )?;
            Ok(())
        })
    }

    pub fn delete_reply(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM replies WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    pub fn count_replies_by_author(&self, author_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM replies WHERE author_id = ?1",
                [author_id],
                |row| row.get(0),
            )?)
        })
    }
}

const USER_COLS: &str = "id, username, fullname, email, password, profile_picture, bio, created_at";

fn user_from_row(row: &rusqlite::Row<'_>) -> std::result::Result<UserRow, rusqlite::Error> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        fullname: row.get(2)?,
        email: row.get(3)?,
        password: row.get(4)?,
        profile_picture: row.get(5)?,
        bio: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn thread_from_row(row: &rusqlite::Row<'_>) -> std::result::Result<ThreadRow, rusqlite::Error> {
    Ok(ThreadRow {
        id: row.get(0)?,
        author_id: row.get(1)?,
        content: row.get(2)?,
        images: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn reply_from_row(row: &rusqlite::Row<'_>) -> std::result::Result<ReplyRow, rusqlite::Error> {
    Ok(ReplyRow {
        id: row.get(0)?,
        thread_id: row.get(1)?,
        author_id: row.get(2)?,
        content: row.get(3)?,
        images: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn query_user(conn: &Connection, col: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLS} FROM users WHERE {col} = ?1"))?;
    stmt.query_row([value], user_from_row).optional()
}

fn query_follows(conn: &Connection, col: &str, value: &str) -> Result<Vec<FollowRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, follower_id, followee_id, created_at FROM follows WHERE {col} = ?1"
    ))?;
    let rows = stmt
        .query_map([value], |row| {
            Ok(FollowRow {
                id: row.get(0)?,
                follower_id: row.get(1)?,
                followee_id: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn test_user(name: &str) -> UserRow {
        UserRow {
            id: Uuid::new_v4().to_string(),
            username: format!("user_{name}"),
            fullname: name.to_string(),
            email: format!("{name}@example.com"),
            password: "hash".to_string(),
            profile_picture: String::new(),
            bio: String::new(),
            created_at: now_rfc3339(),
        }
    }

    fn test_thread(author: &UserRow, content: &str) -> ThreadRow {
        ThreadRow {
            id: Uuid::new_v4().to_string(),
            author_id: author.id.clone(),
            content: content.to_string(),
            images: "[]".to_string(),
            created_at: now_rfc3339(),
        }
    }

    #[test]
    fn like_is_a_toggle() {
        let db = Database::open_in_memory().unwrap();
        let user = test_user("alice");
        db.create_user(&user).unwrap();
        let thread = test_thread(&user, "hello");
        db.insert_thread(&thread).unwrap();

        assert!(db.toggle_like(&Uuid::new_v4().to_string(), &thread.id, &user.id).unwrap());
        assert!(!db.toggle_like(&Uuid::new_v4().to_string(), &thread.id, &user.id).unwrap());
        assert!(db.toggle_like(&Uuid::new_v4().to_string(), &thread.id, &user.id).unwrap());

        let likes = db.likes_for_threads(&[thread.id.clone()]).unwrap();
        assert_eq!(likes.len(), 1);
    }

    #[test]
    fn follow_is_a_toggle() {
        let db = Database::open_in_memory().unwrap();
        let a = test_user("alice");
        let b = test_user("bob");
        db.create_user(&a).unwrap();
        db.create_user(&b).unwrap();

        assert!(db.toggle_follow(&Uuid::new_v4().to_string(), &a.id, &b.id).unwrap());
        assert!(!db.toggle_follow(&Uuid::new_v4().to_string(), &a.id, &b.id).unwrap());
        assert!(db.toggle_follow(&Uuid::new_v4().to_string(), &a.id, &b.id).unwrap());

        assert_eq!(db.followers_of(&b.id).unwrap().len(), 1);
        assert_eq!(db.following_of(&a.id).unwrap().len(), 1);
    }

    #[test]
    fn listing_is_newest_first_and_windowed() {
        let db = Database::open_in_memory().unwrap();
        let user = test_user("alice");
        db.create_user(&user).unwrap();

        for i in 0..15 {
            let mut thread = test_thread(&user, &format!("post {i}"));
            thread.created_at = format!("2026-01-01T00:00:{i:02}.000000Z");
            db.insert_thread(&thread).unwrap();
        }

        let first_page = db.list_threads(10, 0).unwrap();
        assert_eq!(first_page.len(), 10);
        assert_eq!(first_page[0].content, "post 14");

        let second_page = db.list_threads(10, 10).unwrap();
        assert_eq!(second_page.len(), 5);
        assert_eq!(second_page[4].content, "post 0");

        assert_eq!(db.count_threads().unwrap(), 15);
    }

    #[test]
    fn update_thread_resurfaces_it() {
        let db = Database::open_in_memory().unwrap();
        let user = test_user("alice");
        db.create_user(&user).unwrap();

        let mut old = test_thread(&user, "old");
        old.created_at = "2026-01-01T00:00:00.000000Z".to_string();
        db.insert_thread(&old).unwrap();
        let mut newer = test_thread(&user, "newer");
        newer.created_at = "2026-01-01T00:00:01.000000Z".to_string();
        db.insert_thread(&newer).unwrap();

        db.update_thread(&old.id, "edited", "[]").unwrap();
        let rows = db.list_threads(10, 0).unwrap();
        assert_eq!(rows[0].id, old.id);
        assert_eq!(rows[0].content, "edited");
    }

    #[test]
    fn user_cascade_delete_leaves_nothing_dangling() {
        let db = Database::open_in_memory().unwrap();
        let a = test_user("alice");
        let b = test_user("bob");
        db.create_user(&a).unwrap();
        db.create_user(&b).unwrap();

        // alice's thread, liked and replied to by bob; mutual follows
        let thread = test_thread(&a, "hello");
        db.insert_thread(&thread).unwrap();
        db.toggle_like(&Uuid::new_v4().to_string(), &thread.id, &b.id).unwrap();
        db.insert_reply(&ReplyRow {
            id: Uuid::new_v4().to_string(),
            thread_id: thread.id.clone(),
            author_id: b.id.clone(),
            content: "hi".to_string(),
            images: "[]".to_string(),
            created_at: now_rfc3339(),
        })
        .unwrap();
        db.toggle_follow(&Uuid::new_v4().to_string(), &a.id, &b.id).unwrap();
        db.toggle_follow(&Uuid::new_v4().to_string(), &b.id, &a.id).unwrap();

        assert!(db.delete_user_cascade(&a.id).unwrap());

        assert!(db.get_user_by_id(&a.id).unwrap().is_none());
        assert_eq!(db.count_threads().unwrap(), 0);
        assert!(db.likes_for_threads(&[thread.id.clone()]).unwrap().is_empty());
        assert!(db.replies_for_threads(&[thread.id.clone()]).unwrap().is_empty());
        assert!(db.followers_of(&b.id).unwrap().is_empty());
        assert!(db.following_of(&b.id).unwrap().is_empty());

        // bob is untouched
        assert!(db.get_user_by_id(&b.id).unwrap().is_some());
    }

    #[test]
    fn delete_missing_user_reports_false() {
        let db = Database::open_in_memory().unwrap();
        assert!(!db.delete_user_cascade(&Uuid::new_v4().to_string()).unwrap());
    }

    #[test]
    fn suggested_excludes_self_and_followed() {
        let db = Database::open_in_memory().unwrap();
        let a = test_user("alice");
        let b = test_user("bob");
        let c = test_user("carol");
        db.create_user(&a).unwrap();
        db.create_user(&b).unwrap();
        db.create_user(&c).unwrap();
        db.toggle_follow(&Uuid::new_v4().to_string(), &a.id, &b.id).unwrap();

        let suggested = db.suggested_users(&a.id, 5).unwrap();
        assert_eq!(suggested.len(), 1);
        assert_eq!(suggested[0].id, c.id);
    }
}
