//! Index store: durable groups and declarations with a full-text name index
//!
//! Replace and delete are the only mutations. Each runs as one immediate
//! transaction on the single writer connection. Reads run inside their own
//! read transaction, on pooled read-only connections for file databases,
//! so a query sees either the old or the new version of a group.

pub mod schema;
pub mod types;

use chrono::Utc;
use log::debug;
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::{Path, PathBuf};

use crate::db::SqliteDatabase;
use crate::error::Result;
use crate::query::SearchPlan;
use types::{Declaration, DeclarationKind, GroupInfo, Page, SourceKind};

const MAX_IDLE_READERS: usize = 4;

const DECLARATION_COLUMNS: &str = "d.group_name, d.name, d.kind, d.signature, d.return_type, \
     d.scope, d.file_path, d.line, d.language";

/// Group state used by refresh decisions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupState {
    pub source_kind: SourceKind,
    pub fingerprint: Option<String>,
}

pub struct IndexStore {
    writer: Mutex<Connection>,
    readers: Option<ReaderPool>,
}

struct ReaderPool {
    path: PathBuf,
    idle: Mutex<Vec<Connection>>,
}

impl ReaderPool {
    fn checkout(&self) -> rusqlite::Result<Connection> {
        if let Some(conn) = self.idle.lock().pop() {
            return Ok(conn);
        }
        Ok(SqliteDatabase::open_read_only(&self.path)?.into_connection())
    }

    fn checkin(&self, conn: Connection) {
        let mut idle = self.idle.lock();
        if idle.len() < MAX_IDLE_READERS {
            idle.push(conn);
        }
    }
}

impl IndexStore {
    /// Open or create the store file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let db = SqliteDatabase::open(path)?;
        db.connection().execute_batch(schema::SCHEMA)?;
        debug!("Opened index store at {}", path.display());

        Ok(Self {
            writer: Mutex::new(db.into_connection()),
            readers: Some(ReaderPool {
                path: path.to_path_buf(),
                idle: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Isolated in-memory store; reads and writes share one connection
    pub fn open_in_memory() -> Result<Self> {
        let db = SqliteDatabase::open_in_memory()?;
        db.connection().execute_batch(schema::SCHEMA)?;
        Ok(Self {
            writer: Mutex::new(db.into_connection()),
            readers: None,
        })
    }

    /// Run `f` inside one read transaction
    fn read<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        fn snapshot<T>(
            conn: &Connection,
            f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
        ) -> rusqlite::Result<T> {
            let tx = conn.unchecked_transaction()?;
            let out = f(&tx)?;
            tx.finish()?;
            Ok(out)
        }

        match &self.readers {
            Some(pool) => {
                let conn = pool.checkout()?;
                let out = snapshot(&conn, f);
                pool.checkin(conn);
                Ok(out?)
            }
            None => {
                let conn = self.writer.lock();
                Ok(snapshot(&conn, f)?)
            }
        }
    }

    /// Atomically swap the full declaration set of `name`
    ///
    /// Returns the number of rows stored. Location duplicates in `declarations`
    /// are dropped (first one wins), so callers should collapse beforehand.
    pub fn replace_group(
        &self,
        name: &str,
        source_kind: SourceKind,
        fingerprint: Option<&str>,
        declarations: &[Declaration],
    ) -> Result<usize> {
        let mut conn = self.writer.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let removed = tx.execute("DELETE FROM declarations WHERE group_name = ?1", [name])?;
        tx.execute(
            "INSERT INTO groups (name, source_kind, fingerprint, indexed_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(name) DO UPDATE SET
                 source_kind = excluded.source_kind,
                 fingerprint = excluded.fingerprint,
                 indexed_at = excluded.indexed_at",
            params![name, source_kind.as_str(), fingerprint, Utc::now().to_rfc3339()],
        )?;

        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO declarations
                    (group_name, name, kind, signature, return_type, scope, file_path, line, language)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for decl in declarations {
                inserted += stmt.execute(params![
                    name,
                    decl.name,
                    decl.kind.as_str(),
                    decl.signature,
                    decl.return_type,
                    decl.scope,
                    decl.file_path,
                    decl.line,
                    decl.language,
                ])?;
            }
        }

        tx.commit()?;
        debug!(
            "Replaced group '{}': {} rows removed, {} inserted",
            name, removed, inserted
        );
        Ok(inserted)
    }

    /// Remove a group and all its declarations. Returns false if it didn't exist.
    pub fn delete_group(&self, name: &str) -> Result<bool> {
        let mut conn = self.writer.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let removed = tx.execute("DELETE FROM groups WHERE name = ?1", [name])?;
        tx.commit()?;
        Ok(removed > 0)
    }

    /// Indexed group names, sorted
    pub fn get_groups(&self) -> Result<Vec<String>> {
        self.read(|conn| {
            let mut stmt = conn.prepare("SELECT name FROM groups ORDER BY name")?;
            let names = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(names)
        })
    }

    /// Groups with their derived declaration counts, sorted by name
    pub fn group_summaries(&self) -> Result<Vec<GroupInfo>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT g.name, g.source_kind, g.fingerprint, g.indexed_at, COUNT(d.id)
                 FROM groups g
                 LEFT JOIN declarations d ON d.group_name = g.name
                 GROUP BY g.name
                 ORDER BY g.name",
            )?;
            let groups = stmt
                .query_map([], |row| {
                    Ok(GroupInfo {
                        name: row.get(0)?,
                        source_kind: SourceKind::parse(&row.get::<_, String>(1)?),
                        fingerprint: row.get(2)?,
                        indexed_at: row.get(3)?,
                        declaration_count: row.get::<_, i64>(4)? as usize,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(groups)
        })
    }

    pub fn group_state(&self, name: &str) -> Result<Option<GroupState>> {
        self.read(|conn| {
            conn.query_row(
                "SELECT source_kind, fingerprint FROM groups WHERE name = ?1",
                [name],
                |row| {
                    Ok(GroupState {
                        source_kind: SourceKind::parse(&row.get::<_, String>(0)?),
                        fingerprint: row.get(1)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn declaration_count(&self, group: &str) -> Result<usize> {
        self.read(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM declarations WHERE group_name = ?1",
                [group],
                |row| row.get::<_, i64>(0),
            )
        })
        .map(|n| n as usize)
    }

    /// Distinct file paths of `group`, lexicographic
    pub fn get_files(&self, group: &str, offset: usize, limit: usize) -> Result<Page<String>> {
        self.read(|conn| {
            let total: i64 = conn.query_row(
                "SELECT COUNT(DISTINCT file_path) FROM declarations WHERE group_name = ?1",
                [group],
                |row| row.get(0),
            )?;
            let mut stmt = conn.prepare(
                "SELECT DISTINCT file_path FROM declarations
                 WHERE group_name = ?1
                 ORDER BY file_path
                 LIMIT ?2 OFFSET ?3",
            )?;
            let items = stmt
                .query_map(params![group, limit as i64, offset as i64], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(Page {
                items,
                total: total as usize,
                offset,
                limit,
            })
        })
    }

    /// Declarations whose path matches exactly, across groups, by (group, line)
    pub fn get_declarations_by_file(
        &self,
        file_path: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Declaration>> {
        self.read(|conn| {
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM declarations WHERE file_path = ?1",
                [file_path],
                |row| row.get(0),
            )?;
            let sql = format!(
                "SELECT {} FROM declarations d
                 WHERE d.file_path = ?1
                 ORDER BY d.group_name, d.line IS NULL, d.line, d.name
                 LIMIT ?2 OFFSET ?3",
                DECLARATION_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let items = stmt
                .query_map(
                    params![file_path, limit as i64, offset as i64],
                    row_to_declaration,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(Page {
                items,
                total: total as usize,
                offset,
                limit,
            })
        })
    }

    /// Ranked name/signature search
    ///
    /// Rank 1 exact name (case-insensitive), 2 name prefix, 3 name substring,
    /// 4 signature-only full-text hit. Ties: name, group, file path, line.
    pub fn search(&self, plan: &SearchPlan, offset: usize, limit: usize) -> Result<Page<Declaration>> {
        let mut args: Vec<Value> = vec![
            plan.exact.clone().into(),
            plan.prefix_pattern.clone().into(),
            plan.contains_pattern.clone().into(),
        ];
        let signature_clause = match &plan.fts_query {
            Some(fts) => {
                args.push(fts.clone().into());
                " OR d.id IN (SELECT rowid FROM declarations_fts WHERE declarations_fts MATCH ?4)"
            }
            None => "",
        };

        let matches = format!(
            "SELECT {cols},
                    CASE
                        WHEN d.name = ?1 COLLATE NOCASE THEN 1
                        WHEN d.name LIKE ?2 ESCAPE '\\' THEN 2
                        WHEN d.name LIKE ?3 ESCAPE '\\' THEN 3
                        ELSE 4
                    END AS rank
             FROM declarations d
             WHERE d.name LIKE ?3 ESCAPE '\\'{signature_clause}",
            cols = DECLARATION_COLUMNS,
            signature_clause = signature_clause
        );
        let count_sql = format!("SELECT COUNT(*) FROM ({})", matches);
        let page_sql = format!(
            "SELECT group_name, name, kind, signature, return_type, scope, file_path, line, language
             FROM ({matches})
             ORDER BY rank, name, group_name, file_path, line IS NULL, line
             LIMIT ?{limit_idx} OFFSET ?{offset_idx}",
            matches = matches,
            limit_idx = args.len() + 1,
            offset_idx = args.len() + 2
        );

        self.read(|conn| {
            let total: i64 =
                conn.query_row(&count_sql, params_from_iter(args.iter()), |row| row.get(0))?;

            let mut page_args = args.clone();
            page_args.push((limit as i64).into());
            page_args.push((offset as i64).into());
            let mut stmt = conn.prepare(&page_sql)?;
            let items = stmt
                .query_map(params_from_iter(page_args.iter()), row_to_declaration)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(Page {
                items,
                total: total as usize,
                offset,
                limit,
            })
        })
    }
}

fn row_to_declaration(row: &Row) -> rusqlite::Result<Declaration> {
    Ok(Declaration {
        group: row.get(0)?,
        name: row.get(1)?,
        kind: DeclarationKind::parse(&row.get::<_, String>(2)?),
        signature: row.get(3)?,
        return_type: row.get(4)?,
        scope: row.get(5)?,
        file_path: row.get(6)?,
        line: row.get(7)?,
        language: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::TempDir;

    fn decl(name: &str, file: &str, line: Option<u32>, signature: Option<&str>) -> Declaration {
        Declaration {
            group: String::new(),
            name: name.to_string(),
            kind: DeclarationKind::Prototype,
            signature: signature.map(String::from),
            return_type: None,
            scope: None,
            file_path: file.to_string(),
            line,
            language: None,
        }
    }

    fn search(store: &IndexStore, q: &str) -> Result<Vec<String>> {
        let plan = SearchPlan::new(q).ok_or_else(|| anyhow::anyhow!("blank query"))?;
        Ok(store
            .search(&plan, 0, 100)?
            .items
            .into_iter()
            .map(|d| d.name)
            .collect())
    }

    #[test]
    fn test_replace_removes_stale_rows_and_fts_entries() -> Result<()> {
        let store = IndexStore::open_in_memory()?;
        store.replace_group(
            "g",
            SourceKind::Generated,
            Some("v1"),
            &[decl("open_window", "w.h", Some(1), Some("int open_window(surface_desc d)"))],
        )?;
        assert_eq!(search(&store, "surface")?, vec!["open_window"]);

        store.replace_group(
            "g",
            SourceKind::Generated,
            Some("v2"),
            &[decl("close_window", "w.h", Some(2), Some("void close_window(void)"))],
        )?;
        assert!(search(&store, "surface")?.is_empty());
        assert!(search(&store, "open_window")?.is_empty());
        assert_eq!(search(&store, "close")?, vec!["close_window"]);

        let state = store.group_state("g")?.ok_or_else(|| anyhow::anyhow!("missing group"))?;
        assert_eq!(state.fingerprint.as_deref(), Some("v2"));
        Ok(())
    }

    #[test]
    fn test_location_duplicates_are_ignored() -> Result<()> {
        let store = IndexStore::open_in_memory()?;
        let stored = store.replace_group(
            "g",
            SourceKind::Imported,
            None,
            &[
                decl("f", "a.h", None, None),
                decl("f", "a.h", None, Some("f(void)")),
                decl("f", "a.h", Some(3), None),
            ],
        )?;
        assert_eq!(stored, 2);
        assert_eq!(store.declaration_count("g")?, 2);
        Ok(())
    }

    #[test]
    fn test_delete_cascades() -> Result<()> {
        let store = IndexStore::open_in_memory()?;
        store.replace_group("a", SourceKind::Imported, None, &[decl("fa", "a.h", Some(1), None)])?;
        store.replace_group("b", SourceKind::Generated, None, &[decl("fb", "b.h", Some(1), None)])?;

        assert!(store.delete_group("a")?);
        assert!(!store.delete_group("a")?);
        assert_eq!(store.declaration_count("a")?, 0);
        assert!(search(&store, "fa")?.is_empty());

        let summaries = store.group_summaries()?;
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].name, "b");
        assert_eq!(summaries[0].source_kind, SourceKind::Generated);
        assert_eq!(summaries[0].declaration_count, 1);
        Ok(())
    }

    #[test]
    fn test_file_store_persists_across_reopen() -> Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("nested").join("index.db");
        {
            let store = IndexStore::open(&path)?;
            store.replace_group("g", SourceKind::Imported, Some("abc"), &[decl("f", "a.h", Some(1), None)])?;
        }
        let store = IndexStore::open(&path)?;
        assert_eq!(store.get_groups()?, vec!["g"]);
        assert_eq!(search(&store, "f")?, vec!["f"]);
        Ok(())
    }

    #[test]
    fn test_fts_operators_are_literal() -> Result<()> {
        let store = IndexStore::open_in_memory()?;
        store.replace_group(
            "g",
            SourceKind::Imported,
            None,
            &[decl("x", "a.h", Some(1), Some("int x(int a)"))],
        )?;
        for q in ["AND", "a OR b", "\"", "x*", "-x", "NEAR(", "name:x"] {
            search(&store, q)?;
        }
        Ok(())
    }
}
