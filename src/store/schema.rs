//! Index schema
//!
//! Declarations are owned by their group (cascade delete). The FTS table is
//! kept in step by triggers, so every path that adds or removes declaration
//! rows (replace, delete, cascade) updates the search index in the same
//! transaction.

pub const SCHEMA: &str = r#"
-- One row per tag source
CREATE TABLE IF NOT EXISTS groups (
    name TEXT PRIMARY KEY,
    source_kind TEXT NOT NULL,          -- generated | imported
    fingerprint TEXT,                   -- sha256 of the tag source at last ingest
    indexed_at TEXT NOT NULL            -- RFC 3339
);

CREATE TABLE IF NOT EXISTS declarations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    group_name TEXT NOT NULL REFERENCES groups(name) ON DELETE CASCADE,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    signature TEXT,
    return_type TEXT,
    scope TEXT,
    file_path TEXT NOT NULL,
    line INTEGER,
    language TEXT
);

-- (name, file_path, line) is unique within a group
CREATE UNIQUE INDEX IF NOT EXISTS idx_declarations_location
    ON declarations(group_name, name, file_path, IFNULL(line, 0));
CREATE INDEX IF NOT EXISTS idx_declarations_name ON declarations(name COLLATE NOCASE);
CREATE INDEX IF NOT EXISTS idx_declarations_file ON declarations(file_path, group_name, line);
CREATE INDEX IF NOT EXISTS idx_declarations_group_file ON declarations(group_name, file_path);

-- Full-text index over names and signatures, rowid = declarations.id
CREATE VIRTUAL TABLE IF NOT EXISTS declarations_fts USING fts5(
    name,
    signature,
    tokenize = "unicode61 tokenchars '_'"
);

CREATE TRIGGER IF NOT EXISTS declarations_fts_insert AFTER INSERT ON declarations BEGIN
    INSERT INTO declarations_fts (rowid, name, signature)
    VALUES (new.id, new.name, COALESCE(new.signature, ''));
END;

CREATE TRIGGER IF NOT EXISTS declarations_fts_delete AFTER DELETE ON declarations BEGIN
    DELETE FROM declarations_fts WHERE rowid = old.id;
END;
"#;
