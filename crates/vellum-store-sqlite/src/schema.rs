//! SQL schema for the Vellum SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.
//!
//! The graph is encoded relationally: base nodes and property versions are
//! rows, property edges and changeset links are rows with `active` flags.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS nodes (
    node_id     TEXT PRIMARY KEY,
    label       TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    deleted_at  TEXT                 -- soft delete; rows are never removed
);

CREATE TABLE IF NOT EXISTS changesets (
    changeset_id TEXT PRIMARY KEY,
    status       TEXT NOT NULL DEFAULT 'open',   -- 'open' | 'approved' | 'rejected'
    created_at   TEXT NOT NULL,
    finalized_at TEXT
);

-- Property versions. Only the inline-replace path ever updates value_json
-- and modified_at; retirement stamps deleted_at.
CREATE TABLE IF NOT EXISTS properties (
    property_id TEXT PRIMARY KEY,
    key         TEXT NOT NULL,
    value_json  TEXT NOT NULL,
    labels      TEXT NOT NULL DEFAULT '[]',
    created_at  TEXT NOT NULL,
    modified_at TEXT,
    deleted_at  TEXT
);

-- Node -> property version. At most one active edge per (node, key).
CREATE TABLE IF NOT EXISTS property_edges (
    property_id TEXT PRIMARY KEY REFERENCES properties(property_id),
    node_id     TEXT NOT NULL REFERENCES nodes(node_id),
    key         TEXT NOT NULL,
    active      INTEGER NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS property_edges_one_active
    ON property_edges(node_id, key) WHERE active = 1;

-- Draft property version -> changeset. `active` marks the current draft;
-- `outcome` records what happened to it when the changeset was finalized.
CREATE TABLE IF NOT EXISTS changeset_properties (
    changeset_id TEXT NOT NULL REFERENCES changesets(changeset_id),
    property_id  TEXT NOT NULL REFERENCES properties(property_id),
    node_id      TEXT NOT NULL REFERENCES nodes(node_id),
    key          TEXT NOT NULL,
    active       INTEGER NOT NULL,
    outcome      TEXT,                -- NULL | 'committed' | 'rejected'
    created_at   TEXT NOT NULL,
    PRIMARY KEY (changeset_id, property_id)
);

CREATE UNIQUE INDEX IF NOT EXISTS changeset_properties_one_active
    ON changeset_properties(changeset_id, node_id, key) WHERE active = 1;

CREATE TABLE IF NOT EXISTS changeset_nodes (
    changeset_id TEXT NOT NULL REFERENCES changesets(changeset_id),
    node_id      TEXT NOT NULL REFERENCES nodes(node_id),
    change       TEXT NOT NULL,       -- 'create' | 'delete'
    active       INTEGER NOT NULL,
    outcome      TEXT,
    created_at   TEXT NOT NULL,
    PRIMARY KEY (changeset_id, node_id, change)
);

CREATE TABLE IF NOT EXISTS relations (
    relation_id TEXT PRIMARY KEY,
    kind        TEXT NOT NULL,
    from_id     TEXT NOT NULL REFERENCES nodes(node_id),
    to_id       TEXT NOT NULL REFERENCES nodes(node_id),
    active      INTEGER NOT NULL,
    created_at  TEXT NOT NULL,
    deleted_at  TEXT
);

CREATE TABLE IF NOT EXISTS changeset_relations (
    changeset_id TEXT NOT NULL REFERENCES changesets(changeset_id),
    relation_id  TEXT NOT NULL REFERENCES relations(relation_id),
    change       TEXT NOT NULL,       -- 'add' | 'remove'
    active       INTEGER NOT NULL,
    outcome      TEXT,
    created_at   TEXT NOT NULL,
    PRIMARY KEY (changeset_id, relation_id, change)
);

-- Property labels whose values must be unique among canonical versions.
CREATE TABLE IF NOT EXISTS unique_labels (
    label TEXT PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS unique_values (
    label       TEXT NOT NULL,
    value_json  TEXT NOT NULL,
    property_id TEXT NOT NULL REFERENCES properties(property_id),
    PRIMARY KEY (label, value_json)
);

CREATE INDEX IF NOT EXISTS property_edges_node_idx   ON property_edges(node_id, key);
CREATE INDEX IF NOT EXISTS changeset_props_node_idx  ON changeset_properties(node_id, key);
CREATE INDEX IF NOT EXISTS changeset_nodes_node_idx  ON changeset_nodes(node_id);
CREATE INDEX IF NOT EXISTS relations_from_idx        ON relations(from_id);
CREATE INDEX IF NOT EXISTS relations_to_idx          ON relations(to_id);
CREATE INDEX IF NOT EXISTS unique_values_prop_idx    ON unique_values(property_id);

PRAGMA user_version = 1;
";
