//! SQLite schema for the context storage backend

pub const SCHEMA: &str = r#"
-- ============================================
-- CONTEXTS
-- ============================================

-- One merged conversation per captured commit
CREATE TABLE IF NOT EXISTS contexts (
    context_id TEXT PRIMARY KEY,           -- 'ctx-1a2b3c4d'
    data TEXT NOT NULL,                    -- newline-delimited messages
    stored_at DATETIME DEFAULT CURRENT_TIMESTAMP
);
"#;
