use sqlx::PgPool;

/// Create all ledger tables if they do not exist
pub async fn init_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("Initializing escrow schema...");

    for (name, ddl) in [
        ("users", CREATE_USERS_TABLE),
        ("wallets", CREATE_WALLETS_TABLE),
        ("wallet_transactions", CREATE_WALLET_TRANSACTIONS_TABLE),
        ("transfers", CREATE_TRANSFERS_TABLE),
        ("disputes", CREATE_DISPUTES_TABLE),
        ("dispute_evidence", CREATE_DISPUTE_EVIDENCE_TABLE),
        ("dispute_messages", CREATE_DISPUTE_MESSAGES_TABLE),
    ] {
        sqlx::query(ddl).execute(pool).await.map_err(|e| {
            tracing::error!(table = name, error = %e, "Failed to create table");
            e
        })?;
    }

    for ddl in INDEXES {
        sqlx::query(ddl).execute(pool).await?;
    }

    tracing::info!("Escrow schema initialized successfully");
    Ok(())
}

pub const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    user_id     BIGSERIAL PRIMARY KEY,
    username    TEXT NOT NULL UNIQUE,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

pub const CREATE_WALLETS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS wallets (
    user_id              BIGINT PRIMARY KEY,
    balance              BIGINT NOT NULL DEFAULT 0 CHECK (balance >= 0),
    pin_hash             TEXT,
    pin_set              BOOLEAN NOT NULL DEFAULT FALSE,
    failed_pin_attempts  INTEGER NOT NULL DEFAULT 0,
    pin_locked_until     TIMESTAMPTZ,
    created_at           TIMESTAMPTZ NOT NULL,
    updated_at           TIMESTAMPTZ NOT NULL
)
"#;

pub const CREATE_WALLET_TRANSACTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS wallet_transactions (
    id              BIGSERIAL PRIMARY KEY,
    user_id         BIGINT NOT NULL,
    kind            TEXT NOT NULL,
    amount          BIGINT NOT NULL,
    balance_before  BIGINT NOT NULL,
    balance_after   BIGINT NOT NULL,
    reference_type  TEXT NOT NULL,
    reference_id    BIGINT NOT NULL,
    description     TEXT NOT NULL DEFAULT '',
    created_at      TIMESTAMPTZ NOT NULL
)
"#;

pub const CREATE_TRANSFERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS transfers (
    id           BIGSERIAL PRIMARY KEY,
    code         TEXT NOT NULL UNIQUE,
    sender_id    BIGINT NOT NULL,
    receiver_id  BIGINT NOT NULL,
    amount       BIGINT NOT NULL CHECK (amount > 0),
    hold_days    INTEGER NOT NULL,
    hold_until   TIMESTAMPTZ NOT NULL,
    description  TEXT NOT NULL DEFAULT '',
    status       TEXT NOT NULL,
    released_at  TIMESTAMPTZ,
    created_at   TIMESTAMPTZ NOT NULL,
    updated_at   TIMESTAMPTZ NOT NULL
)
"#;

pub const CREATE_DISPUTES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS disputes (
    id              BIGSERIAL PRIMARY KEY,
    code            TEXT NOT NULL UNIQUE,
    transfer_id     BIGINT NOT NULL REFERENCES transfers(id),
    initiated_by    BIGINT NOT NULL,
    reason          TEXT NOT NULL,
    status          TEXT NOT NULL,
    phase           TEXT NOT NULL,
    phase_deadline  TIMESTAMPTZ,
    admin_id        BIGINT,
    admin_decision  TEXT,
    resolved_at     TIMESTAMPTZ,
    created_at      TIMESTAMPTZ NOT NULL,
    updated_at      TIMESTAMPTZ NOT NULL
)
"#;

pub const CREATE_DISPUTE_EVIDENCE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS dispute_evidence (
    id          BIGSERIAL PRIMARY KEY,
    dispute_id  BIGINT NOT NULL REFERENCES disputes(id),
    user_id     BIGINT NOT NULL,
    kind        TEXT NOT NULL,
    content     TEXT NOT NULL,
    file_name   TEXT,
    file_size   BIGINT,
    created_at  TIMESTAMPTZ NOT NULL
)
"#;

pub const CREATE_DISPUTE_MESSAGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS dispute_messages (
    id          BIGSERIAL PRIMARY KEY,
    dispute_id  BIGINT NOT NULL REFERENCES disputes(id),
    user_id     BIGINT NOT NULL,
    body        TEXT NOT NULL,
    is_admin    BOOLEAN NOT NULL DEFAULT FALSE,
    created_at  TIMESTAMPTZ NOT NULL
)
"#;

const INDEXES: [&str; 5] = [
    "CREATE INDEX IF NOT EXISTS idx_wallet_tx_user ON wallet_transactions (user_id, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_transfers_sender ON transfers (sender_id)",
    "CREATE INDEX IF NOT EXISTS idx_transfers_receiver ON transfers (receiver_id)",
    "CREATE INDEX IF NOT EXISTS idx_transfers_hold ON transfers (status, hold_until)",
    // At most one unresolved dispute per transfer
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_disputes_active ON disputes (transfer_id) \
     WHERE status NOT IN ('resolved_to_sender', 'resolved_to_receiver')",
];
