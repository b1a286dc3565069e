use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::entities::{AccountKind, AccountRecord};
use crate::extraction::DollarAmount;
use crate::ledger::{Ledger, LedgerTransaction, NewTransaction};

/// Audit trail entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

/// Stored dates are RFC 3339 in UTC with a `Z` suffix, so they sort as text
fn format_date(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Compute idempotency hash for duplicate detection
/// NOTE: This is for DEDUPLICATION, not IDENTITY!
/// Identity = tx_uuid, Deduplication = hash
pub fn compute_idempotency_hash(tx: &NewTransaction) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!(
        "{}|{}|{}|{}",
        format_date(tx.date),
        tx.amount,
        tx.source_account_id,
        tx.destination.name()
    ));
    format!("{:x}", hasher.finalize())
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Accounts Table
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS accounts (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Transactions Table
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            idempotency_hash TEXT UNIQUE NOT NULL,
            tx_uuid TEXT UNIQUE NOT NULL,
            date TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            description TEXT NOT NULL,
            group_title TEXT,
            kind TEXT NOT NULL,
            source_account_id TEXT NOT NULL,
            destination_account_id TEXT,
            destination_name TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_date ON transactions(date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

/// Load accounts from a CSV with headers `id,name,kind,active`
pub fn load_accounts_csv(csv_path: &Path) -> Result<Vec<AccountRecord>> {
    let mut rdr = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open accounts CSV: {}", csv_path.display()))?;

    let mut accounts = Vec::new();
    for (line, result) in rdr.deserialize().enumerate() {
        let account: AccountRecord = result
            .with_context(|| format!("Failed to parse account on line {}", line + 2))?;
        accounts.push(account);
    }

    Ok(accounts)
}

/// Insert or update accounts by id
pub fn upsert_accounts(conn: &Connection, accounts: &[AccountRecord]) -> Result<usize> {
    let mut written = 0;

    for account in accounts {
        conn.execute(
            "INSERT INTO accounts (id, name, kind, active) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, kind = excluded.kind, active = excluded.active",
            params![account.id, account.name, account.kind.as_str(), account.active],
        )?;
        written += 1;
    }

    info!(count = written, "accounts written");
    Ok(written)
}

pub fn get_accounts(conn: &Connection) -> Result<Vec<AccountRecord>> {
    let mut stmt = conn.prepare("SELECT id, name, kind, active FROM accounts ORDER BY rowid")?;

    let accounts = stmt
        .query_map([], |row| {
            let kind: String = row.get(2)?;
            Ok(AccountRecord {
                id: row.get(0)?,
                name: row.get(1)?,
                kind: AccountKind::parse(&kind),
                active: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(accounts)
}

/// Transactions on or after `since`, newest first
pub fn get_transactions_since(conn: &Connection, since: DateTime<Utc>) -> Result<Vec<LedgerTransaction>> {
    let mut stmt = conn.prepare(
        "SELECT id, date, amount_cents, description, group_title, destination_name
         FROM transactions
         WHERE date >= ?1
         ORDER BY date DESC, id DESC",
    )?;

    let rows = stmt
        .query_map([format_date(since)], |row| {
            let id: i64 = row.get(0)?;
            let date: String = row.get(1)?;
            let amount_cents: i64 = row.get(2)?;
            Ok((
                id,
                date,
                amount_cents,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut transactions = Vec::with_capacity(rows.len());
    for (id, date, amount_cents, description, group_title, destination_name) in rows {
        let date = parse_date(&date)
            .ok_or_else(|| anyhow!("Transaction {} has an unreadable date: {}", id, date))?;
        transactions.push(LedgerTransaction {
            id: id.to_string(),
            date,
            amount: DollarAmount::from_cents(amount_cents),
            description,
            group_title,
            destination_name,
        });
    }

    Ok(transactions)
}

/// Insert a transaction. A second insert of the same transaction returns
/// the id of the first one instead of creating a copy.
pub fn insert_transaction(conn: &Connection, tx: &NewTransaction) -> Result<String> {
    let hash = compute_idempotency_hash(tx);
    let amount_cents = tx
        .amount
        .total_cents()
        .ok_or_else(|| anyhow!("Amount {} is too large to store", tx.amount))?;

    let result = conn.execute(
        "INSERT INTO transactions (
            idempotency_hash, tx_uuid, date, amount_cents, description, group_title,
            kind, source_account_id, destination_account_id, destination_name
        ) VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?7, ?8, ?9)",
        params![
            hash,
            uuid::Uuid::new_v4().to_string(),
            format_date(tx.date),
            amount_cents,
            tx.description,
            tx.kind.as_str(),
            tx.source_account_id,
            tx.destination.account_id(),
            tx.destination.name(),
        ],
    );

    match result {
        Ok(_) => {
            let id = conn.last_insert_rowid().to_string();

            // Log event to audit trail
            let event = Event::new(
                "transaction_created",
                "transaction",
                &id,
                serde_json::json!({
                    "amount": tx.amount.to_string(),
                    "kind": tx.kind.as_str(),
                    "source_account_id": tx.source_account_id,
                    "destination": tx.destination.name(),
                }),
                "mail_scanner",
            );
            if let Err(e) = insert_event(conn, &event) {
                warn!(error = %e, transaction_id = %id, "failed to write audit event");
            }

            debug!(transaction_id = %id, "transaction inserted");
            Ok(id)
        }
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            let existing: Option<i64> = conn
                .query_row(
                    "SELECT id FROM transactions WHERE idempotency_hash = ?1",
                    [&hash],
                    |row| row.get(0),
                )
                .optional()?;
            let id = existing.ok_or_else(|| anyhow!("Constraint violation without a matching transaction"))?;
            warn!(transaction_id = id, "transaction already recorded, skipping insert");
            Ok(id.to_string())
        }
        Err(e) => Err(e.into()),
    }
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map_err(|_| rusqlite::Error::InvalidQuery)?
                    .with_timezone(&Utc),
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json)
                    .map_err(|_| rusqlite::Error::InvalidQuery)?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

pub fn verify_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;

    Ok(count)
}

// ============================================================================
// SQLITE LEDGER
// ============================================================================

/// Local ledger stored in a single SQLite file
pub struct SqliteLedger {
    conn: Connection,
}

impl SqliteLedger {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open ledger database: {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        setup_database(&conn)?;
        Ok(SqliteLedger { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl Ledger for SqliteLedger {
    fn accounts(&self) -> Result<Vec<AccountRecord>> {
        get_accounts(&self.conn)
    }

    fn recent_transactions(&self, since: DateTime<Utc>) -> Result<Vec<LedgerTransaction>> {
        get_transactions_since(&self.conn, since)
    }

    fn create_transaction(&self, transaction: &NewTransaction) -> Result<String> {
        insert_transaction(&self.conn, transaction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Destination, TransactionKind};
    use chrono::TimeZone;
    use std::io::Write;

    fn create_test_transaction(day: u32, dollars: u64, destination: &str) -> NewTransaction {
        NewTransaction {
            date: Utc.with_ymd_and_hms(2024, 3, day, 14, 0, 0).unwrap(),
            amount: DollarAmount::new(dollars, 25),
            description: format!("Uncategorized transaction to {}", destination),
            source_account_id: "1".to_string(),
            destination: Destination::Named(destination.to_string()),
            kind: TransactionKind::Withdrawal,
        }
    }

    #[test]
    fn test_insert_is_idempotent() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        let tx = create_test_transaction(15, 42, "Kwik Trip");

        let first = ledger.create_transaction(&tx).unwrap();
        let second = ledger.create_transaction(&tx).unwrap();

        assert_eq!(first, second);
        assert_eq!(verify_count(ledger.connection()).unwrap(), 1);
    }

    #[test]
    fn test_recent_transactions_newest_first() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        ledger.create_transaction(&create_test_transaction(1, 10, "Old")).unwrap();
        ledger.create_transaction(&create_test_transaction(10, 20, "Middle")).unwrap();
        ledger.create_transaction(&create_test_transaction(20, 30, "New")).unwrap();

        let since = Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap();
        let recent = ledger.recent_transactions(since).unwrap();

        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].destination_name.as_deref(), Some("New"));
        assert_eq!(recent[0].amount, DollarAmount::new(30, 25));
        assert_eq!(recent[1].destination_name.as_deref(), Some("Middle"));
        assert_eq!(recent[1].date, Utc.with_ymd_and_hms(2024, 3, 10, 14, 0, 0).unwrap());
    }

    #[test]
    fn test_accounts_round_trip_in_insert_order() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        let mut closed = AccountRecord::new("7", "Old Visa", AccountKind::Liability);
        closed.active = false;

        upsert_accounts(
            ledger.connection(),
            &[
                AccountRecord::new("3", "Checking", AccountKind::Asset),
                AccountRecord::new("5", "Kwik Trip", AccountKind::Expense),
                closed.clone(),
            ],
        )
        .unwrap();

        let accounts = ledger.accounts().unwrap();
        let ids: Vec<_> = accounts.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "5", "7"]);
        assert_eq!(accounts[2], closed);

        // Renaming keeps the position
        upsert_accounts(
            ledger.connection(),
            &[AccountRecord::new("3", "Main Checking", AccountKind::Asset)],
        )
        .unwrap();
        assert_eq!(ledger.accounts().unwrap()[0].name, "Main Checking");
    }

    #[test]
    fn test_load_accounts_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "id,name,kind,active").unwrap();
        writeln!(file, "1,Checking,asset,true").unwrap();
        writeln!(file, "2,Kwik Trip,expense,true").unwrap();
        writeln!(file, "3,Opening balance,initial-balance,false").unwrap();
        file.flush().unwrap();

        let accounts = load_accounts_csv(file.path()).unwrap();
        assert_eq!(accounts.len(), 3);
        assert_eq!(accounts[1].name, "Kwik Trip");
        assert_eq!(accounts[2].kind, AccountKind::InitialBalance);
        assert!(!accounts[2].active);
    }

    #[test]
    fn test_oversized_amount_is_an_error() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        let mut tx = create_test_transaction(15, 42, "Kwik Trip");
        tx.amount = DollarAmount::new(u64::MAX, 0);

        let err = ledger.create_transaction(&tx).unwrap_err();
        assert!(err.to_string().contains("too large"));
        assert_eq!(verify_count(ledger.connection()).unwrap(), 0);
    }

    #[test]
    fn test_create_writes_audit_event() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        let id = ledger
            .create_transaction(&create_test_transaction(15, 42, "Kwik Trip"))
            .unwrap();

        let events = get_events_for_entity(ledger.connection(), "transaction", &id).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "transaction_created");
        assert_eq!(events[0].data["destination"], "Kwik Trip");
    }

    #[test]
    fn test_compute_idempotency_hash() {
        let tx = create_test_transaction(15, 42, "Kwik Trip");
        let hash1 = compute_idempotency_hash(&tx);
        let hash2 = compute_idempotency_hash(&tx);

        assert_eq!(hash1, hash2, "Same transaction should produce same hash");
        assert_eq!(hash1.len(), 64, "SHA-256 hash should be 64 hex characters");
        assert_ne!(hash1, compute_idempotency_hash(&create_test_transaction(16, 42, "Kwik Trip")));
    }
}
