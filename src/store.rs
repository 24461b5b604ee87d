//! Persistence gateway: durable gate records, block snapshots and links.
//!
//! [`SqliteGateStore`] is the production backend. [`MemoryGateStore`] keeps
//! the same contract in memory for embedding and tests.
//!
//! Both backends verify every record's stored fingerprint on load and skip
//! (with a warning) any record whose content no longer matches it.

use crate::error::{StoreError, StoreResult};
use crate::gate::Gate;
use crate::integrity;
use crate::types::{BlockPos, BlockState, GateId, GateType, LinkKind, MechanismLink};
use log::warn;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use uuid::Uuid;

pub trait GateStore: Send + Sync {
    /// Upsert the gate row and replace its block rows, all or nothing.
    fn save_gate(&self, gate: &Gate) -> StoreResult<()>;

    /// Every record whose fingerprint verifies, closed-or-open as stored.
    fn load_all_gates(&self) -> StoreResult<Vec<Gate>>;

    /// Remove the record together with its blocks and links.
    fn delete_gate(&self, id: GateId) -> StoreResult<()>;

    /// Replace the gate's link set, all or nothing.
    fn save_links(&self, id: GateId, world: &str, links: &[MechanismLink]) -> StoreResult<()>;

    fn load_links(&self, id: GateId) -> StoreResult<Vec<MechanismLink>>;

    /// Digest stored with the record; `None` if there is no record.
    fn stored_fingerprint(&self, id: GateId) -> StoreResult<Option<String>>;
}

/// Keep only gates whose stored digest still matches their content.
fn keep_verified(id: &str, gate: Gate, stored: &str, out: &mut Vec<Gate>) {
    if integrity::verify(&gate, stored) {
        out.push(gate);
    } else {
        warn!("Gate {} failed integrity check, skipping...", id);
    }
}

fn parse_uuid(id: &str, value: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(value).map_err(|e| StoreError::Malformed {
        id: id.to_string(),
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// SQLite backend
// ---------------------------------------------------------------------------

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS gates (
    id TEXT PRIMARY KEY,
    owner TEXT NOT NULL,
    world TEXT NOT NULL,
    corner1_x INTEGER NOT NULL,
    corner1_y INTEGER NOT NULL,
    corner1_z INTEGER NOT NULL,
    corner2_x INTEGER NOT NULL,
    corner2_y INTEGER NOT NULL,
    corner2_z INTEGER NOT NULL,
    gate_type TEXT NOT NULL DEFAULT 'NORMAL',
    is_open BOOLEAN NOT NULL DEFAULT 0,
    integrity_hash TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS gate_blocks (
    gate_id TEXT NOT NULL,
    x INTEGER NOT NULL,
    y INTEGER NOT NULL,
    z INTEGER NOT NULL,
    block_data TEXT NOT NULL,
    PRIMARY KEY (gate_id, x, y, z),
    FOREIGN KEY (gate_id) REFERENCES gates(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS gate_links (
    gate_id TEXT NOT NULL,
    world TEXT NOT NULL,
    x INTEGER NOT NULL,
    y INTEGER NOT NULL,
    z INTEGER NOT NULL,
    link_type TEXT NOT NULL DEFAULT 'LEVER',
    PRIMARY KEY (gate_id, x, y, z),
    FOREIGN KEY (gate_id) REFERENCES gates(id) ON DELETE CASCADE
);
"#;

struct GateRow {
    id: String,
    owner: String,
    world: String,
    corner1: BlockPos,
    corner2: BlockPos,
    gate_type: String,
    is_open: bool,
    integrity_hash: String,
}

impl GateRow {
    fn into_gate(self, blocks: BTreeMap<BlockPos, BlockState>) -> StoreResult<Gate> {
        let id = parse_uuid(&self.id, &self.id)?;
        let owner = parse_uuid(&self.id, &self.owner)?;
        // Unknown type names fall back to the default type.
        let gate_type = self.gate_type.parse().unwrap_or(GateType::Normal);
        Gate::restore(
            id,
            owner,
            self.world,
            (self.corner1, self.corner2),
            gate_type,
            blocks,
            self.is_open,
        )
        .map_err(|e| StoreError::Malformed {
            id: self.id,
            reason: e.to_string(),
        })
    }
}

/// SQLite-backed store. One connection, serialised behind a mutex.
pub struct SqliteGateStore {
    conn: Mutex<Connection>,
}

impl SqliteGateStore {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        log::debug!("SQLite journal mode: {}", mode);
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl GateStore for SqliteGateStore {
    fn save_gate(&self, gate: &Gate) -> StoreResult<()> {
        let id = gate.id().to_string();
        let (c1, c2) = gate.corners();
        let hash = integrity::fingerprint(gate);

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO gates (id, owner, world, corner1_x, corner1_y, corner1_z,
                                corner2_x, corner2_y, corner2_z, gate_type, is_open, integrity_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(id) DO UPDATE SET
                owner = excluded.owner,
                world = excluded.world,
                corner1_x = excluded.corner1_x,
                corner1_y = excluded.corner1_y,
                corner1_z = excluded.corner1_z,
                corner2_x = excluded.corner2_x,
                corner2_y = excluded.corner2_y,
                corner2_z = excluded.corner2_z,
                gate_type = excluded.gate_type,
                is_open = excluded.is_open,
                integrity_hash = excluded.integrity_hash",
            params![
                id,
                gate.owner().to_string(),
                gate.world(),
                c1.x,
                c1.y,
                c1.z,
                c2.x,
                c2.y,
                c2.z,
                gate.gate_type().as_str(),
                gate.is_open(),
                hash,
            ],
        )?;
        tx.execute("DELETE FROM gate_blocks WHERE gate_id = ?1", params![id])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO gate_blocks (gate_id, x, y, z, block_data) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (pos, state) in gate.blocks() {
                insert.execute(params![id, pos.x, pos.y, pos.z, state.as_str()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn load_all_gates(&self) -> StoreResult<Vec<Gate>> {
        let conn = self.conn.lock();
        let rows = {
            let mut stmt = conn.prepare(
                "SELECT id, owner, world, corner1_x, corner1_y, corner1_z,
                        corner2_x, corner2_y, corner2_z, gate_type, is_open, integrity_hash
                 FROM gates",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(GateRow {
                        id: row.get(0)?,
                        owner: row.get(1)?,
                        world: row.get(2)?,
                        corner1: BlockPos::new(row.get(3)?, row.get(4)?, row.get(5)?),
                        corner2: BlockPos::new(row.get(6)?, row.get(7)?, row.get(8)?),
                        gate_type: row.get(9)?,
                        is_open: row.get(10)?,
                        integrity_hash: row.get::<_, Option<String>>(11)?.unwrap_or_default(),
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut block_stmt =
            conn.prepare("SELECT x, y, z, block_data FROM gate_blocks WHERE gate_id = ?1")?;
        let mut gates = Vec::with_capacity(rows.len());
        for row in rows {
            let blocks = block_stmt
                .query_map(params![row.id], |r| {
                    Ok((
                        BlockPos::new(r.get(0)?, r.get(1)?, r.get(2)?),
                        BlockState::new(r.get::<_, String>(3)?),
                    ))
                })?
                .collect::<Result<BTreeMap<_, _>, _>>()?;

            let id = row.id.clone();
            let stored = row.integrity_hash.clone();
            match row.into_gate(blocks) {
                Ok(gate) => keep_verified(&id, gate, &stored, &mut gates),
                Err(e) => warn!("Skipping unreadable gate record: {}", e),
            }
        }
        Ok(gates)
    }

    fn delete_gate(&self, id: GateId) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM gates WHERE id = ?1", params![id.to_string()])?;
        Ok(())
    }

    fn save_links(&self, id: GateId, world: &str, links: &[MechanismLink]) -> StoreResult<()> {
        let id = id.to_string();
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM gate_links WHERE gate_id = ?1", params![id])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO gate_links (gate_id, world, x, y, z, link_type)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for link in links {
                insert.execute(params![
                    id,
                    world,
                    link.pos.x,
                    link.pos.y,
                    link.pos.z,
                    link.kind.as_str()
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn load_links(&self, id: GateId) -> StoreResult<Vec<MechanismLink>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT x, y, z, link_type FROM gate_links WHERE gate_id = ?1")?;
        let links = stmt
            .query_map(params![id.to_string()], |row| {
                let kind: String = row.get(3)?;
                Ok(MechanismLink {
                    pos: BlockPos::new(row.get(0)?, row.get(1)?, row.get(2)?),
                    kind: kind.parse().unwrap_or(LinkKind::Redstone),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(links)
    }

    fn stored_fingerprint(&self, id: GateId) -> StoreResult<Option<String>> {
        let conn = self.conn.lock();
        let hash = conn
            .query_row(
                "SELECT integrity_hash FROM gates WHERE id = ?1",
                params![id.to_string()],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(hash.map(Option::unwrap_or_default))
    }
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct MemoryRecord {
    gate: Gate,
    fingerprint: String,
}

#[derive(Default)]
struct MemoryTables {
    gates: HashMap<GateId, MemoryRecord>,
    links: HashMap<GateId, Vec<MechanismLink>>,
    saves: HashMap<GateId, usize>,
}

/// Store that keeps records in memory. Can be switched to fail every call.
#[derive(Default)]
pub struct MemoryGateStore {
    tables: Mutex<MemoryTables>,
    unavailable: AtomicBool,
}

impl MemoryGateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// How many times `save_gate` succeeded for `id`.
    pub fn save_count(&self, id: GateId) -> usize {
        self.tables.lock().saves.get(&id).copied().unwrap_or(0)
    }

    pub fn contains(&self, id: GateId) -> bool {
        self.tables.lock().gates.contains_key(&id)
    }

    /// Stored `is_open` of a record.
    pub fn stored_open(&self, id: GateId) -> Option<bool> {
        self.tables.lock().gates.get(&id).map(|r| r.gate.is_open())
    }

    /// Replace a record's digest, as an out-of-band edit would.
    pub fn overwrite_fingerprint(&self, id: GateId, digest: &str) {
        if let Some(record) = self.tables.lock().gates.get_mut(&id) {
            record.fingerprint = digest.to_string();
        }
    }

    fn check(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store switched off".into()))
        } else {
            Ok(())
        }
    }
}

impl GateStore for MemoryGateStore {
    fn save_gate(&self, gate: &Gate) -> StoreResult<()> {
        self.check()?;
        let mut tables = self.tables.lock();
        tables.gates.insert(
            gate.id(),
            MemoryRecord {
                gate: gate.clone(),
                fingerprint: integrity::fingerprint(gate),
            },
        );
        *tables.saves.entry(gate.id()).or_default() += 1;
        Ok(())
    }

    fn load_all_gates(&self) -> StoreResult<Vec<Gate>> {
        self.check()?;
        let tables = self.tables.lock();
        let mut gates = Vec::with_capacity(tables.gates.len());
        for record in tables.gates.values() {
            let g = &record.gate;
            let fresh = Gate::restore(
                g.id(),
                g.owner(),
                g.world(),
                g.corners(),
                g.gate_type(),
                g.blocks().clone(),
                g.is_open(),
            );
            match fresh {
                Ok(gate) => keep_verified(&g.id().to_string(), gate, &record.fingerprint, &mut gates),
                Err(e) => warn!("Skipping unreadable gate record {}: {}", g.id(), e),
            }
        }
        Ok(gates)
    }

    fn delete_gate(&self, id: GateId) -> StoreResult<()> {
        self.check()?;
        let mut tables = self.tables.lock();
        tables.gates.remove(&id);
        tables.links.remove(&id);
        Ok(())
    }

    fn save_links(&self, id: GateId, _world: &str, links: &[MechanismLink]) -> StoreResult<()> {
        self.check()?;
        self.tables.lock().links.insert(id, links.to_vec());
        Ok(())
    }

    fn load_links(&self, id: GateId) -> StoreResult<Vec<MechanismLink>> {
        self.check()?;
        Ok(self.tables.lock().links.get(&id).cloned().unwrap_or_default())
    }

    fn stored_fingerprint(&self, id: GateId) -> StoreResult<Option<String>> {
        self.check()?;
        Ok(self
            .tables
            .lock()
            .gates
            .get(&id)
            .map(|r| r.fingerprint.clone()))
    }
}
