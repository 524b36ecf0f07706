//! REVENANT - Storage Engine Core
//! Wires the subsystems into the [`Store`]: logical partitions, the
//! command registry, the transaction engine and the append-only log.
//!
//! ## Dispatch order for a mutating command
//! validate -> append to AOF -> execute. Validation failures never reach
//! the log; append failures are fatal because responding success for a
//! write that was never made durable would break the recovery contract.

pub mod aof;
pub mod commands;
pub mod db;
pub mod metrics;
pub mod session;
pub mod shard;
pub mod skiplist;
pub mod txn;

use crate::config::Config;
use crate::error::{Result, RevenantError};
use crate::types::{
    Request, Response, CMD_DBSIZE, CMD_DISCARD, CMD_EXEC, CMD_MULTI, CMD_PING, CMD_REWRITEAOF,
    CMD_SELECT, CMD_SET, CMD_UNWATCH, CMD_WATCH, CMD_ZADD,
};

use aof::Aof;
use commands::{format_float, CommandRegistry};
use db::{Db, EntryValue};
use metrics::StoreMetrics;
use session::Session;

/// The key-value engine: a fixed array of logical partitions behind one
/// command dispatcher, with optional AOF durability.
///
/// The store itself is stateless with respect to clients: everything
/// per-connection (selected partition, open transaction, watch set) lives
/// in the caller's [`Session`], so one `Store` can be shared across
/// threads behind an `Arc`.
pub struct Store {
    config: Config,
    dbs: Vec<Db>,
    aof: Option<Aof>,
    registry: CommandRegistry,
    pub metrics: StoreMetrics,
}

impl Store {
    /// Open the store: create the data directory, replay the existing log
    /// into memory, then attach the live AOF for subsequent writes.
    pub fn open(config: Config) -> Result<Self> {
        config.ensure_dirs()?;
        let mut store = Self::detached(config);

        let path = store.config.aof_path();
        let mut session = Session::detached();
        let replayed = Aof::replay_records(&path, None, |req| {
            let resp = store.handle(&req, &mut session)?;
            if !resp.is_ok() {
                log::warn!(
                    "replayed record '{}' produced an error: {:?}",
                    req.cmd,
                    resp.args
                );
            }
            store.metrics.record_replayed();
            Ok(())
        })?;
        log::info!("replayed {replayed} AOF records from {}", path.display());

        store.aof = Some(Aof::open(path, store.config.fsync)?);
        Ok(store)
    }

    /// In-memory store without durability. Used for the rewrite snapshot
    /// replay and for tests that do not touch the log.
    pub fn detached(config: Config) -> Self {
        let dbs = (0..config.max_db)
            .map(|_| Db::new(config.shard_count, config.skiplist_height))
            .collect();
        Self {
            config,
            dbs,
            aof: None,
            registry: CommandRegistry::new(),
            metrics: StoreMetrics::new(),
        }
    }

    /// The configuration this store was opened with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Dispatch one request against the given session. Command-level
    /// failures (unknown command, bad arity, wrong type) come back as
    /// error responses; a returned `Err` means the store itself is in
    /// trouble (I/O failure, corrupt log) and the caller should stop.
    pub fn handle(&self, req: &Request, session: &mut Session) -> Result<Response> {
        self.metrics.record_command();
        let cmd = req.cmd.to_uppercase();
        match cmd.as_str() {
            CMD_PING => Ok(Response::ok(&req.seq_id, vec!["PONG".to_string()])),
            CMD_SELECT => Ok(self.select(req, session)),
            CMD_DBSIZE => Ok(Response::num(
                &req.seq_id,
                self.dbs[session.db_index].len() as i64,
            )),
            CMD_REWRITEAOF => {
                self.rewrite_aof()?;
                Ok(Response::ok(&req.seq_id, Vec::new()))
            }
            CMD_MULTI => Ok(txn::multi(req, session)),
            CMD_DISCARD => Ok(txn::discard(req, session)),
            CMD_WATCH => Ok(txn::watch(&self.dbs[session.db_index], req, session)),
            CMD_UNWATCH => Ok(txn::unwatch(req, session)),
            CMD_EXEC => {
                let db_index = session.db_index;
                let resp = txn::exec(&self.dbs[db_index], req, session, |item| {
                    self.run_data_command(item, db_index)
                })?;
                if txn::is_abort(&resp) {
                    self.metrics.record_txn_abort();
                }
                Ok(resp)
            }
            _ => {
                if session.in_transaction {
                    Ok(self.enqueue(req, session))
                } else {
                    self.run_data_command(req, session.db_index)
                }
            }
        }
    }

    /// SELECT index: switch the session's partition. Rejected while a
    /// transaction is open, since the queue was built against the old one.
    fn select(&self, req: &Request, session: &mut Session) -> Response {
        if session.in_transaction {
            return Response::error(&req.seq_id, "SELECT not allowed in transaction");
        }
        let index: usize = match req.args.first().map(|s| s.parse()) {
            Some(Ok(n)) => n,
            _ => return Response::error(&req.seq_id, "SELECT requires a partition index"),
        };
        if index >= self.dbs.len() {
            return Response::error(
                &req.seq_id,
                format!("partition index out of range: {index}"),
            );
        }
        session.db_index = index;
        Response::ok(&req.seq_id, Vec::new())
    }

    /// Queue a data command inside an open transaction. Commands are
    /// queued verbatim without validation; a malformed one surfaces its
    /// error at EXEC time, where it is rejected before reaching the log.
    fn enqueue(&self, req: &Request, session: &mut Session) -> Response {
        session.queue.push(req.clone());
        Response::ok(&req.seq_id, vec!["QUEUED".to_string()])
    }

    /// Validate, append (for logged commands) and execute one data
    /// command against a partition. This is the single path shared by
    /// direct dispatch, EXEC and AOF replay; replay stores have no AOF
    /// attached, so replayed records are not logged again.
    fn run_data_command(&self, req: &Request, db_index: usize) -> Result<Response> {
        let cmd = req.cmd.to_uppercase();
        let spec = match self.registry.get(cmd.as_str()) {
            Some(spec) => spec,
            None => {
                return Ok(Response::error(
                    &req.seq_id,
                    format!("unknown command '{}'", req.cmd),
                ))
            }
        };
        if let Err(reason) = (spec.validate)(req) {
            return Ok(Response::error(&req.seq_id, reason));
        }
        if spec.logged {
            if let Some(aof) = &self.aof {
                let records = aof.append(req, db_index)?;
                self.metrics.record_append(records as u64);
            }
        }
        Ok((spec.exec)(&self.dbs[db_index], req))
    }

    /// Compact the log online. The snapshot length is recorded first, the
    /// prefix up to it is replayed into a scratch store and serialized
    /// back into SELECT/SET/ZADD records, and writes that landed in the
    /// log during that window are preserved verbatim as the new tail.
    /// Expiries are not carried into the compacted prefix: a key whose
    /// deadline already passed is simply absent from the snapshot.
    fn rewrite_aof(&self) -> Result<()> {
        let aof = self
            .aof
            .as_ref()
            .ok_or_else(|| RevenantError::Config("store opened without an AOF".to_string()))?;
        let snapshot_len = aof.len()?;
        log::info!("AOF rewrite started, snapshot at {snapshot_len} bytes");

        let scratch = Store::detached(self.config.clone());
        let mut session = Session::detached();
        Aof::replay_records(aof.path(), Some(snapshot_len), |req| {
            scratch.handle(&req, &mut session)?;
            Ok(())
        })?;

        let mut buffer = Vec::new();
        for (index, db) in scratch.dbs.iter().enumerate() {
            if db.is_empty() {
                continue;
            }
            let marker = Request::new("", CMD_SELECT, vec![index.to_string()]);
            buffer.extend(aof::encode_record(&marker)?);

            let mut encode_err = None;
            db.for_each(|key, entry| {
                let record = match &entry.value {
                    EntryValue::Str(value) => Request::new(
                        "",
                        CMD_SET,
                        vec![key.to_string(), value.clone()],
                    ),
                    EntryValue::ZSet(list) => {
                        let mut args = vec![key.to_string()];
                        for (member, score) in list.members() {
                            args.push(format_float(score));
                            args.push(member);
                        }
                        Request::new("", CMD_ZADD, args)
                    }
                };
                match aof::encode_record(&record) {
                    Ok(bytes) => buffer.extend(bytes),
                    Err(e) => encode_err = Some(e),
                }
            });
            if let Some(e) = encode_err {
                return Err(e);
            }
        }

        aof.swap_tail(snapshot_len, buffer)?;
        self.metrics.record_rewrite();
        log::info!("AOF rewrite finished");
        Ok(())
    }
}
