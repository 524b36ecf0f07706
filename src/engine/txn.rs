//! REVENANT - Transaction Engine
//! Queued-command transactions with optimistic-concurrency validation
//! (MULTI / DISCARD / WATCH / UNWATCH / EXEC).
//!
//! Isolation is optimistic only: EXEC validates the watch-version
//! snapshot and then runs the queue through the ordinary dispatch path
//! without holding shard locks across commands. A conflicting mutation
//! since WATCH aborts the batch; one arriving during the batch does not.

use crate::error::Result;
use crate::types::{Request, Response};

use super::db::Db;
use super::session::Session;

/// MULTI: open a transaction. The queue starts empty; an already-open
/// transaction is an error and leaves state untouched.
pub fn multi(req: &Request, session: &mut Session) -> Response {
    if session.in_transaction {
        return Response::error(&req.seq_id, "already in transaction");
    }
    session.in_transaction = true;
    session.queue.clear();
    Response::ok(&req.seq_id, Vec::new())
}

/// DISCARD: drop the open transaction, reporting how many commands were
/// queued.
pub fn discard(req: &Request, session: &mut Session) -> Response {
    if !session.in_transaction {
        return Response::error(&req.seq_id, "not in transaction");
    }
    let queued = session.queue.len() as i64;
    session.reset_transaction();
    Response::num(&req.seq_id, queued)
}

/// WATCH key...: record the current version of each existing key.
/// Watching a nonexistent key is a no-op for that key. Only legal while
/// no transaction is open.
pub fn watch(db: &Db, req: &Request, session: &mut Session) -> Response {
    if req.args.is_empty() {
        return Response::error(&req.seq_id, "WATCH requires at least one key");
    }
    if session.in_transaction {
        return Response::error(&req.seq_id, "WATCH not allowed in transaction");
    }
    let mut count = 0;
    for key in &req.args {
        if let Some(version) = db.version_of(key) {
            session.watch.insert(key.clone(), version);
            count += 1;
        }
    }
    Response::num(&req.seq_id, count)
}

/// UNWATCH key...: remove the given keys from the watch set.
pub fn unwatch(req: &Request, session: &mut Session) -> Response {
    if req.args.is_empty() {
        return Response::error(&req.seq_id, "UNWATCH requires at least one key");
    }
    let mut count = 0;
    for key in &req.args {
        if session.watch.remove(key).is_some() {
            count += 1;
        }
    }
    Response::num(&req.seq_id, count)
}

/// EXEC: validate the watch set, then run every queued command in order
/// through `run` (the ordinary dispatch path, so the commands hit the AOF
/// now, not at enqueue time). Inner responses are discarded; the reply
/// reports the number of commands applied. Transaction state is cleared
/// whatever the outcome. Fatal errors from `run` propagate.
pub fn exec<F>(db: &Db, req: &Request, session: &mut Session, mut run: F) -> Result<Response>
where
    F: FnMut(&Request) -> Result<Response>,
{
    if !session.in_transaction {
        return Ok(Response::error(&req.seq_id, "not in transaction"));
    }
    if !db.watch_unchanged(&session.watch) {
        session.reset_transaction();
        return Ok(Response::error(
            &req.seq_id,
            "EXEC aborted: watched key changed",
        ));
    }
    let queue = std::mem::take(&mut session.queue);
    session.reset_transaction();
    for item in &queue {
        let _ = run(item)?;
    }
    Ok(Response::num(&req.seq_id, queue.len() as i64))
}

/// Returns true when EXEC produced the optimistic-conflict abort, as
/// opposed to a generic error.
pub fn is_abort(resp: &Response) -> bool {
    !resp.is_ok() && resp.args.first().map(|s| s.starts_with("EXEC aborted")) == Some(true)
}
