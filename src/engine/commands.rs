//! REVENANT - Command Registry & Handlers
//! The data-command surface: string and sorted-set operations, keyspace
//! introspection and expiry control.
//!
//! The registry is an explicit, immutable mapping built once at startup
//! and handed to the dispatcher; there is no process-wide mutable
//! registration. Each command carries a validation stage (arity, numeric
//! parsing) that runs before anything is appended to the AOF, so malformed
//! commands never reach the log.

use std::cell::Cell;
use std::collections::HashMap;

use crate::types::{Request, Response, NIL};
use crate::types::{
    CMD_ABSEXPIRE, CMD_DEL, CMD_EXISTS, CMD_EXPIRE, CMD_GET, CMD_INCRBY, CMD_PERSIST, CMD_SET,
    CMD_SETEX, CMD_SETNX, CMD_TTL, CMD_TYPE, CMD_ZADD, CMD_ZCARD, CMD_ZRANGE, CMD_ZRANK,
    CMD_ZREM, CMD_ZSCORE,
};

use super::db::{Db, Entry, EntryValue};

type Validate = fn(&Request) -> Result<(), String>;
type Exec = fn(&Db, &Request) -> Response;

/// One registered command: durability class, validation and handler.
pub struct CommandSpec {
    pub name: &'static str,
    /// True for commands that mutate data or TTLs and must hit the AOF.
    pub logged: bool,
    pub validate: Validate,
    pub exec: Exec,
}

/// Immutable name -> command mapping, constructed once at startup.
pub struct CommandRegistry {
    map: HashMap<&'static str, CommandSpec>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        let mut map = HashMap::new();
        let mut add = |spec: CommandSpec| {
            map.insert(spec.name, spec);
        };

        add(spec(CMD_SET, true, validate_set, exec_set));
        add(spec(CMD_GET, false, validate_nonempty, exec_get));
        add(spec(CMD_INCRBY, true, validate_incrby, exec_incrby));
        add(spec(CMD_SETNX, true, validate_set, exec_setnx));
        add(spec(CMD_SETEX, true, validate_setex, exec_setex));

        add(spec(CMD_ZADD, true, validate_zadd, exec_zadd));
        add(spec(CMD_ZREM, true, validate_zrem, exec_zrem));
        add(spec(CMD_ZRANGE, false, validate_zrange, exec_zrange));
        add(spec(CMD_ZCARD, false, validate_one_key, exec_zcard));
        add(spec(CMD_ZSCORE, false, validate_two_args, exec_zscore));
        add(spec(CMD_ZRANK, false, validate_two_args, exec_zrank));

        add(spec(CMD_EXISTS, false, validate_one_key, exec_exists));
        add(spec(CMD_TYPE, false, validate_one_key, exec_type));
        add(spec(CMD_TTL, false, validate_one_key, exec_ttl));
        add(spec(CMD_DEL, true, validate_one_key, exec_del));
        add(spec(CMD_EXPIRE, true, validate_key_int, exec_expire));
        add(spec(CMD_PERSIST, true, validate_one_key, exec_persist));

        // Replay-internal: emitted into the log by the relative-to-absolute
        // translation, never appended by the live path itself.
        add(spec(CMD_ABSEXPIRE, false, validate_key_int, exec_absexpire));

        Self { map }
    }

    /// Look up a command by its (uppercased) name.
    pub fn get(&self, name: &str) -> Option<&CommandSpec> {
        self.map.get(name)
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn spec(name: &'static str, logged: bool, validate: Validate, exec: Exec) -> CommandSpec {
    CommandSpec {
        name,
        logged,
        validate,
        exec,
    }
}

// -- validation -------------------------------------------------------------

fn validate_nonempty(req: &Request) -> Result<(), String> {
    if req.args.is_empty() {
        return Err(format!("wrong number of arguments for '{}'", req.cmd));
    }
    Ok(())
}

fn validate_set(req: &Request) -> Result<(), String> {
    if req.args.is_empty() || req.args.len() % 2 != 0 {
        return Err(format!("wrong number of arguments for '{}'", req.cmd));
    }
    Ok(())
}

fn validate_one_key(req: &Request) -> Result<(), String> {
    if req.args.len() != 1 {
        return Err(format!("wrong number of arguments for '{}'", req.cmd));
    }
    Ok(())
}

fn validate_two_args(req: &Request) -> Result<(), String> {
    if req.args.len() != 2 {
        return Err(format!("wrong number of arguments for '{}'", req.cmd));
    }
    Ok(())
}

fn validate_incrby(req: &Request) -> Result<(), String> {
    validate_two_args(req)?;
    parse_float(&req.args[1])?;
    Ok(())
}

fn validate_setex(req: &Request) -> Result<(), String> {
    if req.args.len() != 3 {
        return Err(format!("wrong number of arguments for '{}'", req.cmd));
    }
    parse_int(&req.args[2])?;
    Ok(())
}

fn validate_key_int(req: &Request) -> Result<(), String> {
    validate_two_args(req)?;
    parse_int(&req.args[1])?;
    Ok(())
}

fn validate_zadd(req: &Request) -> Result<(), String> {
    if req.args.len() < 3 || req.args.len() % 2 != 1 {
        return Err(format!("wrong number of arguments for '{}'", req.cmd));
    }
    for pair in req.args[1..].chunks(2) {
        parse_float(&pair[0])?;
    }
    Ok(())
}

fn validate_zrem(req: &Request) -> Result<(), String> {
    if req.args.len() < 2 {
        return Err(format!("wrong number of arguments for '{}'", req.cmd));
    }
    Ok(())
}

fn validate_zrange(req: &Request) -> Result<(), String> {
    if req.args.len() != 3 {
        return Err(format!("wrong number of arguments for '{}'", req.cmd));
    }
    parse_int(&req.args[1])?;
    parse_int(&req.args[2])?;
    Ok(())
}

fn parse_int(s: &str) -> Result<i64, String> {
    s.parse::<i64>()
        .map_err(|_| format!("value is not an integer: '{s}'"))
}

fn parse_float(s: &str) -> Result<f64, String> {
    s.parse::<f64>()
        .map_err(|_| format!("value is not a number: '{s}'"))
}

// -- string commands --------------------------------------------------------

/// Store a string value, replacing whatever was there and clearing any TTL.
/// Returns true when the key was newly created.
fn set_one(db: &Db, key: &str, value: &str) -> bool {
    let created = Cell::new(false);
    db.update_or_insert_entry(
        key,
        || {
            created.set(true);
            Entry::str(value)
        },
        |entry| {
            if !created.get() {
                entry.value = EntryValue::Str(value.to_string());
                entry.version += 1;
            }
        },
    );
    db.clear_ttl(key);
    created.get()
}

// SET k v [k v ...] -> count of newly created keys
fn exec_set(db: &Db, req: &Request) -> Response {
    let mut count = 0;
    for pair in req.args.chunks(2) {
        if set_one(db, &pair[0], &pair[1]) {
            count += 1;
        }
    }
    Response::num(&req.seq_id, count)
}

// GET k [k ...] -> one value (or NIL) per key
fn exec_get(db: &Db, req: &Request) -> Response {
    let mut res = Vec::with_capacity(req.args.len());
    for key in &req.args {
        let value = db.read_entry(key, |entry| match entry {
            Some(Entry {
                value: EntryValue::Str(s),
                ..
            }) => s.clone(),
            _ => NIL.to_string(),
        });
        res.push(value);
    }
    Response::ok(&req.seq_id, res)
}

// INCRBY k n -> the stored number grows by n
fn exec_incrby(db: &Db, req: &Request) -> Response {
    let key = &req.args[0];
    let delta = match parse_float(&req.args[1]) {
        Ok(n) => n,
        Err(e) => return Response::error(&req.seq_id, e),
    };
    let outcome = db.update_entry(key, |entry| match entry {
        None => Err("key does not exist".to_string()),
        Some(entry) => match &mut entry.value {
            EntryValue::Str(s) => match s.parse::<f64>() {
                Ok(old) => {
                    *s = format_float(old + delta);
                    entry.version += 1;
                    Ok(s.clone())
                }
                Err(_) => Err("value is not a number".to_string()),
            },
            EntryValue::ZSet(_) => Err("wrong type for INCRBY".to_string()),
        },
    });
    match outcome {
        Ok(new) => Response::ok(&req.seq_id, vec![new]),
        Err(e) => Response::error(&req.seq_id, e),
    }
}

// SETNX k v [k v ...] -> count of keys actually set (absent before)
fn exec_setnx(db: &Db, req: &Request) -> Response {
    let mut count = 0;
    for pair in req.args.chunks(2) {
        let (key, value) = (&pair[0], &pair[1]);
        if !db.contains(key) {
            db.put_entry(key, Entry::str(value.as_str()));
            count += 1;
        }
    }
    Response::num(&req.seq_id, count)
}

// SETEX k v secs -> set plus relative expiry
fn exec_setex(db: &Db, req: &Request) -> Response {
    let key = &req.args[0];
    let secs = match parse_int(&req.args[2]) {
        Ok(n) => n,
        Err(e) => return Response::error(&req.seq_id, e),
    };
    set_one(db, key, &req.args[1]);
    db.set_ttl_relative(key, secs);
    Response::ok(&req.seq_id, Vec::new())
}

// -- sorted-set commands ----------------------------------------------------

// ZADD key score member [score member ...] -> count of pairs applied
fn exec_zadd(db: &Db, req: &Request) -> Response {
    let key = &req.args[0];
    let outcome = db.update_or_insert_entry(
        key,
        || Entry::zset(db.skiplist_height()),
        |entry| match &mut entry.value {
            EntryValue::ZSet(list) => {
                entry.version += 1;
                let mut count = 0;
                for pair in req.args[1..].chunks(2) {
                    if let Ok(score) = parse_float(&pair[0]) {
                        list.insert(&pair[1], score);
                        count += 1;
                    }
                }
                Ok(count)
            }
            EntryValue::Str(_) => Err("wrong type for ZADD".to_string()),
        },
    );
    match outcome {
        Ok(count) => Response::num(&req.seq_id, count),
        Err(e) => Response::error(&req.seq_id, e),
    }
}

// ZREM key member [member ...] -> count of members removed
fn exec_zrem(db: &Db, req: &Request) -> Response {
    let key = &req.args[0];
    let outcome = db.update_entry(key, |entry| match entry {
        None => Ok(0),
        Some(entry) => match &mut entry.value {
            EntryValue::ZSet(list) => {
                entry.version += 1;
                let mut count = 0;
                for member in &req.args[1..] {
                    if list.remove(member) {
                        count += 1;
                    }
                }
                Ok(count)
            }
            EntryValue::Str(_) => Err("wrong type for ZREM".to_string()),
        },
    });
    match outcome {
        Ok(count) => Response::num(&req.seq_id, count),
        Err(e) => Response::error(&req.seq_id, e),
    }
}

// ZRANGE key start end -> members by ascending score position
fn exec_zrange(db: &Db, req: &Request) -> Response {
    let key = &req.args[0];
    let (start, end) = match (parse_int(&req.args[1]), parse_int(&req.args[2])) {
        (Ok(s), Ok(e)) => (s, e),
        _ => return Response::error(&req.seq_id, "invalid range bounds"),
    };
    let outcome = db.read_entry(key, |entry| match entry {
        None => Ok(vec![NIL.to_string()]),
        Some(Entry {
            value: EntryValue::ZSet(list),
            ..
        }) => Ok(list.range(start, end)),
        Some(_) => Err("wrong type for ZRANGE".to_string()),
    });
    match outcome {
        Ok(members) => Response::ok(&req.seq_id, members),
        Err(e) => Response::error(&req.seq_id, e),
    }
}

// ZCARD key -> member count (0 when the set does not exist)
fn exec_zcard(db: &Db, req: &Request) -> Response {
    let count = db.read_entry(&req.args[0], |entry| match entry {
        Some(Entry {
            value: EntryValue::ZSet(list),
            ..
        }) => list.len() as i64,
        _ => 0,
    });
    Response::num(&req.seq_id, count)
}

// ZSCORE key member -> the member's score
fn exec_zscore(db: &Db, req: &Request) -> Response {
    let outcome = db.read_entry(&req.args[0], |entry| match entry {
        None => Err("sorted set does not exist".to_string()),
        Some(Entry {
            value: EntryValue::ZSet(list),
            ..
        }) => list
            .score(&req.args[1])
            .ok_or_else(|| "member does not exist".to_string()),
        Some(_) => Err("wrong type for ZSCORE".to_string()),
    });
    match outcome {
        Ok(score) => Response::ok(&req.seq_id, vec![format_float(score)]),
        Err(e) => Response::error(&req.seq_id, e),
    }
}

// ZRANK key member -> 0-based ascending position
fn exec_zrank(db: &Db, req: &Request) -> Response {
    let outcome = db.read_entry(&req.args[0], |entry| match entry {
        None => Err("sorted set does not exist".to_string()),
        Some(Entry {
            value: EntryValue::ZSet(list),
            ..
        }) => list
            .rank(&req.args[1])
            .ok_or_else(|| "member does not exist".to_string()),
        Some(_) => Err("wrong type for ZRANK".to_string()),
    });
    match outcome {
        Ok(rank) => Response::num(&req.seq_id, rank as i64),
        Err(e) => Response::error(&req.seq_id, e),
    }
}

// -- keyspace commands ------------------------------------------------------

fn exec_exists(db: &Db, req: &Request) -> Response {
    let n = if db.contains(&req.args[0]) { 1 } else { 0 };
    Response::num(&req.seq_id, n)
}

fn exec_type(db: &Db, req: &Request) -> Response {
    let name = db.read_entry(&req.args[0], |entry| {
        entry.map(|e| e.type_name()).unwrap_or("none").to_string()
    });
    Response::ok(&req.seq_id, vec![name])
}

// TTL k -> remaining seconds, -1 when persistent
fn exec_ttl(db: &Db, req: &Request) -> Response {
    Response::num(&req.seq_id, db.ttl_secs(&req.args[0]))
}

fn exec_del(db: &Db, req: &Request) -> Response {
    let key = &req.args[0];
    let n = if db.contains(key) && db.remove_entry(key) {
        1
    } else {
        0
    };
    Response::num(&req.seq_id, n)
}

// EXPIRE k secs -> 1 if a TTL was attached, 0 for a missing key
fn exec_expire(db: &Db, req: &Request) -> Response {
    let key = &req.args[0];
    let secs = match parse_int(&req.args[1]) {
        Ok(n) => n,
        Err(e) => return Response::error(&req.seq_id, e),
    };
    if db.contains(key) {
        db.set_ttl_relative(key, secs);
        Response::num(&req.seq_id, 1)
    } else {
        Response::num(&req.seq_id, 0)
    }
}

// PERSIST k -> 1 if the key exists (TTL cleared), 0 otherwise
fn exec_persist(db: &Db, req: &Request) -> Response {
    let key = &req.args[0];
    if db.contains(key) {
        db.clear_ttl(key);
        Response::num(&req.seq_id, 1)
    } else {
        Response::num(&req.seq_id, 0)
    }
}

// ABSEXPIRE k unix_secs -> replay-internal absolute deadline
fn exec_absexpire(db: &Db, req: &Request) -> Response {
    let key = &req.args[0];
    let unix_secs = match parse_int(&req.args[1]) {
        Ok(n) => n,
        Err(e) => return Response::error(&req.seq_id, e),
    };
    if db.contains(key) {
        db.set_ttl_absolute(key, unix_secs);
        Response::num(&req.seq_id, 1)
    } else {
        Response::num(&req.seq_id, 0)
    }
}

/// Shortest round-trippable decimal representation.
pub fn format_float(v: f64) -> String {
    format!("{v}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Status;

    fn db() -> Db {
        Db::new(4, 4)
    }

    fn req(cmd: &str, args: &[&str]) -> Request {
        Request::new("t", cmd, args.iter().map(|s| s.to_string()).collect())
    }

    fn run(db: &Db, registry: &CommandRegistry, cmd: &str, args: &[&str]) -> Response {
        let request = req(cmd, args);
        let spec = registry.get(cmd).unwrap();
        if let Err(e) = (spec.validate)(&request) {
            return Response::error(&request.seq_id, e);
        }
        (spec.exec)(db, &request)
    }

    #[test]
    fn test_set_get_round_trip() {
        let db = db();
        let reg = CommandRegistry::new();
        let resp = run(&db, &reg, CMD_SET, &["a", "1", "b", "2"]);
        assert_eq!(resp.args, vec!["2"]); // two new keys

        let resp = run(&db, &reg, CMD_GET, &["a", "b", "missing"]);
        assert_eq!(resp.args, vec!["1", "2", NIL]);
    }

    #[test]
    fn test_set_overwrites_and_clears_ttl() {
        let db = db();
        let reg = CommandRegistry::new();
        run(&db, &reg, CMD_SET, &["k", "v1"]);
        run(&db, &reg, CMD_EXPIRE, &["k", "100"]);
        assert!(db.ttl_secs("k") > 0);

        let resp = run(&db, &reg, CMD_SET, &["k", "v2"]);
        assert_eq!(resp.args, vec!["0"]); // not newly created
        assert_eq!(db.ttl_secs("k"), -1); // prior TTL cleared
        assert_eq!(db.version_of("k"), Some(1));
    }

    #[test]
    fn test_set_wrong_arity_rejected() {
        let reg = CommandRegistry::new();
        let request = req(CMD_SET, &["only-key"]);
        assert!((reg.get(CMD_SET).unwrap().validate)(&request).is_err());
    }

    #[test]
    fn test_incrby() {
        let db = db();
        let reg = CommandRegistry::new();
        run(&db, &reg, CMD_SET, &["n", "10"]);
        let resp = run(&db, &reg, CMD_INCRBY, &["n", "5"]);
        assert_eq!(resp.args, vec!["15"]);
        assert_eq!(db.version_of("n"), Some(1));

        let resp = run(&db, &reg, CMD_INCRBY, &["missing", "1"]);
        assert_eq!(resp.status, Status::Error);

        run(&db, &reg, CMD_SET, &["s", "abc"]);
        let resp = run(&db, &reg, CMD_INCRBY, &["s", "1"]);
        assert_eq!(resp.status, Status::Error);
    }

    #[test]
    fn test_setnx_only_sets_absent() {
        let db = db();
        let reg = CommandRegistry::new();
        run(&db, &reg, CMD_SET, &["a", "old"]);
        let resp = run(&db, &reg, CMD_SETNX, &["a", "new", "b", "fresh"]);
        assert_eq!(resp.args, vec!["1"]); // only b was set

        let resp = run(&db, &reg, CMD_GET, &["a", "b"]);
        assert_eq!(resp.args, vec!["old", "fresh"]);
    }

    #[test]
    fn test_setex_sets_value_and_ttl() {
        let db = db();
        let reg = CommandRegistry::new();
        run(&db, &reg, CMD_SETEX, &["session", "token", "10"]);
        let resp = run(&db, &reg, CMD_GET, &["session"]);
        assert_eq!(resp.args, vec!["token"]);
        let ttl = db.ttl_secs("session");
        assert!(ttl > 5 && ttl <= 10);
    }

    #[test]
    fn test_zset_commands() {
        let db = db();
        let reg = CommandRegistry::new();
        let resp = run(&db, &reg, CMD_ZADD, &["board", "3", "carol", "1", "alice", "2", "bob"]);
        assert_eq!(resp.args, vec!["3"]);

        let resp = run(&db, &reg, CMD_ZRANGE, &["board", "0", "-1"]);
        assert_eq!(resp.args, vec!["alice", "bob", "carol"]);

        let resp = run(&db, &reg, CMD_ZRANK, &["board", "bob"]);
        assert_eq!(resp.args, vec!["1"]);

        let resp = run(&db, &reg, CMD_ZSCORE, &["board", "carol"]);
        assert_eq!(resp.args, vec!["3"]);

        let resp = run(&db, &reg, CMD_ZCARD, &["board"]);
        assert_eq!(resp.args, vec!["3"]);

        let resp = run(&db, &reg, CMD_ZREM, &["board", "bob", "nobody"]);
        assert_eq!(resp.args, vec!["1"]);
        let resp = run(&db, &reg, CMD_ZRANGE, &["board", "0", "-1"]);
        assert_eq!(resp.args, vec!["alice", "carol"]);
    }

    #[test]
    fn test_zadd_bad_score_rejected_before_exec() {
        let reg = CommandRegistry::new();
        let request = req(CMD_ZADD, &["k", "not-a-number", "m"]);
        assert!((reg.get(CMD_ZADD).unwrap().validate)(&request).is_err());
    }

    #[test]
    fn test_zadd_on_string_key_is_error() {
        let db = db();
        let reg = CommandRegistry::new();
        run(&db, &reg, CMD_SET, &["k", "v"]);
        let resp = run(&db, &reg, CMD_ZADD, &["k", "1", "m"]);
        assert_eq!(resp.status, Status::Error);
    }

    #[test]
    fn test_zscore_missing() {
        let db = db();
        let reg = CommandRegistry::new();
        let resp = run(&db, &reg, CMD_ZSCORE, &["nope", "m"]);
        assert_eq!(resp.status, Status::Error);

        run(&db, &reg, CMD_ZADD, &["z", "1", "a"]);
        let resp = run(&db, &reg, CMD_ZSCORE, &["z", "ghost"]);
        assert_eq!(resp.status, Status::Error);
    }

    #[test]
    fn test_keyspace_commands() {
        let db = db();
        let reg = CommandRegistry::new();
        run(&db, &reg, CMD_SET, &["k", "v"]);
        run(&db, &reg, CMD_ZADD, &["z", "1", "a"]);

        assert_eq!(run(&db, &reg, CMD_EXISTS, &["k"]).args, vec!["1"]);
        assert_eq!(run(&db, &reg, CMD_EXISTS, &["nope"]).args, vec!["0"]);
        assert_eq!(run(&db, &reg, CMD_TYPE, &["k"]).args, vec!["string"]);
        assert_eq!(run(&db, &reg, CMD_TYPE, &["z"]).args, vec!["zset"]);
        assert_eq!(run(&db, &reg, CMD_TYPE, &["nope"]).args, vec!["none"]);
        assert_eq!(run(&db, &reg, CMD_TTL, &["k"]).args, vec!["-1"]);

        assert_eq!(run(&db, &reg, CMD_DEL, &["k"]).args, vec!["1"]);
        assert_eq!(run(&db, &reg, CMD_DEL, &["k"]).args, vec!["0"]);
    }

    #[test]
    fn test_expire_persist_absexpire() {
        let db = db();
        let reg = CommandRegistry::new();
        run(&db, &reg, CMD_SET, &["k", "v"]);

        assert_eq!(run(&db, &reg, CMD_EXPIRE, &["k", "50"]).args, vec!["1"]);
        assert!(db.ttl_secs("k") > 0);
        assert_eq!(run(&db, &reg, CMD_PERSIST, &["k"]).args, vec!["1"]);
        assert_eq!(db.ttl_secs("k"), -1);

        assert_eq!(run(&db, &reg, CMD_EXPIRE, &["nope", "50"]).args, vec!["0"]);
        assert_eq!(run(&db, &reg, CMD_PERSIST, &["nope"]).args, vec!["0"]);

        // A stale absolute deadline deletes the key on the spot.
        run(&db, &reg, CMD_ABSEXPIRE, &["k", "1"]);
        assert_eq!(run(&db, &reg, CMD_EXISTS, &["k"]).args, vec!["0"]);
    }

    #[test]
    fn test_registry_marks_logged_commands() {
        let reg = CommandRegistry::new();
        for name in [CMD_SET, CMD_INCRBY, CMD_SETNX, CMD_SETEX, CMD_ZADD, CMD_ZREM, CMD_DEL, CMD_EXPIRE, CMD_PERSIST] {
            assert!(reg.get(name).unwrap().logged, "{name} must be logged");
        }
        for name in [CMD_GET, CMD_EXISTS, CMD_TYPE, CMD_TTL, CMD_ZRANGE, CMD_ZCARD, CMD_ZSCORE, CMD_ZRANK, CMD_ABSEXPIRE] {
            assert!(!reg.get(name).unwrap().logged, "{name} must not be logged");
        }
    }
}
