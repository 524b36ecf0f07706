//! REVENANT - In-Memory Key-Value Engine
//! Interactive shell over the store: commands typed at the prompt are
//! dispatched as requests against a single session.

use std::io::{self, BufRead, Write};

use revenant::config::Config;
use revenant::engine::{session::Session, Store};
use revenant::types::Request;

fn main() {
    env_logger::init();

    println!();
    println!("  ╔═══════════════════════════════════════════╗");
    println!("  ║          REVENANT Key-Value Store         ║");
    println!("  ║      AOF-Durable Data Engine v1.0.0       ║");
    println!("  ╚═══════════════════════════════════════════╝");
    println!();
    println!("  Commands:");
    println!("    SET <key> <value>        - Store a string value");
    println!("    GET <key>                - Retrieve a value by key");
    println!("    ZADD <key> <score> <m>   - Add to a sorted set");
    println!("    ZRANGE <key> <from> <to> - Read a sorted-set slice");
    println!("    MULTI / EXEC / DISCARD   - Transactions");
    println!("    WATCH <key>              - Optimistic lock for EXEC");
    println!("    SELECT <index>           - Switch database partition");
    println!("    REWRITEAOF               - Compact the log");
    println!("    info                     - Show engine statistics");
    println!("    exit                     - Shutdown");
    println!();

    let config = Config::default();
    let store = match Store::open(config) {
        Ok(s) => s,
        Err(err) => {
            eprintln!("[ERROR] Failed to open store: {}", err);
            std::process::exit(1);
        }
    };

    let mut session = Session::new();
    let mut seq: u64 = 0;

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("revenant[{}]> ", session.db_index);
        stdout.flush().unwrap();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).unwrap() == 0 {
            break; // EOF
        }

        let parts: Vec<&str> = line.trim().split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        match parts[0].to_lowercase().as_str() {
            "info" | "stats" => {
                println!("  {}", store.metrics.report());
                continue;
            }
            "exit" | "quit" | "q" => {
                println!("  Shutting down REVENANT...");
                break;
            }
            _ => {}
        }

        seq += 1;
        let req = Request::new(
            seq.to_string(),
            parts[0],
            parts[1..].iter().map(|s| s.to_string()).collect(),
        );
        match store.handle(&req, &mut session) {
            Ok(resp) if resp.is_ok() => {
                if resp.args.is_empty() {
                    println!("  OK");
                } else {
                    for arg in &resp.args {
                        println!("  {}", arg);
                    }
                }
            }
            Ok(resp) => println!("  ERROR: {}", resp.args.join(" ")),
            Err(e) => {
                eprintln!("[FATAL] {}", e);
                std::process::exit(1);
            }
        }
    }
}
