//! Interactive REPL over one session.
//!
//! The session runs against the in-process devnet with the account and
//! the durable grant store from the data directory, so a grant signed in
//! one run is reused by the next.
//!
//! # Graceful shutdown
//!
//! Handles `SIGINT` (Ctrl+C) via `tokio::signal::ctrl_c`. The loop
//! exits cleanly without panic.

use std::sync::Arc;

use colored::Colorize;
use privid_session::devnet::Devnet;
use privid_session::session::SessionManager;
use privid_session::signer::Signer;
use privid_storage::GrantStore;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::keys;
use crate::output;
use crate::runtime;
use crate::GlobalOpts;

pub async fn run(opts: &GlobalOpts) -> std::result::Result<(), String> {
    let (engine, store) = runtime::open_grant_store(&opts.config)?;
    let signer = Arc::new(keys::load_or_create_account(&opts.config.data_dir)?);
    let devnet = Devnet::new(opts.config.chain_id);
    let store: Arc<dyn GrantStore> = Arc::new(store);
    let session = runtime::open_session(&devnet, signer.clone(), store.clone(), &opts.config)?;

    if !opts.json {
        println!("\n{}", "╔══════════════════════════════════════╗".bright_cyan());
        println!("{}", "║        PrivID Interactive Mode       ║".bright_cyan());
        println!("{}", "╚══════════════════════════════════════╝".bright_cyan());
        println!("  Account:  {}", signer.address().to_string().green());
        println!("  Contract: {}", session.contract_address());
        println!("  Chain:    {}", devnet.chain_id());
        println!();
        println!("Type {} for commands.", "help".bold());
        println!();
    }

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        if !opts.json {
            eprint!("{} > ", session.phase().to_string().dimmed());
        }

        let line = tokio::select! {
            result = lines.next_line() => {
                match result {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        output::print_error(&format!("failed to read input: {e}"), opts.json);
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                if !opts.json {
                    println!("\n{}", "Exiting interactive mode.".dimmed());
                }
                break;
            }
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match parse_command(trimmed) {
            Ok(ReplCommand::Quit) => break,
            Ok(cmd) => execute(cmd, &session, store.as_ref(), opts).await,
            Err(e) => output::print_error(&e, opts.json),
        }
    }

    engine.flush().map_err(|e| e.to_string())?;
    if !opts.json {
        println!("{}", "Goodbye.".dimmed());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
enum ReplCommand {
    Submit { age: u8, region: u8, kyc: bool },
    Verify { region: u8 },
    Attrs,
    Refresh,
    Status,
    Grants,
    Help,
    Quit,
}

fn parse_command(input: &str) -> std::result::Result<ReplCommand, String> {
    let mut parts = input.split_whitespace();
    let cmd = parts.next().unwrap_or("").trim_start_matches('/');
    let args: Vec<&str> = parts.collect();

    let expect_args = |n: usize, usage: &str| -> std::result::Result<(), String> {
        if args.len() == n {
            Ok(())
        } else {
            Err(format!("usage: {usage}"))
        }
    };

    match cmd {
        "submit" => {
            expect_args(3, "submit <age> <region> <kyc>")?;
            Ok(ReplCommand::Submit {
                age: parse_u8("age", args[0])?,
                region: parse_u8("region", args[1])?,
                kyc: parse_bool("kyc", args[2])?,
            })
        }
        "verify" => {
            expect_args(1, "verify <region>")?;
            Ok(ReplCommand::Verify {
                region: parse_u8("region", args[0])?,
            })
        }
        "attrs" => Ok(ReplCommand::Attrs),
        "refresh" => Ok(ReplCommand::Refresh),
        "status" => Ok(ReplCommand::Status),
        "grants" => Ok(ReplCommand::Grants),
        "help" | "?" => Ok(ReplCommand::Help),
        "quit" | "exit" | "q" => Ok(ReplCommand::Quit),
        other => Err(format!("unknown command '{other}', type help")),
    }
}

fn parse_u8(name: &str, s: &str) -> std::result::Result<u8, String> {
    s.parse()
        .map_err(|_| format!("{name} must be an integer between 0 and 255, got '{s}'"))
}

fn parse_bool(name: &str, s: &str) -> std::result::Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Ok(true),
        "false" | "no" | "n" | "0" => Ok(false),
        _ => Err(format!("{name} must be true or false, got '{s}'")),
    }
}

const BUSY: &str = "another operation is in progress";

async fn execute(cmd: ReplCommand, session: &SessionManager, store: &dyn GrantStore, opts: &GlobalOpts) {
    match cmd {
        ReplCommand::Submit { age, region, kyc } => {
            match session.submit_attributes(age, region, kyc).await {
                Ok(Some(outcome)) => {
                    output::print_kv("Submit tx", &outcome.tx_hash.to_string(), opts.json);
                    print_last_status(session, opts);
                }
                Ok(None) => output::print_error(BUSY, opts.json),
                Err(e) => output::print_error(&e.to_string(), opts.json),
            }
        }

        ReplCommand::Verify { region } => {
            match session.compute_and_decrypt_access_flags(region).await {
                Ok(Some(flags)) => {
                    output::print_flags(&flags, opts.json);
                    print_last_status(session, opts);
                }
                Ok(None) => output::print_error(BUSY, opts.json),
                Err(e) => output::print_error(&e.to_string(), opts.json),
            }
        }

        ReplCommand::Attrs => output::print_attributes(session.attributes().as_ref(), opts.json),

        ReplCommand::Refresh => match session.refresh_attributes().await {
            Ok(attrs) => output::print_attributes(attrs.as_ref(), opts.json),
            Err(e) => output::print_error(&e.to_string(), opts.json),
        },

        ReplCommand::Status => {
            let snapshot = session.snapshot();
            if opts.json {
                let obj = serde_json::json!({
                    "phase": snapshot.phase.to_string(),
                    "busy": session.is_busy(),
                    "attributes": output::attributes_json(snapshot.attributes.as_ref()),
                    "access_flags": snapshot.access_flags.as_ref().map(output::flags_json),
                    "status": snapshot.status.as_ref().map(|s| s.text.clone()),
                });
                println!("{obj}");
            } else {
                output::print_kv("Phase", &snapshot.phase.to_string(), false);
                output::print_kv("Busy", if session.is_busy() { "yes" } else { "no" }, false);
                output::print_kv(
                    "Attributes",
                    if snapshot.attributes.is_some() { "present" } else { "none" },
                    false,
                );
                match snapshot.access_flags {
                    Some(flags) => output::print_flags(&flags, false),
                    None => output::print_kv("Access flags", "not computed", false),
                }
                if let Some(status) = snapshot.status {
                    output::print_status(&status, false);
                }
            }
        }

        ReplCommand::Grants => match store.entries() {
            Ok(entries) => {
                let now = session.grant_policy().now();
                let rows: Vec<Vec<String>> = entries
                    .iter()
                    .map(|(key, grant)| {
                        vec![
                            output::short_hex(key, 24),
                            grant.expires_at().saturating_sub(now).to_string(),
                        ]
                    })
                    .collect();
                output::print_table(&["key", "seconds_left"], &rows, opts.json);
            }
            Err(e) => output::print_error(&e.to_string(), opts.json),
        },

        ReplCommand::Help => {
            if !opts.json {
                println!("  submit <age> <region> <kyc>  encrypt and submit attributes");
                println!("  verify <region>              compute and decrypt access flags");
                println!("  attrs                        show cached attribute handles");
                println!("  refresh                      re-read attributes from the contract");
                println!("  status                       show session state");
                println!("  grants                       list cached decryption grants");
                println!("  quit                         exit interactive mode");
            }
        }

        ReplCommand::Quit => {}
    }
}

fn print_last_status(session: &SessionManager, opts: &GlobalOpts) {
    if let Some(status) = session.snapshot().status {
        output::print_status(&status, opts.json);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_submit() {
        assert_eq!(
            parse_command("submit 25 2 true"),
            Ok(ReplCommand::Submit {
                age: 25,
                region: 2,
                kyc: true
            })
        );
        assert_eq!(
            parse_command("/submit 10 5 no"),
            Ok(ReplCommand::Submit {
                age: 10,
                region: 5,
                kyc: false
            })
        );
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(parse_command("submit 25 2").is_err());
        assert!(parse_command("submit 300 2 true").is_err());
        assert!(parse_command("submit 25 2 maybe").is_err());
        assert!(parse_command("verify").is_err());
        assert!(parse_command("launch").is_err());
    }

    #[test]
    fn parses_simple_commands() {
        assert_eq!(parse_command("verify 7"), Ok(ReplCommand::Verify { region: 7 }));
        assert_eq!(parse_command("attrs"), Ok(ReplCommand::Attrs));
        assert_eq!(parse_command("quit"), Ok(ReplCommand::Quit));
        assert_eq!(parse_command("/q"), Ok(ReplCommand::Quit));
    }
}
