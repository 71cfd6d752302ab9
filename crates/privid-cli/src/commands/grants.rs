//! Grant store management: list, purge, clear.

use chrono::{TimeZone, Utc};
use clap::Subcommand;
use privid_session::authorization::{purge_expired, GrantPolicy};
use privid_storage::GrantStore;
use privid_types::DecryptionGrant;

use crate::output;
use crate::runtime;
use crate::GlobalOpts;

#[derive(Subcommand)]
pub enum GrantsAction {
    /// List cached decryption grants.
    List,
    /// Remove grants whose validity window has ended.
    Purge,
    /// Remove every cached grant.
    Clear,
}

pub async fn run(action: GrantsAction, opts: &GlobalOpts) -> std::result::Result<(), String> {
    let (engine, store) = runtime::open_grant_store(&opts.config)?;
    let result = match action {
        GrantsAction::List => list(&store, opts),
        GrantsAction::Purge => purge(&store, opts),
        GrantsAction::Clear => clear(&store, opts),
    };
    engine.flush().map_err(|e| e.to_string())?;
    result
}

fn list(store: &dyn GrantStore, opts: &GlobalOpts) -> std::result::Result<(), String> {
    let policy = GrantPolicy::from_config(&opts.config.app).map_err(|e| e.to_string())?;
    let now = policy.now();
    let entries = store.entries().map_err(|e| e.to_string())?;

    let rows: Vec<Vec<String>> = entries
        .iter()
        .map(|(_, grant)| {
            vec![
                grant.user_address.to_string(),
                contracts_label(grant, opts.json),
                format_time(grant.start_timestamp),
                format_time(grant.expires_at()),
                if grant.is_valid_at(now) { "valid" } else { "expired" }.to_string(),
            ]
        })
        .collect();
    output::print_table(&["user", "contracts", "start", "expires", "state"], &rows, opts.json);
    Ok(())
}

fn purge(store: &dyn GrantStore, opts: &GlobalOpts) -> std::result::Result<(), String> {
    let policy = GrantPolicy::from_config(&opts.config.app).map_err(|e| e.to_string())?;
    let removed = purge_expired(store, &policy).map_err(|e| e.to_string())?;
    output::print_success(&format!("removed {removed} expired grant(s)"), opts.json);
    Ok(())
}

fn clear(store: &dyn GrantStore, opts: &GlobalOpts) -> std::result::Result<(), String> {
    let removed = store.clear().map_err(|e| e.to_string())?;
    output::print_success(&format!("removed {removed} grant(s)"), opts.json);
    Ok(())
}

fn contracts_label(grant: &DecryptionGrant, full: bool) -> String {
    let addresses: Vec<String> = grant
        .contract_addresses
        .iter()
        .map(|a| {
            let s = a.to_string();
            if full {
                s
            } else {
                output::short_hex(&s, 10)
            }
        })
        .collect();
    addresses.join(",")
}

fn format_time(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|s| Utc.timestamp_opt(s, 0).single())
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| secs.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_render_as_utc() {
        assert_eq!(format_time(0), "1970-01-01 00:00:00 UTC");
        assert_eq!(format_time(u64::MAX), u64::MAX.to_string());
    }
}
