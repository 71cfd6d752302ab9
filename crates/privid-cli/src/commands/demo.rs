//! End-to-end demo against the in-process devnet.
//!
//! Two accounts submit attributes and check access against the same
//! target region: an adult inside the region and a minor outside it.

use std::sync::Arc;

use clap::Args;
use colored::Colorize;
use privid_session::devnet::Devnet;
use privid_session::signer::{LocalSigner, Signer};
use privid_storage::memory::MemoryGrantStore;
use privid_types::AccessFlags;

use crate::output;
use crate::runtime;
use crate::GlobalOpts;

#[derive(Args)]
pub struct DemoArgs {
    /// Region code both accounts are checked against.
    #[arg(long, default_value_t = 2)]
    pub target_region: u8,
}

/// One account's inputs in the demo.
struct Scenario {
    name: &'static str,
    age: u8,
    region: u8,
    kyc: bool,
}

const SCENARIOS: [Scenario; 2] = [
    Scenario {
        name: "adult in region",
        age: 25,
        region: 2,
        kyc: true,
    },
    Scenario {
        name: "minor elsewhere",
        age: 10,
        region: 5,
        kyc: false,
    },
];

pub async fn run(args: DemoArgs, opts: &GlobalOpts) -> std::result::Result<(), String> {
    let devnet = Devnet::new(opts.config.chain_id);
    if !opts.json {
        println!(
            "{} chain {} contract {}",
            "devnet".bright_cyan().bold(),
            devnet.chain_id(),
            devnet.contract_address()
        );
    }

    let mut results = Vec::with_capacity(SCENARIOS.len());
    for scenario in &SCENARIOS {
        let flags = run_scenario(&devnet, scenario, args.target_region, opts).await?;
        results.push(serde_json::json!({
            "scenario": scenario.name,
            "age": scenario.age,
            "region": scenario.region,
            "kyc": scenario.kyc,
            "target_region": args.target_region,
            "is_adult": flags.is_adult.value,
            "is_region": flags.is_region.value,
        }));
    }

    if opts.json {
        println!("{}", serde_json::json!({ "scenarios": results }));
    } else {
        output::print_success("demo completed", false);
    }
    Ok(())
}

async fn run_scenario(
    devnet: &Arc<Devnet>,
    scenario: &Scenario,
    target_region: u8,
    opts: &GlobalOpts,
) -> std::result::Result<AccessFlags, String> {
    let signer = Arc::new(LocalSigner::random().map_err(|e| e.to_string())?);
    let account = signer.address();
    let session = runtime::open_session(
        devnet,
        signer,
        Arc::new(MemoryGrantStore::new()),
        &opts.config,
    )?;

    if !opts.json {
        println!();
        println!("{} {}", "▶".bright_cyan(), scenario.name.bold());
        output::print_kv("Account", &account.to_string(), false);
        println!(
            "  submitting age={} region={} kyc={}",
            scenario.age, scenario.region, scenario.kyc
        );
    }

    let submitted = session
        .submit_attributes(scenario.age, scenario.region, scenario.kyc)
        .await
        .map_err(|e| e.to_string())?
        .ok_or("session busy")?;
    if !opts.json {
        output::print_kv("Submit tx", &submitted.tx_hash.to_string(), false);
        output::print_attributes(submitted.attributes.as_ref(), false);
        println!("  verifying against region {target_region}");
    }

    let flags = session
        .compute_and_decrypt_access_flags(target_region)
        .await
        .map_err(|e| e.to_string())?
        .ok_or("session busy")?;
    if !opts.json {
        output::print_flags(&flags, false);
    }
    Ok(flags)
}
