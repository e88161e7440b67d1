// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Executable program to plan rack setup and inspect zone requests

use anyhow::{bail, Context};
use camino::Utf8PathBuf;
use clap::{Parser, ValueEnum};
use rss_common::cmd::{fatal, CmdError};
use rss_passwords::{Hasher, NewPasswordHash, Password};
use rss_sled_agent::config::Config;
use rss_sled_agent::rack_setup::Plan;
use sled_agent_types::rack_init::RackInitializeRequest;
use sled_agent_types::sled::PersistentSledAgentRequest;
use sled_agent_types::zone::AllZoneRequests;
use sled_hardware_types::Baseboard;
use std::collections::BTreeMap;
use std::net::Ipv6Addr;
use tokio::io::AsyncReadExt;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SchemaDocument {
    AllZoneRequests,
    Plan,
    PersistentSledAgentRequest,
}

#[derive(Debug, Parser)]
#[clap(name = "rss", about = "Rack setup planning and zone request tools")]
enum Args {
    /// Print the JSON schema of a ledgered document
    Schema {
        #[clap(value_enum)]
        document: SchemaDocument,
    },

    /// Assign a subnet and identity to each sled and ledger the plan
    Plan {
        /// Sled agent configuration (log and ledger directories)
        #[clap(name = "CONFIG_FILE_PATH")]
        config: Utf8PathBuf,

        /// Rack setup configuration (config-rss.toml)
        #[clap(name = "RSS_CONFIG_FILE_PATH")]
        rss_config: Utf8PathBuf,

        /// JSON object mapping each discovered bootstrap address to its
        /// baseboard
        #[clap(name = "SLEDS_FILE_PATH")]
        sleds: Utf8PathBuf,

        #[clap(long)]
        rack_id: Uuid,

        /// The bootstrap address of the sled running setup
        #[clap(long)]
        bootstrap_address: Ipv6Addr,
    },

    /// Validate a ledgered set of zone requests and list its zones
    CheckZones {
        #[clap(name = "FILE")]
        file: Utf8PathBuf,

        /// Also check each zone's external addresses against the service IP
        /// pool of this rack setup configuration
        #[clap(long)]
        rss_config: Option<Utf8PathBuf>,
    },

    /// Hash a password read from stdin for use in config-rss.toml
    HashPassword,
}

#[tokio::main]
async fn main() {
    if let Err(cmd_error) = do_run().await {
        fatal(cmd_error);
    }
}

async fn do_run() -> Result<(), CmdError> {
    let args = Args::parse();

    match args {
        Args::Schema { document } => {
            print_schema(document).map_err(CmdError::Failure)
        }
        Args::Plan { config, rss_config, sleds, rack_id, bootstrap_address } => {
            run_plan(config, rss_config, sleds, rack_id, bootstrap_address)
                .await
                .map_err(CmdError::Failure)
        }
        Args::CheckZones { file, rss_config } => {
            check_zones(file, rss_config).await.map_err(CmdError::Failure)
        }
        Args::HashPassword => hash_password().await.map_err(CmdError::Failure),
    }
}

fn print_schema(document: SchemaDocument) -> anyhow::Result<()> {
    let schema = match document {
        SchemaDocument::AllZoneRequests => {
            schemars::schema_for!(AllZoneRequests)
        }
        SchemaDocument::Plan => schemars::schema_for!(Plan),
        SchemaDocument::PersistentSledAgentRequest => {
            schemars::schema_for!(PersistentSledAgentRequest)
        }
    };
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

async fn run_plan(
    config_path: Utf8PathBuf,
    rss_config_path: Utf8PathBuf,
    sleds_path: Utf8PathBuf,
    rack_id: Uuid,
    bootstrap_address: Ipv6Addr,
) -> anyhow::Result<()> {
    let config = Config::from_file(&config_path)?;
    let log = config
        .log
        .to_logger("rss")
        .with_context(|| format!("initializing logger from {config_path}"))?;
    let rss_config = RackInitializeRequest::from_file(&rss_config_path)?;

    let sleds_json = tokio::fs::read_to_string(&sleds_path)
        .await
        .with_context(|| format!("reading {sleds_path}"))?;
    let discovered: BTreeMap<Ipv6Addr, Baseboard> =
        serde_json::from_str(&sleds_json)
            .with_context(|| format!("parsing {sleds_path}"))?;

    let plan = match Plan::load(&log, &config.ledger_dirs).await? {
        Some(plan) => {
            if plan.config != rss_config {
                bail!(
                    "an existing plan was created with a different rack \
                     setup configuration"
                );
            }
            if plan.rack_id != rack_id {
                bail!(
                    "an existing plan was created for rack {}",
                    plan.rack_id
                );
            }
            plan
        }
        None => {
            let plan = Plan::create(
                &log,
                &rss_config,
                rack_id,
                bootstrap_address,
                &discovered,
            )?;
            plan.commit(&log, &config.ledger_dirs).await?;
            plan
        }
    };

    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

async fn check_zones(
    path: Utf8PathBuf,
    rss_config_path: Option<Utf8PathBuf>,
) -> anyhow::Result<()> {
    let contents = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("reading {path}"))?;
    let requests: AllZoneRequests = serde_json::from_str(&contents)
        .with_context(|| format!("parsing {path}"))?;

    if let Some(rss_config_path) = rss_config_path {
        let rss_config = RackInitializeRequest::from_file(&rss_config_path)?;
        for request in requests.requests() {
            rss_config.validate_service_zone(request.zone()).with_context(
                || format!("checking {path} against {rss_config_path}"),
            )?;
        }
    }

    println!("generation: {}", requests.generation);
    for request in requests.requests() {
        println!("{}\t{}", request.zone().zone_name(), request.zone_path());
    }
    Ok(())
}

async fn hash_password() -> anyhow::Result<()> {
    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("reading password from stdin")?;
    let password = input.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        bail!("no password provided on stdin");
    }

    let password = Password::new(password)?;
    let hash = Hasher::default().create_password(&password)?;
    let hash = NewPasswordHash::try_from(hash)
        .context("checking generated hash")?;
    println!("{hash}");
    Ok(())
}
