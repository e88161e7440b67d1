// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tests for the executable commands in this repo.  Most functionality is tested
//! elsewhere, so this really just sanity checks argument parsing, bad args, and
//! the output of each subcommand.

use camino::Utf8PathBuf;
use camino_tempfile::Utf8TempDir;
use rss_common::api::external::Generation;
use rss_sled_agent::rack_setup::RSS_SLED_PLAN_FILENAME;
use rss_test_utils::dev::test_cmds::assert_exit_code;
use rss_test_utils::dev::test_cmds::path_to_executable;
use rss_test_utils::dev::test_cmds::run_command;
use rss_test_utils::dev::test_cmds::EXIT_FAILURE;
use rss_test_utils::dev::test_cmds::EXIT_SUCCESS;
use rss_test_utils::dev::test_cmds::EXIT_USAGE;
use sled_agent_types::zone::{
    AllZoneRequests, ServiceType, ServiceZoneRequest, ServiceZoneService,
    ZoneRequest, ZoneType,
};
use std::net::{Ipv6Addr, SocketAddrV6};
use subprocess::Exec;
use uuid::Uuid;

/// name of the "rss" executable
const CMD_RSS: &str = env!("CARGO_BIN_EXE_rss");

const RACK_ID: &str = "c19a698f-c6f9-4a17-ae30-20d711b8f7dc";
const BOOTSTRAP_ADDRESS: &str = "fdb0:a840:2504:1::1";

fn path_to_rss() -> Utf8PathBuf {
    path_to_executable(CMD_RSS).try_into().expect("Invalid Utf8 binary?")
}

fn smf_rss_config() -> Utf8PathBuf {
    Utf8PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../smf/sled-agent/non-gimlet/config-rss.toml")
}

// Writes a sled agent config whose ledgers live in `dir`, plus a sleds file
// naming the one sled that will be planned.
fn write_plan_inputs(dir: &Utf8TempDir) -> (Utf8PathBuf, Utf8PathBuf) {
    let config_path = dir.path().join("config.toml");
    let ledger_dir = dir.path().join("m2-0");
    std::fs::create_dir(&ledger_dir).unwrap();
    std::fs::write(
        &config_path,
        format!(
            r#"
            ledger_dirs = [ "{ledger_dir}" ]
            zone_root = "/zone"

            [log]
            mode = "stderr-terminal"
            level = "info"
            "#
        ),
    )
    .unwrap();

    let sleds_path = dir.path().join("sleds.json");
    std::fs::write(
        &sleds_path,
        serde_json::json!({
            BOOTSTRAP_ADDRESS: {
                "type": "gimlet",
                "identifier": "BRM42220016",
                "model": "913-0000019",
                "revision": 6,
            },
            "fdb0:a840:2504:2::1": {
                "type": "gimlet",
                "identifier": "BRM42220017",
                "model": "913-0000019",
                "revision": 6,
            },
        })
        .to_string(),
    )
    .unwrap();
    (config_path, sleds_path)
}

fn plan_cmd(
    config_path: &Utf8PathBuf,
    sleds_path: &Utf8PathBuf,
    rack_id: &str,
) -> Exec {
    Exec::cmd(path_to_rss())
        .arg("plan")
        .arg(config_path)
        .arg(smf_rss_config())
        .arg(sleds_path)
        .arg("--rack-id")
        .arg(rack_id)
        .arg("--bootstrap-address")
        .arg(BOOTSTRAP_ADDRESS)
}

#[test]
fn test_rss_no_args() {
    let exec = Exec::cmd(path_to_rss());
    let (exit_status, _, stderr_text) = run_command(exec);
    assert_exit_code(exit_status, EXIT_USAGE, &stderr_text);
    assert!(stderr_text.contains("Usage:"), "stderr:\n{stderr_text}");
}

#[test]
fn test_rss_bad_schema_name() {
    let exec = Exec::cmd(path_to_rss()).arg("schema").arg("nexus");
    let (exit_status, _, stderr_text) = run_command(exec);
    assert_exit_code(exit_status, EXIT_USAGE, &stderr_text);
}

#[test]
fn test_rss_schema() {
    for (document, title) in [
        ("all-zone-requests", "AllZoneRequests"),
        ("plan", "Plan"),
        ("persistent-sled-agent-request", "PersistentSledAgentRequest"),
    ] {
        let exec = Exec::cmd(path_to_rss()).arg("schema").arg(document);
        let (exit_status, stdout_text, stderr_text) = run_command(exec);
        assert_exit_code(exit_status, EXIT_SUCCESS, &stderr_text);
        let schema: serde_json::Value = serde_json::from_str(&stdout_text)
            .expect("stdout was not valid JSON");
        assert_eq!(schema["title"], title);
    }
}

#[test]
fn test_rss_plan() {
    let dir = camino_tempfile::tempdir().unwrap();
    let (config_path, sleds_path) = write_plan_inputs(&dir);

    let (exit_status, stdout_text, stderr_text) =
        run_command(plan_cmd(&config_path, &sleds_path, RACK_ID));
    assert_exit_code(exit_status, EXIT_SUCCESS, &stderr_text);

    let plan: serde_json::Value =
        serde_json::from_str(&stdout_text).expect("stdout was not valid JSON");
    assert_eq!(plan["rack_id"], RACK_ID);
    let sleds = plan["sleds"].as_object().unwrap();
    // The sample configuration only plans the sled running setup.
    assert_eq!(sleds.len(), 1);
    let (addr, request) = sleds.iter().next().unwrap();
    assert_eq!(
        addr.parse::<SocketAddrV6>().unwrap().ip(),
        &BOOTSTRAP_ADDRESS.parse::<Ipv6Addr>().unwrap()
    );
    assert_eq!(request["rack_id"], RACK_ID);
    assert_eq!(request["subnet"]["net"], "fd00:1122:3344:101::/64");
    assert!(dir.path().join("m2-0").join(RSS_SLED_PLAN_FILENAME).exists());

    // Re-running reuses the ledgered plan.
    let (exit_status, again, stderr_text) =
        run_command(plan_cmd(&config_path, &sleds_path, RACK_ID));
    assert_exit_code(exit_status, EXIT_SUCCESS, &stderr_text);
    assert_eq!(again, stdout_text);

    // ... but not for some other rack.
    let other_rack = Uuid::new_v4().to_string();
    let (exit_status, _, stderr_text) =
        run_command(plan_cmd(&config_path, &sleds_path, &other_rack));
    assert_exit_code(exit_status, EXIT_FAILURE, &stderr_text);
    assert!(stderr_text.contains("existing plan"), "stderr:\n{stderr_text}");
}

#[test]
fn test_rss_plan_missing_config() {
    let dir = camino_tempfile::tempdir().unwrap();
    let (_, sleds_path) = write_plan_inputs(&dir);
    let missing = dir.path().join("nonexistent.toml");
    let (exit_status, _, stderr_text) =
        run_command(plan_cmd(&missing, &sleds_path, RACK_ID));
    assert_exit_code(exit_status, EXIT_FAILURE, &stderr_text);
    assert!(
        stderr_text.contains("Failed to read config"),
        "stderr:\n{stderr_text}"
    );
}

#[test]
fn test_rss_check_zones() {
    let dir = camino_tempfile::tempdir().unwrap();
    let id: Uuid = "8a9c3b2f-6f4e-4b8e-9a62-2d0c4a0e8f11".parse().unwrap();
    let underlay: Ipv6Addr = "fd00:1122:3344:101::5".parse().unwrap();
    let zone = ServiceZoneRequest::new(
        id,
        ZoneType::Oximeter,
        vec![underlay],
        None,
        vec![ServiceZoneService {
            id,
            details: ServiceType::Oximeter {
                address: SocketAddrV6::new(underlay, 12223, 0, 0),
            },
        }],
    )
    .unwrap();
    let requests = AllZoneRequests::new(
        Generation::from_u32(2),
        vec![ZoneRequest::new(zone, "/zone".into()).unwrap()],
    )
    .unwrap();
    let path = dir.path().join("services.json");
    std::fs::write(&path, serde_json::to_string(&requests).unwrap()).unwrap();

    let exec = Exec::cmd(path_to_rss()).arg("check-zones").arg(&path);
    let (exit_status, stdout_text, stderr_text) = run_command(exec);
    assert_exit_code(exit_status, EXIT_SUCCESS, &stderr_text);
    assert_eq!(
        stdout_text,
        format!(
            "generation: 2\noxz_oximeter_{id}\t/zone/oxz_oximeter_{id}\n"
        )
    );

    // Oximeter has no external address, so any rack configuration accepts it.
    let exec = Exec::cmd(path_to_rss())
        .arg("check-zones")
        .arg(&path)
        .arg("--rss-config")
        .arg(smf_rss_config());
    let (exit_status, with_config, stderr_text) = run_command(exec);
    assert_exit_code(exit_status, EXIT_SUCCESS, &stderr_text);
    assert_eq!(with_config, stdout_text);

    // A file naming the same zone twice is rejected.
    let mut value = serde_json::to_value(&requests).unwrap();
    let first = value["requests"][0].clone();
    value["requests"].as_array_mut().unwrap().push(first);
    std::fs::write(&path, value.to_string()).unwrap();
    let exec = Exec::cmd(path_to_rss()).arg("check-zones").arg(&path);
    let (exit_status, _, stderr_text) = run_command(exec);
    assert_exit_code(exit_status, EXIT_FAILURE, &stderr_text);
    assert!(stderr_text.contains("more than once"), "stderr:\n{stderr_text}");

    // A zone whose service disagrees with its type is rejected.
    let mut value = serde_json::to_value(&requests).unwrap();
    value["requests"][0]["zone"]["zone_type"] = "clickhouse".into();
    std::fs::write(&path, value.to_string()).unwrap();
    let exec = Exec::cmd(path_to_rss()).arg("check-zones").arg(&path);
    let (exit_status, _, stderr_text) = run_command(exec);
    assert_exit_code(exit_status, EXIT_FAILURE, &stderr_text);
    assert!(stderr_text.contains("parsing"), "stderr:\n{stderr_text}");
}

#[test]
fn test_rss_hash_password() {
    let exec = Exec::cmd(path_to_rss()).arg("hash-password").stdin("oxide\n");
    let (exit_status, stdout_text, stderr_text) = run_command(exec);
    assert_exit_code(exit_status, EXIT_SUCCESS, &stderr_text);
    assert!(stdout_text.starts_with("$argon2id$"), "stdout:\n{stdout_text}");
    let hash: rss_passwords::NewPasswordHash =
        stdout_text.trim().parse().unwrap();
    assert!(hash.as_str().starts_with("$argon2id$"));

    let exec = Exec::cmd(path_to_rss()).arg("hash-password").stdin("");
    let (exit_status, _, stderr_text) = run_command(exec);
    assert_exit_code(exit_status, EXIT_FAILURE, &stderr_text);
}
