use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "gso-rs-{prefix}-{}-{nanos}",
        std::process::id()
    ));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn write_file(dir: &PathBuf, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("write temp file");
    path
}

fn step_lines(stdout: &str) -> Vec<&str> {
    stdout
        .lines()
        .filter(|line| line.starts_with("step="))
        .collect()
}

#[test]
fn gso_sim_runs_builtin_and_writes_report() {
    let dir = unique_temp_dir("builtin");
    let out_json = dir.join("report.json");

    let output = Command::new(env!("CARGO_BIN_EXE_gso_sim"))
        .args([
            "--builtin",
            "functional",
            "--json-out",
            out_json.to_str().unwrap(),
        ])
        .output()
        .expect("run gso_sim");
    assert!(
        output.status.success(),
        "gso_sim failed: stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(step_lines(&stdout).len(), 13);
    assert!(
        stdout
            .lines()
            .any(|line| line.starts_with("stats ") && line.contains("fragments_out=119")),
        "missing stats line: {stdout}"
    );

    let raw = fs::read_to_string(&out_json).expect("read report.json");
    let v: Value = serde_json::from_str(&raw).expect("parse report.json");
    let sends = v["sends"].as_array().expect("sends array");
    assert_eq!(sends.len(), 13);
    assert_eq!(sends[0]["decision"], "reject");
    assert_eq!(sends[1]["decision"], "pass_through");
    assert_eq!(sends[3]["decision"], "segment_now");
    assert_eq!(sends[3]["reason"], "egress_not_gso");
    assert_eq!(sends[3]["packets"], 45);
    assert_eq!(sends[5]["decision"], "fragment");
    assert_eq!(sends[5]["packets"], 119);
    assert_eq!(sends[6]["icmp_mtu"], 1280);
    assert_eq!(v["stats"]["pmtu_errors"], 2);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn gso_sim_runs_scenario_file_with_buffer_override() {
    let dir = unique_temp_dir("file");
    let scenario = write_file(
        &dir,
        "scenario.json",
        r#"
{
    "schema_version": 1,
    "meta": { "name": "large-hint" },
    "interfaces": [
        { "ifindex": 1, "mtu": 9000 },
        { "ifindex": 4, "mtu": 9000, "gso": true, "gso_size": 8940 }
    ],
    "steps": [
        {
            "kind": "send",
            "label": "large hint",
            "ingress": 4,
            "route": { "interface": 1 },
            "packet": {
                "src": "172.16.5.2",
                "dst": "172.16.2.2",
                "dont_fragment": true,
                "payload_len": 65200
            }
        }
    ]
}
        "#,
    );

    let run = |capacity: &str| {
        Command::new(env!("CARGO_BIN_EXE_gso_sim"))
            .args([
                "--scenario",
                scenario.to_str().unwrap(),
                "--buffer-capacity",
                capacity,
            ])
            .output()
            .expect("run gso_sim")
    };

    let output = run("2048");
    assert!(
        output.status.success(),
        "gso_sim failed: stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines = step_lines(&stdout);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("decision=SegmentNow"), "{}", lines[0]);
    assert!(lines[0].contains("unit=1994"), "{}", lines[0]);
    assert!(lines[0].contains("packets=33"), "{}", lines[0]);
    assert!(lines[0].contains("label=large hint"), "{}", lines[0]);

    let output = run("9100");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    // 9000-byte MTU now bounds the segment: 8940 payload + 40 headers fits
    assert!(step_lines(&stdout)[0].contains("unit=8940"), "{stdout}");
    assert!(step_lines(&stdout)[0].contains("packets=8"), "{stdout}");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn gso_sim_fails_on_invalid_scenario() {
    let dir = unique_temp_dir("invalid");
    let scenario = write_file(&dir, "scenario.json", r#"{ "schema_version": 1 }"#);

    let output = Command::new(env!("CARGO_BIN_EXE_gso_sim"))
        .args(["--scenario", scenario.to_str().unwrap()])
        .output()
        .expect("run gso_sim");
    assert!(!output.status.success());

    let output = Command::new(env!("CARGO_BIN_EXE_gso_sim"))
        .output()
        .expect("run gso_sim");
    assert!(!output.status.success(), "--scenario or --builtin is required");

    let _ = fs::remove_dir_all(&dir);
}
