use crate::engine::{DecisionKind, SegmentReason};
use crate::iface::{DEFAULT_BUFFER_CAPACITY, IfIndex, TunnelId};
use crate::scenario::{
    RouteSpec, ScenarioError, ScenarioRunner, ScenarioSpec, StepSpec, TunnelSpec, functional,
};
use crate::wire::MacAddr;
use std::path::Path;

const MINIMAL: &str = r#"
{
    "schema_version": 1,
    "interfaces": [
        { "ifindex": 0, "mtu": 9000 },
        { "ifindex": 2, "mtu": 9000, "gso": true, "gso_size": 1460, "buffer_capacity": 4096 }
    ],
    "steps": [
        { "kind": "set_mtu", "ifindex": 0, "mtu": 1500 },
        {
            "kind": "send",
            "ingress": 2,
            "route": { "interface": 0 },
            "packet": { "src": "172.16.3.2", "dst": "172.16.1.2", "payload_len": 65200 }
        }
    ]
}
"#;

#[test]
fn scenario_json_fills_in_defaults() {
    let spec = ScenarioSpec::from_json_str(MINIMAL).expect("parse scenario");
    assert!(spec.tunnels.is_empty());
    assert!(spec.name().is_none());
    assert_eq!(spec.interfaces.len(), 2);

    let plain = spec.interfaces[0].descriptor(DEFAULT_BUFFER_CAPACITY);
    assert!(!plain.gso_enabled);
    assert_eq!(plain.buffer_capacity, 2048);
    let gso = spec.interfaces[1].descriptor(DEFAULT_BUFFER_CAPACITY);
    assert!(gso.gso_enabled);
    assert_eq!(gso.buffer_capacity, 4096);

    assert!(spec.steps[0].config_command().is_some());
    let StepSpec::Send { route, packet, .. } = &spec.steps[1] else {
        panic!("expected send step");
    };
    assert_eq!(*route, RouteSpec::Interface(IfIndex(0)));
    assert_eq!(packet.sport, 1234);
    assert_eq!(packet.dport, 1234);
    assert_eq!(packet.fill, 0xa5);
    assert!(!packet.dont_fragment);

    let built = packet.build().expect("build packet");
    assert_eq!(built.payload_len(), 65200);
    assert!(built.payload().as_bytes().iter().all(|b| *b == 0xa5));
}

#[test]
fn route_spec_parses_tunnels() {
    let route: RouteSpec = serde_json::from_str(r#"{ "tunnel": 3 }"#).expect("parse route");
    assert_eq!(route, RouteSpec::Tunnel(TunnelId(3)));
}

#[test]
fn tunnel_default_source_macs_do_not_collide_across_underlays() {
    let tunnel = |underlay: u32| -> TunnelSpec {
        serde_json::from_value(serde_json::json!({
            "id": 1,
            "vni": 10,
            "underlay": underlay,
            "src": "172.16.1.1",
            "dst": "172.16.1.2"
        }))
        .expect("parse tunnel")
    };
    let low = tunnel(1).descriptor().expect("tunnel on if1");
    let high = tunnel(257).descriptor().expect("tunnel on if257");
    assert_eq!(low.src_mac, MacAddr([0x02, 0xfe, 0, 0, 0, 1]));
    assert_eq!(high.src_mac, MacAddr([0x02, 0xfe, 0, 0, 1, 1]));
    assert_ne!(low.src_mac, high.src_mac);
}

#[test]
fn unsupported_schema_and_bad_steps_are_rejected() {
    let raw = MINIMAL.replace("\"schema_version\": 1", "\"schema_version\": 2");
    assert!(matches!(
        ScenarioSpec::from_json_str(&raw),
        Err(ScenarioError::UnsupportedSchema(2))
    ));

    let raw = MINIMAL.replace("set_mtu", "set_color");
    assert!(matches!(
        ScenarioSpec::from_json_str(&raw),
        Err(ScenarioError::Json(_))
    ));

    assert!(matches!(
        ScenarioSpec::from_path(Path::new("/nonexistent/scenario.json")),
        Err(ScenarioError::Io { .. })
    ));
}

#[test]
fn runner_applies_config_before_later_sends() {
    let spec = ScenarioSpec::from_json_str(MINIMAL).expect("parse scenario");
    let report = ScenarioRunner::new(&spec, DEFAULT_BUFFER_CAPACITY)
        .expect("runner")
        .run(&spec)
        .expect("run");
    // two upserts plus one set_mtu
    assert_eq!(report.generation, 3);
    assert_eq!(report.sends.len(), 1);

    let send = &report.sends[0];
    assert_eq!(send.step, 1);
    assert_eq!(send.decision, DecisionKind::SegmentNow);
    assert_eq!(send.effective_mtu, 1500);
    assert_eq!(send.unit_size, Some(1460));
    assert_eq!(send.packets, 45);
    assert_eq!(send.payload_bytes, 65200);
}

#[test]
fn runner_reports_engine_errors() {
    let raw = MINIMAL.replace("\"interface\": 0", "\"interface\": 5");
    let spec = ScenarioSpec::from_json_str(&raw).expect("parse scenario");
    let err = ScenarioRunner::new(&spec, DEFAULT_BUFFER_CAPACITY)
        .expect("runner")
        .run(&spec)
        .expect_err("unknown egress");
    assert!(matches!(err, ScenarioError::Engine(_)));
}

#[test]
fn builtin_functional_scenario_reproduces_expected_counts() {
    let spec = functional().expect("builtin scenario");
    assert_eq!(spec.name(), Some("functional"));
    let report = ScenarioRunner::new(&spec, DEFAULT_BUFFER_CAPACITY)
        .expect("runner")
        .run(&spec)
        .expect("run");

    let summary: Vec<(DecisionKind, usize)> = report
        .sends
        .iter()
        .map(|s| (s.decision, s.packets))
        .collect();
    assert_eq!(
        summary,
        vec![
            (DecisionKind::Reject, 1),
            (DecisionKind::PassThrough, 1),
            (DecisionKind::PassThrough, 1),
            (DecisionKind::SegmentNow, 45),
            (DecisionKind::SegmentNow, 45),
            (DecisionKind::Fragment, 119),
            (DecisionKind::Reject, 1),
            (DecisionKind::SegmentNow, 33),
            (DecisionKind::SegmentNow, 34),
            (DecisionKind::SegmentNow, 45),
            (DecisionKind::SegmentNow, 45),
            (DecisionKind::SegmentNow, 45),
            (DecisionKind::SegmentNow, 45),
        ]
    );

    // pass-through lengths: IPv4 total length, IPv6 header + payload length
    assert_eq!(report.sends[1].l3_lengths, vec![65240]);
    assert_eq!(report.sends[2].l3_lengths, vec![40 + 65220]);
    assert_eq!(report.sends[0].icmp_mtu, Some(9000));
    assert_eq!(report.sends[6].icmp_mtu, Some(1280));
    assert_eq!(report.sends[6].l3_lengths, vec![1280]);
    assert!(
        report.sends[9..]
            .iter()
            .all(|s| s.reason == Some(SegmentReason::TunnelBoundary) && s.payload_bytes == 65200)
    );

    let stats = &report.stats;
    assert_eq!(stats.pmtu_errors, 2);
    assert_eq!(stats.passed_through_pkts, 2);
    assert_eq!(stats.segmented_pkts, 8);
    assert_eq!(stats.segments_out, 45 * 6 + 33 + 34);
    assert_eq!(stats.fragmented_pkts, 1);
    assert_eq!(stats.fragments_out, 119);
}

#[test]
fn larger_default_buffers_change_only_buffer_bound_segments() {
    let spec = functional().expect("builtin scenario");
    let report = ScenarioRunner::new(&spec, 4096)
        .expect("runner")
        .run(&spec)
        .expect("run");
    // 4096 - 54 = 4042 and 4096 - 74 = 4022 bytes per segment
    assert_eq!(report.sends[7].unit_size, Some(4042));
    assert_eq!(report.sends[7].packets, 17);
    assert_eq!(report.sends[8].unit_size, Some(4022));
    assert_eq!(report.sends[8].packets, 17);
    // hint-bound cases unchanged
    assert_eq!(report.sends[3].packets, 45);
    assert_eq!(report.sends[9].packets, 45);
}
