use serde::Serialize;
use tracing::{debug, info};

use super::ScenarioError;
use super::spec::{ScenarioSpec, StepSpec};
use crate::engine::{Dataplane, Decision, DecisionKind, Outcome, SegmentReason, Stats};
use crate::iface::IfIndex;
use crate::wire::{Header, Icmpv4Message, Icmpv6Message, Packet};

/// 一次发送的结果摘要
#[derive(Debug, Clone, Serialize)]
pub struct SendReport {
    /// 在 `steps` 中的下标
    pub step: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub ingress: IfIndex,
    pub egress: IfIndex,
    pub decision: DecisionKind,
    pub effective_mtu: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<SegmentReason>,
    /// 分段大小 / 分片负载大小 / GSO 提示，视决策而定
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_size: Option<usize>,
    pub packets: usize,
    /// 输出包负载字节数之和（分片为 L3 负载，分段为 TCP 负载）
    pub payload_bytes: usize,
    /// 每个输出包最内层 IP 的 L3 长度
    pub l3_lengths: Vec<usize>,
    /// PMTU 差错报告的 MTU
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icmp_mtu: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// 运行结束时的配置代数
    pub generation: u64,
    pub sends: Vec<SendReport>,
    pub stats: Stats,
}

/// 按顺序重放场景步骤
#[derive(Debug)]
pub struct ScenarioRunner {
    dataplane: Dataplane,
    stats: Stats,
}

impl ScenarioRunner {
    /// 建立接口与隧道。未给出缓冲容量的接口使用 `default_capacity`。
    pub fn new(spec: &ScenarioSpec, default_capacity: usize) -> Result<Self, ScenarioError> {
        let mut dataplane = Dataplane::new();
        for iface in &spec.interfaces {
            let descriptor = iface.descriptor(default_capacity);
            dataplane.add_interface(iface.ifindex, descriptor)?;
            debug!(
                ifindex = %iface.ifindex,
                name = iface.name.as_deref().unwrap_or(""),
                mtu = descriptor.mtu,
                gso = descriptor.gso_enabled,
                "添加接口"
            );
        }
        for tunnel in &spec.tunnels {
            dataplane.add_tunnel(tunnel.id, tunnel.descriptor()?);
        }
        Ok(Self {
            dataplane,
            stats: Stats::default(),
        })
    }

    pub fn dataplane(&self) -> &Dataplane {
        &self.dataplane
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// 执行一步；配置步骤返回 `None`
    pub fn step(
        &mut self,
        index: usize,
        step: &StepSpec,
    ) -> Result<Option<SendReport>, ScenarioError> {
        if let Some(cmd) = step.config_command() {
            self.dataplane.configure(cmd)?;
            return Ok(None);
        }
        let StepSpec::Send {
            label,
            ingress,
            route,
            packet,
        } = step
        else {
            return Ok(None);
        };

        let packet = packet.build()?;
        let outcome = self.dataplane.process(*ingress, (*route).into(), &packet)?;
        self.stats.record(&outcome);
        let report = summarize(index, label.clone(), *ingress, &outcome);
        info!(
            step = index,
            decision = ?report.decision,
            egress = %report.egress,
            packets = report.packets,
            "📨 发送完成"
        );
        Ok(Some(report))
    }

    pub fn run(mut self, spec: &ScenarioSpec) -> Result<ScenarioReport, ScenarioError> {
        let mut sends = Vec::new();
        for (index, step) in spec.steps.iter().enumerate() {
            if let Some(report) = self.step(index, step)? {
                sends.push(report);
            }
        }
        Ok(ScenarioReport {
            name: spec.name().map(str::to_owned),
            generation: self.dataplane.interfaces().snapshot().generation(),
            sends,
            stats: self.stats,
        })
    }
}

fn summarize(
    step: usize,
    label: Option<String>,
    ingress: IfIndex,
    outcome: &Outcome,
) -> SendReport {
    let decision = outcome.decision();
    let (reason, unit_size) = match *decision {
        Decision::PassThrough { gso_size, .. } => (None, Some(gso_size)),
        Decision::SegmentNow {
            segment_size,
            reason,
            ..
        } => (Some(reason), Some(segment_size)),
        Decision::Fragment { fragment_size, .. } => (None, Some(fragment_size)),
        Decision::Forward { .. } | Decision::Reject(_) => (None, None),
    };
    let packets = outcome.packets();
    SendReport {
        step,
        label,
        ingress,
        egress: outcome.egress(),
        decision: decision.kind(),
        effective_mtu: decision.effective_mtu(),
        reason,
        unit_size,
        packets: packets.len(),
        payload_bytes: packets.iter().map(Packet::payload_len).sum(),
        l3_lengths: packets.iter().map(Packet::l3_len).collect(),
        icmp_mtu: packets.first().and_then(icmp_mtu),
    }
}

fn icmp_mtu(packet: &Packet) -> Option<usize> {
    packet.headers().headers().iter().find_map(|h| match h {
        Header::Icmpv4(Icmpv4Message::FragmentationNeeded { next_hop_mtu }) => {
            Some(usize::from(*next_hop_mtu))
        }
        Header::Icmpv6(Icmpv6Message::PacketTooBig { mtu }) => Some(*mtu as usize),
        _ => None,
    })
}
