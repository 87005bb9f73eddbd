//! 数据面
//!
//! 把一个已路由的数据包走完整条流程：
//! 取配置快照 → 决策 → 发射分段/分片或生成 PMTU 差错 → 隧道封装。
//! 每个包独立处理，`process` 只需 `&self`，可以在多个线程上并行调用。

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, info};

use crate::iface::{
    ConfigCommand, ConfigError, IfIndex, InterfaceDescriptor, InterfaceTable, TableSnapshot,
    TunnelDescriptor, TunnelId,
};
use crate::wire::Packet;

use super::decision::{Decision, decide_repr};
use super::emit::emit;
use super::pmtu::{PmtuError, PmtuResponder};
use super::repr::PacketRepr;

/// 路由层给出的出口
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Direct(IfIndex),
    Tunnel(TunnelId),
}

/// 单个包的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// 向 `egress` 发送 `packets`（按序）
    Transmit {
        egress: IfIndex,
        decision: Decision,
        repr: PacketRepr,
        packets: Vec<Packet>,
    },
    /// 沿入口接口把差错包发回原发送方
    PmtuError {
        egress: IfIndex,
        decision: Decision,
        packet: Packet,
    },
}

impl Outcome {
    pub fn decision(&self) -> &Decision {
        match self {
            Outcome::Transmit { decision, .. } | Outcome::PmtuError { decision, .. } => decision,
        }
    }

    pub fn egress(&self) -> IfIndex {
        match self {
            Outcome::Transmit { egress, .. } | Outcome::PmtuError { egress, .. } => *egress,
        }
    }

    pub fn packets(&self) -> &[Packet] {
        match self {
            Outcome::Transmit { packets, .. } => packets,
            Outcome::PmtuError { packet, .. } => std::slice::from_ref(packet),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("unknown interface {0}")]
    UnknownInterface(IfIndex),
    #[error("unknown tunnel {0}")]
    UnknownTunnel(TunnelId),
    #[error("cannot answer oversize packet: {0}")]
    Pmtu(#[from] PmtuError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// 数据面：接口配置表 + 隧道表
#[derive(Debug, Default)]
pub struct Dataplane {
    interfaces: InterfaceTable,
    tunnels: HashMap<TunnelId, TunnelDescriptor>,
}

impl Dataplane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interfaces(&self) -> &InterfaceTable {
        &self.interfaces
    }

    /// 应用带外配置命令
    pub fn configure(&self, cmd: ConfigCommand) -> Result<TableSnapshot, EngineError> {
        Ok(self.interfaces.apply(cmd)?)
    }

    pub fn add_interface(
        &self,
        ifindex: IfIndex,
        descriptor: InterfaceDescriptor,
    ) -> Result<TableSnapshot, EngineError> {
        self.configure(ConfigCommand::Upsert {
            ifindex,
            descriptor,
        })
    }

    pub fn add_tunnel(&mut self, id: TunnelId, tunnel: TunnelDescriptor) {
        info!(%id, vni = tunnel.vni, underlay = %tunnel.underlay, "🔗 添加 VXLAN 隧道");
        self.tunnels.insert(id, tunnel);
    }

    pub fn remove_tunnel(&mut self, id: TunnelId) -> Option<TunnelDescriptor> {
        info!(%id, "移除隧道");
        self.tunnels.remove(&id)
    }

    pub fn tunnel(&self, id: TunnelId) -> Option<&TunnelDescriptor> {
        self.tunnels.get(&id)
    }

    /// 用当前配置快照处理一个包
    pub fn process(
        &self,
        ingress: IfIndex,
        route: Route,
        packet: &Packet,
    ) -> Result<Outcome, EngineError> {
        let snapshot = self.interfaces.snapshot();
        self.process_with(&snapshot, ingress, route, packet)
    }

    /// 用指定快照处理一个包；同一快照 + 同一包总是得到相同的输出序列
    #[tracing::instrument(
        skip(self, snapshot, packet),
        fields(generation = snapshot.generation(), payload_len = packet.payload_len())
    )]
    pub fn process_with(
        &self,
        snapshot: &TableSnapshot,
        ingress: IfIndex,
        route: Route,
        packet: &Packet,
    ) -> Result<Outcome, EngineError> {
        let ingress_if = snapshot
            .get(ingress)
            .ok_or(EngineError::UnknownInterface(ingress))?;

        let (egress, tunnel) = match route {
            Route::Direct(ifindex) => (ifindex, None),
            Route::Tunnel(id) => {
                let tunnel = self.tunnels.get(&id).ok_or(EngineError::UnknownTunnel(id))?;
                (tunnel.underlay, Some(tunnel))
            }
        };
        let egress_if = snapshot
            .get(egress)
            .ok_or(EngineError::UnknownInterface(egress))?;

        let repr = PacketRepr::classify(packet, &ingress_if);
        let decision = decide_repr(packet, &repr, &egress_if, tunnel);
        debug!(?decision, %egress, "决策完成");

        if let Decision::Reject(violation) = decision {
            let reply = PmtuResponder::new(ingress_if).respond(packet, violation.effective_mtu)?;
            return Ok(Outcome::PmtuError {
                egress: ingress,
                decision,
                packet: reply,
            });
        }

        let repr = match decision {
            Decision::SegmentNow { segment_size, .. } => {
                repr.materialize(packet.payload_len(), segment_size)
            }
            Decision::Fragment { .. } | Decision::Forward { .. } => PacketRepr::Whole,
            _ => repr,
        };

        let packets: Vec<Packet> = match tunnel {
            Some(t) => emit(packet, &decision).map(|p| t.encapsulate(p)).collect(),
            None => emit(packet, &decision).collect(),
        };
        debug!(count = packets.len(), "发射完成");

        Ok(Outcome::Transmit {
            egress,
            decision,
            repr,
            packets,
        })
    }
}
