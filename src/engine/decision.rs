//! 分段决策引擎
//!
//! 对一个（可能远超 MTU 的）数据包，结合入口、出口描述符和可选隧道，
//! 选择：整包转发 / GSO 透传 / 立即软件分段 / IP 分片 / PMTU 拒绝。
//!
//! 顺序：先做 MTU 检查（拒绝或分片），再决定 GSO 元数据能否继续传播。
//! IP 长度字段放不下的包永远不会整包发出：GSO 包改为立即分段，普通包被拒绝。

use serde::Serialize;
use tracing::{debug, trace};

use crate::iface::{InterfaceDescriptor, TunnelDescriptor};
use crate::wire::{ETHERNET_HEADER_LEN, IpVersion, Packet};

use super::repr::PacketRepr;

/// 决策种类（用于报告和统计）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Forward,
    PassThrough,
    SegmentNow,
    Fragment,
    Reject,
}

/// 为什么必须在这里物化 GSO 分段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentReason {
    /// 出接口不能携带 GSO 元数据
    EgressNotGso,
    /// 元数据不能穿越隧道封装
    TunnelBoundary,
    /// 单个 GSO 单元超出出接口缓冲容量，本地降级为立即分段
    BufferCapacityExceeded,
    /// 整包超出 IP 长度字段的 16 位范围，不能作为单个单元或分片发出
    LengthOverflow,
}

/// DF 置位（或 IPv6）且超出有效 MTU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OversizeViolation {
    pub version: IpVersion,
    /// 参与 MTU 检查的单元长度（L3）
    pub unit_len: usize,
    pub effective_mtu: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// 整包原样转发
    Forward { effective_mtu: usize },
    /// 端到端 GSO：作为一个超大单元转发，不切分
    PassThrough { effective_mtu: usize, gso_size: usize },
    /// 立即软件分段
    SegmentNow {
        effective_mtu: usize,
        segment_size: usize,
        reason: SegmentReason,
    },
    /// IP 分片，`fragment_size` 为非末片的分片负载长度（8 的倍数）
    Fragment { effective_mtu: usize, fragment_size: usize },
    /// 回送 PMTU 差错
    Reject(OversizeViolation),
}

impl Decision {
    pub fn kind(&self) -> DecisionKind {
        match self {
            Decision::Forward { .. } => DecisionKind::Forward,
            Decision::PassThrough { .. } => DecisionKind::PassThrough,
            Decision::SegmentNow { .. } => DecisionKind::SegmentNow,
            Decision::Fragment { .. } => DecisionKind::Fragment,
            Decision::Reject(_) => DecisionKind::Reject,
        }
    }

    /// 本次决策所依据的有效 MTU
    pub fn effective_mtu(&self) -> usize {
        match *self {
            Decision::Forward { effective_mtu }
            | Decision::PassThrough { effective_mtu, .. }
            | Decision::SegmentNow { effective_mtu, .. }
            | Decision::Fragment { effective_mtu, .. } => effective_mtu,
            Decision::Reject(v) => v.effective_mtu,
        }
    }
}

/// 出口有效 MTU：出接口 MTU，跨隧道时再扣除封装开销
pub fn effective_mtu(egress: &InterfaceDescriptor, tunnel: Option<&TunnelDescriptor>) -> usize {
    match tunnel {
        Some(t) => t.adjust(egress.mtu),
        None => egress.mtu,
    }
}

/// 对数据包做出决策。`egress` 在跨隧道时是隧道的底层出接口。
pub fn decide(
    packet: &Packet,
    ingress: &InterfaceDescriptor,
    egress: &InterfaceDescriptor,
    tunnel: Option<&TunnelDescriptor>,
) -> Decision {
    let repr = PacketRepr::classify(packet, ingress);
    decide_repr(packet, &repr, egress, tunnel)
}

/// 与 `decide` 相同，但使用调用者给出的包表示（例如上一跳已打的 GSO 标签）
#[tracing::instrument(
    skip_all,
    fields(
        payload_len = packet.payload_len(),
        gso = ?repr.gso_size(),
        egress_mtu = egress.mtu,
        tunnel = tunnel.is_some()
    )
)]
pub fn decide_repr(
    packet: &Packet,
    repr: &PacketRepr,
    egress: &InterfaceDescriptor,
    tunnel: Option<&TunnelDescriptor>,
) -> Decision {
    let mtu = effective_mtu(egress, tunnel);
    let Some(version) = packet.ip_version() else {
        debug!("非 IP 包，整包转发");
        return Decision::Forward { effective_mtu: mtu };
    };

    let headers = packet.l3_l4_header_len();
    let payload = packet.payload_len();
    let unit_len = match repr {
        PacketRepr::GsoTagged { gso_size } => headers + payload.min(*gso_size),
        _ => headers + payload,
    };

    let overflow = packet.ip_length_overflows();
    trace!(mtu, headers, unit_len, overflow, "MTU 检查");

    if unit_len > mtu {
        if packet.dont_fragment() {
            debug!("🚫 DF 置位且超出有效 MTU");
            return reject(version, unit_len, mtu);
        }
        if !overflow {
            let fragment_size = fragment_size(mtu, version.header_len());
            debug!(fragment_size, "✂️  超出有效 MTU，IP 分片");
            return Decision::Fragment {
                effective_mtu: mtu,
                fragment_size,
            };
        }
        // 分片偏移只有 13 位，超过 65535 字节的数据报无法分片
        return match *repr {
            PacketRepr::GsoTagged { gso_size } => {
                segment_now(packet, gso_size, mtu, egress, tunnel, SegmentReason::LengthOverflow)
            }
            _ => reject(version, packet.l3_len(), mtu.min(usize::from(u16::MAX))),
        };
    }

    let PacketRepr::GsoTagged { gso_size } = *repr else {
        if overflow {
            debug!("🚫 IP 长度字段放不下整包");
            return reject(version, packet.l3_len(), mtu.min(usize::from(u16::MAX)));
        }
        debug!("整包可直接发送");
        return Decision::Forward { effective_mtu: mtu };
    };

    let reason = if tunnel.is_some() {
        Some(SegmentReason::TunnelBoundary)
    } else if !egress.gso_enabled {
        Some(SegmentReason::EgressNotGso)
    } else if overflow {
        Some(SegmentReason::LengthOverflow)
    } else if ETHERNET_HEADER_LEN + headers + gso_size > egress.buffer_capacity {
        Some(SegmentReason::BufferCapacityExceeded)
    } else {
        None
    };

    match reason {
        None => {
            debug!(gso_size, "🚀 GSO 端到端透传");
            Decision::PassThrough {
                effective_mtu: mtu,
                gso_size,
            }
        }
        Some(reason) => segment_now(packet, gso_size, mtu, egress, tunnel, reason),
    }
}

fn reject(version: IpVersion, unit_len: usize, effective_mtu: usize) -> Decision {
    let violation = OversizeViolation {
        version,
        unit_len,
        effective_mtu,
    };
    debug!(?violation, "拒绝");
    Decision::Reject(violation)
}

fn segment_now(
    packet: &Packet,
    gso_size: usize,
    effective_mtu: usize,
    egress: &InterfaceDescriptor,
    tunnel: Option<&TunnelDescriptor>,
    reason: SegmentReason,
) -> Decision {
    let segment_size = segment_size(packet, gso_size, effective_mtu, egress, tunnel);
    debug!(segment_size, ?reason, "📦 物化 GSO 分段");
    Decision::SegmentNow {
        effective_mtu,
        segment_size,
        reason,
    }
}

/// 分段大小 = min(GSO 提示, 有效 MTU 推出的 MSS, 缓冲容量 − 整个头栈)，至少 1 字节。
///
/// 头栈包括以太网头以及跨隧道时追加的外层封装。
pub fn segment_size(
    packet: &Packet,
    gso_size: usize,
    effective_mtu: usize,
    egress: &InterfaceDescriptor,
    tunnel: Option<&TunnelDescriptor>,
) -> usize {
    let mss = effective_mtu.saturating_sub(packet.l3_l4_header_len());
    let stack = packet.headers().total_len() + tunnel.map_or(0, TunnelDescriptor::encap_len);
    let room = egress.buffer_capacity.saturating_sub(stack);
    trace!(gso_size, mss, room, "分段大小候选");
    gso_size.min(mss).min(room).max(1)
}

/// 分片负载大小：有效 MTU 减去 IP 头后向下取整到 8 的倍数，至少 8
pub fn fragment_size(effective_mtu: usize, ip_header_len: usize) -> usize {
    (effective_mtu.saturating_sub(ip_header_len) & !7).max(8)
}
