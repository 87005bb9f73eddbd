//! 包表示
//!
//! GSO 的“延迟物化”：入口只打标签，直到 GSO 无法继续传播的边界
//! （出接口不支持 GSO、跨越隧道、超出缓冲容量）才真正切成分段。

use crate::iface::InterfaceDescriptor;
use crate::wire::Packet;

use super::emit::{SegmentDescriptor, plan_segments};

/// 数据包在转发路径上的表示
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketRepr {
    /// 普通整包
    Whole,
    /// 携带 GSO 元数据的超大包，`gso_size` 为分段大小提示
    GsoTagged { gso_size: usize },
    /// 已物化为线上分段
    Segmented(Vec<SegmentDescriptor>),
}

impl PacketRepr {
    /// 入口分类：GSO 接口收到的、负载大于提示的 TCP 包打上 GSO 标签
    pub fn classify(packet: &Packet, ingress: &InterfaceDescriptor) -> PacketRepr {
        let gso_size = ingress.effective_gso_size();
        if ingress.gso_enabled && packet.is_tcp() && packet.payload_len() > gso_size {
            PacketRepr::GsoTagged { gso_size }
        } else {
            PacketRepr::Whole
        }
    }

    pub fn gso_size(&self) -> Option<usize> {
        match self {
            PacketRepr::GsoTagged { gso_size } => Some(*gso_size),
            _ => None,
        }
    }

    pub fn is_gso(&self) -> bool {
        matches!(self, PacketRepr::GsoTagged { .. })
    }

    /// 按 `segment_size` 物化为分段描述；已物化的保持不变
    pub fn materialize(self, payload_len: usize, segment_size: usize) -> PacketRepr {
        match self {
            PacketRepr::Segmented(_) => self,
            _ => PacketRepr::Segmented(plan_segments(payload_len, segment_size).collect()),
        }
    }
}
