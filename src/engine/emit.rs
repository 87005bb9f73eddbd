//! 分段 / 分片发射器
//!
//! 把决策落实为线上包序列。序列是惰性的、有限的，克隆一个未推进的迭代器即可重新开始；
//! 所有输出负载区间按顺序拼接后恰好覆盖原负载一次。

use std::ops::Range;

use serde::Serialize;

use crate::wire::{Header, HeaderStack, IPV4_HEADER_LEN, Packet, Payload, TcpFlags};

use super::decision::Decision;

/// 一个 TCP 分段在原负载中的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SegmentDescriptor {
    /// 本段首字节相对原序列号的偏移
    pub sequence_offset: usize,
    pub length: usize,
    pub is_last: bool,
}

/// 一个 IP 分片在原 L3 负载中的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FragmentDescriptor {
    /// 字节偏移，8 的倍数
    pub fragment_offset: usize,
    /// 除末片外为 8 的倍数
    pub length: usize,
    pub is_last: bool,
}

/// 把 `[0, total)` 按 `chunk` 切成连续区间
#[derive(Debug, Clone)]
struct Chunks {
    total: usize,
    chunk: usize,
    next: usize,
}

impl Chunks {
    fn new(total: usize, chunk: usize) -> Self {
        Self {
            total,
            chunk: chunk.max(1),
            next: 0,
        }
    }

    fn remaining(&self) -> usize {
        (self.total - self.next).div_ceil(self.chunk)
    }
}

impl Iterator for Chunks {
    type Item = (usize, usize, bool);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.total {
            return None;
        }
        let offset = self.next;
        let len = self.chunk.min(self.total - offset);
        self.next += len;
        Some((offset, len, self.next == self.total))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining();
        (n, Some(n))
    }
}

/// 分段计划
#[derive(Debug, Clone)]
pub struct SegmentPlan(Chunks);

impl Iterator for SegmentPlan {
    type Item = SegmentDescriptor;

    fn next(&mut self) -> Option<SegmentDescriptor> {
        let (sequence_offset, length, is_last) = self.0.next()?;
        Some(SegmentDescriptor {
            sequence_offset,
            length,
            is_last,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}

impl ExactSizeIterator for SegmentPlan {}

/// 分片计划
#[derive(Debug, Clone)]
pub struct FragmentPlan(Chunks);

impl Iterator for FragmentPlan {
    type Item = FragmentDescriptor;

    fn next(&mut self) -> Option<FragmentDescriptor> {
        let (fragment_offset, length, is_last) = self.0.next()?;
        Some(FragmentDescriptor {
            fragment_offset,
            length,
            is_last,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}

impl ExactSizeIterator for FragmentPlan {}

pub fn plan_segments(payload_len: usize, segment_size: usize) -> SegmentPlan {
    SegmentPlan(Chunks::new(payload_len, segment_size))
}

/// `fragment_size` 会向下取整到 8 的倍数（至少 8）
pub fn plan_fragments(l3_payload_len: usize, fragment_size: usize) -> FragmentPlan {
    FragmentPlan(Chunks::new(l3_payload_len, (fragment_size & !7).max(8)))
}

/// TCP 分段发射器
#[derive(Debug, Clone)]
pub struct SegmentIter<'a> {
    packet: &'a Packet,
    plan: SegmentPlan,
    emitted: u16,
}

impl<'a> SegmentIter<'a> {
    pub fn new(packet: &'a Packet, segment_size: usize) -> Self {
        Self {
            packet,
            plan: plan_segments(packet.payload_len(), segment_size),
            emitted: 0,
        }
    }

    /// 剩余分段的描述
    pub fn descriptors(&self) -> SegmentPlan {
        self.plan.clone()
    }
}

impl Iterator for SegmentIter<'_> {
    type Item = Packet;

    fn next(&mut self) -> Option<Packet> {
        let d = self.plan.next()?;
        let mut headers = self.packet.headers().clone();
        if let Some(tcp) = headers.tcp_mut() {
            tcp.seq = tcp.seq.wrapping_add(d.sequence_offset as u32);
            if !d.is_last {
                tcp.flags = tcp.flags.without(TcpFlags::FIN | TcpFlags::PSH);
            }
        }
        if let Some(Header::Ipv4(ip)) = self
            .packet
            .network_index()
            .and_then(|i| headers.get_mut(i))
        {
            ip.ident = ip.ident.wrapping_add(self.emitted);
        }
        self.emitted = self.emitted.wrapping_add(1);
        let payload = self
            .packet
            .payload()
            .slice(d.sequence_offset..d.sequence_offset + d.length);
        Some(Packet::new(headers, payload))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.plan.size_hint()
    }
}

impl ExactSizeIterator for SegmentIter<'_> {}

/// IPv4 分片发射器。传输层头被编码进 L3 负载，只出现在首片中。
#[derive(Debug, Clone)]
pub struct FragmentIter {
    template: HeaderStack,
    ip_index: usize,
    /// 编码后的传输层头，位于 L3 负载最前面
    l4_header: Vec<u8>,
    payload: Payload,
    plan: FragmentPlan,
    /// 被再次分片时原包的偏移（字节）
    base_offset: usize,
    /// 原包自身的 MF，末片继承
    tail_more_fragments: bool,
}

impl FragmentIter {
    /// 非 IPv4 包，或数据报超过 65535 字节（13 位偏移表示不了）时返回 `None`
    pub fn new(packet: &Packet, fragment_size: usize) -> Option<Self> {
        let ip_index = packet.network_index()?;
        let ip = packet.headers().ipv4_at(ip_index)?;
        let base_offset = usize::from(ip.frag_offset) * 8;
        let mut l4_header = Vec::with_capacity(packet.headers().len_from(ip_index + 1));
        packet.headers().write_from(ip_index + 1, &mut l4_header);
        let body_len = l4_header.len() + packet.payload_len();
        if base_offset + IPV4_HEADER_LEN + body_len > usize::from(u16::MAX) {
            return None;
        }
        Some(Self {
            template: packet.headers().truncated(ip_index + 1),
            ip_index,
            l4_header,
            payload: packet.payload().clone(),
            plan: plan_fragments(body_len, fragment_size),
            base_offset,
            tail_more_fragments: ip.more_fragments,
        })
    }

    pub fn descriptors(&self) -> FragmentPlan {
        self.plan.clone()
    }

    /// L3 负载中的一段。只有覆盖传输层头的分片需要复制，其余直接切原负载。
    fn body(&self, range: Range<usize>) -> Payload {
        let hdr = self.l4_header.len();
        if range.start >= hdr {
            return self.payload.slice(range.start - hdr..range.end - hdr);
        }
        let mut bytes = self.l4_header[range.start..range.end.min(hdr)].to_vec();
        if range.end > hdr {
            bytes.extend_from_slice(self.payload.slice(0..range.end - hdr).as_bytes());
        }
        Payload::new(bytes)
    }
}

impl Iterator for FragmentIter {
    type Item = Packet;

    fn next(&mut self) -> Option<Packet> {
        let d = self.plan.next()?;
        let mut headers = self.template.clone();
        if let Some(Header::Ipv4(ip)) = headers.get_mut(self.ip_index) {
            ip.frag_offset = ((self.base_offset + d.fragment_offset) / 8) as u16;
            ip.more_fragments = !d.is_last || self.tail_more_fragments;
            ip.dont_fragment = false;
        }
        let payload = self.body(d.fragment_offset..d.fragment_offset + d.length);
        Some(Packet::new(headers, payload))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.plan.size_hint()
    }
}

impl ExactSizeIterator for FragmentIter {}

/// 一次决策的输出序列
#[derive(Debug, Clone)]
pub enum Emission<'a> {
    /// 整包转发或 GSO 透传：恰好一个包
    Single(Option<Packet>),
    Segments(SegmentIter<'a>),
    Fragments(FragmentIter),
    /// 拒绝：不向出口发送任何东西（由 PMTU 应答处理）
    Empty,
}

impl Iterator for Emission<'_> {
    type Item = Packet;

    fn next(&mut self) -> Option<Packet> {
        match self {
            Emission::Single(p) => p.take(),
            Emission::Segments(it) => it.next(),
            Emission::Fragments(it) => it.next(),
            Emission::Empty => None,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            Emission::Single(p) => {
                let n = usize::from(p.is_some());
                (n, Some(n))
            }
            Emission::Segments(it) => it.size_hint(),
            Emission::Fragments(it) => it.size_hint(),
            Emission::Empty => (0, Some(0)),
        }
    }
}

impl ExactSizeIterator for Emission<'_> {}

/// 根据决策生成输出序列
pub fn emit<'a>(packet: &'a Packet, decision: &Decision) -> Emission<'a> {
    match *decision {
        Decision::Forward { .. } | Decision::PassThrough { .. } => {
            Emission::Single(Some(packet.clone()))
        }
        Decision::SegmentNow { segment_size, .. } => {
            Emission::Segments(SegmentIter::new(packet, segment_size))
        }
        Decision::Fragment { fragment_size, .. } => FragmentIter::new(packet, fragment_size)
            .map_or(Emission::Empty, Emission::Fragments),
        Decision::Reject(_) => Emission::Empty,
    }
}
