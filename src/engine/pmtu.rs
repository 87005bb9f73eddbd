//! PMTU 差错应答
//!
//! IPv6 生成 ICMPv6 Packet Too Big，IPv4 生成 ICMP 目的不可达 / 需要分片。
//! 无状态、一次性：只在决策为拒绝时触发，差错包沿入口接口发回原发送方。

use std::net::IpAddr;

use thiserror::Error;
use tracing::{debug, warn};

use crate::iface::InterfaceDescriptor;
use crate::wire::{
    ETHERNET_HEADER_LEN, EthernetHeader, Header, HeaderStack, ICMP_HEADER_LEN, IPPROTO_ICMP,
    IPPROTO_ICMPV6, IpVersion, Icmpv4Message, Icmpv6Message, Ipv4Header, Ipv6Header, Packet,
    Payload, StackError,
};

/// IPv6 最小链路 MTU；ICMPv6 差错包不超过这个长度（RFC 4443）
pub const IPV6_MIN_MTU: usize = 1280;

/// ICMPv4 差错包长度上限（RFC 1812 4.3.2.3）
pub const IPV4_ERROR_BUDGET: usize = 576;

/// 差错包的 TTL / hop limit
pub const ERROR_HOP_LIMIT: u8 = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PmtuError {
    #[error("ingress interface has no local {0:?} address to source the error from")]
    NoSourceAddress(IpVersion),
    #[error("packet has no IP header")]
    NotIp,
    #[error("not answering an ICMP error with another error")]
    IcmpError,
    #[error("original source {0} is not a unicast address")]
    UnroutableSource(IpAddr),
    #[error(transparent)]
    Stack(#[from] StackError),
}

/// PMTU 差错应答器，以入口接口的本地地址为源
#[derive(Debug, Clone, Copy)]
pub struct PmtuResponder {
    ingress: InterfaceDescriptor,
}

impl PmtuResponder {
    pub fn new(ingress: InterfaceDescriptor) -> Self {
        Self { ingress }
    }

    /// 为 `original` 构造差错包，报告 `effective_mtu`
    #[tracing::instrument(skip(self, original), fields(payload_len = original.payload_len()))]
    pub fn respond(&self, original: &Packet, effective_mtu: usize) -> Result<Packet, PmtuError> {
        if original.is_icmp_error() {
            return Err(PmtuError::IcmpError);
        }
        let ip_index = original.network_index().ok_or(PmtuError::NotIp)?;
        let version = original.ip_version().ok_or(PmtuError::NotIp)?;
        let local = self
            .ingress
            .local_addr(version)
            .ok_or(PmtuError::NoSourceAddress(version))?;
        let eth = original.ethernet().copied().ok_or(PmtuError::NotIp)?;

        let (ip, icmp, budget) = match (original.headers().get(ip_index), local) {
            (Some(Header::Ipv4(orig)), IpAddr::V4(local)) => {
                if orig.src.is_unspecified() || orig.src.is_broadcast() || orig.src.is_multicast() {
                    return Err(PmtuError::UnroutableSource(IpAddr::V4(orig.src)));
                }
                let mut ip = Ipv4Header::new(local, orig.src, IPPROTO_ICMP);
                ip.ttl = ERROR_HOP_LIMIT;
                let icmp = Icmpv4Message::FragmentationNeeded {
                    next_hop_mtu: u16::try_from(effective_mtu).unwrap_or(u16::MAX),
                };
                (Header::Ipv4(ip), Header::Icmpv4(icmp), IPV4_ERROR_BUDGET)
            }
            (Some(Header::Ipv6(orig)), IpAddr::V6(local)) => {
                if orig.src.is_unspecified() || orig.src.is_multicast() {
                    return Err(PmtuError::UnroutableSource(IpAddr::V6(orig.src)));
                }
                let mut ip = Ipv6Header::new(local, orig.src, IPPROTO_ICMPV6);
                ip.hop_limit = ERROR_HOP_LIMIT;
                let icmp = Icmpv6Message::PacketTooBig {
                    mtu: u32::try_from(effective_mtu).unwrap_or(u32::MAX),
                };
                (Header::Ipv6(ip), Header::Icmpv6(icmp), IPV6_MIN_MTU)
            }
            _ => return Err(PmtuError::NotIp),
        };

        // 引用尽可能多的原始报文（IP 头起），整个差错包不超过预算
        let quote_room = budget - version.header_len() - ICMP_HEADER_LEN;
        let quote = original.bytes_from(ip_index, quote_room);
        debug!(quote_len = quote.len(), effective_mtu, "构造 PMTU 差错");

        let headers = HeaderStack::new(vec![
            Header::Ethernet(EthernetHeader {
                dst: eth.src,
                src: eth.dst,
                ethertype: version.ethertype(),
            }),
            ip,
            icmp,
        ])?;
        let reply = Packet::new(headers, Payload::new(quote));
        warn!(
            ?version,
            effective_mtu,
            reply_len = reply.wire_len() - ETHERNET_HEADER_LEN,
            "⚠️  超大 DF 包被拒绝，回送 PMTU 差错"
        );
        Ok(reply)
    }
}
