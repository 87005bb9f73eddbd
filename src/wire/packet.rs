//! 数据包类型
//!
//! `Packet` = 头栈 + 负载。负载长度是最内层传输头之下的字节数。

use std::net::IpAddr;

use thiserror::Error;

use super::header::{
    EthernetHeader, Header, IPPROTO_TCP, IPV6_HEADER_LEN, IpVersion, Ipv4Header, Ipv6Header,
    TcpHeader,
};
use super::mac::MacAddr;
use super::payload::Payload;
use super::stack::{HeaderStack, StackError};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("source {src} and destination {dst} are different address families")]
    AddressFamilyMismatch { src: IpAddr, dst: IpAddr },
    #[error(transparent)]
    Stack(#[from] StackError),
}

/// 网络数据包
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    headers: HeaderStack,
    payload: Payload,
}

impl Packet {
    /// 组装数据包，并按负载长度重算各层长度字段
    pub fn new(mut headers: HeaderStack, payload: Payload) -> Self {
        headers.recompute_lengths(payload.len());
        Self { headers, payload }
    }

    pub fn headers(&self) -> &HeaderStack {
        &self.headers
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    pub fn into_parts(self) -> (HeaderStack, Payload) {
        (self.headers, self.payload)
    }

    /// 线上总字节数（含以太网头）
    pub fn wire_len(&self) -> usize {
        self.headers.total_len() + self.payload.len()
    }

    /// 承载传输层的网络层头位置
    pub fn network_index(&self) -> Option<usize> {
        self.headers.innermost_ip()
    }

    pub fn ip_version(&self) -> Option<IpVersion> {
        match self.headers.get(self.network_index()?)? {
            Header::Ipv4(_) => Some(IpVersion::V4),
            Header::Ipv6(_) => Some(IpVersion::V6),
            _ => None,
        }
    }

    /// 网络层总长度：最内层 IP 头 + 其后所有头 + 负载
    pub fn l3_len(&self) -> usize {
        match self.network_index() {
            Some(ip) => self.headers.len_from(ip) + self.payload.len(),
            None => 0,
        }
    }

    /// 网络层与传输层头部之和（IP 头 + TCP 头）
    pub fn l3_l4_header_len(&self) -> usize {
        match self.network_index() {
            Some(ip) => self.headers.len_from(ip),
            None => 0,
        }
    }

    /// 最内层 IP 的 16 位长度字段（IPv4 总长度、IPv6 负载长度）是否放不下本包
    pub fn ip_length_overflows(&self) -> bool {
        let field = match self.ip_version() {
            Some(IpVersion::V4) => self.l3_len(),
            Some(IpVersion::V6) => self.l3_len().saturating_sub(IPV6_HEADER_LEN),
            None => return false,
        };
        field > usize::from(u16::MAX)
    }

    /// 是否禁止分片。IPv6 没有逐包 DF 位，路由器从不分片，始终视为置位。
    pub fn dont_fragment(&self) -> bool {
        match self.network_index().and_then(|i| self.headers.get(i)) {
            Some(Header::Ipv4(ip)) => ip.dont_fragment,
            _ => true,
        }
    }

    pub fn is_tcp(&self) -> bool {
        self.headers.tcp_index().is_some()
    }

    /// 是否是 ICMP/ICMPv6 差错消息
    pub fn is_icmp_error(&self) -> bool {
        self.headers.headers().iter().any(|h| match h {
            Header::Icmpv4(m) => m.is_error(),
            Header::Icmpv6(m) => m.is_error(),
            _ => false,
        })
    }

    /// 最外层以太网头
    pub fn ethernet(&self) -> Option<&EthernetHeader> {
        match self.headers.get(0) {
            Some(Header::Ethernet(eth)) => Some(eth),
            _ => None,
        }
    }

    pub fn ipv4(&self) -> Option<&Ipv4Header> {
        self.headers.ipv4_at(self.network_index()?)
    }

    pub fn ipv6(&self) -> Option<&Ipv6Header> {
        self.headers.ipv6_at(self.network_index()?)
    }

    pub fn tcp(&self) -> Option<&TcpHeader> {
        self.headers.tcp()
    }
}

/// 构造 Ethernet / IP / TCP 数据包
#[derive(Debug, Clone)]
pub struct TcpPacketBuilder {
    src_mac: MacAddr,
    dst_mac: MacAddr,
    src: IpAddr,
    dst: IpAddr,
    tcp: TcpHeader,
    dont_fragment: bool,
    ident: u16,
}

impl TcpPacketBuilder {
    pub fn new(
        src: IpAddr,
        dst: IpAddr,
        src_port: u16,
        dst_port: u16,
    ) -> Result<Self, PacketError> {
        if src.is_ipv4() != dst.is_ipv4() {
            return Err(PacketError::AddressFamilyMismatch { src, dst });
        }
        Ok(Self {
            src_mac: MacAddr::ZERO,
            dst_mac: MacAddr::ZERO,
            src,
            dst,
            tcp: TcpHeader::new(src_port, dst_port),
            dont_fragment: false,
            ident: 0,
        })
    }

    pub fn macs(mut self, src: MacAddr, dst: MacAddr) -> Self {
        self.src_mac = src;
        self.dst_mac = dst;
        self
    }

    /// 仅对 IPv4 有意义
    pub fn dont_fragment(mut self, df: bool) -> Self {
        self.dont_fragment = df;
        self
    }

    pub fn seq(mut self, seq: u32) -> Self {
        self.tcp.seq = seq;
        self
    }

    pub fn ident(mut self, ident: u16) -> Self {
        self.ident = ident;
        self
    }

    pub fn build(self, payload: Payload) -> Result<Packet, PacketError> {
        let (ip, version) = match (self.src, self.dst) {
            (IpAddr::V4(src), IpAddr::V4(dst)) => {
                let mut ip = Ipv4Header::new(src, dst, IPPROTO_TCP);
                ip.dont_fragment = self.dont_fragment;
                ip.ident = self.ident;
                (Header::Ipv4(ip), IpVersion::V4)
            }
            (IpAddr::V6(src), IpAddr::V6(dst)) => {
                (Header::Ipv6(Ipv6Header::new(src, dst, IPPROTO_TCP)), IpVersion::V6)
            }
            (src, dst) => return Err(PacketError::AddressFamilyMismatch { src, dst }),
        };
        let eth = Header::Ethernet(EthernetHeader {
            dst: self.dst_mac,
            src: self.src_mac,
            ethertype: version.ethertype(),
        });
        let headers = HeaderStack::new(vec![eth, ip, Header::Tcp(self.tcp)])?;
        Ok(Packet::new(headers, payload))
    }
}
