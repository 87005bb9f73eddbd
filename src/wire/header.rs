//! 协议头类型
//!
//! 定义本引擎需要关心的各层协议头（Ethernet / IPv4 / IPv6 / UDP / VXLAN / TCP / ICMP）
//! 及其固定长度。IPv4 不带选项，IPv6 不带扩展头，TCP 不带选项。

use std::net::{Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

use super::mac::MacAddr;

pub const ETHERNET_HEADER_LEN: usize = 14;
pub const IPV4_HEADER_LEN: usize = 20;
pub const IPV6_HEADER_LEN: usize = 40;
pub const UDP_HEADER_LEN: usize = 8;
pub const VXLAN_HEADER_LEN: usize = 8;
pub const TCP_HEADER_LEN: usize = 20;
pub const ICMP_HEADER_LEN: usize = 8;

/// 最小以太网帧（不含 FCS）
pub const MIN_ETHERNET_FRAME: usize = 60;

/// IANA 分配给 VXLAN 的 UDP 端口
pub const VXLAN_UDP_PORT: u16 = 4789;

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_IPV6: u16 = 0x86dd;

pub const IPPROTO_ICMP: u8 = 1;
pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;
pub const IPPROTO_ICMPV6: u8 = 58;

/// IP 协议族
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IpVersion {
    V4,
    V6,
}

impl IpVersion {
    /// 该协议族固定头长度
    pub fn header_len(self) -> usize {
        match self {
            IpVersion::V4 => IPV4_HEADER_LEN,
            IpVersion::V6 => IPV6_HEADER_LEN,
        }
    }

    pub fn ethertype(self) -> u16 {
        match self {
            IpVersion::V4 => ETHERTYPE_IPV4,
            IpVersion::V6 => ETHERTYPE_IPV6,
        }
    }
}

/// 协议层标签，用于在 `HeaderStack` 中定位某一层
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Ethernet,
    Ipv4,
    Ipv6,
    Udp,
    Vxlan,
    Tcp,
    Icmpv4,
    Icmpv6,
}

impl Layer {
    pub fn is_ip(self) -> bool {
        matches!(self, Layer::Ipv4 | Layer::Ipv6)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetHeader {
    pub dst: MacAddr,
    pub src: MacAddr,
    pub ethertype: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    /// 总长度（含本头）
    pub total_len: u16,
    pub ident: u16,
    pub dont_fragment: bool,
    pub more_fragments: bool,
    /// 分片偏移，单位 8 字节
    pub frag_offset: u16,
    pub ttl: u8,
    pub protocol: u8,
}

impl Ipv4Header {
    pub fn new(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8) -> Self {
        Self {
            src,
            dst,
            total_len: IPV4_HEADER_LEN as u16,
            ident: 0,
            dont_fragment: false,
            more_fragments: false,
            frag_offset: 0,
            ttl: 64,
            protocol,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6Header {
    pub src: Ipv6Addr,
    pub dst: Ipv6Addr,
    /// 负载长度（不含本头）
    pub payload_len: u16,
    pub next_header: u8,
    pub hop_limit: u8,
    pub traffic_class: u8,
    pub flow_label: u32,
}

impl Ipv6Header {
    pub fn new(src: Ipv6Addr, dst: Ipv6Addr, next_header: u8) -> Self {
        Self {
            src,
            dst,
            payload_len: 0,
            next_header,
            hop_limit: 64,
            traffic_class: 0,
            flow_label: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    /// UDP 长度（含本头）
    pub len: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VxlanHeader {
    /// 24-bit VXLAN 网络标识
    pub vni: u32,
}

/// TCP 标志位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TcpFlags(pub u8);

impl TcpFlags {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
    pub const RST: u8 = 0x04;
    pub const PSH: u8 = 0x08;
    pub const ACK: u8 = 0x10;

    pub fn contains(self, bits: u8) -> bool {
        self.0 & bits == bits
    }

    pub fn without(self, bits: u8) -> TcpFlags {
        TcpFlags(self.0 & !bits)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    pub flags: TcpFlags,
    pub window: u16,
}

impl TcpHeader {
    pub fn new(src_port: u16, dst_port: u16) -> Self {
        Self {
            src_port,
            dst_port,
            seq: 0,
            ack: 0,
            flags: TcpFlags(TcpFlags::ACK | TcpFlags::PSH),
            window: 65535,
        }
    }
}

/// ICMPv4 消息（仅覆盖本引擎会产生/识别的类型）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Icmpv4Message {
    /// type 3 code 4，携带下一跳 MTU（RFC 1191）
    FragmentationNeeded { next_hop_mtu: u16 },
    Other { icmp_type: u8, code: u8, rest: [u8; 4] },
}

impl Icmpv4Message {
    pub const DEST_UNREACHABLE: u8 = 3;
    pub const CODE_FRAG_NEEDED: u8 = 4;

    pub fn type_code(&self) -> (u8, u8) {
        match *self {
            Icmpv4Message::FragmentationNeeded { .. } => {
                (Self::DEST_UNREACHABLE, Self::CODE_FRAG_NEEDED)
            }
            Icmpv4Message::Other { icmp_type, code, .. } => (icmp_type, code),
        }
    }

    /// 差错消息（type 3/4/5/11/12）不应再触发新的差错
    pub fn is_error(&self) -> bool {
        matches!(self.type_code().0, 3 | 4 | 5 | 11 | 12)
    }
}

/// ICMPv6 消息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Icmpv6Message {
    /// type 2 code 0
    PacketTooBig { mtu: u32 },
    Other { icmp_type: u8, code: u8, rest: [u8; 4] },
}

impl Icmpv6Message {
    pub const PACKET_TOO_BIG: u8 = 2;

    pub fn type_code(&self) -> (u8, u8) {
        match *self {
            Icmpv6Message::PacketTooBig { .. } => (Self::PACKET_TOO_BIG, 0),
            Icmpv6Message::Other { icmp_type, code, .. } => (icmp_type, code),
        }
    }

    /// ICMPv6 type < 128 均为差错消息
    pub fn is_error(&self) -> bool {
        self.type_code().0 < 128
    }
}

/// 单个协议头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Header {
    Ethernet(EthernetHeader),
    Ipv4(Ipv4Header),
    Ipv6(Ipv6Header),
    Udp(UdpHeader),
    Vxlan(VxlanHeader),
    Tcp(TcpHeader),
    Icmpv4(Icmpv4Message),
    Icmpv6(Icmpv6Message),
}

impl Header {
    /// 该头在线上占用的字节数
    pub fn wire_len(&self) -> usize {
        match self {
            Header::Ethernet(_) => ETHERNET_HEADER_LEN,
            Header::Ipv4(_) => IPV4_HEADER_LEN,
            Header::Ipv6(_) => IPV6_HEADER_LEN,
            Header::Udp(_) => UDP_HEADER_LEN,
            Header::Vxlan(_) => VXLAN_HEADER_LEN,
            Header::Tcp(_) => TCP_HEADER_LEN,
            Header::Icmpv4(_) | Header::Icmpv6(_) => ICMP_HEADER_LEN,
        }
    }

    pub fn layer(&self) -> Layer {
        match self {
            Header::Ethernet(_) => Layer::Ethernet,
            Header::Ipv4(_) => Layer::Ipv4,
            Header::Ipv6(_) => Layer::Ipv6,
            Header::Udp(_) => Layer::Udp,
            Header::Vxlan(_) => Layer::Vxlan,
            Header::Tcp(_) => Layer::Tcp,
            Header::Icmpv4(_) => Layer::Icmpv4,
            Header::Icmpv6(_) => Layer::Icmpv6,
        }
    }
}
