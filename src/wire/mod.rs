//! 线上格式模块
//!
//! 此模块包含协议头、头栈、负载和数据包等结构化表示，以及网络字节序编码。

// 子模块声明
mod encode;
mod header;
mod mac;
mod packet;
mod payload;
mod stack;

// 重新导出公共接口
pub use header::{
    ETHERNET_HEADER_LEN, ETHERTYPE_IPV4, ETHERTYPE_IPV6, EthernetHeader, Header, ICMP_HEADER_LEN,
    IPPROTO_ICMP, IPPROTO_ICMPV6, IPPROTO_TCP, IPPROTO_UDP, IPV4_HEADER_LEN, IPV6_HEADER_LEN,
    Icmpv4Message, Icmpv6Message, IpVersion, Ipv4Header, Ipv6Header, Layer, MIN_ETHERNET_FRAME,
    TCP_HEADER_LEN, TcpFlags, TcpHeader, UDP_HEADER_LEN, UdpHeader, VXLAN_HEADER_LEN,
    VXLAN_UDP_PORT, VxlanHeader,
};
pub use mac::{MacAddr, ParseMacError};
pub use packet::{Packet, PacketError, TcpPacketBuilder};
pub use payload::Payload;
pub use stack::{HeaderStack, StackError};
