//! VXLAN 隧道
//!
//! 隧道开销适配：内层包的有效 MTU = 底层出接口 MTU − 封装开销。
//! 另外负责把内层包加上外层 Ethernet / IP / UDP / VXLAN 头。

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use thiserror::Error;

use super::id::IfIndex;
use crate::wire::{
    ETHERNET_HEADER_LEN, EthernetHeader, Header, IPPROTO_UDP, IpVersion, Ipv4Header, Ipv6Header,
    MacAddr, Packet, UDP_HEADER_LEN, UdpHeader, VXLAN_HEADER_LEN, VXLAN_UDP_PORT, VxlanHeader,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TunnelError {
    #[error("tunnel endpoints {src} and {dst} are different address families")]
    AddressFamilyMismatch { src: IpAddr, dst: IpAddr },
    #[error("vni {0} does not fit in 24 bits")]
    VniOutOfRange(u32),
}

/// 外层端点，构造时保证同族
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoints {
    V4(Ipv4Addr, Ipv4Addr),
    V6(Ipv6Addr, Ipv6Addr),
}

/// VXLAN 隧道描述符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelDescriptor {
    pub vni: u32,
    /// 外层包真正的出接口
    pub underlay: IfIndex,
    endpoints: Endpoints,
    pub src_mac: MacAddr,
    pub dst_mac: MacAddr,
    pub udp_src_port: u16,
}

impl TunnelDescriptor {
    pub fn vxlan(
        vni: u32,
        underlay: IfIndex,
        src: IpAddr,
        dst: IpAddr,
    ) -> Result<Self, TunnelError> {
        let endpoints = match (src, dst) {
            (IpAddr::V4(src), IpAddr::V4(dst)) => Endpoints::V4(src, dst),
            (IpAddr::V6(src), IpAddr::V6(dst)) => Endpoints::V6(src, dst),
            (src, dst) => return Err(TunnelError::AddressFamilyMismatch { src, dst }),
        };
        if vni > 0x00ff_ffff {
            return Err(TunnelError::VniOutOfRange(vni));
        }
        Ok(Self {
            vni,
            underlay,
            endpoints,
            src_mac: MacAddr::ZERO,
            dst_mac: MacAddr::ZERO,
            udp_src_port: VXLAN_UDP_PORT,
        })
    }

    pub fn with_macs(mut self, src: MacAddr, dst: MacAddr) -> Self {
        self.src_mac = src;
        self.dst_mac = dst;
        self
    }

    pub fn with_udp_src_port(mut self, port: u16) -> Self {
        self.udp_src_port = port;
        self
    }

    /// 外层源/目的地址
    pub fn endpoints(&self) -> (IpAddr, IpAddr) {
        match self.endpoints {
            Endpoints::V4(src, dst) => (IpAddr::V4(src), IpAddr::V4(dst)),
            Endpoints::V6(src, dst) => (IpAddr::V6(src), IpAddr::V6(dst)),
        }
    }

    pub fn outer_version(&self) -> IpVersion {
        match self.endpoints {
            Endpoints::V4(..) => IpVersion::V4,
            Endpoints::V6(..) => IpVersion::V6,
        }
    }

    /// `encapsulate` 在内层帧之前追加的字节数：外层 Ethernet + IP + UDP + VXLAN
    pub fn encap_len(&self) -> usize {
        ETHERNET_HEADER_LEN + self.outer_version().header_len() + UDP_HEADER_LEN + VXLAN_HEADER_LEN
    }

    /// 从出接口 MTU 中扣除的开销：外层 Ethernet + IP + UDP + VXLAN + 内层 Ethernet。
    ///
    /// IPv4 外层为 64 字节，IPv6 外层为 84 字节。
    pub fn overhead(&self) -> usize {
        self.encap_len() + ETHERNET_HEADER_LEN
    }

    /// 扣除封装开销后的有效 MTU（饱和到 0）
    pub fn adjust(&self, effective_mtu: usize) -> usize {
        effective_mtu.saturating_sub(self.overhead())
    }

    /// 在内层帧外加上 VXLAN 封装，外层长度字段随之重算
    pub fn encapsulate(&self, inner: Packet) -> Packet {
        let version = self.outer_version();
        let ip = match self.endpoints {
            Endpoints::V4(src, dst) => Header::Ipv4(Ipv4Header::new(src, dst, IPPROTO_UDP)),
            Endpoints::V6(src, dst) => Header::Ipv6(Ipv6Header::new(src, dst, IPPROTO_UDP)),
        };
        let (mut headers, payload) = inner.into_parts();
        headers.prepend([
            Header::Ethernet(EthernetHeader {
                dst: self.dst_mac,
                src: self.src_mac,
                ethertype: version.ethertype(),
            }),
            ip,
            Header::Udp(UdpHeader {
                src_port: self.udp_src_port,
                dst_port: VXLAN_UDP_PORT,
                len: 0,
            }),
            Header::Vxlan(VxlanHeader { vni: self.vni }),
        ]);
        Packet::new(headers, payload)
    }
}

/// 多层嵌套隧道：由内向外依次扣除每层开销
pub fn adjust_chain<'a>(
    effective_mtu: usize,
    tunnels: impl IntoIterator<Item = &'a TunnelDescriptor>,
) -> usize {
    tunnels
        .into_iter()
        .fold(effective_mtu, |mtu, tunnel| tunnel.adjust(mtu))
}
