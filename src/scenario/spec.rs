use std::fs;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::ScenarioError;
use crate::engine::Route;
use crate::iface::{
    ConfigCommand, IfIndex, InterfaceDescriptor, TunnelDescriptor, TunnelError, TunnelId,
};
use crate::wire::{MacAddr, Packet, PacketError, Payload, TcpPacketBuilder};

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSpec {
    pub schema_version: u32,
    #[serde(default)]
    pub meta: Option<ScenarioMeta>,
    pub interfaces: Vec<InterfaceSpec>,
    #[serde(default)]
    pub tunnels: Vec<TunnelSpec>,
    #[serde(default)]
    pub steps: Vec<StepSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioMeta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceSpec {
    pub ifindex: IfIndex,
    #[serde(default)]
    pub name: Option<String>,
    pub mtu: usize,
    #[serde(default)]
    pub gso: bool,
    #[serde(default)]
    pub gso_size: Option<usize>,
    #[serde(default)]
    pub buffer_capacity: Option<usize>,
    #[serde(default)]
    pub ip4: Option<Ipv4Addr>,
    #[serde(default)]
    pub ip6: Option<Ipv6Addr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelSpec {
    pub id: TunnelId,
    pub vni: u32,
    pub underlay: IfIndex,
    pub src: IpAddr,
    pub dst: IpAddr,
    #[serde(default)]
    pub src_mac: Option<MacAddr>,
    #[serde(default)]
    pub dst_mac: Option<MacAddr>,
    #[serde(default)]
    pub udp_src_port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepSpec {
    SetMtu {
        ifindex: IfIndex,
        mtu: usize,
    },
    SetGso {
        ifindex: IfIndex,
        enabled: bool,
        #[serde(default)]
        gso_size: Option<usize>,
    },
    SetBufferCapacity {
        ifindex: IfIndex,
        capacity: usize,
    },
    Send {
        #[serde(default)]
        label: Option<String>,
        ingress: IfIndex,
        route: RouteSpec,
        packet: PacketSpec,
    },
}

/// `{"interface": 1}` 或 `{"tunnel": 1}`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RouteSpec {
    Interface(IfIndex),
    Tunnel(TunnelId),
}

/// Ethernet / IP / TCP 包，负载由单一字节填充
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketSpec {
    pub src: IpAddr,
    pub dst: IpAddr,
    #[serde(default)]
    pub src_mac: Option<MacAddr>,
    #[serde(default)]
    pub dst_mac: Option<MacAddr>,
    #[serde(default = "default_port")]
    pub sport: u16,
    #[serde(default = "default_port")]
    pub dport: u16,
    #[serde(default)]
    pub seq: u32,
    #[serde(default)]
    pub ident: u16,
    /// 仅对 IPv4 有意义；IPv6 总是按 DF 处理
    #[serde(default)]
    pub dont_fragment: bool,
    pub payload_len: usize,
    #[serde(default = "default_fill")]
    pub fill: u8,
}

fn default_port() -> u16 {
    1234
}

fn default_fill() -> u8 {
    0xa5
}

impl ScenarioSpec {
    pub fn from_json_str(raw: &str) -> Result<Self, ScenarioError> {
        let spec: ScenarioSpec = serde_json::from_str(raw)?;
        if spec.schema_version != SCHEMA_VERSION {
            return Err(ScenarioError::UnsupportedSchema(spec.schema_version));
        }
        Ok(spec)
    }

    pub fn from_path(path: &Path) -> Result<Self, ScenarioError> {
        let raw = fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn name(&self) -> Option<&str> {
        self.meta.as_ref().and_then(|m| m.name.as_deref())
    }
}

impl InterfaceSpec {
    /// `default_capacity` 用于未显式给出缓冲容量的接口
    pub fn descriptor(&self, default_capacity: usize) -> InterfaceDescriptor {
        InterfaceDescriptor {
            mtu: self.mtu,
            gso_enabled: self.gso,
            gso_size: self.gso_size,
            buffer_capacity: self.buffer_capacity.unwrap_or(default_capacity),
            ip4: self.ip4,
            ip6: self.ip6,
        }
    }
}

impl TunnelSpec {
    pub fn descriptor(&self) -> Result<TunnelDescriptor, TunnelError> {
        let mut tunnel = TunnelDescriptor::vxlan(self.vni, self.underlay, self.src, self.dst)?
            .with_macs(
                self.src_mac.unwrap_or(MacAddr::local(self.underlay.0)),
                self.dst_mac.unwrap_or_default(),
            );
        if let Some(port) = self.udp_src_port {
            tunnel = tunnel.with_udp_src_port(port);
        }
        Ok(tunnel)
    }
}

impl StepSpec {
    /// 配置类步骤对应的命令；`Send` 返回 `None`
    pub fn config_command(&self) -> Option<ConfigCommand> {
        match *self {
            StepSpec::SetMtu { ifindex, mtu } => Some(ConfigCommand::SetMtu { ifindex, mtu }),
            StepSpec::SetGso {
                ifindex,
                enabled,
                gso_size,
            } => Some(ConfigCommand::SetGso {
                ifindex,
                enabled,
                gso_size,
            }),
            StepSpec::SetBufferCapacity { ifindex, capacity } => {
                Some(ConfigCommand::SetBufferCapacity { ifindex, capacity })
            }
            StepSpec::Send { .. } => None,
        }
    }
}

impl From<RouteSpec> for Route {
    fn from(route: RouteSpec) -> Route {
        match route {
            RouteSpec::Interface(ifindex) => Route::Direct(ifindex),
            RouteSpec::Tunnel(id) => Route::Tunnel(id),
        }
    }
}

impl PacketSpec {
    pub fn build(&self) -> Result<Packet, PacketError> {
        TcpPacketBuilder::new(self.src, self.dst, self.sport, self.dport)?
            .macs(
                self.src_mac.unwrap_or_default(),
                self.dst_mac.unwrap_or_default(),
            )
            .seq(self.seq)
            .ident(self.ident)
            .dont_fragment(self.dont_fragment)
            .build(Payload::filled(self.fill, self.payload_len))
    }
}
