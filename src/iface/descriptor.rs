//! 接口描述符
//!
//! 每个接口的 MTU、GSO 能力与缓冲容量。描述符是 `Copy` 的值，
//! 决策过程读取的总是一份完整快照。

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use thiserror::Error;

use crate::wire::{IPV6_HEADER_LEN, IpVersion, MIN_ETHERNET_FRAME, TCP_HEADER_LEN};

/// 单个缓冲的默认容量（字节），与 MTU 无关的平台特性
pub const DEFAULT_BUFFER_CAPACITY: usize = 2048;

/// 以太网默认 MTU
pub const DEFAULT_MTU: usize = 9000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("mtu must be positive")]
    ZeroMtu,
    #[error("gso size must be positive")]
    ZeroGsoSize,
    #[error("buffer capacity {capacity} is below the minimum ethernet frame ({min})")]
    BufferTooSmall { capacity: usize, min: usize },
}

/// 接口描述符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceDescriptor {
    /// L3 负载上限（不含以太网头）
    pub mtu: usize,
    /// 接口能否携带 GSO 元数据（收到的超大包不立即分段，发出时交给卸载）
    pub gso_enabled: bool,
    /// 从本接口收到的 GSO 包所带的分段大小提示；`None` 时按 MTU 推导
    pub gso_size: Option<usize>,
    /// 单个缓冲的容量，分段时的硬上限
    pub buffer_capacity: usize,
    /// 本地地址，作为 PMTU 差错的源地址
    pub ip4: Option<Ipv4Addr>,
    pub ip6: Option<Ipv6Addr>,
}

impl Default for InterfaceDescriptor {
    fn default() -> Self {
        Self::new(DEFAULT_MTU)
    }
}

impl InterfaceDescriptor {
    pub fn new(mtu: usize) -> Self {
        Self {
            mtu,
            gso_enabled: false,
            gso_size: None,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            ip4: None,
            ip6: None,
        }
    }

    /// 开启 GSO，并指定分段大小提示
    pub fn with_gso(mut self, gso_size: usize) -> Self {
        self.gso_enabled = true;
        self.gso_size = Some(gso_size);
        self
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    pub fn with_ip4(mut self, addr: Ipv4Addr) -> Self {
        self.ip4 = Some(addr);
        self
    }

    pub fn with_ip6(mut self, addr: Ipv6Addr) -> Self {
        self.ip6 = Some(addr);
        self
    }

    /// 实际使用的分段大小提示。
    ///
    /// 未显式配置时取 IPv4/IPv6 两者中较小的 MSS：`mtu - 40 - 20`。
    pub fn effective_gso_size(&self) -> usize {
        self.gso_size
            .unwrap_or_else(|| self.mtu.saturating_sub(IPV6_HEADER_LEN + TCP_HEADER_LEN))
            .max(1)
    }

    pub fn local_addr(&self, version: IpVersion) -> Option<IpAddr> {
        match version {
            IpVersion::V4 => self.ip4.map(IpAddr::V4),
            IpVersion::V6 => self.ip6.map(IpAddr::V6),
        }
    }

    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.mtu == 0 {
            return Err(DescriptorError::ZeroMtu);
        }
        if self.gso_size == Some(0) {
            return Err(DescriptorError::ZeroGsoSize);
        }
        if self.buffer_capacity < MIN_ETHERNET_FRAME {
            return Err(DescriptorError::BufferTooSmall {
                capacity: self.buffer_capacity,
                min: MIN_ETHERNET_FRAME,
            });
        }
        Ok(())
    }
}
