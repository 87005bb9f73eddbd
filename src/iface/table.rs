//! 接口配置表
//!
//! 配置以不可变快照的形式发布：读者克隆一个 `Arc` 拿到完整的一代配置，
//! 写者复制整张表、修改、校验后整体替换。决策过程只看快照，
//! 不会读到“新 MTU + 旧 GSO 标志”这样的混合状态。

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;
use tracing::{debug, info};

use super::descriptor::{DescriptorError, InterfaceDescriptor};
use super::id::IfIndex;

/// 带外配置命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// 新增或整体替换一个接口
    Upsert {
        ifindex: IfIndex,
        descriptor: InterfaceDescriptor,
    },
    Remove {
        ifindex: IfIndex,
    },
    SetMtu {
        ifindex: IfIndex,
        mtu: usize,
    },
    /// 开关 GSO；`gso_size` 为 `None` 时保留原有提示
    SetGso {
        ifindex: IfIndex,
        enabled: bool,
        gso_size: Option<usize>,
    },
    SetBufferCapacity {
        ifindex: IfIndex,
        capacity: usize,
    },
}

impl ConfigCommand {
    pub fn ifindex(&self) -> IfIndex {
        match *self {
            ConfigCommand::Upsert { ifindex, .. }
            | ConfigCommand::Remove { ifindex }
            | ConfigCommand::SetMtu { ifindex, .. }
            | ConfigCommand::SetGso { ifindex, .. }
            | ConfigCommand::SetBufferCapacity { ifindex, .. } => ifindex,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown interface {0}")]
    UnknownInterface(IfIndex),
    #[error("invalid configuration for {ifindex}: {source}")]
    Invalid {
        ifindex: IfIndex,
        #[source]
        source: DescriptorError,
    },
}

/// 某一代接口配置的只读视图
#[derive(Debug, Clone, Default)]
pub struct TableSnapshot {
    entries: Arc<HashMap<IfIndex, InterfaceDescriptor>>,
    generation: u64,
}

impl TableSnapshot {
    /// 返回描述符的副本
    pub fn get(&self, ifindex: IfIndex) -> Option<InterfaceDescriptor> {
        self.entries.get(&ifindex).copied()
    }

    /// 每次成功的配置变更加一
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (IfIndex, InterfaceDescriptor)> + '_ {
        self.entries.iter().map(|(k, v)| (*k, *v))
    }
}

/// 接口配置表
#[derive(Debug, Default)]
pub struct InterfaceTable {
    current: RwLock<TableSnapshot>,
}

impl InterfaceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取当前一代配置（只在克隆 `Arc` 时持锁）
    pub fn snapshot(&self) -> TableSnapshot {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 应用一条配置命令，返回新一代快照。校验失败时表保持不变。
    #[tracing::instrument(skip(self), fields(ifindex = %cmd.ifindex()))]
    pub fn apply(&self, cmd: ConfigCommand) -> Result<TableSnapshot, ConfigError> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut entries: HashMap<IfIndex, InterfaceDescriptor> = (*current.entries).clone();

        let ifindex = cmd.ifindex();
        match cmd {
            ConfigCommand::Upsert { descriptor, .. } => {
                entries.insert(ifindex, descriptor);
            }
            ConfigCommand::Remove { .. } => {
                entries
                    .remove(&ifindex)
                    .ok_or(ConfigError::UnknownInterface(ifindex))?;
            }
            ConfigCommand::SetMtu { mtu, .. } => {
                lookup(&mut entries, ifindex)?.mtu = mtu;
            }
            ConfigCommand::SetGso {
                enabled, gso_size, ..
            } => {
                let d = lookup(&mut entries, ifindex)?;
                d.gso_enabled = enabled;
                if gso_size.is_some() {
                    d.gso_size = gso_size;
                }
            }
            ConfigCommand::SetBufferCapacity { capacity, .. } => {
                lookup(&mut entries, ifindex)?.buffer_capacity = capacity;
            }
        }

        if let Some(d) = entries.get(&ifindex) {
            d.validate()
                .map_err(|source| ConfigError::Invalid { ifindex, source })?;
            debug!(?d, "接口描述符已更新");
        }

        let next = TableSnapshot {
            entries: Arc::new(entries),
            generation: current.generation.wrapping_add(1),
        };
        *current = next.clone();
        info!(generation = next.generation, "📝 发布新一代接口配置");
        Ok(next)
    }
}

fn lookup(
    entries: &mut HashMap<IfIndex, InterfaceDescriptor>,
    ifindex: IfIndex,
) -> Result<&mut InterfaceDescriptor, ConfigError> {
    entries
        .get_mut(&ifindex)
        .ok_or(ConfigError::UnknownInterface(ifindex))
}
