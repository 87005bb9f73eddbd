//! 接口模块
//!
//! 此模块包含接口描述符、配置快照表和 VXLAN 隧道开销适配。

// 子模块声明
mod descriptor;
mod id;
mod table;
mod tunnel;

// 重新导出公共接口
pub use descriptor::{DEFAULT_BUFFER_CAPACITY, DEFAULT_MTU, DescriptorError, InterfaceDescriptor};
pub use id::{IfIndex, TunnelId};
pub use table::{ConfigCommand, ConfigError, InterfaceTable, TableSnapshot};
pub use tunnel::{TunnelDescriptor, TunnelError, adjust_chain};
