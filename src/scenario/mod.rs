//! 场景模块
//!
//! 此模块包含场景 JSON 格式、内置场景以及把场景重放到数据面上的运行器。

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::engine::EngineError;
use crate::iface::TunnelError;
use crate::wire::PacketError;

// 子模块声明
mod builtin;
mod runner;
mod spec;

// 重新导出公共接口
pub use builtin::{FUNCTIONAL_JSON, functional};
pub use runner::{ScenarioReport, ScenarioRunner, SendReport};
pub use spec::{
    InterfaceSpec, PacketSpec, RouteSpec, SCHEMA_VERSION, ScenarioMeta, ScenarioSpec, StepSpec,
    TunnelSpec,
};

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid scenario json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported schema_version {0}")]
    UnsupportedSchema(u32),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("invalid packet: {0}")]
    Packet(#[from] PacketError),
    #[error("invalid tunnel: {0}")]
    Tunnel(#[from] TunnelError),
}
