//! 内置场景

use super::ScenarioError;
use super::spec::ScenarioSpec;

/// 五个接口（两个普通、三个 GSO）加 IPv4、IPv6 外层各一条 VXLAN 隧道的功能场景：
/// 端到端透传、软件分段、576 字节 MTU 下的分片、PMTU 差错，以及四种 VXLAN 嵌套组合。
pub const FUNCTIONAL_JSON: &str = include_str!("../../scenarios/functional.json");

pub fn functional() -> Result<ScenarioSpec, ScenarioError> {
    ScenarioSpec::from_json_str(FUNCTIONAL_JSON)
}
