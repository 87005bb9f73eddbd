//! 分段决策引擎模块
//!
//! 此模块包含 GSO 包表示、分段/分片决策、发射器、PMTU 差错应答和数据面入口。

// 子模块声明
mod dataplane;
mod decision;
mod emit;
mod pmtu;
mod repr;
mod stats;

// 重新导出公共接口
pub use dataplane::{Dataplane, EngineError, Outcome, Route};
pub use decision::{
    Decision, DecisionKind, OversizeViolation, SegmentReason, decide, decide_repr, effective_mtu,
    fragment_size, segment_size,
};
pub use emit::{
    Emission, FragmentDescriptor, FragmentIter, FragmentPlan, SegmentDescriptor, SegmentIter,
    SegmentPlan, emit, plan_fragments, plan_segments,
};
pub use pmtu::{ERROR_HOP_LIMIT, IPV4_ERROR_BUDGET, IPV6_MIN_MTU, PmtuError, PmtuResponder};
pub use repr::PacketRepr;
pub use stats::Stats;
