//! 统计信息
//!
//! 按决策种类累计的包数与字节数。

use serde::Serialize;

use super::dataplane::Outcome;
use super::decision::Decision;

/// 数据面统计信息
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub forwarded_pkts: u64,
    pub passed_through_pkts: u64,
    pub segmented_pkts: u64,
    pub segments_out: u64,
    pub fragmented_pkts: u64,
    pub fragments_out: u64,
    pub pmtu_errors: u64,
    /// 发出的线上字节（含以太网头与隧道封装）
    pub bytes_out: u64,
}

impl Stats {
    pub fn record(&mut self, outcome: &Outcome) {
        let out = outcome.packets().len() as u64;
        match outcome.decision() {
            Decision::Forward { .. } => self.forwarded_pkts += 1,
            Decision::PassThrough { .. } => self.passed_through_pkts += 1,
            Decision::SegmentNow { .. } => {
                self.segmented_pkts += 1;
                self.segments_out += out;
            }
            Decision::Fragment { .. } => {
                self.fragmented_pkts += 1;
                self.fragments_out += out;
            }
            Decision::Reject(_) => self.pmtu_errors += 1,
        }
        self.bytes_out += outcome
            .packets()
            .iter()
            .map(|p| p.wire_len() as u64)
            .sum::<u64>();
    }
}
