//! 负载缓冲
//!
//! 负载以 `Arc<[u8]>` 共享，切片只记录区间，分段/分片时不复制数据。

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// 共享字节缓冲上的一个只读区间
#[derive(Clone)]
pub struct Payload {
    data: Arc<[u8]>,
    range: Range<usize>,
}

impl Payload {
    pub fn new(data: Vec<u8>) -> Self {
        let len = data.len();
        Self {
            data: data.into(),
            range: 0..len,
        }
    }

    /// `len` 个相同字节（测试里常用的 0xa5 填充）
    pub fn filled(byte: u8, len: usize) -> Self {
        Self::new(vec![byte; len])
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[self.range.clone()]
    }

    /// 相对当前区间取子区间，越界部分被截掉。
    pub fn slice(&self, range: Range<usize>) -> Payload {
        let start = (self.range.start + range.start).min(self.range.end);
        let end = (self.range.start + range.end).clamp(start, self.range.end);
        Payload {
            data: Arc::clone(&self.data),
            range: start..end,
        }
    }

    /// 两个负载是否共享同一底层缓冲
    pub fn shares_buffer(&self, other: &Payload) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for Payload {}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("len", &self.len())
            .field("range", &self.range)
            .finish()
    }
}
