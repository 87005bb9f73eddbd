//! 协议头栈
//!
//! `HeaderStack` 按真实封装嵌套顺序（最外层在前）保存协议头，
//! 并提供累计开销计算与长度字段重算。

use thiserror::Error;

use super::header::{
    Header, IPV4_HEADER_LEN, Ipv4Header, Ipv6Header, Layer, TcpHeader, UDP_HEADER_LEN,
};

/// 头栈不符合封装嵌套规则
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StackError {
    #[error("header stack is empty")]
    Empty,
    #[error("outermost header must be Ethernet, found {0:?}")]
    NotEthernet(Layer),
    #[error("{layer:?} at index {index} cannot follow {after:?}")]
    BadNesting {
        index: usize,
        layer: Layer,
        after: Layer,
    },
    #[error("header stack cannot end with {0:?}")]
    Truncated(Layer),
}

/// 按封装顺序排列的协议头
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderStack {
    headers: Vec<Header>,
}

impl HeaderStack {
    /// 校验嵌套顺序后构造头栈
    pub fn new(headers: Vec<Header>) -> Result<Self, StackError> {
        let first = headers.first().ok_or(StackError::Empty)?;
        if first.layer() != Layer::Ethernet {
            return Err(StackError::NotEthernet(first.layer()));
        }
        for (index, pair) in headers.windows(2).enumerate() {
            let after = pair[0].layer();
            let layer = pair[1].layer();
            if !may_follow(after, layer) {
                return Err(StackError::BadNesting {
                    index: index + 1,
                    layer,
                    after,
                });
            }
        }
        if let Some(last) = headers.last() {
            // 以 IP 结尾是合法的：分片后 TCP 头作为负载的一部分。
            if matches!(last.layer(), Layer::Ethernet | Layer::Vxlan) {
                return Err(StackError::Truncated(last.layer()));
            }
        }
        Ok(Self { headers })
    }

    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    pub fn get(&self, index: usize) -> Option<&Header> {
        self.headers.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Header> {
        self.headers.get_mut(index)
    }

    pub fn depth(&self) -> usize {
        self.headers.len()
    }

    /// 从最外层到 `up_to`（含）的累计头部字节数；`up_to` 越界时返回整栈长度。
    pub fn overhead(&self, up_to: usize) -> usize {
        self.headers
            .iter()
            .take(up_to.saturating_add(1))
            .map(Header::wire_len)
            .sum()
    }

    /// 整个头栈的字节数
    pub fn total_len(&self) -> usize {
        self.overhead(usize::MAX)
    }

    /// 从 `from`（含）到最内层的头部字节数
    pub fn len_from(&self, from: usize) -> usize {
        self.headers.iter().skip(from).map(Header::wire_len).sum()
    }

    /// 最内层的某类协议头位置
    pub fn innermost(&self, layer: Layer) -> Option<usize> {
        self.headers.iter().rposition(|h| h.layer() == layer)
    }

    /// 最内层 IP 头（承载传输层的那一个）
    pub fn innermost_ip(&self) -> Option<usize> {
        self.headers.iter().rposition(|h| h.layer().is_ip())
    }

    pub fn outermost_ip(&self) -> Option<usize> {
        self.headers.iter().position(|h| h.layer().is_ip())
    }

    pub fn tcp_index(&self) -> Option<usize> {
        self.innermost(Layer::Tcp)
    }

    pub fn tcp(&self) -> Option<&TcpHeader> {
        match self.headers.get(self.tcp_index()?) {
            Some(Header::Tcp(tcp)) => Some(tcp),
            _ => None,
        }
    }

    pub fn tcp_mut(&mut self) -> Option<&mut TcpHeader> {
        let idx = self.tcp_index()?;
        match self.headers.get_mut(idx) {
            Some(Header::Tcp(tcp)) => Some(tcp),
            _ => None,
        }
    }

    pub fn ipv4_at(&self, index: usize) -> Option<&Ipv4Header> {
        match self.headers.get(index) {
            Some(Header::Ipv4(ip)) => Some(ip),
            _ => None,
        }
    }

    pub fn ipv6_at(&self, index: usize) -> Option<&Ipv6Header> {
        match self.headers.get(index) {
            Some(Header::Ipv6(ip)) => Some(ip),
            _ => None,
        }
    }

    /// 在最外层前插入封装头（隧道封装）。调用者负责保证嵌套合法。
    pub(crate) fn prepend(&mut self, outer: impl IntoIterator<Item = Header>) {
        let mut headers: Vec<Header> = outer.into_iter().collect();
        headers.append(&mut self.headers);
        self.headers = headers;
    }

    /// 截断到 `[0, end)`，用于构造分片模板
    pub(crate) fn truncated(&self, end: usize) -> HeaderStack {
        HeaderStack {
            headers: self.headers[..end.min(self.headers.len())].to_vec(),
        }
    }

    /// 根据负载长度重算每一层的长度字段（IPv4 total length、IPv6 payload length、UDP length）。
    ///
    /// 超过 16 位的长度按 `u16::MAX` 饱和。
    pub fn recompute_lengths(&mut self, payload_len: usize) {
        let mut inner = payload_len;
        for header in self.headers.iter_mut().rev() {
            match header {
                Header::Ipv4(ip) => ip.total_len = len_field(inner + IPV4_HEADER_LEN),
                Header::Ipv6(ip) => ip.payload_len = len_field(inner),
                Header::Udp(udp) => udp.len = len_field(inner + UDP_HEADER_LEN),
                _ => {}
            }
            inner += header.wire_len();
        }
    }
}

fn len_field(n: usize) -> u16 {
    u16::try_from(n).unwrap_or(u16::MAX)
}

fn may_follow(after: Layer, layer: Layer) -> bool {
    match after {
        Layer::Ethernet => layer.is_ip(),
        Layer::Ipv4 => matches!(layer, Layer::Tcp | Layer::Udp | Layer::Icmpv4),
        Layer::Ipv6 => matches!(layer, Layer::Tcp | Layer::Udp | Layer::Icmpv6),
        Layer::Udp => layer == Layer::Vxlan,
        Layer::Vxlan => layer == Layer::Ethernet,
        Layer::Tcp | Layer::Icmpv4 | Layer::Icmpv6 => false,
    }
}
