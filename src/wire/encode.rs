//! 线上编码
//!
//! 把结构化的协议头按网络字节序写成字节。只在需要真实字节的地方使用：
//! ICMP 差错引用原始报文、首个分片携带 TCP 头。传输层校验和写 0（由卸载负责）。

use super::header::{Header, Icmpv4Message, Icmpv6Message, Ipv4Header};
use super::packet::Packet;
use super::stack::HeaderStack;

impl Header {
    /// 追加本头的线上字节
    pub fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            Header::Ethernet(eth) => {
                out.extend_from_slice(&eth.dst.octets());
                out.extend_from_slice(&eth.src.octets());
                out.extend_from_slice(&eth.ethertype.to_be_bytes());
            }
            Header::Ipv4(ip) => {
                let start = out.len();
                out.push(0x45);
                out.push(0);
                out.extend_from_slice(&ip.total_len.to_be_bytes());
                out.extend_from_slice(&ip.ident.to_be_bytes());
                out.extend_from_slice(&ipv4_flags_and_offset(ip).to_be_bytes());
                out.push(ip.ttl);
                out.push(ip.protocol);
                out.extend_from_slice(&[0, 0]);
                out.extend_from_slice(&ip.src.octets());
                out.extend_from_slice(&ip.dst.octets());
                let csum = ipv4_checksum(&out[start..]);
                out[start + 10..start + 12].copy_from_slice(&csum.to_be_bytes());
            }
            Header::Ipv6(ip) => {
                let word = (6u32 << 28)
                    | (u32::from(ip.traffic_class) << 20)
                    | (ip.flow_label & 0x000f_ffff);
                out.extend_from_slice(&word.to_be_bytes());
                out.extend_from_slice(&ip.payload_len.to_be_bytes());
                out.push(ip.next_header);
                out.push(ip.hop_limit);
                out.extend_from_slice(&ip.src.octets());
                out.extend_from_slice(&ip.dst.octets());
            }
            Header::Udp(udp) => {
                out.extend_from_slice(&udp.src_port.to_be_bytes());
                out.extend_from_slice(&udp.dst_port.to_be_bytes());
                out.extend_from_slice(&udp.len.to_be_bytes());
                out.extend_from_slice(&[0, 0]);
            }
            Header::Vxlan(vxlan) => {
                // flags: I 位置位，表示 VNI 有效
                out.extend_from_slice(&[0x08, 0, 0, 0]);
                out.extend_from_slice(&((vxlan.vni & 0x00ff_ffff) << 8).to_be_bytes());
            }
            Header::Tcp(tcp) => {
                out.extend_from_slice(&tcp.src_port.to_be_bytes());
                out.extend_from_slice(&tcp.dst_port.to_be_bytes());
                out.extend_from_slice(&tcp.seq.to_be_bytes());
                out.extend_from_slice(&tcp.ack.to_be_bytes());
                out.push(5 << 4);
                out.push(tcp.flags.0);
                out.extend_from_slice(&tcp.window.to_be_bytes());
                out.extend_from_slice(&[0, 0, 0, 0]);
            }
            Header::Icmpv4(msg) => {
                let (t, c) = msg.type_code();
                out.extend_from_slice(&[t, c, 0, 0]);
                match *msg {
                    Icmpv4Message::FragmentationNeeded { next_hop_mtu } => {
                        out.extend_from_slice(&[0, 0]);
                        out.extend_from_slice(&next_hop_mtu.to_be_bytes());
                    }
                    Icmpv4Message::Other { rest, .. } => out.extend_from_slice(&rest),
                }
            }
            Header::Icmpv6(msg) => {
                let (t, c) = msg.type_code();
                out.extend_from_slice(&[t, c, 0, 0]);
                match *msg {
                    Icmpv6Message::PacketTooBig { mtu } => {
                        out.extend_from_slice(&mtu.to_be_bytes())
                    }
                    Icmpv6Message::Other { rest, .. } => out.extend_from_slice(&rest),
                }
            }
        }
    }
}

fn ipv4_flags_and_offset(ip: &Ipv4Header) -> u16 {
    let mut v = ip.frag_offset & 0x1fff;
    if ip.dont_fragment {
        v |= 0x4000;
    }
    if ip.more_fragments {
        v |= 0x2000;
    }
    v
}

/// RFC 1071 反码和
fn ipv4_checksum(header: &[u8]) -> u16 {
    let mut sum: u32 = header
        .chunks(2)
        .map(|c| u32::from(u16::from_be_bytes([c[0], *c.get(1).unwrap_or(&0)])))
        .sum();
    while sum > 0xffff {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

impl HeaderStack {
    /// 从 `from`（含）开始编码到最内层
    pub fn write_from(&self, from: usize, out: &mut Vec<u8>) {
        for header in self.headers().iter().skip(from) {
            header.write_to(out);
        }
    }
}

impl Packet {
    /// 完整的线上字节
    pub fn to_bytes(&self) -> Vec<u8> {
        self.bytes_from(0, usize::MAX)
    }

    /// 从第 `layer` 层头开始的线上字节，最多 `limit` 字节
    pub fn bytes_from(&self, layer: usize, limit: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            (self.headers().len_from(layer) + self.payload_len()).min(limit),
        );
        self.headers().write_from(layer, &mut out);
        if out.len() >= limit {
            out.truncate(limit);
            return out;
        }
        let room = limit - out.len();
        let body = self.payload().as_bytes();
        out.extend_from_slice(&body[..body.len().min(room)]);
        out
    }
}
