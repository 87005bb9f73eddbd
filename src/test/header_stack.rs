use crate::wire::{
    ETHERTYPE_IPV4, ETHERTYPE_IPV6, EthernetHeader, Header, HeaderStack, IPPROTO_TCP, IPPROTO_UDP,
    Ipv4Header, Ipv6Header, Layer, MacAddr, Packet, Payload, StackError, TcpHeader,
    TcpPacketBuilder, UdpHeader, VXLAN_UDP_PORT, VxlanHeader,
};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

fn eth(ethertype: u16) -> Header {
    Header::Ethernet(EthernetHeader {
        dst: MacAddr::local(2),
        src: MacAddr::local(1),
        ethertype,
    })
}

fn v4(protocol: u8) -> Header {
    Header::Ipv4(Ipv4Header::new(
        Ipv4Addr::new(10, 0, 0, 1),
        Ipv4Addr::new(10, 0, 0, 2),
        protocol,
    ))
}

fn v6(next_header: u8) -> Header {
    Header::Ipv6(Ipv6Header::new(
        Ipv6Addr::new(0xfd01, 0, 0, 0, 0, 0, 0, 1),
        Ipv6Addr::new(0xfd01, 0, 0, 0, 0, 0, 0, 2),
        next_header,
    ))
}

fn tcp() -> Header {
    Header::Tcp(TcpHeader::new(1234, 80))
}

fn udp() -> Header {
    Header::Udp(UdpHeader {
        src_port: 4789,
        dst_port: VXLAN_UDP_PORT,
        len: 0,
    })
}

fn vxlan() -> Header {
    Header::Vxlan(VxlanHeader { vni: 10 })
}

#[test]
fn overhead_is_cumulative_and_inclusive() {
    let stack = HeaderStack::new(vec![eth(ETHERTYPE_IPV4), v4(IPPROTO_TCP), tcp()])
        .expect("valid stack");
    assert_eq!(stack.overhead(0), 14);
    assert_eq!(stack.overhead(1), 34);
    assert_eq!(stack.overhead(2), 54);
    // past the innermost header: whole stack
    assert_eq!(stack.overhead(10), 54);
    assert_eq!(stack.total_len(), 54);
    assert_eq!(stack.len_from(1), 40);
}

#[test]
fn vxlan_stack_locates_inner_and_outer_ip() {
    let stack = HeaderStack::new(vec![
        eth(ETHERTYPE_IPV4),
        v4(IPPROTO_UDP),
        udp(),
        vxlan(),
        eth(ETHERTYPE_IPV6),
        v6(IPPROTO_TCP),
        tcp(),
    ])
    .expect("vxlan stack");
    assert_eq!(stack.depth(), 7);
    assert_eq!(stack.outermost_ip(), Some(1));
    assert_eq!(stack.innermost_ip(), Some(5));
    assert_eq!(stack.tcp_index(), Some(6));
    assert_eq!(stack.innermost(Layer::Ethernet), Some(4));
    // outer Ethernet + IPv4 + UDP + VXLAN
    assert_eq!(stack.overhead(3), 50);
    assert_eq!(stack.total_len(), 50 + 14 + 40 + 20);
}

#[test]
fn header_stack_rejects_invalid_nesting() {
    assert_eq!(HeaderStack::new(vec![]), Err(StackError::Empty));
    assert_eq!(
        HeaderStack::new(vec![v4(IPPROTO_TCP), tcp()]),
        Err(StackError::NotEthernet(Layer::Ipv4))
    );
    assert_eq!(
        HeaderStack::new(vec![eth(ETHERTYPE_IPV4), tcp()]),
        Err(StackError::BadNesting {
            index: 1,
            layer: Layer::Tcp,
            after: Layer::Ethernet,
        })
    );
    assert_eq!(
        HeaderStack::new(vec![eth(ETHERTYPE_IPV4), v4(IPPROTO_UDP), udp(), vxlan()]),
        Err(StackError::Truncated(Layer::Vxlan))
    );
    // IP fragments end on the IP header
    assert!(HeaderStack::new(vec![eth(ETHERTYPE_IPV4), v4(IPPROTO_TCP)]).is_ok());
}

#[test]
fn packet_new_recomputes_nested_length_fields() {
    let stack = HeaderStack::new(vec![
        eth(ETHERTYPE_IPV4),
        v4(IPPROTO_UDP),
        udp(),
        vxlan(),
        eth(ETHERTYPE_IPV4),
        v4(IPPROTO_TCP),
        tcp(),
    ])
    .expect("vxlan stack");
    let packet = Packet::new(stack, Payload::filled(0xa5, 100));

    assert_eq!(packet.ipv4().expect("inner ipv4").total_len, 140);
    match packet.headers().get(2) {
        Some(Header::Udp(udp)) => assert_eq!(udp.len, 170),
        other => panic!("expected udp, got {other:?}"),
    }
    assert_eq!(packet.headers().ipv4_at(1).expect("outer ipv4").total_len, 190);
    assert_eq!(packet.wire_len(), 204);
    assert_eq!(packet.l3_len(), 140);
}

#[test]
fn length_fields_saturate_at_16_bits() {
    let packet = TcpPacketBuilder::new(
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
        1234,
        80,
    )
    .expect("builder")
    .build(Payload::filled(0, 70_000))
    .expect("packet");
    assert_eq!(packet.ipv4().expect("ipv4").total_len, u16::MAX);
    assert_eq!(packet.payload_len(), 70_000);
    assert_eq!(packet.l3_len(), 70_040);
}

#[test]
fn builder_rejects_mixed_address_families() {
    let err = TcpPacketBuilder::new(
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
        IpAddr::V6(Ipv6Addr::LOCALHOST),
        1,
        2,
    )
    .expect_err("mixed families");
    assert!(matches!(
        err,
        crate::wire::PacketError::AddressFamilyMismatch { .. }
    ));
}

#[test]
fn ipv4_header_encodes_with_valid_checksum() {
    let packet = TcpPacketBuilder::new(
        IpAddr::V4(Ipv4Addr::new(172, 16, 3, 2)),
        IpAddr::V4(Ipv4Addr::new(172, 16, 1, 2)),
        1234,
        1234,
    )
    .expect("builder")
    .dont_fragment(true)
    .ident(7)
    .build(Payload::filled(0xa5, 10))
    .expect("packet");

    let bytes = packet.to_bytes();
    assert_eq!(bytes.len(), packet.wire_len());
    assert_eq!(u16::from_be_bytes([bytes[12], bytes[13]]), ETHERTYPE_IPV4);

    let ip = &bytes[14..34];
    assert_eq!(ip[0], 0x45);
    assert_eq!(u16::from_be_bytes([ip[2], ip[3]]), 50);
    assert_eq!(u16::from_be_bytes([ip[4], ip[5]]), 7);
    assert_eq!(ip[6] & 0x40, 0x40, "DF bit");
    assert_eq!(ip[9], IPPROTO_TCP);

    let mut sum: u32 = ip
        .chunks(2)
        .map(|c| u32::from(u16::from_be_bytes([c[0], c[1]])))
        .sum();
    while sum > 0xffff {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    assert_eq!(sum, 0xffff);

    // TCP ports then payload
    assert_eq!(u16::from_be_bytes([bytes[34], bytes[35]]), 1234);
    assert_eq!(&bytes[54..], &[0xa5; 10]);
}

#[test]
fn bytes_from_truncates_to_limit() {
    let packet = TcpPacketBuilder::new(
        IpAddr::V6(Ipv6Addr::new(0xfd01, 0, 0, 0, 0, 0, 0, 1)),
        IpAddr::V6(Ipv6Addr::new(0xfd01, 0, 0, 0, 0, 0, 0, 2)),
        1234,
        1234,
    )
    .expect("builder")
    .build(Payload::filled(0xa5, 2000))
    .expect("packet");

    let quote = packet.bytes_from(1, 100);
    assert_eq!(quote.len(), 100);
    assert_eq!(quote[0] >> 4, 6);
    assert_eq!(u16::from_be_bytes([quote[4], quote[5]]), 2020);

    let all = packet.bytes_from(1, usize::MAX);
    assert_eq!(all.len(), packet.l3_len());
}

#[test]
fn mac_addr_parses_and_displays() {
    let mac: MacAddr = "02:fe:00:00:01:02".parse().expect("parse mac");
    assert_eq!(mac.octets(), [0x02, 0xfe, 0, 0, 1, 2]);
    assert_eq!(mac.to_string(), "02:fe:00:00:01:02");
    assert!("02:fe:00".parse::<MacAddr>().is_err());
    assert!("02:fe:00:00:01:02:03".parse::<MacAddr>().is_err());
    assert!("zz:fe:00:00:01:02".parse::<MacAddr>().is_err());
}

#[test]
fn payload_slices_share_the_buffer() {
    let payload = Payload::new((0u8..100).collect());
    let slice = payload.slice(10..20);
    assert_eq!(slice.len(), 10);
    assert_eq!(slice.as_bytes()[0], 10);
    assert!(slice.shares_buffer(&payload));

    // out-of-range ends are clamped
    assert_eq!(payload.slice(90..200).len(), 10);
    assert!(payload.slice(150..200).is_empty());
    // nested slices are relative to the parent range
    assert_eq!(slice.slice(5..8).as_bytes(), &[15, 16, 17]);
}
