mod common;

use bifrost::dns::{
    DNSHeader, DNSQuestion, DNSResource, DNSResourceType, HEADER_LEN, decode_name, encode_name,
    rewrite_record,
};
use bifrost::error::DnsError;
use common::{MessageBuilder, wire_name};

#[test]
fn test_header_flags_decode() {
    let packet = MessageBuilder::response(0xABCD).flags(0x8583).build();
    let header = DNSHeader::parse(&packet).unwrap();
    assert_eq!(header.id, 0xABCD);
    assert!(header.qr);
    assert!(header.aa);
    assert!(header.rd);
    assert!(header.ra);
    assert!(!header.tc);
    assert_eq!(header.opcode, 0);
    assert_eq!(header.rcode, 3);

    let mut out = Vec::new();
    header.write_to(&mut out).unwrap();
    assert_eq!(out, packet);
}

#[test]
fn test_header_too_short() {
    assert_eq!(DNSHeader::parse(&[0; 11]), Err(DnsError::InvalidHeader));
}

#[test]
fn test_question_behind_pointer() {
    // second question reuses "example.com" from the first via a pointer
    let mut packet = MessageBuilder::query(1).question("www.example.com", 1).build();
    packet[5] = 2;
    packet.extend_from_slice(&[4, b'm', b'a', b'i', b'l', 0xC0, 16]);
    packet.extend_from_slice(&[0, 15, 0, 1]);

    let (first, cursor) = DNSQuestion::read(&packet, HEADER_LEN).unwrap();
    let (second, end) = DNSQuestion::read(&packet, cursor).unwrap();
    assert_eq!(first.name, "www.example.com");
    assert_eq!(second.name, "mail.example.com");
    assert_eq!(second.qtype, DNSResourceType::MX);
    assert_eq!(end, packet.len());
}

#[test]
fn test_forward_pointer_rejected() {
    let packet = [0xC0, 0x04, 0, 0, 3, b'c', b'o', b'm', 0];
    assert!(matches!(
        decode_name(&packet, 0, packet.len()),
        Err(DnsError::InvalidPointer { at: 0, target: 4 })
    ));
}

#[test]
fn test_self_pointer_rejected() {
    let packet = [3, b'f', b'o', b'o', 0xC0, 0x04];
    assert!(matches!(
        decode_name(&packet, 0, packet.len()),
        Err(DnsError::InvalidPointer { at: 4, target: 4 })
    ));
}

#[test]
fn test_truncated_label_rejected() {
    let packet = [5, b'a', b'b'];
    assert!(matches!(
        decode_name(&packet, 0, packet.len()),
        Err(DnsError::Truncated { .. })
    ));
}

#[test]
fn test_encode_rejects_oversized_names() {
    let mut out = vec![0xAA];
    assert_eq!(
        encode_name(&mut out, &format!("{}.com", "a".repeat(64))),
        Err(DnsError::LabelTooLong(64))
    );
    let long = vec!["abcdefghij"; 25].join(".");
    assert_eq!(encode_name(&mut out, &long), Err(DnsError::NameTooLong));
    // failed encodes leave earlier output alone
    assert_eq!(out, vec![0xAA]);
}

#[test]
fn test_record_read_and_opaque_rewrite() {
    let txt = [11, b'h', b'e', b'l', b'l', b'o', b' ', b'w', b'o', b'r', b'l', b'd'];
    let packet = MessageBuilder::response(1)
        .question("t.example", 16)
        .answer("t.example", 16, 3600, &txt)
        .build();
    let (_, cursor) = DNSQuestion::read(&packet, HEADER_LEN).unwrap();
    let (record, end) = DNSResource::read(&packet, cursor).unwrap();
    assert_eq!(end, packet.len());
    assert_eq!(record.rtype, DNSResourceType::TXT);
    assert_eq!(record.ttl, 3600);
    assert_eq!(record.rdata(&packet), &txt);

    let mut out = Vec::new();
    let rewrite = rewrite_record(record.rtype, &mut out, &packet, record.rdata.clone(), None).unwrap();
    assert_eq!(rewrite.description, "12 bytes");
    assert_eq!(&out[..2], &[0, 12]);
    assert_eq!(&out[2..], &txt);
}

#[test]
fn test_mx_rdata_is_opaque() {
    let mut mx = vec![0, 10];
    mx.extend_from_slice(&wire_name("mail.example"));
    let packet = MessageBuilder::response(1)
        .question("example", 15)
        .answer("example", 15, 60, &mx)
        .build();
    let (_, cursor) = DNSQuestion::read(&packet, HEADER_LEN).unwrap();
    let (record, _) = DNSResource::read(&packet, cursor).unwrap();

    let mut out = Vec::new();
    rewrite_record(record.rtype, &mut out, &packet, record.rdata.clone(), Some(".n.yiz.me")).unwrap();
    assert_eq!(&out[2..], mx.as_slice());
}

#[test]
fn test_record_rdata_past_end_rejected() {
    let mut packet = MessageBuilder::response(1)
        .question("x", 1)
        .a("x", [1, 2, 3, 4].into(), 60)
        .build();
    packet.truncate(packet.len() - 2);
    let (_, cursor) = DNSQuestion::read(&packet, HEADER_LEN).unwrap();
    assert!(matches!(
        DNSResource::read(&packet, cursor),
        Err(DnsError::Truncated { .. })
    ));
}

#[test]
fn test_unknown_type_display() {
    assert_eq!(DNSResourceType::from(65).to_string(), "TYPE65");
    assert_eq!(DNSResourceType::AAAA.to_string(), "AAAA");
    assert_eq!(u16::from(DNSResourceType::from(4660)), 4660);
}
