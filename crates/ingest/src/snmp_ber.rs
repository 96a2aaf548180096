//! A minimal BER/DER decoder covering exactly the SNMPv1/v2c trap PDU
//! shapes needed by [`crate::trap`] (RFC 1157 §4.1.6, RFC 3416 §4).
//!
//! This is not a general ASN.1 library: it decodes the fixed `Message ::=
//! SEQUENCE { version, community, data }` envelope and the two trap PDU
//! tags (`[4] IMPLICIT Trap-PDU` for v1, `[7] IMPLICIT PDU` for v2c's
//! SNMPv2-Trap-PDU), rejecting anything else as malformed.

const TAG_INTEGER: u8 = 0x02;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_NULL: u8 = 0x05;
const TAG_OID: u8 = 0x06;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_IP_ADDRESS: u8 = 0x40;
const TAG_V1_TRAP_PDU: u8 = 0xA4;
const TAG_V2_TRAP_PDU: u8 = 0xA7;
const TAG_GET_REQUEST_PDU: u8 = 0xA0;
const TAG_GET_RESPONSE_PDU: u8 = 0xA2;

#[derive(Debug, Clone, PartialEq)]
pub enum SnmpValue {
    Integer(i64),
    OctetString(String),
    Oid(String),
    IpAddress(String),
    Null,
    Other(String),
}

impl SnmpValue {
    #[must_use]
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Integer(n) => n.to_string(),
            Self::OctetString(s) | Self::Oid(s) | Self::IpAddress(s) | Self::Other(s) => s.clone(),
            Self::Null => String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DecodedTrap {
    pub version: u8,
    pub trap_oid: String,
    pub enterprise_oid: String,
    pub varbinds: Vec<(String, SnmpValue)>,
}

struct Tlv<'a> {
    tag: u8,
    value: &'a [u8],
}

fn read_tlv(input: &[u8]) -> Option<(Tlv<'_>, &[u8])> {
    let (&tag, rest) = input.split_first()?;
    let (&len_byte, rest) = rest.split_first()?;

    let (length, rest) = if len_byte & 0x80 == 0 {
        (len_byte as usize, rest)
    } else {
        let num_len_bytes = (len_byte & 0x7F) as usize;
        if num_len_bytes == 0 || num_len_bytes > 4 || rest.len() < num_len_bytes {
            return None;
        }
        let (len_bytes, rest) = rest.split_at(num_len_bytes);
        let length = len_bytes.iter().fold(0usize, |acc, &b| (acc << 8) | b as usize);
        (length, rest)
    };

    if rest.len() < length {
        return None;
    }
    let (value, rest) = rest.split_at(length);
    Some((Tlv { tag, value }, rest))
}

fn decode_integer(bytes: &[u8]) -> Option<i64> {
    if bytes.is_empty() {
        return None;
    }
    let mut value: i64 = if bytes[0] & 0x80 != 0 { -1 } else { 0 };
    for &b in bytes {
        value = (value << 8) | i64::from(b);
    }
    Some(value)
}

fn decode_oid(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    let first = bytes[0];
    let mut parts = vec![(first / 40) as u64, (first % 40) as u64];

    let mut value: u64 = 0;
    for &b in &bytes[1..] {
        value = (value << 7) | u64::from(b & 0x7F);
        if b & 0x80 == 0 {
            parts.push(value);
            value = 0;
        }
    }

    Some(parts.iter().map(ToString::to_string).collect::<Vec<_>>().join("."))
}

fn decode_value(tlv: &Tlv<'_>) -> SnmpValue {
    match tlv.tag {
        TAG_INTEGER => decode_integer(tlv.value).map_or(SnmpValue::Null, SnmpValue::Integer),
        TAG_OCTET_STRING => SnmpValue::OctetString(String::from_utf8_lossy(tlv.value).into_owned()),
        TAG_OID => decode_oid(tlv.value).map_or(SnmpValue::Null, SnmpValue::Oid),
        TAG_IP_ADDRESS if tlv.value.len() == 4 => {
            SnmpValue::IpAddress(tlv.value.iter().map(ToString::to_string).collect::<Vec<_>>().join("."))
        }
        TAG_NULL => SnmpValue::Null,
        _ => SnmpValue::Other(format!("0x{}", hex_encode(tlv.value))),
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn decode_varbind_list(bytes: &[u8]) -> Vec<(String, SnmpValue)> {
    let mut result = Vec::new();
    let Some((seq, _)) = read_tlv(bytes) else { return result };
    if seq.tag != TAG_SEQUENCE {
        return result;
    }

    let mut rest = seq.value;
    while let Some((pair, next)) = read_tlv(rest) {
        rest = next;
        if pair.tag != TAG_SEQUENCE {
            continue;
        }
        let Some((oid_tlv, value_rest)) = read_tlv(pair.value) else { continue };
        let Some((value_tlv, _)) = read_tlv(value_rest) else { continue };
        if oid_tlv.tag != TAG_OID {
            continue;
        }
        let Some(oid) = decode_oid(oid_tlv.value) else { continue };
        result.push((oid, decode_value(&value_tlv)));
    }
    result
}

/// Decode a raw UDP datagram into a [`DecodedTrap`]. Returns `None` for
/// anything that does not parse as a well-formed SNMPv1/v2c trap message
/// (§4.5 "Reject malformed datagrams").
#[must_use]
pub fn decode_trap(data: &[u8]) -> Option<DecodedTrap> {
    let (message, _) = read_tlv(data)?;
    if message.tag != TAG_SEQUENCE {
        return None;
    }

    let (version_tlv, rest) = read_tlv(message.value)?;
    if version_tlv.tag != TAG_INTEGER {
        return None;
    }
    let version = decode_integer(version_tlv.value)? as u8;

    let (_community, rest) = read_tlv(rest)?;
    let (pdu, _) = read_tlv(rest)?;

    match pdu.tag {
        TAG_V1_TRAP_PDU => decode_v1_trap(pdu.value),
        TAG_V2_TRAP_PDU => decode_v2_trap(pdu.value, version),
        _ => None,
    }
}

/// `Trap-PDU ::= SEQUENCE { enterprise, agent-addr, generic-trap,
/// specific-trap, time-stamp, variable-bindings }` (RFC 1157 §4.1.6).
fn decode_v1_trap(bytes: &[u8]) -> Option<DecodedTrap> {
    let (enterprise_tlv, rest) = read_tlv(bytes)?;
    let enterprise_oid = decode_oid(enterprise_tlv.value)?;

    let (_agent_addr, rest) = read_tlv(rest)?;
    let (generic_tlv, rest) = read_tlv(rest)?;
    let generic_trap = decode_integer(generic_tlv.value)?;
    let (specific_tlv, rest) = read_tlv(rest)?;
    let specific_trap = decode_integer(specific_tlv.value)?;
    let (_timestamp, rest) = read_tlv(rest)?;

    let trap_oid = if generic_trap == 6 {
        format!("{enterprise_oid}.0.{specific_trap}")
    } else {
        format!("1.3.6.1.6.3.1.1.5.{}", generic_trap + 1)
    };

    let varbinds = decode_varbind_list(rest);

    Some(DecodedTrap { version: 0, trap_oid, enterprise_oid, varbinds })
}

/// `SNMPv2-Trap-PDU ::= [7] IMPLICIT PDU` where `PDU ::= SEQUENCE {
/// request-id, error-status, error-index, variable-bindings }` and the
/// trap OID is carried as the value of the `snmpTrapOID.0` varbind
/// (RFC 3416 §4).
fn decode_v2_trap(bytes: &[u8], version: u8) -> Option<DecodedTrap> {
    let (_request_id, rest) = read_tlv(bytes)?;
    let (_error_status, rest) = read_tlv(rest)?;
    let (_error_index, rest) = read_tlv(rest)?;

    let varbinds = decode_varbind_list(rest);
    let trap_oid = varbinds
        .iter()
        .find(|(oid, _)| oid == "1.3.6.1.6.3.1.1.4.1.0")
        .map(|(_, value)| value.to_display_string())?;

    let enterprise_oid = trap_oid.rsplit_once('.').map_or_else(String::new, |(prefix, _)| {
        prefix.rsplit_once('.').map_or_else(|| prefix.to_string(), |(stripped, _)| stripped.to_string())
    });

    Some(DecodedTrap { version, trap_oid, enterprise_oid, varbinds })
}

fn encode_len(len: usize) -> Vec<u8> {
    if len < 0x80 {
        vec![len as u8]
    } else {
        let bytes = len.to_be_bytes();
        let significant: Vec<u8> = bytes.iter().copied().skip_while(|&b| b == 0).collect();
        let mut out = vec![0x80 | significant.len() as u8];
        out.extend(significant);
        out
    }
}

fn tlv(tag: u8, value: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    out.extend(encode_len(value.len()));
    out.extend_from_slice(value);
    out
}

fn encode_oid(parts: &[u64]) -> Vec<u8> {
    let mut bytes = vec![(parts[0] * 40 + parts[1]) as u8];
    for &part in &parts[2..] {
        if part < 0x80 {
            bytes.push(part as u8);
        } else {
            let mut chunks = Vec::new();
            let mut value = part;
            chunks.push((value & 0x7F) as u8);
            value >>= 7;
            while value > 0 {
                chunks.push((value & 0x7F) as u8 | 0x80);
                value >>= 7;
            }
            chunks.reverse();
            bytes.extend(chunks);
        }
    }
    bytes
}

fn encode_oid_dotted(oid: &str) -> Option<Vec<u8>> {
    let parts: Vec<u64> = oid.split('.').map(str::parse).collect::<Result<_, _>>().ok()?;
    if parts.len() < 2 {
        return None;
    }
    Some(encode_oid(&parts))
}

fn encode_integer(value: i32) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut significant: Vec<u8> = bytes.iter().copied().skip_while(|&b| b == 0).collect();
    if significant.is_empty() {
        significant.push(0);
    } else if significant[0] & 0x80 != 0 {
        significant.insert(0, 0);
    }
    significant
}

/// Build a `GetRequest-PDU` (RFC 1157 §4.1.2) fetching `oids` under
/// `community`, tagged with `request_id` so the reply can be matched.
#[must_use]
pub fn encode_get_request(community: &str, request_id: i32, oids: &[String]) -> Vec<u8> {
    let varbinds: Vec<u8> = oids
        .iter()
        .filter_map(|oid| encode_oid_dotted(oid))
        .map(|encoded| tlv(TAG_SEQUENCE, &[tlv(TAG_OID, &encoded), tlv(TAG_NULL, &[])].concat()))
        .collect::<Vec<_>>()
        .concat();
    let varbind_list = tlv(TAG_SEQUENCE, &varbinds);

    let pdu_body = [
        tlv(TAG_INTEGER, &encode_integer(request_id)),
        tlv(TAG_INTEGER, &[0]),
        tlv(TAG_INTEGER, &[0]),
        varbind_list,
    ]
    .concat();

    let message_body =
        [tlv(TAG_INTEGER, &[1]), tlv(TAG_OCTET_STRING, community.as_bytes()), tlv(TAG_GET_REQUEST_PDU, &pdu_body)]
            .concat();

    tlv(TAG_SEQUENCE, &message_body)
}

/// Decode a `GetResponse-PDU` into its variable bindings. Returns `None`
/// for anything that does not parse as a well-formed SNMPv2c response.
#[must_use]
pub fn decode_get_response(data: &[u8]) -> Option<Vec<(String, SnmpValue)>> {
    let (message, _) = read_tlv(data)?;
    if message.tag != TAG_SEQUENCE {
        return None;
    }

    let (version_tlv, rest) = read_tlv(message.value)?;
    if version_tlv.tag != TAG_INTEGER {
        return None;
    }
    let (_community, rest) = read_tlv(rest)?;
    let (pdu, _) = read_tlv(rest)?;
    if pdu.tag != TAG_GET_RESPONSE_PDU {
        return None;
    }

    let (_request_id, rest) = read_tlv(pdu.value)?;
    let (error_status_tlv, rest) = read_tlv(rest)?;
    let error_status = decode_integer(error_status_tlv.value)?;
    let (_error_index, rest) = read_tlv(rest)?;

    if error_status != 0 {
        return None;
    }

    Some(decode_varbind_list(rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v1_trap_message() -> Vec<u8> {
        let enterprise = encode_oid(&[1, 3, 6, 1, 4, 1, 9999]);
        let varbind = tlv(
            TAG_SEQUENCE,
            &[tlv(TAG_OID, &encode_oid(&[1, 3, 6, 1, 2, 1, 1, 1, 0])), tlv(TAG_OCTET_STRING, b"eth0")].concat(),
        );
        let varbind_list = tlv(TAG_SEQUENCE, &varbind);

        let pdu_body = [
            tlv(TAG_OID, &enterprise),
            tlv(TAG_IP_ADDRESS, &[10, 0, 0, 5]),
            tlv(TAG_INTEGER, &[6]),
            tlv(TAG_INTEGER, &[1]),
            tlv(TAG_INTEGER, &[0]),
            varbind_list,
        ]
        .concat();

        let message_body =
            [tlv(TAG_INTEGER, &[0]), tlv(TAG_OCTET_STRING, b"public"), tlv(TAG_V1_TRAP_PDU, &pdu_body)].concat();

        tlv(TAG_SEQUENCE, &message_body)
    }

    #[test]
    fn decodes_v1_enterprise_specific_trap() {
        let data = v1_trap_message();
        let trap = decode_trap(&data).expect("should decode");
        assert_eq!(trap.enterprise_oid, "1.3.6.1.4.1.9999");
        assert_eq!(trap.trap_oid, "1.3.6.1.4.1.9999.0.1");
        assert_eq!(trap.varbinds.len(), 1);
    }

    #[test]
    fn truncated_datagram_is_none() {
        let data = v1_trap_message();
        assert!(decode_trap(&data[..data.len() - 5]).is_none());
    }

    #[test]
    fn decodes_v2c_trap_oid_from_varbind() {
        let trap_oid = encode_oid(&[1, 3, 6, 1, 4, 1, 8888, 2, 1]);
        let snmp_trap_oid_varbind = tlv(
            TAG_SEQUENCE,
            &[
                tlv(TAG_OID, &encode_oid(&[1, 3, 6, 1, 6, 3, 1, 1, 4, 1, 0])),
                tlv(TAG_OID, &trap_oid),
            ]
            .concat(),
        );
        let varbind_list = tlv(TAG_SEQUENCE, &snmp_trap_oid_varbind);

        let pdu_body =
            [tlv(TAG_INTEGER, &[1]), tlv(TAG_INTEGER, &[0]), tlv(TAG_INTEGER, &[0]), varbind_list].concat();

        let message_body =
            [tlv(TAG_INTEGER, &[1]), tlv(TAG_OCTET_STRING, b"public"), tlv(TAG_V2_TRAP_PDU, &pdu_body)].concat();

        let data = tlv(TAG_SEQUENCE, &message_body);
        let trap = decode_trap(&data).expect("should decode");
        assert_eq!(trap.trap_oid, "1.3.6.1.4.1.8888.2.1");
        assert_eq!(trap.enterprise_oid, "1.3.6.1.4.1.8888.2");
    }

    fn get_response_message(error_status: i64) -> Vec<u8> {
        let varbind = tlv(
            TAG_SEQUENCE,
            &[tlv(TAG_OID, &encode_oid(&[1, 3, 6, 1, 2, 1, 1, 3, 0])), tlv(TAG_INTEGER, &[42])].concat(),
        );
        let varbind_list = tlv(TAG_SEQUENCE, &varbind);
        let pdu_body = [
            tlv(TAG_INTEGER, &[7]),
            tlv(TAG_INTEGER, &[error_status as u8]),
            tlv(TAG_INTEGER, &[0]),
            varbind_list,
        ]
        .concat();
        let message_body =
            [tlv(TAG_INTEGER, &[1]), tlv(TAG_OCTET_STRING, b"public"), tlv(TAG_GET_RESPONSE_PDU, &pdu_body)].concat();
        tlv(TAG_SEQUENCE, &message_body)
    }

    #[test]
    fn get_request_round_trips_through_decode_varbind_list() {
        let request = encode_get_request("public", 7, &["1.3.6.1.2.1.1.3.0".to_string()]);
        let (message, _) = read_tlv(&request).unwrap();
        let (_version, rest) = read_tlv(message.value).unwrap();
        let (_community, rest) = read_tlv(rest).unwrap();
        let (pdu, _) = read_tlv(rest).unwrap();
        assert_eq!(pdu.tag, TAG_GET_REQUEST_PDU);
    }

    #[test]
    fn decodes_successful_get_response() {
        let data = get_response_message(0);
        let varbinds = decode_get_response(&data).expect("should decode");
        assert_eq!(varbinds.len(), 1);
        assert_eq!(varbinds[0].0, "1.3.6.1.2.1.1.3.0");
        assert_eq!(varbinds[0].1, SnmpValue::Integer(42));
    }

    #[test]
    fn error_status_response_is_none() {
        let data = get_response_message(2);
        assert!(decode_get_response(&data).is_none());
    }
}
