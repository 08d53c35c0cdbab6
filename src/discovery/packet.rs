//! mDNS packet building and parsing
//!
//! Builds the one query shape the fabric sends (one question for the
//! well-known service name, type ANY, class IN) and parses responses
//! into [`ModuleRecord`](super::ModuleRecord)s.
//!
//! Response parsing handles untrusted input: name decompression is
//! iterative with a visited-offset set, pointers must aim strictly
//! backward, and any overrun rejects that response without touching the
//! rest of the scan.

use std::collections::HashSet;
use std::net::Ipv4Addr;

use byteorder::{BigEndian, ByteOrder};

use crate::discovery::ModuleRecord;
use crate::error::{Error, Result};
use crate::protocol::{ModuleId, ModuleType};

const HEADER_LEN: usize = 12;
const RECORD_HEADER_LEN: usize = 10;
const QUESTION_FOOTER_LEN: usize = 4;

const QTYPE_ANY: u16 = 0x00FF;
const QCLASS_IN: u16 = 0x0001;

const TYPE_A: u16 = 1;
const TYPE_TXT: u16 = 16;

const POINTER_TAG: u8 = 0xC0;

const KEY_MODULE_ID: &str = "module_id";
const KEY_MODULE_TYPE: &str = "module_type";
const KEY_CONNECTED_MODULES: &str = "connected_modules";

/// Build a one-question query for `service_name` (type ANY, class IN).
pub fn build_query(service_name: &str) -> Vec<u8> {
    let mut buf = vec![0u8; HEADER_LEN];
    // Transaction id and flags stay zero; one question
    BigEndian::write_u16(&mut buf[4..6], 1);

    for label in service_name.split('.').filter(|l| !l.is_empty()) {
        buf.push(label.len() as u8);
        buf.extend_from_slice(label.as_bytes());
    }
    buf.push(0);

    let mut footer = [0u8; QUESTION_FOOTER_LEN];
    BigEndian::write_u16(&mut footer[0..2], QTYPE_ANY);
    BigEndian::write_u16(&mut footer[2..4], QCLASS_IN);
    buf.extend_from_slice(&footer);
    buf
}

/// Parse one response datagram into a module record.
///
/// A record is produced only when the response names the service
/// `marker`, carries an A record with a valid IPv4 address, and its TXT
/// records provide integer `module_id`, `module_type`, and
/// `connected_modules` values. Anything else is an error the scan
/// logs and skips.
pub fn parse_response(buf: &[u8], marker: &str) -> Result<ModuleRecord> {
    if buf.len() < HEADER_LEN {
        return Err(Error::malformed("mdns", "response shorter than header"));
    }

    let questions = BigEndian::read_u16(&buf[4..6]);
    let answers = BigEndian::read_u16(&buf[6..8]);
    let authority = BigEndian::read_u16(&buf[8..10]);
    let additional = BigEndian::read_u16(&buf[10..12]);

    let mut pos = HEADER_LEN;

    // Questions are skipped, but their names must still parse
    for _ in 0..questions {
        let (_, next) = read_name(buf, pos)?;
        pos = next + QUESTION_FOOTER_LEN;
        if pos > buf.len() {
            return Err(Error::malformed("mdns", "question overruns response"));
        }
    }

    let mut marker_seen = false;
    let mut hostname = String::new();
    let mut ip: Option<Ipv4Addr> = None;
    let mut module_id: Option<ModuleId> = None;
    let mut module_type: Option<ModuleType> = None;
    let mut connected: Option<Vec<ModuleId>> = None;

    for _ in 0..answers as usize + authority as usize + additional as usize {
        let (name, next) = read_name(buf, pos)?;
        pos = next;

        if pos + RECORD_HEADER_LEN > buf.len() {
            return Err(Error::malformed("mdns", "record header overruns response"));
        }
        let rtype = BigEndian::read_u16(&buf[pos..pos + 2]);
        let data_len = BigEndian::read_u16(&buf[pos + 8..pos + 10]) as usize;
        pos += RECORD_HEADER_LEN;

        if pos + data_len > buf.len() {
            return Err(Error::malformed("mdns", "record data overruns response"));
        }
        let data = &buf[pos..pos + data_len];
        pos += data_len;

        marker_seen |= name.contains(marker);
        hostname = name;

        if !marker_seen {
            continue;
        }

        match rtype {
            TYPE_A if data_len == 4 => {
                ip = Some(Ipv4Addr::new(data[0], data[1], data[2], data[3]));
            }
            TYPE_TXT => {
                parse_txt(data, &mut module_id, &mut module_type, &mut connected);
            }
            _ => {}
        }
    }

    if !marker_seen {
        return Err(Error::malformed("mdns", format!("no {} service in response", marker)));
    }

    match (ip, module_id, module_type, connected) {
        (Some(ip), Some(id), Some(module_type), Some(connected)) => Ok(ModuleRecord {
            id,
            ip,
            hostname,
            module_type,
            connected,
        }),
        _ => Err(Error::malformed(
            "mdns",
            "response missing address or required TXT keys",
        )),
    }
}

/// TXT record data: a run of length-prefixed `key=value` strings.
/// Unknown keys and non-integer values are ignored.
fn parse_txt(
    data: &[u8],
    module_id: &mut Option<ModuleId>,
    module_type: &mut Option<ModuleType>,
    connected: &mut Option<Vec<ModuleId>>,
) {
    let mut pos = 0;
    while pos < data.len() {
        let len = data[pos] as usize;
        pos += 1;
        if pos + len > data.len() {
            return;
        }
        let entry = String::from_utf8_lossy(&data[pos..pos + len]);
        pos += len;

        let Some((key, value)) = entry.split_once('=') else {
            continue;
        };
        match key {
            KEY_MODULE_ID => *module_id = value.trim().parse().ok(),
            KEY_MODULE_TYPE => {
                *module_type = value.trim().parse::<u8>().ok().map(ModuleType::from)
            }
            KEY_CONNECTED_MODULES => *connected = parse_id_list(value),
            _ => {}
        }
    }
}

/// Comma-separated module ids; an empty value is an empty list, a
/// non-integer entry poisons the whole key.
fn parse_id_list(value: &str) -> Option<Vec<ModuleId>> {
    let value = value.trim();
    if value.is_empty() {
        return Some(Vec::new());
    }
    value
        .split(',')
        .map(|part| part.trim().parse::<ModuleId>().ok())
        .collect()
}

/// Decompress a name starting at `start`.
///
/// Returns the dotted name and the offset just past it in the original
/// (unjumped) byte stream. Pointers are 14-bit and must target an
/// offset strictly before the pointer itself; revisiting an offset is
/// rejected.
fn read_name(buf: &[u8], start: usize) -> Result<(String, usize)> {
    let mut labels: Vec<String> = Vec::new();
    let mut pos = start;
    let mut resume = None;
    let mut visited: HashSet<usize> = HashSet::new();

    loop {
        let byte = *buf
            .get(pos)
            .ok_or_else(|| Error::malformed("mdns", "name overruns response"))?;

        if byte == 0 {
            let end = resume.unwrap_or(pos + 1);
            return Ok((labels.join("."), end));
        }

        if byte & POINTER_TAG == POINTER_TAG {
            let low = *buf
                .get(pos + 1)
                .ok_or_else(|| Error::malformed("mdns", "truncated name pointer"))?;
            let target = (((byte & !POINTER_TAG) as usize) << 8) | low as usize;
            if target >= pos {
                return Err(Error::malformed(
                    "mdns",
                    format!("name pointer to {} does not aim backward from {}", target, pos),
                ));
            }
            if !visited.insert(target) {
                return Err(Error::malformed("mdns", "name pointer loop"));
            }
            resume.get_or_insert(pos + 2);
            pos = target;
            continue;
        }

        if byte & POINTER_TAG != 0 {
            return Err(Error::malformed("mdns", "reserved label type"));
        }

        let len = byte as usize;
        if pos + 1 + len > buf.len() {
            return Err(Error::malformed("mdns", "label overruns response"));
        }
        labels.push(String::from_utf8_lossy(&buf[pos + 1..pos + 1 + len]).into_owned());
        pos += 1 + len;
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const MARKER: &str = "_robotcontrol";

    fn push_name(buf: &mut Vec<u8>, name: &str) {
        for label in name.split('.') {
            buf.push(label.len() as u8);
            buf.extend_from_slice(label.as_bytes());
        }
        buf.push(0);
    }

    fn push_record(buf: &mut Vec<u8>, rtype: u16, data: &[u8]) {
        let mut header = [0u8; 10];
        BigEndian::write_u16(&mut header[0..2], rtype);
        BigEndian::write_u16(&mut header[2..4], QCLASS_IN);
        // ttl left zero
        BigEndian::write_u16(&mut header[8..10], data.len() as u16);
        buf.extend_from_slice(&header);
        buf.extend_from_slice(data);
    }

    fn push_txt(data: &mut Vec<u8>, entry: &str) {
        data.push(entry.len() as u8);
        data.extend_from_slice(entry.as_bytes());
    }

    /// A two-record response: an A record under the full service name,
    /// then a TXT record whose name is a compression pointer back to it.
    fn well_formed_response() -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_LEN];
        BigEndian::write_u16(&mut buf[6..8], 2); // answers

        push_name(&mut buf, "drive3._robotcontrol._tcp.local");
        push_record(&mut buf, TYPE_A, &[192, 168, 7, 3]);

        // Pointer to the name at offset 12
        buf.extend_from_slice(&[POINTER_TAG, HEADER_LEN as u8]);
        let mut txt = Vec::new();
        push_txt(&mut txt, "module_id=3");
        push_txt(&mut txt, "module_type=1");
        push_txt(&mut txt, "connected_modules=4,5");
        push_record(&mut buf, TYPE_TXT, &txt);

        buf
    }

    #[test]
    fn test_build_query_layout() {
        let query = build_query("_robotcontrol._tcp.local");

        // Header: zero id/flags, one question
        assert_eq!(&query[..6], &[0, 0, 0, 0, 0, 1]);
        assert_eq!(&query[6..12], &[0u8; 6]);

        // QNAME starts with the 13-byte first label
        assert_eq!(query[12], 13);
        assert_eq!(&query[13..26], b"_robotcontrol");

        // Terminator + footer: type ANY, class IN
        let footer = &query[query.len() - 5..];
        assert_eq!(footer, &[0, 0x00, 0xFF, 0x00, 0x01]);
    }

    #[test]
    fn test_parse_well_formed_response() {
        let record = parse_response(&well_formed_response(), MARKER).unwrap();
        assert_eq!(record.id, 3);
        assert_eq!(record.ip, Ipv4Addr::new(192, 168, 7, 3));
        assert_eq!(record.module_type, ModuleType::Drive);
        assert_eq!(record.connected, vec![4, 5]);
        assert_eq!(record.hostname, "drive3._robotcontrol._tcp.local");
    }

    #[test]
    fn test_parse_empty_connected_list() {
        let mut buf = vec![0u8; HEADER_LEN];
        BigEndian::write_u16(&mut buf[6..8], 2);
        push_name(&mut buf, "lone._robotcontrol._tcp.local");
        push_record(&mut buf, TYPE_A, &[10, 0, 0, 9]);
        buf.extend_from_slice(&[POINTER_TAG, HEADER_LEN as u8]);
        let mut txt = Vec::new();
        push_txt(&mut txt, "module_id=9");
        push_txt(&mut txt, "module_type=0");
        push_txt(&mut txt, "connected_modules=");
        push_record(&mut buf, TYPE_TXT, &txt);

        let record = parse_response(&buf, MARKER).unwrap();
        assert_eq!(record.id, 9);
        assert!(record.connected.is_empty());
    }

    #[test]
    fn test_reject_foreign_service() {
        let mut buf = vec![0u8; HEADER_LEN];
        BigEndian::write_u16(&mut buf[6..8], 1);
        push_name(&mut buf, "printer._ipp._tcp.local");
        push_record(&mut buf, TYPE_A, &[10, 0, 0, 1]);

        assert!(parse_response(&buf, MARKER).is_err());
    }

    #[test]
    fn test_reject_missing_txt_keys() {
        let mut buf = vec![0u8; HEADER_LEN];
        BigEndian::write_u16(&mut buf[6..8], 2);
        push_name(&mut buf, "drive3._robotcontrol._tcp.local");
        push_record(&mut buf, TYPE_A, &[192, 168, 7, 3]);
        buf.extend_from_slice(&[POINTER_TAG, HEADER_LEN as u8]);
        let mut txt = Vec::new();
        push_txt(&mut txt, "module_id=3");
        // module_type and connected_modules absent
        push_record(&mut buf, TYPE_TXT, &txt);

        assert!(parse_response(&buf, MARKER).is_err());
    }

    #[test]
    fn test_reject_non_integer_txt_value() {
        let mut buf = vec![0u8; HEADER_LEN];
        BigEndian::write_u16(&mut buf[6..8], 2);
        push_name(&mut buf, "drive3._robotcontrol._tcp.local");
        push_record(&mut buf, TYPE_A, &[192, 168, 7, 3]);
        buf.extend_from_slice(&[POINTER_TAG, HEADER_LEN as u8]);
        let mut txt = Vec::new();
        push_txt(&mut txt, "module_id=abc");
        push_txt(&mut txt, "module_type=1");
        push_txt(&mut txt, "connected_modules=4");
        push_record(&mut buf, TYPE_TXT, &txt);

        assert!(parse_response(&buf, MARKER).is_err());
    }

    #[test]
    fn test_reject_forward_pointer() {
        let mut buf = vec![0u8; HEADER_LEN];
        BigEndian::write_u16(&mut buf[6..8], 1);
        // Name is a pointer aiming at itself
        let pointer_pos = buf.len();
        buf.push(POINTER_TAG);
        buf.push(pointer_pos as u8);
        push_record(&mut buf, TYPE_A, &[10, 0, 0, 1]);

        assert!(parse_response(&buf, MARKER).is_err());
    }

    #[test]
    fn test_reject_label_overrun() {
        let mut buf = vec![0u8; HEADER_LEN];
        BigEndian::write_u16(&mut buf[6..8], 1);
        buf.push(60); // label claims 60 bytes, none follow
        buf.extend_from_slice(b"abc");

        assert!(parse_response(&buf, MARKER).is_err());
    }

    #[test]
    fn test_chained_backward_pointers_resolve() {
        let mut buf = vec![0u8; HEADER_LEN];
        BigEndian::write_u16(&mut buf[6..8], 2);

        // Full name in the clear
        push_name(&mut buf, "arm1._robotcontrol._tcp.local");
        push_record(&mut buf, TYPE_A, &[10, 1, 1, 4]);

        // TXT record name: one fresh label, then a pointer past "arm1"
        // into the suffix of the first name (skip 1 length byte + 4)
        buf.push(4);
        buf.extend_from_slice(b"arm2");
        buf.extend_from_slice(&[POINTER_TAG, (HEADER_LEN + 5) as u8]);
        let mut txt = Vec::new();
        push_txt(&mut txt, "module_id=4");
        push_txt(&mut txt, "module_type=3");
        push_txt(&mut txt, "connected_modules=");
        push_record(&mut buf, TYPE_TXT, &txt);

        let record = parse_response(&buf, MARKER).unwrap();
        assert_eq!(record.id, 4);
        assert_eq!(record.module_type, ModuleType::Manipulator);
        assert_eq!(record.hostname, "arm2._robotcontrol._tcp.local");
    }

    #[test]
    fn test_short_response_rejected() {
        assert!(parse_response(&[0, 1, 2], MARKER).is_err());
        assert!(parse_response(&[], MARKER).is_err());
    }
}
