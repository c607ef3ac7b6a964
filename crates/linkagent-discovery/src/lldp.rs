//! LLDP (Link Layer Discovery Protocol) probe frames
//!
//! Each probe carries the sending agent's ID as a locally assigned chassis ID
//! and the egress port number as a locally assigned port ID, so the neighbor
//! that receives it learns which device and port it is wired to.

use pnet::packet::ethernet::{EtherType, EthernetPacket, MutableEthernetPacket};
use pnet::packet::Packet;
use pnet::util::MacAddr;

/// LLDP ethertype
pub const LLDP_ETHERTYPE: EtherType = EtherType(0x88cc);

/// Nearest-bridge multicast address, never forwarded by bridges
pub const LLDP_MULTICAST: MacAddr = MacAddr(0x01, 0x80, 0xc2, 0x00, 0x00, 0x0e);

/// Time-to-live advertised in probes, seconds
pub const PROBE_TTL_SECS: u16 = 120;

const TLV_END: u8 = 0;
const TLV_CHASSIS_ID: u8 = 1;
const TLV_PORT_ID: u8 = 2;
const TLV_TTL: u8 = 3;

const CHASSIS_SUBTYPE_MAC: u8 = 4;
const SUBTYPE_LOCAL: u8 = 7;

const ETHERNET_HEADER_LEN: usize = 14;
const MIN_FRAME_LEN: usize = 60;
const MAX_TLV_VALUE_LEN: usize = 511;

/// What a received probe tells us about the sender
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeInfo {
    /// Chassis ID of the sending device
    pub device_id: String,
    /// Port number the probe was sent from
    pub port: u32,
}

/// Build a probe frame for `agent_id` leaving through `port`
pub fn build_probe(agent_id: &str, port: u32) -> Vec<u8> {
    let mut payload = Vec::with_capacity(64);

    // Chassis ID and port ID values are capped at 255 bytes including subtype
    let chassis: Vec<u8> = agent_id.bytes().take(254).collect();
    push_tlv(&mut payload, TLV_CHASSIS_ID, &[&[SUBTYPE_LOCAL], &chassis]);
    push_tlv(&mut payload, TLV_PORT_ID, &[&[SUBTYPE_LOCAL], port.to_string().as_bytes()]);
    push_tlv(&mut payload, TLV_TTL, &[&PROBE_TTL_SECS.to_be_bytes()]);
    push_tlv(&mut payload, TLV_END, &[]);

    let len = (ETHERNET_HEADER_LEN + payload.len()).max(MIN_FRAME_LEN);
    let mut buffer = vec![0u8; len];
    if let Some(mut frame) = MutableEthernetPacket::new(&mut buffer) {
        frame.set_destination(LLDP_MULTICAST);
        frame.set_source(source_mac(agent_id));
        frame.set_ethertype(LLDP_ETHERTYPE);
        frame.set_payload(&payload);
    }
    buffer
}

fn push_tlv(out: &mut Vec<u8>, tlv_type: u8, parts: &[&[u8]]) {
    let len = parts.iter().map(|p| p.len()).sum::<usize>().min(MAX_TLV_VALUE_LEN);
    // 7-bit type, 9-bit length
    let header = (u16::from(tlv_type) << 9) | (len as u16 & 0x01ff);
    out.extend_from_slice(&header.to_be_bytes());
    for part in parts {
        out.extend_from_slice(part);
    }
}

/// Stable locally administered MAC derived from the agent ID
pub fn source_mac(agent_id: &str) -> MacAddr {
    // FNV-1a
    let hash = agent_id
        .bytes()
        .fold(0x811c_9dc5u32, |h, b| (h ^ u32::from(b)).wrapping_mul(0x0100_0193));
    let [a, b, c, d] = hash.to_be_bytes();
    MacAddr(0x02, 0x00, a, b, c, d)
}

/// Parse an LLDP frame; `None` for anything that is not a usable probe
pub fn parse_probe(frame: &[u8]) -> Option<ProbeInfo> {
    let ethernet = EthernetPacket::new(frame)?;
    if ethernet.get_ethertype() != LLDP_ETHERTYPE {
        return None;
    }

    let mut chassis_id = None;
    let mut port_id = None;

    let payload = ethernet.payload();
    let mut offset = 0;
    while offset + 2 <= payload.len() {
        let header = u16::from_be_bytes([payload[offset], payload[offset + 1]]);
        let tlv_type = (header >> 9) as u8;
        let len = usize::from(header & 0x01ff);
        offset += 2;

        if tlv_type == TLV_END {
            break;
        }
        let value = payload.get(offset..offset + len)?;
        offset += len;

        match tlv_type {
            TLV_CHASSIS_ID => chassis_id = parse_chassis_id(value),
            TLV_PORT_ID => {
                port_id = value.get(1..).map(|v| String::from_utf8_lossy(v).into_owned());
            }
            _ => {}
        }
    }

    Some(ProbeInfo {
        device_id: chassis_id?,
        port: parse_port_number(&port_id?)?,
    })
}

fn parse_chassis_id(value: &[u8]) -> Option<String> {
    let (&subtype, id) = value.split_first()?;
    if id.is_empty() {
        return None;
    }
    if subtype == CHASSIS_SUBTYPE_MAC && id.len() == 6 {
        return Some(MacAddr::new(id[0], id[1], id[2], id[3], id[4], id[5]).to_string());
    }
    Some(String::from_utf8_lossy(id).into_owned())
}

/// Extract port number from port ID (if numeric)
pub fn parse_port_number(port_id: &str) -> Option<u32> {
    // Port ID might be "1", "port1", "eth1", "swp1", etc.
    let digits: String = port_id.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}
