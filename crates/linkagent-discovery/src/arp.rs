//! Host sightings from ARP and DHCP client traffic
//!
//! Hosts announce themselves with ARP requests/replies and DHCP client
//! messages. Either tells us the host's MAC and IP; the port the frame was
//! punted from tells us where it is attached.

use pnet::packet::arp::{ArpHardwareTypes, ArpPacket};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::udp::UdpPacket;
use pnet::packet::Packet;
use pnet::util::MacAddr;
use std::net::Ipv4Addr;

const DHCP_SERVER_PORT: u16 = 67;
const DHCP_CLIENT_PORT: u16 = 68;
const BOOTREQUEST: u8 = 1;
const DHCP_MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];
const DHCP_OPTIONS_OFFSET: usize = 240;
const OPTION_PAD: u8 = 0;
const OPTION_REQUESTED_IP: u8 = 50;
const OPTION_END: u8 = 255;

/// A host observed on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSighting {
    /// Lowercase colon-separated MAC
    pub mac: String,
    pub ip: Ipv4Addr,
}

/// Extract a host sighting from an ARP or DHCP client frame
pub fn parse_host(frame: &[u8]) -> Option<HostSighting> {
    let ethernet = EthernetPacket::new(frame)?;
    match ethernet.get_ethertype() {
        EtherTypes::Arp => parse_arp(ethernet.payload()),
        EtherTypes::Ipv4 => parse_dhcp(ethernet.payload()),
        _ => None,
    }
}

fn parse_arp(payload: &[u8]) -> Option<HostSighting> {
    let arp = ArpPacket::new(payload)?;
    if arp.get_hardware_type() != ArpHardwareTypes::Ethernet
        || arp.get_protocol_type() != EtherTypes::Ipv4
    {
        return None;
    }

    let ip = arp.get_sender_proto_addr();
    // Probes for duplicate address detection carry no usable sender IP
    if ip.is_unspecified() {
        return None;
    }
    Some(HostSighting {
        mac: arp.get_sender_hw_addr().to_string(),
        ip,
    })
}

fn parse_dhcp(payload: &[u8]) -> Option<HostSighting> {
    let ipv4 = Ipv4Packet::new(payload)?;
    if ipv4.get_next_level_protocol() != IpNextHeaderProtocols::Udp {
        return None;
    }
    let udp = UdpPacket::new(ipv4.payload())?;
    if udp.get_source() != DHCP_CLIENT_PORT || udp.get_destination() != DHCP_SERVER_PORT {
        return None;
    }

    let bootp = udp.payload();
    if bootp.len() < DHCP_OPTIONS_OFFSET || bootp[0] != BOOTREQUEST || bootp[2] != 6 {
        return None;
    }
    if bootp[236..240] != DHCP_MAGIC_COOKIE {
        return None;
    }

    let chaddr = &bootp[28..34];
    let mac = MacAddr::new(chaddr[0], chaddr[1], chaddr[2], chaddr[3], chaddr[4], chaddr[5]);

    let ciaddr = Ipv4Addr::new(bootp[12], bootp[13], bootp[14], bootp[15]);
    let ip = if ciaddr.is_unspecified() {
        requested_ip(&bootp[DHCP_OPTIONS_OFFSET..])?
    } else {
        ciaddr
    };

    Some(HostSighting {
        mac: mac.to_string(),
        ip,
    })
}

/// Find option 50 (requested IP address) in the DHCP options area
fn requested_ip(options: &[u8]) -> Option<Ipv4Addr> {
    let mut offset = 0;
    while offset < options.len() {
        match options[offset] {
            OPTION_PAD => offset += 1,
            OPTION_END => return None,
            code => {
                let len = usize::from(*options.get(offset + 1)?);
                let value = options.get(offset + 2..offset + 2 + len)?;
                if code == OPTION_REQUESTED_IP && len == 4 {
                    return Some(Ipv4Addr::new(value[0], value[1], value[2], value[3]));
                }
                offset += 2 + len;
            }
        }
    }
    None
}
