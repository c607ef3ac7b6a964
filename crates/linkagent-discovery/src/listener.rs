//! Packet-in listener feeding the link and host registries

use crate::arp::parse_host;
use crate::controller::Controller;
use crate::lldp::parse_probe;
use crate::session::PacketIn;
use tokio::sync::mpsc;
use tracing::{info, trace};

/// Consume punted frames until the stream closes or the controller stops
pub async fn run(controller: &Controller, mut packets: mpsc::Receiver<PacketIn>) {
    let cancel = controller.cancel_token().clone();
    info!("Packet listener started");
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            packet = packets.recv() => match packet {
                Some(packet) => handle_packet(controller, &packet),
                None => {
                    info!("Packet stream closed");
                    break;
                }
            },
        }
    }
    info!("Packet listener stopped");
}

/// Classify one frame: probes update links, ARP/DHCP update hosts
pub fn handle_packet(controller: &Controller, packet: &PacketIn) {
    if let Some(probe) = parse_probe(&packet.payload) {
        controller.update_link(packet.ingress_port, probe.port, &probe.device_id);
    } else if let Some(host) = parse_host(&packet.payload) {
        controller.update_host(&host.mac, &host.ip.to_string(), packet.ingress_port);
    } else {
        trace!(port = packet.ingress_port, len = packet.payload.len(), "Ignoring packet");
    }
}
