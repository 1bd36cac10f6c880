// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! `UNSUBSCRIBE` handling (spec 4.D).

use tokio::sync::mpsc;

use codec::{Packet, UnsubscribeAckPacket, UnsubscribePacket};

use crate::commands::WriterCmd;
use crate::error::Error;
use crate::handlers::PendingWrite;
use crate::state::BrokerState;

pub(super) fn handle(
    state: &mut BrokerState,
    client_id: &str,
    reply_tx: &mpsc::Sender<WriterCmd>,
    packet: UnsubscribePacket,
    writes: &mut Vec<PendingWrite>,
) -> Result<(), Error> {
    for topic in &packet.topics {
        state.topics.unsubscribe(client_id, topic);
    }

    // [MQTT-3.10.4-5]: a UNSUBACK is sent whether or not any of the named
    // filters were actually subscribed to.
    let ack = Packet::UnsubscribeAck(UnsubscribeAckPacket::new(packet.packet_id));
    writes.push(PendingWrite::write(reply_tx, &ack)?);
    Ok(())
}
