// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! `PINGREQ` handling (spec 4.D).

use tokio::sync::mpsc;

use codec::{Packet, PingResponsePacket};

use crate::commands::WriterCmd;
use crate::error::Error;
use crate::handlers::PendingWrite;

pub(super) fn handle(
    reply_tx: &mpsc::Sender<WriterCmd>,
    writes: &mut Vec<PendingWrite>,
) -> Result<(), Error> {
    let pong = Packet::PingResponse(PingResponsePacket::default());
    writes.push(PendingWrite::write(reply_tx, &pong)?);
    Ok(())
}
