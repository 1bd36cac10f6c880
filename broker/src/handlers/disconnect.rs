// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! `DISCONNECT` handling and connection teardown (spec 4.D, 7).

use crate::error::Error;
use crate::handlers::{publish_message, PendingWrite};
use crate::state::BrokerState;

/// A graceful `DISCONNECT`: the client asked to leave cleanly, so its Will
/// must be discarded rather than published [MQTT-3.14.4-3].
pub(super) fn handle(
    state: &mut BrokerState,
    client_id: &str,
    writes: &mut Vec<PendingWrite>,
) -> Result<(), Error> {
    if let Some(session) = state.sessions.lookup_mut(client_id) {
        session.will = None;
        if let Some(writer) = session.writer.clone() {
            writes.push(PendingWrite::close(&writer));
        }
    }
    close_session(state, client_id, writes)
}

/// Tear down a connection that went away without a `DISCONNECT`: a
/// transport error, a framing violation, or a takeover by a newer CONNECT
/// (spec 7). `involuntary` gates Will publication.
pub(crate) fn teardown(
    state: &mut BrokerState,
    client_id: &str,
    involuntary: bool,
    writes: &mut Vec<PendingWrite>,
) -> Result<(), Error> {
    if involuntary {
        let will = state.sessions.lookup_mut(client_id).and_then(|s| s.will.take());
        if let Some(will) = will {
            publish_message(
                &mut state.topics,
                &mut state.sessions,
                &state.stats,
                &will,
                writes,
            )?;
        }
    }
    close_session(state, client_id, writes)
}

fn close_session(
    state: &mut BrokerState,
    client_id: &str,
    _writes: &mut Vec<PendingWrite>,
) -> Result<(), Error> {
    let clean_session = state
        .sessions
        .lookup(client_id)
        .map(|s| s.clean_session)
        .unwrap_or(false);
    if clean_session {
        state.topics.remove_client(client_id);
    }
    state.sessions.close(client_id);
    state.stats.client_disconnected();
    Ok(())
}
