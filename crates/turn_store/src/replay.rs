use std::collections::HashMap;

use tracing::debug;
use turn_model::Turn;

use crate::error::TurnStoreError;
use crate::store::TurnStore;

/// Rebuilds a session's turns in write order, tagged `from_replay`.
///
/// Tool results recorded after their turn froze are joined back onto the
/// matching call by id. Replay only reads; it never touches the upstream.
pub fn replay(store: &dyn TurnStore, session_id: &str) -> Result<Vec<Turn>, TurnStoreError> {
    let log = store.load(session_id)?;
    let mut turns = log.turns;

    let mut call_index: HashMap<String, (usize, usize)> = HashMap::new();
    for (turn_index, turn) in turns.iter().enumerate() {
        for (call_position, call) in turn.tool_calls.iter().enumerate() {
            call_index.insert(call.id.clone(), (turn_index, call_position));
        }
    }

    for record in &log.tool_results {
        match call_index.get(&record.tool_use_id) {
            Some(&(turn_index, call_position)) => {
                turns[turn_index].tool_calls[call_position].apply_output(record.output());
            }
            None => debug!(
                session_id,
                tool_use_id = %record.tool_use_id,
                "recorded tool result has no matching call"
            ),
        }
    }

    for turn in &mut turns {
        turn.from_replay = true;
    }

    Ok(turns)
}
