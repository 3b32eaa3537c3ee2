use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::warn;

use crate::state::events::GuildEvent;
use crate::state::tracker::{Handled, StateTracker};

/// Counters from feeding an event stream into a tracker.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplayStats {
    pub applied: usize,
    pub undecodable: usize,
    pub unknown_guild: usize,
    pub unknown_channel: usize,
    pub ignored: usize,
}

/// Feed newline-delimited JSON events into the tracker. Blank lines are
/// skipped; lines that don't decode are logged and counted, not fatal.
pub async fn replay_lines<R>(tracker: &StateTracker, reader: R) -> anyhow::Result<ReplayStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = ReplayStats::default();
    let mut lines = reader.lines();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let event = match GuildEvent::from_json(line) {
            Ok(event) => event,
            Err(e) => {
                warn!(line = line_no, error = %e, "skipping undecodable event");
                stats.undecodable += 1;
                continue;
            }
        };

        match tracker.handle_event(event) {
            Handled::Applied => stats.applied += 1,
            Handled::UnknownGuild => stats.unknown_guild += 1,
            Handled::UnknownChannel => stats.unknown_channel += 1,
            Handled::Ignored => stats.ignored += 1,
        }
    }

    Ok(stats)
}
