//! Hex dumps of the traffic exchanged with the board.

use hexplay::HexViewBuilder;
use log::{log_enabled, trace, Level::Trace};

/// Dump `data` in a hex table at `trace` level.
pub(crate) fn trace_bytes(label: &str, data: &[u8]) {
    if data.is_empty() || !log_enabled!(Trace) {
        return;
    }
    let view = HexViewBuilder::new(data)
        .address_offset(0)
        .row_width(16)
        .finish();
    trace!("{} ({} bytes)\n{}", label, data.len(), view);
}
