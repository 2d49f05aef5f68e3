//! Restart phase: stop, then start.

use crate::error::Result;
use crate::reservation::{NodeId, Reservation};

use super::start::{start, StartOptions};
use super::stop::{stop, StopOptions};

/// Stop the cluster and boot it again.
///
/// A failed stop short-circuits: start is never attempted on a cluster in
/// an unknown teardown state.
pub fn restart(
    reservation: &Reservation,
    stop_options: &StopOptions,
    start_options: &StartOptions,
) -> Result<NodeId> {
    stop(reservation, stop_options, None)?;
    start(reservation, start_options, None)
}
