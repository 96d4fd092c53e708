#![forbid(unsafe_code)]

use crate::world::World;

/// Everything an engine call may look at during one tick.
///
/// Built once per tick by the orchestrator and dropped when the tick ends.
#[derive(Clone, Copy)]
pub struct TickContext<'w> {
    pub tick: u64,
    pub world: &'w dyn World,
}

impl<'w> TickContext<'w> {
    #[must_use]
    pub fn new(tick: u64, world: &'w dyn World) -> Self {
        Self { tick, world }
    }
}
