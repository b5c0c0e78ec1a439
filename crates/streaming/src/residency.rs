/// Lifecycle of one cache slot.
///
/// `Empty → Loading → Ready`; a ready slot never regresses. A failed load
/// returns the slot to `Empty` so the next request retries.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum SlotState {
    #[default]
    Empty,
    Loading,
    Ready,
}

impl SlotState {
    pub fn is_ready(self) -> bool {
        self == SlotState::Ready
    }
}
