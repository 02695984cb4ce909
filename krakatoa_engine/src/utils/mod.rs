/// Generic helpers shared by the frame, resource and camera modules

pub mod ring_slot_set;

pub use ring_slot_set::RingSlotSet;
