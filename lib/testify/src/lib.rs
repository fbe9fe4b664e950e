mod portpicker;
mod socket;

// re-export
pub use portpicker::{Port, pick_unused_port};
pub use socket::{next_addr, next_addr_for_ip};
