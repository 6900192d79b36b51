pub mod common;
pub mod down;
pub mod error;
pub mod init;
pub mod status;
pub mod up;

pub use down::handle_down;
pub use init::handle_init;
pub use status::handle_status;
pub use up::handle_up;
