//! Screen capture for the QRSL game window.
//!
//! - Window discovery (`find_game_window`)
//! - Client area information (`get_client_area_info`)
//! - Frame capture (`WindowCapture`)

pub mod screenshot;
pub mod window;

pub use screenshot::WindowCapture;
pub use window::{WindowHandle, find_game_window, get_client_area_info};
