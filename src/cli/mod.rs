//! Terminal front end over the note store.

mod app;
mod main;

pub use app::*;
pub use main::*;
