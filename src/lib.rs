//! A terminal emulator core: a VT500-series control sequence parser, a
//! screen model with scrollback, selection, and reflow, an input
//! encoder, and a PTY session loop that produces immutable render
//! frames for an external renderer.
//!
//! The crate draws no pixels and spawns no windows; it turns a PTY byte
//! stream into consistent [`render::RenderFrame`] snapshots and turns
//! host input events into the bytes the application expects.

pub mod error;
pub mod input;
pub mod parser;
pub mod pty;
pub mod render;
pub mod terminal;

pub use error::{Error, Result};
pub use input::{InputEncoder, Key, Modifiers, MouseButton, MouseEvent, MouseEventKind};
pub use parser::{Params, Parser, Perform};
pub use pty::{spawn, RenderSink, Session, SpawnOptions};
pub use render::{RenderFrame, TermEvent};
pub use terminal::Screen;
