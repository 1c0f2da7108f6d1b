pub mod frame;

pub use frame::{RenderFrame, RenderedLine, StyledSpan, TermEvent};
