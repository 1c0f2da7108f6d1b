//! Table-driven VT500-series control sequence parser.
//!
//! Implements the canonical DEC ANSI parser (Paul Williams' state diagram)
//! over a UTF-8 byte stream. Bytes are fed in arbitrary chunks; partial
//! sequences survive across chunk boundaries and event order is identical
//! for every chunking of the same input.

pub mod params;
pub mod utf8;

pub use params::Params;

use utf8::{Utf8Decoder, Utf8Step};

/// Upper bound on accumulated OSC string data. Overflow is silently
/// truncated; the sequence still dispatches with the truncated payload.
pub const MAX_OSC_RAW: usize = 8192;

/// Maximum number of `;`-separated OSC parameters tracked individually.
/// Further separators are kept verbatim inside the final parameter.
const MAX_OSC_PARAMS: usize = 16;

/// Maximum collected intermediate bytes (leader bytes included). Overflow
/// marks the sequence ignored but parsing continues to its end.
const MAX_INTERMEDIATES: usize = 4;

/// Observer for parser events, in the order the state machine produces
/// them. All methods default to no-ops so implementations handle only what
/// they care about.
pub trait Perform {
    /// A decoded printable character.
    fn print(&mut self, _c: char) {}

    /// A C0 control (or CAN/SUB aborting a sequence).
    fn execute(&mut self, _byte: u8) {}

    /// Final byte of a CSI sequence. Leader bytes (`<`, `=`, `>`, `?`)
    /// appear at the front of `intermediates`.
    fn csi_dispatch(&mut self, _params: &Params, _intermediates: &[u8], _ignore: bool, _action: char) {
    }

    /// Final byte of an ESC sequence.
    fn esc_dispatch(&mut self, _intermediates: &[u8], _ignore: bool, _byte: u8) {}

    /// A complete OSC string, split on `;`.
    fn osc_dispatch(&mut self, _params: &[&[u8]], _bell_terminated: bool) {}

    /// Start of a DCS passthrough stream.
    fn hook(&mut self, _params: &Params, _intermediates: &[u8], _ignore: bool, _action: char) {}

    /// One byte of DCS passthrough data.
    fn put(&mut self, _byte: u8) {}

    /// End of a DCS passthrough stream.
    fn unhook(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    #[default]
    Ground,
    Escape,
    EscapeIntermediate,
    CsiEntry,
    CsiParam,
    CsiIntermediate,
    CsiIgnore,
    DcsEntry,
    DcsParam,
    DcsIntermediate,
    DcsPassthrough,
    DcsIgnore,
    OscString,
    SosPmApcString,
}

/// The parser state machine. Owned by a single producer; no internal
/// locking or buffering beyond in-flight sequence state.
#[derive(Debug, Default)]
pub struct Parser {
    state: State,
    intermediates: [u8; MAX_INTERMEDIATES],
    intermediate_idx: usize,
    ignoring: bool,
    params: Params,
    param: u16,
    param_is_sub: bool,
    osc_raw: Vec<u8>,
    osc_params: [(usize, usize); MAX_OSC_PARAMS],
    osc_num_params: usize,
    osc_param_start: usize,
    utf8: Utf8Decoder,
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, delivering events to `performer`.
    pub fn advance<P: Perform>(&mut self, performer: &mut P, bytes: &[u8]) {
        for &byte in bytes {
            self.advance_byte(performer, byte);
        }
    }

    fn advance_byte<P: Perform>(&mut self, performer: &mut P, byte: u8) {
        // A multi-byte UTF-8 sequence in Ground consumes everything,
        // including would-be controls; a control byte mid-sequence is an
        // encoding error handled by the decoder.
        if self.state == State::Ground && self.utf8.in_progress() {
            self.utf8_advance(performer, byte);
            return;
        }

        match byte {
            0x1B => self.enter_escape(performer),
            // CAN and SUB abort any in-flight sequence.
            0x18 | 0x1A => {
                self.abort_sequence(performer);
                performer.execute(byte);
                self.state = State::Ground;
            }
            _ => self.advance_state(performer, byte),
        }
    }

    fn advance_state<P: Perform>(&mut self, performer: &mut P, byte: u8) {
        match self.state {
            State::Ground => match byte {
                0x00..=0x1F => performer.execute(byte),
                0x20..=0x7E => performer.print(byte as char),
                0x7F => {}
                0x80..=0xFF => self.utf8_advance(performer, byte),
            },

            State::Escape => match byte {
                0x00..=0x1F => performer.execute(byte),
                0x20..=0x2F => {
                    self.collect(byte);
                    self.state = State::EscapeIntermediate;
                }
                0x50 => {
                    self.clear_sequence();
                    self.state = State::DcsEntry;
                }
                0x58 | 0x5E | 0x5F => self.state = State::SosPmApcString,
                0x5B => {
                    self.clear_sequence();
                    self.state = State::CsiEntry;
                }
                0x5D => {
                    self.osc_start();
                    self.state = State::OscString;
                }
                0x30..=0x7E => {
                    performer.esc_dispatch(self.intermediates(), self.ignoring, byte);
                    self.state = State::Ground;
                }
                _ => {}
            },

            State::EscapeIntermediate => match byte {
                0x00..=0x1F => performer.execute(byte),
                0x20..=0x2F => self.collect(byte),
                0x30..=0x7E => {
                    performer.esc_dispatch(self.intermediates(), self.ignoring, byte);
                    self.state = State::Ground;
                }
                _ => {}
            },

            State::CsiEntry | State::CsiParam => match byte {
                0x00..=0x1F => performer.execute(byte),
                0x20..=0x2F => {
                    self.collect(byte);
                    self.state = State::CsiIntermediate;
                }
                0x30..=0x39 => {
                    self.param_digit(byte - b'0');
                    self.state = State::CsiParam;
                }
                0x3A => {
                    self.param_separator(true);
                    self.state = State::CsiParam;
                }
                0x3B => {
                    self.param_separator(false);
                    self.state = State::CsiParam;
                }
                0x3C..=0x3F => {
                    if self.state == State::CsiEntry {
                        self.collect(byte);
                        self.state = State::CsiParam;
                    } else {
                        // Private markers are only valid before parameters.
                        self.state = State::CsiIgnore;
                    }
                }
                0x40..=0x7E => {
                    self.commit_param();
                    performer.csi_dispatch(
                        &self.params,
                        &self.intermediates[..self.intermediate_idx],
                        self.ignoring,
                        byte as char,
                    );
                    self.state = State::Ground;
                }
                _ => {}
            },

            State::CsiIntermediate => match byte {
                0x00..=0x1F => performer.execute(byte),
                0x20..=0x2F => self.collect(byte),
                0x30..=0x3F => self.state = State::CsiIgnore,
                0x40..=0x7E => {
                    self.commit_param();
                    performer.csi_dispatch(
                        &self.params,
                        &self.intermediates[..self.intermediate_idx],
                        self.ignoring,
                        byte as char,
                    );
                    self.state = State::Ground;
                }
                _ => {}
            },

            State::CsiIgnore => match byte {
                0x00..=0x1F => performer.execute(byte),
                0x40..=0x7E => self.state = State::Ground,
                _ => {}
            },

            State::DcsEntry | State::DcsParam => match byte {
                0x00..=0x1F => {}
                0x20..=0x2F => {
                    self.collect(byte);
                    self.state = State::DcsIntermediate;
                }
                0x30..=0x39 => {
                    self.param_digit(byte - b'0');
                    self.state = State::DcsParam;
                }
                0x3A => {
                    self.param_separator(true);
                    self.state = State::DcsParam;
                }
                0x3B => {
                    self.param_separator(false);
                    self.state = State::DcsParam;
                }
                0x3C..=0x3F => {
                    if self.state == State::DcsEntry {
                        self.collect(byte);
                        self.state = State::DcsParam;
                    } else {
                        self.state = State::DcsIgnore;
                    }
                }
                0x40..=0x7E => self.dcs_hook(performer, byte),
                _ => {}
            },

            State::DcsIntermediate => match byte {
                0x00..=0x1F => {}
                0x20..=0x2F => self.collect(byte),
                0x30..=0x3F => self.state = State::DcsIgnore,
                0x40..=0x7E => self.dcs_hook(performer, byte),
                _ => {}
            },

            State::DcsPassthrough => match byte {
                0x9C => {
                    performer.unhook();
                    self.state = State::Ground;
                }
                0x7F => {}
                _ => performer.put(byte),
            },

            State::DcsIgnore => {
                if byte == 0x9C {
                    self.state = State::Ground;
                }
            }

            State::OscString => match byte {
                // BEL terminates per the xterm convention.
                0x07 => {
                    self.osc_end(performer, true);
                    self.state = State::Ground;
                }
                0x9C => {
                    self.osc_end(performer, false);
                    self.state = State::Ground;
                }
                0x00..=0x1F => {}
                _ => self.osc_put(byte),
            },

            State::SosPmApcString => {
                if byte == 0x9C {
                    self.state = State::Ground;
                }
            }
        }
    }

    /// ESC received: terminate any string in flight, then (re)enter the
    /// escape state. A following `\` completes ST and dispatches as a
    /// plain ESC final, which interpreters ignore.
    fn enter_escape<P: Perform>(&mut self, performer: &mut P) {
        self.abort_sequence_dispatching(performer);
        self.clear_sequence();
        self.state = State::Escape;
    }

    /// Terminate in-flight strings without dispatching (CAN/SUB path).
    fn abort_sequence<P: Perform>(&mut self, performer: &mut P) {
        if self.state == State::DcsPassthrough {
            performer.unhook();
        }
    }

    /// Terminate in-flight strings, dispatching what VT500 semantics
    /// consider complete (ESC acting as the first half of ST).
    fn abort_sequence_dispatching<P: Perform>(&mut self, performer: &mut P) {
        match self.state {
            State::DcsPassthrough => performer.unhook(),
            State::OscString => self.osc_end(performer, false),
            _ => {}
        }
    }

    fn clear_sequence(&mut self) {
        self.intermediate_idx = 0;
        self.ignoring = false;
        self.params.clear();
        self.param = 0;
        self.param_is_sub = false;
    }

    fn intermediates(&self) -> &[u8] {
        &self.intermediates[..self.intermediate_idx]
    }

    fn collect(&mut self, byte: u8) {
        if self.intermediate_idx == MAX_INTERMEDIATES {
            self.ignoring = true;
        } else {
            self.intermediates[self.intermediate_idx] = byte;
            self.intermediate_idx += 1;
        }
    }

    fn param_digit(&mut self, digit: u8) {
        self.param = self.param.saturating_mul(10).saturating_add(digit as u16);
    }

    fn param_separator(&mut self, next_is_sub: bool) {
        self.commit_param();
        self.param_is_sub = next_is_sub;
    }

    fn commit_param(&mut self) {
        if self.param_is_sub {
            self.params.extend(self.param);
        } else {
            self.params.push(self.param);
        }
        self.param = 0;
    }

    fn dcs_hook<P: Perform>(&mut self, performer: &mut P, byte: u8) {
        self.commit_param();
        performer.hook(
            &self.params,
            &self.intermediates[..self.intermediate_idx],
            self.ignoring,
            byte as char,
        );
        self.state = State::DcsPassthrough;
    }

    fn osc_start(&mut self) {
        self.osc_raw.clear();
        self.osc_num_params = 0;
        self.osc_param_start = 0;
    }

    fn osc_put(&mut self, byte: u8) {
        if byte == b';' && self.osc_num_params < MAX_OSC_PARAMS - 1 {
            self.osc_params[self.osc_num_params] = (self.osc_param_start, self.osc_raw.len());
            self.osc_num_params += 1;
            self.osc_param_start = self.osc_raw.len();
            return;
        }
        if self.osc_raw.len() < MAX_OSC_RAW {
            self.osc_raw.push(byte);
        }
    }

    fn osc_end<P: Perform>(&mut self, performer: &mut P, bell_terminated: bool) {
        let mut slices: [&[u8]; MAX_OSC_PARAMS] = [&[]; MAX_OSC_PARAMS];
        for (i, &(start, end)) in self.osc_params[..self.osc_num_params].iter().enumerate() {
            slices[i] = &self.osc_raw[start..end];
        }
        slices[self.osc_num_params] = &self.osc_raw[self.osc_param_start..];
        performer.osc_dispatch(&slices[..self.osc_num_params + 1], bell_terminated);
    }

    fn utf8_advance<P: Perform>(&mut self, performer: &mut P, byte: u8) {
        match self.utf8.decode(byte) {
            Utf8Step::Pending => {}
            Utf8Step::Produced(c) => performer.print(c),
            Utf8Step::Invalid => performer.print('\u{FFFD}'),
            Utf8Step::InvalidReprocess => {
                performer.print('\u{FFFD}');
                self.advance_byte(performer, byte);
            }
        }
    }
}
