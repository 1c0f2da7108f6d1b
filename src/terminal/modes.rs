/// DECRQM answer values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeStatus {
    NotRecognized = 0,
    Set = 1,
    Reset = 2,
    PermanentlySet = 3,
    PermanentlyReset = 4,
}

impl ModeStatus {
    pub fn code(self) -> u16 {
        self as u16
    }

    fn from_bool(set: bool) -> Self {
        if set {
            ModeStatus::Set
        } else {
            ModeStatus::Reset
        }
    }
}

/// Terminal mode flags tracking the ANSI and DEC private modes the screen
/// and input encoder consult.
#[derive(Debug, Clone)]
pub struct Modes {
    /// DECCKM (?1): application cursor keys.
    pub cursor_keys_application: bool,
    /// DECCOLM (?3): 132-column mode requested.
    pub column_132: bool,
    /// DECSCNM (?5): reverse video.
    pub reverse_video: bool,
    /// DECOM (?6): origin mode.
    pub origin: bool,
    /// DECAWM (?7): auto-wrap.
    pub autowrap: bool,
    /// X10 mouse reporting (?9): press only.
    pub x10_mouse: bool,
    /// DECNKM (?66) / DECKPAM: application keypad.
    pub keypad_application: bool,
    /// DECLRMM (?69): left/right margin mode.
    pub left_right_margins: bool,
    /// VT200 mouse (?1000): press and release.
    pub mouse_click: bool,
    /// Button-event mouse (?1002): motion while a button is held.
    pub mouse_motion: bool,
    /// Any-event mouse (?1003): all motion.
    pub mouse_all_motion: bool,
    /// Focus reporting (?1004).
    pub focus_events: bool,
    /// UTF-8 mouse coordinate encoding (?1005).
    pub utf8_mouse: bool,
    /// SGR mouse coordinate encoding (?1006).
    pub sgr_mouse: bool,
    /// Alternate scroll (?1007): wheel sends arrows on the alt screen.
    pub alternate_scroll: bool,
    /// URXVT mouse coordinate encoding (?1015).
    pub urxvt_mouse: bool,
    /// Alternate screen active (?47/?1047/?1049).
    pub alt_screen: bool,
    /// Bracketed paste (?2004).
    pub bracketed_paste: bool,
    /// Synchronized output (?2026).
    pub synchronized_output: bool,
    /// IRM (4): insert mode.
    pub insert: bool,
    /// LNM (20): linefeed implies carriage return.
    pub linefeed_newline: bool,
    /// XTMODKEYS modifyOtherKeys level (0, 1, or 2).
    pub modify_other_keys: u8,
}

impl Default for Modes {
    fn default() -> Self {
        Self {
            cursor_keys_application: false,
            column_132: false,
            reverse_video: false,
            origin: false,
            autowrap: true,
            x10_mouse: false,
            keypad_application: false,
            left_right_margins: false,
            mouse_click: false,
            mouse_motion: false,
            mouse_all_motion: false,
            focus_events: false,
            utf8_mouse: false,
            sgr_mouse: false,
            alternate_scroll: false,
            urxvt_mouse: false,
            alt_screen: false,
            bracketed_paste: false,
            synchronized_output: false,
            insert: false,
            linefeed_newline: false,
            modify_other_keys: 0,
        }
    }
}

impl Modes {
    /// DECRQM (`CSI ? Pd $ p`) status for a DEC private mode. The
    /// `cursor_*` arguments supply the live DECTCEM/blink flags and the
    /// DECSC save-slot state, which live on the cursor rather than here.
    pub fn dec_mode_status(
        &self,
        mode: u16,
        cursor_visible: bool,
        cursor_blink: bool,
        cursor_saved: bool,
    ) -> ModeStatus {
        match mode {
            1 => ModeStatus::from_bool(self.cursor_keys_application),
            3 => ModeStatus::from_bool(self.column_132),
            5 => ModeStatus::from_bool(self.reverse_video),
            6 => ModeStatus::from_bool(self.origin),
            7 => ModeStatus::from_bool(self.autowrap),
            9 => ModeStatus::from_bool(self.x10_mouse),
            12 => ModeStatus::from_bool(cursor_blink),
            25 => ModeStatus::from_bool(cursor_visible),
            66 => ModeStatus::from_bool(self.keypad_application),
            69 => ModeStatus::from_bool(self.left_right_margins),
            47 | 1047 | 1049 => ModeStatus::from_bool(self.alt_screen),
            1000 => ModeStatus::from_bool(self.mouse_click),
            1002 => ModeStatus::from_bool(self.mouse_motion),
            1003 => ModeStatus::from_bool(self.mouse_all_motion),
            1004 => ModeStatus::from_bool(self.focus_events),
            1005 => ModeStatus::from_bool(self.utf8_mouse),
            1006 => ModeStatus::from_bool(self.sgr_mouse),
            1007 => ModeStatus::from_bool(self.alternate_scroll),
            1015 => ModeStatus::from_bool(self.urxvt_mouse),
            1048 => ModeStatus::from_bool(cursor_saved),
            2004 => ModeStatus::from_bool(self.bracketed_paste),
            2026 => ModeStatus::from_bool(self.synchronized_output),
            _ => ModeStatus::NotRecognized,
        }
    }

    /// DECRQM (`CSI Pd $ p`) status for an ANSI mode.
    pub fn ansi_mode_status(&self, mode: u16) -> ModeStatus {
        match mode {
            4 => ModeStatus::from_bool(self.insert),
            20 => ModeStatus::from_bool(self.linefeed_newline),
            _ => ModeStatus::NotRecognized,
        }
    }

    /// Whether any mouse reporting protocol is active.
    pub fn mouse_reporting(&self) -> bool {
        self.x10_mouse || self.mouse_click || self.mouse_motion || self.mouse_all_motion
    }
}
