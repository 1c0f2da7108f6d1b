use std::collections::HashMap;

/// Interned handle to a hyperlink target. Cells store only this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HyperlinkId(u32);

#[derive(Debug)]
struct Entry {
    uri: String,
    refs: usize,
}

/// Reference-counted hyperlink table fed by OSC 8.
///
/// Links are interned by `(id-param, uri)` so a link split across writes
/// (or re-opened with the same explicit id) resolves to one entry. An
/// entry lives while the sequence keeps it active or any cell references
/// it; scrollback eviction and overwrites drop references.
#[derive(Debug, Default)]
pub struct Hyperlinks {
    entries: HashMap<u32, Entry>,
    by_key: HashMap<(String, String), u32>,
    next_id: u32,
}

impl Hyperlinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a link and take one reference for the opener.
    pub fn open(&mut self, id_param: &str, uri: &str) -> HyperlinkId {
        let key = (id_param.to_string(), uri.to_string());
        if let Some(&id) = self.by_key.get(&key) {
            if let Some(entry) = self.entries.get_mut(&id) {
                entry.refs += 1;
                return HyperlinkId(id);
            }
        }
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.entries.insert(
            id,
            Entry {
                uri: uri.to_string(),
                refs: 1,
            },
        );
        self.by_key.insert(key, id);
        HyperlinkId(id)
    }

    pub fn uri(&self, id: HyperlinkId) -> Option<&str> {
        self.entries.get(&id.0).map(|e| e.uri.as_str())
    }

    pub fn incref(&mut self, id: HyperlinkId) {
        if let Some(entry) = self.entries.get_mut(&id.0) {
            entry.refs += 1;
        }
    }

    pub fn decref(&mut self, id: HyperlinkId) {
        let remove = match self.entries.get_mut(&id.0) {
            Some(entry) => {
                entry.refs = entry.refs.saturating_sub(1);
                entry.refs == 0
            }
            None => false,
        };
        if remove {
            self.entries.remove(&id.0);
            self.by_key.retain(|_, v| *v != id.0);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_interns_to_one_entry() {
        let mut links = Hyperlinks::new();
        let a = links.open("id1", "https://example.com");
        let b = links.open("id1", "https://example.com");
        assert_eq!(a, b);
        assert_eq!(links.len(), 1);
    }

    #[test]
    fn distinct_uris_get_distinct_ids() {
        let mut links = Hyperlinks::new();
        let a = links.open("", "https://a.example");
        let b = links.open("", "https://b.example");
        assert_ne!(a, b);
        assert_eq!(links.len(), 2);
    }

    #[test]
    fn entry_released_when_last_reference_drops() {
        let mut links = Hyperlinks::new();
        let id = links.open("", "https://example.com");
        links.incref(id); // a cell
        links.decref(id); // sequence closed
        assert_eq!(links.uri(id), Some("https://example.com"));
        links.decref(id); // cell overwritten
        assert_eq!(links.uri(id), None);
        assert!(links.is_empty());
    }
}
