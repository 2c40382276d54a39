use std::collections::HashMap;

/// Synthetic record type keying classification verdicts. It never appears on
/// the wire; it only keeps verdict rows distinct from any real record type a
/// future cache might share the map with.
pub const VERDICT_KIND: u16 = 256;

struct Verdict {
    blocked: bool,
    ttl: u32,
}

/// Per-name classification results, aged by the 1 Hz tick.
pub struct VerdictCache {
    entries: HashMap<(String, u16), Verdict>,
    initial_ttl: u32,
}

impl VerdictCache {
    pub fn new(initial_ttl: u32) -> Self {
        Self {
            entries: HashMap::new(),
            initial_ttl,
        }
    }

    /// Record a verdict. The first verdict for a name wins; duplicates are
    /// refused and reported as `false`.
    pub fn insert(&mut self, name: &str, kind: u16, blocked: bool) -> bool {
        let key = (name.to_ascii_lowercase(), kind);
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(
            key,
            Verdict {
                blocked,
                ttl: self.initial_ttl,
            },
        );
        true
    }

    pub fn search(&self, name: &str, kind: u16) -> Option<bool> {
        self.entries
            .get(&(name.to_ascii_lowercase(), kind))
            .map(|verdict| verdict.blocked)
    }

    /// Age every entry, evicting the expired ones. Expiry is per entry;
    /// neighbors with time left stay untouched.
    pub fn tick(&mut self) {
        self.entries.retain(|_, verdict| {
            verdict.ttl = verdict.ttl.saturating_sub(1);
            verdict.ttl > 0
        });
    }
}
