//! In-memory property index with exact and nearest-number lookup.
//!
//! The index holds an immutable [`RegistrySnapshot`] behind an `Arc`. A reload
//! builds the complete replacement off-lock and swaps the pointer, so readers
//! either see the old set or the new one, never a mix.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use tenantline_core::types::Timestamp;
use tracing::{info, warn};

use crate::error::RegistryError;
use crate::normalize::{normalize_street, normalize_unit};
use crate::property::PropertyRecord;

/// One scored candidate from a nearest-number lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct NearestMatch {
    pub record: PropertyRecord,
    /// Banded proximity score: 10.0, 8.0, 6.0, 4.0 or 2.0.
    pub score: f64,
    /// Absolute difference between spoken and registered street numbers.
    pub distance: u32,
    /// Street-name similarity in 0.0 - 1.0.
    pub similarity: f64,
}

/// Map a numeric distance onto the proximity bands. `None` means too far.
pub fn band_score(distance: u32) -> Option<f64> {
    match distance {
        0 => Some(10.0),
        1..=2 => Some(8.0),
        3..=5 => Some(6.0),
        6..=10 => Some(4.0),
        11..=20 => Some(2.0),
        _ => None,
    }
}

/// Similarity between two normalized street names.
///
/// Identical names score 1.0; a name whose tokens are an in-order prefix of the
/// other's scores at least 0.9; otherwise normalized edit distance.
pub fn street_similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let max_len = a.chars().count().max(b.chars().count()) as f64;
    let edit = 1.0 - levenshtein(a, b) as f64 / max_len;

    let a_tokens: Vec<&str> = a.split(' ').collect();
    let b_tokens: Vec<&str> = b.split(' ').collect();
    let (short, long) = if a_tokens.len() <= b_tokens.len() {
        (&a_tokens, &b_tokens)
    } else {
        (&b_tokens, &a_tokens)
    };
    if long.starts_with(short) {
        return edit.max(0.9);
    }
    edit
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// An immutable, fully built set of properties.
#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    records: Vec<PropertyRecord>,
    by_street: HashMap<String, Vec<usize>>,
    loaded_at: Option<Timestamp>,
}

impl RegistrySnapshot {
    fn build(records: Vec<PropertyRecord>) -> Self {
        let mut seen = HashSet::new();
        let mut kept = Vec::with_capacity(records.len());
        for record in records {
            let key = (
                record.street_number,
                record.street_name.clone(),
                record.unit.clone(),
            );
            if seen.insert(key) {
                kept.push(record);
            } else {
                warn!(address = %record.full_address, "Duplicate property record ignored");
            }
        }

        let mut by_street: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, record) in kept.iter().enumerate() {
            by_street
                .entry(record.street_name.clone())
                .or_default()
                .push(i);
        }

        Self {
            records: kept,
            by_street,
            loaded_at: Some(Timestamp::now()),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn loaded_at(&self) -> Option<Timestamp> {
        self.loaded_at
    }

    pub fn records(&self) -> &[PropertyRecord] {
        &self.records
    }

    /// All records at a number on an (already normalized) street, any unit.
    pub fn records_at(&self, street_number: u32, street_name: &str) -> Vec<&PropertyRecord> {
        self.by_street
            .get(street_name)
            .map(|ids| {
                ids.iter()
                    .map(|&i| &self.records[i])
                    .filter(|r| r.street_number == street_number)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Exact lookup on an already normalized street. `unit = None` matches
    /// only a record without a unit.
    pub fn find_exact(
        &self,
        street_number: u32,
        street_name: &str,
        unit: Option<&str>,
    ) -> Option<&PropertyRecord> {
        let unit = unit.map(normalize_unit).filter(|u| !u.is_empty());
        self.records_at(street_number, street_name)
            .into_iter()
            .find(|r| r.unit == unit)
    }

    /// Nearest records by street number on streets passing the similarity gate.
    ///
    /// Ordered by score, then street similarity, then distance, then street number.
    pub fn find_nearest(
        &self,
        street_number: u32,
        street_name: &str,
        k: usize,
        similarity_threshold: f64,
    ) -> Vec<NearestMatch> {
        let mut matches = Vec::new();
        for (street, ids) in &self.by_street {
            let similarity = street_similarity(street_name, street);
            if similarity < similarity_threshold {
                continue;
            }
            for &i in ids {
                let record = &self.records[i];
                let distance = record.street_number.abs_diff(street_number);
                if let Some(score) = band_score(distance) {
                    matches.push(NearestMatch {
                        record: record.clone(),
                        score,
                        distance,
                        similarity,
                    });
                }
            }
        }

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    b.similarity
                        .partial_cmp(&a.similarity)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.distance.cmp(&b.distance))
                .then_with(|| a.record.street_number.cmp(&b.record.street_number))
                .then_with(|| a.record.unit.cmp(&b.record.unit))
        });
        matches.truncate(k);
        matches
    }
}

/// Shared property index. Reload is the only writer.
#[derive(Debug)]
pub struct PropertyIndex {
    current: RwLock<Arc<RegistrySnapshot>>,
    similarity_threshold: f64,
}

impl PropertyIndex {
    /// Create an empty index with the given street-similarity gate.
    pub fn new(similarity_threshold: f64) -> Self {
        Self {
            current: RwLock::new(Arc::new(RegistrySnapshot::default())),
            similarity_threshold: similarity_threshold.clamp(0.0, 1.0),
        }
    }

    pub fn similarity_threshold(&self) -> f64 {
        self.similarity_threshold
    }

    /// Replace the whole record set. Returns the number of records kept after
    /// duplicate removal.
    pub fn load(&self, records: Vec<PropertyRecord>) -> Result<usize, RegistryError> {
        let snapshot = Arc::new(RegistrySnapshot::build(records));
        let count = snapshot.len();
        let mut current = self
            .current
            .write()
            .map_err(|e| RegistryError::Lock(e.to_string()))?;
        *current = snapshot;
        info!(properties = count, "Property index loaded");
        Ok(count)
    }

    /// The current snapshot. Holding it pins that version across a reload.
    pub fn snapshot(&self) -> Result<Arc<RegistrySnapshot>, RegistryError> {
        let current = self
            .current
            .read()
            .map_err(|e| RegistryError::Lock(e.to_string()))?;
        Ok(Arc::clone(&current))
    }

    pub fn find_exact(
        &self,
        street_number: u32,
        street_name: &str,
        unit: Option<&str>,
    ) -> Result<Option<PropertyRecord>, RegistryError> {
        let snapshot = self.snapshot()?;
        let street = normalize_street(street_name);
        Ok(snapshot
            .find_exact(street_number, &street, unit)
            .cloned())
    }

    pub fn find_nearest(
        &self,
        street_number: u32,
        street_name: &str,
        k: usize,
    ) -> Result<Vec<NearestMatch>, RegistryError> {
        let snapshot = self.snapshot()?;
        let street = normalize_street(street_name);
        Ok(snapshot.find_nearest(street_number, &street, k, self.similarity_threshold))
    }

    /// Number of records currently loaded.
    pub fn len(&self) -> usize {
        self.current.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PropertyIndex {
    fn default() -> Self {
        Self::new(0.8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(number: u32, street: &str) -> PropertyRecord {
        PropertyRecord::new(number, street, None, format!("{} {}", number, street))
    }

    fn unit_rec(number: u32, street: &str, unit: &str) -> PropertyRecord {
        PropertyRecord::new(
            number,
            street,
            Some(unit),
            format!("{} {}, Apt {}", number, street, unit),
        )
    }

    fn loaded(records: Vec<PropertyRecord>) -> PropertyIndex {
        let index = PropertyIndex::default();
        index.load(records).unwrap();
        index
    }

    // ---- scoring helpers ----

    #[test]
    fn test_band_score_edges() {
        assert_eq!(band_score(0), Some(10.0));
        assert_eq!(band_score(2), Some(8.0));
        assert_eq!(band_score(3), Some(6.0));
        assert_eq!(band_score(5), Some(6.0));
        assert_eq!(band_score(10), Some(4.0));
        assert_eq!(band_score(11), Some(2.0));
        assert_eq!(band_score(20), Some(2.0));
        assert_eq!(band_score(21), None);
    }

    #[test]
    fn test_street_similarity() {
        assert_eq!(street_similarity("cary", "cary"), 1.0);
        assert!(street_similarity("cary", "carey") >= 0.8);
        assert!(street_similarity("port richmond", "richmond") < 0.8);
        assert!(street_similarity("richmond", "richmond terrace") >= 0.9);
        assert!(street_similarity("alaska", "targee") < 0.5);
        assert_eq!(street_similarity("", "cary"), 0.0);
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    // ---- load ----

    #[test]
    fn test_load_replaces_wholesale() {
        let index = loaded(vec![rec(29, "Port Richmond Ave"), rec(31, "Port Richmond Ave")]);
        assert_eq!(index.len(), 2);

        index.load(vec![rec(28, "Alaska Street")]).unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.find_exact(29, "port richmond", None).unwrap().is_none());
        assert!(index.find_exact(28, "alaska", None).unwrap().is_some());
    }

    #[test]
    fn test_load_drops_duplicates() {
        let index = PropertyIndex::default();
        let count = index
            .load(vec![
                rec(28, "Alaska Street"),
                rec(28, "alaska st"),
                unit_rec(28, "Alaska Street", "2"),
            ])
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_snapshot_survives_reload() {
        let index = loaded(vec![rec(1, "Main Street")]);
        let pinned = index.snapshot().unwrap();
        index.load(vec![]).unwrap();
        assert_eq!(pinned.len(), 1);
        assert!(index.is_empty());
    }

    #[test]
    fn test_concurrent_readers_never_see_partial_set() {
        let small: Vec<PropertyRecord> = (1..=50).map(|n| rec(n, "Cary Avenue")).collect();
        let large: Vec<PropertyRecord> = (1..=500).map(|n| rec(n, "Cary Avenue")).collect();
        let index = Arc::new(loaded(small.clone()));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let index = Arc::clone(&index);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let len = index.snapshot().unwrap().len();
                        assert!(len == 50 || len == 500, "partial index observed: {}", len);
                    }
                })
            })
            .collect();

        for i in 0..50 {
            let records = if i % 2 == 0 { large.clone() } else { small.clone() };
            index.load(records).unwrap();
        }
        for reader in readers {
            reader.join().unwrap();
        }
    }

    // ---- exact lookup ----

    #[test]
    fn test_find_exact_normalizes_street() {
        let index = loaded(vec![rec(28, "Alaska Street")]);
        let found = index.find_exact(28, "ALASKA ST.", None).unwrap().unwrap();
        assert_eq!(found.full_address, "28 Alaska Street");
        assert!(index.find_exact(27, "alaska", None).unwrap().is_none());
    }

    #[test]
    fn test_find_exact_units() {
        let index = loaded(vec![
            unit_rec(122, "Targee St", "1A"),
            unit_rec(122, "Targee St", "1B"),
        ]);
        assert!(index.find_exact(122, "targee", None).unwrap().is_none());
        let found = index.find_exact(122, "targee", Some("apt 1b")).unwrap().unwrap();
        assert_eq!(found.unit.as_deref(), Some("1b"));
    }

    // ---- nearest lookup ----

    #[test]
    fn test_nearest_prefers_smaller_distance_band() {
        let index = loaded(vec![
            rec(25, "Port Richmond Ave"),
            rec(29, "Port Richmond Ave"),
            rec(31, "Port Richmond Ave"),
        ]);
        let hits = index.find_nearest(40, "port richmond avenue", 3).unwrap();
        let numbers: Vec<u32> = hits.iter().map(|h| h.record.street_number).collect();
        assert_eq!(numbers, vec![31, 29, 25]);
        assert_eq!(hits[0].score, 4.0);
        assert_eq!(hits[0].distance, 9);
        assert_eq!(hits[1].score, 2.0);
        assert_eq!(hits[1].distance, 11);
    }

    #[test]
    fn test_nearest_tie_breaks_on_lower_number() {
        let index = loaded(vec![rec(629, "Cary Avenue"), rec(627, "Cary Avenue")]);
        let hits = index.find_nearest(628, "cary", 3).unwrap();
        let numbers: Vec<u32> = hits.iter().map(|h| h.record.street_number).collect();
        assert_eq!(numbers, vec![627, 629]);
        assert!(hits.iter().all(|h| h.score == 8.0));
    }

    #[test]
    fn test_nearest_tie_breaks_on_similarity_first() {
        let index = loaded(vec![rec(101, "Carey Avenue"), rec(99, "Cary Avenue")]);
        let hits = index.find_nearest(100, "cary", 3).unwrap();
        assert_eq!(hits[0].record.street_name, "cary");
        assert_eq!(hits[1].record.street_name, "carey");
    }

    #[test]
    fn test_nearest_requires_street_gate() {
        let index = loaded(vec![rec(40, "Targee Street")]);
        assert!(index.find_nearest(40, "port richmond", 3).unwrap().is_empty());
    }

    #[test]
    fn test_nearest_excludes_distant_numbers() {
        let index = loaded(vec![rec(100, "Cary Avenue"), rec(121, "Cary Avenue")]);
        let hits = index.find_nearest(100, "cary", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].score, 10.0);
    }

    #[test]
    fn test_nearest_truncates_to_k() {
        let records = (1..=10).map(|n| rec(n, "Cary Avenue")).collect();
        let index = loaded(records);
        assert_eq!(index.find_nearest(5, "cary", 3).unwrap().len(), 3);
    }
}
