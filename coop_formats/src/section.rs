use std::fmt::Write as _;

use anyhow::Result;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SectionError {
    #[error("no record '{key}' in section [{section}]")]
    NotFound { section: String, key: String },
    #[error("record index {index} out of range in section [{section}]")]
    IndexOutOfRange { section: String, index: usize },
}

#[derive(Debug, Clone, PartialEq)]
struct Section {
    name: String,
    records: Vec<(String, String)>,
}

/// In-memory mission description: ordered sections of ordered
/// key/value records. Duplicate keys are legal and addressed by
/// position, which is how waypoint lists stay sequenced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectionFile {
    sections: Vec<Section>,
}

impl SectionFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the bracketed-section text form. The key of a record is
    /// the first whitespace-delimited token, the value is the rest of
    /// the line.
    pub fn parse(input: &str) -> Result<Self> {
        let mut file = SectionFile::new();
        let mut current: Option<usize> = None;

        for raw_line in input.lines() {
            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                file.sections.push(Section {
                    name: name.trim().to_string(),
                    records: Vec::new(),
                });
                current = Some(file.sections.len() - 1);
                continue;
            }

            let Some(index) = current else {
                // Records before the first header carry no section; skip.
                continue;
            };

            let mut parts = line.splitn(2, char::is_whitespace);
            let key = parts.next().unwrap_or_default().to_string();
            let value = parts.next().unwrap_or_default().trim().to_string();
            file.sections[index].records.push((key, value));
        }

        Ok(file)
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            let _ = writeln!(out, "[{}]", section.name);
            for (key, value) in &section.records {
                if value.is_empty() {
                    let _ = writeln!(out, "  {key}");
                } else {
                    let _ = writeln!(out, "  {key} {value}");
                }
            }
        }
        out
    }

    fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    fn section_mut(&mut self, name: &str) -> Option<&mut Section> {
        self.sections.iter_mut().find(|s| s.name == name)
    }

    fn ensure_section(&mut self, name: &str) -> &mut Section {
        if self.section(name).is_none() {
            self.sections.push(Section {
                name: name.to_string(),
                records: Vec::new(),
            });
        }
        self.section_mut(name).expect("section just ensured")
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|s| s.name.as_str())
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.section(name).is_some()
    }

    /// Number of records in a section; 0 when the section is absent.
    pub fn lines(&self, name: &str) -> usize {
        self.section(name).map_or(0, |s| s.records.len())
    }

    /// Record at a position within a section.
    pub fn get(&self, name: &str, index: usize) -> Result<(&str, &str), SectionError> {
        self.section(name)
            .and_then(|s| s.records.get(index))
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .ok_or_else(|| SectionError::IndexOutOfRange {
                section: name.to_string(),
                index,
            })
    }

    /// First value stored under a key within a section.
    pub fn value_of(&self, name: &str, key: &str) -> Result<&str, SectionError> {
        self.section(name)
            .and_then(|s| s.records.iter().find(|(k, _)| k == key))
            .map(|(_, v)| v.as_str())
            .ok_or_else(|| SectionError::NotFound {
                section: name.to_string(),
                key: key.to_string(),
            })
    }

    pub fn exist(&self, name: &str, key: &str) -> bool {
        self.value_of(name, key).is_ok()
    }

    /// Replace the first record under `key`, appending (and creating
    /// the section) when no such record exists yet.
    pub fn set(&mut self, name: &str, key: &str, value: &str) {
        let section = self.ensure_section(name);
        match section.records.iter_mut().find(|(k, _)| k == key) {
            Some(record) => record.1 = value.to_string(),
            None => section.records.push((key.to_string(), value.to_string())),
        }
    }

    /// Engine convention for booleans is `1`/`0`.
    pub fn set_flag(&mut self, name: &str, key: &str, value: bool) {
        self.set(name, key, if value { "1" } else { "0" });
    }

    /// Append a record regardless of existing keys.
    pub fn add(&mut self, name: &str, key: &str, value: &str) {
        self.ensure_section(name)
            .records
            .push((key.to_string(), value.to_string()));
    }

    /// Drop a whole section; no-op when absent.
    pub fn delete(&mut self, name: &str) {
        self.sections.retain(|s| s.name != name);
    }
}
