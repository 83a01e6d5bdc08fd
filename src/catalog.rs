//! Command catalog parsing.
//!
//! The catalog is a plain text file. A line starting with `//` opens a named
//! section, blank lines inside a section become spacers, and every other line
//! is a literal command:
//!
//! ```text
//! // SYSTEM
//! *IDN?
//! *RST
//!
//! SYST:ERR?
//! ```

use std::path::Path;
use tracing::{debug, warn};

/// Marker that opens a new section.
const SECTION_MARKER: &str = "//";

/// Section that collects commands appearing before any marker.
pub const DEFAULT_SECTION: &str = "GENERAL";

/// Command placed in the fallback catalog.
pub const DEFAULT_COMMAND: &str = "*IDN?";

/// A single catalog line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// Literal command text. May be empty, meaning an editable empty slot.
    Command(String),
    /// Blank vertical space in the UI. Never sent.
    Spacer,
}

impl Entry {
    /// Build a command entry.
    pub fn command(text: impl Into<String>) -> Self {
        Entry::Command(text.into())
    }
}

/// A named, ordered group of entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub entries: Vec<Entry>,
}

/// Ordered mapping of section name to entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    sections: Vec<Section>,
}

impl Catalog {
    /// The fallback catalog: one `GENERAL` section holding `*IDN?`.
    pub fn fallback() -> Self {
        Self {
            sections: vec![Section {
                name: DEFAULT_SECTION.to_string(),
                entries: vec![Entry::command(DEFAULT_COMMAND)],
            }],
        }
    }

    /// Load a catalog from disk.
    ///
    /// Never fails: a missing, unreadable, non-UTF-8 or empty file yields
    /// [`Catalog::fallback`].
    pub fn load(path: &Path) -> Self {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Could not read catalog {}: {}", path.display(), e);
                return Self::fallback();
            }
        };

        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => {
                warn!("Catalog {} is not valid UTF-8: {}", path.display(), e);
                return Self::fallback();
            }
        };

        let catalog = parse(&text);
        if catalog.is_empty() {
            debug!("Catalog {} has no sections, using fallback", path.display());
            return Self::fallback();
        }
        catalog
    }

    /// Sections in file order.
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Look up a section by name.
    #[cfg(test)]
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Whether the catalog has no sections at all.
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Return the entries of `name`, creating the section at the end if needed.
    fn entries_mut(&mut self, name: &str) -> &mut Vec<Entry> {
        let index = match self.sections.iter().position(|s| s.name == name) {
            Some(index) => index,
            None => {
                self.sections.push(Section {
                    name: name.to_string(),
                    entries: Vec::new(),
                });
                self.sections.len() - 1
            }
        };
        &mut self.sections[index].entries
    }
}

/// Parse catalog text.
pub fn parse(text: &str) -> Catalog {
    let mut catalog = Catalog::default();
    let mut current = DEFAULT_SECTION.to_string();
    let mut in_section = false;

    // `lines` strips "\n" and "\r\n"; a lone trailing "\r" is removed below.
    for raw in text.lines() {
        let line = raw.trim_end_matches(['\r', '\n']);
        let trimmed = line.trim();

        if let Some(name) = trimmed.strip_prefix(SECTION_MARKER) {
            current = name.trim().to_string();
            catalog.entries_mut(&current);
            in_section = true;
        } else if trimmed.is_empty() {
            if in_section {
                catalog.entries_mut(&current).push(Entry::Spacer);
            }
        } else {
            catalog.entries_mut(&current).push(Entry::command(line));
            in_section = true;
        }
    }

    catalog
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn names(catalog: &Catalog) -> Vec<&str> {
        catalog.sections().iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_parse_sections_and_spacers() {
        let catalog = parse("// A\ncmd1\n\ncmd2\n// B\ncmd3");
        assert_eq!(names(&catalog), vec!["A", "B"]);
        assert_eq!(
            catalog.section("A").unwrap().entries,
            vec![Entry::command("cmd1"), Entry::Spacer, Entry::command("cmd2")]
        );
        assert_eq!(catalog.section("B").unwrap().entries, vec![Entry::command("cmd3")]);
    }

    #[test]
    fn test_parse_commands_before_marker_go_to_general() {
        let catalog = parse("*IDN?\n// OUTPUT\nOUTP ON");
        assert_eq!(names(&catalog), vec!["GENERAL", "OUTPUT"]);
        assert_eq!(
            catalog.section("GENERAL").unwrap().entries,
            vec![Entry::command("*IDN?")]
        );
    }

    #[test]
    fn test_parse_leading_blank_lines_ignored() {
        let catalog = parse("\n\n   \n// A\ncmd");
        assert_eq!(names(&catalog), vec!["A"]);
        assert_eq!(catalog.section("A").unwrap().entries, vec![Entry::command("cmd")]);
    }

    #[test]
    fn test_parse_repeated_section_appends() {
        let catalog = parse("// A\none\n// B\ntwo\n//A\nthree");
        assert_eq!(names(&catalog), vec!["A", "B"]);
        assert_eq!(
            catalog.section("A").unwrap().entries,
            vec![Entry::command("one"), Entry::command("three")]
        );
    }

    #[test]
    fn test_parse_keeps_interior_whitespace_and_strips_terminators() {
        let catalog = parse("// A\r\nSOUR:VOLT  1.5\r\n");
        assert_eq!(
            catalog.section("A").unwrap().entries,
            vec![Entry::command("SOUR:VOLT  1.5")]
        );
    }

    #[test]
    fn test_parse_section_name_trimmed() {
        let catalog = parse("   //   MEASURE   \nMEAS:VOLT?");
        assert_eq!(names(&catalog), vec!["MEASURE"]);
    }

    #[test]
    fn test_parse_empty_text() {
        assert!(parse("").is_empty());
        assert!(parse("\n\n").is_empty());
    }

    #[test]
    fn test_parse_marker_only_section_is_kept() {
        let catalog = parse("// EMPTY\n// FULL\n*RST");
        assert_eq!(names(&catalog), vec!["EMPTY", "FULL"]);
        assert!(catalog.section("EMPTY").unwrap().entries.is_empty());
    }

    #[test]
    fn test_load_missing_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::load(&dir.path().join("COMMANDS.txt"));
        assert_eq!(catalog, Catalog::fallback());
        assert_eq!(
            catalog.section(DEFAULT_SECTION).unwrap().entries,
            vec![Entry::command(DEFAULT_COMMAND)]
        );
    }

    #[test]
    fn test_load_invalid_utf8_falls_back() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0x2f, 0x2f, 0xff, 0xfe, 0x0a]).unwrap();
        assert_eq!(Catalog::load(file.path()), Catalog::fallback());
    }

    #[test]
    fn test_load_empty_file_falls_back() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert_eq!(Catalog::load(file.path()), Catalog::fallback());
    }

    #[test]
    fn test_load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "// SYSTEM\n*IDN?\n*RST").unwrap();
        let catalog = Catalog::load(file.path());
        assert_eq!(names(&catalog), vec!["SYSTEM"]);
        assert_eq!(catalog.section("SYSTEM").unwrap().entries.len(), 2);
    }
}
