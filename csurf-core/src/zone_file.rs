//! Zone file (`.zon`) reading: the pre-pass catalog and the full definition
//! of the first zone in a file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use csurf_types::ZoneInfo;

use crate::error::{Diagnostic, ZoneError};
use crate::template::TemplateDictionary;
use crate::tokenizer::{is_ignorable, tokenize, trim_line};

pub const BEGIN_AUTO_SECTION: &str = "#Begin auto generated section";
pub const END_AUTO_SECTION: &str = "#End auto generated section";
pub const GENERATED_BY_LEARN: &str = "GeneratedByLearn";

const ZONE_FILE_EXTENSION: &str = "zon";
const BAD_FILE_CHARS: &[char] = &[' ', '\\', ':', '*', '?', '<', '>', '|', '.', ',', '(', ')', '/'];

/// Zone name to file path and alias, built by the pre-pass.
pub type ZoneCatalog = BTreeMap<String, ZoneInfo>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Body,
    Included,
    SubZones,
    Associated,
}

/// Everything the first `Zone … ZoneEnd` block of a file declares.
#[derive(Debug, Clone, Default)]
pub struct ZoneDefinition {
    pub name: String,
    pub alias: String,
    pub generated_by_learn: bool,
    pub path: PathBuf,
    pub included: Vec<String>,
    pub sub_zones: Vec<String>,
    pub associated: Vec<String>,
    pub templates: TemplateDictionary,
    pub diagnostics: Vec<Diagnostic>,
    /// `ZoneEnd` was reached with a name set.
    pub complete: bool,
}

impl ZoneDefinition {
    /// Alias when set, else the name.
    pub fn display_name(&self) -> &str {
        if self.alias.is_empty() {
            &self.name
        } else {
            &self.alias
        }
    }
}

fn is_auto_marker(line: &str) -> bool {
    line == BEGIN_AUTO_SECTION || line == END_AUTO_SECTION
}

/// Parses the first zone of `contents`. Parsing stops at its `ZoneEnd`; anything
/// after it (such as a parameter list) is never read.
pub fn parse_zone_definition(path: &Path, contents: &str) -> ZoneDefinition {
    let mut def = ZoneDefinition { path: path.to_path_buf(), ..Default::default() };
    let mut section = Section::Body;

    for (index, raw) in contents.lines().enumerate() {
        let line_number = index + 1;
        let line = trim_line(raw);
        if is_ignorable(&line) || is_auto_marker(&line) {
            continue;
        }
        let tokens = tokenize(&line);
        let Some(first) = tokens.first() else { continue };

        match first.as_str() {
            "Zone" => {
                def.name = tokens.get(1).cloned().unwrap_or_default();
                def.alias = tokens.get(2).cloned().unwrap_or_default();
                def.generated_by_learn = tokens.get(3).is_some_and(|t| t == GENERATED_BY_LEARN);
                if def.name.is_empty() {
                    def.diagnostics.push(Diagnostic::new(path, line_number, "Zone without a name"));
                }
            }
            "ZoneEnd" if !def.name.is_empty() => {
                if section != Section::Body {
                    def.diagnostics.push(Diagnostic::new(path, line_number, "section not closed before ZoneEnd"));
                }
                def.complete = true;
                break;
            }
            "IncludedZones" => section = Section::Included,
            "IncludedZonesEnd" => section = Section::Body,
            _ if section == Section::Included => def.included.push(first.clone()),
            "SubZones" => section = Section::SubZones,
            "SubZonesEnd" => section = Section::Body,
            _ if section == Section::SubZones => def.sub_zones.push(first.clone()),
            "AssociatedZones" => section = Section::Associated,
            "AssociatedZonesEnd" => section = Section::Body,
            _ if section == Section::Associated => def.associated.push(first.clone()),
            _ if tokens.len() > 1 => def.templates.add(&tokens, line_number),
            _ => {
                def.diagnostics.push(Diagnostic::new(
                    path,
                    line_number,
                    format!("ignoring line with a single token: {}", first),
                ));
            }
        }
    }

    if !def.complete && !def.name.is_empty() {
        let lines = contents.lines().count();
        def.diagnostics.push(Diagnostic::new(path, lines, format!("zone {} has no ZoneEnd", def.name)));
    }

    def
}

pub fn read_zone_definition(path: &Path) -> Result<ZoneDefinition, ZoneError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(parse_zone_definition(path, &contents))
}

/// Pre-pass: the name and catalog entry declared by the first meaningful line.
/// The alias defaults to the name.
pub fn zone_header(path: &Path, contents: &str) -> Option<(String, ZoneInfo)> {
    let line = contents
        .lines()
        .map(trim_line)
        .find(|line| !is_ignorable(line))?;
    let tokens = tokenize(&line);
    if tokens.len() < 2 || tokens[0] != "Zone" {
        return None;
    }
    let name = tokens[1].clone();
    let alias = tokens.get(2).cloned().unwrap_or_else(|| name.clone());
    Some((name, ZoneInfo { file_path: path.to_path_buf(), alias }))
}

/// Every `.zon` file below `dir`, skipping dotfiles and dot directories.
pub fn zone_files(dir: &Path) -> Vec<PathBuf> {
    let mut results = Vec::new();
    let mut stack = vec![dir.to_path_buf()];

    while let Some(current) = stack.pop() {
        let entries = match std::fs::read_dir(&current) {
            Ok(entries) => entries,
            Err(e) => {
                log::debug!(target: "zone", "cannot scan {}: {}", current.display(), e);
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.'));
            if hidden {
                continue;
            }
            if path.is_dir() {
                stack.push(path);
            } else if path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(ZONE_FILE_EXTENSION))
            {
                results.push(path);
            }
        }
    }

    results.sort();
    results
}

/// Catalogs every zone file below each folder. A later folder overrides an
/// earlier one for the same zone name.
pub fn build_catalog(folders: &[PathBuf]) -> ZoneCatalog {
    let mut catalog = ZoneCatalog::new();
    for folder in folders {
        for path in zone_files(folder) {
            match std::fs::read_to_string(&path) {
                Ok(contents) => {
                    if let Some((name, info)) = zone_header(&path, &contents) {
                        catalog.insert(name, info);
                    }
                }
                Err(e) => Diagnostic::new(&path, 1, e.to_string()).log(),
            }
        }
    }
    log::debug!(target: "zone", "cataloged {} zones", catalog.len());
    catalog
}

/// Replaces characters that are unsafe in file names with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if BAD_FILE_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn parse(contents: &str) -> ZoneDefinition {
        parse_zone_definition(Path::new("test.zon"), contents)
    }

    #[test]
    fn test_parse_sections_and_bindings() {
        let def = parse(
            "Zone Home\n\
             \tIncludedZones\n\t\tButtons\n\tIncludedZonesEnd\n\
             \tAssociatedZones\n\t\tSend\n\t\tSelectedTrackFXMenu\n\tAssociatedZonesEnd\n\
             \tSubZones\n\t\tHomeAlt\n\tSubZonesEnd\n\
             \tPlay Play\n\
             \tShift+Fader1 TrackVolumeDB\n\
             ZoneEnd\n",
        );
        assert!(def.complete);
        assert_eq!(def.name, "Home");
        assert_eq!(def.alias, "");
        assert_eq!(def.included, vec!["Buttons"]);
        assert_eq!(def.associated, vec!["Send", "SelectedTrackFXMenu"]);
        assert_eq!(def.sub_zones, vec!["HomeAlt"]);
        assert_eq!(def.templates.len(), 2);
        assert!(def.diagnostics.is_empty());
    }

    #[test]
    fn test_parse_stops_at_first_zone_end() {
        let def = parse(
            "Zone \"VST: ReaEQ\" \"ReaEQ\" GeneratedByLearn\n\
             #Begin auto generated section\n\
             Rotary1 FXParam 0\n\
             #End auto generated section\n\
             ZoneEnd\n\
             0 Gain\n\
             1 Freq\n",
        );
        assert!(def.generated_by_learn);
        assert_eq!(def.display_name(), "ReaEQ");
        assert_eq!(def.templates.len(), 1);
    }

    #[test]
    fn test_parse_diagnostics_are_line_numbered() {
        let def = parse("Zone Buttons\n\n  Stray\nPlay Play\n");
        assert!(!def.complete);
        assert_eq!(def.diagnostics.len(), 2);
        assert_eq!(def.diagnostics[0].line, 3);
        assert_eq!(def.templates.len(), 1);
    }

    #[test]
    fn test_zone_header_alias_defaults_to_name() {
        let (name, info) = zone_header(Path::new("a.zon"), "// comment\n\nZone Track\n").unwrap();
        assert_eq!(name, "Track");
        assert_eq!(info.alias, "Track");
        let (_, info) = zone_header(Path::new("b.zon"), "Zone \"VST: Comp\" Comp\n").unwrap();
        assert_eq!(info.alias, "Comp");
        assert!(zone_header(Path::new("c.zon"), "Fader1 TrackVolume\nZone Late\n").is_none());
    }

    #[test]
    fn test_build_catalog_recurses_and_skips_dotfiles() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("FX");
        fs::create_dir_all(&sub).unwrap();
        fs::write(dir.path().join("Home.zon"), "Zone Home\nZoneEnd\n").unwrap();
        fs::write(sub.join("Comp.zon"), "Zone \"VST: Comp\" Comp\nZoneEnd\n").unwrap();
        fs::write(dir.path().join(".Hidden.zon"), "Zone Hidden\nZoneEnd\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "Zone Text\n").unwrap();

        let catalog = build_catalog(&[dir.path().to_path_buf()]);
        assert_eq!(catalog.len(), 2);
        assert!(catalog.contains_key("Home"));
        assert_eq!(catalog["VST: Comp"].alias, "Comp");
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("VST: ReaEQ (Cockos)"), "VST__ReaEQ__Cockos_");
        assert_eq!(sanitize_file_name("JS: a/b.c"), "JS__a_b_c");
    }
}
