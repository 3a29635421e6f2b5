//! CSI.ini: which surfaces exist, how they connect, and how pages group them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use csurf_types::ListenerCategories;

use crate::error::{Diagnostic, IniError};
use crate::tokenizer::{is_ignorable, tokenize, trim_line};
use crate::tracks::PageOptions;

pub const INI_FILE_NAME: &str = "CSI.ini";

/// Transport declared by a `MidiSurface` or `OSCSurface` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    Midi { in_port: i32, out_port: i32 },
    Osc { receive_port: String, transmit_port: String, remote_ip: String },
}

/// A surface placed on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceDef {
    pub name: String,
    pub num_channels: usize,
    pub channel_offset: usize,
    /// `.mst` or `.ost` file under `Surfaces/Midi` or `Surfaces/OSC`.
    pub template_file: String,
    pub zone_folder: String,
    pub fx_zone_folder: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerDef {
    pub broadcaster: String,
    pub listener: String,
    pub categories: ListenerCategories,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDef {
    pub name: String,
    pub options: PageOptions,
    pub surfaces: Vec<SurfaceDef>,
    pub listeners: Vec<ListenerDef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniFile {
    pub transports: BTreeMap<String, Transport>,
    pub pages: Vec<PageDef>,
}

impl IniFile {
    pub fn transport(&self, surface: &str) -> Option<&Transport> {
        self.transports.get(surface)
    }
}

/// `<resource>/CSI`.
pub fn csi_folder(resource_path: &Path) -> PathBuf {
    resource_path.join("CSI")
}

/// Reads `<resource>/CSI/CSI.ini`.
pub fn load_ini(resource_path: &Path, version_token: &str) -> Result<(IniFile, Vec<Diagnostic>), IniError> {
    let folder = csi_folder(resource_path);
    if !folder.is_dir() {
        return Err(IniError::MissingFolder(folder));
    }
    let path = folder.join(INI_FILE_NAME);
    let contents = std::fs::read_to_string(&path)?;
    let (ini, diagnostics) = parse_ini(&path, &contents, version_token)?;
    log::info!(
        target: "ini",
        "{}: {} transports, {} pages",
        path.display(),
        ini.transports.len(),
        ini.pages.len()
    );
    Ok((ini, diagnostics))
}

fn parse_count(token: &str) -> usize {
    token.parse().unwrap_or(0)
}

/// Parses CSI.ini text. Malformed lines are skipped and reported.
pub fn parse_ini(path: &Path, contents: &str, version_token: &str) -> Result<(IniFile, Vec<Diagnostic>), IniError> {
    let mut lines = contents.lines().enumerate();
    let first = lines.next().map(|(_, l)| trim_line(l)).unwrap_or_default();
    if first != version_token {
        return Err(IniError::Version {
            expected: version_token.to_string(),
            found: first,
        });
    }

    let mut ini = IniFile::default();
    let mut diagnostics = Vec::new();
    let mut broadcaster: Option<String> = None;

    for (index, raw) in lines {
        let line_number = index + 1;
        let line = trim_line(raw);
        if is_ignorable(&line) {
            continue;
        }
        let tokens = tokenize(&line);
        if tokens.len() < 2 {
            continue;
        }

        match tokens[0].as_str() {
            "MidiSurface" if tokens.len() == 4 => {
                ini.transports.insert(
                    tokens[1].clone(),
                    Transport::Midi {
                        in_port: tokens[2].parse().unwrap_or(-1),
                        out_port: tokens[3].parse().unwrap_or(-1),
                    },
                );
            }
            "OSCSurface" if tokens.len() == 5 => {
                ini.transports.insert(
                    tokens[1].clone(),
                    Transport::Osc {
                        receive_port: tokens[2].clone(),
                        transmit_port: tokens[3].clone(),
                        remote_ip: tokens[4].clone(),
                    },
                );
            }
            "Page" => {
                broadcaster = None;
                ini.pages.push(PageDef {
                    name: tokens[1].clone(),
                    options: PageOptions::parse(&tokens[2..]),
                    surfaces: Vec::new(),
                    listeners: Vec::new(),
                });
            }
            "Broadcaster" if !ini.pages.is_empty() => broadcaster = Some(tokens[1].clone()),
            "Listener" if tokens.len() > 2 => {
                let (Some(page), Some(from)) = (ini.pages.last_mut(), broadcaster.as_ref()) else {
                    diagnostics.push(Diagnostic::new(path, line_number, "Listener without a Broadcaster"));
                    continue;
                };
                page.listeners.push(ListenerDef {
                    broadcaster: from.clone(),
                    listener: tokens[1].clone(),
                    categories: ListenerCategories::parse(&tokens[2..].join(" ")),
                });
            }
            _ if tokens.len() == 6 || tokens.len() == 7 => {
                let Some(page) = ini.pages.last_mut() else {
                    diagnostics.push(Diagnostic::new(path, line_number, "surface line before any Page"));
                    continue;
                };
                if !ini.transports.contains_key(&tokens[0]) {
                    diagnostics.push(Diagnostic::new(
                        path,
                        line_number,
                        format!("{} is not a declared MidiSurface or OSCSurface", tokens[0]),
                    ));
                    continue;
                }
                page.surfaces.push(SurfaceDef {
                    name: tokens[0].clone(),
                    num_channels: parse_count(&tokens[1]),
                    channel_offset: parse_count(&tokens[2]),
                    template_file: tokens[3].clone(),
                    zone_folder: tokens[4].clone(),
                    fx_zone_folder: tokens[5].clone(),
                });
            }
            _ => diagnostics.push(Diagnostic::new(path, line_number, format!("unrecognised line: {}", line))),
        }
    }

    for d in &diagnostics {
        log::warn!(target: "ini", "{}", d);
    }
    Ok((ini, diagnostics))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Version 3.0\n\
        \n\
        MidiSurface \"XTouch One\" 3 5\n\
        OSCSurface iPad 8000 9000 192.168.1.20\n\
        // comment\n\
        Page HomePage FollowTCP\n\
        \"XTouch One\" 8 0 \"X-Touch One.mst\" XTouchOne XTouchOneFX\n\
        iPad 8 0 iPad.ost iPad iPadFX\n\
        Broadcaster \"XTouch One\"\n\
        Listener iPad GoHome Sends\n\
        Page Mix\n\
        Stray 8 0 a.mst Z ZFX\n";

    #[test]
    fn test_parse_sample() {
        let (ini, diagnostics) = parse_ini(Path::new("CSI.ini"), SAMPLE, "Version 3.0").unwrap();
        assert_eq!(ini.transport("XTouch One"), Some(&Transport::Midi { in_port: 3, out_port: 5 }));
        assert!(matches!(ini.transport("iPad"), Some(Transport::Osc { remote_ip, .. }) if remote_ip == "192.168.1.20"));

        assert_eq!(ini.pages.len(), 2);
        let home = &ini.pages[0];
        assert!(home.options.follow_tcp);
        assert_eq!(home.surfaces.len(), 2);
        assert_eq!(home.surfaces[0].template_file, "X-Touch One.mst");
        assert_eq!(home.surfaces[1].num_channels, 8);
        assert_eq!(home.listeners.len(), 1);
        assert_eq!(home.listeners[0].broadcaster, "XTouch One");
        assert!(home.listeners[0].categories.go_home && home.listeners[0].categories.sends);

        assert!(ini.pages[1].surfaces.is_empty());
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].line, 12);
    }

    #[test]
    fn test_version_mismatch() {
        let err = parse_ini(Path::new("CSI.ini"), "Version 2.0\n", "Version 3.0").unwrap_err();
        assert!(matches!(err, IniError::Version { .. }));
    }

    #[test]
    fn test_listener_needs_broadcaster() {
        let text = "Version 3.0\nPage P\nListener iPad GoHome\n";
        let (ini, diagnostics) = parse_ini(Path::new("CSI.ini"), text, "Version 3.0").unwrap();
        assert!(ini.pages[0].listeners.is_empty());
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_missing_folder() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_ini(dir.path(), "Version 3.0").unwrap_err();
        assert!(matches!(err, IniError::MissingFolder(_)));
    }

    #[test]
    fn test_load_from_resource_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("CSI")).unwrap();
        std::fs::write(dir.path().join("CSI/CSI.ini"), SAMPLE).unwrap();
        let (ini, _) = load_ini(dir.path(), "Version 3.0").unwrap();
        assert_eq!(ini.pages[0].name, "HomePage");
    }
}
