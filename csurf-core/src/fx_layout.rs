//! FX layout descriptions and the text generators for auto-mapped and
//! learned FX zones.
//!
//! A surface describes one FX parameter "cell" in its `SurfaceFXLayout` zone:
//! row 0 is the control (`Rotary FXParam [ … ]`), row 1 the name display and
//! row 2 the value display. `#`-prefixed rows are template rows such as
//! `#WidgetTypes Rotary RotaryPush`. The `FXLayouts` zone lists the cell
//! groups (`Shift A 8`: modifiers, widget suffix, channel count).

use std::fmt::Write as _;

use csurf_types::FxLayoutInfo;

use crate::steps::param_steps_string;
use crate::tokenizer::{is_ignorable, quote_token, tokenize, trim_line};
use crate::zone_file::{BEGIN_AUTO_SECTION, END_AUTO_SECTION, GENERATED_BY_LEARN};

const VENDOR_PREFIXES: &[&str] = &["VST3i: ", "VSTi: ", "VST3: ", "VST: ", "JS: ", "AUi: ", "AU: ", "CLAPi: ", "CLAP: "];

/// Short display name of an FX: the plugin-format prefix and a trailing
/// `(vendor)` are removed.
pub fn fx_alias(fx_name: &str) -> String {
    let mut alias = fx_name;
    for prefix in VENDOR_PREFIXES {
        if let Some(rest) = alias.strip_prefix(prefix) {
            alias = rest;
            break;
        }
    }
    if alias.ends_with(')') {
        if let Some(open) = alias.rfind(" (") {
            alias = &alias[..open];
        }
    }
    alias.trim().to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SurfaceFxLayout {
    rows: Vec<Vec<String>>,
    template_rows: Vec<Vec<String>>,
}

impl SurfaceFxLayout {
    pub fn parse(contents: &str) -> Self {
        let mut layout = Self::default();
        for raw in contents.lines() {
            let line = trim_line(raw);
            if line.is_empty() {
                continue;
            }
            let mut tokens = tokenize(&line);
            if tokens.is_empty() || tokens[0] == "Zone" || tokens[0] == "ZoneEnd" {
                continue;
            }
            if let Some(stripped) = tokens[0].strip_prefix('#') {
                tokens[0] = stripped.to_string();
                layout.template_rows.push(tokens);
                continue;
            }
            let derived = match tokens.get(1).map(String::as_str) {
                Some("FXParam") => Some("WidgetAction"),
                Some("FixedTextDisplay") => Some("AliasDisplayAction"),
                Some("FXParamValueDisplay") => Some("ValueDisplayAction"),
                _ => None,
            };
            if let Some(kind) = derived {
                layout.template_rows.push(vec![kind.to_string(), tokens[1].clone()]);
            }
            layout.rows.push(tokens);
        }
        layout
    }

    /// Control, name display and value display rows are all present.
    pub fn is_complete(&self) -> bool {
        self.rows.len() == 3
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    fn row_widget(&self, row: usize) -> &str {
        self.rows.get(row).and_then(|r| r.first()).map(String::as_str).unwrap_or("")
    }

    fn row_params(&self, row: usize) -> &[String] {
        self.rows.get(row).and_then(|r| r.get(2..)).unwrap_or(&[])
    }

    pub fn control_widget(&self) -> &str {
        self.row_widget(0)
    }

    /// Parameters after the control's action, e.g. an acceleration table.
    pub fn control_params(&self) -> &[String] {
        self.row_params(0)
    }

    pub fn name_display(&self) -> &str {
        self.row_widget(1)
    }

    pub fn name_display_params(&self) -> &[String] {
        self.row_params(1)
    }

    pub fn value_display(&self) -> &str {
        self.row_widget(2)
    }

    pub fn value_display_params(&self) -> &[String] {
        self.row_params(2)
    }

    /// Parameter widget types declared by `#WidgetTypes` rows.
    pub fn widget_types(&self) -> Vec<String> {
        self.template_rows
            .iter()
            .filter(|row| row.first().is_some_and(|t| t == "WidgetTypes"))
            .flat_map(|row| row[1..].iter().cloned())
            .collect()
    }

    /// The control widget first, then every other declared widget type.
    pub fn action_widgets(&self) -> Vec<String> {
        let control = self.control_widget().to_string();
        let mut widgets = vec![control.clone()];
        widgets.extend(self.widget_types().into_iter().filter(|w| *w != control));
        widgets
    }

    /// Extra parameters appended to learned rotary bindings, when the control is a `Rotary`.
    pub fn rotary_params(&self) -> Option<&[String]> {
        (self.control_widget() == "Rotary" && !self.control_params().is_empty()).then(|| self.control_params())
    }
}

/// Parses `FXLayouts` rows. Rows without exactly three tokens yield an empty layout.
pub fn parse_fx_layouts(contents: &str) -> Vec<FxLayoutInfo> {
    contents
        .lines()
        .map(trim_line)
        .filter(|line| !is_ignorable(line) && !line.contains("Zone"))
        .map(|line| {
            let tokens = tokenize(&line);
            if tokens.len() == 3 {
                FxLayoutInfo {
                    modifiers: tokens[0].clone(),
                    suffix: tokens[1].clone(),
                    channel_count: tokens[2].parse().unwrap_or(0),
                }
            } else {
                FxLayoutInfo { modifiers: String::new(), suffix: String::new(), channel_count: 0 }
            }
        })
        .collect()
}

/// Lines of an `FXPrologue`/`FXEpilogue` zone, without its `Zone…` lines.
pub fn parse_boilerplate(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(trim_line)
        .filter(|line| !is_ignorable(line) && !line.starts_with("Zone"))
        .collect()
}

fn join_params(params: &[String]) -> String {
    params.iter().map(|p| format!(" {}", quote_token(p))).collect()
}

// ─── Auto-map ──────────────────────────────────────────────────────

/// One FX parameter offered to the auto-mapper.
#[derive(Debug, Clone)]
pub struct AutoMapParam {
    pub name: String,
    /// Cached stepped value count, 0 when continuous.
    pub steps: usize,
}

pub struct AutoMapInput<'a> {
    pub fx_name: &'a str,
    pub alias: &'a str,
    pub layout: &'a SurfaceFxLayout,
    pub fx_layouts: &'a [FxLayoutInfo],
    pub prologue: &'a [String],
    pub epilogue: &'a [String],
    pub params: &'a [AutoMapParam],
    pub step_bounds: (usize, usize),
}

fn write_padding(out: &mut String, input: &AutoMapInput<'_>, widgets: &[String], info: &FxLayoutInfo, channel: usize) {
    let prefix = info.binding_prefix();
    let layout = input.layout;
    for (widget_idx, widget) in widgets.iter().enumerate() {
        let _ = writeln!(out, "\t{}{}{}{}\tNoAction", prefix, widget, info.suffix, channel);
        if widget_idx == 0 && layout.is_complete() && !layout.name_display().is_empty() && !layout.value_display().is_empty() {
            let _ = writeln!(
                out,
                "\t{}{}{}{}\tNoAction{}",
                prefix,
                layout.name_display(),
                info.suffix,
                channel,
                join_params(layout.name_display_params())
            );
            let _ = writeln!(
                out,
                "\t{}{}{}{}\tNoAction{}\n",
                prefix,
                layout.value_display(),
                info.suffix,
                channel,
                join_params(layout.value_display_params())
            );
        } else {
            out.push_str("\tNullDisplay\tNoAction\n\tNullDisplay\tNoAction\n\n");
        }
    }
    out.push('\n');
}

/// Renders an auto-mapped FX zone: parameters are assigned to cells in order,
/// and cells left over are padded with `NoAction` bindings.
pub fn render_auto_map_zone(input: &AutoMapInput<'_>) -> String {
    let mut out = String::new();
    let layout = input.layout;
    let param_action = if input.fx_name.contains("JS:") { "JSFXParam" } else { "FXParam" };

    let _ = writeln!(out, "Zone \"{}\" \"{}\"", input.fx_name, input.alias);
    for line in input.prologue {
        let _ = writeln!(out, "\t{}", line);
    }
    let _ = writeln!(out, "\n{}", BEGIN_AUTO_SECTION);

    let widgets = layout.action_widgets();
    let total_channels: usize = input.fx_layouts.iter().map(|l| l.channel_count).sum();

    let mut layout_index = 0;
    let mut channel = 1;
    let mut exhausted = false;

    for (param_idx, param) in input.params.iter().enumerate().take(total_channels) {
        let info = &input.fx_layouts[layout_index];
        let prefix = info.binding_prefix();

        for (widget_idx, widget) in widgets.iter().enumerate() {
            for (row_idx, row) in layout.rows().iter().enumerate() {
                let Some(row_widget) = row.first() else { continue };
                if widget_idx == 0 {
                    let _ = write!(out, "\t{}{}{}{}\t", prefix, row_widget, info.suffix, channel);
                } else if row_idx == 0 {
                    let _ = write!(out, "\t{}{}{}{}\t", prefix, widget, info.suffix, channel);
                } else {
                    out.push_str("\tNullDisplay\t");
                }

                if let Some(action) = row.get(1) {
                    if widget_idx == 0 {
                        let action = if action == "FXParam" { param_action } else { action.as_str() };
                        out.push_str(action);
                        if action == "FixedTextDisplay" {
                            let _ = write!(out, " \"{}\"", param.name);
                        } else {
                            let _ = write!(out, " {}", param_idx);
                        }
                        if row_idx == 0
                            && param.steps >= input.step_bounds.0
                            && param.steps <= input.step_bounds.1
                        {
                            let _ = write!(out, " [ {}]", param_steps_string(param.steps));
                        }
                        out.push_str(&join_params(&row[2..]));
                    } else {
                        out.push_str("NoAction");
                    }
                }
                out.push('\n');
            }
            out.push('\n');
        }

        channel += 1;
        out.push('\n');

        if channel > info.channel_count {
            channel = 1;
            if layout_index + 1 < input.fx_layouts.len() {
                layout_index += 1;
            } else {
                exhausted = true;
                break;
            }
        }
    }

    if !exhausted && !input.fx_layouts.is_empty() {
        let info = &input.fx_layouts[layout_index];
        if channel != 1 {
            while channel <= info.channel_count {
                write_padding(&mut out, input, &widgets, info, channel);
                channel += 1;
            }
            layout_index += 1;
        }
        for info in input.fx_layouts.iter().skip(layout_index) {
            for channel in 1..=info.channel_count {
                write_padding(&mut out, input, &widgets, info, channel);
            }
        }
    }

    let _ = writeln!(out, "{}", END_AUTO_SECTION);
    for line in input.epilogue {
        let _ = writeln!(out, "\t{}", line);
    }
    out.push_str("ZoneEnd\n\n");
    for (i, param) in input.params.iter().enumerate() {
        let _ = writeln!(out, "{} {}", i, param.name);
    }
    out
}

// ─── Learned zones ─────────────────────────────────────────────────

/// A parameter widget of a learn cell as it will be written out.
#[derive(Debug, Clone)]
pub struct LearnedWidget {
    pub widget_name: String,
    /// `Some((param number, name, extra params))` when learned.
    pub binding: Option<(i32, String, String)>,
}

#[derive(Debug, Clone)]
pub struct LearnedCell {
    pub modifier_prefix: String,
    pub name_display: String,
    pub value_display: String,
    pub widgets: Vec<LearnedWidget>,
}

pub struct LearnedZoneInput<'a> {
    pub fx_name: &'a str,
    pub alias: &'a str,
    pub layout: &'a SurfaceFxLayout,
    pub prologue: &'a [String],
    pub epilogue: &'a [String],
    pub cells: &'a [LearnedCell],
    pub param_list: &'a [String],
}

/// Renders the zone file written by `SaveLearnedFXParams`.
pub fn render_learned_zone(input: &LearnedZoneInput<'_>) -> String {
    let mut out = String::new();
    let name_params = join_params(input.layout.name_display_params());
    let value_params = join_params(input.layout.value_display_params());

    let _ = writeln!(out, "Zone \"{}\" \"{}\" \"{}\"", input.fx_name, input.alias, GENERATED_BY_LEARN);
    for line in input.prologue {
        let _ = writeln!(out, "\t{}", line);
    }
    let _ = writeln!(out, "\n{}", BEGIN_AUTO_SECTION);

    for cell in input.cells {
        let mods = &cell.modifier_prefix;
        let mut cell_has_binding = false;
        let last = cell.widgets.len().saturating_sub(1);

        for (i, widget) in cell.widgets.iter().enumerate() {
            match &widget.binding {
                Some((number, name, params)) => {
                    cell_has_binding = true;
                    let _ = writeln!(out, "\t{}{}\tFXParam {} {}", mods, widget.widget_name, number, params);
                    let _ = writeln!(out, "\t{}{}\tFixedTextDisplay \"{}\"{}", mods, cell.name_display, name, name_params);
                    let _ = writeln!(out, "\t{}{}\tFXParamValueDisplay {}{}\n", mods, cell.value_display, number, value_params);
                }
                None if i == last && !cell_has_binding => {
                    let _ = writeln!(out, "\t{}{}\tNoAction", mods, widget.widget_name);
                    let _ = writeln!(out, "\t{}{}\tNoAction", mods, cell.name_display);
                    let _ = writeln!(out, "\t{}{}\tNoAction\n", mods, cell.value_display);
                }
                None => {
                    let _ = writeln!(out, "\t{}{}\tNoAction", mods, widget.widget_name);
                    out.push_str("\tNullDisplay\tNoAction\n\tNullDisplay\tNoAction\n\n");
                }
            }
        }
        out.push('\n');
    }

    let _ = writeln!(out, "{}", END_AUTO_SECTION);
    for line in input.epilogue {
        let _ = writeln!(out, "\t{}", line);
    }
    out.push_str("ZoneEnd\n\n");
    for line in input.param_list {
        let _ = writeln!(out, "{}", line);
    }
    out
}

/// A parameter binding read back from the auto-generated section of a zone file.
#[derive(Debug, Clone, PartialEq)]
pub struct CellDefinition {
    /// Widget token as written, modifiers included (`Shift+RotaryA1`).
    pub widget_key: String,
    pub param_number: Option<i32>,
    pub steps: Vec<String>,
    pub name_display: String,
    pub param_name: String,
}

/// Reads the auto-generated section as triples of control, name display
/// and value display lines.
pub fn unpack_auto_section(contents: &str) -> Vec<CellDefinition> {
    let mut in_section = false;
    let mut lines: Vec<Vec<String>> = Vec::new();
    for raw in contents.lines() {
        let line = trim_line(raw);
        if line == BEGIN_AUTO_SECTION {
            in_section = true;
            continue;
        }
        if line == END_AUTO_SECTION {
            break;
        }
        if in_section && !is_ignorable(&line) {
            lines.push(tokenize(&line));
        }
    }

    lines
        .chunks(3)
        .filter(|chunk| chunk.len() == 3)
        .filter_map(|chunk| {
            let control = &chunk[0];
            let name_line = &chunk[1];
            let widget_key = control.first()?.clone();
            let is_param = control.get(1).is_some_and(|a| a == "FXParam" || a == "JSFXParam");
            let param_number = if is_param { control.get(2).and_then(|n| n.parse().ok()) } else { None };
            let steps = match control.iter().position(|t| t == "[") {
                Some(open) if is_param => control[open + 1..]
                    .iter()
                    .take_while(|t| *t != "]")
                    .filter(|t| t.parse::<f64>().is_ok())
                    .cloned()
                    .collect(),
                _ => Vec::new(),
            };
            let name_display = name_line.first().cloned().unwrap_or_default();
            let param_name = if name_line.get(1).is_some_and(|a| a == "FixedTextDisplay") {
                name_line.get(2).cloned().unwrap_or_default()
            } else {
                String::new()
            };
            Some(CellDefinition { widget_key, param_number, steps, name_display, param_name })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zone_file::parse_zone_definition;
    use std::path::Path;

    const LAYOUT: &str = "Zone SurfaceFXLayout\n\
        \tRotary FXParam [ (0.001,0.002) ]\n\
        \tDisplayUpper FixedTextDisplay\n\
        \tDisplayLower FXParamValueDisplay\n\
        \t#WidgetTypes Rotary RotaryPush\n\
        ZoneEnd\n";

    fn layouts() -> Vec<FxLayoutInfo> {
        parse_fx_layouts("Zone FXLayouts\n\tNoModifiers A 2\n\tShift B 1\nZoneEnd\n")
    }

    #[test]
    fn test_fx_alias() {
        assert_eq!(fx_alias("VST: ReaEQ (Cockos)"), "ReaEQ");
        assert_eq!(fx_alias("JS: Saturation"), "Saturation");
        assert_eq!(fx_alias("Plain"), "Plain");
    }

    #[test]
    fn test_surface_layout_rows() {
        let layout = SurfaceFxLayout::parse(LAYOUT);
        assert!(layout.is_complete());
        assert_eq!(layout.control_widget(), "Rotary");
        assert_eq!(layout.control_params(), ["[", "(0.001,0.002)", "]"]);
        assert_eq!(layout.name_display(), "DisplayUpper");
        assert_eq!(layout.widget_types(), vec!["Rotary", "RotaryPush"]);
        assert_eq!(layout.action_widgets(), vec!["Rotary", "RotaryPush"]);
        assert!(layout.rotary_params().is_some());
    }

    #[test]
    fn test_parse_fx_layouts() {
        let l = layouts();
        assert_eq!(l.len(), 2);
        assert_eq!(l[0].suffix, "A");
        assert_eq!(l[1].channel_count, 1);
        assert_eq!(l[1].binding_prefix(), "Shift+");
    }

    #[test]
    fn test_boilerplate_skips_zone_lines() {
        let lines = parse_boilerplate("Zone FXPrologue\n\tLeft GoHome\n\n// c\nZoneEnd\n");
        assert_eq!(lines, vec!["Left GoHome"]);
    }

    #[test]
    fn test_auto_map_assigns_and_pads() {
        let layout = SurfaceFxLayout::parse(LAYOUT);
        let fx_layouts = layouts();
        let params = vec![
            AutoMapParam { name: "Gain".to_string(), steps: 0 },
            AutoMapParam { name: "Mode".to_string(), steps: 3 },
        ];
        let text = render_auto_map_zone(&AutoMapInput {
            fx_name: "VST: Comp",
            alias: "Comp",
            layout: &layout,
            fx_layouts: &fx_layouts,
            prologue: &["Left GoHome".to_string()],
            epilogue: &[],
            params: &params,
            step_bounds: (2, 30),
        });
        assert!(text.starts_with("Zone \"VST: Comp\" \"Comp\"\n\tLeft GoHome\n"));
        assert!(text.contains("\tRotaryA1\tFXParam 0 [ (0.001,0.002) ]\n"));
        assert!(text.contains("\tDisplayUpperA1\tFixedTextDisplay \"Gain\"\n"));
        assert!(text.contains("\tRotaryA2\tFXParam 1 [ 0  0.5  1  ] [ (0.001,0.002) ]\n"));
        assert!(text.contains("\tShift+RotaryB1\tNoAction\n"));
        assert!(text.ends_with("ZoneEnd\n\n0 Gain\n1 Mode\n"));

        let def = parse_zone_definition(Path::new("Comp.zon"), &text);
        assert!(def.complete);
        assert_eq!(def.name, "VST: Comp");
    }

    #[test]
    fn test_learned_zone_round_trips_through_unpack() {
        let layout = SurfaceFxLayout::parse(LAYOUT);
        let cells = vec![LearnedCell {
            modifier_prefix: String::new(),
            name_display: "DisplayUpperA1".to_string(),
            value_display: "DisplayLowerA1".to_string(),
            widgets: vec![
                LearnedWidget {
                    widget_name: "RotaryA1".to_string(),
                    binding: Some((4, "Ratio".to_string(), "[ 0  0.5  1  ]".to_string())),
                },
                LearnedWidget { widget_name: "RotaryPushA1".to_string(), binding: None },
            ],
        }];
        let text = render_learned_zone(&LearnedZoneInput {
            fx_name: "VST: Comp",
            alias: "Comp",
            layout: &layout,
            prologue: &[],
            epilogue: &[],
            cells: &cells,
            param_list: &["0 Gain".to_string()],
        });
        assert!(text.starts_with("Zone \"VST: Comp\" \"Comp\" \"GeneratedByLearn\"\n"));

        let unpacked = unpack_auto_section(&text);
        assert_eq!(unpacked.len(), 2);
        assert_eq!(unpacked[0].widget_key, "RotaryA1");
        assert_eq!(unpacked[0].param_number, Some(4));
        assert_eq!(unpacked[0].param_name, "Ratio");
        assert_eq!(unpacked[0].steps, vec!["0", "0.5", "1"]);
        assert_eq!(unpacked[1].param_number, None);
        assert_eq!(unpacked[1].name_display, "NullDisplay");
    }
}
