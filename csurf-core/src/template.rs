//! Action templates: one parsed binding line of a zone file, before it is
//! instantiated for a concrete navigator.

use std::collections::BTreeMap;

use csurf_types::modifier::mask_from_tokens;
use csurf_types::{TOGGLE_BIT, TOUCH_BIT};

const PLACEHOLDER: char = '|';

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Slot,
}

/// A name or parameter containing `|` placeholders, resolved per instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTemplate {
    parts: Vec<Part>,
}

impl NameTemplate {
    pub fn parse(s: &str) -> Self {
        let mut parts = Vec::new();
        let mut literal = String::new();
        for c in s.chars() {
            if c == PLACEHOLDER {
                if !literal.is_empty() {
                    parts.push(Part::Literal(std::mem::take(&mut literal)));
                }
                parts.push(Part::Slot);
            } else {
                literal.push(c);
            }
        }
        if !literal.is_empty() {
            parts.push(Part::Literal(literal));
        }
        Self { parts }
    }

    pub fn has_placeholder(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, Part::Slot))
    }

    /// Fills every placeholder with `n`.
    pub fn resolve(&self, n: usize) -> String {
        self.resolve_with(&n.to_string())
    }

    pub fn resolve_with(&self, value: &str) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Literal(s) => out.push_str(s),
                Part::Slot => out.push_str(value),
            }
        }
        out
    }

    /// Source text with placeholders kept.
    pub fn raw(&self) -> String {
        self.resolve_with("|")
    }
}

/// Widget reference and binding flags decoded from `Mod1+Mod2+Widget`.
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetKey {
    pub widget: String,
    pub modifier: u32,
    pub is_value_inverted: bool,
    pub is_feedback_inverted: bool,
    /// Hold delay in seconds, 0 for none.
    pub hold_delay: f64,
    pub is_decrease: bool,
    pub is_increase: bool,
}

impl WidgetKey {
    pub fn parse(token: &str) -> Self {
        let segments: Vec<&str> = token.split('+').collect();
        let (widget, prefixes) = match segments.split_last() {
            Some((last, rest)) => (last.to_string(), rest),
            None => (String::new(), &[][..]),
        };

        let mut key = WidgetKey {
            widget,
            modifier: 0,
            is_value_inverted: false,
            is_feedback_inverted: false,
            hold_delay: 0.0,
            is_decrease: false,
            is_increase: false,
        };

        for segment in prefixes {
            if segment.contains("Touch") {
                key.modifier |= TOUCH_BIT;
            } else if *segment == "Toggle" {
                key.modifier |= TOGGLE_BIT;
            } else if *segment == "InvertFB" {
                key.is_feedback_inverted = true;
            } else if *segment == "Invert" {
                key.is_value_inverted = true;
            } else if *segment == "Hold" {
                key.hold_delay = 1.0;
            } else if *segment == "Decrease" {
                key.is_decrease = true;
            } else if *segment == "Increase" {
                key.is_increase = true;
            }
        }

        key.modifier |= mask_from_tokens(prefixes);
        key
    }
}

/// A binding line with its `|` placeholders still unresolved.
#[derive(Debug, Clone)]
pub struct ActionTemplate {
    pub widget: NameTemplate,
    pub modifier: u32,
    pub action: NameTemplate,
    /// Action name followed by its parameters, as handed to the context.
    pub params: Vec<NameTemplate>,
    pub provide_feedback: bool,
    pub is_value_inverted: bool,
    pub is_feedback_inverted: bool,
    pub hold_delay: f64,
    pub is_decrease: bool,
    pub is_increase: bool,
    pub line: usize,
}

/// Templates grouped by raw widget name and then modifier mask.
#[derive(Debug, Default, Clone)]
pub struct TemplateDictionary {
    groups: BTreeMap<String, BTreeMap<u32, Vec<ActionTemplate>>>,
}

impl TemplateDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Number of templates across all groups.
    pub fn len(&self) -> usize {
        self.groups.values().flat_map(|m| m.values()).map(Vec::len).sum()
    }

    /// Adds a binding line. `tokens[0]` is the widget key, `tokens[1]` the action.
    /// Lines with fewer than two tokens are ignored.
    pub fn add(&mut self, tokens: &[String], line: usize) {
        if tokens.len() < 2 {
            return;
        }

        let key = WidgetKey::parse(&tokens[0]);

        let mut feedback_indicator = "";
        let mut params = Vec::new();
        for token in &tokens[1..] {
            if token == "Feedback=Yes" || token == "Feedback=No" {
                feedback_indicator = token.as_str();
            } else {
                params.push(NameTemplate::parse(token));
            }
        }

        let template = ActionTemplate {
            widget: NameTemplate::parse(&key.widget),
            modifier: key.modifier,
            action: NameTemplate::parse(&tokens[1]),
            params,
            provide_feedback: false,
            is_value_inverted: key.is_value_inverted,
            is_feedback_inverted: key.is_feedback_inverted,
            hold_delay: key.hold_delay,
            is_decrease: key.is_decrease,
            is_increase: key.is_increase,
            line,
        };

        let group = self
            .groups
            .entry(key.widget)
            .or_default()
            .entry(key.modifier)
            .or_default();

        group.push(template);

        if group.len() == 1 {
            if feedback_indicator.is_empty() || feedback_indicator == "Feedback=Yes" {
                group[0].provide_feedback = true;
            }
        } else if feedback_indicator == "Feedback=Yes" {
            for t in group.iter_mut() {
                t.provide_feedback = false;
            }
            if let Some(last) = group.last_mut() {
                last.provide_feedback = true;
            }
        }
    }

    /// Iterates `(raw widget name, modifier, templates)` in key order.
    pub fn groups(&self) -> impl Iterator<Item = (&str, u32, &[ActionTemplate])> {
        self.groups.iter().flat_map(|(widget, by_mod)| {
            by_mod
                .iter()
                .map(move |(modifier, templates)| (widget.as_str(), *modifier, templates.as_slice()))
        })
    }

    pub fn widget_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.groups.clear();
    }
}
