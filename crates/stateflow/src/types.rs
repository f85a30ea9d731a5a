// Copyright 2026 Stateflow Contributors
// SPDX-License-Identifier: Apache-2.0

//! Core data types for states, actions, and graph errors.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Numeric identifier of a state, assigned in insertion order. The root is 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateId(pub u32);

impl StateId {
    pub const ROOT: StateId = StateId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How an element is located on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum How {
    #[serde(rename = "xpath")]
    XPath,
    Id,
    CssSelector,
    LinkText,
    Name,
    Tag,
}

impl fmt::Display for How {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            How::XPath => "xpath",
            How::Id => "id",
            How::CssSelector => "css",
            How::LinkText => "link_text",
            How::Name => "name",
            How::Tag => "tag",
        };
        f.write_str(s)
    }
}

/// Locator for a single element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identification {
    pub how: How,
    pub value: String,
}

impl Identification {
    pub fn new(how: How, value: impl Into<String>) -> Self {
        Self {
            how,
            value: value.into(),
        }
    }

    pub fn xpath(value: impl Into<String>) -> Self {
        Self::new(How::XPath, value)
    }
}

impl fmt::Display for Identification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.how, self.value)
    }
}

/// Browser event fired on an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    #[default]
    Click,
    Hover,
    DoubleClick,
    Enter,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventType::Click => "click",
            EventType::Hover => "hover",
            EventType::DoubleClick => "dblclick",
            EventType::Enter => "enter",
        };
        f.write_str(s)
    }
}

/// A form field filled in before an action is fired.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormInput {
    pub identification: Identification,
    pub input_type: String,
    pub values: Vec<String>,
}

/// An action fired on an element. The edge type of the state-flow graph.
///
/// Two eventables are equal when they target the same element with the same
/// event. `source` and `target` are filled in once the action is recorded as
/// an edge and do not take part in equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Eventable {
    pub identification: Identification,
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_form_inputs: Vec<FormInput>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub element_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<StateId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<StateId>,
}

impl Eventable {
    pub fn new(identification: Identification, event_type: EventType) -> Self {
        Self {
            identification,
            event_type,
            related_form_inputs: Vec::new(),
            element_text: String::new(),
            source: None,
            target: None,
        }
    }

    /// Shorthand for a click on the element at `xpath`.
    pub fn click(xpath: impl Into<String>) -> Self {
        Self::new(Identification::xpath(xpath), EventType::Click)
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.element_text = text.into();
        self
    }

    pub fn with_form_inputs(mut self, inputs: Vec<FormInput>) -> Self {
        self.related_form_inputs = inputs;
        self
    }

    /// Copy of this action that locates its element differently.
    /// Used when an element's locator is corrected after firing.
    pub fn with_identification(&self, identification: Identification) -> Self {
        Self {
            identification,
            ..self.clone()
        }
    }

    /// Stable name used when comparing action sequences.
    pub fn name(&self) -> String {
        format!("{} {}", self.event_type, self.identification)
    }
}

impl PartialEq for Eventable {
    fn eq(&self, other: &Self) -> bool {
        self.event_type == other.event_type && self.identification == other.identification
    }
}

impl Eq for Eventable {}

impl Hash for Eventable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.event_type.hash(state);
        self.identification.hash(state);
    }
}

impl fmt::Display for Eventable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.element_text.is_empty() {
            write!(f, "{}", self.name())
        } else {
            write!(f, "{} \"{}\"", self.name(), self.element_text)
        }
    }
}

/// An action discovered on a page that has not been fired yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateAction {
    pub identification: Identification,
    pub event_type: EventType,
    /// Lower-case tag name of the element.
    pub tag: String,
    pub text: String,
    #[serde(default)]
    pub related_form_inputs: Vec<FormInput>,
}

impl CandidateAction {
    pub fn new(identification: Identification, tag: impl Into<String>) -> Self {
        Self {
            identification,
            event_type: EventType::Click,
            tag: tag.into(),
            text: String::new(),
            related_form_inputs: Vec::new(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Key identifying the underlying element across states.
    pub fn element_key(&self) -> String {
        format!("{}|{}", self.tag, self.identification)
    }

    pub fn to_eventable(&self) -> Eventable {
        Eventable {
            identification: self.identification.clone(),
            event_type: self.event_type,
            related_form_inputs: self.related_form_inputs.clone(),
            element_text: self.text.clone(),
            source: None,
            target: None,
        }
    }
}

/// Errors raised by graph operations.
#[derive(thiserror::Error, Debug)]
pub enum GraphError {
    #[error("State not found: {0}")]
    StateNotFound(StateId),
}

pub type GraphResult<T> = Result<T, GraphError>;
