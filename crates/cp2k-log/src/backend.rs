//! The storage boundary: everything the parser extracts leaves through
//! [`Backend`].

use crate::ir::{BackendEvent, ParseStatus, ParserInfo};
use crate::value::{ArrayValue, Value};
use serde_json::{Map, Value as Json};
use std::collections::{HashSet, VecDeque};

/// Receives section and value events.
///
/// Section indices are chosen by the caller of `open_section_with_gindex`;
/// `open_section` lets a backend hand out its own.
pub trait Backend {
    fn started_parsing_session(&mut self, _main_file: Option<&str>, _parser: &ParserInfo) {}

    fn finished_parsing_session(&mut self, _status: ParseStatus, _errors: &[String]) {}

    fn open_section(&mut self, name: &str) -> usize;

    fn open_section_with_gindex(&mut self, name: &str, index: usize);

    fn close_section(&mut self, name: &str, index: usize);

    fn add_value(&mut self, name: &str, value: &Value, index: usize);

    fn add_array_values(&mut self, name: &str, values: &ArrayValue, index: usize);
}

impl<B: Backend + ?Sized> Backend for &mut B {
    fn started_parsing_session(&mut self, main_file: Option<&str>, parser: &ParserInfo) {
        (**self).started_parsing_session(main_file, parser)
    }

    fn finished_parsing_session(&mut self, status: ParseStatus, errors: &[String]) {
        (**self).finished_parsing_session(status, errors)
    }

    fn open_section(&mut self, name: &str) -> usize {
        (**self).open_section(name)
    }

    fn open_section_with_gindex(&mut self, name: &str, index: usize) {
        (**self).open_section_with_gindex(name, index)
    }

    fn close_section(&mut self, name: &str, index: usize) {
        (**self).close_section(name, index)
    }

    fn add_value(&mut self, name: &str, value: &Value, index: usize) {
        (**self).add_value(name, value, index)
    }

    fn add_array_values(&mut self, name: &str, values: &ArrayValue, index: usize) {
        (**self).add_array_values(name, values, index)
    }
}

/// Records every call in order.
#[derive(Debug, Default)]
pub struct EventRecorder {
    events: VecDeque<BackendEvent>,
    next_index: usize,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> impl Iterator<Item = &BackendEvent> {
        self.events.iter()
    }

    pub fn into_events(self) -> Vec<BackendEvent> {
        self.events.into()
    }

    pub fn pop_front(&mut self) -> Option<BackendEvent> {
        self.events.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn push(&mut self, event: BackendEvent) {
        self.events.push_back(event);
    }
}

impl Backend for EventRecorder {
    fn started_parsing_session(&mut self, main_file: Option<&str>, parser: &ParserInfo) {
        self.push(BackendEvent::StartedParsingSession {
            main_file: main_file.map(str::to_string),
            parser: parser.clone(),
        });
    }

    fn finished_parsing_session(&mut self, status: ParseStatus, errors: &[String]) {
        self.push(BackendEvent::FinishedParsingSession {
            status,
            errors: errors.to_vec(),
        });
    }

    fn open_section(&mut self, name: &str) -> usize {
        let index = self.next_index;
        self.open_section_with_gindex(name, index);
        index
    }

    fn open_section_with_gindex(&mut self, name: &str, index: usize) {
        self.next_index = self.next_index.max(index + 1);
        self.push(BackendEvent::OpenSection {
            name: name.to_string(),
            index,
        });
    }

    fn close_section(&mut self, name: &str, index: usize) {
        self.push(BackendEvent::CloseSection {
            name: name.to_string(),
            index,
        });
    }

    fn add_value(&mut self, name: &str, value: &Value, index: usize) {
        self.push(BackendEvent::AddValue {
            name: name.to_string(),
            value: value.clone(),
            index,
        });
    }

    fn add_array_values(&mut self, name: &str, values: &ArrayValue, index: usize) {
        self.push(BackendEvent::AddArrayValues {
            name: name.to_string(),
            values: values.clone(),
            index,
        });
    }
}

#[derive(Debug)]
struct TreeNode {
    name: String,
    index: usize,
    fields: Map<String, Json>,
    repeated: HashSet<String>,
}

/// Builds a nested JSON document: every section becomes an object, stored in
/// an array under its name inside the parent. Repeated values of the same
/// quantity are collected into an array.
#[derive(Debug, Default)]
pub struct JsonTreeBackend {
    open: Vec<TreeNode>,
    roots: Map<String, Json>,
    next_index: usize,
    status: Option<ParseStatus>,
}

impl JsonTreeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> Option<ParseStatus> {
        self.status
    }

    /// The finished document. Sections still open are attached as they are.
    pub fn into_json(mut self) -> Json {
        while let Some(node) = self.open.pop() {
            self.attach(node);
        }
        Json::Object(self.roots)
    }

    fn node_mut(&mut self, index: usize) -> Option<&mut TreeNode> {
        self.open.iter_mut().rev().find(|n| n.index == index)
    }

    fn set_field(&mut self, name: &str, json: Json, index: usize) {
        let Some(node) = self.node_mut(index) else {
            log::warn!("value `{name}` targets section #{index}, which is not open");
            return;
        };
        match node.fields.get_mut(name) {
            Some(Json::Array(items)) if node.repeated.contains(name) => items.push(json),
            Some(existing) => {
                let previous = existing.take();
                *existing = Json::Array(vec![previous, json]);
                node.repeated.insert(name.to_string());
            }
            None => {
                node.fields.insert(name.to_string(), json);
            }
        }
    }

    fn attach(&mut self, node: TreeNode) {
        let mut object = node.fields;
        object.insert("gIndex".to_string(), Json::from(node.index));
        let target = match self.open.last_mut() {
            Some(parent) => &mut parent.fields,
            None => &mut self.roots,
        };
        match target.get_mut(&node.name) {
            Some(Json::Array(items)) => items.push(Json::Object(object)),
            _ => {
                target.insert(node.name, Json::Array(vec![Json::Object(object)]));
            }
        }
    }
}

impl Backend for JsonTreeBackend {
    fn finished_parsing_session(&mut self, status: ParseStatus, _errors: &[String]) {
        self.status = Some(status);
    }

    fn open_section(&mut self, name: &str) -> usize {
        let index = self.next_index;
        self.open_section_with_gindex(name, index);
        index
    }

    fn open_section_with_gindex(&mut self, name: &str, index: usize) {
        self.next_index = self.next_index.max(index + 1);
        self.open.push(TreeNode {
            name: name.to_string(),
            index,
            fields: Map::new(),
            repeated: HashSet::new(),
        });
    }

    fn close_section(&mut self, name: &str, index: usize) {
        let Some(pos) = self.open.iter().rposition(|n| n.index == index) else {
            log::warn!("close of `{name}` #{index}, which is not open");
            return;
        };
        while self.open.len() > pos {
            if let Some(node) = self.open.pop() {
                self.attach(node);
            }
        }
    }

    fn add_value(&mut self, name: &str, value: &Value, index: usize) {
        let json = serde_json::to_value(value).unwrap_or(Json::Null);
        self.set_field(name, json, index);
    }

    fn add_array_values(&mut self, name: &str, values: &ArrayValue, index: usize) {
        let json = match values {
            ArrayValue::Float { values, shape } => nest(values, shape),
            ArrayValue::Str(items) => Json::from(items.clone()),
        };
        self.set_field(name, json, index);
    }
}

/// Reshapes a flat array into nested JSON arrays.
fn nest(values: &[f64], shape: &[usize]) -> Json {
    match shape {
        [] | [_] => Json::from(values.to_vec()),
        [_, rest @ ..] => {
            let stride: usize = rest.iter().product();
            if stride == 0 {
                return Json::Array(Vec::new());
            }
            Json::Array(values.chunks(stride).map(|c| nest(c, rest)).collect())
        }
    }
}
