//! Command parameters.

use std::sync::Arc;

use crate::types::{PgType, TypeCodec};
use crate::value::Value;

/// How a parameter participates in a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Input,
    Output,
    InputOutput,
    ReturnValue,
}

impl Direction {
    /// Whether the parameter supplies a value to the server.
    pub fn is_input(self) -> bool {
        matches!(self, Direction::Input | Direction::InputOutput)
    }

    /// Whether the parameter receives a value from a function call.
    pub fn is_output(self) -> bool {
        matches!(self, Direction::Output | Direction::InputOutput)
    }
}

/// A named, typed value bound to a command.
///
/// `bound` tracks whether the current value is already encoded in the
/// command's Bind template. Every value change clears it.
#[derive(Debug, Clone)]
pub struct Parameter {
    name: String,
    direction: Direction,
    value: Value,
    size: u32,
    codec: Arc<dyn TypeCodec>,
    use_cast: bool,
    bound: bool,
}

/// Strip a leading `@` or `:` marker from a parameter name.
fn clean_name(name: &str) -> String {
    name.strip_prefix(['@', ':']).unwrap_or(name).to_string()
}

impl Parameter {
    /// A parameter whose backend type is inferred from `value`. No cast is emitted.
    pub fn new(name: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        let codec: Arc<dyn TypeCodec> = Arc::new(PgType::infer(&value));
        Self {
            name: clean_name(name),
            direction: Direction::Input,
            value,
            size: 0,
            codec,
            use_cast: false,
            bound: false,
        }
    }

    /// A parameter with an explicit builtin type, emitted with a `::type` cast.
    pub fn typed(name: &str, ty: PgType, value: impl Into<Value>) -> Self {
        Self::with_codec(name, Arc::new(ty), value)
    }

    /// A parameter with a caller-supplied codec, emitted with a cast.
    pub fn with_codec(name: &str, codec: Arc<dyn TypeCodec>, value: impl Into<Value>) -> Self {
        Self {
            codec,
            use_cast: true,
            ..Self::new(name, value)
        }
    }

    /// Set the direction.
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Set the size hint used by sized types such as `varchar(n)`.
    pub fn with_size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Replace the value; the parameter must be re-encoded on the next bind.
    pub fn set_value(&mut self, value: impl Into<Value>) {
        self.value = value.into();
        self.bound = false;
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn codec(&self) -> &dyn TypeCodec {
        self.codec.as_ref()
    }

    pub fn use_cast(&self) -> bool {
        self.use_cast
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    pub(crate) fn mark_bound(&mut self) {
        self.bound = true;
    }

    /// `(n)` suffix for sized types, or nothing.
    pub(crate) fn size_suffix(&self) -> Option<String> {
        (self.codec.uses_size() && self.size > 0).then(|| format!("({})", self.size))
    }

    /// Copy carrying the same settings but no bind state.
    pub(crate) fn unbound_clone(&self) -> Self {
        Self {
            codec: Arc::clone(&self.codec),
            name: self.name.clone(),
            value: self.value.clone(),
            bound: false,
            ..*self
        }
    }
}

/// Ordered, name-addressable parameters of one command.
#[derive(Debug, Clone, Default)]
pub struct ParameterSet {
    params: Vec<Parameter>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter and return its position.
    pub fn add(&mut self, param: Parameter) -> usize {
        self.params.push(param);
        self.params.len() - 1
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn clear(&mut self) {
        self.params.clear();
    }

    /// Position of the parameter called `name` (marker sigil optional).
    ///
    /// Exact matches win; otherwise names compare ASCII case-insensitively.
    pub fn position(&self, name: &str) -> Option<usize> {
        let name = name.strip_prefix(['@', ':']).unwrap_or(name);
        if name.is_empty() {
            return None;
        }
        self.params
            .iter()
            .position(|p| p.name == name)
            .or_else(|| self.params.iter().position(|p| p.name.eq_ignore_ascii_case(name)))
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.position(name).and_then(|i| self.params.get(i))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.position(name).and_then(|i| self.params.get_mut(i))
    }

    pub fn at(&self, index: usize) -> Option<&Parameter> {
        self.params.get(index)
    }

    pub fn at_mut(&mut self, index: usize) -> Option<&mut Parameter> {
        self.params.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Parameter> {
        self.params.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, Parameter> {
        self.params.iter_mut()
    }

    pub(crate) fn unbound_clone(&self) -> Self {
        Self {
            params: self.params.iter().map(Parameter::unbound_clone).collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ParameterSet {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.params.iter()
    }
}
