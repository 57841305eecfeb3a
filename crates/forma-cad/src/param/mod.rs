//! Parameter/expression environment
//!
//! Named scalar parameters whose values come from `evalexpr` expressions that
//! may reference other parameters. Evaluation never fails as a whole: each
//! parameter that cannot be evaluated gets its own [`ParamError`] and keeps
//! its last good value.
//!
//! Edits return a new environment and leave the receiver untouched.

use std::collections::{BTreeMap, BTreeSet};
use std::iter::Peekable;
use std::str::Chars;

use evalexpr::{ContextWithMutableVariables, HashMapContext, Node, Value, build_operator_tree};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Names an expression may use without a parameter defining them
const BUILTIN_CONSTANTS: [(&str, f64); 2] =
    [("PI", std::f64::consts::PI), ("E", std::f64::consts::E)];

/// Words that cannot be parameter names
const RESERVED: [&str; 4] = ["PI", "E", "true", "false"];

/// Errors from parameter edits and evaluation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    #[error("Invalid parameter name '{0}'")]
    InvalidName(String),

    #[error("Parameter name '{0}' is already in use")]
    DuplicateName(String),

    #[error("Parameter not found: {0}")]
    NotFound(Uuid),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unknown name '{0}'")]
    UnknownName(String),

    #[error("Circular dependency: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Expected a number, got {0}")]
    NotNumeric(String),

    #[error("Depends on failing parameter '{0}'")]
    Upstream(String),
}

/// A named scalar parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub id: Uuid,
    pub name: String,
    pub expression: String,
    /// Last successfully evaluated value
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// Fields of a parameter to change; `None` leaves a field as is
#[derive(Debug, Clone, Default)]
pub struct ParamPatch {
    pub name: Option<String>,
    pub expression: Option<String>,
    pub unit: Option<Option<String>>,
}

impl ParamPatch {
    pub fn expression(expression: impl Into<String>) -> Self {
        Self {
            expression: Some(expression.into()),
            ..Self::default()
        }
    }

    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

/// The parameter environment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Parameter>", into = "Vec<Parameter>")]
pub struct ParamEnv {
    params: Vec<Parameter>,
    errors: BTreeMap<Uuid, ParamError>,
}

impl From<Vec<Parameter>> for ParamEnv {
    fn from(params: Vec<Parameter>) -> Self {
        let mut env = Self {
            params,
            errors: BTreeMap::new(),
        };
        env.evaluate();
        env
    }
}

impl From<ParamEnv> for Vec<Parameter> {
    fn from(env: ParamEnv) -> Self {
        env.params
    }
}

fn validate_name(name: &str) -> Result<(), ParamError> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !RESERVED.contains(&name);
    if valid {
        Ok(())
    } else {
        Err(ParamError::InvalidName(name.to_string()))
    }
}

fn parse(expression: &str) -> Result<Node, ParamError> {
    build_operator_tree(&float_literals(expression)).map_err(|e| ParamError::Parse(e.to_string()))
}

/// Rewrite integer literals as floats
///
/// evalexpr keeps integer arithmetic for integer operands, so `10 / 4`
/// would truncate to 2. Identifiers such as `w2` are left alone.
fn float_literals(expression: &str) -> String {
    fn push_digits(out: &mut String, chars: &mut Peekable<Chars<'_>>) {
        while let Some(digit) = chars.next_if(char::is_ascii_digit) {
            out.push(digit);
        }
    }

    let mut out = String::with_capacity(expression.len() + 8);
    let mut chars = expression.chars().peekable();
    let mut prev: Option<char> = None;
    let mut in_string = false;
    while let Some(c) = chars.next() {
        out.push(c);
        if c == '"' {
            in_string = !in_string;
        }
        let starts_number = !in_string
            && c.is_ascii_digit()
            && !prev.is_some_and(|p| p.is_alphanumeric() || p == '_' || p == '.');
        prev = Some(c);
        if !starts_number {
            continue;
        }

        let mut float = false;
        push_digits(&mut out, &mut chars);
        if let Some(dot) = chars.next_if_eq(&'.') {
            out.push(dot);
            push_digits(&mut out, &mut chars);
            float = true;
        }
        if let Some(e) = chars.next_if(|&n| n == 'e' || n == 'E') {
            out.push(e);
            if let Some(sign) = chars.next_if(|&n| n == '+' || n == '-') {
                out.push(sign);
            }
            push_digits(&mut out, &mut chars);
            float = true;
        }
        let suffix = chars.peek().is_some_and(|&n| n == '_' || n.is_alphanumeric());
        if !float && !suffix {
            out.push_str(".0");
        }
        prev = out.chars().next_back();
    }
    out
}

/// Variable names an expression uses, minus the built-in constants
fn identifiers(node: &Node) -> BTreeSet<String> {
    node.iter_variable_identifiers()
        .filter(|name| !BUILTIN_CONSTANTS.iter().any(|(c, _)| c == name))
        .map(str::to_string)
        .collect()
}

/// Evaluate `node` with the given variable bindings
fn eval_node<'a>(
    node: &Node,
    bindings: impl IntoIterator<Item = (&'a str, f64)>,
) -> Result<f64, ParamError> {
    let mut context = HashMapContext::new();
    for (name, value) in BUILTIN_CONSTANTS {
        context
            .set_value(name.to_string(), Value::Float(value))
            .map_err(|e| ParamError::Evaluation(e.to_string()))?;
    }
    for (name, value) in bindings {
        context
            .set_value(name.to_string(), Value::Float(value))
            .map_err(|e| ParamError::Evaluation(e.to_string()))?;
    }
    let value = node
        .eval_with_context(&context)
        .map_err(|e| ParamError::Evaluation(e.to_string()))?;
    match value {
        Value::Float(f) if f.is_finite() => Ok(f),
        Value::Float(f) => Err(ParamError::Evaluation(format!("result is {f}"))),
        Value::Int(i) => Ok(i as f64),
        other => Err(ParamError::NotNumeric(format!("{other:?}"))),
    }
}

impl ParamEnv {
    pub fn new() -> Self {
        Self::default()
    }

    // ========== Edits ==========

    /// Add a parameter holding a literal value
    pub fn add_param(&self, name: &str, initial_value: f64) -> Result<(Self, Uuid), ParamError> {
        validate_name(name)?;
        if self.by_name(name).is_some() {
            return Err(ParamError::DuplicateName(name.to_string()));
        }
        let id = Uuid::new_v4();
        let mut next = self.clone();
        next.params.push(Parameter {
            id,
            name: name.to_string(),
            expression: format!("{initial_value:?}"),
            value: initial_value,
            unit: None,
        });
        next.evaluate();
        tracing::debug!("added parameter {} = {}", name, initial_value);
        Ok((next, id))
    }

    /// Change a parameter's name, expression or unit
    ///
    /// Renaming does not rewrite expressions that use the old name; they
    /// report [`ParamError::UnknownName`] until fixed.
    pub fn update_param(&self, id: Uuid, patch: ParamPatch) -> Result<Self, ParamError> {
        let index = self.index_of(id)?;
        if let Some(name) = &patch.name {
            validate_name(name)?;
            if self.by_name(name).is_some_and(|p| p.id != id) {
                return Err(ParamError::DuplicateName(name.clone()));
            }
        }

        let mut next = self.clone();
        let param = &mut next.params[index];
        if let Some(name) = patch.name {
            param.name = name;
        }
        if let Some(expression) = patch.expression {
            param.expression = expression;
        }
        if let Some(unit) = patch.unit {
            param.unit = unit;
        }
        next.evaluate();
        Ok(next)
    }

    pub fn remove_param(&self, id: Uuid) -> Result<Self, ParamError> {
        let index = self.index_of(id)?;
        let mut next = self.clone();
        next.params.remove(index);
        next.evaluate();
        Ok(next)
    }

    // ========== Evaluation ==========

    /// Re-parse and re-evaluate every expression
    pub fn evaluate(&mut self) {
        let names: BTreeMap<&str, usize> = self
            .params
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name.as_str(), i))
            .collect();

        let mut errors: BTreeMap<usize, ParamError> = BTreeMap::new();
        let mut nodes: Vec<Option<Node>> = Vec::with_capacity(self.params.len());
        let mut deps: Vec<Vec<usize>> = Vec::with_capacity(self.params.len());

        for (i, param) in self.params.iter().enumerate() {
            let node = match parse(&param.expression) {
                Ok(node) => node,
                Err(e) => {
                    errors.insert(i, e);
                    nodes.push(None);
                    deps.push(Vec::new());
                    continue;
                }
            };
            let mut resolved = Vec::new();
            for name in identifiers(&node) {
                match names.get(name.as_str()) {
                    Some(&dep) => resolved.push(dep),
                    None => {
                        errors.entry(i).or_insert(ParamError::UnknownName(name));
                    }
                }
            }
            nodes.push(Some(node));
            deps.push(resolved);
        }

        for i in 0..self.params.len() {
            if let Some(cycle) = self.cycle_through(i, &deps) {
                errors.insert(i, ParamError::Cycle(cycle));
            }
        }

        let mut memo: Vec<Option<Result<f64, ParamError>>> = vec![None; self.params.len()];
        let results: Vec<Result<f64, ParamError>> = (0..self.params.len())
            .map(|i| self.evaluate_one(i, &nodes, &deps, &errors, &mut memo))
            .collect();

        self.errors.clear();
        for (param, result) in self.params.iter_mut().zip(results) {
            match result {
                Ok(value) => param.value = value,
                Err(e) => {
                    tracing::debug!("parameter {} failed: {}", param.name, e);
                    self.errors.insert(param.id, e);
                }
            }
        }
    }

    /// Names along a dependency path from `start` back to itself, if any
    fn cycle_through(&self, start: usize, deps: &[Vec<usize>]) -> Option<Vec<String>> {
        let mut path = vec![start];
        let mut visited = BTreeSet::new();
        if self.find_path(start, start, deps, &mut path, &mut visited) {
            Some(path.iter().map(|&i| self.params[i].name.clone()).collect())
        } else {
            None
        }
    }

    fn find_path(
        &self,
        current: usize,
        target: usize,
        deps: &[Vec<usize>],
        path: &mut Vec<usize>,
        visited: &mut BTreeSet<usize>,
    ) -> bool {
        for &next in &deps[current] {
            if next == target {
                path.push(next);
                return true;
            }
            if visited.insert(next) {
                path.push(next);
                if self.find_path(next, target, deps, path, visited) {
                    return true;
                }
                path.pop();
            }
        }
        false
    }

    fn evaluate_one(
        &self,
        i: usize,
        nodes: &[Option<Node>],
        deps: &[Vec<usize>],
        errors: &BTreeMap<usize, ParamError>,
        results: &mut Vec<Option<Result<f64, ParamError>>>,
    ) -> Result<f64, ParamError> {
        if let Some(done) = &results[i] {
            return done.clone();
        }
        let result = if let Some(e) = errors.get(&i) {
            Err(e.clone())
        } else {
            let mut bindings = Vec::with_capacity(deps[i].len());
            let mut upstream = None;
            for &dep in &deps[i] {
                match self.evaluate_one(dep, nodes, deps, errors, results) {
                    Ok(value) => bindings.push((self.params[dep].name.as_str(), value)),
                    Err(_) => {
                        upstream = Some(ParamError::Upstream(self.params[dep].name.clone()));
                        break;
                    }
                }
            }
            match (upstream, &nodes[i]) {
                (Some(e), _) => Err(e),
                (None, Some(node)) => eval_node(node, bindings),
                (None, None) => Err(ParamError::Parse(self.params[i].expression.clone())),
            }
        };
        results[i] = Some(result.clone());
        result
    }

    // ========== Queries ==========

    fn index_of(&self, id: Uuid) -> Result<usize, ParamError> {
        self.params
            .iter()
            .position(|p| p.id == id)
            .ok_or(ParamError::NotFound(id))
    }

    pub fn get(&self, id: Uuid) -> Option<&Parameter> {
        self.params.iter().find(|p| p.id == id)
    }

    pub fn by_name(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Cached value of the parameter called `name`
    pub fn value_of(&self, name: &str) -> Option<f64> {
        self.by_name(name).map(|p| p.value)
    }

    /// Per-parameter errors from the last evaluation
    pub fn errors(&self) -> &BTreeMap<Uuid, ParamError> {
        &self.errors
    }

    pub fn error(&self, id: Uuid) -> Option<&ParamError> {
        self.errors.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// A dimensional value, either literal or driven by an expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    /// Literal value, used when there is no expression
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

impl From<f64> for Dimension {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

impl Dimension {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            expression: None,
        }
    }

    /// A dimension driven by `expression`
    pub fn expr(expression: impl Into<String>) -> Self {
        Self {
            value: 0.0,
            expression: Some(expression.into()),
        }
    }

    /// Current value against the cached parameter values in `env`
    pub fn resolve(&self, env: &ParamEnv) -> Result<f64, ParamError> {
        let Some(expression) = &self.expression else {
            return Ok(self.value);
        };
        let node = parse(expression)?;
        let mut bindings = Vec::new();
        for name in identifiers(&node) {
            let param = env
                .by_name(&name)
                .ok_or_else(|| ParamError::UnknownName(name.clone()))?;
            if env.error(param.id).is_some() {
                return Err(ParamError::Upstream(param.name.clone()));
            }
            bindings.push((param.name.as_str(), param.value));
        }
        eval_node(&node, bindings)
    }
}
