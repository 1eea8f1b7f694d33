//! Evaluates template trees against a data value

use super::parse::{Arg, Command, Node, Pipeline};
use super::{funcs, lexer, parse};
use serde_json::Value;
use std::collections::HashMap;

/// Nested `include`/`template` calls allowed before giving up
const MAX_DEPTH: usize = 100;

pub(super) struct State<'a> {
    defines: &'a HashMap<String, Vec<Node>>,
    vars: Vec<(String, Value)>,
    depth: usize,
}

impl<'a> State<'a> {
    pub(super) fn new(defines: &'a HashMap<String, Vec<Node>>, root: &Value) -> Self {
        Self {
            defines,
            vars: vec![("$".to_string(), root.clone())],
            depth: 0,
        }
    }

    pub(super) fn walk(&mut self, nodes: &[Node], dot: &Value, out: &mut String) -> Result<(), String> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Action(pipe) => {
                    let value = self.pipeline(pipe, dot)?;
                    if pipe.decl.is_empty() {
                        out.push_str(&funcs::to_display(&value));
                    }
                }
                Node::If { branches, otherwise } => {
                    let mark = self.vars.len();
                    let mut taken = false;
                    for (condition, body) in branches {
                        if funcs::truthy(&self.pipeline(condition, dot)?) {
                            self.walk(body, dot, out)?;
                            taken = true;
                            break;
                        }
                    }
                    if !taken {
                        self.walk(otherwise, dot, out)?;
                    }
                    self.vars.truncate(mark);
                }
                Node::With { pipe, body, otherwise } => {
                    let mark = self.vars.len();
                    let value = self.pipeline(pipe, dot)?;
                    if funcs::truthy(&value) {
                        self.walk(body, &value, out)?;
                    } else {
                        self.walk(otherwise, dot, out)?;
                    }
                    self.vars.truncate(mark);
                }
                Node::Range { pipe, body, otherwise } => self.range(pipe, body, otherwise, dot, out)?,
                Node::Template { name, pipe } => {
                    let data = match pipe {
                        Some(pipe) => self.pipeline(pipe, dot)?,
                        None => Value::Null,
                    };
                    out.push_str(&self.include(name, &data)?);
                }
            }
        }
        Ok(())
    }

    fn range(
        &mut self,
        pipe: &Pipeline,
        body: &[Node],
        otherwise: &[Node],
        dot: &Value,
        out: &mut String,
    ) -> Result<(), String> {
        let mark = self.vars.len();
        let collection = self.evaluate(pipe, dot)?;
        // Declared variables are bound per element, not to the collection
        for name in &pipe.decl {
            self.vars.push((name.clone(), Value::Null));
        }

        let elements: Vec<(Value, Value)> = match collection {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| (Value::from(i), item))
                .collect(),
            Value::Object(map) => map.into_iter().map(|(k, v)| (Value::String(k), v)).collect(),
            Value::Number(n) => (0..n.as_i64().unwrap_or_default())
                .map(|i| (Value::from(i), Value::from(i)))
                .collect(),
            Value::Null => Vec::new(),
            other => return Err(format!("range can't iterate over {}", funcs::to_display(&other))),
        };

        if elements.is_empty() {
            self.walk(otherwise, dot, out)?;
        }
        for (key, element) in elements {
            match pipe.decl.as_slice() {
                [value_var] => self.set(value_var, element.clone())?,
                [key_var, value_var] => {
                    self.set(key_var, key)?;
                    self.set(value_var, element.clone())?;
                }
                _ => {}
            }
            let inner = self.vars.len();
            self.walk(body, &element, out)?;
            self.vars.truncate(inner);
        }

        self.vars.truncate(mark);
        Ok(())
    }

    /// Render a named template into a string
    pub(super) fn include(&mut self, name: &str, data: &Value) -> Result<String, String> {
        let body = self
            .defines
            .get(name)
            .ok_or_else(|| format!("no template {:?} associated with template", name))?;
        if self.depth >= MAX_DEPTH {
            return Err(format!("exceeded max template depth rendering {:?}", name));
        }

        let saved = std::mem::replace(&mut self.vars, vec![("$".to_string(), data.clone())]);
        self.depth += 1;
        let mut out = String::new();
        let result = self.walk(body, data, &mut out);
        self.depth -= 1;
        self.vars = saved;
        result.map(|_| out)
    }

    /// Evaluate a pipeline and apply its declaration, if any
    fn pipeline(&mut self, pipe: &Pipeline, dot: &Value) -> Result<Value, String> {
        let value = self.evaluate(pipe, dot)?;
        if let Some(name) = pipe.decl.first() {
            if pipe.assign {
                self.set(name, value.clone())?;
            } else {
                self.vars.push((name.clone(), value.clone()));
            }
        }
        Ok(value)
    }

    fn evaluate(&mut self, pipe: &Pipeline, dot: &Value) -> Result<Value, String> {
        let mut piped: Option<Value> = None;
        for command in &pipe.commands {
            piped = Some(self.command(command, dot, piped)?);
        }
        Ok(piped.unwrap_or(Value::Null))
    }

    fn command(&mut self, command: &Command, dot: &Value, piped: Option<Value>) -> Result<Value, String> {
        let (first, rest) = command
            .args
            .split_first()
            .ok_or_else(|| "empty command".to_string())?;

        let Arg::Function(name) = first else {
            if rest.is_empty() && piped.is_none() {
                return self.arg(first, dot);
            }
            return self.method(first, rest, dot, piped);
        };

        if !funcs::exists(name) {
            return Err(format!("function {:?} not defined", name));
        }

        let mut args = Vec::with_capacity(rest.len() + 1);
        for arg in rest {
            args.push(self.arg(arg, dot)?);
        }
        args.extend(piped);

        match name.as_str() {
            "include" | "tpl" => {
                let text = args.first().map(funcs::to_display).unwrap_or_default();
                let data = args.get(1).cloned().unwrap_or(Value::Null);
                let rendered = if name == "include" {
                    self.include(&text, &data)
                } else {
                    self.tpl(&text, &data)
                };
                return rendered.map(Value::String);
            }
            _ => {}
        }

        let result = funcs::call(name, args)?;
        // Sprig mutates the map in place; variables see the change
        if matches!(
            funcs::canonical(name).as_str(),
            "set" | "unset" | "merge" | "mergeOverwrite"
        ) {
            if let Some(Arg::Variable(var, fields)) = rest.first() {
                self.write_back(var, fields, result.clone())?;
            }
        }
        Ok(result)
    }

    /// Render `source` as an inline template; it sees every `define`
    fn tpl(&mut self, source: &str, data: &Value) -> Result<String, String> {
        if self.depth >= MAX_DEPTH {
            return Err("exceeded max template depth rendering tpl".to_string());
        }
        let tree = parse::parse(lexer::lex(source)?)?;
        let mut defines = self.defines.clone();
        defines.extend(tree.defines);

        let mut state = State {
            defines: &defines,
            vars: vec![("$".to_string(), data.clone())],
            depth: self.depth + 1,
        };
        let mut out = String::new();
        state.walk(&tree.root, data, &mut out)?;
        Ok(out)
    }

    /// `.Capabilities.APIVersions.Has "apps/v1"`
    fn method(
        &mut self,
        receiver: &Arg,
        rest: &[Arg],
        dot: &Value,
        piped: Option<Value>,
    ) -> Result<Value, String> {
        let (base, fields) = match receiver {
            Arg::Field(fields) => (dot.clone(), fields.as_slice()),
            Arg::Variable(name, fields) => (self.lookup(name)?, fields.as_slice()),
            _ => return Err("can't give argument to non-function".to_string()),
        };
        let Some((method, path)) = fields.split_last().filter(|(method, _)| method.as_str() == "Has") else {
            return Err("can't give argument to non-function".to_string());
        };

        let mut args = Vec::with_capacity(rest.len() + 1);
        for arg in rest {
            args.push(self.arg(arg, dot)?);
        }
        args.extend(piped);
        let [needle] = args.as_slice() else {
            return Err(format!("wrong number of args for {}: want 1 got {}", method, args.len()));
        };

        match field_chain(base, path)? {
            Value::Array(items) => {
                let needle = funcs::to_display(needle);
                Ok(Value::Bool(items.iter().any(|item| funcs::to_display(item) == needle)))
            }
            other => Err(format!("can't call method {} on {}", method, funcs::to_display(&other))),
        }
    }

    fn arg(&mut self, arg: &Arg, dot: &Value) -> Result<Value, String> {
        match arg {
            Arg::Field(fields) => field_chain(dot.clone(), fields),
            Arg::Variable(name, fields) => {
                let value = self.lookup(name)?;
                field_chain(value, fields)
            }
            Arg::Function(name) => self.command(
                &Command {
                    args: vec![Arg::Function(name.clone())],
                },
                dot,
                None,
            ),
            Arg::Literal(value) => Ok(value.clone()),
            Arg::Nested(pipe, fields) => {
                let value = self.evaluate(pipe, dot)?;
                field_chain(value, fields)
            }
        }
    }

    fn lookup(&self, name: &str) -> Result<Value, String> {
        self.vars
            .iter()
            .rev()
            .find(|(var, _)| var == name)
            .map(|(_, value)| value.clone())
            .ok_or_else(|| format!("undefined variable: {}", name))
    }

    /// Store `value` at `$name.fields...`, creating maps on the way
    fn write_back(&mut self, name: &str, fields: &[String], value: Value) -> Result<(), String> {
        let slot = self
            .vars
            .iter_mut()
            .rev()
            .find(|(var, _)| var == name)
            .ok_or_else(|| format!("undefined variable: {}", name))?;
        let mut target = &mut slot.1;
        for field in fields {
            target = match target {
                Value::Object(map) => map.entry(field.clone()).or_insert(Value::Null),
                _ => return Ok(()),
            };
        }
        *target = value;
        Ok(())
    }

    fn set(&mut self, name: &str, value: Value) -> Result<(), String> {
        let slot = self
            .vars
            .iter_mut()
            .rev()
            .find(|(var, _)| var == name)
            .ok_or_else(|| format!("undefined variable: {}", name))?;
        slot.1 = value;
        Ok(())
    }
}

/// Follow `.a.b.c`; missing keys and nil yield nil
fn field_chain(mut value: Value, fields: &[String]) -> Result<Value, String> {
    for field in fields {
        value = match value {
            Value::Object(mut map) => map.remove(field).unwrap_or(Value::Null),
            Value::Null => Value::Null,
            other => {
                return Err(format!(
                    "can't evaluate field {} in {}",
                    field,
                    funcs::to_display(&other)
                ))
            }
        };
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helm::template::{lexer, parse};
    use serde_json::json;

    fn render(source: &str, data: Value) -> Result<String, String> {
        let tree = parse::parse(lexer::lex(source)?)?;
        let defines: HashMap<String, Vec<Node>> = tree.defines.into_iter().collect();
        let mut state = State::new(&defines, &data);
        let mut out = String::new();
        state.walk(&tree.root, &data, &mut out)?;
        Ok(out)
    }

    #[test]
    fn test_fields_and_missing_values() {
        let data = json!({"Values": {"replicaCount": 3}});
        assert_eq!(render("replicas: {{ .Values.replicaCount }}", data.clone()).unwrap(), "replicas: 3");
        assert_eq!(render("x: {{ .Values.missing.deeper }}", data).unwrap(), "x: ");
    }

    #[test]
    fn test_if_with_and_else() {
        let data = json!({"Values": {"enabled": false, "name": "web"}});
        assert_eq!(
            render("{{ if .Values.enabled }}on{{ else }}off{{ end }}", data.clone()).unwrap(),
            "off"
        );
        assert_eq!(
            render("{{ with .Values.name }}name={{ . }}{{ end }}", data).unwrap(),
            "name=web"
        );
    }

    #[test]
    fn test_range_over_map_and_list() {
        let data = json!({"env": {"B": "2", "A": "1"}, "ports": [80, 443]});
        assert_eq!(
            render("{{ range $k, $v := .env }}{{ $k }}={{ $v }};{{ end }}", data.clone()).unwrap(),
            "A=1;B=2;"
        );
        assert_eq!(
            render("{{ range .ports }}[{{ . }}]{{ end }}", data.clone()).unwrap(),
            "[80][443]"
        );
        assert_eq!(render("{{ range .none }}x{{ else }}empty{{ end }}", data).unwrap(), "empty");
    }

    #[test]
    fn test_root_variable_inside_range() {
        let data = json!({"Release": {"Name": "rel"}, "items": ["a"]});
        assert_eq!(
            render("{{ range .items }}{{ $.Release.Name }}-{{ . }}{{ end }}", data).unwrap(),
            "rel-a"
        );
    }

    #[test]
    fn test_define_and_include() {
        let source = r#"{{- define "app.fullname" -}}{{ .Release.Name }}-{{ .Chart.Name | trunc 63 }}{{- end -}}
name: {{ include "app.fullname" . | quote }}"#;
        let data = json!({"Release": {"Name": "rel"}, "Chart": {"Name": "web"}});
        assert_eq!(render(source, data).unwrap(), "name: \"rel-web\"");
    }

    #[test]
    fn test_variable_assignment() {
        let out = render("{{ $x := 1 }}{{ $x = 2 }}{{ $x }}", json!({})).unwrap();
        assert_eq!(out, "2");
    }

    #[test]
    fn test_set_updates_the_variable() {
        let source = r#"{{ $d := dict "a" 1 }}{{ $_ := set $d "b" 2 }}{{ $_ := unset $d "a" }}{{ toJson $d }}"#;
        assert_eq!(render(source, json!({})).unwrap(), r#"{"b":2}"#);

        let source = r#"{{ $_ := merge $.Values (dict "extra" "x") }}{{ .Values.port }}/{{ $.Values.extra }}"#;
        assert_eq!(render(source, json!({"Values": {"port": 80}})).unwrap(), "80/x");
    }

    #[test]
    fn test_tpl_renders_values_as_templates() {
        let source = r#"{{- define "greeting" }}hi{{ end -}}
{{ tpl .Values.banner . }}"#;
        let data = json!({"Values": {"banner": "{{ include \"greeting\" . }} {{ .Release.Name }}"}, "Release": {"Name": "rel"}});
        assert_eq!(render(source, data).unwrap(), "hi rel");
    }

    #[test]
    fn test_has_method_on_lists() {
        let data = json!({"Capabilities": {"APIVersions": ["v1", "apps/v1"]}});
        assert_eq!(
            render(r#"{{ .Capabilities.APIVersions.Has "apps/v1" }}-{{ $.Capabilities.APIVersions.Has "batch/v1" }}"#, data.clone()).unwrap(),
            "true-false"
        );
        assert!(render(r#"{{ .Capabilities.Other "x" }}"#, data).is_err());
    }

    #[test]
    fn test_unknown_function_is_an_error() {
        assert!(render("{{ frobnicate . }}", json!({})).is_err());
    }

    #[test]
    fn test_recursion_is_bounded() {
        let source = r#"{{ define "loop" }}{{ include "loop" . }}{{ end }}{{ include "loop" . }}"#;
        assert!(render(source, json!({})).unwrap_err().contains("max template depth"));
    }
}
