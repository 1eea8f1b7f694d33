//! Template function library
//!
//! The Go template builtins plus the Sprig functions charts lean on most.
//! `include` and `tpl` live in the executor because they render templates.
//! `lookup` has no cluster to ask and always yields an empty map, as
//! `helm template` does.

use base64::Engine as _;
use regex::Regex;
use semver::{Prerelease, Version, VersionReq};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;

const FUNCTIONS: &[&str] = &[
    "and", "or", "not", "eq", "ne", "lt", "le", "gt", "ge", "len", "index", "print", "printf",
    "println", "default", "empty", "required", "quote", "squote", "upper", "lower", "title",
    "trim", "trimPrefix", "trimSuffix", "trunc", "replace", "contains", "hasPrefix", "hasSuffix",
    "indent", "nindent", "toYaml", "toJson", "toString", "int", "int64", "float64", "list",
    "dict", "join", "ternary", "coalesce", "hasKey", "keys", "include", "tpl", "b64enc",
    "b64dec", "sha256sum", "add", "add1", "sub", "mul", "div", "mod", "max", "min", "floor",
    "ceil", "splitList", "split", "first", "last", "rest", "initial", "append", "prepend",
    "concat", "uniq", "has", "without", "compact", "reverse", "sortAlpha", "until",
    "regexMatch", "regexReplaceAll", "regexReplaceAllLiteral", "regexFind", "regexFindAll",
    "get", "set", "unset", "merge", "mergeOverwrite", "pluck", "values", "dig", "deepCopy",
    "fromYaml", "fromJson", "toPrettyJson", "toRawJson", "toStrings", "atoi", "cat", "nospace",
    "repeat", "substr", "trimAll", "kindIs", "kindOf", "all", "any", "fail", "lookup",
    "semverCompare",
];

/// `mustToJson` and friends resolve to the plain function, which already
/// reports errors
pub fn canonical(name: &str) -> String {
    if let Some(rest) = name.strip_prefix("must") {
        let mut chars = rest.chars();
        if let Some(first) = chars.next() {
            let base = format!("{}{}", first.to_ascii_lowercase(), chars.as_str());
            if FUNCTIONS.contains(&base.as_str()) {
                return base;
            }
        }
    }
    name.to_string()
}

pub fn exists(name: &str) -> bool {
    FUNCTIONS.contains(&canonical(name).as_str())
}

/// Go truthiness: false, 0, nil and empty strings/lists/maps are false
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Text a value prints as; nil prints as nothing
pub fn to_display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => format_number(n),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => format!(
            "[{}]",
            items.iter().map(to_display).collect::<Vec<_>>().join(" ")
        ),
        Value::Object(map) => format!(
            "map[{}]",
            map.iter()
                .map(|(k, v)| format!("{}:{}", k, to_display(v)))
                .collect::<Vec<_>>()
                .join(" ")
        ),
    }
}

fn format_number(n: &serde_json::Number) -> String {
    match (n.as_i64(), n.as_u64(), n.as_f64()) {
        (Some(i), _, _) => i.to_string(),
        (_, Some(u), _) => u.to_string(),
        (_, _, Some(f)) if f.fract() == 0.0 && f.abs() < 1e21 => format!("{}", f as i64),
        (_, _, Some(f)) => f.to_string(),
        _ => n.to_string(),
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn as_int(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or_default(),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .ok()
            .or_else(|| s.trim().parse::<f64>().ok().map(|f| f as i64))
            .unwrap_or_default(),
        Value::Bool(b) => i64::from(*b),
        _ => 0,
    }
}

fn as_float(value: &Value) -> f64 {
    match value {
        Value::String(s) => s.trim().parse::<f64>().unwrap_or_default(),
        other => as_f64(other).unwrap_or(as_int(other) as f64),
    }
}

fn float_value(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn equal(a: &Value, b: &Value) -> bool {
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Result<Ordering, String> {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => as_f64(a)
            .zip(as_f64(b))
            .and_then(|(x, y)| x.partial_cmp(&y))
            .ok_or_else(|| "incomparable numbers".to_string()),
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        _ => Err(format!(
            "incompatible types for comparison: {} and {}",
            type_name(a),
            type_name(b)
        )),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "nil",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "slice",
        Value::Object(_) => "map",
    }
}

/// Go reflect kind names as `kindOf` reports them
fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "invalid",
        Value::Number(n) if n.is_f64() => "float64",
        Value::Number(_) => "int",
        other => type_name(other),
    }
}

fn list_arg(name: &str, value: &Value) -> Result<Vec<Value>, String> {
    match value {
        Value::Array(items) => Ok(items.clone()),
        Value::Null => Ok(Vec::new()),
        other => Err(format!("{}: cannot use {} as a list", name, type_name(other))),
    }
}

fn map_arg(name: &str, value: &Value) -> Result<Map<String, Value>, String> {
    match value {
        Value::Object(map) => Ok(map.clone()),
        Value::Null => Ok(Map::new()),
        other => Err(format!("{}: cannot use {} as a map", name, type_name(other))),
    }
}

fn regex(pattern: &str) -> Result<Regex, String> {
    Regex::new(pattern).map_err(|e| e.to_string())
}

/// Merge `source` into `target`; existing keys are kept unless `overwrite`
fn deep_merge(target: &mut Map<String, Value>, source: Map<String, Value>, overwrite: bool) {
    for (key, value) in source {
        let Some(existing) = target.get_mut(&key) else {
            target.insert(key, value);
            continue;
        };
        match (existing, value) {
            (Value::Object(inner), Value::Object(other)) => deep_merge(inner, other, overwrite),
            (existing, value) => {
                if overwrite || !truthy(existing) {
                    *existing = value;
                }
            }
        }
    }
}

/// Parsed YAML or JSON; failures come back as `{"Error": ...}`
fn decoded(result: Result<Value, String>) -> Value {
    match result {
        Ok(Value::Null) => Value::Object(Map::new()),
        Ok(value) => value,
        Err(message) => {
            let mut map = Map::new();
            map.insert("Error".to_string(), Value::String(message));
            Value::Object(map)
        }
    }
}

fn parse_version(text: &str) -> Result<Version, String> {
    let text = text.trim();
    let text = text.strip_prefix('v').unwrap_or(text);
    Version::parse(&pad_version(text))
        .map_err(|e| format!("invalid semantic version {:?}: {}", text, e))
}

/// `1.21-0` becomes `1.21.0-0`
fn pad_version(text: &str) -> String {
    let split = text.find(['-', '+']).unwrap_or(text.len());
    let (core, suffix) = text.split_at(split);
    let mut parts: Vec<&str> = core.split('.').collect();
    while parts.len() < 3 {
        parts.push("0");
    }
    format!("{}{}", parts.join("."), suffix)
}

const OPERATORS: &str = "=<>!~^";

/// Comparators of one `||` branch: `>= 1.2, < 2` and `1.2 - 1.4` forms
fn comparators(group: &str) -> Vec<String> {
    if let Some((low, high)) = group.split_once(" - ") {
        return vec![format!(">={}", low.trim()), format!("<={}", high.trim())];
    }
    let mut out = Vec::new();
    let mut operator = String::new();
    for token in group
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
    {
        if token.chars().all(|c| OPERATORS.contains(c)) {
            operator.push_str(token);
        } else {
            out.push(format!("{}{}", std::mem::take(&mut operator), token));
        }
    }
    out
}

fn comparator_matches(comparator: &str, version: &Version) -> Result<bool, String> {
    let split = comparator
        .find(|c: char| !OPERATORS.contains(c))
        .unwrap_or(comparator.len());
    let (operator, target) = comparator.split_at(split);
    let target = target.strip_prefix('v').unwrap_or(target);
    if matches!(target, "*" | "x" | "X") {
        return Ok(true);
    }
    if operator == "!=" {
        return Ok(*version != parse_version(target)?);
    }

    // A prerelease in the constraint lets prerelease versions through
    let prerelease = target.contains('-');
    let target = if prerelease {
        pad_version(target)
    } else {
        target.to_string()
    };
    let operator = if operator.is_empty() { "=" } else { operator };
    let requirement = VersionReq::parse(&format!("{}{}", operator, target))
        .map_err(|e| format!("improper constraint {:?}: {}", comparator, e))?;
    let mut candidate = version.clone();
    if prerelease {
        candidate.pre = Prerelease::EMPTY;
    }
    Ok(requirement.matches(&candidate))
}

/// Masterminds-style constraint check used by `semverCompare`
fn semver_compare(constraint: &str, version: &str) -> Result<bool, String> {
    let version = parse_version(version)?;
    for group in constraint.split("||") {
        let comparators = comparators(group);
        if comparators.is_empty() {
            return Err(format!("improper constraint: {}", constraint));
        }
        let mut matched = true;
        for comparator in &comparators {
            if !comparator_matches(comparator, &version)? {
                matched = false;
                break;
            }
        }
        if matched {
            return Ok(true);
        }
    }
    Ok(false)
}

fn arity(name: &str, args: &[Value], expected: usize) -> Result<(), String> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(format!(
            "wrong number of args for {}: want {} got {}",
            name,
            expected,
            args.len()
        ))
    }
}

fn string_arg(args: &[Value], index: usize) -> String {
    args.get(index).map(to_display).unwrap_or_default()
}

fn indent_text(spaces: i64, text: &str) -> String {
    let pad = " ".repeat(spaces.max(0) as usize);
    format!("{}{}", pad, text.replace('\n', &format!("\n{}", pad)))
}

fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut start = true;
    for c in text.chars() {
        if start && c.is_alphabetic() {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        start = c.is_whitespace();
    }
    out
}

/// Go `fmt.Sprint`: spaces go between operands when neither is a string
fn sprint(args: &[Value]) -> String {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 && !args[i - 1].is_string() && !arg.is_string() {
            out.push(' ');
        }
        out.push_str(&to_display(arg));
    }
    out
}

/// Subset of Go `fmt.Sprintf`: flags `-` and `0`, width, precision and the
/// verbs `s v d f g t q x`
pub fn sprintf(format: &str, args: &[Value]) -> String {
    let mut out = String::new();
    let mut chars = format.chars().peekable();
    let mut next_arg = 0;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }

        let mut left = false;
        let mut zero = false;
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => left = true,
                '0' => zero = true,
                '+' | ' ' | '#' => {}
                _ => break,
            }
            chars.next();
        }
        let mut width = String::new();
        while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
            width.push(d);
            chars.next();
        }
        let mut precision: Option<usize> = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut digits = String::new();
            while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                digits.push(d);
                chars.next();
            }
            precision = Some(digits.parse().unwrap_or(0));
        }
        let Some(verb) = chars.next() else {
            out.push_str("%!(NOVERB)");
            break;
        };

        let Some(arg) = args.get(next_arg) else {
            out.push_str(&format!("%!{}(MISSING)", verb));
            continue;
        };
        next_arg += 1;

        let text = match verb {
            'd' => as_int(arg).to_string(),
            'f' | 'F' => {
                let value = as_f64(arg).unwrap_or(as_int(arg) as f64);
                format!("{:.*}", precision.unwrap_or(6), value)
            }
            'g' | 'e' => as_f64(arg).map(|f| f.to_string()).unwrap_or_else(|| to_display(arg)),
            'q' => serde_json::to_string(&to_display(arg)).unwrap_or_default(),
            'x' => match arg {
                Value::Number(_) => format!("{:x}", as_int(arg)),
                _ => to_display(arg).bytes().map(|b| format!("{:02x}", b)).collect(),
            },
            't' => truthy(arg).to_string(),
            _ => {
                let text = to_display(arg);
                match precision {
                    Some(p) if verb == 's' => text.chars().take(p).collect(),
                    _ => text,
                }
            }
        };

        let width: usize = width.parse().unwrap_or(0);
        let len = text.chars().count();
        if len >= width {
            out.push_str(&text);
        } else if left {
            out.push_str(&text);
            out.push_str(&" ".repeat(width - len));
        } else {
            let fill = if zero && matches!(verb, 'd' | 'f' | 'F') { "0" } else { " " };
            out.push_str(&fill.repeat(width - len));
            out.push_str(&text);
        }
    }

    if next_arg < args.len() {
        let extra: Vec<String> = args[next_arg..].iter().map(to_display).collect();
        out.push_str(&format!("%!(EXTRA {})", extra.join(", ")));
    }
    out
}

fn to_yaml(value: &Value) -> Result<String, String> {
    match value {
        Value::Null => Ok("null".to_string()),
        _ => serde_yaml::to_string(value)
            .map(|s| s.trim_end_matches('\n').to_string())
            .map_err(|e| e.to_string()),
    }
}

fn index(mut current: Value, keys: &[Value]) -> Result<Value, String> {
    for key in keys {
        current = match (&current, key) {
            (Value::Object(map), _) => map.get(&to_display(key)).cloned().unwrap_or(Value::Null),
            (Value::Array(items), Value::Number(_)) => {
                let i = as_int(key);
                if i < 0 || i as usize >= items.len() {
                    return Err(format!("index out of range: {}", i));
                }
                items[i as usize].clone()
            }
            (Value::Null, _) => Value::Null,
            (other, _) => return Err(format!("can't index item of type {}", type_name(other))),
        };
    }
    Ok(current)
}

/// Call a pure function. Arguments are fully evaluated, a piped value last.
pub fn call(name: &str, args: Vec<Value>) -> Result<Value, String> {
    let canonical = canonical(name);
    let name = canonical.as_str();
    let result = match name {
        "and" => {
            let mut last = Value::Bool(true);
            for arg in args {
                if !truthy(&arg) {
                    return Ok(arg);
                }
                last = arg;
            }
            last
        }
        "or" => {
            let mut last = Value::Bool(false);
            for arg in args {
                if truthy(&arg) {
                    return Ok(arg);
                }
                last = arg;
            }
            last
        }
        "not" => {
            arity(name, &args, 1)?;
            Value::Bool(!truthy(&args[0]))
        }
        "eq" => {
            let (first, rest) = args
                .split_first()
                .ok_or_else(|| "missing argument for comparison".to_string())?;
            if rest.is_empty() {
                return Err("missing argument for comparison".to_string());
            }
            Value::Bool(rest.iter().any(|other| equal(first, other)))
        }
        "ne" => {
            arity(name, &args, 2)?;
            Value::Bool(!equal(&args[0], &args[1]))
        }
        "lt" | "le" | "gt" | "ge" => {
            arity(name, &args, 2)?;
            let ordering = compare(&args[0], &args[1])?;
            Value::Bool(match name {
                "lt" => ordering == Ordering::Less,
                "le" => ordering != Ordering::Greater,
                "gt" => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
        "len" => {
            arity(name, &args, 1)?;
            let len = match &args[0] {
                Value::String(s) => s.chars().count(),
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                Value::Null => 0,
                other => return Err(format!("len of type {}", type_name(other))),
            };
            Value::from(len)
        }
        "index" => {
            let (collection, keys) = args
                .split_first()
                .ok_or_else(|| "index of nothing".to_string())?;
            index(collection.clone(), keys)?
        }
        "print" => Value::String(sprint(&args)),
        "println" => Value::String(format!(
            "{}\n",
            args.iter().map(to_display).collect::<Vec<_>>().join(" ")
        )),
        "printf" => {
            let (format, rest) = args
                .split_first()
                .ok_or_else(|| "printf needs a format".to_string())?;
            Value::String(sprintf(&to_display(format), rest))
        }
        "default" => {
            let fallback = args.first().cloned().unwrap_or(Value::Null);
            match args.get(1) {
                Some(value) if truthy(value) => value.clone(),
                _ => fallback,
            }
        }
        "empty" => {
            arity(name, &args, 1)?;
            Value::Bool(!truthy(&args[0]))
        }
        "required" => {
            arity(name, &args, 2)?;
            match &args[1] {
                Value::Null => return Err(to_display(&args[0])),
                Value::String(s) if s.is_empty() => return Err(to_display(&args[0])),
                value => value.clone(),
            }
        }
        "quote" => Value::String(
            args.iter()
                .filter(|arg| !arg.is_null())
                .map(|arg| serde_json::to_string(&to_display(arg)).unwrap_or_default())
                .collect::<Vec<_>>()
                .join(" "),
        ),
        "squote" => Value::String(
            args.iter()
                .filter(|arg| !arg.is_null())
                .map(|arg| format!("'{}'", to_display(arg)))
                .collect::<Vec<_>>()
                .join(" "),
        ),
        "upper" => Value::String(string_arg(&args, 0).to_uppercase()),
        "lower" => Value::String(string_arg(&args, 0).to_lowercase()),
        "title" => Value::String(title_case(&string_arg(&args, 0))),
        "trim" => Value::String(string_arg(&args, 0).trim().to_string()),
        "trimPrefix" => {
            arity(name, &args, 2)?;
            let (prefix, text) = (string_arg(&args, 0), string_arg(&args, 1));
            Value::String(text.strip_prefix(prefix.as_str()).unwrap_or(&text).to_string())
        }
        "trimSuffix" => {
            arity(name, &args, 2)?;
            let (suffix, text) = (string_arg(&args, 0), string_arg(&args, 1));
            Value::String(text.strip_suffix(suffix.as_str()).unwrap_or(&text).to_string())
        }
        "trunc" => {
            arity(name, &args, 2)?;
            let length = as_int(&args[0]);
            let chars: Vec<char> = string_arg(&args, 1).chars().collect();
            let kept: String = if length >= 0 {
                chars.iter().take(length as usize).collect()
            } else {
                let skip = chars.len().saturating_sub(length.unsigned_abs() as usize);
                chars.iter().skip(skip).collect()
            };
            Value::String(kept)
        }
        "replace" => {
            arity(name, &args, 3)?;
            let (old, new, text) = (string_arg(&args, 0), string_arg(&args, 1), string_arg(&args, 2));
            Value::String(text.replace(&old, &new))
        }
        "contains" => {
            arity(name, &args, 2)?;
            Value::Bool(string_arg(&args, 1).contains(&string_arg(&args, 0)))
        }
        "hasPrefix" => {
            arity(name, &args, 2)?;
            Value::Bool(string_arg(&args, 1).starts_with(&string_arg(&args, 0)))
        }
        "hasSuffix" => {
            arity(name, &args, 2)?;
            Value::Bool(string_arg(&args, 1).ends_with(&string_arg(&args, 0)))
        }
        "indent" => {
            arity(name, &args, 2)?;
            Value::String(indent_text(as_int(&args[0]), &string_arg(&args, 1)))
        }
        "nindent" => {
            arity(name, &args, 2)?;
            Value::String(format!("\n{}", indent_text(as_int(&args[0]), &string_arg(&args, 1))))
        }
        "toYaml" => {
            arity(name, &args, 1)?;
            Value::String(to_yaml(&args[0])?)
        }
        "toJson" => {
            arity(name, &args, 1)?;
            Value::String(serde_json::to_string(&args[0]).map_err(|e| e.to_string())?)
        }
        "toString" => {
            arity(name, &args, 1)?;
            Value::String(to_display(&args[0]))
        }
        "int" | "int64" => {
            arity(name, &args, 1)?;
            Value::from(as_int(&args[0]))
        }
        "float64" => {
            arity(name, &args, 1)?;
            float_value(as_float(&args[0]))
        }
        "list" => Value::Array(args),
        "dict" => {
            let mut map = Map::new();
            for pair in args.chunks(2) {
                let value = pair.get(1).cloned().unwrap_or(Value::String(String::new()));
                map.insert(to_display(&pair[0]), value);
            }
            Value::Object(map)
        }
        "join" => {
            arity(name, &args, 2)?;
            let separator = string_arg(&args, 0);
            let parts: Vec<String> = match &args[1] {
                Value::Array(items) => items.iter().map(to_display).collect(),
                other => vec![to_display(other)],
            };
            Value::String(parts.join(&separator))
        }
        "ternary" => {
            arity(name, &args, 3)?;
            if truthy(&args[2]) {
                args[0].clone()
            } else {
                args[1].clone()
            }
        }
        "coalesce" => args.into_iter().find(truthy).unwrap_or(Value::Null),
        "hasKey" => {
            arity(name, &args, 2)?;
            match &args[0] {
                Value::Object(map) => Value::Bool(map.contains_key(&string_arg(&args, 1))),
                _ => Value::Bool(false),
            }
        }
        "keys" => {
            let mut keys: Vec<Value> = Vec::new();
            for arg in &args {
                if let Value::Object(map) = arg {
                    keys.extend(map.keys().cloned().map(Value::String));
                }
            }
            Value::Array(keys)
        }
        "b64enc" => {
            arity(name, &args, 1)?;
            Value::String(base64::engine::general_purpose::STANDARD.encode(string_arg(&args, 0)))
        }
        "b64dec" => {
            arity(name, &args, 1)?;
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(string_arg(&args, 0))
                .map_err(|e| e.to_string())
                .and_then(|bytes| String::from_utf8(bytes).map_err(|e| e.to_string()));
            // Sprig renders the decode error in place of the value
            Value::String(decoded.unwrap_or_else(|message| message))
        }
        "sha256sum" => {
            arity(name, &args, 1)?;
            Value::String(hex::encode(Sha256::digest(string_arg(&args, 0).as_bytes())))
        }
        "add" => Value::from(args.iter().map(as_int).fold(0i64, i64::wrapping_add)),
        "mul" => Value::from(args.iter().map(as_int).fold(1i64, i64::wrapping_mul)),
        "add1" => {
            arity(name, &args, 1)?;
            Value::from(as_int(&args[0]).wrapping_add(1))
        }
        "sub" => {
            arity(name, &args, 2)?;
            Value::from(as_int(&args[0]).wrapping_sub(as_int(&args[1])))
        }
        "div" | "mod" => {
            arity(name, &args, 2)?;
            let (a, b) = (as_int(&args[0]), as_int(&args[1]));
            if b == 0 {
                return Err("integer divide by zero".to_string());
            }
            Value::from(if name == "div" { a.wrapping_div(b) } else { a.wrapping_rem(b) })
        }
        "max" | "min" => {
            let numbers = args.iter().map(as_int);
            let result = if name == "max" { numbers.max() } else { numbers.min() };
            Value::from(result.ok_or_else(|| format!("wrong number of args for {}: want at least 1 got 0", name))?)
        }
        "floor" => {
            arity(name, &args, 1)?;
            float_value(as_float(&args[0]).floor())
        }
        "ceil" => {
            arity(name, &args, 1)?;
            float_value(as_float(&args[0]).ceil())
        }
        "splitList" => {
            arity(name, &args, 2)?;
            let (separator, text) = (string_arg(&args, 0), string_arg(&args, 1));
            let parts: Vec<Value> = if separator.is_empty() {
                text.chars().map(|c| Value::String(c.to_string())).collect()
            } else {
                text.split(separator.as_str()).map(|part| Value::String(part.to_string())).collect()
            };
            Value::Array(parts)
        }
        "split" => {
            arity(name, &args, 2)?;
            let (separator, text) = (string_arg(&args, 0), string_arg(&args, 1));
            let map = text
                .split(separator.as_str())
                .enumerate()
                .map(|(i, part)| (format!("_{}", i), Value::String(part.to_string())))
                .collect();
            Value::Object(map)
        }
        "first" | "last" => {
            arity(name, &args, 1)?;
            let items = list_arg(name, &args[0])?;
            let item = if name == "first" { items.first() } else { items.last() };
            item.cloned().unwrap_or(Value::Null)
        }
        "rest" | "initial" => {
            arity(name, &args, 1)?;
            let mut items = list_arg(name, &args[0])?;
            if !items.is_empty() {
                if name == "rest" {
                    items.remove(0);
                } else {
                    items.pop();
                }
            }
            Value::Array(items)
        }
        "append" | "prepend" => {
            arity(name, &args, 2)?;
            let mut items = list_arg(name, &args[0])?;
            if name == "append" {
                items.push(args[1].clone());
            } else {
                items.insert(0, args[1].clone());
            }
            Value::Array(items)
        }
        "concat" => {
            let mut items = Vec::new();
            for arg in &args {
                items.extend(list_arg(name, arg)?);
            }
            Value::Array(items)
        }
        "uniq" => {
            arity(name, &args, 1)?;
            let mut items: Vec<Value> = Vec::new();
            for item in list_arg(name, &args[0])? {
                if !items.contains(&item) {
                    items.push(item);
                }
            }
            Value::Array(items)
        }
        "has" => {
            arity(name, &args, 2)?;
            let needle = &args[0];
            Value::Bool(list_arg(name, &args[1])?.iter().any(|item| equal(item, needle)))
        }
        "without" => {
            let (list, removed) = args
                .split_first()
                .ok_or_else(|| "without needs a list".to_string())?;
            let items = list_arg(name, list)?
                .into_iter()
                .filter(|item| !removed.iter().any(|r| equal(item, r)))
                .collect();
            Value::Array(items)
        }
        "compact" => {
            arity(name, &args, 1)?;
            Value::Array(list_arg(name, &args[0])?.into_iter().filter(truthy).collect())
        }
        "reverse" => {
            arity(name, &args, 1)?;
            let mut items = list_arg(name, &args[0])?;
            items.reverse();
            Value::Array(items)
        }
        "sortAlpha" => {
            arity(name, &args, 1)?;
            let mut items: Vec<String> = list_arg(name, &args[0])?.iter().map(to_display).collect();
            items.sort();
            Value::Array(items.into_iter().map(Value::String).collect())
        }
        "until" => {
            arity(name, &args, 1)?;
            Value::Array((0..as_int(&args[0]).max(0)).map(Value::from).collect())
        }
        "regexMatch" => {
            arity(name, &args, 2)?;
            Value::Bool(regex(&string_arg(&args, 0))?.is_match(&string_arg(&args, 1)))
        }
        "regexReplaceAll" | "regexReplaceAllLiteral" => {
            arity(name, &args, 3)?;
            let pattern = regex(&string_arg(&args, 0))?;
            let (text, replacement) = (string_arg(&args, 1), string_arg(&args, 2));
            let replaced = if name == "regexReplaceAll" {
                pattern.replace_all(&text, replacement.as_str())
            } else {
                pattern.replace_all(&text, regex::NoExpand(&replacement))
            };
            Value::String(replaced.into_owned())
        }
        "regexFind" => {
            arity(name, &args, 2)?;
            let text = string_arg(&args, 1);
            let found = regex(&string_arg(&args, 0))?
                .find(&text)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            Value::String(found)
        }
        "regexFindAll" => {
            arity(name, &args, 3)?;
            let text = string_arg(&args, 1);
            let limit = as_int(&args[2]);
            let limit = if limit < 0 { usize::MAX } else { limit as usize };
            let found = regex(&string_arg(&args, 0))?
                .find_iter(&text)
                .take(limit)
                .map(|m| Value::String(m.as_str().to_string()))
                .collect();
            Value::Array(found)
        }
        "get" => {
            arity(name, &args, 2)?;
            map_arg(name, &args[0])?
                .remove(&string_arg(&args, 1))
                .unwrap_or(Value::String(String::new()))
        }
        "set" => {
            arity(name, &args, 3)?;
            let mut map = map_arg(name, &args[0])?;
            map.insert(string_arg(&args, 1), args[2].clone());
            Value::Object(map)
        }
        "unset" => {
            arity(name, &args, 2)?;
            let mut map = map_arg(name, &args[0])?;
            map.remove(&string_arg(&args, 1));
            Value::Object(map)
        }
        "merge" | "mergeOverwrite" => {
            let (target, sources) = args
                .split_first()
                .ok_or_else(|| format!("{} needs a destination", name))?;
            let mut merged = map_arg(name, target)?;
            for source in sources {
                deep_merge(&mut merged, map_arg(name, source)?, name == "mergeOverwrite");
            }
            Value::Object(merged)
        }
        "pluck" => {
            let (key, maps) = args
                .split_first()
                .ok_or_else(|| "pluck needs a key".to_string())?;
            let key = to_display(key);
            let mut found = Vec::new();
            for map in maps {
                found.extend(map_arg(name, map)?.remove(&key));
            }
            Value::Array(found)
        }
        "values" => {
            arity(name, &args, 1)?;
            Value::Array(map_arg(name, &args[0])?.into_iter().map(|(_, v)| v).collect())
        }
        "dig" => {
            if args.len() < 3 {
                return Err(format!("wrong number of args for dig: want at least 3 got {}", args.len()));
            }
            let (map, rest) = args.split_last().ok_or_else(|| "dig needs a map".to_string())?;
            let (fallback, keys) = rest.split_last().ok_or_else(|| "dig needs a default".to_string())?;
            let mut current = map.clone();
            for key in keys {
                current = match current {
                    Value::Object(mut map) => match map.remove(&to_display(key)) {
                        Some(value) => value,
                        None => return Ok(fallback.clone()),
                    },
                    _ => return Ok(fallback.clone()),
                };
            }
            current
        }
        "deepCopy" => {
            arity(name, &args, 1)?;
            args[0].clone()
        }
        "fromYaml" => {
            arity(name, &args, 1)?;
            decoded(serde_yaml::from_str(&string_arg(&args, 0)).map_err(|e| e.to_string()))
        }
        "fromJson" => {
            arity(name, &args, 1)?;
            decoded(serde_json::from_str(&string_arg(&args, 0)).map_err(|e| e.to_string()))
        }
        "toPrettyJson" => {
            arity(name, &args, 1)?;
            Value::String(serde_json::to_string_pretty(&args[0]).map_err(|e| e.to_string())?)
        }
        "toRawJson" => {
            arity(name, &args, 1)?;
            Value::String(serde_json::to_string(&args[0]).map_err(|e| e.to_string())?)
        }
        "toStrings" => {
            arity(name, &args, 1)?;
            let items = list_arg(name, &args[0])?;
            Value::Array(items.iter().map(|item| Value::String(to_display(item))).collect())
        }
        "atoi" => {
            arity(name, &args, 1)?;
            Value::from(string_arg(&args, 0).trim().parse::<i64>().unwrap_or_default())
        }
        "cat" => Value::String(
            args.iter()
                .filter(|arg| !arg.is_null())
                .map(to_display)
                .collect::<Vec<_>>()
                .join(" "),
        ),
        "nospace" => {
            arity(name, &args, 1)?;
            Value::String(string_arg(&args, 0).chars().filter(|c| !c.is_whitespace()).collect())
        }
        "repeat" => {
            arity(name, &args, 2)?;
            Value::String(string_arg(&args, 1).repeat(as_int(&args[0]).max(0) as usize))
        }
        "substr" => {
            arity(name, &args, 3)?;
            let chars: Vec<char> = string_arg(&args, 2).chars().collect();
            let (start, end) = (as_int(&args[0]), as_int(&args[1]));
            let start = if start < 0 { 0 } else { (start as usize).min(chars.len()) };
            let end = if end < 0 || end as usize > chars.len() {
                chars.len()
            } else {
                end as usize
            };
            Value::String(chars[start..end.max(start)].iter().collect())
        }
        "trimAll" => {
            arity(name, &args, 2)?;
            let cutset = string_arg(&args, 0);
            Value::String(string_arg(&args, 1).trim_matches(|c: char| cutset.contains(c)).to_string())
        }
        "kindOf" => {
            arity(name, &args, 1)?;
            Value::String(kind_name(&args[0]).to_string())
        }
        "kindIs" => {
            arity(name, &args, 2)?;
            Value::Bool(string_arg(&args, 0) == kind_name(&args[1]))
        }
        "all" => Value::Bool(args.iter().all(truthy)),
        "any" => Value::Bool(args.iter().any(truthy)),
        "fail" => return Err(string_arg(&args, 0)),
        "lookup" => Value::Object(Map::new()),
        "semverCompare" => {
            arity(name, &args, 2)?;
            Value::Bool(semver_compare(&string_arg(&args, 0), &string_arg(&args, 1))?)
        }
        _ => return Err(format!("function {:?} not defined", name)),
    };
    Ok(result)
}
