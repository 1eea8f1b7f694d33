//! Raw/rendered pairs
//!
//! A [`Resource`] holds the literal form of a manifest as it is written on
//! disk (`raw`) and the form produced after templating or composition
//! (`rendered`). Locations shown to users come from `raw`, evaluation runs
//! against `rendered`, and only `raw` is ever mutated or written back.

use crate::error::CoreError;
use crate::object::Object;
use tracing::debug;

/// How a resource's rendered form relates to its raw form
#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    /// Not rendered (yet)
    Absent,
    /// No render stage: the raw object is also the rendered one
    SharedWithRaw,
    /// A separately produced object
    Distinct(Object),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    raw: Option<Object>,
    rendered: Rendered,
    remediated: bool,
}

impl Resource {
    /// Raw-only resource awaiting its rendered form
    pub fn from_raw(raw: Object) -> Self {
        Self {
            raw: Some(raw),
            rendered: Rendered::Absent,
            remediated: false,
        }
    }

    /// Resource whose rendered form is the raw object itself
    pub fn shared(raw: Object) -> Self {
        Self {
            raw: Some(raw),
            rendered: Rendered::SharedWithRaw,
            remediated: false,
        }
    }

    /// Rendered-only resource; it can be evaluated but never remediated
    pub fn from_rendered(rendered: Object) -> Self {
        Self {
            raw: None,
            rendered: Rendered::Distinct(rendered),
            remediated: false,
        }
    }

    pub fn raw(&self) -> Option<&Object> {
        self.raw.as_ref()
    }

    /// The object policies should see, if any
    pub fn rendered(&self) -> Option<&Object> {
        match &self.rendered {
            Rendered::Absent => None,
            Rendered::SharedWithRaw => self.raw.as_ref(),
            Rendered::Distinct(obj) => Some(obj),
        }
    }

    pub fn rendering(&self) -> &Rendered {
        &self.rendered
    }

    pub fn set_rendered(&mut self, rendered: Object) {
        self.rendered = Rendered::Distinct(rendered);
    }

    /// Whether a successful remediation has been applied to `raw`
    pub fn remediated(&self) -> bool {
        self.remediated
    }

    /// Identity of the resource, taken from `raw` when present
    pub fn id(&self) -> String {
        self.raw
            .as_ref()
            .or_else(|| self.rendered())
            .map(Object::id)
            .unwrap_or_default()
    }

    /// Source lines `(start, end)` best describing `path`.
    ///
    /// Uses `raw` when present, else `rendered`. The nearest resolvable
    /// ancestor of `path` stands in for a missing field, and the whole object
    /// for a path that resolves nowhere. `end >= start` always holds.
    pub fn find_key(&self, path: &str) -> (usize, usize) {
        let Some(obj) = self.raw.as_ref().or_else(|| self.rendered()) else {
            return (1, 1);
        };

        let (start, end) = match obj.find_field(path) {
            Some(field) => (field.start_line(), field.end_line()),
            None => (obj.start_line(), obj.end_line()),
        };
        (start, end.max(start))
    }

    /// Write `value` at `path` in the raw document.
    ///
    /// Returns `Ok(false)` for a resource without a raw form. Numbers are
    /// written as floats, which the encoder prints without a fraction when
    /// they are integral.
    pub fn remediate(&mut self, path: &str, value: &serde_json::Value) -> Result<bool, CoreError> {
        let Some(raw) = self.raw.as_mut() else {
            debug!("Skipping remediation of rendered-only resource at {}", path);
            return Ok(false);
        };

        match value {
            serde_json::Value::Number(number) => {
                let float = number.as_f64().unwrap_or_default();
                raw.set_field(path, &float)?;
            }
            other => raw.set_field(path, other)?,
        }

        self.remediated = true;
        Ok(true)
    }
}
