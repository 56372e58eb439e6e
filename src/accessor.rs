//! Per-record option values.
//!
//! Every visual option of a layer is an [`Accessor`]: a constant, the name of
//! a field read from each record, or a function of the record. Layers resolve
//! their accessors once at the start of an update pass into plain closures.

use std::fmt;
use std::rc::Rc;

use geojson::Geometry;
use serde_json::Value;

use crate::color::color_and_alpha;
use crate::scene::{Material, SharedMaterial};

/// A single data record as supplied by the caller.
pub type Datum = Value;

/// Shared handle to a record. Layers use the handle's address as the
/// default identity, so callers should keep the same handles across updates.
pub type Record = Rc<Datum>;

/// Wrap a JSON value into a record handle.
pub fn record(value: Value) -> Record {
    Rc::new(value)
}

/// Resolved accessor, valid for one update pass.
pub type Resolved<'a, V> = Box<dyn Fn(&Datum) -> V + 'a>;

pub enum Accessor<V> {
    Constant(V),
    Field(String),
    Func(Rc<dyn Fn(&Datum) -> V>),
}

impl<V> Accessor<V> {
    pub fn constant(value: V) -> Self {
        Accessor::Constant(value)
    }

    pub fn field(name: impl Into<String>) -> Self {
        Accessor::Field(name.into())
    }

    pub fn func(f: impl Fn(&Datum) -> V + 'static) -> Self {
        Accessor::Func(Rc::new(f))
    }
}

impl<V: FromField + Clone + 'static> Accessor<V> {
    pub fn resolve(&self) -> Resolved<'_, V> {
        match self {
            Accessor::Constant(v) => Box::new(move |_| v.clone()),
            Accessor::Field(name) => Box::new(move |d| V::from_field(d.get(name.as_str()))),
            Accessor::Func(f) => Box::new(move |d| f(d)),
        }
    }
}

impl<V: Clone> Clone for Accessor<V> {
    fn clone(&self) -> Self {
        match self {
            Accessor::Constant(v) => Accessor::Constant(v.clone()),
            Accessor::Field(name) => Accessor::Field(name.clone()),
            Accessor::Func(f) => Accessor::Func(Rc::clone(f)),
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for Accessor<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Accessor::Constant(v) => f.debug_tuple("Constant").field(v).finish(),
            Accessor::Field(name) => f.debug_tuple("Field").field(name).finish(),
            Accessor::Func(_) => f.write_str("Func(..)"),
        }
    }
}

/// Strings name a record field.
impl<V> From<&str> for Accessor<V> {
    fn from(name: &str) -> Self {
        Accessor::Field(name.to_string())
    }
}

impl From<f64> for Accessor<f64> {
    fn from(v: f64) -> Self {
        Accessor::Constant(v)
    }
}

impl From<bool> for Accessor<bool> {
    fn from(v: bool) -> Self {
        Accessor::Constant(v)
    }
}

impl From<SharedMaterial> for Accessor<SharedMaterial> {
    fn from(m: SharedMaterial) -> Self {
        Accessor::Constant(m)
    }
}

/// Conversion of a raw record field into an option value.
///
/// Missing or mistyped fields produce the type's neutral value rather than
/// an error.
pub trait FromField: Sized {
    fn from_field(value: Option<&Value>) -> Self;
}

impl FromField for f64 {
    fn from_field(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
            Some(Value::Bool(b)) => f64::from(u8::from(*b)),
            _ => 0.0,
        }
    }
}

impl FromField for bool {
    fn from_field(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Null) | None => false,
            Some(_) => true,
        }
    }
}

impl FromField for String {
    fn from_field(value: Option<&Value>) -> Self {
        match value {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }
}

impl FromField for Option<String> {
    fn from_field(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Null) | None => None,
            Some(_) => Some(String::from_field(value)).filter(|s| !s.is_empty()),
        }
    }
}

impl FromField for Option<Geometry> {
    fn from_field(value: Option<&Value>) -> Self {
        Geometry::from_json_value(value?.clone()).ok()
    }
}

/// A color field becomes a fresh Lambert material of that color.
impl FromField for SharedMaterial {
    fn from_field(value: Option<&Value>) -> Self {
        let (color, alpha) = color_and_alpha(&String::from_field(value));
        let mut material = Material::lambert();
        material.set_color(color, alpha);
        material.into_shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_constant_field_func() {
        let d = json!({ "lat": 12.5, "name": "Lagos" });

        let c: Accessor<f64> = 3.0.into();
        assert_eq!(c.resolve()(&d), 3.0);

        let f: Accessor<f64> = "lat".into();
        assert_eq!(f.resolve()(&d), 12.5);

        let g = Accessor::func(|d: &Datum| d["lat"].as_f64().unwrap_or(0.0) * 2.0);
        assert_eq!(g.resolve()(&d), 25.0);
    }

    #[test]
    fn test_missing_field_is_neutral() {
        let d = json!({ "name": "Lagos" });
        assert_eq!(Accessor::<f64>::field("lat").resolve()(&d), 0.0);
        assert!(!Accessor::<bool>::field("dot").resolve()(&d));
        assert_eq!(Accessor::<Option<String>>::field("stroke").resolve()(&d), None);
    }

    #[test]
    fn test_numeric_strings() {
        let d = json!({ "alt": "0.25", "size": 2 });
        assert_eq!(Accessor::<f64>::field("alt").resolve()(&d), 0.25);
        assert_eq!(Accessor::<String>::field("size").resolve()(&d), "2");
    }

    #[test]
    fn test_geometry_field() {
        let d = json!({
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]
            }
        });
        let geom = Accessor::<Option<Geometry>>::field("geometry").resolve()(&d);
        assert!(matches!(geom.map(|g| g.value), Some(geojson::Value::Polygon(_))));

        let bad = json!({ "geometry": 42 });
        assert!(Accessor::<Option<Geometry>>::field("geometry").resolve()(&bad).is_none());
    }
}
