//! Binding of request data to handler arguments.
//!
//! A handler declares its parameters as a list of [`Param`]s. Each parameter is the request
//! context, the validation result, a value bound through a [`Marker`], or unmarked. When a
//! route is compiled every marker is resolved to the [`ArgumentExtractor`] registered for it
//! in the [`ExtractorRegistry`], so nothing is looked up per request.
//!
//! Conversion failures never abort binding: the parameter is bound as [`ArgValue::Absent`]
//! and a [`Violation`] is recorded on the context.

mod extractors;

pub use extractors::{HeaderExtractor, PathParamExtractor, QueryParamExtractor};

use crate::context::Context;
use crate::error::RouterError;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A parameter that could not be converted to its declared type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    param: String,
    message: String,
}

impl Violation {
    pub fn new(param: impl Into<String>, message: impl Into<String>) -> Self {
        Self { param: param.into(), message: message.into() }
    }

    pub fn param(&self) -> &str {
        &self.param
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.param, self.message)
    }
}

/// The declared type a raw request string is converted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Float,
    Boolean,
}

impl ParamType {
    pub fn convert(self, raw: &str) -> Result<ArgValue, String> {
        match self {
            ParamType::String => Ok(ArgValue::Str(raw.to_string())),
            ParamType::Integer => raw.trim().parse::<i64>().map(ArgValue::Int).map_err(|e| e.to_string()),
            ParamType::Float => raw.trim().parse::<f64>().map(ArgValue::Float).map_err(|e| e.to_string()),
            ParamType::Boolean => raw.trim().parse::<bool>().map(ArgValue::Bool).map_err(|e| e.to_string()),
        }
    }
}

/// Identifies the capability that extracts a bound parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    PathParam,
    QueryParam,
    Header,
    Custom(&'static str),
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Marker::PathParam => f.write_str("path-param"),
            Marker::QueryParam => f.write_str("query-param"),
            Marker::Header => f.write_str("header"),
            Marker::Custom(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundParam {
    marker: Marker,
    name: String,
    ty: ParamType,
}

impl BoundParam {
    pub fn marker(&self) -> Marker {
        self.marker
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> ParamType {
        self.ty
    }

    /// Converts a raw value read from the request, mapping failures to a [`Violation`].
    pub fn convert(&self, raw: &str) -> Result<ArgValue, Violation> {
        self.ty.convert(raw).map_err(|message| Violation::new(&self.name, message))
    }
}

/// One declared handler parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    /// Receives the request context itself.
    Context,
    /// Receives the violations collected while binding the other parameters.
    Validation,
    Bound(BoundParam),
    /// No binding marker. Always bound as [`ArgValue::Absent`].
    Unmarked,
}

impl Param {
    pub fn bound(marker: Marker, name: impl Into<String>, ty: ParamType) -> Self {
        Param::Bound(BoundParam { marker, name: name.into(), ty })
    }

    pub fn path(name: impl Into<String>, ty: ParamType) -> Self {
        Self::bound(Marker::PathParam, name, ty)
    }

    pub fn query(name: impl Into<String>, ty: ParamType) -> Self {
        Self::bound(Marker::QueryParam, name, ty)
    }

    pub fn header(name: impl Into<String>) -> Self {
        Self::bound(Marker::Header, name, ParamType::String)
    }
}

/// A bound argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    /// Placeholder for a [`Param::Context`] parameter; the context is passed to the handler directly.
    Context,
    Violations(Vec<Violation>),
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Absent,
}

/// Reads one bound parameter from the request.
pub trait ArgumentExtractor: Send + Sync + fmt::Debug {
    fn extract(&self, ctx: &Context, param: &BoundParam) -> Result<ArgValue, Violation>;
}

/// Maps markers to extractors.
#[derive(Debug, Clone)]
pub struct ExtractorRegistry {
    extractors: HashMap<Marker, Arc<dyn ArgumentExtractor>>,
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::empty()
            .with(Marker::PathParam, PathParamExtractor)
            .with(Marker::QueryParam, QueryParamExtractor)
            .with(Marker::Header, HeaderExtractor)
    }
}

impl ExtractorRegistry {
    pub fn empty() -> Self {
        Self { extractors: HashMap::new() }
    }

    /// Registers `extractor` for `marker`, replacing any previous registration.
    pub fn register(&mut self, marker: Marker, extractor: impl ArgumentExtractor + 'static) -> &mut Self {
        self.extractors.insert(marker, Arc::new(extractor));
        self
    }

    pub fn with(mut self, marker: Marker, extractor: impl ArgumentExtractor + 'static) -> Self {
        self.register(marker, extractor);
        self
    }

    pub fn get(&self, marker: Marker) -> Option<&Arc<dyn ArgumentExtractor>> {
        self.extractors.get(&marker)
    }

    /// Resolves every marker in `params` to its extractor.
    pub fn resolve(&self, params: &[Param], controller: &str, handler: &str) -> Result<ArgumentBinder, RouterError> {
        let resolved = params
            .iter()
            .map(|param| match param {
                Param::Context => Ok(ResolvedParam::Context),
                Param::Validation => Ok(ResolvedParam::Validation),
                Param::Unmarked => Ok(ResolvedParam::Unmarked),
                Param::Bound(bound) => match self.get(bound.marker) {
                    Some(extractor) => Ok(ResolvedParam::Bound { param: bound.clone(), extractor: Arc::clone(extractor) }),
                    None => Err(RouterError::UnresolvedMarker {
                        marker: bound.marker.to_string(),
                        param: bound.name.clone(),
                        controller: controller.to_string(),
                        handler: handler.to_string(),
                    }),
                },
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ArgumentBinder { params: resolved })
    }
}

#[derive(Debug, Clone)]
enum ResolvedParam {
    Context,
    Validation,
    Bound { param: BoundParam, extractor: Arc<dyn ArgumentExtractor> },
    Unmarked,
}

/// Builds the argument list of one handler; created once per route.
#[derive(Debug, Clone)]
pub struct ArgumentBinder {
    params: Vec<ResolvedParam>,
}

impl ArgumentBinder {
    /// Whether the handler takes the validation result and therefore handles violations itself.
    pub fn accepts_violations(&self) -> bool {
        self.params.iter().any(|param| matches!(param, ResolvedParam::Validation))
    }

    pub fn unmarked_count(&self) -> usize {
        self.params.iter().filter(|param| matches!(param, ResolvedParam::Unmarked)).count()
    }

    /// Binds the declared parameters in order. Violations are recorded on `ctx`.
    pub fn bind(&self, ctx: &mut Context) -> Arguments {
        let mut values = Vec::with_capacity(self.params.len());
        let mut names = Vec::with_capacity(self.params.len());

        for param in &self.params {
            match param {
                ResolvedParam::Context => {
                    values.push(ArgValue::Context);
                    names.push(None);
                }
                ResolvedParam::Validation => {
                    // filled in below, once every other parameter has been converted
                    values.push(ArgValue::Absent);
                    names.push(None);
                }
                ResolvedParam::Unmarked => {
                    values.push(ArgValue::Absent);
                    names.push(None);
                }
                ResolvedParam::Bound { param, extractor } => {
                    let value = extractor.extract(ctx, param).unwrap_or_else(|violation| {
                        ctx.add_violation(violation);
                        ArgValue::Absent
                    });
                    values.push(value);
                    names.push(Some(param.name.clone()));
                }
            }
        }

        for (param, value) in self.params.iter().zip(values.iter_mut()) {
            if matches!(param, ResolvedParam::Validation) {
                *value = ArgValue::Violations(ctx.violations().to_vec());
            }
        }

        Arguments { names, values }
    }
}

/// The ordered arguments for one handler invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    names: Vec<Option<String>>,
    values: Vec<ArgValue>,
}

impl Arguments {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ArgValue> {
        self.values.get(index)
    }

    pub fn values(&self) -> &[ArgValue] {
        &self.values
    }

    /// Converts the argument at `index`, `None` when absent or of another type.
    pub fn value<T: FromArg>(&self, index: usize) -> Option<T> {
        self.values.get(index).and_then(T::from_arg)
    }

    /// Converts the first bound argument named `name`.
    pub fn named<T: FromArg>(&self, name: &str) -> Option<T> {
        self.names.iter().position(|n| n.as_deref() == Some(name)).and_then(|index| self.value(index))
    }
}

/// Conversion from a bound [`ArgValue`] to a handler-friendly type.
pub trait FromArg: Sized {
    fn from_arg(value: &ArgValue) -> Option<Self>;
}

impl FromArg for String {
    fn from_arg(value: &ArgValue) -> Option<Self> {
        match value {
            ArgValue::Str(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl FromArg for i64 {
    fn from_arg(value: &ArgValue) -> Option<Self> {
        match value {
            ArgValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl FromArg for i32 {
    fn from_arg(value: &ArgValue) -> Option<Self> {
        i64::from_arg(value).and_then(|i| i32::try_from(i).ok())
    }
}

impl FromArg for u64 {
    fn from_arg(value: &ArgValue) -> Option<Self> {
        i64::from_arg(value).and_then(|i| u64::try_from(i).ok())
    }
}

impl FromArg for f64 {
    fn from_arg(value: &ArgValue) -> Option<Self> {
        match value {
            ArgValue::Float(f) => Some(*f),
            ArgValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl FromArg for bool {
    fn from_arg(value: &ArgValue) -> Option<Self> {
        match value {
            ArgValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl FromArg for Vec<Violation> {
    fn from_arg(value: &ArgValue) -> Option<Self> {
        match value {
            ArgValue::Violations(violations) => Some(violations.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ArgValue, ArgumentExtractor, BoundParam, ExtractorRegistry, Marker, Param, ParamType, Violation};
    use crate::context::Context;
    use crate::error::RouterError;
    use crate::router::PathParams;
    use http::Request;

    fn context(uri: &str, path_params: &[(&str, &str)]) -> Context {
        let (parts, ()) = Request::get(uri).header("x-tenant", "acme").body(()).unwrap().into_parts();
        let params = PathParams::from_pairs(path_params.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        Context::standalone(parts, params)
    }

    #[test]
    fn binds_in_declaration_order() {
        let params = vec![
            Param::query("email", ParamType::String),
            Param::Context,
            Param::path("id", ParamType::Integer),
            Param::header("x-tenant"),
        ];
        let binder = ExtractorRegistry::default().resolve(&params, "users", "show").unwrap();
        let mut ctx = context("/user/42?email=a%40b.c", &[("id", "42")]);

        let args = binder.bind(&mut ctx);
        assert_eq!(args.len(), 4);
        assert_eq!(args.get(0), Some(&ArgValue::Str("a@b.c".into())));
        assert_eq!(args.get(1), Some(&ArgValue::Context));
        assert_eq!(args.value::<i64>(2), Some(42));
        assert_eq!(args.named::<String>("x-tenant").as_deref(), Some("acme"));
        assert!(ctx.violations().is_empty());
    }

    #[test]
    fn conversion_failure_is_a_violation() {
        let params = vec![Param::path("id", ParamType::Integer), Param::query("page", ParamType::Integer)];
        let binder = ExtractorRegistry::default().resolve(&params, "users", "show").unwrap();
        let mut ctx = context("/user/abc?page=2", &[("id", "abc")]);

        let args = binder.bind(&mut ctx);
        assert_eq!(args.get(0), Some(&ArgValue::Absent));
        assert_eq!(args.value::<i64>(1), Some(2));
        assert_eq!(ctx.violations().len(), 1);
        assert_eq!(ctx.violations()[0].param(), "id");
    }

    #[test]
    fn validation_param_receives_all_violations() {
        let params = vec![Param::Validation, Param::query("a", ParamType::Boolean), Param::query("b", ParamType::Float)];
        let binder = ExtractorRegistry::default().resolve(&params, "c", "h").unwrap();
        assert!(binder.accepts_violations());
        let mut ctx = context("/x?a=maybe&b=nope", &[]);

        let args = binder.bind(&mut ctx);
        let violations = args.value::<Vec<Violation>>(0).unwrap();
        assert_eq!(violations.iter().map(Violation::param).collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn unmarked_and_missing_are_absent() {
        let params = vec![Param::Unmarked, Param::query("missing", ParamType::Integer)];
        let binder = ExtractorRegistry::default().resolve(&params, "c", "h").unwrap();
        assert_eq!(binder.unmarked_count(), 1);
        let mut ctx = context("/x", &[]);

        let args = binder.bind(&mut ctx);
        assert_eq!(args.values(), &[ArgValue::Absent, ArgValue::Absent]);
        assert!(ctx.violations().is_empty());
    }

    #[test]
    fn unknown_marker_fails_resolution() {
        let params = vec![Param::bound(Marker::Custom("session"), "user", ParamType::String)];
        let result = ExtractorRegistry::default().resolve(&params, "c", "h");
        assert!(matches!(result, Err(RouterError::UnresolvedMarker { .. })));
    }

    #[derive(Debug)]
    struct MethodExtractor;

    impl ArgumentExtractor for MethodExtractor {
        fn extract(&self, ctx: &Context, param: &BoundParam) -> Result<ArgValue, Violation> {
            param.convert(ctx.method().as_str())
        }
    }

    #[test]
    fn custom_extractor() {
        let registry = ExtractorRegistry::default().with(Marker::Custom("method"), MethodExtractor);
        let params = vec![Param::bound(Marker::Custom("method"), "verb", ParamType::String)];
        let binder = registry.resolve(&params, "c", "h").unwrap();
        let mut ctx = context("/x", &[]);

        assert_eq!(binder.bind(&mut ctx).named::<String>("verb").as_deref(), Some("GET"));
    }

    #[test]
    fn convert_types() {
        assert_eq!(ParamType::Integer.convert(" 12 "), Ok(ArgValue::Int(12)));
        assert_eq!(ParamType::Boolean.convert("true"), Ok(ArgValue::Bool(true)));
        assert!(ParamType::Float.convert("x").is_err());
    }
}
