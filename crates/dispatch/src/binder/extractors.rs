use crate::binder::{ArgValue, ArgumentExtractor, BoundParam, Violation};
use crate::context::Context;

/// Reads a captured path parameter.
#[derive(Debug, Default, Clone, Copy)]
pub struct PathParamExtractor;

impl ArgumentExtractor for PathParamExtractor {
    fn extract(&self, ctx: &Context, param: &BoundParam) -> Result<ArgValue, Violation> {
        ctx.path_parameter(param.name()).map_or(Ok(ArgValue::Absent), |raw| param.convert(raw))
    }
}

/// Reads the first value of a query parameter.
#[derive(Debug, Default, Clone, Copy)]
pub struct QueryParamExtractor;

impl ArgumentExtractor for QueryParamExtractor {
    fn extract(&self, ctx: &Context, param: &BoundParam) -> Result<ArgValue, Violation> {
        ctx.query_parameter(param.name()).map_or(Ok(ArgValue::Absent), |raw| param.convert(raw))
    }
}

/// Reads a request header. Headers that are not valid utf-8 are violations.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderExtractor;

impl ArgumentExtractor for HeaderExtractor {
    fn extract(&self, ctx: &Context, param: &BoundParam) -> Result<ArgValue, Violation> {
        match ctx.headers().get(param.name()) {
            None => Ok(ArgValue::Absent),
            Some(value) => {
                let raw = value.to_str().map_err(|e| Violation::new(param.name(), e.to_string()))?;
                param.convert(raw)
            }
        }
    }
}
