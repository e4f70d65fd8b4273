//! Fluent route building for the standard capabilities.

use sluice_core::{
    BoxError, BuildResult, Emitter, Envelope, Expression, Fault, Logger, Route, Severity, Template,
};

use crate::assign::Set;
use crate::choice::{Choice, When};
use crate::collector::{Collector, ToArray};
use crate::dispatcher::Dispatch;
use crate::filter::Filter;
use crate::mapper::{Map, Process};

/// Typed chain-building methods for [`Route`].
///
/// Each method appends one processor, named after the capability, and
/// returns the route for further chaining. Methods taking expression or
/// template source text fail with a [`BuildError`](sluice_core::BuildError)
/// when it does not parse.
pub trait RouteExt: Sized {
    /// Appends a [`Process`] capability.
    fn process<F>(self, f: F) -> Self
    where
        F: Fn(Envelope, Emitter) -> Result<(), Fault> + Send + Sync + 'static;

    /// Appends a [`Map`] capability.
    fn map<F>(self, f: F) -> Self
    where
        F: Fn(&mut Envelope) -> Result<(), BoxError> + Send + Sync + 'static;

    /// Appends a [`Filter`] on a condition.
    fn filter(self, condition: &str) -> BuildResult<Self>;

    /// Appends a [`Filter`] on an already parsed condition.
    fn filter_by(self, condition: Expression) -> Self;

    /// Appends a [`Choice`].
    fn choice(self, expression: &str, whens: impl IntoIterator<Item = When>) -> BuildResult<Self>;

    /// Appends a [`Dispatch`] to the given routes.
    fn dispatch(self, routes: impl IntoIterator<Item = Route>) -> Self;

    /// Appends a [`ToArray`] feeding `collector`.
    fn to_array(self, collector: &Collector) -> Self;

    /// Appends a [`Set`].
    fn set(self, target: &str, expression: &str) -> BuildResult<Self>;

    /// Appends a [`Logger`] rendering `template` at `severity`.
    fn log(self, severity: Severity, template: &str) -> BuildResult<Self>;
}

impl RouteExt for Route {
    fn process<F>(self, f: F) -> Self
    where
        F: Fn(Envelope, Emitter) -> Result<(), Fault> + Send + Sync + 'static,
    {
        self.then("process", Process::new(f))
    }

    fn map<F>(self, f: F) -> Self
    where
        F: Fn(&mut Envelope) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.then("map", Map::new(f))
    }

    fn filter(self, condition: &str) -> BuildResult<Self> {
        Ok(self.then("filter", Filter::parse(condition)?))
    }

    fn filter_by(self, condition: Expression) -> Self {
        self.then("filter", Filter::new(condition))
    }

    fn choice(self, expression: &str, whens: impl IntoIterator<Item = When>) -> BuildResult<Self> {
        let choice = Choice::new(Expression::parse(expression)?, whens);
        Ok(self.then("choice", choice))
    }

    fn dispatch(self, routes: impl IntoIterator<Item = Route>) -> Self {
        self.then("dispatch", Dispatch::new(routes))
    }

    fn to_array(self, collector: &Collector) -> Self {
        self.then("to_array", ToArray::new(collector.clone()))
    }

    fn set(self, target: &str, expression: &str) -> BuildResult<Self> {
        Ok(self.then("set", Set::parse(target, expression)?))
    }

    fn log(self, severity: Severity, template: &str) -> BuildResult<Self> {
        let logger = Logger::template(severity, Template::parse(template)?);
        Ok(self.then(severity.name(), logger))
    }
}
