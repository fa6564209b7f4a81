//! Builder pattern for UnitOfWork construction

use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::{Error, Result};
use crate::orchestrator::Orchestrator;

/// Boxed function with its parameter already bound
pub(crate) type Work<T> = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<Option<T>>> + Send>;

type Func<T, P> = Box<dyn FnOnce(P) -> BoxFuture<'static, anyhow::Result<Option<T>>> + Send>;

/// A registered, immutable unit of work
///
/// Holds the result key, the function with its bound parameter, the
/// `multiple` flag and the optional time limit.
pub struct UnitOfWork<T> {
    pub(crate) key: String,
    pub(crate) multiple: bool,
    pub(crate) timeout: Option<Duration>,
    pub(crate) work: Work<T>,
}

impl<T> UnitOfWork<T> {
    /// Result key this unit writes to
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether this unit appends to a sequence under its key
    pub fn is_multiple(&self) -> bool {
        self.multiple
    }

    /// Time limit for this unit, if any
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl<T> std::fmt::Debug for UnitOfWork<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("key", &self.key)
            .field("multiple", &self.multiple)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Where a unit's parameter comes from at registration
///
/// Implemented by [`DefaultParam`], the state of a fresh builder, and by
/// [`WithParam`], the state after [`UnitBuilder::param`].
pub trait ParamSource<P> {
    /// Produce the parameter handed to the function
    fn into_param(self) -> P;
}

/// No parameter was set; the function receives `P::default()`
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultParam;

impl<P: Default> ParamSource<P> for DefaultParam {
    fn into_param(self) -> P {
        P::default()
    }
}

/// An explicit parameter set through [`UnitBuilder::param`]
#[derive(Debug, Clone)]
pub struct WithParam<P>(P);

impl<P> ParamSource<P> for WithParam<P> {
    fn into_param(self) -> P {
        self.0
    }
}

/// Builder for one unit of work bound to an [`Orchestrator`]
///
/// `T` is the batch's result type and `P` the parameter handed to this
/// unit's function. `S` tracks whether a parameter was supplied, so
/// `P: Default` is only required when it was not. Nothing is validated
/// until [`register`](Self::register).
///
/// # Example
/// ```ignore
/// orchestrator
///     .new_unit()
///     .func(|name: String| async move { Ok(Some(name.len())) })
///     .param("taskbatch".to_string())
///     .register("len")?;
/// ```
pub struct UnitBuilder<'a, T, P, S = DefaultParam> {
    orchestrator: &'a mut Orchestrator<T>,
    func: Option<Func<T, P>>,
    param: S,
    multiple: bool,
    timeout: Option<Duration>,
}

impl<'a, T, P> UnitBuilder<'a, T, P, DefaultParam>
where
    T: Send + 'static,
    P: Send + 'static,
{
    pub(crate) fn new(orchestrator: &'a mut Orchestrator<T>) -> Self {
        Self {
            orchestrator,
            func: None,
            param: DefaultParam,
            multiple: false,
            timeout: None,
        }
    }
}

impl<'a, T, P, S> UnitBuilder<'a, T, P, S>
where
    T: Send + 'static,
    P: Send + 'static,
{
    /// Set the function to run
    ///
    /// Returning `Ok(None)` means "no result": the key is left untouched.
    pub fn func<F, Fut>(mut self, f: F) -> Self
    where
        F: FnOnce(P) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Option<T>>> + Send + 'static,
    {
        self.func = Some(Box::new(move |param| f(param).boxed()));
        self
    }

    /// Set the parameter passed to the function
    ///
    /// Without one the function receives `P::default()`.
    pub fn param(self, param: P) -> UnitBuilder<'a, T, P, WithParam<P>> {
        UnitBuilder {
            orchestrator: self.orchestrator,
            func: self.func,
            param: WithParam(param),
            multiple: self.multiple,
            timeout: self.timeout,
        }
    }

    /// Append this unit's result to a sequence shared by every `multiple`
    /// unit registered under the same key
    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    /// Stop waiting for the function after `limit`
    ///
    /// A zero duration disables the limit.
    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = (!limit.is_zero()).then_some(limit);
        self
    }

    /// Finalize the unit under `key` and append it to the batch
    ///
    /// # Errors
    /// Returns an error if the key is empty, no function was set, or the
    /// batch has already been started.
    pub fn register(self, key: impl Into<String>) -> Result<()>
    where
        S: ParamSource<P>,
    {
        let key = key.into();
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }

        let func = self.func.ok_or_else(|| Error::MissingFunc { key: key.clone() })?;
        let param = self.param.into_param();

        let unit = UnitOfWork {
            key,
            multiple: self.multiple,
            timeout: self.timeout,
            work: Box::new(move || func(param)),
        };

        self.orchestrator.push_unit(unit)
    }
}
