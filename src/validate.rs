//! Validation pipeline: uniform gatekeeping before any focus transition.
//!
//! Every transition consults two predicate families: `can_leave_focus` on
//! the current element and `can_receive_focus` on the candidate. Callers
//! hand the engine either a synchronous predicate or an async one; both
//! are normalized here into a single "resolves to bool" contract so the
//! engine never branches on which kind it received.
//!
//! A predicate that errors is treated as a rejection: the pipeline logs
//! the failure at `warn` and answers `false`. The exception never reaches
//! the engine's caller — they are simply told the transition did not
//! happen.
//!
//! # Example
//!
//! ```
//! use focal::validate::{ValidationCtx, Validator};
//!
//! // Sync predicate
//! let non_empty = Validator::sync(|ctx: &ValidationCtx| !ctx.element_id.is_empty());
//!
//! // Async predicate (e.g. a server-side check)
//! let remote = Validator::async_fn(|_ctx| async move { Ok(true) });
//! ```

use crate::error::ValidationError;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// The direction a validator is being consulted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    /// `can_leave_focus` on the element losing activity.
    Leave,
    /// `can_receive_focus` on the candidate element.
    Receive,
}

/// Context handed to a validator when it runs.
///
/// Owned strings so async validators can be `'static` futures.
#[derive(Debug, Clone)]
pub struct ValidationCtx {
    /// The element whose validator is being consulted.
    pub element_id: String,
    /// The other side of the transition: the target when leaving, the
    /// source when receiving. `None` during ordered scans where the
    /// counterpart is not yet decided.
    pub other_id: Option<String>,
    /// Whether this is a leave or receive check.
    pub kind: CheckKind,
}

impl ValidationCtx {
    /// Build a context for a `can_leave_focus` check.
    pub fn leave(element_id: impl Into<String>, target: Option<&str>) -> Self {
        Self {
            element_id: element_id.into(),
            other_id: target.map(str::to_owned),
            kind: CheckKind::Leave,
        }
    }

    /// Build a context for a `can_receive_focus` check.
    pub fn receive(element_id: impl Into<String>, source: Option<&str>) -> Self {
        Self {
            element_id: element_id.into(),
            other_id: source.map(str::to_owned),
            kind: CheckKind::Receive,
        }
    }
}

/// Outcome future produced by async validators.
pub type CheckFuture = Pin<Box<dyn Future<Output = std::result::Result<bool, ValidationError>> + Send>>;

type SyncPred =
    Arc<dyn Fn(&ValidationCtx) -> std::result::Result<bool, ValidationError> + Send + Sync>;
type AsyncPred = Arc<dyn Fn(ValidationCtx) -> CheckFuture + Send + Sync>;

/// A gatekeeping predicate, sync or async, normalized to one contract.
///
/// Cloning is cheap (`Arc` internally); the registry stores validators by
/// value and the engine clones them out of the registry before awaiting,
/// so no lock is held while a check is in flight.
#[derive(Clone)]
pub struct Validator {
    inner: ValidatorKind,
}

#[derive(Clone)]
enum ValidatorKind {
    Sync(SyncPred),
    Async(AsyncPred),
}

impl Validator {
    /// Wrap an infallible synchronous predicate.
    pub fn sync<F>(pred: F) -> Self
    where
        F: Fn(&ValidationCtx) -> bool + Send + Sync + 'static,
    {
        Self {
            inner: ValidatorKind::Sync(Arc::new(move |ctx| Ok(pred(ctx)))),
        }
    }

    /// Wrap a synchronous predicate that may fail.
    pub fn sync_fallible<F>(pred: F) -> Self
    where
        F: Fn(&ValidationCtx) -> std::result::Result<bool, ValidationError> + Send + Sync + 'static,
    {
        Self {
            inner: ValidatorKind::Sync(Arc::new(pred)),
        }
    }

    /// Wrap an asynchronous predicate.
    pub fn async_fn<F, Fut>(pred: F) -> Self
    where
        F: Fn(ValidationCtx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<bool, ValidationError>> + Send + 'static,
    {
        Self {
            inner: ValidatorKind::Async(Arc::new(move |ctx| Box::pin(pred(ctx)))),
        }
    }

    /// A validator that always answers the given verdict.
    pub fn constant(verdict: bool) -> Self {
        Self::sync(move |_| verdict)
    }

    /// Run the predicate, awaiting uniformly and normalizing failures.
    ///
    /// An `Err` outcome is logged and reported as `false`.
    pub async fn check(&self, ctx: ValidationCtx) -> bool {
        let outcome = match &self.inner {
            ValidatorKind::Sync(pred) => pred(&ctx),
            ValidatorKind::Async(pred) => pred(ctx.clone()).await,
        };
        match outcome {
            Ok(verdict) => verdict,
            Err(err) => {
                tracing::warn!(
                    element = %ctx.element_id,
                    kind = ?ctx.kind,
                    error = %err,
                    "validator failed; treating as rejection"
                );
                false
            }
        }
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner {
            ValidatorKind::Sync(_) => f.write_str("Validator::Sync"),
            ValidatorKind::Async(_) => f.write_str("Validator::Async"),
        }
    }
}

/// Consult an optional validator; absence means the check passes.
pub(crate) async fn consult(validator: Option<&Validator>, ctx: ValidationCtx) -> bool {
    match validator {
        Some(v) => v.check(ctx).await,
        None => true,
    }
}
