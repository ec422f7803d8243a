//! Catch-and-convert shell around engine calls
//!
//! Engine errors come back as `BackendError`; a panic anywhere below is
//! caught here. Either way the caller gets the failure as text. The engine
//! lock is released before this returns, also on panic.

use crate::backend::{self, Backend, BackendError};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::error;

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Run `f` against the locked engine.
pub(crate) fn with_backend<T>(f: impl FnOnce(&mut Backend) -> Result<T, BackendError>) -> Result<T, String> {
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let mut backend = backend::lock();
        f(&mut backend)
    }));
    match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(err.full_message()),
        Err(payload) => {
            let message = panic_message(payload);
            error!(panic = %message, "engine panicked");
            Err(format!("internal error: {}", message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::sqlstate;

    #[test]
    fn test_error_text_includes_hint() {
        let err = with_backend::<()>(|_| {
            Err(BackendError::new(sqlstate::SYNTAX_ERROR, "bad").with_hint("try again"))
        })
        .unwrap_err();
        assert_eq!(err, "bad\nHINT:  try again");
    }

    #[test]
    fn test_panic_is_caught_and_lock_released() {
        let err = with_backend::<()>(|_| panic!("boom")).unwrap_err();
        assert!(err.contains("boom"));
        assert_eq!(with_backend(|_| Ok(7)).unwrap(), 7);
    }
}
