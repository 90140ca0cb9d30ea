use crate::{Error, Result, Value};
use hashbrown::HashMap;
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

/// Cancellation signal and request-scoped values carried through every backend call.
///
/// Clones share the cancellation flag, so cancelling any clone cancels them all; values are
/// copy-on-write.
#[derive(Clone, Debug, Default)]
pub struct Context {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
    values: Arc<HashMap<String, Value>>,
}

impl Context {
    pub fn new() -> Self { Self::default() }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        return self;
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        Arc::make_mut(&mut self.values).insert(key.into(), value.into());
        return self;
    }

    pub fn value(&self, key: &str) -> Option<&Value> { self.values.get(key) }

    pub fn cancel(&self) { self.cancelled.store(true, Ordering::Release); }

    pub fn is_cancelled(&self) -> bool {
        return self.cancelled.load(Ordering::Acquire)
            || self.deadline.is_some_and(|deadline| Instant::now() >= deadline);
    }

    /// Fails with [`Error::Cancelled`] once the context is cancelled or past its deadline.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }

        return Ok(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_cancellation() {
        let context = Context::new().with_value("request", "abc");
        let clone = context.clone().with_value("user", 7);

        assert!(clone.check().is_ok());
        context.cancel();

        assert!(matches!(clone.check(), Err(Error::Cancelled)));
        assert_eq!(context.value("user"), None);
        assert_eq!(clone.value("request"), Some(&Value::from("abc")));
    }

    #[test]
    fn expired_deadline_cancels() {
        let context = Context::new().with_timeout(Duration::ZERO);
        assert!(context.is_cancelled());
    }
}
