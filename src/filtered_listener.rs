use crate::eventbus::UpdateListener;
use crate::snapshot::RegistrationUpdate;

/// Wraps a listener and filters updates based on a user-supplied predicate.
pub struct FilteredListener {
    predicate: Box<dyn Fn(&RegistrationUpdate) -> bool>,
    inner: Box<dyn UpdateListener>,
}

impl FilteredListener {
    pub fn new(
        predicate: impl Fn(&RegistrationUpdate) -> bool + 'static,
        inner: impl UpdateListener + 'static,
    ) -> Self {
        Self {
            predicate: Box::new(predicate),
            inner: Box::new(inner),
        }
    }
}

impl UpdateListener for FilteredListener {
    fn on_update(&mut self, update: &RegistrationUpdate) {
        if (self.predicate)(update) {
            self.inner.on_update(update);
        }
    }
}
