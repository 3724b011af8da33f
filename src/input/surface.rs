//! An editable text surface that reports content changes to
//! registered observers.
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

type Observer = Box<dyn FnMut(&str)>;

#[derive(Default)]
struct Observers {
    next_id: usize,
    entries: Vec<(usize, Observer)>,
}

/// Holds the text being composed. Every change to the content is
/// broadcast to observers in registration order.
///
/// Observers must not register or drop subscriptions on the same
/// surface while they are being notified.
#[derive(Default)]
pub struct InputSurface {
    content: String,
    observers: Rc<RefCell<Observers>>,
}

impl InputSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Replaces the content and fires a change event, even when the
    /// text is unchanged.
    pub fn set_content(&mut self, content: &str) {
        self.content.clear();
        self.content.push_str(content);
        self.emit();
    }

    pub fn clear(&mut self) {
        self.set_content("");
    }

    /// Registers `observer` for change events. The registration lasts
    /// until the returned [`Subscription`] or the surface is dropped.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: FnMut(&str) + 'static,
    {
        let mut observers = self.observers.borrow_mut();
        let id = observers.next_id;
        observers.next_id += 1;
        observers.entries.push((id, Box::new(observer)));

        Subscription {
            id,
            observers: Rc::downgrade(&self.observers),
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.borrow().entries.len()
    }

    fn emit(&self) {
        let mut observers = self.observers.borrow_mut();
        for (_, observer) in observers.entries.iter_mut() {
            observer(&self.content);
        }
    }
}

/// Keeps an observer registered on an [`InputSurface`]. Dropping it
/// removes the observer.
#[must_use = "dropping a subscription unregisters the observer"]
pub struct Subscription {
    id: usize,
    observers: Weak<RefCell<Observers>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(observers) = self.observers.upgrade() {
            observers.borrow_mut().entries.retain(|(id, _)| *id != self.id);
        }
    }
}

/// Tracks whether the surface holds anything worth submitting.
pub struct Submittable {
    submittable: Rc<Cell<bool>>,
    _subscription: Subscription,
}

impl Submittable {
    pub fn attach(surface: &InputSurface) -> Self {
        let submittable = Rc::new(Cell::new(!surface.content().trim().is_empty()));
        let state = Rc::clone(&submittable);
        let subscription = surface.subscribe(move |content| {
            state.set(!content.trim().is_empty());
        });

        Self {
            submittable,
            _subscription: subscription,
        }
    }

    pub fn get(&self) -> bool {
        self.submittable.get()
    }
}
