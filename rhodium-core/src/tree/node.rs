//! Typed property nodes and the handle used to configure and access them

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::path::PropertyPath;
use crate::error::TreeError;

/// Any type that can live in a tree node
pub trait PropertyValue: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> PropertyValue for T {}

/// Maps a requested value to the value actually in effect
pub type Coercer<T> = Arc<dyn Fn(T) -> Result<T, TreeError> + Send + Sync>;

/// Computes the current value on every read
pub type Publisher<T> = Arc<dyn Fn() -> Result<T, TreeError> + Send + Sync>;

/// Observes the coerced value after every successful write
pub type Subscriber<T> = Arc<dyn Fn(&T) -> Result<(), TreeError> + Send + Sync>;

pub(crate) struct Node<T> {
    value: Option<T>,
    coercer: Option<Coercer<T>>,
    publisher: Option<Publisher<T>>,
    subscribers: Vec<Subscriber<T>>,
    mutable: bool,
}

impl<T> Node<T> {
    pub(crate) fn new() -> Self {
        Node {
            value: None,
            coercer: None,
            publisher: None,
            subscribers: Vec::new(),
            mutable: true,
        }
    }
}

/// Type-erased entry in the node store.
///
/// `node` always holds an `Arc<Mutex<Node<T>>>` for the `T` named by
/// `type_name`.
#[derive(Clone)]
pub(crate) struct Slot {
    pub(crate) type_name: &'static str,
    pub(crate) node: Arc<dyn Any + Send + Sync>,
}

impl Slot {
    pub(crate) fn new<T: PropertyValue>() -> Self {
        Slot {
            type_name: std::any::type_name::<T>(),
            node: Arc::new(Mutex::new(Node::<T>::new())),
        }
    }

    pub(crate) fn downcast<T: PropertyValue>(
        &self,
        path: &PropertyPath,
    ) -> Result<Arc<Mutex<Node<T>>>, TreeError> {
        Arc::clone(&self.node)
            .downcast::<Mutex<Node<T>>>()
            .map_err(|_| TreeError::TypeMismatch {
                path: path.to_string(),
                expected: std::any::type_name::<T>(),
                actual: self.type_name,
            })
    }
}

/// Handle onto one typed node.
///
/// Handles are cheap to clone and alias the node in the tree; configuring
/// a handle configures the node for every other holder.
///
/// Configuration methods take `&self` and return `&Self` so a node can be
/// set up in one chain right after creation:
///
/// ```rust
/// use rhodium_core::tree::PropertyTree;
///
/// let tree = PropertyTree::new();
/// tree.create::<f64>("gain/value")
///     .unwrap()
///     .set_coercer(|g| Ok(g.clamp(0.0, 60.0)));
/// ```
pub struct Property<T: PropertyValue> {
    path: PropertyPath,
    node: Arc<Mutex<Node<T>>>,
}

impl<T: PropertyValue> Clone for Property<T> {
    fn clone(&self) -> Self {
        Property {
            path: self.path.clone(),
            node: Arc::clone(&self.node),
        }
    }
}

impl<T: PropertyValue> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("path", &self.path)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T: PropertyValue> Property<T> {
    pub(crate) fn new(path: PropertyPath, node: Arc<Mutex<Node<T>>>) -> Self {
        Property { path, node }
    }

    fn lock(&self) -> MutexGuard<'_, Node<T>> {
        self.node.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Absolute path of the node
    pub fn path(&self) -> &PropertyPath {
        &self.path
    }

    /// Route every write through `coercer`; its result is what gets stored
    pub fn set_coercer<F>(&self, coercer: F) -> &Self
    where
        F: Fn(T) -> Result<T, TreeError> + Send + Sync + 'static,
    {
        self.lock().coercer = Some(Arc::new(coercer));
        self
    }

    /// Compute the value on every read instead of returning the stored one
    pub fn set_publisher<F>(&self, publisher: F) -> &Self
    where
        F: Fn() -> Result<T, TreeError> + Send + Sync + 'static,
    {
        self.lock().publisher = Some(Arc::new(publisher));
        self
    }

    /// Append a callback run, in registration order, after every write
    pub fn add_subscriber<F>(&self, subscriber: F) -> &Self
    where
        F: Fn(&T) -> Result<(), TreeError> + Send + Sync + 'static,
    {
        self.lock().subscribers.push(Arc::new(subscriber));
        self
    }

    /// Reject all further writes. Reads are unaffected.
    pub fn make_read_only(&self) -> &Self {
        self.lock().mutable = false;
        self
    }

    pub fn is_read_only(&self) -> bool {
        !self.lock().mutable
    }

    /// True when a value is stored or a publisher can produce one
    pub fn has_value(&self) -> bool {
        let node = self.lock();
        node.value.is_some() || node.publisher.is_some()
    }

    /// Write `value`.
    ///
    /// The coercer (if any) decides what is stored; subscribers then see the
    /// stored value. A subscriber failure fails the write but the stored
    /// value is not rolled back. The node lock is never held while user
    /// callbacks run, so callbacks may access other nodes.
    pub fn set(&self, value: T) -> Result<&Self, TreeError> {
        let coercer = {
            let node = self.lock();
            if !node.mutable {
                return Err(TreeError::ReadOnly(self.path.to_string()));
            }
            node.coercer.clone()
        };

        let actual = match coercer {
            Some(coerce) => coerce(value)?,
            None => value,
        };

        let subscribers = {
            let mut node = self.lock();
            node.value = Some(actual.clone());
            node.subscribers.clone()
        };

        for subscriber in subscribers {
            subscriber(&actual)?;
        }
        Ok(self)
    }

    /// Read the current value: the publisher's result when one is
    /// registered, otherwise the stored value.
    pub fn get(&self) -> Result<T, TreeError> {
        let (publisher, stored) = {
            let node = self.lock();
            (node.publisher.clone(), node.value.clone())
        };
        match publisher {
            Some(publish) => publish(),
            None => stored.ok_or_else(|| TreeError::Uninitialized(self.path.to_string())),
        }
    }

    /// The last stored value, bypassing any publisher
    pub fn stored(&self) -> Option<T> {
        self.lock().value.clone()
    }
}
