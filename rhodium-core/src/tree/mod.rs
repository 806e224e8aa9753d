//! Hierarchical reactive property tree
//!
//! A single node store keyed by absolute path, shared by every view onto it.
//! [`PropertyTree::subtree`] returns another view re-rooted at a prefix;
//! nothing is copied, so a write through one view is visible through all
//! others.
//!
//! ```text
//!  PropertyTree (root "")          PropertyTree (root "dboards/A")
//!        │                                   │
//!        └──────────┐          ┌─────────────┘
//!                   ▼          ▼
//!        Arc<RwLock<BTreeMap<PropertyPath, Slot>>>
//!                   │
//!                   ▼
//!        Arc<Mutex<Node<T>>>  (value, coercer, publisher, subscribers)
//! ```
//!
//! Node types are fixed at creation; accessing a node as any other type
//! fails with [`TreeError::TypeMismatch`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::TreeError;

pub mod node;
pub mod path;

pub use node::{Coercer, Property, PropertyValue, Publisher, Subscriber};
pub use path::PropertyPath;

use node::Slot;

type Store = Arc<RwLock<BTreeMap<PropertyPath, Slot>>>;

/// A view onto a property node store, rooted at some path.
#[derive(Clone)]
pub struct PropertyTree {
    store: Store,
    root: PropertyPath,
}

impl Default for PropertyTree {
    fn default() -> Self {
        PropertyTree::new()
    }
}

impl fmt::Debug for PropertyTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyTree")
            .field("root", &self.root)
            .field("nodes", &self.paths().len())
            .finish()
    }
}

impl PropertyTree {
    /// Create an empty tree
    pub fn new() -> Self {
        PropertyTree {
            store: Arc::new(RwLock::new(BTreeMap::new())),
            root: PropertyPath::root(),
        }
    }

    /// The absolute path this view is rooted at
    pub fn root(&self) -> &PropertyPath {
        &self.root
    }

    fn absolute(&self, path: impl AsRef<str>) -> PropertyPath {
        self.root.join(path.as_ref())
    }

    /// A view whose paths are relative to `path` within this view. Like
    /// [`PropertyPath::join`], anything `Display` works, so channel indices
    /// descend directly: `frontends.subtree(chan)`.
    pub fn subtree(&self, path: impl fmt::Display) -> PropertyTree {
        PropertyTree {
            store: Arc::clone(&self.store),
            root: self.root.join(path),
        }
    }

    /// Allocate a new typed node at `path`
    pub fn create<T: PropertyValue>(&self, path: impl AsRef<str>) -> Result<Property<T>, TreeError> {
        let path = self.absolute(path);
        let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
        if store.contains_key(&path) {
            return Err(TreeError::AlreadyExists(path.to_string()));
        }
        let slot = Slot::new::<T>();
        let node = slot.downcast::<T>(&path)?;
        store.insert(path.clone(), slot);
        log::trace!("Created property {} ({})", path, std::any::type_name::<T>());
        Ok(Property::new(path, node))
    }

    /// Look up the node at `path` as type `T`
    pub fn access<T: PropertyValue>(&self, path: impl AsRef<str>) -> Result<Property<T>, TreeError> {
        let path = self.absolute(path);
        let slot = {
            let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
            store
                .get(&path)
                .cloned()
                .ok_or_else(|| TreeError::NotFound(path.to_string()))?
        };
        let node = slot.downcast::<T>(&path)?;
        Ok(Property::new(path, node))
    }

    pub fn exists(&self, path: impl AsRef<str>) -> bool {
        let path = self.absolute(path);
        self.store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&path)
    }

    /// Names of the direct children below `path`, in order
    pub fn list(&self, path: impl AsRef<str>) -> Vec<String> {
        let base = self.absolute(path);
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        let children: BTreeSet<String> = store
            .keys()
            .filter_map(|p| p.strip_prefix(&base))
            .filter_map(|rest| rest.components().next().map(str::to_string))
            .collect();
        children.into_iter().collect()
    }

    /// Every node path below this view's root, relative to it
    pub fn paths(&self) -> Vec<PropertyPath> {
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        store
            .keys()
            .filter_map(|p| p.strip_prefix(&self.root))
            .filter(|p| !p.is_root())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_create_and_access() {
        let tree = PropertyTree::new();
        tree.create::<f64>("a/b").unwrap().set(1.5).unwrap();
        assert!(tree.exists("a/b"));
        assert!(tree.exists("/a/b/"));
        assert!(!tree.exists("a"));
        assert_eq!(tree.access::<f64>("a/b").unwrap().get().unwrap(), 1.5);
    }

    #[test]
    fn test_create_twice_fails() {
        let tree = PropertyTree::new();
        tree.create::<i32>("x").unwrap();
        assert_eq!(
            tree.create::<i32>("x").unwrap_err(),
            TreeError::AlreadyExists("/x".into())
        );
        // A different type at the same path is still a duplicate
        assert!(matches!(
            tree.create::<String>("x"),
            Err(TreeError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_not_found() {
        let tree = PropertyTree::new();
        assert_eq!(
            tree.access::<f64>("missing").unwrap_err(),
            TreeError::NotFound("/missing".into())
        );
    }

    #[test]
    fn test_type_mismatch() {
        let tree = PropertyTree::new();
        tree.create::<f64>("freq").unwrap().set(2.5e9).unwrap();
        match tree.access::<String>("freq") {
            Err(TreeError::TypeMismatch {
                path,
                expected,
                actual,
            }) => {
                assert_eq!(path, "/freq");
                assert!(expected.contains("String"));
                assert_eq!(actual, "f64");
            }
            other => panic!("expected type mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_uninitialized_read() {
        let tree = PropertyTree::new();
        let p = tree.create::<bool>("flag").unwrap();
        assert!(!p.has_value());
        assert!(matches!(p.get(), Err(TreeError::Uninitialized(_))));
    }

    #[test]
    fn test_coercer_is_authoritative() {
        let tree = PropertyTree::new();
        let p = tree.create::<f64>("gain").unwrap();
        p.set_coercer(|g| Ok(g.clamp(0.0, 60.0).round()));

        p.set(75.3).unwrap();
        assert_eq!(p.get().unwrap(), 60.0);
        assert_eq!(p.get().unwrap(), 60.0);

        p.set(12.4).unwrap();
        assert_eq!(p.get().unwrap(), 12.0);
    }

    #[test]
    fn test_coercer_rejection_keeps_value() {
        let tree = PropertyTree::new();
        let p = tree.create::<String>("antenna").unwrap();
        p.set("RX2".to_string()).unwrap();
        p.set_coercer(|a| {
            if a == "RX2" || a == "TX/RX" {
                Ok(a)
            } else {
                Err(TreeError::InvalidValue(a))
            }
        });
        assert!(p.set("bogus".to_string()).is_err());
        assert_eq!(p.get().unwrap(), "RX2");
    }

    #[test]
    fn test_publisher_overrides_stored_value() {
        let tree = PropertyTree::new();
        let reads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&reads);
        let p = tree.create::<usize>("sensor").unwrap();
        p.set(7).unwrap();
        p.set_publisher(move || Ok(counter.fetch_add(1, Ordering::SeqCst) + 100));

        assert_eq!(p.get().unwrap(), 100);
        assert_eq!(p.get().unwrap(), 101);
        assert_eq!(reads.load(Ordering::SeqCst), 2);
        assert_eq!(p.stored(), Some(7));
    }

    #[test]
    fn test_subscribers_run_in_order_with_coerced_value() {
        let tree = PropertyTree::new();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let p = tree.create::<i32>("x").unwrap();
        p.set_coercer(|v| Ok(v * 2));
        for tag in 0..3 {
            let seen = Arc::clone(&seen);
            p.add_subscriber(move |v| {
                seen.lock().unwrap().push((tag, *v));
                Ok(())
            });
        }
        p.set(5).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![(0, 10), (1, 10), (2, 10)]);
    }

    #[test]
    fn test_subscriber_failure_fails_write_without_rollback() {
        let tree = PropertyTree::new();
        let p = tree.create::<i32>("x").unwrap();
        p.add_subscriber(|v| {
            if *v > 10 {
                Err(TreeError::InvalidValue("too big".into()))
            } else {
                Ok(())
            }
        });
        p.set(3).unwrap();
        assert!(p.set(11).is_err());
        assert_eq!(p.get().unwrap(), 11);
    }

    #[test]
    fn test_read_only_rejects_writes_before_callbacks() {
        let tree = PropertyTree::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let (c1, c2) = (Arc::clone(&calls), Arc::clone(&calls));
        let p = tree.create::<Vec<String>>("antenna/options").unwrap();
        p.set(vec!["RX2".into()]).unwrap();
        p.set_coercer(move |v| {
            c1.fetch_add(1, Ordering::SeqCst);
            Ok(v)
        })
        .add_subscriber(move |_| {
            c2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .make_read_only();

        let before = p.get().unwrap();
        assert_eq!(
            p.set(vec!["CAL".into()]).unwrap_err(),
            TreeError::ReadOnly("/antenna/options".into())
        );
        assert_eq!(p.get().unwrap(), before);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(p.is_read_only());
    }

    #[test]
    fn test_subtree_aliasing() {
        let tree = PropertyTree::new();
        let sub = tree.subtree("dboards/A");
        assert_eq!(sub.root().as_str(), "dboards/A");

        sub.create::<f64>("rx_frontends/0/freq/value")
            .unwrap()
            .set(1e9)
            .unwrap();
        let abs = tree
            .access::<f64>("dboards/A/rx_frontends/0/freq/value")
            .unwrap();
        assert_eq!(abs.get().unwrap(), 1e9);

        abs.set(2e9).unwrap();
        assert_eq!(
            sub.access::<f64>("rx_frontends/0/freq/value")
                .unwrap()
                .get()
                .unwrap(),
            2e9
        );

        let nested = sub.subtree("rx_frontends").subtree(0);
        assert!(nested.exists("freq/value"));
        assert_eq!(nested.root().as_str(), "dboards/A/rx_frontends/0");
    }

    #[test]
    fn test_callbacks_may_access_other_nodes() {
        let tree = PropertyTree::new();
        tree.create::<f64>("mirror").unwrap().set(0.0).unwrap();
        let view = tree.clone();
        tree.create::<f64>("source")
            .unwrap()
            .add_subscriber(move |v| {
                view.access::<f64>("mirror")?.set(*v)?;
                Ok(())
            })
            .set(4.0)
            .unwrap();
        assert_eq!(tree.access::<f64>("mirror").unwrap().get().unwrap(), 4.0);
    }

    #[test]
    fn test_list_and_paths() {
        let tree = PropertyTree::new();
        for p in ["fe/0/freq/value", "fe/0/freq/range", "fe/1/gain", "other"] {
            tree.create::<i32>(p).unwrap();
        }
        assert_eq!(tree.list("fe"), vec!["0", "1"]);
        assert_eq!(tree.list("fe/0/freq"), vec!["range", "value"]);
        assert!(tree.list("nothing").is_empty());

        let sub = tree.subtree("fe/0");
        let paths: Vec<String> = sub.paths().iter().map(|p| p.as_str().to_string()).collect();
        assert_eq!(paths, vec!["freq/range", "freq/value"]);
        assert_eq!(tree.paths().len(), 4);
    }
}
